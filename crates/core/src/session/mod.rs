//! Persisted login session: bearer token plus last-known user profile.

mod secret_store;

pub use secret_store::{FileSecretStore, MemorySecretStore, SecretStore};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

use crate::entities::serde_ids;
use crate::errors::Result;

pub const TOKEN_KEY: &str = "crm_token";
pub const USER_KEY: &str = "crm_user";

/// The signed-in user as returned by `POST /login`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(deserialize_with = "serde_ids::id")]
    pub id: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub username: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "serde_ids::null_as_default")]
    pub email: String,
    #[serde(default, alias = "rol", deserialize_with = "serde_ids::null_as_default")]
    pub role: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Established,
    /// The server rejected the current token.
    Expired,
    SignedOut,
}

/// Owns the current bearer token and keeps it in sync with a [`SecretStore`].
pub struct SessionManager {
    secrets: Arc<dyn SecretStore>,
    token: Mutex<Option<String>>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

impl SessionManager {
    /// Restores any persisted token. A broken store starts signed out.
    pub fn load(secrets: Arc<dyn SecretStore>) -> Self {
        let token = match secrets.get_secret(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.trim().is_empty()),
            Err(err) => {
                warn!("[Session] Could not read persisted token: {}", err);
                None
            }
        };
        let (events, _) = broadcast::channel(16);
        Self {
            secrets,
            token: Mutex::new(token),
            events,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }

    /// Last-known profile, if one was persisted and still parses.
    pub fn user(&self) -> Result<Option<UserProfile>> {
        let Some(raw) = self.secrets.get_secret(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                warn!("[Session] Ignoring unreadable user profile: {}", err);
                Ok(None)
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn establish(&self, token: &str, user: &UserProfile) -> Result<()> {
        let mut current = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        self.secrets.set_secret(TOKEN_KEY, token)?;
        self.secrets
            .set_secret(USER_KEY, &serde_json::to_string(user)?)?;
        *current = Some(token.to_string());
        drop(current);

        info!("[Session] Signed in as '{}'", user.username);
        let _ = self.events.send(SessionEvent::Established);
        Ok(())
    }

    /// Clears the session if `rejected` is still the current token.
    ///
    /// Returns `true` only for the call that actually cleared it, so any
    /// number of concurrent rejections of one token expire it once.
    pub fn invalidate(&self, rejected: &str) -> bool {
        let mut current = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_deref() != Some(rejected) {
            return false;
        }
        *current = None;
        self.forget_persisted();
        drop(current);

        warn!("[Session] Session expired; persisted credentials cleared");
        let _ = self.events.send(SessionEvent::Expired);
        true
    }

    /// Explicit sign-out.
    pub fn clear(&self) -> Result<()> {
        let mut current = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        let was_signed_in = current.take().is_some();
        self.secrets.delete_secret(TOKEN_KEY)?;
        self.secrets.delete_secret(USER_KEY)?;
        drop(current);

        if was_signed_in {
            info!("[Session] Signed out");
            let _ = self.events.send(SessionEvent::SignedOut);
        }
        Ok(())
    }

    fn forget_persisted(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(err) = self.secrets.delete_secret(key) {
                warn!("[Session] Failed to delete '{}': {}", key, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "username": "ana",
            "name": "ana",
            "email": "ana@crm.local",
            "role": "admin",
            "avatar": null,
            "monthlyGoal": 0
        }))
        .expect("profile")
    }

    #[test]
    fn establish_persists_token_and_profile() {
        let secrets = Arc::new(MemorySecretStore::new());
        let session = SessionManager::load(secrets.clone());
        session.establish("t1", &profile()).expect("establish");

        let restored = SessionManager::load(secrets);
        assert_eq!(restored.token().as_deref(), Some("t1"));
        assert_eq!(restored.user().expect("user"), Some(profile()));
    }

    #[test]
    fn invalidate_ignores_tokens_that_are_no_longer_current() {
        let secrets = Arc::new(MemorySecretStore::new());
        let session = SessionManager::load(secrets.clone());
        session.establish("new", &profile()).expect("establish");

        assert!(!session.invalidate("old"));
        assert_eq!(session.token().as_deref(), Some("new"));
        assert!(secrets.get_secret(TOKEN_KEY).expect("get").is_some());
    }

    #[test]
    fn concurrent_invalidations_clear_once() {
        let session = Arc::new(SessionManager::load(Arc::new(MemorySecretStore::new())));
        session.establish("t1", &profile()).expect("establish");
        let mut events = session.subscribe();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = session.clone();
                std::thread::spawn(move || session.invalidate("t1"))
            })
            .collect();
        let cleared = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|cleared| *cleared)
            .count();

        assert_eq!(cleared, 1);
        assert_eq!(events.try_recv().expect("event"), SessionEvent::Expired);
        assert!(events.try_recv().is_err());
        assert_eq!(session.user().expect("user"), None);
    }
}
