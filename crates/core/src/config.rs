//! Runtime settings read from the environment.

use log::warn;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";
pub const DEFAULT_ROOM: &str = "crm-updates";
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const SESSION_FILE_NAME: &str = "crmsync-session.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// REST root, without trailing slash.
    pub api_url: String,
    /// Broadcast server origin.
    pub socket_url: String,
    pub room: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
    pub session_file: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: origin_of(DEFAULT_API_URL),
            room: DEFAULT_ROOM.to_string(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            session_file: default_session_file(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let api_url = get("CRM_API_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        let socket_url = get("CRM_SOCKET_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| origin_of(&api_url));

        Self {
            socket_url,
            room: get("CRM_ROOM").unwrap_or(defaults.room),
            reconnect_attempts: parse_or("CRM_RECONNECT_ATTEMPTS", get("CRM_RECONNECT_ATTEMPTS"))
                .unwrap_or(defaults.reconnect_attempts),
            reconnect_delay: parse_or("CRM_RECONNECT_DELAY_MS", get("CRM_RECONNECT_DELAY_MS"))
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_delay),
            request_timeout: parse_or(
                "CRM_REQUEST_TIMEOUT_SECS",
                get("CRM_REQUEST_TIMEOUT_SECS"),
            )
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
            session_file: get("CRM_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.session_file),
            api_url,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[Config] Ignoring invalid {}='{}'", key, raw);
            None
        }
    }
}

/// `scheme://host[:port]` part of a URL.
pub fn origin_of(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let after_scheme = trimmed.find("://").map(|i| i + 3).unwrap_or(0);
    match trimmed[after_scheme..].find('/') {
        Some(path_start) => trimmed[..after_scheme + path_start].to_string(),
        None => trimmed.to_string(),
    }
}

fn default_session_file() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".crmsync").join(SESSION_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(SESSION_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_server() {
        let config = SyncConfig::from_lookup(lookup(&[]));
        assert_eq!(config.api_url, "http://localhost:3001/api");
        assert_eq!(config.socket_url, "http://localhost:3001");
        assert_eq!(config.room, "crm-updates");
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn values_are_trimmed_and_socket_follows_api_origin() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("CRM_API_URL", "  https://crm.example.com/api/ "),
            ("CRM_RECONNECT_ATTEMPTS", " 3 "),
            ("CRM_ROOM", "   "),
        ]));
        assert_eq!(config.api_url, "https://crm.example.com/api");
        assert_eq!(config.socket_url, "https://crm.example.com");
        assert_eq!(config.reconnect_attempts, 3);
        assert_eq!(config.room, "crm-updates");
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("CRM_RECONNECT_DELAY_MS", "soon"),
            ("CRM_SOCKET_URL", "ws://push.local:9000/"),
        ]));
        assert_eq!(config.reconnect_delay, Duration::from_millis(1_000));
        assert_eq!(config.socket_url, "ws://push.local:9000");
    }
}
