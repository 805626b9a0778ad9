//! REST client for the CRM API.
//!
//! Every call carries the session's bearer token except the initial dataset
//! load, which is allowed before anyone signs in.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crmsync_core::config::{SyncConfig, DEFAULT_REQUEST_TIMEOUT_SECS};
use crmsync_core::gateway::{CrmGateway, HttpMethod};
use crmsync_core::session::{SessionManager, UserProfile};

use crate::error::{GatewayError, Result};

const MAX_LOG_BODY_CHARS: usize = 512;
const SNAPSHOT_PATH: &str = "/crm-data";
const LOGIN_PATH: &str = "/login";

/// Body of `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Client for the CRM REST API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    session: Arc<SessionManager>,
}

impl HttpGateway {
    fn log_response(status: StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Gateway] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[Gateway] Response error ({}): {}", status, preview);
    }

    /// Server message of an error body: `message`, then `error`, then the raw
    /// text.
    fn error_message(body: &str) -> String {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            for field in ["message", "error"] {
                if let Some(Value::String(message)) = map.get(field) {
                    if !message.trim().is_empty() {
                        return message.clone();
                    }
                }
            }
        }
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "Request failed".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Create a new gateway.
    ///
    /// * `base_url` - API root, e.g. `http://localhost:3001/api`
    pub fn new(base_url: &str, timeout: Duration, session: Arc<SessionManager>) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(GatewayError::invalid_request("API base URL is empty"));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            session,
        })
    }

    pub fn from_config(config: &SyncConfig, session: Arc<SessionManager>) -> Result<Self> {
        Self::new(&config.api_url, config.request_timeout, session)
    }

    /// Gateway with the default request timeout.
    pub fn with_defaults(base_url: &str, session: Arc<SessionManager>) -> Result<Self> {
        Self::new(
            base_url,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            session,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Create headers for an API request.
    fn headers(&self, token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| GatewayError::auth("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Parse a JSON response body, classifying failures by status.
    async fn parse_response(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            let message = Self::error_message(&body);
            return Err(match status {
                StatusCode::UNAUTHORIZED => GatewayError::Auth(message),
                StatusCode::CONFLICT => GatewayError::Conflict(message),
                _ => GatewayError::api(status.as_u16(), message),
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            GatewayError::api(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    /// Sends one request. A 401 invalidates the token that was sent.
    pub async fn request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> Result<Value> {
        let token = self.session.token();
        let anonymous_allowed = method == HttpMethod::Get && path == SNAPSHOT_PATH;
        if token.is_none() && !anonymous_allowed {
            return Err(GatewayError::auth("Not signed in"));
        }

        let url = self.url(path);
        debug!("[Gateway] {} {}", method, url);

        let mut request = self
            .client
            .request(to_reqwest(method), &url)
            .headers(self.headers(token.as_deref())?);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        match Self::parse_response(response).await {
            Err(GatewayError::Auth(message)) => {
                if let Some(rejected) = token.as_deref() {
                    self.session.invalidate(rejected);
                }
                Err(GatewayError::Auth(message))
            }
            other => other,
        }
    }

    /// Signs in and persists the returned token and profile.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        let url = self.url(LOGIN_PATH);
        info!("[Gateway] Signing in as '{}'", username);

        let response = self
            .client
            .post(&url)
            .headers(self.headers(None)?)
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        let body: LoginResponse = serde_json::from_value(Self::parse_response(response).await?)?;

        let rejected = || {
            GatewayError::auth(
                body.message
                    .clone()
                    .unwrap_or_else(|| "Login rejected".to_string()),
            )
        };
        if !body.success {
            return Err(rejected());
        }
        let (Some(token), Some(user)) = (body.token.as_deref(), body.user.as_ref()) else {
            return Err(rejected());
        };

        self.session
            .establish(token, user)
            .map_err(GatewayError::Session)?;
        Ok(user.clone())
    }

    /// Forgets the persisted session. No request is sent.
    pub fn logout(&self) -> Result<()> {
        self.session.clear().map_err(GatewayError::Session)
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl CrmGateway for HttpGateway {
    async fn call(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<Value>,
    ) -> crmsync_core::Result<Value> {
        self.request(path, method, body).await.map_err(|err| {
            warn!("[Gateway] {} {} failed: {}", method, path, err);
            err.into()
        })
    }
}
