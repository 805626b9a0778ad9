//! Request/response seam between commands and the server.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated JSON calls against the CRM API root.
///
/// Implementations classify failures into [`crate::Error`]: 401 as `Auth`,
/// 409 as `Conflict`, other non-2xx as `Api`, and no response as `Network`.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    async fn call(&self, path: &str, method: HttpMethod, body: Option<Value>) -> Result<Value>;
}
