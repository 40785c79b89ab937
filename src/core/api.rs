//! The seam between the store and the Sparsify server.
//!
//! The store only needs `request(method, path, body) -> JSON`. Everything
//! else about the server is opaque.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The server could not be reached at all (connect refused, DNS, timeout).
    #[error("server unreachable: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The response body was not the JSON shape we expected.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Connectivity-class failures feed the reachability monitor; everything
    /// else stays local to the resource that failed.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// Message shown next to the failed resource.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Build a status error from a response body, preferring the server's
    /// `error_message` field over the reason phrase.
    pub fn from_status(status: u16, reason: Option<&str>, body: Option<&Value>) -> Self {
        let from_body = body
            .and_then(|b| b.get("error_message"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let message = from_body
            .or_else(|| reason.filter(|r| !r.is_empty()).map(str::to_string))
            .unwrap_or_else(|| format!("HTTP {}", status));

        ApiError::Status { status, message }
    }
}

#[async_trait]
pub trait Api: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError>;
}
