//! Transport Layer
//!
//! The query engine, catalog and SQL runner never build HTTP requests
//! themselves. They describe an [`ApiRequest`] and hand it to a
//! [`Transport`], which returns the parsed JSON payload or a structured
//! [`TransportError`].
//!
//! - **HttpTransport**: reqwest-backed implementation used in production
//! - **MockTransport**: scripted implementation used by unit tests

mod error;
mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use error::TransportError;
pub use http::{HttpTransport, TransportConfig};

use async_trait::async_trait;
use serde_json::Value;

/// HTTP verbs used by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// A single API call, relative to the server base URL
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Create a GET request
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    /// Create a POST request with no body
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    /// Append a query string parameter
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up a query string parameter
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Send-request-get-JSON primitive the rest of the crate is built on
///
/// Implementations own authentication headers and timeouts. They must not
/// retry: callers rely on every request being issued exactly once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request and return the unwrapped JSON result
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError>;

    /// Fetch a raw text document (used for JSON-lines result files)
    async fn fetch_text(&self, path: &str) -> Result<String, TransportError>;
}

/// Escape a value for use as one URL path segment
pub(crate) fn segment(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}
