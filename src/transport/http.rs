//! HTTP Transport
//!
//! reqwest client for the analytics REST API. Successful responses arrive
//! wrapped as `{"status": "ok", "results": ...}`; failures as
//! `{"status": "error", "error": {"name", "statusCode", "message"}}`.

use super::{ApiRequest, HttpMethod, Transport, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL of the server (e.g., "https://app.example.com")
    pub base_url: String,
    /// Personal access token sent as `Authorization: ApiKey <token>`
    pub access_token: Option<String>,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            access_token: None,
            request_timeout_ms: 30_000,
        }
    }
}

/// reqwest-backed [`Transport`]
pub struct HttpTransport {
    client: Client,
    config: TransportConfig,
}

impl HttpTransport {
    /// Create a new transport with the given configuration
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("lightquery/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.access_token {
            Some(token) => builder.header("Authorization", format!("ApiKey {}", token)),
            None => builder,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let url = self.url(&request.path);
        tracing::trace!(method = %request.method, url = %url, "Sending API request");

        let builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        };
        let mut builder = self
            .authorize(builder)
            .header("Accept", "application/json")
            .query(&request.params);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(TransportError::from_reqwest)?;

        unwrap_envelope(status.as_u16(), &text)
    }

    async fn fetch_text(&self, path: &str) -> Result<String, TransportError> {
        let url = self.url(path);
        tracing::trace!(url = %url, "Fetching raw document");

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let text = response.text().await.map_err(TransportError::from_reqwest)?;
        if status.is_success() {
            Ok(text)
        } else {
            Err(TransportError::Api {
                status: status.as_u16(),
                name: "HttpError".to_string(),
                message: text,
            })
        }
    }
}

/// Turn a raw response into the `results` payload or a structured error
fn unwrap_envelope(status: u16, text: &str) -> Result<Value, TransportError> {
    let body = if text.trim().is_empty() {
        Some(Value::Null)
    } else {
        serde_json::from_str::<Value>(text).ok()
    };
    let success = (200..300).contains(&status);

    let body = match body {
        Some(body) => body,
        None if success => return Err(TransportError::Decode(format!("invalid JSON body: {}", text))),
        None => {
            return Err(TransportError::Api {
                status,
                name: "HttpError".to_string(),
                message: text.to_string(),
            })
        }
    };

    if !success || body.get("status").and_then(Value::as_str) == Some("error") {
        let error = body.get("error");
        let field = |key: &str| {
            error
                .and_then(|e| e.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let status = error
            .and_then(|e| e.get("statusCode"))
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(status);

        return Err(TransportError::Api {
            status,
            name: field("name").unwrap_or_else(|| "ApiError".to_string()),
            message: field("message").unwrap_or_else(|| body.to_string()),
        });
    }

    Ok(match body {
        Value::Object(mut map) if map.contains_key("results") => {
            map.remove("results").unwrap_or(Value::Null)
        }
        other => other,
    })
}
