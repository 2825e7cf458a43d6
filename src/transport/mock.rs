//! Scripted transport for unit tests

use super::{ApiRequest, Transport, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

/// A request as seen by the mock, with the (possibly paused) clock reading
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub request: ApiRequest,
    pub at: Instant,
}

/// Replays queued responses in order and records every request
#[derive(Default)]
pub(crate) struct MockTransport {
    responses: Mutex<VecDeque<Result<Value, TransportError>>>,
    fallback: Option<Value>,
    texts: HashMap<String, String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response
    pub fn with_response(self, value: Value) -> Self {
        self.responses.lock().unwrap().push_back(Ok(value));
        self
    }

    /// Queue a failed response
    pub fn with_error(self, err: TransportError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    /// Response returned once the queue is exhausted
    pub fn with_fallback(mut self, value: Value) -> Self {
        self.fallback = Some(value);
        self
    }

    /// Raw document served by `fetch_text`
    pub fn with_text(mut self, path: &str, body: &str) -> Self {
        self.texts.insert(path.to_string(), body.to_string());
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            request,
            at: Instant::now(),
        });

        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| TransportError::Decode("no scripted response".to_string())),
        }
    }

    async fn fetch_text(&self, path: &str) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            request: ApiRequest::get(path),
            at: Instant::now(),
        });

        self.texts.get(path).cloned().ok_or(TransportError::Api {
            status: 404,
            name: "NotFoundError".to_string(),
            message: format!("no document at {}", path),
        })
    }
}
