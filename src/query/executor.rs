//! Query Executor
//!
//! Runs a metric query as a server-side job:
//! 1. Submit the payload and receive a job id
//! 2. Poll page 1 with exponential backoff until the job is terminal
//! 3. Hand the first page to a [`ResultSet`], which fetches the rest on demand
//!
//! # Job lifecycle
//!
//! ```text
//! SUBMITTED → POLLING ─┬→ READY
//!                      ├→ ERRORED     (QueryFailed)
//!                      ├→ CANCELLED   (QueryCancelled)
//!                      └→ TIMED_OUT   (QueryTimedOut, job left running)
//! ```
//!
//! Nothing here retries a failed request. The only repeated call is the
//! status poll while the job is pending.

use super::builder::MetricQuery;
use super::error::{QueryError, QueryResult};
use super::result::ResultSet;
use crate::transport::{segment, ApiRequest, Transport};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A result row as returned by the server, or after label transformation
pub type Record = Map<String, Value>;

/// Default polling deadline for a query job
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of rows per page
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Backoff schedule for the status poll
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// First wait after a pending poll
    pub backoff_start: Duration,
    /// Upper bound for a single wait
    pub backoff_max: Duration,
    /// Page size requested while polling (and therefore of the first page)
    pub page_size: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            backoff_start: Duration::from_millis(100),
            backoff_max: Duration::from_millis(2000),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Per-call execution options
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Polling deadline, measured from the first poll
    pub timeout: Duration,
    /// Ask the server to bypass its cache and drop any cached client result
    pub invalidate_cache: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            invalidate_cache: false,
        }
    }
}

impl ExecuteOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn invalidate_cache(mut self, invalidate: bool) -> Self {
        self.invalidate_cache = invalidate;
        self
    }
}

/// Job status reported by the poll endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Ready,
    Error,
    Cancelled,
    /// Any status this client does not know; treated as pending
    #[serde(other)]
    Unknown,
}

/// Raw body of the poll/page endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub rows: Option<Vec<Record>>,
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub total_page_count: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl PageResponse {
    /// Server error text, whether sent as a string or an object
    fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Object(obj)) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
            Some(Value::Null) | None => "Unknown error".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// One page of untransformed rows plus the server's pagination totals
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub rows: Vec<Record>,
    pub total_results: u64,
    pub total_pages: u32,
    pub page_size: u32,
}

impl ResultPage {
    /// Apply defaults for missing totals
    pub fn from_response(response: PageResponse, requested_page_size: u32) -> Self {
        let rows = response.rows.unwrap_or_default();
        Self {
            total_results: response.total_results.unwrap_or(rows.len() as u64),
            total_pages: response.total_page_count.unwrap_or(1),
            page_size: response.page_size.unwrap_or(requested_page_size),
            rows,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    query_uuid: String,
    #[serde(default)]
    fields: Option<Map<String, Value>>,
}

/// A submitted job and the field metadata the server returned with it
#[derive(Debug, Clone)]
pub struct SubmittedQuery {
    pub job_id: String,
    pub fields: Map<String, Value>,
}

/// Submits metric queries and fetches their pages
#[derive(Clone)]
pub struct QueryExecutor {
    transport: Arc<dyn Transport>,
    project_uuid: String,
    poll: PollConfig,
}

impl QueryExecutor {
    /// Create a new executor for one project
    pub fn new(transport: Arc<dyn Transport>, project_uuid: impl Into<String>) -> Self {
        Self {
            transport,
            project_uuid: project_uuid.into(),
            poll: PollConfig::default(),
        }
    }

    /// Replace the polling schedule
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    pub fn project_uuid(&self) -> &str {
        &self.project_uuid
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    fn query_path(&self) -> String {
        format!("/api/v2/projects/{}/query", segment(&self.project_uuid))
    }

    /// Submit a payload and return the new job id
    ///
    /// Issues exactly one request.
    pub async fn submit(
        &self,
        payload: &MetricQuery,
        invalidate_cache: bool,
    ) -> QueryResult<SubmittedQuery> {
        let body = json!({
            "query": payload,
            "context": "api",
            "invalidateCache": invalidate_cache,
        });
        let request = ApiRequest::post(format!("{}/metric-query", self.query_path())).json(body);

        let response: SubmitResponse = serde_json::from_value(self.transport.send(request).await?)?;

        tracing::info!(
            job_id = %response.query_uuid,
            explore = %payload.explore_name,
            invalidate_cache,
            "Submitted metric query"
        );

        Ok(SubmittedQuery {
            job_id: response.query_uuid,
            fields: response.fields.unwrap_or_default(),
        })
    }

    async fn fetch_page(&self, job_id: &str, page: u32, page_size: u32) -> QueryResult<PageResponse> {
        let request = ApiRequest::get(format!("{}/{}", self.query_path(), segment(job_id)))
            .param("page", page)
            .param("pageSize", page_size);

        let value = self.transport.send(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Poll page 1 until the job is terminal or `timeout` elapses
    ///
    /// Waits start at the configured backoff, double after every
    /// non-terminal poll and never run past the deadline. A timeout does not
    /// cancel the job.
    pub async fn poll_until_ready(&self, job_id: &str, timeout: Duration) -> QueryResult<ResultPage> {
        let page_size = self.poll.page_size;
        let deadline = Instant::now() + timeout;
        let mut backoff = self.poll.backoff_start;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let response = self.fetch_page(job_id, 1, page_size).await?;

            match response.status {
                Some(JobStatus::Ready) => {
                    let page = ResultPage::from_response(response, page_size);
                    tracing::info!(
                        job_id,
                        attempts = attempt,
                        total_results = page.total_results,
                        total_pages = page.total_pages,
                        "Query ready"
                    );
                    return Ok(page);
                }
                Some(JobStatus::Error) => {
                    return Err(QueryError::QueryFailed {
                        job_id: job_id.to_string(),
                        message: response.error_message(),
                    });
                }
                Some(JobStatus::Cancelled) => {
                    return Err(QueryError::QueryCancelled {
                        job_id: job_id.to_string(),
                    });
                }
                Some(JobStatus::Pending) | Some(JobStatus::Unknown) | None => {}
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let wait = backoff.min(remaining);
            tracing::debug!(
                job_id,
                attempt,
                wait_ms = wait.as_millis() as u64,
                "Query pending"
            );
            tokio::time::sleep(wait).await;

            if Instant::now() >= deadline {
                break;
            }
            backoff = (backoff * 2).min(self.poll.backoff_max);
        }

        tracing::warn!(job_id, timeout_secs = timeout.as_secs_f64(), "Query timed out");
        Err(QueryError::QueryTimedOut {
            job_id: job_id.to_string(),
            timeout,
        })
    }

    /// Fetch one page of a ready job
    ///
    /// A single request; does not poll.
    pub async fn get_page(&self, job_id: &str, page: u32, page_size: u32) -> QueryResult<ResultPage> {
        tracing::debug!(job_id, page, page_size, "Fetching result page");
        let response = self.fetch_page(job_id, page, page_size).await?;
        Ok(ResultPage::from_response(response, page_size))
    }

    /// Ask the server to cancel a job. Does not wait for the transition.
    pub async fn cancel(&self, job_id: &str) -> QueryResult<()> {
        let request = ApiRequest::post(format!("{}/{}/cancel", self.query_path(), segment(job_id)));
        self.transport.send(request).await?;
        tracing::info!(job_id, "Cancel requested");
        Ok(())
    }

    /// Submit, wait for the first page and wrap it in a [`ResultSet`]
    pub async fn execute(&self, payload: &MetricQuery, options: &ExecuteOptions) -> QueryResult<ResultSet> {
        let submitted = self.submit(payload, options.invalidate_cache).await?;
        let first_page = self.poll_until_ready(&submitted.job_id, options.timeout).await?;

        Ok(ResultSet::new(
            self.clone(),
            submitted.job_id,
            submitted.fields,
            first_page,
        ))
    }
}

impl std::fmt::Debug for QueryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExecutor")
            .field("project_uuid", &self.project_uuid)
            .field("poll", &self.poll)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use crate::transport::{HttpMethod, TransportError};

    fn payload() -> MetricQuery {
        MetricQuery {
            explore_name: "orders".to_string(),
            dimensions: vec!["orders_country".to_string()],
            metrics: vec!["orders_revenue".to_string()],
            filters: Default::default(),
            limit: 500,
            table_calculations: Vec::new(),
            sorts: Vec::new(),
            custom_dimensions: None,
            additional_metrics: None,
            timezone: None,
        }
    }

    fn executor(mock: &Arc<MockTransport>) -> QueryExecutor {
        QueryExecutor::new(mock.clone(), "proj")
    }

    fn submitted(job_id: &str) -> Value {
        json!({
            "queryUuid": job_id,
            "fields": {
                "orders_country": {"label": "Country", "name": "country"},
                "orders_revenue": {"label": "Revenue", "name": "revenue"}
            }
        })
    }

    #[tokio::test]
    async fn test_submit_request_shape() {
        let mock = Arc::new(MockTransport::new().with_response(submitted("abc")));
        let submitted = executor(&mock).submit(&payload(), true).await.unwrap();

        assert_eq!(submitted.job_id, "abc");
        assert_eq!(submitted.fields.len(), 2);

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0].request;
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "/api/v2/projects/proj/query/metric-query");

        let body = req.body.as_ref().unwrap();
        assert_eq!(body["context"], "api");
        assert_eq!(body["invalidateCache"], true);
        assert_eq!(body["query"]["exploreName"], "orders");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_then_ready() {
        let mock = Arc::new(
            MockTransport::new()
                .with_response(submitted("abc"))
                .with_response(json!({"status": "pending"}))
                .with_response(json!({
                    "status": "ready",
                    "rows": [
                        {"orders_country": "USA", "orders_revenue": 1000},
                        {"orders_country": "UK", "orders_revenue": 500}
                    ],
                    "totalResults": 2,
                    "totalPageCount": 1
                })),
        );

        let result = executor(&mock)
            .execute(&payload(), &ExecuteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.job_id(), "abc");
        assert_eq!(result.row_count(), 2);

        let requests = mock.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].at - requests[1].at, Duration::from_millis(100));
        assert_eq!(requests[1].request.path, "/api/v2/projects/proj/query/abc");
        assert_eq!(requests[1].request.param_value("page"), Some("1"));
        assert_eq!(requests[1].request.param_value("pageSize"), Some("500"));

        let rows = result.materialize_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Country"], "USA");
        assert_eq!(rows[0]["Revenue"], 1000);
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_and_caps() {
        let mut mock = MockTransport::new();
        for _ in 0..6 {
            mock = mock.with_response(json!({"status": "pending"}));
        }
        let mock = Arc::new(mock.with_response(json!({"status": "ready", "rows": []})));

        executor(&mock)
            .poll_until_ready("abc", Duration::from_secs(60))
            .await
            .unwrap();

        let requests = mock.requests();
        let gaps: Vec<u128> = requests
            .windows(2)
            .map(|w| (w[1].at - w[0].at).as_millis())
            .collect();
        assert_eq!(gaps, vec![100, 200, 400, 800, 1600, 2000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_never_overshoots() {
        let mock = Arc::new(MockTransport::new().with_fallback(json!({"status": "pending"})));

        let start = Instant::now();
        let err = executor(&mock)
            .poll_until_ready("abc", Duration::from_secs(1))
            .await
            .unwrap_err();

        match err {
            QueryError::QueryTimedOut { job_id, timeout } => {
                assert_eq!(job_id, "abc");
                assert_eq!(timeout, Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(1));
        // polls at 0, 100, 300 and 700 ms; the last wait is cut to 300 ms
        assert_eq!(mock.request_count(), 4);
        assert!(mock
            .requests()
            .iter()
            .all(|r| r.request.method == HttpMethod::Get));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_status_treated_as_pending() {
        let mock = Arc::new(
            MockTransport::new()
                .with_response(json!({"status": "queued"}))
                .with_response(json!({}))
                .with_response(json!({"status": "ready", "rows": [{"a": 1}]})),
        );

        let page = executor(&mock)
            .poll_until_ready("abc", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(mock.request_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_status() {
        let mock = Arc::new(MockTransport::new().with_response(json!({"status": "cancelled"})));
        let err = executor(&mock)
            .poll_until_ready("abc", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::QueryCancelled { job_id } if job_id == "abc"));
    }

    #[tokio::test]
    async fn test_error_status_carries_message() {
        let mock = Arc::new(
            MockTransport::new().with_response(json!({"status": "error", "error": "bad sql"})),
        );
        let err = executor(&mock)
            .poll_until_ready("abc", Duration::from_secs(5))
            .await
            .unwrap_err();

        match err {
            QueryError::QueryFailed { job_id, message } => {
                assert_eq!(job_id, "abc");
                assert_eq!(message, "bad sql");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_object_message() {
        let mock = Arc::new(MockTransport::new().with_response(json!({
            "status": "error",
            "error": {"name": "CompileError", "message": "unknown field"}
        })));
        let err = executor(&mock)
            .poll_until_ready("abc", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let mock = Arc::new(MockTransport::new().with_error(TransportError::Unavailable));
        let err = executor(&mock)
            .poll_until_ready("abc", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Transport(TransportError::Unavailable)));
        assert_eq!(mock.request_count(), 1);
    }

    #[tokio::test]
    async fn test_get_page_defaults() {
        let mock = Arc::new(MockTransport::new().with_response(json!({"rows": [{"a": 1}, {"a": 2}]})));
        let page = executor(&mock).get_page("abc", 3, 100).await.unwrap();

        assert_eq!(page.total_results, 2);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.page_size, 100);

        let req = &mock.requests()[0].request;
        assert_eq!(req.param_value("page"), Some("3"));
        assert_eq!(req.param_value("pageSize"), Some("100"));
    }

    #[tokio::test]
    async fn test_cancel_is_one_request() {
        let mock = Arc::new(MockTransport::new().with_response(Value::Null));
        executor(&mock).cancel("abc").await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request.method, HttpMethod::Post);
        assert_eq!(requests[0].request.path, "/api/v2/projects/proj/query/abc/cancel");
        assert!(requests[0].request.body.is_none());
    }

    #[tokio::test]
    async fn test_submit_missing_job_id_is_decode_error() {
        let mock = Arc::new(MockTransport::new().with_response(json!({"fields": {}})));
        let err = executor(&mock).submit(&payload(), false).await.unwrap_err();
        assert!(matches!(err, QueryError::Decode(_)));
    }
}
