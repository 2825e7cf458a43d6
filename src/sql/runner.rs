use crate::query::{QueryError, QueryResult, Record};
use crate::transport::{segment, ApiRequest, Transport};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const RESULTS_PREFIX: &str = "/api/v1/projects/";
const RESULTS_MARKER: &str = "/sqlRunner/results/";

/// Polling schedule for SQL jobs
#[derive(Debug, Clone)]
pub struct SqlPollConfig {
    /// Fixed wait between status polls
    pub interval: Duration,
    /// Give up after this long
    pub max_wait: Duration,
}

impl Default for SqlPollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_wait: Duration::from_secs(300),
        }
    }
}

/// Rows of a raw SQL query, fully loaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlResult {
    rows: Vec<Record>,
    columns: Vec<String>,
}

impl SqlResult {
    pub fn new(rows: Vec<Record>, columns: Vec<String>) -> Self {
        Self { rows, columns }
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }
}

impl std::fmt::Display for SqlResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SqlResult(rows={}, columns={:?})", self.rows.len(), self.columns)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    job_id: Option<String>,
    #[serde(default)]
    rows: Option<Vec<Record>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDetails {
    file_url: Option<String>,
    #[serde(default)]
    columns: Vec<ColumnRecord>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ColumnRecord {
    reference: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatusResponse {
    status: Option<String>,
    #[serde(default)]
    details: Option<JobDetails>,
}

/// Runs raw SQL for one project
#[derive(Clone)]
pub struct SqlRunner {
    transport: Arc<dyn Transport>,
    project_uuid: String,
    poll: SqlPollConfig,
}

impl SqlRunner {
    pub fn new(transport: Arc<dyn Transport>, project_uuid: impl Into<String>) -> Self {
        Self {
            transport,
            project_uuid: project_uuid.into(),
            poll: SqlPollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: SqlPollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn project_path(&self) -> String {
        format!("/api/v1/projects/{}/sqlRunner", segment(&self.project_uuid))
    }

    /// Run a query, waiting for its job if the server starts one
    pub async fn execute(&self, sql: &str, limit: u32) -> QueryResult<SqlResult> {
        let request = ApiRequest::post(format!("{}/run", self.project_path()))
            .json(json!({"sql": sql, "limit": limit}));
        let response: RunResponse = serde_json::from_value(self.transport.send(request).await?)?;

        match response.job_id.filter(|id| !id.is_empty()) {
            Some(job_id) => {
                tracing::info!(job_id = %job_id, limit, "Submitted SQL query");
                self.poll_for_result(&job_id).await
            }
            None => Ok(inline_result(response.rows.unwrap_or_default())),
        }
    }

    async fn poll_for_result(&self, job_id: &str) -> QueryResult<SqlResult> {
        let deadline = Instant::now() + self.poll.max_wait;
        let path = format!("/api/v1/schedulers/job/{}/status", segment(job_id));

        loop {
            let response: JobStatusResponse =
                serde_json::from_value(self.transport.send(ApiRequest::get(&path)).await?)?;
            let details = response.details.unwrap_or_default();

            match response.status.as_deref() {
                Some("completed") => return self.load_results(job_id, details).await,
                Some("error") => {
                    return Err(QueryError::QueryFailed {
                        job_id: job_id.to_string(),
                        message: details.error.unwrap_or_else(|| "SQL query failed".to_string()),
                    })
                }
                status => tracing::debug!(job_id, status = ?status, "SQL job not finished"),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.poll.interval.min(remaining)).await;
            if Instant::now() >= deadline {
                break;
            }
        }

        tracing::warn!(job_id, "SQL query timed out");
        Err(QueryError::QueryTimedOut {
            job_id: job_id.to_string(),
            timeout: self.poll.max_wait,
        })
    }

    async fn load_results(&self, job_id: &str, details: JobDetails) -> QueryResult<SqlResult> {
        let columns: Vec<String> = details
            .columns
            .into_iter()
            .map(|col| col.reference.or(col.name).unwrap_or_default())
            .collect();

        let Some(path) = details.file_url.as_deref().and_then(results_path) else {
            return Ok(SqlResult::new(Vec::new(), columns));
        };

        let text = self.transport.fetch_text(path).await?;
        let rows = parse_json_lines(&text)?;
        tracing::info!(job_id, rows = rows.len(), "SQL query complete");
        Ok(SqlResult::new(rows, columns))
    }

    /// Tables visible to the SQL runner
    pub async fn tables(&self) -> QueryResult<Value> {
        let request = ApiRequest::get(format!("{}/tables", self.project_path()));
        Ok(self.transport.send(request).await?)
    }

    /// Columns of one table
    pub async fn fields(&self, table: &str, schema: Option<&str>) -> QueryResult<Value> {
        let mut request = ApiRequest::get(format!("{}/fields", self.project_path())).param("table", table);
        if let Some(schema) = schema {
            request = request.param("schema", schema);
        }
        Ok(self.transport.send(request).await?)
    }
}

impl std::fmt::Debug for SqlRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlRunner")
            .field("project_uuid", &self.project_uuid)
            .field("poll", &self.poll)
            .finish()
    }
}

/// Columns of an inline response are the keys of its first row
fn inline_result(rows: Vec<Record>) -> SqlResult {
    let columns = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    SqlResult::new(rows, columns)
}

/// Server-relative path of a results file, from an absolute or relative URL
fn results_path(file_url: &str) -> Option<&str> {
    let start = file_url.find(RESULTS_PREFIX)?;
    let path = &file_url[start..];
    path.contains(RESULTS_MARKER).then_some(path)
}

fn parse_json_lines(text: &str) -> QueryResult<Vec<Record>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<Record>(line).map_err(QueryError::from))
        .collect()
}
