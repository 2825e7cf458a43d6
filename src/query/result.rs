//! Query results
//!
//! A [`ResultSet`] holds the first page of a finished job and fetches the
//! remaining pages from the executor only when asked.
//!
//! - [`ResultSet::iter_pages`] and [`ResultSet::iterate_rows`] are lazy
//!   streams. Each new stream re-fetches pages 2..N.
//! - [`ResultSet::materialize_all`] walks every page once and keeps the
//!   rows; later calls cost no requests.
//!
//! Rows are re-keyed from field ids to display labels on the way out.

use super::error::{QueryError, QueryResult};
use super::executor::{QueryExecutor, Record, ResultPage};
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::OnceCell;

/// Field id → display label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldLabels(HashMap<String, String>);

impl FieldLabels {
    /// Build from the field metadata returned at submission
    ///
    /// Uses the field's label, else its name, else the id itself.
    pub fn from_fields(fields: &Map<String, Value>) -> Self {
        let labels = fields
            .iter()
            .map(|(id, meta)| {
                let text = |key: &str| {
                    meta.get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                };
                let label = text("label").or_else(|| text("name")).unwrap_or(id.as_str());
                (id.clone(), label.to_string())
            })
            .collect();
        Self(labels)
    }

    /// Label for a field id; unknown ids map to themselves
    pub fn label<'a>(&'a self, field_id: &'a str) -> &'a str {
        self.0.get(field_id).map(String::as_str).unwrap_or(field_id)
    }

    /// Re-key a raw row by label and unwrap `{value: {raw}}` envelopes
    pub fn transform_row(&self, row: &Record) -> Record {
        row.iter()
            .map(|(id, value)| (self.label(id).to_string(), unwrap_cell(value)))
            .collect()
    }

    pub fn transform_rows(&self, rows: &[Record]) -> Vec<Record> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }
}

/// A cell is either a bare scalar or `{value: {raw, formatted}}`
fn unwrap_cell(cell: &Value) -> Value {
    match cell.get("value") {
        Some(inner) => inner.get("raw").unwrap_or(inner).clone(),
        None => cell.clone(),
    }
}

/// Rows of a completed query job
#[derive(Debug)]
pub struct ResultSet {
    executor: QueryExecutor,
    job_id: String,
    fields: Map<String, Value>,
    labels: FieldLabels,
    first_page: ResultPage,
    all_rows: OnceCell<Vec<Record>>,
}

impl ResultSet {
    pub(crate) fn new(
        executor: QueryExecutor,
        job_id: String,
        fields: Map<String, Value>,
        first_page: ResultPage,
    ) -> Self {
        let labels = FieldLabels::from_fields(&fields);
        Self {
            executor,
            job_id,
            fields,
            labels,
            first_page,
            all_rows: OnceCell::new(),
        }
    }

    /// Server job id
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Field metadata as returned at submission
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn labels(&self) -> &FieldLabels {
        &self.labels
    }

    /// Server-reported total across all pages
    pub fn row_count(&self) -> u64 {
        self.first_page.total_results
    }

    pub fn total_pages(&self) -> u32 {
        self.first_page.total_pages
    }

    /// Page size the first page was fetched with
    pub fn page_size(&self) -> u32 {
        self.first_page.page_size
    }

    /// One transformed page (1-indexed)
    ///
    /// Page 1 at the first page's size is served without a request.
    pub async fn page(&self, page: u32, page_size: u32) -> QueryResult<Vec<Record>> {
        if page == 1 && page_size == self.first_page.page_size {
            return Ok(self.labels.transform_rows(&self.first_page.rows));
        }
        let fetched = self.executor.get_page(&self.job_id, page, page_size).await?;
        Ok(self.labels.transform_rows(&fetched.rows))
    }

    /// Stream of transformed pages
    ///
    /// Page 1 comes from the held first page; pages 2..=total_pages are
    /// fetched in order with `page_size` as each is polled. The stream ends
    /// after the first error.
    pub fn iter_pages(&self, page_size: u32) -> impl Stream<Item = QueryResult<Vec<Record>>> + '_ {
        let last = self.first_page.total_pages.max(1);

        stream::unfold(Some(1u32), move |cursor| async move {
            let page = cursor?;
            let next = (page < last).then_some(page + 1);

            if page == 1 {
                return Some((Ok(self.labels.transform_rows(&self.first_page.rows)), next));
            }

            match self.executor.get_page(&self.job_id, page, page_size).await {
                Ok(fetched) => Some((Ok(self.labels.transform_rows(&fetched.rows)), next)),
                Err(err) => {
                    tracing::warn!(job_id = %self.job_id, page, error = %err, "Page fetch failed");
                    Some((Err(err), None))
                }
            }
        })
    }

    /// Stream of transformed rows across every page
    pub fn iterate_rows(&self) -> impl Stream<Item = QueryResult<Record>> + '_ {
        self.iter_pages(self.first_page.page_size)
            .map_ok(|rows| stream::iter(rows.into_iter().map(Ok::<Record, QueryError>)))
            .try_flatten()
    }

    /// Every row, fetched once and cached
    ///
    /// Concurrent callers share a single walk. A failed walk caches nothing,
    /// so the next call starts over.
    pub async fn materialize_all(&self) -> QueryResult<&[Record]> {
        let rows = self
            .all_rows
            .get_or_try_init(|| async {
                let mut rows = Vec::with_capacity(self.first_page.rows.len());
                let mut pages = std::pin::pin!(self.iter_pages(self.first_page.page_size));
                while let Some(page) = pages.try_next().await? {
                    rows.extend(page);
                }
                tracing::debug!(job_id = %self.job_id, rows = rows.len(), "Materialized result set");
                Ok::<_, QueryError>(rows)
            })
            .await?;
        Ok(rows.as_slice())
    }

    /// Whether [`materialize_all`](Self::materialize_all) has completed
    pub fn is_materialized(&self) -> bool {
        self.all_rows.initialized()
    }

    /// Request cancellation of the underlying job
    pub async fn cancel(&self) -> QueryResult<()> {
        self.executor.cancel(&self.job_id).await
    }
}

impl std::fmt::Display for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ResultSet(job_id={}, total_results={}, total_pages={})",
            self.job_id, self.first_page.total_results, self.first_page.total_pages
        )
    }
}
