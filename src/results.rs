//! Common interface over query and SQL results

use crate::query::{QueryResult, Record, ResultSet};
use crate::sql::SqlResult;
use async_trait::async_trait;

/// Rows that can be handed to a downstream sink
#[async_trait]
pub trait RecordSet: Send + Sync {
    /// Every row, label-keyed
    async fn to_records(&self) -> QueryResult<Vec<Record>>;

    /// Total number of rows
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All rows as a JSON array
    async fn to_json_string(&self) -> QueryResult<String> {
        let records = self.to_records().await?;
        Ok(serde_json::to_string(&records)?)
    }
}

#[async_trait]
impl RecordSet for ResultSet {
    async fn to_records(&self) -> QueryResult<Vec<Record>> {
        Ok(self.materialize_all().await?.to_vec())
    }

    /// Server-reported total, available before any page is fetched
    fn len(&self) -> usize {
        usize::try_from(self.row_count()).unwrap_or(usize::MAX)
    }
}

#[async_trait]
impl RecordSet for SqlResult {
    async fn to_records(&self) -> QueryResult<Vec<Record>> {
        Ok(self.rows().to_vec())
    }

    fn len(&self) -> usize {
        SqlResult::len(self)
    }
}
