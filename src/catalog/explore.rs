//! Explores: queryable data sources

use super::{Catalog, Named};
use crate::query::{FieldKind, FieldReference, QueryError, QueryExecutor, QueryResult, QuerySpec};
use crate::transport::{segment, ApiRequest};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Metrics and dimensions of an explore's base table
#[derive(Debug, Clone)]
pub struct ExploreFields {
    pub metrics: Catalog<FieldReference>,
    pub dimensions: Catalog<FieldReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExploreRecord {
    name: String,
    #[serde(rename = "type")]
    explore_type: Option<String>,
    database_name: Option<String>,
    schema_name: Option<String>,
    label: Option<String>,
    description: Option<String>,
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExploreDetail {
    base_table: String,
    tables: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FieldRecord {
    name: String,
    label: Option<String>,
    description: Option<String>,
}

/// A named data source that queries run against
#[derive(Clone)]
pub struct Explore {
    name: String,
    explore_type: String,
    database_name: Option<String>,
    schema_name: Option<String>,
    label: Option<String>,
    description: Option<String>,
    executor: Option<QueryExecutor>,
    fields: Arc<OnceCell<ExploreFields>>,
}

impl Explore {
    /// Create an explore with no client; its queries cannot execute
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            explore_type: "default".to_string(),
            database_name: None,
            schema_name: None,
            label: None,
            description: None,
            executor: None,
            fields: Arc::new(OnceCell::new()),
        }
    }

    /// Parse one entry of the explore listing
    pub fn from_api(value: Value) -> QueryResult<Self> {
        let record: ExploreRecord = serde_json::from_value(value)?;
        if record.errors.is_some() {
            tracing::warn!(explore = %record.name, "Explore has errors");
        }

        let explore_type = record.explore_type.unwrap_or_else(|| {
            let fallback = if record.errors.is_some() { "error" } else { "default" };
            fallback.to_string()
        });

        Ok(Self {
            name: record.name,
            explore_type,
            database_name: record.database_name,
            schema_name: record.schema_name,
            label: record.label,
            description: record.description,
            executor: None,
            fields: Arc::new(OnceCell::new()),
        })
    }

    /// Attach the executor used for field listing and query execution
    pub fn bind(mut self, executor: QueryExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn explore_type(&self) -> &str {
        &self.explore_type
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.executor.is_some()
    }

    /// Start a query against this explore
    pub fn query(&self) -> QuerySpec {
        let spec = QuerySpec::new(self.name.clone());
        match &self.executor {
            Some(executor) => spec.bind(executor.clone()),
            None => spec,
        }
    }

    /// Metrics and dimensions, fetched once per explore
    pub async fn fields(&self) -> QueryResult<&ExploreFields> {
        self.fields.get_or_try_init(|| self.fetch_fields()).await
    }

    async fn fetch_fields(&self) -> QueryResult<ExploreFields> {
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| QueryError::NotBound(self.name.clone()))?;

        let path = format!(
            "/api/v1/projects/{}/explores/{}",
            segment(executor.project_uuid()),
            segment(&self.name)
        );
        let detail: ExploreDetail =
            serde_json::from_value(executor.transport().send(ApiRequest::get(path)).await?)?;

        let table = detail.tables.get(&detail.base_table).ok_or_else(|| {
            QueryError::Decode(format!(
                "base table '{}' missing from explore '{}'",
                detail.base_table, self.name
            ))
        })?;

        let fields = ExploreFields {
            metrics: Catalog::new("metric", self.parse_fields(table, "metrics", FieldKind::Metric)?),
            dimensions: Catalog::new(
                "dimension",
                self.parse_fields(table, "dimensions", FieldKind::Dimension)?,
            ),
        };

        tracing::debug!(
            explore = %self.name,
            metrics = fields.metrics.len(),
            dimensions = fields.dimensions.len(),
            "Loaded explore fields"
        );
        Ok(fields)
    }

    fn parse_fields(&self, table: &Value, key: &str, kind: FieldKind) -> QueryResult<Vec<FieldReference>> {
        let Some(Value::Object(entries)) = table.get(key) else {
            return Ok(Vec::new());
        };

        entries
            .values()
            .map(|entry| -> QueryResult<FieldReference> {
                let record: FieldRecord = serde_json::from_value(entry.clone())?;
                let mut field = FieldReference::new(kind, self.name.clone(), record.name);
                if let Some(label) = record.label {
                    field = field.label(label);
                }
                if let Some(description) = record.description {
                    field = field.description(description);
                }
                Ok(field)
            })
            .collect()
    }

    /// All metrics of the base table
    pub async fn list_metrics(&self) -> QueryResult<Vec<FieldReference>> {
        Ok(self.fields().await?.metrics.as_slice().to_vec())
    }

    /// All dimensions of the base table
    pub async fn list_dimensions(&self) -> QueryResult<Vec<FieldReference>> {
        Ok(self.fields().await?.dimensions.as_slice().to_vec())
    }

    /// Metric by name, with suggestions on a miss
    pub async fn metric(&self, name: &str) -> QueryResult<FieldReference> {
        self.fields().await?.metrics.require(name).cloned()
    }

    /// Dimension by name, with suggestions on a miss
    pub async fn dimension(&self, name: &str) -> QueryResult<FieldReference> {
        self.fields().await?.dimensions.require(name).cloned()
    }
}

impl Named for Explore {
    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Explore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explore")
            .field("name", &self.name)
            .field("type", &self.explore_type)
            .field("database_name", &self.database_name)
            .field("schema_name", &self.schema_name)
            .field("bound", &self.executor.is_some())
            .finish()
    }
}

impl std::fmt::Display for Explore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "Explore({}: {})", self.name, desc),
            None => write!(f, "Explore({})", self.name),
        }
    }
}
