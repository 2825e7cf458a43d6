//! Query builder
//!
//! [`QuerySpec`] is an immutable description of a metric query. Every
//! mutator returns a new spec, so a base query can be refined in several
//! directions without interference:
//!
//! ```rust,ignore
//! let base = orders.query().add_metrics([revenue.clone()]);
//! let usa = base.add_filter(country.equals("USA"));
//! let uk = base.add_filter(country.equals("UK"));
//!
//! let result = usa.set_limit(100)?.execute(&ExecuteOptions::default()).await?;
//! ```
//!
//! The first successful `execute` is cached on the spec it was called on.

use super::error::{QueryError, QueryResult};
use super::executor::{ExecuteOptions, QueryExecutor, Record};
use super::field::FieldArg;
use super::filter::{Aggregation, FilterGroup, FilterNode, FiltersWire};
use super::result::ResultSet;
use super::sort::{SortSpec, SortWire};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default row limit
pub const DEFAULT_LIMIT: u32 = 500;

/// Largest row limit the server accepts
pub const MAX_LIMIT: u32 = 50_000;

fn validate_limit(limit: u32) -> QueryResult<u32> {
    if (1..=MAX_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(QueryError::InvalidLimit(limit))
    }
}

/// Wire payload of a metric query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricQuery {
    pub explore_name: String,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub filters: FiltersWire,
    pub limit: u32,
    pub table_calculations: Vec<Value>,
    pub sorts: Vec<SortWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_dimensions: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_metrics: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Immutable metric query against one explore
#[derive(Debug)]
pub struct QuerySpec {
    explore: String,
    executor: Option<QueryExecutor>,
    metrics: Vec<FieldArg>,
    dimensions: Vec<FieldArg>,
    filters: Option<FilterGroup>,
    sorts: Vec<SortSpec>,
    limit: u32,
    table_calculations: Option<Vec<Value>>,
    custom_dimensions: Option<Vec<Value>>,
    additional_metrics: Option<Vec<Value>>,
    timezone: Option<String>,
    result: Mutex<Option<Arc<ResultSet>>>,
}

impl Clone for QuerySpec {
    /// Copies the query description; the copy starts with no cached result
    fn clone(&self) -> Self {
        Self {
            explore: self.explore.clone(),
            executor: self.executor.clone(),
            metrics: self.metrics.clone(),
            dimensions: self.dimensions.clone(),
            filters: self.filters.clone(),
            sorts: self.sorts.clone(),
            limit: self.limit,
            table_calculations: self.table_calculations.clone(),
            custom_dimensions: self.custom_dimensions.clone(),
            additional_metrics: self.additional_metrics.clone(),
            timezone: self.timezone.clone(),
            result: Mutex::new(None),
        }
    }
}

impl QuerySpec {
    /// Create an unbound query; `execute` fails until an executor is attached
    pub fn new(explore: impl Into<String>) -> Self {
        Self {
            explore: explore.into(),
            executor: None,
            metrics: Vec::new(),
            dimensions: Vec::new(),
            filters: None,
            sorts: Vec::new(),
            limit: DEFAULT_LIMIT,
            table_calculations: None,
            custom_dimensions: None,
            additional_metrics: None,
            timezone: None,
            result: Mutex::new(None),
        }
    }

    /// Attach the executor that will run this query
    pub fn bind(&self, executor: QueryExecutor) -> Self {
        Self {
            executor: Some(executor),
            ..self.clone()
        }
    }

    pub fn explore_name(&self) -> &str {
        &self.explore
    }

    pub fn is_bound(&self) -> bool {
        self.executor.is_some()
    }

    pub fn metrics(&self) -> &[FieldArg] {
        &self.metrics
    }

    pub fn dimensions(&self) -> &[FieldArg] {
        &self.dimensions
    }

    pub fn filters(&self) -> Option<&FilterGroup> {
        self.filters.as_ref()
    }

    pub fn sorts(&self) -> &[SortSpec] {
        &self.sorts
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Append metrics (references or raw field ids)
    pub fn add_metrics<F: Into<FieldArg>>(&self, metrics: impl IntoIterator<Item = F>) -> Self {
        let mut next = self.clone();
        next.metrics.extend(metrics.into_iter().map(Into::into));
        next
    }

    /// Append dimensions (references or raw field ids)
    pub fn add_dimensions<F: Into<FieldArg>>(&self, dimensions: impl IntoIterator<Item = F>) -> Self {
        let mut next = self.clone();
        next.dimensions.extend(dimensions.into_iter().map(Into::into));
        next
    }

    /// AND a filter or group into the query
    ///
    /// The first filter becomes a one-element AND group. A later bare filter
    /// joins the existing group under its aggregation; a later group is
    /// merged with the existing one under AND.
    pub fn add_filter(&self, filter: impl Into<FilterNode>) -> Self {
        let combined = match (self.filters.clone(), filter.into()) {
            (None, FilterNode::Filter(filter)) => FilterGroup::from(filter),
            (None, FilterNode::Group(group)) => group,
            (Some(existing), node @ FilterNode::Filter(_)) => existing.extend([node]),
            (Some(existing), FilterNode::Group(group)) => FilterGroup::new(
                Aggregation::And,
                existing
                    .filters()
                    .iter()
                    .chain(group.filters())
                    .cloned()
                    .collect(),
            ),
        };

        let mut next = self.clone();
        next.filters = Some(combined);
        next
    }

    /// Append sort directives
    pub fn add_sorts(&self, sorts: impl IntoIterator<Item = SortSpec>) -> Self {
        let mut next = self.clone();
        next.sorts.extend(sorts);
        next
    }

    /// Replace the row limit
    ///
    /// Fails with `InvalidLimit` outside `1..=50000`.
    pub fn set_limit(&self, limit: u32) -> QueryResult<Self> {
        let mut next = self.clone();
        next.limit = validate_limit(limit)?;
        Ok(next)
    }

    /// Table calculations, passed through to the payload as given
    pub fn with_table_calculations(&self, calculations: Vec<Value>) -> Self {
        let mut next = self.clone();
        next.table_calculations = Some(calculations);
        next
    }

    pub fn with_custom_dimensions(&self, dimensions: Vec<Value>) -> Self {
        let mut next = self.clone();
        next.custom_dimensions = Some(dimensions);
        next
    }

    pub fn with_additional_metrics(&self, metrics: Vec<Value>) -> Self {
        let mut next = self.clone();
        next.additional_metrics = Some(metrics);
        next
    }

    /// IANA timezone the server should evaluate dates in
    pub fn with_timezone(&self, timezone: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.timezone = Some(timezone.into());
        next
    }

    /// Lower the spec to its wire payload
    ///
    /// Fails when the filter group cannot be serialized.
    pub fn build_payload(&self) -> QueryResult<MetricQuery> {
        let filters = match &self.filters {
            Some(group) => group.to_wire()?,
            None => FiltersWire::default(),
        };

        Ok(MetricQuery {
            explore_name: self.explore.clone(),
            dimensions: self.dimensions.iter().map(FieldArg::field_id).collect(),
            metrics: self.metrics.iter().map(FieldArg::field_id).collect(),
            filters,
            limit: self.limit,
            table_calculations: self.table_calculations.clone().unwrap_or_default(),
            sorts: self.sorts.iter().map(SortSpec::to_wire).collect(),
            custom_dimensions: self.custom_dimensions.clone(),
            additional_metrics: self.additional_metrics.clone(),
            timezone: self.timezone.clone(),
        })
    }

    /// Run the query, or return the cached result
    ///
    /// With `invalidate_cache` set the server cache is bypassed and the new
    /// result replaces the cached one. Concurrent calls on one spec run one
    /// at a time.
    pub async fn execute(&self, options: &ExecuteOptions) -> QueryResult<Arc<ResultSet>> {
        let mut cached = self.result.lock().await;
        if !options.invalidate_cache {
            if let Some(result) = cached.as_ref() {
                return Ok(result.clone());
            }
        }

        validate_limit(self.limit)?;
        let executor = self
            .executor
            .as_ref()
            .ok_or_else(|| QueryError::NotBound(self.explore.clone()))?;
        let payload = self.build_payload()?;

        let result = Arc::new(executor.execute(&payload, options).await?);
        *cached = Some(result.clone());
        Ok(result)
    }

    /// Execute with default options and fetch every row
    pub async fn to_records(&self) -> QueryResult<Vec<Record>> {
        let result = self.execute(&ExecuteOptions::default()).await?;
        Ok(result.materialize_all().await?.to_vec())
    }
}

impl std::fmt::Display for QuerySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "QuerySpec(explore={}, metrics={}, dimensions={}, limit={})",
            self.explore,
            self.metrics.len(),
            self.dimensions.len(),
            self.limit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::field::FieldReference;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    fn revenue() -> FieldReference {
        FieldReference::metric("orders", "revenue").label("Revenue")
    }

    fn country() -> FieldReference {
        FieldReference::dimension("orders", "country").label("Country")
    }

    fn status() -> FieldReference {
        FieldReference::dimension("orders", "status")
    }

    fn ready_mock() -> Arc<MockTransport> {
        Arc::new(
            MockTransport::new()
                .with_response(json!({"queryUuid": "abc", "fields": {}}))
                .with_response(json!({"status": "ready", "rows": [{"orders_country": "USA"}]}))
                .with_response(json!({"queryUuid": "def", "fields": {}}))
                .with_response(json!({"status": "ready", "rows": [{"orders_country": "UK"}]})),
        )
    }

    fn bound(mock: &Arc<MockTransport>) -> QuerySpec {
        QuerySpec::new("orders").bind(QueryExecutor::new(mock.clone(), "proj"))
    }

    #[test]
    fn test_mutators_leave_base_unchanged() {
        let base = QuerySpec::new("orders").add_metrics([revenue()]);

        let with_dim = base.add_dimensions([country()]);
        let with_filter = base.add_filter(country().equals("USA"));
        let limited = base.set_limit(10).unwrap();

        assert_eq!(base.metrics().len(), 1);
        assert!(base.dimensions().is_empty());
        assert!(base.filters().is_none());
        assert_eq!(base.limit(), DEFAULT_LIMIT);

        assert_eq!(with_dim.dimensions().len(), 1);
        assert!(with_dim.filters().is_none());
        assert!(with_filter.dimensions().is_empty());
        assert_eq!(with_filter.filters().map(FilterGroup::len), Some(1));
        assert_eq!(limited.limit(), 10);
    }

    #[test]
    fn test_sibling_filters_do_not_cross() {
        let base = QuerySpec::new("orders").add_filter(status().equals("active"));
        let usa = base.add_filter(country().equals("USA"));
        let uk = base.add_filter(country().equals("UK"));

        assert_eq!(base.filters().map(FilterGroup::len), Some(1));
        assert_eq!(usa.filters().map(FilterGroup::len), Some(2));
        assert_eq!(uk.filters().map(FilterGroup::len), Some(2));

        let usa_payload = serde_json::to_value(usa.build_payload().unwrap()).unwrap();
        let uk_payload = serde_json::to_value(uk.build_payload().unwrap()).unwrap();
        assert_eq!(usa_payload["filters"]["dimensions"]["and"][1]["values"], json!(["USA"]));
        assert_eq!(uk_payload["filters"]["dimensions"]["and"][1]["values"], json!(["UK"]));
    }

    #[test]
    fn test_default_payload() {
        let spec = QuerySpec::new("orders")
            .add_metrics([revenue()])
            .add_dimensions(["orders_country"]);

        let payload = serde_json::to_value(spec.build_payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            json!({
                "exploreName": "orders",
                "dimensions": ["orders_country"],
                "metrics": ["orders_revenue"],
                "filters": {"dimensions": {"and": []}},
                "limit": 500,
                "tableCalculations": [],
                "sorts": []
            })
        );
    }

    #[test]
    fn test_payload_extensions() {
        let spec = QuerySpec::new("orders")
            .add_metrics([revenue()])
            .add_sorts([revenue().desc(), SortSpec::asc("orders_country").nulls_first(false)])
            .with_table_calculations(vec![json!({"name": "share"})])
            .with_custom_dimensions(vec![json!({"id": "bucket"})])
            .with_additional_metrics(vec![json!({"name": "avg_price"})])
            .with_timezone("Europe/Paris");

        let payload = serde_json::to_value(spec.build_payload().unwrap()).unwrap();
        assert_eq!(
            payload["sorts"],
            json!([
                {"fieldId": "orders_revenue", "descending": true},
                {"fieldId": "orders_country", "descending": false, "nullsFirst": false}
            ])
        );
        assert_eq!(payload["tableCalculations"], json!([{"name": "share"}]));
        assert_eq!(payload["customDimensions"], json!([{"id": "bucket"}]));
        assert_eq!(payload["additionalMetrics"], json!([{"name": "avg_price"}]));
        assert_eq!(payload["timezone"], json!("Europe/Paris"));
    }

    #[test]
    fn test_add_filter_accumulates() {
        let spec = QuerySpec::new("orders")
            .add_filter(country().equals("USA"))
            .add_filter(status().equals("active"));

        let group = spec.filters().unwrap();
        assert_eq!(group.aggregation(), Aggregation::And);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_add_filter_keeps_or_for_bare_filter() {
        let ors = country().equals("USA").or(status().is_null());
        let spec = QuerySpec::new("orders")
            .add_filter(ors)
            .add_filter(revenue().greater_than(10));

        let group = spec.filters().unwrap();
        assert_eq!(group.aggregation(), Aggregation::Or);
        assert_eq!(group.len(), 3);
    }

    #[test]
    fn test_add_filter_merges_groups_with_and() {
        let ors = country().equals("USA").or(status().is_null());
        let spec = QuerySpec::new("orders")
            .add_filter(ors)
            .add_filter(revenue().greater_than(10).and(revenue().less_than(100)));

        let group = spec.filters().unwrap();
        assert_eq!(group.aggregation(), Aggregation::And);
        assert_eq!(group.len(), 4);
    }

    #[test]
    fn test_duplicate_filter_fails_payload() {
        let spec = QuerySpec::new("orders")
            .add_filter(country().equals("USA"))
            .add_filter(country().equals("UK"));

        assert!(matches!(spec.build_payload(), Err(QueryError::DuplicateFieldFilter(_))));
    }

    #[test]
    fn test_limit_bounds() {
        let spec = QuerySpec::new("orders");
        assert!(matches!(spec.set_limit(0), Err(QueryError::InvalidLimit(0))));
        assert!(matches!(spec.set_limit(50_001), Err(QueryError::InvalidLimit(50_001))));
        assert_eq!(spec.set_limit(1).unwrap().limit(), 1);
        assert_eq!(spec.set_limit(50_000).unwrap().limit(), 50_000);
    }

    #[tokio::test]
    async fn test_unbound_execute() {
        let err = QuerySpec::new("orders")
            .add_metrics([revenue()])
            .execute(&ExecuteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::NotBound(name) if name == "orders"));
    }

    #[tokio::test]
    async fn test_execute_caches_result() {
        let mock = ready_mock();
        let spec = bound(&mock).add_dimensions([country()]);

        let first = spec.execute(&ExecuteOptions::default()).await.unwrap();
        let second = spec.execute(&ExecuteOptions::default()).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.job_id(), "abc");
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_cache_replaces_result() {
        let mock = ready_mock();
        let spec = bound(&mock);

        let first = spec.execute(&ExecuteOptions::default()).await.unwrap();
        let fresh = spec
            .execute(&ExecuteOptions::default().invalidate_cache(true))
            .await
            .unwrap();
        let cached = spec.execute(&ExecuteOptions::default()).await.unwrap();

        assert_eq!(first.job_id(), "abc");
        assert_eq!(fresh.job_id(), "def");
        assert!(Arc::ptr_eq(&fresh, &cached));

        let requests = mock.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[2].request.body.as_ref().unwrap()["invalidateCache"], true);
    }

    #[tokio::test]
    async fn test_derived_spec_has_own_cache() {
        let mock = ready_mock();
        let spec = bound(&mock);

        let first = spec.execute(&ExecuteOptions::default()).await.unwrap();
        let derived = spec.with_timezone("UTC");
        let other = derived.execute(&ExecuteOptions::default()).await.unwrap();

        assert_eq!(first.job_id(), "abc");
        assert_eq!(other.job_id(), "def");
    }

    #[tokio::test]
    async fn test_concurrent_execute_submits_once() {
        let mock = ready_mock();
        let spec = bound(&mock);

        let opts_a = ExecuteOptions::default();
        let opts_b = ExecuteOptions::default();
        let (a, b) = tokio::join!(spec.execute(&opts_a), spec.execute(&opts_b));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_to_records() {
        let mock = ready_mock();
        let records = bound(&mock).to_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["orders_country"], "USA");
    }
}
