//! Field references
//!
//! A [`FieldReference`] names one queryable column of an explore. Filters
//! and sorts are built from it with plainly named methods:
//!
//! ```rust,ignore
//! let country = FieldReference::dimension("orders", "country");
//! let usa = country.equals("USA");
//! let big = revenue.greater_than(1000);
//! let by_revenue = revenue.desc();
//! ```

use super::filter::{FieldFilter, FilterOperator, FilterValue, FilterValues};
use super::sort::SortSpec;
use serde::{Deserialize, Serialize};

/// Whether a field is aggregated (metric) or grouped by (dimension)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Metric,
    Dimension,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metric => write!(f, "metric"),
            Self::Dimension => write!(f, "dimension"),
        }
    }
}

/// A metric or dimension of an explore
///
/// Equality and hashing compare every attribute, so two references with the
/// same field id but different labels are distinct values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldReference {
    kind: FieldKind,
    container: String,
    name: String,
    label: Option<String>,
    description: Option<String>,
}

impl FieldReference {
    /// Create a reference to a field of the given kind
    pub fn new(kind: FieldKind, container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            container: container.into(),
            name: name.into(),
            label: None,
            description: None,
        }
    }

    /// Create a metric reference
    pub fn metric(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(FieldKind::Metric, container, name)
    }

    /// Create a dimension reference
    pub fn dimension(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(FieldKind::Dimension, container, name)
    }

    /// Set the display label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Name of the explore this field belongs to
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_text(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Canonical wire identifier: `<container>_<name>`
    pub fn field_id(&self) -> String {
        format!("{}_{}", self.container, self.name)
    }

    /// Label if set, otherwise the bare name
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    fn filter(&self, operator: FilterOperator, values: impl Into<FilterValues>) -> FieldFilter {
        FieldFilter::with_operator(self.clone(), operator, values)
    }

    /// `field equals value` (a list means "any of")
    pub fn equals(&self, values: impl Into<FilterValues>) -> FieldFilter {
        self.filter(FilterOperator::Equals, values)
    }

    /// `field is not value`
    pub fn not_equals(&self, values: impl Into<FilterValues>) -> FieldFilter {
        self.filter(FilterOperator::IsNot, values)
    }

    pub fn greater_than(&self, value: impl Into<FilterValue>) -> FieldFilter {
        self.filter(FilterOperator::IsGreaterThan, FilterValues::single(value))
    }

    pub fn less_than(&self, value: impl Into<FilterValue>) -> FieldFilter {
        self.filter(FilterOperator::IsLessThan, FilterValues::single(value))
    }

    /// Match any of the given values
    pub fn is_in<V: Into<FilterValue>>(&self, values: impl IntoIterator<Item = V>) -> FieldFilter {
        self.filter(FilterOperator::Equals, FilterValues::from_iter(values))
    }

    /// Match none of the given values
    pub fn not_in<V: Into<FilterValue>>(&self, values: impl IntoIterator<Item = V>) -> FieldFilter {
        self.filter(FilterOperator::IsNot, FilterValues::from_iter(values))
    }

    /// Substring match
    pub fn contains(&self, value: impl Into<String>) -> FieldFilter {
        self.filter(FilterOperator::Includes, FilterValue::String(value.into()))
    }

    pub fn starts_with(&self, value: impl Into<String>) -> FieldFilter {
        self.filter(FilterOperator::StartsWith, FilterValue::String(value.into()))
    }

    pub fn ends_with(&self, value: impl Into<String>) -> FieldFilter {
        self.filter(FilterOperator::EndsWith, FilterValue::String(value.into()))
    }

    pub fn is_null(&self) -> FieldFilter {
        self.filter(FilterOperator::IsNull, FilterValues::empty())
    }

    pub fn is_not_null(&self) -> FieldFilter {
        self.filter(FilterOperator::IsNotNull, FilterValues::empty())
    }

    /// Date strictly before `value`
    pub fn before(&self, value: impl Into<FilterValue>) -> FieldFilter {
        self.filter(FilterOperator::IsBefore, FilterValues::single(value))
    }

    pub fn on_or_before(&self, value: impl Into<FilterValue>) -> FieldFilter {
        self.filter(FilterOperator::IsOnOrBefore, FilterValues::single(value))
    }

    /// Date strictly after `value`
    pub fn after(&self, value: impl Into<FilterValue>) -> FieldFilter {
        self.filter(FilterOperator::IsAfter, FilterValues::single(value))
    }

    pub fn on_or_after(&self, value: impl Into<FilterValue>) -> FieldFilter {
        self.filter(FilterOperator::IsOnOrAfter, FilterValues::single(value))
    }

    /// Inclusive date range
    pub fn between(&self, start: impl Into<FilterValue>, end: impl Into<FilterValue>) -> FieldFilter {
        let values: Vec<FilterValue> = vec![start.into(), end.into()];
        self.filter(FilterOperator::IsBetween, values)
    }

    /// Ascending sort on this field
    pub fn asc(&self) -> SortSpec {
        SortSpec::asc(self.clone())
    }

    /// Descending sort on this field
    pub fn desc(&self) -> SortSpec {
        SortSpec::desc(self.clone())
    }
}

impl std::fmt::Display for FieldReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            FieldKind::Metric => "Metric",
            FieldKind::Dimension => "Dimension",
        };
        match &self.description {
            Some(desc) => write!(f, "{}({}: {})", kind, self.name, desc),
            None => write!(f, "{}({})", kind, self.name),
        }
    }
}

/// A field given either as a reference or as a raw wire identifier
///
/// Metrics, dimensions and sorts accept both. Filters require a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldArg {
    Reference(FieldReference),
    Raw(String),
}

impl FieldArg {
    /// Wire identifier for this field
    pub fn field_id(&self) -> String {
        match self {
            Self::Reference(field) => field.field_id(),
            Self::Raw(id) => id.clone(),
        }
    }
}

impl From<FieldReference> for FieldArg {
    fn from(field: FieldReference) -> Self {
        Self::Reference(field)
    }
}

impl From<&FieldReference> for FieldArg {
    fn from(field: &FieldReference) -> Self {
        Self::Reference(field.clone())
    }
}

impl From<&str> for FieldArg {
    fn from(id: &str) -> Self {
        Self::Raw(id.to_string())
    }
}

impl From<String> for FieldArg {
    fn from(id: String) -> Self {
        Self::Raw(id)
    }
}
