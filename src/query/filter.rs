//! Filter model
//!
//! A [`FieldFilter`] is one predicate on one field. A [`FilterGroup`]
//! combines filters with AND or OR, one level deep.
//!
//! # Composition
//!
//! ```text
//! f1.and(f2)                 → AND [f1, f2]
//! f1.and(f2).and(f3)         → AND [f1, f2, f3]      (flattened)
//! AND[f1, f2].or(f3)         → AND [f1, f2, f3]      (receiver's aggregation)
//! ```
//!
//! Groups never nest through composition. Mixed AND/OR is folded into the
//! receiver's aggregation rather than distributed into a tree. A nested
//! group can still be built by hand, but it is rejected at serialization.

use super::error::{QueryError, QueryResult};
use super::field::{FieldArg, FieldReference};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::str::FromStr;

/// Filter operators accepted by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOperator {
    IsNull,
    IsNotNull,
    Is,
    Equals,
    IsNot,
    IsLessThan,
    IsGreaterThan,
    StartsWith,
    Includes,
    EndsWith,
    InTheLast,
    NotInTheLast,
    InTheNext,
    NotInTheNext,
    InTheCurrent,
    NotInTheCurrent,
    IsBefore,
    IsOnOrBefore,
    IsAfter,
    IsOnOrAfter,
    IsBetween,
}

impl FilterOperator {
    /// Every operator the server accepts
    pub const ALL: [FilterOperator; 21] = [
        Self::IsNull,
        Self::IsNotNull,
        Self::Is,
        Self::Equals,
        Self::IsNot,
        Self::IsLessThan,
        Self::IsGreaterThan,
        Self::StartsWith,
        Self::Includes,
        Self::EndsWith,
        Self::InTheLast,
        Self::NotInTheLast,
        Self::InTheNext,
        Self::NotInTheNext,
        Self::InTheCurrent,
        Self::NotInTheCurrent,
        Self::IsBefore,
        Self::IsOnOrBefore,
        Self::IsAfter,
        Self::IsOnOrAfter,
        Self::IsBetween,
    ];

    /// Operators meaningful for numeric fields
    pub const NUMERIC: &'static [FilterOperator] = &[
        Self::IsNull,
        Self::IsNotNull,
        Self::Is,
        Self::Equals,
        Self::IsNot,
        Self::IsLessThan,
        Self::IsGreaterThan,
    ];

    /// Operators meaningful for string fields
    pub const STRING: &'static [FilterOperator] = &[
        Self::IsNull,
        Self::IsNotNull,
        Self::Is,
        Self::Equals,
        Self::IsNot,
        Self::StartsWith,
        Self::Includes,
        Self::EndsWith,
    ];

    /// Operators meaningful for boolean fields
    pub const BOOLEAN: &'static [FilterOperator] =
        &[Self::IsNull, Self::IsNotNull, Self::Is, Self::Equals];

    /// Operators meaningful for date and timestamp fields
    pub const DATE: &'static [FilterOperator] = &[
        Self::IsNull,
        Self::IsNotNull,
        Self::Is,
        Self::Equals,
        Self::IsNot,
        Self::InTheLast,
        Self::NotInTheLast,
        Self::InTheNext,
        Self::NotInTheNext,
        Self::InTheCurrent,
        Self::NotInTheCurrent,
        Self::IsBefore,
        Self::IsOnOrBefore,
        Self::IsAfter,
        Self::IsOnOrAfter,
        Self::IsBetween,
    ];

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsNull => "is null",
            Self::IsNotNull => "is not null",
            Self::Is => "is",
            Self::Equals => "equals",
            Self::IsNot => "is not",
            Self::IsLessThan => "is less than",
            Self::IsGreaterThan => "is greater than",
            Self::StartsWith => "starts with",
            Self::Includes => "includes",
            Self::EndsWith => "ends with",
            Self::InTheLast => "in the last",
            Self::NotInTheLast => "not in the last",
            Self::InTheNext => "in the next",
            Self::NotInTheNext => "not in the next",
            Self::InTheCurrent => "in the current",
            Self::NotInTheCurrent => "not in the current",
            Self::IsBefore => "is before",
            Self::IsOnOrBefore => "is on or before",
            Self::IsAfter => "is after",
            Self::IsOnOrAfter => "is on or after",
            Self::IsBetween => "is between",
        }
    }

    /// False for the null checks, which take no operand
    pub fn takes_values(&self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }

    fn allowed_list() -> String {
        let mut names: Vec<&str> = Self::ALL.iter().map(|op| op.as_str()).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

impl FromStr for FilterOperator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| QueryError::InvalidOperator {
                operator: s.to_string(),
                allowed: Self::allowed_list(),
            })
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FilterOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A scalar filter operand
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilterValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&String> for FilterValue {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Filter operands, always a sequence
///
/// A bare scalar converts to a one-element sequence; a list converts as
/// given, order and duplicates preserved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterValues(Vec<FilterValue>);

impl FilterValues {
    /// No operands (null checks)
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Exactly one operand
    pub fn single(value: impl Into<FilterValue>) -> Self {
        Self(vec![value.into()])
    }

    pub fn as_slice(&self) -> &[FilterValue] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<FilterValue> {
        self.0
    }
}

impl From<FilterValue> for FilterValues {
    fn from(v: FilterValue) -> Self {
        Self(vec![v])
    }
}

impl From<&str> for FilterValues {
    fn from(v: &str) -> Self {
        Self::single(v)
    }
}

impl From<String> for FilterValues {
    fn from(v: String) -> Self {
        Self::single(v)
    }
}

impl From<i32> for FilterValues {
    fn from(v: i32) -> Self {
        Self::single(v)
    }
}

impl From<i64> for FilterValues {
    fn from(v: i64) -> Self {
        Self::single(v)
    }
}

impl From<f64> for FilterValues {
    fn from(v: f64) -> Self {
        Self::single(v)
    }
}

impl From<bool> for FilterValues {
    fn from(v: bool) -> Self {
        Self::single(v)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValues {
    fn from(values: Vec<T>) -> Self {
        values.into_iter().collect()
    }
}

impl<T: Into<FilterValue>, const N: usize> From<[T; N]> for FilterValues {
    fn from(values: [T; N]) -> Self {
        values.into_iter().collect()
    }
}

impl<T: Into<FilterValue>> FromIterator<T> for FilterValues {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A single predicate on one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    field: FieldReference,
    operator: FilterOperator,
    values: Vec<FilterValue>,
}

impl FieldFilter {
    /// Create a filter from a wire operator string
    ///
    /// Fails with `InvalidOperator` for an unknown operator and with
    /// `InvalidFieldType` when the field is a raw identifier.
    pub fn new(
        field: impl Into<FieldArg>,
        operator: &str,
        values: impl Into<FilterValues>,
    ) -> QueryResult<Self> {
        let operator = operator.parse::<FilterOperator>()?;
        let field = match field.into() {
            FieldArg::Reference(field) => field,
            FieldArg::Raw(id) => return Err(QueryError::InvalidFieldType(id)),
        };
        Ok(Self::with_operator(field, operator, values))
    }

    /// Create a filter from an already-typed operator
    pub fn with_operator(
        field: FieldReference,
        operator: FilterOperator,
        values: impl Into<FilterValues>,
    ) -> Self {
        Self {
            field,
            operator,
            values: values.into().into_vec(),
        }
    }

    pub fn field(&self) -> &FieldReference {
        &self.field
    }

    pub fn operator(&self) -> FilterOperator {
        self.operator
    }

    pub fn values(&self) -> &[FilterValue] {
        &self.values
    }

    /// Combine with AND
    pub fn and(self, other: impl Into<FilterNode>) -> FilterGroup {
        FilterGroup::from(self).combine(other.into(), Aggregation::And)
    }

    /// Combine with OR
    pub fn or(self, other: impl Into<FilterNode>) -> FilterGroup {
        FilterGroup::from(self).combine(other.into(), Aggregation::Or)
    }

    /// Wire shape: `{target: {fieldId}, operator, values}`
    pub fn to_wire(&self) -> FilterWire {
        FilterWire {
            target: FilterTarget {
                field_id: self.field.field_id(),
            },
            operator: self.operator,
            values: self.values.clone(),
        }
    }
}

/// Boolean aggregation of a filter group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    And,
    Or,
}

impl FromStr for Aggregation {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            other => Err(QueryError::InvalidOperator {
                operator: other.to_string(),
                allowed: "and, or".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

/// A member of a filter group
#[derive(Debug, Clone, PartialEq)]
pub enum FilterNode {
    Filter(FieldFilter),
    Group(FilterGroup),
}

impl From<FieldFilter> for FilterNode {
    fn from(filter: FieldFilter) -> Self {
        Self::Filter(filter)
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(group: FilterGroup) -> Self {
        Self::Group(group)
    }
}

/// A flat AND/OR combination of filters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterGroup {
    filters: Vec<FilterNode>,
    aggregation: Aggregation,
}

impl FilterGroup {
    /// Create a group from explicit members
    pub fn new(aggregation: Aggregation, filters: Vec<FilterNode>) -> Self {
        Self {
            filters,
            aggregation,
        }
    }

    /// AND group of the given filters
    pub fn all(filters: impl IntoIterator<Item = FieldFilter>) -> Self {
        Self::new(Aggregation::And, filters.into_iter().map(FilterNode::from).collect())
    }

    /// OR group of the given filters
    pub fn any(filters: impl IntoIterator<Item = FieldFilter>) -> Self {
        Self::new(Aggregation::Or, filters.into_iter().map(FilterNode::from).collect())
    }

    pub fn filters(&self) -> &[FilterNode] {
        &self.filters
    }

    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Combine with AND
    pub fn and(self, other: impl Into<FilterNode>) -> FilterGroup {
        self.combine(other.into(), Aggregation::And)
    }

    /// Combine with OR
    pub fn or(self, other: impl Into<FilterNode>) -> FilterGroup {
        self.combine(other.into(), Aggregation::Or)
    }

    /// Append `other` and keep one level
    ///
    /// An empty or single-filter receiver takes `op`; otherwise the
    /// receiver keeps its own aggregation. Incoming groups are flattened.
    fn combine(self, other: FilterNode, op: Aggregation) -> FilterGroup {
        let aggregation = if self.filters.len() <= 1 {
            op
        } else {
            self.aggregation
        };

        let mut filters = self.filters;
        match other {
            FilterNode::Group(group) => filters.extend(group.filters),
            node @ FilterNode::Filter(_) => filters.push(node),
        }

        FilterGroup {
            filters,
            aggregation,
        }
    }

    /// Append members keeping this group's aggregation
    pub(crate) fn extend(mut self, nodes: impl IntoIterator<Item = FilterNode>) -> FilterGroup {
        self.filters.extend(nodes);
        self
    }

    /// Lower to the wire shape `{dimensions: {and|or: [...]}}`
    ///
    /// Fails with `UnsupportedComposite` on a nested group and with
    /// `DuplicateFieldFilter` when two filters share a field id.
    pub fn to_wire(&self) -> QueryResult<FiltersWire> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.filters.len());

        for node in &self.filters {
            let filter = match node {
                FilterNode::Filter(filter) => filter,
                FilterNode::Group(_) => return Err(QueryError::UnsupportedComposite),
            };
            let field_id = filter.field.field_id();
            if !seen.insert(field_id.clone()) {
                return Err(QueryError::DuplicateFieldFilter(field_id));
            }
            out.push(filter.to_wire());
        }

        let group = match self.aggregation {
            Aggregation::And => GroupWire::And(out),
            Aggregation::Or => GroupWire::Or(out),
        };
        Ok(FiltersWire { dimensions: group })
    }
}

impl From<FieldFilter> for FilterGroup {
    fn from(filter: FieldFilter) -> Self {
        Self::new(Aggregation::And, vec![FilterNode::Filter(filter)])
    }
}

// ============================================
// Wire types
// ============================================

/// `filters` member of a query payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiltersWire {
    pub dimensions: GroupWire,
}

impl Default for FiltersWire {
    fn default() -> Self {
        Self {
            dimensions: GroupWire::And(Vec::new()),
        }
    }
}

/// Serializes as `{"and": [...]}` or `{"or": [...]}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupWire {
    And(Vec<FilterWire>),
    Or(Vec<FilterWire>),
}

/// One serialized filter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterWire {
    pub target: FilterTarget,
    pub operator: FilterOperator,
    pub values: Vec<FilterValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterTarget {
    #[serde(rename = "fieldId")]
    pub field_id: String,
}
