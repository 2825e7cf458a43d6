//! Sort specification

use super::field::FieldArg;
use serde::Serialize;

/// Ordering directive over one field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortSpec {
    field: FieldArg,
    descending: bool,
    nulls_first: Option<bool>,
}

impl SortSpec {
    /// Create a sort on a field reference or raw field id
    pub fn new(field: impl Into<FieldArg>, descending: bool) -> Self {
        Self {
            field: field.into(),
            descending,
            nulls_first: None,
        }
    }

    pub fn asc(field: impl Into<FieldArg>) -> Self {
        Self::new(field, false)
    }

    pub fn desc(field: impl Into<FieldArg>) -> Self {
        Self::new(field, true)
    }

    /// Place nulls first (`true`) or last (`false`). Unset defers to the server.
    pub fn nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = Some(nulls_first);
        self
    }

    pub fn field(&self) -> &FieldArg {
        &self.field
    }

    pub fn field_id(&self) -> String {
        self.field.field_id()
    }

    pub fn is_descending(&self) -> bool {
        self.descending
    }

    pub fn nulls_first_setting(&self) -> Option<bool> {
        self.nulls_first
    }

    pub fn to_wire(&self) -> SortWire {
        SortWire {
            field_id: self.field_id(),
            descending: self.descending,
            nulls_first: self.nulls_first,
        }
    }
}

impl std::fmt::Display for SortSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let direction = if self.descending { "DESC" } else { "ASC" };
        write!(f, "Sort({}, {}", self.field_id(), direction)?;
        if let Some(nulls_first) = self.nulls_first {
            write!(f, ", nulls_first={}", nulls_first)?;
        }
        write!(f, ")")
    }
}

/// One entry of the payload `sorts` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortWire {
    pub field_id: String,
    pub descending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nulls_first: Option<bool>,
}
