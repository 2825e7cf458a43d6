//! Catalog
//!
//! Name-keyed listings of server entities:
//!
//! - **Explore**: a queryable data source and its metrics and dimensions
//! - **Catalog**: lookup by name with "did you mean" suggestions on a miss
//!
//! ```rust,ignore
//! let orders = client.explore("orders").await?;
//! let revenue = orders.metric("revenue").await?;
//! let country = orders.dimension("country").await?;
//! ```

mod explore;
mod suggest;

pub use explore::{Explore, ExploreFields};
pub use suggest::{similarity, suggest, MAX_SUGGESTIONS, SIMILARITY_CUTOFF};

use crate::query::{FieldReference, QueryError, QueryResult};

/// Anything a catalog can index by name
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for FieldReference {
    fn name(&self) -> &str {
        FieldReference::name(self)
    }
}

/// Outcome of a catalog lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound {
        name: String,
        suggestions: Vec<String>,
    },
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound { .. } => None,
        }
    }

    /// Convert a miss into `UnknownEntity` for the given entity kind
    pub fn into_result(self, kind: &'static str) -> QueryResult<T> {
        match self {
            Lookup::Found(value) => Ok(value),
            Lookup::NotFound { name, suggestions } => Err(QueryError::UnknownEntity {
                kind,
                name,
                suggestions,
            }),
        }
    }
}

/// Ordered, name-indexed collection of one kind of entity
#[derive(Debug, Clone)]
pub struct Catalog<T> {
    kind: &'static str,
    entries: Vec<T>,
}

impl<T: Named> Catalog<T> {
    /// `kind` names the entity in error messages ("explore", "metric", ...)
    pub fn new(kind: &'static str, entries: Vec<T>) -> Self {
        Self { kind, entries }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn get(&self, name: &str) -> Lookup<&T> {
        match self.entries.iter().find(|entry| entry.name() == name) {
            Some(entry) => Lookup::Found(entry),
            None => Lookup::NotFound {
                name: name.to_string(),
                suggestions: suggest(name, self.names()),
            },
        }
    }

    /// Like [`get`](Self::get), failing with `UnknownEntity` on a miss
    pub fn require(&self, name: &str) -> QueryResult<&T> {
        self.get(name).into_result(self.kind)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Named::name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a Catalog<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
