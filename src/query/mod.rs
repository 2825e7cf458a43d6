//! Query Layer
//!
//! Describes metric queries and runs them as server-side jobs:
//!
//! - **Field**: references to metrics and dimensions, with filter and sort helpers
//! - **Filter**: single-field predicates and flat AND/OR groups
//! - **Sort**: ordering directives
//! - **Builder**: the immutable [`QuerySpec`] and its wire payload
//! - **Executor**: submit, poll with backoff, fetch pages, cancel
//! - **Result**: lazy, cacheable access to the rows of a finished job
//!
//! # Examples
//!
//! ```rust,ignore
//! use lightquery::query::{ExecuteOptions, FieldReference};
//!
//! let revenue = FieldReference::metric("orders", "revenue");
//! let country = FieldReference::dimension("orders", "country");
//!
//! let query = orders
//!     .query()
//!     .add_metrics([revenue.clone()])
//!     .add_dimensions([country.clone()])
//!     .add_filter(country.equals("USA").or(country.equals("UK")))
//!     .add_sorts([revenue.desc()])
//!     .set_limit(100)?;
//!
//! let result = query.execute(&ExecuteOptions::default()).await?;
//! for row in result.materialize_all().await? {
//!     println!("{:?}", row);
//! }
//! ```

mod builder;
mod error;
mod executor;
mod field;
mod filter;
mod result;
mod sort;

pub use builder::{MetricQuery, QuerySpec, DEFAULT_LIMIT, MAX_LIMIT};
pub use error::{QueryError, QueryResult};
pub use executor::{
    ExecuteOptions, JobStatus, PageResponse, PollConfig, QueryExecutor, Record, ResultPage,
    SubmittedQuery, DEFAULT_PAGE_SIZE, DEFAULT_QUERY_TIMEOUT,
};
pub use field::{FieldArg, FieldKind, FieldReference};
pub use filter::{
    Aggregation, FieldFilter, FilterGroup, FilterNode, FilterOperator, FilterValue, FilterValues,
    FiltersWire,
};
pub use result::{FieldLabels, ResultSet};
pub use sort::SortSpec;
