//! # lightquery
//!
//! Async query client for semantic-layer analytics APIs: describe a metric
//! query, run it as a server-side job, and page through the results.
//!
//! ## Features
//!
//! - **Immutable query builder**: every refinement returns a new query
//! - **Typed filters and sorts**: built from field references with plain methods
//! - **Job execution**: submit, poll with capped exponential backoff, cancel
//! - **Lazy results**: pages fetched on demand as streams, full rows cached once
//! - **Catalog lookup**: explores, metrics and dimensions with typo suggestions
//! - **Raw SQL**: run warehouse SQL through the same client
//!
//! ## Modules
//!
//! - [`query`]: field, filter and sort model, query builder, executor, result set
//! - [`catalog`]: explores and name lookup
//! - [`sql`]: raw SQL runner
//! - [`transport`]: the request primitive and its HTTP implementation
//! - [`config`]: TOML/env configuration and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lightquery::{Client, Config, ExecuteOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     lightquery::config::init_logging(&config.logging)?;
//!     let client = Client::from_config(&config)?;
//!
//!     let orders = client.explore("orders").await?;
//!     let revenue = orders.metric("revenue").await?;
//!     let country = orders.dimension("country").await?;
//!
//!     let query = orders
//!         .query()
//!         .add_metrics([revenue.clone()])
//!         .add_dimensions([country.clone()])
//!         .add_filter(country.is_in(["USA", "UK"]))
//!         .add_sorts([revenue.desc()])
//!         .set_limit(100)?;
//!
//!     let result = query.execute(&ExecuteOptions::default()).await?;
//!     println!("{} rows", result.row_count());
//!
//!     for row in result.materialize_all().await? {
//!         println!("{:?}", row);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod query;
pub mod results;
pub mod sql;
pub mod transport;

// Re-export top-level types for convenience
pub use client::Client;

pub use query::{
    Aggregation, ExecuteOptions, FieldArg, FieldFilter, FieldKind, FieldReference, FilterGroup,
    FilterOperator, FilterValue, QueryError, QueryExecutor, QueryResult, QuerySpec, Record,
    ResultSet, SortSpec,
};

pub use catalog::{Catalog, Explore, Lookup};

pub use sql::{SqlResult, SqlRunner};

pub use results::RecordSet;

pub use transport::{ApiRequest, HttpTransport, Transport, TransportConfig, TransportError};

pub use config::{Config, ConfigError, LoggingConfig};
