//! SQL Runner
//!
//! Runs raw SQL against the project's warehouse. The server either answers
//! inline or starts a scheduler job; jobs are polled at a fixed interval and
//! their rows are read from a JSON-lines results file.
//!
//! ```rust,ignore
//! let result = client.sql("SELECT * FROM orders", 100).await?;
//! println!("{} rows, columns {:?}", result.len(), result.columns());
//! ```

mod runner;

pub use runner::{SqlPollConfig, SqlResult, SqlRunner};
