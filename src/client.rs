//! Client
//!
//! Entry point binding a transport to one project. Hands out executors,
//! SQL runners and explores that share the same transport.
//!
//! ```rust,ignore
//! let config = Config::load_default();
//! let client = Client::from_config(&config)?;
//!
//! let orders = client.explore("orders").await?;
//! let result = orders
//!     .query()
//!     .add_metrics([orders.metric("revenue").await?])
//!     .execute(&config.query.execute_options())
//!     .await?;
//! ```

use crate::catalog::{Catalog, Explore};
use crate::config::{Config, ConfigError};
use crate::query::{PollConfig, QueryError, QueryExecutor, QueryResult};
use crate::sql::{SqlPollConfig, SqlResult, SqlRunner};
use crate::transport::{segment, ApiRequest, HttpTransport, Transport};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Connection to one project of the analytics server
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    project_uuid: String,
    poll: PollConfig,
    sql_poll: SqlPollConfig,
    explores: Arc<OnceCell<Catalog<Explore>>>,
}

impl Client {
    /// Create a client over any transport
    pub fn new(transport: Arc<dyn Transport>, project_uuid: impl Into<String>) -> Self {
        Self {
            transport,
            project_uuid: project_uuid.into(),
            poll: PollConfig::default(),
            sql_poll: SqlPollConfig::default(),
            explores: Arc::new(OnceCell::new()),
        }
    }

    /// Create an HTTP client from loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let project_uuid = config.project_uuid()?.to_string();
        let transport = HttpTransport::new(config.client.transport_config())?;

        tracing::info!(url = %config.client.url, project = %project_uuid, "Client configured");

        Ok(Self::new(Arc::new(transport), project_uuid)
            .with_poll_config(config.query.poll_config())
            .with_sql_poll_config(config.sql_runner.poll_config()))
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_sql_poll_config(mut self, poll: SqlPollConfig) -> Self {
        self.sql_poll = poll;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn project_uuid(&self) -> &str {
        &self.project_uuid
    }

    /// Metric query executor for this project
    pub fn executor(&self) -> QueryExecutor {
        QueryExecutor::new(self.transport.clone(), self.project_uuid.clone())
            .with_poll_config(self.poll.clone())
    }

    /// Raw SQL runner for this project
    pub fn sql_runner(&self) -> SqlRunner {
        SqlRunner::new(self.transport.clone(), self.project_uuid.clone())
            .with_poll_config(self.sql_poll.clone())
    }

    /// Run raw SQL and load every row
    pub async fn sql(&self, sql: &str, limit: u32) -> QueryResult<SqlResult> {
        self.sql_runner().execute(sql, limit).await
    }

    /// All explores of the project, fetched once per client
    pub async fn explores(&self) -> QueryResult<&Catalog<Explore>> {
        self.explores.get_or_try_init(|| self.fetch_explores()).await
    }

    async fn fetch_explores(&self) -> QueryResult<Catalog<Explore>> {
        let path = format!("/api/v1/projects/{}/explores", segment(&self.project_uuid));
        let listing = self.transport.send(ApiRequest::get(path)).await?;

        let Value::Array(entries) = listing else {
            return Err(QueryError::Decode("explore listing is not an array".to_string()));
        };

        let executor = self.executor();
        let explores = entries
            .into_iter()
            .map(|entry| -> QueryResult<Explore> {
                Ok(Explore::from_api(entry)?.bind(executor.clone()))
            })
            .collect::<QueryResult<Vec<_>>>()?;

        tracing::debug!(project = %self.project_uuid, count = explores.len(), "Loaded explores");
        Ok(Catalog::new("explore", explores))
    }

    /// One explore by name, with suggestions on a miss
    pub async fn explore(&self, name: &str) -> QueryResult<Explore> {
        self.explores().await?.require(name).cloned()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("project_uuid", &self.project_uuid)
            .field("poll", &self.poll)
            .field("sql_poll", &self.sql_poll)
            .finish()
    }
}
