//! Neo4j connection management and shared graph client.

use irgraph_core::config::Neo4jSettings;
use neo4rs::{ConfigBuilder, Graph, Query, Row, Txn};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Failed to decode result row: {0}")]
    Conversion(String),
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self::from(&Neo4jSettings::default())
    }
}

impl From<&Neo4jSettings> for GraphConfig {
    fn from(settings: &Neo4jSettings) -> Self {
        Self {
            uri: settings.uri(),
            user: settings.user.clone(),
            password: settings.password.clone(),
            max_connections: settings.max_connections,
            fetch_size: settings.fetch_size,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a query without collecting results.
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Execute a query inside a transaction that is always rolled back and
    /// collect at most `limit` rows. Nothing the query writes is kept.
    pub async fn query_rows_read_only(
        &self,
        query: Query,
        limit: usize,
    ) -> Result<Vec<Row>, GraphError> {
        let mut txn = self.graph.start_txn().await?;
        let rows = collect_rows(&mut txn, query, limit).await;
        match txn.rollback().await {
            Ok(()) => rows,
            Err(e) if rows.is_ok() => Err(e.into()),
            Err(e) => {
                tracing::debug!(error = %e, "Rollback after failed read");
                rows
            }
        }
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }
}

async fn collect_rows(txn: &mut Txn, query: Query, limit: usize) -> Result<Vec<Row>, GraphError> {
    let mut stream = txn.execute(query).await?;
    let mut rows = Vec::new();
    while rows.len() < limit {
        match stream.next(txn.handle()).await? {
            Some(row) => rows.push(row),
            None => break,
        }
    }
    Ok(rows)
}
