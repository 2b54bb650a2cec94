use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::drivers::TokioPostgresConnector;
use crate::error::Result;
use crate::traits::{Connection, Connector};
use crate::types::{Query, Row};

/// Runs one statement per call on a connection opened for that call alone.
///
/// Every successful connect is paired with exactly one release, whether the
/// statement succeeds, fails, or the returned future is dropped midway.
/// Connections are never pooled or reused.
#[derive(Clone)]
pub struct QueryExecutor {
    connector: Arc<dyn Connector>,
}

impl QueryExecutor {
    /// Executor backed by a real PostgreSQL connection.
    pub fn new() -> Self {
        Self::with_connector(Arc::new(TokioPostgresConnector))
    }

    /// Create a new executor with a custom connector.
    /// Useful for testing or using alternative database drivers.
    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Run `query` and return its first row in server order, or `None` when
    /// it matched nothing.
    ///
    /// # Example
    /// ```ignore
    /// let config = ConnectionConfig::new("localhost", 5432, "postgres", "postgres", "user");
    /// let query = Query::new("SELECT * FROM users WHERE email = $1").bind("user3@example.com");
    /// let user = QueryExecutor::new().fetch_one(&config, &query).await?;
    /// ```
    pub async fn fetch_one(&self, config: &ConnectionConfig, query: &Query) -> Result<Option<Row>> {
        let mut scoped = self.open(config).await?;
        debug!(sql = %query.sql, params = query.params.len(), "Running query");
        let outcome = scoped.conn.query(&query.sql, &query.params).await;
        scoped.release().await;
        outcome?.into_first_row()
    }

    /// Run a statement that returns no rows (DDL, INSERT, UPDATE, ...) and
    /// return the number of rows it affected.
    pub async fn execute(&self, config: &ConnectionConfig, query: &Query) -> Result<u64> {
        let mut scoped = self.open(config).await?;
        debug!(sql = %query.sql, params = query.params.len(), "Executing statement");
        let outcome = scoped.conn.execute(&query.sql, &query.params).await;
        scoped.release().await;
        outcome
    }

    async fn open(&self, config: &ConnectionConfig) -> Result<ScopedConnection> {
        config.validate()?;
        let target = config.display_string();
        debug!(db = %target, "Connecting");
        let conn = self.connector.connect(config).await?;
        Ok(ScopedConnection {
            conn,
            target,
            released: false,
        })
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection owned by a single call.
/// If `release` never runs, dropping the inner connection releases it instead.
struct ScopedConnection {
    conn: Box<dyn Connection>,
    target: String,
    released: bool,
}

impl ScopedConnection {
    /// Close the connection. A failed close is logged, never returned, so it
    /// cannot replace the statement's own outcome.
    async fn release(mut self) {
        self.released = true;
        match self.conn.close().await {
            Ok(()) => debug!(db = %self.target, "Connection released"),
            Err(e) => warn!(db = %self.target, error = %e, "Failed to close connection cleanly"),
        }
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if !self.released {
            debug!(db = %self.target, "Connection dropped before release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{InMemoryConnector, InMemoryTestResponseBuilder};
    use crate::error::PgFetchError;
    use crate::types::SqlValue;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("localhost", 5432, "postgres", "postgres", "user")
    }

    #[tokio::test]
    async fn test_invalid_config_never_connects() {
        let connector = Arc::new(InMemoryConnector::new());
        let executor = QueryExecutor::with_connector(connector.clone());
        let bad = ConnectionConfig::new("localhost", 0, "postgres", "postgres", "user");

        let err = executor
            .fetch_one(&bad, &Query::new("SELECT 1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PgFetchError::InvalidConfig(_)));
        assert_eq!(connector.opened_count(), 0);
        connector.assert_query_count(0);
    }

    #[tokio::test]
    async fn test_close_error_does_not_mask_result() {
        let connector = Arc::new(
            InMemoryConnector::new()
                .with_response(
                    InMemoryTestResponseBuilder::new()
                        .columns(&["id"])
                        .row(&[SqlValue::Int32(1)])
                        .build(),
                )
                .with_close_error("broken pipe"),
        );
        let executor = QueryExecutor::with_connector(connector.clone());

        let row = executor
            .fetch_one(&config(), &Query::new("SELECT id FROM users"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(row.get_i32("id").unwrap(), 1);
        connector.assert_all_released();
    }

    #[tokio::test]
    async fn test_unreleased_guard_releases_on_drop() {
        let connector = Arc::new(InMemoryConnector::new());
        let executor = QueryExecutor::with_connector(connector.clone());
        let mut scoped = executor.open(&config()).await.unwrap();
        scoped.conn.query("SELECT 1", &[]).await.unwrap();
        drop(scoped);

        assert_eq!(connector.opened_count(), 1);
        connector.assert_all_released();
    }
}
