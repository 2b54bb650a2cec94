use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::types::{RawQueryResult, SqlValue};

/// Opens database sessions.
/// Connectors are shared between invocations and must not hand out the same
/// session twice.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a fresh session described by `config`.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>>;
}

/// A live session, owned by exactly one invocation.
///
/// Implementations are responsible for:
/// - Converting SqlValue parameters to native types
/// - Executing statements and converting results to RawQueryResult
/// - Releasing the session on `close`, or on drop if `close` never ran
#[async_trait]
pub trait Connection: Send {
    /// Run a statement that returns rows.
    /// Parameters use PostgreSQL-style placeholders ($1, $2, etc.)
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult>;

    /// Run a statement and return the number of rows it affected.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Gracefully end the session.
    async fn close(&mut self) -> Result<()>;
}
