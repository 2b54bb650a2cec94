use thiserror::Error;

/// Error type for pgfetch operations
#[derive(Debug, Error)]
pub enum PgFetchError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Invalid connection config: {0}")]
    InvalidConfig(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column {column} is not {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },
}

impl PgFetchError {
    /// True when no session could be established (including a rejected config).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            PgFetchError::ConnectionFailed(_) | PgFetchError::InvalidConfig(_)
        )
    }

    /// True when the session was open but the statement failed or its rows
    /// could not be decoded.
    pub fn is_query_error(&self) -> bool {
        matches!(self, PgFetchError::QueryFailed(_))
    }
}

/// Result type alias for pgfetch operations
pub type Result<T> = std::result::Result<T, PgFetchError>;
