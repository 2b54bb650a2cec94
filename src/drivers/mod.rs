mod numeric;
mod tokio_postgres;

pub use self::in_memory_test::{
    InMemoryConnector, InMemoryResponse, InMemoryTestResponseBuilder, RecordedQuery,
};
pub use self::tokio_postgres::{TokioPostgresConnection, TokioPostgresConnector};
