//! pgfetch - run one parameterized PostgreSQL query on a connection that is
//! always released
//!
//! # Example
//! ```ignore
//! use pgfetch::{ConnectionConfig, Query, QueryExecutor};
//!
//! let config = ConnectionConfig::new("localhost", 5432, "postgres", "postgres", "user");
//! let query = Query::new("SELECT * FROM users WHERE email = $1").bind("user3@example.com");
//!
//! match QueryExecutor::new().fetch_one(&config, &query).await? {
//!     Some(row) => println!("found {}", row.get_str("username")?),
//!     None => println!("no user with that email"),
//! }
//! ```

pub mod config;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod traits;
pub mod types;
pub mod users;

// Re-export main types for convenient access
pub use config::{ConnectionConfig, SslMode};
pub use error::{PgFetchError, Result};
pub use executor::QueryExecutor;
pub use traits::{Connection, Connector};
pub use types::{Query, RawQueryResult, Row, SqlValue};
pub use users::{User, UserRepository};
