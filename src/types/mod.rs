pub(crate) mod query;
mod row;
mod sql_value;

pub use query::Query;
pub use row::{RawQueryResult, Row};
pub use sql_value::SqlValue;
