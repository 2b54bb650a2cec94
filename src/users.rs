//! Lookups and writes against the `users` table.

use std::time::SystemTime;

use crate::config::ConnectionConfig;
use crate::error::{PgFetchError, Result};
use crate::executor::QueryExecutor;
use crate::types::{Query, Row};

const CREATE_USERS_TABLE: &str = "CREATE TABLE users (
    id SERIAL PRIMARY KEY,
    username VARCHAR(50) UNIQUE NOT NULL,
    email VARCHAR(255) UNIQUE NOT NULL,
    password VARCHAR(255) NOT NULL,
    created_at TIMESTAMP WITH TIME ZONE DEFAULT CURRENT_TIMESTAMP
)";

const SELECT_USER_BY_EMAIL: &str = "SELECT * FROM users WHERE email = $1";

const INSERT_USER: &str = "INSERT INTO users (username, email, password) VALUES ($1, $2, $3)";

/// One record of the `users` table.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: Option<SystemTime>,
}

impl TryFrom<Row> for User {
    type Error = PgFetchError;

    fn try_from(row: Row) -> Result<Self> {
        Ok(Self {
            id: row.get_i32("id")?,
            username: row.get_str("username")?.to_string(),
            email: row.get_str("email")?.to_string(),
            password: row.get_str("password")?.to_string(),
            created_at: row.get_opt_timestamp("created_at")?,
        })
    }
}

/// Access to `users`, one fresh connection per call.
pub struct UserRepository {
    executor: QueryExecutor,
    config: ConnectionConfig,
}

impl UserRepository {
    pub fn new(executor: QueryExecutor, config: ConnectionConfig) -> Self {
        Self { executor, config }
    }

    /// Fetch the user registered under `email`.
    /// `Ok(None)` means no such user; lookup failures are errors.
    pub async fn get_user(&self, email: &str) -> Result<Option<User>> {
        let query = Query::new(SELECT_USER_BY_EMAIL).bind(email);
        self.executor
            .fetch_one(&self.config, &query)
            .await?
            .map(User::try_from)
            .transpose()
    }

    pub async fn create_users_table(&self) -> Result<()> {
        self.executor
            .execute(&self.config, &Query::new(CREATE_USERS_TABLE))
            .await?;
        Ok(())
    }

    /// Insert a user and return the number of rows written.
    pub async fn insert_user(&self, username: &str, email: &str, password: &str) -> Result<u64> {
        let query = Query::new(INSERT_USER)
            .bind(username)
            .bind(email)
            .bind(password);
        self.executor.execute(&self.config, &query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlValue;

    fn row(values: Vec<SqlValue>) -> Row {
        Row::new(
            ["id", "username", "email", "password", "created_at"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            values,
        )
        .unwrap()
    }

    #[test]
    fn test_user_from_row() {
        let user = User::try_from(row(vec![
            SqlValue::Int32(3),
            SqlValue::from("username2"),
            SqlValue::from("user3@example.com"),
            SqlValue::from("user_password"),
            SqlValue::Null,
        ]))
        .unwrap();

        assert_eq!(user.id, 3);
        assert_eq!(user.username, "username2");
        assert_eq!(user.email, "user3@example.com");
        assert_eq!(user.created_at, None);
    }

    #[test]
    fn test_user_from_row_missing_column() {
        let partial = Row::new(vec!["id".to_string()], vec![SqlValue::Int32(3)]).unwrap();
        let err = User::try_from(partial).unwrap_err();
        assert!(matches!(err, PgFetchError::ColumnNotFound(c) if c == "username"));
    }
}
