use std::time::SystemTime;

use crate::error::{PgFetchError, Result};
use crate::types::SqlValue;

/// Driver-agnostic raw result from a database query.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQueryResult {
    /// Column names in order
    pub columns: Vec<String>,
    /// Rows in server order, each a vector of values in column order
    pub rows: Vec<Vec<SqlValue>>,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Consumes the result, keeping only the first row as delivered by the server.
    ///
    /// Fails if that row does not carry exactly one value per column.
    pub fn into_first_row(self) -> Result<Option<Row>> {
        match self.rows.into_iter().next() {
            Some(values) => Row::new(self.columns, values).map(Some),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A single row returned by a query.
/// Columns keep the order the server sent them in.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(PgFetchError::QueryFailed(format!(
                "row has {} values for {} columns",
                values.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, values })
    }

    /// Gets a value by column name. With duplicate names the first one wins.
    pub fn get(&self, column: &str) -> Result<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
            .ok_or_else(|| PgFetchError::ColumnNotFound(column.to_string()))
    }

    /// Gets a non-null text value.
    pub fn get_str(&self, column: &str) -> Result<&str> {
        self.typed(column, "text", SqlValue::as_str)
    }

    /// Gets a non-null integer that fits in an `i32`.
    pub fn get_i32(&self, column: &str) -> Result<i32> {
        self.typed(column, "a 32-bit integer", SqlValue::as_i32)
    }

    /// Gets a non-null integer.
    pub fn get_i64(&self, column: &str) -> Result<i64> {
        self.typed(column, "an integer", SqlValue::as_i64)
    }

    pub fn get_f64(&self, column: &str) -> Result<f64> {
        self.typed(column, "a float", SqlValue::as_f64)
    }

    pub fn get_bool(&self, column: &str) -> Result<bool> {
        self.typed(column, "a boolean", SqlValue::as_bool)
    }

    /// Gets a timestamp, mapping NULL to `None`.
    pub fn get_opt_timestamp(&self, column: &str) -> Result<Option<SystemTime>> {
        let value = self.get(column)?;
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_timestamp()
            .map(Some)
            .ok_or_else(|| PgFetchError::TypeMismatch {
                column: column.to_string(),
                expected: "a timestamp",
            })
    }

    fn typed<'a, T>(
        &'a self,
        column: &str,
        expected: &'static str,
        extract: impl FnOnce(&'a SqlValue) -> Option<T>,
    ) -> Result<T> {
        extract(self.get(column)?).ok_or_else(|| PgFetchError::TypeMismatch {
            column: column.to_string(),
            expected,
        })
    }

    /// Column names in server order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Iterates `(column, value)` pairs in server order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Returns the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_row() -> Row {
        Row::new(
            vec!["id".to_string(), "username".to_string(), "bio".to_string()],
            vec![
                SqlValue::Int32(1),
                SqlValue::Text("John".to_string()),
                SqlValue::Null,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_row_get() {
        let row = user_row();

        assert_eq!(row.get("id").unwrap(), &SqlValue::Int32(1));
        assert_eq!(row.get_str("username").unwrap(), "John");
        assert_eq!(row.get_i64("id").unwrap(), 1);
        assert!(matches!(
            row.get("missing"),
            Err(PgFetchError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_row_type_mismatch() {
        let row = user_row();
        match row.get_i32("username").unwrap_err() {
            PgFetchError::TypeMismatch { column, .. } => assert_eq!(column, "username"),
            other => panic!("Expected TypeMismatch error, got {other:?}"),
        }
        assert!(row.get_str("bio").is_err());
    }

    #[test]
    fn test_row_preserves_column_order() {
        let row = user_row();
        let names: Vec<&str> = row.iter().map(|(c, _)| c).collect();
        assert_eq!(names, vec!["id", "username", "bio"]);
    }

    #[test]
    fn test_into_first_row_on_empty() {
        let raw = RawQueryResult::new(vec!["id".to_string()], vec![]);
        assert!(raw.into_first_row().unwrap().is_none());
    }

    #[test]
    fn test_into_first_row_keeps_server_order() {
        let raw = RawQueryResult::new(
            vec!["id".to_string()],
            vec![vec![SqlValue::Int32(2)], vec![SqlValue::Int32(1)]],
        );
        let row = raw.into_first_row().unwrap().unwrap();
        assert_eq!(row.get_i32("id").unwrap(), 2);
    }

    #[test]
    fn test_opt_timestamp() {
        let now = SystemTime::now();
        let row = Row::new(
            vec!["created_at".to_string(), "deleted_at".to_string()],
            vec![SqlValue::Timestamp(now), SqlValue::Null],
        )
        .unwrap();
        assert_eq!(row.get_opt_timestamp("created_at").unwrap(), Some(now));
        assert_eq!(row.get_opt_timestamp("deleted_at").unwrap(), None);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let raw = RawQueryResult::new(
            vec!["id".to_string(), "email".to_string()],
            vec![vec![SqlValue::Int32(1)]],
        );
        match raw.into_first_row() {
            Err(PgFetchError::QueryFailed(msg)) => {
                assert_eq!(msg, "row has 1 values for 2 columns")
            }
            other => panic!("Expected QueryFailed error, got {other:?}"),
        }
        assert!(Row::new(vec![], vec![SqlValue::Null]).is_err());
    }
}
