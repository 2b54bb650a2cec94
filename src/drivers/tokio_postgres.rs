use std::error::Error;
use std::fmt::Display;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::{Client, NoTls, Statement};
use tracing::{debug, error};
use uuid::Uuid;

use super::numeric;
use crate::config::ConnectionConfig;
use crate::error::{PgFetchError, Result};
use crate::traits::{Connection, Connector};
use crate::types::{RawQueryResult, SqlValue};

type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL connector using tokio-postgres.
/// Every call to `connect` opens a brand new session.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPostgresConnector;

#[async_trait]
impl Connector for TokioPostgresConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
        let target = config.display_string();
        let (client, connection) = config
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| PgFetchError::ConnectionFailed(describe(&e)))?;

        // The socket is driven on its own task until the client is dropped.
        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(db = %target, error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Box::new(TokioPostgresConnection {
            client: Some(client),
            task: Some(task),
        }))
    }
}

/// A single tokio-postgres session.
///
/// Dropping it without `close` still ends the session: the socket task
/// terminates once the client is gone.
pub struct TokioPostgresConnection {
    client: Option<Client>,
    task: Option<JoinHandle<()>>,
}

impl TokioPostgresConnection {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| PgFetchError::QueryFailed("connection is closed".to_string()))
    }

    /// Prepare `sql` and convert `params` to the types the server inferred.
    async fn prepare(&self, sql: &str, params: &[SqlValue]) -> Result<(Statement, Vec<BoxedParam>)> {
        let statement = self.client()?.prepare(sql).await.map_err(query_error)?;
        let bound = bind_params(statement.params(), params)?;
        Ok((statement, bound))
    }
}

#[async_trait]
impl Connection for TokioPostgresConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let (statement, bound) = self.prepare(sql, params).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self
            .client()?
            .query(&statement, &param_refs)
            .await
            .map_err(query_error)?;

        // Taken from the statement so that empty results still carry names
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let result_rows = rows.iter().map(decode_row).collect::<Result<Vec<_>>>()?;

        Ok(RawQueryResult::new(columns, result_rows))
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let (statement, bound) = self.prepare(sql, params).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|b| b.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.client()?
            .execute(&statement, &param_refs)
            .await
            .map_err(query_error)
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the last client handle sends Terminate and ends the socket task.
        drop(self.client.take());
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| {
                PgFetchError::ConnectionFailed(format!("connection task did not finish: {e}"))
            })?;
            debug!("PostgreSQL session closed");
        }
        Ok(())
    }
}

fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => e.to_string(),
    }
}

fn query_error(e: tokio_postgres::Error) -> PgFetchError {
    PgFetchError::QueryFailed(describe(&e))
}

/// A value in the server's binary encoding, passed through untouched.
///
/// Accepts every type, so it can read columns with no dedicated mapping
/// and send values the server parses itself (enum labels, `numeric`).
#[derive(Debug)]
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

impl ToSql for RawBytes {
    fn to_sql(
        &self,
        _: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        out.extend_from_slice(&self.0);
        Ok(IsNull::No)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        self.to_sql(ty, out)
    }
}

/// Convert every parameter for its placeholder, failing on an arity mismatch
/// the same way the server would.
fn bind_params(types: &[Type], params: &[SqlValue]) -> Result<Vec<BoxedParam>> {
    if types.len() != params.len() {
        return Err(PgFetchError::QueryFailed(format!(
            "expected {} parameters but got {}",
            types.len(),
            params.len()
        )));
    }
    types
        .iter()
        .zip(params)
        .map(|(ty, value)| sql_value_to_tosql(value, ty))
        .collect()
}

/// Convert a SqlValue to a boxed ToSql trait object matching the placeholder type.
fn sql_value_to_tosql(value: &SqlValue, ty: &Type) -> Result<BoxedParam> {
    let boxed: BoxedParam = match value {
        SqlValue::Null => Box::new(None::<RawBytes>),
        SqlValue::Text(s) | SqlValue::Numeric(s) => text_for(s, ty)?,
        SqlValue::Int32(i) => integer_for(i64::from(*i), ty, Box::new(*i))?,
        SqlValue::Int64(i) => integer_for(*i, ty, Box::new(*i))?,
        SqlValue::Float64(f) => float_for(*f, ty)?,
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Timestamp(t) => Box::new(*t),
        SqlValue::Date(d) => Box::new(*d),
        SqlValue::Time(t) => Box::new(*t),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Json(v) => Box::new(v.clone()),
        SqlValue::Bytes(b) => Box::new(b.clone()),
        SqlValue::Raw { bytes, .. } => Box::new(RawBytes(bytes.clone())),
    };
    Ok(boxed)
}

/// Parse text into the placeholder's type, so `WHERE id = $1` works with a
/// string for uuid, date, json and numeric columns.
fn text_for(s: &str, ty: &Type) -> Result<BoxedParam> {
    let invalid = |e: &dyn Display| {
        PgFetchError::QueryFailed(format!("cannot bind {s:?} as type {}: {e}", ty.name()))
    };
    let boxed: BoxedParam = match *ty {
        Type::UUID => Box::new(Uuid::parse_str(s).map_err(|e| invalid(&e))?),
        Type::DATE => Box::new(s.parse::<NaiveDate>().map_err(|e| invalid(&e))?),
        Type::TIME => Box::new(s.parse::<NaiveTime>().map_err(|e| invalid(&e))?),
        Type::TIMESTAMP => Box::new(
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| s.parse::<NaiveDateTime>())
                .map_err(|e| invalid(&e))?,
        ),
        Type::TIMESTAMPTZ => {
            Box::new(DateTime::parse_from_rfc3339(s).map_err(|e| invalid(&e))?)
        }
        Type::JSON | Type::JSONB => Box::new(
            serde_json::from_str::<serde_json::Value>(s).map_err(|e| invalid(&e))?,
        ),
        Type::NUMERIC => Box::new(RawBytes(numeric::encode(s)?)),
        Type::BYTEA => Box::new(s.as_bytes().to_vec()),
        _ if matches!(ty.kind(), Kind::Enum(_)) => Box::new(RawBytes(s.as_bytes().to_vec())),
        _ => Box::new(s.to_string()),
    };
    Ok(boxed)
}

/// Widen or narrow an integer to a numeric placeholder type.
/// Non-numeric placeholders get `fallback` and are left to the driver's type check.
fn integer_for(value: i64, ty: &Type, fallback: BoxedParam) -> Result<BoxedParam> {
    let out_of_range = || {
        PgFetchError::QueryFailed(format!(
            "value {value} is out of range for type {}",
            ty.name()
        ))
    };
    let boxed: BoxedParam = match *ty {
        Type::INT2 => Box::new(i16::try_from(value).map_err(|_| out_of_range())?),
        Type::INT4 => Box::new(i32::try_from(value).map_err(|_| out_of_range())?),
        Type::INT8 => Box::new(value),
        Type::FLOAT4 => {
            let narrowed = value as f32;
            if narrowed as i128 != i128::from(value) {
                return Err(inexact(value, ty));
            }
            Box::new(narrowed)
        }
        Type::FLOAT8 => {
            let widened = value as f64;
            if widened as i128 != i128::from(value) {
                return Err(inexact(value, ty));
            }
            Box::new(widened)
        }
        Type::NUMERIC => Box::new(RawBytes(numeric::encode(&value.to_string())?)),
        _ => fallback,
    };
    Ok(boxed)
}

fn float_for(value: f64, ty: &Type) -> Result<BoxedParam> {
    let boxed: BoxedParam = match *ty {
        Type::FLOAT4 => {
            let narrowed = value as f32;
            if !value.is_nan() && f64::from(narrowed) != value {
                return Err(inexact(value, ty));
            }
            Box::new(narrowed)
        }
        Type::NUMERIC => {
            let text = if value.is_nan() {
                "NaN".to_string()
            } else if value == f64::INFINITY {
                "Infinity".to_string()
            } else if value == f64::NEG_INFINITY {
                "-Infinity".to_string()
            } else {
                value.to_string()
            };
            Box::new(RawBytes(numeric::encode(&text)?))
        }
        _ => Box::new(value),
    };
    Ok(boxed)
}

fn inexact(value: impl Display, ty: &Type) -> PgFetchError {
    PgFetchError::QueryFailed(format!(
        "value {value} cannot be represented exactly as type {}",
        ty.name()
    ))
}

fn decode_row(row: &tokio_postgres::Row) -> Result<Vec<SqlValue>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| decode_value(row, i, col.type_()))
        .collect()
}

/// Decode one column into a SqlValue based on its declared type.
/// Types without a dedicated variant come back as `SqlValue::Raw`.
fn decode_value(row: &tokio_postgres::Row, index: usize, ty: &Type) -> Result<SqlValue> {
    let value = match *ty {
        Type::INT2 => get::<i16>(row, index, |v| SqlValue::Int32(i32::from(v))),
        Type::INT4 => get::<i32>(row, index, SqlValue::Int32),
        Type::INT8 => get::<i64>(row, index, SqlValue::Int64),
        Type::OID => get::<u32>(row, index, |v| SqlValue::Int64(i64::from(v))),
        Type::FLOAT4 => get::<f32>(row, index, |v| SqlValue::Float64(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, index, SqlValue::Float64),
        Type::BOOL => get::<bool>(row, index, SqlValue::Bool),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, index, SqlValue::Text)
        }
        Type::TIMESTAMP | Type::TIMESTAMPTZ => get::<SystemTime>(row, index, SqlValue::Timestamp),
        Type::DATE => get::<NaiveDate>(row, index, SqlValue::Date),
        Type::TIME => get::<NaiveTime>(row, index, SqlValue::Time),
        Type::UUID => get::<Uuid>(row, index, SqlValue::Uuid),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, index, SqlValue::Json),
        Type::BYTEA => get::<Vec<u8>>(row, index, SqlValue::Bytes),
        Type::NUMERIC => {
            return match raw(row, index)? {
                Some(bytes) => numeric::decode(&bytes).map(SqlValue::Numeric),
                None => Ok(SqlValue::Null),
            }
        }
        _ if matches!(ty.kind(), Kind::Enum(_)) => get::<RawBytes>(row, index, |v| {
            SqlValue::Text(String::from_utf8_lossy(&v.0).into_owned())
        }),
        _ => get::<RawBytes>(row, index, |v| SqlValue::Raw {
            type_name: ty.name().to_string(),
            bytes: v.0,
        }),
    };
    value.map_err(query_error)
}

fn raw(row: &tokio_postgres::Row, index: usize) -> Result<Option<Vec<u8>>> {
    Ok(row
        .try_get::<_, Option<RawBytes>>(index)
        .map_err(query_error)?
        .map(|v| v.0))
}

fn get<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    index: usize,
    wrap: impl FnOnce(T) -> SqlValue,
) -> std::result::Result<SqlValue, tokio_postgres::Error> {
    Ok(row
        .try_get::<_, Option<T>>(index)?
        .map_or(SqlValue::Null, wrap))
}
