//! PostgreSQL executor.
//!
//! Runs the analyzer's generated SQL through tokio_postgres, binding the key
//! value as `$1` with the type the server expects for that parameter.

use std::error::Error as StdError;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use rowprobe_core::{ExecutorError, QueryExecutor};
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, Error, NoTls, Row, Statement};
use tracing::error;
use uuid::Uuid;

/// A single client connection owned by one analysis
pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    /// Connect using a libpq-style connection string or URL.
    ///
    /// Spawns a background task to drive the connection; it ends when the
    /// executor is dropped.
    pub async fn connect(connection: &str) -> Result<Self, Error> {
        let (client, conn) = tokio_postgres::connect(connection, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                error!("analysis connection error: {e}");
            }
        });
        Ok(Self { client })
    }

    async fn run(&self, sql: &str, key: &str) -> Result<(Statement, Vec<Row>), ExecutorError> {
        let statement = self.client.prepare(sql).await.map_err(driver_error)?;

        let bound: Vec<KeyParam> = statement
            .params()
            .iter()
            .map(|ty| key_param(ty, key))
            .collect::<Result<_, _>>()?;
        let params: Vec<&(dyn ToSql + Sync)> = bound
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = self
            .client
            .query(&statement, &params)
            .await
            .map_err(driver_error)?;
        Ok((statement, rows))
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn count(&self, sql: &str, key: &str) -> Result<i64, ExecutorError> {
        let (_, rows) = self.run(sql, key).await?;
        let row = rows
            .first()
            .ok_or_else(|| ExecutorError::new("count query returned no rows"))?;
        row.try_get::<_, i64>(0).map_err(driver_error)
    }

    async fn scalar(&self, sql: &str, key: &str) -> Result<Option<String>, ExecutorError> {
        let (statement, rows) = self.run(sql, key).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let column = statement
            .columns()
            .first()
            .ok_or_else(|| ExecutorError::new("scalar query returned no columns"))?;
        let raw = row
            .try_get::<_, Option<RawCell>>(0)
            .map_err(driver_error)?;
        cell_text(column.type_(), raw.map(|cell| cell.0))
    }
}

/// Column bytes left undecoded until the column type is known
struct RawCell<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawCell<'a> {
    fn from_sql(_: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        Ok(RawCell(raw))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

type KeyParam = Box<dyn ToSql + Sync + Send>;

/// Convert the key to the parameter type the server inferred
fn key_param(ty: &Type, key: &str) -> Result<KeyParam, ExecutorError> {
    fn parsed<T>(ty: &Type, key: &str) -> Result<KeyParam, ExecutorError>
    where
        T: FromStr + ToSql + Sync + Send + 'static,
    {
        key.parse::<T>()
            .map(|value| Box::new(value) as KeyParam)
            .map_err(|_| invalid_key(ty, key))
    }

    match *ty {
        Type::INT2 => parsed::<i16>(ty, key),
        Type::INT4 => parsed::<i32>(ty, key),
        Type::INT8 => parsed::<i64>(ty, key),
        Type::FLOAT4 => parsed::<f32>(ty, key),
        Type::FLOAT8 => parsed::<f64>(ty, key),
        Type::BOOL => parsed::<bool>(ty, key),
        Type::NUMERIC => parsed::<Decimal>(ty, key),
        Type::UUID => parsed::<Uuid>(ty, key),
        Type::DATE => parsed::<NaiveDate>(ty, key),
        Type::TIMESTAMP => NaiveDateTime::parse_from_str(key, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| key.parse::<NaiveDateTime>())
            .map(|value| Box::new(value) as KeyParam)
            .map_err(|_| invalid_key(ty, key)),
        Type::TIMESTAMPTZ => parsed::<DateTime<FixedOffset>>(ty, key),
        _ => Ok(Box::new(key.to_string())),
    }
}

fn invalid_key(ty: &Type, key: &str) -> ExecutorError {
    ExecutorError::new(format!("key value '{}' is not a valid {}", key, ty))
}

/// Render a column value of type `ty` as text; `None` is SQL NULL
fn cell_text(ty: &Type, raw: Option<&[u8]>) -> Result<Option<String>, ExecutorError> {
    fn text<'a, T: FromSql<'a> + ToString>(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<String, ExecutorError> {
        T::from_sql(ty, raw)
            .map(|value| value.to_string())
            .map_err(|e| ExecutorError::new(format!("cannot decode {} value: {}", ty, e)))
    }

    let Some(raw) = raw else {
        return Ok(None);
    };

    let value = match *ty {
        Type::BOOL => text::<bool>(ty, raw)?,
        Type::INT2 => text::<i16>(ty, raw)?,
        Type::INT4 => text::<i32>(ty, raw)?,
        Type::INT8 => text::<i64>(ty, raw)?,
        Type::OID => text::<u32>(ty, raw)?,
        Type::FLOAT4 => text::<f32>(ty, raw)?,
        Type::FLOAT8 => text::<f64>(ty, raw)?,
        Type::NUMERIC => text::<Decimal>(ty, raw)?,
        Type::UUID => text::<Uuid>(ty, raw)?,
        Type::DATE => text::<NaiveDate>(ty, raw)?,
        Type::TIMESTAMP => text::<NaiveDateTime>(ty, raw)?,
        Type::TIMESTAMPTZ => text::<DateTime<Utc>>(ty, raw)?,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            text::<String>(ty, raw)?
        }
        _ => {
            return Err(ExecutorError::new(format!(
                "cannot display values of type {}",
                ty
            )))
        }
    };
    Ok(Some(value))
}

/// Prefer the server's own message over the client's wrapper text
fn driver_error(e: Error) -> ExecutorError {
    match e.as_db_error() {
        Some(db) => ExecutorError::new(db.message()),
        None => ExecutorError::new(e.to_string()),
    }
}
