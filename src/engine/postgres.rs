//! PostgreSQL engine implementation.
//!
//! Provides `PostgresPool`, a `ConnectionPool` holding one sqlx pool per
//! configured project. PostgreSQL has no cube storage, so it never records
//! execution contexts.

use crate::config::Config;
use crate::engine::{
    sql_types, CatalogColumn, CatalogTable, ColumnDescriptor, Connection, ConnectionPool,
    ParamValue, QueryScope, ResultCursor, Row, Statement, Value,
};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgArguments, PgColumn, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::query::Query;
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{
    Column as SqlxColumn, Executor, FromRow, Row as SqlxRow, Statement as _, TypeInfo, ValueRef,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Maximum number of connection acquisition attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL-backed connection pool, one sqlx pool per project.
#[derive(Debug)]
pub struct PostgresPool {
    pools: HashMap<String, PgPool>,
    query_timeout: Duration,
}

impl PostgresPool {
    /// Builds lazily-connecting pools for every configured project.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut pools = HashMap::with_capacity(config.projects.len());

        for (project, settings) in &config.projects {
            let settings = settings.resolve_connection()?;
            let conn_str = settings.to_connection_string()?;
            info!("Project {}: {}", project, settings.display_string());

            let pool = PgPoolOptions::new()
                .max_connections(config.query.max_connections)
                .acquire_timeout(Duration::from_secs(config.query.acquire_timeout_secs))
                .connect_lazy(&conn_str)
                .map_err(|e| {
                    GatewayError::config(format!(
                        "Invalid connection settings for project '{project}': {e}"
                    ))
                })?;
            pools.insert(project.clone(), pool);
        }

        Ok(Self {
            pools,
            query_timeout: Duration::from_secs(config.query.timeout_secs),
        })
    }

    /// Creates a pool serving a single project from an existing sqlx pool.
    ///
    /// This is primarily useful for testing.
    pub fn from_pool(project: impl Into<String>, pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pools: HashMap::from([(project.into(), pool)]),
            query_timeout,
        }
    }

    async fn acquire(&self, project: &str) -> Result<PoolConnection<Postgres>> {
        let pool = self
            .pools
            .get(project)
            .ok_or_else(|| GatewayError::connection(format!("Unknown project '{project}'")))?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(
                "Connection attempt {} of {} for project {}",
                attempt, MAX_RETRY_ATTEMPTS, project
            );

            match pool.acquire().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if !is_transient {
                        break;
                    }
                    if attempt < MAX_RETRY_ATTEMPTS {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2; // Exponential backoff
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, project),
            None => GatewayError::connection(format!("Cannot connect for project '{project}'")),
        })
    }
}

#[async_trait]
impl ConnectionPool for PostgresPool {
    async fn get_connection(&self, project: &str) -> Result<Box<dyn Connection>> {
        let conn = self.acquire(project).await?;
        Ok(Box::new(PostgresConnection {
            conn: Some(conn),
            query_timeout: self.query_timeout,
        }))
    }
}

struct PostgresConnection {
    conn: Option<PoolConnection<Postgres>>,
    query_timeout: Duration,
}

impl PostgresConnection {
    fn live(&mut self) -> Result<&mut PoolConnection<Postgres>> {
        self.conn
            .as_mut()
            .ok_or_else(|| GatewayError::connection("Connection already closed"))
    }
}

#[derive(Debug, FromRow)]
struct ColumnRow {
    table_catalog: Option<String>,
    table_schema: Option<String>,
    table_name: String,
    column_name: String,
    data_type: String,
    column_size: Option<i32>,
    numeric_scale: Option<i32>,
    numeric_precision_radix: Option<i32>,
    is_nullable: Option<String>,
    column_default: Option<String>,
    character_octet_length: Option<i32>,
    ordinal_position: i32,
    is_identity: Option<String>,
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(
        &mut self,
        statement: &Statement,
        _scope: &QueryScope,
    ) -> Result<Box<dyn ResultCursor>> {
        let query_timeout = self.query_timeout;
        let conn = self.live()?;

        // Column metadata comes from the prepared statement so that empty
        // results still describe their columns.
        let sql = match statement {
            Statement::Plain(sql) => sql.clone(),
            Statement::Prepared(prepared) => numbered_placeholders(prepared.sql()),
        };
        let described = (&mut **conn)
            .prepare(&sql)
            .await
            .map_err(|e| GatewayError::query_with_source(format_query_error(&e), e))?;
        let columns: Vec<ColumnDescriptor> =
            described.columns().iter().map(describe_column).collect();

        let query = match statement {
            Statement::Plain(_) => sqlx::query(&sql),
            Statement::Prepared(prepared) => prepared
                .values()?
                .into_iter()
                .fold(sqlx::query(&sql), bind_value),
        };

        let rows = tokio::time::timeout(query_timeout, query.fetch_all(&mut **conn))
            .await
            .map_err(|_| {
                GatewayError::query(format!(
                    "Query timed out after {} seconds",
                    query_timeout.as_secs()
                ))
            })?
            .map_err(|e| GatewayError::query_with_source(format_query_error(&e), e))?;

        Ok(Box::new(PostgresCursor {
            columns,
            rows: rows.into_iter(),
        }))
    }

    async fn tables(&mut self) -> Result<Vec<CatalogTable>> {
        let conn = self.live()?;
        let rows: Vec<(Option<String>, Option<String>, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT
                table_catalog::text,
                table_schema::text,
                table_name::text,
                table_type::text
            FROM information_schema.tables
            WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY table_schema, table_name
            "#,
        )
        .fetch_all(&mut **conn)
        .await
        .map_err(|e| GatewayError::metadata(format!("Failed to fetch tables: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(catalog, schema, name, table_type)| CatalogTable {
                catalog,
                schema,
                name,
                table_type,
                remarks: None,
            })
            .collect())
    }

    async fn columns(&mut self) -> Result<Vec<CatalogColumn>> {
        let conn = self.live()?;
        let rows: Vec<ColumnRow> = sqlx::query_as(
            r#"
            SELECT
                table_catalog::text,
                table_schema::text,
                table_name::text,
                column_name::text,
                data_type::text,
                COALESCE(character_maximum_length, numeric_precision)::int4 AS column_size,
                numeric_scale::int4,
                numeric_precision_radix::int4,
                is_nullable::text,
                column_default::text,
                character_octet_length::int4,
                ordinal_position::int4,
                is_identity::text
            FROM information_schema.columns
            WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY table_schema, table_name, ordinal_position
            "#,
        )
        .fetch_all(&mut **conn)
        .await
        .map_err(|e| GatewayError::metadata(format!("Failed to fetch columns: {e}")))?;

        Ok(rows.into_iter().map(catalog_column).collect())
    }

    fn close(&mut self) {
        // Dropping the pooled connection returns it to the pool.
        self.conn.take();
    }
}

fn catalog_column(row: ColumnRow) -> CatalogColumn {
    let nullable = match row.is_nullable.as_deref() {
        Some("NO") => 0,
        Some("YES") => 1,
        _ => 2,
    };
    let is_autoincrement = match row.is_identity.as_deref() {
        Some("YES") => "YES",
        _ if row
            .column_default
            .as_deref()
            .is_some_and(|default| default.starts_with("nextval(")) =>
        {
            "YES"
        }
        _ => "NO",
    };

    CatalogColumn {
        catalog: row.table_catalog,
        schema: row.table_schema,
        table_name: row.table_name,
        column_name: row.column_name,
        data_type: jdbc_type_code(&row.data_type),
        type_name: row.data_type,
        column_size: row.column_size.unwrap_or(0),
        buffer_length: None,
        decimal_digits: row.numeric_scale.unwrap_or(0),
        num_prec_radix: row.numeric_precision_radix.unwrap_or(10),
        nullable,
        remarks: None,
        column_def: row.column_default,
        sql_data_type: None,
        sql_datetime_sub: None,
        char_octet_length: row.character_octet_length.unwrap_or(0),
        ordinal_position: row.ordinal_position,
        is_nullable: row.is_nullable,
        scope_catalog: None,
        scope_schema: None,
        scope_table: None,
        source_data_type: None,
        is_autoincrement: Some(is_autoincrement.to_string()),
    }
}

struct PostgresCursor {
    columns: Vec<ColumnDescriptor>,
    rows: std::vec::IntoIter<PgRow>,
}

#[async_trait]
impl ResultCursor for PostgresCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        self.rows.next().map(|row| convert_row(&row)).transpose()
    }
}

/// Binds one typed parameter onto a sqlx query.
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &ParamValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        ParamValue::String(v) | ParamValue::Object(v) => query.bind(v.clone()),
        ParamValue::Short(v) => query.bind(*v),
        ParamValue::Integer(v) => query.bind(*v),
        ParamValue::Long(v) => query.bind(*v),
        ParamValue::Float(v) => query.bind(*v),
        ParamValue::Double(v) => query.bind(*v),
        ParamValue::Boolean(v) => query.bind(*v),
        // No 1-byte integer type in PostgreSQL.
        ParamValue::Byte(v) => query.bind(v.map(i16::from)),
        ParamValue::Date(v) => query.bind(*v),
        ParamValue::Time(v) => query.bind(*v),
        ParamValue::Timestamp(v) => query.bind(*v),
    }
}

fn describe_column(column: &PgColumn) -> ColumnDescriptor {
    let type_name = column.type_info().name();
    ColumnDescriptor::new(column.name(), jdbc_type_code(type_name), type_name)
}

/// Maps a PostgreSQL type name to its JDBC type code.
fn jdbc_type_code(type_name: &str) -> i32 {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => sql_types::BOOLEAN,
        "INT2" | "SMALLINT" => sql_types::SMALLINT,
        "INT4" | "INT" | "INTEGER" => sql_types::INTEGER,
        "INT8" | "BIGINT" => sql_types::BIGINT,
        "FLOAT4" | "REAL" => sql_types::REAL,
        "FLOAT8" | "DOUBLE PRECISION" => sql_types::DOUBLE,
        "NUMERIC" | "DECIMAL" => sql_types::NUMERIC,
        "BPCHAR" | "CHAR" | "CHARACTER" => sql_types::CHAR,
        "VARCHAR" | "CHARACTER VARYING" | "TEXT" | "NAME" => sql_types::VARCHAR,
        "DATE" => sql_types::DATE,
        "TIME" | "TIME WITHOUT TIME ZONE" => sql_types::TIME,
        "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" | "TIMESTAMPTZ"
        | "TIMESTAMP WITH TIME ZONE" => sql_types::TIMESTAMP,
        "BYTEA" => sql_types::BINARY,
        _ => sql_types::OTHER,
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow to our Value type.
///
/// Only a SQL NULL becomes `Value::Null`. A type with no decoder is an error.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value> {
    let raw = row.try_get_raw(index).map_err(|e| decode_error(index, type_name, e))?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => Value::Bool(decode(row, index, type_name)?),

        "INT2" | "SMALLINT" => Value::Int(decode::<i16>(row, index, type_name)? as i64),

        "INT4" | "INT" | "INTEGER" => Value::Int(decode::<i32>(row, index, type_name)? as i64),

        "INT8" | "BIGINT" => Value::Int(decode(row, index, type_name)?),

        "OID" => Value::Int(decode::<Oid>(row, index, type_name)?.0 as i64),

        "FLOAT4" | "REAL" => Value::Float(decode::<f32>(row, index, type_name)? as f64),

        "FLOAT8" | "DOUBLE PRECISION" => Value::Float(decode(row, index, type_name)?),

        "NUMERIC" | "DECIMAL" => {
            Value::String(decode::<Decimal>(row, index, type_name)?.to_string())
        }

        "MONEY" => Value::String(
            decode::<PgMoney>(row, index, type_name)?
                .to_decimal(2)
                .to_string(),
        ),

        "UUID" => Value::String(decode::<Uuid>(row, index, type_name)?.to_string()),

        "JSON" | "JSONB" => Value::String(decode::<JsonValue>(row, index, type_name)?.to_string()),

        "BYTEA" => Value::Bytes(decode(row, index, type_name)?),

        "DATE" => Value::Date(decode(row, index, type_name)?),

        "TIME" => Value::Time(decode(row, index, type_name)?),

        "TIMETZ" => {
            let t = decode::<PgTimeTz<NaiveTime, FixedOffset>>(row, index, type_name)?;
            Value::String(format!("{}{}", t.time.format("%H:%M:%S%.f"), t.offset))
        }

        "TIMESTAMP" => Value::Timestamp(decode(row, index, type_name)?),

        "TIMESTAMPTZ" => {
            Value::Timestamp(decode::<DateTime<Utc>>(row, index, type_name)?.naive_utc())
        }

        "INTERVAL" => Value::String(format_interval(&decode(row, index, type_name)?)),

        // Text-like types (TEXT, VARCHAR, BPCHAR, NAME, ...)
        _ => Value::String(decode(row, index, type_name)?),
    };
    Ok(value)
}

fn decode<'r, T>(row: &'r PgRow, index: usize, type_name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<T, _>(index).map_err(|e| decode_error(index, type_name, e))
}

fn decode_error(index: usize, type_name: &str, error: sqlx::Error) -> GatewayError {
    GatewayError::query_with_source(
        format!("Cannot read column {} of type {}", index + 1, type_name),
        error,
    )
}

/// Renders an interval the way PostgreSQL prints it, e.g. `1 year 2 mons 3 days 04:05:06`.
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    let years = interval.months / 12;
    let months = interval.months % 12;
    let plural = |n: i32| if n == 1 { "" } else { "s" };

    if years != 0 {
        parts.push(format!("{years} year{}", plural(years)));
    }
    if months != 0 {
        parts.push(format!("{months} mon{}", plural(months)));
    }
    if interval.days != 0 {
        parts.push(format!("{} day{}", interval.days, plural(interval.days)));
    }

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let micros = micros.unsigned_abs();
        let seconds = micros / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            seconds / 3600,
            (seconds / 60) % 60,
            seconds % 60
        );
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    if matches!(error, sqlx::Error::PoolTimedOut) {
        return true;
    }

    let error_str = error.to_string().to_lowercase();

    // Authentication and database-not-found errors are not transient
    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx acquisition errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, project: &str) -> GatewayError {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        GatewayError::connection(format!(
            "Cannot connect to the data source of project '{project}'. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") {
        GatewayError::connection(format!(
            "Authentication failed for project '{project}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        GatewayError::connection(format!(
            "The database configured for project '{project}' does not exist."
        ))
    } else if matches!(error, sqlx::Error::PoolTimedOut)
        || error_str.contains("timed out")
        || error_str.contains("timeout")
    {
        GatewayError::connection(format!(
            "Timed out waiting for a connection for project '{project}'."
        ))
    } else {
        GatewayError::connection(error.to_string())
    }
}

/// Formats a query error with PostgreSQL detail and hint if available.
fn format_query_error(error: &sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }

        if let Some(table) = pg_error.table() {
            result.push_str("\n  TABLE: ");
            result.push_str(table);
        }

        if let Some(column) = pg_error.column() {
            result.push_str("\n  COLUMN: ");
            result.push_str(column);
        }
    }

    result
}

/// Rewrites positional `?` markers as `$1`, `$2`, ... outside quoted text.
fn numbered_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut index = 0;

    for c in sql.chars() {
        match (quote, c) {
            (None, '?') => {
                index += 1;
                out.push_str(&format!("${index}"));
                continue;
            }
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), _) if open == c => quote = None,
            _ => {}
        }
        out.push(c);
    }
    out
}
