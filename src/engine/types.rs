//! Result-set types shared between the gateway and engines.
//!
//! Defines the native cell values an engine yields and the column
//! descriptors that travel alongside the textual result matrix.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JDBC `java.sql.Types` codes reported in [`ColumnDescriptor::sql_type`].
pub mod sql_types {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const REAL: i32 = 7;
    pub const FLOAT: i32 = 6;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const BOOLEAN: i32 = 16;
    pub const OTHER: i32 = 1111;
    pub const JAVA_OBJECT: i32 = 2000;
}

/// Whether a result column may contain NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Nullability {
    NoNulls,
    Nullable,
    #[default]
    Unknown,
}

impl From<Option<bool>> for Nullability {
    fn from(nullable: Option<bool>) -> Self {
        match nullable {
            Some(true) => Self::Nullable,
            Some(false) => Self::NoNulls,
            None => Self::Unknown,
        }
    }
}

/// Metadata about one column of a query result.
///
/// Produced once per query, ordered by physical column position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub label: String,
    pub name: String,
    pub schema: String,
    pub catalog: String,
    pub table: String,
    pub precision: i32,
    pub scale: i32,
    /// JDBC type code, see [`sql_types`].
    pub sql_type: i32,
    pub sql_type_name: String,
    pub nullable: Nullability,
    pub auto_increment: bool,
    pub case_sensitive: bool,
    pub searchable: bool,
    pub currency: bool,
    pub signed: bool,
    pub read_only: bool,
    pub writable: bool,
    pub definitely_writable: bool,
    pub display_size: i32,
}

impl ColumnDescriptor {
    /// Creates a read-only, searchable column with the given name and type.
    ///
    /// The label defaults to the name; remaining attributes can be adjusted
    /// with the `with_*` builders.
    pub fn new(name: impl Into<String>, sql_type: i32, sql_type_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            schema: String::new(),
            catalog: String::new(),
            table: String::new(),
            precision: 0,
            scale: 0,
            sql_type,
            sql_type_name: sql_type_name.into(),
            nullable: Nullability::Unknown,
            auto_increment: false,
            case_sensitive: matches!(sql_type, sql_types::CHAR | sql_types::VARCHAR),
            searchable: true,
            currency: false,
            signed: is_signed_type(sql_type),
            read_only: true,
            writable: false,
            definitely_writable: false,
            display_size: 0,
        }
    }

    /// Sets the display label.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..self
        }
    }

    /// Sets the originating catalog, schema and table.
    pub fn with_origin(
        self,
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            schema: schema.into(),
            table: table.into(),
            ..self
        }
    }

    /// Sets numeric precision and scale.
    pub fn with_precision(self, precision: i32, scale: i32) -> Self {
        Self {
            precision,
            scale,
            ..self
        }
    }

    /// Sets nullability.
    pub fn with_nullable(self, nullable: Nullability) -> Self {
        Self { nullable, ..self }
    }

    /// Sets the display size.
    pub fn with_display_size(self, display_size: i32) -> Self {
        Self {
            display_size,
            ..self
        }
    }
}

fn is_signed_type(sql_type: i32) -> bool {
    matches!(
        sql_type,
        sql_types::TINYINT
            | sql_types::SMALLINT
            | sql_types::INTEGER
            | sql_types::BIGINT
            | sql_types::REAL
            | sql_types::FLOAT
            | sql_types::DOUBLE
            | sql_types::NUMERIC
            | sql_types::DECIMAL
    )
}

/// A row of native values as yielded by an engine cursor.
pub type Row = Vec<Value>;

/// Represents a single value read from an engine cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Calendar date.
    Date(NaiveDate),

    /// Time of day.
    Time(NaiveTime),

    /// Date and time without zone.
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns true if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Renders the value as a result cell.
    ///
    /// SQL NULL becomes `None`, never the text "null".
    pub fn to_cell(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Bytes(b) => Some(STANDARD.encode(b)),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Some(t.format("%H:%M:%S").to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_cell() {
            Some(cell) => write!(f, "{cell}"),
            None => write!(f, "NULL"),
        }
    }
}

// Conversion implementations for common types
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}
