//! Typed parameter coercion.
//!
//! Clients declare each positional parameter with a type name and a raw
//! textual value. The name resolves through a static table to a closed
//! set of categories; the raw value is then parsed and bound to the
//! statement with the matching native type.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::{ParamValue, PreparedStatement};
use crate::error::{GatewayError, Result};

/// A positional parameter as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedParam {
    /// Type name, e.g. `java.lang.Integer`.
    #[serde(alias = "className")]
    pub declared_type: String,
    /// Textual value; `None` is SQL NULL whatever the declared type.
    #[serde(alias = "value")]
    pub raw_value: Option<String>,
}

impl TypedParam {
    pub fn new(declared_type: impl Into<String>, raw_value: impl Into<String>) -> Self {
        Self {
            declared_type: declared_type.into(),
            raw_value: Some(raw_value.into()),
        }
    }

    pub fn null(declared_type: impl Into<String>) -> Self {
        Self {
            declared_type: declared_type.into(),
            raw_value: None,
        }
    }
}

/// Category a declared type name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Boolean,
    Byte,
    Date,
    Time,
    Timestamp,
    Other,
}

/// Canonical type names, matched case-insensitively.
const TYPE_NAMES: &[(&str, ParamType)] = &[
    ("java.lang.String", ParamType::String),
    ("java.lang.Character", ParamType::String),
    ("char", ParamType::String),
    ("string", ParamType::String),
    ("varchar", ParamType::String),
    ("java.lang.Short", ParamType::Short),
    ("short", ParamType::Short),
    ("smallint", ParamType::Short),
    ("java.lang.Integer", ParamType::Integer),
    ("int", ParamType::Integer),
    ("integer", ParamType::Integer),
    ("java.lang.Long", ParamType::Long),
    ("long", ParamType::Long),
    ("bigint", ParamType::Long),
    ("java.lang.Float", ParamType::Float),
    ("float", ParamType::Float),
    ("real", ParamType::Float),
    ("java.lang.Double", ParamType::Double),
    ("double", ParamType::Double),
    ("java.lang.Boolean", ParamType::Boolean),
    ("boolean", ParamType::Boolean),
    ("java.lang.Byte", ParamType::Byte),
    ("byte", ParamType::Byte),
    ("tinyint", ParamType::Byte),
    ("java.util.Date", ParamType::Date),
    ("java.sql.Date", ParamType::Date),
    ("date", ParamType::Date),
    ("java.sql.Time", ParamType::Time),
    ("time", ParamType::Time),
    ("java.sql.Timestamp", ParamType::Timestamp),
    ("timestamp", ParamType::Timestamp),
    ("java.lang.Object", ParamType::Other),
    ("object", ParamType::Other),
];

impl ParamType {
    /// Looks up a declared type name.
    pub fn try_resolve(declared_type: &str) -> Result<Self> {
        let name = declared_type.trim();
        TYPE_NAMES
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, tag)| *tag)
            .ok_or_else(|| GatewayError::bind(declared_type))
    }

    /// Looks up a declared type name, falling back to [`ParamType::Other`].
    pub fn resolve(declared_type: &str) -> Self {
        Self::try_resolve(declared_type).unwrap_or_else(|err| {
            warn!("{err}; binding as an untyped value");
            Self::Other
        })
    }

    /// Parses a raw value into a typed statement value.
    ///
    /// `index` and `declared_type` only label conversion errors.
    pub fn convert(
        self,
        index: usize,
        declared_type: &str,
        raw_value: Option<&str>,
    ) -> Result<ParamValue> {
        let Some(raw) = raw_value else {
            return Ok(self.null_value());
        };
        let fail = |reason: &dyn ToString| {
            GatewayError::param_conversion(index, declared_type, raw, reason.to_string())
        };
        let trimmed = raw.trim();

        let value = match self {
            Self::String => ParamValue::String(Some(raw.to_string())),
            Self::Other => ParamValue::Object(Some(raw.to_string())),
            Self::Short => ParamValue::Short(Some(trimmed.parse().map_err(|e| fail(&e))?)),
            Self::Integer => ParamValue::Integer(Some(trimmed.parse().map_err(|e| fail(&e))?)),
            Self::Long => ParamValue::Long(Some(trimmed.parse().map_err(|e| fail(&e))?)),
            Self::Float => ParamValue::Float(Some(trimmed.parse().map_err(|e| fail(&e))?)),
            Self::Double => ParamValue::Double(Some(trimmed.parse().map_err(|e| fail(&e))?)),
            Self::Byte => ParamValue::Byte(Some(trimmed.parse().map_err(|e| fail(&e))?)),
            Self::Boolean => ParamValue::Boolean(Some(parse_bool(trimmed).ok_or_else(|| {
                fail(&"expected 'true' or 'false'")
            })?)),
            Self::Date => ParamValue::Date(Some(
                NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|e| fail(&e))?,
            )),
            Self::Time => ParamValue::Time(Some(
                NaiveTime::parse_from_str(trimmed, "%H:%M:%S").map_err(|e| fail(&e))?,
            )),
            Self::Timestamp => ParamValue::Timestamp(Some(
                NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f")
                    .map_err(|e| fail(&e))?,
            )),
        };
        Ok(value)
    }

    /// A typed NULL for this category; `Other` yields an untyped null.
    fn null_value(self) -> ParamValue {
        match self {
            Self::String => ParamValue::String(None),
            Self::Short => ParamValue::Short(None),
            Self::Integer => ParamValue::Integer(None),
            Self::Long => ParamValue::Long(None),
            Self::Float => ParamValue::Float(None),
            Self::Double => ParamValue::Double(None),
            Self::Boolean => ParamValue::Boolean(None),
            Self::Byte => ParamValue::Byte(None),
            Self::Date => ParamValue::Date(None),
            Self::Time => ParamValue::Time(None),
            Self::Timestamp => ParamValue::Timestamp(None),
            Self::Other => ParamValue::Object(None),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Binds `param` at `index` (1-based) on `statement`.
///
/// Unknown type names bind the raw text as an untyped value. Malformed
/// literals for a known type fail with a parameter conversion error.
pub fn bind(statement: &mut PreparedStatement, index: usize, param: &TypedParam) -> Result<()> {
    let value = ParamType::resolve(&param.declared_type).convert(
        index,
        &param.declared_type,
        param.raw_value.as_deref(),
    )?;
    statement.set(index, value)
}

/// Builds a prepared statement with every parameter bound in order.
pub fn prepare(sql: &str, params: &[TypedParam]) -> Result<PreparedStatement> {
    let mut statement = PreparedStatement::new(sql);
    for (i, param) in params.iter().enumerate() {
        bind(&mut statement, i + 1, param)?;
    }
    Ok(statement)
}
