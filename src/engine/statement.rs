//! Statements handed to an engine connection.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{GatewayError, Result};

/// A typed value bound to a statement placeholder.
///
/// `None` inside a variant is a typed SQL NULL; `Object(None)` is an
/// untyped null.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(Option<String>),
    Short(Option<i16>),
    Integer(Option<i32>),
    Long(Option<i64>),
    Float(Option<f32>),
    Double(Option<f64>),
    Boolean(Option<bool>),
    Byte(Option<i8>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    Timestamp(Option<NaiveDateTime>),
    Object(Option<String>),
}

impl ParamValue {
    /// Returns true if this binds SQL NULL.
    pub fn is_null(&self) -> bool {
        match self {
            Self::String(v) | Self::Object(v) => v.is_none(),
            Self::Short(v) => v.is_none(),
            Self::Integer(v) => v.is_none(),
            Self::Long(v) => v.is_none(),
            Self::Float(v) => v.is_none(),
            Self::Double(v) => v.is_none(),
            Self::Boolean(v) => v.is_none(),
            Self::Byte(v) => v.is_none(),
            Self::Date(v) => v.is_none(),
            Self::Time(v) => v.is_none(),
            Self::Timestamp(v) => v.is_none(),
        }
    }
}

/// A parameterized statement with 1-based placeholder slots.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatement {
    sql: String,
    params: Vec<Option<ParamValue>>,
}

impl PreparedStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Sets the value of the placeholder at `index` (1-based).
    pub fn set(&mut self, index: usize, value: ParamValue) -> Result<()> {
        if index == 0 {
            return Err(GatewayError::internal("parameter indexes start at 1"));
        }
        if self.params.len() < index {
            self.params.resize(index, None);
        }
        self.params[index - 1] = Some(value);
        Ok(())
    }

    /// Returns the value bound at `index` (1-based), if any.
    pub fn get(&self, index: usize) -> Option<&ParamValue> {
        index
            .checked_sub(1)
            .and_then(|i| self.params.get(i))
            .and_then(Option::as_ref)
    }

    /// Returns every bound value in placeholder order.
    ///
    /// Fails if a placeholder below the highest bound index was skipped.
    pub fn values(&self) -> Result<Vec<&ParamValue>> {
        self.params
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.as_ref().ok_or_else(|| {
                    GatewayError::query(format!("No value specified for parameter {}", i + 1))
                })
            })
            .collect()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Literal SQL executed as-is.
    Plain(String),
    /// SQL with bound placeholder values.
    Prepared(PreparedStatement),
}

impl Statement {
    pub fn sql(&self) -> &str {
        match self {
            Self::Plain(sql) => sql,
            Self::Prepared(prepared) => prepared.sql(),
        }
    }
}
