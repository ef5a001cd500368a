//! Error types for sqlgate.
//!
//! Defines the main error enum used throughout the gateway.

use thiserror::Error;

/// Boxed underlying cause carried by execution errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A declared parameter type name could not be resolved.
    #[error("Bind error: unknown parameter type '{declared_type}'")]
    Bind { declared_type: String },

    /// A parameter literal could not be converted to its declared type.
    #[error(
        "Parameter conversion error: parameter {index} of type '{declared_type}' \
         cannot take value '{raw_value}': {reason}"
    )]
    ParamConversion {
        index: usize,
        declared_type: String,
        raw_value: String,
        reason: String,
    },

    /// Statement execution failed inside the engine (connectivity, syntax, permission).
    #[error("Query execution error: {message}")]
    QueryExecution {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Catalog introspection failed.
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// The caller aborted the request.
    #[error("Query cancelled")]
    Cancelled,

    /// Connection pool or connection-level errors.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Saved query storage errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Creates a bind error for an unresolvable type name.
    pub fn bind(declared_type: impl Into<String>) -> Self {
        Self::Bind {
            declared_type: declared_type.into(),
        }
    }

    /// Creates a parameter conversion error.
    pub fn param_conversion(
        index: usize,
        declared_type: impl Into<String>,
        raw_value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::ParamConversion {
            index,
            declared_type: declared_type.into(),
            raw_value: raw_value.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a query execution error with the given message and no cause.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            source: None,
        }
    }

    /// Creates a query execution error wrapping an underlying cause.
    pub fn query_with_source(msg: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::QueryExecution {
            message: msg.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a metadata error with the given message.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Folds an engine-side failure into a single `QueryExecution` error.
    ///
    /// Parameter conversion failures and cancellation keep their own
    /// variants so callers can tell them apart.
    pub fn into_execution_error(self) -> Self {
        match self {
            Self::QueryExecution { .. } | Self::ParamConversion { .. } | Self::Cancelled => self,
            other => {
                let message = other.to_string();
                Self::query_with_source(message, other)
            }
        }
    }

    /// Returns true if the request was aborted by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "Bind Error",
            Self::ParamConversion { .. } => "Parameter Conversion Error",
            Self::QueryExecution { .. } => "Query Execution Error",
            Self::Metadata(_) => "Metadata Error",
            Self::Cancelled => "Cancelled",
            Self::Connection(_) => "Connection Error",
            Self::Config(_) => "Configuration Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;
