//! Error types for Contextfield

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("missing required section: {0}")]
    MissingSection(String),

    #[error("missing input field: {0}")]
    MissingInputField(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("operation failed: {operation} - {message}")]
    OperationFailure { operation: String, message: String },

    #[error("invalid parameter: {name} - {message}")]
    InvalidParameter { name: String, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn operation_failure(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// The externally visible error kind reported on failed executions.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Parse(_) | Self::MissingSection(_) => "ParseError",
            Self::MissingInputField(_) => "MissingInputField",
            Self::UnknownOperation(_) => "UnknownOperation",
            Self::InvalidConfiguration(_) => "InvalidConfiguration",
            Self::OperationFailure { .. }
            | Self::InvalidParameter { .. }
            | Self::IoError(_)
            | Self::JsonError(_) => "OperationFailure",
        }
    }
}
