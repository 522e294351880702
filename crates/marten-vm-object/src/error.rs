//! VM error types

use crate::value::Value;
use thiserror::Error;

/// Result alias used throughout the object model and linker.
pub type VmResult<T> = Result<T, VmError>;

/// Errors produced by the object model and the call-site linker.
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (e.g., writing through an accessor with no setter)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Reference error (undeclared variable in strict mode)
    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    /// Internal error: a broken engine contract, not script-visible
    #[error("InternalError: {0}")]
    InternalError(String),

    /// A value thrown by script code, boxed for propagation
    #[error("Uncaught exception: {0}")]
    Thrown(Box<ThrownValue>),
}

/// A thrown script value with its rendered message and source position.
#[derive(Debug)]
pub struct ThrownValue {
    /// The thrown value
    pub value: Value,
    /// Rendered message
    pub message: String,
    /// Position in the source, when available
    pub position: Option<SourcePosition>,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some(pos) => write!(f, "{} ({}:{})", self.message, pos.line, pos.column),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A line/column pair in script source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub column: u32,
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a reference error
    pub fn reference_error(msg: impl Into<String>) -> Self {
        Self::ReferenceError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Box a script-thrown value
    pub fn thrown(value: Value, message: impl Into<String>, position: Option<SourcePosition>) -> Self {
        Self::Thrown(Box::new(ThrownValue {
            value,
            message: message.into(),
            position,
        }))
    }
}
