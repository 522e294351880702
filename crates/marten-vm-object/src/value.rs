//! Dynamic values
//!
//! A compact tagged value representation. Property slots, captured
//! deoptimization locals and accessor functions are all stored as `Value`.

use std::sync::Arc;

use crate::error::VmResult;
use crate::object::ObjectRef;

/// A dynamic value.
#[derive(Clone, Debug)]
pub enum Value {
    /// The undefined value
    Undefined,
    /// The null value
    Null,
    /// A boolean
    Boolean(bool),
    /// A 32-bit integer
    Int(i32),
    /// A double-precision number
    Number(f64),
    /// An immutable string
    String(Arc<str>),
    /// An object reference
    Object(ObjectRef),
    /// A callable supplied by the code generator
    Function(NativeFunction),
}

impl Value {
    /// Returns the object reference if this value is an object.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Returns the callable if this value is a function.
    pub fn as_function(&self) -> Option<&NativeFunction> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// True for `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Short type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int(_) | Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// Signature of a native callable: `(this, args) -> result`.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync;

/// A callable body injected by the code generator.
///
/// The object model treats these as opaque; it only invokes them when a
/// user-defined accessor fires. Identity (not structure) defines equality.
#[derive(Clone)]
pub struct NativeFunction(Arc<NativeFn>);

impl NativeFunction {
    /// Wrap a closure as a callable.
    pub fn new(f: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke with the given receiver and arguments.
    pub fn call(&self, this: &Value, args: &[Value]) -> VmResult<Value> {
        (self.0)(this, args)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NativeFunction")
    }
}
