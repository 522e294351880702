//! The `with`-statement override
//!
//! A `WithScope` is a transient, stack-scoped view that makes name resolution
//! search an arbitrary expression object before the enclosing scope. It is
//! not a prototype link and it has no identity of its own: a method fetched
//! through it must run against the real expression object, a name that falls
//! through must bind the parent scope, and the split-state marker always
//! belongs to the first real scope above the wrapper.

use std::sync::Arc;

use crate::error::VmResult;
use crate::lookup::LookupResult;
use crate::object::ObjectRef;
use crate::property::PropertyKey;
use crate::value::Value;

/// Name of the missing-property fallback hook honored on the wrapped
/// expression.
pub const NO_SUCH_PROPERTY: &str = "__noSuchProperty__";

/// What a with-override wraps above itself: a real scope, or another wrapper
/// for nested `with` statements.
#[derive(Clone, Debug)]
pub enum WithParent {
    /// Enclosing real scope
    Scope(ObjectRef),
    /// Enclosing with-override
    With(Arc<WithScope>),
}

/// A with-statement override: wrapped expression value plus parent scope.
#[derive(Debug)]
pub struct WithScope {
    expression: Value,
    parent: WithParent,
}

/// One resolved name through a with-override.
#[derive(Clone, Debug)]
pub struct WithLookup {
    /// The object to use as the receiver for a subsequent method call:
    /// the expression object, or the parent scope — never the wrapper.
    receiver: ObjectRef,
    /// The underlying resolution.
    find: LookupResult,
    /// True when the binding is the expression's missing-property hook, to be
    /// invoked with the name rather than read directly.
    via_missing_hook: bool,
}

impl WithLookup {
    /// Receiver for a subsequent method call through this binding.
    pub fn receiver(&self) -> &ObjectRef {
        &self.receiver
    }

    /// The underlying resolution.
    pub fn find(&self) -> &LookupResult {
        &self.find
    }

    /// True when the binding came from the missing-property hook.
    pub fn via_missing_hook(&self) -> bool {
        self.via_missing_hook
    }
}

impl WithScope {
    /// Wrap `expression` in front of `parent` for the duration of a `with`
    /// body.
    pub fn new(expression: Value, parent: WithParent) -> Arc<Self> {
        Arc::new(Self { expression, parent })
    }

    /// The wrapped expression value.
    pub fn expression(&self) -> &Value {
        &self.expression
    }

    /// The enclosing scope or wrapper.
    pub fn parent(&self) -> &WithParent {
        &self.parent
    }

    /// The first real (non-wrapper) scope above this override.
    pub fn enclosing_scope(&self) -> ObjectRef {
        match &self.parent {
            WithParent::Scope(scope) => scope.clone(),
            WithParent::With(with) => with.enclosing_scope(),
        }
    }

    /// Resolve a name: the expression object first (including its
    /// missing-property hook), then the parent scope.
    pub fn lookup(&self, key: &PropertyKey) -> Option<WithLookup> {
        if let Some(expression) = self.expression.as_object() {
            if let Some(find) = expression.find_property(key, true) {
                return Some(WithLookup {
                    receiver: expression.clone(),
                    find,
                    via_missing_hook: false,
                });
            }
            if let Some(hook) = expression.find_property(&NO_SUCH_PROPERTY.into(), true) {
                return Some(WithLookup {
                    receiver: expression.clone(),
                    find: hook,
                    via_missing_hook: true,
                });
            }
        }

        match &self.parent {
            WithParent::Scope(scope) => scope.find_property(key, true).map(|find| WithLookup {
                receiver: scope.clone(),
                find,
                via_missing_hook: false,
            }),
            WithParent::With(with) => with.lookup(key),
        }
    }

    /// Read a name through the override. A miss everywhere reads as
    /// `undefined`.
    pub fn get(&self, key: &PropertyKey) -> VmResult<Value> {
        match self.lookup(key) {
            Some(resolved) if resolved.via_missing_hook => {
                match resolved.find.get_value()? {
                    Value::Function(hook) => hook.call(
                        &Value::Object(resolved.receiver.clone()),
                        &[Value::String(Arc::from(key.to_string()))],
                    ),
                    _ => Ok(Value::Undefined),
                }
            }
            Some(resolved) => resolved.find.get_value(),
            None => Ok(Value::Undefined),
        }
    }

    /// Write a name through the override: the expression object when it has
    /// the property, the parent scope otherwise.
    pub fn set(&self, key: &PropertyKey, value: Value, strict: bool) -> VmResult<()> {
        if let Some(expression) = self.expression.as_object() {
            if expression.find_property(key, true).is_some() {
                return expression.set(key, value, strict);
            }
        }
        match &self.parent {
            WithParent::Scope(scope) => scope.set(key, value, strict),
            WithParent::With(with) => with.set(key, value, strict),
        }
    }

    /// Delete a name: tried on the wrapped expression first.
    pub fn delete(&self, key: &PropertyKey, strict: bool) -> VmResult<bool> {
        if let Some(expression) = self.expression.as_object() {
            if expression.has_own(key) {
                return expression.delete(key, strict);
            }
        }
        match &self.parent {
            WithParent::Scope(scope) => scope.delete(key, strict),
            WithParent::With(with) => with.delete(key, strict),
        }
    }

    /// Split-state marker, delegated to the first non-wrapper scope. The
    /// wrapper is transient and must never hold a divergent copy.
    pub fn split_state(&self) -> i32 {
        self.enclosing_scope().split_state()
    }

    /// Set the split-state marker on the first non-wrapper scope.
    pub fn set_split_state(&self, state: i32) {
        self.enclosing_scope().set_split_state(state);
    }
}
