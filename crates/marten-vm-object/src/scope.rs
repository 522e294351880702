//! Scope containers
//!
//! A scope is an object whose reads and writes are variable declarations.
//! Scope-role objects also carry the split-state resumption marker: when a
//! function body is compiled as several re-entrant segments, the marker says
//! which segment an in-flight invocation should resume in, and every segment
//! must see the same marker no matter how the body was decomposed.

use crate::error::VmResult;
use crate::object::{JsObject, ObjectRef};
use crate::property::{Property, PropertyFlags, PropertyKey};
use crate::value::Value;

/// Split-state value meaning "no segment in flight".
pub const UNSET_SPLIT_STATE: i32 = -1;

/// Declare a new global variable on a scope container.
///
/// Used by setter synthesis when a non-strict write misses the whole scope
/// chain: the name becomes a fresh property of the scope itself.
pub fn declare_global(scope: &ObjectRef, key: PropertyKey, value: Value) -> VmResult<Property> {
    debug_assert!(scope.is_scope());
    scope.add_own_value(key, value, PropertyFlags::data())
}

/// Creates the fresh scope objects the deoptimization machinery merges
/// captured locals into.
pub trait ScopeFactory: Send + Sync {
    /// A new, empty scope container with the given parent.
    fn fresh_scope(&self, proto: Option<ObjectRef>) -> ObjectRef;
}

/// Default factory producing plain scope containers.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericScopeFactory;

impl ScopeFactory for GenericScopeFactory {
    fn fresh_scope(&self, proto: Option<ObjectRef>) -> ObjectRef {
        JsObject::scope(proto)
    }
}
