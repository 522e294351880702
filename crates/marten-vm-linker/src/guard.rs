//! Guards and actions
//!
//! A cached resolution is a `(Guard, Action)` pair. The guard is a cheap,
//! side-effect-free predicate over the receiver; while it holds, the action
//! may be replayed without consulting the object model again. When it stops
//! holding, the caching layer discards the pair and relinks.
//!
//! # Guard pattern
//!
//! ```text
//!   call site
//!     │  guard(receiver)?
//!     ├─ yes → cached action        ← fast path
//!     └─ no  → discard, relink      ← back to the linker
//! ```

use std::sync::Arc;

use smallvec::SmallVec;

use marten_vm_object::{ObjectRef, Shape, Value, VmResult};

/// A pure, repeatable predicate over a receiver.
#[derive(Clone)]
pub struct Guard(Arc<dyn Fn(&ObjectRef) -> bool + Send + Sync>);

impl Guard {
    /// Wrap a predicate. It must be side-effect free and stable for a given
    /// engine state.
    pub fn new(check: impl Fn(&ObjectRef) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(check))
    }

    /// Evaluate against a receiver.
    pub fn check(&self, receiver: &ObjectRef) -> bool {
        (self.0)(receiver)
    }

    /// The guard that always holds.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    /// Holds while the receiver is still on `shape`. Any object sharing the
    /// shape passes; this is the guard for shape-transition-bound writes.
    pub fn shape_of(shape: &Arc<Shape>) -> Self {
        let shape = shape.clone();
        Self::new(move |receiver| Arc::ptr_eq(&receiver.shape(), &shape))
    }

    /// Holds only for the exact object instance.
    pub fn identity(object: &ObjectRef) -> Self {
        let object = object.clone();
        Self::new(move |receiver| Arc::ptr_eq(receiver, &object))
    }

    /// Holds while the prototype-chain segment from `start` through
    /// `distance` hops is unchanged: same objects, same shapes, same links.
    /// This is the guard for resolutions bound to an inherited property —
    /// reshaping any ancestor in the segment invalidates it.
    pub fn proto_chain(start: &ObjectRef, distance: usize) -> Self {
        let mut links: SmallVec<[(ObjectRef, Arc<Shape>); 2]> = SmallVec::new();
        let mut current = start.clone();
        for _ in 0..=distance {
            links.push((current.clone(), current.shape()));
            match current.proto() {
                Some(proto) => current = proto,
                None => break,
            }
        }

        Self::new(move |receiver| {
            let mut current = receiver.clone();
            for (index, (object, shape)) in links.iter().enumerate() {
                if !Arc::ptr_eq(&current, object) || !Arc::ptr_eq(&current.shape(), shape) {
                    return false;
                }
                if index + 1 < links.len() {
                    match current.proto() {
                        Some(proto) => current = proto,
                        None => return false,
                    }
                }
            }
            true
        })
    }

    /// Conjunction of two guards.
    pub fn and(self, other: Guard) -> Guard {
        Guard::new(move |receiver| self.check(receiver) && other.check(receiver))
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Guard")
    }
}

/// A bound property read.
#[derive(Clone)]
pub struct ReadAction(Arc<dyn Fn(&ObjectRef) -> VmResult<Value> + Send + Sync>);

impl ReadAction {
    /// Wrap a read closure.
    pub fn new(read: impl Fn(&ObjectRef) -> VmResult<Value> + Send + Sync + 'static) -> Self {
        Self(Arc::new(read))
    }

    /// Perform the read against a receiver the guard admitted.
    pub fn invoke(&self, receiver: &ObjectRef) -> VmResult<Value> {
        (self.0)(receiver)
    }
}

impl std::fmt::Debug for ReadAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReadAction")
    }
}

/// A bound property write.
#[derive(Clone)]
pub struct WriteAction(Arc<dyn Fn(&ObjectRef, Value) -> VmResult<()> + Send + Sync>);

impl WriteAction {
    /// Wrap a write closure.
    pub fn new(write: impl Fn(&ObjectRef, Value) -> VmResult<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(write))
    }

    /// Perform the write against a receiver the guard admitted.
    pub fn invoke(&self, receiver: &ObjectRef, value: Value) -> VmResult<()> {
        (self.0)(receiver, value)
    }
}

impl std::fmt::Debug for WriteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WriteAction")
    }
}

/// A guarded read resolution, cached by the external linking layer.
#[derive(Clone, Debug)]
pub struct GuardedRead {
    /// Validity predicate.
    pub guard: Guard,
    /// The bound read.
    pub action: ReadAction,
}

impl GuardedRead {
    /// Check the guard, then read. `None` means the resolution is stale and
    /// must be discarded.
    pub fn try_invoke(&self, receiver: &ObjectRef) -> Option<VmResult<Value>> {
        self.guard
            .check(receiver)
            .then(|| self.action.invoke(receiver))
    }
}

/// A guarded write resolution, cached by the external linking layer.
#[derive(Clone, Debug)]
pub struct GuardedWrite {
    /// Validity predicate.
    pub guard: Guard,
    /// The bound write.
    pub action: WriteAction,
}

impl GuardedWrite {
    /// Check the guard, then write. `None` means the resolution is stale and
    /// must be discarded.
    pub fn try_invoke(&self, receiver: &ObjectRef, value: Value) -> Option<VmResult<()>> {
        self.guard
            .check(receiver)
            .then(|| self.action.invoke(receiver, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marten_vm_object::{JsObject, PropertyFlags};

    #[test]
    fn test_shape_guard_tracks_transitions() {
        let obj = JsObject::new(None);
        let guard = Guard::shape_of(&obj.shape());
        assert!(guard.check(&obj));

        // Same-shape stranger passes; that's the point of a shape guard.
        let stranger = JsObject::new(None);
        assert!(guard.check(&stranger));

        obj.add_own_value("x".into(), Value::Int(1), PropertyFlags::data())
            .unwrap();
        assert!(!guard.check(&obj));
        assert!(guard.check(&stranger));
    }

    #[test]
    fn test_identity_guard() {
        let a = JsObject::new(None);
        let b = JsObject::new(None);
        let guard = Guard::identity(&a);
        assert!(guard.check(&a));
        assert!(!guard.check(&b));
    }

    #[test]
    fn test_proto_chain_guard_invalidates_on_ancestor_reshape() {
        let grandparent = JsObject::new(None);
        grandparent
            .add_own_value("x".into(), Value::Int(1), PropertyFlags::data())
            .unwrap();
        let parent = JsObject::new(Some(grandparent.clone()));
        let child = JsObject::new(Some(parent.clone()));

        let guard = Guard::proto_chain(&child, 2);
        assert!(guard.check(&child));

        // Reshaping the middle of the segment invalidates.
        parent
            .add_own_value("noise".into(), Value::Int(0), PropertyFlags::data())
            .unwrap();
        assert!(!guard.check(&child));
    }

    #[test]
    fn test_proto_chain_guard_invalidates_on_relink() {
        let owner = JsObject::new(None);
        owner
            .add_own_value("x".into(), Value::Int(1), PropertyFlags::data())
            .unwrap();
        let child = JsObject::new(Some(owner.clone()));

        let guard = Guard::proto_chain(&child, 1);
        assert!(guard.check(&child));

        child.set_proto(None).unwrap();
        assert!(!guard.check(&child));
    }

    #[test]
    fn test_guarded_write_try_invoke() {
        let obj = JsObject::new(None);
        let target = obj.clone();
        let guarded = GuardedWrite {
            guard: Guard::identity(&obj),
            action: WriteAction::new(move |receiver, value| {
                receiver.set(&"v".into(), value, false)
            }),
        };

        assert!(guarded.try_invoke(&obj, Value::Int(3)).unwrap().is_ok());
        assert_eq!(target.get(&"v".into()).unwrap(), Value::Int(3));

        let other = JsObject::new(None);
        assert!(guarded.try_invoke(&other, Value::Int(4)).is_none());
    }
}
