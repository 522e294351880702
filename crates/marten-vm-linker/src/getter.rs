//! Guarded property reads
//!
//! Derives a cacheable `(Guard, ReadAction)` pair from a prototype-chain
//! lookup. The action re-resolves the owner by hopping the recorded chain
//! distance at invoke time, so one resolution serves every receiver the
//! guard admits.

use tracing::trace;

use marten_vm_object::{LookupResult, ObjectRef, PropertyKey, SlotLocation, Value, proto_ancestor};

use crate::guard::{Guard, GuardedRead, ReadAction};

/// Resolve `key` starting at `object` and bind a guarded read for it.
/// `None` when the key misses the whole chain; the call site should then
/// cache a guarded "undefined" itself or stay unlinked.
pub fn guarded_get(object: &ObjectRef, key: &PropertyKey) -> Option<GuardedRead> {
    let find = object.find_property(key, true)?;
    trace!(key = %key, inherited = find.is_inherited(), "linking property read");
    Some(bind_read(&find, key))
}

/// Bind a guarded read from an existing lookup result.
pub fn bind_read(find: &LookupResult, key: &PropertyKey) -> GuardedRead {
    let distance = find.chain_distance();
    let guard = Guard::proto_chain(find.start(), distance);
    let location = find.property().location();
    let key = key.clone();

    let action = ReadAction::new(move |receiver| {
        let Some(owner) = proto_ancestor(receiver, distance) else {
            // The guard admitted the receiver, so the chain matches; a
            // missing ancestor means the caller skipped the guard. Fall back
            // to the generic path rather than guessing.
            return receiver.get(&key);
        };
        read_location(receiver, &owner, location)
    });

    GuardedRead { guard, action }
}

/// Read one storage location: plain slot, or getter invocation with the
/// receiver rule of [`LookupResult::getter_receiver`] applied to the live
/// slot contents.
fn read_location(
    receiver: &ObjectRef,
    owner: &ObjectRef,
    location: SlotLocation,
) -> marten_vm_object::VmResult<Value> {
    if location.is_accessor() {
        match owner.slot(location.read_slot()) {
            Value::Function(getter) => getter.call(&Value::Object(receiver.clone()), &[]),
            _ => Ok(Value::Undefined),
        }
    } else {
        Ok(owner.slot(location.read_slot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marten_vm_object::{JsObject, NativeFunction, PropertyFlags};

    #[test]
    fn test_guarded_read_own() {
        let obj = JsObject::new(None);
        obj.add_own_value("x".into(), Value::Int(42), PropertyFlags::data())
            .unwrap();

        let guarded = guarded_get(&obj, &"x".into()).unwrap();
        assert_eq!(guarded.try_invoke(&obj).unwrap().unwrap(), Value::Int(42));
    }

    #[test]
    fn test_guarded_read_inherited_invalidates_on_owner_reshape() {
        let proto = JsObject::new(None);
        proto
            .add_own_value("x".into(), Value::Int(1), PropertyFlags::data())
            .unwrap();
        let obj = JsObject::new(Some(proto.clone()));

        let guarded = guarded_get(&obj, &"x".into()).unwrap();
        assert_eq!(guarded.try_invoke(&obj).unwrap().unwrap(), Value::Int(1));

        proto
            .add_own_value("y".into(), Value::Int(2), PropertyFlags::data())
            .unwrap();
        assert!(guarded.try_invoke(&obj).is_none());
    }

    #[test]
    fn test_guarded_read_accessor_sees_replacement() {
        let obj = JsObject::new(None);
        obj.define_accessor(
            "a".into(),
            Value::Function(NativeFunction::new(|_, _| Ok(Value::Int(1)))),
            Value::Undefined,
            PropertyFlags::data(),
        )
        .unwrap();

        let guarded = guarded_get(&obj, &"a".into()).unwrap();
        assert_eq!(guarded.try_invoke(&obj).unwrap().unwrap(), Value::Int(1));

        // Swapping the accessor functions rewrites slots, not the shape; the
        // cached resolution stays valid and must see the new getter.
        obj.define_accessor(
            "a".into(),
            Value::Function(NativeFunction::new(|_, _| Ok(Value::Int(2)))),
            Value::Undefined,
            PropertyFlags::data(),
        )
        .unwrap();
        assert_eq!(guarded.try_invoke(&obj).unwrap().unwrap(), Value::Int(2));
    }

    #[test]
    fn test_miss_returns_none() {
        let obj = JsObject::new(None);
        assert!(guarded_get(&obj, &"missing".into()).is_none());
    }
}
