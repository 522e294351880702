//! Setter synthesis
//!
//! Given an object, an optional lookup result and a key, produce the guarded
//! write a call site should cache. Exactly one of four strategies applies:
//!
//! 1. a property was found — reuse it, skipping the measured prototype-chain
//!    distance so the owning ancestor receives the write
//! 2. nothing found, receiver is a scope, write is non-strict — declare the
//!    name as a new global variable
//! 3. nothing found, strict scope assignment — ReferenceError; strict mode
//!    never implicitly declares
//! 4. nothing found, ordinary object — allocate the next inline slot, or the
//!    next overflow slot (growing overflow storage when needed), and bind the
//!    write to the old-shape → new-shape transition
//!
//! Branch 4 actions move the receiver between shapes with a compare-and-swap;
//! a receiver that moved on since linking falls back to the generic write
//! path instead of corrupting storage.

use std::sync::Arc;

use tracing::debug;

use marten_vm_object::{
    LookupResult, ObjectRef, PropertyFlags, PropertyKey, Shape, Slot, SlotLocation, Value,
    VmError, VmResult, declare_global, object::spill_capacity_for, proto_ancestor,
};

use crate::guard::{Guard, GuardedWrite, WriteAction};

/// Synthesize a guarded write: the `createSetter` entry point handed to the
/// dynamic-linking layer.
pub fn create_setter(
    object: &ObjectRef,
    find: Option<LookupResult>,
    key: &PropertyKey,
    strict: bool,
) -> VmResult<GuardedWrite> {
    SetterCreator::new(object.clone(), find, key.clone(), strict).create()
}

/// Resolve `key` the way a write site does — stopping the deep search at the
/// first non-scope object when the receiver is a scope — and synthesize the
/// guarded write for the outcome. Inherited plain data properties on ordinary
/// objects are shadowed, not reused; scopes write through to the declaring
/// scope.
pub fn guarded_set(object: &ObjectRef, key: &PropertyKey, strict: bool) -> VmResult<GuardedWrite> {
    let scope = object.is_scope();
    let mut find = object.find_property_from(key, true, scope, object);

    // Ordinary assignment shadows an inherited data slot instead of reusing
    // it; a non-writable one blocks the write outright.
    if let Some(shadowed) = find.take_if(|f| {
        !scope && f.is_inherited() && !f.property().location().is_accessor()
    }) {
        if !shadowed.property().is_writable() {
            return unwritable_setter(&shadowed, key, strict);
        }
    }

    SetterCreator::new(object.clone(), find, key.clone(), strict).create()
}

fn unwritable_setter(
    find: &LookupResult,
    key: &PropertyKey,
    strict: bool,
) -> VmResult<GuardedWrite> {
    let guard = Guard::proto_chain(find.start(), find.chain_distance());
    let key = key.clone();
    let action = WriteAction::new(move |_, _| {
        if strict {
            Err(VmError::type_error(format!(
                "cannot assign to read-only property \"{key}\""
            )))
        } else {
            Ok(())
        }
    });
    Ok(GuardedWrite { guard, action })
}

/// The four-branch synthesis algorithm. One instance builds one resolution.
pub struct SetterCreator {
    object: ObjectRef,
    find: Option<LookupResult>,
    key: PropertyKey,
    strict: bool,
}

impl SetterCreator {
    /// Capture the inputs of one synthesis request.
    pub fn new(
        object: ObjectRef,
        find: Option<LookupResult>,
        key: PropertyKey,
        strict: bool,
    ) -> Self {
        Self { object, find, key, strict }
    }

    /// Run the synthesis. Exactly one branch applies.
    pub fn create(mut self) -> VmResult<GuardedWrite> {
        match self.find.take() {
            Some(find) => self.reuse_found_property(find),
            None if self.object.is_scope() && !self.strict => self.declare_scope_variable(),
            None if self.object.is_scope() => Err(VmError::reference_error(format!(
                "\"{}\" is not defined",
                self.key
            ))),
            None => self.add_new_property(),
        }
    }

    /// Branch 1: bind to the property where it lives. Inherited data writes
    /// are composed with a chain hop of the measured distance; accessor
    /// writes fetch the setter function from its slot at invoke time.
    fn reuse_found_property(self, find: LookupResult) -> VmResult<GuardedWrite> {
        let distance = find.chain_distance();
        let guard = Guard::proto_chain(find.start(), distance);
        let property = find.property().clone();
        let location = property.location();
        let key = self.key.clone();
        let strict = self.strict;
        debug!(key = %key, distance, accessor = location.is_accessor(), "setter: reuse");

        let action = if location.is_accessor() {
            WriteAction::new(move |receiver, value| {
                let Some(owner) = proto_ancestor(receiver, distance) else {
                    return receiver.set(&key, value, strict);
                };
                match owner.slot(location.write_slot()) {
                    Value::Function(setter) => setter
                        .call(&Value::Object(receiver.clone()), &[value])
                        .map(|_| ()),
                    _ if strict => Err(VmError::type_error(format!(
                        "cannot set property \"{key}\" which has only a getter"
                    ))),
                    _ => Ok(()),
                }
            })
        } else if !property.is_writable() {
            WriteAction::new(move |_, _| {
                if strict {
                    Err(VmError::type_error(format!(
                        "cannot assign to read-only property \"{key}\""
                    )))
                } else {
                    Ok(())
                }
            })
        } else {
            WriteAction::new(move |receiver, value| {
                let Some(owner) = proto_ancestor(receiver, distance) else {
                    return receiver.set(&key, value, strict);
                };
                owner.set_slot(location.write_slot(), value);
                Ok(())
            })
        };

        Ok(GuardedWrite { guard, action })
    }

    /// Branch 2: non-strict scope write to an undeclared name declares it as
    /// a global variable, once, at link time. The action is bound to the new
    /// slot on this specific scope instance.
    fn declare_scope_variable(self) -> VmResult<GuardedWrite> {
        debug!(key = %self.key, "setter: declare global");
        let property = declare_global(&self.object, self.key.clone(), Value::Undefined)?;
        let slot = property.location().write_slot();
        let guard = Guard::identity(&self.object).and(Guard::shape_of(&self.object.shape()));
        let action = WriteAction::new(move |receiver, value| {
            receiver.set_slot(slot, value);
            Ok(())
        });
        Ok(GuardedWrite { guard, action })
    }

    /// Branch 4: new own property on an ordinary object. The action is bound
    /// to the old-shape → new-shape transition: it only fires for receivers
    /// still on the old shape, and its first run performs the transition.
    fn add_new_property(self) -> VmResult<GuardedWrite> {
        let object = &self.object;
        let strict = self.strict;
        let key = self.key;

        if !object.is_extensible() {
            if strict {
                return Err(VmError::type_error(format!(
                    "cannot add property \"{key}\", object is not extensible"
                )));
            }
            let guard = Guard::shape_of(&object.shape());
            return Ok(GuardedWrite {
                guard,
                action: WriteAction::new(|_, _| Ok(())),
            });
        }

        let old_shape = object.shape();
        let (new_shape, property) = old_shape.add_property(key.clone(), PropertyFlags::data(), false);
        let guard = Guard::shape_of(&old_shape);
        debug!(key = %key, location = ?property.location(), "setter: new property");

        let action = match property.location() {
            SlotLocation::InlineValue(index) => {
                set_field(old_shape, new_shape, Slot::Inline(index), key, strict)
            }
            SlotLocation::OverflowValue(index) => {
                let used_before = old_shape.spill_length() as usize;
                let needed = index as usize + 1;
                let capacity_before = spill_capacity_for(used_before);
                if used_before == 0 {
                    set_spill_with_new(old_shape, new_shape, index, key, strict)
                } else if needed > capacity_before {
                    let new_len = spill_capacity_for(needed);
                    set_spill_with_grow(old_shape, new_shape, index, new_len, key, strict)
                } else {
                    set_spill(old_shape, new_shape, index, key, strict)
                }
            }
            // add_property with accessor=false never yields accessor storage.
            other => {
                return Err(VmError::internal(format!(
                    "unexpected storage for new data property: {other:?}"
                )));
            }
        };

        Ok(GuardedWrite { guard, action })
    }
}

/// Outcome of the transition prologue shared by every shape-bound write.
enum Transition {
    /// Shape moved from old to new; write the slot.
    Applied,
    /// Non-extensible receiver in non-strict mode; drop the write silently.
    Skipped,
    /// Receiver is not on the old shape anymore; take the generic path.
    Stale,
}

/// Extensibility re-check, then the shape compare-and-swap.
fn try_transition(
    receiver: &ObjectRef,
    old_shape: &Arc<Shape>,
    new_shape: &Arc<Shape>,
    key: &PropertyKey,
    strict: bool,
) -> VmResult<Transition> {
    if !receiver.is_extensible() {
        return if strict {
            Err(VmError::type_error(format!(
                "cannot add property \"{key}\", object is not extensible"
            )))
        } else {
            Ok(Transition::Skipped)
        };
    }
    Ok(if receiver.compare_and_swap_shape(old_shape, new_shape) {
        Transition::Applied
    } else {
        Transition::Stale
    })
}

fn set_field(
    old_shape: Arc<Shape>,
    new_shape: Arc<Shape>,
    slot: Slot,
    key: PropertyKey,
    strict: bool,
) -> WriteAction {
    WriteAction::new(move |receiver, value| {
        match try_transition(receiver, &old_shape, &new_shape, &key, strict)? {
            Transition::Applied => {
                receiver.set_slot(slot, value);
                Ok(())
            }
            Transition::Skipped => Ok(()),
            Transition::Stale => receiver.set(&key, value, strict),
        }
    })
}

fn set_spill(
    old_shape: Arc<Shape>,
    new_shape: Arc<Shape>,
    index: u32,
    key: PropertyKey,
    strict: bool,
) -> WriteAction {
    WriteAction::new(move |receiver, value| {
        match try_transition(receiver, &old_shape, &new_shape, &key, strict)? {
            Transition::Applied => {
                receiver.set_slot(Slot::Overflow(index), value);
                Ok(())
            }
            Transition::Skipped => Ok(()),
            Transition::Stale => receiver.set(&key, value, strict),
        }
    })
}

fn set_spill_with_new(
    old_shape: Arc<Shape>,
    new_shape: Arc<Shape>,
    index: u32,
    key: PropertyKey,
    strict: bool,
) -> WriteAction {
    WriteAction::new(move |receiver, value| {
        match try_transition(receiver, &old_shape, &new_shape, &key, strict)? {
            Transition::Applied => {
                receiver.grow_spill(spill_capacity_for(index as usize + 1));
                receiver.set_slot(Slot::Overflow(index), value);
                Ok(())
            }
            Transition::Skipped => Ok(()),
            Transition::Stale => receiver.set(&key, value, strict),
        }
    })
}

fn set_spill_with_grow(
    old_shape: Arc<Shape>,
    new_shape: Arc<Shape>,
    index: u32,
    new_len: usize,
    key: PropertyKey,
    strict: bool,
) -> WriteAction {
    WriteAction::new(move |receiver, value| {
        match try_transition(receiver, &old_shape, &new_shape, &key, strict)? {
            Transition::Applied => {
                receiver.grow_spill(new_len);
                receiver.set_slot(Slot::Overflow(index), value);
                Ok(())
            }
            Transition::Skipped => Ok(()),
            Transition::Stale => receiver.set(&key, value, strict),
        }
    })
}
