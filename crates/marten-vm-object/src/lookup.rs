//! Prototype-chain lookup
//!
//! `find_property` walks the prototype chain and remembers three things: the
//! object the search started at, the object that actually owns the property,
//! and the property itself. Everything a guarded resolution needs — receiver
//! choice, chain distance, read/write bindings — derives from that triple.

use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::object::{JsObject, ObjectRef};
use crate::property::{Property, PropertyKey};
use crate::value::{NativeFunction, Value};

/// The ancestor `distance` prototype hops above `obj`, if the chain is still
/// that long.
pub fn proto_ancestor(obj: &ObjectRef, distance: usize) -> Option<ObjectRef> {
    let mut current = obj.clone();
    for _ in 0..distance {
        current = current.proto()?;
    }
    Some(current)
}

impl JsObject {
    /// Find `key` on this object or, when `deep`, anywhere up the prototype
    /// chain. Returns `None` rather than erroring when the key is absent.
    pub fn find_property(self: &Arc<Self>, key: &PropertyKey, deep: bool) -> Option<LookupResult> {
        self.find_property_from(key, deep, false, self)
    }

    /// Full lookup: `stop_on_non_scope` cuts a deep search at the first
    /// non-scope object past `start`, which is how scope-chain assignment
    /// avoids resolving to e.g. a prototype method of the global's proto.
    pub fn find_property_from(
        self: &Arc<Self>,
        key: &PropertyKey,
        deep: bool,
        stop_on_non_scope: bool,
        start: &ObjectRef,
    ) -> Option<LookupResult> {
        if stop_on_non_scope && !Arc::ptr_eq(self, start) && !self.is_scope() {
            return None;
        }

        if let Some(property) = self.shape().find(key) {
            return Some(LookupResult::new(start.clone(), self.clone(), property.clone()));
        }

        if deep {
            if let Some(proto) = self.proto() {
                return proto.find_property_from(key, deep, stop_on_non_scope, start);
            }
        }

        None
    }
}

/// A resolved property reference: where the search started, who owns the
/// property, and the property itself.
#[derive(Clone, Debug)]
pub struct LookupResult {
    start: ObjectRef,
    owner: ObjectRef,
    property: Property,
}

impl LookupResult {
    /// Build a lookup result directly (the linker does this when replaying a
    /// resolution it computed earlier).
    pub fn new(start: ObjectRef, owner: ObjectRef, property: Property) -> Self {
        Self { start, owner, property }
    }

    /// The object the search started at.
    pub fn start(&self) -> &ObjectRef {
        &self.start
    }

    /// The object that owns the property: the start object or an ancestor.
    pub fn owner(&self) -> &ObjectRef {
        &self.owner
    }

    /// The resolved property.
    pub fn property(&self) -> &Property {
        &self.property
    }

    /// True when the property lives on the start object itself.
    pub fn is_own(&self) -> bool {
        Arc::ptr_eq(&self.start, &self.owner)
    }

    /// True when the property was inherited through the prototype chain.
    pub fn is_inherited(&self) -> bool {
        !self.is_own()
    }

    /// Prototype hops from start to owner; 0 for an own property. Guards for
    /// inherited properties must validate this whole chain segment.
    pub fn chain_distance(&self) -> usize {
        let mut distance = 0;
        let mut current = self.start.clone();
        while !Arc::ptr_eq(&current, &self.owner) {
            match current.proto() {
                Some(proto) => {
                    current = proto;
                    distance += 1;
                }
                None => return distance,
            }
        }
        distance
    }

    /// The user-defined getter function, when the property is accessor-backed
    /// and the getter slot holds a callable. Fetched from the slot on every
    /// call: replacing an accessor does not change the shape, so a cached
    /// resolution must not capture the function itself.
    pub fn getter_fn(&self) -> Option<NativeFunction> {
        self.accessor_slot(true)
    }

    /// The user-defined setter function, likewise.
    pub fn setter_fn(&self) -> Option<NativeFunction> {
        self.accessor_slot(false)
    }

    fn accessor_slot(&self, getter: bool) -> Option<NativeFunction> {
        if !self.property.location().is_accessor() {
            return None;
        }
        let slot = if getter {
            self.property.location().read_slot()
        } else {
            self.property.location().write_slot()
        };
        self.owner.slot(slot).as_function().cloned()
    }

    /// Receiver for a bound getter: the start object when a user-defined
    /// getter function is present, otherwise the owner. An inherited getter
    /// keeps seeing the object the access went through; an inherited plain
    /// slot is read where it lives.
    pub fn getter_receiver(&self) -> ObjectRef {
        if self.getter_fn().is_some() {
            self.start.clone()
        } else {
            self.owner.clone()
        }
    }

    /// Receiver for a bound setter, by the same rule.
    pub fn setter_receiver(&self) -> ObjectRef {
        if self.setter_fn().is_some() {
            self.start.clone()
        } else {
            self.owner.clone()
        }
    }

    /// Read through this resolution: plain slot value, or getter invocation
    /// with the receiver chosen by [`LookupResult::getter_receiver`]. An
    /// accessor with no getter reads as `undefined`.
    pub fn get_value(&self) -> VmResult<Value> {
        if self.property.location().is_accessor() {
            match self.getter_fn() {
                Some(getter) => getter.call(&Value::Object(self.getter_receiver()), &[]),
                None => Ok(Value::Undefined),
            }
        } else {
            Ok(self.owner.slot(self.property.location().read_slot()))
        }
    }

    /// Write through this resolution. Accessor properties invoke the setter
    /// function; a missing setter is a TypeError in strict mode and a silent
    /// no-op otherwise. Data writes honor the writable flag and always land
    /// on the owner.
    pub fn set_value(&self, value: Value, strict: bool) -> VmResult<()> {
        if self.property.location().is_accessor() {
            match self.setter_fn() {
                Some(setter) => setter
                    .call(&Value::Object(self.setter_receiver()), &[value])
                    .map(|_| ()),
                None if strict => Err(VmError::type_error(format!(
                    "cannot set property \"{}\" which has only a getter",
                    self.property.key()
                ))),
                None => Ok(()),
            }
        } else if !self.property.is_writable() {
            if strict {
                Err(VmError::type_error(format!(
                    "cannot assign to read-only property \"{}\"",
                    self.property.key()
                )))
            } else {
                Ok(())
            }
        } else {
            self.owner.set_slot(self.property.location().write_slot(), value);
            Ok(())
        }
    }
}
