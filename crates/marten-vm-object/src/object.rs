//! Objects
//!
//! A `JsObject` is a shape pointer plus two tiers of value storage: a fixed
//! inline slot array sized by the object's layout, and a growable overflow
//! (spill) array. Two objects on the same shape are layout-compatible, so a
//! cached resolution only needs to compare shape pointers.
//!
//! All mutation of one object happens on behalf of that object's single
//! executing invocation; shapes themselves are shared and immutable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use parking_lot::RwLock;

use crate::error::{VmError, VmResult};
use crate::property::{Property, PropertyFlags, PropertyKey, Slot, SlotLocation};
use crate::scope::UNSET_SPLIT_STATE;
use crate::shape::{DEFAULT_FIELD_CAPACITY, Shape};
use crate::value::Value;

/// Shared object handle.
pub type ObjectRef = Arc<JsObject>;

/// Overflow storage grows in blocks of this many slots.
pub const SPILL_BLOCK: usize = 8;

/// Overflow capacity after growing to hold `slots` slots: at least doubling,
/// in multiples of [`SPILL_BLOCK`].
pub fn spill_capacity_for(slots: usize) -> usize {
    let mut capacity = 0;
    while capacity < slots {
        capacity = if capacity == 0 { SPILL_BLOCK } else { capacity * 2 };
    }
    capacity
}

/// A dynamic object: current shape, inline slots, overflow storage and a
/// prototype link.
pub struct JsObject {
    shape: RwLock<Arc<Shape>>,
    inline: RwLock<Box<[Value]>>,
    spill: RwLock<Vec<Value>>,
    proto: RwLock<Option<ObjectRef>>,
    is_scope: bool,
    extensible: AtomicBool,
    split_state: AtomicI32,
}

impl JsObject {
    /// New ordinary object with the default inline capacity.
    pub fn new(proto: Option<ObjectRef>) -> ObjectRef {
        Self::with_capacity(proto, DEFAULT_FIELD_CAPACITY)
    }

    /// New ordinary object with an explicit inline-slot capacity (supplied by
    /// the code generator's object layout).
    pub fn with_capacity(proto: Option<ObjectRef>, field_capacity: u32) -> ObjectRef {
        Self::make(proto, field_capacity, false)
    }

    /// New scope container: reads and writes of names on it are declarations,
    /// and it carries the split-state resumption marker.
    pub fn scope(proto: Option<ObjectRef>) -> ObjectRef {
        Self::make(proto, DEFAULT_FIELD_CAPACITY, true)
    }

    /// New scope container with an explicit inline-slot capacity.
    pub fn scope_with_capacity(proto: Option<ObjectRef>, field_capacity: u32) -> ObjectRef {
        Self::make(proto, field_capacity, true)
    }

    fn make(proto: Option<ObjectRef>, field_capacity: u32, is_scope: bool) -> ObjectRef {
        let inline = vec![Value::Undefined; field_capacity as usize].into_boxed_slice();
        Arc::new(Self {
            shape: RwLock::new(Shape::root(field_capacity)),
            inline: RwLock::new(inline),
            spill: RwLock::new(Vec::new()),
            proto: RwLock::new(proto),
            is_scope,
            extensible: AtomicBool::new(true),
            split_state: AtomicI32::new(UNSET_SPLIT_STATE),
        })
    }

    /// Current shape.
    pub fn shape(&self) -> Arc<Shape> {
        self.shape.read().clone()
    }

    /// Move from `old` to `new` iff the current shape is still `old`.
    ///
    /// Guarded write actions use this so a cached transition only fires for
    /// objects that are still where the cache left them.
    pub fn compare_and_swap_shape(&self, old: &Arc<Shape>, new: &Arc<Shape>) -> bool {
        let mut shape = self.shape.write();
        if Arc::ptr_eq(&shape, old) {
            *shape = new.clone();
            true
        } else {
            false
        }
    }

    fn swap_shape(&self, new: Arc<Shape>) {
        *self.shape.write() = new;
    }

    /// Prototype link.
    pub fn proto(&self) -> Option<ObjectRef> {
        self.proto.read().clone()
    }

    /// Replace the prototype link. Rejects chains that would cycle back to
    /// this object, which keeps every chain walk in this crate finite.
    pub fn set_proto(self: &Arc<Self>, proto: Option<ObjectRef>) -> VmResult<()> {
        let mut cursor = proto.clone();
        while let Some(ancestor) = cursor {
            if Arc::ptr_eq(&ancestor, self) {
                return Err(VmError::type_error("cyclic prototype chain"));
            }
            cursor = ancestor.proto();
        }
        *self.proto.write() = proto;
        Ok(())
    }

    /// True for scope containers.
    pub fn is_scope(&self) -> bool {
        self.is_scope
    }

    /// True until [`JsObject::prevent_extensions`] is called.
    pub fn is_extensible(&self) -> bool {
        self.extensible.load(Ordering::Acquire)
    }

    /// Forbid adding new own properties.
    pub fn prevent_extensions(&self) {
        self.extensible.store(false, Ordering::Release);
    }

    /// The resumption marker for split function bodies; meaningful on scope
    /// containers only. [`UNSET_SPLIT_STATE`] when no segment is in flight.
    pub fn split_state(&self) -> i32 {
        self.split_state.load(Ordering::Acquire)
    }

    /// Set the resumption marker.
    pub fn set_split_state(&self, state: i32) {
        self.split_state.store(state, Ordering::Release);
    }

    /// Read one storage slot. Overflow reads past the current spill length
    /// yield `undefined`.
    pub fn slot(&self, slot: Slot) -> Value {
        match slot {
            Slot::Inline(i) => self
                .inline
                .read()
                .get(i as usize)
                .cloned()
                .unwrap_or(Value::Undefined),
            Slot::Overflow(i) => self
                .spill
                .read()
                .get(i as usize)
                .cloned()
                .unwrap_or(Value::Undefined),
        }
    }

    /// Write one storage slot, quietly extending overflow storage when the
    /// index is past the current length.
    pub fn set_slot(&self, slot: Slot, value: Value) {
        match slot {
            Slot::Inline(i) => {
                let mut inline = self.inline.write();
                if let Some(cell) = inline.get_mut(i as usize) {
                    *cell = value;
                }
            }
            Slot::Overflow(i) => {
                let mut spill = self.spill.write();
                let index = i as usize;
                if index >= spill.len() {
                    spill.resize(spill_capacity_for(index + 1), Value::Undefined);
                }
                spill[index] = value;
            }
        }
    }

    /// Current overflow storage length.
    pub fn spill_len(&self) -> usize {
        self.spill.read().len()
    }

    /// Grow overflow storage to exactly `new_len` slots.
    pub fn grow_spill(&self, new_len: usize) {
        let mut spill = self.spill.write();
        if new_len > spill.len() {
            spill.resize(new_len, Value::Undefined);
        }
    }

    fn ensure_slot_capacity(&self, location: SlotLocation) {
        if location.is_overflow() {
            let end = match location {
                SlotLocation::OverflowValue(i) => i + 1,
                SlotLocation::OverflowAccessorPair { set, .. } => set + 1,
                _ => 0,
            } as usize;
            if end > self.spill_len() {
                self.grow_spill(spill_capacity_for(end));
            }
        }
    }

    /// True when this object itself holds `key`.
    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.shape().find(key).is_some()
    }

    /// True when `key` resolves anywhere on the prototype chain.
    pub fn has(self: &Arc<Self>, key: &PropertyKey) -> bool {
        self.find_property(key, true).is_some()
    }

    /// Own property keys in insertion order.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.shape().own_keys()
    }

    /// Read a property, walking the prototype chain and invoking a getter if
    /// one is defined. Missing properties read as `undefined`.
    pub fn get(self: &Arc<Self>, key: &PropertyKey) -> VmResult<Value> {
        match self.find_property(key, true) {
            Some(find) => find.get_value(),
            None => Ok(Value::Undefined),
        }
    }

    /// Generic (slow-path) write. This is also the fallback every cached
    /// write action takes when its shape compare-and-swap loses.
    ///
    /// Scope containers write through to the declaring scope; ordinary
    /// objects shadow inherited data properties with a new own property.
    pub fn set(self: &Arc<Self>, key: &PropertyKey, value: Value, strict: bool) -> VmResult<()> {
        let scope = self.is_scope();
        let mut find = self.find_property_from(key, true, scope, self);

        // Ordinary assignment shadows an inherited data property instead of
        // reusing it; only scopes write through to the declaring scope.
        if let Some(shadowed) = find.take_if(|f| {
            !scope && f.is_inherited() && !f.property().location().is_accessor()
        }) {
            if !shadowed.property().is_writable() {
                return if strict {
                    Err(VmError::type_error(format!(
                        "cannot assign to read-only property \"{key}\""
                    )))
                } else {
                    Ok(())
                };
            }
        }

        match find {
            Some(found) => found.set_value(value, strict),
            None => {
                if scope && strict {
                    return Err(VmError::reference_error(format!("\"{key}\" is not defined")));
                }
                if !self.is_extensible() {
                    return if strict {
                        Err(VmError::type_error(format!(
                            "cannot add property \"{key}\", object is not extensible"
                        )))
                    } else {
                        Ok(())
                    };
                }
                self.add_own_value(key.clone(), value, PropertyFlags::data())?;
                Ok(())
            }
        }
    }

    /// Add a new own data property, allocating the next inline or overflow
    /// slot. Writes the value of an already-present key instead of
    /// re-adding it.
    pub fn add_own_value(
        self: &Arc<Self>,
        key: PropertyKey,
        value: Value,
        flags: PropertyFlags,
    ) -> VmResult<Property> {
        loop {
            let old = self.shape();
            if let Some(existing) = old.find(&key) {
                let existing = existing.clone();
                if existing.location().is_accessor() {
                    return Err(VmError::type_error(format!(
                        "property \"{key}\" is accessor-backed"
                    )));
                }
                self.set_slot(existing.location().write_slot(), value);
                return Ok(existing);
            }
            let (new_shape, property) = old.add_property(key.clone(), flags, false);
            self.ensure_slot_capacity(property.location());
            if self.compare_and_swap_shape(&old, &new_shape) {
                self.set_slot(property.location().write_slot(), value);
                return Ok(property);
            }
        }
    }

    /// Define or redefine a user accessor pair. Either slot may be
    /// `undefined` for a one-sided accessor.
    pub fn define_accessor(
        self: &Arc<Self>,
        key: PropertyKey,
        getter: Value,
        setter: Value,
        flags: PropertyFlags,
    ) -> VmResult<Property> {
        loop {
            let old = self.shape();
            match old.find(&key) {
                Some(existing) if existing.location().is_accessor() => {
                    // Same storage kind: rewrite the pair slots in place.
                    let existing = existing.clone();
                    let location = existing.location();
                    self.set_slot(location.read_slot(), getter);
                    self.set_slot(location.write_slot(), setter);
                    if existing.flags() != flags {
                        if !existing.is_configurable() {
                            return Err(VmError::type_error(format!(
                                "cannot redefine property \"{key}\""
                            )));
                        }
                        let replaced = existing.with_flags(flags);
                        let new_shape = Arc::new(old.with_replaced_property(replaced.clone()));
                        self.swap_shape(new_shape);
                        return Ok(replaced);
                    }
                    return Ok(existing);
                }
                Some(existing) => {
                    if !existing.is_configurable() {
                        return Err(VmError::type_error(format!(
                            "cannot redefine property \"{key}\""
                        )));
                    }
                    // Data-to-accessor: fresh pair slots, old slot retired.
                    let location = old.allocate(true);
                    let property = Property::new(key.clone(), flags, location);
                    let new_shape = Arc::new(old.with_replaced_property(property.clone()));
                    self.ensure_slot_capacity(location);
                    if self.compare_and_swap_shape(&old, &new_shape) {
                        self.set_slot(location.read_slot(), getter);
                        self.set_slot(location.write_slot(), setter);
                        return Ok(property);
                    }
                }
                None => {
                    let (new_shape, property) = old.add_property(key.clone(), flags, true);
                    self.ensure_slot_capacity(property.location());
                    if self.compare_and_swap_shape(&old, &new_shape) {
                        let location = property.location();
                        self.set_slot(location.read_slot(), getter);
                        self.set_slot(location.write_slot(), setter);
                        return Ok(property);
                    }
                }
            }
        }
    }

    /// Delete an own property. Missing keys delete successfully; a
    /// non-configurable property fails (TypeError in strict mode).
    pub fn delete(self: &Arc<Self>, key: &PropertyKey, strict: bool) -> VmResult<bool> {
        loop {
            let old = self.shape();
            let Some(property) = old.find(key).cloned() else {
                return Ok(true);
            };
            if !property.is_configurable() {
                return if strict {
                    Err(VmError::type_error(format!(
                        "cannot delete property \"{key}\""
                    )))
                } else {
                    Ok(false)
                };
            }
            let new_shape = Arc::new(old.without_property(key));
            if self.compare_and_swap_shape(&old, &new_shape) {
                let location = property.location();
                self.set_slot(location.read_slot(), Value::Undefined);
                self.set_slot(location.write_slot(), Value::Undefined);
                return Ok(true);
            }
        }
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsObject")
            .field("properties", &self.shape().property_count())
            .field("is_scope", &self.is_scope)
            .field("extensible", &self.is_extensible())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_roundtrip() {
        let obj = JsObject::new(None);
        obj.set(&"foo".into(), Value::Int(42), false).unwrap();
        assert_eq!(obj.get(&"foo".into()).unwrap(), Value::Int(42));
        assert_eq!(obj.get(&"bar".into()).unwrap(), Value::Undefined);
    }

    #[test]
    fn test_inline_capacity_overflow() {
        let obj = JsObject::with_capacity(None, 2);
        let a = obj.add_own_value("a".into(), Value::Int(1), PropertyFlags::data()).unwrap();
        let b = obj.add_own_value("b".into(), Value::Int(2), PropertyFlags::data()).unwrap();
        let c = obj.add_own_value("c".into(), Value::Int(3), PropertyFlags::data()).unwrap();

        assert_eq!(a.location(), SlotLocation::InlineValue(0));
        assert_eq!(b.location(), SlotLocation::InlineValue(1));
        assert_eq!(c.location(), SlotLocation::OverflowValue(0));
        assert_eq!(obj.spill_len(), SPILL_BLOCK);
        assert_eq!(obj.get(&"c".into()).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_spill_growth_is_geometric() {
        assert_eq!(spill_capacity_for(1), 8);
        assert_eq!(spill_capacity_for(8), 8);
        assert_eq!(spill_capacity_for(9), 16);
        assert_eq!(spill_capacity_for(17), 32);
    }

    #[test]
    fn test_same_structure_shares_shape() {
        let a = JsObject::new(None);
        let b = JsObject::new(None);
        a.set(&"x".into(), Value::Int(1), false).unwrap();
        b.set(&"x".into(), Value::Int(2), false).unwrap();
        assert!(Arc::ptr_eq(&a.shape(), &b.shape()));
        assert_ne!(a.get(&"x".into()).unwrap(), b.get(&"x".into()).unwrap());
    }

    #[test]
    fn test_proto_read_through() {
        let proto = JsObject::new(None);
        proto.set(&"inherited".into(), Value::from("yes"), false).unwrap();
        let obj = JsObject::new(Some(proto));
        assert_eq!(obj.get(&"inherited".into()).unwrap(), Value::from("yes"));
    }

    #[test]
    fn test_assignment_shadows_inherited_data() {
        let proto = JsObject::new(None);
        proto.set(&"x".into(), Value::Int(1), false).unwrap();
        let obj = JsObject::new(Some(proto.clone()));
        obj.set(&"x".into(), Value::Int(2), false).unwrap();
        assert_eq!(obj.get(&"x".into()).unwrap(), Value::Int(2));
        assert_eq!(proto.get(&"x".into()).unwrap(), Value::Int(1));
        assert!(obj.has_own(&"x".into()));
    }

    #[test]
    fn test_scope_write_through_to_declaring_scope() {
        let outer = JsObject::scope(None);
        outer.add_own_value("x".into(), Value::Int(1), PropertyFlags::data()).unwrap();
        let inner = JsObject::scope(Some(outer.clone()));
        inner.set(&"x".into(), Value::Int(9), false).unwrap();
        assert!(!inner.has_own(&"x".into()));
        assert_eq!(outer.get(&"x".into()).unwrap(), Value::Int(9));
    }

    #[test]
    fn test_strict_scope_assignment_to_undeclared_fails() {
        let scope = JsObject::scope(None);
        let err = scope.set(&"nope".into(), Value::Int(1), true).unwrap_err();
        assert!(matches!(err, VmError::ReferenceError(_)));
        assert!(!scope.has_own(&"nope".into()));
    }

    #[test]
    fn test_non_extensible_rejects_new_properties() {
        let obj = JsObject::new(None);
        obj.prevent_extensions();
        obj.set(&"x".into(), Value::Int(1), false).unwrap();
        assert!(!obj.has_own(&"x".into()));
        let err = obj.set(&"x".into(), Value::Int(1), true).unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }

    #[test]
    fn test_delete_and_configurable() {
        let obj = JsObject::new(None);
        obj.set(&"x".into(), Value::Int(1), false).unwrap();
        assert!(obj.delete(&"x".into(), false).unwrap());
        assert!(!obj.has_own(&"x".into()));

        obj.add_own_value("y".into(), Value::Int(2), PropertyFlags::frozen()).unwrap();
        assert!(!obj.delete(&"y".into(), false).unwrap());
        assert!(obj.delete(&"missing".into(), false).unwrap());
    }

    #[test]
    fn test_cyclic_proto_rejected() {
        let a = JsObject::new(None);
        let b = JsObject::new(Some(a.clone()));
        let err = a.set_proto(Some(b)).unwrap_err();
        assert!(matches!(err, VmError::TypeError(_)));
    }

    #[test]
    fn test_split_state_marker() {
        let scope = JsObject::scope(None);
        assert_eq!(scope.split_state(), UNSET_SPLIT_STATE);
        scope.set_split_state(3);
        assert_eq!(scope.split_state(), 3);
    }
}
