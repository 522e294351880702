//! Shapes: immutable, ordered property maps
//!
//! A `Shape` describes the structure of an object: which properties it has,
//! in insertion order, and in which storage slots they live. Objects with the
//! same structure share one shape, so a guard can compare shape pointers
//! instead of whole structures.
//!
//! Adding a property never mutates a shape; it produces a new one. The exact
//! same transition taken twice from the same shape returns the same cached
//! child, so `with_property` is deterministic and shapes stay canonical even
//! when populated from concurrent threads — a losing racer simply observes
//! the winner's child.

use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::property::{Property, PropertyFlags, PropertyKey, SlotLocation};

/// Default inline-slot capacity for object layouts that don't specify one.
pub const DEFAULT_FIELD_CAPACITY: u32 = 4;

/// Notified when a property is added through a shape.
///
/// Listeners are held weakly: a dropped listener is pruned on the next
/// notification, no unregistration required.
pub trait ShapeListener: Send + Sync {
    /// A property was added to an object on `shape`, producing a new shape.
    fn property_added(&self, shape: &Shape, property: &Property);
}

/// Cache key for one (key, flags) transition. Accessor-ness is part of the
/// storage flags of the transition.
#[derive(Clone, PartialEq, Eq, Hash)]
struct TransitionKey {
    key: PropertyKey,
    flags: PropertyFlags,
    accessor: bool,
}

/// An immutable property map plus slot-allocation counters.
pub struct Shape {
    /// Properties in insertion order.
    properties: IndexMap<PropertyKey, Property, FxBuildHasher>,

    /// Inline slots assigned so far.
    field_count: u32,

    /// Maximum inline slots for the owning object layout.
    field_capacity: u32,

    /// Overflow slots assigned so far.
    spill_length: u32,

    /// Cached transitions to child shapes. Weak so unused children die.
    transitions: RwLock<FxHashMap<TransitionKey, Weak<Shape>>>,

    /// Listeners notified on property addition.
    listeners: RwLock<Vec<Weak<dyn ShapeListener>>>,
}

impl Shape {
    /// The canonical empty shape for the given inline capacity.
    ///
    /// Roots are shared process-wide; see [`reset_shared_roots`].
    pub fn root(field_capacity: u32) -> Arc<Self> {
        shared_roots()
            .entry(field_capacity)
            .or_insert_with(|| Arc::new(Self::empty(field_capacity)))
            .clone()
    }

    /// A fresh, unshared empty shape. Prefer [`Shape::root`].
    pub fn empty(field_capacity: u32) -> Self {
        Self {
            properties: IndexMap::default(),
            field_count: 0,
            field_capacity,
            spill_length: 0,
            transitions: RwLock::new(FxHashMap::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Number of inline slots assigned.
    pub fn field_count(&self) -> u32 {
        self.field_count
    }

    /// Maximum inline slots for this layout.
    pub fn field_capacity(&self) -> u32 {
        self.field_capacity
    }

    /// Number of overflow slots assigned.
    pub fn spill_length(&self) -> u32 {
        self.spill_length
    }

    /// Look up a property by key.
    pub fn find(&self, key: &PropertyKey) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Number of properties in this shape.
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Own property keys in insertion order.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.properties.keys().cloned().collect()
    }

    /// Storage location for the next property of the given kind. Inline
    /// capacity is used while it lasts; an accessor pair that no longer fits
    /// inline goes wholly to overflow, never split across tiers.
    pub(crate) fn allocate(&self, accessor: bool) -> SlotLocation {
        if accessor {
            if self.field_count + 2 <= self.field_capacity {
                SlotLocation::InlineAccessorPair {
                    get: self.field_count,
                    set: self.field_count + 1,
                }
            } else {
                SlotLocation::OverflowAccessorPair {
                    get: self.spill_length,
                    set: self.spill_length + 1,
                }
            }
        } else if self.field_count < self.field_capacity {
            SlotLocation::InlineValue(self.field_count)
        } else {
            SlotLocation::OverflowValue(self.spill_length)
        }
    }

    /// Allocate storage for a new property and transition to the shape that
    /// contains it. Returns the new shape and the located property.
    pub fn add_property(
        self: &Arc<Self>,
        key: PropertyKey,
        flags: PropertyFlags,
        accessor: bool,
    ) -> (Arc<Shape>, Property) {
        let property = Property::new(key, flags, self.allocate(accessor));
        let next = self.with_property(property.clone());
        (next, property)
    }

    /// Pure transition: the shape equal to this one plus `property`.
    ///
    /// Cached by (key, flags): repeating the same transition returns the same
    /// `Arc`. Listeners registered on this shape are notified on every call,
    /// cache hit or not.
    pub fn with_property(self: &Arc<Self>, property: Property) -> Arc<Shape> {
        let cache_key = TransitionKey {
            key: property.key().clone(),
            flags: property.flags(),
            accessor: property.location().is_accessor(),
        };

        let next = self.cached_or_new_transition(cache_key, &property);
        self.notify_property_added(&property);
        next
    }

    fn cached_or_new_transition(
        self: &Arc<Self>,
        cache_key: TransitionKey,
        property: &Property,
    ) -> Arc<Shape> {
        {
            let transitions = self.transitions.read();
            if let Some(cached) = transitions.get(&cache_key).and_then(Weak::upgrade) {
                return cached;
            }
        }

        let mut transitions = self.transitions.write();
        // Double-check after acquiring the write lock: a racing thread may
        // have populated the entry. Both racers computed equivalent shapes;
        // only the first one stored becomes canonical.
        if let Some(cached) = transitions.get(&cache_key).and_then(Weak::upgrade) {
            return cached;
        }

        let next = Arc::new(self.grown_by(property));
        transitions.insert(cache_key, Arc::downgrade(&next));
        next
    }

    /// Build the successor shape's data. Counters advance by the slots the
    /// new property occupies in its tier.
    fn grown_by(&self, property: &Property) -> Shape {
        let mut properties = self.properties.clone();
        properties.insert(property.key().clone(), property.clone());

        let used = property.location().slots_used();
        let (field_count, spill_length) = if property.location().is_overflow() {
            (self.field_count, self.spill_length + used)
        } else {
            (self.field_count + used, self.spill_length)
        };

        Shape {
            properties,
            field_count,
            field_capacity: self.field_capacity,
            spill_length,
            transitions: RwLock::new(FxHashMap::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The shape equal to this one minus `key`. Slot indices of the remaining
    /// properties are unchanged; freed slots are never reassigned. Deletions
    /// are rare and not transition-cached.
    pub fn without_property(&self, key: &PropertyKey) -> Shape {
        let mut properties = self.properties.clone();
        properties.shift_remove(key);
        Shape {
            properties,
            field_count: self.field_count,
            field_capacity: self.field_capacity,
            spill_length: self.spill_length,
            transitions: RwLock::new(FxHashMap::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The shape equal to this one with `property` replacing the entry of the
    /// same key, keeping its position in insertion order. Counters advance to
    /// cover a freshly allocated location (a redefinition that changed storage
    /// kind); the replaced property's old slots are retired, not reassigned.
    pub fn with_replaced_property(&self, property: Property) -> Shape {
        let location = property.location();
        let mut properties = self.properties.clone();
        properties.insert(property.key().clone(), property);

        let end = match location {
            SlotLocation::InlineValue(i) | SlotLocation::OverflowValue(i) => i + 1,
            SlotLocation::InlineAccessorPair { set, .. }
            | SlotLocation::OverflowAccessorPair { set, .. } => set + 1,
        };
        let (field_count, spill_length) = if location.is_overflow() {
            (self.field_count, self.spill_length.max(end))
        } else {
            (self.field_count.max(end), self.spill_length)
        };

        Shape {
            properties,
            field_count,
            field_capacity: self.field_capacity,
            spill_length,
            transitions: RwLock::new(FxHashMap::default()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Structural equality: same properties in the same order with the same
    /// locations and the same counters. Shapes from the same cached transition
    /// are pointer-equal; this is the slower check used by tests and debug
    /// assertions.
    pub fn structural_eq(&self, other: &Shape) -> bool {
        self.field_count == other.field_count
            && self.field_capacity == other.field_capacity
            && self.spill_length == other.spill_length
            && self.properties.len() == other.properties.len()
            && self
                .properties
                .iter()
                .zip(other.properties.iter())
                .all(|((ka, pa), (kb, pb))| ka == kb && pa == pb)
    }

    /// Register a listener, held weakly.
    pub fn add_listener(&self, listener: &Arc<dyn ShapeListener>) {
        self.listeners.write().push(Arc::downgrade(listener));
    }

    /// Remove a listener by identity.
    pub fn remove_listener(&self, listener: &Arc<dyn ShapeListener>) {
        self.listeners
            .write()
            .retain(|weak| weak.upgrade().is_some_and(|l| !Arc::ptr_eq(&l, listener)));
    }

    fn notify_property_added(&self, property: &Property) {
        let listeners: Vec<Arc<dyn ShapeListener>> = {
            let mut registered = self.listeners.write();
            registered.retain(|weak| weak.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.property_added(self, property);
        }
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("property_count", &self.property_count())
            .field("field_count", &self.field_count)
            .field("field_capacity", &self.field_capacity)
            .field("spill_length", &self.spill_length)
            .finish()
    }
}

/// Process-wide root-shape registry, keyed by inline capacity.
fn shared_roots() -> &'static DashMap<u32, Arc<Shape>> {
    static ROOTS: OnceLock<DashMap<u32, Arc<Shape>>> = OnceLock::new();
    ROOTS.get_or_init(DashMap::new)
}

/// Drop all shared root shapes. Test isolation only: objects created before
/// the reset keep their shapes, but new objects start from fresh roots with
/// empty transition caches.
pub fn reset_shared_roots() {
    shared_roots().clear();
}
