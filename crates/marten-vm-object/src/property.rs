//! Properties
//!
//! A `Property` is an immutable value object describing one key of a shape:
//! its attributes and where its storage lives. "Modifying" a property always
//! produces a new `Property` sharing the same key.

use std::sync::Arc;

/// Property key: a string name or an integer index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String property key
    String(Arc<str>),
    /// Integer index key
    Index(u32),
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(Arc::from(s))
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        Self::Index(i)
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// Property attributes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PropertyFlags {
    /// Property is writable
    pub writable: bool,
    /// Property is enumerable
    pub enumerable: bool,
    /// Property is configurable
    pub configurable: bool,
}

impl PropertyFlags {
    /// Default data property attributes.
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, non-configurable.
    pub const fn frozen() -> Self {
        Self {
            writable: false,
            enumerable: false,
            configurable: false,
        }
    }
}

/// One of the two per-object storage tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Fixed-capacity inline slot
    Inline(u32),
    /// Growable overflow slot
    Overflow(u32),
}

/// Where a property's storage lives.
///
/// Accessor-backed properties occupy two slots (getter, setter) instead of a
/// value slot. The discriminant replaces the deep property-class hierarchy of
/// other engines; getter/setter synthesis dispatches on this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotLocation {
    /// Plain value in an inline slot
    InlineValue(u32),
    /// Plain value in an overflow slot
    OverflowValue(u32),
    /// User accessor pair in inline slots
    InlineAccessorPair {
        /// Getter slot
        get: u32,
        /// Setter slot
        set: u32,
    },
    /// User accessor pair in overflow slots
    OverflowAccessorPair {
        /// Getter slot
        get: u32,
        /// Setter slot
        set: u32,
    },
}

impl SlotLocation {
    /// True for user-accessor-backed storage.
    pub fn is_accessor(&self) -> bool {
        matches!(
            self,
            Self::InlineAccessorPair { .. } | Self::OverflowAccessorPair { .. }
        )
    }

    /// True when the storage lives in the overflow tier.
    pub fn is_overflow(&self) -> bool {
        matches!(self, Self::OverflowValue(_) | Self::OverflowAccessorPair { .. })
    }

    /// Slot read by a get: the value slot, or the getter slot.
    pub fn read_slot(&self) -> Slot {
        match *self {
            Self::InlineValue(i) => Slot::Inline(i),
            Self::OverflowValue(i) => Slot::Overflow(i),
            Self::InlineAccessorPair { get, .. } => Slot::Inline(get),
            Self::OverflowAccessorPair { get, .. } => Slot::Overflow(get),
        }
    }

    /// Slot written by a set: the value slot, or the setter slot.
    pub fn write_slot(&self) -> Slot {
        match *self {
            Self::InlineValue(i) => Slot::Inline(i),
            Self::OverflowValue(i) => Slot::Overflow(i),
            Self::InlineAccessorPair { set, .. } => Slot::Inline(set),
            Self::OverflowAccessorPair { set, .. } => Slot::Overflow(set),
        }
    }

    /// Number of storage slots this location occupies (1 or 2).
    pub fn slots_used(&self) -> u32 {
        if self.is_accessor() { 2 } else { 1 }
    }
}

/// An immutable property: key, attributes and storage location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Property {
    key: PropertyKey,
    flags: PropertyFlags,
    location: SlotLocation,
}

impl Property {
    /// Create a property. Slot allocation is the owning shape's job; see
    /// `Shape::add_property`.
    pub fn new(key: PropertyKey, flags: PropertyFlags, location: SlotLocation) -> Self {
        Self { key, flags, location }
    }

    /// The property key.
    pub fn key(&self) -> &PropertyKey {
        &self.key
    }

    /// The property attributes.
    pub fn flags(&self) -> PropertyFlags {
        self.flags
    }

    /// Where the property's storage lives.
    pub fn location(&self) -> SlotLocation {
        self.location
    }

    /// True when writes are allowed (always false for accessor storage; the
    /// setter function decides there).
    pub fn is_writable(&self) -> bool {
        self.flags.writable
    }

    /// True when the property shows up in enumeration.
    pub fn is_enumerable(&self) -> bool {
        self.flags.enumerable
    }

    /// True when the property can be deleted or reconfigured.
    pub fn is_configurable(&self) -> bool {
        self.flags.configurable
    }

    /// New property with different attributes, sharing this key and storage.
    pub fn with_flags(&self, flags: PropertyFlags) -> Self {
        Self {
            key: self.key.clone(),
            flags,
            location: self.location,
        }
    }
}
