//! # Marten VM Object Model
//!
//! Dynamic object, property and shape model for the Marten engine.
//!
//! ## Design Principles
//!
//! - **Shapes**: immutable, insertion-ordered property maps shared between
//!   structurally-identical objects, evolved through a cached transition graph
//! - **Two-tier storage**: fixed-capacity inline slots plus a growable
//!   overflow (spill) array per object
//! - **Receiver-correct lookup**: prototype-chain resolution that remembers
//!   where a property was found, so bound accessors never silently change
//!   their receiver
//! - **Scope roles**: scope containers, the split-state resumption marker and
//!   the transient `with`-override view are part of the object model

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod lookup;
pub mod object;
pub mod property;
pub mod scope;
pub mod shape;
pub mod value;
pub mod with;

pub use error::{SourcePosition, VmError, VmResult};
pub use lookup::{LookupResult, proto_ancestor};
pub use object::{JsObject, ObjectRef};
pub use property::{Property, PropertyFlags, PropertyKey, Slot, SlotLocation};
pub use scope::{GenericScopeFactory, ScopeFactory, UNSET_SPLIT_STATE, declare_global};
pub use shape::{Shape, ShapeListener};
pub use value::{NativeFunction, Value};
pub use with::{WithLookup, WithParent, WithScope};
