//! # Marten VM Linker
//!
//! Call-site specialization for the Marten engine. Every operation here
//! answers one question: given what a call site just observed, which concrete
//! storage location or compiled implementation should it use, and under what
//! guard does that answer stay valid?
//!
//! The linker never caches anything itself. It returns `(Guard, Action)`
//! pairs — the dynamic-linking layer owns the caches and the invalidation
//! timing. Guards are pure, repeatable predicates.
//!
//! ## Components
//!
//! - [`guard`] — guards, read/write actions, and their pairings
//! - [`getter`] — guarded property reads derived from a lookup
//! - [`setter`] — setter synthesis: reuse, declare, fail, or extend storage
//! - [`dispatch`] — compiled-function variant selection
//! - [`deopt`] — single-use resumption records for speculative execution

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod deopt;
pub mod dispatch;
pub mod getter;
pub mod guard;
pub mod setter;

pub use deopt::{DeoptReason, DeoptRecord, Resumption, begin_deopt};
pub use dispatch::{
    CallSignature, CodeRef, CompiledFunction, FixedVariants, FunctionVariants, ParamType,
    VariantFlags,
};
pub use getter::guarded_get;
pub use guard::{Guard, GuardedRead, GuardedWrite, ReadAction, WriteAction};
pub use setter::{SetterCreator, create_setter, guarded_set};
