//! Compiled-function variant dispatch
//!
//! A function may exist in several type-specialized compiled variants. Given
//! the signature a call site actually observed, dispatch picks the variant to
//! invoke: an exact apply-adapter when one fits, otherwise the best
//! compatible variant — cheapest by parameter weight, non-vararg over vararg.
//!
//! While a function can still be recompiled its variant set may grow, so
//! selection stays cheap: first compatible wins. Once the set is fixed, the
//! full weight scan runs.

use smallvec::SmallVec;
use tracing::trace;

/// A parameter (or argument) type in a call signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Boolean
    Boolean,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// Double-precision number
    Double,
    /// String reference
    Str,
    /// Callable reference
    Function,
    /// The generic "any value" type
    Any,
}

impl ParamType {
    /// Dispatch weight: more specific types cost less, the generic type the
    /// most. Lower total weight wins best-match selection.
    pub fn weight(self) -> u32 {
        match self {
            Self::Boolean => 1,
            Self::Int => 2,
            Self::Long => 3,
            Self::Double => 4,
            Self::Str => 8,
            Self::Function => 9,
            Self::Any => 10,
        }
    }

    /// True for the reference (non-primitive) types that widen to `Any`.
    pub fn is_reference(self) -> bool {
        matches!(self, Self::Str | Self::Function | Self::Any)
    }

    /// Can a parameter of this type accept an actual argument of `actual`?
    /// Numeric types substitute narrow-to-wide; every type widens to `Any`.
    pub fn accepts(self, actual: ParamType) -> bool {
        if self == actual || self == Self::Any {
            return true;
        }
        matches!(
            (actual, self),
            (Self::Int, Self::Long | Self::Double) | (Self::Long, Self::Double)
        )
    }

    /// This type with references collapsed to `Any`.
    pub fn widened(self) -> ParamType {
        if self.is_reference() { Self::Any } else { self }
    }
}

/// An ordered parameter list plus a variable-arity marker. When `vararg` is
/// set, the last parameter is the rest collector and accepts any number of
/// remaining arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallSignature {
    params: SmallVec<[ParamType; 8]>,
    vararg: bool,
}

impl CallSignature {
    /// Fixed-arity signature.
    pub fn fixed(params: impl IntoIterator<Item = ParamType>) -> Self {
        Self {
            params: params.into_iter().collect(),
            vararg: false,
        }
    }

    /// Variable-arity signature; the last parameter is the rest collector.
    pub fn vararg(params: impl IntoIterator<Item = ParamType>) -> Self {
        let params: SmallVec<[ParamType; 8]> = params.into_iter().collect();
        debug_assert!(!params.is_empty(), "vararg signature needs a collector");
        Self { params, vararg: true }
    }

    /// Parameter count, counting the rest collector as one.
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// True for variable-arity signatures.
    pub fn is_vararg(&self) -> bool {
        self.vararg
    }

    /// The parameter types.
    pub fn params(&self) -> &[ParamType] {
        &self.params
    }

    /// Total dispatch weight.
    pub fn weight(&self) -> u32 {
        self.params.iter().map(|p| p.weight()).sum()
    }

    /// Signature with references collapsed to `Any`.
    pub fn widened(&self) -> CallSignature {
        Self {
            params: self.params.iter().map(|p| p.widened()).collect(),
            vararg: self.vararg,
        }
    }

    /// Is this (parameter) signature compatible with an actual call
    /// signature? Each actual argument must be acceptable positionally; a
    /// vararg signature absorbs any surplus in the collector.
    pub fn accepts_call(&self, call: &CallSignature) -> bool {
        if call.vararg && !self.vararg {
            return false;
        }
        if self.vararg {
            let fixed = self.params.len() - 1;
            if call.arity() < fixed {
                return false;
            }
            let collector = self.params[fixed];
            return self.params[..fixed]
                .iter()
                .zip(call.params.iter())
                .all(|(p, a)| p.accepts(*a))
                && call.params[fixed.min(call.params.len())..]
                    .iter()
                    .all(|a| collector.accepts(*a));
        }
        self.arity() == call.arity()
            && self
                .params
                .iter()
                .zip(call.params.iter())
                .all(|(p, a)| p.accepts(*a))
    }
}

/// Opaque reference to a compiled body, supplied by the code generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CodeRef(pub u32);

/// Per-variant flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VariantFlags {
    /// Variant expects the callee reference as a leading bound argument
    pub needs_callee: bool,
    /// Variant may be invoked as a constructor
    pub is_constructor: bool,
    /// Variant exists only to adapt a generic apply-style call into a
    /// fixed-arity call
    pub is_apply_adapter: bool,
}

/// One type-specialized compiled implementation of a function.
#[derive(Clone, Debug)]
pub struct CompiledFunction {
    signature: CallSignature,
    code: CodeRef,
    flags: VariantFlags,
}

impl CompiledFunction {
    /// Bundle a signature, a compiled body and flags.
    pub fn new(signature: CallSignature, code: CodeRef, flags: VariantFlags) -> Self {
        Self { signature, code, flags }
    }

    /// The variant's call signature.
    pub fn signature(&self) -> &CallSignature {
        &self.signature
    }

    /// The compiled body reference.
    pub fn code(&self) -> CodeRef {
        self.code
    }

    /// The variant flags.
    pub fn flags(&self) -> VariantFlags {
        self.flags
    }

    /// True for variable-arity variants.
    pub fn is_vararg(&self) -> bool {
        self.signature.is_vararg()
    }

    /// Parameter count excluding the bound callee slot.
    pub fn non_callee_arity(&self) -> usize {
        self.signature.arity() - usize::from(self.flags.needs_callee)
    }
}

/// The ordered variant list of one function, most specific first by
/// convention. The order bounds typical scan length; correctness does not
/// depend on it.
#[derive(Clone, Debug, Default)]
pub struct FunctionVariants {
    variants: Vec<CompiledFunction>,
}

impl FunctionVariants {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an existing list, keeping its order.
    pub fn from_variants(variants: Vec<CompiledFunction>) -> Self {
        Self { variants }
    }

    /// Append a variant (callers keep the most specific near the front).
    pub fn add(&mut self, variant: CompiledFunction) {
        self.variants.push(variant);
    }

    /// Number of variants.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// True when no variant has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Iterate in order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledFunction> {
        self.variants.iter()
    }

    /// Best variant for a call signature.
    ///
    /// While `recompilable`, the set may still grow, so selection is the
    /// first compatible non-vararg variant, falling back to the first
    /// compatible vararg one. For a fixed set, a stable linear scan keeps the
    /// strictly better candidate: compatible, lower total weight, non-vararg
    /// over vararg on equal weight, first found wins on a full tie.
    pub fn best(&self, call: &CallSignature, recompilable: bool) -> Option<&CompiledFunction> {
        let selected = if recompilable {
            self.variants
                .iter()
                .find(|v| !v.is_vararg() && v.signature.accepts_call(call))
                .or_else(|| self.variants.iter().find(|v| v.signature.accepts_call(call)))
        } else {
            let mut best: Option<&CompiledFunction> = None;
            for candidate in &self.variants {
                if !candidate.signature.accepts_call(call) {
                    continue;
                }
                best = match best {
                    None => Some(candidate),
                    Some(current) if strictly_better(candidate, current) => Some(candidate),
                    Some(current) => Some(current),
                };
            }
            best
        };
        trace!(
            call = ?call,
            recompilable,
            selected = selected.map(|v| v.code.0),
            "variant dispatch"
        );
        selected
    }

    /// Exact apply-adapter match: an adapter variant whose parameter count
    /// equals the requested arity and whose signature, references widened to
    /// `Any`, equals the requested signature. No partial matches — padding a
    /// mismatched arity with defaults would change program semantics.
    pub fn exact_apply_adapter(&self, call: &CallSignature) -> Option<&CompiledFunction> {
        self.variants.iter().find(|v| {
            v.flags.is_apply_adapter
                && v.signature.arity() == call.arity()
                && v.signature.is_vararg() == call.is_vararg()
                && v.signature.widened() == call.widened()
        })
    }

    /// The signature a maximally generic invocation path uses: vararg if any
    /// variant is, otherwise fixed-arity sized to the largest non-callee
    /// parameter count plus one leading callee slot.
    pub fn generic_signature(&self) -> CallSignature {
        if self.variants.iter().any(CompiledFunction::is_vararg) {
            return CallSignature::vararg([ParamType::Any, ParamType::Any]);
        }
        let widest = self
            .variants
            .iter()
            .map(CompiledFunction::non_callee_arity)
            .max()
            .unwrap_or(0);
        CallSignature::fixed(std::iter::repeat_n(ParamType::Any, widest + 1))
    }
}

fn strictly_better(candidate: &CompiledFunction, best: &CompiledFunction) -> bool {
    let (cw, bw) = (candidate.signature.weight(), best.signature.weight());
    cw < bw || (cw == bw && best.is_vararg() && !candidate.is_vararg())
}

/// A variant set that can no longer grow: no further recompilation.
///
/// All variants of one function must agree on whether they need a bound
/// callee; a heterogeneous set is a programming error caught here, at
/// construction, not at call time.
#[derive(Clone, Debug)]
pub struct FixedVariants {
    inner: FunctionVariants,
    needs_callee: bool,
}

impl FixedVariants {
    /// Freeze a variant set.
    ///
    /// # Panics
    ///
    /// When the variants disagree on callee binding.
    pub fn new(inner: FunctionVariants) -> Self {
        let needs_callee = inner
            .variants
            .first()
            .map(|v| v.flags.needs_callee)
            .unwrap_or(false);
        assert!(
            inner.variants.iter().all(|v| v.flags.needs_callee == needs_callee),
            "fixed variant set disagrees on callee binding"
        );
        Self { inner, needs_callee }
    }

    /// Whether every variant expects a bound callee.
    pub fn needs_callee(&self) -> bool {
        self.needs_callee
    }

    /// The underlying ordered set.
    pub fn variants(&self) -> &FunctionVariants {
        &self.inner
    }

    /// Best variant under fixed-set rules (full weight scan).
    pub fn best(&self, call: &CallSignature) -> Option<&CompiledFunction> {
        self.inner.best(call, false)
    }

    /// Exact apply-adapter match.
    pub fn exact_apply_adapter(&self, call: &CallSignature) -> Option<&CompiledFunction> {
        self.inner.exact_apply_adapter(call)
    }

    /// Generic invocation signature.
    pub fn generic_signature(&self) -> CallSignature {
        self.inner.generic_signature()
    }
}
