//! Deoptimization records
//!
//! A variant compiled under optimistic type assumptions may discover
//! mid-flight that an assumption is false. It then captures its live state in
//! a `DeoptRecord` and unwinds; the engine resumes a more general
//! implementation at the recorded program point with the captured locals
//! merged over the enclosing scope. No completed side effect is re-executed.
//!
//! This is not error handling. The record is a structured-resume value: it is
//! consumed exactly once, its captured state is released on consumption, and
//! nothing about it is ever visible to script code.
//!
//! # Lifecycle
//!
//! ```text
//! optimistic variant
//!   │  assumption fails at point N
//!   ▼
//! begin_deopt(locals, names, N, prior)   ← capture
//!   │
//!   ▼
//! record.resume(enclosing, factory)      ← single use
//!   │  merged scope (locals shadow enclosing), resume point N
//!   ▼
//! general variant continues at N
//! ```

use parking_lot::Mutex;
use tracing::debug;

use marten_vm_object::{ObjectRef, PropertyFlags, ScopeFactory, Value, VmError, VmResult};

use crate::dispatch::ParamType;

/// Why an optimistic assumption failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeoptReason {
    /// A value stopped being representable in its assumed narrow numeric type
    NarrowNumericOverflow,
    /// A type guard failed (e.g. expected int32, saw string)
    TypeAssumptionFailed,
    /// The optimistic variant hit an operation it cannot handle
    UnsupportedOperation,
}

/// Captured state of one failed optimistic execution, consumed exactly once.
#[derive(Debug)]
pub struct DeoptRecord {
    captured: Mutex<Option<CapturedFrame>>,
    reason: DeoptReason,
    resume_point: u32,
    prior_resume_points: Vec<u32>,
    return_type: ParamType,
}

#[derive(Debug)]
struct CapturedFrame {
    /// Live locals paired with their symbolic names.
    locals: Vec<(String, Value)>,
    /// Return value already computed when the assumption failed, if any.
    return_value: Value,
}

/// Everything the general implementation needs to continue.
#[derive(Debug)]
pub struct Resumption {
    /// Fresh scope exposing the captured locals, prototyped on the enclosing
    /// scope so unshadowed names fall through.
    pub scope: ObjectRef,
    /// Program point to re-enter at.
    pub resume_point: u32,
    /// The partial return value computed before the failure.
    pub return_value: Value,
}

/// Capture a failed optimistic execution.
///
/// `locals` and `names` are paired positionally. `prior_resume_points` lists
/// the resumption points already taken for this logical invocation so the
/// engine can refuse to re-optimize through a point that keeps failing.
pub fn begin_deopt(
    reason: DeoptReason,
    locals: Vec<Value>,
    names: Vec<String>,
    resume_point: u32,
    prior_resume_points: Vec<u32>,
    return_value: Value,
    return_type: ParamType,
) -> DeoptRecord {
    assert_eq!(
        locals.len(),
        names.len(),
        "captured locals and names must pair up"
    );
    debug!(?reason, resume_point, locals = locals.len(), "deoptimizing");
    DeoptRecord {
        captured: Mutex::new(Some(CapturedFrame {
            locals: names.into_iter().zip(locals).collect(),
            return_value,
        })),
        reason,
        resume_point,
        prior_resume_points,
        return_type,
    }
}

impl DeoptRecord {
    /// Why the optimistic variant gave up.
    pub fn reason(&self) -> DeoptReason {
        self.reason
    }

    /// The program point to resume at.
    pub fn resume_point(&self) -> u32 {
        self.resume_point
    }

    /// Resumption points already taken for this logical invocation.
    pub fn prior_resume_points(&self) -> &[u32] {
        &self.prior_resume_points
    }

    /// True when this invocation already resumed at `point` once. The engine
    /// uses this to force the general path instead of re-entering an
    /// optimistic variant that would fail the same way forever.
    pub fn has_resumed_at(&self, point: u32) -> bool {
        self.prior_resume_points.contains(&point)
    }

    /// The resume-point list for the continuation this record starts: the
    /// prior points plus this record's own.
    pub fn next_resume_points(&self) -> Vec<u32> {
        let mut points = self.prior_resume_points.clone();
        points.push(self.resume_point);
        points
    }

    /// Declared return type of the interrupted expression.
    pub fn return_type(&self) -> ParamType {
        self.return_type
    }

    /// True once [`DeoptRecord::resume`] has run.
    pub fn is_consumed(&self) -> bool {
        self.captured.lock().is_none()
    }

    /// Consume the record: merge the captured locals onto a fresh scope
    /// prototyped on `enclosing` and hand back the resume point.
    ///
    /// Single use. The captured values are released here so nothing retains
    /// them past the resumption; a second call is an internal error.
    pub fn resume(
        &self,
        enclosing: &ObjectRef,
        factory: &dyn ScopeFactory,
    ) -> VmResult<Resumption> {
        let frame = self
            .captured
            .lock()
            .take()
            .ok_or_else(|| VmError::internal("deoptimization record already consumed"))?;

        let scope = factory.fresh_scope(Some(enclosing.clone()));
        for (name, value) in frame.locals {
            scope.add_own_value(name.as_str().into(), value, PropertyFlags::data())?;
        }
        debug!(resume_point = self.resume_point, "resuming general variant");

        Ok(Resumption {
            scope,
            resume_point: self.resume_point,
            return_value: frame.return_value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marten_vm_object::{GenericScopeFactory, JsObject};

    fn record(resume_point: u32, prior: Vec<u32>) -> DeoptRecord {
        begin_deopt(
            DeoptReason::NarrowNumericOverflow,
            vec![Value::Int(1), Value::from("s")],
            vec!["a".to_string(), "b".to_string()],
            resume_point,
            prior,
            Value::Undefined,
            ParamType::Any,
        )
    }

    #[test]
    fn test_resume_merges_locals_over_enclosing() {
        let enclosing = JsObject::scope(None);
        enclosing
            .add_own_value("a".into(), Value::Int(99), PropertyFlags::data())
            .unwrap();
        enclosing
            .add_own_value("outer".into(), Value::Int(7), PropertyFlags::data())
            .unwrap();

        let record = record(3, vec![]);
        let resumption = record.resume(&enclosing, &GenericScopeFactory).unwrap();

        assert_eq!(resumption.resume_point, 3);
        // Captured locals shadow the enclosing scope name-for-name.
        assert_eq!(resumption.scope.get(&"a".into()).unwrap(), Value::Int(1));
        assert_eq!(resumption.scope.get(&"b".into()).unwrap(), Value::from("s"));
        // Unshadowed names fall through.
        assert_eq!(resumption.scope.get(&"outer".into()).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_second_consumption_fails() {
        let enclosing = JsObject::scope(None);
        let record = record(3, vec![]);

        assert!(!record.is_consumed());
        record.resume(&enclosing, &GenericScopeFactory).unwrap();
        assert!(record.is_consumed());

        let err = record.resume(&enclosing, &GenericScopeFactory).unwrap_err();
        assert!(matches!(err, VmError::InternalError(_)));
    }

    #[test]
    fn test_prior_resume_points_detect_repeats() {
        let record = record(3, vec![1, 3]);
        assert!(record.has_resumed_at(3));
        assert!(!record.has_resumed_at(2));
        assert_eq!(record.next_resume_points(), vec![1, 3, 3]);
    }

    #[test]
    fn test_partial_return_value_round_trips() {
        let enclosing = JsObject::scope(None);
        let record = begin_deopt(
            DeoptReason::TypeAssumptionFailed,
            vec![],
            vec![],
            0,
            vec![],
            Value::Number(1.5),
            ParamType::Double,
        );
        assert_eq!(record.return_type(), ParamType::Double);
        let resumption = record.resume(&enclosing, &GenericScopeFactory).unwrap();
        assert_eq!(resumption.return_value, Value::Number(1.5));
    }
}
