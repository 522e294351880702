//! Integration tests for guarded resolutions across the object model and the
//! linker: setter synthesis, variant dispatch, with-overrides and
//! deoptimization round trips.

use std::sync::Arc;

use marten_vm_linker::{
    CallSignature, CodeRef, CompiledFunction, DeoptReason, FixedVariants, FunctionVariants,
    ParamType, VariantFlags, begin_deopt, create_setter, guarded_get, guarded_set,
};
use marten_vm_object::{
    GenericScopeFactory, JsObject, PropertyFlags, Value, VmError, WithParent, WithScope,
};

/// Two objects built the same way share one shape, and a guarded write linked
/// against one applies to the other until it transitions away.
#[test]
fn test_shape_sharing_and_transition_determinism() {
    let a = JsObject::new(None);
    let b = JsObject::new(None);
    assert!(Arc::ptr_eq(&a.shape(), &b.shape()));

    a.set(&"p".into(), Value::Int(1), false).unwrap();
    b.set(&"p".into(), Value::Int(2), false).unwrap();
    // Same transition taken twice lands on the same cached shape.
    assert!(Arc::ptr_eq(&a.shape(), &b.shape()));
    assert!(a.shape().structural_eq(&b.shape()));
}

/// Strict write to an undeclared scope name: ReferenceError, no mutation.
#[test]
fn test_strict_undeclared_scope_write() {
    let scope = JsObject::scope(None);
    let shape_before = scope.shape();

    let err = create_setter(&scope, None, &"undeclared".into(), true).unwrap_err();
    assert!(matches!(err, VmError::ReferenceError(_)));
    assert!(Arc::ptr_eq(&shape_before, &scope.shape()));
    assert!(!scope.has_own(&"undeclared".into()));
}

/// Non-strict write to an undeclared scope name declares exactly one global
/// and binds the returned action to it.
#[test]
fn test_non_strict_scope_write_declares_once() {
    let scope = JsObject::scope(None);
    let count_before = scope.own_keys().len();

    let guarded = create_setter(&scope, None, &"fresh".into(), false).unwrap();
    assert_eq!(scope.own_keys().len(), count_before + 1);

    guarded.try_invoke(&scope, Value::Int(5)).unwrap().unwrap();
    assert_eq!(scope.get(&"fresh".into()).unwrap(), Value::Int(5));

    guarded.try_invoke(&scope, Value::Int(6)).unwrap().unwrap();
    assert_eq!(scope.own_keys().len(), count_before + 1);
    assert_eq!(scope.get(&"fresh".into()).unwrap(), Value::Int(6));
}

/// The (N+1)-th property on a capacity-N object lands in overflow storage.
#[test]
fn test_capacity_boundary_goes_to_overflow() {
    let obj = JsObject::with_capacity(None, 3);
    for (i, name) in ["a", "b", "c"].iter().enumerate() {
        let property = obj
            .add_own_value((*name).into(), Value::Int(i as i32), PropertyFlags::data())
            .unwrap();
        assert!(!property.location().is_overflow());
    }

    let guarded = guarded_set(&obj, &"d".into(), false).unwrap();
    guarded.try_invoke(&obj, Value::Int(3)).unwrap().unwrap();

    let property = obj.shape().find(&"d".into()).unwrap().clone();
    assert!(property.location().is_overflow());
    assert_eq!(obj.get(&"d".into()).unwrap(), Value::Int(3));
}

/// Exact apply-adapter matching accepts only an arity-exact adapter.
#[test]
fn test_exact_adapter_selection() {
    let adapter_flags = VariantFlags {
        is_apply_adapter: true,
        ..VariantFlags::default()
    };
    let mut set = FunctionVariants::new();
    for arity in 1..=3u32 {
        set.add(CompiledFunction::new(
            CallSignature::fixed(std::iter::repeat_n(ParamType::Any, arity as usize)),
            CodeRef(arity),
            adapter_flags,
        ));
    }

    let call2 = CallSignature::fixed([ParamType::Any, ParamType::Any]);
    assert_eq!(set.exact_apply_adapter(&call2).unwrap().code(), CodeRef(2));

    let call4 = CallSignature::fixed(std::iter::repeat_n(ParamType::Any, 4));
    assert!(set.exact_apply_adapter(&call4).is_none());
}

/// Fixed-set best match prefers a compatible lower-weight non-vararg variant
/// over a vararg one.
#[test]
fn test_fixed_best_match_prefers_specific_non_vararg() {
    let mut set = FunctionVariants::new();
    set.add(CompiledFunction::new(
        CallSignature::vararg([ParamType::Any]),
        CodeRef(0),
        VariantFlags::default(),
    ));
    set.add(CompiledFunction::new(
        CallSignature::fixed([ParamType::Double]),
        CodeRef(1),
        VariantFlags::default(),
    ));

    let fixed = FixedVariants::new(set);
    let call = CallSignature::fixed([ParamType::Int]);
    assert_eq!(fixed.best(&call).unwrap().code(), CodeRef(1));
}

/// With-override resolution order and receiver exposure.
#[test]
fn test_with_override_lookup_order() {
    let expression = JsObject::new(None);
    expression
        .add_own_value("x".into(), Value::from("expr"), PropertyFlags::data())
        .unwrap();
    let scope = JsObject::scope(None);
    scope
        .add_own_value("x".into(), Value::from("scope"), PropertyFlags::data())
        .unwrap();
    scope
        .add_own_value("only_scope".into(), Value::Int(1), PropertyFlags::data())
        .unwrap();

    let with = WithScope::new(
        Value::Object(expression.clone()),
        WithParent::Scope(scope.clone()),
    );

    // Expression shadows the scope and is exposed as the method receiver.
    let hit = with.lookup(&"x".into()).unwrap();
    assert!(Arc::ptr_eq(hit.receiver(), &expression));
    assert_eq!(with.get(&"x".into()).unwrap(), Value::from("expr"));

    // Fallback binds the scope, never the wrapper.
    let fallback = with.lookup(&"only_scope".into()).unwrap();
    assert!(Arc::ptr_eq(fallback.receiver(), &scope));
}

/// Deoptimization round trip: capture, single resume, merged scope, failure
/// on the second consumption.
#[test]
fn test_deopt_round_trip() {
    let enclosing = JsObject::scope(None);
    enclosing
        .add_own_value("outer".into(), Value::from("visible"), PropertyFlags::data())
        .unwrap();

    let record = begin_deopt(
        DeoptReason::NarrowNumericOverflow,
        vec![Value::Int(1), Value::from("s")],
        vec!["a".to_string(), "b".to_string()],
        3,
        vec![],
        Value::Undefined,
        ParamType::Any,
    );

    let resumption = record.resume(&enclosing, &GenericScopeFactory).unwrap();
    assert_eq!(resumption.resume_point, 3);
    assert_eq!(resumption.scope.get(&"a".into()).unwrap(), Value::Int(1));
    assert_eq!(resumption.scope.get(&"b".into()).unwrap(), Value::from("s"));
    assert_eq!(
        resumption.scope.get(&"outer".into()).unwrap(),
        Value::from("visible")
    );

    let err = record.resume(&enclosing, &GenericScopeFactory).unwrap_err();
    assert!(matches!(err, VmError::InternalError(_)));
}

/// Writing an inherited accessor-less data property through two prototype
/// levels mutates the owning ancestor and revalidates when it reshapes.
#[test]
fn test_chain_distance_setter_through_two_levels() {
    let owner = JsObject::new(None);
    owner
        .add_own_value("slot".into(), Value::Int(0), PropertyFlags::data())
        .unwrap();
    let middle = JsObject::new(Some(owner.clone()));
    let start = JsObject::new(Some(middle.clone()));

    let find = start.find_property(&"slot".into(), true).unwrap();
    assert_eq!(find.chain_distance(), 2);

    let guarded = create_setter(&start, Some(find), &"slot".into(), false).unwrap();
    guarded.try_invoke(&start, Value::Int(11)).unwrap().unwrap();

    assert_eq!(owner.get(&"slot".into()).unwrap(), Value::Int(11));
    assert!(!start.has_own(&"slot".into()));
    assert!(!middle.has_own(&"slot".into()));

    // Ancestor reshapes: the cached resolution must stop applying.
    owner
        .add_own_value("unrelated".into(), Value::Int(0), PropertyFlags::data())
        .unwrap();
    assert!(guarded.try_invoke(&start, Value::Int(12)).is_none());
}

/// A guarded read and a guarded write stay coherent across the transition
/// performed by the write.
#[test]
fn test_read_after_guarded_write_transition() {
    let obj = JsObject::new(None);
    let write = guarded_set(&obj, &"n".into(), false).unwrap();
    write.try_invoke(&obj, Value::Int(21)).unwrap().unwrap();

    let read = guarded_get(&obj, &"n".into()).unwrap();
    assert_eq!(read.try_invoke(&obj).unwrap().unwrap(), Value::Int(21));

    // The write was bound to the pre-transition shape and no longer applies;
    // the read was bound to the post-transition shape and still does.
    assert!(write.try_invoke(&obj, Value::Int(22)).is_none());
    assert!(read.try_invoke(&obj).is_some());
}
