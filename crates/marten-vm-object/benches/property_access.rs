//! Property access benchmarks
//!
//! Measures lookup cost across storage tiers and chain depths.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use marten_vm_object::{JsObject, PropertyFlags, PropertyKey, Value};

/// Benchmark: own inline-slot read (the monomorphic fast-path shape).
fn bench_own_inline_read(c: &mut Criterion) {
    let obj = JsObject::new(None);
    obj.add_own_value("x".into(), Value::Int(42), PropertyFlags::data())
        .unwrap();
    let key = PropertyKey::from("x");

    c.bench_function("own_inline_read", |b| {
        b.iter(|| black_box(obj.get(black_box(&key)).unwrap()))
    });
}

/// Benchmark: overflow-slot read after inline capacity is exhausted.
fn bench_overflow_read(c: &mut Criterion) {
    let obj = JsObject::with_capacity(None, 2);
    for i in 0..10u32 {
        obj.add_own_value(
            PropertyKey::from(format!("p{i}").as_str()),
            Value::Int(i as i32),
            PropertyFlags::data(),
        )
        .unwrap();
    }
    let key = PropertyKey::from("p9");

    c.bench_function("overflow_read", |b| {
        b.iter(|| black_box(obj.get(black_box(&key)).unwrap()))
    });
}

/// Benchmark: inherited read two prototype hops up.
fn bench_inherited_read(c: &mut Criterion) {
    let grandparent = JsObject::new(None);
    grandparent
        .add_own_value("deep".into(), Value::Int(1), PropertyFlags::data())
        .unwrap();
    let parent = JsObject::new(Some(grandparent));
    let child = JsObject::new(Some(parent));
    let key = PropertyKey::from("deep");

    c.bench_function("inherited_read_depth2", |b| {
        b.iter(|| black_box(child.get(black_box(&key)).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_own_inline_read,
    bench_overflow_read,
    bench_inherited_read
);
criterion_main!(benches);
