//! 条件评估器性能基准测试
//!
//! 针对 CriterionEvaluator 的各类检查进行细粒度的性能测试。

use criterion::{BenchmarkId, Criterion as Bench, criterion_group, criterion_main};
use filter_engine::{Check, Criterion, CriterionEvaluator, SizeComparator, path};
use serde_json::{Value, json};
use std::hint::black_box;

fn sample_data() -> Value {
    json!({
        "event": { "type": "PURCHASE", "timestamp": "2024-01-15T10:00:00Z" },
        "order": {
            "amount": 1000,
            "items": ["TICKET-001", "FOOD-001", "FOOD-002"]
        },
        "user": { "level": "gold" }
    })
}

/// 深度相等检查基准
fn bench_value_checks(c: &mut Bench) {
    let mut group = c.benchmark_group("value_checks");
    let data = sample_data();

    let shallow = Criterion::value("event.type", "PURCHASE");
    group.bench_function("scalar", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&shallow), None))
    });

    let nested = Criterion::new(
        path::parse_path("order"),
        Check::Value {
            expected: json!({
                "amount": 1000,
                "items": ["TICKET-001", "FOOD-001", "FOOD-002"]
            }),
        },
    );
    group.bench_function("nested_object", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&nested), None))
    });

    let temporal = Criterion::value("event.timestamp", "2024-01-15T11:00:00+01:00");
    group.bench_function("temporal_string", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&temporal), None))
    });

    group.finish();
}

/// 数组检查基准
fn bench_array_checks(c: &mut Bench) {
    let mut group = c.benchmark_group("array_checks");
    let data = sample_data();

    let contains = Criterion::new(
        path::parse_path("order.items"),
        Check::ArrayContains {
            item: json!("FOOD-002"),
            expected_present: true,
        },
    );
    group.bench_function("array_contains", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&contains), None))
    });

    let size = Criterion::new(
        path::parse_path("order.items"),
        Check::ArraySize {
            comparator: SizeComparator::Equal,
            size: 3,
        },
    );
    group.bench_function("array_size", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&size), None))
    });

    group.finish();
}

/// 范围检查基准
fn bench_range_checks(c: &mut Bench) {
    let mut group = c.benchmark_group("range_checks");
    let data = sample_data();

    let numeric = Criterion::numeric_range("order.amount", 0.0, 5000.0);
    group.bench_function("numeric_range", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&numeric), None))
    });

    let time = Criterion::new(
        path::parse_path("event.timestamp"),
        Check::TimeRange {
            min: json!("2024-01-01T00:00:00Z"),
            max: json!("2024-12-31T23:59:59Z"),
        },
    );
    group.bench_function("time_range_string", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&time), None))
    });

    group.finish();
}

/// one_of 不同候选列表大小的性能
fn bench_one_of_scaling(c: &mut Bench) {
    let mut group = c.benchmark_group("one_of_scaling");
    let data = sample_data();

    for size in [5, 10, 50, 100].iter() {
        let allowed: Vec<Value> = (0..*size)
            .map(|i| {
                if i == size - 1 {
                    json!("gold")
                } else {
                    json!(format!("level_{}", i))
                }
            })
            .collect();
        let criterion = Criterion::one_of("user.level", allowed);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&criterion), None))
        });
    }

    group.finish();
}

/// 不可达路径处理基准
fn bench_unresolvable_path(c: &mut Bench) {
    let mut group = c.benchmark_group("unresolvable_path");
    let data = sample_data();

    let missing = Criterion::value("order.shipping.address", "nowhere");
    group.bench_function("missing_key", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&missing), None))
    });

    let exists = Criterion::exists("order.shipping", false);
    group.bench_function("exists_negative", |b| {
        b.iter(|| CriterionEvaluator::evaluate(black_box(&data), black_box(&exists), None))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_value_checks,
    bench_array_checks,
    bench_range_checks,
    bench_one_of_scaling,
    bench_unresolvable_path,
);

criterion_main!(benches);
