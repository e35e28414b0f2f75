//! Performance benchmarks for payroll finalization.
//!
//! - Request fingerprinting for empty and JSON bodies
//! - Run + finalize of a period through the in-memory store, by head count
//! - Replay of a recorded finalize through the HTTP router
//!
//! Run with: `cargo bench`
//! HTML reports are generated in `target/criterion/`

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request};
use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;
use tower::ServiceExt;

use payroll_core::api::{AppState, create_router};
use payroll_core::calculation::NetPayCalculator;
use payroll_core::config::{ServiceConfig, SideEffectsConfig};
use payroll_core::idempotency::RequestFingerprint;
use payroll_core::models::Employee;
use payroll_core::payroll::{PayrollService, SideEffects};
use payroll_core::store::MemoryStore;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn employee(i: usize) -> Employee {
    Employee {
        id: format!("emp_{:05}", i),
        tenant_id: "tenant_a".to_string(),
        name: format!("Employee {}", i),
        base_pay: Decimal::new(500000 + i as i64, 2),
        hired_on: date(2020, 1, 1),
        terminated_on: None,
        active: true,
    }
}

async fn seeded_store(head_count: usize) -> MemoryStore {
    let store = MemoryStore::new();
    for i in 0..head_count {
        store.insert_employee(employee(i)).await;
    }
    store
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    let body = serde_json::json!({
        "note": "January close",
        "approvers": ["u1", "u2"],
        "options": {"notify": true, "dry_run": false}
    })
    .to_string();

    group.bench_function("empty_body", |b| {
        b.iter(|| {
            RequestFingerprint::compute(
                black_box("POST"),
                black_box("/payroll/periods/:id/finalize"),
                black_box("/payroll/periods/0b7e7d3c-4f0e-4a5e-9d3b-3f2c1a0e9b11/finalize"),
                black_box(b""),
            )
        })
    });
    group.bench_function("json_body", |b| {
        b.iter(|| {
            RequestFingerprint::compute(
                black_box("POST"),
                black_box("/payroll/periods/:id/finalize"),
                black_box("/payroll/periods/0b7e7d3c-4f0e-4a5e-9d3b-3f2c1a0e9b11/finalize"),
                black_box(body.as_bytes()),
            )
        })
    });
    group.finish();
}

fn bench_run_and_finalize(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("run_and_finalize");
    group.measurement_time(Duration::from_secs(10));

    for head_count in [1usize, 100, 1000] {
        let store = rt.block_on(seeded_store(head_count));
        let effects = SideEffects::new(
            Arc::new(payroll_core::payroll::LogRenderer),
            Arc::new(payroll_core::payroll::LogNotifier),
            &SideEffectsConfig::default(),
        );
        let service = PayrollService::new(
            Arc::new(store),
            Arc::new(NetPayCalculator),
            effects,
            Duration::from_secs(5),
        );

        group.throughput(Throughput::Elements(head_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(head_count),
            &service,
            |b, service| {
                b.to_async(&rt).iter(|| async {
                    let period = service
                        .create_period("tenant_a", "monthly", date(2026, 1, 1), date(2026, 1, 31))
                        .await
                        .expect("create");
                    service.run("tenant_a", period.id).await.expect("run");
                    black_box(service.finalize("tenant_a", period.id).await.expect("finalize"))
                })
            },
        );
    }
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("runtime");
    let (router, uri) = rt.block_on(async {
        let store = seeded_store(10).await;
        let state = AppState::from_stores(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            ServiceConfig::default(),
        );
        let period = state
            .service()
            .create_period("tenant_a", "monthly", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .expect("create");
        state.service().run("tenant_a", period.id).await.expect("run");
        (
            create_router(state),
            format!("/payroll/periods/{}/finalize", period.id),
        )
    });

    let request = |uri: &str| {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("X-Tenant-Id", "tenant_a")
            .header("X-User-Id", "bench")
            .header("Idempotency-Key", "bench-key")
            .body(Body::empty())
            .expect("request")
    };
    rt.block_on(router.clone().oneshot(request(&uri)))
        .expect("first finalize");

    c.bench_function("finalize_replay", |b| {
        b.to_async(&rt).iter(|| async {
            let response = router.clone().oneshot(request(&uri)).await.expect("replay");
            black_box(response.status())
        })
    });
}

criterion_group!(benches, bench_fingerprint, bench_run_and_finalize, bench_replay);
criterion_main!(benches);
