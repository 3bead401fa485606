//! # Nexus Publish Path Benchmarks
//!
//! | Path | Claim | Target |
//! |------|-------|--------|
//! | `matches` | Pure string comparison | < 100ns |
//! | `publish` | Returns before handlers run | independent of handler cost |
//! | `query` | Linear scan of the ring | < 1ms at default capacity |
//! | bridged publish | One extra envelope per rule | < 2x plain publish |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nexus_bridge::{Bridge, BridgeRule};
use nexus_bus::{handler_fn, BusConfig, EventBus, HistoryFilter, DEFAULT_HISTORY_CAPACITY};
use nexus_types::{matches, EventType};
use serde_json::json;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime")
}

// ============================================================================
// PATTERN MATCHING
// ============================================================================

fn bench_pattern_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern-matching");

    let cases = [
        ("exact", "judgment:created", "judgment:created"),
        ("namespace", "judgment:*", "judgment:created"),
        ("nested", "agent:llm:*", "agent:llm:selected"),
        ("universal", "*", "market:price_tick"),
        ("miss", "budget:*", "judgment:created"),
    ];
    for (name, pattern, event_type) in cases {
        group.bench_function(name, |b| {
            b.iter(|| black_box(matches(black_box(pattern), black_box(event_type))))
        });
    }

    group.finish();
}

// ============================================================================
// PUBLISH
// Publish cost must not grow with handler latency, only with handler count.
// ============================================================================

fn bench_publish(c: &mut Criterion) {
    let rt = runtime();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("publish");
    group.measurement_time(Duration::from_secs(5));
    group.throughput(Throughput::Elements(1));

    for handlers in [0usize, 1, 10, 50] {
        let bus = EventBus::new(BusConfig::named("BENCH"));
        for i in 0..handlers {
            bus.subscribe(
                "judgment:*",
                handler_fn(format!("noop-{i}"), |_env| async { Ok(()) }),
            )
            .expect("subscribe");
        }

        group.bench_with_input(BenchmarkId::new("handlers", handlers), &bus, |b, bus| {
            b.iter(|| {
                black_box(
                    bus.emit("judgment:created", json!({"q": 0.5}))
                        .expect("publish"),
                )
            })
        });
    }

    let slow = EventBus::new(BusConfig::named("SLOW"));
    for i in 0..5 {
        slow.subscribe(
            "judgment:*",
            handler_fn(format!("slow-{i}"), |_env| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            }),
        )
        .expect("subscribe");
    }
    group.bench_function("slow_handlers", |b| {
        b.iter(|| black_box(slow.emit("judgment:created", json!(null)).expect("publish")))
    });

    group.finish();
}

// ============================================================================
// HISTORY QUERY
// ============================================================================

fn bench_history_query(c: &mut Criterion) {
    let rt = runtime();
    let _guard = rt.enter();

    let bus = EventBus::new(BusConfig::named("HISTORY"));
    let types = ["judgment:created", "market:price_tick", "agent:vote", "budget:warning"];
    for i in 0..DEFAULT_HISTORY_CAPACITY {
        bus.emit(types[i % types.len()], json!({"i": i}))
            .expect("publish");
    }

    let mut group = c.benchmark_group("history-query");
    group.throughput(Throughput::Elements(DEFAULT_HISTORY_CAPACITY as u64));

    group.bench_function("all", |b| {
        b.iter(|| black_box(bus.query(&HistoryFilter::all())))
    });

    let by_type =
        HistoryFilter::all().with_event_type(EventType::parse("agent:vote").expect("type"));
    group.bench_function("by_type", |b| b.iter(|| black_box(bus.query(&by_type))));

    let newest = HistoryFilter::all().with_namespace("market").with_limit(10);
    group.bench_function("namespace_limit_10", |b| {
        b.iter(|| black_box(bus.query(&newest)))
    });

    group.finish();
}

// ============================================================================
// BRIDGED PUBLISH
// ============================================================================

fn bench_bridged_publish(c: &mut Criterion) {
    let rt = runtime();
    let _guard = rt.enter();

    let source = EventBus::new(BusConfig::named("SOURCE"));
    let destination = EventBus::new(BusConfig::named("DESTINATION"));
    let bridge = Bridge::new(
        "bench",
        vec![BridgeRule::forward("agent:vote").expect("rule")],
    );
    bridge.start(&source, &destination).expect("start");

    let mut group = c.benchmark_group("bridged-publish");
    group.bench_function("forwarded", |b| {
        b.iter(|| black_box(source.emit("agent:vote", json!({"score": 0.7})).expect("publish")))
    });
    group.bench_function("unmatched", |b| {
        b.iter(|| black_box(source.emit("agent:activated", json!(null)).expect("publish")))
    });
    group.finish();

    bridge.stop();
}

criterion_group!(
    benches,
    bench_pattern_matching,
    bench_publish,
    bench_history_query,
    bench_bridged_publish,
);
criterion_main!(benches);
