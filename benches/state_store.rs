//! State store and request round-trip benchmarks.
//!
//! Run with: cargo bench --bench state_store
//! Results saved to: target/criterion/

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use tokio::runtime::Runtime;

use llama_proxy_client::transport::events;
use llama_proxy_client::{ClientConfig, MemoryTransport, StateManager, StateStore};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SUBSCRIBER_COUNTS: &[usize] = &[0, 10, 100];
const MODEL_COUNTS: &[usize] = &[10, 100];

fn models(count: usize, status: &str) -> Value {
    Value::Array(
        (0..count)
            .map(|i| json!({"id": format!("m{i}"), "name": format!("model-{i}"), "status": status}))
            .collect(),
    )
}

// ============================================================================
// Benchmark: Store Writes
// ============================================================================

fn bench_store_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_set");

    for &subscribers in SUBSCRIBER_COUNTS {
        let store = StateStore::new();
        let _subs: Vec<_> = (0..subscribers)
            .map(|_| store.subscribe("models", |_| {}))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("changed", subscribers),
            &subscribers,
            |b, _| {
                let mut flip = false;
                b.iter(|| {
                    flip = !flip;
                    let status = if flip { "loaded" } else { "unloaded" };
                    store.set("models", models(10, status));
                });
            },
        );
    }

    for &count in MODEL_COUNTS {
        let store = StateStore::new();
        let _sub = store.subscribe("models", |_| {});
        store.set("models", models(count, "loaded"));

        group.bench_with_input(BenchmarkId::new("suppressed", count), &count, |b, &count| {
            b.iter(|| {
                store.set("models", models(count, "loaded"));
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Request Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");

    let (manager, transport) = rt.block_on(async {
        let manager = StateManager::new(ClientConfig::default());
        let transport = MemoryTransport::new();
        manager.init(transport.clone());
        transport.trigger(events::ESTABLISHED, &json!({}));
        (manager, transport)
    });

    let mut group = c.benchmark_group("round_trip");
    group.bench_function("models_list", |b| {
        b.to_async(&rt).iter(|| {
            let manager = manager.clone();
            let transport = Arc::clone(&transport);
            async move {
                let responder = tokio::spawn({
                    let transport = Arc::clone(&transport);
                    async move {
                        transport.wait_for_emits(1).await;
                        for sent in transport.take_emitted() {
                            if let Some(id) = sent.request_id() {
                                transport.trigger(
                                    &format!("{}:result", sent.event),
                                    &json!({"requestId": id, "success": true, "data": {}}),
                                );
                            }
                        }
                    }
                });

                let result = manager.request("models:list", json!({})).await;
                responder.await.expect("responder");
                result.expect("response")
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_store_set, bench_round_trip);
criterion_main!(benches);
