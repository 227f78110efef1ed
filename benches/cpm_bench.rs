//! CPM pass over a synthetic layered DAG.
//!
//! Run with `cargo bench`. The shape mimics a large programme plan: layers
//! of items with edges between adjacent layers.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use depd::graph::{cpm, DependencyGraph};
use depd::store::{EdgeRow, WorkItemRow};

fn layered_graph(layers: usize, width: usize) -> (Vec<WorkItemRow>, Vec<EdgeRow>) {
    let tenant = Uuid::new_v4();
    let now = Utc::now();
    let ids: Vec<Vec<Uuid>> = (0..layers)
        .map(|_| (0..width).map(|_| Uuid::new_v4()).collect())
        .collect();

    let mut items = Vec::new();
    for layer in &ids {
        for &id in layer {
            items.push(WorkItemRow {
                id,
                tenant_id: tenant,
                item_type: "task".to_string(),
                title: format!("item-{id}"),
                status: "open".to_string(),
                estimated_duration_days: Some(5),
            });
        }
    }

    let mut edges = Vec::new();
    for window in ids.windows(2) {
        for (i, &from) in window[0].iter().enumerate() {
            // Fan each node out to two nodes of the next layer.
            for offset in 0..2 {
                let to = window[1][(i + offset) % width];
                edges.push(EdgeRow {
                    id: Uuid::new_v4(),
                    tenant_id: tenant,
                    from_id: from,
                    to_id: to,
                    dependency_type: "finish_to_start".to_string(),
                    lag_days: (i % 3) as i32,
                    created_at: now,
                    created_by: None,
                    updated_at: now,
                    metadata: serde_json::json!({}),
                });
            }
        }
    }
    (items, edges)
}

fn bench_cpm(c: &mut Criterion) {
    let (items, edges) = layered_graph(50, 40);
    c.bench_function("cpm_schedule_2000_nodes", |b| {
        b.iter(|| {
            let mut graph = DependencyGraph::from_rows(items.clone(), edges.clone());
            let summary = cpm::schedule(&mut graph, Utc::now());
            black_box(summary.total_duration_days)
        })
    });
}

criterion_group!(benches, bench_cpm);
criterion_main!(benches);
