use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use sailing_metrics::sailing::{SailingRecord, SailingRecords, TextSource};
use sailing_metrics::{
    compare_metrics, DatasetStore, MetricCatalog, QueryEngine, SailingIdentifier, SailingSelection,
};

const SHIPS: [&str; 5] = ["Voyager", "Explorer", "Discovery", "Explorer 2", "Discovery 2"];
const ROWS_PER_SAILING: usize = 5_000;

fn synthetic_engine() -> QueryEngine {
    let catalog = MetricCatalog::default();
    let metrics = catalog.metrics().to_vec();

    let records = SHIPS
        .iter()
        .enumerate()
        .map(|(s, ship)| SailingRecords {
            identifier: SailingIdentifier::new(*ship, "1"),
            metric_columns: metrics.clone(),
            rows: (0..ROWS_PER_SAILING)
                .map(|i| SailingRecord {
                    scores: (0..metrics.len())
                        .map(|m| {
                            // Every 17th response skipped the question
                            if (i + m) % 17 == 0 {
                                None
                            } else {
                                Some(((i * 7 + m * 3 + s) % 10 + 1) as f64)
                            }
                        })
                        .collect(),
                    review: Some(format!("response {}", i)),
                    reason: None,
                })
                .collect(),
            text_source: TextSource::Review,
        })
        .collect();

    QueryEngine::new(Arc::new(DatasetStore::new(records, vec![])), Arc::new(catalog))
}

fn bench_query_metric(c: &mut Criterion) {
    let engine = synthetic_engine();
    let sailings: Vec<SailingIdentifier> = SHIPS.iter().map(|s| SailingIdentifier::new(*s, "1")).collect();

    c.bench_function("query_metric.single_metric.no_threshold", |b| {
        b.iter(|| engine.query_metric(black_box(&sailings), "Entertainment", None))
    });

    c.bench_function("query_metric.single_metric.threshold_5", |b| {
        b.iter(|| engine.query_metric(black_box(&sailings), "Entertainment", Some(5.0)))
    });

    let metrics = engine.catalog().metrics().to_vec();
    let selection = SailingSelection::Sailings(sailings.clone());
    c.bench_function("compare_metrics.full_catalog", |b| {
        b.iter(|| compare_metrics(&engine, black_box(&selection), &metrics, Some(4.0)))
    });
}

criterion_group!(benches, bench_query_metric);
criterion_main!(benches);
