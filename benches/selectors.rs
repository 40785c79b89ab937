//! Criterion benchmarks for store selectors.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use sparsify::models::{Benchmark, BenchmarkRun, Project};
use sparsify::resource::ResourceAction;
use sparsify::selectors::{self, Selectors};
use sparsify::store::{reduce, Action, StoreState};

fn make_projects(count: usize) -> Vec<Project> {
    (0..count)
        .map(|i| {
            // Scatter modification times so sorting has real work to do.
            let day = (i * 7919) % 28 + 1;
            serde_json::from_value(json!({
                "project_id": format!("p{i}"),
                "name": format!("model-{i}"),
                "modified": format!("2024-02-{day:02}T10:00:00Z"),
            }))
            .unwrap()
        })
        .collect()
}

fn make_runs(engine: &str, optimization: &str, count: usize, ms: f64) -> Vec<BenchmarkRun> {
    (0..count)
        .map(|i| {
            serde_json::from_value(json!({
                "core_count": 4,
                "batch_size": 1 << (i % 6),
                "inference_engine": engine,
                "inference_model_optimization": optimization,
                "measurements": [],
                "ms_per_batch": ms,
                "ms_per_item": ms + i as f64 * 0.01,
            }))
            .unwrap()
        })
        .collect()
}

fn make_benchmarks(count: usize, runs: usize) -> Vec<Benchmark> {
    (0..count)
        .map(|i| {
            let mut all = make_runs("ort_cpu", "", runs, 10.0);
            all.extend(make_runs("deepsparse", "o1", runs, 4.0));
            serde_json::from_value(json!({
                "benchmark_id": format!("b{i}"),
                "project_id": "p0",
                "name": format!("bench-{i}"),
                "inference_models": [
                    { "inference_engine": "ort_cpu", "inference_model_optimization": "" },
                    { "inference_engine": "deepsparse", "inference_model_optimization": "o1" },
                ],
                "result": { "benchmarks": all },
            }))
            .unwrap()
        })
        .collect()
}

fn make_state(projects: usize) -> StoreState {
    let mut state = StoreState::default();
    reduce(&mut state, Action::Projects(ResourceAction::Loading));
    reduce(
        &mut state,
        Action::Projects(ResourceAction::Succeeded(make_projects(projects))),
    );
    reduce(&mut state, Action::SelectProject(Some("p0".to_string())));
    reduce(&mut state, Action::Benchmarks(ResourceAction::Loading));
    reduce(
        &mut state,
        Action::Benchmarks(ResourceAction::Succeeded(make_benchmarks(16, 32))),
    );
    state
}

/// Sorting the project list, memoized vs recomputed on every read.
fn bench_sorted_projects(c: &mut Criterion) {
    let mut group = c.benchmark_group("sorted_projects");

    for size in [16, 256, 4096].iter() {
        let state = make_state(*size);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("uncached", size), size, |b, _| {
            b.iter(|| {
                let projects = state.projects.val().map(Vec::as_slice).unwrap_or(&[]);
                black_box(selectors::sort_projects(projects).len())
            });
        });

        group.bench_with_input(BenchmarkId::new("memoized", size), size, |b, _| {
            let mut sel = Selectors::new();
            b.iter(|| black_box(sel.sorted_projects(&state).len()));
        });
    }

    group.finish();
}

fn bench_speedups(c: &mut Criterion) {
    let state = make_state(16);

    c.bench_function("benchmark_speedups_uncached", |b| {
        let benchmarks = state.selected.benchmarks.val().cloned().unwrap_or_default();
        b.iter(|| {
            let total: f64 = benchmarks
                .iter()
                .filter_map(selectors::benchmark_speedup)
                .sum();
            black_box(total)
        });
    });

    c.bench_function("benchmark_speedups_memoized", |b| {
        let mut sel = Selectors::new();
        b.iter(|| black_box(sel.benchmark_speedups(&state).len()));
    });
}

fn bench_epoch_range(c: &mut Criterion) {
    c.bench_function("epoch_range", |b| {
        let mut start = -1.0;
        b.iter(|| {
            start = if start > 100.0 { -1.0 } else { start + 0.5 };
            black_box(selectors::epoch_range(
                black_box(start),
                black_box(start + 10.0),
                0.0,
                100.0,
            ))
        });
    });
}

criterion_group!(benches, bench_sorted_projects, bench_speedups, bench_epoch_range);
criterion_main!(benches);
