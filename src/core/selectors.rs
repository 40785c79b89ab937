//! Read-only derivations over [`StoreState`].
//!
//! Selectors never mutate their input. The free functions are pure; the
//! [`Selectors`] cache memoizes the costlier ones on the revisions of exactly
//! the slices they read, handing back the same `Arc` until one of those
//! slices changes.

use std::sync::Arc;

use serde::Serialize;

use crate::models::{Benchmark, BenchmarkRun, Optimization, Project};
use crate::monitor::Connectivity;
use crate::resource::ResourceStatus;
use crate::store::{ResourceKey, StoreState};

/// Single-entry memo keyed by the revisions of the inputs it was built from.
#[derive(Debug)]
pub struct Memo<K, V> {
    entry: Option<(K, Arc<V>)>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<K: PartialEq, V> Memo<K, V> {
    pub fn get_or_compute(&mut self, key: K, compute: impl FnOnce() -> V) -> Arc<V> {
        if let Some((cached_key, value)) = &self.entry {
            if *cached_key == key {
                return Arc::clone(value);
            }
        }
        let value = Arc::new(compute());
        self.entry = Some((key, Arc::clone(&value)));
        value
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// `baseline / current` of the mean per-item latencies. `None` when either
/// side has no usable measurements or the ratio would not be finite.
pub fn speedup(current: &[BenchmarkRun], baseline: &[BenchmarkRun]) -> Option<f64> {
    let current = mean(current.iter().filter_map(BenchmarkRun::ms_per_item))?;
    let baseline = mean(baseline.iter().filter_map(BenchmarkRun::ms_per_item))?;
    if current <= 0.0 {
        return None;
    }
    let ratio = baseline / current;
    ratio.is_finite().then_some(ratio)
}

/// Speedup of a benchmark's second inference model over its first.
pub fn benchmark_speedup(benchmark: &Benchmark) -> Option<f64> {
    let [baseline_model, current_model, ..] = benchmark.inference_models.as_slice() else {
        return None;
    };
    let runs = &benchmark.result.as_ref()?.benchmarks;

    let baseline: Vec<BenchmarkRun> = runs
        .iter()
        .filter(|r| r.matches(baseline_model))
        .cloned()
        .collect();
    let current: Vec<BenchmarkRun> = runs
        .iter()
        .filter(|r| r.matches(current_model))
        .cloned()
        .collect();
    speedup(&current, &baseline)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochRange {
    pub start: f64,
    pub end: f64,
    /// Fraction of the global training range this modifier is active for.
    pub percent_total: f64,
}

/// Active range of a modifier within `[global_start, global_end]`.
///
/// Negative or out-of-range bounds fall back to the global bounds; an end
/// before the start runs to the global end.
pub fn epoch_range(start: f64, end: f64, global_start: f64, global_end: f64) -> EpochRange {
    let in_range = |v: f64| v.is_finite() && v >= 0.0 && v >= global_start && v <= global_end;

    let start = if in_range(start) { start } else { global_start };
    let end = if in_range(end) && end >= start {
        end
    } else {
        global_end
    };

    let span = global_end - global_start;
    let percent_total = if span > 0.0 && span.is_finite() {
        ((end - start) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };

    EpochRange {
        start,
        end,
        percent_total,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    Pruning,
    Quantization,
    LrSchedule,
}

impl ModifierKind {
    pub fn label(self) -> &'static str {
        match self {
            ModifierKind::Pruning => "pruning",
            ModifierKind::Quantization => "quantization",
            ModifierKind::LrSchedule => "lr_schedule",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifierRange {
    pub modifier_id: String,
    pub kind: ModifierKind,
    pub range: EpochRange,
}

pub fn modifier_ranges(optim: &Optimization) -> Vec<ModifierRange> {
    let (gs, ge) = (optim.start_epoch, optim.end_epoch);
    let pruning = optim.pruning_modifiers.iter().map(|m| ModifierRange {
        modifier_id: m.modifier_id.clone(),
        kind: ModifierKind::Pruning,
        range: epoch_range(m.start_epoch, m.end_epoch, gs, ge),
    });
    let quant = optim.quantization_modifiers.iter().map(|m| ModifierRange {
        modifier_id: m.modifier_id.clone(),
        kind: ModifierKind::Quantization,
        range: epoch_range(m.start_epoch, m.end_epoch, gs, ge),
    });
    let lr = optim.lr_schedule_modifiers.iter().map(|m| ModifierRange {
        modifier_id: m.modifier_id.clone(),
        kind: ModifierKind::LrSchedule,
        range: epoch_range(m.start_epoch, m.end_epoch, gs, ge),
    });
    pruning.chain(quant).chain(lr).collect()
}

/// Most recently modified first; projects without a timestamp go last.
pub fn sort_projects(projects: &[Project]) -> Vec<Project> {
    let mut sorted = projects.to_vec();
    sorted.sort_by(|a, b| match (&a.modified, &b.modified) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
    sorted
}

pub fn is_loading(state: &StoreState, key: ResourceKey) -> bool {
    state.status(key) == ResourceStatus::Loading
}

pub fn server_down_visible(state: &StoreState) -> bool {
    state.server.connectivity() == Connectivity::Offline && state.server.down_shown()
}

/// Error to show inline for `key`. Hidden while the server is offline, where
/// the single server-down notice takes over.
pub fn visible_error(state: &StoreState, key: ResourceKey) -> Option<&str> {
    if state.server.connectivity() == Connectivity::Offline {
        return None;
    }
    state.error(key)
}

pub fn selected_optimization(state: &StoreState) -> Option<&Optimization> {
    let optim_id = state.selected.optim_id.as_deref()?;
    state
        .selected
        .optimizations
        .val()?
        .iter()
        .find(|o| o.optim_id == optim_id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkSpeedup {
    pub benchmark_id: String,
    pub name: String,
    pub speedup: Option<f64>,
}

/// Memoized selectors. Each consumer keeps its own cache.
#[derive(Debug, Default)]
pub struct Selectors {
    sorted_projects: Memo<u64, Vec<Project>>,
    benchmark_speedups: Memo<(u64, u64), Vec<BenchmarkSpeedup>>,
    optimization_ranges: Memo<(u64, u64, Option<String>), Vec<ModifierRange>>,
}

impl Selectors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sorted_projects(&mut self, state: &StoreState) -> Arc<Vec<Project>> {
        self.sorted_projects
            .get_or_compute(state.projects.revision(), || {
                state
                    .projects
                    .val()
                    .map(|p| sort_projects(p))
                    .unwrap_or_default()
            })
    }

    pub fn benchmark_speedups(&mut self, state: &StoreState) -> Arc<Vec<BenchmarkSpeedup>> {
        let key = (
            state.selected.generation(),
            state.selected.benchmarks.revision(),
        );
        self.benchmark_speedups.get_or_compute(key, || {
            state
                .selected
                .benchmarks
                .val()
                .map(|list| {
                    list.iter()
                        .map(|b| BenchmarkSpeedup {
                            benchmark_id: b.benchmark_id.clone(),
                            name: b.name.clone(),
                            speedup: benchmark_speedup(b),
                        })
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    /// Modifier ranges of the optimization selected in the route.
    pub fn selected_modifier_ranges(&mut self, state: &StoreState) -> Arc<Vec<ModifierRange>> {
        let key = (
            state.selected.generation(),
            state.selected.optimizations.revision(),
            state.selected.optim_id.clone(),
        );
        self.optimization_ranges.get_or_compute(key, || {
            selected_optimization(state)
                .map(modifier_ranges)
                .unwrap_or_default()
        })
    }
}
