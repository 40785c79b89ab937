//! JSON payloads exchanged with the Sparsify server.
//!
//! Only the fields the store and selectors read are typed; analysis blobs the
//! views hand straight to charts stay as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectModel {
    pub model_id: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub job: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub dir_path: Option<String>,
    #[serde(default)]
    pub dir_size: Option<u64>,

    #[serde(default)]
    pub training_optimizer: Option<String>,
    #[serde(default)]
    pub training_epochs: Option<f64>,
    #[serde(default)]
    pub training_lr_init: Option<f64>,
    #[serde(default)]
    pub training_lr_final: Option<f64>,

    #[serde(default)]
    pub model: Option<ProjectModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Partial update; unset fields are left untouched by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_optimizer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_epochs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_lr_init: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_lr_final: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningModifier {
    pub modifier_id: String,
    pub start_epoch: f64,
    pub end_epoch: f64,
    #[serde(default)]
    pub update_frequency: Option<f64>,
    #[serde(default)]
    pub sparsity: Option<f64>,
    #[serde(default)]
    pub est_perf_gain: Option<f64>,
    #[serde(default)]
    pub est_loss_sensitivity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationModifier {
    pub modifier_id: String,
    pub start_epoch: f64,
    pub end_epoch: f64,
    #[serde(default)]
    pub balance_perf_loss: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LrScheduleModifier {
    pub modifier_id: String,
    pub start_epoch: f64,
    pub end_epoch: f64,
    #[serde(default)]
    pub lr_mods: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimization {
    pub optim_id: String,
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub profile_perf_id: Option<String>,
    #[serde(default)]
    pub profile_loss_id: Option<String>,
    pub start_epoch: f64,
    pub end_epoch: f64,
    #[serde(default)]
    pub pruning_modifiers: Vec<PruningModifier>,
    #[serde(default)]
    pub quantization_modifiers: Vec<QuantizationModifier>,
    #[serde(default)]
    pub lr_schedule_modifiers: Vec<LrScheduleModifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewOptimization {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_perf_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_loss_id: Option<String>,
    pub add_pruning: bool,
    pub add_quantization: bool,
    pub add_lr_schedule: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_trainable: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceModel {
    #[serde(default)]
    pub model_id: Option<String>,
    pub inference_engine: String,
    #[serde(default)]
    pub inference_model_optimization: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub core_count: u32,
    pub batch_size: u32,
    pub inference_engine: String,
    #[serde(default)]
    pub inference_model_optimization: String,
    #[serde(default)]
    pub measurements: Vec<f64>,
    #[serde(default)]
    pub ms_per_batch: f64,
    #[serde(default)]
    pub ms_per_item: Option<f64>,
    #[serde(default)]
    pub items_per_second: Option<f64>,
}

impl BenchmarkRun {
    /// Latency per item, derived from the batch latency when the server did
    /// not report it directly.
    pub fn ms_per_item(&self) -> Option<f64> {
        match self.ms_per_item {
            Some(v) => Some(v),
            None if self.batch_size > 0 => Some(self.ms_per_batch / self.batch_size as f64),
            None => None,
        }
    }

    pub fn matches(&self, model: &InferenceModel) -> bool {
        self.inference_engine == model.inference_engine
            && self.inference_model_optimization == model.inference_model_optimization
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub benchmark_id: String,
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub inference_models: Vec<InferenceModel>,
    #[serde(default)]
    pub core_counts: Vec<u32>,
    #[serde(default)]
    pub batch_sizes: Vec<u32>,
    #[serde(default)]
    pub result: Option<BenchmarkResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewBenchmark {
    pub name: String,
    pub inference_models: Vec<InferenceModel>,
    pub core_counts: Vec<u32>,
    pub batch_sizes: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations_per_check: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup_iterations_per_check: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossProfile {
    pub profile_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub pruning_estimation_type: Option<String>,
    #[serde(default)]
    pub analysis: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfProfile {
    pub profile_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub batch_size: Option<u32>,
    #[serde(default)]
    pub core_count: Option<u32>,
    #[serde(default)]
    pub instruction_sets: Vec<String>,
    #[serde(default)]
    pub analysis: Option<Value>,
}

/// Request body shared by loss and perf profile creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProfile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pruning_estimations: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantized_estimations: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub isa: Option<String>,
    #[serde(default)]
    pub vnni: Option<bool>,
    #[serde(default)]
    pub num_sockets: Option<u32>,
    #[serde(default)]
    pub cores_per_socket: Option<u32>,
    #[serde(default)]
    pub threads_per_core: Option<u32>,
    #[serde(default)]
    pub available_engines: Vec<String>,
    #[serde(default)]
    pub available_instructions: Vec<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}
