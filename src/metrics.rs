//! Per-stage status, timing and counters recorded by the executor.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

/// Lifecycle state of one pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

/// Timing plus named counters for one stage run. Counters are kept sorted so
/// serialized metrics are byte-stable.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StageMetrics {
    pub duration_ms: f64,
    pub counters: BTreeMap<String, f64>,
}

impl StageMetrics {
    pub fn set(&mut self, key: &str, value: f64) -> &mut Self {
        self.counters.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.counters.get(key).copied()
    }
}

/// Record of one stage as seen by the executor.
#[derive(Clone, Debug, Serialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    pub metrics: StageMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// End-to-end record of a pipeline run.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineReport {
    pub job_id: String,
    pub completed: bool,
    pub total_ms: f64,
    pub stages: Vec<StageReport>,
}

impl PipelineReport {
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

/// Runs a closure and reports its result together with the elapsed time.
pub fn run_with_timer<R, F: FnOnce() -> R>(f: F) -> (R, f64) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed().as_secs_f64() * 1000.0)
}
