//! Pipeline executor orchestrating the ordered stage list.
//!
//! The executor owns the bundle, runs stages in order, records per-stage
//! metrics and status, and is the only component that talks to the artifact
//! sink. A failed stage stops the run and marks the remaining stages skipped;
//! artifacts persisted before the failure stay valid. The cancellation flag
//! is polled between stages.
//!
//! Determinism contract: byte-identical `(document, selected_layers)` input
//! produces byte-identical artifact bytes. Artifacts are serialised through
//! `serde_json::Value`, whose object representation keeps keys sorted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde_json::{json, Value};

use crate::artifact::ArtifactSink;
use crate::bundle::{Bundle, PipelineInput};
use crate::config::AlgorithmConfig;
use crate::error::{PipelineError, Result};
use crate::metrics::{run_with_timer, PipelineReport, StageMetrics, StageReport, StageStatus};
use crate::stages;

/// Identity of one pipeline stage, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    Extract,
    Normalize,
    CleanDedup,
    ParallelNaive,
    WallCandidates,
    LogicB,
    LogicC,
    LogicD,
    LogicE,
    LogicF,
    DoorRectangleAssignment,
    DoorBridge,
    WallCandidatesPlaceholder,
}

impl StageKind {
    pub const ALL: [StageKind; 13] = [
        StageKind::Extract,
        StageKind::Normalize,
        StageKind::CleanDedup,
        StageKind::ParallelNaive,
        StageKind::WallCandidates,
        StageKind::LogicB,
        StageKind::LogicC,
        StageKind::LogicD,
        StageKind::LogicE,
        StageKind::LogicF,
        StageKind::DoorRectangleAssignment,
        StageKind::DoorBridge,
        StageKind::WallCandidatesPlaceholder,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Extract => "EXTRACT",
            StageKind::Normalize => "NORMALIZE",
            StageKind::CleanDedup => "CLEAN_DEDUP",
            StageKind::ParallelNaive => "PARALLEL_NAIVE",
            StageKind::WallCandidates => "WALL_CANDIDATES",
            StageKind::LogicB => "LOGIC_B",
            StageKind::LogicC => "LOGIC_C",
            StageKind::LogicD => "LOGIC_D",
            StageKind::LogicE => "LOGIC_E",
            StageKind::LogicF => "LOGIC_F",
            StageKind::DoorRectangleAssignment => "DOOR_RECTANGLE_ASSIGNMENT",
            StageKind::DoorBridge => "DOOR_BRIDGE",
            StageKind::WallCandidatesPlaceholder => "WALL_CANDIDATES_PLACEHOLDER",
        }
    }

    /// Fixed artifact name and type for the stage result.
    pub fn artifact_name(&self) -> (&'static str, &'static str) {
        match self {
            StageKind::Extract => ("extract_results.json", "step_results"),
            StageKind::Normalize => ("normalize_results.json", "step_results"),
            StageKind::CleanDedup => ("canvas_data.json", "canvas_data"),
            StageKind::ParallelNaive => ("parallel_naive_results.json", "step_results"),
            StageKind::WallCandidates => ("wall_candidate_pairs.json", "wall_candidates"),
            StageKind::LogicB => ("logic_b_pairs.json", "logic_b"),
            StageKind::LogicC => ("logic_c_pairs.json", "logic_c"),
            StageKind::LogicD => ("logic_d_rectangles.json", "logic_d"),
            StageKind::LogicE => ("logic_e_rectangles.json", "logic_e"),
            StageKind::LogicF => ("logic_f_rectangles.json", "logic_f"),
            StageKind::DoorRectangleAssignment => {
                ("door_rectangle_assignments.json", "door_assignments")
            }
            StageKind::DoorBridge => ("door_bridges.json", "door_bridges"),
            StageKind::WallCandidatesPlaceholder => (
                "wall_candidates_placeholder_results.json",
                "wall_candidates_placeholder",
            ),
        }
    }

    fn metrics_artifact_name(&self) -> String {
        format!("{}_metrics.json", self.name().to_lowercase())
    }
}

/// Runs the geometry pipeline against an artifact sink.
pub struct PipelineExecutor {
    job_id: String,
    config: AlgorithmConfig,
    cancel: Arc<AtomicBool>,
}

impl PipelineExecutor {
    pub fn new(job_id: impl Into<String>, config: AlgorithmConfig) -> Self {
        Self {
            job_id: job_id.into(),
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between stages; set it to request cooperative shutdown.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn run<S: ArtifactSink>(&self, input: PipelineInput, sink: &S) -> PipelineReport {
        info!(
            "pipeline start: job {} with {} selected layers",
            self.job_id,
            input.selected_layers.len()
        );
        let mut bundle = Bundle::seeded(input);
        let mut reports: Vec<StageReport> = Vec::with_capacity(StageKind::ALL.len());
        let (_, total_ms) = run_with_timer(|| {
            let mut halted = false;
            for kind in StageKind::ALL {
                if halted {
                    reports.push(skipped(kind));
                    continue;
                }
                if self.cancel.load(Ordering::Relaxed) {
                    warn!("pipeline cancelled before {}", kind.name());
                    reports.push(StageReport {
                        stage: kind.name().to_string(),
                        status: StageStatus::Cancelled,
                        metrics: StageMetrics::default(),
                        error_kind: Some("CANCELLED".into()),
                        error_message: Some(PipelineError::Cancelled.to_string()),
                    });
                    halted = true;
                    continue;
                }

                let (outcome, duration_ms) =
                    run_with_timer(|| self.execute_stage(kind, &mut bundle));
                match outcome {
                    Ok((mut metrics, artifact)) => {
                        metrics.duration_ms = duration_ms;
                        match self.persist(sink, kind, &artifact, &metrics) {
                            Ok(()) => {
                                info!(
                                    "stage {} completed in {:.1} ms",
                                    kind.name(),
                                    duration_ms
                                );
                                reports.push(StageReport {
                                    stage: kind.name().to_string(),
                                    status: StageStatus::Completed,
                                    metrics,
                                    error_kind: None,
                                    error_message: None,
                                });
                            }
                            Err(err) => {
                                error!("stage {} sink failure: {err}", kind.name());
                                reports.push(failed(kind, metrics, &err));
                                halted = true;
                            }
                        }
                    }
                    Err(err) => {
                        error!("stage {} failed: {err}", kind.name());
                        let mut metrics = StageMetrics::default();
                        metrics.duration_ms = duration_ms;
                        self.persist_metrics_best_effort(sink, kind, &metrics, Some(&err));
                        reports.push(failed(kind, metrics, &err));
                        halted = true;
                    }
                }
            }
        });

        let completed = reports
            .iter()
            .all(|r| r.status == StageStatus::Completed);
        info!(
            "pipeline {}: job {} in {:.1} ms",
            if completed { "completed" } else { "halted" },
            self.job_id,
            total_ms
        );
        PipelineReport {
            job_id: self.job_id.clone(),
            completed,
            total_ms,
            stages: reports,
        }
    }

    /// Runs one stage, appends its output to the bundle and builds the
    /// artifact body with the shared `{primary, algorithm_config, totals}`
    /// skeleton.
    fn execute_stage(&self, kind: StageKind, bundle: &mut Bundle) -> Result<(StageMetrics, Value)> {
        let config = &self.config;
        let config_value = serde_json::to_value(config)
            .map_err(|e| PipelineError::CorruptUpstream(format!("config serialise: {e}")))?;

        let (metrics, mut artifact) = match kind {
            StageKind::Extract => {
                let (output, metrics) = stages::extract::run(bundle, config)?;
                bundle.extract = Some(output);
                let output = bundle.extract_ref()?;
                let artifact = json!({
                    "entities": &output.entities,
                    "layer_stats": &output.layer_stats,
                    "totals": {
                        "count": output.entities.len(),
                        "opening_blocks": output.opening_blocks.len(),
                        "dropped_entities": output.dropped_entities,
                    },
                });
                (metrics, artifact)
            }
            StageKind::Normalize => {
                let (output, metrics) = stages::normalize::run(bundle, config)?;
                bundle.normalize = Some(output);
                let output = bundle.normalize_ref()?;
                let artifact = json!({
                    "entities": &output.entities,
                    "totals": {
                        "count": output.entities.len(),
                        "degenerate_lines": output.degenerate_lines,
                        "degenerate_polyline_segments": output.degenerate_polyline_segments,
                    },
                });
                (metrics, artifact)
            }
            StageKind::CleanDedup => {
                let (output, metrics) = stages::dedup::run(bundle, config)?;
                bundle.dedup = Some(output);
                let output = bundle.dedup_ref()?;
                let artifact = json!({
                    "drawing_bounds": &output.canvas.drawing_bounds,
                    "layers": &output.canvas.layers,
                    "statistics": &output.canvas.statistics,
                    "totals": {
                        "count": output.entities.len(),
                        "duplicates_removed": output.duplicate_count,
                    },
                });
                (metrics, artifact)
            }
            StageKind::ParallelNaive => {
                let (output, metrics) = stages::layers::run(bundle, config)?;
                bundle.layers = Some(output);
                let output = bundle.layers_ref()?;
                let artifact = json!({
                    "layers": &output.layers,
                    "totals": {
                        "count": output.flat_entities.len(),
                        "layers": output.layers.len(),
                    },
                });
                (metrics, artifact)
            }
            StageKind::WallCandidates => {
                let (output, metrics) = stages::detector::run(bundle, config)?;
                bundle.candidates = Some(output);
                let output = bundle.candidates_ref()?;
                let artifact = json!({
                    "wall_candidate_pairs": &output.pairs,
                    "rejection_stats": &output.rejection_stats,
                    "unpaired_entity_ids": &output.unpaired_entity_ids,
                    "totals": {
                        "count": output.pairs.len(),
                        "total_pairs_checked": output.pairs_checked,
                        "unpaired_count": output.unpaired_entity_ids.len(),
                    },
                });
                (metrics, artifact)
            }
            StageKind::LogicB => {
                let (output, metrics) = stages::trim::run(bundle, config)?;
                bundle.logic_b = Some(output);
                let output = bundle.logic_b_ref()?;
                let artifact = json!({
                    "logic_b_pairs": &output.rectangles,
                    "totals": { "count": output.rectangles.len() },
                });
                (metrics, artifact)
            }
            StageKind::LogicC => {
                let (output, metrics) = stages::corridor::run(bundle, config)?;
                bundle.logic_c = Some(output);
                let output = bundle.logic_c_ref()?;
                let artifact = json!({
                    "logic_c_pairs": &output.rectangles,
                    "totals": {
                        "count": output.rectangles.len(),
                        "removed": output.removed,
                    },
                });
                (metrics, artifact)
            }
            StageKind::LogicD => {
                let (output, metrics) = stages::containment::run(bundle, config)?;
                bundle.logic_d = Some(output);
                let output = bundle.logic_d_ref()?;
                let artifact = json!({
                    "logic_d_rectangles": &output.rectangles,
                    "totals": {
                        "count": output.rectangles.len(),
                        "removed": output.removed,
                    },
                });
                (metrics, artifact)
            }
            StageKind::LogicE => {
                let (output, metrics) = stages::band_merge::run(bundle, config)?;
                bundle.logic_e = Some(output);
                let output = bundle.logic_e_ref()?;
                let artifact = json!({
                    "logic_e_rectangles": &output.rectangles,
                    "totals": {
                        "count": output.rectangles.len(),
                        "bands": output.bands,
                        "merges": output.merges,
                    },
                });
                (metrics, artifact)
            }
            StageKind::LogicF => {
                let (output, metrics) = stages::logic_f::run(bundle, config)?;
                bundle.logic_f = Some(output);
                let output = bundle.logic_f_ref()?;
                let artifact = json!({
                    "logic_f_rectangles": &output.rectangles,
                    "totals": {
                        "count": output.rectangles.len(),
                        "candidates": output.candidates,
                        "accepted_pairs": output.accepted_pairs,
                        "extended_rectangles": output.extended_rectangles,
                    },
                });
                (metrics, artifact)
            }
            StageKind::DoorRectangleAssignment => {
                let (output, metrics) = stages::doors::run_assignment(bundle, config)?;
                bundle.door_assignments = Some(output);
                let output = bundle.door_assignments_ref()?;
                let artifact = json!({
                    "door_assignments": &output.assignments,
                    "totals": {
                        "count": output.assignments.len(),
                        "unassigned": output.unassigned,
                    },
                });
                (metrics, artifact)
            }
            StageKind::DoorBridge => {
                let (output, metrics) = stages::doors::run_bridge(bundle, config)?;
                let artifact = json!({
                    "door_bridges": &output.door_bridges,
                    "totals": {
                        "count": output.door_bridges.len(),
                        "total_bridges": output.total_bridges,
                    },
                });
                bundle.door_bridges = Some(output);
                (metrics, artifact)
            }
            StageKind::WallCandidatesPlaceholder => {
                let (output, metrics) = stages::placeholder::run(bundle, config)?;
                let artifact = json!({
                    "wall_candidate_pairs": &output.pairs,
                    "totals": { "count": output.pairs.len() },
                });
                bundle.placeholder = Some(output);
                (metrics, artifact)
            }
        };

        if let Value::Object(map) = &mut artifact {
            map.insert("algorithm_config".to_string(), config_value);
        }
        Ok((metrics, artifact))
    }

    fn persist<S: ArtifactSink>(
        &self,
        sink: &S,
        kind: StageKind,
        artifact: &Value,
        metrics: &StageMetrics,
    ) -> Result<()> {
        let (name, artifact_type) = kind.artifact_name();
        let body = serde_json::to_vec(artifact)
            .map_err(|e| PipelineError::CorruptUpstream(format!("artifact serialise: {e}")))?;
        self.put_with_retry(sink, name, artifact_type, &body)?;
        self.persist_metrics_best_effort(sink, kind, metrics, None);
        Ok(())
    }

    fn persist_metrics_best_effort<S: ArtifactSink>(
        &self,
        sink: &S,
        kind: StageKind,
        metrics: &StageMetrics,
        error: Option<&PipelineError>,
    ) {
        let blob = json!({
            "stage": kind.name(),
            "metrics": metrics,
            "error_kind": error.map(|e| e.kind()),
            "error_message": error.map(|e| e.to_string()),
        });
        if let Ok(body) = serde_json::to_vec(&blob) {
            if let Err(err) =
                self.put_with_retry(sink, &kind.metrics_artifact_name(), "step_metrics", &body)
            {
                warn!("metrics blob for {} not persisted: {err}", kind.name());
            }
        }
    }

    /// Sink put with exponential backoff, three attempts.
    fn put_with_retry<S: ArtifactSink>(
        &self,
        sink: &S,
        name: &str,
        artifact_type: &str,
        body: &[u8],
    ) -> Result<()> {
        let mut delay = Duration::from_millis(50);
        let mut last_reason = String::new();
        for attempt in 1..=3 {
            match sink.put(&self.job_id, name, artifact_type, body) {
                Ok(()) => return Ok(()),
                Err(reason) => {
                    warn!("sink put {name} attempt {attempt} failed: {reason}");
                    last_reason = reason.to_string();
                    if attempt < 3 {
                        std::thread::sleep(delay);
                        delay *= 2;
                    }
                }
            }
        }
        Err(PipelineError::SinkUnavailable(last_reason))
    }
}

fn skipped(kind: StageKind) -> StageReport {
    StageReport {
        stage: kind.name().to_string(),
        status: StageStatus::Skipped,
        metrics: StageMetrics::default(),
        error_kind: None,
        error_message: None,
    }
}

fn failed(kind: StageKind, metrics: StageMetrics, err: &PipelineError) -> StageReport {
    StageReport {
        stage: kind.name().to_string(),
        status: StageStatus::Failed,
        metrics,
        error_kind: Some(err.kind().to_string()),
        error_message: Some(err.to_string()),
    }
}
