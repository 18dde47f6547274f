#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod artifact;
pub mod bundle;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;

// “Expert” modules – still public, but considered unstable internals.
pub mod document;
pub mod entity;
pub mod geometry;
pub mod stages;

// --- High-level re-exports -------------------------------------------------

// Main entry points: executor + report.
pub use crate::bundle::{Bundle, PipelineInput};
pub use crate::config::AlgorithmConfig;
pub use crate::error::{PipelineError, Result};
pub use crate::executor::{PipelineExecutor, StageKind};
pub use crate::metrics::{PipelineReport, StageReport, StageStatus};

// Sinks the surrounding service plugs in.
pub use crate::artifact::{ArtifactSink, DirectorySink, MemorySink};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use wall_detector::prelude::*;
///
/// # fn main() {
/// let sink = MemorySink::new();
/// let executor = PipelineExecutor::new("job-1", AlgorithmConfig::default());
/// let report = executor.run(
///     PipelineInput {
///         document: r#"{"layers": {}}"#.to_string(),
///         selected_layers: ["walls".to_string()].into_iter().collect(),
///     },
///     &sink,
/// );
/// println!("completed={} stages={}", report.completed, report.stages.len());
/// # }
/// ```
pub mod prelude {
    pub use crate::artifact::MemorySink;
    pub use crate::bundle::PipelineInput;
    pub use crate::{AlgorithmConfig, PipelineExecutor, PipelineReport};
}
