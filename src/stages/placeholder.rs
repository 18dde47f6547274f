//! WALL_CANDIDATES_PLACEHOLDER — echoes the detector output verbatim.
//!
//! Exists so the final artifact slot stays stable while the replacement
//! detection logic is developed; it carries no logic of its own.

use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::error::Result;
use crate::metrics::StageMetrics;
use crate::stages::detector::CandidatePair;

#[derive(Clone, Debug, Serialize)]
pub struct PlaceholderOutput {
    pub pairs: Vec<CandidatePair>,
}

pub fn run(bundle: &Bundle, _config: &AlgorithmConfig) -> Result<(PlaceholderOutput, StageMetrics)> {
    let detector = bundle.candidates_ref()?;
    let pairs = detector.pairs.clone();

    let mut metrics = StageMetrics::default();
    metrics.set("candidate_pairs", pairs.len() as f64);

    Ok((PlaceholderOutput { pairs }, metrics))
}
