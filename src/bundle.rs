//! The typed stage bundle.
//!
//! One field per stage, append-only: the executor is the sole writer and each
//! stage receives `&Bundle`. Reading an upstream entry that has not been
//! produced yet is a programming error and surfaces as `CORRUPT_UPSTREAM`.

use std::collections::BTreeSet;

use crate::error::{PipelineError, Result};
use crate::stages::band_merge::BandMergeOutput;
use crate::stages::containment::ContainmentOutput;
use crate::stages::corridor::CorridorOutput;
use crate::stages::dedup::DedupOutput;
use crate::stages::detector::DetectorOutput;
use crate::stages::doors::{DoorAssignmentOutput, DoorBridgeOutput};
use crate::stages::extract::ExtractOutput;
use crate::stages::layers::LayerOutput;
use crate::stages::logic_f::JunctionOutput;
use crate::stages::normalize::NormalizeOutput;
use crate::stages::placeholder::PlaceholderOutput;
use crate::stages::trim::TrimOutput;

/// Seed data for a pipeline run. The document is kept as raw JSON text so
/// Extract sees layers in true document order.
#[derive(Clone, Debug)]
pub struct PipelineInput {
    pub document: String,
    pub selected_layers: BTreeSet<String>,
}

/// Accumulated stage outputs for one pipeline run.
#[derive(Debug, Default)]
pub struct Bundle {
    pub input: Option<PipelineInput>,
    pub extract: Option<ExtractOutput>,
    pub normalize: Option<NormalizeOutput>,
    pub dedup: Option<DedupOutput>,
    pub layers: Option<LayerOutput>,
    pub candidates: Option<DetectorOutput>,
    pub logic_b: Option<TrimOutput>,
    pub logic_c: Option<CorridorOutput>,
    pub logic_d: Option<ContainmentOutput>,
    pub logic_e: Option<BandMergeOutput>,
    pub logic_f: Option<JunctionOutput>,
    pub door_assignments: Option<DoorAssignmentOutput>,
    pub door_bridges: Option<DoorBridgeOutput>,
    pub placeholder: Option<PlaceholderOutput>,
}

macro_rules! upstream_accessor {
    ($fn_name:ident, $field:ident, $ty:ty) => {
        pub fn $fn_name(&self) -> Result<&$ty> {
            self.$field.as_ref().ok_or_else(|| {
                PipelineError::CorruptUpstream(format!(
                    "missing upstream bundle entry `{}`",
                    stringify!($field)
                ))
            })
        }
    };
}

impl Bundle {
    pub fn seeded(input: PipelineInput) -> Self {
        Self {
            input: Some(input),
            ..Default::default()
        }
    }

    upstream_accessor!(input_ref, input, PipelineInput);
    upstream_accessor!(extract_ref, extract, ExtractOutput);
    upstream_accessor!(normalize_ref, normalize, NormalizeOutput);
    upstream_accessor!(dedup_ref, dedup, DedupOutput);
    upstream_accessor!(layers_ref, layers, LayerOutput);
    upstream_accessor!(candidates_ref, candidates, DetectorOutput);
    upstream_accessor!(logic_b_ref, logic_b, TrimOutput);
    upstream_accessor!(logic_c_ref, logic_c, CorridorOutput);
    upstream_accessor!(logic_d_ref, logic_d, ContainmentOutput);
    upstream_accessor!(logic_e_ref, logic_e, BandMergeOutput);
    upstream_accessor!(logic_f_ref, logic_f, JunctionOutput);
    upstream_accessor!(door_assignments_ref, door_assignments, DoorAssignmentOutput);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_upstream_is_corrupt() {
        let bundle = Bundle::default();
        let err = bundle.extract_ref().unwrap_err();
        assert_eq!(err.kind(), "CORRUPT_UPSTREAM");
    }
}
