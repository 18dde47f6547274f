//! WALL_CANDIDATES — pairwise detection of parallel wall-face lines.
//!
//! For every unordered pair of lines, three predicates gate acceptance:
//!
//! 1. Parallelism: `|u_i . u_j| >= cos(angular_tolerance)`. Absolute value
//!    makes antiparallel orientations equivalent.
//! 2. Perpendicular distance: the offset of `L_j`'s midpoint along the normal
//!    of `L_i`, inside `[min_distance_mm, max_distance_mm]`.
//! 3. Longitudinal overlap: both segments projected on `u_i`; overlap length
//!    relative to the shorter line must reach `min_overlap_percentage`.
//!
//! Pairs are emitted in `(i, j)` index order; the pair id is a UUIDv5 over
//! the sorted entity ids so identical inputs always reproduce identical ids.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::entity::{EntityId, Line};
use crate::error::{ensure_finite, PipelineError, Result};
use crate::geometry::{dot, perp, BBox};
use crate::metrics::StageMetrics;

/// Pair of lines accepted by the three geometric predicates.
#[derive(Clone, Debug, Serialize)]
pub struct CandidatePair {
    pub pair_id: Uuid,
    pub line1: Line,
    pub line2: Line,
    pub perpendicular_distance: f64,
    pub overlap_percentage: f64,
    pub angle_difference_deg: f64,
    pub average_length: f64,
    pub bounding_rectangle: BBox,
}

#[derive(Clone, Debug, Serialize)]
pub struct DetectorOutput {
    pub pairs: Vec<CandidatePair>,
    pub rejection_stats: BTreeMap<String, u64>,
    pub unpaired_entity_ids: Vec<EntityId>,
    pub pairs_checked: u64,
}

pub fn run(bundle: &Bundle, config: &AlgorithmConfig) -> Result<(DetectorOutput, StageMetrics)> {
    let layer_output = bundle.layers_ref()?;
    let lines = layer_output.lines();

    if lines.len() > config.max_detector_lines {
        warn!(
            "detector: {} lines exceeds safety cap {}",
            lines.len(),
            config.max_detector_lines
        );
        return Err(PipelineError::OversizedInput {
            lines: lines.len(),
            cap: config.max_detector_lines,
        });
    }

    let cos_tol = config.angular_tolerance_deg.to_radians().cos();
    let mut pairs = Vec::new();
    let mut rejection_stats: BTreeMap<String, u64> = BTreeMap::new();
    let mut pairs_checked = 0u64;

    for i in 0..lines.len() {
        for j in (i + 1)..lines.len() {
            pairs_checked += 1;
            match evaluate_pair(lines[i], lines[j], cos_tol, config)? {
                Ok(pair) => pairs.push(pair),
                Err(reason) => {
                    *rejection_stats.entry(reason.to_string()).or_insert(0) += 1;
                }
            }
        }
    }

    let mut paired: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for pair in &pairs {
        paired.insert(pair.line1.id.as_str());
        paired.insert(pair.line2.id.as_str());
    }
    let unpaired_entity_ids: Vec<EntityId> = lines
        .iter()
        .filter(|l| !paired.contains(l.id.as_str()))
        .map(|l| l.id.clone())
        .collect();

    info!(
        "detector: {} pairs from {} lines ({} checked, {} unpaired)",
        pairs.len(),
        lines.len(),
        pairs_checked,
        unpaired_entity_ids.len()
    );

    let mut metrics = StageMetrics::default();
    metrics.set("entities_analyzed", lines.len() as f64);
    metrics.set("candidate_pairs", pairs.len() as f64);
    metrics.set("total_pairs_checked", pairs_checked as f64);
    metrics.set("unpaired_count", unpaired_entity_ids.len() as f64);
    for (reason, count) in &rejection_stats {
        metrics.set(&format!("rejected_{reason}"), *count as f64);
    }

    Ok((
        DetectorOutput {
            pairs,
            rejection_stats,
            unpaired_entity_ids,
            pairs_checked,
        },
        metrics,
    ))
}

/// Runs the three predicates on one pair. The outer `Result` carries fatal
/// arithmetic corruption; the inner one is accept/reject-with-reason.
fn evaluate_pair(
    a: &Line,
    b: &Line,
    cos_tol: f64,
    config: &AlgorithmConfig,
) -> Result<std::result::Result<CandidatePair, &'static str>> {
    let u_a = a.segment().direction();
    let u_b = b.segment().direction();

    let alignment = dot(u_a, u_b).abs();
    if alignment < cos_tol {
        return Ok(Err("not_parallel"));
    }

    let distance = perpendicular_distance(a, b)?;
    if distance < config.min_distance_mm || distance > config.max_distance_mm {
        return Ok(Err("distance_out_of_range"));
    }

    let overlap_percentage = longitudinal_overlap(a, b, u_a)?;
    if overlap_percentage < config.min_overlap_percentage {
        return Ok(Err("insufficient_overlap"));
    }

    let angle_difference_deg = ensure_finite(
        alignment.clamp(0.0, 1.0).acos().to_degrees(),
        "angle difference",
    )?;
    let average_length = (a.length + b.length) / 2.0;
    let bounding_rectangle = BBox::from_points(&[a.p1, a.p2, b.p1, b.p2]).ok_or_else(|| {
        PipelineError::CorruptUpstream("candidate pair without endpoints".into())
    })?;
    if !bounding_rectangle.is_finite() {
        return Err(PipelineError::CorruptUpstream(
            "non-finite candidate bounding rectangle".into(),
        ));
    }

    Ok(Ok(CandidatePair {
        pair_id: pair_uuid(&a.id, &b.id),
        line1: a.clone(),
        line2: b.clone(),
        perpendicular_distance: distance,
        overlap_percentage,
        angle_difference_deg,
        average_length,
        bounding_rectangle,
    }))
}

/// Offset of `b`'s midpoint along the normal of `a`.
fn perpendicular_distance(a: &Line, b: &Line) -> Result<f64> {
    let u = a.segment().direction();
    let n = perp(u);
    let mid = b.segment().midpoint();
    let to_mid = [mid.x - a.p1.x, mid.y - a.p1.y];
    ensure_finite(dot(to_mid, n).abs(), "perpendicular distance")
}

/// Projects both segments onto `u` and returns the overlap length as a
/// percentage of the shorter line.
fn longitudinal_overlap(a: &Line, b: &Line, u: [f64; 2]) -> Result<f64> {
    let proj = |p: &crate::geometry::Point| dot([p.x - a.p1.x, p.y - a.p1.y], u);
    let (a_lo, a_hi) = minmax(proj(&a.p1), proj(&a.p2));
    let (b_lo, b_hi) = minmax(proj(&b.p1), proj(&b.p2));
    let overlap = (a_hi.min(b_hi) - a_lo.max(b_lo)).max(0.0);
    let shorter = a.length.min(b.length);
    let percentage = if shorter > 0.0 {
        100.0 * overlap / shorter
    } else {
        0.0
    };
    ensure_finite(percentage, "overlap percentage")
}

fn minmax(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Deterministic pair id: UUIDv5 over the sorted entity-id pair, so swapping
/// the operand order yields the same id.
pub fn pair_uuid(a: &EntityId, b: &EntityId) -> Uuid {
    let (lo, hi) = if a.as_str() <= b.as_str() {
        (a.as_str(), b.as_str())
    } else {
        (b.as_str(), a.as_str())
    };
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{lo}|{hi}").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::line_content_hash;
    use crate::geometry::Point;

    pub(crate) fn make_line(layer: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> Line {
        let p1 = Point::new(x1, y1);
        let p2 = Point::new(x2, y2);
        Line {
            id: line_content_hash(layer, &p1, &p2),
            layer: layer.into(),
            p1,
            p2,
            length: p1.distance_to(&p2),
        }
    }

    fn eval(a: &Line, b: &Line) -> std::result::Result<CandidatePair, &'static str> {
        let config = AlgorithmConfig::default();
        let cos_tol = config.angular_tolerance_deg.to_radians().cos();
        evaluate_pair(a, b, cos_tol, &config).unwrap()
    }

    #[test]
    fn clean_pair_accepted_with_expected_properties() {
        let a = make_line("w", 0.0, 0.0, 1000.0, 0.0);
        let b = make_line("w", 0.0, 100.0, 1000.0, 100.0);
        let pair = eval(&a, &b).unwrap();
        assert_eq!(pair.perpendicular_distance, 100.0);
        assert_eq!(pair.overlap_percentage, 100.0);
        assert_eq!(pair.angle_difference_deg, 0.0);
        assert_eq!(pair.average_length, 1000.0);
        assert_eq!(pair.bounding_rectangle, BBox::new(0.0, 0.0, 1000.0, 100.0));
    }

    #[test]
    fn close_pair_rejected_by_distance() {
        let a = make_line("w", 0.0, 0.0, 1000.0, 0.0);
        let b = make_line("w", 0.0, 10.0, 1000.0, 10.0);
        assert_eq!(eval(&a, &b).unwrap_err(), "distance_out_of_range");
    }

    #[test]
    fn staggered_pair_rejected_by_overlap() {
        let a = make_line("w", 0.0, 0.0, 1000.0, 0.0);
        let b = make_line("w", 800.0, 100.0, 1800.0, 100.0);
        assert_eq!(eval(&a, &b).unwrap_err(), "insufficient_overlap");
    }

    #[test]
    fn skewed_pair_rejected_by_parallelism() {
        let a = make_line("w", 0.0, 0.0, 1000.0, 0.0);
        let b = make_line("w", 0.0, 100.0, 900.0, 250.0);
        assert_eq!(eval(&a, &b).unwrap_err(), "not_parallel");
    }

    #[test]
    fn antiparallel_counts_as_parallel() {
        let a = make_line("w", 0.0, 0.0, 1000.0, 0.0);
        let b = make_line("w", 1000.0, 100.0, 0.0, 100.0);
        assert!(eval(&a, &b).is_ok());
    }

    #[test]
    fn pair_acceptance_is_symmetric() {
        let a = make_line("w", 0.0, 0.0, 1000.0, 0.0);
        let b = make_line("w", 50.0, 100.0, 950.0, 100.0);
        let ab = eval(&a, &b).unwrap();
        let ba = eval(&b, &a).unwrap();
        assert_eq!(ab.pair_id, ba.pair_id);
        assert_eq!(ab.overlap_percentage, ba.overlap_percentage);
    }

    #[test]
    fn pair_uuid_is_order_independent_and_stable() {
        let a = make_line("w", 0.0, 0.0, 1000.0, 0.0);
        let b = make_line("w", 0.0, 100.0, 1000.0, 100.0);
        let u1 = pair_uuid(&a.id, &b.id);
        let u2 = pair_uuid(&b.id, &a.id);
        assert_eq!(u1, u2);
        assert_eq!(u1, pair_uuid(&a.id, &b.id));
    }

    #[test]
    fn epsilon_shift_does_not_flip_acceptance() {
        let a = make_line("w", 0.0, 0.0, 1000.0, 0.0);
        let b = make_line("w", 0.0, 100.0, 1000.0, 100.0);
        let shifted = make_line("w", 1e-6, 100.0, 1000.0 + 1e-6, 100.0);
        assert!(eval(&a, &b).is_ok());
        assert!(eval(&a, &shifted).is_ok());
    }

    #[test]
    fn oversized_input_fails_stage() {
        let mut config = AlgorithmConfig::default();
        config.max_detector_lines = 1;
        let mut bundle = Bundle::default();
        bundle.dedup = Some(crate::stages::dedup::DedupOutput {
            entities: vec![
                crate::entity::Entity::Line(make_line("w", 0.0, 0.0, 10.0, 0.0)),
                crate::entity::Entity::Line(make_line("w", 0.0, 5.0, 10.0, 5.0)),
            ],
            canvas: crate::stages::dedup::CanvasData {
                drawing_bounds: BBox::new(0.0, 0.0, 1.0, 1.0),
                layers: Default::default(),
                statistics: crate::stages::dedup::CanvasStatistics {
                    total_lines: 0,
                    total_layers: 0,
                    layer_names: vec![],
                },
            },
            original_count: 2,
            duplicate_count: 0,
        });
        let (layer_out, _) = crate::stages::layers::run(&bundle, &config).unwrap();
        bundle.layers = Some(layer_out);
        let err = run(&bundle, &config).unwrap_err();
        assert_eq!(err.kind(), "OVERSIZED_INPUT");
    }
}
