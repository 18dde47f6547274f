//! LOGIC_B — trim each candidate pair to its shared longitudinal overlap.
//!
//! Both lines are oriented along the reference direction of `line1`, projected
//! onto it, and cut to the common parameter interval. Segment B is segment A
//! offset by the pair's signed perpendicular distance, so the two trimmed
//! segments are exactly matched: equal length, constant thickness.

use serde::Serialize;
use uuid::Uuid;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::entity::EntityId;
use crate::error::{PipelineError, Result};
use crate::geometry::{dot, perp, BBox, Point, Segment};
use crate::metrics::StageMetrics;
use crate::stages::detector::CandidatePair;

/// A wall rectangle: two trim-matched parallel segments.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimmedRectangle {
    pub trimmed_segment_a: Segment,
    pub trimmed_segment_b: Segment,
    pub bounding_rectangle: BBox,
    pub source_pair_ids: Vec<Uuid>,
    pub source_line_id_a: EntityId,
    pub source_line_id_b: EntityId,
}

impl TrimmedRectangle {
    pub fn corners(&self) -> [Point; 4] {
        [
            self.trimmed_segment_a.p1,
            self.trimmed_segment_a.p2,
            self.trimmed_segment_b.p2,
            self.trimmed_segment_b.p1,
        ]
    }

    /// Perpendicular separation of the two trimmed segments.
    pub fn thickness(&self) -> f64 {
        let u = self.trimmed_segment_a.direction();
        let n = perp(u);
        let ma = self.trimmed_segment_a.midpoint();
        let mb = self.trimmed_segment_b.midpoint();
        dot([mb.x - ma.x, mb.y - ma.y], n).abs()
    }

    /// Lowest contributing pair id, used for deterministic tie-breaks.
    pub fn primary_pair_id(&self) -> Uuid {
        self.source_pair_ids
            .first()
            .copied()
            .unwrap_or_else(Uuid::nil)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TrimOutput {
    pub rectangles: Vec<TrimmedRectangle>,
}

pub fn run(bundle: &Bundle, _config: &AlgorithmConfig) -> Result<(TrimOutput, StageMetrics)> {
    let detector = bundle.candidates_ref()?;

    let mut rectangles = Vec::with_capacity(detector.pairs.len());
    for pair in &detector.pairs {
        rectangles.push(trim_pair(pair)?);
    }

    let mut metrics = StageMetrics::default();
    metrics.set("input_pairs", detector.pairs.len() as f64);
    metrics.set("rectangles", rectangles.len() as f64);

    Ok((TrimOutput { rectangles }, metrics))
}

fn trim_pair(pair: &CandidatePair) -> Result<TrimmedRectangle> {
    let a = &pair.line1;
    let b = &pair.line2;
    let u = a.segment().direction();

    let proj = |p: &Point| dot([p.x - a.p1.x, p.y - a.p1.y], u);

    let (a_lo, a_hi) = ordered(proj(&a.p1), proj(&a.p2));
    let (b_lo, b_hi) = ordered(proj(&b.p1), proj(&b.p2));
    let t_lo = a_lo.max(b_lo);
    let t_hi = a_hi.min(b_hi);
    if !(t_lo.is_finite() && t_hi.is_finite()) || t_hi <= t_lo {
        return Err(PipelineError::CorruptUpstream(format!(
            "pair {} reached trim without positive overlap",
            pair.pair_id
        )));
    }

    let at = |t: f64| Point::new(a.p1.x + u[0] * t, a.p1.y + u[1] * t);
    let trimmed_segment_a = Segment::new(at(t_lo), at(t_hi));

    // Offset A by the signed midpoint distance: the quadrilateral becomes a
    // parallelogram of thickness equal to the pair's perpendicular distance.
    let n = perp(u);
    let mid_b = b.segment().midpoint();
    let offset = dot([mid_b.x - a.p1.x, mid_b.y - a.p1.y], n);
    let shift = |p: Point| Point::new(p.x + n[0] * offset, p.y + n[1] * offset);
    let trimmed_segment_b = Segment::new(shift(trimmed_segment_a.p1), shift(trimmed_segment_a.p2));

    let bounding_rectangle = BBox::from_points(&[
        trimmed_segment_a.p1,
        trimmed_segment_a.p2,
        trimmed_segment_b.p1,
        trimmed_segment_b.p2,
    ])
    .ok_or_else(|| PipelineError::CorruptUpstream("trim produced no corners".into()))?;
    if !bounding_rectangle.is_finite() {
        return Err(PipelineError::CorruptUpstream(
            "non-finite trim rectangle".into(),
        ));
    }

    Ok(TrimmedRectangle {
        trimmed_segment_a,
        trimmed_segment_b,
        bounding_rectangle,
        source_pair_ids: vec![pair.pair_id],
        source_line_id_a: a.id.clone(),
        source_line_id_b: b.id.clone(),
    })
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
