//! LOGIC_D — prune rectangles fully contained inside a larger rectangle.
//!
//! Containment is tested against the oriented quadrilateral, not the AABB, so
//! rotated walls prune correctly. A rectangle drops when all four of its
//! corners sit inside another rectangle's quad within the configured
//! tolerance; between equal-area rectangles the lower pair id survives.

use log::info;
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::error::Result;
use crate::geometry::{order_quad_corners, point_in_quad_with_tol, quad_area};
use crate::metrics::StageMetrics;
use crate::stages::trim::TrimmedRectangle;

#[derive(Clone, Debug, Serialize)]
pub struct ContainmentOutput {
    pub rectangles: Vec<TrimmedRectangle>,
    pub removed: usize,
}

pub fn run(bundle: &Bundle, config: &AlgorithmConfig) -> Result<(ContainmentOutput, StageMetrics)> {
    let corridor = bundle.logic_c_ref()?;
    let input = &corridor.rectangles;

    let quads: Vec<_> = input
        .iter()
        .map(|r| order_quad_corners(r.corners()))
        .collect();
    let areas: Vec<f64> = quads.iter().map(quad_area).collect();

    let mut rectangles = Vec::with_capacity(input.len());
    let mut removed = 0usize;
    for i in 0..input.len() {
        let mut dropped = false;
        for j in 0..input.len() {
            if i == j || !input[j].bounding_rectangle.intersects(&input[i].bounding_rectangle) {
                continue;
            }
            if !contained(&quads[i], &quads[j], config.containment_tol_mm) {
                continue;
            }
            let larger = areas[j] > areas[i] + config.containment_area_eps_mm2;
            let equal = (areas[j] - areas[i]).abs() <= config.containment_area_eps_mm2;
            if larger || (equal && input[j].primary_pair_id() < input[i].primary_pair_id()) {
                dropped = true;
                break;
            }
        }
        if dropped {
            removed += 1;
        } else {
            rectangles.push(input[i].clone());
        }
    }

    info!(
        "containment prune: {} -> {} rectangles",
        input.len(),
        rectangles.len()
    );

    let mut metrics = StageMetrics::default();
    metrics.set("input_rectangles", input.len() as f64);
    metrics.set("rectangles", rectangles.len() as f64);
    metrics.set("removed", removed as f64);

    Ok((
        ContainmentOutput {
            rectangles,
            removed,
        },
        metrics,
    ))
}

fn contained(
    inner: &[crate::geometry::Point; 4],
    outer: &[crate::geometry::Point; 4],
    tol: f64,
) -> bool {
    inner.iter().all(|p| point_in_quad_with_tol(p, outer, tol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::line_content_hash;
    use crate::geometry::{BBox, Point, Segment};
    use crate::stages::detector::pair_uuid;

    fn make_rect(x1: f64, y1: f64, x2: f64, y2: f64) -> TrimmedRectangle {
        make_rect_on("w", x1, y1, x2, y2)
    }

    fn make_rect_on(layer: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> TrimmedRectangle {
        let a = Segment::new(Point::new(x1, y1), Point::new(x2, y1));
        let b = Segment::new(Point::new(x1, y2), Point::new(x2, y2));
        let id_a = line_content_hash(layer, &a.p1, &a.p2);
        let id_b = line_content_hash(layer, &b.p1, &b.p2);
        TrimmedRectangle {
            trimmed_segment_a: a,
            trimmed_segment_b: b,
            bounding_rectangle: BBox::new(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)),
            source_pair_ids: vec![pair_uuid(&id_a, &id_b)],
            source_line_id_a: id_a,
            source_line_id_b: id_b,
        }
    }

    fn run_on(rects: Vec<TrimmedRectangle>) -> ContainmentOutput {
        let mut bundle = Bundle::default();
        bundle.logic_c = Some(crate::stages::corridor::CorridorOutput {
            rectangles: rects,
            removed: 0,
        });
        let (out, _) = run(&bundle, &AlgorithmConfig::default()).unwrap();
        out
    }

    #[test]
    fn inner_rectangle_drops() {
        let out = run_on(vec![
            make_rect(0.0, 0.0, 1000.0, 200.0),
            make_rect(100.0, 50.0, 900.0, 150.0),
        ]);
        assert_eq!(out.rectangles.len(), 1);
        assert_eq!(out.removed, 1);
        assert_eq!(
            out.rectangles[0].bounding_rectangle,
            BBox::new(0.0, 0.0, 1000.0, 200.0)
        );
    }

    #[test]
    fn disjoint_rectangles_both_survive() {
        let out = run_on(vec![
            make_rect(0.0, 0.0, 500.0, 100.0),
            make_rect(600.0, 0.0, 1100.0, 100.0),
        ]);
        assert_eq!(out.rectangles.len(), 2);
    }

    #[test]
    fn overlapping_but_not_contained_survive() {
        let out = run_on(vec![
            make_rect(0.0, 0.0, 600.0, 100.0),
            make_rect(400.0, 0.0, 1000.0, 100.0),
        ]);
        assert_eq!(out.rectangles.len(), 2);
    }

    #[test]
    fn coincident_rectangles_keep_the_lower_pair_id() {
        let first = make_rect_on("w1", 0.0, 0.0, 1000.0, 100.0);
        let second = make_rect_on("w2", 0.0, 0.0, 1000.0, 100.0);
        let survivor_id = first.primary_pair_id().min(second.primary_pair_id());
        let out = run_on(vec![first, second]);
        assert_eq!(out.rectangles.len(), 1);
        assert_eq!(out.rectangles[0].primary_pair_id(), survivor_id);
    }

    #[test]
    fn near_contained_within_tolerance_drops() {
        // Inner pokes 0.5 mm outside the outer; tolerance is 1 mm.
        let out = run_on(vec![
            make_rect(0.0, 0.0, 1000.0, 200.0),
            make_rect(-0.5, 50.0, 900.0, 150.0),
        ]);
        assert_eq!(out.rectangles.len(), 1);
    }
}
