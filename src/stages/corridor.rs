//! LOGIC_C — drop rectangles whose corridor contains third-party geometry.
//!
//! A rectangle survives only if no other line's midpoint lies strictly inside
//! its corridor quadrilateral. Lines are prefiltered by axis-aligned bounds
//! before the ray-casting test runs.

use log::info;
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::error::Result;
use crate::geometry::{order_quad_corners, point_strictly_in_quad, BBox};
use crate::metrics::StageMetrics;
use crate::stages::trim::TrimmedRectangle;

#[derive(Clone, Debug, Serialize)]
pub struct CorridorOutput {
    pub rectangles: Vec<TrimmedRectangle>,
    pub removed: usize,
}

pub fn run(bundle: &Bundle, _config: &AlgorithmConfig) -> Result<(CorridorOutput, StageMetrics)> {
    let trim = bundle.logic_b_ref()?;
    let layer_output = bundle.layers_ref()?;
    let lines = layer_output.lines();

    let input_count = trim.rectangles.len();
    let mut rectangles = Vec::with_capacity(input_count);
    for rect in &trim.rectangles {
        if !has_intervening_line(rect, &lines) {
            rectangles.push(rect.clone());
        }
    }
    let removed = input_count - rectangles.len();

    info!("corridor filter: {input_count} -> {} rectangles", rectangles.len());

    let mut metrics = StageMetrics::default();
    metrics.set("input_rectangles", input_count as f64);
    metrics.set("rectangles", rectangles.len() as f64);
    metrics.set("removed", removed as f64);

    Ok((
        CorridorOutput {
            rectangles,
            removed,
        },
        metrics,
    ))
}

fn has_intervening_line(rect: &TrimmedRectangle, lines: &[&crate::entity::Line]) -> bool {
    let quad = order_quad_corners(rect.corners());
    for line in lines {
        if line.id == rect.source_line_id_a || line.id == rect.source_line_id_b {
            continue;
        }
        let line_box = BBox::from_points(&[line.p1, line.p2]);
        let line_box = match line_box {
            Some(b) => b,
            None => continue,
        };
        if !line_box.intersects(&rect.bounding_rectangle) {
            continue;
        }
        if point_strictly_in_quad(&line.segment().midpoint(), &quad) {
            return true;
        }
    }
    false
}
