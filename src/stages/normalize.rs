//! NORMALIZE — quantise coordinates, explode polylines, drop degenerates.
//!
//! Every coordinate is rounded to the nearest multiple of `epsilon_mm`.
//! Polylines contribute one line segment per edge (plus the closing edge for
//! closed polylines) and cease to exist as entities. Block rotations are
//! normalised into `[0, 360)`; gradian inputs (|rot| in (360, 4000]) convert
//! to degrees first, matching the exporter conventions seen in the wild.

use log::info;
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::entity::{BlockData, NormEntity, OpeningBlock, RawEntity};
use crate::error::Result;
use crate::geometry::{Point, Segment};
use crate::metrics::StageMetrics;

#[derive(Clone, Debug, Serialize)]
pub struct NormalizeOutput {
    pub entities: Vec<NormEntity>,
    pub opening_blocks: Vec<OpeningBlock>,
    pub degenerate_lines: usize,
    pub degenerate_polyline_segments: usize,
}

pub fn run(bundle: &Bundle, config: &AlgorithmConfig) -> Result<(NormalizeOutput, StageMetrics)> {
    let extract = bundle.extract_ref()?;
    let eps = config.epsilon_mm;

    let mut entities = Vec::new();
    let mut degenerate_lines = 0usize;
    let mut degenerate_polyline_segments = 0usize;
    let mut polylines_exploded = 0usize;

    for raw in &extract.entities {
        match raw {
            RawEntity::Line { layer, p1, p2 } => {
                let p1 = quantize_point(p1, eps);
                let p2 = quantize_point(p2, eps);
                if Segment::new(p1, p2).length() < eps {
                    degenerate_lines += 1;
                    continue;
                }
                entities.push(NormEntity::Line {
                    layer: layer.clone(),
                    p1,
                    p2,
                });
            }
            RawEntity::Polyline {
                layer,
                vertices,
                closed,
            } => {
                polylines_exploded += 1;
                let quantized: Vec<Point> =
                    vertices.iter().map(|v| quantize_point(v, eps)).collect();
                let mut edges: Vec<(Point, Point)> = quantized
                    .windows(2)
                    .map(|w| (w[0], w[1]))
                    .collect();
                if *closed && quantized.len() >= 2 {
                    let first = quantized[0];
                    let last = quantized[quantized.len() - 1];
                    edges.push((last, first));
                }
                for (a, b) in edges {
                    if Segment::new(a, b).length() < eps {
                        degenerate_polyline_segments += 1;
                        continue;
                    }
                    entities.push(NormEntity::Line {
                        layer: layer.clone(),
                        p1: a,
                        p2: b,
                    });
                }
            }
            RawEntity::Block(block) => {
                entities.push(NormEntity::Block(normalize_block(block, eps)));
            }
        }
    }

    let opening_blocks: Vec<OpeningBlock> = extract
        .opening_blocks
        .iter()
        .map(|ob| OpeningBlock {
            kind: ob.kind,
            block: normalize_block(&ob.block, eps),
        })
        .collect();

    info!(
        "normalize: {} entities ({} polylines exploded, {} degenerate dropped)",
        entities.len(),
        polylines_exploded,
        degenerate_lines + degenerate_polyline_segments
    );

    let mut metrics = StageMetrics::default();
    metrics.set("total_normalized", entities.len() as f64);
    metrics.set("polylines_exploded", polylines_exploded as f64);
    metrics.set("degenerate_lines", degenerate_lines as f64);
    metrics.set(
        "degenerate_polyline_segments",
        degenerate_polyline_segments as f64,
    );
    metrics.set("epsilon_mm", eps);

    Ok((
        NormalizeOutput {
            entities,
            opening_blocks,
            degenerate_lines,
            degenerate_polyline_segments,
        },
        metrics,
    ))
}

fn quantize(value: f64, eps: f64) -> f64 {
    (value / eps).round() * eps
}

fn quantize_point(p: &Point, eps: f64) -> Point {
    Point::new(quantize(p.x, eps), quantize(p.y, eps))
}

fn normalize_block(block: &BlockData, eps: f64) -> BlockData {
    BlockData {
        layer: block.layer.clone(),
        name: block.name.clone(),
        position: quantize_point(&block.position, eps),
        rotation_deg: normalize_rotation(block.rotation_deg),
        bbox_local: block.bbox_local,
    }
}

/// Maps a rotation into degrees `[0, 360)`, converting gradian magnitudes.
fn normalize_rotation(rot: f64) -> f64 {
    let mut deg = rot;
    if deg.abs() > 360.0 && deg.abs() <= 4000.0 {
        deg *= 360.0 / 4000.0;
    }
    deg.rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::PipelineInput;
    use crate::stages::extract;
    use serde_json::json;

    fn run_on(doc: serde_json::Value, layers: &[&str]) -> NormalizeOutput {
        let mut bundle = Bundle::seeded(PipelineInput {
            document: doc.to_string(),
            selected_layers: layers.iter().map(|s| s.to_string()).collect(),
        });
        let config = AlgorithmConfig::default();
        let (out, _) = extract::run(&bundle, &config).unwrap();
        bundle.extract = Some(out);
        let (out, _) = run(&bundle, &config).unwrap();
        out
    }

    #[test]
    fn open_polyline_explodes_to_n_minus_1_segments() {
        let doc = json!({"layers": {"walls": {"entities": [{
            "type": "POLYLINE",
            "vertices": [{"x": 0, "y": 0}, {"x": 10, "y": 0}, {"x": 10, "y": 10}, {"x": 0, "y": 10}]
        }]}}});
        let out = run_on(doc, &["walls"]);
        assert_eq!(out.entities.len(), 3);
    }

    #[test]
    fn closed_polyline_explodes_to_n_segments() {
        let doc = json!({"layers": {"walls": {"entities": [{
            "type": "POLYLINE", "closed": true,
            "vertices": [{"x": 0, "y": 0}, {"x": 10, "y": 0}, {"x": 10, "y": 10}]
        }]}}});
        let out = run_on(doc, &["walls"]);
        assert_eq!(out.entities.len(), 3);
    }

    #[test]
    fn degenerate_line_drops_with_counter() {
        let doc = json!({"layers": {"walls": {"entities": [
            {"type": "LINE", "start": {"x": 5.0, "y": 5.0}, "end": {"x": 5.0, "y": 5.0}},
            {"type": "LINE", "start": {"x": 0, "y": 0}, "end": {"x": 10, "y": 0}}
        ]}}});
        let out = run_on(doc, &["walls"]);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.degenerate_lines, 1);
    }

    #[test]
    fn coordinates_round_to_epsilon() {
        let doc = json!({"layers": {"walls": {"entities": [
            {"type": "LINE", "start": {"x": 0.0000004, "y": 0.0}, "end": {"x": 10.0, "y": 0.0}}
        ]}}});
        let out = run_on(doc, &["walls"]);
        match &out.entities[0] {
            NormEntity::Line { p1, .. } => assert_eq!(p1.x, 0.0),
            other => panic!("unexpected entity: {other:?}"),
        }
    }

    #[test]
    fn rotation_normalisation() {
        assert_eq!(normalize_rotation(-90.0), 270.0);
        assert_eq!(normalize_rotation(450.0), 40.5); // gradian magnitude
        assert_eq!(normalize_rotation(1000.0), 90.0); // gradians
        assert_eq!(normalize_rotation(360.0), 0.0);
    }
}
