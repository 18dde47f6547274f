//! CLEAN_DEDUP — content-hash deduplication plus the canvas artifact.
//!
//! Each entity gets a SHA-256 hash over its layer, type and canonical
//! geometry; equal hashes are duplicates and the first occurrence wins. The
//! stage also assembles the canvas payload the viewer consumes: per-layer
//! line lists with deterministic colours and padded drawing bounds.

use std::collections::{BTreeMap, HashSet};

use log::info;
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::entity::{block_content_hash, line_content_hash, Block, Entity, Line, NormEntity};
use crate::error::Result;
use crate::geometry::{BBox, Point, Segment};
use crate::metrics::StageMetrics;

#[derive(Clone, Debug, Serialize)]
pub struct DedupOutput {
    pub entities: Vec<Entity>,
    pub canvas: CanvasData,
    pub original_count: usize,
    pub duplicate_count: usize,
}

/// Viewer payload: per-layer line lists with colours and drawing bounds.
#[derive(Clone, Debug, Serialize)]
pub struct CanvasData {
    pub drawing_bounds: BBox,
    pub layers: BTreeMap<String, CanvasLayer>,
    pub statistics: CanvasStatistics,
}

#[derive(Clone, Debug, Serialize)]
pub struct CanvasLayer {
    pub lines: Vec<CanvasLine>,
    pub color: String,
    pub visible: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct CanvasLine {
    pub id: String,
    pub start: Point,
    pub end: Point,
    pub length: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CanvasStatistics {
    pub total_lines: usize,
    pub total_layers: usize,
    pub layer_names: Vec<String>,
}

pub fn run(bundle: &Bundle, _config: &AlgorithmConfig) -> Result<(DedupOutput, StageMetrics)> {
    let normalize = bundle.normalize_ref()?;

    let mut entities: Vec<Entity> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let original_count = normalize.entities.len();
    let mut duplicate_count = 0usize;

    for norm in &normalize.entities {
        let entity = match norm {
            NormEntity::Line { layer, p1, p2 } => {
                let id = line_content_hash(layer, p1, p2);
                Entity::Line(Line {
                    id,
                    layer: layer.clone(),
                    p1: *p1,
                    p2: *p2,
                    length: Segment::new(*p1, *p2).length(),
                })
            }
            NormEntity::Block(block) => Entity::Block(Block {
                id: block_content_hash(block),
                layer: block.layer.clone(),
                name: block.name.clone(),
                position: block.position,
                rotation_deg: block.rotation_deg,
                bbox_local: block.bbox_local,
            }),
        };
        if seen.insert(entity.id().as_str().to_string()) {
            entities.push(entity);
        } else {
            duplicate_count += 1;
        }
    }

    let canvas = build_canvas(&entities);
    let efficiency = if original_count > 0 {
        100.0 * duplicate_count as f64 / original_count as f64
    } else {
        0.0
    };

    info!(
        "dedup: {} -> {} entities ({} duplicates removed)",
        original_count,
        entities.len(),
        duplicate_count
    );

    let mut metrics = StageMetrics::default();
    metrics.set("original_count", original_count as f64);
    metrics.set("duplicate_count", duplicate_count as f64);
    metrics.set("final_count", entities.len() as f64);
    metrics.set("dedup_efficiency_percent", efficiency);
    metrics.set("canvas_lines", canvas.statistics.total_lines as f64);

    Ok((
        DedupOutput {
            entities,
            canvas,
            original_count,
            duplicate_count,
        },
        metrics,
    ))
}

fn build_canvas(entities: &[Entity]) -> CanvasData {
    let mut layers: BTreeMap<String, CanvasLayer> = BTreeMap::new();
    let mut bounds: Option<BBox> = None;

    for entity in entities {
        if let Entity::Line(line) = entity {
            let layer = layers
                .entry(line.layer.clone())
                .or_insert_with(|| CanvasLayer {
                    lines: Vec::new(),
                    color: layer_color(&line.layer),
                    visible: true,
                });
            layer.lines.push(CanvasLine {
                id: line.id.as_str().to_string(),
                start: line.p1,
                end: line.p2,
                length: line.length,
            });
            let line_box = BBox::from_points(&[line.p1, line.p2]).unwrap_or(BBox::new(
                line.p1.x, line.p1.y, line.p1.x, line.p1.y,
            ));
            bounds = Some(match bounds {
                Some(b) => b.union(&line_box),
                None => line_box,
            });
        }
    }

    // 5% padding per side so the viewer never clips edge geometry.
    let drawing_bounds = match bounds {
        Some(b) => {
            let pad_x = b.width() * 0.05;
            let pad_y = b.height() * 0.05;
            BBox::new(
                b.min_x - pad_x,
                b.min_y - pad_y,
                b.max_x + pad_x,
                b.max_y + pad_y,
            )
        }
        None => BBox::new(0.0, 0.0, 1000.0, 1000.0),
    };

    let total_lines = layers.values().map(|l| l.lines.len()).sum();
    let layer_names: Vec<String> = layers.keys().cloned().collect();
    CanvasData {
        drawing_bounds,
        statistics: CanvasStatistics {
            total_lines,
            total_layers: layers.len(),
            layer_names,
        },
        layers,
    }
}

/// Deterministic layer colour: FNV-1a of the name spread over an HSL wheel.
fn layer_color(layer_name: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in layer_name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    let hue = (hash % 360) as f64;
    let (r, g, b) = hsl_to_rgb(hue, 0.65, 0.55);
    format!("#{r:02X}{g:02X}{b:02X}")
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    (
        ((r1 + m) * 255.0).round() as u8,
        ((g1 + m) * 255.0).round() as u8,
        ((b1 + m) * 255.0).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(layer: &str, x1: f64, y1: f64, x2: f64, y2: f64) -> NormEntity {
        NormEntity::Line {
            layer: layer.into(),
            p1: Point::new(x1, y1),
            p2: Point::new(x2, y2),
        }
    }

    fn run_on(entities: Vec<NormEntity>) -> DedupOutput {
        let mut bundle = Bundle::default();
        bundle.normalize = Some(crate::stages::normalize::NormalizeOutput {
            entities,
            opening_blocks: Vec::new(),
            degenerate_lines: 0,
            degenerate_polyline_segments: 0,
        });
        let (out, _) = run(&bundle, &AlgorithmConfig::default()).unwrap();
        out
    }

    #[test]
    fn exact_duplicates_collapse() {
        let out = run_on(vec![
            line("walls", 0.0, 0.0, 100.0, 0.0),
            line("walls", 0.0, 0.0, 100.0, 0.0),
        ]);
        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.duplicate_count, 1);
    }

    #[test]
    fn reversed_duplicate_collapses() {
        let out = run_on(vec![
            line("walls", 0.0, 0.0, 100.0, 0.0),
            line("walls", 100.0, 0.0, 0.0, 0.0),
        ]);
        assert_eq!(out.entities.len(), 1);
    }

    #[test]
    fn dedup_is_idempotent() {
        let first = run_on(vec![
            line("walls", 0.0, 0.0, 100.0, 0.0),
            line("walls", 0.0, 50.0, 100.0, 50.0),
            line("walls", 0.0, 0.0, 100.0, 0.0),
        ]);
        let again = run_on(
            first
                .entities
                .iter()
                .map(|e| match e {
                    Entity::Line(l) => line(&l.layer, l.p1.x, l.p1.y, l.p2.x, l.p2.y),
                    Entity::Block(_) => unreachable!(),
                })
                .collect(),
        );
        assert_eq!(again.duplicate_count, 0);
        assert_eq!(again.entities.len(), first.entities.len());
        for (a, b) in first.entities.iter().zip(again.entities.iter()) {
            assert_eq!(a.id(), b.id());
        }
    }

    #[test]
    fn canvas_bounds_have_five_percent_padding() {
        let out = run_on(vec![line("walls", 0.0, 0.0, 100.0, 200.0)]);
        let b = out.canvas.drawing_bounds;
        assert_eq!(b.min_x, -5.0);
        assert_eq!(b.max_x, 105.0);
        assert_eq!(b.min_y, -10.0);
        assert_eq!(b.max_y, 210.0);
    }

    #[test]
    fn layer_colors_are_deterministic() {
        assert_eq!(layer_color("walls"), layer_color("walls"));
        assert_ne!(layer_color("walls"), layer_color("doors"));
        assert!(layer_color("walls").starts_with('#'));
        assert_eq!(layer_color("walls").len(), 7);
    }
}
