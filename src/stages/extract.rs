//! EXTRACT — walk the input document and emit typed entities.
//!
//! Entities on selected layers become [`RawEntity`] values in document order:
//! layers in the order the document lists them, entities in array order
//! within each layer. Independently, every layer whose name matches the
//! window/door rules has its blocks collected as opening blocks, regardless
//! of selection. Undecodable entities drop with a counter, never an error.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::document::{DocEntity, InputDocument};
use crate::entity::{BlockData, OpeningBlock, RawEntity};
use crate::error::{PipelineError, Result};
use crate::metrics::StageMetrics;

#[derive(Clone, Debug, Default, Serialize)]
pub struct LayerStats {
    pub lines: usize,
    pub polylines: usize,
    pub blocks: usize,
    pub total: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExtractOutput {
    pub entities: Vec<RawEntity>,
    pub opening_blocks: Vec<OpeningBlock>,
    pub layer_stats: BTreeMap<String, LayerStats>,
    pub dropped_entities: usize,
}

pub fn run(bundle: &Bundle, config: &AlgorithmConfig) -> Result<(ExtractOutput, StageMetrics)> {
    let input = bundle.input_ref()?;
    if input.selected_layers.is_empty() {
        return Err(PipelineError::InvalidInput(
            "selected-layer set is empty".into(),
        ));
    }

    let document: InputDocument = serde_json::from_str(&input.document)
        .map_err(|e| PipelineError::InvalidInput(format!("document parse failed: {e}")))?;

    let mut entities = Vec::new();
    let mut opening_blocks = Vec::new();
    let mut layer_stats = BTreeMap::new();
    let mut dropped = 0usize;

    for (layer_name, layer) in &document.layers {
        let selected = input.selected_layers.contains(layer_name);
        let opening_kind = config.layer_rules.classify(layer_name);
        if !selected && opening_kind.is_none() {
            continue;
        }

        let mut stats = LayerStats::default();
        for raw in &layer.entities {
            let decoded: DocEntity = match serde_json::from_value(raw.clone()) {
                Ok(e) => e,
                Err(err) => {
                    dropped += 1;
                    debug!("dropping undecodable entity on layer {layer_name}: {err}");
                    continue;
                }
            };
            match decoded {
                DocEntity::Line { start, end } => {
                    if selected {
                        stats.lines += 1;
                        entities.push(RawEntity::Line {
                            layer: layer_name.clone(),
                            p1: start.to_point(),
                            p2: end.to_point(),
                        });
                    }
                }
                DocEntity::Polyline { vertices, closed } => {
                    if vertices.len() < 2 {
                        dropped += 1;
                        continue;
                    }
                    if selected {
                        stats.polylines += 1;
                        entities.push(RawEntity::Polyline {
                            layer: layer_name.clone(),
                            vertices: vertices.iter().map(|v| v.to_point()).collect(),
                            closed,
                        });
                    }
                }
                DocEntity::Block {
                    name,
                    position,
                    rotation,
                    bounding_box,
                } => {
                    let block = BlockData {
                        layer: layer_name.clone(),
                        name,
                        position: position.to_point(),
                        rotation_deg: rotation,
                        bbox_local: bounding_box.to_bbox(),
                    };
                    if let Some(kind) = opening_kind {
                        opening_blocks.push(OpeningBlock {
                            kind,
                            block: block.clone(),
                        });
                    }
                    if selected {
                        stats.blocks += 1;
                        entities.push(RawEntity::Block(block));
                    }
                }
            }
        }
        if selected {
            stats.total = stats.lines + stats.polylines + stats.blocks;
            layer_stats.insert(layer_name.clone(), stats);
        }
    }

    info!(
        "extract: {} entities from {} layers, {} opening blocks, {} dropped",
        entities.len(),
        layer_stats.len(),
        opening_blocks.len(),
        dropped
    );

    let mut metrics = StageMetrics::default();
    metrics.set("total_entities", entities.len() as f64);
    metrics.set(
        "total_lines",
        layer_stats.values().map(|s| s.lines).sum::<usize>() as f64,
    );
    metrics.set(
        "total_polylines",
        layer_stats.values().map(|s| s.polylines).sum::<usize>() as f64,
    );
    metrics.set(
        "total_blocks",
        layer_stats.values().map(|s| s.blocks).sum::<usize>() as f64,
    );
    metrics.set("layers_processed", layer_stats.len() as f64);
    metrics.set("opening_blocks", opening_blocks.len() as f64);
    metrics.set("dropped_entities", dropped as f64);

    Ok((
        ExtractOutput {
            entities,
            opening_blocks,
            layer_stats,
            dropped_entities: dropped,
        },
        metrics,
    ))
}
