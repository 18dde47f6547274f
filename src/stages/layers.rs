//! PARALLEL_NAIVE — per-layer grouping with bounding boxes.
//!
//! Grouping preserves the dedup order inside each layer; layer groups are
//! emitted in lexicographic name order. Bounding boxes are computed on a
//! rayon pool, the flatten is serial so downstream ordering stays stable.

use std::collections::BTreeMap;

use log::info;
use rayon::prelude::*;
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::entity::{Entity, Line};
use crate::error::Result;
use crate::geometry::BBox;
use crate::metrics::StageMetrics;

#[derive(Clone, Debug, Serialize)]
pub struct LayerGroup {
    pub name: String,
    pub entities: Vec<Entity>,
    pub bbox: Option<BBox>,
}

#[derive(Clone, Debug, Serialize)]
pub struct LayerOutput {
    pub layers: Vec<LayerGroup>,
    pub flat_entities: Vec<Entity>,
}

impl LayerOutput {
    /// All line entities in flat order; the detector and the corridor filter
    /// both iterate this view.
    pub fn lines(&self) -> Vec<&Line> {
        self.flat_entities
            .iter()
            .filter_map(|e| match e {
                Entity::Line(l) => Some(l),
                Entity::Block(_) => None,
            })
            .collect()
    }
}

pub fn run(bundle: &Bundle, _config: &AlgorithmConfig) -> Result<(LayerOutput, StageMetrics)> {
    let dedup = bundle.dedup_ref()?;

    let mut grouped: BTreeMap<String, Vec<Entity>> = BTreeMap::new();
    for entity in &dedup.entities {
        grouped
            .entry(entity.layer().to_string())
            .or_default()
            .push(entity.clone());
    }

    let mut layers: Vec<LayerGroup> = grouped
        .into_iter()
        .map(|(name, entities)| LayerGroup {
            name,
            entities,
            bbox: None,
        })
        .collect();

    layers
        .par_iter_mut()
        .for_each(|group| group.bbox = layer_bbox(&group.entities));

    let flat_entities: Vec<Entity> = layers
        .iter()
        .flat_map(|g| g.entities.iter().cloned())
        .collect();

    info!(
        "parallel-naive: {} layers, {} entities flattened",
        layers.len(),
        flat_entities.len()
    );

    let mut metrics = StageMetrics::default();
    metrics.set("layers", layers.len() as f64);
    metrics.set("flat_entities", flat_entities.len() as f64);
    metrics.set(
        "line_entities",
        flat_entities
            .iter()
            .filter(|e| matches!(e, Entity::Line(_)))
            .count() as f64,
    );

    Ok((
        LayerOutput {
            layers,
            flat_entities,
        },
        metrics,
    ))
}

fn layer_bbox(entities: &[Entity]) -> Option<BBox> {
    let mut bbox: Option<BBox> = None;
    for entity in entities {
        let entity_box = match entity {
            Entity::Line(l) => BBox::from_points(&[l.p1, l.p2])?,
            Entity::Block(b) => b.bbox_local.translated(b.position.x, b.position.y),
        };
        bbox = Some(match bbox {
            Some(acc) => acc.union(&entity_box),
            None => entity_box,
        });
    }
    bbox
}
