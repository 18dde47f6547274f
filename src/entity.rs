//! Typed entity model threaded through the pipeline.
//!
//! Three generations of the same data, refined stage by stage:
//! - [`RawEntity`] — as decoded from the document (Extract), coordinates
//!   untouched, polylines still whole.
//! - [`NormEntity`] — after Normalize: coordinates quantised, polylines
//!   exploded into line segments. The polyline variant no longer exists.
//! - [`Entity`] — after Clean-Dedup: each entity carries its content hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::geometry::{BBox, Point};

/// 64-hex-character SHA-256 content hash identifying an entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Block instance payload, shared by the raw and normalized generations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockData {
    pub layer: String,
    pub name: String,
    pub position: Point,
    pub rotation_deg: f64,
    pub bbox_local: BBox,
}

/// Window/door classification for collected opening blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningKind {
    Window,
    Door,
}

/// A block instance collected from a window/door layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OpeningBlock {
    pub kind: OpeningKind,
    pub block: BlockData,
}

/// Entity as decoded from the input document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "entity_type")]
pub enum RawEntity {
    #[serde(rename = "LINE")]
    Line { layer: String, p1: Point, p2: Point },
    #[serde(rename = "POLYLINE")]
    Polyline {
        layer: String,
        vertices: Vec<Point>,
        closed: bool,
    },
    #[serde(rename = "BLOCK")]
    Block(BlockData),
}

impl RawEntity {
    pub fn layer(&self) -> &str {
        match self {
            RawEntity::Line { layer, .. } => layer,
            RawEntity::Polyline { layer, .. } => layer,
            RawEntity::Block(b) => &b.layer,
        }
    }
}

/// Entity after Normalize. Polylines have been exploded into lines.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "entity_type")]
pub enum NormEntity {
    #[serde(rename = "LINE")]
    Line { layer: String, p1: Point, p2: Point },
    #[serde(rename = "BLOCK")]
    Block(BlockData),
}

/// Line entity with a stable content hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Line {
    pub id: EntityId,
    pub layer: String,
    pub p1: Point,
    pub p2: Point,
    pub length: f64,
}

impl Line {
    pub fn segment(&self) -> crate::geometry::Segment {
        crate::geometry::Segment::new(self.p1, self.p2)
    }
}

/// Block entity with a stable content hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub id: EntityId,
    pub layer: String,
    pub name: String,
    pub position: Point,
    pub rotation_deg: f64,
    pub bbox_local: BBox,
}

/// Deduplicated entity carrying its [`EntityId`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "entity_type")]
pub enum Entity {
    #[serde(rename = "LINE")]
    Line(Line),
    #[serde(rename = "BLOCK")]
    Block(Block),
}

impl Entity {
    pub fn id(&self) -> &EntityId {
        match self {
            Entity::Line(l) => &l.id,
            Entity::Block(b) => &b.id,
        }
    }

    pub fn layer(&self) -> &str {
        match self {
            Entity::Line(l) => &l.layer,
            Entity::Block(b) => &b.layer,
        }
    }
}

/// Fixed-decimal encoding at quantisation scale; `-0.0` folds to `0.0` so the
/// hash never depends on the sign of a rounded zero.
fn canonical_num(v: f64) -> String {
    let v = if v == 0.0 { 0.0 } else { v };
    format!("{v:.6}")
}

/// Content hash for a line: endpoint order is canonicalised lexicographically
/// so direction does not affect the id.
pub fn line_content_hash(layer: &str, p1: &Point, p2: &Point) -> EntityId {
    let (a, b) = if p1.lex_le(p2) { (p1, p2) } else { (p2, p1) };
    let payload = format!(
        "{layer}|LINE|{}|{}|{}|{}",
        canonical_num(a.x),
        canonical_num(a.y),
        canonical_num(b.x),
        canonical_num(b.y),
    );
    hash_payload(&payload)
}

/// Content hash for a block instance.
pub fn block_content_hash(block: &BlockData) -> EntityId {
    let payload = format!(
        "{}|BLOCK|{}|{}|{}|{}",
        block.layer,
        block.name,
        canonical_num(block.position.x),
        canonical_num(block.position.y),
        canonical_num(block.rotation_deg),
    );
    hash_payload(&payload)
}

fn hash_payload(payload: &str) -> EntityId {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    EntityId(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_hash_ignores_direction() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(1000.0, 0.0);
        assert_eq!(
            line_content_hash("walls", &a, &b),
            line_content_hash("walls", &b, &a)
        );
    }

    #[test]
    fn line_hash_distinguishes_layer() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(1000.0, 0.0);
        assert_ne!(
            line_content_hash("walls", &a, &b),
            line_content_hash("WALLS", &a, &b)
        );
    }

    #[test]
    fn hash_is_64_hex_chars() {
        let id = line_content_hash("walls", &Point::new(0.0, 0.0), &Point::new(1.0, 1.0));
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn negative_zero_folds() {
        let a = Point::new(-0.0, 0.0);
        let b = Point::new(0.0, 1.0);
        assert_eq!(
            line_content_hash("l", &a, &b),
            line_content_hash("l", &Point::new(0.0, 0.0), &b)
        );
    }
}
