//! serde model of the CAD-export input document.
//!
//! The document is a tree of `layers: { name -> { entities: [...] } }`. Layers
//! iterate in the order the document lists them (a custom deserializer keeps
//! the object entries as an ordered sequence instead of a sorted map), and
//! entity order within a layer follows the document. Entity payloads are
//! decoded individually so a malformed or unknown entity drops with a counter
//! instead of failing the whole document.

use std::fmt;

use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;

use crate::geometry::{BBox, Point};

/// Parsed input document. `layers` preserves document order.
#[derive(Clone, Debug)]
pub struct InputDocument {
    pub layers: Vec<(String, DocLayer)>,
}

impl<'de> Deserialize<'de> for InputDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = InputDocument;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object with a `layers` map")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut layers: Option<Vec<(String, DocLayer)>> = None;
                while let Some(key) = access.next_key::<String>()? {
                    if key == "layers" {
                        layers = Some(access.next_value::<OrderedLayers>()?.0);
                    } else {
                        access.next_value::<IgnoredAny>()?;
                    }
                }
                layers
                    .map(|layers| InputDocument { layers })
                    .ok_or_else(|| serde::de::Error::missing_field("layers"))
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Layer map decoded entry-by-entry so encounter order survives.
struct OrderedLayers(Vec<(String, DocLayer)>);

impl<'de> Deserialize<'de> for OrderedLayers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct LayersVisitor;

        impl<'de> Visitor<'de> for LayersVisitor {
            type Value = OrderedLayers;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of layer name to layer payload")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut out = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, layer)) = access.next_entry::<String, DocLayer>()? {
                    out.push((name, layer));
                }
                Ok(OrderedLayers(out))
            }
        }

        deserializer.deserialize_map(LayersVisitor)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DocLayer {
    #[serde(default)]
    pub entities: Vec<Value>,
}

/// Point as written by the exporter for LINE/POLYLINE geometry.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct DocPoint {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    #[allow(dead_code)]
    pub z: f64,
}

impl DocPoint {
    pub fn to_point(self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Point as written for BLOCK geometry (uppercase keys).
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct DocBlockPoint {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z", default)]
    #[allow(dead_code)]
    pub z: f64,
}

impl DocBlockPoint {
    pub fn to_point(self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct DocBoundingBox {
    #[serde(rename = "MinPoint")]
    pub min_point: DocBlockPoint,
    #[serde(rename = "MaxPoint")]
    pub max_point: DocBlockPoint,
}

impl DocBoundingBox {
    pub fn to_bbox(self) -> BBox {
        let min = self.min_point.to_point();
        let max = self.max_point.to_point();
        BBox::new(
            min.x.min(max.x),
            min.y.min(max.y),
            min.x.max(max.x),
            min.y.max(max.y),
        )
    }
}

/// One decoded entity payload. Unknown `type` tags and missing required keys
/// fail the per-entity decode and are counted by Extract.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type")]
pub enum DocEntity {
    #[serde(rename = "LINE")]
    Line { start: DocPoint, end: DocPoint },
    #[serde(rename = "POLYLINE")]
    Polyline {
        vertices: Vec<DocPoint>,
        #[serde(default)]
        closed: bool,
    },
    #[serde(rename = "BLOCK")]
    Block {
        name: String,
        position: DocBlockPoint,
        #[serde(rename = "Rotation", default)]
        rotation: f64,
        #[serde(rename = "BoundingBox")]
        bounding_box: DocBoundingBox,
    },
}
