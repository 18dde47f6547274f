//! Document builders shared by the end-to-end scenarios.

use serde_json::{json, Value};
use wall_detector::prelude::*;

pub const JOB_ID: &str = "job-e2e";

pub fn line_json(x1: f64, y1: f64, x2: f64, y2: f64) -> Value {
    json!({
        "type": "LINE",
        "start": {"x": x1, "y": y1},
        "end": {"x": x2, "y": y2},
    })
}

pub fn polyline_json(vertices: &[(f64, f64)], closed: bool) -> Value {
    json!({
        "type": "POLYLINE",
        "vertices": vertices.iter().map(|(x, y)| json!({"x": x, "y": y})).collect::<Vec<_>>(),
        "closed": closed,
    })
}

pub fn door_block_json(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Value {
    json!({
        "type": "BLOCK",
        "name": "door-900",
        "position": {"X": (min_x + max_x) / 2.0, "Y": (min_y + max_y) / 2.0},
        "Rotation": 0.0,
        "BoundingBox": {
            "MinPoint": {"X": min_x, "Y": min_y},
            "MaxPoint": {"X": max_x, "Y": max_y},
        },
    })
}

/// Document with one entry per `(layer name, entities)` pair.
pub fn document(layers: &[(&str, Vec<Value>)]) -> Value {
    let mut layer_map = serde_json::Map::new();
    for (name, entities) in layers {
        layer_map.insert(name.to_string(), json!({ "entities": entities }));
    }
    json!({ "layers": layer_map })
}

pub fn run_pipeline(document: Value, selected: &[&str]) -> (PipelineReport, MemorySink) {
    let sink = MemorySink::new();
    let executor = PipelineExecutor::new(JOB_ID, AlgorithmConfig::default());
    let report = executor.run(
        PipelineInput {
            document: document.to_string(),
            selected_layers: selected.iter().map(|s| s.to_string()).collect(),
        },
        &sink,
    );
    (report, sink)
}

pub fn artifact_json(sink: &MemorySink, name: &str) -> Value {
    let bytes = sink
        .get(JOB_ID, name)
        .unwrap_or_else(|| panic!("missing artifact {name}"));
    serde_json::from_slice(&bytes).unwrap_or_else(|e| panic!("artifact {name} not JSON: {e}"))
}
