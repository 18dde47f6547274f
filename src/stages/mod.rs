//! The thirteen pipeline stages, one module each except `doors`, which hosts
//! both door stages.
//!
//! Each stage is a pure function `run(&Bundle, &AlgorithmConfig) ->
//! Result<(Output, StageMetrics)>`; state lives in the bundle, never in the
//! stage. The executor owns ordering, artifact emission and failure handling.
//!
//! - `extract` — document walk, layer selection, opening-block collection.
//! - `normalize` — coordinate quantisation, polyline explosion.
//! - `dedup` — content-hash deduplication + canvas artifact.
//! - `layers` — per-layer grouping and bounding boxes.
//! - `detector` — O(n²) wall-candidate pair detection.
//! - `trim` — LOGIC_B shared-overlap trimming.
//! - `corridor` — LOGIC_C intervening-line pruning.
//! - `containment` — LOGIC_D contained-rectangle pruning.
//! - `band_merge` — LOGIC_E collinear band concatenation.
//! - `logic_f` — LOGIC_F L-junction extension of merged walls.
//! - `doors` — door-to-wall assignment and door bridges (two stages).
//! - `placeholder` — final wall-candidates echo.

pub mod band_merge;
pub mod containment;
pub mod corridor;
pub mod dedup;
pub mod detector;
pub mod doors;
pub mod extract;
pub mod layers;
pub mod logic_f;
pub mod normalize;
pub mod placeholder;
pub mod trim;
