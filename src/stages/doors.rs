//! DOOR_RECTANGLE_ASSIGNMENT and DOOR_BRIDGE.
//!
//! Assignment snaps each door block onto the nearest merged wall rectangle:
//! the door centre must sit within the snap tolerance of the wall centreline
//! in the normal direction, and the door's longitudinal extent must intersect
//! the wall's. The bridge stage then materialises the opening as a rectangle
//! spanning the wall's full thickness across the door, extended by the end
//! cap on both sides.
//!
//! Door rotations are snapped to the nearest 90° before the world bbox is
//! computed; exporter blocks are authored axis-aligned and the nominal angle
//! only encodes the swing quadrant.

use log::info;
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::entity::{block_content_hash, BlockData, EntityId, OpeningKind};
use crate::error::{PipelineError, Result};
use crate::geometry::{dot, perp, BBox, Point};
use crate::metrics::StageMetrics;
use crate::stages::trim::TrimmedRectangle;

/// How a door's long axis relates to the wall's trimmed segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DoorOrientation {
    #[serde(rename = "ALONG_A")]
    AlongA,
    #[serde(rename = "ALONG_B")]
    AlongB,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoorAssignment {
    pub door_block_id: EntityId,
    pub door_layer: String,
    pub wall_rect_index: Option<usize>,
    pub snapped_bbox: BBox,
    pub world_bbox: BBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<DoorOrientation>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoorAssignmentOutput {
    pub assignments: Vec<DoorAssignment>,
    pub unassigned: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMeta {
    pub wall_rect_index: usize,
    pub orientation: DoorOrientation,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bridge {
    pub bridge_rectangle: BBox,
    pub meta: BridgeMeta,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoorBridge {
    pub door_id: EntityId,
    pub bridges: Vec<Bridge>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DoorBridgeOutput {
    pub door_bridges: Vec<DoorBridge>,
    pub total_bridges: usize,
}

/// Wall rectangle reduced to its band frame: direction, normal, centreline
/// offset, half thickness and longitudinal interval.
struct WallFrame {
    u: [f64; 2],
    n: [f64; 2],
    centre_offset: f64,
    offset_a: f64,
    offset_b: f64,
    t_start: f64,
    t_end: f64,
    centroid: Point,
}

impl WallFrame {
    fn of(rect: &TrimmedRectangle) -> WallFrame {
        let u = rect.trimmed_segment_a.direction();
        let n = perp(u);
        let mid_a = rect.trimmed_segment_a.midpoint();
        let mid_b = rect.trimmed_segment_b.midpoint();
        let offset_a = dot([mid_a.x, mid_a.y], n);
        let offset_b = dot([mid_b.x, mid_b.y], n);
        let corners = rect.corners();
        let params: Vec<f64> = corners.iter().map(|p| dot([p.x, p.y], u)).collect();
        WallFrame {
            u,
            n,
            centre_offset: 0.5 * (offset_a + offset_b),
            offset_a,
            offset_b,
            t_start: params.iter().copied().fold(f64::INFINITY, f64::min),
            t_end: params.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            centroid: Point::new(
                corners.iter().map(|p| p.x).sum::<f64>() / 4.0,
                corners.iter().map(|p| p.y).sum::<f64>() / 4.0,
            ),
        }
    }

    /// Door AABB projected onto the wall direction.
    fn project_bbox(&self, bbox: &BBox) -> (f64, f64) {
        let corners = [
            Point::new(bbox.min_x, bbox.min_y),
            Point::new(bbox.max_x, bbox.min_y),
            Point::new(bbox.max_x, bbox.max_y),
            Point::new(bbox.min_x, bbox.max_y),
        ];
        let params: Vec<f64> = corners.iter().map(|p| dot([p.x, p.y], self.u)).collect();
        (
            params.iter().copied().fold(f64::INFINITY, f64::min),
            params.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        )
    }
}

pub fn run_assignment(
    bundle: &Bundle,
    config: &AlgorithmConfig,
) -> Result<(DoorAssignmentOutput, StageMetrics)> {
    let normalize = bundle.normalize_ref()?;
    let band_merge = bundle.logic_e_ref()?;
    let walls: Vec<WallFrame> = band_merge.rectangles.iter().map(WallFrame::of).collect();

    let doors: Vec<&BlockData> = normalize
        .opening_blocks
        .iter()
        .filter(|ob| ob.kind == OpeningKind::Door)
        .map(|ob| &ob.block)
        .collect();

    let mut assignments = Vec::with_capacity(doors.len());
    let mut unassigned = 0usize;
    for door in doors {
        let world_bbox = door_world_bbox(door)?;
        let centre = world_bbox.center();

        let mut best: Option<(usize, f64)> = None;
        for (index, wall) in walls.iter().enumerate() {
            let normal_gap = (dot([centre.x, centre.y], wall.n) - wall.centre_offset).abs();
            if normal_gap > config.door_snap_tol_mm {
                continue;
            }
            let (d_start, d_end) = wall.project_bbox(&world_bbox);
            if d_end < wall.t_start || d_start > wall.t_end {
                continue;
            }
            let distance = centre.distance_to(&wall.centroid);
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((index, distance));
            }
        }

        let assignment = match best {
            Some((index, _)) => {
                let wall = &walls[index];
                let shift = wall.centre_offset - dot([centre.x, centre.y], wall.n);
                let snapped_bbox = world_bbox.translated(wall.n[0] * shift, wall.n[1] * shift);
                DoorAssignment {
                    door_block_id: block_content_hash(door),
                    door_layer: door.layer.clone(),
                    wall_rect_index: Some(index),
                    orientation: Some(door_orientation(&world_bbox, wall)),
                    snapped_bbox,
                    world_bbox,
                }
            }
            None => {
                unassigned += 1;
                DoorAssignment {
                    door_block_id: block_content_hash(door),
                    door_layer: door.layer.clone(),
                    wall_rect_index: None,
                    orientation: None,
                    snapped_bbox: world_bbox,
                    world_bbox,
                }
            }
        };
        assignments.push(assignment);
    }

    info!(
        "door assignment: {}/{} doors assigned",
        assignments.len() - unassigned,
        assignments.len()
    );

    let mut metrics = StageMetrics::default();
    metrics.set("doors_processed", assignments.len() as f64);
    metrics.set("doors_assigned", (assignments.len() - unassigned) as f64);
    metrics.set("doors_unassigned", unassigned as f64);

    Ok((
        DoorAssignmentOutput {
            assignments,
            unassigned,
        },
        metrics,
    ))
}

pub fn run_bridge(
    bundle: &Bundle,
    config: &AlgorithmConfig,
) -> Result<(DoorBridgeOutput, StageMetrics)> {
    let assignment_output = bundle.door_assignments_ref()?;
    let band_merge = bundle.logic_e_ref()?;

    let mut door_bridges = Vec::with_capacity(assignment_output.assignments.len());
    let mut total_bridges = 0usize;
    for assignment in &assignment_output.assignments {
        let mut bridges = Vec::new();
        if let Some(index) = assignment.wall_rect_index {
            let rect = band_merge.rectangles.get(index).ok_or_else(|| {
                PipelineError::CorruptUpstream(format!(
                    "door assignment references wall rectangle {index} of {}",
                    band_merge.rectangles.len()
                ))
            })?;
            let wall = WallFrame::of(rect);
            let (d_start, d_end) = wall.project_bbox(&assignment.world_bbox);
            let b_start = d_start - config.bridge_end_cap_mm;
            let b_end = d_end + config.bridge_end_cap_mm;

            let corner = |t: f64, c: f64| {
                Point::new(wall.u[0] * t + wall.n[0] * c, wall.u[1] * t + wall.n[1] * c)
            };
            let bridge_rectangle = BBox::from_points(&[
                corner(b_start, wall.offset_a),
                corner(b_end, wall.offset_a),
                corner(b_start, wall.offset_b),
                corner(b_end, wall.offset_b),
            ])
            .ok_or_else(|| PipelineError::CorruptUpstream("bridge without corners".into()))?;
            if !bridge_rectangle.is_finite() {
                return Err(PipelineError::CorruptUpstream(
                    "non-finite bridge rectangle".into(),
                ));
            }

            bridges.push(Bridge {
                bridge_rectangle,
                meta: BridgeMeta {
                    wall_rect_index: index,
                    orientation: assignment.orientation.unwrap_or(DoorOrientation::AlongA),
                },
            });
            total_bridges += 1;
        }
        door_bridges.push(DoorBridge {
            door_id: assignment.door_block_id.clone(),
            bridges,
        });
    }

    info!(
        "door bridge: {total_bridges} bridges for {} doors",
        door_bridges.len()
    );

    let mut metrics = StageMetrics::default();
    metrics.set("doors_processed", door_bridges.len() as f64);
    metrics.set("total_bridges", total_bridges as f64);
    metrics.set(
        "doors_without_bridge",
        door_bridges.iter().filter(|d| d.bridges.is_empty()).count() as f64,
    );

    Ok((
        DoorBridgeOutput {
            door_bridges,
            total_bridges,
        },
        metrics,
    ))
}

/// World AABB of a door block: local bbox rotated by the snapped angle around
/// its centre, then translated so the centre lands on the block position.
fn door_world_bbox(door: &BlockData) -> Result<BBox> {
    let local = door.bbox_local;
    let centre = local.center();
    let angle = snap_to_quarter_turn(door.rotation_deg).to_radians();
    let (sin_a, cos_a) = angle.sin_cos();

    let shift_x = door.position.x - centre.x;
    let shift_y = door.position.y - centre.y;
    let rotate = |x: f64, y: f64| {
        let dx = x - centre.x;
        let dy = y - centre.y;
        Point::new(
            centre.x + dx * cos_a - dy * sin_a + shift_x,
            centre.y + dx * sin_a + dy * cos_a + shift_y,
        )
    };
    let corners = [
        rotate(local.min_x, local.min_y),
        rotate(local.max_x, local.min_y),
        rotate(local.max_x, local.max_y),
        rotate(local.min_x, local.max_y),
    ];
    let bbox = BBox::from_points(&corners)
        .ok_or_else(|| PipelineError::CorruptUpstream("door block without corners".into()))?;
    if !bbox.is_finite() {
        return Err(PipelineError::CorruptUpstream(
            "non-finite door bounding box".into(),
        ));
    }
    Ok(bbox)
}

fn snap_to_quarter_turn(deg: f64) -> f64 {
    ((deg / 90.0).round() * 90.0).rem_euclid(360.0)
}

fn door_orientation(world_bbox: &BBox, wall: &WallFrame) -> DoorOrientation {
    let long_axis = if world_bbox.width() >= world_bbox.height() {
        [1.0, 0.0]
    } else {
        [0.0, 1.0]
    };
    if crate::geometry::angle_between_dirless_deg(long_axis, wall.u) <= 45.0 {
        DoorOrientation::AlongA
    } else {
        DoorOrientation::AlongB
    }
}
