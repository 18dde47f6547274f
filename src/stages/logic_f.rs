//! LOGIC_F — L-junction extension.
//!
//! Pairs of merged wall rectangles whose run axes are near-perpendicular
//! (one horizontal, one vertical) form an L-junction when their centrelines
//! intersect close to both rectangles. The closest end of each participant
//! moves along its centreline so the two centrelines meet exactly at the
//! junction point, closing the corner gap. Each rectangle is adjusted at
//! most once; candidate pairs are ranked by angular error plus the required
//! end movement plus the junction distance, and accepted greedily.
//! Non-participants pass through unchanged.

use log::info;
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::error::Result;
use crate::geometry::{dot, perp, BBox, Point, Segment};
use crate::metrics::StageMetrics;
use crate::stages::trim::TrimmedRectangle;

/// A wall rectangle with junction metadata. Geometry fields are flattened so
/// the artifact shape matches the other rectangle stages.
#[derive(Clone, Debug, Serialize)]
pub struct JunctionRectangle {
    #[serde(flatten)]
    pub rect: TrimmedRectangle,
    pub extended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub junction_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub junction_point: Option<Point>,
}

#[derive(Clone, Debug, Serialize)]
pub struct JunctionOutput {
    pub rectangles: Vec<JunctionRectangle>,
    pub candidates: usize,
    pub accepted_pairs: usize,
    pub extended_rectangles: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunAxis {
    Horizontal,
    Vertical,
}

/// Centreline frame of a rectangle: `c1`/`c2` are the midpoints of the two
/// ends, `u`/`n` the run direction and its normal, `a_side` which side of the
/// centreline segment A lies on.
struct CenterLine {
    c1: Point,
    c2: Point,
    u: [f64; 2],
    n: [f64; 2],
    half_width: f64,
    a_side: f64,
    b_flipped: bool,
}

struct Candidate {
    i: usize,
    j: usize,
    x: Point,
    extend_start_i: bool,
    extend_start_j: bool,
    score: f64,
}

pub fn run(bundle: &Bundle, config: &AlgorithmConfig) -> Result<(JunctionOutput, StageMetrics)> {
    let band_merge = bundle.logic_e_ref()?;
    let input = &band_merge.rectangles;

    let frames: Vec<Option<(RunAxis, CenterLine, BBox)>> =
        input.iter().map(|r| classify(r, config)).collect();

    // Perpendicular within the angle tolerance: |u_i . u_j| <= sin(tol).
    let dot_tol = config.logic_f_angle_tol_deg.to_radians().sin();

    let mut candidates: Vec<Candidate> = Vec::new();
    for i in 0..input.len() {
        let (axis_i, frame_i, bounds_i) = match &frames[i] {
            Some(t) => (t.0, &t.1, &t.2),
            None => continue,
        };
        for j in (i + 1)..input.len() {
            let (axis_j, frame_j, bounds_j) = match &frames[j] {
                Some(t) => (t.0, &t.1, &t.2),
                None => continue,
            };
            if axis_i == axis_j {
                continue;
            }
            let alignment = dot(frame_i.u, frame_j.u).abs();
            if alignment > dot_tol {
                continue;
            }
            let x = match line_intersection(&frame_i.c1, &frame_i.c2, &frame_j.c1, &frame_j.c2) {
                Some(p) => p,
                None => continue,
            };
            let (start_i, ext_i, dist_i) = match feasibility(frame_i, bounds_i, axis_i, &x, config)
            {
                Some(f) => f,
                None => continue,
            };
            let (start_j, ext_j, dist_j) = match feasibility(frame_j, bounds_j, axis_j, &x, config)
            {
                Some(f) => f,
                None => continue,
            };
            let angular_err = (alignment.clamp(0.0, 1.0).acos().to_degrees() - 90.0).abs();
            let score = angular_err + ext_i + ext_j + dist_i + dist_j;
            if !score.is_finite() || !x.is_finite() {
                continue;
            }
            candidates.push(Candidate {
                i,
                j,
                x,
                extend_start_i: start_i,
                extend_start_j: start_j,
                score,
            });
        }
    }

    candidates.sort_by(|a, b| {
        a.score
            .total_cmp(&b.score)
            .then(a.i.cmp(&b.i))
            .then(a.j.cmp(&b.j))
    });

    let mut rectangles: Vec<JunctionRectangle> = input
        .iter()
        .map(|r| JunctionRectangle {
            rect: r.clone(),
            extended: false,
            junction_type: None,
            junction_point: None,
        })
        .collect();

    let mut locked = vec![false; input.len()];
    let mut accepted_pairs = 0usize;
    for cand in &candidates {
        if locked[cand.i] || locked[cand.j] {
            continue;
        }
        locked[cand.i] = true;
        locked[cand.j] = true;
        accepted_pairs += 1;
        for (index, extend_start) in [(cand.i, cand.extend_start_i), (cand.j, cand.extend_start_j)]
        {
            if let Some((_, frame, _)) = &frames[index] {
                // Project the junction onto the centreline so the moved end
                // stays exactly on that line despite floating-point noise.
                let meet = project_onto_line(&cand.x, &frame.c1, &frame.c2);
                apply_extension(&mut rectangles[index], frame, extend_start, meet);
            }
        }
    }

    let extended_rectangles = rectangles.iter().filter(|r| r.extended).count();

    info!(
        "l-junctions: {} candidates, {} accepted, {} rectangles extended",
        candidates.len(),
        accepted_pairs,
        extended_rectangles
    );

    let mut metrics = StageMetrics::default();
    metrics.set("input_rectangles", input.len() as f64);
    metrics.set("candidates", candidates.len() as f64);
    metrics.set("accepted_pairs", accepted_pairs as f64);
    metrics.set("extended_rectangles", extended_rectangles as f64);

    Ok((
        JunctionOutput {
            candidates: candidates.len(),
            accepted_pairs,
            extended_rectangles,
            rectangles,
        },
        metrics,
    ))
}

fn classify(
    rect: &TrimmedRectangle,
    config: &AlgorithmConfig,
) -> Option<(RunAxis, CenterLine, BBox)> {
    let bounds = BBox::from_points(&rect.corners())?;
    let axis = infer_axis(&bounds, config.min_distance_mm, config.max_distance_mm)?;
    let frame = CenterLine::of(rect)?;
    Some((axis, frame, bounds))
}

/// Run-axis classification by thickness window, falling back to aspect ratio
/// when the thickness is out of range (thick walls still pair at corners).
fn infer_axis(bounds: &BBox, thickness_min: f64, thickness_max: f64) -> Option<RunAxis> {
    let dx = bounds.width();
    let dy = bounds.height();
    let ok_h = (thickness_min..=thickness_max).contains(&dy) && dx >= dy;
    let ok_v = (thickness_min..=thickness_max).contains(&dx) && dy > dx;
    match (ok_h, ok_v) {
        (true, false) => Some(RunAxis::Horizontal),
        (false, true) => Some(RunAxis::Vertical),
        (true, true) => Some(if dy <= dx {
            RunAxis::Horizontal
        } else {
            RunAxis::Vertical
        }),
        (false, false) => {
            if dx < 1.0 && dy < 1.0 {
                None
            } else if dx >= dy {
                Some(RunAxis::Horizontal)
            } else {
                Some(RunAxis::Vertical)
            }
        }
    }
}

impl CenterLine {
    fn of(rect: &TrimmedRectangle) -> Option<CenterLine> {
        let a = rect.trimmed_segment_a;
        let b = rect.trimmed_segment_b;
        let b_flipped = dot(a.direction(), b.direction()) < 0.0;
        let (b1, b2) = if b_flipped { (b.p2, b.p1) } else { (b.p1, b.p2) };
        let c1 = Point::new(0.5 * (a.p1.x + b1.x), 0.5 * (a.p1.y + b1.y));
        let c2 = Point::new(0.5 * (a.p2.x + b2.x), 0.5 * (a.p2.y + b2.y));
        let u = Segment::new(c1, c2).direction();
        if u == [0.0, 0.0] {
            return None;
        }
        let n = perp(u);
        let a_side = if dot([a.p1.x - c1.x, a.p1.y - c1.y], n) >= 0.0 {
            1.0
        } else {
            -1.0
        };
        Some(CenterLine {
            c1,
            c2,
            u,
            n,
            half_width: rect.thickness() / 2.0,
            a_side,
            b_flipped,
        })
    }
}

/// Which end to move, how far it moves along the run axis, and the distance
/// from the junction to the rectangle. `None` when either cap is exceeded.
fn feasibility(
    frame: &CenterLine,
    bounds: &BBox,
    axis: RunAxis,
    x: &Point,
    config: &AlgorithmConfig,
) -> Option<(bool, f64, f64)> {
    let dist = distance_to_bbox(x, bounds);
    if dist > config.logic_f_max_junction_distance_mm {
        return None;
    }
    let (end1, end2, target) = match axis {
        RunAxis::Horizontal => (frame.c1.x, frame.c2.x, x.x),
        RunAxis::Vertical => (frame.c1.y, frame.c2.y, x.y),
    };
    let ext1 = (target - end1).abs();
    let ext2 = (target - end2).abs();
    let (extend_start, ext) = if ext1 <= ext2 {
        (true, ext1)
    } else {
        (false, ext2)
    };
    if ext > config.logic_f_max_extension_mm {
        return None;
    }
    Some((extend_start, ext, dist))
}

fn distance_to_bbox(p: &Point, bounds: &BBox) -> f64 {
    let dx = (bounds.min_x - p.x).max(p.x - bounds.max_x).max(0.0);
    let dy = (bounds.min_y - p.y).max(p.y - bounds.max_y).max(0.0);
    (dx * dx + dy * dy).sqrt()
}

/// Intersection of the infinite lines through `a1`-`a2` and `b1`-`b2`.
fn line_intersection(a1: &Point, a2: &Point, b1: &Point, b2: &Point) -> Option<Point> {
    let denom = (a1.x - a2.x) * (b1.y - b2.y) - (a1.y - a2.y) * (b1.x - b2.x);
    if denom.abs() < 1e-12 {
        return None;
    }
    let t = ((a1.x - b1.x) * (b1.y - b2.y) - (a1.y - b1.y) * (b1.x - b2.x)) / denom;
    Some(Point::new(
        a1.x + t * (a2.x - a1.x),
        a1.y + t * (a2.y - a1.y),
    ))
}

fn project_onto_line(p: &Point, a: &Point, b: &Point) -> Point {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= 0.0 {
        return *a;
    }
    let t = ((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq;
    Point::new(a.x + t * dx, a.y + t * dy)
}

/// Moves one end of the rectangle so its centreline terminates at `meet`,
/// keeping each face on its original side of the centreline.
fn apply_extension(
    out: &mut JunctionRectangle,
    frame: &CenterLine,
    extend_start: bool,
    meet: Point,
) {
    let off = frame.a_side * frame.half_width;
    let a_new = Point::new(meet.x + frame.n[0] * off, meet.y + frame.n[1] * off);
    let b_new = Point::new(meet.x - frame.n[0] * off, meet.y - frame.n[1] * off);
    if extend_start {
        out.rect.trimmed_segment_a.p1 = a_new;
        if frame.b_flipped {
            out.rect.trimmed_segment_b.p2 = b_new;
        } else {
            out.rect.trimmed_segment_b.p1 = b_new;
        }
    } else {
        out.rect.trimmed_segment_a.p2 = a_new;
        if frame.b_flipped {
            out.rect.trimmed_segment_b.p1 = b_new;
        } else {
            out.rect.trimmed_segment_b.p2 = b_new;
        }
    }
    if let Some(bbox) = BBox::from_points(&out.rect.corners()) {
        out.rect.bounding_rectangle = bbox;
    }
    out.extended = true;
    out.junction_type = Some("L".to_string());
    out.junction_point = Some(meet);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::line_content_hash;
    use crate::stages::detector::pair_uuid;

    fn rect_from(a: Segment, b: Segment) -> TrimmedRectangle {
        let id_a = line_content_hash("w", &a.p1, &a.p2);
        let id_b = line_content_hash("w", &b.p1, &b.p2);
        TrimmedRectangle {
            trimmed_segment_a: a,
            trimmed_segment_b: b,
            bounding_rectangle: BBox::from_points(&[a.p1, a.p2, b.p1, b.p2]).unwrap(),
            source_pair_ids: vec![pair_uuid(&id_a, &id_b)],
            source_line_id_a: id_a,
            source_line_id_b: id_b,
        }
    }

    fn h_rect(x1: f64, x2: f64, y_a: f64, y_b: f64) -> TrimmedRectangle {
        rect_from(
            Segment::new(Point::new(x1, y_a), Point::new(x2, y_a)),
            Segment::new(Point::new(x1, y_b), Point::new(x2, y_b)),
        )
    }

    fn v_rect(y1: f64, y2: f64, x_a: f64, x_b: f64) -> TrimmedRectangle {
        rect_from(
            Segment::new(Point::new(x_a, y1), Point::new(x_a, y2)),
            Segment::new(Point::new(x_b, y1), Point::new(x_b, y2)),
        )
    }

    fn run_on(rects: Vec<TrimmedRectangle>) -> JunctionOutput {
        let mut bundle = Bundle::default();
        bundle.logic_e = Some(crate::stages::band_merge::BandMergeOutput {
            rectangles: rects,
            bands: 0,
            merges: 0,
        });
        let (out, _) = run(&bundle, &AlgorithmConfig::default()).unwrap();
        out
    }

    #[test]
    fn l_junction_extends_both_walls() {
        let out = run_on(vec![h_rect(0.0, 1000.0, 0.0, 50.0), v_rect(0.0, 500.0, 0.0, 50.0)]);
        assert_eq!(out.rectangles.len(), 2);
        assert_eq!(out.accepted_pairs, 1);
        assert_eq!(out.extended_rectangles, 2);
        for r in &out.rectangles {
            assert!(r.extended);
            assert_eq!(r.junction_type.as_deref(), Some("L"));
            let jp = r.junction_point.unwrap();
            assert_eq!(jp, Point::new(25.0, 25.0));
        }
        // Horizontal wall's start end moved to the junction column.
        assert_eq!(
            out.rectangles[0].rect.trimmed_segment_a.p1,
            Point::new(25.0, 0.0)
        );
        assert_eq!(
            out.rectangles[0].rect.trimmed_segment_b.p1,
            Point::new(25.0, 50.0)
        );
    }

    #[test]
    fn extended_segments_stay_parallel() {
        let out = run_on(vec![h_rect(0.0, 1000.0, 0.0, 50.0), v_rect(0.0, 500.0, 0.0, 50.0)]);
        for r in &out.rectangles {
            let da = r.rect.trimmed_segment_a.direction();
            let db = r.rect.trimmed_segment_b.direction();
            assert!(dot(da, db).abs() > 0.999);
        }
    }

    #[test]
    fn junction_point_lies_on_both_centrelines() {
        let out = run_on(vec![h_rect(0.0, 1000.0, 0.0, 50.0), v_rect(0.0, 500.0, 0.0, 50.0)]);
        let jp = out.rectangles[0].junction_point.unwrap();
        for r in &out.rectangles {
            let frame = CenterLine::of(&r.rect).unwrap();
            let on_line = project_onto_line(&jp, &frame.c1, &frame.c2);
            assert!(jp.distance_to(&on_line) < 0.5);
        }
    }

    #[test]
    fn at_most_one_extension_per_rectangle() {
        let out = run_on(vec![
            h_rect(0.0, 400.0, 0.0, 50.0),
            v_rect(0.0, 500.0, 0.0, 50.0),
            h_rect(0.0, 400.0, 100.0, 150.0),
        ]);
        assert_eq!(out.candidates, 2);
        assert_eq!(out.accepted_pairs, 1);
        assert_eq!(out.extended_rectangles, 2);
        assert_eq!(out.extended_rectangles, out.accepted_pairs * 2);
    }

    #[test]
    fn long_extension_is_rejected() {
        let out = run_on(vec![
            h_rect(500.0, 2000.0, 0.0, 50.0),
            v_rect(0.0, 500.0, 0.0, 50.0),
        ]);
        assert_eq!(out.accepted_pairs, 0);
        assert_eq!(out.extended_rectangles, 0);
    }

    #[test]
    fn distant_junction_is_rejected() {
        let out = run_on(vec![
            h_rect(0.0, 1000.0, 0.0, 50.0),
            v_rect(0.0, 500.0, 2000.0, 2050.0),
        ]);
        assert_eq!(out.accepted_pairs, 0);
        assert_eq!(out.extended_rectangles, 0);
    }

    #[test]
    fn parallel_walls_do_not_junction() {
        let r1 = h_rect(0.0, 1000.0, 0.0, 50.0);
        let r2 = h_rect(0.0, 1000.0, 200.0, 250.0);
        let out = run_on(vec![r1.clone(), r2.clone()]);
        assert_eq!(out.candidates, 0);
        for (junction, original) in out.rectangles.iter().zip([&r1, &r2]) {
            assert!(!junction.extended);
            assert!(junction.junction_point.is_none());
            assert_eq!(junction.rect.trimmed_segment_a, original.trimmed_segment_a);
            assert_eq!(junction.rect.trimmed_segment_b, original.trimmed_segment_b);
        }
    }

    #[test]
    fn non_participants_stay_unchanged() {
        let r3 = h_rect(0.0, 400.0, 100.0, 150.0);
        let out = run_on(vec![
            h_rect(0.0, 400.0, 0.0, 50.0),
            v_rect(0.0, 500.0, 0.0, 50.0),
            r3.clone(),
        ]);
        let third = &out.rectangles[2];
        assert!(!third.extended);
        assert_eq!(third.rect.trimmed_segment_a, r3.trimmed_segment_a);
        assert_eq!(third.rect.trimmed_segment_b, r3.trimmed_segment_b);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = run_on(Vec::new());
        assert!(out.rectangles.is_empty());
        assert_eq!(out.candidates, 0);
        assert_eq!(out.accepted_pairs, 0);
    }
}
