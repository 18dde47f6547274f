//! LOGIC_E — merge collinear, co-thickness rectangles along a common band.
//!
//! A band groups rectangles whose direction axes agree within 1° and whose
//! normal offsets agree within 2 mm. Assignment is greedy in input order;
//! bands are emitted sorted by (axis angle, offset), members sorted by their
//! longitudinal start. Adjacent members whose gap stays under the join
//! threshold and whose thicknesses match are concatenated end-to-end.

use log::info;
use serde::Serialize;

use crate::bundle::Bundle;
use crate::config::AlgorithmConfig;
use crate::error::Result;
use crate::geometry::{angle_between_dirless_deg, canonical_direction, dot, perp, BBox, Point, Segment};
use crate::metrics::StageMetrics;
use crate::stages::trim::TrimmedRectangle;

#[derive(Clone, Debug, Serialize)]
pub struct BandMergeOutput {
    pub rectangles: Vec<TrimmedRectangle>,
    pub bands: usize,
    pub merges: usize,
}

struct BandMember {
    rect: TrimmedRectangle,
    t_start: f64,
    t_end: f64,
    thickness: f64,
}

struct Band {
    axis: [f64; 2],
    offset: f64,
    members: Vec<BandMember>,
}

pub fn run(bundle: &Bundle, config: &AlgorithmConfig) -> Result<(BandMergeOutput, StageMetrics)> {
    let containment = bundle.logic_d_ref()?;
    let input = &containment.rectangles;

    let mut bands: Vec<Band> = Vec::new();
    for rect in input {
        let axis = canonical_direction(rect.trimmed_segment_a.direction());
        let centroid = rect_centroid(rect);
        let mut placed = false;
        for band in bands.iter_mut() {
            if angle_between_dirless_deg(band.axis, axis) > config.band_angle_tol_deg {
                continue;
            }
            let offset = dot([centroid.x, centroid.y], perp(band.axis));
            if (offset - band.offset).abs() > config.band_offset_tol_mm {
                continue;
            }
            band.members.push(member_on_axis(rect, band.axis));
            placed = true;
            break;
        }
        if !placed {
            let offset = dot([centroid.x, centroid.y], perp(axis));
            let member = member_on_axis(rect, axis);
            bands.push(Band {
                axis,
                offset,
                members: vec![member],
            });
        }
    }

    bands.sort_by(|a, b| {
        let angle_a = a.axis[1].atan2(a.axis[0]);
        let angle_b = b.axis[1].atan2(b.axis[0]);
        angle_a
            .total_cmp(&angle_b)
            .then(a.offset.total_cmp(&b.offset))
    });

    let band_count = bands.len();
    let mut merges = 0usize;
    let mut rectangles = Vec::new();
    for band in &mut bands {
        let axis = band.axis;
        band.members
            .sort_by(|a, b| a.t_start.total_cmp(&b.t_start));
        let mut iter = band.members.drain(..);
        let mut current = match iter.next() {
            Some(m) => m,
            None => continue,
        };
        for next in iter {
            let joinable = next.t_start <= current.t_end + config.band_join_gap_mm
                && (next.thickness - current.thickness).abs() <= config.band_thickness_tol_mm;
            if joinable {
                current = merge_members(current, next, axis);
                merges += 1;
            } else {
                rectangles.push(current.rect);
                current = next;
            }
        }
        rectangles.push(current.rect);
    }

    info!(
        "band merge: {} -> {} rectangles across {} bands ({} merges)",
        input.len(),
        rectangles.len(),
        band_count,
        merges
    );

    let mut metrics = StageMetrics::default();
    metrics.set("input_rectangles", input.len() as f64);
    metrics.set("rectangles", rectangles.len() as f64);
    metrics.set("bands", band_count as f64);
    metrics.set("merges", merges as f64);

    Ok((
        BandMergeOutput {
            rectangles,
            bands: band_count,
            merges,
        },
        metrics,
    ))
}

fn rect_centroid(rect: &TrimmedRectangle) -> Point {
    let c = rect.corners();
    Point::new(
        c.iter().map(|p| p.x).sum::<f64>() / 4.0,
        c.iter().map(|p| p.y).sum::<f64>() / 4.0,
    )
}

fn member_on_axis(rect: &TrimmedRectangle, axis: [f64; 2]) -> BandMember {
    let params: Vec<f64> = rect
        .corners()
        .iter()
        .map(|p| dot([p.x, p.y], axis))
        .collect();
    let t_start = params.iter().copied().fold(f64::INFINITY, f64::min);
    let t_end = params.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    BandMember {
        thickness: rect.thickness(),
        rect: rect.clone(),
        t_start,
        t_end,
    }
}

/// Concatenates `next` onto `current`: both trimmed segments extend to the
/// union of the two parameter ranges; pair ids accumulate sorted.
fn merge_members(current: BandMember, next: BandMember, axis: [f64; 2]) -> BandMember {
    let t_start = current.t_start.min(next.t_start);
    let t_end = current.t_end.max(next.t_end);

    let segment_a = extend_segment(&current.rect.trimmed_segment_a, axis, t_start, t_end);
    let segment_b = extend_segment(&current.rect.trimmed_segment_b, axis, t_start, t_end);

    let mut source_pair_ids = current.rect.source_pair_ids.clone();
    source_pair_ids.extend(next.rect.source_pair_ids.iter().copied());
    source_pair_ids.sort();
    source_pair_ids.dedup();

    let bounding_rectangle = BBox::from_points(&[
        segment_a.p1,
        segment_a.p2,
        segment_b.p1,
        segment_b.p2,
    ])
    .unwrap_or(current.rect.bounding_rectangle);

    BandMember {
        rect: TrimmedRectangle {
            trimmed_segment_a: segment_a,
            trimmed_segment_b: segment_b,
            bounding_rectangle,
            source_pair_ids,
            source_line_id_a: current.rect.source_line_id_a.clone(),
            source_line_id_b: current.rect.source_line_id_b.clone(),
        },
        t_start,
        t_end,
        thickness: current.thickness,
    }
}

/// Slides a segment's endpoints along `axis` so it spans `[t_start, t_end]`.
fn extend_segment(segment: &Segment, axis: [f64; 2], t_start: f64, t_end: f64) -> Segment {
    let anchor = segment.p1;
    let t_anchor = dot([anchor.x, anchor.y], axis);
    let at = |t: f64| {
        Point::new(
            anchor.x + axis[0] * (t - t_anchor),
            anchor.y + axis[1] * (t - t_anchor),
        )
    };
    Segment::new(at(t_start), at(t_end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::line_content_hash;
    use crate::stages::detector::pair_uuid;

    fn make_rect(x1: f64, y1: f64, x2: f64, y2: f64) -> TrimmedRectangle {
        let a = Segment::new(Point::new(x1, y1), Point::new(x2, y1));
        let b = Segment::new(Point::new(x1, y2), Point::new(x2, y2));
        let id_a = line_content_hash("w", &a.p1, &a.p2);
        let id_b = line_content_hash("w", &b.p1, &b.p2);
        TrimmedRectangle {
            trimmed_segment_a: a,
            trimmed_segment_b: b,
            bounding_rectangle: BBox::new(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)),
            source_pair_ids: vec![pair_uuid(&id_a, &id_b)],
            source_line_id_a: id_a,
            source_line_id_b: id_b,
        }
    }

    fn run_on(rects: Vec<TrimmedRectangle>) -> BandMergeOutput {
        let mut bundle = Bundle::default();
        bundle.logic_d = Some(crate::stages::containment::ContainmentOutput {
            rectangles: rects,
            removed: 0,
        });
        let (out, _) = run(&bundle, &AlgorithmConfig::default()).unwrap();
        out
    }

    #[test]
    fn adjacent_rectangles_merge_across_small_gap() {
        let out = run_on(vec![
            make_rect(0.0, 0.0, 500.0, 100.0),
            make_rect(505.0, 0.0, 1000.0, 100.0),
        ]);
        assert_eq!(out.rectangles.len(), 1);
        assert_eq!(out.merges, 1);
        let rect = &out.rectangles[0];
        assert_eq!(rect.bounding_rectangle, BBox::new(0.0, 0.0, 1000.0, 100.0));
        assert_eq!(rect.source_pair_ids.len(), 2);
    }

    #[test]
    fn wide_gap_does_not_merge() {
        let out = run_on(vec![
            make_rect(0.0, 0.0, 500.0, 100.0),
            make_rect(520.0, 0.0, 1000.0, 100.0),
        ]);
        assert_eq!(out.rectangles.len(), 2);
        assert_eq!(out.merges, 0);
    }

    #[test]
    fn different_offsets_stay_in_separate_bands() {
        let out = run_on(vec![
            make_rect(0.0, 0.0, 500.0, 100.0),
            make_rect(505.0, 300.0, 1000.0, 400.0),
        ]);
        assert_eq!(out.rectangles.len(), 2);
        assert_eq!(out.bands, 2);
    }

    #[test]
    fn thickness_mismatch_blocks_merge() {
        let thin = make_rect(0.0, 40.0, 500.0, 100.0);
        let thick = make_rect(505.0, 0.0, 1000.0, 140.0);
        let out = run_on(vec![thin, thick]);
        assert_eq!(out.rectangles.len(), 2);
    }

    #[test]
    fn vertical_band_merges_too() {
        let a = {
            let seg_a = Segment::new(Point::new(0.0, 0.0), Point::new(0.0, 500.0));
            let seg_b = Segment::new(Point::new(100.0, 0.0), Point::new(100.0, 500.0));
            let id_a = line_content_hash("w", &seg_a.p1, &seg_a.p2);
            let id_b = line_content_hash("w", &seg_b.p1, &seg_b.p2);
            TrimmedRectangle {
                trimmed_segment_a: seg_a,
                trimmed_segment_b: seg_b,
                bounding_rectangle: BBox::new(0.0, 0.0, 100.0, 500.0),
                source_pair_ids: vec![pair_uuid(&id_a, &id_b)],
                source_line_id_a: id_a,
                source_line_id_b: id_b,
            }
        };
        let b = {
            let seg_a = Segment::new(Point::new(0.0, 500.0), Point::new(0.0, 900.0));
            let seg_b = Segment::new(Point::new(100.0, 500.0), Point::new(100.0, 900.0));
            let id_a = line_content_hash("w", &seg_a.p1, &seg_a.p2);
            let id_b = line_content_hash("w", &seg_b.p1, &seg_b.p2);
            TrimmedRectangle {
                trimmed_segment_a: seg_a,
                trimmed_segment_b: seg_b,
                bounding_rectangle: BBox::new(0.0, 500.0, 100.0, 900.0),
                source_pair_ids: vec![pair_uuid(&id_a, &id_b)],
                source_line_id_a: id_a,
                source_line_id_b: id_b,
            }
        };
        let out = run_on(vec![a, b]);
        assert_eq!(out.rectangles.len(), 1);
        assert_eq!(
            out.rectangles[0].bounding_rectangle,
            BBox::new(0.0, 0.0, 100.0, 900.0)
        );
    }

    #[test]
    fn touching_members_conserve_union_length() {
        let out = run_on(vec![
            make_rect(0.0, 0.0, 400.0, 100.0),
            make_rect(400.0, 0.0, 1000.0, 100.0),
        ]);
        assert_eq!(out.rectangles.len(), 1);
        let merged = out.rectangles[0].trimmed_segment_a.length();
        assert!((merged - 1000.0).abs() < 1e-9);
    }
}
