//! Piecewise-linear model of an oval circuit and nearest-segment lookup.

pub mod geo;

use race_model::{LineCoeffs, Point2, Segment};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub use geo::{meters_per_millidegree, GeoFrame, GeoPoint};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TrackError {
    #[error("invalid track layout: {0}")]
    InvalidLayout(String),
    #[error("track model has no segments")]
    EmptyTrack,
}

/// Physical dimensions of the oval: two straights joined by two semicircles of the
/// same radius. The start/finish line sits on the near straight, splitting it into
/// `straight_after_finish_m` and `straight_before_finish_m`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackLayout {
    pub curve_radius_m: f64,
    pub straight_after_finish_m: f64,
    pub straight_before_finish_m: f64,
    /// Target length of one generated segment.
    pub segment_length_m: f64,
}

impl Default for TrackLayout {
    fn default() -> Self {
        Self {
            curve_radius_m: 81.0,
            straight_after_finish_m: 70.0,
            straight_before_finish_m: 180.0,
            segment_length_m: 1.0,
        }
    }
}

impl TrackLayout {
    pub fn opposite_straight_m(&self) -> f64 {
        self.straight_after_finish_m + self.straight_before_finish_m
    }

    pub fn validate(&self) -> Result<(), TrackError> {
        let checks = [
            ("curve_radius_m", self.curve_radius_m),
            ("straight_after_finish_m", self.straight_after_finish_m),
            ("straight_before_finish_m", self.straight_before_finish_m),
            ("segment_length_m", self.segment_length_m),
        ];
        for (name, v) in checks {
            if !(v.is_finite() && v > 0.0) {
                return Err(TrackError::InvalidLayout(format!("{name} must be > 0, got {v}")));
            }
        }
        if self.segment_length_m > self.straight_after_finish_m.min(self.straight_before_finish_m) {
            return Err(TrackError::InvalidLayout(format!(
                "segment_length_m {} is longer than a straight",
                self.segment_length_m
            )));
        }
        Ok(())
    }
}

/// Builds a segment with its line coefficients precomputed.
pub fn make_segment(index: usize, start: Point2, end: Point2, cumulative_distance_at_start: f64) -> Segment {
    let a = end.y - start.y;
    let b = start.x - end.x;
    let c = end.x * start.y - start.x * end.y;
    Segment {
        index,
        start,
        end,
        line: LineCoeffs { a, b, c, norm: a.hypot(b) },
        length: start.distance_to(&end),
        cumulative_distance_at_start,
    }
}

/// Perpendicular distance from `p` to the infinite line through `seg`.
pub fn distance_to_line(p: Point2, seg: &Segment) -> f64 {
    let l = &seg.line;
    if l.norm == 0.0 {
        return p.distance_to(&seg.start);
    }
    (l.a * p.x + l.b * p.y + l.c).abs() / l.norm
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentProjection {
    /// Distance from the point to the closest point of the bounded segment.
    pub distance: f64,
    /// Clamped projection parameter, 0 at `start` and 1 at `end`.
    pub t: f64,
    pub point: Point2,
}

pub fn project_onto_segment(p: Point2, seg: &Segment) -> SegmentProjection {
    let dx = seg.end.x - seg.start.x;
    let dy = seg.end.y - seg.start.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return SegmentProjection { distance: p.distance_to(&seg.start), t: 0.0, point: seg.start };
    }
    let t = (((p.x - seg.start.x) * dx + (p.y - seg.start.y) * dy) / len2).clamp(0.0, 1.0);
    let point = Point2::new(seg.start.x + t * dx, seg.start.y + t * dy);
    SegmentProjection { distance: p.distance_to(&point), t, point }
}

/// Result of locating a competitor on the track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolved {
    pub segment_index: usize,
    /// Distance from the segment's start to the projected point.
    pub along_segment_offset: f64,
    /// Arc-length from the start/finish line, ignoring laps.
    pub distance_along_track: f64,
    /// Distance from the point to its projection.
    pub off_track_distance: f64,
    /// Distance from the point to the nearest segment's start endpoint.
    pub lane_offset: f64,
    /// Distance to the segment's unbounded line.
    pub line_distance: f64,
}

#[derive(Clone, Debug)]
pub struct TrackModel {
    segments: Vec<Segment>,
    total_track_length: f64,
}

impl TrackModel {
    /// Discretises the oval in travel order: straight after the finish, bottom
    /// semicircle, opposite straight, top semicircle, straight before the finish.
    pub fn build(layout: &TrackLayout) -> Result<Self, TrackError> {
        layout.validate()?;
        let r = layout.curve_radius_m;
        let after = layout.straight_after_finish_m;
        let before = layout.straight_before_finish_m;
        let step = layout.segment_length_m;

        let mut b = Builder::default();
        b.straight(Point2::new(0.0, 0.0), 1.0, after, step);
        b.semicircle(Point2::new(after, r), r, 0.0, step);
        b.straight(Point2::new(after, 2.0 * r), -1.0, layout.opposite_straight_m(), step);
        b.semicircle(Point2::new(-before, r), r, PI, step);
        b.straight(Point2::new(-before, 0.0), 1.0, before, step);

        if b.segments.is_empty() {
            return Err(TrackError::EmptyTrack);
        }
        Ok(Self { segments: b.segments, total_track_length: b.cumulative })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn total_track_length(&self) -> f64 {
        self.total_track_length
    }

    /// Nearest-segment search. Linear scan; on exact ties the first segment in
    /// travel order wins.
    pub fn resolve(&self, p: Point2) -> Result<Resolved, TrackError> {
        let mut best: Option<(&Segment, SegmentProjection)> = None;
        for seg in &self.segments {
            let proj = project_onto_segment(p, seg);
            let closer = best.as_ref().map_or(true, |(_, cur)| proj.distance < cur.distance);
            if closer {
                best = Some((seg, proj));
            }
        }
        let (seg, proj) = best.ok_or(TrackError::EmptyTrack)?;
        let along = seg.start.distance_to(&proj.point);
        Ok(Resolved {
            segment_index: seg.index,
            along_segment_offset: along,
            distance_along_track: seg.cumulative_distance_at_start + along,
            off_track_distance: proj.distance,
            lane_offset: p.distance_to(&seg.start),
            line_distance: distance_to_line(p, seg),
        })
    }

    /// Centerline point at `distance` meters past the finish line, wrapping laps.
    pub fn point_at(&self, distance: f64) -> Option<Point2> {
        if self.segments.is_empty() || self.total_track_length <= 0.0 {
            return None;
        }
        let d = distance.rem_euclid(self.total_track_length);
        let i = self
            .segments
            .partition_point(|s| s.cumulative_distance_at_start <= d)
            .saturating_sub(1);
        let seg = &self.segments[i];
        let t = if seg.length > 0.0 {
            ((d - seg.cumulative_distance_at_start) / seg.length).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(Point2::new(
            seg.start.x + t * (seg.end.x - seg.start.x),
            seg.start.y + t * (seg.end.y - seg.start.y),
        ))
    }
}

#[derive(Default)]
struct Builder {
    segments: Vec<Segment>,
    cumulative: f64,
}

impl Builder {
    fn push(&mut self, start: Point2, end: Point2) {
        let len = start.distance_to(&end);
        self.cumulative += len;
        let seg = make_segment(self.segments.len(), start, end, self.cumulative - len);
        self.segments.push(seg);
    }

    /// Straight along the x axis, `dir` is +1 or -1.
    fn straight(&mut self, origin: Point2, dir: f64, length: f64, step: f64) {
        let n = ((length / step) as usize).max(1);
        let dx = dir * length / n as f64;
        for i in 0..n {
            let x0 = origin.x + i as f64 * dx;
            self.push(Point2::new(x0, origin.y), Point2::new(x0 + dx, origin.y));
        }
    }

    /// Half turn around `center`, sweeping theta from `theta0` to `theta0 + pi`,
    /// with point(theta) = center + r * (sin theta, -cos theta).
    fn semicircle(&mut self, center: Point2, r: f64, theta0: f64, step: f64) {
        let n = ((PI * r / step) as usize).max(1);
        let inc = PI / n as f64;
        let at = |theta: f64| Point2::new(center.x + r * theta.sin(), center.y - r * theta.cos());
        for i in 0..n {
            let t1 = theta0 + i as f64 * inc;
            let t2 = theta0 + (i + 1) as f64 * inc;
            self.push(at(t1), at(t2));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_track() -> TrackModel {
        TrackModel::build(&TrackLayout::default()).unwrap()
    }

    fn create_small_layout() -> TrackLayout {
        TrackLayout {
            curve_radius_m: 10.0,
            straight_after_finish_m: 5.0,
            straight_before_finish_m: 15.0,
            segment_length_m: 1.0,
        }
    }

    #[test]
    fn test_segment_lengths_sum_to_total() {
        let track = create_test_track();
        let sum: f64 = track.segments().iter().map(|s| s.length).sum();
        assert!((sum - track.total_track_length()).abs() < 1e-6);
        // 70 + 250 + 180 straights plus two chorded semicircles of r = 81
        let expected = 500.0 + 2.0 * PI * 81.0;
        assert!((track.total_track_length() - expected).abs() < 0.01);
    }

    #[test]
    fn test_segment_counts() {
        let track = create_test_track();
        // 70 + 254 + 250 + 254 + 180
        assert_eq!(track.segment_count(), 1008);
        for (i, s) in track.segments().iter().enumerate() {
            assert_eq!(s.index, i);
        }
    }

    #[test]
    fn test_cumulative_distance_non_decreasing() {
        let track = create_test_track();
        let segs = track.segments();
        assert_eq!(segs[0].cumulative_distance_at_start, 0.0);
        for w in segs.windows(2) {
            assert!(w[1].cumulative_distance_at_start >= w[0].cumulative_distance_at_start);
            assert!((w[0].cumulative_distance_at_end() - w[1].cumulative_distance_at_start).abs() < 1e-9);
        }
    }

    #[test]
    fn test_closed_loop() {
        for layout in [TrackLayout::default(), create_small_layout()] {
            let track = TrackModel::build(&layout).unwrap();
            let segs = track.segments();
            for w in segs.windows(2) {
                assert!(w[0].end.distance_to(&w[1].start) < 1e-9);
            }
            let first = &segs[0];
            let last = &segs[segs.len() - 1];
            assert!(last.end.distance_to(&first.start) < 1e-9);
        }
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let mut layout = TrackLayout::default();
        layout.curve_radius_m = 0.0;
        assert!(matches!(TrackModel::build(&layout), Err(TrackError::InvalidLayout(_))));

        let mut layout = TrackLayout::default();
        layout.segment_length_m = 500.0;
        assert!(matches!(TrackModel::build(&layout), Err(TrackError::InvalidLayout(_))));
    }

    #[test]
    fn test_point_on_segment_projection() {
        let seg = make_segment(0, Point2::new(0.0, 0.0), Point2::new(4.0, 3.0), 0.0);
        let proj = project_onto_segment(Point2::new(2.0, 1.5), &seg);
        assert!(proj.distance.abs() < 1e-12);
        assert!((0.0..=1.0).contains(&proj.t));
        assert!((proj.t - 0.5).abs() < 1e-12);
        assert!(distance_to_line(Point2::new(2.0, 1.5), &seg) < 1e-12);
    }

    #[test]
    fn test_projection_clamps_past_endpoint() {
        let seg = make_segment(0, Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), 0.0);
        let proj = project_onto_segment(Point2::new(3.0, 0.0), &seg);
        assert_eq!(proj.t, 1.0);
        assert!((proj.distance - 2.0).abs() < 1e-12);
        // the unbounded line passes through the point
        assert!(distance_to_line(Point2::new(3.0, 0.0), &seg) < 1e-12);
    }

    #[test]
    fn test_degenerate_segment() {
        let seg = make_segment(0, Point2::new(1.0, 1.0), Point2::new(1.0, 1.0), 0.0);
        let proj = project_onto_segment(Point2::new(4.0, 5.0), &seg);
        assert_eq!(proj.t, 0.0);
        assert!((proj.distance - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_resolve_on_finish_straight() {
        let track = create_test_track();
        let r = track.resolve(Point2::new(12.25, 0.5)).unwrap();
        assert_eq!(r.segment_index, 12);
        assert!((r.along_segment_offset - 0.25).abs() < 1e-9);
        assert!((r.distance_along_track - 12.25).abs() < 1e-9);
        assert!((r.off_track_distance - 0.5).abs() < 1e-9);
        assert!((r.line_distance - 0.5).abs() < 1e-9);
        assert!((r.lane_offset - 0.25f64.hypot(0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_on_opposite_straight() {
        let track = create_test_track();
        // opposite straight runs from x = 70 back to x = -180 at y = 162
        let r = track.resolve(Point2::new(0.0, 162.0)).unwrap();
        let opposite_start = track.segments()[70 + 254].cumulative_distance_at_start;
        assert!((r.distance_along_track - (opposite_start + 70.0)).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_tie_takes_first_segment() {
        let track = create_test_track();
        // shared endpoint of segments 4 and 5
        let r = track.resolve(Point2::new(5.0, 0.0)).unwrap();
        assert_eq!(r.segment_index, 4);
        assert!((r.distance_along_track - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_point_at_roundtrip_along_track() {
        let track = create_test_track();
        for d in [0.5, 69.5, 150.0, 400.0, 700.0, 900.0, 1000.0] {
            let p = track.point_at(d).unwrap();
            let r = track.resolve(p).unwrap();
            assert!((r.distance_along_track - d).abs() < 1e-6, "d={d} got {}", r.distance_along_track);
        }
        let wrapped = track.point_at(track.total_track_length() + 3.0).unwrap();
        assert!(wrapped.distance_to(&Point2::new(3.0, 0.0)) < 1e-9);
    }
}
