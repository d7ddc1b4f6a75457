use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Planar point in the track's local frame (meters, x along the finish straight).
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Line `a*x + b*y + c = 0` through a segment, with `norm = sqrt(a^2 + b^2)`
/// precomputed so the point-to-line distance is `|a*x + b*y + c| / norm`.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct LineCoeffs {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub norm: f64,
}

/// One straight piece of the discretised centerline, in travel order.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub start: Point2,
    pub end: Point2,
    pub line: LineCoeffs,
    pub length: f64,
    /// Arc-length from the start/finish line to `start`.
    pub cumulative_distance_at_start: f64,
}

impl Segment {
    /// Arc-length from the start/finish line to `end`.
    pub fn cumulative_distance_at_end(&self) -> f64 {
        self.cumulative_distance_at_start + self.length
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    Waiting,
    Racing,
}

impl RacePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RacePhase::Waiting => "waiting",
            RacePhase::Racing => "racing",
        }
    }
}

/// Gap to the next-ranked competitor; the last one has nobody behind it.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Gap {
    Meters(f64),
    LastOne,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct StandingRow {
    pub competitor_id: String,
    pub distance_with_laps: f64,
    pub laps_completed: u32,
    pub gap: Gap,
    pub meters_to_finish: i64,
    pub lane_offset: f64,
    pub speed_kmh: f64,
    pub elapsed_s: u64,
}

/// Leader's raw local position, carried by the `TEL` packet.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct LeaderTelemetry {
    pub x: f64,
    pub y: f64,
}

/// Ranked snapshot produced on every accepted fix. Row order is the display order.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Standings {
    #[serde(with = "uuid::serde::simple")]
    pub race_id: Uuid,
    pub rows: Vec<StandingRow>,
    pub leader: Option<LeaderTelemetry>,
}

impl Standings {
    pub fn leader_id(&self) -> Option<&str> {
        self.rows.first().map(|r| r.competitor_id.as_str())
    }
}
