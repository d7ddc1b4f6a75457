//! Ranking and publishing of standings.

use std::cmp::Ordering;
use std::time::Instant;

use race_io::{format_gap, Broadcaster};
use race_model::{Gap, LeaderTelemetry, StandingRow, Standings};
use tracing::debug;
use uuid::Uuid;

use crate::session::Competitor;

/// Sink for ranked snapshots. Fire-and-forget: implementations never report back.
pub trait Publish: Send + Sync {
    fn publish(&self, standings: &Standings);
}

impl Publish for Broadcaster {
    fn publish(&self, standings: &Standings) {
        Broadcaster::publish(self, standings)
    }
}

/// Sorts by distance with laps, descending. Exact ties fall back to competitor
/// id, ascending, so the order never depends on table layout.
pub fn rank<'a>(
    competitors: impl Iterator<Item = &'a Competitor>,
    track_length: f64,
    total_race_meters: i64,
    race_id: Uuid,
    now: Instant,
) -> Standings {
    let mut ranked: Vec<(&Competitor, f64)> = competitors
        .map(|c| (c, c.distance_with_laps(track_length)))
        .collect();
    ranked.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.id.cmp(&b.0.id),
        other => other,
    });

    let rows = ranked
        .iter()
        .enumerate()
        .map(|(i, (c, distance))| {
            let gap = match ranked.get(i + 1) {
                Some((_, next)) => Gap::Meters(distance - next),
                None => Gap::LastOne,
            };
            StandingRow {
                competitor_id: c.id.clone(),
                distance_with_laps: *distance,
                laps_completed: c.laps_completed,
                gap,
                meters_to_finish: total_race_meters - c.meters_covered as i64,
                lane_offset: c.lane_offset,
                speed_kmh: c.speed_kmh,
                elapsed_s: now.saturating_duration_since(c.first_seen_at).as_secs(),
            }
        })
        .collect();

    let leader = ranked
        .first()
        .map(|(c, _)| LeaderTelemetry { x: c.position.x, y: c.position.y });

    Standings { race_id, rows, leader }
}

pub fn log_standings(standings: &Standings) {
    for (i, row) in standings.rows.iter().enumerate() {
        debug!(
            race_id = %standings.race_id,
            rank = i + 1,
            competitor = %row.competitor_id,
            distance = %format!("{:.2}", row.distance_with_laps),
            laps = row.laps_completed,
            to_finish = row.meters_to_finish,
            lane = %format!("{:.2}", row.lane_offset),
            gap = %format_gap(&row.gap),
            "standing"
        );
    }
}
