use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use race_ingest_core::{classify, channel, Datagram, DatagramRx, GpsFix, Inbound, IngestError, PacketSource, RaceCommand};
use race_model::{Point2, RacePhase, Standings};
use race_track::{GeoFrame, GeoPoint, Resolved, TrackError, TrackModel};

use crate::standings::{self, Publish};

/// Per-competitor progress, rebuilt from scratch on every race start.
#[derive(Debug, Clone)]
pub struct Competitor {
    pub id: String,
    pub position: Point2,
    pub lane_offset: f64,
    pub distance_along_track: f64,
    pub prev_distance_along_track: f64,
    pub laps_completed: u32,
    /// Bumped once per segment change; drives the meters-to-finish field only.
    pub meters_covered: u32,
    pub last_segment_index: Option<usize>,
    pub speed_kmh: f64,
    pub first_seen_at: Instant,
}

impl Competitor {
    pub fn new(id: &str, now: Instant) -> Self {
        Self {
            id: id.to_string(),
            position: Point2::default(),
            lane_offset: 0.0,
            distance_along_track: 0.0,
            prev_distance_along_track: 0.0,
            laps_completed: 0,
            meters_covered: 0,
            last_segment_index: None,
            speed_kmh: 0.0,
            first_seen_at: now,
        }
    }

    /// Applies one resolved fix. Returns true when it completed a lap.
    ///
    /// A lap only counts when the distance drops by more than half the track:
    /// that is the wrap past the finish line, smaller drops are GPS jitter or
    /// reordered packets.
    pub fn record_fix(&mut self, position: Point2, resolved: &Resolved, speed_kmh: f64, track_length: f64) -> bool {
        let total = resolved.distance_along_track;
        let prev = self.prev_distance_along_track;
        let lapped = total < prev && (prev - total) > track_length / 2.0;
        if lapped {
            self.laps_completed += 1;
        }
        self.prev_distance_along_track = total;
        self.distance_along_track = total;

        if self.last_segment_index != Some(resolved.segment_index) {
            self.meters_covered += 1;
            self.last_segment_index = Some(resolved.segment_index);
        }

        self.position = position;
        self.lane_offset = resolved.lane_offset;
        self.speed_kmh = speed_kmh;
        lapped
    }

    pub fn distance_with_laps(&self, track_length: f64) -> f64 {
        self.laps_completed as f64 * track_length + self.distance_along_track
    }
}

#[derive(Debug, Clone)]
pub struct RaceStart {
    pub race_id: Uuid,
    pub started_at: Instant,
    pub wall_clock: OffsetDateTime,
}

/// Owns the race phase and the competitor table. Only the session thread
/// touches it, through `RaceSession`'s lock.
pub struct RaceController {
    track: Arc<TrackModel>,
    frame: GeoFrame,
    total_race_meters: i64,
    phase: RacePhase,
    race: Option<RaceStart>,
    competitors: BTreeMap<String, Competitor>,
}

impl RaceController {
    pub fn new(track: Arc<TrackModel>, frame: GeoFrame, total_race_meters: i64) -> Self {
        Self {
            track,
            frame,
            total_race_meters,
            phase: RacePhase::Waiting,
            race: None,
            competitors: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn race(&self) -> Option<&RaceStart> {
        self.race.as_ref()
    }

    pub fn competitors(&self) -> &BTreeMap<String, Competitor> {
        &self.competitors
    }

    /// Handles one inbound payload. Returns the new standings when a fix was
    /// accepted and resolved.
    pub fn handle(&mut self, datagram: &Datagram, now: Instant) -> Option<Standings> {
        match classify(&datagram.payload, self.phase) {
            Inbound::Command(RaceCommand::Start) => {
                self.start(now);
                None
            }
            Inbound::Command(RaceCommand::End) => {
                self.end();
                None
            }
            Inbound::Ignored => {
                debug!(phase = self.phase.as_str(), payload = %datagram.payload, "payload ignored");
                None
            }
            Inbound::Malformed(err) => {
                warn!(%err, peer = ?datagram.peer, "discarding packet");
                None
            }
            Inbound::Fix(fix) => match self.apply_fix(&fix, now) {
                Ok(()) => Some(self.standings(now)),
                Err(err) => {
                    error!(%err, competitor = %fix.competitor_id, "fix could not be placed on the track");
                    None
                }
            },
        }
    }

    fn start(&mut self, now: Instant) {
        self.competitors.clear();
        let race = RaceStart {
            race_id: Uuid::new_v4(),
            started_at: now,
            wall_clock: OffsetDateTime::now_utc(),
        };
        let started = race.wall_clock.format(&Rfc3339).unwrap_or_default();
        info!(race_id = %race.race_id, %started, "start command received, race started");
        self.race = Some(race);
        self.phase = RacePhase::Racing;
    }

    fn end(&mut self) {
        match self.race.take() {
            Some(race) => info!(
                race_id = %race.race_id,
                duration_s = race.started_at.elapsed().as_secs(),
                competitors = self.competitors.len(),
                "end command received, race over"
            ),
            None => info!("end command received, race over"),
        }
        self.competitors.clear();
        self.phase = RacePhase::Waiting;
    }

    fn apply_fix(&mut self, fix: &GpsFix, now: Instant) -> Result<(), TrackError> {
        let position = self.frame.to_local(GeoPoint { latitude: fix.latitude, longitude: fix.longitude });
        let resolved = self.track.resolve(position)?;
        debug!(
            competitor = %fix.competitor_id,
            segment = resolved.segment_index,
            off_track = %format!("{:.2}", resolved.off_track_distance),
            line_distance = %format!("{:.2}", resolved.line_distance),
            "fix resolved"
        );
        let track_length = self.track.total_track_length();

        let competitor = self
            .competitors
            .entry(fix.competitor_id.clone())
            .or_insert_with(|| Competitor::new(&fix.competitor_id, now));
        if competitor.record_fix(position, &resolved, fix.speed_kmh(), track_length) {
            info!(competitor = %competitor.id, laps = competitor.laps_completed, "lap completed");
        }
        Ok(())
    }

    pub fn standings(&self, now: Instant) -> Standings {
        let race_id = self.race.as_ref().map(|r| r.race_id).unwrap_or_else(Uuid::nil);
        standings::rank(
            self.competitors.values(),
            self.track.total_track_length(),
            self.total_race_meters,
            race_id,
            now,
        )
    }
}

pub struct RaceSession {
    pub inner: Mutex<RaceController>,
    publisher: Box<dyn Publish>,
}

impl RaceSession {
    pub fn new(controller: RaceController, publisher: Box<dyn Publish>) -> Self {
        Self { inner: Mutex::new(controller), publisher }
    }

    /// Whole parse/gate/resolve/update/publish step under one lock.
    pub fn handle(&self, datagram: &Datagram) {
        let mut inner = self.inner.lock();
        if let Some(standings) = inner.handle(datagram, Instant::now()) {
            standings::log_standings(&standings);
            self.publisher.publish(&standings);
        }
    }
}

/// Drains the channel on a dedicated thread until every sender is gone.
pub fn spawn_session_thread(rx: DatagramRx, sess: Arc<RaceSession>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(datagram) = rx.recv() {
            sess.handle(&datagram);
        }
        debug!("datagram channel closed, session thread exiting");
    })
}

/// Runs `src` on the current task and feeds the session thread. Returns when the
/// source fails; a bind failure surfaces here.
pub async fn run_source<S: PacketSource>(src: S, sess: Arc<RaceSession>) -> Result<(), IngestError> {
    let (tx, rx) = channel();
    let pump = spawn_session_thread(rx, sess);
    let res = src.run(tx).await;
    // the sender is dropped with `run`, so the thread drains and stops
    match tokio::task::spawn_blocking(move || pump.join()).await {
        Ok(Ok(())) => {}
        _ => error!("session thread panicked"),
    }
    res
}
