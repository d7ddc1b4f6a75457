//! Inbound packet model and the source trait used by the race server

use race_model::RacePhase;
use std::net::SocketAddr;

/// Fewest comma-separated fields a `GPS` line may carry.
pub const GPS_MIN_FIELDS: usize = 9;

const FIELD_TAG: usize = 0;
const FIELD_ID: usize = 1;
const FIELD_LAT: usize = 2;
const FIELD_LON: usize = 3;
const FIELD_SPEED: usize = 6;

/// One received UDP payload, decoded as text.
#[derive(Debug, Clone)]
pub struct Datagram {
    pub payload: String,
    pub peer: Option<SocketAddr>,
}

impl Datagram {
    pub fn from_bytes(buf: &[u8], peer: Option<SocketAddr>) -> Self {
        Self {
            payload: String::from_utf8_lossy(buf).trim().to_string(),
            peer,
        }
    }

    pub fn text(payload: &str) -> Self {
        Self { payload: payload.trim().to_string(), peer: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceCommand {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    pub competitor_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: f64,
}

impl GpsFix {
    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps * 3.6
    }
}

/// What a payload means given the current race phase.
#[derive(Debug)]
pub enum Inbound {
    Command(RaceCommand),
    Fix(GpsFix),
    /// Fix while waiting, or a payload that carries no command.
    Ignored,
    Malformed(IngestError),
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed packet ({reason}): {payload}")]
    Malformed { reason: String, payload: String },
    #[error("{0}")]
    Msg(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn malformed(reason: impl Into<String>, payload: &str) -> IngestError {
    IngestError::Malformed { reason: reason.into(), payload: payload.to_string() }
}

fn contains_keyword(payload: &str, keyword: &str) -> bool {
    payload.to_ascii_uppercase().contains(keyword)
}

/// While waiting only `START` is looked for; everything else, fixes included,
/// is dropped. While racing `END` is checked before the payload is parsed as a fix.
pub fn classify(payload: &str, phase: RacePhase) -> Inbound {
    match phase {
        RacePhase::Waiting => {
            if contains_keyword(payload, "START") {
                Inbound::Command(RaceCommand::Start)
            } else {
                Inbound::Ignored
            }
        }
        RacePhase::Racing => {
            if contains_keyword(payload, "END") {
                return Inbound::Command(RaceCommand::End);
            }
            match parse_fix(payload) {
                Ok(fix) => Inbound::Fix(fix),
                Err(err) => Inbound::Malformed(err),
            }
        }
    }
}

fn parse_number(parts: &[&str], idx: usize, name: &str, payload: &str) -> Result<f64, IngestError> {
    let v: f64 = parts[idx]
        .trim()
        .parse()
        .map_err(|_| malformed(format!("{name} is not numeric"), payload))?;
    if !v.is_finite() {
        return Err(malformed(format!("{name} is not finite"), payload));
    }
    Ok(v)
}

/// Parses `GPS,<id>,<lat>,<lon>,_,_,<speed m/s>,_,_[,...]`.
pub fn parse_fix(payload: &str) -> Result<GpsFix, IngestError> {
    let parts: Vec<&str> = payload.split(',').collect();
    if parts.len() < GPS_MIN_FIELDS {
        return Err(malformed(
            format!("expected at least {GPS_MIN_FIELDS} fields, got {}", parts.len()),
            payload,
        ));
    }
    if !parts[FIELD_TAG].trim().eq_ignore_ascii_case("GPS") {
        return Err(malformed("missing GPS tag", payload));
    }
    let competitor_id = parts[FIELD_ID].trim();
    if competitor_id.is_empty() {
        return Err(malformed("empty competitor id", payload));
    }
    Ok(GpsFix {
        competitor_id: competitor_id.to_string(),
        latitude: parse_number(&parts, FIELD_LAT, "latitude", payload)?,
        longitude: parse_number(&parts, FIELD_LON, "longitude", payload)?,
        speed_mps: parse_number(&parts, FIELD_SPEED, "speed", payload)?,
    })
}

pub type DatagramTx = crossbeam_channel::Sender<Datagram>;
pub type DatagramRx = crossbeam_channel::Receiver<Datagram>;

/// Trait for any live packet source
#[async_trait::async_trait]
pub trait PacketSource: Send + Sync {
    async fn run(&self, tx: DatagramTx) -> Result<(), IngestError>;
}

pub fn channel() -> (DatagramTx, DatagramRx) {
    crossbeam_channel::unbounded()
}
