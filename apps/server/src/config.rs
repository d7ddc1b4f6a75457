//! Runtime configuration: defaults, optional JSON file, env overrides.

use std::env;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use race_track::{GeoPoint, TrackLayout};
use serde::Deserialize;

pub const CONFIG_PATH_VAR: &str = "RACE_CONFIG";
pub const LISTEN_ADDR_VAR: &str = "RACE_LISTEN_ADDR";
pub const BROADCAST_ADDR_VAR: &str = "RACE_BROADCAST_ADDR";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RaceConfig {
    pub listen_addr: String,
    pub broadcast_addr: SocketAddr,
    /// Start/finish line position; origin of the local frame.
    pub reference: GeoPoint,
    /// Counter-clockwise rotation aligning the finish straight with +x.
    pub rotation_deg: f64,
    pub layout: TrackLayout,
    /// Nominal race distance for the meters-to-finish field. Independent of
    /// the generated track length.
    pub total_race_meters: i64,
    pub heartbeat_secs: u64,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4040".into(),
            broadcast_addr: SocketAddr::from(([255, 255, 255, 255], 4141)),
            reference: GeoPoint { latitude: 44.60878672, longitude: 10.91568733 },
            rotation_deg: 16.0,
            layout: TrackLayout::default(),
            total_race_meters: 1600,
            heartbeat_secs: 5,
        }
    }
}

impl RaceConfig {
    pub fn load() -> Result<Self> {
        let path = env::var(CONFIG_PATH_VAR).ok();
        Self::from_sources(
            path.as_deref().map(Path::new),
            env::var(LISTEN_ADDR_VAR).ok(),
            env::var(BROADCAST_ADDR_VAR).ok(),
        )
    }

    pub fn from_sources(
        path: Option<&Path>,
        listen_addr: Option<String>,
        broadcast_addr: Option<String>,
    ) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        if let Some(addr) = listen_addr {
            cfg.listen_addr = addr;
        }
        if let Some(addr) = broadcast_addr {
            cfg.broadcast_addr = addr
                .parse()
                .with_context(|| format!("{BROADCAST_ADDR_VAR}={addr}"))?;
        }
        if cfg.heartbeat_secs == 0 {
            cfg.heartbeat_secs = 1;
        }
        Ok(cfg)
    }
}
