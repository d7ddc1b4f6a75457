//! GPS race tracker: UDP fixes in, standings and leader telemetry out.

mod config;
mod session;
mod standings;
mod tasks;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use race_io::Broadcaster;
use race_ingest_udp::{UdpSource, UdpSourceConfig};
use race_track::{GeoFrame, TrackModel};
use tracing::{error, info};

use config::RaceConfig;
use session::{RaceController, RaceSession};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(err) = run().await {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = RaceConfig::load()?;

    let track = TrackModel::build(&cfg.layout).context("build track model")?;
    info!(
        segments = track.segment_count(),
        total_track_length = %format!("{:.2}", track.total_track_length()),
        total_race_meters = cfg.total_race_meters,
        "track model ready"
    );
    let frame = GeoFrame::new(cfg.reference, cfg.rotation_deg);

    let broadcaster = Broadcaster::bind(cfg.broadcast_addr)?;
    info!(target_addr = %broadcaster.target(), "broadcasting standings");

    let controller = RaceController::new(Arc::new(track), frame, cfg.total_race_meters);
    let session = Arc::new(RaceSession::new(controller, Box::new(broadcaster)));

    let heartbeat_session = session.clone();
    let period = Duration::from_secs(cfg.heartbeat_secs);
    tokio::spawn(async move {
        tasks::waiting_heartbeat_task(heartbeat_session, period).await;
    });

    let source = UdpSource::new(UdpSourceConfig { bind_addr: cfg.listen_addr.clone() });
    session::run_source(source, session).await?;
    Ok(())
}
