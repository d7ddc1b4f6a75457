//! Background tasks.

use std::sync::Arc;
use std::time::Duration;

use race_model::RacePhase;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::session::RaceSession;

/// Logs a reminder every `period` while no race is running. Purely informational.
pub async fn waiting_heartbeat_task(session: Arc<RaceSession>, period: Duration) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let (phase, race_id, competitors) = {
            let inner = session.inner.lock();
            (inner.phase(), inner.race().map(|r| r.race_id), inner.competitors().len())
        };
        match phase {
            RacePhase::Waiting => info!("waiting for start command"),
            RacePhase::Racing => debug!(race_id = ?race_id, competitors, "race in progress"),
        }
    }
}
