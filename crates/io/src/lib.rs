//! Egress wire format and the UDP broadcaster.
//!
//! Two text datagrams per standings update, always in this order:
//! `CLASSIFICA,(id,gap,meters_to_finish,lane_offset,speed_kmh,elapsed),...`
//! then `TEL,x,y` with the leader's local position.

use anyhow::{Context, Result};
use race_model::*;
use std::net::{SocketAddr, UdpSocket};
use tracing::{debug, warn};

pub const RANKING_PREFIX: &str = "CLASSIFICA";
pub const TELEMETRY_PREFIX: &str = "TEL";
pub const LAST_ONE: &str = "last one";

/// `"Ns"` under a minute, `"Mm Ss"` otherwise.
pub fn format_elapsed(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

pub fn format_gap(gap: &Gap) -> String {
    match gap {
        Gap::Meters(m) => format!("{:.2}", m),
        Gap::LastOne => LAST_ONE.to_string(),
    }
}

pub fn encode_standings(standings: &Standings) -> String {
    let mut packet = String::from(RANKING_PREFIX);
    for row in &standings.rows {
        packet.push_str(&format!(
            ",({},{},{},{:.2},{:.2},{})",
            row.competitor_id,
            format_gap(&row.gap),
            row.meters_to_finish,
            row.lane_offset,
            row.speed_kmh,
            format_elapsed(row.elapsed_s),
        ));
    }
    packet
}

pub fn encode_telemetry(leader: &LeaderTelemetry) -> String {
    format!("{},{:.2},{:.2}", TELEMETRY_PREFIX, leader.x, leader.y)
}

/// Datagrams for one update, in send order.
pub fn encode_frames(standings: &Standings) -> Vec<String> {
    let mut frames = Vec::with_capacity(2);
    frames.push(encode_standings(standings));
    if let Some(leader) = &standings.leader {
        frames.push(encode_telemetry(leader));
    }
    frames
}

/// Fire-and-forget sender. Send failures are logged and dropped.
pub struct Broadcaster {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Broadcaster {
    pub fn bind(target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("bind broadcast socket")?;
        socket.set_broadcast(true).context("enable SO_BROADCAST")?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn publish(&self, standings: &Standings) {
        for frame in encode_frames(standings) {
            self.send(&frame);
        }
    }

    fn send(&self, frame: &str) {
        match self.socket.send_to(frame.as_bytes(), self.target) {
            Ok(_) => debug!(target_addr = %self.target, frame, "frame sent"),
            Err(err) => warn!(?err, target_addr = %self.target, "broadcast send failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn create_test_row(id: &str, gap: Gap, elapsed_s: u64) -> StandingRow {
        StandingRow {
            competitor_id: id.to_string(),
            distance_with_laps: 0.0,
            laps_completed: 0,
            gap,
            meters_to_finish: 1580,
            lane_offset: 1.234,
            speed_kmh: 45.0,
            elapsed_s,
        }
    }

    fn create_test_standings() -> Standings {
        Standings {
            race_id: Uuid::new_v4(),
            rows: vec![
                create_test_row("7", Gap::Meters(12.345), 75),
                create_test_row("3", Gap::LastOne, 9),
            ],
            leader: Some(LeaderTelemetry { x: 10.0, y: -2.555 }),
        }
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "0s");
        assert_eq!(format_elapsed(59), "59s");
        assert_eq!(format_elapsed(60), "1m 0s");
        assert_eq!(format_elapsed(125), "2m 5s");
    }

    #[test]
    fn test_encode_standings() {
        let packet = encode_standings(&create_test_standings());
        assert_eq!(
            packet,
            "CLASSIFICA,(7,12.35,1580,1.23,45.00,1m 15s),(3,last one,1580,1.23,45.00,9s)"
        );
    }

    #[test]
    fn test_encode_empty_standings() {
        let standings = Standings { race_id: Uuid::new_v4(), rows: vec![], leader: None };
        assert_eq!(encode_frames(&standings), vec!["CLASSIFICA".to_string()]);
    }

    #[test]
    fn test_encode_telemetry() {
        assert_eq!(encode_telemetry(&LeaderTelemetry { x: 10.0, y: -2.5 }), "TEL,10.00,-2.50");
    }

    #[test]
    fn test_negative_meters_to_finish() {
        let mut standings = create_test_standings();
        standings.rows.truncate(1);
        standings.rows[0].gap = Gap::LastOne;
        standings.rows[0].meters_to_finish = -4;
        assert_eq!(encode_standings(&standings), "CLASSIFICA,(7,last one,-4,1.23,45.00,1m 15s)");
    }

    #[test]
    fn test_publish_sends_ranking_then_telemetry() {
        let listener = UdpSocket::bind("127.0.0.1:0").unwrap();
        listener.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let broadcaster = Broadcaster::bind(listener.local_addr().unwrap()).unwrap();

        broadcaster.publish(&create_test_standings());

        let mut buf = [0u8; 1024];
        let n = listener.recv(&mut buf).unwrap();
        assert!(std::str::from_utf8(&buf[..n]).unwrap().starts_with("CLASSIFICA,(7,"));
        let n = listener.recv(&mut buf).unwrap();
        assert_eq!(std::str::from_utf8(&buf[..n]).unwrap(), "TEL,10.00,-2.56");
    }
}
