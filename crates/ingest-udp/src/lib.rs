use anyhow::Context;
use race_ingest_core::*;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Receive buffer size; commands and fixes are short text lines.
pub const RECV_BUF_LEN: usize = 1024;

#[derive(Clone, Debug)]
pub struct UdpSourceConfig {
    pub bind_addr: String, // e.g. "0.0.0.0:4040"
}

impl Default for UdpSourceConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:4040".into() }
    }
}

pub struct UdpSource {
    cfg: UdpSourceConfig,
}

impl UdpSource {
    pub fn new(cfg: UdpSourceConfig) -> Self { Self { cfg } }

    pub async fn bind(&self) -> anyhow::Result<UdpSocket> {
        let socket = UdpSocket::bind(&self.cfg.bind_addr).await
            .with_context(|| format!("bind {}", self.cfg.bind_addr))?;
        info!(addr = %self.cfg.bind_addr, "udp listener bound");
        Ok(socket)
    }
}

/// Forwards every datagram to `tx` until the receiving side goes away.
/// Receive errors are transient for UDP and only logged.
pub async fn serve(socket: UdpSocket, tx: DatagramTx) -> Result<(), IngestError> {
    let mut buf = vec![0u8; RECV_BUF_LEN];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(err) => {
                warn!(?err, "udp receive failed");
                continue;
            }
        };
        let datagram = Datagram::from_bytes(&buf[..len], Some(peer));
        debug!(%peer, len, "datagram received");
        if tx.send(datagram).is_err() {
            return Err(IngestError::Msg("datagram channel closed".into()));
        }
    }
}

#[async_trait::async_trait]
impl PacketSource for UdpSource {
    async fn run(&self, tx: DatagramTx) -> Result<(), IngestError> {
        let socket = self.bind().await?;
        serve(socket, tx).await
    }
}
