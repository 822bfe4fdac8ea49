//! Tokio runtime around the relay
//!
//! The relay itself is synchronous. This module owns the UDP transport and
//! drives [`Relay::tick`] from a fixed-rate interval, turns operator lines
//! into [`Relay::announce`] calls and shuts down on Ctrl+C.

use crate::config::ServerConfig;
use crate::relay::Relay;
use log::{error, info, warn};
use shared::transport::UdpServerTransport;
use shared::TransportError;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

pub struct Server {
    relay: Relay<UdpServerTransport>,
    config: ServerConfig,
    local_addr: SocketAddr,
}

impl Server {
    pub fn bind(config: ServerConfig) -> Result<Self, TransportError> {
        let transport = UdpServerTransport::bind(config.bind_addr, config.transport.clone())?;
        let local_addr = transport.local_addr()?;
        info!("Server listening on {}", local_addr);

        Ok(Self {
            relay: Relay::new(transport, &config),
            config,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs until Ctrl+C, announcing every line typed on stdin.
    pub async fn run(self) -> Result<(), TransportError> {
        let (announce_tx, announce_rx) = mpsc::unbounded_channel();
        tokio::spawn(read_announcements(announce_tx));

        self.run_until(announce_rx, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs until `shutdown` completes, then closes every connection.
    pub async fn run_until<F>(
        mut self,
        mut announcements: mpsc::UnboundedReceiver<String>,
        shutdown: F,
    ) -> Result<(), TransportError>
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut announcements_open = true;
        tokio::pin!(shutdown);

        info!("Relaying at {} Hz", self.config.tick_rate);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.relay.tick(Instant::now()) {
                        warn!("Transport error: {}", e);
                    }
                }
                text = announcements.recv(), if announcements_open => match text {
                    Some(text) => self.relay.announce(&text),
                    None => announcements_open = false,
                },
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        self.relay.shutdown();
        Ok(())
    }
}

/// Forwards non-empty stdin lines until stdin closes.
async fn read_announcements(tx: mpsc::UnboundedSender<String>) {
    info!("Type a line and press Enter to announce it to every player");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let text = line.trim();
                if !text.is_empty() && tx.send(text.to_string()).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped reading stdin: {}", e);
                break;
            }
        }
    }
}
