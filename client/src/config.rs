//! Startup configuration of the session client

use crate::error::ConfigError;
use shared::transport::TransportConfig;
use shared::{DEFAULT_PING_INTERVAL_SECS, DEFAULT_PLAYER_NAME, DEFAULT_PORT, DEFAULT_POSITION_SYNC_HZ};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Lowest accepted position sync rate.
const MIN_SYNC_HZ: f32 = 0.1;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: SocketAddr,
    /// Display name sent with `Join`. Longer names are truncated to 32 bytes.
    pub name: String,
    /// Own position updates per second. Also sets the interpolation window
    /// for remote peers.
    pub position_sync_hz: f32,
    pub ping_interval: Duration,
    /// Chat lines kept in the log.
    pub chat_history: usize,
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            name: DEFAULT_PLAYER_NAME.to_string(),
            position_sync_hz: DEFAULT_POSITION_SYNC_HZ,
            ping_interval: Duration::from_secs_f32(DEFAULT_PING_INTERVAL_SECS),
            chat_history: 32,
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn position_sync_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.position_sync_hz.max(MIN_SYNC_HZ)))
    }
}

/// Parses `host`, `host:port`, `ip` or `ip:port`. A missing port means the
/// default port.
pub fn parse_server_addr(input: &str) -> Result<SocketAddr, ConfigError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConfigError::InvalidServerAddr(input.to_string()));
    }
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    let resolved = if input.contains(':') {
        input.to_socket_addrs()
    } else {
        (input, DEFAULT_PORT).to_socket_addrs()
    };

    resolved
        .map_err(|source| ConfigError::Resolve {
            addr: input.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| ConfigError::InvalidServerAddr(input.to_string()))
}
