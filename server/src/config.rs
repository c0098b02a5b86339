//! Runtime settings for the authoritative server

use shared::{DEFAULT_PATH, DEFAULT_PORT, PICKUP_CAP, PICKUP_SPAWN_INTERVAL, TARGET_TPS};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the listener binds to, `host:port`
    pub bind_addr: String,
    /// Only WebSocket upgrades on this path are accepted
    pub path: String,
    pub tick_duration: Duration,
    /// Pickups are not spawned while this many are alive
    pub pickup_cap: usize,
    pub pickup_interval: Duration,
}

impl ServerConfig {
    pub fn new(host: &str, port: u16, path: &str, tick_rate: u32) -> Self {
        Self {
            bind_addr: format!("{}:{}", host, port),
            path: normalize_path(path),
            tick_duration: tick_duration_for(tick_rate),
            ..Self::default()
        }
    }

    pub fn with_pickups(mut self, cap: usize, interval: Duration) -> Self {
        self.pickup_cap = cap;
        self.pickup_interval = interval;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            path: DEFAULT_PATH.to_string(),
            tick_duration: tick_duration_for(TARGET_TPS as u32),
            pickup_cap: PICKUP_CAP,
            pickup_interval: PICKUP_SPAWN_INTERVAL,
        }
    }
}

/// A zero tick rate falls back to the nominal rate
fn tick_duration_for(tick_rate: u32) -> Duration {
    let rate = if tick_rate == 0 {
        TARGET_TPS as u32
    } else {
        tick_rate
    };
    Duration::from_secs_f64(1.0 / rate as f64)
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
