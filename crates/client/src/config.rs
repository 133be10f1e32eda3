use std::net::SocketAddr;

use triplex_timing::Duration;

/// Programmatic client configuration. No environment variables, no CLI
/// parsing happens in this crate — embedders build this in code.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub endpoint: SocketAddr,
    pub timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: SocketAddr) -> Self {
        Self { endpoint, timeout: Duration::from_secs(5), heartbeat_interval: Duration::from_secs(10) }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn heartbeats(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
