use std::net::SocketAddr;

use triplex_timing::Duration;

/// Programmatic server configuration. No environment variables, no CLI
/// parsing happens in this crate — embedders build this in code.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub endpoints: Vec<SocketAddr>,
    pub timeout: Duration,
    pub io_loops: usize,
    pub worker_threads: usize,
}

impl ServerConfig {
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout: Duration::from_secs(30),
            io_loops: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            worker_threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
        }
    }

    #[must_use]
    pub fn listen(mut self, addr: SocketAddr) -> Self {
        self.endpoints.push(addr);
        self
    }

    /// Idle-connection timeout: a connection that sends no frame at all
    /// (including a subscriber's heartbeat) within `timeout` is closed by
    /// its I/O loop. Keep a subscriber's heartbeat interval comfortably
    /// under this or the server will evict it as dead.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn io_loops(mut self, n: usize) -> Self {
        self.io_loops = n.max(1);
        self
    }

    #[must_use]
    pub fn multithreaded(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads.max(1);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
