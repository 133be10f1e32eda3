use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::new_key_type;
use triplex_net::tcp::frame::{Mode, PushFrame, ResponseFrame};
use tracing::warn;

new_key_type! {
    /// Opaque handle into the connection arena. Stale handles (the
    /// connection they named has since closed) simply fail to resolve;
    /// holding one never keeps a connection alive.
    pub struct ConnHandle;
}

/// Server-side connection state shared between the owning I/O loop (reads)
/// and worker-pool threads (writes). The write half is a blocking clone of
/// the socket guarded by a mutex, independent of the non-blocking `mio`
/// registration the I/O loop uses for reads, so a worker thread can reply
/// without touching the loop's `Registry`.
pub struct Connection {
    pub peer_addr: SocketAddr,
    write_half: Mutex<std::net::TcpStream>,
    /// Sticky: once a connection carries a subscriber-kind frame it is
    /// evicted from the topic registry on every close path, regardless of
    /// what kind of traffic it carries afterwards.
    subscriber_tainted: AtomicBool,
}

impl Connection {
    /// Bound on consecutive `WouldBlock` retries in [`Self::write_framed`]
    /// before giving up and treating the connection as dead.
    const MAX_WOULD_BLOCK_RETRIES: u32 = 2_000;

    pub fn new(peer_addr: SocketAddr, write_half: std::net::TcpStream) -> Self {
        Self { peer_addr, write_half: Mutex::new(write_half), subscriber_tainted: AtomicBool::new(false) }
    }

    pub fn mark_subscriber_tainted(&self) {
        self.subscriber_tainted.store(true, Ordering::Relaxed);
    }

    pub fn is_subscriber_tainted(&self) -> bool {
        self.subscriber_tainted.load(Ordering::Relaxed)
    }

    /// Writes an RPC response frame. Holds the write mutex across the
    /// vectored write so two concurrent handler replies on one connection
    /// cannot interleave their frames.
    pub fn write_response(&self, call_id: u64, body: Vec<u8>) -> io::Result<()> {
        let frame = ResponseFrame { call_id, body }
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.write_framed(&frame)
    }

    /// Writes a push frame to a subscribed connection.
    pub fn write_push(&self, topic: &str, body: Vec<u8>, mode: Mode) -> io::Result<()> {
        let frame = PushFrame { topic_name: topic.to_string(), mode, body }
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.write_framed(&frame)
    }

    /// The write half is a `dup()` of the same file descriptor the I/O
    /// loop reads from in non-blocking mode — `O_NONBLOCK` lives on the
    /// shared open file description, not per descriptor, so it can't be
    /// cleared here without also blocking the loop's reads. Writes are
    /// small (one response or push frame) and the socket send buffer
    /// almost always has room, so `WouldBlock` is treated as transient
    /// and retried with a short backoff rather than surfaced as an error.
    fn write_framed(&self, payload: &[u8]) -> io::Result<()> {
        let len = (payload.len() as u32).to_le_bytes();
        let mut full = Vec::with_capacity(len.len() + payload.len());
        full.extend_from_slice(&len);
        full.extend_from_slice(payload);

        let mut sock = self.write_half.lock();
        let mut written = 0;
        let mut stall_retries = 0u32;
        while written < full.len() {
            match sock.write(&full[written..]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::WriteZero, "connection closed during write"));
                }
                Ok(n) => {
                    written += n;
                    stall_retries = 0;
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    stall_retries += 1;
                    if stall_retries > Self::MAX_WOULD_BLOCK_RETRIES {
                        warn!(addr = %self.peer_addr, "write stalled, disconnecting");
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "write stalled"));
                    }
                    std::thread::sleep(std::time::Duration::from_micros(200));
                }
                Err(err) => {
                    warn!(?err, addr = %self.peer_addr, "write to connection failed");
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        let _ = self.write_half.lock().shutdown(std::net::Shutdown::Both);
    }
}

pub type SharedConnection = Arc<Connection>;
