//! Fixed pool of `mio` event-loop threads plus a worker-thread pool.
//!
//! Loop 0 owns every listener and accepts new connections, handing each
//! one off (round-robin) to a loop's handoff channel — including
//! possibly back to itself. Once handed off, a connection is pinned to
//! that loop for its whole life: it is never migrated between loops
//! again. Each loop decodes request frames off its own connections and
//! pushes them onto a shared queue; a separate pool of worker threads
//! drains that queue and runs [`crate::dispatch::process_job`], so a
//! slow handler stalls a worker, never a socket read.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use mio::{Events, Interest, Poll, Token};
use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};
use tracing::warn;
use triplex_net::tcp::TcpStream;
use triplex_net::tcp::frame::RequestFrame;
use triplex_timing::{Duration, Instant};

use crate::connection::{Connection, ConnHandle};
use crate::dispatch::{Job, Shared};
use crate::error::{ServerError, ServerResult};

const POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(5);

/// A freshly accepted connection, handed from the accepting loop to its
/// pinned target loop.
struct Handoff {
    std_stream: std::net::TcpStream,
    peer_addr: SocketAddr,
    conn: ConnHandle,
}

struct LocalConn {
    handle: ConnHandle,
    stream: TcpStream,
    last_active: Instant,
}

/// Owns the event-loop and worker threads for one running [`crate::server::Server`].
pub struct IoPool {
    stop: Arc<AtomicBool>,
    loop_handles: Vec<JoinHandle<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl IoPool {
    /// Binds every endpoint synchronously (so a bind failure surfaces
    /// before any thread is spawned), then starts `io_loops` event-loop
    /// threads and `worker_threads` dispatch threads.
    pub fn start(
        io_loops: usize,
        worker_threads: usize,
        endpoints: &[SocketAddr],
        timeout: Duration,
        shared: Arc<Shared>,
        job_tx: Sender<Job>,
        job_rx: Receiver<Job>,
    ) -> ServerResult<Self> {
        let io_loops = io_loops.max(1);
        let mut listeners = Vec::with_capacity(endpoints.len());
        for addr in endpoints {
            let listener =
                MioTcpListener::bind(*addr).map_err(|source| ServerError::Bind { addr: *addr, source })?;
            listeners.push(listener);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let mut senders = Vec::with_capacity(io_loops);
        let mut receivers = Vec::with_capacity(io_loops);
        for _ in 0..io_loops {
            let (tx, rx) = crossbeam_channel::unbounded();
            senders.push(tx);
            receivers.push(rx);
        }

        let mut loop_handles = Vec::with_capacity(io_loops);
        for (idx, rx) in receivers.into_iter().enumerate() {
            let loop_listeners = if idx == 0 { std::mem::take(&mut listeners) } else { Vec::new() };
            let senders = senders.clone();
            let shared = shared.clone();
            let job_tx = job_tx.clone();
            let stop = stop.clone();
            let handle = thread::Builder::new()
                .name(format!("triplex-io-{idx}"))
                .spawn(move || run_loop(idx, rx, loop_listeners, senders, timeout, shared, job_tx, stop))
                .map_err(ServerError::Io)?;
            loop_handles.push(handle);
        }

        let mut worker_handles = Vec::with_capacity(worker_threads.max(1));
        for idx in 0..worker_threads.max(1) {
            let job_rx = job_rx.clone();
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("triplex-worker-{idx}"))
                .spawn(move || {
                    for job in job_rx {
                        crate::dispatch::process_job(&shared, job);
                    }
                })
                .map_err(ServerError::Io)?;
            worker_handles.push(handle);
        }
        drop(job_rx);

        Ok(Self { stop, loop_handles, worker_handles })
    }

    /// Signals every loop and worker thread to stop after its current
    /// tick, then blocks until they've all exited.
    pub fn stop_and_join(self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.loop_handles {
            let _ = handle.join();
        }
        // Worker threads exit once the job channel's last sender drops
        // and the queue drains; joining here just waits that out.
        for handle in self.worker_handles {
            let _ = handle.join();
        }
    }
}

fn listener_token(idx: usize) -> Token {
    Token(usize::MAX - idx - 1)
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    idx: usize,
    handoff_rx: Receiver<Handoff>,
    mut listeners: Vec<MioTcpListener>,
    senders: Vec<Sender<Handoff>>,
    timeout: Duration,
    shared: Arc<Shared>,
    job_tx: Sender<Job>,
    stop: Arc<AtomicBool>,
) {
    let mut poll = match Poll::new() {
        Ok(p) => p,
        Err(err) => {
            warn!(?err, loop_idx = idx, "failed to create mio poll");
            return;
        }
    };
    let mut events = Events::with_capacity(256);
    let mut local: HashMap<Token, LocalConn> = HashMap::new();
    let mut next_token: usize = 0;
    let mut round_robin: usize = 0;

    for (i, listener) in listeners.iter_mut().enumerate() {
        if let Err(err) = poll.registry().register(listener, listener_token(i), Interest::READABLE) {
            warn!(?err, loop_idx = idx, "failed to register listener");
        }
    }

    while !stop.load(Ordering::Relaxed) {
        while let Ok(Handoff { std_stream, peer_addr, conn }) = handoff_rx.try_recv() {
            let mut mio_stream = MioTcpStream::from_std(std_stream);
            let token = Token(next_token);
            next_token += 1;
            if let Err(err) = poll.registry().register(&mut mio_stream, token, Interest::READABLE) {
                warn!(?err, loop_idx = idx, "failed to register handed-off connection");
                continue;
            }
            match TcpStream::from_stream(mio_stream, peer_addr, token) {
                Ok(stream) => {
                    local.insert(token, LocalConn { handle: conn, stream, last_active: Instant::now() });
                }
                Err(err) => {
                    warn!(?err, loop_idx = idx, "failed to adopt handed-off connection");
                    shared.disconnect(conn);
                }
            }
        }

        if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            warn!(?err, loop_idx = idx, "poll failed");
            continue;
        }

        for event in events.iter() {
            let token = event.token();

            if let Some(listener_idx) = (0..listeners.len()).find(|&i| listener_token(i) == token) {
                accept_all(&mut listeners[listener_idx], &shared, &senders, &mut round_robin);
                continue;
            }

            let Some(local_conn) = local.get_mut(&token) else { continue };
            let handle = local_conn.handle;

            let mut pending: Vec<RequestFrame> = Vec::new();
            let mut framing_error = false;
            let state = local_conn.stream.poll_with(poll.registry(), event, &mut |_tok, payload| {
                match RequestFrame::decode(payload) {
                    Ok(frame) => pending.push(frame),
                    Err(err) => {
                        warn!(?err, loop_idx = idx, "malformed request frame, closing connection");
                        framing_error = true;
                    }
                }
            });

            if !pending.is_empty() {
                local_conn.last_active = Instant::now();
            }
            for frame in pending {
                let _ = job_tx.send(Job { conn: handle, frame });
            }

            if framing_error {
                local_conn.stream.close(poll.registry());
                local.remove(&token);
                shared.disconnect(handle);
            } else if state == triplex_net::tcp::ConnState::Disconnected {
                local.remove(&token);
                shared.disconnect(handle);
            }
        }

        evict_idle(&mut local, &mut poll, timeout, &shared);
    }
}

/// Closes and evicts every connection this loop owns that hasn't sent a
/// frame (including a heartbeat, for subscriber connections) within
/// `timeout`. A subscriber's heartbeat cadence must stay comfortably
/// under this to keep its subscription alive.
fn evict_idle(local: &mut HashMap<Token, LocalConn>, poll: &mut Poll, timeout: Duration, shared: &Arc<Shared>) {
    let stale: Vec<Token> = local
        .iter()
        .filter(|(_, conn)| conn.last_active.elapsed() >= timeout)
        .map(|(token, _)| *token)
        .collect();

    for token in stale {
        if let Some(mut conn) = local.remove(&token) {
            conn.stream.close(poll.registry());
            shared.disconnect(conn.handle);
        }
    }
}

fn accept_all(
    listener: &mut MioTcpListener,
    shared: &Arc<Shared>,
    senders: &[Sender<Handoff>],
    round_robin: &mut usize,
) {
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                let write_half = match dup_std(&stream) {
                    Ok(s) => s,
                    Err(err) => {
                        warn!(?err, %peer_addr, "failed to duplicate accepted socket for write half");
                        continue;
                    }
                };

                let conn = Arc::new(Connection::new(peer_addr, write_half));
                let handle = shared.insert(conn);

                let target = *round_robin % senders.len().max(1);
                *round_robin = round_robin.wrapping_add(1);
                let std_stream = into_std(stream);
                if senders[target].send(Handoff { std_stream, peer_addr, conn: handle }).is_err() {
                    warn!(%peer_addr, "io loop gone, dropping accepted connection");
                    shared.disconnect(handle);
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
            Err(err) => {
                warn!(?err, "accept failed");
                break;
            }
        }
    }
}

/// Duplicates the accepted socket's file descriptor for use as the
/// connection's blocking write half. The duplicate shares the same open
/// file description as the original — including its non-blocking flag,
/// which can't be split per-descriptor — so [`Connection`]'s write path
/// treats `WouldBlock` as a retry condition rather than an error.
fn dup_std(stream: &MioTcpStream) -> io::Result<std::net::TcpStream> {
    let fd = stream.as_raw_fd();
    let dup_fd = unsafe { libc::dup(fd) };
    if dup_fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { std::net::TcpStream::from_raw_fd(dup_fd) })
}

/// Converts an accepted `mio` stream into a plain `std` stream for
/// cross-thread handoff; the target loop re-wraps it with
/// [`MioTcpStream::from_std`].
fn into_std(stream: MioTcpStream) -> std::net::TcpStream {
    let fd = stream.into_raw_fd();
    unsafe { std::net::TcpStream::from_raw_fd(fd) }
}
