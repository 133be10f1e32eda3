//! Connection management shared by every client facade: lazy (re)connect,
//! a single background I/O thread driving a [`TcpConnector`], an
//! outbound command queue, and the in-flight table that correlates async
//! RPC responses by `call_id`.
//!
//! Timeouts are implemented as a bounded-channel `recv_timeout` on the
//! calling thread rather than a dedicated timer thread — equivalent in
//! effect (the call unblocks with an error at the deadline) and avoids
//! spawning a thread per in-flight call.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant as StdInstant};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, warn};
use triplex_net::tcp::frame::{Kind, Mode, PushFrame, RequestFrame, ResponseFrame, MAX_BUFFER_LEN};
use triplex_net::tcp::{PollEvent, SendBehavior, TcpConnector};
use triplex_timing::Duration;

use crate::error::{ClientError, ClientResult};

const POLL_TICK: StdDuration = StdDuration::from_millis(2);
const CONNECT_BACKOFF_MS: u64 = 20;

type Completion = Box<dyn FnOnce(ClientResult<Vec<u8>>) + Send>;

enum Command {
    Send(Vec<u8>),
    SendWithCompletion { call_id: u64, bytes: Vec<u8>, completion: Completion },
    ForceDisconnect,
}

pub(crate) struct Session {
    addr: SocketAddr,
    timeout: Duration,
    connected: Arc<AtomicBool>,
    call_ids: AtomicU64,
    cmd_tx: Sender<Command>,
    stop: Arc<AtomicBool>,
    handle: StdMutex<Option<JoinHandle<()>>>,
    subscriber_tainted: AtomicBool,
}

impl Session {
    /// Starts the background I/O thread and schedules the initial
    /// connect. `on_push` is `Some` only for subscriber sessions — its
    /// presence is what tells the I/O thread to decode inbound frames
    /// as pushes rather than RPC responses. `resend_on_reconnect` is
    /// consulted after every successful (re)connect and should return
    /// already-encoded frames to replay (subscribe topics); other
    /// client kinds pass a closure that returns an empty vec.
    pub fn start(
        addr: SocketAddr,
        timeout: Duration,
        on_push: Option<Arc<dyn Fn(&str, &[u8]) + Send + Sync>>,
        resend_on_reconnect: Arc<dyn Fn() -> Vec<Vec<u8>> + Send + Sync>,
    ) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let in_flight: Arc<Mutex<HashMap<u64, Completion>>> = Arc::new(Mutex::new(HashMap::new()));

        let loop_connected = connected.clone();
        let loop_stop = stop.clone();
        let loop_in_flight = in_flight.clone();
        let handle = thread::Builder::new()
            .name(format!("triplex-client-{addr}"))
            .spawn(move || {
                run_loop(addr, cmd_rx, loop_connected, loop_stop, loop_in_flight, on_push, resend_on_reconnect)
            })
            .expect("failed to spawn client io thread");

        Self {
            addr,
            timeout,
            connected,
            call_ids: AtomicU64::new(1),
            cmd_tx,
            stop,
            handle: StdMutex::new(Some(handle)),
            subscriber_tainted: AtomicBool::new(false),
        }
    }

    pub fn mark_subscriber_tainted(&self) {
        self.subscriber_tainted.store(true, Ordering::Relaxed);
    }

    pub fn is_subscriber_tainted(&self) -> bool {
        self.subscriber_tainted.load(Ordering::Relaxed)
    }

    fn next_call_id(&self) -> u64 {
        self.call_ids.fetch_add(1, Ordering::Relaxed)
    }

    fn check_size(protocol: &str, body: &[u8]) -> ClientResult<()> {
        if protocol.len() + body.len() > MAX_BUFFER_LEN {
            return Err(ClientError::SendTooLarge {
                protocol: protocol.to_string(),
                size: protocol.len() + body.len(),
            });
        }
        Ok(())
    }

    /// Blocks the calling thread (up to `timeout`) until the background
    /// thread reports a live connection.
    fn ensure_connected(&self) -> ClientResult<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }
        let deadline = StdInstant::now() + self.timeout.as_std();
        loop {
            if self.connected.load(Ordering::Acquire) {
                return Ok(());
            }
            if StdInstant::now() >= deadline {
                return Err(ClientError::ConnectTimeout(self.addr));
            }
            thread::sleep(StdDuration::from_millis(CONNECT_BACKOFF_MS));
        }
    }

    /// Fire-and-forget send: used by publish and subscribe/unsubscribe,
    /// which never read a reply.
    pub fn call_one_way(&self, protocol: &str, kind: Kind, mode: Mode, body: Vec<u8>) -> ClientResult<()> {
        Self::check_size(protocol, &body)?;
        self.ensure_connected()?;
        let frame = RequestFrame { protocol_name: protocol.to_string(), mode, kind, call_id: 0, body };
        let bytes = frame.encode().map_err(|e| ClientError::Deserialize(e.to_string()))?;
        let _ = self.cmd_tx.send(Command::Send(bytes));
        Ok(())
    }

    /// Synchronous RPC: writes a request frame and blocks for the
    /// matching response, up to `timeout`.
    pub fn call_two_way(&self, protocol: &str, mode: Mode, body: Vec<u8>) -> ClientResult<Vec<u8>> {
        if self.is_subscriber_tainted() {
            return Err(ClientError::KindConflict);
        }
        Self::check_size(protocol, &body)?;
        self.ensure_connected()?;

        let call_id = self.next_call_id();
        let frame =
            RequestFrame { protocol_name: protocol.to_string(), mode, kind: Kind::Rpc, call_id, body };
        let bytes = frame.encode().map_err(|e| ClientError::Deserialize(e.to_string()))?;

        let (tx, rx) = crossbeam_channel::bounded(1);
        let completion: Completion = Box::new(move |res| {
            let _ = tx.send(res);
        });
        let _ = self.cmd_tx.send(Command::SendWithCompletion { call_id, bytes, completion });

        match rx.recv_timeout(self.timeout.as_std()) {
            Ok(res) => res,
            Err(_) => {
                let _ = self.cmd_tx.send(Command::ForceDisconnect);
                Err(ClientError::ReadTimeout)
            }
        }
    }

    /// Async RPC: `continuation` runs on the background I/O thread once
    /// the response arrives, the call fails, or the connection drops.
    pub fn async_call<F>(&self, protocol: &str, mode: Mode, body: Vec<u8>, continuation: F) -> ClientResult<()>
    where
        F: FnOnce(ClientResult<Vec<u8>>) + Send + 'static,
    {
        if self.is_subscriber_tainted() {
            return Err(ClientError::KindConflict);
        }
        Self::check_size(protocol, &body)?;
        self.ensure_connected()?;

        let call_id = self.next_call_id();
        let frame =
            RequestFrame { protocol_name: protocol.to_string(), mode, kind: Kind::Rpc, call_id, body };
        let bytes = frame.encode().map_err(|e| ClientError::Deserialize(e.to_string()))?;
        let _ = self.cmd_tx.send(Command::SendWithCompletion {
            call_id,
            bytes,
            completion: Box::new(continuation),
        });
        Ok(())
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    addr: SocketAddr,
    cmd_rx: crossbeam_channel::Receiver<Command>,
    connected: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    in_flight: Arc<Mutex<HashMap<u64, Completion>>>,
    on_push: Option<Arc<dyn Fn(&str, &[u8]) + Send + Sync>>,
    resend_on_reconnect: Arc<dyn Fn() -> Vec<Vec<u8>> + Send + Sync>,
) {
    let mut connector = TcpConnector::default().with_reconnect_interval(Duration::from_millis(CONNECT_BACKOFF_MS));
    let mut current_token = connector.connect(addr);

    while !stop.load(Ordering::Relaxed) {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::Send(bytes) => {
                    if let Some(tok) = current_token {
                        connector
                            .write_or_enqueue_with(SendBehavior::Single(tok), move |buf| buf.extend_from_slice(&bytes));
                    }
                }
                Command::SendWithCompletion { call_id, bytes, completion } => {
                    if let Some(tok) = current_token {
                        in_flight.lock().insert(call_id, completion);
                        connector
                            .write_or_enqueue_with(SendBehavior::Single(tok), move |buf| buf.extend_from_slice(&bytes));
                    } else {
                        completion(Err(ClientError::Io("not connected".into())));
                    }
                }
                Command::ForceDisconnect => {
                    if let Some(tok) = current_token {
                        connector.disconnect(tok);
                    }
                    current_token = None;
                    connected.store(false, Ordering::Release);
                    for (_, completion) in in_flight.lock().drain() {
                        completion(Err(ClientError::Io("connection reset".into())));
                    }
                }
            }
        }

        let mut pending_resends: Vec<Vec<u8>> = Vec::new();
        connector.poll_with(|event| match event {
            PollEvent::Accept { stream, .. } => {
                current_token = Some(stream);
                connected.store(true, Ordering::Release);
                pending_resends = resend_on_reconnect();
            }
            PollEvent::Disconnect { .. } => {
                connected.store(false, Ordering::Release);
                for (_, completion) in in_flight.lock().drain() {
                    completion(Err(ClientError::Io("connection lost".into())));
                }
            }
            PollEvent::Message { payload, .. } => route_inbound(payload, &in_flight, on_push.as_deref()),
        });

        for frame in pending_resends.drain(..) {
            if let Some(tok) = current_token {
                connector.write_or_enqueue_with(SendBehavior::Single(tok), move |buf| buf.extend_from_slice(&frame));
            }
        }

        thread::sleep(POLL_TICK);
    }

    if let Some(tok) = current_token {
        connector.disconnect(tok);
    }
}

fn route_inbound(
    payload: &[u8],
    in_flight: &Mutex<HashMap<u64, Completion>>,
    on_push: Option<&(dyn Fn(&str, &[u8]) + Send + Sync)>,
) {
    match on_push {
        Some(cb) => match PushFrame::decode(payload) {
            Ok(push) => cb(&push.topic_name, &push.body),
            Err(err) => warn!(?err, "malformed push frame"),
        },
        None => match ResponseFrame::decode(payload) {
            Ok(resp) => match in_flight.lock().remove(&resp.call_id) {
                Some(completion) => completion(Ok(resp.body)),
                None => debug!(call_id = resp.call_id, "response for unknown or already-completed call"),
            },
            Err(err) => warn!(?err, "malformed response frame"),
        },
    }
}
