//! Worker-pool-facing dispatch logic: decides, for each decoded request
//! frame, whether to invoke the router, update the topic registry, or fan
//! a publish out to subscribers. Runs off the I/O loop threads so a slow
//! handler never blocks socket reads.

use std::sync::Arc;

use parking_lot::RwLock;
use slotmap::SlotMap;
use tracing::warn;
use triplex_net::tcp::frame::{HEARTBEAT_PROTOCOL, Kind, Mode, RequestFrame, SUBSCRIBE_BODY, UNSUBSCRIBE_BODY};

use crate::connection::{ConnHandle, SharedConnection};
use crate::error::ServerError;
use crate::router::Router;
use crate::topic::TopicManager;

pub(crate) struct Shared {
    pub router: Arc<Router>,
    pub topics: Arc<TopicManager>,
    pub conns: RwLock<SlotMap<ConnHandle, SharedConnection>>,
}

impl Shared {
    pub fn new(router: Arc<Router>, topics: Arc<TopicManager>) -> Self {
        Self { router, topics, conns: RwLock::new(SlotMap::with_key()) }
    }

    pub fn insert(&self, conn: SharedConnection) -> ConnHandle {
        self.conns.write().insert(conn)
    }

    pub fn resolve(&self, handle: ConnHandle) -> Option<SharedConnection> {
        self.conns.read().get(handle).cloned()
    }

    /// Removes `handle` from the arena, shuts its socket down, and — if it
    /// was ever subscriber-tainted — evicts it from every topic.
    pub fn disconnect(&self, handle: ConnHandle) {
        let conn = self.conns.write().remove(handle);
        if let Some(conn) = conn {
            conn.shutdown();
            if conn.is_subscriber_tainted() {
                self.topics.remove_all_topic(handle);
            }
        }
    }

    fn fanout(&self, topic: &str, body: &[u8], mode: Mode) {
        for handle in self.topics.get_connections(topic) {
            match self.resolve(handle) {
                Some(conn) => {
                    if conn.write_push(topic, body.to_vec(), mode).is_err() {
                        self.disconnect(handle);
                    }
                }
                None => self.topics.remove_topic(topic, handle),
            }
        }
    }
}

/// One decoded request frame awaiting dispatch, queued from an I/O loop
/// thread onto the worker pool.
pub(crate) struct Job {
    pub conn: ConnHandle,
    pub frame: RequestFrame,
}

pub(crate) fn process_job(shared: &Shared, job: Job) {
    let Job { conn: handle, frame } = job;
    let Some(conn) = shared.resolve(handle) else { return };

    match frame.kind {
        Kind::Rpc => {
            if conn.is_subscriber_tainted() {
                warn!(protocol = %frame.protocol_name, "rejecting rpc call on subscriber-tainted connection");
                let _ = conn.write_response(frame.call_id, Vec::new());
                return;
            }

            let raw = matches!(frame.mode, Mode::NonSerialize);
            match shared.router.dispatch_rpc(&frame.protocol_name, &frame.body, raw) {
                Ok(body) => {
                    let _ = conn.write_response(frame.call_id, body);
                }
                Err(ServerError::HandlerRaised(name, err)) => {
                    warn!(protocol = %name, %err, "handler raised an error, replying empty");
                    let _ = conn.write_response(frame.call_id, Vec::new());
                }
                Err(err) => {
                    warn!(protocol = %frame.protocol_name, %err, "rpc dispatch failed, disconnecting");
                    shared.disconnect(handle);
                }
            }
        }

        Kind::Publisher => {
            shared.router.dispatch_publish(&frame.protocol_name, &frame.body);
            shared.fanout(&frame.protocol_name, &frame.body, frame.mode);
        }

        Kind::Subscriber => {
            conn.mark_subscriber_tainted();
            if frame.protocol_name == HEARTBEAT_PROTOCOL {
                return;
            }

            let subscribe = frame.body == SUBSCRIBE_BODY;
            if subscribe {
                shared.topics.add_topic(&frame.protocol_name, handle);
            } else if frame.body == UNSUBSCRIBE_BODY {
                shared.topics.remove_topic(&frame.protocol_name, handle);
            } else {
                warn!(topic = %frame.protocol_name, "ignoring unrecognised subscriber frame body");
                return;
            }
            shared.router.dispatch_subscribe(&frame.protocol_name, &frame.body, handle, subscribe);
        }
    }
}
