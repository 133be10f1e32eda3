use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::warn;
use triplex_net::tcp::frame::{HEARTBEAT_PROTOCOL, Kind, Mode, RequestFrame, SUBSCRIBE_BODY, UNSUBSCRIBE_BODY};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::session::Session;

type TopicHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Subscriber client: subscribes to named topics, runs a background
/// push-reader (via the session's I/O thread) that routes incoming push
/// frames to the bound handler, and a separate heartbeat thread that
/// keeps the connection alive and detectable as dead from this side.
///
/// On reconnect, every topic still present in the local handler table is
/// re-subscribed before any new work is accepted.
pub struct SubscriberClient {
    session: Arc<Session>,
    handlers: Arc<Mutex<HashMap<String, TopicHandler>>>,
    heartbeat_stop: Arc<AtomicBool>,
    heartbeat_handle: StdMutex<Option<JoinHandle<()>>>,
}

impl SubscriberClient {
    pub fn connect(endpoint: SocketAddr) -> Self {
        Self::connect_with_config(ClientConfig::new(endpoint))
    }

    pub fn connect_with_config(config: ClientConfig) -> Self {
        let handlers: Arc<Mutex<HashMap<String, TopicHandler>>> = Arc::new(Mutex::new(HashMap::new()));

        let push_handlers = handlers.clone();
        let on_push: Arc<dyn Fn(&str, &[u8]) + Send + Sync> = Arc::new(move |topic, body| {
            let table = push_handlers.lock();
            match table.get(topic) {
                Some(handler) => handler(body),
                None => warn!(topic, "push for topic with no bound handler, dropping"),
            }
        });

        let resend_handlers = handlers.clone();
        let resend_on_reconnect: Arc<dyn Fn() -> Vec<Vec<u8>> + Send + Sync> = Arc::new(move || {
            resend_handlers
                .lock()
                .keys()
                .filter_map(|topic| {
                    RequestFrame {
                        protocol_name: topic.clone(),
                        mode: Mode::Serialize,
                        kind: Kind::Subscriber,
                        call_id: 0,
                        body: SUBSCRIBE_BODY.to_vec(),
                    }
                    .encode()
                    .ok()
                })
                .collect()
        });

        let session = Arc::new(Session::start(config.endpoint, config.timeout, Some(on_push), resend_on_reconnect));
        session.mark_subscriber_tainted();

        let heartbeat_stop = Arc::new(AtomicBool::new(false));
        let hb_session = session.clone();
        let hb_stop = heartbeat_stop.clone();
        let heartbeat_interval = config.heartbeat_interval.as_std();
        let heartbeat_handle = thread::Builder::new()
            .name("triplex-client-heartbeat".into())
            .spawn(move || {
                while !hb_stop.load(Ordering::Relaxed) {
                    thread::sleep(heartbeat_interval);
                    if hb_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let _ = hb_session.call_one_way(HEARTBEAT_PROTOCOL, Kind::Subscriber, Mode::Serialize, Vec::new());
                }
            })
            .expect("failed to spawn heartbeat thread");

        Self {
            session,
            handlers,
            heartbeat_stop,
            heartbeat_handle: StdMutex::new(Some(heartbeat_handle)),
        }
    }

    /// Subscribes to `topic`, binding `handler` to run (on the session's
    /// I/O thread) for every push frame delivered on it.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> ClientResult<()>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.handlers.lock().insert(topic.to_string(), Box::new(handler));
        self.session.call_one_way(topic, Kind::Subscriber, Mode::Serialize, SUBSCRIBE_BODY.to_vec())
    }

    /// Unsubscribes from `topic` and removes its local handler.
    pub fn unsubscribe(&self, topic: &str) -> ClientResult<()> {
        self.handlers.lock().remove(topic);
        self.session.call_one_way(topic, Kind::Subscriber, Mode::Serialize, UNSUBSCRIBE_BODY.to_vec())
    }

    pub fn stop(&self) {
        self.heartbeat_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.heartbeat_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.session.stop();
    }
}

impl Drop for SubscriberClient {
    fn drop(&mut self) {
        self.stop();
    }
}
