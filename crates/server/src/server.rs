//! Top-level facade tying configuration, routing, the topic registry and
//! the I/O pool together into one running server.

use std::sync::Arc;

use wincode::{SchemaRead, SchemaWrite};

use crate::config::ServerConfig;
use crate::connection::ConnHandle;
use crate::dispatch::Shared;
use crate::error::ServerResult;
use crate::io_pool::IoPool;
use crate::router::{Router, TypedHandler};
use crate::topic::TopicManager;

/// A bound server. Dropping this without calling [`Server::stop`] leaves
/// the I/O and worker threads running in the background; `stop` is the
/// only clean shutdown path.
pub struct Server {
    router: Arc<Router>,
    topics: Arc<TopicManager>,
    pool: Option<IoPool>,
}

impl Server {
    /// Binds every endpoint in `config` and starts the I/O and worker
    /// thread pools. Handlers may still be bound or unbound after this
    /// call — the router is consulted fresh on every incoming request.
    pub fn start(config: ServerConfig) -> ServerResult<Self> {
        let router = Arc::new(Router::new());
        let topics = Arc::new(TopicManager::new());
        let shared = Arc::new(Shared::new(router.clone(), topics.clone()));

        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        let pool = IoPool::start(
            config.io_loops,
            config.worker_threads,
            &config.endpoints,
            config.timeout,
            shared,
            job_tx,
            job_rx,
        )?;

        Ok(Self { router, topics, pool: Some(pool) })
    }

    /// Binds a typed RPC handler, e.g. built with [`TypedHandler::value`]
    /// or [`TypedHandler::void`]. Replaces any handler already bound to
    /// `name`.
    pub fn bind(&self, name: impl Into<String>, handler: TypedHandler) {
        self.router.bind(name, handler);
    }

    /// Convenience wrapper around [`Server::bind`] for the common
    /// argument-in, value-out shape.
    pub fn bind_fn<A, R, F>(&self, name: impl Into<String>, f: F)
    where
        A: SchemaRead + 'static,
        R: SchemaWrite + 'static,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        self.router.bind(name, TypedHandler::value(f));
    }

    /// Binds a raw handler that receives and returns opaque bytes,
    /// bypassing typed (de)serialization entirely.
    pub fn bind_raw<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[u8]) -> ServerResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.router.bind_raw(name, handler);
    }

    pub fn unbind(&self, name: &str) {
        self.router.unbind(name);
    }

    pub fn unbind_raw(&self, name: &str) {
        self.router.unbind_raw(name);
    }

    /// Registers a callback invoked for every publish on any topic,
    /// after fan-out to subscribers has already been queued.
    pub fn on_publish<F>(&self, f: F)
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.router.on_publish(f);
    }

    /// Registers a callback invoked on every subscribe/unsubscribe
    /// frame, after the topic registry has already been updated.
    pub fn on_subscribe<F>(&self, f: F)
    where
        F: Fn(&str, &[u8], ConnHandle, bool) + Send + Sync + 'static,
    {
        self.router.on_subscribe(f);
    }

    /// Current subscriber count for `topic`, for diagnostics.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.get_connections(topic).len()
    }

    /// Stops every I/O and worker thread and blocks until they've all
    /// exited. Already-queued jobs are allowed to drain first.
    pub fn stop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.stop_and_join();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}
