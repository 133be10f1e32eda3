//! Protocol-name -> handler dispatch.
//!
//! The original template-specialized RPC surface (one monomorphized
//! dispatch per call site) is re-expressed here as an explicit sum type:
//! a bound handler either returns nothing (`Void`) or returns a value
//! that gets serialized into the response body (`Value`). Both variants
//! are type-erased behind a boxed closure that only ever moves bytes, so
//! the router itself stays non-generic.

use std::collections::HashMap;

use parking_lot::RwLock;
use wincode::{SchemaRead, SchemaWrite};

use crate::connection::ConnHandle;
use crate::error::{ServerError, ServerResult};

pub type RawVoidHandler = Box<dyn Fn(&[u8]) -> ServerResult<()> + Send + Sync>;
pub type RawValueHandler = Box<dyn Fn(&[u8]) -> ServerResult<Vec<u8>> + Send + Sync>;

/// A bound RPC handler: either it returns nothing, or it returns a value
/// that must be serialized into the response body.
pub enum TypedHandler {
    Void(Box<dyn Fn(&[u8]) -> ServerResult<()> + Send + Sync>),
    Value(Box<dyn Fn(&[u8]) -> ServerResult<Vec<u8>> + Send + Sync>),
}

impl TypedHandler {
    /// Wraps a nullary-argument, nullary-return function as a typed
    /// handler. Argument bytes are ignored.
    pub fn nullary<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        TypedHandler::Void(Box::new(move |_bytes| {
            f();
            Ok(())
        }))
    }

    /// Wraps `f: A -> R` as a typed handler: `A` is decoded from the
    /// request body, `R` is encoded into the response body.
    pub fn value<A, R, F>(f: F) -> Self
    where
        A: SchemaRead + 'static,
        R: SchemaWrite + 'static,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        TypedHandler::Value(Box::new(move |bytes| {
            let args: A = wincode::deserialize(bytes)
                .map_err(|e| ServerError::Deserialize("<typed>".into(), e.to_string()))?;
            let ret = f(args);
            wincode::serialize(&ret)
                .map_err(|e| ServerError::HandlerRaised("<typed>".into(), e.to_string()))
        }))
    }

    /// Wraps `f: A -> ()` as a typed handler: `A` is decoded from the
    /// request body, no response body is produced.
    pub fn void<A, F>(f: F) -> Self
    where
        A: SchemaRead + 'static,
        F: Fn(A) + Send + Sync + 'static,
    {
        TypedHandler::Void(Box::new(move |bytes| {
            let args: A = wincode::deserialize(bytes)
                .map_err(|e| ServerError::Deserialize("<typed>".into(), e.to_string()))?;
            f(args);
            Ok(())
        }))
    }

    fn invoke(&self, body: &[u8]) -> ServerResult<Vec<u8>> {
        match self {
            TypedHandler::Void(f) => {
                f(body)?;
                Ok(Vec::new())
            }
            TypedHandler::Value(f) => f(body),
        }
    }
}

type PublisherCallback = Box<dyn Fn(&str, &[u8]) + Send + Sync>;
type SubscriberCallback = Box<dyn Fn(&str, &[u8], ConnHandle, bool) + Send + Sync>;

/// Owned by the [`crate::server::Server`] — never a process-wide
/// singleton. Multiple independent servers in one process each get
/// their own router.
#[derive(Default)]
pub struct Router {
    typed: RwLock<HashMap<String, TypedHandler>>,
    raw: RwLock<HashMap<String, RawValueHandler>>,
    on_publisher: RwLock<Option<PublisherCallback>>,
    on_subscriber: RwLock<Option<SubscriberCallback>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, name: impl Into<String>, handler: TypedHandler) {
        self.typed.write().insert(name.into(), handler);
    }

    pub fn bind_raw<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[u8]) -> ServerResult<Vec<u8>> + Send + Sync + 'static,
    {
        self.raw.write().insert(name.into(), Box::new(handler));
    }

    pub fn unbind(&self, name: &str) {
        self.typed.write().remove(name);
    }

    pub fn unbind_raw(&self, name: &str) {
        self.raw.write().remove(name);
    }

    pub fn is_bind(&self, name: &str) -> bool {
        self.typed.read().contains_key(name)
    }

    pub fn is_bind_raw(&self, name: &str) -> bool {
        self.raw.read().contains_key(name)
    }

    pub fn on_publish<F>(&self, f: F)
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        *self.on_publisher.write() = Some(Box::new(f));
    }

    pub fn on_subscribe<F>(&self, f: F)
    where
        F: Fn(&str, &[u8], ConnHandle, bool) + Send + Sync + 'static,
    {
        *self.on_subscriber.write() = Some(Box::new(f));
    }

    /// Looks up and invokes the handler for an RPC request.
    pub fn dispatch_rpc(&self, name: &str, body: &[u8], raw: bool) -> ServerResult<Vec<u8>> {
        if raw {
            let table = self.raw.read();
            let handler = table.get(name).ok_or_else(|| ServerError::RouterMiss(name.to_string()))?;
            handler(body)
        } else {
            let table = self.typed.read();
            let handler = table.get(name).ok_or_else(|| ServerError::RouterMiss(name.to_string()))?;
            handler.invoke(body)
        }
    }

    /// `true` if publish was routed to a registered callback.
    pub fn dispatch_publish(&self, topic: &str, body: &[u8]) -> bool {
        if let Some(cb) = self.on_publisher.read().as_ref() {
            cb(topic, body);
            true
        } else {
            false
        }
    }

    /// `subscribe` is `true` for the `"1"` body, `false` for `"0"`. Returns
    /// `true` if the request was routed to a registered callback.
    pub fn dispatch_subscribe(&self, topic: &str, body: &[u8], conn: ConnHandle, subscribe: bool) -> bool {
        if let Some(cb) = self.on_subscriber.read().as_ref() {
            cb(topic, body, conn, subscribe);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_unbind_is_idempotent() {
        let router = Router::new();
        router.bind("echo", TypedHandler::nullary(|| {}));
        assert!(router.is_bind("echo"));
        router.bind("echo", TypedHandler::nullary(|| {}));
        assert!(router.is_bind("echo"));
        router.unbind("echo");
        assert!(!router.is_bind("echo"));
        router.unbind("echo");
        assert!(!router.is_bind("echo"));
    }

    #[test]
    fn router_miss_on_unbound_name() {
        let router = Router::new();
        assert!(router.dispatch_rpc("missing", &[], false).is_err());
    }
}
