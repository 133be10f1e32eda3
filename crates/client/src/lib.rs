//! Client side of the message-oriented middleware: typed RPC calls,
//! fire-and-forget publish, and topic subscribe/push, each over a lazily
//! (re)connected TCP session.

mod config;
mod error;
mod publisher;
mod rpc;
mod session;
mod subscriber;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use publisher::PublisherClient;
pub use rpc::RpcClient;
pub use subscriber::SubscriberClient;
