//! Server side of the message-oriented middleware: binds listeners,
//! decodes the wire protocol, and dispatches RPC calls, publishes and
//! subscriptions to application-registered handlers.

mod config;
mod connection;
mod dispatch;
mod error;
mod io_pool;
mod router;
mod server;
mod topic;

pub use config::ServerConfig;
pub use connection::ConnHandle;
pub use error::{ServerError, ServerResult};
pub use router::TypedHandler;
pub use server::Server;
