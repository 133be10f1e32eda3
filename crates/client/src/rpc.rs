use std::net::SocketAddr;

use triplex_net::tcp::frame::Mode;
use triplex_timing::Duration;
use wincode::{SchemaRead, SchemaWrite};

use crate::error::{ClientError, ClientResult};
use crate::session::Session;

/// Typed RPC client. Each instance owns one connection; two-way calls
/// block the caller thread for a matching response, async calls run
/// their continuation on the client's background I/O thread.
pub struct RpcClient {
    session: Session,
}

impl RpcClient {
    pub fn connect(endpoint: SocketAddr) -> Self {
        Self::connect_with_timeout(endpoint, Duration::from_secs(5))
    }

    pub fn connect_with_timeout(endpoint: SocketAddr, timeout: Duration) -> Self {
        let session = Session::start(endpoint, timeout, None, std::sync::Arc::new(Vec::<Vec<u8>>::new));
        Self { session }
    }

    /// Typed two-way call: serializes `args`, writes a request frame,
    /// blocks for the matching response, then deserializes it as `R`.
    pub fn call<A, R>(&self, protocol: &str, args: A) -> ClientResult<R>
    where
        A: SchemaWrite,
        R: SchemaRead,
    {
        let body = wincode::serialize(&args).map_err(|e| ClientError::Deserialize(e.to_string()))?;
        let bytes = self.session.call_two_way(protocol, Mode::Serialize, body)?;
        wincode::deserialize(&bytes).map_err(|e| ClientError::Deserialize(e.to_string()))
    }

    /// Raw two-way call, bypassing (de)serialization in both directions.
    pub fn call_raw(&self, protocol: &str, body: Vec<u8>) -> ClientResult<Vec<u8>> {
        self.session.call_two_way(protocol, Mode::NonSerialize, body)
    }

    /// Typed async call: `continuation` runs on the background I/O
    /// thread once the response arrives, the call fails, or the
    /// connection drops before it completes.
    pub fn async_call<A, R, F>(&self, protocol: &str, args: A, continuation: F) -> ClientResult<()>
    where
        A: SchemaWrite,
        R: SchemaRead + Send + 'static,
        F: FnOnce(ClientResult<R>) + Send + 'static,
    {
        let body = wincode::serialize(&args).map_err(|e| ClientError::Deserialize(e.to_string()))?;
        self.session.async_call(protocol, Mode::Serialize, body, move |res| {
            continuation(res.and_then(|bytes| {
                wincode::deserialize(&bytes).map_err(|e| ClientError::Deserialize(e.to_string()))
            }));
        })
    }

    /// Raw async call, bypassing (de)serialization.
    pub fn async_call_raw<F>(&self, protocol: &str, body: Vec<u8>, continuation: F) -> ClientResult<()>
    where
        F: FnOnce(ClientResult<Vec<u8>>) + Send + 'static,
    {
        self.session.async_call(protocol, Mode::NonSerialize, body, continuation)
    }

    pub fn stop(&self) {
        self.session.stop();
    }
}
