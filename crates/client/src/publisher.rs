use std::net::SocketAddr;

use triplex_net::tcp::frame::{Kind, Mode};
use triplex_timing::Duration;
use wincode::SchemaWrite;

use crate::error::{ClientError, ClientResult};
use crate::session::Session;

/// Fire-and-forget publisher. No reply is expected or read for any
/// publish; fan-out to subscribers happens entirely on the server.
pub struct PublisherClient {
    session: Session,
}

impl PublisherClient {
    pub fn connect(endpoint: SocketAddr) -> Self {
        Self::connect_with_timeout(endpoint, Duration::from_secs(5))
    }

    pub fn connect_with_timeout(endpoint: SocketAddr, timeout: Duration) -> Self {
        let session = Session::start(endpoint, timeout, None, std::sync::Arc::new(Vec::<Vec<u8>>::new));
        Self { session }
    }

    /// Typed publish: serializes `args` and writes it to `topic`.
    pub fn publish<A: SchemaWrite>(&self, topic: &str, args: A) -> ClientResult<()> {
        let body = wincode::serialize(&args).map_err(|e| ClientError::Deserialize(e.to_string()))?;
        self.session.call_one_way(topic, Kind::Publisher, Mode::Serialize, body)
    }

    /// Raw publish, bypassing serialization.
    pub fn publish_raw(&self, topic: &str, body: Vec<u8>) -> ClientResult<()> {
        self.session.call_one_way(topic, Kind::Publisher, Mode::NonSerialize, body)
    }

    pub fn stop(&self) {
        self.session.stop();
    }
}
