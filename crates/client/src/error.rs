use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid address {0:?}: {1}")]
    AddressFormat(String, String),

    #[error("timed out connecting to {0}")]
    ConnectTimeout(SocketAddr),

    #[error("frame for protocol {protocol:?} is {size} bytes, exceeds max_buffer_len")]
    SendTooLarge { protocol: String, size: usize },

    #[error("io error: {0}")]
    Io(String),

    #[error("timed out waiting for a response")]
    ReadTimeout,

    #[error("call attempted on a subscriber-tainted connection")]
    KindConflict,

    #[error("failed to (de)serialize message body: {0}")]
    Deserialize(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
