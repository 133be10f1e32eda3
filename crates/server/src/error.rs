use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind { addr: std::net::SocketAddr, #[source] source: io::Error },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("no handler bound for protocol {0:?}")]
    RouterMiss(String),

    #[error("failed to deserialize arguments for protocol {0:?}: {1}")]
    Deserialize(String, String),

    #[error("handler for protocol {0:?} raised an error: {1}")]
    HandlerRaised(String, String),
}

pub type ServerResult<T> = Result<T, ServerError>;
