//! Crate-wide error type.
//!
//! Mirrors the error taxonomy of the specification: configuration and
//! resource-acquisition failures abort startup (`Config` / `Io`), transient
//! transport failures end a single session or the client's `run` call
//! (`Io`), and malformed input is never represented here at all — it is
//! logged and discarded at the point of detection, never raised.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tun device error: {0}")]
    Tun(String),

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("transport closed")]
    TransportClosed,
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Config(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Config(msg.to_string())
    }
}
