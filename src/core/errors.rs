use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("handshake failed: {0}")]
    HandshakeError(String),

    #[error("already connected")]
    AlreadyConnected,

    #[error("not connected")]
    NotConnected,

    #[error("remote error: {code} - {message}")]
    RemoteError { code: i64, message: String },

    #[error("configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("other error: {0}")]
    Other(String),
}
