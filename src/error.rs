use thiserror::Error;

/// Errors that can occur while interacting with a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

/// Errors raised while talking to the origin server.
///
/// Non-2xx origin responses are not errors; they are passed through to the
/// client verbatim. Only transport-level failures land here.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("transport error contacting origin: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for OriginError {
    fn from(err: reqwest::Error) -> Self {
        OriginError::Transport(err.to_string())
    }
}
