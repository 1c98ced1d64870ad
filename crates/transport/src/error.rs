//! Transport Error Types

use thiserror::Error;

/// Errors raised while opening or reading the event stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered the open request with a non-success status.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection or read failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Connect timed out.
    #[error("Connection timed out")]
    Timeout,

    /// The server closed the stream before a terminal event.
    #[error("Stream ended before the run finished")]
    StreamEnded,

    /// The cancellation token fired while opening.
    #[error("Connection cancelled")]
    Cancelled,

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// What the retry policy needs to know about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 4xx: the request itself was rejected
    ClientRejected(u16),
    /// Any other non-success status
    ServerRejected(u16),
    /// Connection, read, or premature end of stream
    Network,
    /// Local misconfiguration or cancellation; never retried
    Fatal,
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Http { status, .. } if (400..500).contains(status) => {
                ErrorKind::ClientRejected(*status)
            }
            TransportError::Http { status, .. } => ErrorKind::ServerRejected(*status),
            TransportError::Network(_) | TransportError::Timeout | TransportError::StreamEnded => {
                ErrorKind::Network
            }
            TransportError::Cancelled | TransportError::Client(_) => ErrorKind::Fatal,
        }
    }

    /// HTTP status of a rejected open, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Network(format!("Connection failed: {}", err))
        } else if err.is_builder() {
            TransportError::Client(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}
