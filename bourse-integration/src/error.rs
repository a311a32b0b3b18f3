use smol_str::SmolStr;
use thiserror::Error;

/// All socket IO related errors generated in `bourse-integration`.
#[derive(Debug, Error)]
pub enum SocketError {
    /// A send or receive ran past its deadline. Recoverable: the owning loop
    /// may retry.
    #[error("socket operation timed out")]
    Timeout,

    /// The peer went away or the socket was shut. Fatal to the owning loop.
    #[error("socket closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("failed to bind {addr}: {error}")]
    Bind { addr: String, error: std::io::Error },

    #[error("failed to dial {addr}: {error}")]
    Dial { addr: String, error: std::io::Error },

    #[error("deserialising JSON error: {error} for payload: {payload}")]
    Deserialise {
        error: serde_json::Error,
        payload: String,
    },

    #[error("serialising JSON error: {0}")]
    Serialise(serde_json::Error),

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// A survey closed with fewer responses than respondents surveyed.
    #[error("survey {task} received {received} of {expected} responses")]
    Survey {
        task: SmolStr,
        expected: usize,
        received: usize,
    },
}

impl SocketError {
    /// Collapse transport-level disconnect flavours into [`SocketError::Closed`].
    pub(crate) fn from_io(error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => Self::Closed,
            _ => Self::Io(error),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Route table configuration errors. Registering a duplicate task is a
/// programming error and fatal at startup.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RouterError {
    #[error("task {0} already registered")]
    TaskAlreadyExists(SmolStr),
}
