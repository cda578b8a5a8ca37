use thiserror::Error as ThisError;

/// An error message carried in a DAP response, or delivered through a
/// [`ResponseFuture`](crate::future::ResponseFuture) when a request could not
/// be completed.
///
/// On the wire this is the `message` field of a `success: false` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct Error {
    pub message: String,
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Error {
            message: message.into(),
        }
    }
}

impl From<SessionError> for Error {
    fn from(err: SessionError) -> Self {
        Error::new(err.to_string())
    }
}

/// Endpoint-level failures surfaced through the session's error handler.
///
/// None of these abort the session except [`SessionError::Closed`]; framing
/// and shape errors are reported and the session keeps consuming the stream.
#[derive(Debug, ThisError)]
pub enum SessionError {
    #[error("failed to parse message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    #[error("discarded {0} unframeable bytes")]
    Unframeable(usize),

    #[error("received message with unknown type '{0}'")]
    UnknownMessageType(String),

    #[error("received request without a command")]
    MissingCommand,

    #[error("no handler registered for command '{0}'")]
    UnknownCommand(String),

    #[error("received response without a request_seq")]
    MissingRequestSeq,

    #[error("received response with unknown request_seq {0}")]
    OrphanResponse(i64),

    #[error("session is already bound")]
    AlreadyBound,

    #[error("session is not bound to a transport")]
    NotBound,

    #[error("transport write failed")]
    WriteFailed,

    #[error("session closed")]
    Closed,
}
