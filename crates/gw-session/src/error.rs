/// Errors produced while dispatching an inbound instruction.
///
/// Maps 1:1 to a [`gw_wire::ProtocolStatus`] at the point an `ack`/`error`
/// instruction is emitted; the message text is never surfaced to the
/// wire (see [`crate::client::ABORT_MESSAGE`]).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed instruction: {0}")]
    Malformed(String),
    #[error("stream index out of range")]
    BadStream,
    #[error("capability unsupported")]
    Unsupported,
}

impl DispatchError {
    #[must_use]
    pub fn status(&self) -> gw_wire::ProtocolStatus {
        match self {
            Self::Malformed(_) => gw_wire::ProtocolStatus::ClientBadRequest,
            Self::BadStream => gw_wire::ProtocolStatus::ClientBadRequest,
            Self::Unsupported => gw_wire::ProtocolStatus::Unsupported,
        }
    }
}

/// Errors produced by [`crate::client::Session`] join/leave bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("user {0} is not a member of this session")]
    UnknownUser(crate::user::UserId),
    #[error("join_pending callback rejected the batch: {0}")]
    JoinRejected(String),
}
