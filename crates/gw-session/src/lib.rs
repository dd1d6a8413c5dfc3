//! User lifecycle, stream/object tables, and instruction dispatch: the
//! layer above `gw-display` that turns a stream of parsed instructions
//! into display and cursor mutations, per one connected user.

mod client;
mod config;
mod dispatch;
mod error;
mod streams;
mod user;

pub use client::{JoinHandler, JoinPendingCallback, LeaveHandler, Session, UserHandle, ABORT_MESSAGE};
pub use config::SessionConfig;
pub use dispatch::{apply_handshake, parse_steady_state, SteadyStateAction};
pub use error::{DispatchError, SessionError};
pub use streams::{
    is_session_stream, is_user_stream, AckHandler, BlobHandler, EndHandler, GetHandler, ObjectTable, PutHandler,
    SessionStreamTable, StreamTable, MAX_OBJECTS_PER_USER, MAX_STREAMS_PER_USER,
};
pub use user::{ConnectionInfo, TimingStats, User, UserId};
