//! Wire-protocol codec and broadcast socket abstraction.
//!
//! The wire format is a sequence of instructions, each a comma-separated
//! list of length-prefixed fields terminated by `;`. A field is rendered
//! as `<codepoint-count>.<utf8-payload>`; binary payloads are base64
//! wrapped before being rendered as a field. This crate only knows about
//! bytes and strings — it has no notion of layers, surfaces, or users;
//! those live in `gw-display` and `gw-session`, which build instructions
//! out of the [`FieldValue`]/[`InstructionBuilder`] primitives here.

mod base64;
mod constants;
mod field;
mod instruction;
mod opcode;
mod socket;
mod stream_pool;

pub use base64::{decode, encode};
pub use constants::{CompositeMode, ProtocolStatus, ProtocolVersion, TransferFunction};
pub use field::{format_double, FieldValue};
pub use instruction::{Instruction, InstructionBuilder, ParseError};
pub use opcode::{ClientOpcode, ServerOpcode};
pub use socket::{BroadcastSocket, MutexSocket, Socket};
pub use stream_pool::StreamPool;
