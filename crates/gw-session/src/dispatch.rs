//! Opcode parsing for the handshake and steady-state instruction tables.
//! Parsing is kept pure (no socket/session access) so it can be unit
//! tested directly; [`crate::client::Session`] applies the resulting
//! actions against live state.

use gw_wire::ClientOpcode;

use crate::error::DispatchError;
use crate::user::ConnectionInfo;

fn parse_u32(args: &[String], i: usize) -> Result<u32, DispatchError> {
    args.get(i)
        .ok_or_else(|| DispatchError::Malformed(format!("missing field {i}")))?
        .parse()
        .map_err(|_| DispatchError::Malformed(format!("field {i} is not a valid integer")))
}

fn parse_i32(args: &[String], i: usize) -> Result<i32, DispatchError> {
    args.get(i)
        .ok_or_else(|| DispatchError::Malformed(format!("missing field {i}")))?
        .parse()
        .map_err(|_| DispatchError::Malformed(format!("field {i} is not a valid integer")))
}

fn parse_u64(args: &[String], i: usize) -> Result<u64, DispatchError> {
    args.get(i)
        .ok_or_else(|| DispatchError::Malformed(format!("missing field {i}")))?
        .parse()
        .map_err(|_| DispatchError::Malformed(format!("field {i} is not a valid integer")))
}

/// Apply one handshake-phase instruction (`size`, `audio`, `video`,
/// `image`, `timezone`) to `info`. Any other opcode during the handshake
/// is ignored with a debug log.
pub fn apply_handshake(info: &mut ConnectionInfo, opcode: ClientOpcode, args: &[String]) -> Result<(), DispatchError> {
    match opcode {
        ClientOpcode::Size => {
            info.optimal_width = parse_u32(args, 0)?;
            info.optimal_height = parse_u32(args, 1)?;
            info.optimal_dpi = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(96);
        }
        ClientOpcode::Audio => {
            info.audio_mimetypes = args.to_vec();
        }
        ClientOpcode::Video => {
            info.video_mimetypes = args.to_vec();
        }
        ClientOpcode::Image => {
            info.image_mimetypes = args.to_vec();
        }
        ClientOpcode::Timezone => {
            info.timezone = args.first().cloned();
        }
        other => {
            tracing::debug!(opcode = other.as_str(), "ignoring non-handshake opcode during handshake");
        }
    }
    Ok(())
}

/// The effect a steady-state instruction should have, decoupled from how
/// it is applied to live session state.
#[derive(Debug, Clone, PartialEq)]
pub enum SteadyStateAction {
    Sync { timestamp_ms: u64 },
    Mouse { x: i32, y: i32, mask: u8 },
    Ack { stream: i32, message: String, status: u32 },
    Blob { stream: i32, data: Vec<u8> },
    End { stream: i32 },
    Disconnect,
    /// Recognized but not part of the core's state machines (key,
    /// clipboard, file, pipe, get, put, argv, nop) — left for an external
    /// protocol adapter to handle, or harmlessly ignored.
    Ignored,
}

/// Parse one steady-state instruction's argument list into an action.
pub fn parse_steady_state(opcode: ClientOpcode, args: &[String]) -> Result<SteadyStateAction, DispatchError> {
    match opcode {
        ClientOpcode::Sync => Ok(SteadyStateAction::Sync { timestamp_ms: parse_u64(args, 0)? }),
        ClientOpcode::Mouse => Ok(SteadyStateAction::Mouse {
            x: parse_i32(args, 0)?,
            y: parse_i32(args, 1)?,
            mask: args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0),
        }),
        ClientOpcode::Ack => Ok(SteadyStateAction::Ack {
            stream: parse_i32(args, 0)?,
            message: args.get(1).cloned().unwrap_or_default(),
            status: args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0),
        }),
        ClientOpcode::Blob => {
            let stream = parse_i32(args, 0)?;
            let data = args.get(1).map(|s| gw_wire::decode(s)).unwrap_or_default();
            Ok(SteadyStateAction::Blob { stream, data })
        }
        ClientOpcode::End => Ok(SteadyStateAction::End { stream: parse_i32(args, 0)? }),
        ClientOpcode::Disconnect => Ok(SteadyStateAction::Disconnect),
        _ => Ok(SteadyStateAction::Ignored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_size_populates_optimal_dimensions() {
        let mut info = ConnectionInfo::default();
        apply_handshake(&mut info, ClientOpcode::Size, &["1920".to_string(), "1080".to_string(), "120".to_string()]).unwrap();
        assert_eq!(info.optimal_width, 1920);
        assert_eq!(info.optimal_height, 1080);
        assert_eq!(info.optimal_dpi, 120);
    }

    #[test]
    fn handshake_size_defaults_dpi_when_missing() {
        let mut info = ConnectionInfo::default();
        apply_handshake(&mut info, ClientOpcode::Size, &["800".to_string(), "600".to_string()]).unwrap();
        assert_eq!(info.optimal_dpi, 96);
    }

    #[test]
    fn handshake_ignores_non_handshake_opcode() {
        let mut info = ConnectionInfo::default();
        assert!(apply_handshake(&mut info, ClientOpcode::Mouse, &[]).is_ok());
        assert_eq!(info.optimal_width, 0);
    }

    #[test]
    fn steady_state_parses_sync() {
        let action = parse_steady_state(ClientOpcode::Sync, &["12345".to_string()]).unwrap();
        assert_eq!(action, SteadyStateAction::Sync { timestamp_ms: 12345 });
    }

    #[test]
    fn steady_state_rejects_malformed_mouse() {
        assert!(parse_steady_state(ClientOpcode::Mouse, &["not-a-number".to_string()]).is_err());
    }

    #[test]
    fn steady_state_other_opcodes_are_ignored() {
        assert_eq!(parse_steady_state(ClientOpcode::Key, &[]).unwrap(), SteadyStateAction::Ignored);
    }
}
