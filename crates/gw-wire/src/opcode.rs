/// Instructions emitted by the core toward users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
    Size,
    Dispose,
    Move,
    Shade,
    Set,
    Copy,
    Transfer,
    Img,
    Blob,
    End,
    Cursor,
    Mouse,
    Sync,
    Rect,
    Cfill,
    Required,
    Msg,
    Error,
    Ready,
    Ack,
    Args,
    Log,
}

impl ServerOpcode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Dispose => "dispose",
            Self::Move => "move",
            Self::Shade => "shade",
            Self::Set => "set",
            Self::Copy => "copy",
            Self::Transfer => "transfer",
            Self::Img => "img",
            Self::Blob => "blob",
            Self::End => "end",
            Self::Cursor => "cursor",
            Self::Mouse => "mouse",
            Self::Sync => "sync",
            Self::Rect => "rect",
            Self::Cfill => "cfill",
            Self::Required => "required",
            Self::Msg => "msg",
            Self::Error => "error",
            Self::Ready => "ready",
            Self::Ack => "ack",
            Self::Args => "args",
            Self::Log => "log",
        }
    }
}

impl std::fmt::Display for ServerOpcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instructions accepted from users, including the handshake-only
/// opcodes (`audio`, `video`, `image`, `timezone`, which are only valid
/// before a user is promoted to active).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    Sync,
    Mouse,
    Key,
    Clipboard,
    Disconnect,
    Size,
    File,
    Pipe,
    Ack,
    Blob,
    End,
    Get,
    Put,
    Audio,
    Argv,
    Nop,
    Video,
    Image,
    Timezone,
}

impl ClientOpcode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Mouse => "mouse",
            Self::Key => "key",
            Self::Clipboard => "clipboard",
            Self::Disconnect => "disconnect",
            Self::Size => "size",
            Self::File => "file",
            Self::Pipe => "pipe",
            Self::Ack => "ack",
            Self::Blob => "blob",
            Self::End => "end",
            Self::Get => "get",
            Self::Put => "put",
            Self::Audio => "audio",
            Self::Argv => "argv",
            Self::Nop => "nop",
            Self::Video => "video",
            Self::Image => "image",
            Self::Timezone => "timezone",
        }
    }

    #[must_use]
    pub fn parse(opcode: &str) -> Option<Self> {
        Some(match opcode {
            "sync" => Self::Sync,
            "mouse" => Self::Mouse,
            "key" => Self::Key,
            "clipboard" => Self::Clipboard,
            "disconnect" => Self::Disconnect,
            "size" => Self::Size,
            "file" => Self::File,
            "pipe" => Self::Pipe,
            "ack" => Self::Ack,
            "blob" => Self::Blob,
            "end" => Self::End,
            "get" => Self::Get,
            "put" => Self::Put,
            "audio" => Self::Audio,
            "argv" => Self::Argv,
            "nop" => Self::Nop,
            "video" => Self::Video,
            "image" => Self::Image,
            "timezone" => Self::Timezone,
            _ => return None,
        })
    }

    /// Whether this opcode is only valid during the pre-active handshake.
    #[must_use]
    pub const fn is_handshake_only(self) -> bool {
        matches!(self, Self::Audio | Self::Video | Self::Image | Self::Timezone)
    }
}
