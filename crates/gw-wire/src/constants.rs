/// Porter-Duff-style compositing operator used by `copy`/`transfer`-style
/// instructions that place one layer's pixels onto another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeMode {
    Over,
    Plus,
    Src,
    /// Rect-out: used internally to clear a region's alpha before
    /// compositing an ARGB bitmap into it.
    Rout,
    Atop,
    Xor,
    DestOver,
    DestIn,
    DestOut,
    DestAtop,
    In,
    Out,
    Dest,
    Clear,
}

impl CompositeMode {
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Clear => 0x0,
            Self::In => 0x6,
            Self::Atop => 0xE,
            Self::Xor => 0xA,
            Self::Dest => 0x1,
            Self::Over => 0xB,
            Self::DestOver => 0xD,
            Self::Out => 0x4,
            Self::DestIn => 0x9,
            Self::Plus => 0xC,
            Self::Src => 0x3,
            Self::DestOut => 0x2,
            Self::DestAtop => 0x7,
            Self::Rout => 0x8,
        }
    }
}

/// One of the sixteen fixed per-pixel transfer functions a `transfer`
/// instruction may select. For most of these the destination's alpha
/// channel is preserved; `Src` replaces all four channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TransferFunction {
    Black = 0,
    White = 1,
    Src = 2,
    Dest = 3,
    Nsrc = 4,
    Ndest = 5,
    And = 6,
    Nand = 7,
    Or = 8,
    Nor = 9,
    Xor = 10,
    Xnor = 11,
    NsrcAnd = 12,
    NsrcNand = 13,
    NsrcOr = 14,
    NsrcNor = 15,
}

impl TransferFunction {
    #[must_use]
    pub const fn preserves_destination_alpha(self) -> bool {
        !matches!(self, Self::Src)
    }
}

/// Status codes carried by `ack`/`error` instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ProtocolStatus {
    Success = 0,
    ClientBadRequest = 1,
    ClientForbidden = 2,
    ClientUnauthorized = 3,
    UpstreamNotFound = 4,
    ServerError = 5,
    Unsupported = 6,
    ResourceClosed = 7,
}

/// The protocol version string exchanged as the first field of `args`,
/// e.g. `"VERSION_1_1_0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ProtocolVersion {
    pub const CURRENT: Self = Self { major: 1, minor: 1, patch: 0 };

    /// Parse a string of the form `VERSION_M_N_P`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("VERSION_")?;
        let mut parts = rest.split('_');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { major, minor, patch })
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VERSION_{}_{}_{}", self.major, self.minor, self.patch)
    }
}
