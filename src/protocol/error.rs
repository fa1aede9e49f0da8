use thiserror::Error;

/// A caller passed a value the protocol cannot carry. Raised before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid ambient sound level {0}, must be 0-19")]
    AmbientLevelOutOfRange(i32),

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLong { len: usize, max: usize },
}

/// Malformed bytes received from the device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("no start marker in input")]
    NoStartMarker,

    #[error("frame truncated before its end marker")]
    Truncated,

    #[error("checksum mismatch: computed 0x{computed:02X}, frame carries 0x{received:02X}")]
    ChecksumMismatch { computed: u8, received: u8 },

    #[error("invalid escape sequence 0x3D 0x{0:02X}")]
    InvalidEscape(u8),

    #[error("length field says {declared} payload bytes, frame holds {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    #[error("frame exceeds {max} bytes without an end marker")]
    Oversized { max: usize },
}
