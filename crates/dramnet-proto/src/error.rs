//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Frame validation and codec errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Frame is shorter than the fixed header.
    #[error("frame too short: {len} bytes")]
    TooShort { len: usize },

    /// Magic number does not match.
    #[error("bad magic: {0:#010x}")]
    BadMagic(u32),

    /// Message type field is not a known type.
    #[error("unknown message type: {0}")]
    UnknownType(u32),

    /// A response frame arrived where a request was expected, or vice versa.
    #[error("unexpected message type: {0:?}")]
    UnexpectedType(crate::MessageType),

    /// Declared key/value lengths overrun the received frame.
    #[error("declared lengths exceed frame: key={key_len} value={value_len} total={total}")]
    LengthOverflow {
        key_len: u32,
        value_len: u32,
        total: usize,
    },

    /// Payload checksum does not match the header.
    #[error("checksum mismatch: header {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// A read response claims a value larger than the sanity cap.
    #[error("claimed value length {0} exceeds sanity cap")]
    ValueTooLarge(u32),

    /// Encoded frame would exceed the frame size cap.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
}

/// Response status codes.
///
/// `0` is success, `1` is key-not-found (reads only), everything above is
/// reserved for errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    /// Operation succeeded.
    Ok = 0,
    /// Key was not present (read responses only).
    NotFound = 1,
    /// Server-side error.
    Error = 2,
}

impl StatusCode {
    /// Returns the numeric wire value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::NotFound => write!(f, "not_found"),
            Self::Error => write!(f, "error"),
        }
    }
}
