//! Wire protocol for dramnet client/server communication.
//!
//! Every message is a single tagged frame: a fixed 28-byte packed header
//! followed by the key bytes and then the value bytes. Responses extend the
//! header with a status code.
//!
//! # Wire Format
//!
//! All fields are little-endian:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                Message Header (28 bytes)                  │
//! ├────────────┬──────────┬───────────┬───────────┬──────────┤
//! │ magic (4)  │ type (4) │ key_len(4)│ val_len(4)│ id (8)   │
//! ├────────────┴──────────┴───────────┴───────────┼──────────┤
//! │                                               │ cksum (4)│
//! ├───────────────────────────────────────────────┴──────────┤
//! │          key_length key bytes ‖ value_length value bytes  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Responses carry a `u32` status code at offset 28 (0 = ok, 1 = key not
//! found, anything above is an error); a read response is then followed by
//! `value_length` bytes of value.
//!
//! The checksum is a rolling `(c << 1) ^ byte` over the payload bytes. It is
//! a corruption tripwire, not an authenticator.

mod error;
mod frame;

pub use error::{FrameError, StatusCode};
pub use frame::{
    checksum, decode_read_response, decode_request, decode_write_response, encode_read_request,
    encode_read_response, encode_write_request, encode_write_response, MessageHeader, MessageType,
    ReadResponseFrame, RequestFrame, WriteResponseFrame, HEADER_LEN, MAGIC, MAX_FRAME_LEN,
    MAX_READ_VALUE_LEN, RESPONSE_HEADER_LEN,
};

/// Transport tag assignments.
///
/// Four distinct tags partition the traffic. Clients post response receives
/// with [`tags::RESPONSE_GROUP_MASK`] so request traffic can never fall into
/// a client receive slot; the server receives with a wildcard mask because it
/// accepts both request kinds.
pub mod tags {
    /// Tag for write request frames.
    pub const WRITE_REQUEST: u64 = 0x1000;

    /// Tag for write response frames.
    pub const WRITE_RESPONSE: u64 = 0x1001;

    /// Tag for read request frames.
    pub const READ_REQUEST: u64 = 0x2000;

    /// Tag for read response frames.
    pub const READ_RESPONSE: u64 = 0x2001;

    /// Mask clients use on response receives to match only their tag group.
    pub const RESPONSE_GROUP_MASK: u64 = 0xF000;

    /// Wildcard mask used by server receives.
    pub const WILDCARD_MASK: u64 = 0;
}

/// Buffer capacities for posted receives.
pub mod limits {
    /// Capacity of a server-side receive slot.
    pub const SERVER_RECEIVE: usize = 64 * 1024;

    /// Capacity of a client write-response receive slot.
    pub const WRITE_RESPONSE_RECEIVE: usize = 1024;

    /// Capacity of a client read-response receive slot. Slightly above the
    /// frame cap so a maximum-size value plus response framing still fits.
    pub const READ_RESPONSE_RECEIVE: usize = 64 * 1024 + 64;
}
