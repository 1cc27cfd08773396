//! Error types for the key-value layer.

use dramnet_proto::FrameError;
use dramnet_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by the driver and request pipeline.
#[derive(Error, Debug)]
pub enum KvError {
    /// Invalid open-spec (bad role selection, address, or port).
    #[error("invalid spec: {0}")]
    Spec(String),

    /// The transport manager has not been initialised.
    #[error("transport manager not initialised")]
    NotInitialized,

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame encoding failure (oversize key or value).
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The request was cancelled by shutdown.
    #[error("request cancelled")]
    Cancelled,

    /// The per-request deadline expired before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-zero status.
    #[error("server rejected request (status {0})")]
    Rejected(u32),

    /// The operation is not part of this driver.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Internal failure in the request pipeline.
    #[error("internal error: {0}")]
    Internal(String),
}
