//! Transport error types.

use thiserror::Error;

/// Errors surfaced by the tagged-messaging transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O error from the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection was refused by the remote peer.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The endpoint's connection is gone; nothing can be posted on it.
    #[error("endpoint closed")]
    EndpointClosed,

    /// The worker has been closed; no receives can be posted.
    #[error("worker closed")]
    WorkerClosed,

    /// An outbound message exceeds the transport frame cap.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A worker was created outside a tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}
