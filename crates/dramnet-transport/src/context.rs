//! Transport context: limits and worker construction.

use tokio::runtime::Handle;

use crate::error::TransportError;
use crate::worker::Worker;

/// Limits applied by a transport context.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Largest tagged message the transport will carry. A connection whose
    /// peer declares a larger frame is considered poisoned and dropped.
    pub max_message_size: usize,

    /// Bound on buffered messages that arrived before a matching receive was
    /// posted. The oldest message is discarded once the bound is hit.
    pub unexpected_queue_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            // Above the 64 KiB protocol frame cap so response framing
            // overhead never collides with the transport limit.
            max_message_size: 128 * 1024,
            unexpected_queue_limit: 1024,
        }
    }
}

/// A transport context.
///
/// Owns the configuration shared by every worker created from it. The
/// process normally holds exactly one, but tests may create more to stand up
/// independent peers in a single process.
#[derive(Debug, Default)]
pub struct Context {
    config: ContextConfig,
}

impl Context {
    /// Creates a context with the given limits.
    #[must_use]
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Returns the context limits.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Creates a worker bound to the current tokio runtime.
    ///
    /// The worker spawns its connection tasks onto that runtime; creating one
    /// outside a runtime fails.
    pub fn create_worker(&self) -> Result<Worker, TransportError> {
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        Ok(Worker::new(handle, self.config.clone()))
    }
}
