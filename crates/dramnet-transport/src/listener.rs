//! Listener handle for inbound connections.

use std::net::SocketAddr;

use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a bound listener.
///
/// The accept loop runs on the worker's runtime until the listener is closed
/// or dropped.
#[derive(Debug)]
pub struct Listener {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl Listener {
    pub(crate) fn new(local_addr: SocketAddr, accept_task: JoinHandle<()>) -> Self {
        Self {
            local_addr,
            accept_task,
        }
    }

    /// The address the listener is bound to. With port 0 this is the
    /// ephemeral port the OS assigned.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections. Endpoints already accepted are
    /// unaffected.
    pub fn close(&self) {
        debug!(local_addr = %self.local_addr, "closing listener");
        self.accept_task.abort();
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}
