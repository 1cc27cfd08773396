//! The worker: tag matching, posted receives, and completion delivery.

use std::collections::VecDeque;
use std::mem;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::context::ContextConfig;
use crate::endpoint::{spawn_endpoint, Endpoint};
use crate::error::TransportError;
use crate::listener::Listener;

/// Transport-level message tag.
pub type Tag = u64;

/// Process-unique endpoint identifier. Receive completions carry the id of
/// the local endpoint a message arrived on, identifying the sender.
pub type EndpointId = u64;

/// Identifier of a posted receive, used for cancellation.
pub type RecvId = u64;

/// Tag matcher for posted receives.
///
/// A message with tag `t` matches when `t & mask == tag & mask`; a mask of
/// zero matches every tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMatch {
    pub tag: Tag,
    pub mask: Tag,
}

impl TagMatch {
    /// Matches exactly one tag.
    #[must_use]
    pub const fn exact(tag: Tag) -> Self {
        Self {
            tag,
            mask: u64::MAX,
        }
    }

    /// Matches a tag group under `mask`.
    #[must_use]
    pub const fn group(tag: Tag, mask: Tag) -> Self {
        Self { tag, mask }
    }

    /// Matches every tag.
    #[must_use]
    pub const fn wildcard() -> Self {
        Self { tag: 0, mask: 0 }
    }

    /// Whether a message tag matches.
    #[must_use]
    pub const fn matches(&self, tag: Tag) -> bool {
        tag & self.mask == self.tag & self.mask
    }
}

/// Metadata delivered with a received message.
#[derive(Debug, Clone, Copy)]
pub struct RecvInfo {
    /// The tag the message was sent with.
    pub tag: Tag,
    /// Payload length in bytes.
    pub len: usize,
    /// Local endpoint the message arrived on; identifies the sender.
    pub sender: EndpointId,
}

/// How a posted receive completed.
#[derive(Debug)]
pub enum RecvOutcome {
    /// A matching message arrived.
    Message { payload: Vec<u8>, info: RecvInfo },
    /// The receive was cancelled before a message matched.
    Cancelled,
    /// A matching message arrived but exceeded the receive's capacity. The
    /// message is discarded.
    Truncated { len: usize, capacity: usize },
}

/// Completion callback for a posted receive.
///
/// Invoked exactly once, from [`Worker::progress`], with the receive's own id
/// and the outcome. The payload buffer is owned by the callback.
pub type RecvCallback = Box<dyn FnOnce(RecvId, RecvOutcome) + Send + 'static>;

/// Completion callback for a posted send.
///
/// Invoked exactly once from [`Worker::progress`] unless the post itself
/// failed, in which case [`Endpoint::send`] returns an error and the callback
/// is dropped unused.
pub type SendCallback = Box<dyn FnOnce(Result<(), TransportError>) + Send + 'static>;

/// Invoked from the accept task for every inbound connection.
pub type AcceptCallback = Arc<dyn Fn(Arc<Endpoint>) + Send + Sync + 'static>;

struct PostedRecv {
    id: RecvId,
    matcher: TagMatch,
    source: Option<EndpointId>,
    capacity: usize,
    callback: RecvCallback,
}

struct UnexpectedMessage {
    tag: Tag,
    sender: EndpointId,
    payload: Vec<u8>,
}

pub(crate) enum Completion {
    Recv {
        id: RecvId,
        callback: RecvCallback,
        outcome: RecvOutcome,
    },
    Send {
        callback: SendCallback,
        result: Result<(), TransportError>,
    },
}

#[derive(Default)]
struct MatchState {
    posted: Vec<PostedRecv>,
    unexpected: VecDeque<UnexpectedMessage>,
    completions: VecDeque<Completion>,
    closed: bool,
}

pub(crate) struct WorkerInner {
    pub(crate) handle: Handle,
    pub(crate) config: ContextConfig,
    state: Mutex<MatchState>,
    next_endpoint_id: AtomicU64,
    next_recv_id: AtomicU64,
}

/// The per-process messaging engine.
///
/// Owns the posted-receive table, the unexpected-message queue, and the
/// completion queue. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    pub(crate) fn new(handle: Handle, config: ContextConfig) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                handle,
                config,
                state: Mutex::new(MatchState::default()),
                next_endpoint_id: AtomicU64::new(1),
                next_recv_id: AtomicU64::new(1),
            }),
        }
    }

    /// Posts a receive slot.
    ///
    /// `source` restricts matching to messages arriving on one endpoint;
    /// source-filtered receives are matched before wildcard-source ones, and
    /// FIFO by post order within each class. If a buffered unexpected message
    /// already matches, the completion is queued immediately.
    pub fn post_recv(
        &self,
        matcher: TagMatch,
        source: Option<EndpointId>,
        capacity: usize,
        callback: RecvCallback,
    ) -> Result<RecvId, TransportError> {
        let id = self.inner.next_recv_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return Err(TransportError::WorkerClosed);
        }

        let buffered = state.unexpected.iter().position(|msg| {
            matcher.matches(msg.tag) && source.map_or(true, |src| src == msg.sender)
        });
        if let Some(msg) = buffered.and_then(|index| state.unexpected.remove(index)) {
            let outcome = complete_with_message(msg, capacity);
            state.completions.push_back(Completion::Recv {
                id,
                callback,
                outcome,
            });
            return Ok(id);
        }

        state.posted.push(PostedRecv {
            id,
            matcher,
            source,
            capacity,
            callback,
        });
        Ok(id)
    }

    /// Cancels a posted receive.
    ///
    /// If the receive is still armed, its callback is queued with
    /// [`RecvOutcome::Cancelled`]; a receive that already completed is left
    /// alone.
    pub fn cancel_recv(&self, id: RecvId) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = state.posted.iter().position(|r| r.id == id) {
            let recv = state.posted.remove(index);
            state.completions.push_back(Completion::Recv {
                id: recv.id,
                callback: recv.callback,
                outcome: RecvOutcome::Cancelled,
            });
        }
    }

    /// Drives completion delivery: drains the queue and invokes callbacks.
    ///
    /// Callbacks run on the calling task, outside the worker's internal lock,
    /// so they may post and cancel receives freely. Returns the number of
    /// completions fired.
    pub fn progress(&self) -> usize {
        let drained = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            mem::take(&mut state.completions)
        };
        let count = drained.len();
        for completion in drained {
            match completion {
                Completion::Recv {
                    id,
                    callback,
                    outcome,
                } => callback(id, outcome),
                Completion::Send { callback, result } => callback(result),
            }
        }
        count
    }

    /// Binds a listener and starts accepting connections.
    ///
    /// Every accepted connection becomes an [`Endpoint`] handed to
    /// `on_accept` from the accept task.
    pub async fn listen(
        &self,
        addr: SocketAddr,
        on_accept: AcceptCallback,
    ) -> Result<Listener, TransportError> {
        let tcp = TcpListener::bind(addr).await?;
        let local_addr = tcp.local_addr()?;
        debug!(%local_addr, "transport listener bound");

        let inner = Arc::clone(&self.inner);
        let accept_task = self.inner.handle.spawn(async move {
            loop {
                match tcp.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted inbound connection");
                        let endpoint = spawn_endpoint(&inner, stream, peer);
                        (on_accept)(endpoint);
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                }
            }
        });

        Ok(Listener::new(local_addr, accept_task))
    }

    /// Dials a peer and returns the endpoint.
    pub async fn connect(&self, addr: SocketAddr) -> Result<Arc<Endpoint>, TransportError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                TransportError::ConnectionRefused(addr.to_string())
            } else {
                TransportError::Io(e)
            }
        })?;
        debug!(peer = %addr, "dialed connection");
        Ok(spawn_endpoint(&self.inner, stream, addr))
    }

    /// Closes the worker: rejects further posts and cancels every armed
    /// receive. Queued completions (including the cancellations) remain to be
    /// drained by [`Worker::progress`].
    pub fn close(&self) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return;
        }
        state.closed = true;
        state.unexpected.clear();
        let posted = mem::take(&mut state.posted);
        for recv in posted {
            state.completions.push_back(Completion::Recv {
                id: recv.id,
                callback: recv.callback,
                outcome: RecvOutcome::Cancelled,
            });
        }
    }
}

impl WorkerInner {
    pub(crate) fn next_endpoint_id(&self) -> EndpointId {
        self.next_endpoint_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Routes an inbound message to a posted receive or the unexpected queue.
    /// Called from endpoint reader tasks.
    pub(crate) fn deliver(&self, sender: EndpointId, tag: Tag, payload: Vec<u8>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.closed {
            return;
        }

        let matched = state
            .posted
            .iter()
            .position(|r| r.source == Some(sender) && r.matcher.matches(tag))
            .or_else(|| {
                state
                    .posted
                    .iter()
                    .position(|r| r.source.is_none() && r.matcher.matches(tag))
            });

        match matched {
            Some(index) => {
                let recv = state.posted.remove(index);
                let outcome = complete_with_message(
                    UnexpectedMessage {
                        tag,
                        sender,
                        payload,
                    },
                    recv.capacity,
                );
                state.completions.push_back(Completion::Recv {
                    id: recv.id,
                    callback: recv.callback,
                    outcome,
                });
            }
            None => {
                if state.unexpected.len() >= self.config.unexpected_queue_limit {
                    warn!(tag, sender, "unexpected-message queue full, dropping oldest");
                    state.unexpected.pop_front();
                }
                state.unexpected.push_back(UnexpectedMessage {
                    tag,
                    sender,
                    payload,
                });
            }
        }
    }

    /// Queues a send completion. Called from endpoint writer tasks.
    pub(crate) fn push_send_completion(
        &self,
        callback: SendCallback,
        result: Result<(), TransportError>,
    ) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .completions
            .push_back(Completion::Send { callback, result });
    }
}

fn complete_with_message(msg: UnexpectedMessage, capacity: usize) -> RecvOutcome {
    if msg.payload.len() > capacity {
        RecvOutcome::Truncated {
            len: msg.payload.len(),
            capacity,
        }
    } else {
        let info = RecvInfo {
            tag: msg.tag,
            len: msg.payload.len(),
            sender: msg.sender,
        };
        RecvOutcome::Message {
            payload: msg.payload,
            info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        let m = TagMatch::exact(0x1001);
        assert!(m.matches(0x1001));
        assert!(!m.matches(0x1000));
        assert!(!m.matches(0x2001));
    }

    #[test]
    fn group_match() {
        let m = TagMatch::group(0x1001, 0xF000);
        assert!(m.matches(0x1000));
        assert!(m.matches(0x1001));
        assert!(!m.matches(0x2001));
        assert!(!m.matches(0x0001));
    }

    #[test]
    fn wildcard_matches_everything() {
        let m = TagMatch::wildcard();
        assert!(m.matches(0));
        assert!(m.matches(0x1000));
        assert!(m.matches(u64::MAX));
    }
}
