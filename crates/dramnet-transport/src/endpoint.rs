//! Endpoints: tagged sends and per-connection reader/writer tasks.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::TransportError;
use crate::worker::{EndpointId, SendCallback, Tag, WorkerInner};

/// Size of the transport-level frame prefix: `[u64 tag][u32 len]`.
const FRAME_PREFIX_LEN: usize = 12;

struct Outbound {
    tag: Tag,
    payload: Vec<u8>,
    callback: Option<SendCallback>,
}

/// A bidirectional channel to one peer.
///
/// Created by [`crate::Worker::connect`] or handed to the accept callback by
/// a listener. Sends are posted through an internal queue; the connection
/// itself is driven by reader and writer tasks owned by the worker's runtime.
pub struct Endpoint {
    id: EndpointId,
    peer: SocketAddr,
    max_message_size: usize,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
}

impl Endpoint {
    /// The process-unique id of this endpoint.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Address of the remote peer.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Posts a tagged send.
    ///
    /// On success the message is queued and `callback` will fire from
    /// [`crate::Worker::progress`] with the write outcome. On an immediate
    /// post failure (endpoint closed, oversize message) the error is returned
    /// and the callback is dropped unused; the caller keeps ownership of the
    /// failure path.
    pub fn send(
        &self,
        tag: Tag,
        payload: Vec<u8>,
        callback: SendCallback,
    ) -> Result<(), TransportError> {
        if payload.len() > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: payload.len(),
                max: self.max_message_size,
            });
        }

        let guard = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let sender = guard.as_ref().ok_or(TransportError::EndpointClosed)?;
        sender
            .send(Outbound {
                tag,
                payload,
                callback: Some(callback),
            })
            .map_err(|_| TransportError::EndpointClosed)
    }

    /// Closes the endpoint. The writer task flushes what it already dequeued
    /// and shuts the socket down; subsequent sends fail immediately.
    pub fn close(&self) {
        let mut guard = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        guard.take();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish()
    }
}

/// Registers a connected stream with the worker: assigns an endpoint id and
/// spawns the reader and writer tasks.
pub(crate) fn spawn_endpoint(
    worker: &Arc<WorkerInner>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Arc<Endpoint> {
    let _ = stream.set_nodelay(true);
    let id = worker.next_endpoint_id();
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let endpoint = Arc::new(Endpoint {
        id,
        peer,
        max_message_size: worker.config.max_message_size,
        outbound: Mutex::new(Some(tx)),
    });

    worker
        .handle
        .spawn(reader_task(Arc::clone(worker), id, read_half));
    worker
        .handle
        .spawn(writer_task(Arc::clone(worker), id, rx, write_half));

    endpoint
}

async fn reader_task(worker: Arc<WorkerInner>, id: EndpointId, mut read: OwnedReadHalf) {
    let max = worker.config.max_message_size;
    loop {
        let mut prefix = [0u8; FRAME_PREFIX_LEN];
        match read.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(endpoint = id, "peer closed connection");
                return;
            }
            Err(e) => {
                debug!(endpoint = id, error = %e, "connection read failed");
                return;
            }
        }

        let mut tag_bytes = [0u8; 8];
        tag_bytes.copy_from_slice(&prefix[..8]);
        let tag = Tag::from_le_bytes(tag_bytes);
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&prefix[8..12]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len > max {
            error!(
                endpoint = id,
                len, max, "peer declared oversize frame, dropping connection"
            );
            return;
        }

        let mut payload = vec![0u8; len];
        if let Err(e) = read.read_exact(&mut payload).await {
            debug!(endpoint = id, error = %e, "connection truncated mid-frame");
            return;
        }

        worker.deliver(id, tag, payload);
    }
}

async fn writer_task(
    worker: Arc<WorkerInner>,
    id: EndpointId,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut write: OwnedWriteHalf,
) {
    while let Some(mut outbound) = rx.recv().await {
        let result = write_frame(&mut write, outbound.tag, &outbound.payload).await;
        let failed = result.is_err();
        if let Some(callback) = outbound.callback.take() {
            worker.push_send_completion(callback, result.map_err(TransportError::Io));
        }
        if failed {
            debug!(endpoint = id, "connection write failed, draining sends");
            break;
        }
    }

    // Stop accepting new sends first, then fail everything still queued; the
    // connection is gone.
    rx.close();
    while let Ok(mut outbound) = rx.try_recv() {
        if let Some(callback) = outbound.callback.take() {
            worker.push_send_completion(callback, Err(TransportError::EndpointClosed));
        }
    }
    let _ = write.shutdown().await;
}

async fn write_frame(
    write: &mut OwnedWriteHalf,
    tag: Tag,
    payload: &[u8],
) -> std::io::Result<()> {
    write.write_all(&tag.to_le_bytes()).await?;
    write.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    write.write_all(payload).await?;
    write.flush().await
}
