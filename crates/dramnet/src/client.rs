//! Client request pipeline.
//!
//! Each operation generates a request id, registers a pending promise, posts
//! a receive for the matching response tag scoped to the server endpoint,
//! then posts the send. The response-receive callback decodes statelessly on
//! the transport context and schedules promise resolution onto a fresh task;
//! resolution is keyed by the request id echoed in the response, so
//! concurrent requests complete correctly regardless of which posted slot a
//! response lands in.

use std::sync::Arc;
use std::time::Duration;

use dramnet_proto::{
    decode_read_response, decode_write_response, encode_read_request, encode_write_request, limits,
    tags, StatusCode,
};
use dramnet_transport::{Endpoint, RecvOutcome, TagMatch};
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::KvError;
use crate::manager::TransportManager;
use crate::types::{Generation, ReadResult, TimestampedGeneration};

/// Sends a write request and resolves when the server acknowledges it.
pub(crate) async fn write(
    endpoint: &Arc<Endpoint>,
    key: &[u8],
    value: &[u8],
    deadline: Option<Duration>,
) -> Result<TimestampedGeneration, KvError> {
    let manager = TransportManager::global();
    let (worker, runtime) = manager.worker_and_handle()?;

    let request_id = manager.generate_request_id();
    let frame = encode_write_request(request_id, key, value)?;

    let (promise, resolution) = oneshot::channel();
    manager.register_pending_write(request_id, promise);

    let callback_runtime = runtime.clone();
    let posted = worker.post_recv(
        TagMatch::group(tags::WRITE_RESPONSE, tags::RESPONSE_GROUP_MASK),
        Some(endpoint.id()),
        limits::WRITE_RESPONSE_RECEIVE,
        Box::new(move |recv_id, outcome| {
            let (resolved_id, result) = match outcome {
                RecvOutcome::Message { payload, .. } => match decode_write_response(&payload) {
                    Ok(resp) if resp.status == StatusCode::Ok.as_u32() => (resp.request_id, Ok(())),
                    Ok(resp) => (resp.request_id, Err(KvError::Rejected(resp.status))),
                    Err(e) => (
                        request_id,
                        Err(KvError::Internal(format!("malformed write response: {e}"))),
                    ),
                },
                RecvOutcome::Cancelled => (request_id, Err(KvError::Cancelled)),
                RecvOutcome::Truncated { len, capacity } => (
                    request_id,
                    Err(KvError::Internal(format!(
                        "write response truncated: {len} bytes in {capacity}-byte slot"
                    ))),
                ),
            };
            callback_runtime.spawn(async move {
                let manager = TransportManager::global();
                manager.finish_receive(recv_id);
                manager.complete_pending_write(resolved_id, result);
            });
        }),
    );
    let recv_id = match posted {
        Ok(recv_id) => {
            manager.track_receive(recv_id);
            recv_id
        }
        Err(e) => {
            manager.take_pending_write(request_id);
            return Err(e.into());
        }
    };

    let send_runtime = runtime;
    let sent = endpoint.send(
        tags::WRITE_REQUEST,
        frame,
        Box::new(move |result| {
            if let Err(e) = result {
                warn!(request_id, error = %e, "write request send failed");
                let message = format!("send failed: {e}");
                send_runtime.spawn(async move {
                    TransportManager::global()
                        .complete_pending_write(request_id, Err(KvError::Internal(message)));
                });
            }
        }),
    );
    if let Err(e) = sent {
        manager.take_pending_write(request_id);
        worker.cancel_recv(recv_id);
        return Err(e.into());
    }

    let outcome = match deadline {
        Some(limit) => match tokio::time::timeout(limit, resolution).await {
            Ok(resolved) => resolved,
            Err(_) => {
                manager.take_pending_write(request_id);
                worker.cancel_recv(recv_id);
                return Err(KvError::Timeout);
            }
        },
        None => resolution.await,
    };

    match outcome {
        Ok(result) => result.map(|()| TimestampedGeneration::new(Generation::token())),
        // Promise dropped without resolution: shutdown raced us.
        Err(_) => Err(KvError::Cancelled),
    }
}

/// Sends a read request and resolves with the value, or missing.
///
/// Transport and validation failures surface as missing rather than errors;
/// the caller cannot distinguish a lost value from an absent one, by policy.
pub(crate) async fn read(
    endpoint: &Arc<Endpoint>,
    key: &[u8],
    deadline: Option<Duration>,
) -> Result<ReadResult, KvError> {
    let manager = TransportManager::global();
    let (worker, runtime) = manager.worker_and_handle()?;

    let request_id = manager.generate_request_id();
    let frame = encode_read_request(request_id, key)?;

    let (promise, resolution) = oneshot::channel();
    manager.register_pending_read(request_id, promise);

    let callback_runtime = runtime.clone();
    let posted = worker.post_recv(
        TagMatch::group(tags::READ_RESPONSE, tags::RESPONSE_GROUP_MASK),
        Some(endpoint.id()),
        limits::READ_RESPONSE_RECEIVE,
        Box::new(move |recv_id, outcome| {
            let (resolved_id, result) = match outcome {
                RecvOutcome::Message { payload, .. } => match decode_read_response(&payload) {
                    Ok(resp) => {
                        let result = match resp.value {
                            Some(value) => ReadResult::with_value(value),
                            None => {
                                if resp.status != StatusCode::NotFound.as_u32() {
                                    warn!(
                                        request_id = resp.request_id,
                                        status = resp.status,
                                        "read failed on server"
                                    );
                                }
                                ReadResult::missing()
                            }
                        };
                        (resp.request_id, result)
                    }
                    Err(e) => {
                        warn!(request_id, error = %e, "corrupt read response");
                        (request_id, ReadResult::missing())
                    }
                },
                RecvOutcome::Cancelled => (request_id, ReadResult::missing()),
                RecvOutcome::Truncated { len, capacity } => {
                    warn!(request_id, len, capacity, "read response truncated");
                    (request_id, ReadResult::missing())
                }
            };
            callback_runtime.spawn(async move {
                let manager = TransportManager::global();
                manager.finish_receive(recv_id);
                manager.complete_pending_read(resolved_id, result);
            });
        }),
    );
    let recv_id = match posted {
        Ok(recv_id) => {
            manager.track_receive(recv_id);
            recv_id
        }
        Err(e) => {
            manager.take_pending_read(request_id);
            return Err(e.into());
        }
    };

    let send_runtime = runtime;
    let sent = endpoint.send(
        tags::READ_REQUEST,
        frame,
        Box::new(move |result| {
            if let Err(e) = result {
                warn!(request_id, error = %e, "read request send failed");
                send_runtime.spawn(async move {
                    TransportManager::global()
                        .complete_pending_read(request_id, ReadResult::missing());
                });
            }
        }),
    );
    if let Err(e) = sent {
        manager.take_pending_read(request_id);
        worker.cancel_recv(recv_id);
        return Err(e.into());
    }

    let outcome = match deadline {
        Some(limit) => match tokio::time::timeout(limit, resolution).await {
            Ok(resolved) => resolved,
            Err(_) => {
                manager.take_pending_read(request_id);
                worker.cancel_recv(recv_id);
                return Err(KvError::Timeout);
            }
        },
        None => resolution.await,
    };

    match outcome {
        Ok(result) => Ok(result),
        // Promise dropped without resolution: shutdown raced us.
        Err(_) => Ok(ReadResult::missing()),
    }
}
