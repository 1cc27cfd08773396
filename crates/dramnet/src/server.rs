//! Server dispatch: consumes request frames, mutates the store, emits
//! responses, and re-arms receive slots.
//!
//! The receive callback runs on the transport's progress context. It only
//! does stateless work inline — frame validation and store access — and
//! schedules everything that touches the manager mutex (endpoint lookup,
//! response emission, re-arming) onto fresh tasks. Holding the manager mutex
//! here would nest it under transport activity and deadlock the process.

use std::sync::Arc;

use dramnet_proto::{decode_request, RequestFrame, StatusCode};
use dramnet_store::Store;
use dramnet_transport::{RecvCallback, RecvId, RecvInfo, RecvOutcome};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::manager::TransportManager;

/// Builds the completion callback for one wildcard server receive slot.
pub(crate) fn receive_callback(store: Arc<Store>, runtime: Handle) -> RecvCallback {
    Box::new(move |recv_id, outcome| handle_receive(&store, &runtime, recv_id, outcome))
}

fn handle_receive(store: &Store, runtime: &Handle, recv_id: RecvId, outcome: RecvOutcome) {
    match outcome {
        RecvOutcome::Cancelled => {
            // Shutdown path: release the slot, do not re-arm.
            runtime.spawn(async move {
                TransportManager::global().finish_receive(recv_id);
            });
        }
        RecvOutcome::Truncated { len, capacity } => {
            warn!(len, capacity, "dropping oversize frame");
            rearm(runtime, recv_id);
        }
        RecvOutcome::Message { payload, info } => {
            dispatch_frame(store, runtime, &payload, info);
            rearm(runtime, recv_id);
        }
    }
}

/// Restores the consumed receive slot on a fresh task.
fn rearm(runtime: &Handle, recv_id: RecvId) {
    runtime.spawn(async move {
        let manager = TransportManager::global();
        manager.finish_receive(recv_id);
        manager.post_server_receive();
    });
}

fn dispatch_frame(store: &Store, runtime: &Handle, frame: &[u8], info: RecvInfo) {
    let request = match decode_request(frame) {
        Ok(request) => request,
        Err(e) => {
            // Invalid frames are dropped without resolving anything; the
            // slot is re-armed by the caller and valid traffic continues.
            warn!(sender = info.sender, error = %e, "dropping invalid frame");
            return;
        }
    };

    let sender = info.sender;
    match request {
        RequestFrame::Write {
            request_id,
            key,
            value,
        } => {
            debug!(
                request_id,
                key_len = key.len(),
                value_len = value.len(),
                "write request"
            );
            store.put(key, value);
            runtime.spawn(async move {
                let manager = TransportManager::global();
                match manager.response_endpoint(sender) {
                    Some(endpoint) => manager.send_write_response(
                        &endpoint,
                        request_id,
                        StatusCode::Ok.as_u32(),
                    ),
                    None => {
                        warn!(request_id, "no accepted endpoint for write response, dropping");
                    }
                }
            });
        }
        RequestFrame::Read { request_id, key } => {
            let value = store.get(&key);
            debug!(
                request_id,
                key_len = key.len(),
                found = value.is_some(),
                "read request"
            );
            runtime.spawn(async move {
                let manager = TransportManager::global();
                match manager.response_endpoint(sender) {
                    Some(endpoint) => manager.send_read_response(&endpoint, request_id, value),
                    None => {
                        warn!(request_id, "no accepted endpoint for read response, dropping");
                    }
                }
            });
        }
    }
}
