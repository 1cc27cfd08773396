//! Framing-integrity scenarios: corrupted frames must never mutate the
//! store, crash a peer, or poison subsequent valid traffic.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dramnet::TransportManager;
use dramnet_proto::{
    decode_request, encode_read_response, encode_write_request, tags, RequestFrame,
};
use dramnet_transport::{AcceptCallback, Context, Endpoint, RecvOutcome, TagMatch, Worker};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

/// Drives a raw worker's progress in the background.
fn pump(worker: &Worker) -> tokio::task::JoinHandle<()> {
    let worker = worker.clone();
    tokio::spawn(async move {
        loop {
            worker.progress();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_frames_are_dropped_and_valid_traffic_continues() {
    let _guard = common::exclusive().await;
    let (_server, addr) = common::open_server().await;

    // A raw peer speaking the transport framing directly, so we can put
    // arbitrary bytes on the wire.
    let raw = Context::default().create_worker().unwrap();
    let endpoint = raw.connect(addr.parse().unwrap()).await.unwrap();

    // Flipped magic.
    let mut bad_magic = encode_write_request(90, b"evil", b"payload").unwrap();
    bad_magic[0] ^= 0x01;
    endpoint
        .send(tags::WRITE_REQUEST, bad_magic, Box::new(|_| {}))
        .unwrap();

    // Unknown message type.
    let mut bad_type = encode_write_request(91, b"evil", b"payload").unwrap();
    bad_type[4..8].copy_from_slice(&9u32.to_le_bytes());
    endpoint
        .send(tags::WRITE_REQUEST, bad_type, Box::new(|_| {}))
        .unwrap();

    // Corrupted payload byte, so the checksum no longer matches.
    let mut bad_checksum = encode_write_request(92, b"evil", b"payload").unwrap();
    let last = bad_checksum.len() - 1;
    bad_checksum[last] ^= 0xFF;
    endpoint
        .send(tags::WRITE_REQUEST, bad_checksum, Box::new(|_| {}))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let store = TransportManager::global().store();
    assert_eq!(store.len(), 0, "corrupt frames must not mutate the store");

    // The server keeps serving: a valid write from a real client succeeds.
    let client = common::open_client(&addr).await;
    timeout(WAIT, client.write(b"good", b"value"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(store.get(b"good"), Some(b"value".to_vec()));
    assert_eq!(store.len(), 1);
}

/// Stands up a fake server on a raw worker that answers every read request
/// with a response whose claimed value length is garbage. The returned
/// listener must stay alive for the test's duration.
async fn fake_server_with_insane_value_length(raw: &Worker) -> dramnet_transport::Listener {
    let accepted: Arc<Mutex<Option<Arc<Endpoint>>>> = Arc::new(Mutex::new(None));

    let slot = Arc::clone(&accepted);
    let on_accept: AcceptCallback = Arc::new(move |endpoint| {
        *slot.lock().unwrap() = Some(endpoint);
    });
    let listener = raw
        .listen("127.0.0.1:0".parse().unwrap(), on_accept)
        .await
        .unwrap();

    let slot = Arc::clone(&accepted);
    raw.post_recv(
        TagMatch::wildcard(),
        None,
        64 * 1024,
        Box::new(move |_, outcome| {
            let RecvOutcome::Message { payload, .. } = outcome else {
                return;
            };
            let Ok(RequestFrame::Read { request_id, .. }) = decode_request(&payload) else {
                return;
            };
            // Well-formed response, then the value_length field is stamped
            // with u32::MAX.
            let mut response = encode_read_response(request_id, Some(b"x"));
            response[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
            if let Some(endpoint) = slot.lock().unwrap().clone() {
                let _ = endpoint.send(tags::READ_RESPONSE, response, Box::new(|_| {}));
            }
        }),
    )
    .unwrap();

    listener
}

#[tokio::test(flavor = "multi_thread")]
async fn insane_value_length_resolves_read_as_missing() {
    let _guard = common::exclusive().await;

    let raw = Context::default().create_worker().unwrap();
    let ticker = pump(&raw);
    let listener = fake_server_with_insane_value_length(&raw).await;

    let client = common::open_client(&listener.local_addr().to_string()).await;
    let result = timeout(WAIT, client.read(b"anything"))
        .await
        .expect("read resolves in bounded time")
        .expect("corruption is missing, not an error");
    assert!(result.is_missing());

    ticker.abort();
}
