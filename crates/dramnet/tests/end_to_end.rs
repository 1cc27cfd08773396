//! End-to-end scenarios over real loopback sockets.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dramnet::TransportManager;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread")]
async fn single_writer_round_trip() {
    let _guard = common::exclusive().await;
    let (_server, addr) = common::open_server().await;

    let writer = common::open_client(&addr).await;
    let stamp = timeout(WAIT, writer.write(b"testkey", b"Data from Node 1"))
        .await
        .expect("write within deadline")
        .expect("write ok");
    assert!(!stamp.generation.is_no_value());

    let store = TransportManager::global().store();
    assert_eq!(store.get(b"testkey"), Some(b"Data from Node 1".to_vec()));
    assert_eq!(store.len(), 1);

    // A second client connects and reads the value back.
    let reader = common::open_client(&addr).await;
    let result = timeout(WAIT, reader.read(b"testkey"))
        .await
        .expect("read within deadline")
        .expect("read ok");
    assert_eq!(result.value(), Some(&b"Data from Node 1"[..]));
}

#[tokio::test(flavor = "multi_thread")]
async fn absent_key_resolves_missing() {
    let _guard = common::exclusive().await;
    let (_server, addr) = common::open_server().await;
    let client = common::open_client(&addr).await;

    let result = timeout(WAIT, client.read(b"absent"))
        .await
        .expect("read within deadline")
        .expect("absence is not an error");
    assert!(result.is_missing());
    assert!(result.stamp.generation.is_no_value());
}

#[tokio::test(flavor = "multi_thread")]
async fn overwrite_returns_latest_value() {
    let _guard = common::exclusive().await;
    let (_server, addr) = common::open_server().await;
    let client = common::open_client(&addr).await;

    timeout(WAIT, client.write(b"k", b"v1"))
        .await
        .unwrap()
        .unwrap();
    timeout(WAIT, client.write(b"k", b"v2"))
        .await
        .unwrap()
        .unwrap();

    let result = timeout(WAIT, client.read(b"k")).await.unwrap().unwrap();
    assert_eq!(result.value(), Some(&b"v2"[..]));
    assert_eq!(TransportManager::global().store().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn hundred_concurrent_writes_then_reads() {
    let _guard = common::exclusive().await;
    let (_server, addr) = common::open_server().await;
    let client = Arc::new(common::open_client(&addr).await);

    let mut writes = Vec::new();
    for i in 0..100u32 {
        let client = Arc::clone(&client);
        writes.push(tokio::spawn(async move {
            client
                .write(format!("k{i}").as_bytes(), format!("v{i}").as_bytes())
                .await
        }));
    }
    for write in writes {
        timeout(WAIT, write)
            .await
            .expect("write within deadline")
            .expect("task join")
            .expect("write ok");
    }

    assert_eq!(TransportManager::global().store().len(), 100);

    for i in 0..100u32 {
        let result = timeout(WAIT, client.read(format!("k{i}").as_bytes()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.into_value(), Some(format!("v{i}").into_bytes()));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_key_and_empty_value_round_trip() {
    let _guard = common::exclusive().await;
    let (_server, addr) = common::open_server().await;
    let client = common::open_client(&addr).await;

    timeout(WAIT, client.write(b"", b"bare-key"))
        .await
        .unwrap()
        .unwrap();
    timeout(WAIT, client.write(b"bare-value", b""))
        .await
        .unwrap()
        .unwrap();

    let by_empty_key = timeout(WAIT, client.read(b"")).await.unwrap().unwrap();
    assert_eq!(by_empty_key.value(), Some(&b"bare-key"[..]));

    // An empty value is a present value, not a missing key.
    let empty_value = timeout(WAIT, client.read(b"bare-value"))
        .await
        .unwrap()
        .unwrap();
    assert!(!empty_value.is_missing());
    assert_eq!(empty_value.value(), Some(&b""[..]));
}

#[tokio::test(flavor = "multi_thread")]
async fn server_role_operates_on_local_store() {
    let _guard = common::exclusive().await;
    let (server, _addr) = common::open_server().await;

    let stamp = server.write(b"local", b"value").await.unwrap();
    assert!(!stamp.generation.is_no_value());

    let result = server.read(b"local").await.unwrap();
    assert_eq!(result.value(), Some(&b"value"[..]));
    assert!(server.read(b"other").await.unwrap().is_missing());
}

#[tokio::test(flavor = "multi_thread")]
async fn unsupported_operations_error() {
    let _guard = common::exclusive().await;
    let (server, _addr) = common::open_server().await;

    assert!(server.delete_range(b"a", b"z").await.is_err());
    assert!(server.list().await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn request_ids_are_unique() {
    let _guard = common::exclusive().await;
    let manager = TransportManager::global();

    let mut seen = HashSet::new();
    for _ in 0..1000 {
        assert!(seen.insert(manager.generate_request_id()));
    }
}
