//! Shared harness for the integration suites.
//!
//! The transport manager is a process singleton, so tests serialise behind
//! an async lock and reset the manager before each case.

use dramnet::{DriverSpec, KvDriver, TransportManager};
use tokio::sync::{Mutex, MutexGuard};

static TEST_LOCK: Mutex<()> = Mutex::const_new(());

/// Takes the suite lock and resets the singleton manager.
pub async fn exclusive() -> MutexGuard<'static, ()> {
    let guard = TEST_LOCK.lock().await;
    TransportManager::global().reset_for_tests().await;
    guard
}

/// Opens a server driver on an ephemeral loopback port, returning the driver
/// and the address clients should dial.
pub async fn open_server() -> (KvDriver, String) {
    let server = KvDriver::open(DriverSpec {
        listen_addr: Some("127.0.0.1:0".into()),
        ..Default::default()
    })
    .await
    .expect("open server driver");
    let addr = server.local_addr().expect("listener bound").to_string();
    (server, addr)
}

/// Opens a client driver against `addr` with default settings.
pub async fn open_client(addr: &str) -> KvDriver {
    KvDriver::open(DriverSpec {
        remote_addr: Some(addr.to_string()),
        ..Default::default()
    })
    .await
    .expect("open client driver")
}
