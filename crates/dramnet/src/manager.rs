//! The process-wide transport manager.
//!
//! Owns the transport context and worker, the progress loop, the endpoint
//! registries, and the pending-request tables. All state sits behind a single
//! mutex that is held only for map and registry access, never across
//! transport calls that deliver completions.
//!
//! The load-bearing rule: transport-invoked callbacks never take this mutex
//! on the callback task for anything that could nest back into transport
//! activity. Every such step — endpoint registration and lookup, pending
//! table updates, receive re-arming — is scheduled onto a fresh task via the
//! runtime handle captured at [`TransportManager::initialize`].

use std::collections::HashMap;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use dramnet_proto::{encode_read_response, encode_write_response, limits, tags};
use dramnet_store::Store;
use dramnet_transport::{
    AcceptCallback, Context, Endpoint, EndpointId, Listener, RecvId, TagMatch, TransportError,
    Worker,
};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::KvError;
use crate::server;
use crate::types::ReadResult;

/// Receive slots armed before any client dials.
const PREPOSTED_SERVER_RECEIVES: usize = 10;

/// Sleep between progress polls, so foreground work is never starved.
const PROGRESS_INTERVAL: Duration = Duration::from_micros(100);

/// Progress ticks drained during shutdown to let callbacks quiesce.
const SHUTDOWN_PROGRESS_TICKS: usize = 10;

pub(crate) type WritePromise = oneshot::Sender<Result<(), KvError>>;
pub(crate) type ReadPromise = oneshot::Sender<ReadResult>;

struct Inner {
    initialized: bool,
    worker: Option<Worker>,
    runtime: Option<Handle>,
    listener: Option<Listener>,
    progress_running: bool,
    progress_task: Option<JoinHandle<()>>,
    store: Arc<Store>,
    pending_writes: HashMap<u64, WritePromise>,
    pending_reads: HashMap<u64, ReadPromise>,
    next_request_id: u64,
    accepted_endpoints: Vec<Arc<Endpoint>>,
    dialed_endpoints: Vec<Arc<Endpoint>>,
    active_receives: Vec<RecvId>,
}

impl Inner {
    fn new() -> Self {
        Self {
            initialized: false,
            worker: None,
            runtime: None,
            listener: None,
            progress_running: false,
            progress_task: None,
            store: Arc::new(Store::new()),
            pending_writes: HashMap::new(),
            pending_reads: HashMap::new(),
            next_request_id: 1,
            accepted_endpoints: Vec::new(),
            dialed_endpoints: Vec::new(),
            active_receives: Vec::new(),
        }
    }
}

/// Everything torn down by `shutdown`, moved out of the mutex first.
struct Teardown {
    worker: Option<Worker>,
    listener: Option<Listener>,
    progress_task: Option<JoinHandle<()>>,
    accepted_endpoints: Vec<Arc<Endpoint>>,
    dialed_endpoints: Vec<Arc<Endpoint>>,
    active_receives: Vec<RecvId>,
    pending_writes: HashMap<u64, WritePromise>,
    pending_reads: HashMap<u64, ReadPromise>,
}

/// Process singleton driving all transport activity.
pub struct TransportManager {
    inner: Mutex<Inner>,
}

static MANAGER: OnceLock<TransportManager> = OnceLock::new();

impl TransportManager {
    /// The process-wide instance.
    pub fn global() -> &'static Self {
        MANAGER.get_or_init(|| Self {
            inner: Mutex::new(Inner::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Opens the transport context, creates the worker, and starts the
    /// progress loop. Idempotent: a second call on an initialised manager
    /// returns immediately.
    ///
    /// Must be called from within a tokio runtime; the runtime handle is
    /// captured here so completion callbacks can schedule work onto fresh
    /// tasks.
    pub fn initialize(&self) -> Result<(), KvError> {
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let mut inner = self.lock();
        if inner.initialized {
            return Ok(());
        }

        let worker = Context::default().create_worker()?;

        inner.worker = Some(worker.clone());
        inner.runtime = Some(handle.clone());
        inner.store = Arc::new(Store::new());
        inner.next_request_id = 1;
        inner.initialized = true;
        inner.progress_running = true;
        inner.progress_task = Some(handle.spawn(async move {
            loop {
                {
                    let inner = Self::global().lock();
                    if !inner.progress_running {
                        break;
                    }
                }
                worker.progress();
                tokio::time::sleep(PROGRESS_INTERVAL).await;
            }
            debug!("progress loop stopped");
        }));

        info!("transport manager initialised");
        Ok(())
    }

    /// Binds the server listener and pre-posts receive slots so the server
    /// is ready before any client dials.
    ///
    /// The address is `host:port` with an IPv4 host (`0.0.0.0`, `127.0.0.1`,
    /// `localhost`, or an explicit address); port 0 binds an ephemeral port,
    /// retrievable via [`TransportManager::listener_local_addr`].
    pub async fn create_listener(&self, addr: &str) -> Result<(), KvError> {
        let sock_addr = parse_host_port(addr)?;
        let (worker, handle) = self.worker_and_handle()?;

        // The accept callback runs under transport internals; registration is
        // scheduled onto a fresh task rather than performed inline.
        let accept_handle = handle;
        let on_accept: AcceptCallback = Arc::new(move |endpoint| {
            accept_handle.spawn(async move {
                Self::global().register_accepted_endpoint(endpoint);
            });
        });

        let listener = worker.listen(sock_addr, on_accept).await?;
        info!(addr = %listener.local_addr(), "listening for clients");
        {
            let mut inner = self.lock();
            inner.listener = Some(listener);
        }

        for _ in 0..PREPOSTED_SERVER_RECEIVES {
            self.post_server_receive();
        }
        Ok(())
    }

    /// Address the listener is bound to, if any.
    pub fn listener_local_addr(&self) -> Option<SocketAddr> {
        self.lock().listener.as_ref().map(Listener::local_addr)
    }

    /// Dials the server at `host:port` and registers the endpoint for
    /// cleanup. No loopback shortcut: every connection goes through the
    /// transport, even to 127.0.0.1.
    pub async fn create_client_endpoint(&self, addr: &str) -> Result<Arc<Endpoint>, KvError> {
        let sock_addr = parse_host_port(addr)?;
        let worker = {
            let inner = self.lock();
            if !inner.initialized {
                return Err(KvError::NotInitialized);
            }
            inner.worker.clone().ok_or(KvError::NotInitialized)?
        };

        let endpoint = worker.connect(sock_addr).await?;
        info!(addr, endpoint = endpoint.id(), "connected to server");
        self.lock().dialed_endpoints.push(Arc::clone(&endpoint));
        Ok(endpoint)
    }

    /// The server's canonical store.
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.lock().store)
    }

    /// Next request correlation id. Post-increments; wraps harmlessly.
    pub fn generate_request_id(&self) -> u64 {
        let mut inner = self.lock();
        let id = inner.next_request_id;
        inner.next_request_id = inner.next_request_id.wrapping_add(1);
        id
    }

    pub(crate) fn worker_and_handle(&self) -> Result<(Worker, Handle), KvError> {
        let inner = self.lock();
        if !inner.initialized {
            return Err(KvError::NotInitialized);
        }
        match (&inner.worker, &inner.runtime) {
            (Some(worker), Some(runtime)) => Ok((worker.clone(), runtime.clone())),
            _ => Err(KvError::NotInitialized),
        }
    }

    fn register_accepted_endpoint(&self, endpoint: Arc<Endpoint>) {
        let mut inner = self.lock();
        inner.accepted_endpoints.push(endpoint);
        debug!(
            total = inner.accepted_endpoints.len(),
            "registered accepted endpoint"
        );
    }

    /// Endpoint to answer `sender` on. Prefers the endpoint the request
    /// arrived on; falls back to the most recently accepted one if that
    /// endpoint is gone.
    pub(crate) fn response_endpoint(&self, sender: EndpointId) -> Option<Arc<Endpoint>> {
        let inner = self.lock();
        let exact = inner
            .accepted_endpoints
            .iter()
            .find(|ep| ep.id() == sender)
            .cloned();
        if exact.is_some() {
            return exact;
        }
        let fallback = inner.accepted_endpoints.last().cloned();
        if fallback.is_some() {
            warn!(sender, "sender endpoint gone, responding via most recent");
        }
        fallback
    }

    pub(crate) fn register_pending_write(&self, request_id: u64, promise: WritePromise) {
        self.lock().pending_writes.insert(request_id, promise);
    }

    pub(crate) fn register_pending_read(&self, request_id: u64, promise: ReadPromise) {
        self.lock().pending_reads.insert(request_id, promise);
    }

    /// Resolves and removes a pending write. Absence is tolerated: the entry
    /// may already be gone after a deadline expiry or a duplicate response.
    pub(crate) fn complete_pending_write(&self, request_id: u64, result: Result<(), KvError>) {
        let promise = self.lock().pending_writes.remove(&request_id);
        match promise {
            Some(promise) => {
                let _ = promise.send(result);
            }
            None => debug!(request_id, "no pending write for response"),
        }
    }

    /// Resolves and removes a pending read. Absence is tolerated.
    pub(crate) fn complete_pending_read(&self, request_id: u64, result: ReadResult) {
        let promise = self.lock().pending_reads.remove(&request_id);
        match promise {
            Some(promise) => {
                let _ = promise.send(result);
            }
            None => debug!(request_id, "no pending read for response"),
        }
    }

    /// Removes a pending write without resolving it (deadline expiry).
    pub(crate) fn take_pending_write(&self, request_id: u64) -> Option<WritePromise> {
        self.lock().pending_writes.remove(&request_id)
    }

    /// Removes a pending read without resolving it (deadline expiry).
    pub(crate) fn take_pending_read(&self, request_id: u64) -> Option<ReadPromise> {
        self.lock().pending_reads.remove(&request_id)
    }

    pub(crate) fn track_receive(&self, recv_id: RecvId) {
        self.lock().active_receives.push(recv_id);
    }

    pub(crate) fn finish_receive(&self, recv_id: RecvId) {
        self.lock().active_receives.retain(|&id| id != recv_id);
    }

    /// Arms one wildcard server receive slot. Buffer ownership passes to the
    /// dispatch callback.
    pub(crate) fn post_server_receive(&self) {
        let parts = {
            let inner = self.lock();
            if !inner.initialized {
                return;
            }
            match (&inner.worker, &inner.runtime) {
                (Some(worker), Some(runtime)) => {
                    Some((worker.clone(), runtime.clone(), Arc::clone(&inner.store)))
                }
                _ => None,
            }
        };
        let Some((worker, runtime, store)) = parts else {
            return;
        };

        let callback = server::receive_callback(store, runtime);
        match worker.post_recv(
            TagMatch::wildcard(),
            None,
            limits::SERVER_RECEIVE,
            callback,
        ) {
            Ok(recv_id) => {
                self.lock().active_receives.push(recv_id);
                debug!(recv_id, "posted server receive");
            }
            Err(e) => warn!(error = %e, "failed to post server receive"),
        }
    }

    /// Sends a write acknowledgement back to a client.
    pub(crate) fn send_write_response(&self, endpoint: &Endpoint, request_id: u64, status: u32) {
        let frame = encode_write_response(request_id, status);
        let posted = endpoint.send(
            tags::WRITE_RESPONSE,
            frame,
            Box::new(move |result| {
                if let Err(e) = result {
                    warn!(request_id, error = %e, "write response send failed");
                }
            }),
        );
        if let Err(e) = posted {
            warn!(request_id, error = %e, "failed to post write response");
        }
    }

    /// Sends a read answer back to a client. `None` answers key-not-found.
    pub(crate) fn send_read_response(
        &self,
        endpoint: &Endpoint,
        request_id: u64,
        value: Option<Vec<u8>>,
    ) {
        let frame = encode_read_response(request_id, value.as_deref());
        let posted = endpoint.send(
            tags::READ_RESPONSE,
            frame,
            Box::new(move |result| {
                if let Err(e) = result {
                    warn!(request_id, error = %e, "read response send failed");
                }
            }),
        );
        if let Err(e) = posted {
            warn!(request_id, error = %e, "failed to post read response");
        }
    }

    /// Cancels every outstanding receive. The receive callbacks observe the
    /// cancellation on the next progress tick and release their slots there.
    pub fn cancel_pending_receives(&self) {
        let (worker, receives) = {
            let mut inner = self.lock();
            (inner.worker.clone(), mem::take(&mut inner.active_receives))
        };
        let Some(worker) = worker else { return };
        info!(count = receives.len(), "cancelling outstanding receives");
        for recv_id in receives {
            worker.cancel_recv(recv_id);
        }
    }

    /// Tears everything down: stops the progress loop, cancels receives,
    /// destroys the listener and endpoints, resolves every remaining pending
    /// operation (writes as cancelled, reads as missing), and drains a
    /// bounded number of progress ticks so completion callbacks quiesce.
    /// Idempotent.
    pub async fn shutdown(&self) {
        let teardown = {
            let mut inner = self.lock();
            if !inner.initialized {
                return;
            }
            inner.initialized = false;
            inner.progress_running = false;
            inner.runtime = None;
            Teardown {
                worker: inner.worker.take(),
                listener: inner.listener.take(),
                progress_task: inner.progress_task.take(),
                accepted_endpoints: mem::take(&mut inner.accepted_endpoints),
                dialed_endpoints: mem::take(&mut inner.dialed_endpoints),
                active_receives: mem::take(&mut inner.active_receives),
                pending_writes: mem::take(&mut inner.pending_writes),
                pending_reads: mem::take(&mut inner.pending_reads),
            }
        };

        info!("transport manager shutting down");

        if let Some(task) = teardown.progress_task {
            task.abort();
            let _ = task.await;
        }

        if let Some(worker) = &teardown.worker {
            for recv_id in teardown.active_receives {
                worker.cancel_recv(recv_id);
            }
        }
        if let Some(listener) = &teardown.listener {
            listener.close();
        }
        for endpoint in teardown
            .accepted_endpoints
            .iter()
            .chain(teardown.dialed_endpoints.iter())
        {
            endpoint.close();
        }

        for (request_id, promise) in teardown.pending_writes {
            debug!(request_id, "resolving pending write as cancelled");
            let _ = promise.send(Err(KvError::Cancelled));
        }
        for (request_id, promise) in teardown.pending_reads {
            debug!(request_id, "resolving pending read as missing");
            let _ = promise.send(ReadResult::missing());
        }

        if let Some(worker) = &teardown.worker {
            for _ in 0..SHUTDOWN_PROGRESS_TICKS {
                worker.progress();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            worker.close();
            worker.progress();
        }

        info!("transport manager shutdown complete");
    }

    /// Full shutdown for test isolation: the singleton survives between test
    /// cases, so suites reset it before each one.
    pub async fn reset_for_tests(&self) {
        self.shutdown().await;
    }
}

/// Parses `host:port` into an IPv4 socket address.
///
/// `localhost` maps to 127.0.0.1; anything else must be a literal IPv4
/// address. Port 0 is accepted and means "ephemeral".
fn parse_host_port(addr: &str) -> Result<SocketAddr, KvError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| KvError::Spec(format!("invalid address '{addr}', expected host:port")))?;

    let port: u16 = port
        .parse()
        .map_err(|_| KvError::Spec(format!("invalid port in '{addr}'")))?;

    let ip = if host == "localhost" {
        Ipv4Addr::LOCALHOST
    } else {
        host.parse::<Ipv4Addr>()
            .map_err(|_| KvError::Spec(format!("invalid IPv4 host in '{addr}'")))?
    };

    Ok(SocketAddr::new(IpAddr::V4(ip), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_ipv4() {
        let addr = parse_host_port("192.168.1.5:12345").unwrap();
        assert_eq!(addr.to_string(), "192.168.1.5:12345");
    }

    #[test]
    fn parses_localhost_and_any() {
        assert_eq!(
            parse_host_port("localhost:80").unwrap().to_string(),
            "127.0.0.1:80"
        );
        assert_eq!(
            parse_host_port("0.0.0.0:9000").unwrap().to_string(),
            "0.0.0.0:9000"
        );
    }

    #[test]
    fn accepts_port_zero() {
        assert_eq!(parse_host_port("127.0.0.1:0").unwrap().port(), 0);
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(parse_host_port("no-port-here").is_err());
        assert!(parse_host_port("127.0.0.1:notaport").is_err());
        assert!(parse_host_port("127.0.0.1:99999").is_err());
        assert!(parse_host_port("example.com:80").is_err());
        assert!(parse_host_port("::1:80").is_err());
    }
}
