//! Remote in-memory key-value store over tagged messaging.
//!
//! One process opens a [`KvDriver`] with a `listen_addr` and becomes the
//! memory server, retaining keys in DRAM; other processes open drivers with a
//! `remote_addr` and issue reads and writes against it. Values are immutable
//! byte blobs, keys are arbitrary byte strings.
//!
//! The moving parts:
//!
//! - [`TransportManager`] — the process singleton owning the transport
//!   worker, the progress loop, endpoint registries, and the pending-request
//!   tables.
//! - The client request pipeline encodes a request frame, posts a receive
//!   for the matching response tag, posts the send, and resolves when the
//!   correlated response arrives (or the deadline fires).
//! - The server dispatch decodes received frames, mutates the store, emits
//!   response frames to the sending endpoint, and re-arms its receive slots.
//!
//! ```ignore
//! use dramnet::{DriverSpec, KvDriver};
//!
//! let server = KvDriver::open(DriverSpec {
//!     listen_addr: Some("0.0.0.0:12345".into()),
//!     ..Default::default()
//! })
//! .await?;
//!
//! let client = KvDriver::open(DriverSpec {
//!     remote_addr: Some("10.0.0.7:12345".into()),
//!     ..Default::default()
//! })
//! .await?;
//!
//! client.write(b"testkey", b"Data from Node 1").await?;
//! let result = client.read(b"testkey").await?;
//! ```

mod client;
mod driver;
mod error;
mod manager;
mod server;
mod types;

pub use driver::{DriverSpec, KvDriver};
pub use error::KvError;
pub use manager::TransportManager;
pub use types::{Generation, ReadResult, ReadState, TimestampedGeneration};
