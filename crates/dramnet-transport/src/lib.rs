//! Tagged-messaging transport for dramnet.
//!
//! This crate provides the messaging engine the key-value layer is built on:
//! endpoints carry tagged messages between processes, receives are *posted*
//! ahead of time with a tag/mask matcher, and completions are delivered
//! through callbacks fired from [`Worker::progress`].
//!
//! # Model
//!
//! - A [`Context`] holds transport limits; [`Context::create_worker`] builds
//!   the per-process [`Worker`] that owns all matching state.
//! - [`Worker::connect`] dials a peer; [`Worker::listen`] accepts inbound
//!   connections and hands each new [`Endpoint`] to an accept callback.
//! - [`Worker::post_recv`] arms a receive slot with a [`TagMatch`], an
//!   optional source-endpoint filter, and a capacity cap. Messages with no
//!   matching receive wait in a bounded unexpected-message queue until one is
//!   posted. Source-filtered receives match before wildcard receives.
//! - [`Endpoint::send`] posts a tagged send; its completion callback reports
//!   the write outcome.
//! - Nothing fires until [`Worker::progress`] is called: completions queue up
//!   and are invoked from whichever task drives progress. Callbacks must not
//!   block on locks that the poster may hold while calling back into the
//!   worker; scheduling such work onto a fresh task is the expected pattern.
//!
//! On the wire each tagged message is `[u64 tag][u32 len][len bytes]`,
//! little-endian, over TCP.

mod context;
mod endpoint;
mod error;
mod listener;
mod worker;

pub use context::{Context, ContextConfig};
pub use endpoint::Endpoint;
pub use error::TransportError;
pub use listener::Listener;
pub use worker::{
    AcceptCallback, EndpointId, RecvCallback, RecvId, RecvInfo, RecvOutcome, SendCallback, Tag,
    TagMatch, Worker,
};
