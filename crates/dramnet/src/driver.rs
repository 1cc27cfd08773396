//! Driver facade: role dispatch between local store access and the client
//! request pipeline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dramnet_transport::Endpoint;
use serde::Deserialize;
use tracing::info;

use crate::client;
use crate::error::KvError;
use crate::manager::TransportManager;
use crate::types::{now_nanos, Generation, ReadResult, TimestampedGeneration};

/// Default per-request deadline (milliseconds).
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Open-spec for a driver.
///
/// Exactly one of `listen_addr` (server role) and `remote_addr` (client
/// role) must be set. Addresses are `host:port` with an IPv4 host.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DriverSpec {
    /// Bind address for server mode.
    #[serde(default)]
    pub listen_addr: Option<String>,

    /// Server address for client mode.
    #[serde(default)]
    pub remote_addr: Option<String>,

    /// Per-request deadline in milliseconds. Absent means the default
    /// (30 000); zero disables the deadline entirely.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

enum Role {
    Server(String),
    Client(String),
}

impl DriverSpec {
    /// Parses a spec from a JSON value, as handed over by a host framework.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, KvError> {
        serde_json::from_value(value.clone()).map_err(|e| KvError::Spec(e.to_string()))
    }

    fn role(&self) -> Result<Role, KvError> {
        match (&self.listen_addr, &self.remote_addr) {
            (Some(_), Some(_)) => Err(KvError::Spec(
                "cannot specify both listen_addr and remote_addr".into(),
            )),
            (None, None) => Err(KvError::Spec(
                "must specify either listen_addr (server mode) or remote_addr (client mode)"
                    .into(),
            )),
            (Some(listen), None) => Ok(Role::Server(listen.clone())),
            (None, Some(remote)) => Ok(Role::Client(remote.clone())),
        }
    }

    fn deadline(&self) -> Option<Duration> {
        match self.timeout_ms {
            None => Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

/// A key-value driver in either server or client role.
///
/// Server drivers read and write the local store directly; client drivers go
/// through the request pipeline.
#[derive(Debug)]
pub struct KvDriver {
    server_mode: bool,
    endpoint: Option<Arc<Endpoint>>,
    deadline: Option<Duration>,
}

impl KvDriver {
    /// Opens a driver: validates the spec, initialises the transport
    /// manager, and binds the listener or dials the server.
    pub async fn open(spec: DriverSpec) -> Result<Self, KvError> {
        let role = spec.role()?;
        let deadline = spec.deadline();

        let manager = TransportManager::global();
        manager.initialize()?;

        match role {
            Role::Server(addr) => {
                info!(%addr, "opening driver in server mode");
                manager.create_listener(&addr).await?;
                Ok(Self {
                    server_mode: true,
                    endpoint: None,
                    deadline,
                })
            }
            Role::Client(addr) => {
                info!(%addr, "opening driver in client mode");
                let endpoint = manager.create_client_endpoint(&addr).await?;
                Ok(Self {
                    server_mode: false,
                    endpoint: Some(endpoint),
                    deadline,
                })
            }
        }
    }

    /// Whether this driver holds the memory itself.
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.server_mode
    }

    /// Bound listener address (server mode, after open). Useful when the
    /// spec asked for an ephemeral port.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        if self.server_mode {
            TransportManager::global().listener_local_addr()
        } else {
            None
        }
    }

    /// Stores `value` under `key`.
    pub async fn write(&self, key: &[u8], value: &[u8]) -> Result<TimestampedGeneration, KvError> {
        if self.server_mode {
            let store = TransportManager::global().store();
            store.put(key.to_vec(), value.to_vec());
            Ok(TimestampedGeneration::new(Generation::from_nanos(
                now_nanos(),
            )))
        } else {
            let endpoint = self.endpoint.as_ref().ok_or(KvError::NotInitialized)?;
            client::write(endpoint, key, value, self.deadline).await
        }
    }

    /// Fetches the value under `key`; an absent key resolves as missing, not
    /// an error.
    pub async fn read(&self, key: &[u8]) -> Result<ReadResult, KvError> {
        if self.server_mode {
            let store = TransportManager::global().store();
            Ok(match store.get(key) {
                Some(value) => ReadResult {
                    state: crate::types::ReadState::Value(value),
                    stamp: TimestampedGeneration::new(Generation::from_nanos(now_nanos())),
                },
                None => ReadResult::missing(),
            })
        } else {
            let endpoint = self.endpoint.as_ref().ok_or(KvError::NotInitialized)?;
            client::read(endpoint, key, self.deadline).await
        }
    }

    /// Range deletion is not part of this driver.
    pub async fn delete_range(&self, _start: &[u8], _end: &[u8]) -> Result<(), KvError> {
        Err(KvError::Unsupported("delete_range"))
    }

    /// Key listing is not part of this driver.
    pub async fn list(&self) -> Result<Vec<Vec<u8>>, KvError> {
        Err(KvError::Unsupported("list"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_rejects_both_roles() {
        let spec = DriverSpec {
            listen_addr: Some("0.0.0.0:1".into()),
            remote_addr: Some("127.0.0.1:1".into()),
            timeout_ms: None,
        };
        assert!(matches!(spec.role(), Err(KvError::Spec(_))));
    }

    #[test]
    fn spec_rejects_no_role() {
        let spec = DriverSpec::default();
        assert!(matches!(spec.role(), Err(KvError::Spec(_))));
    }

    #[test]
    fn spec_selects_role() {
        let server = DriverSpec {
            listen_addr: Some("0.0.0.0:1".into()),
            ..Default::default()
        };
        assert!(matches!(server.role(), Ok(Role::Server(_))));

        let client = DriverSpec {
            remote_addr: Some("127.0.0.1:1".into()),
            ..Default::default()
        };
        assert!(matches!(client.role(), Ok(Role::Client(_))));
    }

    #[test]
    fn spec_deadline_defaults_and_disables() {
        assert_eq!(
            DriverSpec::default().deadline(),
            Some(Duration::from_millis(DEFAULT_TIMEOUT_MS))
        );
        let disabled = DriverSpec {
            timeout_ms: Some(0),
            ..Default::default()
        };
        assert_eq!(disabled.deadline(), None);
        let custom = DriverSpec {
            timeout_ms: Some(250),
            ..Default::default()
        };
        assert_eq!(custom.deadline(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn spec_from_json() {
        let value = serde_json::json!({ "remote_addr": "10.0.0.7:12345" });
        let spec = DriverSpec::from_json(&value).unwrap();
        assert_eq!(spec.remote_addr.as_deref(), Some("10.0.0.7:12345"));
        assert!(spec.listen_addr.is_none());

        let bad = serde_json::json!({ "timeout_ms": "not a number" });
        assert!(DriverSpec::from_json(&bad).is_err());
    }
}
