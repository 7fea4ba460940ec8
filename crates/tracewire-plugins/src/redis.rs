//! Peer tagging for the Redisson client.
//!
//! When the client creates a connection, the connection manager's config is
//! read to find which deployment topology is in use. The addresses of that
//! topology become the peer of every command span the client later emits.

use crate::probe::CapabilityProbe;
use crate::reflect::{FieldValue, Introspect, ProbeError};
use std::sync::Arc;
use tracewire_core::AgentConfig;
use tracewire_trace::{CallPhase, Interceptor, Invocation, MethodDescriptor, shorten_peer};
use tracing::{debug, warn};

/// Method whose return value receives the resolved peer.
pub const CREATE_CLIENT: MethodDescriptor =
    MethodDescriptor::new("org.redisson.connection.MasterSlaveConnectionManager", "createClient");

const SCHEMES: [&str; 2] = ["rediss://", "redis://"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Single,
    Sentinel,
    MasterSlave,
    Cluster,
    Replicated,
}

impl Topology {
    /// Resolution order when several sub-configs are populated.
    pub const PRIORITY: [Topology; 5] = [
        Topology::Single,
        Topology::Sentinel,
        Topology::MasterSlave,
        Topology::Cluster,
        Topology::Replicated,
    ];

    pub fn config_field(self) -> &'static str {
        match self {
            Topology::Single => "singleServerConfig",
            Topology::Sentinel => "sentinelServersConfig",
            Topology::MasterSlave => "masterSlaveServersConfig",
            Topology::Cluster => "clusterServersConfig",
            Topology::Replicated => "replicatedServersConfig",
        }
    }

    fn peers(self, config: &dyn Introspect) -> Result<String, ProbeError> {
        match self {
            Topology::Single => peer_of(config.field("address")?),
            Topology::Sentinel => join_addresses("sentinelAddresses", config.field("sentinelAddresses")?),
            Topology::MasterSlave => {
                let master = peer_of(config.field("masterAddress")?)?;
                let slaves = join_addresses("slaveAddresses", config.field("slaveAddresses")?)?;
                Ok(format!("{};{}", master, slaves))
            }
            Topology::Cluster | Topology::Replicated => {
                join_addresses("nodeAddresses", config.field("nodeAddresses")?)
            }
        }
    }
}

/// A value that can carry the resolved peer, typically the created client.
pub trait PeerAware {
    fn set_peer(&mut self, peer: String);
}

/// Render one address as `host:port`.
pub fn peer_of(address: FieldValue) -> Result<String, ProbeError> {
    match address {
        FieldValue::Text(text) => Ok(strip_scheme(&text).to_string()),
        FieldValue::Uri(uri) => {
            let host = uri.host_str().ok_or(ProbeError::MissingHost)?;
            Ok(match uri.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            })
        }
        other => Err(ProbeError::UnsupportedAddress(other.kind())),
    }
}

fn strip_scheme(address: &str) -> &str {
    SCHEMES
        .iter()
        .find_map(|scheme| address.strip_prefix(scheme))
        .unwrap_or(address)
}

/// Join an address list as `a;b;`. An absent list yields an empty string.
pub fn join_addresses(field: &str, addresses: FieldValue) -> Result<String, ProbeError> {
    match addresses {
        FieldValue::Null => Ok(String::new()),
        FieldValue::List(items) => items.into_iter().try_fold(String::new(), |joined, item| {
            Ok(format!("{}{};", joined, peer_of(item)?))
        }),
        other => Err(ProbeError::TypeMismatch {
            field: field.to_string(),
            expected: "list",
            actual: other.kind(),
        }),
    }
}

/// Resolve the peers of the highest-priority populated topology.
///
/// Sub-config fields missing from the config type count as unpopulated.
pub fn resolve_peer(config: &dyn Introspect) -> Result<Option<(Topology, String)>, ProbeError> {
    for topology in Topology::PRIORITY {
        let field = topology.config_field();
        let value = match config.field(field) {
            Ok(value) => value,
            Err(ProbeError::NoSuchField { .. }) => continue,
            Err(e) => return Err(e),
        };
        if let Some(sub_config) = value.into_object(field)? {
            return topology.peers(sub_config.as_ref()).map(|peer| Some((topology, peer)));
        }
    }
    Ok(None)
}

/// Locates the client config on a connection manager across client versions.
fn config_probe() -> CapabilityProbe<dyn Introspect, Arc<dyn Introspect>> {
    CapabilityProbe::<dyn Introspect, Arc<dyn Introspect>>::new("redisson.config")
        .with("cfg", |manager| manager.field("cfg")?.into_object("cfg"))
        .with("serviceManager.cfg", |manager| {
            match manager.field("serviceManager")?.into_object("serviceManager")? {
                Some(service_manager) => service_manager.field("cfg")?.into_object("cfg"),
                None => Ok(None),
            }
        })
}

/// Tags the client returned by [`CREATE_CLIENT`] with its peer addresses.
pub struct ConnectionManagerInterceptor {
    peer_max_length: usize,
    config: CapabilityProbe<dyn Introspect, Arc<dyn Introspect>>,
}

impl ConnectionManagerInterceptor {
    pub fn new(peer_max_length: usize) -> Self {
        Self {
            peer_max_length,
            config: config_probe(),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.peer_max_length)
    }

    /// Resolve the shortened peer for a connection manager.
    pub fn resolve(&self, manager: &(dyn Introspect + 'static)) -> Result<Option<String>, ProbeError> {
        let Some(config) = self.config.probe(manager) else {
            debug!(owner = manager.type_name(), "No client config found");
            return Ok(None);
        };
        let resolved = resolve_peer(config.as_ref())?;
        Ok(resolved.map(|(topology, peer)| {
            debug!(?topology, peer = %peer, "Resolved redis peer");
            shorten_peer(&peer, self.peer_max_length).into_owned()
        }))
    }
}

impl Interceptor for ConnectionManagerInterceptor {
    type Target = dyn Introspect;
    type Args = ();
    type Output = dyn PeerAware;

    fn intercept(&self, call: &Invocation<'_, dyn Introspect, ()>, phase: CallPhase<'_, dyn PeerAware>) {
        let CallPhase::After(Some(client)) = phase else {
            return;
        };
        match self.resolve(call.target) {
            Ok(Some(peer)) => client.set_peer(peer),
            Ok(None) => {}
            Err(e) => warn!(method = %call.method, error = %e, "Failed to set redis peer"),
        }
    }
}
