//! Cluster membership handle.
//!
//! Clustering itself (node discovery, work distribution) is handled outside of the runtime.
//! This service only carries the identity of the local node, so that components can ask
//! whether clustering is enabled and who they are.

use std::net::{SocketAddr, ToSocketAddrs};

use serde::{Deserialize, Serialize};

use super::Service;

/// Name under which the cluster service is usually registered.
pub const SERVICE_NAME: &str = "cluster";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterOptions {
    /// Enables clustering.
    pub enabled: bool,
    /// Name of the local node, unique in the cluster.
    pub node_name: String,
    /// Address advertised to the other nodes, as `host:port`.
    pub advertise_address: String,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            node_name: String::from("local"),
            advertise_address: String::from("127.0.0.1:12345"),
        }
    }
}

/// The cluster service.
#[derive(Debug)]
pub struct Cluster {
    enabled: bool,
    node_name: String,
    advertise_address: Option<SocketAddr>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("the node name cannot be empty when clustering is enabled")]
    EmptyNodeName,
    #[error("invalid advertise address `{address}`")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("advertise address `{0}` does not resolve to any socket address")]
    UnresolvedAddress(String),
}

impl Cluster {
    /// Creates the cluster service.
    ///
    /// When clustering is disabled, the advertise address is not checked.
    pub fn new(options: ClusterOptions) -> Result<Self, ClusterError> {
        if !options.enabled {
            return Ok(Self {
                enabled: false,
                node_name: options.node_name,
                advertise_address: None,
            });
        }
        if options.node_name.is_empty() {
            return Err(ClusterError::EmptyNodeName);
        }
        let address = options
            .advertise_address
            .to_socket_addrs()
            .map_err(|source| ClusterError::InvalidAddress {
                address: options.advertise_address.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| ClusterError::UnresolvedAddress(options.advertise_address.clone()))?;
        Ok(Self {
            enabled: true,
            node_name: options.node_name,
            advertise_address: Some(address),
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Address advertised to the other nodes, `None` if clustering is disabled.
    pub fn advertise_address(&self) -> Option<SocketAddr> {
        self.advertise_address
    }
}

impl Service for Cluster {}
