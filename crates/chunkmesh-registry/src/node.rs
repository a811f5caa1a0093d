//! Node records kept by the registry

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use crate::error::{RegistryError, Result};

/// Lifecycle status of a storage node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
    Inactive,
    Failed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Inactive => "inactive",
            NodeStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(NodeStatus::Active),
            "inactive" => Ok(NodeStatus::Inactive),
            "failed" => Ok(NodeStatus::Failed),
            other => Err(RegistryError::InvalidInput(format!(
                "invalid node status: {}",
                other
            ))),
        }
    }
}

/// A storage participant, independent of any live connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node identifier
    pub id: String,

    /// `host:port` the node is reachable on
    pub address: String,

    /// Current status
    pub status: NodeStatus,

    /// Bytes in use (0 <= storage_used <= storage_max)
    pub storage_used: i64,

    /// Declared capacity in bytes
    pub storage_max: i64,

    /// Last registration, heartbeat or update
    pub last_seen: DateTime<Utc>,
}

impl Node {
    /// Create a freshly registered, active node
    pub fn new(id: String, address: String, storage_max: i64) -> Self {
        Node {
            id,
            address,
            status: NodeStatus::Active,
            storage_used: 0,
            storage_max,
            last_seen: Utc::now(),
        }
    }

    /// Remaining capacity in bytes
    pub fn free_space(&self) -> i64 {
        self.storage_max - self.storage_used
    }

    /// Refresh the last-seen timestamp
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Check if the node has not been heard from within `max_age`
    pub fn is_stale(&self, max_age: Duration) -> bool {
        Utc::now() - self.last_seen > max_age
    }
}

/// Check that an address is a well-formed `host:port`
///
/// IPv6 hosts must be bracketed (`[::1]:9000`).
pub fn validate_address(address: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(RegistryError::InvalidInput(format!(
            "invalid node address {:?}: {}",
            address, reason
        )))
    };

    let Some((host, port)) = address.rsplit_once(':') else {
        return invalid("missing port");
    };

    if port.parse::<u16>().is_err() {
        return invalid("port must be a number between 0 and 65535");
    }

    if let Some(inner) = host.strip_prefix('[') {
        return match inner.strip_suffix(']') {
            Some(ip) if ip.parse::<Ipv6Addr>().is_ok() => Ok(()),
            _ => invalid("malformed IPv6 host"),
        };
    }

    if host.is_empty() {
        return invalid("missing host");
    }

    if host
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, ':' | '/' | '[' | ']' | '@'))
    {
        return invalid("illegal character in host");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node() {
        let node = Node::new("n1".to_string(), "10.0.0.1:9000".to_string(), 500);
        assert_eq!(node.status, NodeStatus::Active);
        assert_eq!(node.storage_used, 0);
        assert_eq!(node.free_space(), 500);
    }

    #[test]
    fn test_is_stale() {
        let mut node = Node::new("n1".to_string(), "10.0.0.1:9000".to_string(), 0);
        assert!(!node.is_stale(Duration::hours(1)));

        node.last_seen = Utc::now() - Duration::hours(2);
        assert!(node.is_stale(Duration::hours(1)));

        node.touch();
        assert!(!node.is_stale(Duration::hours(1)));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("active".parse::<NodeStatus>().unwrap(), NodeStatus::Active);
        assert_eq!("inactive".parse::<NodeStatus>().unwrap(), NodeStatus::Inactive);
        assert_eq!("failed".parse::<NodeStatus>().unwrap(), NodeStatus::Failed);

        assert!(matches!(
            "ACTIVE".parse::<NodeStatus>(),
            Err(RegistryError::InvalidInput(_))
        ));
        assert!("".parse::<NodeStatus>().is_err());
    }

    #[test]
    fn test_serialized_shape() {
        let node = Node::new("n1".to_string(), "10.0.0.1:9000".to_string(), 100);
        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(value["status"], "active");
        assert_eq!(value["storageUsed"], 0);
        assert_eq!(value["storageMax"], 100);
        assert!(value.get("lastSeen").is_some());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("10.0.0.1:9000").is_ok());
        assert!(validate_address("localhost:9000").is_ok());
        assert!(validate_address("node-a.example.org:1").is_ok());
        assert!(validate_address("[::1]:9000").is_ok());

        assert!(validate_address("").is_err());
        assert!(validate_address("10.0.0.1").is_err());
        assert!(validate_address(":9000").is_err());
        assert!(validate_address("host:port").is_err());
        assert!(validate_address("host:70000").is_err());
        assert!(validate_address("::1:9000").is_err());
        assert!(validate_address("[nope]:9000").is_err());
        assert!(validate_address("http://host:9000").is_err());
        assert!(validate_address("bad host:9000").is_err());
    }
}
