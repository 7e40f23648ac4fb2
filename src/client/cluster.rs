use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use crate::errors::{ErrorKind, Result};
use crate::network::TopicPartition;
use crate::protocol::{NodeId, PartitionId};

/// A broker node as learned from metadata. Immutable once learned;
/// replaced wholesale on refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Broker {
    node_id: NodeId,
    host: String,
    port: i32,
    rack: Option<String>,
}

impl Broker {
    pub fn new<S: Into<String>>(node_id: NodeId, host: S, port: i32, rack: Option<String>) -> Self {
        Broker {
            node_id,
            host: host.into(),
            port,
            rack,
        }
    }

    pub fn id(&self) -> NodeId {
        self.node_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    pub fn rack(&self) -> Option<&str> {
        self.rack.as_deref()
    }

    pub fn as_ref(&self) -> BrokerRef {
        BrokerRef(self.node_id)
    }

    /// Resolve the advertised address; picks the first resolution result.
    pub fn addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port as u16)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ErrorKind::BrokerNotFound(self.node_id).into())
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{} @ {}:{}", self.node_id, self.host, self.port)
    }
}

/// A lightweight handle to a broker by node id.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BrokerRef(NodeId);

impl BrokerRef {
    pub fn new(node_id: NodeId) -> Self {
        BrokerRef(node_id)
    }

    pub fn node_id(self) -> NodeId {
        self.0
    }
}

impl fmt::Display for BrokerRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<NodeId> for BrokerRef {
    fn from(node_id: NodeId) -> Self {
        BrokerRef(node_id)
    }
}

/// Read access to the cluster topology, implemented by the metadata
/// snapshot; the consumer-side assignors only see this view.
pub trait Cluster {
    fn brokers(&self) -> Vec<&Broker>;

    fn topic_names(&self) -> Vec<&str>;

    fn partitions_for_topic(&self, topic_name: &str) -> Option<Vec<PartitionId>>;

    fn leader_for(&self, tp: &TopicPartition) -> Option<&Broker>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_accessors() {
        let broker = Broker::new(3, "localhost", 9092, Some("r1".into()));
        assert_eq!(broker.id(), 3);
        assert_eq!(broker.rack(), Some("r1"));
        assert_eq!(broker.as_ref(), BrokerRef::new(3));
        assert_eq!(broker.to_string(), "#3 @ localhost:9092");

        let addr = broker.addr().unwrap();
        assert_eq!(addr.port(), 9092);
    }
}
