use std::collections::HashMap;

use uuid::Uuid;

use crate::protocol::{NodeId, PartitionId};

/// Parameters for one topic creation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NewTopic {
    pub name: String,
    /// -1 uses the broker default.
    pub partitions: i32,
    /// -1 uses the broker default.
    pub replicas: i16,
    /// Manual replica assignment; mutually exclusive with the counts.
    pub assignments: Vec<(PartitionId, Vec<NodeId>)>,
    pub configs: HashMap<String, String>,
}

impl NewTopic {
    pub fn new<S: Into<String>>(name: S, partitions: i32, replicas: i16) -> Self {
        NewTopic {
            name: name.into(),
            partitions,
            replicas,
            ..NewTopic::default()
        }
    }
}

/// A topic the broker accepted; the configuration map is only populated by
/// brokers new enough to return it.
#[derive(Clone, Debug, PartialEq)]
pub struct CreatedTopic {
    pub name: String,
    pub id: Uuid,
    pub partitions: i32,
    pub replicas: i16,
    pub configuration: HashMap<String, Option<String>>,
}

/// One topic in `list_topics`.
#[derive(Clone, Debug, PartialEq)]
pub struct TopicListing {
    pub name: String,
    pub id: Uuid,
    pub partitions_count: usize,
}

/// One group in `list_groups`.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupListing {
    pub protocol_type: String,
    /// Only reported by brokers with server-side state support.
    pub state: Option<String>,
}

/// The cluster as reported by DescribeCluster.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterDescription {
    pub cluster_id: String,
    pub controller_id: NodeId,
    pub brokers: Vec<(NodeId, String, i32, Option<String>)>,
}
