//! The cluster view: an immutable snapshot per refresh, plus a cache that
//! tracks per-topic age and staleness so only out-of-date slices are
//! refetched.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::client::cluster::{Broker, BrokerRef, Cluster};
use crate::errors::KafkaCode;
use crate::network::TopicPartition;
use crate::protocol::{MetadataResponse, NodeId, PartitionId};

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionInfo {
    pub partition: PartitionId,
    pub leader: Option<BrokerRef>,
    pub leader_epoch: i32,
    pub replicas: Vec<NodeId>,
    pub isr: Vec<NodeId>,
    pub offline_replicas: Vec<NodeId>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicInfo {
    pub id: Uuid,
    pub error: Option<KafkaCode>,
    pub partitions: Vec<PartitionInfo>,
    pub last_update: Instant,
}

impl TopicInfo {
    pub fn partitions_count(&self) -> usize {
        self.partitions.len()
    }
}

/// One immutable cluster snapshot; readers either see this one or a newer
/// one, never a torn mix.
#[derive(Clone, Debug)]
pub struct Metadata {
    cluster_id: Option<String>,
    controller: Option<BrokerRef>,
    brokers: HashMap<NodeId, Broker>,
    topics: HashMap<String, TopicInfo>,
    last_update: Instant,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            cluster_id: None,
            controller: None,
            brokers: HashMap::new(),
            topics: HashMap::new(),
            last_update: Instant::now(),
        }
    }
}

impl Metadata {
    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    pub fn controller(&self) -> Option<&Broker> {
        self.controller
            .and_then(|controller| self.brokers.get(&controller.node_id()))
    }

    pub fn broker(&self, node_id: NodeId) -> Option<&Broker> {
        self.brokers.get(&node_id)
    }

    pub fn all_brokers(&self) -> Vec<&Broker> {
        self.brokers.values().collect()
    }

    pub fn topic(&self, topic_name: &str) -> Option<&TopicInfo> {
        self.topics.get(topic_name)
    }

    pub fn topics(&self) -> &HashMap<String, TopicInfo> {
        &self.topics
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn partitions(&self, topic_name: &str) -> Option<&[PartitionInfo]> {
        self.topics
            .get(topic_name)
            .map(|topic| topic.partitions.as_slice())
    }

    pub fn partition(&self, tp: &TopicPartition) -> Option<&PartitionInfo> {
        self.partitions(&tp.topic_name)?
            .iter()
            .find(|partition| partition.partition == tp.partition)
    }

    pub fn leader_broker(&self, tp: &TopicPartition) -> Option<&Broker> {
        let leader = self.partition(tp)?.leader?;
        self.brokers.get(&leader.node_id())
    }

    /// Merge a metadata response into this snapshot, producing a new one.
    ///
    /// Partitions never regress below their known leader epoch: a response
    /// carrying an older epoch for a partition keeps the cached entry.
    pub fn merge(&self, response: &MetadataResponse, now: Instant) -> Metadata {
        let mut brokers = HashMap::with_capacity(response.brokers.len());
        for broker in &response.brokers {
            brokers.insert(
                broker.node_id,
                Broker::new(
                    broker.node_id,
                    broker.host.as_str(),
                    broker.port,
                    broker.rack.clone(),
                ),
            );
        }

        let mut topics = self.topics.clone();
        for topic in &response.topics {
            let error = match KafkaCode::from(topic.error_code) {
                KafkaCode::None => None,
                code => Some(code),
            };

            let mut partitions: Vec<PartitionInfo> = topic
                .partitions
                .iter()
                .map(|partition| PartitionInfo {
                    partition: partition.partition_index,
                    leader: (partition.leader_id >= 0)
                        .then(|| BrokerRef::new(partition.leader_id)),
                    leader_epoch: partition.leader_epoch,
                    replicas: partition.replicas.clone(),
                    isr: partition.isr.clone(),
                    offline_replicas: partition.offline_replicas.clone(),
                })
                .collect();
            partitions.sort_by_key(|partition| partition.partition);

            if let Some(known) = topics.get(&topic.topic_name) {
                for partition in &mut partitions {
                    if let Some(cached) = known
                        .partitions
                        .iter()
                        .find(|cached| cached.partition == partition.partition)
                    {
                        if cached.leader_epoch > partition.leader_epoch {
                            *partition = cached.clone();
                        }
                    }
                }
            }

            topics.insert(
                topic.topic_name.clone(),
                TopicInfo {
                    id: topic.topic_id,
                    error,
                    partitions,
                    last_update: now,
                },
            );
        }

        Metadata {
            cluster_id: response
                .cluster_id
                .clone()
                .or_else(|| self.cluster_id.clone()),
            controller: (response.controller_id >= 0)
                .then(|| BrokerRef::new(response.controller_id)),
            brokers,
            topics,
            last_update: now,
        }
    }
}

impl Cluster for Metadata {
    fn brokers(&self) -> Vec<&Broker> {
        self.all_brokers()
    }

    fn topic_names(&self) -> Vec<&str> {
        self.topics.keys().map(String::as_str).collect()
    }

    fn partitions_for_topic(&self, topic_name: &str) -> Option<Vec<PartitionId>> {
        self.partitions(topic_name).map(|partitions| {
            partitions
                .iter()
                .map(|partition| partition.partition)
                .collect()
        })
    }

    fn leader_for(&self, tp: &TopicPartition) -> Option<&Broker> {
        self.leader_broker(tp)
    }
}

struct CacheState {
    current: Arc<Metadata>,
    stale_topics: HashSet<String>,
    all_stale: bool,
}

/// Shared cache over snapshots with TTL and staleness marks.
pub struct MetadataCache {
    max_age: Duration,
    state: Mutex<CacheState>,
}

impl MetadataCache {
    pub fn new(max_age: Duration) -> Self {
        MetadataCache {
            max_age,
            state: Mutex::new(CacheState {
                current: Arc::new(Metadata::default()),
                stale_topics: HashSet::new(),
                all_stale: true,
            }),
        }
    }

    pub fn snapshot(&self) -> Arc<Metadata> {
        self.state.lock().unwrap().current.clone()
    }

    /// Which of the requested topics must be refetched right now. `None`
    /// when the cache can serve the request as-is.
    pub fn stale_topics(&self, topics: &[String], now: Instant) -> Option<Vec<String>> {
        let state = self.state.lock().unwrap();

        if state.all_stale {
            return Some(topics.to_vec());
        }

        let stale: Vec<String> = topics
            .iter()
            .filter(|topic_name| {
                if state.stale_topics.contains(*topic_name) {
                    return true;
                }
                match state.current.topic(topic_name) {
                    Some(topic) => now.duration_since(topic.last_update) >= self.max_age,
                    None => true,
                }
            })
            .cloned()
            .collect();

        if stale.is_empty() {
            None
        } else {
            Some(stale)
        }
    }

    /// Whether a whole-cluster read can be served from cache.
    pub fn cluster_stale(&self, now: Instant) -> bool {
        let state = self.state.lock().unwrap();
        state.all_stale || now.duration_since(state.current.last_update()) >= self.max_age
    }

    /// Swap in a merged snapshot; keeps the newer one if another writer
    /// got there first.
    pub fn update(&self, metadata: Metadata, refreshed_topics: Option<&[String]>) -> Arc<Metadata> {
        let mut state = self.state.lock().unwrap();

        if metadata.last_update() >= state.current.last_update() {
            state.current = Arc::new(metadata);
        }
        match refreshed_topics {
            Some(topics) => {
                for topic_name in topics {
                    state.stale_topics.remove(topic_name);
                }
            }
            None => {
                state.stale_topics.clear();
                state.all_stale = false;
            }
        }
        if state.stale_topics.is_empty() {
            state.all_stale = false;
        }
        state.current.clone()
    }

    /// Mark one topic stale, e.g. after NOT_LEADER_OR_FOLLOWER or
    /// UNKNOWN_TOPIC_OR_PARTITION.
    pub fn invalidate_topic(&self, topic_name: &str) {
        debug!("marking topic `{}` metadata stale", topic_name);
        self.state
            .lock()
            .unwrap()
            .stale_topics
            .insert(topic_name.to_owned());
    }

    /// Mark everything stale, e.g. after NOT_CONTROLLER or NOT_COORDINATOR.
    pub fn invalidate_all(&self, reason: &str) {
        debug!("marking all metadata stale, {}", reason);
        self.state.lock().unwrap().all_stale = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BrokerMetadata, PartitionMetadata as WirePartition, TopicMetadata};

    fn response(leader_epoch: i32, leader_id: NodeId) -> MetadataResponse {
        MetadataResponse {
            header: crate::protocol::ResponseHeader { correlation_id: 0 },
            throttle_time_ms: None,
            brokers: vec![BrokerMetadata {
                node_id: 1,
                host: "localhost".into(),
                port: 9092,
                rack: None,
            }],
            cluster_id: Some("cluster".into()),
            controller_id: 1,
            topics: vec![TopicMetadata {
                error_code: 0,
                topic_name: "t".into(),
                topic_id: Uuid::nil(),
                is_internal: false,
                partitions: vec![WirePartition {
                    error_code: 0,
                    partition_index: 0,
                    leader_id,
                    leader_epoch,
                    replicas: vec![1],
                    isr: vec![1],
                    offline_replicas: vec![],
                }],
            }],
        }
    }

    #[test]
    fn test_merge_builds_view() {
        let now = Instant::now();
        let metadata = Metadata::default().merge(&response(5, 1), now);

        assert_eq!(metadata.cluster_id(), Some("cluster"));
        assert_eq!(metadata.controller().unwrap().id(), 1);
        let tp = TopicPartition::new("t", 0);
        assert_eq!(metadata.leader_broker(&tp).unwrap().id(), 1);
        assert_eq!(metadata.partition(&tp).unwrap().leader_epoch, 5);
    }

    #[test]
    fn test_merge_never_regresses_leader_epoch() {
        let now = Instant::now();
        let fresh = Metadata::default().merge(&response(5, 1), now);
        let merged = fresh.merge(&response(3, 1), now + Duration::from_secs(1));

        let tp = TopicPartition::new("t", 0);
        assert_eq!(merged.partition(&tp).unwrap().leader_epoch, 5);

        let advanced = merged.merge(&response(6, 1), now + Duration::from_secs(2));
        assert_eq!(advanced.partition(&tp).unwrap().leader_epoch, 6);
    }

    #[test]
    fn test_cache_staleness() {
        let cache = MetadataCache::new(Duration::from_secs(300));
        let now = Instant::now();

        // empty cache: everything is stale
        let stale = cache.stale_topics(&["t".to_owned()], now).unwrap();
        assert_eq!(stale, vec!["t".to_owned()]);

        let metadata = Metadata::default().merge(&response(1, 1), now);
        cache.update(metadata, None);
        assert_eq!(cache.stale_topics(&["t".to_owned()], now), None);

        // unknown topics must be fetched
        assert_eq!(
            cache.stale_topics(&["other".to_owned()], now),
            Some(vec!["other".to_owned()])
        );

        cache.invalidate_topic("t");
        assert_eq!(
            cache.stale_topics(&["t".to_owned()], now),
            Some(vec!["t".to_owned()])
        );

        cache.invalidate_all("test");
        assert_eq!(
            cache.stale_topics(&["t".to_owned()], now),
            Some(vec!["t".to_owned()])
        );
    }

    #[test]
    fn test_cache_update_clears_marks() {
        let cache = MetadataCache::new(Duration::from_secs(300));
        let now = Instant::now();

        cache.invalidate_topic("t");
        let metadata = Metadata::default().merge(&response(1, 1), now);
        cache.update(metadata, Some(&["t".to_owned()]));
        assert_eq!(cache.stale_topics(&["t".to_owned()], now), None);
    }
}
