//! Built-in partition assignment strategies run by the group leader.

use std::collections::HashMap;
use std::str::FromStr;

use crate::client::Metadata;
use crate::consumer::protocol::{Assignment, Subscription};
use crate::errors::{ErrorKind, Result};
use crate::network::TopicPartition;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AssignmentStrategy {
    /// Per topic, consecutive partition chunks per member.
    Range,
    /// All partitions of all topics dealt one by one over the members.
    RoundRobin,
}

impl FromStr for AssignmentStrategy {
    type Err = crate::errors::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "range" => Ok(AssignmentStrategy::Range),
            "roundrobin" => Ok(AssignmentStrategy::RoundRobin),
            _ => bail!(ErrorKind::UnsupportedAssignmentStrategy(s.to_owned())),
        }
    }
}

/// A strategy the leader may run; the protocol name travels in JoinGroup
/// and the coordinator picks one supported by every member.
pub trait PartitionAssignor: Send + Sync {
    fn name(&self) -> &'static str;

    fn strategy(&self) -> AssignmentStrategy;

    fn subscription(&self, topics: Vec<String>) -> Subscription {
        Subscription::new(topics)
    }

    /// Distribute the partitions of every subscribed topic over the
    /// members. Member ids map to their assignments.
    fn assign(
        &self,
        metadata: &Metadata,
        subscriptions: &HashMap<String, Subscription>,
    ) -> HashMap<String, Assignment>;
}

#[derive(Debug, Default)]
pub struct RangeAssignor;

impl PartitionAssignor for RangeAssignor {
    fn name(&self) -> &'static str {
        "range"
    }

    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::Range
    }

    fn assign(
        &self,
        metadata: &Metadata,
        subscriptions: &HashMap<String, Subscription>,
    ) -> HashMap<String, Assignment> {
        let mut assignments: HashMap<String, Assignment> = subscriptions
            .keys()
            .map(|member_id| (member_id.clone(), Assignment::default()))
            .collect();

        let mut topics: Vec<&String> = subscriptions
            .values()
            .flat_map(|subscription| subscription.topics.iter())
            .collect();
        topics.sort();
        topics.dedup();

        for topic_name in topics {
            let mut members: Vec<&String> = subscriptions
                .iter()
                .filter(|(_, subscription)| subscription.topics.contains(topic_name))
                .map(|(member_id, _)| member_id)
                .collect();
            members.sort();

            let partitions = match metadata.partitions(topic_name) {
                Some(partitions) if !partitions.is_empty() => partitions,
                _ => continue,
            };

            // the first (count % members) members get one extra partition
            let count = partitions.len();
            let per_member = count / members.len();
            let extra = count % members.len();

            let mut next = 0;
            for (index, member_id) in members.iter().enumerate() {
                let take = per_member + usize::from(index < extra);
                for partition in &partitions[next..next + take] {
                    assignments
                        .get_mut(*member_id)
                        .expect("member registered")
                        .partitions
                        .push(TopicPartition::new(topic_name.clone(), partition.partition));
                }
                next += take;
            }
        }

        assignments
    }
}

#[derive(Debug, Default)]
pub struct RoundRobinAssignor;

impl PartitionAssignor for RoundRobinAssignor {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn strategy(&self) -> AssignmentStrategy {
        AssignmentStrategy::RoundRobin
    }

    fn assign(
        &self,
        metadata: &Metadata,
        subscriptions: &HashMap<String, Subscription>,
    ) -> HashMap<String, Assignment> {
        let mut assignments: HashMap<String, Assignment> = subscriptions
            .keys()
            .map(|member_id| (member_id.clone(), Assignment::default()))
            .collect();

        let mut members: Vec<&String> = subscriptions.keys().collect();
        members.sort();

        let mut topics: Vec<&String> = subscriptions
            .values()
            .flat_map(|subscription| subscription.topics.iter())
            .collect();
        topics.sort();
        topics.dedup();

        let mut all_partitions = Vec::new();
        for topic_name in topics {
            if let Some(partitions) = metadata.partitions(topic_name) {
                for partition in partitions {
                    all_partitions.push(TopicPartition::new(
                        topic_name.clone(),
                        partition.partition,
                    ));
                }
            }
        }

        let mut cursor = 0usize;
        for tp in all_partitions {
            // skip members not subscribed to this topic
            for _ in 0..members.len() {
                let member_id = members[cursor % members.len()];
                cursor += 1;
                if subscriptions[member_id].topics.contains(&tp.topic_name) {
                    assignments
                        .get_mut(member_id)
                        .expect("member registered")
                        .partitions
                        .push(tp);
                    break;
                }
            }
        }

        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::protocol::{
        BrokerMetadata, MetadataResponse, PartitionMetadata, ResponseHeader, TopicMetadata,
    };

    fn metadata(topics: &[(&str, i32)]) -> Metadata {
        let response = MetadataResponse {
            header: ResponseHeader { correlation_id: 0 },
            throttle_time_ms: None,
            brokers: vec![BrokerMetadata {
                node_id: 1,
                host: "localhost".into(),
                port: 9092,
                rack: None,
            }],
            cluster_id: None,
            controller_id: 1,
            topics: topics
                .iter()
                .map(|(topic_name, partitions)| TopicMetadata {
                    error_code: 0,
                    topic_name: (*topic_name).to_owned(),
                    topic_id: uuid::Uuid::nil(),
                    is_internal: false,
                    partitions: (0..*partitions)
                        .map(|partition_index| PartitionMetadata {
                            error_code: 0,
                            partition_index,
                            leader_id: 1,
                            leader_epoch: 0,
                            replicas: vec![1],
                            isr: vec![1],
                            offline_replicas: vec![],
                        })
                        .collect(),
                })
                .collect(),
        };
        Metadata::default().merge(&response, Instant::now())
    }

    fn subscriptions(members: &[(&str, &[&str])]) -> HashMap<String, Subscription> {
        members
            .iter()
            .map(|(member_id, topics)| {
                (
                    (*member_id).to_owned(),
                    Subscription::new(topics.iter().map(|s| (*s).to_owned()).collect()),
                )
            })
            .collect()
    }

    #[test]
    fn test_round_robin_covers_all_partitions_disjointly() {
        let metadata = metadata(&[("t1", 3), ("t2", 3)]);
        let subscriptions = subscriptions(&[("c1", &["t1", "t2"]), ("c2", &["t1", "t2"])]);

        let assignments = RoundRobinAssignor.assign(&metadata, &subscriptions);

        let mut all: Vec<TopicPartition> = assignments
            .values()
            .flat_map(|assignment| assignment.partitions.iter().cloned())
            .collect();
        all.sort();
        assert_eq!(all.len(), 6);
        all.dedup();
        assert_eq!(all.len(), 6, "no partition assigned twice");

        // 3 partitions each
        assert_eq!(assignments["c1"].partitions.len(), 3);
        assert_eq!(assignments["c2"].partitions.len(), 3);
    }

    #[test]
    fn test_round_robin_single_member_owns_everything() {
        let metadata = metadata(&[("t1", 3), ("t2", 3)]);
        let subscriptions = subscriptions(&[("c2", &["t1", "t2"])]);

        let assignments = RoundRobinAssignor.assign(&metadata, &subscriptions);
        assert_eq!(assignments["c2"].partitions.len(), 6);
    }

    #[test]
    fn test_range_assigns_consecutive_chunks() {
        let metadata = metadata(&[("t", 5)]);
        let subscriptions = subscriptions(&[("c1", &["t"]), ("c2", &["t"])]);

        let assignments = RangeAssignor.assign(&metadata, &subscriptions);
        // c1 sorts first and takes the extra partition
        assert_eq!(
            assignments["c1"].partitions,
            vec![
                TopicPartition::new("t", 0),
                TopicPartition::new("t", 1),
                TopicPartition::new("t", 2),
            ]
        );
        assert_eq!(
            assignments["c2"].partitions,
            vec![TopicPartition::new("t", 3), TopicPartition::new("t", 4)]
        );
    }

    #[test]
    fn test_round_robin_respects_subscriptions() {
        let metadata = metadata(&[("t1", 2), ("t2", 2)]);
        let subscriptions = subscriptions(&[("c1", &["t1"]), ("c2", &["t2"])]);

        let assignments = RoundRobinAssignor.assign(&metadata, &subscriptions);
        assert!(assignments["c1"]
            .partitions
            .iter()
            .all(|tp| tp.topic_name == "t1"));
        assert!(assignments["c2"]
            .partitions
            .iter()
            .all(|tp| tp.topic_name == "t2"));
        assert_eq!(assignments["c1"].partitions.len(), 2);
        assert_eq!(assignments["c2"].partitions.len(), 2);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(
            "roundrobin".parse::<AssignmentStrategy>().unwrap(),
            AssignmentStrategy::RoundRobin
        );
        assert!("sticky".parse::<AssignmentStrategy>().is_err());
    }
}
