use std::hash::Hasher;
use std::sync::atomic::{AtomicUsize, Ordering};

use twox_hash::XxHash32;

use crate::client::Metadata;
use crate::protocol::PartitionId;

/// Seed fixed forever so a key maps to the same partition across restarts
/// of this client.
const PARTITION_HASH_SEED: u32 = 0x9747_b28c;

/// Chooses the partition for records that do not name one.
pub trait Partitioner: Send + Sync {
    /// `None` when the topic has no partition with a live leader.
    fn partition(
        &self,
        topic_name: &str,
        partition: Option<PartitionId>,
        key: Option<&[u8]>,
        metadata: &Metadata,
    ) -> Option<PartitionId>;
}

/// The stock strategy: explicit partition wins, keyed records stick to a
/// hash of the key, unkeyed records round-robin over partitions that
/// currently have a leader.
#[derive(Debug, Default)]
pub struct DefaultPartitioner {
    records: AtomicUsize,
}

impl Partitioner for DefaultPartitioner {
    fn partition(
        &self,
        topic_name: &str,
        partition: Option<PartitionId>,
        key: Option<&[u8]>,
        metadata: &Metadata,
    ) -> Option<PartitionId> {
        if let Some(partition) = partition {
            return Some(partition);
        }

        let partitions = metadata.partitions(topic_name)?;
        if partitions.is_empty() {
            return None;
        }

        let available: Vec<PartitionId> = partitions
            .iter()
            .filter(|info| info.leader.is_some())
            .map(|info| info.partition)
            .collect();

        match key {
            Some(key) => {
                // keyed records hash over every partition so the mapping is
                // stable even while some leaders are offline
                let mut hasher = XxHash32::with_seed(PARTITION_HASH_SEED);
                hasher.write(key);
                let index = (hasher.finish() as u32 as usize) % partitions.len();
                Some(partitions[index].partition)
            }
            None if available.is_empty() => None,
            None => {
                let index = self.records.fetch_add(1, Ordering::Relaxed) % available.len();
                Some(available[index])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::protocol::{
        BrokerMetadata, MetadataResponse, PartitionMetadata, ResponseHeader, TopicMetadata,
    };

    fn metadata(partitions: i32) -> Metadata {
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
            topics: vec![TopicMetadata {
                error_code: 0,
                topic_name: "t".into(),
                topic_id: uuid::Uuid::nil(),
                is_internal: false,
                partitions: (0..partitions)
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
            }],
        };
        Metadata::default().merge(&response, Instant::now())
    }

    #[test]
    fn test_explicit_partition_wins() {
        let partitioner = DefaultPartitioner::default();
        let metadata = metadata(3);
        assert_eq!(
            partitioner.partition("t", Some(2), Some(b"key"), &metadata),
            Some(2)
        );
    }

    #[test]
    fn test_keyed_records_are_sticky() {
        let partitioner = DefaultPartitioner::default();
        let metadata = metadata(12);

        let first = partitioner.partition("t", None, Some(b"user-42"), &metadata);
        for _ in 0..10 {
            assert_eq!(
                partitioner.partition("t", None, Some(b"user-42"), &metadata),
                first
            );
        }
    }

    #[test]
    fn test_unkeyed_records_round_robin() {
        let partitioner = DefaultPartitioner::default();
        let metadata = metadata(3);

        let picks: Vec<_> = (0..6)
            .map(|_| partitioner.partition("t", None, None, &metadata).unwrap())
            .collect();
        assert_eq!(picks[..3], picks[3..]);
        let mut sorted = picks[..3].to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_topic() {
        let partitioner = DefaultPartitioner::default();
        let metadata = metadata(1);
        assert_eq!(partitioner.partition("missing", None, None, &metadata), None);
    }
}
