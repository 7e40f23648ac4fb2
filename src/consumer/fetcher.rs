//! The fetch loop's engine: builds per-leader Fetch requests over the
//! owned partitions, keeps incremental fetch sessions alive, decodes the
//! record batches and hands back messages in partition order.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future;

use crate::client::{BrokerRole, KafkaClient, MetadataOptions};
use crate::consumer::config::ConsumerConfig;
use crate::consumer::coordinator::ConsumerCoordinator;
use crate::consumer::subscriptions::Subscriptions;
use crate::errors::{ErrorKind, KafkaCode, Result};
use crate::network::{KafkaRequest, KafkaResponse, TopicPartition};
use crate::protocol::{
    parse_record_batches, ApiKeys, FetchOffset, FetchPartition, FetchRequest, FetchTopic,
    FetchablePartitionResponse, IsolationLevel, ListOffsetsPartition, ListOffsetsRequest,
    ListOffsetsTopic, NodeId, Offset, PartitionId, RecordHeader, SessionId, Timestamp,
    INITIAL_SESSION_EPOCH, INVALID_SESSION_ID,
};

/// One record as delivered to the application.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub topic_name: String,
    pub partition: PartitionId,
    pub offset: Offset,
    pub timestamp: Timestamp,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<RecordHeader>,
}

impl Message {
    pub fn tp(&self) -> TopicPartition {
        TopicPartition::new(self.topic_name.clone(), self.partition)
    }

    /// The offset an acknowledgement of this message commits.
    pub fn commit_offset(&self) -> Offset {
        self.offset + 1
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FetchSession {
    id: SessionId,
    epoch: i32,
}

pub struct Fetcher {
    client: KafkaClient,
    config: ConsumerConfig,
    subscriptions: Arc<Mutex<Subscriptions>>,
    sessions: Mutex<HashMap<NodeId, FetchSession>>,
}

impl Fetcher {
    pub fn new(
        client: KafkaClient,
        config: ConsumerConfig,
        subscriptions: Arc<Mutex<Subscriptions>>,
    ) -> Self {
        Fetcher {
            client,
            config,
            subscriptions,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve start positions for partitions that lack one, per the
    /// configured mode.
    pub async fn reset_offsets(&self, coordinator: &ConsumerCoordinator) -> Result<()> {
        let missing = self.subscriptions.lock().unwrap().missing_positions();
        if missing.is_empty() {
            return Ok(());
        }

        debug!("resolving start offsets for {:?}", missing);

        let mut remaining = missing;
        if self.config.mode == FetchOffset::Committed {
            let committed = coordinator.fetch_committed(&remaining).await?;
            let mut subscriptions = self.subscriptions.lock().unwrap();
            remaining.retain(|tp| match committed.get(tp) {
                Some(offset) => {
                    // the committed offset is the next one to read
                    subscriptions.update_position(tp, *offset);
                    subscriptions.set_committed(tp, *offset);
                    false
                }
                None => true,
            });
        }

        if remaining.is_empty() {
            return Ok(());
        }

        // COMMITTED falls back to the earliest offset for uncommitted
        // partitions
        let timestamp = self.config.mode.timestamp();
        let offsets = self.offsets_for_times(remaining, timestamp).await?;

        let mut subscriptions = self.subscriptions.lock().unwrap();
        for (tp, offset) in offsets {
            subscriptions.update_position(&tp, offset);
        }
        Ok(())
    }

    /// ListOffsets for a set of partitions against their leaders.
    pub async fn offsets_for_times(
        &self,
        partitions: Vec<TopicPartition>,
        timestamp: Timestamp,
    ) -> Result<HashMap<TopicPartition, Offset>> {
        if partitions.is_empty() {
            return Ok(HashMap::new());
        }

        let topics: Vec<String> = partitions
            .iter()
            .map(|tp| tp.topic_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let metadata = self.client.metadata(MetadataOptions::topics(topics)).await?;

        let mut by_leader: HashMap<NodeId, Vec<TopicPartition>> = HashMap::new();
        for tp in partitions {
            let leader = metadata
                .leader_broker(&tp)
                .ok_or(ErrorKind::KafkaError(KafkaCode::LeaderNotAvailable))?
                .id();
            by_leader.entry(leader).or_default().push(tp);
        }

        let responses = future::join_all(by_leader.into_iter().map(|(node_id, partitions)| {
            self.list_offsets_once(node_id, partitions, timestamp)
        }))
        .await;

        let mut offsets = HashMap::new();
        for response in responses {
            offsets.extend(response?);
        }
        Ok(offsets)
    }

    async fn list_offsets_once(
        &self,
        node_id: NodeId,
        partitions: Vec<TopicPartition>,
        timestamp: Timestamp,
    ) -> Result<HashMap<TopicPartition, Offset>> {
        let conn = self.client.conn_for(&BrokerRole::Node(node_id)).await?;
        let api_version = conn.version_for(ApiKeys::ListOffsets)?;

        let mut topics: HashMap<String, Vec<ListOffsetsPartition>> = HashMap::new();
        for tp in &partitions {
            topics
                .entry(tp.topic_name.clone())
                .or_default()
                .push(ListOffsetsPartition {
                    partition: tp.partition,
                    current_leader_epoch: -1,
                    timestamp,
                });
        }

        let request = KafkaRequest::ListOffsets(ListOffsetsRequest {
            header: conn.request_header(ApiKeys::ListOffsets, api_version),
            isolation_level: self.config.isolation as i8,
            topics: topics
                .into_iter()
                .map(|(topic_name, partitions)| ListOffsetsTopic {
                    topic_name,
                    partitions,
                })
                .collect(),
        });

        let response = match conn.send(request).await? {
            KafkaResponse::ListOffsets(res) => res,
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        };

        let mut offsets = HashMap::new();
        for topic in response.topics {
            for partition in topic.partitions {
                if partition.error_code != 0 {
                    bail!(ErrorKind::ProtocolError(
                        ApiKeys::ListOffsets.key(),
                        KafkaCode::from(partition.error_code),
                        format!(
                            "/topics/{}/partitions/{}",
                            topic.topic_name, partition.partition
                        ),
                    ));
                }
                offsets.insert(
                    TopicPartition::new(topic.topic_name.clone(), partition.partition),
                    partition.offset,
                );
            }
        }
        Ok(offsets)
    }

    /// One round of fetches over every fetchable partition, grouped by
    /// leader; returns the decoded messages in per-partition offset order.
    pub async fn fetch_once(&self) -> Result<Vec<Message>> {
        let fetchable = self.subscriptions.lock().unwrap().fetchable();
        if fetchable.is_empty() {
            return Ok(Vec::new());
        }

        let topics: Vec<String> = fetchable
            .iter()
            .map(|(tp, _)| tp.topic_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let metadata = self.client.metadata(MetadataOptions::topics(topics)).await?;

        let mut by_leader: HashMap<NodeId, Vec<(TopicPartition, Offset)>> = HashMap::new();
        for (tp, position) in fetchable {
            match metadata.leader_broker(&tp) {
                Some(leader) => by_leader
                    .entry(leader.id())
                    .or_default()
                    .push((tp, position)),
                None => {
                    self.client
                        .invalidate_metadata(Some(&tp.topic_name), "fetch leader unknown");
                }
            }
        }

        let responses = future::join_all(
            by_leader
                .into_iter()
                .map(|(node_id, partitions)| self.fetch_from_node(node_id, partitions)),
        )
        .await;

        let mut messages = Vec::new();
        for response in responses {
            match response {
                Ok(mut node_messages) => messages.append(&mut node_messages),
                Err(err) if err.is_retriable() => {
                    warn!("fetch failed, will retry, {}", err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(messages)
    }

    async fn fetch_from_node(
        &self,
        node_id: NodeId,
        partitions: Vec<(TopicPartition, Offset)>,
    ) -> Result<Vec<Message>> {
        let conn = self.client.conn_for(&BrokerRole::Node(node_id)).await?;
        let api_version = conn.version_for(ApiKeys::Fetch)?;
        let session = *self
            .sessions
            .lock()
            .unwrap()
            .entry(node_id)
            .or_insert(FetchSession {
                id: INVALID_SESSION_ID,
                epoch: INITIAL_SESSION_EPOCH,
            });

        let mut positions: HashMap<TopicPartition, Offset> = HashMap::new();
        let mut topics: Vec<FetchTopic> = Vec::new();
        for (tp, position) in partitions {
            match topics
                .iter_mut()
                .find(|topic| topic.topic_name == tp.topic_name)
            {
                Some(topic) => topic.partitions.push(fetch_partition(&tp, position, &self.config)),
                None => topics.push(FetchTopic {
                    topic_name: tp.topic_name.clone(),
                    partitions: vec![fetch_partition(&tp, position, &self.config)],
                }),
            }
            positions.insert(tp, position);
        }

        let request = KafkaRequest::Fetch(FetchRequest {
            header: conn.request_header(ApiKeys::Fetch, api_version),
            max_wait_ms: self.config.max_wait_ms as i32,
            min_bytes: self.config.min_bytes,
            max_bytes: self.config.max_bytes,
            isolation_level: self.config.isolation as i8,
            session_id: session.id,
            session_epoch: session.epoch,
            topics,
            forgotten_topics: Vec::new(),
            rack_id: String::new(),
        });

        let fetch_timeout =
            self.config.max_wait() + self.client.config().request_timeout();
        let response = match conn.send_with_timeout(request, fetch_timeout).await? {
            KafkaResponse::Fetch(res) => res,
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        };

        match KafkaCode::from(response.error_code) {
            KafkaCode::None => {
                let mut sessions = self.sessions.lock().unwrap();
                sessions.insert(
                    node_id,
                    FetchSession {
                        id: response.session_id,
                        epoch: if response.session_id == INVALID_SESSION_ID {
                            INITIAL_SESSION_EPOCH
                        } else {
                            session.epoch.wrapping_add(1).max(1)
                        },
                    },
                );
            }
            KafkaCode::FetchSessionIdNotFound | KafkaCode::InvalidFetchSessionEpoch => {
                debug!("fetch session with broker #{} lost, starting over", node_id);
                self.sessions.lock().unwrap().remove(&node_id);
                return Ok(Vec::new());
            }
            code => bail!(ErrorKind::KafkaError(code)),
        }

        let mut messages = Vec::new();
        for topic in response.topics {
            for partition in topic.partitions {
                let tp = TopicPartition::new(topic.topic_name.clone(), partition.partition);
                let fetch_offset = match positions.get(&tp) {
                    Some(position) => *position,
                    // a partition we did not ask for in this session round
                    None => continue,
                };
                self.deliver_partition(&tp, fetch_offset, partition, &mut messages)?;
            }
        }
        Ok(messages)
    }

    fn deliver_partition(
        &self,
        tp: &TopicPartition,
        fetch_offset: Offset,
        partition: FetchablePartitionResponse,
        messages: &mut Vec<Message>,
    ) -> Result<()> {
        match KafkaCode::from(partition.error_code) {
            KafkaCode::None => {}
            KafkaCode::OffsetOutOfRange => {
                warn!("offset {} out of range for {}, resetting", fetch_offset, tp);
                self.subscriptions.lock().unwrap().clear_position(tp);
                return Ok(());
            }
            code @ (KafkaCode::NotLeaderOrFollower
            | KafkaCode::UnknownTopicOrPartition
            | KafkaCode::FencedLeaderEpoch
            | KafkaCode::LeaderNotAvailable) => {
                self.client
                    .invalidate_metadata(Some(&tp.topic_name), "fetch rejected");
                debug!("fetch from {} rejected, {:?}", tp, code);
                return Ok(());
            }
            code => bail!(ErrorKind::ProtocolError(
                ApiKeys::Fetch.key(),
                code,
                format!("/topics/{}/partitions/{}", tp.topic_name, tp.partition),
            )),
        }

        let records = match &partition.records {
            Some(records) if !records.is_empty() => records,
            _ => return Ok(()),
        };

        let read_committed = self.config.isolation == IsolationLevel::ReadCommitted;
        let mut aborted: Vec<(i64, Offset)> = partition
            .aborted_transactions
            .iter()
            .map(|txn| (txn.producer_id, txn.first_offset))
            .collect();
        aborted.sort_by_key(|(_, first_offset)| *first_offset);
        let mut aborted_producers: HashSet<i64> = HashSet::new();

        let mut position = fetch_offset;
        for batch in parse_record_batches(records)? {
            if read_committed {
                // activate aborted transactions that begin at or before
                // this batch
                while let Some((producer_id, first_offset)) = aborted.first().copied() {
                    if first_offset <= batch.base_offset {
                        aborted_producers.insert(producer_id);
                        aborted.remove(0);
                    } else {
                        break;
                    }
                }
            }

            if batch.is_control() {
                // commit/abort marker ends the producer's transaction
                aborted_producers.remove(&batch.producer_id);
                position = position.max(batch.next_offset());
                continue;
            }

            if read_committed
                && batch.is_transactional()
                && aborted_producers.contains(&batch.producer_id)
            {
                position = position.max(batch.next_offset());
                continue;
            }

            for record in &batch.records {
                // records in front of the requested offset appear at
                // compressed batch boundaries
                if record.offset < fetch_offset {
                    continue;
                }
                messages.push(Message {
                    topic_name: tp.topic_name.clone(),
                    partition: tp.partition,
                    offset: record.offset,
                    timestamp: record.timestamp,
                    key: record.key.clone(),
                    value: record.value.clone(),
                    headers: record.headers.clone(),
                });
            }
            position = position.max(batch.next_offset());
        }

        let mut subscriptions = self.subscriptions.lock().unwrap();
        // the assignment may have changed while the fetch was in flight
        if subscriptions.is_assigned(tp) {
            if position > fetch_offset {
                subscriptions.update_position(tp, position);
            }
            subscriptions.update_high_watermark(tp, partition.high_watermark);
        } else {
            // drop messages for revoked partitions
            messages.retain(|message| message.topic_name != tp.topic_name
                || message.partition != tp.partition);
        }

        Ok(())
    }

    /// Forget the incremental sessions; the brokers expire them on their
    /// own once the epoch stops advancing.
    pub fn invalidate_sessions(&self) {
        self.sessions.lock().unwrap().clear();
    }
}

fn fetch_partition(tp: &TopicPartition, position: Offset, config: &ConsumerConfig) -> FetchPartition {
    FetchPartition {
        partition: tp.partition,
        current_leader_epoch: -1,
        fetch_offset: position,
        log_start_offset: -1,
        partition_max_bytes: config.partition_max_bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_commit_offset() {
        let message = Message {
            topic_name: "t".into(),
            partition: 0,
            offset: 41,
            timestamp: 0,
            key: None,
            value: None,
            headers: Vec::new(),
        };
        assert_eq!(message.commit_offset(), 42);
        assert_eq!(message.tp(), TopicPartition::new("t", 0));
    }
}
