//! The background half of the producer: drains the accumulator, groups
//! batches by partition leader, issues Produce requests in parallel and
//! settles every record's completion handle.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future;
use tokio::sync::{watch, Notify};

use crate::client::{BrokerRole, KafkaClient, MetadataOptions};
use crate::errors::{ErrorKind, KafkaCode, Result};
use crate::network::{KafkaRequest, KafkaResponse, TopicPartition};
use crate::producer::accumulator::RecordAccumulator;
use crate::producer::batch::ProducerBatch;
use crate::producer::config::ProducerConfig;
use crate::producer::txn::TransactionState;
use crate::protocol::{
    ApiKeys, NodeId, PartitionProduceData, ProduceRequest, RequiredAcks, TopicProduceData,
};

const IDLE_TICK: Duration = Duration::from_millis(5);

pub struct Sender {
    client: KafkaClient,
    config: ProducerConfig,
    accumulator: Arc<RecordAccumulator>,
    txn: Arc<Mutex<TransactionState>>,
    /// Partitions with an in-flight batch; held back from draining so at
    /// most one batch per partition is on the wire (sequencing).
    in_flight: Mutex<HashSet<TopicPartition>>,
    /// Signalled at the end of every cycle; `flush` waits on it.
    cycle_done: Notify,
}

impl Sender {
    pub fn new(
        client: KafkaClient,
        config: ProducerConfig,
        accumulator: Arc<RecordAccumulator>,
        txn: Arc<Mutex<TransactionState>>,
    ) -> Self {
        Sender {
            client,
            config,
            accumulator,
            txn,
            in_flight: Mutex::new(HashSet::new()),
            cycle_done: Notify::new(),
        }
    }

    /// The drive loop, spawned once per producer.
    pub async fn run(self: Arc<Self>, mut closed: watch::Receiver<bool>) {
        let tick = self.config.linger().max(IDLE_TICK);

        loop {
            tokio::select! {
                _ = self.accumulator.wakeup().notified() => {}
                _ = tokio::time::sleep(tick) => {}
                _ = closed.changed() => break,
            }
            if *closed.borrow() {
                break;
            }
            self.run_once(false).await;
        }

        // one last forced pass, then fail the rest
        self.run_once(true).await;
        self.accumulator.abort("producer closed");
        self.cycle_done.notify_waiters();
    }

    /// Everything drained and acknowledged.
    pub async fn flush(&self) {
        loop {
            {
                let idle = !self.accumulator.has_pending()
                    && self.in_flight.lock().unwrap().is_empty();
                if idle {
                    return;
                }
            }
            self.run_once(true).await;
        }
    }

    /// One drain-and-send cycle.
    pub async fn run_once(&self, force: bool) {
        let batches = {
            let held = self.in_flight.lock().unwrap().clone();
            self.accumulator.drain(
                self.config.linger(),
                force,
                &|tp| held.contains(tp),
                Instant::now(),
            )
        };

        if batches.is_empty() {
            self.cycle_done.notify_waiters();
            return;
        }

        let topics: Vec<String> = batches
            .iter()
            .map(|batch| batch.tp().topic_name.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let metadata = match self.client.metadata(MetadataOptions::topics(topics)).await {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!("fail to refresh metadata before produce, {}", err);
                for mut batch in batches {
                    batch.mark_attempt();
                    self.retry_or_fail(batch, KafkaCode::NetworkException);
                }
                self.cycle_done.notify_waiters();
                return;
            }
        };

        let mut by_leader: HashMap<NodeId, Vec<ProducerBatch>> = HashMap::new();
        for mut batch in batches {
            match metadata.leader_broker(batch.tp()) {
                Some(leader) => by_leader.entry(leader.id()).or_default().push(batch),
                None => {
                    self.client
                        .invalidate_metadata(Some(&batch.tp().topic_name), "leader unknown");
                    batch.mark_attempt();
                    self.retry_or_fail(batch, KafkaCode::LeaderNotAvailable);
                }
            }
        }

        future::join_all(
            by_leader
                .into_iter()
                .map(|(node_id, batches)| self.send_to_node(node_id, batches)),
        )
        .await;

        self.cycle_done.notify_waiters();
    }

    async fn send_to_node(&self, node_id: NodeId, mut batches: Vec<ProducerBatch>) {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            for batch in &batches {
                in_flight.insert(batch.tp().clone());
            }
        }

        // assign the producer identity and sequences right before the
        // first wire attempt; retries reuse what was assigned
        {
            let mut txn = self.txn.lock().unwrap();
            if txn.has_producer_id() {
                let producer_id = txn.producer_id;
                let producer_epoch = txn.producer_epoch;
                let transactional = txn.in_transaction();
                for batch in &mut batches {
                    if !batch.has_sequence() {
                        let sequence = txn.sequence(batch.tp());
                        batch.set_producer_state(
                            producer_id,
                            producer_epoch,
                            sequence,
                            transactional,
                        );
                    }
                    txn.add_partition(batch.tp());
                }
            }
        }

        let result = self.produce(node_id, &mut batches).await;

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            for batch in &batches {
                in_flight.remove(batch.tp());
            }
        }

        match result {
            Ok(()) => {}
            Err(err) => {
                warn!("produce to broker #{} failed, {}", node_id, err);
                self.client.invalidate_metadata(None, &err.to_string());
                for batch in batches.drain(..) {
                    self.retry_or_fail(batch, KafkaCode::NetworkException);
                }
            }
        }
    }

    /// Send one Produce request carrying `batches`; on success `batches`
    /// is emptied, on transport error it is left for the caller.
    async fn produce(&self, node_id: NodeId, batches: &mut Vec<ProducerBatch>) -> Result<()> {
        for batch in batches.iter_mut() {
            batch.mark_attempt();
        }

        let conn = self.client.conn_for(&BrokerRole::Node(node_id)).await?;
        let api_version = conn.version_for(ApiKeys::Produce)?;

        let mut topics: HashMap<&str, Vec<PartitionProduceData>> = HashMap::new();
        for batch in batches.iter() {
            topics
                .entry(batch.tp().topic_name.as_str())
                .or_default()
                .push(PartitionProduceData {
                    partition: batch.tp().partition,
                    records: Some(batch.build()?),
                });
        }

        let transactional_id = self.txn.lock().unwrap().transactional_id.clone();
        let request = KafkaRequest::Produce(ProduceRequest {
            header: conn.request_header(ApiKeys::Produce, api_version),
            transactional_id: if self.txn.lock().unwrap().in_transaction() {
                transactional_id
            } else {
                None
            },
            acks: self.config.acks as i16,
            timeout_ms: self.config.ack_timeout_ms as i32,
            topics: topics
                .into_iter()
                .map(|(topic_name, partitions)| TopicProduceData {
                    topic_name: topic_name.to_owned(),
                    partitions,
                })
                .collect(),
        });

        let response = match conn.send(request).await? {
            KafkaResponse::Produce(res) => res,
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        };

        // acks=0: succeeded at flush, nothing per-partition to read
        if self.config.acks == RequiredAcks::None {
            for batch in batches.drain(..) {
                batch.done(-1, None);
            }
            return Ok(());
        }

        for batch in batches.drain(..) {
            let partition_response = response.topics.iter().find_map(|topic| {
                if topic.topic_name != batch.tp().topic_name {
                    return None;
                }
                topic
                    .partitions
                    .iter()
                    .find(|partition| partition.partition == batch.tp().partition)
            });

            match partition_response {
                Some(partition) => match KafkaCode::from(partition.error_code) {
                    KafkaCode::None => {
                        let mut txn = self.txn.lock().unwrap();
                        if txn.has_producer_id() {
                            txn.advance_sequence(batch.tp(), batch.record_count());
                        }
                        drop(txn);
                        batch.done(partition.base_offset, partition.log_append_time);
                    }
                    KafkaCode::OutOfOrderSequenceNumber => {
                        // unrecoverable for this producer id
                        self.txn.lock().unwrap().poison();
                        batch.fail(KafkaCode::OutOfOrderSequenceNumber);
                    }
                    code => {
                        if code.is_retriable() {
                            self.client
                                .invalidate_metadata(Some(&batch.tp().topic_name), "produce error");
                        }
                        self.retry_or_fail(batch, code);
                    }
                },
                None => batch.fail(KafkaCode::Unknown),
            }
        }

        Ok(())
    }

    /// Requeue with the original sequence, or fail once the retry budget is
    /// spent or the error is fatal.
    fn retry_or_fail(&self, batch: ProducerBatch, code: KafkaCode) {
        if code.is_retriable() && batch.attempts() <= self.config.client.retries {
            trace!(
                "requeue batch for {} after {:?} (attempt {})",
                batch.tp(),
                code,
                batch.attempts()
            );
            self.accumulator.reenqueue(batch);
        } else {
            batch.fail(code);
        }
    }
}
