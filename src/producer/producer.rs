//! The public producer: partition resolution, batching, idempotence and
//! transactions on top of the base client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future;
use tokio::sync::watch;

use crate::client::{BrokerRole, KafkaClient};
use crate::errors::{Error, ErrorKind, KafkaCode, Result};
use crate::network::{KafkaRequest, KafkaResponse, TopicPartition};
use crate::producer::accumulator::RecordAccumulator;
use crate::producer::config::ProducerConfig;
use crate::producer::partitioner::{DefaultPartitioner, Partitioner};
use crate::producer::record::{ProducerRecord, RecordMetadata};
use crate::producer::sender::Sender;
use crate::producer::txn::{TransactionState, TxnState};
use crate::protocol::{
    AddOffsetsToTxnRequest, AddPartitionsToTxnRequest, ApiKeys, CoordinatorType, EndTxnRequest,
    InitProducerIdRequest, Offset, Timestamp, TxnOffsetCommitPartition, TxnOffsetCommitRequest,
};
use crate::client::MetadataOptions;

fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

struct ProducerInner {
    client: KafkaClient,
    config: ProducerConfig,
    accumulator: Arc<RecordAccumulator>,
    txn: Arc<Mutex<TransactionState>>,
    sender: Arc<Sender>,
    partitioner: Box<dyn Partitioner>,
    closed: watch::Sender<bool>,
}

/// A Kafka producer over a shared `KafkaClient`.
#[derive(Clone)]
pub struct KafkaProducer {
    inner: Arc<ProducerInner>,
}

impl KafkaProducer {
    pub fn new(client: KafkaClient, config: ProducerConfig) -> Result<Self> {
        Self::with_partitioner(client, config, Box::<DefaultPartitioner>::default())
    }

    pub fn with_partitioner(
        client: KafkaClient,
        config: ProducerConfig,
        partitioner: Box<dyn Partitioner>,
    ) -> Result<Self> {
        config.validate()?;

        let accumulator = Arc::new(RecordAccumulator::new(
            config.batch_size,
            config.compression,
        ));
        let txn = Arc::new(Mutex::new(TransactionState::new(
            config.transactional_id.clone(),
        )));
        let sender = Arc::new(Sender::new(
            client.clone(),
            config.clone(),
            accumulator.clone(),
            txn.clone(),
        ));
        let (closed, closed_rx) = watch::channel(false);

        tokio::spawn(sender.clone().run(closed_rx));

        Ok(KafkaProducer {
            inner: Arc::new(ProducerInner {
                client,
                config,
                accumulator,
                txn,
                sender,
                partitioner,
                closed,
            }),
        })
    }

    pub fn client(&self) -> &KafkaClient {
        &self.inner.client
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() || self.inner.client.is_closed() {
            bail!(ErrorKind::ClientClosed("producer closed".into()));
        }
        Ok(())
    }

    /// Publish one record; resolves once the configured acknowledgement
    /// level is reached.
    pub async fn send(&self, record: ProducerRecord) -> Result<RecordMetadata> {
        let queued = self.enqueue(record).await?;
        queued
            .await
            .map_err(|_| Error::from(ErrorKind::ClientClosed("producer closed".into())))?
    }

    /// Publish a set of records as one operation; partial failures surface
    /// as an aggregate so callers can diff successes from failures.
    pub async fn send_batch(&self, records: Vec<ProducerRecord>) -> Result<Vec<RecordMetadata>> {
        let mut queued = Vec::with_capacity(records.len());
        for record in records {
            queued.push(self.enqueue(record).await?);
        }

        let settled = future::join_all(queued).await;
        let mut metadata = Vec::with_capacity(settled.len());
        let mut errors = Vec::new();
        for result in settled {
            match result {
                Ok(Ok(meta)) => metadata.push(meta),
                Ok(Err(err)) => errors.push(err),
                Err(_) => {
                    errors.push(ErrorKind::ClientClosed("producer closed".into()).into())
                }
            }
        }

        match errors.len() {
            0 => Ok(metadata),
            1 => Err(errors.pop().expect("one error")),
            _ => bail!(ErrorKind::MultipleErrors(errors)),
        }
    }

    async fn enqueue(
        &self,
        record: ProducerRecord,
    ) -> Result<tokio::sync::oneshot::Receiver<Result<RecordMetadata>>> {
        self.check_open()?;

        let record_size = record.key.as_ref().map(|key| key.len()).unwrap_or_default()
            + record
                .value
                .as_ref()
                .map(|value| value.len())
                .unwrap_or_default();
        if record_size > self.inner.config.max_request_size {
            bail!(ErrorKind::KafkaError(KafkaCode::MessageSizeTooLarge));
        }

        if self.inner.config.is_idempotent() && !self.inner.txn.lock().unwrap().has_producer_id() {
            self.init_producer_id().await?;
        }
        {
            let txn = self.inner.txn.lock().unwrap();
            if txn.is_transactional() && !txn.in_transaction() {
                bail!(ErrorKind::ValidationError(
                    "transactional producer may only send inside a transaction".into()
                ));
            }
            if txn.state == TxnState::Error {
                bail!(ErrorKind::KafkaError(KafkaCode::OutOfOrderSequenceNumber));
            }
        }

        let metadata = self
            .inner
            .client
            .metadata(MetadataOptions::topics([record.topic_name.clone()]))
            .await?;
        let partition = self
            .inner
            .partitioner
            .partition(
                &record.topic_name,
                record.partition,
                record.key.as_deref(),
                &metadata,
            )
            .ok_or(ErrorKind::KafkaError(KafkaCode::UnknownTopicOrPartition))?;

        let tp = TopicPartition::new(record.topic_name, partition);
        let timestamp = record.timestamp.unwrap_or_else(now_millis);

        let rx = self.inner.accumulator.push_record(
            tp,
            timestamp,
            record.key.as_deref(),
            record.value.as_deref(),
            &record.headers,
        );

        if self.inner.config.linger_ms == 0 {
            self.inner.accumulator.wakeup().notify_one();
        }
        Ok(rx)
    }

    /// Everything queued so far is on the broker (or failed).
    pub async fn flush(&self) {
        self.inner.sender.flush().await;
    }

    /// Obtain a producer id (and epoch) from the cluster; entry point for
    /// idempotence and transactions.
    pub async fn init_producer_id(&self) -> Result<()> {
        self.check_open()?;

        let transactional_id = {
            let mut txn = self.inner.txn.lock().unwrap();
            if txn.has_producer_id() && txn.state != TxnState::Error {
                return Ok(());
            }
            txn.state = TxnState::Initializing;
            txn.transactional_id.clone()
        };

        let role = match &transactional_id {
            Some(id) => BrokerRole::Coordinator {
                key: id.clone(),
                key_type: CoordinatorType::Transaction,
            },
            None => BrokerRole::Bootstrap,
        };

        let client = self.inner.client.clone();
        let config = self.inner.config.clone();
        let response = self
            .inner
            .client
            .perform_with_retry("init_producer_id", move || {
                let client = client.clone();
                let role = role.clone();
                let transactional_id = transactional_id.clone();
                let transaction_timeout_ms = config.transaction_timeout_ms;
                async move {
                    let conn = client.conn_for(&role).await?;
                    let api_version = conn.version_for(ApiKeys::InitProducerId)?;
                    let request = KafkaRequest::InitProducerId(InitProducerIdRequest {
                        header: conn.request_header(ApiKeys::InitProducerId, api_version),
                        transactional_id,
                        transaction_timeout_ms: transaction_timeout_ms as i32,
                    });
                    match conn.send(request).await? {
                        KafkaResponse::InitProducerId(res) => {
                            if res.error_code != 0 {
                                bail!(ErrorKind::KafkaError(KafkaCode::from(res.error_code)));
                            }
                            Ok(res)
                        }
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    }
                }
            })
            .await?;

        debug!(
            "assigned producer id {} (epoch {})",
            response.producer_id, response.producer_epoch
        );
        self.inner
            .txn
            .lock()
            .unwrap()
            .set_producer_id(response.producer_id, response.producer_epoch);
        Ok(())
    }

    pub async fn begin_transaction(&self) -> Result<()> {
        self.check_open()?;
        if !self.inner.txn.lock().unwrap().has_producer_id() {
            self.init_producer_id().await?;
        }
        self.inner.txn.lock().unwrap().begin()
    }

    /// Commit consumed offsets atomically with the open transaction.
    pub async fn send_offsets_to_transaction(
        &self,
        offsets: HashMap<TopicPartition, Offset>,
        group_id: &str,
    ) -> Result<()> {
        self.check_open()?;

        let (transactional_id, producer_id, producer_epoch) = {
            let txn = self.inner.txn.lock().unwrap();
            if !txn.in_transaction() {
                bail!(ErrorKind::ValidationError("no open transaction".into()));
            }
            (
                txn.transactional_id.clone().expect("transactional"),
                txn.producer_id,
                txn.producer_epoch,
            )
        };

        // register the group with the transaction
        let conn = self
            .inner
            .client
            .conn_for(&BrokerRole::Coordinator {
                key: transactional_id.clone(),
                key_type: CoordinatorType::Transaction,
            })
            .await?;
        let api_version = conn.version_for(ApiKeys::AddOffsetsToTxn)?;
        let request = KafkaRequest::AddOffsetsToTxn(AddOffsetsToTxnRequest {
            header: conn.request_header(ApiKeys::AddOffsetsToTxn, api_version),
            transactional_id: transactional_id.clone(),
            producer_id,
            producer_epoch,
            group_id: group_id.to_owned(),
        });
        match conn.send(request).await? {
            KafkaResponse::AddOffsetsToTxn(res) => {
                if res.error_code != 0 {
                    bail!(ErrorKind::KafkaError(KafkaCode::from(res.error_code)));
                }
            }
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        }

        // then commit the offsets through the group coordinator
        let conn = self
            .inner
            .client
            .conn_for(&BrokerRole::Coordinator {
                key: group_id.to_owned(),
                key_type: CoordinatorType::Group,
            })
            .await?;
        // v3+ wants the consumer generation, which a producer cannot speak for
        let api_version = conn.version_for(ApiKeys::TxnOffsetCommit)?.min(2);

        let mut topics: HashMap<String, Vec<TxnOffsetCommitPartition>> = HashMap::new();
        for (tp, offset) in offsets {
            topics
                .entry(tp.topic_name)
                .or_default()
                .push(TxnOffsetCommitPartition {
                    partition: tp.partition,
                    committed_offset: offset,
                    metadata: None,
                });
        }

        let request = KafkaRequest::TxnOffsetCommit(TxnOffsetCommitRequest {
            header: conn.request_header(ApiKeys::TxnOffsetCommit, api_version),
            transactional_id,
            group_id: group_id.to_owned(),
            producer_id,
            producer_epoch,
            generation_id: -1,
            member_id: String::new(),
            topics: topics.into_iter().collect(),
        });
        match conn.send(request).await? {
            KafkaResponse::TxnOffsetCommit(res) => {
                for (topic_name, partitions) in &res.topics {
                    for (partition, error_code) in partitions {
                        if *error_code != 0 {
                            bail!(ErrorKind::ProtocolError(
                                ApiKeys::TxnOffsetCommit.key(),
                                KafkaCode::from(*error_code),
                                format!("/topics/{}/partitions/{}", topic_name, partition),
                            ));
                        }
                    }
                }
                Ok(())
            }
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        }
    }

    pub async fn commit_transaction(&self) -> Result<()> {
        self.end_transaction(true).await
    }

    pub async fn abort_transaction(&self) -> Result<()> {
        self.end_transaction(false).await
    }

    async fn end_transaction(&self, committed: bool) -> Result<()> {
        self.check_open()?;
        self.inner.txn.lock().unwrap().transition_to_end(committed)?;

        // everything written must be on the brokers before the markers
        self.flush().await;

        let (transactional_id, producer_id, producer_epoch, partitions) = {
            let txn = self.inner.txn.lock().unwrap();
            (
                txn.transactional_id.clone().expect("transactional"),
                txn.producer_id,
                txn.producer_epoch,
                txn.txn_partitions(),
            )
        };

        let conn = self
            .inner
            .client
            .conn_for(&BrokerRole::Coordinator {
                key: transactional_id.clone(),
                key_type: CoordinatorType::Transaction,
            })
            .await?;

        // register every partition written during the transaction
        if !partitions.is_empty() {
            let api_version = conn.version_for(ApiKeys::AddPartitionsToTxn)?;
            let mut topics: HashMap<String, Vec<i32>> = HashMap::new();
            for tp in &partitions {
                topics
                    .entry(tp.topic_name.clone())
                    .or_default()
                    .push(tp.partition);
            }
            let request = KafkaRequest::AddPartitionsToTxn(AddPartitionsToTxnRequest {
                header: conn.request_header(ApiKeys::AddPartitionsToTxn, api_version),
                transactional_id: transactional_id.clone(),
                producer_id,
                producer_epoch,
                topics: topics.into_iter().collect(),
            });
            match conn.send(request).await? {
                KafkaResponse::AddPartitionsToTxn(res) => {
                    for (topic_name, results) in &res.results {
                        for (partition, error_code) in results {
                            if *error_code != 0 {
                                bail!(ErrorKind::ProtocolError(
                                    ApiKeys::AddPartitionsToTxn.key(),
                                    KafkaCode::from(*error_code),
                                    format!("/results/{}/{}", topic_name, partition),
                                ));
                            }
                        }
                    }
                }
                res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
            }
        }

        let api_version = conn.version_for(ApiKeys::EndTxn)?;
        let request = KafkaRequest::EndTxn(EndTxnRequest {
            header: conn.request_header(ApiKeys::EndTxn, api_version),
            transactional_id,
            producer_id,
            producer_epoch,
            committed,
        });
        match conn.send(request).await? {
            KafkaResponse::EndTxn(res) => {
                if res.error_code != 0 {
                    bail!(ErrorKind::KafkaError(KafkaCode::from(res.error_code)));
                }
            }
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        }

        self.inner.txn.lock().unwrap().finish_end();
        Ok(())
    }

    /// Flush what can be flushed, stop the sender and fail the rest.
    /// Best-effort; never raises.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }

        debug!("closing producer");
        self.inner.sender.flush().await;
        let _ = self.inner.closed.send(true);
        self.inner.accumulator.abort("producer closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;

    fn test_producer(config: ProducerConfig) -> KafkaProducer {
        let client = KafkaClient::from_config(ClientConfig {
            bootstrap_brokers: vec!["localhost:9092".into()],
            ..ClientConfig::default()
        })
        .unwrap();
        KafkaProducer::new(client, config).unwrap()
    }

    #[tokio::test]
    async fn test_oversized_record_rejected() {
        let producer = test_producer(ProducerConfig {
            max_request_size: 8,
            ..ProducerConfig::default()
        });

        let record = ProducerRecord::from_value("t", vec![0u8; 64]);
        let err = producer.send(record).await.unwrap_err();
        assert_eq!(err.kafka_code(), Some(KafkaCode::MessageSizeTooLarge));
    }

    #[tokio::test]
    async fn test_transactional_send_outside_txn_rejected() {
        let producer = test_producer(ProducerConfig {
            transactional_id: Some("txn".into()),
            ..ProducerConfig::default()
        });

        // poke the state directly so the check is reachable without a broker
        producer.inner.txn.lock().unwrap().set_producer_id(1, 0);

        let record = ProducerRecord::from_value("t", "v");
        let err = producer.send(record).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_begin_requires_transactional_config() {
        let producer = test_producer(ProducerConfig::default());
        producer.inner.txn.lock().unwrap().set_producer_id(1, 0);
        assert!(producer.begin_transaction().await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let producer = test_producer(ProducerConfig::default());
        producer.close().await;
        producer.close().await;
        assert!(producer.is_closed());
    }
}
