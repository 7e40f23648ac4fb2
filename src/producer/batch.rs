use std::time::Instant;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::compression::Compression;
use crate::errors::{ErrorKind, KafkaCode, Result};
use crate::network::TopicPartition;
use crate::producer::record::RecordMetadata;
use crate::protocol::{MutableRecordBatch, Offset, RecordHeader, Timestamp, NO_SEQUENCE};

/// The completion handle of one appended record.
pub struct Thunk {
    tx: oneshot::Sender<Result<RecordMetadata>>,
    relative_offset: i32,
    timestamp: Timestamp,
}

/// Records for one partition accumulating into a single wire batch,
/// together with the per-record completion handles.
pub struct ProducerBatch {
    tp: TopicPartition,
    batch: MutableRecordBatch,
    thunks: Vec<Thunk>,
    created: Instant,
    attempts: usize,
}

impl ProducerBatch {
    pub fn new(tp: TopicPartition, compression: Compression) -> Self {
        ProducerBatch {
            tp,
            batch: MutableRecordBatch::new(compression),
            thunks: Vec::new(),
            created: Instant::now(),
            attempts: 0,
        }
    }

    pub fn tp(&self) -> &TopicPartition {
        &self.tp
    }

    pub fn record_count(&self) -> i32 {
        self.batch.record_count()
    }

    pub fn size_estimate(&self) -> usize {
        self.batch.size_estimate()
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn mark_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Append a record unless the batch would exceed `batch_size`; an empty
    /// batch always accepts one record.
    pub fn try_push(
        &mut self,
        batch_size: usize,
        timestamp: Timestamp,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
        headers: &[RecordHeader],
        tx: oneshot::Sender<Result<RecordMetadata>>,
    ) -> std::result::Result<(), oneshot::Sender<Result<RecordMetadata>>> {
        let record_size = key.map(<[u8]>::len).unwrap_or_default()
            + value.map(<[u8]>::len).unwrap_or_default();
        if !self.batch.is_empty() && self.size_estimate() + record_size > batch_size {
            return Err(tx);
        }

        let relative_offset = self.batch.record_count();
        if let Err(err) = self.batch.append(timestamp, key, value, headers) {
            // the caller gets the append failure through the thunk
            let _ = tx.send(Err(err));
            return Ok(());
        }

        self.thunks.push(Thunk {
            tx,
            relative_offset,
            timestamp,
        });
        Ok(())
    }

    /// The sequence assigned at first send; reused verbatim on retries.
    pub fn base_sequence(&self) -> i32 {
        self.batch.base_sequence
    }

    pub fn has_sequence(&self) -> bool {
        self.batch.base_sequence != NO_SEQUENCE
    }

    pub fn set_producer_state(
        &mut self,
        producer_id: i64,
        producer_epoch: i16,
        base_sequence: i32,
        transactional: bool,
    ) {
        self.batch.producer_id = producer_id;
        self.batch.producer_epoch = producer_epoch;
        self.batch.base_sequence = base_sequence;
        self.batch.transactional = transactional;
    }

    /// Serialize to wire bytes.
    pub fn build(&self) -> Result<Bytes> {
        self.batch.build(0)
    }

    /// Complete every record with its absolute offset.
    pub fn done(self, base_offset: Offset, log_append_time: Option<Timestamp>) {
        for thunk in self.thunks {
            let _ = thunk.tx.send(Ok(RecordMetadata {
                topic_name: self.tp.topic_name.clone(),
                partition: self.tp.partition,
                offset: if base_offset < 0 {
                    base_offset
                } else {
                    base_offset + i64::from(thunk.relative_offset)
                },
                timestamp: log_append_time.filter(|time| *time >= 0).unwrap_or(thunk.timestamp),
            }));
        }
    }

    /// Fail every record with the broker error code.
    pub fn fail(self, code: KafkaCode) {
        for thunk in self.thunks {
            let _ = thunk.tx.send(Err(ErrorKind::KafkaError(code).into()));
        }
    }

    /// Fail every record with a transport-level reason.
    pub fn fail_with(self, reason: &str) {
        for thunk in self.thunks {
            let _ = thunk
                .tx
                .send(Err(ErrorKind::ClientClosed(reason.to_owned()).into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(
        batch: &mut ProducerBatch,
        batch_size: usize,
        value: &[u8],
    ) -> Option<oneshot::Receiver<Result<RecordMetadata>>> {
        let (tx, rx) = oneshot::channel();
        batch
            .try_push(batch_size, 1, None, Some(value), &[], tx)
            .ok()
            .map(|_| rx)
    }

    #[tokio::test]
    async fn test_done_resolves_absolute_offsets() {
        let mut batch = ProducerBatch::new(TopicPartition::new("t", 0), Compression::None);
        let rx1 = push(&mut batch, 1024 * 1024, b"a").unwrap();
        let rx2 = push(&mut batch, 1024 * 1024, b"b").unwrap();

        batch.done(100, None);

        assert_eq!(rx1.await.unwrap().unwrap().offset, 100);
        assert_eq!(rx2.await.unwrap().unwrap().offset, 101);
    }

    #[tokio::test]
    async fn test_full_batch_rejects_push() {
        let mut batch = ProducerBatch::new(TopicPartition::new("t", 0), Compression::None);
        assert!(push(&mut batch, 80, b"first fits always").is_some());
        assert!(push(&mut batch, 80, b"second does not").is_none());
    }

    #[tokio::test]
    async fn test_fail_propagates_code() {
        let mut batch = ProducerBatch::new(TopicPartition::new("t", 0), Compression::None);
        let rx = push(&mut batch, 1024, b"v").unwrap();

        batch.fail(KafkaCode::NotLeaderOrFollower);

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.kafka_code(), Some(KafkaCode::NotLeaderOrFollower));
    }
}
