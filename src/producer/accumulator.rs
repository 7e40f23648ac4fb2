use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Notify};

use crate::compression::Compression;
use crate::errors::Result;
use crate::network::TopicPartition;
use crate::producer::batch::ProducerBatch;
use crate::producer::record::RecordMetadata;
use crate::protocol::{RecordHeader, Timestamp};

/// Per-partition queues of open batches. `push_record` appends to the open
/// batch of the partition (sealing it when full); the sender drains sealed
/// and lingered batches.
pub struct RecordAccumulator {
    batch_size: usize,
    compression: Compression,
    batches: Mutex<HashMap<TopicPartition, Vec<ProducerBatch>>>,
    /// Woken whenever a batch seals, so the sender does not sit out the
    /// full linger.
    wakeup: Notify,
}

impl RecordAccumulator {
    pub fn new(batch_size: usize, compression: Compression) -> Self {
        RecordAccumulator {
            batch_size,
            compression,
            batches: Mutex::new(HashMap::new()),
            wakeup: Notify::new(),
        }
    }

    pub fn wakeup(&self) -> &Notify {
        &self.wakeup
    }

    /// Queue one record; resolves once the broker acknowledges the batch it
    /// ends up in.
    pub fn push_record(
        &self,
        tp: TopicPartition,
        timestamp: Timestamp,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
        headers: &[RecordHeader],
    ) -> oneshot::Receiver<Result<RecordMetadata>> {
        let (tx, rx) = oneshot::channel();
        let mut batches = self.batches.lock().unwrap();
        let queue = batches.entry(tp.clone()).or_default();

        let tx = match queue.last_mut() {
            Some(open) => {
                match open.try_push(self.batch_size, timestamp, key, value, headers, tx) {
                    Ok(()) => return rx,
                    Err(tx) => tx,
                }
            }
            None => tx,
        };

        // previous batch sealed (or none open): start a new one
        let mut batch = ProducerBatch::new(tp, self.compression);
        match batch.try_push(self.batch_size, timestamp, key, value, headers, tx) {
            Ok(()) => {}
            Err(_) => unreachable!("an empty batch accepts one record"),
        }
        queue.push(batch);

        if queue.len() > 1 {
            self.wakeup.notify_one();
        }
        rx
    }

    /// Requeue a batch that failed with a retriable error; it keeps its
    /// assigned sequence and goes back to the front.
    pub fn reenqueue(&self, batch: ProducerBatch) {
        let mut batches = self.batches.lock().unwrap();
        batches
            .entry(batch.tp().clone())
            .or_default()
            .insert(0, batch);
        self.wakeup.notify_one();
    }

    /// Sealed batches, plus open ones that lingered long enough (or all of
    /// them when forced). Partitions in `hold_back` keep their batches, so
    /// one in-flight batch per partition preserves sequencing.
    pub fn drain(
        &self,
        linger: Duration,
        force: bool,
        hold_back: &dyn Fn(&TopicPartition) -> bool,
        now: Instant,
    ) -> Vec<ProducerBatch> {
        let mut batches = self.batches.lock().unwrap();
        let mut drained = Vec::new();

        for (tp, queue) in batches.iter_mut() {
            if hold_back(tp) {
                continue;
            }
            // only the last batch of a queue is still open
            let sealed = queue.len().saturating_sub(1);
            let take = if force
                || queue
                    .last()
                    .map(|open| now.duration_since(open.created()) >= linger)
                    .unwrap_or_default()
            {
                queue.len()
            } else {
                sealed
            };

            // one batch per partition at a time
            if take > 0 && !queue.is_empty() {
                let batch = queue.remove(0);
                if batch.record_count() > 0 {
                    drained.push(batch);
                }
            }
        }

        batches.retain(|_, queue| !queue.is_empty());
        drained
    }

    pub fn has_pending(&self) -> bool {
        !self.batches.lock().unwrap().is_empty()
    }

    /// Fail everything still queued; used on close.
    pub fn abort(&self, reason: &str) {
        let mut batches = self.batches.lock().unwrap();
        for (_, queue) in batches.drain() {
            for batch in queue {
                batch.fail_with(reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_drain() {
        let accumulator = RecordAccumulator::new(16 * 1024, Compression::None);
        let tp = TopicPartition::new("t", 0);

        let _rx1 = accumulator.push_record(tp.clone(), 1, None, Some(b"a"), &[]);
        let _rx2 = accumulator.push_record(tp.clone(), 2, None, Some(b"b"), &[]);
        assert!(accumulator.has_pending());

        // nothing sealed, linger not expired
        let drained = accumulator.drain(
            Duration::from_secs(60),
            false,
            &|_| false,
            Instant::now(),
        );
        assert!(drained.is_empty());

        // forced drain takes the open batch
        let drained = accumulator.drain(Duration::from_secs(60), true, &|_| false, Instant::now());
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].record_count(), 2);
        assert!(!accumulator.has_pending());
    }

    #[test]
    fn test_linger_expiry_drains_open_batch() {
        let accumulator = RecordAccumulator::new(16 * 1024, Compression::None);
        let tp = TopicPartition::new("t", 0);
        let _rx = accumulator.push_record(tp, 1, None, Some(b"a"), &[]);

        let later = Instant::now() + Duration::from_millis(100);
        let drained = accumulator.drain(Duration::from_millis(5), false, &|_| false, later);
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn test_hold_back_keeps_partition() {
        let accumulator = RecordAccumulator::new(16 * 1024, Compression::None);
        let tp = TopicPartition::new("t", 0);
        let _rx = accumulator.push_record(tp.clone(), 1, None, Some(b"a"), &[]);

        let drained = accumulator.drain(Duration::ZERO, true, &|held| *held == tp, Instant::now());
        assert!(drained.is_empty());
        assert!(accumulator.has_pending());
    }

    #[tokio::test]
    async fn test_abort_fails_queued_records() {
        let accumulator = RecordAccumulator::new(16 * 1024, Compression::None);
        let rx = accumulator.push_record(TopicPartition::new("t", 0), 1, None, Some(b"a"), &[]);

        accumulator.abort("shutting down");
        assert!(rx.await.unwrap().is_err());
    }
}
