//! The public consumer: group membership, the fetch-and-deliver loop, and
//! manual or automatic commits.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use futures::Stream;
use tokio::sync::{mpsc, watch};

use crate::client::KafkaClient;
use crate::consumer::assignor::{PartitionAssignor, RangeAssignor, RoundRobinAssignor};
use crate::consumer::config::ConsumerConfig;
use crate::consumer::coordinator::ConsumerCoordinator;
use crate::consumer::fetcher::{Fetcher, Message};
use crate::consumer::subscriptions::Subscriptions;
use crate::errors::{Error, ErrorKind, KafkaCode, Result};
use crate::network::TopicPartition;
use crate::protocol::{FetchOffset, Offset, Timestamp};

/// How many decoded messages may sit between the fetch loop and a slow
/// caller before fetching pauses (backpressure).
const STREAM_DEPTH: usize = 1024;

struct ConsumerInner {
    client: KafkaClient,
    config: ConsumerConfig,
    subscriptions: Arc<Mutex<Subscriptions>>,
    coordinator: ConsumerCoordinator,
    fetcher: Arc<Fetcher>,
    closed: watch::Sender<bool>,
    consuming: AtomicBool,
}

/// A high-level consumer driving a consumer-group membership.
#[derive(Clone)]
pub struct KafkaConsumer {
    inner: Arc<ConsumerInner>,
}

/// The lazy sequence of messages produced by `consume`. Ends (yields
/// `None`) once the consumer closes; session-fatal errors surface as `Err`
/// items right before the end.
pub struct MessageStream {
    rx: mpsc::Receiver<Result<Message>>,
}

impl Stream for MessageStream {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl KafkaConsumer {
    pub fn new(client: KafkaClient, config: ConsumerConfig) -> Result<Self> {
        Self::with_assignors(
            client,
            config,
            vec![
                Box::<RangeAssignor>::default(),
                Box::<RoundRobinAssignor>::default(),
            ],
        )
    }

    pub fn with_assignors(
        client: KafkaClient,
        config: ConsumerConfig,
        assignors: Vec<Box<dyn PartitionAssignor>>,
    ) -> Result<Self> {
        config.validate()?;

        let subscriptions = Arc::new(Mutex::new(Subscriptions::new()));
        let coordinator = ConsumerCoordinator::new(
            client.clone(),
            config.clone(),
            subscriptions.clone(),
            assignors,
        );
        let fetcher = Arc::new(Fetcher::new(
            client.clone(),
            config.clone(),
            subscriptions.clone(),
        ));
        let (closed, _) = watch::channel(false);

        Ok(KafkaConsumer {
            inner: Arc::new(ConsumerInner {
                client,
                config,
                subscriptions,
                coordinator,
                fetcher,
                closed,
                consuming: AtomicBool::new(false),
            }),
        })
    }

    pub fn client(&self) -> &KafkaClient {
        &self.inner.client
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// The partitions currently owned by this member.
    pub fn assignment(&self) -> Vec<TopicPartition> {
        self.inner.subscriptions.lock().unwrap().assigned_partitions()
    }

    /// Subscribe and join the group; returns once the first assignment is
    /// synced and heartbeats run.
    pub async fn join_group<I, S>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.is_closed() {
            bail!(ErrorKind::ClientClosed("consumer closed".into()));
        }

        self.inner.subscriptions.lock().unwrap().subscribe(topics);
        self.inner.coordinator.ensure_active_group().await
    }

    /// Send LeaveGroup and drop the assignment; the member id is given up.
    pub async fn leave_group(&self) {
        self.inner.coordinator.leave_group().await;
    }

    /// Resolve offsets for partitions of the subscribed topics by sentinel
    /// or timestamp.
    pub async fn list_offsets(
        &self,
        partitions: Vec<TopicPartition>,
        at: FetchOffset,
    ) -> Result<HashMap<TopicPartition, Offset>> {
        self.inner
            .fetcher
            .offsets_for_times(partitions, at.timestamp())
            .await
    }

    /// Resolve offsets at a concrete timestamp.
    pub async fn offsets_for_times(
        &self,
        partitions: Vec<TopicPartition>,
        timestamp: Timestamp,
    ) -> Result<HashMap<TopicPartition, Offset>> {
        self.inner
            .fetcher
            .offsets_for_times(partitions, timestamp)
            .await
    }

    /// The coordinator broker of this group.
    pub async fn find_coordinator(&self) -> Result<crate::client::Broker> {
        self.inner
            .client
            .find_coordinator(
                &self.inner.config.group_id,
                crate::protocol::CoordinatorType::Group,
            )
            .await
    }

    /// Acknowledge one message: commits `offset + 1` for its partition.
    /// Commits that do not advance the stored offset are no-ops.
    pub async fn commit_message(&self, message: &Message) -> Result<()> {
        let tp = message.tp();
        let next = message.commit_offset();

        {
            let subscriptions = self.inner.subscriptions.lock().unwrap();
            if let Some(committed) = subscriptions.committed(&tp) {
                if committed >= next {
                    return Ok(());
                }
            }
        }

        let mut offsets = HashMap::new();
        offsets.insert(tp.clone(), next);
        self.inner.coordinator.commit_offsets(&offsets).await?;
        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .set_committed(&tp, next);
        Ok(())
    }

    /// Commit the highest contiguously delivered offset of every owned
    /// partition.
    pub async fn commit_consumed(&self) -> Result<()> {
        let offsets = self.inner.subscriptions.lock().unwrap().consumed_to_commit();
        if offsets.is_empty() {
            return Ok(());
        }
        self.inner.coordinator.commit_offsets(&offsets).await?;

        let mut subscriptions = self.inner.subscriptions.lock().unwrap();
        for (tp, offset) in offsets {
            subscriptions.set_committed(&tp, offset);
        }
        Ok(())
    }

    /// Start the long-running consume loop and return its lazy message
    /// sequence. The loop joins the group (if `join_group` was not called
    /// yet it must have been given topics), keeps the membership active,
    /// fetches, delivers and commits per the configured policy.
    pub fn consume(&self) -> MessageStream {
        let (tx, rx) = mpsc::channel(STREAM_DEPTH);

        if self.inner.consuming.swap(true, Ordering::SeqCst) {
            warn!("consume() called twice; the second stream ends immediately");
            return MessageStream { rx };
        }

        let inner = self.inner.clone();
        let consumer = self.clone();
        tokio::spawn(async move {
            consume_loop(consumer, tx).await;
            inner.consuming.store(false, Ordering::SeqCst);
        });

        MessageStream { rx }
    }

    /// Stop consuming: triggers the abort signal, flushes commits, leaves
    /// the group best-effort and ends the stream. Idempotent, never raises.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }

        debug!("closing consumer of group `{}`", self.inner.config.group_id);
        let _ = self.inner.closed.send(true);

        if self.inner.consuming.load(Ordering::SeqCst) {
            // the consume loop drains commits and leaves on its way out;
            // closing the coordinator unblocks it if it is mid-join
            self.inner.coordinator.close();
        } else {
            if self.inner.config.autocommit {
                if let Err(err) = self.commit_consumed().await {
                    warn!("final autocommit failed, {}", err);
                }
            }
            self.inner.fetcher.invalidate_sessions();
            self.inner.coordinator.leave_group().await;
            self.inner.coordinator.seal();
        }
    }
}

async fn consume_loop(consumer: KafkaConsumer, tx: mpsc::Sender<Result<Message>>) {
    let inner = &consumer.inner;
    let mut closed = inner.closed.subscribe();
    let mut last_autocommit = Instant::now();

    loop {
        if *closed.borrow() || inner.client.is_closed() {
            break;
        }

        // membership first: join/rejoin until stable
        if inner.coordinator.rejoin_needed() || !inner.coordinator.is_stable() {
            // conservative ordering: drain commits before rejoining
            if inner.config.autocommit {
                if let Err(err) = consumer.commit_consumed().await {
                    trace!("pre-rebalance commit failed, {}", err);
                }
            }
            if inner.coordinator.session_expired() {
                let _ = tx
                    .send(Err(Error::from(ErrorKind::KafkaError(
                        KafkaCode::RequestTimedOut,
                    ))))
                    .await;
            }

            match inner.coordinator.ensure_active_group().await {
                Ok(()) => {}
                Err(err) => {
                    if matches!(err.kind(), ErrorKind::ClientClosed(_)) {
                        break;
                    }
                    // fatal join errors terminate the stream
                    let _ = tx.send(Err(err)).await;
                    break;
                }
            }
        }

        if let Err(err) = inner.fetcher.reset_offsets(&inner.coordinator).await {
            if err.is_retriable() {
                tokio::time::sleep(inner.client.config().retry_delay()).await;
                continue;
            }
            let _ = tx.send(Err(err)).await;
            break;
        }

        let messages = tokio::select! {
            result = inner.fetcher.fetch_once() => result,
            _ = closed.changed() => break,
        };

        match messages {
            Ok(messages) => {
                for message in messages {
                    if tx.send(Ok(message)).await.is_err() {
                        // the stream was dropped; stop consuming
                        drain_and_leave(&consumer).await;
                        return;
                    }
                }
            }
            Err(err) if err.is_retriable() => {
                warn!("fetch round failed, will retry, {}", err);
                tokio::time::sleep(inner.client.config().retry_delay()).await;
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                break;
            }
        }

        if inner.config.autocommit && last_autocommit.elapsed() >= inner.config.autocommit_interval()
        {
            if let Err(err) = consumer.commit_consumed().await {
                warn!("autocommit failed, {}", err);
            }
            last_autocommit = Instant::now();
        }
    }

    drain_and_leave(&consumer).await;
}

/// Shutdown path of the consume loop: final commit, then leave.
async fn drain_and_leave(consumer: &KafkaConsumer) {
    let inner = &consumer.inner;

    if inner.config.autocommit && !inner.client.is_closed() {
        if let Err(err) = consumer.commit_consumed().await {
            warn!("final autocommit failed, {}", err);
        }
    }
    inner.fetcher.invalidate_sessions();
    inner.coordinator.leave_group().await;
    inner.coordinator.seal();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;

    fn test_consumer() -> KafkaConsumer {
        let client = KafkaClient::from_config(ClientConfig {
            bootstrap_brokers: vec!["localhost:9092".into()],
            ..ClientConfig::default()
        })
        .unwrap();
        KafkaConsumer::new(
            client,
            ConsumerConfig {
                group_id: "g".into(),
                ..ConsumerConfig::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_initial_assignment_is_empty() {
        let consumer = test_consumer();
        assert!(consumer.assignment().is_empty());
        assert!(!consumer.is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let consumer = test_consumer();
        consumer.close().await;
        consumer.close().await;
        assert!(consumer.is_closed());

        let err = consumer.join_group(["t"]).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ClientClosed(_)));
    }

    #[tokio::test]
    async fn test_commit_message_without_group_fails() {
        let consumer = test_consumer();
        consumer
            .inner
            .subscriptions
            .lock()
            .unwrap()
            .subscribe(["t"]);
        consumer
            .inner
            .subscriptions
            .lock()
            .unwrap()
            .assign_from_subscribed(vec![TopicPartition::new("t", 0)])
            .unwrap();

        let message = Message {
            topic_name: "t".into(),
            partition: 0,
            offset: 0,
            timestamp: 0,
            key: None,
            value: None,
            headers: Vec::new(),
        };
        let err = consumer.commit_message(&message).await.unwrap_err();
        assert_eq!(err.kafka_code(), Some(KafkaCode::RebalanceInProgress));
    }

    #[tokio::test]
    async fn test_non_advancing_commit_is_noop() {
        let consumer = test_consumer();
        {
            let mut subscriptions = consumer.inner.subscriptions.lock().unwrap();
            subscriptions.subscribe(["t"]);
            subscriptions
                .assign_from_subscribed(vec![TopicPartition::new("t", 0)])
                .unwrap();
            subscriptions.set_committed(&TopicPartition::new("t", 0), 10);
        }

        let message = Message {
            topic_name: "t".into(),
            partition: 0,
            offset: 5, // commit offset 6 < committed 10
            timestamp: 0,
            key: None,
            value: None,
            headers: Vec::new(),
        };
        // no broker round trip happens, so this succeeds offline
        consumer.commit_message(&message).await.unwrap();
    }
}
