//! The base client every role (admin, producer, consumer) is built on:
//! bootstrap discovery, API-version negotiation, broker-role routing, the
//! retry policy, and the shared metadata cache.

use std::collections::HashMap;
use std::future::Future;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use tokio::sync::watch;
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::client::cluster::Broker;
use crate::client::config::ClientConfig;
use crate::client::diagnostics::Diagnostics;
use crate::client::metadata::{Metadata, MetadataCache};
use crate::errors::{Error, ErrorKind, KafkaCode, Result};
use crate::network::{KafkaConnPool, KafkaConnection, KafkaRequest, KafkaResponse, TopicPartition};
use crate::protocol::{
    ApiKeys, ApiVersionsRequest, CoordinatorType, FindCoordinatorRequest, MetadataRequest, NodeId,
    SupportedApiVersion,
};

/// Options for a metadata read.
#[derive(Clone, Debug, Default)]
pub struct MetadataOptions {
    /// Topics of interest; `None` fetches the whole cluster view.
    pub topics: Option<Vec<String>>,
    /// Bypass the cache even when every topic is fresh.
    pub force_update: bool,
    /// Ask the broker to auto-create missing topics.
    pub autocreate_topics: bool,
}

impl MetadataOptions {
    pub fn topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MetadataOptions {
            topics: Some(topics.into_iter().map(Into::into).collect()),
            ..MetadataOptions::default()
        }
    }
}

/// Which broker an operation must talk to.
#[derive(Clone, Debug)]
pub enum BrokerRole {
    /// Any broker from the bootstrap list.
    Bootstrap,
    /// The cluster controller (topic DDL).
    Controller,
    /// The group or transaction coordinator for a key.
    Coordinator {
        key: String,
        key_type: CoordinatorType,
    },
    /// The leader of one partition.
    Leader(TopicPartition),
    /// A specific broker by node id.
    Node(NodeId),
}

struct ClientInner {
    config: ClientConfig,
    pool: KafkaConnPool,
    cache: MetadataCache,
    refresh_lock: tokio::sync::Mutex<()>,
    diagnostics: Diagnostics,
    closed: watch::Sender<bool>,
}

/// A Kafka client that communicates with the Kafka cluster.
#[derive(Clone)]
pub struct KafkaClient {
    inner: Arc<ClientInner>,
}

impl KafkaClient {
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        trace!("create client from config: {:?}", config);

        config.validate()?;
        let pool = KafkaConnPool::new(config.connect_options()?);
        let cache = MetadataCache::new(config.metadata_max_age());
        let diagnostics = Diagnostics::new(config.client_id.clone());
        let (closed, _) = watch::channel(false);

        Ok(KafkaClient {
            inner: Arc::new(ClientInner {
                config,
                pool,
                cache,
                refresh_lock: tokio::sync::Mutex::new(()),
                diagnostics,
                closed,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// A watch that flips to `true` when the client closes; long-running
    /// tasks select on it.
    pub fn closed_watch(&self) -> watch::Receiver<bool> {
        self.inner.closed.subscribe()
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            bail!(ErrorKind::ClientClosed("client closed".into()));
        }
        Ok(())
    }

    fn bootstrap_addrs(&self) -> Result<Vec<(String, SocketAddr)>> {
        let mut addrs = Vec::new();
        for broker in &self.inner.config.bootstrap_brokers {
            let host = broker
                .rsplit_once(':')
                .map(|(host, _)| host.to_owned())
                .unwrap_or_else(|| broker.clone());
            match broker.to_socket_addrs() {
                Ok(mut resolved) => {
                    if let Some(addr) = resolved.next() {
                        addrs.push((host, addr));
                    }
                }
                Err(err) => warn!("fail to resolve bootstrap broker `{}`, {}", broker, err),
            }
        }
        if addrs.is_empty() {
            bail!(ErrorKind::NoBrokerAvailable);
        }
        Ok(addrs)
    }

    async fn bootstrap_conn(&self) -> Result<KafkaConnection> {
        let addrs = self.bootstrap_addrs()?;
        let conn = self.inner.pool.get_first_available(&addrs).await?;
        self.ensure_api_versions(&conn).await?;
        Ok(conn)
    }

    async fn conn_to(&self, broker: &Broker) -> Result<KafkaConnection> {
        let conn = self.inner.pool.get(broker.host(), broker.addr()?).await?;
        self.ensure_api_versions(&conn).await?;
        Ok(conn)
    }

    /// Choose the broker with the fewest outstanding requests that is at
    /// least eligible for connection.
    fn least_loaded_broker(&self, metadata: &Metadata) -> Result<Broker> {
        let mut brokers: Vec<&Broker> = metadata.all_brokers();
        brokers.shuffle(&mut rand::thread_rng());

        let mut fewest = usize::MAX;
        let mut found = None;

        for broker in &brokers {
            let addr = match broker.addr() {
                Ok(addr) => addr,
                Err(_) => continue,
            };
            match self.inner.pool.in_flight_requests(&addr) {
                Some(0) => {
                    trace!(
                        "found least loaded broker {} without in flight requests",
                        broker
                    );
                    return Ok((*broker).clone());
                }
                Some(n) if n < fewest => {
                    fewest = n;
                    found = Some(*broker);
                }
                _ => {
                    if found.is_none() {
                        found = Some(*broker);
                    }
                }
            }
        }

        found
            .cloned()
            .ok_or_else(|| ErrorKind::NoBrokerAvailable.into())
    }

    /// On first use of a connection, exchange ApiVersions and cache the
    /// broker's ranges; later requests refuse out-of-range APIs.
    pub async fn ensure_api_versions(&self, conn: &KafkaConnection) -> Result<()> {
        if conn.has_api_versions() {
            return Ok(());
        }

        // v0 is understood by every broker and returns the full table
        let request = KafkaRequest::ApiVersions(ApiVersionsRequest {
            header: conn.request_header(ApiKeys::ApiVersions, 0),
            client_software_name: String::new(),
            client_software_version: String::new(),
        });

        match conn.send(request).await? {
            KafkaResponse::ApiVersions(res) => {
                if res.error_code != 0 {
                    bail!(ErrorKind::KafkaError(KafkaCode::from(res.error_code)));
                }
                let versions: HashMap<_, _> = res
                    .api_versions
                    .iter()
                    .map(|api| (api.api_key, (api.min_version, api.max_version)))
                    .collect();
                conn.set_api_versions(versions);
                Ok(())
            }
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        }
    }

    /// The API table of a bootstrap broker.
    pub async fn list_apis(&self) -> Result<Vec<SupportedApiVersion>> {
        self.check_open()?;
        let span = self.inner.diagnostics.begin("list_apis");
        span.async_start();

        let conn = self.bootstrap_conn().await?;
        let request = KafkaRequest::ApiVersions(ApiVersionsRequest {
            header: conn.request_header(ApiKeys::ApiVersions, 0),
            client_software_name: String::new(),
            client_software_version: String::new(),
        });
        let result = match conn.send(request).await {
            Ok(KafkaResponse::ApiVersions(res)) => Ok(res.api_versions),
            Ok(res) => Err(Error::from(ErrorKind::UnexpectedResponse(res.api_key()))),
            Err(err) => Err(err),
        };

        match &result {
            Ok(_) => span.finish(),
            Err(err) => span.fail(err),
        }
        result
    }

    /// The merged cluster metadata, refreshing only the stale or missing
    /// slices unless forced.
    pub async fn metadata(&self, options: MetadataOptions) -> Result<Arc<Metadata>> {
        self.check_open()?;

        if !options.force_update {
            let fresh = match &options.topics {
                Some(topics) => self
                    .inner
                    .cache
                    .stale_topics(topics, Instant::now())
                    .is_none(),
                None => !self.inner.cache.cluster_stale(Instant::now()),
            };
            if fresh {
                return Ok(self.inner.cache.snapshot());
            }
        }

        // concurrent refreshers coalesce on this lock
        let _guard = self.inner.refresh_lock.lock().await;
        self.check_open()?;

        let fetch_topics = match &options.topics {
            Some(topics) if !options.force_update => {
                match self.inner.cache.stale_topics(topics, Instant::now()) {
                    Some(stale) => Some(stale),
                    None => return Ok(self.inner.cache.snapshot()),
                }
            }
            Some(topics) => Some(topics.clone()),
            None if !options.force_update && !self.inner.cache.cluster_stale(Instant::now()) => {
                return Ok(self.inner.cache.snapshot());
            }
            None => None,
        };

        debug!("fetching metadata for topics: {:?}", fetch_topics);

        let conn = self.bootstrap_conn().await?;
        let api_version = conn.version_for(ApiKeys::Metadata)?;
        let request = KafkaRequest::Metadata(MetadataRequest {
            header: conn.request_header(ApiKeys::Metadata, api_version),
            topics: fetch_topics.clone(),
            allow_auto_topic_creation: options.autocreate_topics,
        });

        match conn.send(request).await? {
            KafkaResponse::Metadata(res) => {
                let merged = self.inner.cache.snapshot().merge(&res, Instant::now());
                Ok(self.inner.cache.update(merged, fetch_topics.as_deref()))
            }
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        }
    }

    /// Open a connection to every broker in the cluster; returns how many
    /// came up.
    pub async fn connect_to_brokers(&self) -> Result<usize> {
        let metadata = self.metadata(MetadataOptions::default()).await?;
        let mut connected = 0;

        for broker in metadata.all_brokers() {
            match self.conn_to(broker).await {
                Ok(_) => connected += 1,
                Err(err) => warn!("fail to connect broker {}, {}", broker, err),
            }
        }

        if connected == 0 {
            bail!(ErrorKind::NoBrokerAvailable);
        }
        Ok(connected)
    }

    /// Resolve the coordinator broker for a consumer group or a
    /// transactional id.
    pub async fn find_coordinator(&self, key: &str, key_type: CoordinatorType) -> Result<Broker> {
        debug!("discover coordinator of `{}` ({:?})", key, key_type);

        let metadata = self.metadata(MetadataOptions::default()).await?;
        let broker = self.least_loaded_broker(&metadata)?;
        let conn = self.conn_to(&broker).await?;

        let api_version = conn.version_for(ApiKeys::FindCoordinator)?;
        let request = KafkaRequest::FindCoordinator(FindCoordinatorRequest {
            header: conn.request_header(ApiKeys::FindCoordinator, api_version),
            key: key.to_owned(),
            key_type,
        });

        match conn.send(request).await? {
            KafkaResponse::FindCoordinator(res) => {
                if res.error_code != 0 {
                    bail!(ErrorKind::KafkaError(KafkaCode::from(res.error_code)));
                }
                Ok(Broker::new(res.node_id, res.host, res.port, None))
            }
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        }
    }

    /// A ready, version-negotiated connection to the broker filling the
    /// given role.
    pub async fn conn_for(&self, role: &BrokerRole) -> Result<KafkaConnection> {
        self.check_open()?;

        match role {
            BrokerRole::Bootstrap => self.bootstrap_conn().await,
            BrokerRole::Controller => {
                let metadata = self.metadata(MetadataOptions::default()).await?;
                let controller = metadata
                    .controller()
                    .ok_or(ErrorKind::NoBrokerAvailable)?
                    .clone();
                self.conn_to(&controller).await
            }
            BrokerRole::Coordinator { key, key_type } => {
                let coordinator = self.find_coordinator(key, *key_type).await?;
                self.conn_to(&coordinator).await
            }
            BrokerRole::Leader(tp) => {
                let metadata = self
                    .metadata(MetadataOptions::topics([tp.topic_name.clone()]))
                    .await?;
                let leader = metadata
                    .leader_broker(tp)
                    .ok_or(ErrorKind::KafkaError(KafkaCode::LeaderNotAvailable))?
                    .clone();
                self.conn_to(&leader).await
            }
            BrokerRole::Node(node_id) => {
                let metadata = self.metadata(MetadataOptions::default()).await?;
                let broker = metadata
                    .broker(*node_id)
                    .ok_or(ErrorKind::BrokerNotFound(*node_id))?
                    .clone();
                self.conn_to(&broker).await
            }
        }
    }

    /// Mark metadata stale after a routing error so the next attempt
    /// refetches; scoped to a topic when one is known.
    pub fn invalidate_metadata(&self, topic_name: Option<&str>, reason: &str) {
        match topic_name {
            Some(topic_name) => self.inner.cache.invalidate_topic(topic_name),
            None => self.inner.cache.invalidate_all(reason),
        }
    }

    pub fn metadata_snapshot(&self) -> Arc<Metadata> {
        self.inner.cache.snapshot()
    }

    /// Retry `operation` on transient errors with exponential backoff and
    /// jitter, aggregating everything seen when the budget runs out. A
    /// `close()` during a backoff delay cancels the retry immediately.
    pub async fn perform_with_retry<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let span = self.inner.diagnostics.begin(operation);
        span.async_start();

        let delays = std::iter::once(std::time::Duration::ZERO).chain(
            ExponentialBackoff::from_millis(2)
                .factor(self.inner.config.retry_delay_ms.max(2) / 2)
                .map(jitter)
                .take(self.inner.config.retries),
        );

        let mut closed = self.inner.closed.subscribe();
        let mut errors = Vec::new();

        for delay in delays {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = closed.changed() => {}
                }
            }
            if *closed.borrow() {
                let err = Error::from(ErrorKind::ClientClosed(format!(
                    "Client closed while retrying {}",
                    operation
                )));
                span.fail(&err);
                return Err(err);
            }

            match f().await {
                Ok(value) => {
                    span.finish();
                    return Ok(value);
                }
                Err(err) if err.is_retriable() => {
                    warn!("{} failed, will retry, {}", operation, err);
                    match err.kafka_code() {
                        Some(
                            KafkaCode::NotController
                            | KafkaCode::NotCoordinator
                            | KafkaCode::CoordinatorNotAvailable
                            | KafkaCode::CoordinatorLoadInProgress
                            | KafkaCode::NotLeaderOrFollower
                            | KafkaCode::LeaderNotAvailable
                            | KafkaCode::UnknownTopicOrPartition,
                        ) => self.inner.cache.invalidate_all(&err.to_string()),
                        _ => {}
                    }
                    errors.push(err);
                }
                Err(err) => {
                    span.fail(&err);
                    return Err(err);
                }
            }
        }

        let err = if errors.len() == 1 {
            errors.pop().expect("one error")
        } else {
            Error::from(ErrorKind::MultipleErrors(errors))
        };
        span.fail(&err);
        Err(err)
    }

    /// Best-effort shutdown: cancels retries, fails pending requests and
    /// closes every connection. Idempotent, never raises.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }

        debug!("closing client");
        let _ = self.inner.closed.send(true);
        self.inner.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> KafkaClient {
        KafkaClient::from_config(ClientConfig {
            bootstrap_brokers: vec!["localhost:9092".into()],
            retries: 2,
            retry_delay_ms: 1,
            ..ClientConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = test_client();
        assert!(!client.is_closed());
        client.close();
        client.close();
        assert!(client.is_closed());

        let err = client
            .metadata(MetadataOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ClientClosed(_)));
    }

    #[tokio::test]
    async fn test_retry_aggregates_transient_errors() {
        let client = test_client();

        let err = client
            .perform_with_retry("op", || async {
                Err::<(), Error>(ErrorKind::KafkaError(KafkaCode::NotController).into())
            })
            .await
            .unwrap_err();

        match err.kind() {
            ErrorKind::MultipleErrors(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_stops_on_fatal_error() {
        let client = test_client();

        let err = client
            .perform_with_retry("op", || async {
                Err::<(), Error>(ErrorKind::KafkaError(KafkaCode::TopicAlreadyExists).into())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kafka_code(), Some(KafkaCode::TopicAlreadyExists));
    }

    #[tokio::test]
    async fn test_retry_observes_close() {
        let client = test_client();
        client.close();

        let err = client
            .perform_with_retry("op", || async {
                Err::<(), Error>(ErrorKind::KafkaError(KafkaCode::NotController).into())
            })
            .await
            .unwrap_err();

        // closed before the first attempt even runs
        assert!(err.to_string().starts_with("Client closed while retrying"));
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let client = test_client();
        let value = client
            .perform_with_retry("op", || async { Ok(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
