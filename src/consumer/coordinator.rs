//! Manages the coordination process with the consumer group coordinator:
//! join/sync rounds, heartbeats, offset commit/fetch and leaving.

use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::client::{Broker, BrokerRole, KafkaClient, MetadataOptions};
use crate::consumer::assignor::PartitionAssignor;
use crate::consumer::config::ConsumerConfig;
use crate::consumer::protocol::{Assignment, Subscription, CONSUMER_PROTOCOL};
use crate::consumer::subscriptions::Subscriptions;
use crate::errors::{ErrorKind, KafkaCode, Result};
use crate::network::{KafkaConnection, KafkaRequest, KafkaResponse, TopicPartition};
use crate::protocol::{
    ApiKeys, CoordinatorType, GenerationId, HeartbeatRequest, JoinGroupMember, JoinGroupProtocol,
    JoinGroupRequest, LeaveGroupRequest, MemberIdentity, Offset, OffsetCommitPartition,
    OffsetCommitRequest, OffsetCommitTopic, OffsetFetchRequest, OffsetFetchTopic,
    SyncGroupAssignment, SyncGroupRequest, NO_COMMITTED_LEADER_EPOCH,
};

/// The identity a member holds within one generation of the group.
#[derive(Clone, Debug, PartialEq)]
pub struct Generation {
    pub generation_id: GenerationId,
    pub member_id: String,
    pub protocol: String,
}

/// The group membership state machine.
#[derive(Debug)]
enum GroupState {
    /// Not part of the group.
    Unjoined,
    /// JoinGroup in flight.
    Joining,
    /// Waiting for the leader's assignments.
    Syncing,
    /// Member of a generation, heartbeating.
    Stable {
        coordinator: Broker,
        generation: Generation,
    },
    /// LeaveGroup in flight.
    Leaving,
    /// Terminal.
    Closed,
}

impl GroupState {
    fn generation(&self) -> Option<Generation> {
        if let GroupState::Stable { generation, .. } = self {
            Some(generation.clone())
        } else {
            None
        }
    }

    fn coordinator(&self) -> Option<Broker> {
        if let GroupState::Stable { coordinator, .. } = self {
            Some(coordinator.clone())
        } else {
            None
        }
    }
}

struct CoordinatorInner {
    client: KafkaClient,
    config: ConsumerConfig,
    subscriptions: Arc<Mutex<Subscriptions>>,
    assignors: Vec<Box<dyn PartitionAssignor>>,
    state: Mutex<GroupState>,
    /// Member id survives generations (the coordinator knows us by it).
    member_id: Mutex<String>,
    /// Set by `close`; joins are refused but the current generation stays
    /// readable so shutdown can still commit and leave.
    closing: AtomicBool,
    rejoin_needed: AtomicBool,
    session_expired: AtomicBool,
    last_heartbeat_ack: Mutex<Instant>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

/// Manages the coordination process with the consumer coordinator.
#[derive(Clone)]
pub struct ConsumerCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl ConsumerCoordinator {
    pub fn new(
        client: KafkaClient,
        config: ConsumerConfig,
        subscriptions: Arc<Mutex<Subscriptions>>,
        assignors: Vec<Box<dyn PartitionAssignor>>,
    ) -> Self {
        ConsumerCoordinator {
            inner: Arc::new(CoordinatorInner {
                client,
                config,
                subscriptions,
                assignors,
                state: Mutex::new(GroupState::Unjoined),
                member_id: Mutex::new(String::new()),
                closing: AtomicBool::new(false),
                rejoin_needed: AtomicBool::new(false),
                session_expired: AtomicBool::new(false),
                last_heartbeat_ack: Mutex::new(Instant::now()),
                heartbeat_task: Mutex::new(None),
            }),
        }
    }

    pub fn group_id(&self) -> &str {
        &self.inner.config.group_id
    }

    pub fn is_stable(&self) -> bool {
        matches!(*self.inner.state.lock().unwrap(), GroupState::Stable { .. })
    }

    pub fn generation(&self) -> Option<Generation> {
        self.inner.state.lock().unwrap().generation()
    }

    pub fn coordinator_broker(&self) -> Option<Broker> {
        self.inner.state.lock().unwrap().coordinator()
    }

    pub fn rejoin_needed(&self) -> bool {
        self.inner.rejoin_needed.load(Ordering::SeqCst)
    }

    pub fn request_rejoin(&self) {
        self.inner.rejoin_needed.store(true, Ordering::SeqCst);
    }

    /// True once the session timed out without a heartbeat ack; cleared by
    /// the next successful join.
    pub fn session_expired(&self) -> bool {
        self.inner.session_expired.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
            || matches!(*self.inner.state.lock().unwrap(), GroupState::Closed)
    }

    async fn coordinator_conn(&self) -> Result<(Broker, KafkaConnection)> {
        let coordinator = match self.coordinator_broker() {
            Some(coordinator) => coordinator,
            None => {
                self.inner
                    .client
                    .find_coordinator(&self.inner.config.group_id, CoordinatorType::Group)
                    .await?
            }
        };
        let conn = self
            .inner
            .client
            .conn_for(&BrokerRole::Node(coordinator.id()))
            .await?;
        Ok((coordinator, conn))
    }

    /// Join (or rejoin) the group and come out STABLE with an assignment,
    /// the heartbeat timer running and the session clock reset.
    pub async fn ensure_active_group(&self) -> Result<()> {
        loop {
            if self.is_closed() || self.inner.client.is_closed() {
                bail!(ErrorKind::ClientClosed("consumer closed".into()));
            }
            if self.is_stable() && !self.rejoin_needed() {
                return Ok(());
            }

            self.stop_heartbeat();
            match self.join_group_round().await {
                Ok(()) => {
                    self.inner.rejoin_needed.store(false, Ordering::SeqCst);
                    self.inner.session_expired.store(false, Ordering::SeqCst);
                    self.start_heartbeat();
                    return Ok(());
                }
                Err(err) => {
                    match err.kafka_code() {
                        // the coordinator handed us the member id to join with
                        Some(KafkaCode::MemberIdRequired) => continue,
                        Some(KafkaCode::UnknownMemberId) => {
                            self.inner.member_id.lock().unwrap().clear();
                            continue;
                        }
                        _ => {}
                    }
                    if err.is_retriable() {
                        trace!("join attempt failed, will retry, {}", err);
                        tokio::time::sleep(self.inner.client.config().retry_delay()).await;
                        continue;
                    }
                    *self.inner.state.lock().unwrap() = GroupState::Unjoined;
                    return Err(err);
                }
            }
        }
    }

    /// One JoinGroup + SyncGroup round.
    async fn join_group_round(&self) -> Result<()> {
        let group_id = self.inner.config.group_id.clone();
        let member_id = self.inner.member_id.lock().unwrap().clone();

        debug!("member `{}` is joining the `{}` group", member_id, group_id);
        *self.inner.state.lock().unwrap() = GroupState::Joining;

        let (coordinator, conn) = self.coordinator_conn().await?;

        let topics = self.inner.subscriptions.lock().unwrap().topics().to_vec();
        let protocols = self.group_protocols(&topics)?;

        let api_version = conn.version_for(ApiKeys::JoinGroup)?;
        let request = KafkaRequest::JoinGroup(JoinGroupRequest {
            header: conn.request_header(ApiKeys::JoinGroup, api_version),
            group_id: group_id.clone(),
            session_timeout_ms: self.inner.config.session_timeout_ms as i32,
            rebalance_timeout_ms: self.inner.config.rebalance_timeout_ms as i32,
            member_id,
            group_instance_id: None,
            protocol_type: CONSUMER_PROTOCOL.to_owned(),
            protocols,
        });

        // the broker parks joins until the rebalance completes
        let join_timeout =
            self.inner.config.rebalance_timeout() + self.inner.client.config().request_timeout();
        let response = match conn.send_with_timeout(request, join_timeout).await? {
            KafkaResponse::JoinGroup(res) => res,
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        };

        if response.error_code != 0 {
            // MEMBER_ID_REQUIRED hands us our id for the retry
            if KafkaCode::from(response.error_code) == KafkaCode::MemberIdRequired {
                *self.inner.member_id.lock().unwrap() = response.member_id.clone();
            }
            bail!(ErrorKind::KafkaError(KafkaCode::from(response.error_code)));
        }

        *self.inner.member_id.lock().unwrap() = response.member_id.clone();
        let generation = Generation {
            generation_id: response.generation_id,
            member_id: response.member_id.clone(),
            protocol: response.protocol_name.clone().unwrap_or_default(),
        };

        let is_leader = response.leader_id == response.member_id;
        debug!(
            "member `{}` joined group `{}` # {} as {}",
            generation.member_id,
            group_id,
            generation.generation_id,
            if is_leader { "leader" } else { "follower" }
        );

        *self.inner.state.lock().unwrap() = GroupState::Syncing;

        let group_assignment = if is_leader {
            self.perform_assignment(&generation.protocol, &response.members)
                .await?
        } else {
            Vec::new()
        };

        let api_version = conn.version_for(ApiKeys::SyncGroup)?;
        let request = KafkaRequest::SyncGroup(SyncGroupRequest {
            header: conn.request_header(ApiKeys::SyncGroup, api_version),
            group_id: group_id.clone(),
            generation_id: generation.generation_id,
            member_id: generation.member_id.clone(),
            group_instance_id: None,
            assignments: group_assignment,
        });
        let response = match conn.send_with_timeout(request, join_timeout).await? {
            KafkaResponse::SyncGroup(res) => res,
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        };
        if response.error_code != 0 {
            bail!(ErrorKind::KafkaError(KafkaCode::from(response.error_code)));
        }

        let assignment = Assignment::parse(&response.assignment)?;
        trace!(
            "member `{}` synced up to generation # {} with {} partitions: {:?}",
            generation.member_id,
            generation.generation_id,
            assignment.partitions.len(),
            assignment.partitions
        );

        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .assign_from_subscribed(assignment.partitions)?;

        *self.inner.last_heartbeat_ack.lock().unwrap() = Instant::now();
        *self.inner.state.lock().unwrap() = GroupState::Stable {
            coordinator,
            generation,
        };

        Ok(())
    }

    fn group_protocols(&self, topics: &[String]) -> Result<Vec<JoinGroupProtocol>> {
        let mut protocols = Vec::with_capacity(self.inner.assignors.len());
        for assignor in &self.inner.assignors {
            let subscription = assignor.subscription(topics.to_vec());
            protocols.push(JoinGroupProtocol {
                protocol_name: assignor.name().to_owned(),
                protocol_metadata: subscription.serialize()?,
            });
        }
        Ok(protocols)
    }

    /// Leader-side: compute the assignment for every member under the
    /// protocol the coordinator picked.
    async fn perform_assignment(
        &self,
        group_protocol: &str,
        members: &[JoinGroupMember],
    ) -> Result<Vec<SyncGroupAssignment>> {
        let strategy = group_protocol.parse()?;
        let assignor = self
            .inner
            .assignors
            .iter()
            .find(|assignor| assignor.strategy() == strategy)
            .ok_or_else(|| ErrorKind::UnsupportedAssignmentStrategy(group_protocol.to_owned()))?;

        let mut subscriptions = HashMap::with_capacity(members.len());
        let mut subscribed_topics = Vec::new();
        for member in members {
            let subscription = Subscription::parse(&member.member_metadata)?;
            subscribed_topics.extend(subscription.topics.iter().cloned());
            subscriptions.insert(member.member_id.clone(), subscription);
        }
        subscribed_topics.sort();
        subscribed_topics.dedup();

        // the leader needs partition counts for every subscribed topic
        let metadata = self
            .inner
            .client
            .metadata(MetadataOptions::topics(subscribed_topics.clone()))
            .await?;

        self.inner
            .subscriptions
            .lock()
            .unwrap()
            .group_subscribe(subscribed_topics.iter());

        let assignment = assignor.assign(&metadata, &subscriptions);

        let mut group_assignment = Vec::with_capacity(assignment.len());
        for (member_id, assignment) in assignment {
            group_assignment.push(SyncGroupAssignment {
                member_id,
                assignment: assignment.serialize()?,
            });
        }
        group_assignment.sort_by(|a, b| a.member_id.cmp(&b.member_id));
        Ok(group_assignment)
    }

    fn start_heartbeat(&self) {
        let inner = self.inner.clone();
        let mut closed = self.inner.client.closed_watch();

        let handle = tokio::spawn(async move {
            let interval = inner.config.heartbeat_interval();

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = closed.changed() => return,
                }

                let (coordinator, generation) = {
                    let state = inner.state.lock().unwrap();
                    match state.coordinator().zip(state.generation()) {
                        Some(pair) => pair,
                        None => return,
                    }
                };

                match heartbeat_once(&inner, &coordinator, &generation).await {
                    Ok(KafkaCode::None) => {
                        *inner.last_heartbeat_ack.lock().unwrap() = Instant::now();
                    }
                    Ok(KafkaCode::RebalanceInProgress) => {
                        debug!("group `{}` is rebalancing", inner.config.group_id);
                        inner.rejoin_needed.store(true, Ordering::SeqCst);
                        return;
                    }
                    Ok(KafkaCode::UnknownMemberId) | Ok(KafkaCode::IllegalGeneration) => {
                        warn!(
                            "member `{}` fell out of group `{}`",
                            generation.member_id, inner.config.group_id
                        );
                        inner.member_id.lock().unwrap().clear();
                        *inner.state.lock().unwrap() = GroupState::Unjoined;
                        inner.rejoin_needed.store(true, Ordering::SeqCst);
                        return;
                    }
                    Ok(code) => {
                        warn!("heartbeat failed, {:?}", code);
                    }
                    Err(err) => {
                        warn!("fail to send heartbeat, {}", err);
                    }
                }

                let since_ack = inner.last_heartbeat_ack.lock().unwrap().elapsed();
                if since_ack >= inner.config.session_timeout() {
                    warn!(
                        "session of group `{}` timed out after {:?}",
                        inner.config.group_id, since_ack
                    );
                    *inner.state.lock().unwrap() = GroupState::Unjoined;
                    inner.session_expired.store(true, Ordering::SeqCst);
                    inner.rejoin_needed.store(true, Ordering::SeqCst);
                    return;
                }
            }
        });

        *self.inner.heartbeat_task.lock().unwrap() = Some(handle);
    }

    fn stop_heartbeat(&self) {
        if let Some(handle) = self.inner.heartbeat_task.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Commit explicit offsets (each the next offset to read) through the
    /// coordinator.
    pub async fn commit_offsets(&self, offsets: &HashMap<TopicPartition, Offset>) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }

        let generation = self
            .generation()
            .ok_or(ErrorKind::KafkaError(KafkaCode::RebalanceInProgress))?;
        let (_, conn) = self.coordinator_conn().await?;

        let mut topics: HashMap<String, Vec<OffsetCommitPartition>> = HashMap::new();
        for (tp, offset) in offsets {
            topics
                .entry(tp.topic_name.clone())
                .or_default()
                .push(OffsetCommitPartition {
                    partition: tp.partition,
                    committed_offset: *offset,
                    committed_leader_epoch: NO_COMMITTED_LEADER_EPOCH,
                    metadata: None,
                });
        }

        let api_version = conn.version_for(ApiKeys::OffsetCommit)?;
        let request = KafkaRequest::OffsetCommit(OffsetCommitRequest {
            header: conn.request_header(ApiKeys::OffsetCommit, api_version),
            group_id: self.inner.config.group_id.clone(),
            generation_id: generation.generation_id,
            member_id: generation.member_id.clone(),
            group_instance_id: None,
            topics: topics
                .into_iter()
                .map(|(topic_name, partitions)| OffsetCommitTopic {
                    topic_name,
                    partitions,
                })
                .collect(),
        });

        let response = match conn.send(request).await? {
            KafkaResponse::OffsetCommit(res) => res,
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        };

        for topic in &response.topics {
            for (partition, error_code) in &topic.partitions {
                match KafkaCode::from(*error_code) {
                    KafkaCode::None => {}
                    code @ (KafkaCode::RebalanceInProgress
                    | KafkaCode::IllegalGeneration
                    | KafkaCode::UnknownMemberId) => {
                        self.request_rejoin();
                        bail!(ErrorKind::KafkaError(code));
                    }
                    code => {
                        if code == KafkaCode::NotCoordinator {
                            self.inner
                                .client
                                .invalidate_metadata(None, "offset commit rejected");
                        }
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::OffsetCommit.key(),
                            code,
                            format!("/topics/{}/partitions/{}", topic.topic_name, partition),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Committed offsets of the given partitions (absent entries have no
    /// commit yet).
    pub async fn fetch_committed(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<HashMap<TopicPartition, Offset>> {
        if partitions.is_empty() {
            return Ok(HashMap::new());
        }

        let (_, conn) = self.coordinator_conn().await?;

        let mut topics: HashMap<String, Vec<i32>> = HashMap::new();
        for tp in partitions {
            topics
                .entry(tp.topic_name.clone())
                .or_default()
                .push(tp.partition);
        }

        let api_version = conn.version_for(ApiKeys::OffsetFetch)?;
        let request = KafkaRequest::OffsetFetch(OffsetFetchRequest {
            header: conn.request_header(ApiKeys::OffsetFetch, api_version),
            group_id: self.inner.config.group_id.clone(),
            topics: Some(
                topics
                    .into_iter()
                    .map(|(topic_name, partitions)| OffsetFetchTopic {
                        topic_name,
                        partitions,
                    })
                    .collect(),
            ),
            require_stable: false,
        });

        let response = match conn.send(request).await? {
            KafkaResponse::OffsetFetch(res) => res,
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        };
        if response.error_code != 0 {
            bail!(ErrorKind::KafkaError(KafkaCode::from(response.error_code)));
        }

        let mut committed = HashMap::new();
        for topic in response.topics {
            for partition in topic.partitions {
                if partition.error_code != 0 {
                    bail!(ErrorKind::ProtocolError(
                        ApiKeys::OffsetFetch.key(),
                        KafkaCode::from(partition.error_code),
                        format!(
                            "/topics/{}/partitions/{}",
                            topic.topic_name, partition.partition
                        ),
                    ));
                }
                if partition.committed_offset >= 0 {
                    committed.insert(
                        TopicPartition::new(topic.topic_name.clone(), partition.partition),
                        partition.committed_offset,
                    );
                }
            }
        }
        Ok(committed)
    }

    /// Leave the group; best effort.
    pub async fn leave_group(&self) {
        self.stop_heartbeat();

        let state = {
            let mut state = self.inner.state.lock().unwrap();
            if matches!(*state, GroupState::Closed) {
                return;
            }
            mem::replace(&mut *state, GroupState::Leaving)
        };

        if let GroupState::Stable { generation, .. } = state {
            debug!(
                "member `{}` is leaving the `{}` group",
                generation.member_id, self.inner.config.group_id
            );

            if let Ok((_, conn)) = self.coordinator_conn().await {
                if let Ok(api_version) = conn.version_for(ApiKeys::LeaveGroup) {
                    let request = KafkaRequest::LeaveGroup(LeaveGroupRequest {
                        header: conn.request_header(ApiKeys::LeaveGroup, api_version),
                        group_id: self.inner.config.group_id.clone(),
                        members: vec![MemberIdentity {
                            member_id: generation.member_id.clone(),
                            group_instance_id: None,
                        }],
                    });
                    if let Err(err) = conn.send(request).await {
                        warn!("fail to leave group, {}", err);
                    }
                }
            }
        }

        self.inner.member_id.lock().unwrap().clear();
        self.inner.subscriptions.lock().unwrap().clear_assignment();
        *self.inner.state.lock().unwrap() = GroupState::Unjoined;
    }

    /// Refuse further joins; the generation stays readable so a final
    /// commit and LeaveGroup can still go out. `seal` makes it terminal.
    pub fn close(&self) {
        self.stop_heartbeat();
        self.inner.closing.store(true, Ordering::SeqCst);
    }

    /// Terminal.
    pub fn seal(&self) {
        self.close();
        *self.inner.state.lock().unwrap() = GroupState::Closed;
    }
}

async fn heartbeat_once(
    inner: &Arc<CoordinatorInner>,
    coordinator: &Broker,
    generation: &Generation,
) -> Result<KafkaCode> {
    let conn = inner
        .client
        .conn_for(&BrokerRole::Node(coordinator.id()))
        .await?;
    let api_version = conn.version_for(ApiKeys::Heartbeat)?;
    let request = KafkaRequest::Heartbeat(HeartbeatRequest {
        header: conn.request_header(ApiKeys::Heartbeat, api_version),
        group_id: inner.config.group_id.clone(),
        generation_id: generation.generation_id,
        member_id: generation.member_id.clone(),
        group_instance_id: None,
    });

    match conn.send(request).await? {
        KafkaResponse::Heartbeat(res) => Ok(KafkaCode::from(res.error_code)),
        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::consumer::assignor::{RangeAssignor, RoundRobinAssignor};

    fn coordinator() -> ConsumerCoordinator {
        let client = KafkaClient::from_config(ClientConfig {
            bootstrap_brokers: vec!["localhost:9092".into()],
            ..ClientConfig::default()
        })
        .unwrap();
        let subscriptions = Arc::new(Mutex::new(Subscriptions::new()));
        ConsumerCoordinator::new(
            client,
            ConsumerConfig {
                group_id: "g".into(),
                ..ConsumerConfig::default()
            },
            subscriptions,
            vec![
                Box::<RangeAssignor>::default(),
                Box::<RoundRobinAssignor>::default(),
            ],
        )
    }

    #[tokio::test]
    async fn test_initial_state_is_unjoined() {
        let coordinator = coordinator();
        assert!(!coordinator.is_stable());
        assert_eq!(coordinator.generation(), None);
        assert!(!coordinator.rejoin_needed());
    }

    #[tokio::test]
    async fn test_commit_without_generation_fails() {
        let coordinator = coordinator();
        let mut offsets = HashMap::new();
        offsets.insert(TopicPartition::new("t", 0), 1);

        let err = coordinator.commit_offsets(&offsets).await.unwrap_err();
        assert_eq!(err.kafka_code(), Some(KafkaCode::RebalanceInProgress));
    }

    #[tokio::test]
    async fn test_close_refuses_joins() {
        let coordinator = coordinator();
        coordinator.close();

        let err = coordinator.ensure_active_group().await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ClientClosed(_)));
    }

    #[test]
    fn test_group_protocols_cover_assignors() {
        let coordinator = coordinator();
        let protocols = coordinator.group_protocols(&["t".to_owned()]).unwrap();
        let names: Vec<&str> = protocols
            .iter()
            .map(|protocol| protocol.protocol_name.as_str())
            .collect();
        assert_eq!(names, vec!["range", "roundrobin"]);
    }
}
