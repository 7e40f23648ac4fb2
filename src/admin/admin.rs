//! The admin role: topic DDL, group management, configs, quotas, log dirs,
//! SCRAM credentials, delegation tokens, reassignments and feature updates,
//! each routed to the broker that owns the operation and retried through
//! the base client's policy.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures::future;

use crate::admin::types::{
    ClusterDescription, CreatedTopic, GroupListing, NewTopic, TopicListing,
};
use crate::client::{BrokerRole, KafkaClient, MetadataOptions};
use crate::errors::{Error, ErrorKind, KafkaCode, Result};
use crate::network::{KafkaRequest, KafkaResponse};
use crate::protocol::{
    AlterClientQuotasRequest, AlterConfigsRequest, AlterConfigsResource,
    AlterConfigsResourceResponse, AlterPartitionReassignmentsRequest, AlterReplicaLogDirsRequest,
    AlterUserScramCredentialsRequest, ApiKeys, ClientQuotaAlteration, ClientQuotaEntry,
    ConfigResourceType, CoordinatorType, CreatableTopic, CreateDelegationTokenRequest,
    CreateTopicsRequest, DeleteGroupsRequest, DeleteTopicsRequest, DelegationToken,
    DescribeClientQuotasRequest, DescribeClusterRequest, DescribeConfigsRequest,
    DescribeConfigsResource, DescribeConfigsResult, DescribeDelegationTokenRequest,
    DescribeGroupsRequest, DescribeLogDirsRequest, DescribeProducersRequest,
    DescribeUserScramCredentialsRequest, DescribedGroup, ErrorCode,
    ExpireDelegationTokenRequest, IncrementalAlterConfigsRequest,
    IncrementalAlterConfigsResource, KafkaPrincipal, ListGroupsRequest,
    ListPartitionReassignmentsRequest, LogDirDescription, NodeId, OffsetDeleteRequest,
    OffsetFetchTopic, OngoingPartitionReassignment, PartitionId, PartitionProducers,
    QuotaFilterComponent, RenewDelegationTokenRequest, ScramCredentialUpsertion, Timestamp,
    UpdateFeaturesRequest, UserScramCredentials,
};

/// Administrative operations over a shared `KafkaClient`.
#[derive(Clone)]
pub struct KafkaAdmin {
    client: KafkaClient,
}

fn check(api: ApiKeys, code: ErrorCode, path: String, errors: &mut Vec<Error>) {
    match KafkaCode::from(code) {
        KafkaCode::None => {}
        code => errors.push(ErrorKind::ProtocolError(api.key(), code, path).into()),
    }
}

fn fold(mut errors: Vec<Error>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.pop().expect("one error")),
        _ => Err(ErrorKind::MultipleErrors(errors).into()),
    }
}

impl KafkaAdmin {
    pub fn new(client: KafkaClient) -> Self {
        KafkaAdmin { client }
    }

    pub fn client(&self) -> &KafkaClient {
        &self.client
    }

    pub fn close(&self) {
        self.client.close();
    }

    /// Create topics on the controller; existing-topic errors surface,
    /// creation is not idempotent.
    pub async fn create_topics(
        &self,
        topics: Vec<NewTopic>,
        timeout_ms: i32,
        validate_only: bool,
    ) -> Result<Vec<CreatedTopic>> {
        let admin = self.clone();
        let topics = Arc::new(topics);

        self.client
            .perform_with_retry("create_topics", move || {
                let admin = admin.clone();
                let topics = topics.clone();
                async move { admin.create_topics_once(&topics, timeout_ms, validate_only).await }
            })
            .await
    }

    async fn create_topics_once(
        &self,
        topics: &[NewTopic],
        timeout_ms: i32,
        validate_only: bool,
    ) -> Result<Vec<CreatedTopic>> {
        let conn = self.client.conn_for(&BrokerRole::Controller).await?;
        let api_version = conn.version_for(ApiKeys::CreateTopics)?;

        let request = KafkaRequest::CreateTopics(CreateTopicsRequest {
            header: conn.request_header(ApiKeys::CreateTopics, api_version),
            topics: topics
                .iter()
                .map(|topic| CreatableTopic {
                    name: topic.name.clone(),
                    num_partitions: topic.partitions,
                    replication_factor: topic.replicas,
                    assignments: topic.assignments.clone(),
                    configs: topic
                        .configs
                        .iter()
                        .map(|(name, value)| (name.clone(), Some(value.clone())))
                        .collect(),
                })
                .collect(),
            timeout_ms,
            validate_only,
        });

        let response = match conn.send(request).await? {
            KafkaResponse::CreateTopics(res) => res,
            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
        };

        let mut errors = Vec::new();
        for (index, topic) in response.topics.iter().enumerate() {
            check(
                ApiKeys::CreateTopics,
                topic.error_code,
                format!("/topics/{}/error_code", index),
                &mut errors,
            );
        }
        fold(errors)?;

        Ok(response
            .topics
            .into_iter()
            .map(|topic| {
                let requested = topics.iter().find(|req| req.name == topic.name);
                CreatedTopic {
                    name: topic.name,
                    id: topic.topic_id,
                    partitions: if topic.num_partitions >= 0 {
                        topic.num_partitions
                    } else {
                        requested.map(|req| req.partitions).unwrap_or(-1)
                    },
                    replicas: if topic.replication_factor >= 0 {
                        topic.replication_factor
                    } else {
                        requested.map(|req| req.replicas).unwrap_or(-1)
                    },
                    configuration: topic
                        .configs
                        .into_iter()
                        .map(|config| (config.name, config.value))
                        .collect(),
                }
            })
            .collect())
    }

    pub async fn delete_topics(&self, topics: Vec<String>, timeout_ms: i32) -> Result<()> {
        let admin = self.clone();
        let topics = Arc::new(topics);

        self.client
            .perform_with_retry("delete_topics", move || {
                let admin = admin.clone();
                let topics = topics.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Controller).await?;
                    let api_version = conn.version_for(ApiKeys::DeleteTopics)?;
                    let request = KafkaRequest::DeleteTopics(DeleteTopicsRequest {
                        header: conn.request_header(ApiKeys::DeleteTopics, api_version),
                        topic_names: topics.to_vec(),
                        timeout_ms,
                    });

                    let response = match conn.send(request).await? {
                        KafkaResponse::DeleteTopics(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };

                    let mut errors = Vec::new();
                    for (index, topic) in response.responses.iter().enumerate() {
                        check(
                            ApiKeys::DeleteTopics,
                            topic.error_code,
                            format!("/responses/{}/error_code", index),
                            &mut errors,
                        );
                    }
                    fold(errors)
                }
            })
            .await
    }

    /// Topic names and partition counts from a forced metadata refresh.
    pub async fn list_topics(&self) -> Result<Vec<TopicListing>> {
        let metadata = self
            .client
            .metadata(MetadataOptions {
                topics: None,
                force_update: true,
                autocreate_topics: false,
            })
            .await?;

        let mut listings: Vec<TopicListing> = metadata
            .topics()
            .iter()
            .filter(|(_, topic)| topic.error.is_none())
            .map(|(name, topic)| TopicListing {
                name: name.clone(),
                id: topic.id,
                partitions_count: topic.partitions_count(),
            })
            .collect();
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listings)
    }

    /// Groups across the whole cluster, merged from every broker. State
    /// filters are applied client-side when the broker cannot.
    pub async fn list_groups(
        &self,
        states_filter: Vec<String>,
    ) -> Result<HashMap<String, GroupListing>> {
        let admin = self.clone();
        let states_filter = Arc::new(states_filter);

        self.client
            .perform_with_retry("list_groups", move || {
                let admin = admin.clone();
                let states_filter = states_filter.clone();
                async move { admin.list_groups_once(&states_filter).await }
            })
            .await
    }

    async fn list_groups_once(
        &self,
        states_filter: &[String],
    ) -> Result<HashMap<String, GroupListing>> {
        let metadata = self.client.metadata(MetadataOptions::default()).await?;
        let brokers: Vec<NodeId> = metadata.all_brokers().iter().map(|broker| broker.id()).collect();

        let responses = future::join_all(brokers.iter().map(|node_id| {
            let admin = self.clone();
            let states_filter = states_filter.to_vec();
            let node_id = *node_id;
            async move {
                let conn = admin.client.conn_for(&BrokerRole::Node(node_id)).await?;
                let api_version = conn.version_for(ApiKeys::ListGroups)?;
                let request = KafkaRequest::ListGroups(ListGroupsRequest {
                    header: conn.request_header(ApiKeys::ListGroups, api_version),
                    states_filter: states_filter.clone(),
                });
                let response = match conn.send(request).await? {
                    KafkaResponse::ListGroups(res) => res,
                    res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                };
                if response.error_code != 0 {
                    bail!(ErrorKind::ProtocolError(
                        ApiKeys::ListGroups.key(),
                        KafkaCode::from(response.error_code),
                        "/error_code".to_owned()
                    ));
                }
                Ok((api_version, response.groups))
            }
        }))
        .await;

        let mut merged = HashMap::new();
        let mut errors = Vec::new();
        for response in responses {
            match response {
                Ok((api_version, groups)) => {
                    for group in groups {
                        // client-side filter for brokers without
                        // server-side state filtering
                        if api_version < 4
                            && !states_filter.is_empty()
                            && !group
                                .group_state
                                .as_ref()
                                .map(|state| states_filter.contains(state))
                                .unwrap_or(true)
                        {
                            continue;
                        }
                        merged.insert(
                            group.group_id,
                            GroupListing {
                                protocol_type: group.protocol_type,
                                state: group.group_state,
                            },
                        );
                    }
                }
                Err(err) => errors.push(err),
            }
        }

        if merged.is_empty() {
            fold(errors)?;
        }
        Ok(merged)
    }

    /// Full group descriptions, routed to each group's coordinator.
    pub async fn describe_groups(&self, groups: Vec<String>) -> Result<Vec<DescribedGroup>> {
        let admin = self.clone();
        let groups = Arc::new(groups);

        self.client
            .perform_with_retry("describe_groups", move || {
                let admin = admin.clone();
                let groups = groups.clone();
                async move {
                    let mut described = Vec::with_capacity(groups.len());
                    for group_id in groups.iter() {
                        let conn = admin
                            .client
                            .conn_for(&BrokerRole::Coordinator {
                                key: group_id.clone(),
                                key_type: CoordinatorType::Group,
                            })
                            .await?;
                        let api_version = conn.version_for(ApiKeys::DescribeGroups)?;
                        let request = KafkaRequest::DescribeGroups(DescribeGroupsRequest {
                            header: conn.request_header(ApiKeys::DescribeGroups, api_version),
                            groups: vec![group_id.clone()],
                        });
                        let response = match conn.send(request).await? {
                            KafkaResponse::DescribeGroups(res) => res,
                            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                        };

                        for group in response.groups {
                            if group.error_code != 0 {
                                bail!(ErrorKind::ProtocolError(
                                    ApiKeys::DescribeGroups.key(),
                                    KafkaCode::from(group.error_code),
                                    format!("/groups/{}/error_code", group.group_id),
                                ));
                            }
                            described.push(group);
                        }
                    }
                    Ok(described)
                }
            })
            .await
    }

    /// Delete groups through their coordinators.
    pub async fn delete_groups(&self, groups: Vec<String>) -> Result<()> {
        let admin = self.clone();
        let groups = Arc::new(groups);

        self.client
            .perform_with_retry("delete_groups", move || {
                let admin = admin.clone();
                let groups = groups.clone();
                async move {
                    let mut errors = Vec::new();
                    for group_id in groups.iter() {
                        let conn = admin
                            .client
                            .conn_for(&BrokerRole::Coordinator {
                                key: group_id.clone(),
                                key_type: CoordinatorType::Group,
                            })
                            .await?;
                        let api_version = conn.version_for(ApiKeys::DeleteGroups)?;
                        let request = KafkaRequest::DeleteGroups(DeleteGroupsRequest {
                            header: conn.request_header(ApiKeys::DeleteGroups, api_version),
                            groups_names: vec![group_id.clone()],
                        });
                        let response = match conn.send(request).await? {
                            KafkaResponse::DeleteGroups(res) => res,
                            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                        };
                        for (group_id, error_code) in response.results {
                            check(
                                ApiKeys::DeleteGroups,
                                error_code,
                                format!("/results/{}/error_code", group_id),
                                &mut errors,
                            );
                        }
                    }
                    fold(errors)
                }
            })
            .await
    }

    /// Drop committed offsets of partitions a group no longer consumes.
    pub async fn delete_consumer_group_offsets(
        &self,
        group_id: String,
        topics: Vec<(String, Vec<PartitionId>)>,
    ) -> Result<()> {
        let admin = self.clone();
        let topics = Arc::new(topics);

        self.client
            .perform_with_retry("delete_consumer_group_offsets", move || {
                let admin = admin.clone();
                let group_id = group_id.clone();
                let topics = topics.clone();
                async move {
                    let conn = admin
                        .client
                        .conn_for(&BrokerRole::Coordinator {
                            key: group_id.clone(),
                            key_type: CoordinatorType::Group,
                        })
                        .await?;
                    let api_version = conn.version_for(ApiKeys::OffsetDelete)?;
                    let request = KafkaRequest::OffsetDelete(OffsetDeleteRequest {
                        header: conn.request_header(ApiKeys::OffsetDelete, api_version),
                        group_id: group_id.clone(),
                        topics: topics
                            .iter()
                            .map(|(topic_name, partitions)| OffsetFetchTopic {
                                topic_name: topic_name.clone(),
                                partitions: partitions.clone(),
                            })
                            .collect(),
                    });
                    let response = match conn.send(request).await? {
                        KafkaResponse::OffsetDelete(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };

                    let mut errors = Vec::new();
                    check(
                        ApiKeys::OffsetDelete,
                        response.error_code,
                        "/error_code".to_owned(),
                        &mut errors,
                    );
                    for topic in &response.topics {
                        for (partition, error_code) in &topic.partitions {
                            check(
                                ApiKeys::OffsetDelete,
                                *error_code,
                                format!("/topics/{}/partitions/{}", topic.topic_name, partition),
                                &mut errors,
                            );
                        }
                    }
                    fold(errors)
                }
            })
            .await
    }

    pub async fn describe_cluster(&self) -> Result<ClusterDescription> {
        let admin = self.clone();

        self.client
            .perform_with_retry("describe_cluster", move || {
                let admin = admin.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Bootstrap).await?;
                    let api_version = conn.version_for(ApiKeys::DescribeCluster)?;
                    let request = KafkaRequest::DescribeCluster(DescribeClusterRequest {
                        header: conn.request_header(ApiKeys::DescribeCluster, api_version),
                    });
                    let response = match conn.send(request).await? {
                        KafkaResponse::DescribeCluster(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };
                    if response.error_code != 0 {
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::DescribeCluster.key(),
                            KafkaCode::from(response.error_code),
                            "/error_code".to_owned()
                        ));
                    }
                    Ok(ClusterDescription {
                        cluster_id: response.cluster_id,
                        controller_id: response.controller_id,
                        brokers: response
                            .brokers
                            .into_iter()
                            .map(|broker| {
                                (broker.broker_id, broker.host, broker.port, broker.rack)
                            })
                            .collect(),
                    })
                }
            })
            .await
    }

    /// Configs per resource. Broker resources are routed to the broker
    /// they name; everything else goes through a bootstrap connection.
    pub async fn describe_configs(
        &self,
        resources: Vec<DescribeConfigsResource>,
        include_synonyms: bool,
    ) -> Result<Vec<DescribeConfigsResult>> {
        let admin = self.clone();
        let resources = Arc::new(resources);

        self.client
            .perform_with_retry("describe_configs", move || {
                let admin = admin.clone();
                let resources = resources.clone();
                async move {
                    let mut results = Vec::with_capacity(resources.len());
                    for resource in resources.iter() {
                        let role = admin.config_resource_role(resource.resource_type, &resource.resource_name);
                        let conn = admin.client.conn_for(&role).await?;
                        let api_version = conn.version_for(ApiKeys::DescribeConfigs)?;
                        let request = KafkaRequest::DescribeConfigs(DescribeConfigsRequest {
                            header: conn.request_header(ApiKeys::DescribeConfigs, api_version),
                            resources: vec![resource.clone()],
                            include_synonyms,
                        });
                        let response = match conn.send(request).await? {
                            KafkaResponse::DescribeConfigs(res) => res,
                            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                        };
                        for result in response.results {
                            if result.error_code != 0 {
                                bail!(ErrorKind::ProtocolError(
                                    ApiKeys::DescribeConfigs.key(),
                                    KafkaCode::from(result.error_code),
                                    format!("/results/{}/error_code", result.resource_name),
                                ));
                            }
                            results.push(result);
                        }
                    }
                    Ok(results)
                }
            })
            .await
    }

    fn config_resource_role(&self, resource_type: ConfigResourceType, resource_name: &str) -> BrokerRole {
        match resource_type {
            ConfigResourceType::Broker | ConfigResourceType::BrokerLogger => resource_name
                .parse::<NodeId>()
                .map(BrokerRole::Node)
                .unwrap_or(BrokerRole::Bootstrap),
            _ => BrokerRole::Bootstrap,
        }
    }

    pub async fn alter_configs(
        &self,
        resources: Vec<AlterConfigsResource>,
        validate_only: bool,
    ) -> Result<()> {
        let admin = self.clone();
        let resources = Arc::new(resources);

        self.client
            .perform_with_retry("alter_configs", move || {
                let admin = admin.clone();
                let resources = resources.clone();
                async move {
                    let mut errors = Vec::new();
                    for resource in resources.iter() {
                        let role = admin
                            .config_resource_role(resource.resource_type, &resource.resource_name);
                        let conn = admin.client.conn_for(&role).await?;
                        let api_version = conn.version_for(ApiKeys::AlterConfigs)?;
                        let request = KafkaRequest::AlterConfigs(AlterConfigsRequest {
                            header: conn.request_header(ApiKeys::AlterConfigs, api_version),
                            resources: vec![resource.clone()],
                            validate_only,
                        });
                        let response = match conn.send(request).await? {
                            KafkaResponse::AlterConfigs(res) => res,
                            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                        };
                        collect_alter_config_errors(
                            ApiKeys::AlterConfigs,
                            &response.responses,
                            &mut errors,
                        );
                    }
                    fold(errors)
                }
            })
            .await
    }

    pub async fn incremental_alter_configs(
        &self,
        resources: Vec<IncrementalAlterConfigsResource>,
        validate_only: bool,
    ) -> Result<()> {
        let admin = self.clone();
        let resources = Arc::new(resources);

        self.client
            .perform_with_retry("incremental_alter_configs", move || {
                let admin = admin.clone();
                let resources = resources.clone();
                async move {
                    let mut errors = Vec::new();
                    for resource in resources.iter() {
                        let role = admin
                            .config_resource_role(resource.resource_type, &resource.resource_name);
                        let conn = admin.client.conn_for(&role).await?;
                        let api_version = conn.version_for(ApiKeys::IncrementalAlterConfigs)?;
                        let request =
                            KafkaRequest::IncrementalAlterConfigs(IncrementalAlterConfigsRequest {
                                header: conn
                                    .request_header(ApiKeys::IncrementalAlterConfigs, api_version),
                                resources: vec![resource.clone()],
                                validate_only,
                            });
                        let response = match conn.send(request).await? {
                            KafkaResponse::IncrementalAlterConfigs(res) => res,
                            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                        };
                        collect_alter_config_errors(
                            ApiKeys::IncrementalAlterConfigs,
                            &response.responses,
                            &mut errors,
                        );
                    }
                    fold(errors)
                }
            })
            .await
    }

    /// Log directories of the given brokers, fetched concurrently and
    /// merged by broker id.
    pub async fn describe_log_dirs(
        &self,
        brokers: Vec<NodeId>,
        topics: Option<Vec<(String, Vec<PartitionId>)>>,
    ) -> Result<HashMap<NodeId, Vec<LogDirDescription>>> {
        let admin = self.clone();
        let brokers = Arc::new(brokers);
        let topics = Arc::new(topics);

        self.client
            .perform_with_retry("describe_log_dirs", move || {
                let admin = admin.clone();
                let brokers = brokers.clone();
                let topics = topics.clone();
                async move {
                    let responses = future::join_all(brokers.iter().map(|node_id| {
                        let admin = admin.clone();
                        let topics = (*topics).clone();
                        let node_id = *node_id;
                        async move {
                            let conn =
                                admin.client.conn_for(&BrokerRole::Node(node_id)).await?;
                            let api_version = conn.version_for(ApiKeys::DescribeLogDirs)?;
                            let request = KafkaRequest::DescribeLogDirs(DescribeLogDirsRequest {
                                header: conn.request_header(ApiKeys::DescribeLogDirs, api_version),
                                topics,
                            });
                            match conn.send(request).await? {
                                KafkaResponse::DescribeLogDirs(res) => Ok((node_id, res)),
                                res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                            }
                        }
                    }))
                    .await;

                    let mut merged = HashMap::new();
                    let mut errors = Vec::new();
                    for response in responses {
                        match response {
                            Ok((node_id, res)) => {
                                if res.error_code != 0 {
                                    errors.push(
                                        ErrorKind::ProtocolError(
                                            ApiKeys::DescribeLogDirs.key(),
                                            KafkaCode::from(res.error_code),
                                            format!("/{}/error_code", node_id),
                                        )
                                        .into(),
                                    );
                                    continue;
                                }
                                merged.insert(node_id, res.results);
                            }
                            Err(err) => errors.push(err),
                        }
                    }

                    fold(errors)?;
                    Ok(merged)
                }
            })
            .await
    }

    /// Move replicas between log dirs on one broker.
    pub async fn alter_replica_log_dirs(
        &self,
        broker: NodeId,
        dirs: Vec<(String, Vec<(String, Vec<PartitionId>)>)>,
    ) -> Result<()> {
        let admin = self.clone();
        let dirs = Arc::new(dirs);

        self.client
            .perform_with_retry("alter_replica_log_dirs", move || {
                let admin = admin.clone();
                let dirs = dirs.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Node(broker)).await?;
                    let api_version = conn.version_for(ApiKeys::AlterReplicaLogDirs)?;
                    let request = KafkaRequest::AlterReplicaLogDirs(AlterReplicaLogDirsRequest {
                        header: conn.request_header(ApiKeys::AlterReplicaLogDirs, api_version),
                        dirs: dirs.to_vec(),
                    });
                    let response = match conn.send(request).await? {
                        KafkaResponse::AlterReplicaLogDirs(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };

                    let mut errors = Vec::new();
                    for (topic_name, partitions) in &response.results {
                        for (partition, error_code) in partitions {
                            check(
                                ApiKeys::AlterReplicaLogDirs,
                                *error_code,
                                format!("/results/{}/{}", topic_name, partition),
                                &mut errors,
                            );
                        }
                    }
                    fold(errors)
                }
            })
            .await
    }

    /// Active idempotent/transactional producers per partition, fetched
    /// from the partition leaders.
    pub async fn describe_producers(
        &self,
        topics: Vec<(String, Vec<PartitionId>)>,
    ) -> Result<Vec<(String, Vec<PartitionProducers>)>> {
        let admin = self.clone();
        let topics = Arc::new(topics);

        self.client
            .perform_with_retry("describe_producers", move || {
                let admin = admin.clone();
                let topics = topics.clone();
                async move {
                    // partitions grouped by leader node
                    let topic_names: Vec<String> =
                        topics.iter().map(|(name, _)| name.clone()).collect();
                    let metadata = admin
                        .client
                        .metadata(MetadataOptions::topics(topic_names))
                        .await?;

                    let mut by_leader: HashMap<NodeId, Vec<(String, Vec<PartitionId>)>> =
                        HashMap::new();
                    for (topic_name, partitions) in topics.iter() {
                        for partition in partitions {
                            let tp = crate::network::TopicPartition::new(
                                topic_name.clone(),
                                *partition,
                            );
                            let leader = metadata
                                .leader_broker(&tp)
                                .ok_or(ErrorKind::KafkaError(KafkaCode::LeaderNotAvailable))?
                                .id();
                            let entry = by_leader.entry(leader).or_default();
                            match entry.iter_mut().find(|(name, _)| name == topic_name) {
                                Some((_, partitions)) => partitions.push(*partition),
                                None => entry.push((topic_name.clone(), vec![*partition])),
                            }
                        }
                    }

                    let mut merged: HashMap<String, Vec<PartitionProducers>> = HashMap::new();
                    for (node_id, node_topics) in by_leader {
                        let conn = admin.client.conn_for(&BrokerRole::Node(node_id)).await?;
                        let api_version = conn.version_for(ApiKeys::DescribeProducers)?;
                        let request = KafkaRequest::DescribeProducers(DescribeProducersRequest {
                            header: conn.request_header(ApiKeys::DescribeProducers, api_version),
                            topics: node_topics,
                        });
                        let response = match conn.send(request).await? {
                            KafkaResponse::DescribeProducers(res) => res,
                            res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                        };
                        for (topic_name, partitions) in response.topics {
                            merged.entry(topic_name).or_default().extend(partitions);
                        }
                    }

                    let mut results: Vec<_> = merged.into_iter().collect();
                    results.sort_by(|a, b| a.0.cmp(&b.0));
                    Ok(results)
                }
            })
            .await
    }

    pub async fn describe_client_quotas(
        &self,
        components: Vec<QuotaFilterComponent>,
        strict: bool,
    ) -> Result<Vec<ClientQuotaEntry>> {
        let admin = self.clone();
        let components = Arc::new(components);

        self.client
            .perform_with_retry("describe_client_quotas", move || {
                let admin = admin.clone();
                let components = components.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Bootstrap).await?;
                    let api_version = conn.version_for(ApiKeys::DescribeClientQuotas)?;
                    let request =
                        KafkaRequest::DescribeClientQuotas(DescribeClientQuotasRequest {
                            header: conn
                                .request_header(ApiKeys::DescribeClientQuotas, api_version),
                            components: components.to_vec(),
                            strict,
                        });
                    let response = match conn.send(request).await? {
                        KafkaResponse::DescribeClientQuotas(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };
                    if response.error_code != 0 {
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::DescribeClientQuotas.key(),
                            KafkaCode::from(response.error_code),
                            "/error_code".to_owned()
                        ));
                    }
                    Ok(response.entries)
                }
            })
            .await
    }

    pub async fn alter_client_quotas(
        &self,
        entries: Vec<ClientQuotaAlteration>,
        validate_only: bool,
    ) -> Result<()> {
        let admin = self.clone();
        let entries = Arc::new(entries);

        self.client
            .perform_with_retry("alter_client_quotas", move || {
                let admin = admin.clone();
                let entries = entries.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Bootstrap).await?;
                    let api_version = conn.version_for(ApiKeys::AlterClientQuotas)?;
                    let request = KafkaRequest::AlterClientQuotas(AlterClientQuotasRequest {
                        header: conn.request_header(ApiKeys::AlterClientQuotas, api_version),
                        entries: entries.to_vec(),
                        validate_only,
                    });
                    let response = match conn.send(request).await? {
                        KafkaResponse::AlterClientQuotas(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };

                    let mut errors = Vec::new();
                    for (index, entry) in response.entries.iter().enumerate() {
                        check(
                            ApiKeys::AlterClientQuotas,
                            entry.error_code,
                            format!("/entries/{}/error_code", index),
                            &mut errors,
                        );
                    }
                    fold(errors)
                }
            })
            .await
    }

    pub async fn describe_user_scram_credentials(
        &self,
        users: Option<Vec<String>>,
    ) -> Result<Vec<UserScramCredentials>> {
        let admin = self.clone();
        let users = Arc::new(users);

        self.client
            .perform_with_retry("describe_user_scram_credentials", move || {
                let admin = admin.clone();
                let users = users.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Bootstrap).await?;
                    let api_version = conn.version_for(ApiKeys::DescribeUserScramCredentials)?;
                    let request = KafkaRequest::DescribeUserScramCredentials(
                        DescribeUserScramCredentialsRequest {
                            header: conn
                                .request_header(ApiKeys::DescribeUserScramCredentials, api_version),
                            users: (*users).clone(),
                        },
                    );
                    let response = match conn.send(request).await? {
                        KafkaResponse::DescribeUserScramCredentials(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };
                    if response.error_code != 0 {
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::DescribeUserScramCredentials.key(),
                            KafkaCode::from(response.error_code),
                            "/error_code".to_owned()
                        ));
                    }
                    Ok(response.results)
                }
            })
            .await
    }

    pub async fn alter_user_scram_credentials(
        &self,
        deletions: Vec<(String, i8)>,
        upsertions: Vec<ScramCredentialUpsertion>,
    ) -> Result<()> {
        let admin = self.clone();
        let deletions = Arc::new(deletions);
        let upsertions = Arc::new(upsertions);

        self.client
            .perform_with_retry("alter_user_scram_credentials", move || {
                let admin = admin.clone();
                let deletions = deletions.clone();
                let upsertions = upsertions.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Controller).await?;
                    let api_version = conn.version_for(ApiKeys::AlterUserScramCredentials)?;
                    let request = KafkaRequest::AlterUserScramCredentials(
                        AlterUserScramCredentialsRequest {
                            header: conn
                                .request_header(ApiKeys::AlterUserScramCredentials, api_version),
                            deletions: deletions.to_vec(),
                            upsertions: upsertions.to_vec(),
                        },
                    );
                    let response = match conn.send(request).await? {
                        KafkaResponse::AlterUserScramCredentials(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };

                    let mut errors = Vec::new();
                    for (user, error_code, _message) in &response.results {
                        check(
                            ApiKeys::AlterUserScramCredentials,
                            *error_code,
                            format!("/results/{}/error_code", user),
                            &mut errors,
                        );
                    }
                    fold(errors)
                }
            })
            .await
    }

    pub async fn create_delegation_token(
        &self,
        renewers: Vec<KafkaPrincipal>,
        max_lifetime_ms: i64,
    ) -> Result<DelegationToken> {
        let admin = self.clone();
        let renewers = Arc::new(renewers);

        self.client
            .perform_with_retry("create_delegation_token", move || {
                let admin = admin.clone();
                let renewers = renewers.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Bootstrap).await?;
                    let api_version = conn.version_for(ApiKeys::CreateDelegationToken)?;
                    let request =
                        KafkaRequest::CreateDelegationToken(CreateDelegationTokenRequest {
                            header: conn
                                .request_header(ApiKeys::CreateDelegationToken, api_version),
                            renewers: renewers.to_vec(),
                            max_lifetime_ms,
                        });
                    let response = match conn.send(request).await? {
                        KafkaResponse::CreateDelegationToken(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };
                    if response.error_code != 0 {
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::CreateDelegationToken.key(),
                            KafkaCode::from(response.error_code),
                            "/error_code".to_owned()
                        ));
                    }
                    Ok(response.token)
                }
            })
            .await
    }

    pub async fn renew_delegation_token(
        &self,
        hmac: Bytes,
        renew_period_ms: i64,
    ) -> Result<Timestamp> {
        let admin = self.clone();

        self.client
            .perform_with_retry("renew_delegation_token", move || {
                let admin = admin.clone();
                let hmac = hmac.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Bootstrap).await?;
                    let api_version = conn.version_for(ApiKeys::RenewDelegationToken)?;
                    let request = KafkaRequest::RenewDelegationToken(RenewDelegationTokenRequest {
                        header: conn.request_header(ApiKeys::RenewDelegationToken, api_version),
                        hmac: hmac.clone(),
                        renew_period_ms,
                    });
                    let response = match conn.send(request).await? {
                        KafkaResponse::RenewDelegationToken(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };
                    if response.error_code != 0 {
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::RenewDelegationToken.key(),
                            KafkaCode::from(response.error_code),
                            "/error_code".to_owned()
                        ));
                    }
                    Ok(response.expiry_timestamp)
                }
            })
            .await
    }

    pub async fn expire_delegation_token(
        &self,
        hmac: Bytes,
        expiry_time_period_ms: i64,
    ) -> Result<Timestamp> {
        let admin = self.clone();

        self.client
            .perform_with_retry("expire_delegation_token", move || {
                let admin = admin.clone();
                let hmac = hmac.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Bootstrap).await?;
                    let api_version = conn.version_for(ApiKeys::ExpireDelegationToken)?;
                    let request =
                        KafkaRequest::ExpireDelegationToken(ExpireDelegationTokenRequest {
                            header: conn
                                .request_header(ApiKeys::ExpireDelegationToken, api_version),
                            hmac: hmac.clone(),
                            expiry_time_period_ms,
                        });
                    let response = match conn.send(request).await? {
                        KafkaResponse::ExpireDelegationToken(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };
                    if response.error_code != 0 {
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::ExpireDelegationToken.key(),
                            KafkaCode::from(response.error_code),
                            "/error_code".to_owned()
                        ));
                    }
                    Ok(response.expiry_timestamp)
                }
            })
            .await
    }

    pub async fn describe_delegation_token(
        &self,
        owners: Option<Vec<KafkaPrincipal>>,
    ) -> Result<Vec<DelegationToken>> {
        let admin = self.clone();
        let owners = Arc::new(owners);

        self.client
            .perform_with_retry("describe_delegation_token", move || {
                let admin = admin.clone();
                let owners = owners.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Bootstrap).await?;
                    let api_version = conn.version_for(ApiKeys::DescribeDelegationToken)?;
                    let request =
                        KafkaRequest::DescribeDelegationToken(DescribeDelegationTokenRequest {
                            header: conn
                                .request_header(ApiKeys::DescribeDelegationToken, api_version),
                            owners: (*owners).clone(),
                        });
                    let response = match conn.send(request).await? {
                        KafkaResponse::DescribeDelegationToken(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };
                    if response.error_code != 0 {
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::DescribeDelegationToken.key(),
                            KafkaCode::from(response.error_code),
                            "/error_code".to_owned()
                        ));
                    }
                    Ok(response.tokens)
                }
            })
            .await
    }

    pub async fn alter_partition_reassignments(
        &self,
        timeout_ms: i32,
        topics: Vec<(String, Vec<(PartitionId, Option<Vec<NodeId>>)>)>,
    ) -> Result<()> {
        let admin = self.clone();
        let topics = Arc::new(topics);

        self.client
            .perform_with_retry("alter_partition_reassignments", move || {
                let admin = admin.clone();
                let topics = topics.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Controller).await?;
                    let api_version = conn.version_for(ApiKeys::AlterPartitionReassignments)?;
                    let request = KafkaRequest::AlterPartitionReassignments(
                        AlterPartitionReassignmentsRequest {
                            header: conn
                                .request_header(ApiKeys::AlterPartitionReassignments, api_version),
                            timeout_ms,
                            topics: topics.to_vec(),
                        },
                    );
                    let response = match conn.send(request).await? {
                        KafkaResponse::AlterPartitionReassignments(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };

                    let mut errors = Vec::new();
                    check(
                        ApiKeys::AlterPartitionReassignments,
                        response.error_code,
                        "/error_code".to_owned(),
                        &mut errors,
                    );
                    for (topic_name, partitions) in &response.responses {
                        for (partition, error_code, _message) in partitions {
                            check(
                                ApiKeys::AlterPartitionReassignments,
                                *error_code,
                                format!("/responses/{}/{}", topic_name, partition),
                                &mut errors,
                            );
                        }
                    }
                    fold(errors)
                }
            })
            .await
    }

    pub async fn list_partition_reassignments(
        &self,
        timeout_ms: i32,
        topics: Option<Vec<(String, Vec<PartitionId>)>>,
    ) -> Result<Vec<(String, Vec<OngoingPartitionReassignment>)>> {
        let admin = self.clone();
        let topics = Arc::new(topics);

        self.client
            .perform_with_retry("list_partition_reassignments", move || {
                let admin = admin.clone();
                let topics = topics.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Controller).await?;
                    let api_version = conn.version_for(ApiKeys::ListPartitionReassignments)?;
                    let request = KafkaRequest::ListPartitionReassignments(
                        ListPartitionReassignmentsRequest {
                            header: conn
                                .request_header(ApiKeys::ListPartitionReassignments, api_version),
                            timeout_ms,
                            topics: (*topics).clone(),
                        },
                    );
                    let response = match conn.send(request).await? {
                        KafkaResponse::ListPartitionReassignments(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };
                    if response.error_code != 0 {
                        bail!(ErrorKind::ProtocolError(
                            ApiKeys::ListPartitionReassignments.key(),
                            KafkaCode::from(response.error_code),
                            "/error_code".to_owned()
                        ));
                    }
                    Ok(response.topics)
                }
            })
            .await
    }

    pub async fn update_features(
        &self,
        timeout_ms: i32,
        feature_updates: Vec<(String, i16, bool)>,
    ) -> Result<()> {
        let admin = self.clone();
        let feature_updates = Arc::new(feature_updates);

        self.client
            .perform_with_retry("update_features", move || {
                let admin = admin.clone();
                let feature_updates = feature_updates.clone();
                async move {
                    let conn = admin.client.conn_for(&BrokerRole::Controller).await?;
                    let api_version = conn.version_for(ApiKeys::UpdateFeatures)?;
                    let request = KafkaRequest::UpdateFeatures(UpdateFeaturesRequest {
                        header: conn.request_header(ApiKeys::UpdateFeatures, api_version),
                        timeout_ms,
                        feature_updates: feature_updates.to_vec(),
                    });
                    let response = match conn.send(request).await? {
                        KafkaResponse::UpdateFeatures(res) => res,
                        res => bail!(ErrorKind::UnexpectedResponse(res.api_key())),
                    };

                    let mut errors = Vec::new();
                    check(
                        ApiKeys::UpdateFeatures,
                        response.error_code,
                        "/error_code".to_owned(),
                        &mut errors,
                    );
                    for (feature, error_code, _message) in &response.results {
                        check(
                            ApiKeys::UpdateFeatures,
                            *error_code,
                            format!("/results/{}/error_code", feature),
                            &mut errors,
                        );
                    }
                    fold(errors)
                }
            })
            .await
    }
}

fn collect_alter_config_errors(
    api: ApiKeys,
    responses: &[AlterConfigsResourceResponse],
    errors: &mut Vec<Error>,
) {
    for response in responses {
        check(
            api,
            response.error_code,
            format!("/responses/{}/error_code", response.resource_name),
            errors,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_errors() {
        assert!(fold(Vec::new()).is_ok());

        let single = fold(vec![ErrorKind::KafkaError(KafkaCode::InvalidTopic).into()]);
        assert_eq!(
            single.unwrap_err().kafka_code(),
            Some(KafkaCode::InvalidTopic)
        );

        let multiple = fold(vec![
            ErrorKind::KafkaError(KafkaCode::InvalidTopic).into(),
            ErrorKind::KafkaError(KafkaCode::TopicAlreadyExists).into(),
        ]);
        match multiple.unwrap_err().kind() {
            ErrorKind::MultipleErrors(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_check_builds_locator_paths() {
        let mut errors = Vec::new();
        check(ApiKeys::CreateTopics, 0, "/topics/0".into(), &mut errors);
        assert!(errors.is_empty());

        check(ApiKeys::CreateTopics, 36, "/topics/0/error_code".into(), &mut errors);
        assert_eq!(errors.len(), 1);
        match errors[0].kind() {
            ErrorKind::ProtocolError(api_key, code, path) => {
                assert_eq!(*api_key, ApiKeys::CreateTopics.key());
                assert_eq!(*code, KafkaCode::TopicAlreadyExists);
                assert_eq!(path, "/topics/0/error_code");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
