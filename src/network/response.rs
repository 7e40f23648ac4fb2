use crate::errors::{ErrorKind, Result};
use crate::protocol::{
    parse_add_offsets_to_txn_response, parse_add_partitions_to_txn_response,
    parse_alter_client_quotas_response, parse_alter_configs_response,
    parse_alter_partition_reassignments_response, parse_alter_replica_log_dirs_response,
    parse_alter_user_scram_credentials_response, parse_api_versions_response,
    parse_create_delegation_token_response, parse_create_topics_response,
    parse_delete_groups_response, parse_delete_topics_response,
    parse_describe_client_quotas_response, parse_describe_cluster_response,
    parse_describe_configs_response, parse_describe_delegation_token_response,
    parse_describe_groups_response, parse_describe_log_dirs_response,
    parse_describe_producers_response, parse_describe_user_scram_credentials_response,
    parse_end_txn_response, parse_expire_delegation_token_response, parse_fetch_response,
    parse_find_coordinator_response, parse_heartbeat_response,
    parse_incremental_alter_configs_response, parse_init_producer_id_response,
    parse_join_group_response, parse_leave_group_response, parse_list_groups_response,
    parse_list_offsets_response, parse_list_partition_reassignments_response,
    parse_metadata_response, parse_offset_commit_response, parse_offset_delete_response,
    parse_offset_fetch_response, parse_produce_response, parse_renew_delegation_token_response,
    parse_sasl_authenticate_response, parse_sasl_handshake_response, parse_sync_group_response,
    parse_txn_offset_commit_response, parse_update_features_response,
    AddOffsetsToTxnResponse, AddPartitionsToTxnResponse, AlterClientQuotasResponse,
    AlterConfigsResponse, AlterPartitionReassignmentsResponse, AlterReplicaLogDirsResponse,
    AlterUserScramCredentialsResponse, ApiKeys, ApiVersion, ApiVersionsResponse, CorrelationId,
    CreateDelegationTokenResponse, CreateTopicsResponse, DeleteGroupsResponse,
    DeleteTopicsResponse, DescribeClientQuotasResponse, DescribeClusterResponse,
    DescribeConfigsResponse, DescribeDelegationTokenResponse, DescribeGroupsResponse,
    DescribeLogDirsResponse, DescribeProducersResponse, DescribeUserScramCredentialsResponse,
    EndTxnResponse, ExpirableTokenResponse, FetchResponse, FindCoordinatorResponse,
    HeartbeatResponse, InitProducerIdResponse, JoinGroupResponse, LeaveGroupResponse,
    ListGroupsResponse, ListOffsetsResponse, ListPartitionReassignmentsResponse,
    MetadataResponse, OffsetCommitResponse, OffsetDeleteResponse, OffsetFetchResponse,
    ParseResult, ProduceResponse, ResponseHeader, SaslAuthenticateResponse,
    SaslHandshakeResponse, SyncGroupResponse, TxnOffsetCommitResponse, UpdateFeaturesResponse,
};

/// A fully parsed response body. Variant names mirror `ApiKeys`.
#[derive(Clone, Debug, PartialEq)]
pub enum KafkaResponse {
    Produce(ProduceResponse),
    Fetch(FetchResponse),
    ListOffsets(ListOffsetsResponse),
    Metadata(MetadataResponse),
    OffsetCommit(OffsetCommitResponse),
    OffsetFetch(OffsetFetchResponse),
    FindCoordinator(FindCoordinatorResponse),
    JoinGroup(JoinGroupResponse),
    Heartbeat(HeartbeatResponse),
    LeaveGroup(LeaveGroupResponse),
    SyncGroup(SyncGroupResponse),
    DescribeGroups(DescribeGroupsResponse),
    ListGroups(ListGroupsResponse),
    SaslHandshake(SaslHandshakeResponse),
    ApiVersions(ApiVersionsResponse),
    CreateTopics(CreateTopicsResponse),
    DeleteTopics(DeleteTopicsResponse),
    InitProducerId(InitProducerIdResponse),
    AddPartitionsToTxn(AddPartitionsToTxnResponse),
    AddOffsetsToTxn(AddOffsetsToTxnResponse),
    EndTxn(EndTxnResponse),
    TxnOffsetCommit(TxnOffsetCommitResponse),
    DescribeConfigs(DescribeConfigsResponse),
    AlterConfigs(AlterConfigsResponse),
    AlterReplicaLogDirs(AlterReplicaLogDirsResponse),
    DescribeLogDirs(DescribeLogDirsResponse),
    SaslAuthenticate(SaslAuthenticateResponse),
    CreateDelegationToken(CreateDelegationTokenResponse),
    RenewDelegationToken(ExpirableTokenResponse),
    ExpireDelegationToken(ExpirableTokenResponse),
    DescribeDelegationToken(DescribeDelegationTokenResponse),
    DeleteGroups(DeleteGroupsResponse),
    IncrementalAlterConfigs(AlterConfigsResponse),
    AlterPartitionReassignments(AlterPartitionReassignmentsResponse),
    ListPartitionReassignments(ListPartitionReassignmentsResponse),
    OffsetDelete(OffsetDeleteResponse),
    DescribeClientQuotas(DescribeClientQuotasResponse),
    AlterClientQuotas(AlterClientQuotasResponse),
    DescribeUserScramCredentials(DescribeUserScramCredentialsResponse),
    AlterUserScramCredentials(AlterUserScramCredentialsResponse),
    UpdateFeatures(UpdateFeaturesResponse),
    DescribeCluster(DescribeClusterResponse),
    DescribeProducers(DescribeProducersResponse),
}

fn finish<T>(parsed: ParseResult<'_, T>, api_keys: ApiKeys) -> Result<T> {
    match parsed {
        Ok((rest, response)) => {
            if !rest.is_empty() {
                trace!(
                    "{} trailing bytes after {} response",
                    rest.len(),
                    api_keys
                );
            }
            Ok(response)
        }
        Err(err) => bail!(ErrorKind::ParseError(format!(
            "{} response: {}",
            api_keys, err
        ))),
    }
}

impl KafkaResponse {
    /// Parse a frame payload (after the length prefix) as a response to the
    /// given API at the given version.
    pub fn parse(src: &[u8], api_keys: ApiKeys, api_version: ApiVersion) -> Result<KafkaResponse> {
        trace!(
            "parsing {} v{} response of {} bytes",
            api_keys,
            api_version,
            src.len()
        );

        match api_keys {
            ApiKeys::Produce => {
                finish(parse_produce_response(src, api_version), api_keys).map(KafkaResponse::Produce)
            }
            ApiKeys::Fetch => {
                finish(parse_fetch_response(src, api_version), api_keys).map(KafkaResponse::Fetch)
            }
            ApiKeys::ListOffsets => finish(parse_list_offsets_response(src, api_version), api_keys)
                .map(KafkaResponse::ListOffsets),
            ApiKeys::Metadata => finish(parse_metadata_response(src, api_version), api_keys)
                .map(KafkaResponse::Metadata),
            ApiKeys::OffsetCommit => {
                finish(parse_offset_commit_response(src, api_version), api_keys)
                    .map(KafkaResponse::OffsetCommit)
            }
            ApiKeys::OffsetFetch => finish(parse_offset_fetch_response(src, api_version), api_keys)
                .map(KafkaResponse::OffsetFetch),
            ApiKeys::FindCoordinator => {
                finish(parse_find_coordinator_response(src, api_version), api_keys)
                    .map(KafkaResponse::FindCoordinator)
            }
            ApiKeys::JoinGroup => finish(parse_join_group_response(src, api_version), api_keys)
                .map(KafkaResponse::JoinGroup),
            ApiKeys::Heartbeat => finish(parse_heartbeat_response(src, api_version), api_keys)
                .map(KafkaResponse::Heartbeat),
            ApiKeys::LeaveGroup => finish(parse_leave_group_response(src, api_version), api_keys)
                .map(KafkaResponse::LeaveGroup),
            ApiKeys::SyncGroup => finish(parse_sync_group_response(src, api_version), api_keys)
                .map(KafkaResponse::SyncGroup),
            ApiKeys::DescribeGroups => {
                finish(parse_describe_groups_response(src, api_version), api_keys)
                    .map(KafkaResponse::DescribeGroups)
            }
            ApiKeys::ListGroups => finish(parse_list_groups_response(src, api_version), api_keys)
                .map(KafkaResponse::ListGroups),
            ApiKeys::SaslHandshake => {
                finish(parse_sasl_handshake_response(src, api_version), api_keys)
                    .map(KafkaResponse::SaslHandshake)
            }
            ApiKeys::ApiVersions => finish(parse_api_versions_response(src, api_version), api_keys)
                .map(KafkaResponse::ApiVersions),
            ApiKeys::CreateTopics => {
                finish(parse_create_topics_response(src, api_version), api_keys)
                    .map(KafkaResponse::CreateTopics)
            }
            ApiKeys::DeleteTopics => {
                finish(parse_delete_topics_response(src, api_version), api_keys)
                    .map(KafkaResponse::DeleteTopics)
            }
            ApiKeys::InitProducerId => {
                finish(parse_init_producer_id_response(src, api_version), api_keys)
                    .map(KafkaResponse::InitProducerId)
            }
            ApiKeys::AddPartitionsToTxn => finish(
                parse_add_partitions_to_txn_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::AddPartitionsToTxn),
            ApiKeys::AddOffsetsToTxn => {
                finish(parse_add_offsets_to_txn_response(src, api_version), api_keys)
                    .map(KafkaResponse::AddOffsetsToTxn)
            }
            ApiKeys::EndTxn => {
                finish(parse_end_txn_response(src, api_version), api_keys).map(KafkaResponse::EndTxn)
            }
            ApiKeys::TxnOffsetCommit => {
                finish(parse_txn_offset_commit_response(src, api_version), api_keys)
                    .map(KafkaResponse::TxnOffsetCommit)
            }
            ApiKeys::DescribeConfigs => {
                finish(parse_describe_configs_response(src, api_version), api_keys)
                    .map(KafkaResponse::DescribeConfigs)
            }
            ApiKeys::AlterConfigs => {
                finish(parse_alter_configs_response(src, api_version), api_keys)
                    .map(KafkaResponse::AlterConfigs)
            }
            ApiKeys::AlterReplicaLogDirs => finish(
                parse_alter_replica_log_dirs_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::AlterReplicaLogDirs),
            ApiKeys::DescribeLogDirs => {
                finish(parse_describe_log_dirs_response(src, api_version), api_keys)
                    .map(KafkaResponse::DescribeLogDirs)
            }
            ApiKeys::SaslAuthenticate => {
                finish(parse_sasl_authenticate_response(src, api_version), api_keys)
                    .map(KafkaResponse::SaslAuthenticate)
            }
            ApiKeys::CreateDelegationToken => finish(
                parse_create_delegation_token_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::CreateDelegationToken),
            ApiKeys::RenewDelegationToken => finish(
                parse_renew_delegation_token_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::RenewDelegationToken),
            ApiKeys::ExpireDelegationToken => finish(
                parse_expire_delegation_token_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::ExpireDelegationToken),
            ApiKeys::DescribeDelegationToken => finish(
                parse_describe_delegation_token_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::DescribeDelegationToken),
            ApiKeys::DeleteGroups => {
                finish(parse_delete_groups_response(src, api_version), api_keys)
                    .map(KafkaResponse::DeleteGroups)
            }
            ApiKeys::IncrementalAlterConfigs => finish(
                parse_incremental_alter_configs_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::IncrementalAlterConfigs),
            ApiKeys::AlterPartitionReassignments => finish(
                parse_alter_partition_reassignments_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::AlterPartitionReassignments),
            ApiKeys::ListPartitionReassignments => finish(
                parse_list_partition_reassignments_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::ListPartitionReassignments),
            ApiKeys::OffsetDelete => {
                finish(parse_offset_delete_response(src, api_version), api_keys)
                    .map(KafkaResponse::OffsetDelete)
            }
            ApiKeys::DescribeClientQuotas => finish(
                parse_describe_client_quotas_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::DescribeClientQuotas),
            ApiKeys::AlterClientQuotas => {
                finish(parse_alter_client_quotas_response(src, api_version), api_keys)
                    .map(KafkaResponse::AlterClientQuotas)
            }
            ApiKeys::DescribeUserScramCredentials => finish(
                parse_describe_user_scram_credentials_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::DescribeUserScramCredentials),
            ApiKeys::AlterUserScramCredentials => finish(
                parse_alter_user_scram_credentials_response(src, api_version),
                api_keys,
            )
            .map(KafkaResponse::AlterUserScramCredentials),
            ApiKeys::UpdateFeatures => {
                finish(parse_update_features_response(src, api_version), api_keys)
                    .map(KafkaResponse::UpdateFeatures)
            }
            ApiKeys::DescribeCluster => {
                finish(parse_describe_cluster_response(src, api_version), api_keys)
                    .map(KafkaResponse::DescribeCluster)
            }
            ApiKeys::DescribeProducers => {
                finish(parse_describe_producers_response(src, api_version), api_keys)
                    .map(KafkaResponse::DescribeProducers)
            }
        }
    }

    pub fn api_key(&self) -> i16 {
        self.api_keys().key()
    }

    pub fn api_keys(&self) -> ApiKeys {
        match self {
            KafkaResponse::Produce(_) => ApiKeys::Produce,
            KafkaResponse::Fetch(_) => ApiKeys::Fetch,
            KafkaResponse::ListOffsets(_) => ApiKeys::ListOffsets,
            KafkaResponse::Metadata(_) => ApiKeys::Metadata,
            KafkaResponse::OffsetCommit(_) => ApiKeys::OffsetCommit,
            KafkaResponse::OffsetFetch(_) => ApiKeys::OffsetFetch,
            KafkaResponse::FindCoordinator(_) => ApiKeys::FindCoordinator,
            KafkaResponse::JoinGroup(_) => ApiKeys::JoinGroup,
            KafkaResponse::Heartbeat(_) => ApiKeys::Heartbeat,
            KafkaResponse::LeaveGroup(_) => ApiKeys::LeaveGroup,
            KafkaResponse::SyncGroup(_) => ApiKeys::SyncGroup,
            KafkaResponse::DescribeGroups(_) => ApiKeys::DescribeGroups,
            KafkaResponse::ListGroups(_) => ApiKeys::ListGroups,
            KafkaResponse::SaslHandshake(_) => ApiKeys::SaslHandshake,
            KafkaResponse::ApiVersions(_) => ApiKeys::ApiVersions,
            KafkaResponse::CreateTopics(_) => ApiKeys::CreateTopics,
            KafkaResponse::DeleteTopics(_) => ApiKeys::DeleteTopics,
            KafkaResponse::InitProducerId(_) => ApiKeys::InitProducerId,
            KafkaResponse::AddPartitionsToTxn(_) => ApiKeys::AddPartitionsToTxn,
            KafkaResponse::AddOffsetsToTxn(_) => ApiKeys::AddOffsetsToTxn,
            KafkaResponse::EndTxn(_) => ApiKeys::EndTxn,
            KafkaResponse::TxnOffsetCommit(_) => ApiKeys::TxnOffsetCommit,
            KafkaResponse::DescribeConfigs(_) => ApiKeys::DescribeConfigs,
            KafkaResponse::AlterConfigs(_) => ApiKeys::AlterConfigs,
            KafkaResponse::AlterReplicaLogDirs(_) => ApiKeys::AlterReplicaLogDirs,
            KafkaResponse::DescribeLogDirs(_) => ApiKeys::DescribeLogDirs,
            KafkaResponse::SaslAuthenticate(_) => ApiKeys::SaslAuthenticate,
            KafkaResponse::CreateDelegationToken(_) => ApiKeys::CreateDelegationToken,
            KafkaResponse::RenewDelegationToken(_) => ApiKeys::RenewDelegationToken,
            KafkaResponse::ExpireDelegationToken(_) => ApiKeys::ExpireDelegationToken,
            KafkaResponse::DescribeDelegationToken(_) => ApiKeys::DescribeDelegationToken,
            KafkaResponse::DeleteGroups(_) => ApiKeys::DeleteGroups,
            KafkaResponse::IncrementalAlterConfigs(_) => ApiKeys::IncrementalAlterConfigs,
            KafkaResponse::AlterPartitionReassignments(_) => ApiKeys::AlterPartitionReassignments,
            KafkaResponse::ListPartitionReassignments(_) => ApiKeys::ListPartitionReassignments,
            KafkaResponse::OffsetDelete(_) => ApiKeys::OffsetDelete,
            KafkaResponse::DescribeClientQuotas(_) => ApiKeys::DescribeClientQuotas,
            KafkaResponse::AlterClientQuotas(_) => ApiKeys::AlterClientQuotas,
            KafkaResponse::DescribeUserScramCredentials(_) => ApiKeys::DescribeUserScramCredentials,
            KafkaResponse::AlterUserScramCredentials(_) => ApiKeys::AlterUserScramCredentials,
            KafkaResponse::UpdateFeatures(_) => ApiKeys::UpdateFeatures,
            KafkaResponse::DescribeCluster(_) => ApiKeys::DescribeCluster,
            KafkaResponse::DescribeProducers(_) => ApiKeys::DescribeProducers,
        }
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.response_header().correlation_id
    }

    fn response_header(&self) -> &ResponseHeader {
        match self {
            KafkaResponse::Produce(res) => &res.header,
            KafkaResponse::Fetch(res) => &res.header,
            KafkaResponse::ListOffsets(res) => &res.header,
            KafkaResponse::Metadata(res) => &res.header,
            KafkaResponse::OffsetCommit(res) => &res.header,
            KafkaResponse::OffsetFetch(res) => &res.header,
            KafkaResponse::FindCoordinator(res) => &res.header,
            KafkaResponse::JoinGroup(res) => &res.header,
            KafkaResponse::Heartbeat(res) => &res.header,
            KafkaResponse::LeaveGroup(res) => &res.header,
            KafkaResponse::SyncGroup(res) => &res.header,
            KafkaResponse::DescribeGroups(res) => &res.header,
            KafkaResponse::ListGroups(res) => &res.header,
            KafkaResponse::SaslHandshake(res) => &res.header,
            KafkaResponse::ApiVersions(res) => &res.header,
            KafkaResponse::CreateTopics(res) => &res.header,
            KafkaResponse::DeleteTopics(res) => &res.header,
            KafkaResponse::InitProducerId(res) => &res.header,
            KafkaResponse::AddPartitionsToTxn(res) => &res.header,
            KafkaResponse::AddOffsetsToTxn(res) => &res.header,
            KafkaResponse::EndTxn(res) => &res.header,
            KafkaResponse::TxnOffsetCommit(res) => &res.header,
            KafkaResponse::DescribeConfigs(res) => &res.header,
            KafkaResponse::AlterConfigs(res) => &res.header,
            KafkaResponse::AlterReplicaLogDirs(res) => &res.header,
            KafkaResponse::DescribeLogDirs(res) => &res.header,
            KafkaResponse::SaslAuthenticate(res) => &res.header,
            KafkaResponse::CreateDelegationToken(res) => &res.header,
            KafkaResponse::RenewDelegationToken(res) => &res.header,
            KafkaResponse::ExpireDelegationToken(res) => &res.header,
            KafkaResponse::DescribeDelegationToken(res) => &res.header,
            KafkaResponse::DeleteGroups(res) => &res.header,
            KafkaResponse::IncrementalAlterConfigs(res) => &res.header,
            KafkaResponse::AlterPartitionReassignments(res) => &res.header,
            KafkaResponse::ListPartitionReassignments(res) => &res.header,
            KafkaResponse::OffsetDelete(res) => &res.header,
            KafkaResponse::DescribeClientQuotas(res) => &res.header,
            KafkaResponse::AlterClientQuotas(res) => &res.header,
            KafkaResponse::DescribeUserScramCredentials(res) => &res.header,
            KafkaResponse::AlterUserScramCredentials(res) => &res.header,
            KafkaResponse::UpdateFeatures(res) => &res.header,
            KafkaResponse::DescribeCluster(res) => &res.header,
            KafkaResponse::DescribeProducers(res) => &res.header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dispatch() {
        let data = [
            0, 0, 0, 9, // correlation
            0, 0, // error
            0, 0, 0, 0, // no api versions
        ];

        let response = KafkaResponse::parse(&data, ApiKeys::ApiVersions, 0).unwrap();
        assert_eq!(response.api_keys(), ApiKeys::ApiVersions);
        assert_eq!(response.correlation_id(), 9);
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(KafkaResponse::parse(&[0, 1], ApiKeys::Metadata, 1).is_err());
    }
}
