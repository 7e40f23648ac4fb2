use bytes::BytesMut;

use crate::errors::Result;
use crate::protocol::{
    request_header_version, AddOffsetsToTxnRequest, AddPartitionsToTxnRequest,
    AlterClientQuotasRequest, AlterConfigsRequest, AlterPartitionReassignmentsRequest,
    AlterReplicaLogDirsRequest, AlterUserScramCredentialsRequest, ApiKeys, ApiVersion,
    ApiVersionsRequest, CorrelationId, CreateDelegationTokenRequest, CreateTopicsRequest,
    DeleteGroupsRequest, DeleteTopicsRequest, DescribeClientQuotasRequest, DescribeClusterRequest,
    DescribeConfigsRequest, DescribeDelegationTokenRequest, DescribeGroupsRequest,
    DescribeLogDirsRequest, DescribeProducersRequest, DescribeUserScramCredentialsRequest,
    Encodable, EndTxnRequest, ExpireDelegationTokenRequest, FetchRequest, FindCoordinatorRequest,
    HeartbeatRequest, IncrementalAlterConfigsRequest, InitProducerIdRequest, JoinGroupRequest,
    LeaveGroupRequest, ListGroupsRequest, ListOffsetsRequest, ListPartitionReassignmentsRequest,
    MetadataRequest, OffsetCommitRequest, OffsetDeleteRequest, OffsetFetchRequest, ProduceRequest,
    RenewDelegationTokenRequest, RequestHeader, SaslAuthenticateRequest, SaslHandshakeRequest,
    SyncGroupRequest, TxnOffsetCommitRequest, UpdateFeaturesRequest,
};

macro_rules! kafka_requests {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        /// A typed request plus its header, ready to be framed. Variant
        /// names mirror `ApiKeys`.
        #[derive(Clone, Debug, PartialEq)]
        pub enum KafkaRequest {
            $($variant($ty)),+
        }

        impl KafkaRequest {
            pub fn api_keys(&self) -> ApiKeys {
                match *self {
                    $(KafkaRequest::$variant(_) => ApiKeys::$variant),+
                }
            }

            pub fn header(&self) -> &RequestHeader {
                match self {
                    $(KafkaRequest::$variant(req) => &req.header),+
                }
            }

            fn header_mut(&mut self) -> &mut RequestHeader {
                match self {
                    $(KafkaRequest::$variant(req) => &mut req.header),+
                }
            }

            fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
                match self {
                    $(KafkaRequest::$variant(req) => req.encode(dst)),+
                }
            }
        }
    };
}

kafka_requests! {
    Produce(ProduceRequest),
    Fetch(FetchRequest),
    ListOffsets(ListOffsetsRequest),
    Metadata(MetadataRequest),
    OffsetCommit(OffsetCommitRequest),
    OffsetFetch(OffsetFetchRequest),
    FindCoordinator(FindCoordinatorRequest),
    JoinGroup(JoinGroupRequest),
    Heartbeat(HeartbeatRequest),
    LeaveGroup(LeaveGroupRequest),
    SyncGroup(SyncGroupRequest),
    DescribeGroups(DescribeGroupsRequest),
    ListGroups(ListGroupsRequest),
    SaslHandshake(SaslHandshakeRequest),
    ApiVersions(ApiVersionsRequest),
    CreateTopics(CreateTopicsRequest),
    DeleteTopics(DeleteTopicsRequest),
    InitProducerId(InitProducerIdRequest),
    AddPartitionsToTxn(AddPartitionsToTxnRequest),
    AddOffsetsToTxn(AddOffsetsToTxnRequest),
    EndTxn(EndTxnRequest),
    TxnOffsetCommit(TxnOffsetCommitRequest),
    DescribeConfigs(DescribeConfigsRequest),
    AlterConfigs(AlterConfigsRequest),
    AlterReplicaLogDirs(AlterReplicaLogDirsRequest),
    DescribeLogDirs(DescribeLogDirsRequest),
    SaslAuthenticate(SaslAuthenticateRequest),
    CreateDelegationToken(CreateDelegationTokenRequest),
    RenewDelegationToken(RenewDelegationTokenRequest),
    ExpireDelegationToken(ExpireDelegationTokenRequest),
    DescribeDelegationToken(DescribeDelegationTokenRequest),
    DeleteGroups(DeleteGroupsRequest),
    IncrementalAlterConfigs(IncrementalAlterConfigsRequest),
    AlterPartitionReassignments(AlterPartitionReassignmentsRequest),
    ListPartitionReassignments(ListPartitionReassignmentsRequest),
    OffsetDelete(OffsetDeleteRequest),
    DescribeClientQuotas(DescribeClientQuotasRequest),
    AlterClientQuotas(AlterClientQuotasRequest),
    DescribeUserScramCredentials(DescribeUserScramCredentialsRequest),
    AlterUserScramCredentials(AlterUserScramCredentialsRequest),
    UpdateFeatures(UpdateFeaturesRequest),
    DescribeCluster(DescribeClusterRequest),
    DescribeProducers(DescribeProducersRequest),
}

impl KafkaRequest {
    pub fn api_version(&self) -> ApiVersion {
        self.header().api_version
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.header().correlation_id
    }

    /// The connection assigns the correlation right before framing.
    pub fn set_correlation_id(&mut self, correlation_id: CorrelationId) {
        self.header_mut().correlation_id = correlation_id;
    }

    /// `acks=0` produce requests get no reply at all; the reader must not
    /// wait for one.
    pub fn response_expected(&self) -> bool {
        match self {
            KafkaRequest::Produce(req) => req.acks != 0,
            _ => true,
        }
    }

    /// Serialize header + body into a frame payload (without the length
    /// prefix, which the frame codec adds).
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let header_version = request_header_version(self.api_keys(), self.api_version());
        self.header().encode(dst, header_version)?;
        self.encode_body(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_metadata_accessors() {
        let mut request = KafkaRequest::ApiVersions(ApiVersionsRequest {
            header: RequestHeader {
                api_key: ApiKeys::ApiVersions.key(),
                api_version: 0,
                correlation_id: 0,
                client_id: Some("c".into()),
            },
            client_software_name: String::new(),
            client_software_version: String::new(),
        });

        assert_eq!(request.api_keys(), ApiKeys::ApiVersions);
        assert!(request.response_expected());

        request.set_correlation_id(42);
        assert_eq!(request.correlation_id(), 42);

        let mut buf = BytesMut::new();
        request.encode(&mut buf).unwrap();
        assert_eq!(&buf[4..8], [0, 0, 0, 42]);
    }

    #[test]
    fn test_acks_zero_expects_no_response() {
        let request = KafkaRequest::Produce(ProduceRequest {
            header: RequestHeader {
                api_key: ApiKeys::Produce.key(),
                api_version: 3,
                correlation_id: 0,
                client_id: None,
            },
            transactional_id: None,
            acks: 0,
            timeout_ms: 1000,
            topics: Vec::new(),
        });

        assert!(!request.response_expected());
    }
}
