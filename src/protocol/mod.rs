use std::fmt;
use std::str::FromStr;

use bytes::BytesMut;

use crate::errors::{ErrorKind, Result};

mod admin;
mod api_versions;
mod codec;
mod fetch;
mod group;
mod header;
mod metadata;
mod offset;
mod produce;
mod record;
mod registry;
mod sasl;
mod txn;

pub use self::admin::*;
pub use self::api_versions::*;
pub use self::codec::*;
pub use self::fetch::*;
pub use self::group::*;
pub use self::header::*;
pub use self::metadata::*;
pub use self::offset::*;
pub use self::produce::*;
pub use self::record::*;
pub use self::registry::*;
pub use self::sasl::*;
pub use self::txn::*;

pub type ApiKey = i16;
pub type ApiVersion = i16;
pub type CorrelationId = i32;
pub type PartitionId = i32;
pub type NodeId = i32;
pub type Offset = i64;
pub type Timestamp = i64;
pub type ErrorCode = i16;
pub type GenerationId = i32;
pub type ProducerId = i64;
pub type ProducerEpoch = i16;
pub type SessionId = i32;

/// Offset sentinel asking ListOffsets for the earliest available offset.
pub const EARLIEST_TIMESTAMP: Timestamp = -2;
/// Offset sentinel asking ListOffsets for the next offset to be written.
pub const LATEST_TIMESTAMP: Timestamp = -1;

/// A typed request body that knows how to serialize itself for the API
/// version carried in its header. The frame and header are written by the
/// connection layer.
pub trait Encodable {
    fn encode(&self, dst: &mut BytesMut) -> Result<()>;
}

/// The numeric codes that the ApiKey in the request can take for each of the
/// request types this client speaks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ApiKeys {
    Produce = 0,
    Fetch = 1,
    ListOffsets = 2,
    Metadata = 3,
    OffsetCommit = 8,
    OffsetFetch = 9,
    FindCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
    DescribeGroups = 15,
    ListGroups = 16,
    SaslHandshake = 17,
    ApiVersions = 18,
    CreateTopics = 19,
    DeleteTopics = 20,
    InitProducerId = 22,
    AddPartitionsToTxn = 24,
    AddOffsetsToTxn = 25,
    EndTxn = 26,
    TxnOffsetCommit = 28,
    DescribeConfigs = 32,
    AlterConfigs = 33,
    AlterReplicaLogDirs = 34,
    DescribeLogDirs = 35,
    SaslAuthenticate = 36,
    CreateDelegationToken = 38,
    RenewDelegationToken = 39,
    ExpireDelegationToken = 40,
    DescribeDelegationToken = 41,
    DeleteGroups = 42,
    IncrementalAlterConfigs = 44,
    AlterPartitionReassignments = 45,
    ListPartitionReassignments = 46,
    OffsetDelete = 47,
    DescribeClientQuotas = 48,
    AlterClientQuotas = 49,
    DescribeUserScramCredentials = 50,
    AlterUserScramCredentials = 51,
    UpdateFeatures = 57,
    DescribeCluster = 60,
    DescribeProducers = 61,
}

impl ApiKeys {
    pub fn key(self) -> ApiKey {
        self as ApiKey
    }

    pub fn name(self) -> &'static str {
        match self {
            ApiKeys::Produce => "Produce",
            ApiKeys::Fetch => "Fetch",
            ApiKeys::ListOffsets => "ListOffsets",
            ApiKeys::Metadata => "Metadata",
            ApiKeys::OffsetCommit => "OffsetCommit",
            ApiKeys::OffsetFetch => "OffsetFetch",
            ApiKeys::FindCoordinator => "FindCoordinator",
            ApiKeys::JoinGroup => "JoinGroup",
            ApiKeys::Heartbeat => "Heartbeat",
            ApiKeys::LeaveGroup => "LeaveGroup",
            ApiKeys::SyncGroup => "SyncGroup",
            ApiKeys::DescribeGroups => "DescribeGroups",
            ApiKeys::ListGroups => "ListGroups",
            ApiKeys::SaslHandshake => "SaslHandshake",
            ApiKeys::ApiVersions => "ApiVersions",
            ApiKeys::CreateTopics => "CreateTopics",
            ApiKeys::DeleteTopics => "DeleteTopics",
            ApiKeys::InitProducerId => "InitProducerId",
            ApiKeys::AddPartitionsToTxn => "AddPartitionsToTxn",
            ApiKeys::AddOffsetsToTxn => "AddOffsetsToTxn",
            ApiKeys::EndTxn => "EndTxn",
            ApiKeys::TxnOffsetCommit => "TxnOffsetCommit",
            ApiKeys::DescribeConfigs => "DescribeConfigs",
            ApiKeys::AlterConfigs => "AlterConfigs",
            ApiKeys::AlterReplicaLogDirs => "AlterReplicaLogDirs",
            ApiKeys::DescribeLogDirs => "DescribeLogDirs",
            ApiKeys::SaslAuthenticate => "SaslAuthenticate",
            ApiKeys::CreateDelegationToken => "CreateDelegationToken",
            ApiKeys::RenewDelegationToken => "RenewDelegationToken",
            ApiKeys::ExpireDelegationToken => "ExpireDelegationToken",
            ApiKeys::DescribeDelegationToken => "DescribeDelegationToken",
            ApiKeys::DeleteGroups => "DeleteGroups",
            ApiKeys::IncrementalAlterConfigs => "IncrementalAlterConfigs",
            ApiKeys::AlterPartitionReassignments => "AlterPartitionReassignments",
            ApiKeys::ListPartitionReassignments => "ListPartitionReassignments",
            ApiKeys::OffsetDelete => "OffsetDelete",
            ApiKeys::DescribeClientQuotas => "DescribeClientQuotas",
            ApiKeys::AlterClientQuotas => "AlterClientQuotas",
            ApiKeys::DescribeUserScramCredentials => "DescribeUserScramCredentials",
            ApiKeys::AlterUserScramCredentials => "AlterUserScramCredentials",
            ApiKeys::UpdateFeatures => "UpdateFeatures",
            ApiKeys::DescribeCluster => "DescribeCluster",
            ApiKeys::DescribeProducers => "DescribeProducers",
        }
    }
}

impl fmt::Display for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.key())
    }
}

/// Possible choices on acknowledgement requirements when
/// producing/sending messages to Kafka.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum RequiredAcks {
    /// Indicates to the receiving Kafka broker not to acknowlegde
    /// messages sent to it at all. Sending messages with this
    /// acknowledgement requirement translates into a fire-and-forget
    /// scenario which - of course - is very fast but not reliable.
    None = 0,
    /// Requires the receiving Kafka broker to wait until the sent
    /// messages are written to local disk.  Such messages can be
    /// regarded as acknowledged by one broker in the cluster.
    One = 1,
    /// Requires the sent messages to be acknowledged by all in-sync
    /// replicas of the targeted topic partitions.
    #[default]
    All = -1,
}

impl From<i16> for RequiredAcks {
    fn from(v: i16) -> Self {
        match v {
            0 => RequiredAcks::None,
            1 => RequiredAcks::One,
            _ => RequiredAcks::All,
        }
    }
}

impl FromStr for RequiredAcks {
    type Err = crate::errors::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" | "0" => Ok(RequiredAcks::None),
            "one" | "1" => Ok(RequiredAcks::One),
            "all" | "-1" => Ok(RequiredAcks::All),
            _ => bail!(ErrorKind::ParseError(format!("unknown required acks: {}", s))),
        }
    }
}

/// Where a consumer without a committed position starts reading.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchOffset {
    /// The earliest available offset of the partition.
    Earliest,
    /// The offset right after the last written record.
    Latest,
    /// The offset committed by the consumer group, falling back to the
    /// earliest offset when the group has none.
    #[default]
    Committed,
}

impl FetchOffset {
    /// The ListOffsets timestamp sentinel used when the mode resolves
    /// through a ListOffsets round trip.
    pub fn timestamp(self) -> Timestamp {
        match self {
            FetchOffset::Latest => LATEST_TIMESTAMP,
            _ => EARLIEST_TIMESTAMP,
        }
    }
}

impl FromStr for FetchOffset {
    type Err = crate::errors::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "earliest" => Ok(FetchOffset::Earliest),
            "latest" => Ok(FetchOffset::Latest),
            "committed" => Ok(FetchOffset::Committed),
            _ => bail!(ErrorKind::ParseError(format!("unknown fetch offset: {}", s))),
        }
    }
}

/// Transactional visibility of fetched records.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i8)]
pub enum IsolationLevel {
    #[default]
    ReadUncommitted = 0,
    ReadCommitted = 1,
}

/// The kind of coordinator FindCoordinator resolves.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i8)]
pub enum CoordinatorType {
    Group = 0,
    Transaction = 1,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_keys() {
        assert_eq!(ApiKeys::Produce.key(), 0);
        assert_eq!(ApiKeys::SaslAuthenticate.key(), 36);
        assert_eq!(ApiKeys::DescribeCluster.key(), 60);
        assert_eq!(ApiKeys::Fetch.to_string(), "Fetch (1)");
    }

    #[test]
    fn test_required_acks() {
        assert_eq!("all".parse::<RequiredAcks>().unwrap(), RequiredAcks::All);
        assert_eq!(RequiredAcks::from(-1), RequiredAcks::All);
        assert_eq!(RequiredAcks::from(0), RequiredAcks::None);
    }

    #[test]
    fn test_fetch_offset_sentinels() {
        assert_eq!(FetchOffset::Earliest.timestamp(), EARLIEST_TIMESTAMP);
        assert_eq!(FetchOffset::Latest.timestamp(), LATEST_TIMESTAMP);
    }
}
