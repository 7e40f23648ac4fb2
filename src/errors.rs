use std::time::Duration;

use crate::protocol::{ApiKey, ApiVersion};

/// Various errors reported by a remote Kafka server.
///
/// We use numeric codes to indicate what problem occurred on the server.
/// These can be translated by the client into exceptions or
/// whatever the appropriate error handling mechanism in the client language.
///
/// See also [Kafka Errors](http://kafka.apache.org/protocol.html)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i16)]
pub enum KafkaCode {
    /// The server experienced an unexpected error when processing the request
    Unknown = -1,
    None = 0,
    /// The requested offset is outside the range of offsets
    /// maintained by the server for the given topic/partition
    OffsetOutOfRange = 1,
    /// This indicates that a message contents does not match its CRC
    CorruptMessage = 2,
    /// This request is for a topic or partition that does not exist
    /// on this broker.
    UnknownTopicOrPartition = 3,
    /// The message has a negative size
    InvalidMessageSize = 4,
    /// This error is thrown if we are in the middle of a leadership
    /// election and there is currently no leader for this partition
    /// and hence it is unavailable for writes.
    LeaderNotAvailable = 5,
    /// This error is thrown if the client attempts to send messages
    /// to a replica that is not the leader for some partition. It
    /// indicates that the clients metadata is out of date.
    NotLeaderOrFollower = 6,
    /// This error is thrown if the request exceeds the user-specified
    /// time limit in the request.
    RequestTimedOut = 7,
    /// This is not a client facing error and is used mostly by tools
    /// when a broker is not alive.
    BrokerNotAvailable = 8,
    /// If replica is expected on a broker, but is not (this can be
    /// safely ignored).
    ReplicaNotAvailable = 9,
    /// The server has a configurable maximum message size to avoid
    /// unbounded memory allocation. This error is thrown if the
    /// client attempt to produce a message larger than this maximum.
    MessageSizeTooLarge = 10,
    /// Internal error code for broker-to-broker communication.
    StaleControllerEpoch = 11,
    /// If you specify a string larger than configured maximum for
    /// offset metadata
    OffsetMetadataTooLarge = 12,
    /// The server disconnected before a response was received.
    NetworkException = 13,
    /// The coordinator is still loading group metadata (after a leader
    /// change for the offsets topic partition).
    CoordinatorLoadInProgress = 14,
    /// The coordinator is not available, because the offsets topic has
    /// not yet been created or the coordinator is not active.
    CoordinatorNotAvailable = 15,
    /// The broker returns this error code if it receives an offset
    /// fetch or commit request for a group that it is not a
    /// coordinator for.
    NotCoordinator = 16,
    /// For a request which attempts to access an invalid topic
    /// (e.g. one which has an illegal name), or if an attempt is made
    /// to write to an internal topic (such as the consumer offsets
    /// topic).
    InvalidTopic = 17,
    /// If a message batch in a produce request exceeds the maximum
    /// configured segment size.
    RecordListTooLarge = 18,
    /// Returned from a produce request when the number of in-sync
    /// replicas is lower than the configured minimum and requiredAcks is
    /// -1.
    NotEnoughReplicas = 19,
    /// Returned from a produce request when the message was written
    /// to the log, but with fewer in-sync replicas than required.
    NotEnoughReplicasAfterAppend = 20,
    /// Returned from a produce request if the requested requiredAcks is
    /// invalid (anything other than -1, 1, or 0).
    InvalidRequiredAcks = 21,
    /// Returned from group membership requests (such as heartbeats) when
    /// the generation id provided in the request is not the current
    /// generation.
    IllegalGeneration = 22,
    /// Returned in join group when the member provides a protocol type or
    /// set of protocols which is not compatible with the current group.
    InconsistentGroupProtocol = 23,
    /// Returned in join group when the groupId is empty or null.
    InvalidGroupId = 24,
    /// Returned from group requests (offset commits/fetches, heartbeats,
    /// etc) when the memberId is not in the current generation.
    UnknownMemberId = 25,
    /// Return in join group when the requested session timeout is outside
    /// of the allowed range on the broker
    InvalidSessionTimeout = 26,
    /// Returned in heartbeat requests when the coordinator has begun
    /// rebalancing the group. This indicates to the client that it
    /// should rejoin the group.
    RebalanceInProgress = 27,
    /// This error indicates that an offset commit was rejected because of
    /// oversize metadata.
    InvalidCommitOffsetSize = 28,
    /// Returned by the broker when the client is not authorized to access
    /// the requested topic.
    TopicAuthorizationFailed = 29,
    /// Returned by the broker when the client is not authorized to access
    /// a particular groupId.
    GroupAuthorizationFailed = 30,
    /// Returned by the broker when the client is not authorized to use an
    /// inter-broker or administrative API.
    ClusterAuthorizationFailed = 31,
    /// The timestamp of the message is out of acceptable range.
    InvalidTimestamp = 32,
    /// The broker does not support the requested SASL mechanism.
    UnsupportedSaslMechanism = 33,
    /// Request is not valid given the current SASL state.
    IllegalSaslState = 34,
    /// The version of API is not supported.
    UnsupportedVersion = 35,
    /// Topic with this name already exists.
    TopicAlreadyExists = 36,
    /// Number of partitions is invalid.
    InvalidPartitions = 37,
    /// Replication-factor is invalid.
    InvalidReplicationFactor = 38,
    /// Replica assignment is invalid.
    InvalidReplicaAssignment = 39,
    /// Configuration is invalid.
    InvalidConfig = 40,
    /// This is not the correct controller for this cluster.
    NotController = 41,
    /// This most likely occurs because of a request being malformed by the client library
    /// or the message was sent to an incompatible broker. See the broker logs for more details.
    InvalidRequest = 42,
    /// The message format version on the broker does not support the request.
    UnsupportedForMessageFormat = 43,
    /// Request parameters do not satisfy the configured policy.
    PolicyViolation = 44,
    /// The broker received an out of order sequence number.
    OutOfOrderSequenceNumber = 45,
    /// The broker received a duplicate sequence number.
    DuplicateSequenceNumber = 46,
    /// Producer attempted to produce with an old epoch.
    InvalidProducerEpoch = 47,
    /// The producer attempted a transactional operation in an invalid state.
    InvalidTxnState = 48,
    /// The producer attempted to use a producer id which is not currently
    /// assigned to its transactional id.
    InvalidProducerIdMapping = 49,
    /// The transaction timeout is larger than the maximum value allowed by
    /// the broker.
    InvalidTransactionTimeout = 50,
    /// The producer attempted to update a transaction while another
    /// concurrent operation on the same transaction was ongoing.
    ConcurrentTransactions = 51,
    /// Indicates that the transaction coordinator sending a WriteTxnMarker
    /// is no longer the current coordinator for a given producer.
    TransactionCoordinatorFenced = 52,
    /// Transactional Id authorization failed.
    TransactionalIdAuthorizationFailed = 53,
    /// Security features are disabled.
    SecurityDisabled = 54,
    /// The broker did not attempt to execute this operation. This may happen
    /// for batched RPCs where some operations in the batch failed, causing
    /// the broker to respond without trying the rest.
    OperationNotAttempted = 55,
    /// Disk error when trying to access log file on the disk.
    KafkaStorageError = 56,
    /// The user-specified log directory is not found in the broker config.
    LogDirNotFound = 57,
    /// SASL Authentication failed.
    SaslAuthenticationFailed = 58,
    /// This exception is raised by the broker if it could not locate the
    /// producer metadata associated with the producerId in question.
    UnknownProducerId = 59,
    /// A partition reassignment is in progress.
    ReassignmentInProgress = 60,
    /// Delegation Token feature is not enabled.
    DelegationTokenAuthDisabled = 61,
    /// Delegation Token is not found on server.
    DelegationTokenNotFound = 62,
    /// Specified Principal is not valid Owner/Renewer.
    DelegationTokenOwnerMismatch = 63,
    /// Delegation Token requests are not allowed on PLAINTEXT/1-way SSL
    /// channels and on delegation token authenticated channels.
    DelegationTokenRequestNotAllowed = 64,
    /// Delegation Token authorization failed.
    DelegationTokenAuthorizationFailed = 65,
    /// Delegation Token is expired.
    DelegationTokenExpired = 66,
    /// Supplied principalType is not supported.
    InvalidPrincipalType = 67,
    /// The group is not empty.
    NonEmptyGroup = 68,
    /// The group id does not exist.
    GroupIdNotFound = 69,
    /// The fetch session ID was not found.
    FetchSessionIdNotFound = 70,
    /// The fetch session epoch is invalid.
    InvalidFetchSessionEpoch = 71,
    /// There is no listener on the leader broker that matches the listener
    /// on which metadata request was processed.
    ListenerNotFound = 72,
    /// Topic deletion is disabled.
    TopicDeletionDisabled = 73,
    /// The leader epoch in the request is older than the epoch on the broker.
    FencedLeaderEpoch = 74,
    /// The leader epoch in the request is newer than the epoch on the broker.
    UnknownLeaderEpoch = 75,
    /// The requesting client does not support the compression type of given
    /// partition.
    UnsupportedCompressionType = 76,
    /// Broker epoch has changed.
    StaleBrokerEpoch = 77,
    /// The leader high watermark has not caught up from a recent leader
    /// election so the offsets cannot be guaranteed to be monotonically
    /// increasing.
    OffsetNotAvailable = 78,
    /// The group member needs to have a valid member id before actually
    /// entering a consumer group.
    MemberIdRequired = 79,
    /// The preferred leader was not available.
    PreferredLeaderNotAvailable = 80,
    /// The consumer group has reached its max size.
    GroupMaxSizeReached = 81,
    /// The broker rejected this static consumer since another consumer with
    /// the same group.instance.id has registered with a different member.id.
    FencedInstanceId = 82,
    /// Eligible topic partition leaders are not available.
    EligibleLeadersNotAvailable = 83,
    /// Leader election not needed for topic partition.
    ElectionNotNeeded = 84,
    /// No partition reassignment is in progress.
    NoReassignmentInProgress = 85,
    /// Deleting offsets of a topic is forbidden while the consumer group is
    /// actively subscribed to it.
    GroupSubscribedToTopic = 86,
    /// This record has failed the validation on broker and hence will be
    /// rejected.
    InvalidRecord = 87,
    /// There are unstable offsets that need to be cleared.
    UnstableOffsetCommit = 88,
    /// The throttling quota has been exceeded.
    ThrottlingQuotaExceeded = 89,
    /// There is a newer producer with the same transactionalId which fences
    /// the current one.
    ProducerFenced = 90,
    /// A request illegally referred to a resource that does not exist.
    ResourceNotFound = 91,
    /// A request illegally referred to the same resource twice.
    DuplicateResource = 92,
    /// Requested credential would not meet criteria for acceptability.
    UnacceptableCredential = 93,
    /// Indicates that the either the sender or recipient of a
    /// voter-only request is not one of the expected voters.
    InconsistentVoterSet = 94,
    /// The given update version was invalid.
    InvalidUpdateVersion = 95,
    /// Unable to update finalized features due to an unexpected server error.
    FeatureUpdateFailed = 96,
}

impl KafkaCode {
    /// Whether an operation that failed with this code may succeed if it is
    /// retried after a metadata refresh or a short backoff.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            KafkaCode::CorruptMessage
                | KafkaCode::UnknownTopicOrPartition
                | KafkaCode::LeaderNotAvailable
                | KafkaCode::NotLeaderOrFollower
                | KafkaCode::RequestTimedOut
                | KafkaCode::NetworkException
                | KafkaCode::CoordinatorLoadInProgress
                | KafkaCode::CoordinatorNotAvailable
                | KafkaCode::NotCoordinator
                | KafkaCode::NotEnoughReplicas
                | KafkaCode::NotEnoughReplicasAfterAppend
                | KafkaCode::NotController
                | KafkaCode::KafkaStorageError
                | KafkaCode::FetchSessionIdNotFound
                | KafkaCode::InvalidFetchSessionEpoch
                | KafkaCode::ListenerNotFound
                | KafkaCode::FencedLeaderEpoch
                | KafkaCode::UnknownLeaderEpoch
                | KafkaCode::OffsetNotAvailable
                | KafkaCode::PreferredLeaderNotAvailable
                | KafkaCode::EligibleLeadersNotAvailable
                | KafkaCode::ElectionNotNeeded
                | KafkaCode::UnstableOffsetCommit
                | KafkaCode::ThrottlingQuotaExceeded
        )
    }

    pub fn key(self) -> i16 {
        self as i16
    }
}

impl From<i16> for KafkaCode {
    fn from(v: i16) -> Self {
        // Codes -1..=96 are contiguous in this table; anything newer than the
        // client maps to Unknown.
        if (-1..=96).contains(&v) {
            unsafe { std::mem::transmute(v) }
        } else {
            KafkaCode::Unknown
        }
    }
}

error_chain! {
    foreign_links {
        IoError(::std::io::Error);
        TlsError(::native_tls::Error);
        Utf8Error(::std::str::Utf8Error);
    }

    errors {
        /// Malformed bytes on the encode or decode path.
        CodecError(reason: String) {
            description("codec error")
            display("codec error, {}", reason)
        }
        /// An incomplete or undecodable response frame.
        ParseError(reason: String) {
            description("fail to parse")
            display("fail to parse, {}", reason)
        }
        /// A broker error code returned inside a response field, together
        /// with a JSON-pointer style locator into the response structure.
        ProtocolError(api_key: ApiKey, code: KafkaCode, path: String) {
            description("protocol error")
            display("protocol error, api key {}, {:?} @ {}", api_key, code, path)
        }
        /// A broker error code without a richer context.
        KafkaError(code: KafkaCode) {
            description("kafka error")
            display("kafka error, {:?}", code)
        }
        /// Received a response whose api key does not match the request.
        UnexpectedResponse(api_key: ApiKey) {
            description("unexpected response")
            display("unexpected response, api key {}", api_key)
        }
        /// API key or version not supported by the broker; carries the
        /// version range the broker advertised.
        UnsupportedApiVersion(api_key: ApiKey, min_version: ApiVersion, max_version: ApiVersion) {
            description("unsupported api version")
            display("unsupported api version, api key {} (broker supports {}..={})",
                    api_key, min_version, max_version)
        }
        /// The requested compression codec is not compiled in.
        UnsupportedCompression(codec: i8) {
            description("unsupported compression")
            display("unsupported compression, codec #{}", codec)
        }
        UnsupportedSaslMechanism(mechanism: String) {
            description("unsupported SASL mechanism")
            display("unsupported SASL mechanism, {}", mechanism)
        }
        UnsupportedAssignmentStrategy(name: String) {
            description("unsupported assignment strategy")
            display("unsupported assignment strategy, {}", name)
        }
        SaslError(reason: String) {
            description("SASL authentication failed")
            display("SASL authentication failed, {}", reason)
        }
        /// Options rejected under strict validation.
        ValidationError(reason: String) {
            description("invalid options")
            display("invalid options, {}", reason)
        }
        /// Several sub-errors from concurrent fan-outs or exhausted retries.
        MultipleErrors(errors: Vec<Error>) {
            description("multiple errors")
            display("{} errors, first: {}",
                    errors.len(),
                    errors.first().map(|err| err.to_string()).unwrap_or_default())
        }
        /// The per-request deadline expired before a response arrived.
        RequestTimeout(after: Duration) {
            description("request timed out")
            display("request timed out after {:?}", after)
        }
        /// Operation attempted after `close()` or during close-in-progress.
        ClientClosed(reason: String) {
            description("client closed")
            display("{}", reason)
        }
        Canceled(task: &'static str) {
            description("task canceled")
            display("task canceled, {}", task)
        }
        BrokerNotFound(broker: i32) {
            description("broker not found")
            display("broker #{} not found", broker)
        }
        NoBrokerAvailable {
            description("no broker available")
        }
        TopicNotFound(topic_name: String) {
            description("topic not found")
            display("topic `{}` not found", topic_name)
        }
        /// The stream of responses got out of step with the requests.
        CorrelationMismatch(expected: i32, received: i32) {
            description("correlation id mismatch")
            display("correlation id mismatch, expected {}, received {}", expected, received)
        }
        FrameTooLarge(size: usize, limit: usize) {
            description("frame too large")
            display("frame of {} bytes exceeds the {} bytes limit", size, limit)
        }
    }
}

impl Error {
    /// Whether the operation that produced this error is worth retrying
    /// through the base client's retry policy.
    pub fn is_retriable(&self) -> bool {
        match *self.kind() {
            ErrorKind::KafkaError(code) => code.is_retriable(),
            ErrorKind::ProtocolError(_, code, _) => code.is_retriable(),
            ErrorKind::IoError(_) | ErrorKind::RequestTimeout(_) | ErrorKind::NoBrokerAvailable => {
                true
            }
            ErrorKind::MultipleErrors(ref errors) => errors.iter().any(Error::is_retriable),
            _ => false,
        }
    }

    /// The broker error code buried in this error, if any.
    pub fn kafka_code(&self) -> Option<KafkaCode> {
        match *self.kind() {
            ErrorKind::KafkaError(code) | ErrorKind::ProtocolError(_, code, _) => Some(code),
            _ => None,
        }
    }

    /// True when this error, or any sub-error of an aggregate, satisfies the
    /// predicate.
    pub fn any<P>(&self, predicate: P) -> bool
    where
        P: Fn(&Error) -> bool + Copy,
    {
        if predicate(self) {
            return true;
        }
        if let ErrorKind::MultipleErrors(ref errors) = *self.kind() {
            errors.iter().any(|err| err.any(predicate))
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kafka_code_from_i16() {
        assert_eq!(KafkaCode::from(-1), KafkaCode::Unknown);
        assert_eq!(KafkaCode::from(0), KafkaCode::None);
        assert_eq!(KafkaCode::from(6), KafkaCode::NotLeaderOrFollower);
        assert_eq!(KafkaCode::from(41), KafkaCode::NotController);
        assert_eq!(KafkaCode::from(96), KafkaCode::FeatureUpdateFailed);
        assert_eq!(KafkaCode::from(4242), KafkaCode::Unknown);
    }

    #[test]
    fn test_retriable_codes() {
        assert!(KafkaCode::NotController.is_retriable());
        assert!(KafkaCode::NotCoordinator.is_retriable());
        assert!(KafkaCode::CoordinatorLoadInProgress.is_retriable());
        assert!(KafkaCode::RequestTimedOut.is_retriable());
        assert!(!KafkaCode::TopicAlreadyExists.is_retriable());
        assert!(!KafkaCode::SaslAuthenticationFailed.is_retriable());
    }

    #[test]
    fn test_aggregate_predicate() {
        let err = Error::from(ErrorKind::MultipleErrors(vec![
            ErrorKind::KafkaError(KafkaCode::NotController).into(),
            ErrorKind::NoBrokerAvailable.into(),
        ]));

        assert!(err.is_retriable());
        assert!(err.any(|err| err.kafka_code() == Some(KafkaCode::NotController)));
        assert!(!err.any(|err| err.kafka_code() == Some(KafkaCode::InvalidTopic)));
    }
}
