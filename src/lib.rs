//! An asynchronous Apache Kafka client for Tokio.
//!
//! The crate speaks the Kafka wire protocol directly and exposes three
//! roles over one shared connection and metadata layer:
//!
//! - [`KafkaAdmin`] for topic/group/config/quota administration,
//! - [`KafkaProducer`] for batched, idempotent and transactional sends,
//! - [`KafkaConsumer`] for consumer-group membership and message streams.
//!
//! All of them are built over [`KafkaClient`], which owns the connection
//! pool, the metadata cache, API-version negotiation and the retry policy.

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod errors;

mod admin;
mod client;
mod compression;
mod consumer;
mod network;
mod producer;
mod protocol;
mod serialization;

pub mod consts {
    pub use crate::client::{
        DEFAULT_CONNECT_TIMEOUT_MILLIS, DEFAULT_MAX_INFLIGHTS, DEFAULT_METADATA_MAX_AGE_MILLIS,
        DEFAULT_REQUEST_TIMEOUT_MILLIS, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MILLIS,
    };
    pub use crate::consumer::{
        DEFAULT_AUTO_COMMIT_INTERVAL_MILLIS, DEFAULT_HEARTBEAT_INTERVAL_MILLIS,
        DEFAULT_REBALANCE_TIMEOUT_MILLIS, DEFAULT_SESSION_TIMEOUT_MILLIS,
    };
    pub use crate::producer::{
        DEFAULT_ACK_TIMEOUT_MILLIS, DEFAULT_BATCH_SIZE, DEFAULT_LINGER_MILLIS,
        DEFAULT_MAX_REQUEST_SIZE,
    };
}

pub use crate::admin::{
    ClusterDescription, CreatedTopic, GroupListing, KafkaAdmin, NewTopic, TopicListing,
};
pub use crate::client::{
    Broker, BrokerRef, BrokerRole, ClientBuilder, ClientConfig, Cluster, DiagnosticEvent,
    DiagnosticPhase, Diagnostics, KafkaClient, Metadata, MetadataOptions, PartitionInfo,
    TlsConfig, ToMilliseconds, TopicInfo,
};
pub use crate::compression::Compression;
pub use crate::consumer::{
    Assignment, AssignmentStrategy, ConsumerBuilder, ConsumerConfig, ConsumerCoordinator,
    Generation, KafkaConsumer, Message, MessageStream, PartitionAssignor, RangeAssignor,
    RoundRobinAssignor, Subscription, CONSUMER_PROTOCOL,
};
pub use crate::errors::{Error, ErrorKind, KafkaCode, Result};
pub use crate::network::{KafkaConnection, SaslConfig, TopicPartition};
pub use crate::producer::{
    DefaultPartitioner, KafkaProducer, Partitioner, ProducerBuilder, ProducerConfig,
    ProducerRecord, RecordMetadata,
};
pub use crate::protocol::{
    ApiKeys, FetchOffset, IsolationLevel, Offset, PartitionId, RecordHeader, RequiredAcks,
    Timestamp,
};
pub use crate::serialization::{
    BytesDeserializer, BytesSerializer, Deserializer, NoopDeserializer, NoopSerializer,
    Serializer, StringDeserializer, StringSerializer,
};

#[cfg(feature = "json")]
pub use crate::serialization::{JsonDeserializer, JsonSerializer};
