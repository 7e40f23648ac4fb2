mod builder;
mod client;
mod cluster;
mod config;
mod diagnostics;
mod metadata;

pub use self::builder::ClientBuilder;
pub use self::client::{BrokerRole, KafkaClient, MetadataOptions};
pub use self::cluster::{Broker, BrokerRef, Cluster};
pub use self::config::{
    ClientConfig, TlsConfig, ToMilliseconds, DEFAULT_CONNECT_TIMEOUT_MILLIS,
    DEFAULT_MAX_INFLIGHTS, DEFAULT_METADATA_MAX_AGE_MILLIS, DEFAULT_REQUEST_TIMEOUT_MILLIS,
    DEFAULT_RETRIES, DEFAULT_RETRY_DELAY_MILLIS,
};
pub use self::diagnostics::{DiagnosticEvent, DiagnosticPhase, Diagnostics, OperationSpan};
pub use self::metadata::{Metadata, MetadataCache, PartitionInfo, TopicInfo};
