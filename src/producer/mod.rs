mod accumulator;
mod batch;
mod builder;
mod config;
mod partitioner;
mod producer;
mod record;
mod sender;
mod txn;

pub use self::accumulator::RecordAccumulator;
pub use self::batch::{ProducerBatch, Thunk};
pub use self::builder::ProducerBuilder;
pub use self::config::{
    ProducerConfig, DEFAULT_ACK_TIMEOUT_MILLIS, DEFAULT_BATCH_SIZE, DEFAULT_LINGER_MILLIS,
    DEFAULT_MAX_REQUEST_SIZE,
};
pub use self::partitioner::{DefaultPartitioner, Partitioner};
pub use self::producer::KafkaProducer;
pub use self::record::{ProducerRecord, RecordMetadata};
pub use self::sender::Sender;
pub use self::txn::{TransactionState, TxnState};
