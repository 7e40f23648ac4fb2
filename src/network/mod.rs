use std::fmt;

use crate::protocol::PartitionId;

mod codec;
mod conn;
mod pool;
mod request;
mod response;
mod sasl;

pub use self::codec::FrameCodec;
pub use self::conn::{ConnectOptions, ConnectionState, KafkaConnection, TlsOptions};
pub use self::pool::KafkaConnPool;
pub use self::request::KafkaRequest;
pub use self::response::KafkaResponse;
pub use self::sasl::{SaslConfig, SaslSession};

pub const DEFAULT_PORT: u16 = 9092;

/// A topic name and partition index, the unit everything routes by.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicPartition {
    pub topic_name: String,
    pub partition: PartitionId,
}

impl TopicPartition {
    pub fn new<S: Into<String>>(topic_name: S, partition: PartitionId) -> Self {
        TopicPartition {
            topic_name: topic_name.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.topic_name, self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_partition_display() {
        assert_eq!(TopicPartition::new("events", 3).to_string(), "events-3");
    }
}
