mod assignor;
mod builder;
mod config;
mod consumer;
mod coordinator;
mod fetcher;
mod protocol;
mod subscriptions;

pub use self::assignor::{
    AssignmentStrategy, PartitionAssignor, RangeAssignor, RoundRobinAssignor,
};
pub use self::builder::ConsumerBuilder;
pub use self::config::{
    ConsumerConfig, DEFAULT_AUTO_COMMIT_INTERVAL_MILLIS, DEFAULT_HEARTBEAT_INTERVAL_MILLIS,
    DEFAULT_REBALANCE_TIMEOUT_MILLIS, DEFAULT_SESSION_TIMEOUT_MILLIS,
};
pub use self::consumer::{KafkaConsumer, MessageStream};
pub use self::coordinator::{ConsumerCoordinator, Generation};
pub use self::fetcher::{Fetcher, Message};
pub use self::protocol::{Assignment, Subscription, CONSUMER_PROTOCOL};
pub use self::subscriptions::{Subscriptions, TopicPartitionState};
