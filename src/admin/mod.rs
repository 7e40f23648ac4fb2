mod admin;
mod types;

pub use self::admin::KafkaAdmin;
pub use self::types::{ClusterDescription, CreatedTopic, GroupListing, NewTopic, TopicListing};
