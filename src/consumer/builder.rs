use crate::client::{ClientConfig, KafkaClient};
use crate::consumer::assignor::PartitionAssignor;
use crate::consumer::config::ConsumerConfig;
use crate::consumer::consumer::KafkaConsumer;
use crate::errors::Result;
use crate::protocol::{FetchOffset, IsolationLevel};

/// Fluent construction of a `KafkaConsumer`.
pub struct ConsumerBuilder {
    config: ConsumerConfig,
    client: Option<KafkaClient>,
    assignors: Option<Vec<Box<dyn PartitionAssignor>>>,
}

impl ConsumerBuilder {
    pub fn from_client(client: KafkaClient) -> Self {
        ConsumerBuilder {
            config: ConsumerConfig {
                client: client.config().clone(),
                ..ConsumerConfig::default()
            },
            client: Some(client),
            assignors: None,
        }
    }

    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConsumerBuilder {
            config: ConsumerConfig {
                client: ClientConfig {
                    bootstrap_brokers: hosts.into_iter().map(Into::into).collect(),
                    ..ClientConfig::default()
                },
                ..ConsumerConfig::default()
            },
            client: None,
            assignors: None,
        }
    }

    pub fn with_group_id<S: Into<String>>(mut self, group_id: S) -> Self {
        self.config.group_id = group_id.into();
        self
    }

    pub fn with_mode(mut self, mode: FetchOffset) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn with_autocommit(mut self, autocommit: bool) -> Self {
        self.config.autocommit = autocommit;
        self
    }

    pub fn with_autocommit_interval(mut self, millis: u64) -> Self {
        self.config.autocommit_interval_ms = millis;
        self
    }

    pub fn with_session_timeout(mut self, millis: u64) -> Self {
        self.config.session_timeout_ms = millis;
        self
    }

    pub fn with_rebalance_timeout(mut self, millis: u64) -> Self {
        self.config.rebalance_timeout_ms = millis;
        self
    }

    pub fn with_heartbeat_interval(mut self, millis: u64) -> Self {
        self.config.heartbeat_interval_ms = millis;
        self
    }

    pub fn with_max_wait(mut self, millis: u64) -> Self {
        self.config.max_wait_ms = millis;
        self
    }

    pub fn with_fetch_bytes(mut self, min_bytes: i32, max_bytes: i32) -> Self {
        self.config.min_bytes = min_bytes;
        self.config.max_bytes = max_bytes;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.config.isolation = isolation;
        self
    }

    pub fn with_assignors(mut self, assignors: Vec<Box<dyn PartitionAssignor>>) -> Self {
        self.assignors = Some(assignors);
        self
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn build(self) -> Result<KafkaConsumer> {
        let client = match self.client {
            Some(client) => client,
            None => KafkaClient::from_config(self.config.client.clone())?,
        };

        match self.assignors {
            Some(assignors) => KafkaConsumer::with_assignors(client, self.config, assignors),
            None => KafkaConsumer::new(client, self.config),
        }
    }
}
