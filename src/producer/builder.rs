use crate::client::{ClientConfig, KafkaClient};
use crate::compression::Compression;
use crate::errors::Result;
use crate::producer::config::ProducerConfig;
use crate::producer::partitioner::Partitioner;
use crate::producer::producer::KafkaProducer;
use crate::protocol::RequiredAcks;

/// Fluent construction of a `KafkaProducer`.
pub struct ProducerBuilder {
    config: ProducerConfig,
    client: Option<KafkaClient>,
    partitioner: Option<Box<dyn Partitioner>>,
}

impl ProducerBuilder {
    pub fn from_client(client: KafkaClient) -> Self {
        ProducerBuilder {
            config: ProducerConfig {
                client: client.config().clone(),
                ..ProducerConfig::default()
            },
            client: Some(client),
            partitioner: None,
        }
    }

    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProducerBuilder {
            config: ProducerConfig {
                client: ClientConfig {
                    bootstrap_brokers: hosts.into_iter().map(Into::into).collect(),
                    ..ClientConfig::default()
                },
                ..ProducerConfig::default()
            },
            client: None,
            partitioner: None,
        }
    }

    pub fn with_required_acks(mut self, acks: RequiredAcks) -> Self {
        self.config.acks = acks;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn with_linger(mut self, millis: u64) -> Self {
        self.config.linger_ms = millis;
        self
    }

    pub fn with_max_request_size(mut self, max_request_size: usize) -> Self {
        self.config.max_request_size = max_request_size;
        self
    }

    pub fn with_ack_timeout(mut self, millis: u64) -> Self {
        self.config.ack_timeout_ms = millis;
        self
    }

    pub fn idempotent(mut self) -> Self {
        self.config.idempotent = true;
        self
    }

    pub fn with_transactional_id<S: Into<String>>(mut self, transactional_id: S) -> Self {
        self.config.transactional_id = Some(transactional_id.into());
        self
    }

    pub fn with_partitioner(mut self, partitioner: Box<dyn Partitioner>) -> Self {
        self.partitioner = Some(partitioner);
        self
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn build(self) -> Result<KafkaProducer> {
        let client = match self.client {
            Some(client) => client,
            None => KafkaClient::from_config(self.config.client.clone())?,
        };

        match self.partitioner {
            Some(partitioner) => {
                KafkaProducer::with_partitioner(client, self.config, partitioner)
            }
            None => KafkaProducer::new(client, self.config),
        }
    }
}
