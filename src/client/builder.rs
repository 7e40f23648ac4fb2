use crate::client::client::KafkaClient;
use crate::client::config::{ClientConfig, TlsConfig};
use crate::errors::Result;
use crate::network::SaslConfig;

/// Fluent construction of a `KafkaClient`.
#[derive(Clone, Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn from_config(config: ClientConfig) -> Self {
        ClientBuilder { config }
    }

    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClientBuilder {
            config: ClientConfig {
                bootstrap_brokers: hosts.into_iter().map(Into::into).collect(),
                ..ClientConfig::default()
            },
        }
    }

    pub fn with_client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    pub fn with_request_timeout(mut self, millis: u64) -> Self {
        self.config.request_timeout_ms = millis;
        self
    }

    pub fn with_connect_timeout(mut self, millis: u64) -> Self {
        self.config.connect_timeout_ms = millis;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.config.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, millis: u64) -> Self {
        self.config.retry_delay_ms = millis;
        self
    }

    pub fn with_max_inflights(mut self, max_inflights: usize) -> Self {
        self.config.max_inflights = max_inflights;
        self
    }

    pub fn with_metadata_max_age(mut self, millis: u64) -> Self {
        self.config.metadata_max_age_ms = millis;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.config.tls = Some(tls);
        self
    }

    pub fn with_sasl(mut self, sasl: SaslConfig) -> Self {
        self.config.sasl = Some(sasl);
        self
    }

    pub fn with_strict_validation(mut self) -> Self {
        self.config.strict = true;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn build(self) -> Result<KafkaClient> {
        KafkaClient::from_config(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_round_trip() {
        let builder = ClientBuilder::from_hosts(["localhost:9092"])
            .with_client_id("tester")
            .with_retries(7)
            .with_metadata_max_age(1000);

        assert_eq!(builder.config().client_id.as_deref(), Some("tester"));
        assert_eq!(builder.config().retries, 7);
        assert_eq!(builder.config().metadata_max_age_ms, 1000);

        builder.build().unwrap();
    }
}
