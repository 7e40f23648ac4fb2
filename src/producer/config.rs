use std::time::Duration;

use crate::client::ClientConfig;
use crate::compression::Compression;
use crate::errors::{ErrorKind, Result};
use crate::protocol::RequiredAcks;

pub const DEFAULT_ACK_TIMEOUT_MILLIS: u64 = 30_000;
pub const DEFAULT_BATCH_SIZE: usize = 16 * 1024;
pub const DEFAULT_LINGER_MILLIS: u64 = 0;
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024 * 1024;
pub const DEFAULT_TRANSACTION_TIMEOUT_MILLIS: u64 = 60_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    #[serde(flatten)]
    pub client: ClientConfig,

    /// Acknowledgement level the leader waits for before responding.
    pub acks: RequiredAcks,

    /// Codec applied per record batch.
    pub compression: Compression,

    /// Bytes of serialized records after which a partition batch is sealed.
    #[serde(rename = "batch.size")]
    pub batch_size: usize,

    /// How long a non-full batch may wait for company.
    #[serde(rename = "linger.ms")]
    pub linger_ms: u64,

    /// Upper bound for a single record.
    #[serde(rename = "max.request.size")]
    pub max_request_size: usize,

    /// How long the broker may wait for the acknowledgement level.
    #[serde(rename = "ack.timeout.ms")]
    pub ack_timeout_ms: u64,

    /// Use a broker-assigned producer id and per-partition sequences to
    /// deduplicate retries.
    pub idempotent: bool,

    /// Enables transactions (and implies idempotence).
    #[serde(rename = "transactional.id")]
    pub transactional_id: Option<String>,

    #[serde(rename = "transaction.timeout.ms")]
    pub transaction_timeout_ms: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            client: ClientConfig::default(),
            acks: RequiredAcks::default(),
            compression: Compression::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            linger_ms: DEFAULT_LINGER_MILLIS,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MILLIS,
            idempotent: false,
            transactional_id: None,
            transaction_timeout_ms: DEFAULT_TRANSACTION_TIMEOUT_MILLIS,
        }
    }
}

impl ProducerConfig {
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Transactions imply idempotence.
    pub fn is_idempotent(&self) -> bool {
        self.idempotent || self.transactional_id.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;

        let mut findings = Vec::new();
        if self.batch_size == 0 {
            findings.push("batch.size must be positive".to_owned());
        }
        if self.max_request_size == 0 {
            findings.push("max.request.size must be positive".to_owned());
        }
        if self.transactional_id.is_some() && self.acks != RequiredAcks::All {
            findings.push("transactions require acks=all".to_owned());
        }
        if self.is_idempotent() && self.acks == RequiredAcks::None {
            findings.push("idempotence requires acknowledgements".to_owned());
        }

        match findings.into_iter().next() {
            Some(finding) if self.client.strict => bail!(ErrorKind::ValidationError(finding)),
            Some(finding) => {
                warn!("ignoring invalid option, {}", finding);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProducerConfig::default();
        assert_eq!(config.acks, RequiredAcks::All);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!config.is_idempotent());
    }

    #[test]
    fn test_transactional_implies_idempotent() {
        let config = ProducerConfig {
            transactional_id: Some("txn".into()),
            ..ProducerConfig::default()
        };
        assert!(config.is_idempotent());
    }

    #[test]
    fn test_strict_rejects_txn_without_acks_all() {
        let config = ProducerConfig {
            client: ClientConfig {
                bootstrap_brokers: vec!["localhost:9092".into()],
                strict: true,
                ..ClientConfig::default()
            },
            transactional_id: Some("txn".into()),
            acks: RequiredAcks::One,
            ..ProducerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
