use std::time::Duration;

use crate::client::ClientConfig;
use crate::errors::{ErrorKind, Result};
use crate::protocol::{FetchOffset, IsolationLevel};

pub const DEFAULT_SESSION_TIMEOUT_MILLIS: u64 = 10_000;
pub const DEFAULT_REBALANCE_TIMEOUT_MILLIS: u64 = 30_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MILLIS: u64 = 3_000;
pub const DEFAULT_AUTO_COMMIT_INTERVAL_MILLIS: u64 = 5_000;
pub const DEFAULT_MAX_WAIT_MILLIS: u64 = 500;
pub const DEFAULT_MIN_BYTES: i32 = 1;
pub const DEFAULT_MAX_BYTES: i32 = 50 * 1024 * 1024;
pub const DEFAULT_PARTITION_MAX_BYTES: i32 = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    #[serde(flatten)]
    pub client: ClientConfig,

    #[serde(rename = "group.id")]
    pub group_id: String,

    /// Where to start when the group has no usable committed offset.
    pub mode: FetchOffset,

    /// Commit delivered offsets on a timer; turn off for per-message
    /// commits.
    pub autocommit: bool,

    #[serde(rename = "autocommit.interval.ms")]
    pub autocommit_interval_ms: u64,

    #[serde(rename = "session.timeout.ms")]
    pub session_timeout_ms: u64,

    #[serde(rename = "rebalance.timeout.ms")]
    pub rebalance_timeout_ms: u64,

    #[serde(rename = "heartbeat.interval.ms")]
    pub heartbeat_interval_ms: u64,

    /// How long the broker may hold a fetch to accumulate `min_bytes`.
    #[serde(rename = "max.wait.ms")]
    pub max_wait_ms: u64,

    #[serde(rename = "min.bytes")]
    pub min_bytes: i32,

    #[serde(rename = "max.bytes")]
    pub max_bytes: i32,

    #[serde(rename = "partition.max.bytes")]
    pub partition_max_bytes: i32,

    pub isolation: IsolationLevel,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            client: ClientConfig::default(),
            group_id: String::new(),
            mode: FetchOffset::default(),
            autocommit: true,
            autocommit_interval_ms: DEFAULT_AUTO_COMMIT_INTERVAL_MILLIS,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MILLIS,
            rebalance_timeout_ms: DEFAULT_REBALANCE_TIMEOUT_MILLIS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MILLIS,
            max_wait_ms: DEFAULT_MAX_WAIT_MILLIS,
            min_bytes: DEFAULT_MIN_BYTES,
            max_bytes: DEFAULT_MAX_BYTES,
            partition_max_bytes: DEFAULT_PARTITION_MAX_BYTES,
            isolation: IsolationLevel::default(),
        }
    }
}

impl ConsumerConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn rebalance_timeout(&self) -> Duration {
        Duration::from_millis(self.rebalance_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn autocommit_interval(&self) -> Duration {
        Duration::from_millis(self.autocommit_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;

        let mut findings = Vec::new();
        if self.group_id.is_empty() {
            findings.push("group.id must not be empty".to_owned());
        }
        if self.heartbeat_interval_ms >= self.session_timeout_ms {
            findings.push(
                "heartbeat.interval.ms must be lower than session.timeout.ms".to_owned(),
            );
        }
        if self.min_bytes < 0 || self.max_bytes <= 0 {
            findings.push("fetch byte bounds must be positive".to_owned());
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
        let config = ConsumerConfig::default();
        assert!(config.autocommit);
        assert_eq!(config.mode, FetchOffset::Committed);
        assert_eq!(config.session_timeout(), Duration::from_secs(10));
        assert_eq!(config.isolation, IsolationLevel::ReadUncommitted);
    }

    #[test]
    fn test_strict_heartbeat_bounds() {
        let config = ConsumerConfig {
            client: ClientConfig {
                bootstrap_brokers: vec!["localhost:9092".into()],
                strict: true,
                ..ClientConfig::default()
            },
            group_id: "g".into(),
            heartbeat_interval_ms: 20_000,
            session_timeout_ms: 10_000,
            ..ConsumerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
