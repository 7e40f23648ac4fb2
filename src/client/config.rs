use std::time::Duration;

use native_tls::{Certificate, Identity, TlsConnector};

use crate::errors::{ErrorKind, Result};
use crate::network::{ConnectOptions, SaslConfig, TlsOptions};

pub const DEFAULT_REQUEST_TIMEOUT_MILLIS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_MILLIS: u64 = 10_000;
pub const DEFAULT_RETRIES: usize = 4;
pub const DEFAULT_RETRY_DELAY_MILLIS: u64 = 100;
pub const DEFAULT_MAX_INFLIGHTS: usize = 5;
pub const DEFAULT_METADATA_MAX_AGE_MILLIS: u64 = 300_000;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

/// Helper for the millisecond-typed config fields.
pub trait ToMilliseconds {
    fn to_millis(&self) -> u64;
}

impl ToMilliseconds for Duration {
    fn to_millis(&self) -> u64 {
        self.as_secs() * 1000 + u64::from(self.subsec_millis())
    }
}

/// TLS settings in PEM form; resolved into a connector at connect time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Client certificate chain (PEM) for mutual TLS.
    pub cert: Option<String>,
    /// Client private key (PEM, PKCS#8) for mutual TLS.
    pub key: Option<String>,
    /// Additional trusted root (PEM).
    pub ca: Option<String>,
    /// Verify the broker certificate; disable only against test clusters.
    pub reject_unauthorized: Option<bool>,
    /// Override the SNI/verification name derived from the broker host.
    pub domain: Option<String>,
}

impl TlsConfig {
    pub fn build(&self) -> Result<TlsOptions> {
        let mut builder = TlsConnector::builder();

        if let Some(ca) = &self.ca {
            builder.add_root_certificate(Certificate::from_pem(ca.as_bytes())?);
        }
        match (&self.cert, &self.key) {
            (Some(cert), Some(key)) => {
                builder.identity(Identity::from_pkcs8(cert.as_bytes(), key.as_bytes())?);
            }
            (None, None) => {}
            _ => bail!(ErrorKind::ValidationError(
                "tls.cert and tls.key must be provided together".into()
            )),
        }
        if self.reject_unauthorized == Some(false) {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }

        Ok(TlsOptions {
            connector: tokio_native_tls::TlsConnector::from(builder.build()?),
            domain: self.domain.clone(),
        })
    }
}

/// Base client configuration; producer and consumer configs embed it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Ordered `host:port` list used to discover the cluster.
    #[serde(rename = "bootstrap.brokers")]
    pub bootstrap_brokers: Vec<String>,

    /// Identifier attached to every request header.
    #[serde(rename = "client.id")]
    pub client_id: Option<String>,

    /// Per-request deadline.
    #[serde(rename = "request.timeout.ms")]
    pub request_timeout_ms: u64,

    /// Socket-connect deadline.
    #[serde(rename = "connect.timeout.ms")]
    pub connect_timeout_ms: u64,

    /// Retry budget for transient errors.
    pub retries: usize,

    /// Base delay between retries; grows exponentially with jitter.
    #[serde(rename = "retry.delay.ms")]
    pub retry_delay_ms: u64,

    /// Per-connection cap of concurrent pending requests.
    #[serde(rename = "max.inflights")]
    pub max_inflights: usize,

    /// TTL for cached topic/cluster metadata.
    #[serde(rename = "metadata.max.age.ms")]
    pub metadata_max_age_ms: u64,

    /// Upper bound for a single request/response frame.
    #[serde(rename = "max.frame.size")]
    pub max_frame_size: usize,

    pub tls: Option<TlsConfig>,

    pub sasl: Option<SaslConfig>,

    /// Refuse out-of-range options instead of fixing them up silently.
    pub strict: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            bootstrap_brokers: Vec::new(),
            client_id: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MILLIS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MILLIS,
            retries: DEFAULT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MILLIS,
            max_inflights: DEFAULT_MAX_INFLIGHTS,
            metadata_max_age_ms: DEFAULT_METADATA_MAX_AGE_MILLIS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            tls: None,
            sasl: None,
            strict: false,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn metadata_max_age(&self) -> Duration {
        Duration::from_millis(self.metadata_max_age_ms)
    }

    /// Check option ranges. Under `strict` every finding is an error;
    /// otherwise findings are logged and defaults are substituted by the
    /// caller where possible.
    pub fn validate(&self) -> Result<()> {
        let mut findings = Vec::new();

        if self.bootstrap_brokers.is_empty() {
            findings.push("bootstrap.brokers must not be empty".to_owned());
        }
        for broker in &self.bootstrap_brokers {
            if !broker.contains(':') {
                findings.push(format!("bootstrap broker `{}` is not host:port", broker));
            }
        }
        if self.request_timeout_ms == 0 {
            findings.push("request.timeout.ms must be positive".to_owned());
        }
        if self.max_inflights == 0 {
            findings.push("max.inflights must be positive".to_owned());
        }
        if self.max_frame_size < 1024 {
            findings.push("max.frame.size below 1 KiB".to_owned());
        }
        if let Some(tls) = &self.tls {
            if tls.cert.is_some() != tls.key.is_some() {
                findings.push("tls.cert and tls.key must be provided together".to_owned());
            }
        }

        match findings.into_iter().next() {
            Some(finding) if self.strict => bail!(ErrorKind::ValidationError(finding)),
            Some(finding) => {
                warn!("ignoring invalid option, {}", finding);
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn connect_options(&self) -> Result<ConnectOptions> {
        Ok(ConnectOptions {
            client_id: self.client_id.clone(),
            connect_timeout: self.connect_timeout(),
            request_timeout: self.request_timeout(),
            max_inflights: self.max_inflights,
            max_frame_size: self.max_frame_size,
            tls: self.tls.as_ref().map(TlsConfig::build).transpose()?,
            sasl: self.sasl.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.metadata_max_age(), Duration::from_secs(300));
        assert!(!config.strict);
    }

    #[test]
    fn test_strict_validation() {
        let config = ClientConfig {
            bootstrap_brokers: vec!["localhost".into()],
            strict: true,
            ..ClientConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ValidationError(_)));

        let config = ClientConfig {
            bootstrap_brokers: vec!["localhost:9092".into()],
            strict: true,
            ..ClientConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_lenient_validation_warns_only() {
        let config = ClientConfig {
            bootstrap_brokers: Vec::new(),
            ..ClientConfig::default()
        };
        config.validate().unwrap();
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_config_deserialize() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "bootstrap.brokers": ["localhost:9092"],
                "client.id": "tester",
                "retries": 2,
                "sasl": {"mechanism": "plain", "username": "u", "password": "p"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.bootstrap_brokers, vec!["localhost:9092"]);
        assert_eq!(config.client_id.as_deref(), Some("tester"));
        assert_eq!(config.retries, 2);
        assert_eq!(
            config.sasl,
            Some(SaslConfig::Plain {
                username: "u".into(),
                password: "p".into()
            })
        );
    }
}
