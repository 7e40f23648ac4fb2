//! Client-side SASL mechanisms: PLAIN, SCRAM-SHA-256/512 (RFC 5802) and
//! OAUTHBEARER (RFC 7628). GSSAPI is accepted in configuration but needs a
//! platform Kerberos stack the client does not link against; selecting it
//! fails with `UnsupportedSaslMechanism` at connect time.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256, Sha512};

use crate::errors::{ErrorKind, Result};

const GS2_HEADER: &str = "n,,";
const NONCE_LEN: usize = 24;

/// SASL credentials; the variant picks the mechanism.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mechanism", rename_all = "kebab-case")]
pub enum SaslConfig {
    Plain {
        username: String,
        password: String,
    },
    #[serde(rename = "scram-sha-256")]
    ScramSha256 {
        username: String,
        password: String,
    },
    #[serde(rename = "scram-sha-512")]
    ScramSha512 {
        username: String,
        password: String,
    },
    #[serde(rename = "oauthbearer")]
    OAuthBearer {
        token: String,
    },
    Gssapi {
        principal: String,
    },
}

impl SaslConfig {
    pub fn mechanism(&self) -> &'static str {
        match *self {
            SaslConfig::Plain { .. } => "PLAIN",
            SaslConfig::ScramSha256 { .. } => "SCRAM-SHA-256",
            SaslConfig::ScramSha512 { .. } => "SCRAM-SHA-512",
            SaslConfig::OAuthBearer { .. } => "OAUTHBEARER",
            SaslConfig::Gssapi { .. } => "GSSAPI",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScramDigest {
    Sha256,
    Sha512,
}

impl ScramDigest {
    fn hi(self, password: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
        match self {
            ScramDigest::Sha256 => {
                let mut out = vec![0u8; 32];
                pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
                out
            }
            ScramDigest::Sha512 => {
                let mut out = vec![0u8; 64];
                pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out);
                out
            }
        }
    }

    fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self {
            ScramDigest::Sha256 => {
                let mut mac = Hmac::<Sha256>::new_from_slice(key)
                    .map_err(|err| ErrorKind::SaslError(err.to_string()))?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
            ScramDigest::Sha512 => {
                let mut mac = Hmac::<Sha512>::new_from_slice(key)
                    .map_err(|err| ErrorKind::SaslError(err.to_string()))?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }
        }
    }

    fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            ScramDigest::Sha256 => Sha256::digest(data).to_vec(),
            ScramDigest::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

#[derive(Debug)]
enum Mechanism {
    Plain {
        username: String,
        password: String,
    },
    Scram {
        digest: ScramDigest,
        username: String,
        password: String,
        nonce: String,
        client_first_bare: String,
        /// Set after the server-first message; used to verify server-final.
        server_signature: Option<Vec<u8>>,
    },
    OAuthBearer {
        token: String,
    },
}

/// One authentication exchange with a broker. `initial_response` produces
/// the first token, then `step` consumes each server reply and yields the
/// next token until it returns `None`.
#[derive(Debug)]
pub struct SaslSession {
    mechanism: Mechanism,
}

impl SaslSession {
    pub fn new(config: &SaslConfig) -> Result<Self> {
        let mechanism = match config {
            SaslConfig::Plain { username, password } => Mechanism::Plain {
                username: username.clone(),
                password: password.clone(),
            },
            SaslConfig::ScramSha256 { username, password } => {
                scram(ScramDigest::Sha256, username, password)
            }
            SaslConfig::ScramSha512 { username, password } => {
                scram(ScramDigest::Sha512, username, password)
            }
            SaslConfig::OAuthBearer { token } => Mechanism::OAuthBearer {
                token: token.clone(),
            },
            SaslConfig::Gssapi { .. } => {
                bail!(ErrorKind::UnsupportedSaslMechanism("GSSAPI".into()))
            }
        };

        Ok(SaslSession { mechanism })
    }

    pub fn initial_response(&self) -> Result<Bytes> {
        match &self.mechanism {
            Mechanism::Plain { username, password } => {
                let mut buf = Vec::with_capacity(username.len() + password.len() + 2);
                buf.push(0);
                buf.extend_from_slice(username.as_bytes());
                buf.push(0);
                buf.extend_from_slice(password.as_bytes());
                Ok(Bytes::from(buf))
            }
            Mechanism::Scram {
                client_first_bare, ..
            } => Ok(Bytes::from(format!("{}{}", GS2_HEADER, client_first_bare))),
            Mechanism::OAuthBearer { token } => Ok(Bytes::from(format!(
                "n,,\x01auth=Bearer {}\x01\x01",
                token
            ))),
        }
    }

    /// Process the server's challenge; `None` means the exchange is done.
    pub fn step(&mut self, challenge: &[u8]) -> Result<Option<Bytes>> {
        match &mut self.mechanism {
            Mechanism::Plain { .. } | Mechanism::OAuthBearer { .. } => Ok(None),
            Mechanism::Scram {
                digest,
                password,
                nonce,
                client_first_bare,
                server_signature,
                ..
            } => {
                if let Some(expected) = server_signature.take() {
                    // server-final: v=<base64 signature>
                    let message = std::str::from_utf8(challenge)
                        .map_err(|_| ErrorKind::SaslError("non-utf8 server-final".into()))?;
                    let verifier = scram_attribute(message, 'v')?;
                    let signature = BASE64
                        .decode(verifier)
                        .map_err(|err| ErrorKind::SaslError(err.to_string()))?;
                    if signature != expected {
                        bail!(ErrorKind::SaslError(
                            "server signature mismatch".into()
                        ));
                    }
                    return Ok(None);
                }

                let server_first = std::str::from_utf8(challenge)
                    .map_err(|_| ErrorKind::SaslError("non-utf8 server-first".into()))?
                    .to_owned();

                let server_nonce = scram_attribute(&server_first, 'r')?;
                if !server_nonce.starts_with(nonce.as_str()) {
                    bail!(ErrorKind::SaslError("server nonce mismatch".into()));
                }
                let salt = BASE64
                    .decode(scram_attribute(&server_first, 's')?)
                    .map_err(|err| ErrorKind::SaslError(err.to_string()))?;
                let iterations: u32 = scram_attribute(&server_first, 'i')?
                    .parse()
                    .map_err(|_| ErrorKind::SaslError("bad iteration count".into()))?;

                let salted_password = digest.hi(password.as_bytes(), &salt, iterations);
                let client_key = digest.hmac(&salted_password, b"Client Key")?;
                let stored_key = digest.hash(&client_key);

                let channel_binding = BASE64.encode(GS2_HEADER);
                let client_final_bare = format!("c={},r={}", channel_binding, server_nonce);
                let auth_message =
                    format!("{},{},{}", client_first_bare, server_first, client_final_bare);

                let client_signature = digest.hmac(&stored_key, auth_message.as_bytes())?;
                let proof: Vec<u8> = client_key
                    .iter()
                    .zip(&client_signature)
                    .map(|(key, signature)| key ^ signature)
                    .collect();

                let server_key = digest.hmac(&salted_password, b"Server Key")?;
                *server_signature = Some(digest.hmac(&server_key, auth_message.as_bytes())?);

                Ok(Some(Bytes::from(format!(
                    "{},p={}",
                    client_final_bare,
                    BASE64.encode(proof)
                ))))
            }
        }
    }
}

fn scram(digest: ScramDigest, username: &str, password: &str) -> Mechanism {
    let nonce: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect();
    let client_first_bare = format!("n={},r={}", saslname(username), nonce);

    Mechanism::Scram {
        digest,
        username: username.to_owned(),
        password: password.to_owned(),
        nonce,
        client_first_bare,
        server_signature: None,
    }
}

/// RFC 5802 escaping of `=` and `,` inside usernames.
fn saslname(name: &str) -> String {
    name.replace('=', "=3D").replace(',', "=2C")
}

fn scram_attribute<'a>(message: &'a str, key: char) -> Result<&'a str> {
    message
        .split(',')
        .find_map(|part| {
            let mut chars = part.chars();
            (chars.next() == Some(key) && chars.next() == Some('=')).then(|| &part[2..])
        })
        .ok_or_else(|| ErrorKind::SaslError(format!("missing `{}=` attribute", key)).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_initial_response() {
        let session = SaslSession::new(&SaslConfig::Plain {
            username: "alice".into(),
            password: "secret".into(),
        })
        .unwrap();

        assert_eq!(
            &session.initial_response().unwrap()[..],
            b"\0alice\0secret"
        );
    }

    #[test]
    fn test_oauth_initial_response() {
        let session = SaslSession::new(&SaslConfig::OAuthBearer {
            token: "tok".into(),
        })
        .unwrap();

        assert_eq!(
            &session.initial_response().unwrap()[..],
            b"n,,\x01auth=Bearer tok\x01\x01"
        );
    }

    #[test]
    fn test_gssapi_unsupported() {
        let err = SaslSession::new(&SaslConfig::Gssapi {
            principal: "kafka/broker".into(),
        })
        .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::UnsupportedSaslMechanism(_)
        ));
    }

    // RFC 7677 test vectors adapted to a full client round: run the client
    // against a scripted server and check it accepts the final signature.
    #[test]
    fn test_scram_sha256_round() {
        let mut session = SaslSession::new(&SaslConfig::ScramSha256 {
            username: "user".into(),
            password: "pencil".into(),
        })
        .unwrap();

        let first = session.initial_response().unwrap();
        let first = std::str::from_utf8(&first).unwrap().to_owned();
        assert!(first.starts_with("n,,n=user,r="));
        let client_nonce = first.rsplit("r=").next().unwrap().to_owned();

        // scripted server side
        let digest = ScramDigest::Sha256;
        let server_nonce = format!("{}serverext", client_nonce);
        let salt = b"salty-salt";
        let iterations = 4096u32;
        let server_first = format!(
            "r={},s={},i={}",
            server_nonce,
            BASE64.encode(salt),
            iterations
        );

        let client_final = session.step(server_first.as_bytes()).unwrap().unwrap();
        let client_final = std::str::from_utf8(&client_final).unwrap().to_owned();
        assert!(client_final.contains(&format!("r={}", server_nonce)));

        // recompute the expected server signature
        let client_first_bare = first.trim_start_matches("n,,");
        let client_final_bare = client_final.rsplit_once(",p=").unwrap().0;
        let auth_message = format!("{},{},{}", client_first_bare, server_first, client_final_bare);
        let salted = digest.hi(b"pencil", salt, iterations);
        let server_key = digest.hmac(&salted, b"Server Key").unwrap();
        let server_signature = digest.hmac(&server_key, auth_message.as_bytes()).unwrap();

        let server_final = format!("v={}", BASE64.encode(server_signature));
        assert!(session.step(server_final.as_bytes()).unwrap().is_none());
    }

    #[test]
    fn test_scram_rejects_bad_server_signature() {
        let mut session = SaslSession::new(&SaslConfig::ScramSha512 {
            username: "user".into(),
            password: "pw".into(),
        })
        .unwrap();

        let first = session.initial_response().unwrap();
        let first = std::str::from_utf8(&first).unwrap().to_owned();
        let client_nonce = first.rsplit("r=").next().unwrap().to_owned();

        let server_first = format!(
            "r={}x,s={},i=4096",
            client_nonce,
            BASE64.encode(b"salt")
        );
        session.step(server_first.as_bytes()).unwrap().unwrap();

        let err = session.step(b"v=Zm9yZ2Vk").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SaslError(_)));
    }

    #[test]
    fn test_saslname_escaping() {
        assert_eq!(saslname("a=b,c"), "a=3Db=2Cc");
    }
}
