use bytes::{Bytes, BytesMut};
use nom::number::complete::{be_i16, be_i64};

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_bytes, parse_opt_str, parse_str, parse_tagged_fields, ParseResult,
    TaggedFields, WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{ApiKeys, ApiVersion, Encodable, ErrorCode};

/// SaslHandshake announces the mechanism; the authentication rounds follow
/// as SaslAuthenticate requests (v1+) or raw frames (v0, not supported).
#[derive(Clone, Debug, PartialEq)]
pub struct SaslHandshakeRequest {
    pub header: RequestHeader,
    pub mechanism: String,
}

impl Encodable for SaslHandshakeRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_str(false, &self.mechanism)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SaslHandshakeResponse {
    pub header: ResponseHeader,
    pub error_code: ErrorCode,
    /// The mechanisms enabled on the broker's listener.
    pub mechanisms: Vec<String>,
}

pub fn parse_sasl_handshake_response(
    i: &[u8],
    _api_version: ApiVersion,
) -> ParseResult<'_, SaslHandshakeResponse> {
    let (i, header) = parse_response_header(i, 0)?;
    let (i, error_code) = be_i16(i)?;
    let (i, mechanisms) = parse_array(i, false, |i| parse_str(i, false))?;

    Ok((
        i,
        SaslHandshakeResponse {
            header,
            error_code,
            mechanisms,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct SaslAuthenticateRequest {
    pub header: RequestHeader,
    pub auth_bytes: Bytes,
}

impl Encodable for SaslAuthenticateRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::SaslAuthenticate).is_flexible(api_version);

        dst.put_bytes(flexible, &self.auth_bytes)?;
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SaslAuthenticateResponse {
    pub header: ResponseHeader,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub auth_bytes: Bytes,
    pub session_lifetime_ms: i64,
}

pub fn parse_sasl_authenticate_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, SaslAuthenticateResponse> {
    let flexible = api_spec(ApiKeys::SaslAuthenticate).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::SaslAuthenticate, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, error_code) = be_i16(i)?;
    let (i, error_message) = parse_opt_str(i, flexible)?;
    let (i, auth_bytes) = parse_bytes(i, flexible)?;
    let (i, session_lifetime_ms) = if api_version >= 1 {
        be_i64(i)?
    } else {
        (i, 0)
    };
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        SaslAuthenticateResponse {
            header,
            error_code,
            error_message,
            auth_bytes,
            session_lifetime_ms,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_handshake() {
        let req = SaslHandshakeRequest {
            header: RequestHeader {
                api_key: ApiKeys::SaslHandshake.key(),
                api_version: 1,
                correlation_id: 1,
                client_id: None,
            },
            mechanism: "PLAIN".into(),
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], [0, 5, b'P', b'L', b'A', b'I', b'N']);
    }

    #[test]
    fn test_parse_handshake_response() {
        let data = [
            0, 0, 0, 1, // correlation
            0, 0, // error
            0, 0, 0, 2, // 2 mechanisms
            0, 5, b'P', b'L', b'A', b'I', b'N', // PLAIN
            0, 13, b'S', b'C', b'R', b'A', b'M', b'-', b'S', b'H', b'A', b'-', b'2', b'5', b'6',
        ];

        let (rest, response) = parse_sasl_handshake_response(&data, 1).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.mechanisms, vec!["PLAIN", "SCRAM-SHA-256"]);
    }

    #[test]
    fn test_parse_authenticate_response_v1() {
        let data = [
            0, 0, 0, 1, // correlation
            0, 0, // error
            0xff, 0xff, // error message null
            0, 0, 0, 2, b'o', b'k', // auth bytes
            0, 0, 0, 0, 0, 0, 0x0e, 0x10, // session lifetime 3600
        ];

        let (rest, response) = parse_sasl_authenticate_response(&data, 1).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.auth_bytes, Bytes::from_static(b"ok"));
        assert_eq!(response.session_lifetime_ms, 3600);
    }

    #[test]
    fn test_parse_authenticate_failure() {
        let data = [
            0, 0, 0, 1, // correlation
            0, 58, // SASL_AUTHENTICATION_FAILED
            0, 3, b'b', b'a', b'd', // error message
            0, 0, 0, 0, // empty auth bytes
        ];

        let (_, response) = parse_sasl_authenticate_response(&data, 0).unwrap();
        assert_eq!(response.error_code, 58);
        assert_eq!(response.error_message.as_deref(), Some("bad"));
    }
}
