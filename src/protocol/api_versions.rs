use bytes::BytesMut;
use nom::number::complete::{be_i16, be_i32};

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_tagged_fields, ParseResult, TaggedFields, WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{ApiKey, ApiKeys, ApiVersion, Encodable, ErrorCode};

#[derive(Clone, Debug, PartialEq)]
pub struct ApiVersionsRequest {
    pub header: RequestHeader,
    /// Name the client reports to the broker, v3+.
    pub client_software_name: String,
    /// Version the client reports to the broker, v3+.
    pub client_software_version: String,
}

impl Encodable for ApiVersionsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::ApiVersions).is_flexible(api_version);

        if api_version >= 3 {
            dst.put_str(flexible, &self.client_software_name)?;
            dst.put_str(flexible, &self.client_software_version)?;
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiVersionsResponse {
    pub header: ResponseHeader,
    /// Error code.
    pub error_code: ErrorCode,
    /// API versions supported by the broker.
    pub api_versions: Vec<SupportedApiVersion>,
    pub throttle_time_ms: Option<i32>,
}

/// An API version range supported by the broker.
#[derive(Clone, Debug, PartialEq)]
pub struct SupportedApiVersion {
    /// API key.
    pub api_key: ApiKey,
    /// Minimum supported version.
    pub min_version: ApiVersion,
    /// Maximum supported version.
    pub max_version: ApiVersion,
}

pub fn parse_api_versions_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, ApiVersionsResponse> {
    let flexible = api_spec(ApiKeys::ApiVersions).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::ApiVersions, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, error_code) = be_i16(i)?;
    let (i, api_versions) = parse_array(i, flexible, |i| {
        let (i, api_key) = be_i16(i)?;
        let (i, min_version) = be_i16(i)?;
        let (i, max_version) = be_i16(i)?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            SupportedApiVersion {
                api_key,
                min_version,
                max_version,
            },
        ))
    })?;
    let (i, throttle_time_ms) = if api_version >= 1 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        ApiVersionsResponse {
            header,
            error_code,
            api_versions,
            throttle_time_ms,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_api_versions_request() {
        let req = ApiVersionsRequest {
            header: RequestHeader {
                api_key: ApiKeys::ApiVersions.key(),
                api_version: 0,
                correlation_id: 123,
                client_id: Some("client".into()),
            },
            client_software_name: String::new(),
            client_software_version: String::new(),
        };

        let mut buf = BytesMut::with_capacity(128);
        req.header.encode(&mut buf, 1).unwrap();
        req.encode(&mut buf).unwrap();

        assert_eq!(
            &buf[..],
            [
                0, 18, // api_key
                0, 0, // api_version
                0, 0, 0, 123, // correlation_id
                0, 6, 99, 108, 105, 101, 110, 116, // client_id
            ]
        );
    }

    #[test]
    fn test_encode_api_versions_request_v3() {
        let req = ApiVersionsRequest {
            header: RequestHeader {
                api_key: ApiKeys::ApiVersions.key(),
                api_version: 3,
                correlation_id: 1,
                client_id: None,
            },
            client_software_name: "franz".into(),
            client_software_version: "0.1.0".into(),
        };

        let mut buf = BytesMut::with_capacity(128);
        req.encode(&mut buf).unwrap();

        assert_eq!(
            &buf[..],
            [
                6, b'f', b'r', b'a', b'n', b'z', // compact client_software_name
                6, b'0', b'.', b'1', b'.', b'0', // compact client_software_version
                0,    // tagged fields
            ]
        );
    }

    #[test]
    fn test_parse_api_versions_response() {
        let data = [
            0, 0, 0, 123, // correlation_id
            0, 0, // error_code
            0, 0, 0, 1, // api_versions: 1 element
            0, 1, // api_key
            0, 2, // min_version
            0, 3, // max_version
        ];

        let (rest, response) = parse_api_versions_response(&data, 0).unwrap();
        assert!(rest.is_empty());
        assert_eq!(
            response,
            ApiVersionsResponse {
                header: ResponseHeader { correlation_id: 123 },
                error_code: 0,
                api_versions: vec![SupportedApiVersion {
                    api_key: 1,
                    min_version: 2,
                    max_version: 3,
                }],
                throttle_time_ms: None,
            }
        );
    }

    #[test]
    fn test_parse_api_versions_response_v3() {
        let data = [
            0, 0, 0, 42, // correlation_id (v0 response header, ApiVersions quirk)
            0, 0, // error_code
            2,    // compact array: 1 element
            0, 18, // api_key
            0, 0, // min_version
            0, 3, // max_version
            0, // element tagged fields
            0, 0, 0, 0, // throttle_time_ms
            0, // tagged fields
        ];

        let (rest, response) = parse_api_versions_response(&data, 3).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.header.correlation_id, 42);
        assert_eq!(response.api_versions.len(), 1);
        assert_eq!(response.throttle_time_ms, Some(0));
    }
}
