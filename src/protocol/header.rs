use bytes::{BufMut, BytesMut};

use crate::errors::Result;
use crate::protocol::codec::{parse_tagged_fields, ParseResult, TaggedFields, WriteExt};
use crate::protocol::{ApiKey, ApiVersion, CorrelationId};

/// The header written in front of every request body.
///
/// Header version 1 carries the nullable client id; version 2 additionally
/// carries a tagged-fields block (flexible API versions). Which one applies
/// is a per-API decision made by the registry.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: ApiVersion,
    pub correlation_id: CorrelationId,
    pub client_id: Option<String>,
}

impl RequestHeader {
    pub fn encode(&self, dst: &mut BytesMut, header_version: i16) -> Result<()> {
        dst.put_i16(self.api_key);
        dst.put_i16(self.api_version);
        dst.put_i32(self.correlation_id);
        if header_version >= 1 {
            dst.put_opt_str(false, self.client_id.as_deref())?;
        }
        if header_version >= 2 {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResponseHeader {
    pub correlation_id: CorrelationId,
}

pub fn parse_response_header(i: &[u8], header_version: i16) -> ParseResult<ResponseHeader> {
    let (i, correlation_id) = nom::number::complete::be_i32(i)?;
    // response header v1 tagged fields are opaque to the client
    let (i, _) = parse_tagged_fields(i, header_version >= 1)?;
    Ok((i, ResponseHeader { correlation_id }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ApiKeys;

    #[test]
    fn test_encode_request_header_v1() {
        let header = RequestHeader {
            api_key: ApiKeys::ApiVersions.key(),
            api_version: 0,
            correlation_id: 123,
            client_id: Some("client".into()),
        };

        let mut buf = BytesMut::with_capacity(64);
        header.encode(&mut buf, 1).unwrap();

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
    fn test_encode_request_header_v2_has_tagged_fields() {
        let header = RequestHeader {
            api_key: ApiKeys::Metadata.key(),
            api_version: 9,
            correlation_id: 1,
            client_id: None,
        };

        let mut buf = BytesMut::with_capacity(64);
        header.encode(&mut buf, 2).unwrap();

        assert_eq!(
            &buf[..],
            [
                0, 3, // api_key
                0, 9, // api_version
                0, 0, 0, 1, // correlation_id
                0xff, 0xff, // null client_id
                0,    // empty tagged fields
            ]
        );
    }

    #[test]
    fn test_parse_response_header() {
        let data = [0u8, 0, 0, 123];
        let (rest, header) = parse_response_header(&data, 0).unwrap();
        assert!(rest.is_empty());
        assert_eq!(header.correlation_id, 123);

        let data = [0u8, 0, 0, 42, 0];
        let (rest, header) = parse_response_header(&data, 1).unwrap();
        assert!(rest.is_empty());
        assert_eq!(header.correlation_id, 42);
    }
}
