use bytes::{BufMut, Bytes, BytesMut};
use nom::number::complete::{be_i16, be_i32, be_i64};

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_nullable_array, parse_opt_str, parse_str, parse_tagged_fields, ParseResult,
    TaggedFields, WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{ApiKeys, ApiVersion, Encodable, ErrorCode, Offset, PartitionId, Timestamp};

/// Produce carries one serialized record batch per partition. The batch
/// bytes are produced by `MutableRecordBatch::build` and written as a
/// nullable-bytes blob.
#[derive(Clone, Debug, PartialEq)]
pub struct ProduceRequest {
    pub header: RequestHeader,
    pub transactional_id: Option<String>,
    pub acks: i16,
    pub timeout_ms: i32,
    pub topics: Vec<TopicProduceData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicProduceData {
    pub topic_name: String,
    pub partitions: Vec<PartitionProduceData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionProduceData {
    pub partition: PartitionId,
    /// A fully built record batch, or `None` for a tombstone entry.
    pub records: Option<Bytes>,
}

impl Encodable for ProduceRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::Produce).is_flexible(api_version);

        dst.put_opt_str(flexible, self.transactional_id.as_deref())?;
        dst.put_i16(self.acks);
        dst.put_i32(self.timeout_ms);
        dst.put_array(flexible, &self.topics, |dst, topic| {
            dst.put_str(flexible, &topic.topic_name)?;
            dst.put_array(flexible, &topic.partitions, |dst, partition| {
                dst.put_i32(partition.partition);
                dst.put_opt_bytes(flexible, partition.records.as_deref())?;
                if flexible {
                    dst.put_tagged_fields(&TaggedFields::default());
                }
                Ok(())
            })?;
            if flexible {
                dst.put_tagged_fields(&TaggedFields::default());
            }
            Ok(())
        })?;
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProduceResponse {
    pub header: ResponseHeader,
    pub topics: Vec<TopicProduceResponse>,
    pub throttle_time_ms: Option<i32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicProduceResponse {
    pub topic_name: String,
    pub partitions: Vec<PartitionProduceResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionProduceResponse {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub base_offset: Offset,
    pub log_append_time: Option<Timestamp>,
    pub log_start_offset: Option<Offset>,
    pub error_message: Option<String>,
}

pub fn parse_produce_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, ProduceResponse> {
    let flexible = api_spec(ApiKeys::Produce).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::Produce, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, topics) = parse_array(i, flexible, |i| {
        let (i, topic_name) = parse_str(i, flexible)?;
        let (i, partitions) = parse_array(i, flexible, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, error_code) = be_i16(i)?;
            let (i, base_offset) = be_i64(i)?;
            let (i, log_append_time) = if api_version >= 2 {
                let (i, time) = be_i64(i)?;
                (i, Some(time))
            } else {
                (i, None)
            };
            let (i, log_start_offset) = if api_version >= 5 {
                let (i, offset) = be_i64(i)?;
                (i, Some(offset))
            } else {
                (i, None)
            };
            let (i, error_message) = if api_version >= 8 {
                let (i, _record_errors) = parse_nullable_array(i, flexible, |i| {
                    let (i, _batch_index) = be_i32(i)?;
                    let (i, _message) = parse_opt_str(i, flexible)?;
                    let (i, _) = parse_tagged_fields(i, flexible)?;
                    Ok((i, ()))
                })?;
                parse_opt_str(i, flexible)?
            } else {
                (i, None)
            };
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                PartitionProduceResponse {
                    partition,
                    error_code,
                    base_offset,
                    log_append_time,
                    log_start_offset,
                    error_message,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            TopicProduceResponse {
                topic_name,
                partitions,
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
        ProduceResponse {
            header,
            topics,
            throttle_time_ms,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_produce_request_v3() {
        let req = ProduceRequest {
            header: RequestHeader {
                api_key: ApiKeys::Produce.key(),
                api_version: 3,
                correlation_id: 1,
                client_id: None,
            },
            transactional_id: None,
            acks: -1,
            timeout_ms: 30000,
            topics: vec![TopicProduceData {
                topic_name: "t".into(),
                partitions: vec![PartitionProduceData {
                    partition: 0,
                    records: Some(Bytes::from_static(b"batch")),
                }],
            }],
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [
                0xff, 0xff, // null transactional_id
                0xff, 0xff, // acks = -1
                0, 0, 0x75, 0x30, // timeout 30000
                0, 0, 0, 1, // 1 topic
                0, 1, b't', // topic name
                0, 0, 0, 1, // 1 partition
                0, 0, 0, 0, // partition 0
                0, 0, 0, 5, b'b', b'a', b't', b'c', b'h', // records
            ]
        );
    }

    #[test]
    fn test_parse_produce_response_v3() {
        let data = [
            0, 0, 0, 1, // correlation_id
            0, 0, 0, 1, // 1 topic
            0, 1, b't', // topic name
            0, 0, 0, 1, // 1 partition
            0, 0, 0, 0, // partition
            0, 0, // error_code
            0, 0, 0, 0, 0, 0, 0, 42, // base_offset
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // log_append_time = -1
            0, 0, 0, 0, // throttle
        ];

        let (rest, response) = parse_produce_response(&data, 3).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.topics.len(), 1);
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.base_offset, 42);
        assert_eq!(partition.log_append_time, Some(-1));
        assert_eq!(partition.error_code, 0);
        assert_eq!(response.throttle_time_ms, Some(0));
    }
}
