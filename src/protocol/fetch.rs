use bytes::{BufMut, Bytes, BytesMut};
use nom::number::complete::{be_i16, be_i32, be_i64};

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_nullable_array, parse_opt_bytes, parse_str, parse_tagged_fields,
    ParseResult, TaggedFields, WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{
    ApiKeys, ApiVersion, Encodable, ErrorCode, Offset, PartitionId, ProducerId, SessionId,
    Timestamp,
};

pub const CONSUMER_REPLICA_ID: i32 = -1;
/// Session sentinels for the incremental fetch protocol.
pub const INVALID_SESSION_ID: SessionId = 0;
pub const INITIAL_SESSION_EPOCH: i32 = 0;
pub const FINAL_SESSION_EPOCH: i32 = -1;

#[derive(Clone, Debug, PartialEq)]
pub struct FetchRequest {
    pub header: RequestHeader,
    /// The maximum amount of time in milliseconds to block waiting if
    /// insufficient data is available at the time the request is issued.
    pub max_wait_ms: i32,
    /// This is the minimum number of bytes of messages that must be
    /// available to give a response.
    pub min_bytes: i32,
    pub max_bytes: i32,
    pub isolation_level: i8,
    pub session_id: SessionId,
    pub session_epoch: i32,
    pub topics: Vec<FetchTopic>,
    /// Partitions to drop from the incremental fetch session, v7+.
    pub forgotten_topics: Vec<ForgottenTopic>,
    pub rack_id: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchTopic {
    pub topic_name: String,
    pub partitions: Vec<FetchPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchPartition {
    pub partition: PartitionId,
    pub current_leader_epoch: i32,
    /// The offset to begin this fetch from.
    pub fetch_offset: Offset,
    pub log_start_offset: Offset,
    /// The maximum bytes to include in the message set for this partition.
    pub partition_max_bytes: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForgottenTopic {
    pub topic_name: String,
    pub partitions: Vec<PartitionId>,
}

impl Encodable for FetchRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::Fetch).is_flexible(api_version);

        dst.put_i32(CONSUMER_REPLICA_ID);
        dst.put_i32(self.max_wait_ms);
        dst.put_i32(self.min_bytes);
        dst.put_i32(self.max_bytes);
        dst.put_i8(self.isolation_level);
        if api_version >= 7 {
            dst.put_i32(self.session_id);
            dst.put_i32(self.session_epoch);
        }
        dst.put_array(flexible, &self.topics, |dst, topic| {
            dst.put_str(flexible, &topic.topic_name)?;
            dst.put_array(flexible, &topic.partitions, |dst, partition| {
                dst.put_i32(partition.partition);
                if api_version >= 9 {
                    dst.put_i32(partition.current_leader_epoch);
                }
                dst.put_i64(partition.fetch_offset);
                if api_version >= 12 {
                    dst.put_i32(-1); // last_fetched_epoch
                }
                if api_version >= 5 {
                    dst.put_i64(partition.log_start_offset);
                }
                dst.put_i32(partition.partition_max_bytes);
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
        if api_version >= 7 {
            dst.put_array(flexible, &self.forgotten_topics, |dst, topic| {
                dst.put_str(flexible, &topic.topic_name)?;
                dst.put_array(flexible, &topic.partitions, |dst, partition| {
                    dst.put_i32(*partition);
                    Ok(())
                })?;
                if flexible {
                    dst.put_tagged_fields(&TaggedFields::default());
                }
                Ok(())
            })?;
        }
        if api_version >= 11 {
            dst.put_str(flexible, &self.rack_id)?;
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub session_id: SessionId,
    pub topics: Vec<FetchableTopicResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchableTopicResponse {
    pub topic_name: String,
    pub partitions: Vec<FetchablePartitionResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchablePartitionResponse {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub high_watermark: Offset,
    pub last_stable_offset: Offset,
    pub log_start_offset: Offset,
    pub aborted_transactions: Vec<AbortedTransaction>,
    pub preferred_read_replica: i32,
    /// Raw record batches, parsed lazily by the fetcher.
    pub records: Option<Bytes>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AbortedTransaction {
    pub producer_id: ProducerId,
    pub first_offset: Offset,
}

pub fn parse_fetch_response(i: &[u8], api_version: ApiVersion) -> ParseResult<'_, FetchResponse> {
    let flexible = api_spec(ApiKeys::Fetch).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::Fetch, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    };
    let (i, error_code, session_id) = if api_version >= 7 {
        let (i, error_code) = be_i16(i)?;
        let (i, session_id) = be_i32(i)?;
        (i, error_code, session_id)
    } else {
        (i, 0, INVALID_SESSION_ID)
    };

    let (i, topics) = parse_array(i, flexible, |i| {
        let (i, topic_name) = parse_str(i, flexible)?;
        let (i, partitions) = parse_array(i, flexible, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, error_code) = be_i16(i)?;
            let (i, high_watermark) = be_i64(i)?;
            let (i, last_stable_offset) = be_i64(i)?;
            let (i, log_start_offset) = if api_version >= 5 {
                be_i64(i)?
            } else {
                (i, -1)
            };
            let (i, aborted) = parse_nullable_array(i, flexible, |i| {
                let (i, producer_id) = be_i64(i)?;
                let (i, first_offset) = be_i64(i)?;
                let (i, _) = parse_tagged_fields(i, flexible)?;
                Ok((
                    i,
                    AbortedTransaction {
                        producer_id,
                        first_offset,
                    },
                ))
            })?;
            let (i, preferred_read_replica) = if api_version >= 11 {
                be_i32(i)?
            } else {
                (i, -1)
            };
            let (i, records) = parse_opt_bytes(i, flexible)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                FetchablePartitionResponse {
                    partition,
                    error_code,
                    high_watermark,
                    last_stable_offset,
                    log_start_offset,
                    aborted_transactions: aborted.unwrap_or_default(),
                    preferred_read_replica,
                    records,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            FetchableTopicResponse {
                topic_name,
                partitions,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        FetchResponse {
            header,
            throttle_time_ms,
            error_code,
            session_id,
            topics,
        },
    ))
}

/// ListOffsets resolves a timestamp (or the earliest/latest sentinel) to an
/// offset per partition.
#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsRequest {
    pub header: RequestHeader,
    pub isolation_level: i8,
    pub topics: Vec<ListOffsetsTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsTopic {
    pub topic_name: String,
    pub partitions: Vec<ListOffsetsPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsPartition {
    pub partition: PartitionId,
    pub current_leader_epoch: i32,
    pub timestamp: Timestamp,
}

impl Encodable for ListOffsetsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::ListOffsets).is_flexible(api_version);

        dst.put_i32(CONSUMER_REPLICA_ID);
        if api_version >= 2 {
            dst.put_i8(self.isolation_level);
        }
        dst.put_array(flexible, &self.topics, |dst, topic| {
            dst.put_str(flexible, &topic.topic_name)?;
            dst.put_array(flexible, &topic.partitions, |dst, partition| {
                dst.put_i32(partition.partition);
                if api_version >= 4 {
                    dst.put_i32(partition.current_leader_epoch);
                }
                dst.put_i64(partition.timestamp);
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
pub struct ListOffsetsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub topics: Vec<ListOffsetsTopicResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListOffsetsTopicResponse {
    pub topic_name: String,
    pub partitions: Vec<PartitionOffsetData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionOffsetData {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub timestamp: Timestamp,
    pub offset: Offset,
    pub leader_epoch: i32,
}

pub fn parse_list_offsets_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, ListOffsetsResponse> {
    let flexible = api_spec(ApiKeys::ListOffsets).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::ListOffsets, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 2 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, topics) = parse_array(i, flexible, |i| {
        let (i, topic_name) = parse_str(i, flexible)?;
        let (i, partitions) = parse_array(i, flexible, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, error_code) = be_i16(i)?;
            let (i, timestamp) = be_i64(i)?;
            let (i, offset) = be_i64(i)?;
            let (i, leader_epoch) = if api_version >= 4 {
                be_i32(i)?
            } else {
                (i, -1)
            };
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                PartitionOffsetData {
                    partition,
                    error_code,
                    timestamp,
                    offset,
                    leader_epoch,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            ListOffsetsTopicResponse {
                topic_name,
                partitions,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        ListOffsetsResponse {
            header,
            throttle_time_ms,
            topics,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::IsolationLevel;

    #[test]
    fn test_encode_fetch_request_v4() {
        let req = FetchRequest {
            header: RequestHeader {
                api_key: ApiKeys::Fetch.key(),
                api_version: 4,
                correlation_id: 1,
                client_id: None,
            },
            max_wait_ms: 500,
            min_bytes: 1,
            max_bytes: 1024 * 1024,
            isolation_level: IsolationLevel::ReadUncommitted as i8,
            session_id: INVALID_SESSION_ID,
            session_epoch: INITIAL_SESSION_EPOCH,
            topics: vec![FetchTopic {
                topic_name: "t".into(),
                partitions: vec![FetchPartition {
                    partition: 0,
                    current_leader_epoch: -1,
                    fetch_offset: 5,
                    log_start_offset: -1,
                    partition_max_bytes: 65536,
                }],
            }],
            forgotten_topics: Vec::new(),
            rack_id: String::new(),
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [
                0xff, 0xff, 0xff, 0xff, // replica_id = -1
                0, 0, 0x01, 0xf4, // max_wait 500
                0, 0, 0, 1, // min_bytes
                0, 0x10, 0, 0, // max_bytes 1 MiB
                0, // isolation_level
                0, 0, 0, 1, // 1 topic
                0, 1, b't', // topic name
                0, 0, 0, 1, // 1 partition
                0, 0, 0, 0, // partition 0
                0, 0, 0, 0, 0, 0, 0, 5, // fetch_offset
                0, 0, 1, 0, // partition_max_bytes 65536
            ]
        );
    }

    #[test]
    fn test_parse_fetch_response_v4() {
        let data = [
            0, 0, 0, 1, // correlation_id
            0, 0, 0, 0, // throttle
            0, 0, 0, 1, // 1 topic
            0, 1, b't', // topic
            0, 0, 0, 1, // 1 partition
            0, 0, 0, 0, // partition
            0, 0, // error_code
            0, 0, 0, 0, 0, 0, 0, 9, // high watermark
            0, 0, 0, 0, 0, 0, 0, 9, // last stable offset
            0xff, 0xff, 0xff, 0xff, // aborted transactions = null
            0xff, 0xff, 0xff, 0xff, // records = null
        ];

        let (rest, response) = parse_fetch_response(&data, 4).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.session_id, INVALID_SESSION_ID);
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.high_watermark, 9);
        assert_eq!(partition.records, None);
        assert!(partition.aborted_transactions.is_empty());
    }

    #[test]
    fn test_list_offsets_round_shapes() {
        let req = ListOffsetsRequest {
            header: RequestHeader {
                api_key: ApiKeys::ListOffsets.key(),
                api_version: 1,
                correlation_id: 3,
                client_id: None,
            },
            isolation_level: 0,
            topics: vec![ListOffsetsTopic {
                topic_name: "t".into(),
                partitions: vec![ListOffsetsPartition {
                    partition: 1,
                    current_leader_epoch: -1,
                    timestamp: -2,
                }],
            }],
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [
                0xff, 0xff, 0xff, 0xff, // replica_id
                0, 0, 0, 1, // 1 topic
                0, 1, b't', // name
                0, 0, 0, 1, // 1 partition
                0, 0, 0, 1, // partition 1
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe, // timestamp -2
            ]
        );

        let data = [
            0, 0, 0, 3, // correlation_id
            0, 0, 0, 1, // 1 topic
            0, 1, b't', // name
            0, 0, 0, 1, // 1 partition
            0, 0, 0, 1, // partition
            0, 0, // error
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // timestamp
            0, 0, 0, 0, 0, 0, 0, 7, // offset
        ];
        let (rest, response) = parse_list_offsets_response(&data, 1).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.topics[0].partitions[0].offset, 7);
    }
}
