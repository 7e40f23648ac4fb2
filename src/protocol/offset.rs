use bytes::{BufMut, BytesMut};
use nom::number::complete::{be_i16, be_i32, be_i64};

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_opt_str, parse_str, parse_tagged_fields, ParseResult, TaggedFields,
    WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{
    ApiKeys, ApiVersion, Encodable, ErrorCode, GenerationId, Offset, PartitionId,
};

/// Offsets committed without an attached leader epoch use this sentinel.
pub const NO_COMMITTED_LEADER_EPOCH: i32 = -1;
/// Brokers apply their own retention when the request carries -1.
const DEFAULT_RETENTION_TIME: i64 = -1;

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
    pub group_instance_id: Option<String>,
    pub topics: Vec<OffsetCommitTopic>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitTopic {
    pub topic_name: String,
    pub partitions: Vec<OffsetCommitPartition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitPartition {
    pub partition: PartitionId,
    pub committed_offset: Offset,
    pub committed_leader_epoch: i32,
    pub metadata: Option<String>,
}

impl Encodable for OffsetCommitRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::OffsetCommit).is_flexible(api_version);

        dst.put_str(flexible, &self.group_id)?;
        dst.put_i32(self.generation_id);
        dst.put_str(flexible, &self.member_id)?;
        if api_version >= 7 {
            dst.put_opt_str(flexible, self.group_instance_id.as_deref())?;
        }
        if (2..=4).contains(&api_version) {
            dst.put_i64(DEFAULT_RETENTION_TIME);
        }
        dst.put_array(flexible, &self.topics, |dst, topic| {
            dst.put_str(flexible, &topic.topic_name)?;
            dst.put_array(flexible, &topic.partitions, |dst, partition| {
                dst.put_i32(partition.partition);
                dst.put_i64(partition.committed_offset);
                if api_version >= 6 {
                    dst.put_i32(partition.committed_leader_epoch);
                }
                dst.put_opt_str(flexible, partition.metadata.as_deref())?;
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
pub struct OffsetCommitResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub topics: Vec<OffsetCommitTopicResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetCommitTopicResponse {
    pub topic_name: String,
    pub partitions: Vec<(PartitionId, ErrorCode)>,
}

pub fn parse_offset_commit_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, OffsetCommitResponse> {
    let flexible = api_spec(ApiKeys::OffsetCommit).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::OffsetCommit, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 3 {
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
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((i, (partition, error_code)))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            OffsetCommitTopicResponse {
                topic_name,
                partitions,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        OffsetCommitResponse {
            header,
            throttle_time_ms,
            topics,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchRequest {
    pub header: RequestHeader,
    pub group_id: String,
    /// `None` fetches every committed offset of the group.
    pub topics: Option<Vec<OffsetFetchTopic>>,
    pub require_stable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchTopic {
    pub topic_name: String,
    pub partitions: Vec<PartitionId>,
}

impl Encodable for OffsetFetchRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::OffsetFetch).is_flexible(api_version);

        dst.put_str(flexible, &self.group_id)?;
        dst.put_nullable_array(flexible, self.topics.as_deref(), |dst, topic| {
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
        if api_version >= 7 {
            dst.put_u8(self.require_stable as u8);
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub topics: Vec<OffsetFetchTopicResponse>,
    pub error_code: ErrorCode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetFetchTopicResponse {
    pub topic_name: String,
    pub partitions: Vec<PartitionCommittedOffset>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionCommittedOffset {
    pub partition: PartitionId,
    pub committed_offset: Offset,
    pub committed_leader_epoch: i32,
    pub metadata: Option<String>,
    pub error_code: ErrorCode,
}

pub fn parse_offset_fetch_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, OffsetFetchResponse> {
    let flexible = api_spec(ApiKeys::OffsetFetch).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::OffsetFetch, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 3 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, topics) = parse_array(i, flexible, |i| {
        let (i, topic_name) = parse_str(i, flexible)?;
        let (i, partitions) = parse_array(i, flexible, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, committed_offset) = be_i64(i)?;
            let (i, committed_leader_epoch) = if api_version >= 5 {
                be_i32(i)?
            } else {
                (i, NO_COMMITTED_LEADER_EPOCH)
            };
            let (i, metadata) = parse_opt_str(i, flexible)?;
            let (i, error_code) = be_i16(i)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                PartitionCommittedOffset {
                    partition,
                    committed_offset,
                    committed_leader_epoch,
                    metadata,
                    error_code,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            OffsetFetchTopicResponse {
                topic_name,
                partitions,
            },
        ))
    })?;
    let (i, error_code) = if api_version >= 2 {
        be_i16(i)?
    } else {
        (i, 0)
    };
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        OffsetFetchResponse {
            header,
            throttle_time_ms,
            topics,
            error_code,
        },
    ))
}

/// Remove committed offsets for partitions the group no longer consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct OffsetDeleteRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub topics: Vec<OffsetFetchTopic>,
}

impl Encodable for OffsetDeleteRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_str(false, &self.group_id)?;
        dst.put_array(false, &self.topics, |dst, topic| {
            dst.put_str(false, &topic.topic_name)?;
            dst.put_array(false, &topic.partitions, |dst, partition| {
                dst.put_i32(*partition);
                Ok(())
            })
        })?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OffsetDeleteResponse {
    pub header: ResponseHeader,
    pub error_code: ErrorCode,
    pub throttle_time_ms: Option<i32>,
    pub topics: Vec<OffsetCommitTopicResponse>,
}

pub fn parse_offset_delete_response(
    i: &[u8],
    _api_version: ApiVersion,
) -> ParseResult<'_, OffsetDeleteResponse> {
    let (i, header) = parse_response_header(i, 0)?;
    // error code leads the throttle on this API
    let (i, error_code) = be_i16(i)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, topics) = parse_array(i, false, |i| {
        let (i, topic_name) = parse_str(i, false)?;
        let (i, partitions) = parse_array(i, false, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, error_code) = be_i16(i)?;
            Ok((i, (partition, error_code)))
        })?;
        Ok((
            i,
            OffsetCommitTopicResponse {
                topic_name,
                partitions,
            },
        ))
    })?;

    Ok((
        i,
        OffsetDeleteResponse {
            header,
            error_code,
            throttle_time_ms: Some(throttle_time_ms),
            topics,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_offset_commit_v2() {
        let req = OffsetCommitRequest {
            header: RequestHeader {
                api_key: ApiKeys::OffsetCommit.key(),
                api_version: 2,
                correlation_id: 1,
                client_id: None,
            },
            group_id: "g".into(),
            generation_id: 5,
            member_id: "m".into(),
            group_instance_id: None,
            topics: vec![OffsetCommitTopic {
                topic_name: "t".into(),
                partitions: vec![OffsetCommitPartition {
                    partition: 0,
                    committed_offset: 10,
                    committed_leader_epoch: NO_COMMITTED_LEADER_EPOCH,
                    metadata: None,
                }],
            }],
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [
                0, 1, b'g', // group
                0, 0, 0, 5, // generation
                0, 1, b'm', // member
                0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, // retention = -1
                0, 0, 0, 1, // 1 topic
                0, 1, b't', // name
                0, 0, 0, 1, // 1 partition
                0, 0, 0, 0, // partition
                0, 0, 0, 0, 0, 0, 0, 10, // offset
                0xff, 0xff, // metadata = null
            ]
        );
    }

    #[test]
    fn test_parse_offset_fetch_response_v1() {
        let data = [
            0, 0, 0, 1, // correlation
            0, 0, 0, 1, // 1 topic
            0, 1, b't', // name
            0, 0, 0, 1, // 1 partition
            0, 0, 0, 2, // partition 2
            0, 0, 0, 0, 0, 0, 0, 42, // committed offset
            0xff, 0xff, // metadata null
            0, 0, // error
        ];

        let (rest, response) = parse_offset_fetch_response(&data, 1).unwrap();
        assert!(rest.is_empty());
        let partition = &response.topics[0].partitions[0];
        assert_eq!(partition.partition, 2);
        assert_eq!(partition.committed_offset, 42);
        assert_eq!(partition.error_code, 0);
    }
}
