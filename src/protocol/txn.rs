use bytes::{BufMut, BytesMut};
use nom::number::complete::{be_i16, be_i32, be_i64};

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_opt_str, parse_str, parse_tagged_fields, ParseResult, TaggedFields,
    WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::offset::NO_COMMITTED_LEADER_EPOCH;
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{
    ApiKeys, ApiVersion, Encodable, ErrorCode, GenerationId, Offset, PartitionId, ProducerEpoch,
    ProducerId,
};

/// InitProducerId obtains (or bumps the epoch of) a producer id, the
/// entry point for idempotent and transactional produce.
#[derive(Clone, Debug, PartialEq)]
pub struct InitProducerIdRequest {
    pub header: RequestHeader,
    pub transactional_id: Option<String>,
    pub transaction_timeout_ms: i32,
}

impl Encodable for InitProducerIdRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::InitProducerId).is_flexible(api_version);

        dst.put_opt_str(flexible, self.transactional_id.as_deref())?;
        dst.put_i32(self.transaction_timeout_ms);
        if api_version >= 3 {
            dst.put_i64(-1); // producer_id
            dst.put_i16(-1); // producer_epoch
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InitProducerIdResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
}

pub fn parse_init_producer_id_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, InitProducerIdResponse> {
    let flexible = api_spec(ApiKeys::InitProducerId).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::InitProducerId, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, producer_id) = be_i64(i)?;
    let (i, producer_epoch) = be_i16(i)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        InitProducerIdResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            producer_id,
            producer_epoch,
        },
    ))
}

/// Every partition written during a transaction must be registered with the
/// transaction coordinator before the markers are written.
#[derive(Clone, Debug, PartialEq)]
pub struct AddPartitionsToTxnRequest {
    pub header: RequestHeader,
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub topics: Vec<(String, Vec<PartitionId>)>,
}

impl Encodable for AddPartitionsToTxnRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::AddPartitionsToTxn).is_flexible(api_version);

        dst.put_str(flexible, &self.transactional_id)?;
        dst.put_i64(self.producer_id);
        dst.put_i16(self.producer_epoch);
        dst.put_array(flexible, &self.topics, |dst, (topic_name, partitions)| {
            dst.put_str(flexible, topic_name)?;
            dst.put_array(flexible, partitions, |dst, partition| {
                dst.put_i32(*partition);
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
pub struct AddPartitionsToTxnResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub results: Vec<(String, Vec<(PartitionId, ErrorCode)>)>,
}

pub fn parse_add_partitions_to_txn_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, AddPartitionsToTxnResponse> {
    let flexible = api_spec(ApiKeys::AddPartitionsToTxn).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::AddPartitionsToTxn, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, results) = parse_array(i, flexible, |i| {
        let (i, topic_name) = parse_str(i, flexible)?;
        let (i, partitions) = parse_array(i, flexible, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, error_code) = be_i16(i)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((i, (partition, error_code)))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((i, (topic_name, partitions)))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        AddPartitionsToTxnResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            results,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddOffsetsToTxnRequest {
    pub header: RequestHeader,
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub group_id: String,
}

impl Encodable for AddOffsetsToTxnRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::AddOffsetsToTxn).is_flexible(api_version);

        dst.put_str(flexible, &self.transactional_id)?;
        dst.put_i64(self.producer_id);
        dst.put_i16(self.producer_epoch);
        dst.put_str(flexible, &self.group_id)?;
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddOffsetsToTxnResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
}

pub fn parse_add_offsets_to_txn_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, AddOffsetsToTxnResponse> {
    let flexible = api_spec(ApiKeys::AddOffsetsToTxn).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::AddOffsetsToTxn, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        AddOffsetsToTxnResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
        },
    ))
}

/// EndTxn commits or aborts the open transaction; the decision is carried
/// by `committed`.
#[derive(Clone, Debug, PartialEq)]
pub struct EndTxnRequest {
    pub header: RequestHeader,
    pub transactional_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub committed: bool,
}

impl Encodable for EndTxnRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::EndTxn).is_flexible(api_version);

        dst.put_str(flexible, &self.transactional_id)?;
        dst.put_i64(self.producer_id);
        dst.put_i16(self.producer_epoch);
        dst.put_u8(self.committed as u8);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EndTxnResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
}

pub fn parse_end_txn_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, EndTxnResponse> {
    let flexible = api_spec(ApiKeys::EndTxn).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::EndTxn, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        EndTxnResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
        },
    ))
}

/// Offsets consumed within a transaction are committed through the
/// transaction coordinator so they become visible atomically with it.
#[derive(Clone, Debug, PartialEq)]
pub struct TxnOffsetCommitRequest {
    pub header: RequestHeader,
    pub transactional_id: String,
    pub group_id: String,
    pub producer_id: ProducerId,
    pub producer_epoch: ProducerEpoch,
    pub generation_id: GenerationId,
    pub member_id: String,
    pub topics: Vec<(String, Vec<TxnOffsetCommitPartition>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxnOffsetCommitPartition {
    pub partition: PartitionId,
    pub committed_offset: Offset,
    pub metadata: Option<String>,
}

impl Encodable for TxnOffsetCommitRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::TxnOffsetCommit).is_flexible(api_version);

        dst.put_str(flexible, &self.transactional_id)?;
        dst.put_str(flexible, &self.group_id)?;
        dst.put_i64(self.producer_id);
        dst.put_i16(self.producer_epoch);
        if api_version >= 3 {
            dst.put_i32(self.generation_id);
            dst.put_str(flexible, &self.member_id)?;
            dst.put_opt_str(flexible, None)?; // group_instance_id
        }
        dst.put_array(flexible, &self.topics, |dst, (topic_name, partitions)| {
            dst.put_str(flexible, topic_name)?;
            dst.put_array(flexible, partitions, |dst, partition| {
                dst.put_i32(partition.partition);
                dst.put_i64(partition.committed_offset);
                if api_version >= 2 {
                    dst.put_i32(NO_COMMITTED_LEADER_EPOCH);
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
pub struct TxnOffsetCommitResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub topics: Vec<(String, Vec<(PartitionId, ErrorCode)>)>,
}

pub fn parse_txn_offset_commit_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, TxnOffsetCommitResponse> {
    let flexible = api_spec(ApiKeys::TxnOffsetCommit).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::TxnOffsetCommit, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, topics) = parse_array(i, flexible, |i| {
        let (i, topic_name) = parse_str(i, flexible)?;
        let (i, partitions) = parse_array(i, flexible, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, error_code) = be_i16(i)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((i, (partition, error_code)))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((i, (topic_name, partitions)))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        TxnOffsetCommitResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            topics,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_init_producer_id_v0() {
        let req = InitProducerIdRequest {
            header: RequestHeader {
                api_key: ApiKeys::InitProducerId.key(),
                api_version: 0,
                correlation_id: 1,
                client_id: None,
            },
            transactional_id: Some("txn".into()),
            transaction_timeout_ms: 60000,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [
                0, 3, b't', b'x', b'n', // transactional id
                0, 0, 0xea, 0x60, // timeout 60000
            ]
        );
    }

    #[test]
    fn test_parse_init_producer_id_response() {
        let data = [
            0, 0, 0, 1, // correlation
            0, 0, 0, 0, // throttle
            0, 0, // error
            0, 0, 0, 0, 0, 0, 0x03, 0xe8, // producer id 1000
            0, 5, // epoch
        ];

        let (rest, response) = parse_init_producer_id_response(&data, 0).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.producer_id, 1000);
        assert_eq!(response.producer_epoch, 5);
    }

    #[test]
    fn test_encode_end_txn() {
        let req = EndTxnRequest {
            header: RequestHeader {
                api_key: ApiKeys::EndTxn.key(),
                api_version: 0,
                correlation_id: 1,
                client_id: None,
            },
            transactional_id: "t".into(),
            producer_id: 7,
            producer_epoch: 1,
            committed: true,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [
                0, 1, b't', // transactional id
                0, 0, 0, 0, 0, 0, 0, 7, // producer id
                0, 1, // epoch
                1,    // committed
            ]
        );
    }
}
