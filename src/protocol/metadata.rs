use bytes::{BufMut, BytesMut};
use nom::number::complete::{be_i16, be_i32, be_u8};
use uuid::Uuid;

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_opt_str, parse_str, parse_tagged_fields, parse_uuid, ParseResult,
    TaggedFields, WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{ApiKeys, ApiVersion, Encodable, ErrorCode, NodeId, PartitionId};

/// Metadata request for a set of topics; an empty/null set asks for every
/// topic in the cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct MetadataRequest {
    pub header: RequestHeader,
    /// `None` requests all topics.
    pub topics: Option<Vec<String>>,
    pub allow_auto_topic_creation: bool,
}

impl Encodable for MetadataRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::Metadata).is_flexible(api_version);

        if flexible {
            dst.put_nullable_array(true, self.topics.as_deref(), |dst, topic_name| {
                if api_version >= 10 {
                    dst.put_uuid(Uuid::nil());
                }
                dst.put_opt_str(true, Some(topic_name))?;
                dst.put_tagged_fields(&TaggedFields::default());
                Ok(())
            })?;
        } else {
            dst.put_nullable_array(false, self.topics.as_deref(), |dst, topic_name| {
                dst.put_opt_str(false, Some(topic_name))
            })?;
        }

        if api_version >= 4 {
            dst.put_u8(self.allow_auto_topic_creation as u8);
        }
        if (8..=10).contains(&api_version) {
            dst.put_u8(0); // include_cluster_authorized_operations
        }
        if api_version >= 8 {
            dst.put_u8(0); // include_topic_authorized_operations
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetadataResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub brokers: Vec<BrokerMetadata>,
    pub cluster_id: Option<String>,
    pub controller_id: NodeId,
    pub topics: Vec<TopicMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BrokerMetadata {
    pub node_id: NodeId,
    pub host: String,
    pub port: i32,
    pub rack: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicMetadata {
    pub error_code: ErrorCode,
    pub topic_name: String,
    pub topic_id: Uuid,
    pub is_internal: bool,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionMetadata {
    pub error_code: ErrorCode,
    pub partition_index: PartitionId,
    pub leader_id: NodeId,
    pub leader_epoch: i32,
    pub replicas: Vec<NodeId>,
    pub isr: Vec<NodeId>,
    pub offline_replicas: Vec<NodeId>,
}

pub fn parse_metadata_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, MetadataResponse> {
    let flexible = api_spec(ApiKeys::Metadata).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::Metadata, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 3 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };

    let (i, brokers) = parse_array(i, flexible, |i| {
        let (i, node_id) = be_i32(i)?;
        let (i, host) = parse_str(i, flexible)?;
        let (i, port) = be_i32(i)?;
        let (i, rack) = parse_opt_str(i, flexible)?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            BrokerMetadata {
                node_id,
                host,
                port,
                rack,
            },
        ))
    })?;

    let (i, cluster_id) = if api_version >= 2 {
        parse_opt_str(i, flexible)?
    } else {
        (i, None)
    };
    let (i, controller_id) = be_i32(i)?;

    let (i, topics) = parse_array(i, flexible, |i| {
        let (i, error_code) = be_i16(i)?;
        let (i, topic_name) = parse_str(i, flexible)?;
        let (i, topic_id) = if api_version >= 10 {
            parse_uuid(i)?
        } else {
            (i, Uuid::nil())
        };
        let (i, is_internal) = if api_version >= 1 {
            let (i, b) = be_u8(i)?;
            (i, b != 0)
        } else {
            (i, false)
        };

        let (i, partitions) = parse_array(i, flexible, |i| {
            let (i, error_code) = be_i16(i)?;
            let (i, partition_index) = be_i32(i)?;
            let (i, leader_id) = be_i32(i)?;
            let (i, leader_epoch) = if api_version >= 7 {
                be_i32(i)?
            } else {
                (i, -1)
            };
            let (i, replicas) = parse_array(i, flexible, be_i32)?;
            let (i, isr) = parse_array(i, flexible, be_i32)?;
            let (i, offline_replicas) = if api_version >= 5 {
                parse_array(i, flexible, be_i32)?
            } else {
                (i, Vec::new())
            };
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                PartitionMetadata {
                    error_code,
                    partition_index,
                    leader_id,
                    leader_epoch,
                    replicas,
                    isr,
                    offline_replicas,
                },
            ))
        })?;

        let (i, _topic_authorized_operations) = if api_version >= 8 {
            let (i, ops) = be_i32(i)?;
            (i, Some(ops))
        } else {
            (i, None)
        };
        let (i, _) = parse_tagged_fields(i, flexible)?;

        Ok((
            i,
            TopicMetadata {
                error_code,
                topic_name,
                topic_id,
                is_internal,
                partitions,
            },
        ))
    })?;

    let (i, _cluster_authorized_operations) = if (8..=10).contains(&api_version) {
        let (i, ops) = be_i32(i)?;
        (i, Some(ops))
    } else {
        (i, None)
    };
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        MetadataResponse {
            header,
            throttle_time_ms,
            brokers,
            cluster_id,
            controller_id,
            topics,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metadata_request_v1() {
        let req = MetadataRequest {
            header: RequestHeader {
                api_key: ApiKeys::Metadata.key(),
                api_version: 1,
                correlation_id: 7,
                client_id: None,
            },
            topics: Some(vec!["topic".into()]),
            allow_auto_topic_creation: false,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [
                0, 0, 0, 1, // 1 topic
                0, 5, b't', b'o', b'p', b'i', b'c',
            ]
        );
    }

    #[test]
    fn test_encode_metadata_request_all_topics() {
        let req = MetadataRequest {
            header: RequestHeader {
                api_key: ApiKeys::Metadata.key(),
                api_version: 4,
                correlation_id: 7,
                client_id: None,
            },
            topics: None,
            allow_auto_topic_creation: true,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], [0xff, 0xff, 0xff, 0xff, 1]);
    }

    #[test]
    fn test_parse_metadata_response_v1() {
        let data = [
            0, 0, 0, 7, // correlation_id
            0, 0, 0, 1, // 1 broker
            0, 0, 0, 1, // node_id
            0, 9, b'l', b'o', b'c', b'a', b'l', b'h', b'o', b's', b't', // host
            0, 0, 0x23, 0x84, // port 9092
            0xff, 0xff, // rack = null
            0, 0, 0, 1, // controller_id
            0, 0, 0, 1, // 1 topic
            0, 0, // error_code
            0, 1, b't', // topic name
            0, // not internal
            0, 0, 0, 1, // 1 partition
            0, 0, // partition error_code
            0, 0, 0, 0, // partition index
            0, 0, 0, 1, // leader
            0, 0, 0, 1, // 1 replica
            0, 0, 0, 1, // replica id
            0, 0, 0, 1, // 1 isr
            0, 0, 0, 1, // isr id
        ];

        let (rest, response) = parse_metadata_response(&data, 1).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.controller_id, 1);
        assert_eq!(response.brokers.len(), 1);
        assert_eq!(response.brokers[0].host, "localhost");
        assert_eq!(response.brokers[0].port, 9092);
        assert_eq!(response.brokers[0].rack, None);
        assert_eq!(response.topics.len(), 1);

        let topic = &response.topics[0];
        assert_eq!(topic.topic_name, "t");
        assert_eq!(topic.partitions.len(), 1);
        assert_eq!(topic.partitions[0].leader_id, 1);
        assert_eq!(topic.partitions[0].replicas, vec![1]);
        assert_eq!(topic.partitions[0].leader_epoch, -1);
    }
}
