use bytes::{BufMut, Bytes, BytesMut};
use nom::number::complete::{be_i16, be_i32};

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_bytes, parse_opt_str, parse_str, parse_tagged_fields, ParseResult,
    TaggedFields, WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{
    ApiKeys, ApiVersion, CoordinatorType, Encodable, ErrorCode, GenerationId, NodeId,
};

/// FindCoordinator locates the broker owning a consumer group or a
/// transactional id.
#[derive(Clone, Debug, PartialEq)]
pub struct FindCoordinatorRequest {
    pub header: RequestHeader,
    pub key: String,
    pub key_type: CoordinatorType,
}

impl Encodable for FindCoordinatorRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::FindCoordinator).is_flexible(api_version);

        dst.put_str(flexible, &self.key)?;
        if api_version >= 1 {
            dst.put_i8(self.key_type as i8);
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FindCoordinatorResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub node_id: NodeId,
    pub host: String,
    pub port: i32,
}

pub fn parse_find_coordinator_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, FindCoordinatorResponse> {
    let flexible = api_spec(ApiKeys::FindCoordinator).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::FindCoordinator, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 1 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, error_code) = be_i16(i)?;
    let (i, error_message) = if api_version >= 1 {
        parse_opt_str(i, flexible)?
    } else {
        (i, None)
    };
    let (i, node_id) = be_i32(i)?;
    let (i, host) = parse_str(i, flexible)?;
    let (i, port) = be_i32(i)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        FindCoordinatorResponse {
            header,
            throttle_time_ms,
            error_code,
            error_message,
            node_id,
            host,
            port,
        },
    ))
}

/// One candidate protocol (assignor name + serialized subscription) offered
/// on JoinGroup.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupProtocol {
    pub protocol_name: String,
    pub protocol_metadata: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub session_timeout_ms: i32,
    pub rebalance_timeout_ms: i32,
    pub member_id: String,
    pub group_instance_id: Option<String>,
    pub protocol_type: String,
    pub protocols: Vec<JoinGroupProtocol>,
}

impl Encodable for JoinGroupRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::JoinGroup).is_flexible(api_version);

        dst.put_str(flexible, &self.group_id)?;
        dst.put_i32(self.session_timeout_ms);
        dst.put_i32(self.rebalance_timeout_ms);
        dst.put_str(flexible, &self.member_id)?;
        if api_version >= 5 {
            dst.put_opt_str(flexible, self.group_instance_id.as_deref())?;
        }
        dst.put_str(flexible, &self.protocol_type)?;
        dst.put_array(flexible, &self.protocols, |dst, protocol| {
            dst.put_str(flexible, &protocol.protocol_name)?;
            dst.put_opt_bytes(flexible, Some(&protocol.protocol_metadata))?;
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

/// The member list is only populated for the elected leader.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupMember {
    pub member_id: String,
    pub group_instance_id: Option<String>,
    pub member_metadata: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinGroupResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub generation_id: GenerationId,
    pub protocol_name: Option<String>,
    pub leader_id: String,
    pub member_id: String,
    pub members: Vec<JoinGroupMember>,
}

pub fn parse_join_group_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, JoinGroupResponse> {
    let flexible = api_spec(ApiKeys::JoinGroup).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::JoinGroup, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 2 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, error_code) = be_i16(i)?;
    let (i, generation_id) = be_i32(i)?;
    let (i, _protocol_type) = if api_version >= 7 {
        parse_opt_str(i, flexible)?
    } else {
        (i, None)
    };
    let (i, protocol_name) = if api_version >= 7 {
        parse_opt_str(i, flexible)?
    } else {
        let (i, name) = parse_str(i, flexible)?;
        (i, Some(name))
    };
    let (i, leader_id) = parse_str(i, flexible)?;
    let (i, member_id) = parse_str(i, flexible)?;
    let (i, members) = parse_array(i, flexible, |i| {
        let (i, member_id) = parse_str(i, flexible)?;
        let (i, group_instance_id) = if api_version >= 5 {
            parse_opt_str(i, flexible)?
        } else {
            (i, None)
        };
        let (i, member_metadata) = parse_bytes(i, flexible)?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            JoinGroupMember {
                member_id,
                group_instance_id,
                member_metadata,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        JoinGroupResponse {
            header,
            throttle_time_ms,
            error_code,
            generation_id,
            protocol_name,
            leader_id,
            member_id,
            members,
        },
    ))
}

/// The leader ships one serialized assignment per member on SyncGroup.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncGroupAssignment {
    pub member_id: String,
    pub assignment: Bytes,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncGroupRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
    pub group_instance_id: Option<String>,
    pub assignments: Vec<SyncGroupAssignment>,
}

impl Encodable for SyncGroupRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::SyncGroup).is_flexible(api_version);

        dst.put_str(flexible, &self.group_id)?;
        dst.put_i32(self.generation_id);
        dst.put_str(flexible, &self.member_id)?;
        if api_version >= 3 {
            dst.put_opt_str(flexible, self.group_instance_id.as_deref())?;
        }
        if api_version >= 5 {
            dst.put_opt_str(flexible, None)?; // protocol_type
            dst.put_opt_str(flexible, None)?; // protocol_name
        }
        dst.put_array(flexible, &self.assignments, |dst, assignment| {
            dst.put_str(flexible, &assignment.member_id)?;
            dst.put_opt_bytes(flexible, Some(&assignment.assignment))?;
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
pub struct SyncGroupResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    /// The serialized assignment the coordinator stored for this member.
    pub assignment: Bytes,
}

pub fn parse_sync_group_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, SyncGroupResponse> {
    let flexible = api_spec(ApiKeys::SyncGroup).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::SyncGroup, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 1 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, error_code) = be_i16(i)?;
    let (i, _protocol) = if api_version >= 5 {
        let (i, protocol_type) = parse_opt_str(i, flexible)?;
        let (i, protocol_name) = parse_opt_str(i, flexible)?;
        (i, (protocol_type, protocol_name))
    } else {
        (i, (None, None))
    };
    let (i, assignment) = parse_bytes(i, flexible)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        SyncGroupResponse {
            header,
            throttle_time_ms,
            error_code,
            assignment,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatRequest {
    pub header: RequestHeader,
    pub group_id: String,
    pub generation_id: GenerationId,
    pub member_id: String,
    pub group_instance_id: Option<String>,
}

impl Encodable for HeartbeatRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::Heartbeat).is_flexible(api_version);

        dst.put_str(flexible, &self.group_id)?;
        dst.put_i32(self.generation_id);
        dst.put_str(flexible, &self.member_id)?;
        if api_version >= 3 {
            dst.put_opt_str(flexible, self.group_instance_id.as_deref())?;
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeartbeatResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
}

pub fn parse_heartbeat_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, HeartbeatResponse> {
    let flexible = api_spec(ApiKeys::Heartbeat).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::Heartbeat, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 1 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, error_code) = be_i16(i)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        HeartbeatResponse {
            header,
            throttle_time_ms,
            error_code,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberIdentity {
    pub member_id: String,
    pub group_instance_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaveGroupRequest {
    pub header: RequestHeader,
    pub group_id: String,
    /// v0-2 take a single member; v3+ a batch.
    pub members: Vec<MemberIdentity>,
}

impl Encodable for LeaveGroupRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::LeaveGroup).is_flexible(api_version);

        dst.put_str(flexible, &self.group_id)?;
        if api_version >= 3 {
            dst.put_array(flexible, &self.members, |dst, member| {
                dst.put_str(flexible, &member.member_id)?;
                dst.put_opt_str(flexible, member.group_instance_id.as_deref())?;
                if flexible {
                    dst.put_tagged_fields(&TaggedFields::default());
                }
                Ok(())
            })?;
        } else {
            let member_id = self
                .members
                .first()
                .map(|member| member.member_id.as_str())
                .unwrap_or_default();
            dst.put_str(flexible, member_id)?;
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeaveGroupResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
}

pub fn parse_leave_group_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, LeaveGroupResponse> {
    let flexible = api_spec(ApiKeys::LeaveGroup).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::LeaveGroup, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 1 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, error_code) = be_i16(i)?;
    let (i, _members) = if api_version >= 3 {
        parse_array(i, flexible, |i| {
            let (i, member_id) = parse_str(i, flexible)?;
            let (i, group_instance_id) = parse_opt_str(i, flexible)?;
            let (i, _error_code) = be_i16(i)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                MemberIdentity {
                    member_id,
                    group_instance_id,
                },
            ))
        })?
    } else {
        (i, Vec::new())
    };
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        LeaveGroupResponse {
            header,
            throttle_time_ms,
            error_code,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_find_coordinator() {
        let req = FindCoordinatorRequest {
            header: RequestHeader {
                api_key: ApiKeys::FindCoordinator.key(),
                api_version: 1,
                correlation_id: 9,
                client_id: None,
            },
            key: "g".into(),
            key_type: CoordinatorType::Group,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], [0, 1, b'g', 0]);
    }

    #[test]
    fn test_parse_find_coordinator_response_v1() {
        let data = [
            0, 0, 0, 9, // correlation_id
            0, 0, 0, 0, // throttle
            0, 0, // error_code
            0xff, 0xff, // error_message = null
            0, 0, 0, 2, // node_id
            0, 4, b'k', b'a', b'f', b'k', // host
            0, 0, 0x23, 0x84, // port
        ];

        let (rest, response) = parse_find_coordinator_response(&data, 1).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.node_id, 2);
        assert_eq!(response.host, "kafk");
        assert_eq!(response.port, 9092);
    }

    #[test]
    fn test_encode_join_group_v2() {
        let req = JoinGroupRequest {
            header: RequestHeader {
                api_key: ApiKeys::JoinGroup.key(),
                api_version: 2,
                correlation_id: 1,
                client_id: None,
            },
            group_id: "g".into(),
            session_timeout_ms: 10000,
            rebalance_timeout_ms: 30000,
            member_id: String::new(),
            group_instance_id: None,
            protocol_type: "consumer".into(),
            protocols: vec![JoinGroupProtocol {
                protocol_name: "roundrobin".into(),
                protocol_metadata: Bytes::from_static(b"meta"),
            }],
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0, 1, b'g']);
        expected.extend_from_slice(&10000i32.to_be_bytes());
        expected.extend_from_slice(&30000i32.to_be_bytes());
        expected.extend_from_slice(&[0, 0]); // empty member id
        expected.extend_from_slice(&[0, 8]);
        expected.extend_from_slice(b"consumer");
        expected.extend_from_slice(&[0, 0, 0, 1]);
        expected.extend_from_slice(&[0, 10]);
        expected.extend_from_slice(b"roundrobin");
        expected.extend_from_slice(&[0, 0, 0, 4]);
        expected.extend_from_slice(b"meta");
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_parse_join_group_response_v2() {
        let mut data = Vec::new();
        data.extend_from_slice(&[0, 0, 0, 1]); // correlation
        data.extend_from_slice(&[0, 0, 0, 0]); // throttle
        data.extend_from_slice(&[0, 0]); // error
        data.extend_from_slice(&[0, 0, 0, 5]); // generation
        data.extend_from_slice(&[0, 10]);
        data.extend_from_slice(b"roundrobin");
        data.extend_from_slice(&[0, 2, b'm', b'1']); // leader
        data.extend_from_slice(&[0, 2, b'm', b'1']); // member
        data.extend_from_slice(&[0, 0, 0, 1]); // members
        data.extend_from_slice(&[0, 2, b'm', b'1']);
        data.extend_from_slice(&[0, 0, 0, 4]);
        data.extend_from_slice(b"meta");

        let (rest, response) = parse_join_group_response(&data, 2).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.generation_id, 5);
        assert_eq!(response.protocol_name.as_deref(), Some("roundrobin"));
        assert_eq!(response.leader_id, response.member_id);
        assert_eq!(response.members.len(), 1);
        assert_eq!(response.members[0].member_metadata, Bytes::from_static(b"meta"));
    }

    #[test]
    fn test_heartbeat_round_shapes() {
        let req = HeartbeatRequest {
            header: RequestHeader {
                api_key: ApiKeys::Heartbeat.key(),
                api_version: 0,
                correlation_id: 2,
                client_id: None,
            },
            group_id: "g".into(),
            generation_id: 5,
            member_id: "m".into(),
            group_instance_id: None,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], [0, 1, b'g', 0, 0, 0, 5, 0, 1, b'm']);

        let data = [0u8, 0, 0, 2, 0, 27]; // REBALANCE_IN_PROGRESS
        let (_, response) = parse_heartbeat_response(&data, 0).unwrap();
        assert_eq!(response.error_code, 27);
    }
}
