//! Request/response schemas for the administrative APIs: topic DDL, group
//! management, configs, quotas, log dirs, SCRAM credentials, delegation
//! tokens, reassignments and feature updates.

use bytes::{BufMut, Bytes, BytesMut};
use nom::number::complete::{be_f64, be_i16, be_i32, be_i64, be_i8, be_u8};
use uuid::Uuid;

use crate::errors::Result;
use crate::protocol::codec::{
    parse_array, parse_bytes, parse_nullable_array, parse_opt_str, parse_str, parse_tagged_fields,
    parse_uuid, ParseResult, TaggedFields, WriteExt,
};
use crate::protocol::header::{parse_response_header, RequestHeader, ResponseHeader};
use crate::protocol::registry::{api_spec, response_header_version};
use crate::protocol::{
    ApiKeys, ApiVersion, Encodable, ErrorCode, NodeId, Offset, PartitionId, ProducerId, Timestamp,
};

/// Resource addressed by config APIs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i8)]
pub enum ConfigResourceType {
    Unknown = 0,
    Any = 1,
    Topic = 2,
    Broker = 4,
    BrokerLogger = 8,
}

impl From<i8> for ConfigResourceType {
    fn from(v: i8) -> Self {
        match v {
            1 => ConfigResourceType::Any,
            2 => ConfigResourceType::Topic,
            4 => ConfigResourceType::Broker,
            8 => ConfigResourceType::BrokerLogger,
            _ => ConfigResourceType::Unknown,
        }
    }
}

/// Incremental config mutation kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i8)]
pub enum ConfigOperation {
    Set = 0,
    Delete = 1,
    Append = 2,
    Subtract = 3,
}

// ---------------------------------------------------------------- CreateTopics

#[derive(Clone, Debug, PartialEq)]
pub struct CreateTopicsRequest {
    pub header: RequestHeader,
    pub topics: Vec<CreatableTopic>,
    pub timeout_ms: i32,
    pub validate_only: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreatableTopic {
    pub name: String,
    /// -1 lets the broker apply its default.
    pub num_partitions: i32,
    /// -1 lets the broker apply its default.
    pub replication_factor: i16,
    /// Manual replica assignment; mutually exclusive with the counts above.
    pub assignments: Vec<(PartitionId, Vec<NodeId>)>,
    pub configs: Vec<(String, Option<String>)>,
}

impl Encodable for CreateTopicsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::CreateTopics).is_flexible(api_version);

        dst.put_array(flexible, &self.topics, |dst, topic| {
            dst.put_str(flexible, &topic.name)?;
            dst.put_i32(topic.num_partitions);
            dst.put_i16(topic.replication_factor);
            dst.put_array(flexible, &topic.assignments, |dst, (partition, brokers)| {
                dst.put_i32(*partition);
                dst.put_array(flexible, brokers, |dst, broker| {
                    dst.put_i32(*broker);
                    Ok(())
                })?;
                if flexible {
                    dst.put_tagged_fields(&TaggedFields::default());
                }
                Ok(())
            })?;
            dst.put_array(flexible, &topic.configs, |dst, (name, value)| {
                dst.put_str(flexible, name)?;
                dst.put_opt_str(flexible, value.as_deref())?;
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
        dst.put_i32(self.timeout_ms);
        dst.put_u8(self.validate_only as u8);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateTopicsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub topics: Vec<CreatableTopicResult>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreatableTopicResult {
    pub name: String,
    pub topic_id: Uuid,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub num_partitions: i32,
    pub replication_factor: i16,
    pub configs: Vec<CreatableTopicConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreatableTopicConfig {
    pub name: String,
    pub value: Option<String>,
    pub read_only: bool,
    pub is_sensitive: bool,
}

pub fn parse_create_topics_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, CreateTopicsResponse> {
    let flexible = api_spec(ApiKeys::CreateTopics).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::CreateTopics, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, topics) = parse_array(i, flexible, |i| {
        let (i, name) = parse_str(i, flexible)?;
        let (i, topic_id) = if api_version >= 7 {
            parse_uuid(i)?
        } else {
            (i, Uuid::nil())
        };
        let (i, error_code) = be_i16(i)?;
        let (i, error_message) = parse_opt_str(i, flexible)?;
        let (i, num_partitions, replication_factor, configs) = if api_version >= 5 {
            let (i, num_partitions) = be_i32(i)?;
            let (i, replication_factor) = be_i16(i)?;
            let (i, configs) = parse_nullable_array(i, flexible, |i| {
                let (i, name) = parse_str(i, flexible)?;
                let (i, value) = parse_opt_str(i, flexible)?;
                let (i, read_only) = be_u8(i)?;
                let (i, _config_source) = be_i8(i)?;
                let (i, is_sensitive) = be_u8(i)?;
                let (i, _) = parse_tagged_fields(i, flexible)?;
                Ok((
                    i,
                    CreatableTopicConfig {
                        name,
                        value,
                        read_only: read_only != 0,
                        is_sensitive: is_sensitive != 0,
                    },
                ))
            })?;
            (i, num_partitions, replication_factor, configs.unwrap_or_default())
        } else {
            (i, -1, -1, Vec::new())
        };
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            CreatableTopicResult {
                name,
                topic_id,
                error_code,
                error_message,
                num_partitions,
                replication_factor,
                configs,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        CreateTopicsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            topics,
        },
    ))
}

// ---------------------------------------------------------------- DeleteTopics

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteTopicsRequest {
    pub header: RequestHeader,
    pub topic_names: Vec<String>,
    pub timeout_ms: i32,
}

impl Encodable for DeleteTopicsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::DeleteTopics).is_flexible(api_version);

        dst.put_array(flexible, &self.topic_names, |dst, name| {
            dst.put_str(flexible, name)
        })?;
        dst.put_i32(self.timeout_ms);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteTopicsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub responses: Vec<DeletableTopicResult>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeletableTopicResult {
    pub name: String,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
}

pub fn parse_delete_topics_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DeleteTopicsResponse> {
    let flexible = api_spec(ApiKeys::DeleteTopics).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::DeleteTopics, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, responses) = parse_array(i, flexible, |i| {
        let (i, name) = parse_str(i, flexible)?;
        let (i, error_code) = be_i16(i)?;
        let (i, error_message) = if api_version >= 5 {
            parse_opt_str(i, flexible)?
        } else {
            (i, None)
        };
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            DeletableTopicResult {
                name,
                error_code,
                error_message,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        DeleteTopicsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            responses,
        },
    ))
}

// ------------------------------------------------------------------ ListGroups

#[derive(Clone, Debug, PartialEq)]
pub struct ListGroupsRequest {
    pub header: RequestHeader,
    /// Server-side state filter, v4+; older brokers get an unfiltered
    /// request and the caller filters client-side.
    pub states_filter: Vec<String>,
}

impl Encodable for ListGroupsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::ListGroups).is_flexible(api_version);

        if api_version >= 4 {
            dst.put_array(flexible, &self.states_filter, |dst, state| {
                dst.put_str(flexible, state)
            })?;
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListGroupsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub groups: Vec<ListedGroup>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListedGroup {
    pub group_id: String,
    pub protocol_type: String,
    /// Only reported by v4+ brokers.
    pub group_state: Option<String>,
}

pub fn parse_list_groups_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, ListGroupsResponse> {
    let flexible = api_spec(ApiKeys::ListGroups).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::ListGroups, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 1 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, error_code) = be_i16(i)?;
    let (i, groups) = parse_array(i, flexible, |i| {
        let (i, group_id) = parse_str(i, flexible)?;
        let (i, protocol_type) = parse_str(i, flexible)?;
        let (i, group_state) = if api_version >= 4 {
            let (i, state) = parse_str(i, flexible)?;
            (i, Some(state))
        } else {
            (i, None)
        };
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            ListedGroup {
                group_id,
                protocol_type,
                group_state,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        ListGroupsResponse {
            header,
            throttle_time_ms,
            error_code,
            groups,
        },
    ))
}

// -------------------------------------------------------------- DescribeGroups

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeGroupsRequest {
    pub header: RequestHeader,
    pub groups: Vec<String>,
}

impl Encodable for DescribeGroupsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::DescribeGroups).is_flexible(api_version);

        dst.put_array(flexible, &self.groups, |dst, group| {
            dst.put_str(flexible, group)
        })?;
        if api_version >= 3 {
            dst.put_u8(0); // include_authorized_operations
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeGroupsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub groups: Vec<DescribedGroup>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribedGroup {
    pub error_code: ErrorCode,
    pub group_id: String,
    pub group_state: String,
    pub protocol_type: String,
    pub protocol_data: String,
    pub members: Vec<DescribedGroupMember>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribedGroupMember {
    pub member_id: String,
    pub group_instance_id: Option<String>,
    pub client_id: String,
    pub client_host: String,
    pub member_metadata: Bytes,
    pub member_assignment: Bytes,
}

pub fn parse_describe_groups_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DescribeGroupsResponse> {
    let flexible = api_spec(ApiKeys::DescribeGroups).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::DescribeGroups, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = if api_version >= 1 {
        let (i, throttle) = be_i32(i)?;
        (i, Some(throttle))
    } else {
        (i, None)
    };
    let (i, groups) = parse_array(i, flexible, |i| {
        let (i, error_code) = be_i16(i)?;
        let (i, group_id) = parse_str(i, flexible)?;
        let (i, group_state) = parse_str(i, flexible)?;
        let (i, protocol_type) = parse_str(i, flexible)?;
        let (i, protocol_data) = parse_str(i, flexible)?;
        let (i, members) = parse_array(i, flexible, |i| {
            let (i, member_id) = parse_str(i, flexible)?;
            let (i, group_instance_id) = if api_version >= 4 {
                parse_opt_str(i, flexible)?
            } else {
                (i, None)
            };
            let (i, client_id) = parse_str(i, flexible)?;
            let (i, client_host) = parse_str(i, flexible)?;
            let (i, member_metadata) = parse_bytes(i, flexible)?;
            let (i, member_assignment) = parse_bytes(i, flexible)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                DescribedGroupMember {
                    member_id,
                    group_instance_id,
                    client_id,
                    client_host,
                    member_metadata,
                    member_assignment,
                },
            ))
        })?;
        let (i, _authorized_operations) = if api_version >= 3 {
            let (i, ops) = be_i32(i)?;
            (i, Some(ops))
        } else {
            (i, None)
        };
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            DescribedGroup {
                error_code,
                group_id,
                group_state,
                protocol_type,
                protocol_data,
                members,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        DescribeGroupsResponse {
            header,
            throttle_time_ms,
            groups,
        },
    ))
}

// ---------------------------------------------------------------- DeleteGroups

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteGroupsRequest {
    pub header: RequestHeader,
    pub groups_names: Vec<String>,
}

impl Encodable for DeleteGroupsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::DeleteGroups).is_flexible(api_version);

        dst.put_array(flexible, &self.groups_names, |dst, group| {
            dst.put_str(flexible, group)
        })?;
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteGroupsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub results: Vec<(String, ErrorCode)>,
}

pub fn parse_delete_groups_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DeleteGroupsResponse> {
    let flexible = api_spec(ApiKeys::DeleteGroups).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::DeleteGroups, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, results) = parse_array(i, flexible, |i| {
        let (i, group_id) = parse_str(i, flexible)?;
        let (i, error_code) = be_i16(i)?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((i, (group_id, error_code)))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        DeleteGroupsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            results,
        },
    ))
}

// ------------------------------------------------------------- DescribeConfigs

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeConfigsRequest {
    pub header: RequestHeader,
    pub resources: Vec<DescribeConfigsResource>,
    pub include_synonyms: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeConfigsResource {
    pub resource_type: ConfigResourceType,
    pub resource_name: String,
    pub configuration_keys: Option<Vec<String>>,
}

impl Encodable for DescribeConfigsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::DescribeConfigs).is_flexible(api_version);

        dst.put_array(flexible, &self.resources, |dst, resource| {
            dst.put_i8(resource.resource_type as i8);
            dst.put_str(flexible, &resource.resource_name)?;
            dst.put_nullable_array(
                flexible,
                resource.configuration_keys.as_deref(),
                |dst, key| dst.put_str(flexible, key),
            )?;
            if flexible {
                dst.put_tagged_fields(&TaggedFields::default());
            }
            Ok(())
        })?;
        dst.put_u8(self.include_synonyms as u8);
        if api_version >= 3 {
            dst.put_u8(0); // include_documentation
        }
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeConfigsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub results: Vec<DescribeConfigsResult>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeConfigsResult {
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub resource_type: ConfigResourceType,
    pub resource_name: String,
    pub configs: Vec<DescribedConfig>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribedConfig {
    pub name: String,
    pub value: Option<String>,
    pub read_only: bool,
    pub config_source: i8,
    pub is_sensitive: bool,
    pub synonyms: Vec<ConfigSynonym>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConfigSynonym {
    pub name: String,
    pub value: Option<String>,
    pub source: i8,
}

pub fn parse_describe_configs_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DescribeConfigsResponse> {
    let flexible = api_spec(ApiKeys::DescribeConfigs).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::DescribeConfigs, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, results) = parse_array(i, flexible, |i| {
        let (i, error_code) = be_i16(i)?;
        let (i, error_message) = parse_opt_str(i, flexible)?;
        let (i, resource_type) = be_i8(i)?;
        let (i, resource_name) = parse_str(i, flexible)?;
        let (i, configs) = parse_array(i, flexible, |i| {
            let (i, name) = parse_str(i, flexible)?;
            let (i, value) = parse_opt_str(i, flexible)?;
            let (i, read_only) = be_u8(i)?;
            let (i, config_source) = be_i8(i)?;
            let (i, is_sensitive) = be_u8(i)?;
            let (i, synonyms) = parse_array(i, flexible, |i| {
                let (i, name) = parse_str(i, flexible)?;
                let (i, value) = parse_opt_str(i, flexible)?;
                let (i, source) = be_i8(i)?;
                let (i, _) = parse_tagged_fields(i, flexible)?;
                Ok((i, ConfigSynonym { name, value, source }))
            })?;
            let (i, _config_type) = if api_version >= 3 {
                be_i8(i)?
            } else {
                (i, 0)
            };
            let (i, _documentation) = if api_version >= 3 {
                parse_opt_str(i, flexible)?
            } else {
                (i, None)
            };
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                DescribedConfig {
                    name,
                    value,
                    read_only: read_only != 0,
                    config_source,
                    is_sensitive: is_sensitive != 0,
                    synonyms,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            DescribeConfigsResult {
                error_code,
                error_message,
                resource_type: ConfigResourceType::from(resource_type),
                resource_name,
                configs,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        DescribeConfigsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            results,
        },
    ))
}

// --------------------------------------------------------------- AlterConfigs

#[derive(Clone, Debug, PartialEq)]
pub struct AlterConfigsRequest {
    pub header: RequestHeader,
    pub resources: Vec<AlterConfigsResource>,
    pub validate_only: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterConfigsResource {
    pub resource_type: ConfigResourceType,
    pub resource_name: String,
    pub configs: Vec<(String, Option<String>)>,
}

impl Encodable for AlterConfigsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::AlterConfigs).is_flexible(api_version);

        dst.put_array(flexible, &self.resources, |dst, resource| {
            dst.put_i8(resource.resource_type as i8);
            dst.put_str(flexible, &resource.resource_name)?;
            dst.put_array(flexible, &resource.configs, |dst, (name, value)| {
                dst.put_str(flexible, name)?;
                dst.put_opt_str(flexible, value.as_deref())?;
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
        dst.put_u8(self.validate_only as u8);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterConfigsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub responses: Vec<AlterConfigsResourceResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterConfigsResourceResponse {
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub resource_type: ConfigResourceType,
    pub resource_name: String,
}

pub fn parse_alter_configs_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, AlterConfigsResponse> {
    let flexible = api_spec(ApiKeys::AlterConfigs).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::AlterConfigs, api_version);
    parse_alter_configs_shaped(i, api_version, flexible, header_version)
}

/// IncrementalAlterConfigs shares the response shape with AlterConfigs.
pub fn parse_incremental_alter_configs_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, AlterConfigsResponse> {
    let flexible = api_spec(ApiKeys::IncrementalAlterConfigs).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::IncrementalAlterConfigs, api_version);
    parse_alter_configs_shaped(i, api_version, flexible, header_version)
}

fn parse_alter_configs_shaped(
    i: &[u8],
    _api_version: ApiVersion,
    flexible: bool,
    header_version: i16,
) -> ParseResult<'_, AlterConfigsResponse> {
    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, responses) = parse_array(i, flexible, |i| {
        let (i, error_code) = be_i16(i)?;
        let (i, error_message) = parse_opt_str(i, flexible)?;
        let (i, resource_type) = be_i8(i)?;
        let (i, resource_name) = parse_str(i, flexible)?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            AlterConfigsResourceResponse {
                error_code,
                error_message,
                resource_type: ConfigResourceType::from(resource_type),
                resource_name,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        AlterConfigsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            responses,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct IncrementalAlterConfigsRequest {
    pub header: RequestHeader,
    pub resources: Vec<IncrementalAlterConfigsResource>,
    pub validate_only: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IncrementalAlterConfigsResource {
    pub resource_type: ConfigResourceType,
    pub resource_name: String,
    pub configs: Vec<(String, ConfigOperation, Option<String>)>,
}

impl Encodable for IncrementalAlterConfigsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::IncrementalAlterConfigs).is_flexible(api_version);

        dst.put_array(flexible, &self.resources, |dst, resource| {
            dst.put_i8(resource.resource_type as i8);
            dst.put_str(flexible, &resource.resource_name)?;
            dst.put_array(flexible, &resource.configs, |dst, (name, op, value)| {
                dst.put_str(flexible, name)?;
                dst.put_i8(*op as i8);
                dst.put_opt_str(flexible, value.as_deref())?;
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
        dst.put_u8(self.validate_only as u8);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

// -------------------------------------------------------- replica log dirs

#[derive(Clone, Debug, PartialEq)]
pub struct AlterReplicaLogDirsRequest {
    pub header: RequestHeader,
    /// log dir path → (topic, partitions) moved onto it
    pub dirs: Vec<(String, Vec<(String, Vec<PartitionId>)>)>,
}

impl Encodable for AlterReplicaLogDirsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::AlterReplicaLogDirs).is_flexible(api_version);

        dst.put_array(flexible, &self.dirs, |dst, (path, topics)| {
            dst.put_str(flexible, path)?;
            dst.put_array(flexible, topics, |dst, (topic_name, partitions)| {
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
        })?;
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterReplicaLogDirsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub results: Vec<(String, Vec<(PartitionId, ErrorCode)>)>,
}

pub fn parse_alter_replica_log_dirs_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, AlterReplicaLogDirsResponse> {
    let flexible = api_spec(ApiKeys::AlterReplicaLogDirs).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::AlterReplicaLogDirs, api_version);

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
        AlterReplicaLogDirsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            results,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeLogDirsRequest {
    pub header: RequestHeader,
    /// `None` describes every partition on the broker.
    pub topics: Option<Vec<(String, Vec<PartitionId>)>>,
}

impl Encodable for DescribeLogDirsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::DescribeLogDirs).is_flexible(api_version);

        dst.put_nullable_array(
            flexible,
            self.topics.as_deref(),
            |dst, (topic_name, partitions)| {
                dst.put_str(flexible, topic_name)?;
                dst.put_array(flexible, partitions, |dst, partition| {
                    dst.put_i32(*partition);
                    Ok(())
                })?;
                if flexible {
                    dst.put_tagged_fields(&TaggedFields::default());
                }
                Ok(())
            },
        )?;
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeLogDirsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub results: Vec<LogDirDescription>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogDirDescription {
    pub error_code: ErrorCode,
    pub log_dir: String,
    pub topics: Vec<(String, Vec<LogDirPartition>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogDirPartition {
    pub partition: PartitionId,
    pub partition_size: i64,
    pub offset_lag: i64,
    pub is_future_key: bool,
}

pub fn parse_describe_log_dirs_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DescribeLogDirsResponse> {
    let flexible = api_spec(ApiKeys::DescribeLogDirs).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::DescribeLogDirs, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = if api_version >= 3 {
        be_i16(i)?
    } else {
        (i, 0)
    };
    let (i, results) = parse_array(i, flexible, |i| {
        let (i, error_code) = be_i16(i)?;
        let (i, log_dir) = parse_str(i, flexible)?;
        let (i, topics) = parse_array(i, flexible, |i| {
            let (i, topic_name) = parse_str(i, flexible)?;
            let (i, partitions) = parse_array(i, flexible, |i| {
                let (i, partition) = be_i32(i)?;
                let (i, partition_size) = be_i64(i)?;
                let (i, offset_lag) = be_i64(i)?;
                let (i, is_future_key) = be_u8(i)?;
                let (i, _) = parse_tagged_fields(i, flexible)?;
                Ok((
                    i,
                    LogDirPartition {
                        partition,
                        partition_size,
                        offset_lag,
                        is_future_key: is_future_key != 0,
                    },
                ))
            })?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((i, (topic_name, partitions)))
        })?;
        let (i, _totals) = if api_version >= 4 {
            let (i, total_bytes) = be_i64(i)?;
            let (i, usable_bytes) = be_i64(i)?;
            (i, Some((total_bytes, usable_bytes)))
        } else {
            (i, None)
        };
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            LogDirDescription {
                error_code,
                log_dir,
                topics,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        DescribeLogDirsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            results,
        },
    ))
}

// ------------------------------------------------------------- DescribeCluster

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeClusterRequest {
    pub header: RequestHeader,
}

impl Encodable for DescribeClusterRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(0); // include_cluster_authorized_operations
        dst.put_tagged_fields(&TaggedFields::default());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeClusterResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub cluster_id: String,
    pub controller_id: NodeId,
    pub brokers: Vec<DescribeClusterBroker>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeClusterBroker {
    pub broker_id: NodeId,
    pub host: String,
    pub port: i32,
    pub rack: Option<String>,
}

pub fn parse_describe_cluster_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DescribeClusterResponse> {
    let header_version = response_header_version(ApiKeys::DescribeCluster, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, error_message) = parse_opt_str(i, true)?;
    let (i, cluster_id) = parse_str(i, true)?;
    let (i, controller_id) = be_i32(i)?;
    let (i, brokers) = parse_array(i, true, |i| {
        let (i, broker_id) = be_i32(i)?;
        let (i, host) = parse_str(i, true)?;
        let (i, port) = be_i32(i)?;
        let (i, rack) = parse_opt_str(i, true)?;
        let (i, _) = parse_tagged_fields(i, true)?;
        Ok((
            i,
            DescribeClusterBroker {
                broker_id,
                host,
                port,
                rack,
            },
        ))
    })?;
    let (i, _cluster_authorized_operations) = be_i32(i)?;
    let (i, _) = parse_tagged_fields(i, true)?;

    Ok((
        i,
        DescribeClusterResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            error_message,
            cluster_id,
            controller_id,
            brokers,
        },
    ))
}

// ----------------------------------------------------------- DescribeProducers

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeProducersRequest {
    pub header: RequestHeader,
    pub topics: Vec<(String, Vec<PartitionId>)>,
}

impl Encodable for DescribeProducersRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_array(true, &self.topics, |dst, (topic_name, partitions)| {
            dst.put_str(true, topic_name)?;
            dst.put_array(true, partitions, |dst, partition| {
                dst.put_i32(*partition);
                Ok(())
            })?;
            dst.put_tagged_fields(&TaggedFields::default());
            Ok(())
        })?;
        dst.put_tagged_fields(&TaggedFields::default());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeProducersResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub topics: Vec<(String, Vec<PartitionProducers>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionProducers {
    pub partition: PartitionId,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub active_producers: Vec<ProducerState>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProducerState {
    pub producer_id: ProducerId,
    pub producer_epoch: i32,
    pub last_sequence: i32,
    pub last_timestamp: Timestamp,
    pub coordinator_epoch: i32,
    pub current_txn_start_offset: Offset,
}

pub fn parse_describe_producers_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DescribeProducersResponse> {
    let header_version = response_header_version(ApiKeys::DescribeProducers, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, topics) = parse_array(i, true, |i| {
        let (i, topic_name) = parse_str(i, true)?;
        let (i, partitions) = parse_array(i, true, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, error_code) = be_i16(i)?;
            let (i, error_message) = parse_opt_str(i, true)?;
            let (i, active_producers) = parse_array(i, true, |i| {
                let (i, producer_id) = be_i64(i)?;
                let (i, producer_epoch) = be_i32(i)?;
                let (i, last_sequence) = be_i32(i)?;
                let (i, last_timestamp) = be_i64(i)?;
                let (i, coordinator_epoch) = be_i32(i)?;
                let (i, current_txn_start_offset) = be_i64(i)?;
                let (i, _) = parse_tagged_fields(i, true)?;
                Ok((
                    i,
                    ProducerState {
                        producer_id,
                        producer_epoch,
                        last_sequence,
                        last_timestamp,
                        coordinator_epoch,
                        current_txn_start_offset,
                    },
                ))
            })?;
            let (i, _) = parse_tagged_fields(i, true)?;
            Ok((
                i,
                PartitionProducers {
                    partition,
                    error_code,
                    error_message,
                    active_producers,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, true)?;
        Ok((i, (topic_name, partitions)))
    })?;
    let (i, _) = parse_tagged_fields(i, true)?;

    Ok((
        i,
        DescribeProducersResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            topics,
        },
    ))
}

// ---------------------------------------------------------------- client quotas

#[derive(Clone, Debug, PartialEq)]
pub struct QuotaEntity {
    pub entity_type: String,
    /// `None` addresses the default entity.
    pub entity_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeClientQuotasRequest {
    pub header: RequestHeader,
    pub components: Vec<QuotaFilterComponent>,
    pub strict: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuotaFilterComponent {
    pub entity_type: String,
    /// 0 = exact match on `match_name`, 1 = default entity, 2 = any.
    pub match_type: i8,
    pub match_name: Option<String>,
}

impl Encodable for DescribeClientQuotasRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::DescribeClientQuotas).is_flexible(api_version);

        dst.put_array(flexible, &self.components, |dst, component| {
            dst.put_str(flexible, &component.entity_type)?;
            dst.put_i8(component.match_type);
            dst.put_opt_str(flexible, component.match_name.as_deref())?;
            if flexible {
                dst.put_tagged_fields(&TaggedFields::default());
            }
            Ok(())
        })?;
        dst.put_u8(self.strict as u8);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeClientQuotasResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub entries: Vec<ClientQuotaEntry>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientQuotaEntry {
    pub entity: Vec<QuotaEntity>,
    pub values: Vec<(String, f64)>,
}

pub fn parse_describe_client_quotas_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DescribeClientQuotasResponse> {
    let flexible = api_spec(ApiKeys::DescribeClientQuotas).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::DescribeClientQuotas, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, error_message) = parse_opt_str(i, flexible)?;
    let (i, entries) = parse_nullable_array(i, flexible, |i| {
        let (i, entity) = parse_array(i, flexible, |i| {
            let (i, entity_type) = parse_str(i, flexible)?;
            let (i, entity_name) = parse_opt_str(i, flexible)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                QuotaEntity {
                    entity_type,
                    entity_name,
                },
            ))
        })?;
        let (i, values) = parse_array(i, flexible, |i| {
            let (i, key) = parse_str(i, flexible)?;
            let (i, value) = be_f64(i)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((i, (key, value)))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((i, ClientQuotaEntry { entity, values }))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        DescribeClientQuotasResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            error_message,
            entries: entries.unwrap_or_default(),
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterClientQuotasRequest {
    pub header: RequestHeader,
    pub entries: Vec<ClientQuotaAlteration>,
    pub validate_only: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientQuotaAlteration {
    pub entity: Vec<QuotaEntity>,
    /// (key, value, remove)
    pub ops: Vec<(String, f64, bool)>,
}

impl Encodable for AlterClientQuotasRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::AlterClientQuotas).is_flexible(api_version);

        dst.put_array(flexible, &self.entries, |dst, entry| {
            dst.put_array(flexible, &entry.entity, |dst, entity| {
                dst.put_str(flexible, &entity.entity_type)?;
                dst.put_opt_str(flexible, entity.entity_name.as_deref())?;
                if flexible {
                    dst.put_tagged_fields(&TaggedFields::default());
                }
                Ok(())
            })?;
            dst.put_array(flexible, &entry.ops, |dst, (key, value, remove)| {
                dst.put_str(flexible, key)?;
                dst.put_f64(*value);
                dst.put_u8(*remove as u8);
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
        dst.put_u8(self.validate_only as u8);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterClientQuotasResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub entries: Vec<ClientQuotaAlterationResponse>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientQuotaAlterationResponse {
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub entity: Vec<QuotaEntity>,
}

pub fn parse_alter_client_quotas_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, AlterClientQuotasResponse> {
    let flexible = api_spec(ApiKeys::AlterClientQuotas).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::AlterClientQuotas, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, entries) = parse_array(i, flexible, |i| {
        let (i, error_code) = be_i16(i)?;
        let (i, error_message) = parse_opt_str(i, flexible)?;
        let (i, entity) = parse_array(i, flexible, |i| {
            let (i, entity_type) = parse_str(i, flexible)?;
            let (i, entity_name) = parse_opt_str(i, flexible)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                QuotaEntity {
                    entity_type,
                    entity_name,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            ClientQuotaAlterationResponse {
                error_code,
                error_message,
                entity,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        AlterClientQuotasResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            entries,
        },
    ))
}

// ------------------------------------------------------------ SCRAM credentials

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeUserScramCredentialsRequest {
    pub header: RequestHeader,
    /// `None` describes every user.
    pub users: Option<Vec<String>>,
}

impl Encodable for DescribeUserScramCredentialsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_nullable_array(true, self.users.as_deref(), |dst, user| {
            dst.put_str(true, user)?;
            dst.put_tagged_fields(&TaggedFields::default());
            Ok(())
        })?;
        dst.put_tagged_fields(&TaggedFields::default());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeUserScramCredentialsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub results: Vec<UserScramCredentials>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserScramCredentials {
    pub user: String,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    /// (mechanism, iterations)
    pub credential_infos: Vec<(i8, i32)>,
}

pub fn parse_describe_user_scram_credentials_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DescribeUserScramCredentialsResponse> {
    let header_version = response_header_version(ApiKeys::DescribeUserScramCredentials, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, error_message) = parse_opt_str(i, true)?;
    let (i, results) = parse_array(i, true, |i| {
        let (i, user) = parse_str(i, true)?;
        let (i, error_code) = be_i16(i)?;
        let (i, error_message) = parse_opt_str(i, true)?;
        let (i, credential_infos) = parse_array(i, true, |i| {
            let (i, mechanism) = be_i8(i)?;
            let (i, iterations) = be_i32(i)?;
            let (i, _) = parse_tagged_fields(i, true)?;
            Ok((i, (mechanism, iterations)))
        })?;
        let (i, _) = parse_tagged_fields(i, true)?;
        Ok((
            i,
            UserScramCredentials {
                user,
                error_code,
                error_message,
                credential_infos,
            },
        ))
    })?;
    let (i, _) = parse_tagged_fields(i, true)?;

    Ok((
        i,
        DescribeUserScramCredentialsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            error_message,
            results,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterUserScramCredentialsRequest {
    pub header: RequestHeader,
    /// (user, mechanism)
    pub deletions: Vec<(String, i8)>,
    pub upsertions: Vec<ScramCredentialUpsertion>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScramCredentialUpsertion {
    pub user: String,
    pub mechanism: i8,
    pub iterations: i32,
    pub salt: Bytes,
    pub salted_password: Bytes,
}

impl Encodable for AlterUserScramCredentialsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_array(true, &self.deletions, |dst, (user, mechanism)| {
            dst.put_str(true, user)?;
            dst.put_i8(*mechanism);
            dst.put_tagged_fields(&TaggedFields::default());
            Ok(())
        })?;
        dst.put_array(true, &self.upsertions, |dst, upsertion| {
            dst.put_str(true, &upsertion.user)?;
            dst.put_i8(upsertion.mechanism);
            dst.put_i32(upsertion.iterations);
            crate::protocol::codec::WriteExt::put_bytes(dst, true, &upsertion.salt)?;
            crate::protocol::codec::WriteExt::put_bytes(dst, true, &upsertion.salted_password)?;
            dst.put_tagged_fields(&TaggedFields::default());
            Ok(())
        })?;
        dst.put_tagged_fields(&TaggedFields::default());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterUserScramCredentialsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub results: Vec<(String, ErrorCode, Option<String>)>,
}

pub fn parse_alter_user_scram_credentials_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, AlterUserScramCredentialsResponse> {
    let header_version = response_header_version(ApiKeys::AlterUserScramCredentials, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, results) = parse_array(i, true, |i| {
        let (i, user) = parse_str(i, true)?;
        let (i, error_code) = be_i16(i)?;
        let (i, error_message) = parse_opt_str(i, true)?;
        let (i, _) = parse_tagged_fields(i, true)?;
        Ok((i, (user, error_code, error_message)))
    })?;
    let (i, _) = parse_tagged_fields(i, true)?;

    Ok((
        i,
        AlterUserScramCredentialsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            results,
        },
    ))
}

// ----------------------------------------------------------- delegation tokens

#[derive(Clone, Debug, PartialEq)]
pub struct KafkaPrincipal {
    pub principal_type: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateDelegationTokenRequest {
    pub header: RequestHeader,
    pub renewers: Vec<KafkaPrincipal>,
    pub max_lifetime_ms: i64,
}

impl Encodable for CreateDelegationTokenRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::CreateDelegationToken).is_flexible(api_version);

        dst.put_array(flexible, &self.renewers, |dst, renewer| {
            dst.put_str(flexible, &renewer.principal_type)?;
            dst.put_str(flexible, &renewer.name)?;
            if flexible {
                dst.put_tagged_fields(&TaggedFields::default());
            }
            Ok(())
        })?;
        dst.put_i64(self.max_lifetime_ms);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DelegationToken {
    pub owner: KafkaPrincipal,
    pub issue_timestamp: Timestamp,
    pub expiry_timestamp: Timestamp,
    pub max_timestamp: Timestamp,
    pub token_id: String,
    pub hmac: Bytes,
    pub renewers: Vec<KafkaPrincipal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CreateDelegationTokenResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub token: DelegationToken,
}

pub fn parse_create_delegation_token_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, CreateDelegationTokenResponse> {
    let flexible = api_spec(ApiKeys::CreateDelegationToken).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::CreateDelegationToken, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, error_code) = be_i16(i)?;
    let (i, principal_type) = parse_str(i, flexible)?;
    let (i, principal_name) = parse_str(i, flexible)?;
    let (i, issue_timestamp) = be_i64(i)?;
    let (i, expiry_timestamp) = be_i64(i)?;
    let (i, max_timestamp) = be_i64(i)?;
    let (i, token_id) = parse_str(i, flexible)?;
    let (i, hmac) = parse_bytes(i, flexible)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        CreateDelegationTokenResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            token: DelegationToken {
                owner: KafkaPrincipal {
                    principal_type,
                    name: principal_name,
                },
                issue_timestamp,
                expiry_timestamp,
                max_timestamp,
                token_id,
                hmac,
                renewers: Vec::new(),
            },
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenewDelegationTokenRequest {
    pub header: RequestHeader,
    pub hmac: Bytes,
    pub renew_period_ms: i64,
}

impl Encodable for RenewDelegationTokenRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::RenewDelegationToken).is_flexible(api_version);

        crate::protocol::codec::WriteExt::put_bytes(dst, flexible, &self.hmac)?;
        dst.put_i64(self.renew_period_ms);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpirableTokenResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub expiry_timestamp: Timestamp,
}

pub fn parse_renew_delegation_token_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, ExpirableTokenResponse> {
    let flexible = api_spec(ApiKeys::RenewDelegationToken).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::RenewDelegationToken, api_version);
    parse_expirable_token_shaped(i, flexible, header_version)
}

pub fn parse_expire_delegation_token_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, ExpirableTokenResponse> {
    let flexible = api_spec(ApiKeys::ExpireDelegationToken).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::ExpireDelegationToken, api_version);
    parse_expirable_token_shaped(i, flexible, header_version)
}

fn parse_expirable_token_shaped(
    i: &[u8],
    flexible: bool,
    header_version: i16,
) -> ParseResult<'_, ExpirableTokenResponse> {
    let (i, header) = parse_response_header(i, header_version)?;
    let (i, error_code) = be_i16(i)?;
    let (i, expiry_timestamp) = be_i64(i)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        ExpirableTokenResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            expiry_timestamp,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExpireDelegationTokenRequest {
    pub header: RequestHeader,
    pub hmac: Bytes,
    pub expiry_time_period_ms: i64,
}

impl Encodable for ExpireDelegationTokenRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::ExpireDelegationToken).is_flexible(api_version);

        crate::protocol::codec::WriteExt::put_bytes(dst, flexible, &self.hmac)?;
        dst.put_i64(self.expiry_time_period_ms);
        if flexible {
            dst.put_tagged_fields(&TaggedFields::default());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DescribeDelegationTokenRequest {
    pub header: RequestHeader,
    /// `None` describes tokens for every owner.
    pub owners: Option<Vec<KafkaPrincipal>>,
}

impl Encodable for DescribeDelegationTokenRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;
        let flexible = api_spec(ApiKeys::DescribeDelegationToken).is_flexible(api_version);

        dst.put_nullable_array(flexible, self.owners.as_deref(), |dst, owner| {
            dst.put_str(flexible, &owner.principal_type)?;
            dst.put_str(flexible, &owner.name)?;
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
pub struct DescribeDelegationTokenResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub tokens: Vec<DelegationToken>,
}

pub fn parse_describe_delegation_token_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, DescribeDelegationTokenResponse> {
    let flexible = api_spec(ApiKeys::DescribeDelegationToken).is_flexible(api_version);
    let header_version = response_header_version(ApiKeys::DescribeDelegationToken, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, error_code) = be_i16(i)?;
    let (i, tokens) = parse_array(i, flexible, |i| {
        let (i, principal_type) = parse_str(i, flexible)?;
        let (i, principal_name) = parse_str(i, flexible)?;
        let (i, issue_timestamp) = be_i64(i)?;
        let (i, expiry_timestamp) = be_i64(i)?;
        let (i, max_timestamp) = be_i64(i)?;
        let (i, token_id) = parse_str(i, flexible)?;
        let (i, hmac) = parse_bytes(i, flexible)?;
        let (i, renewers) = parse_array(i, flexible, |i| {
            let (i, principal_type) = parse_str(i, flexible)?;
            let (i, name) = parse_str(i, flexible)?;
            let (i, _) = parse_tagged_fields(i, flexible)?;
            Ok((
                i,
                KafkaPrincipal {
                    principal_type,
                    name,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, flexible)?;
        Ok((
            i,
            DelegationToken {
                owner: KafkaPrincipal {
                    principal_type,
                    name: principal_name,
                },
                issue_timestamp,
                expiry_timestamp,
                max_timestamp,
                token_id,
                hmac,
                renewers,
            },
        ))
    })?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, _) = parse_tagged_fields(i, flexible)?;

    Ok((
        i,
        DescribeDelegationTokenResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            tokens,
        },
    ))
}

// -------------------------------------------------------------- reassignments

#[derive(Clone, Debug, PartialEq)]
pub struct AlterPartitionReassignmentsRequest {
    pub header: RequestHeader,
    pub timeout_ms: i32,
    /// topic → (partition, target replicas); `None` replicas cancels the
    /// pending reassignment.
    pub topics: Vec<(String, Vec<(PartitionId, Option<Vec<NodeId>>)>)>,
}

impl Encodable for AlterPartitionReassignmentsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i32(self.timeout_ms);
        dst.put_array(true, &self.topics, |dst, (topic_name, partitions)| {
            dst.put_str(true, topic_name)?;
            dst.put_array(true, partitions, |dst, (partition, replicas)| {
                dst.put_i32(*partition);
                dst.put_nullable_array(true, replicas.as_deref(), |dst, replica| {
                    dst.put_i32(*replica);
                    Ok(())
                })?;
                dst.put_tagged_fields(&TaggedFields::default());
                Ok(())
            })?;
            dst.put_tagged_fields(&TaggedFields::default());
            Ok(())
        })?;
        dst.put_tagged_fields(&TaggedFields::default());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlterPartitionReassignmentsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub responses: Vec<(String, Vec<(PartitionId, ErrorCode, Option<String>)>)>,
}

pub fn parse_alter_partition_reassignments_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, AlterPartitionReassignmentsResponse> {
    let header_version =
        response_header_version(ApiKeys::AlterPartitionReassignments, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, error_message) = parse_opt_str(i, true)?;
    let (i, responses) = parse_array(i, true, |i| {
        let (i, topic_name) = parse_str(i, true)?;
        let (i, partitions) = parse_array(i, true, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, error_code) = be_i16(i)?;
            let (i, error_message) = parse_opt_str(i, true)?;
            let (i, _) = parse_tagged_fields(i, true)?;
            Ok((i, (partition, error_code, error_message)))
        })?;
        let (i, _) = parse_tagged_fields(i, true)?;
        Ok((i, (topic_name, partitions)))
    })?;
    let (i, _) = parse_tagged_fields(i, true)?;

    Ok((
        i,
        AlterPartitionReassignmentsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            error_message,
            responses,
        },
    ))
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListPartitionReassignmentsRequest {
    pub header: RequestHeader,
    pub timeout_ms: i32,
    /// `None` lists every in-flight reassignment.
    pub topics: Option<Vec<(String, Vec<PartitionId>)>>,
}

impl Encodable for ListPartitionReassignmentsRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_i32(self.timeout_ms);
        dst.put_nullable_array(
            true,
            self.topics.as_deref(),
            |dst, (topic_name, partitions)| {
                dst.put_str(true, topic_name)?;
                dst.put_array(true, partitions, |dst, partition| {
                    dst.put_i32(*partition);
                    Ok(())
                })?;
                dst.put_tagged_fields(&TaggedFields::default());
                Ok(())
            },
        )?;
        dst.put_tagged_fields(&TaggedFields::default());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListPartitionReassignmentsResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub topics: Vec<(String, Vec<OngoingPartitionReassignment>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OngoingPartitionReassignment {
    pub partition: PartitionId,
    pub replicas: Vec<NodeId>,
    pub adding_replicas: Vec<NodeId>,
    pub removing_replicas: Vec<NodeId>,
}

pub fn parse_list_partition_reassignments_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, ListPartitionReassignmentsResponse> {
    let header_version = response_header_version(ApiKeys::ListPartitionReassignments, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, error_message) = parse_opt_str(i, true)?;
    let (i, topics) = parse_array(i, true, |i| {
        let (i, topic_name) = parse_str(i, true)?;
        let (i, partitions) = parse_array(i, true, |i| {
            let (i, partition) = be_i32(i)?;
            let (i, replicas) = parse_array(i, true, be_i32)?;
            let (i, adding_replicas) = parse_array(i, true, be_i32)?;
            let (i, removing_replicas) = parse_array(i, true, be_i32)?;
            let (i, _) = parse_tagged_fields(i, true)?;
            Ok((
                i,
                OngoingPartitionReassignment {
                    partition,
                    replicas,
                    adding_replicas,
                    removing_replicas,
                },
            ))
        })?;
        let (i, _) = parse_tagged_fields(i, true)?;
        Ok((i, (topic_name, partitions)))
    })?;
    let (i, _) = parse_tagged_fields(i, true)?;

    Ok((
        i,
        ListPartitionReassignmentsResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            error_message,
            topics,
        },
    ))
}

// -------------------------------------------------------------- UpdateFeatures

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateFeaturesRequest {
    pub header: RequestHeader,
    pub timeout_ms: i32,
    /// (feature, max_version_level, allow_downgrade)
    pub feature_updates: Vec<(String, i16, bool)>,
}

impl Encodable for UpdateFeaturesRequest {
    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let api_version = self.header.api_version;

        dst.put_i32(self.timeout_ms);
        dst.put_array(true, &self.feature_updates, |dst, (feature, level, downgrade)| {
            dst.put_str(true, feature)?;
            dst.put_i16(*level);
            if api_version >= 1 {
                // upgrade_type: 1 = upgrade, 3 = unsafe downgrade
                dst.put_i8(if *downgrade { 3 } else { 1 });
            } else {
                dst.put_u8(*downgrade as u8);
            }
            dst.put_tagged_fields(&TaggedFields::default());
            Ok(())
        })?;
        if api_version >= 1 {
            dst.put_u8(0); // validate_only
        }
        dst.put_tagged_fields(&TaggedFields::default());
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateFeaturesResponse {
    pub header: ResponseHeader,
    pub throttle_time_ms: Option<i32>,
    pub error_code: ErrorCode,
    pub error_message: Option<String>,
    pub results: Vec<(String, ErrorCode, Option<String>)>,
}

pub fn parse_update_features_response(
    i: &[u8],
    api_version: ApiVersion,
) -> ParseResult<'_, UpdateFeaturesResponse> {
    let header_version = response_header_version(ApiKeys::UpdateFeatures, api_version);

    let (i, header) = parse_response_header(i, header_version)?;
    let (i, throttle_time_ms) = be_i32(i)?;
    let (i, error_code) = be_i16(i)?;
    let (i, error_message) = parse_opt_str(i, true)?;
    let (i, results) = parse_array(i, true, |i| {
        let (i, feature) = parse_str(i, true)?;
        let (i, error_code) = be_i16(i)?;
        let (i, error_message) = parse_opt_str(i, true)?;
        let (i, _) = parse_tagged_fields(i, true)?;
        Ok((i, (feature, error_code, error_message)))
    })?;
    let (i, _) = parse_tagged_fields(i, true)?;

    Ok((
        i,
        UpdateFeaturesResponse {
            header,
            throttle_time_ms: Some(throttle_time_ms),
            error_code,
            error_message,
            results,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_create_topics_v2() {
        let req = CreateTopicsRequest {
            header: RequestHeader {
                api_key: ApiKeys::CreateTopics.key(),
                api_version: 2,
                correlation_id: 1,
                client_id: None,
            },
            topics: vec![CreatableTopic {
                name: "t".into(),
                num_partitions: 3,
                replication_factor: 1,
                assignments: Vec::new(),
                configs: Vec::new(),
            }],
            timeout_ms: 30000,
            validate_only: false,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [
                0, 0, 0, 1, // 1 topic
                0, 1, b't', // name
                0, 0, 0, 3, // partitions
                0, 1, // replication factor
                0, 0, 0, 0, // no assignments
                0, 0, 0, 0, // no configs
                0, 0, 0x75, 0x30, // timeout
                0, // validate_only
            ]
        );
    }

    #[test]
    fn test_parse_create_topics_response_v2() {
        let data = [
            0, 0, 0, 1, // correlation
            0, 0, 0, 0, // throttle
            0, 0, 0, 1, // 1 topic
            0, 1, b't', // name
            0, 36, // TOPIC_ALREADY_EXISTS
            0xff, 0xff, // error message null
        ];

        let (rest, response) = parse_create_topics_response(&data, 2).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.topics.len(), 1);
        assert_eq!(response.topics[0].error_code, 36);
    }

    #[test]
    fn test_encode_delete_topics_v1() {
        let req = DeleteTopicsRequest {
            header: RequestHeader {
                api_key: ApiKeys::DeleteTopics.key(),
                api_version: 1,
                correlation_id: 1,
                client_id: None,
            },
            topic_names: vec!["t".into()],
            timeout_ms: 10000,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            [0, 0, 0, 1, 0, 1, b't', 0, 0, 0x27, 0x10]
        );
    }

    #[test]
    fn test_parse_list_groups_response_v0() {
        let data = [
            0, 0, 0, 1, // correlation
            0, 0, // error
            0, 0, 0, 1, // 1 group
            0, 1, b'g', // group id
            0, 8, b'c', b'o', b'n', b's', b'u', b'm', b'e', b'r',
        ];

        let (rest, response) = parse_list_groups_response(&data, 0).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.groups.len(), 1);
        assert_eq!(response.groups[0].group_id, "g");
        assert_eq!(response.groups[0].protocol_type, "consumer");
        assert_eq!(response.groups[0].group_state, None);
    }

    #[test]
    fn test_parse_describe_log_dirs_response_v0() {
        let data = [
            0, 0, 0, 1, // correlation
            0, 0, 0, 0, // throttle
            0, 0, 0, 1, // 1 result
            0, 0, // error
            0, 4, b'/', b't', b'm', b'p', // log dir
            0, 0, 0, 1, // 1 topic
            0, 1, b't', // name
            0, 0, 0, 1, // 1 partition
            0, 0, 0, 0, // partition
            0, 0, 0, 0, 0, 0, 0, 100, // size
            0, 0, 0, 0, 0, 0, 0, 0, // lag
            0, // is_future_key
        ];

        let (rest, response) = parse_describe_log_dirs_response(&data, 0).unwrap();
        assert!(rest.is_empty());
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].log_dir, "/tmp");
        assert_eq!(response.results[0].topics[0].1[0].partition_size, 100);
    }
}
