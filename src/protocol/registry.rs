//! The process-wide table describing every API this client speaks: its key,
//! the version range the client implements, and the version at which the
//! API switched to the flexible (compact + tagged fields) encoding.

use std::collections::HashMap;

use crate::errors::{ErrorKind, Result};
use crate::protocol::{ApiKey, ApiKeys, ApiVersion};

#[derive(Clone, Copy, Debug)]
pub struct ApiSpec {
    pub key: ApiKeys,
    pub min_version: ApiVersion,
    pub max_version: ApiVersion,
    /// First version using the flexible encoding, if any within range.
    pub flexible_from: Option<ApiVersion>,
}

impl ApiSpec {
    pub fn is_flexible(&self, api_version: ApiVersion) -> bool {
        self.flexible_from
            .map(|from| api_version >= from)
            .unwrap_or_default()
    }
}

const fn spec(
    key: ApiKeys,
    min_version: ApiVersion,
    max_version: ApiVersion,
    flexible_from: Option<ApiVersion>,
) -> ApiSpec {
    ApiSpec {
        key,
        min_version,
        max_version,
        flexible_from,
    }
}

static SUPPORTED_APIS: &[ApiSpec] = &[
    spec(ApiKeys::Produce, 3, 9, Some(9)),
    spec(ApiKeys::Fetch, 4, 12, Some(12)),
    spec(ApiKeys::ListOffsets, 1, 7, Some(6)),
    spec(ApiKeys::Metadata, 1, 12, Some(9)),
    spec(ApiKeys::OffsetCommit, 2, 8, Some(8)),
    spec(ApiKeys::OffsetFetch, 1, 7, Some(6)),
    spec(ApiKeys::FindCoordinator, 0, 3, Some(3)),
    spec(ApiKeys::JoinGroup, 2, 7, Some(6)),
    spec(ApiKeys::Heartbeat, 0, 4, Some(4)),
    spec(ApiKeys::LeaveGroup, 0, 4, Some(4)),
    spec(ApiKeys::SyncGroup, 0, 5, Some(4)),
    spec(ApiKeys::DescribeGroups, 0, 5, Some(5)),
    spec(ApiKeys::ListGroups, 0, 4, Some(3)),
    spec(ApiKeys::SaslHandshake, 0, 1, None),
    spec(ApiKeys::ApiVersions, 0, 3, Some(3)),
    spec(ApiKeys::CreateTopics, 2, 7, Some(5)),
    spec(ApiKeys::DeleteTopics, 1, 5, Some(4)),
    spec(ApiKeys::InitProducerId, 0, 4, Some(2)),
    spec(ApiKeys::AddPartitionsToTxn, 0, 3, Some(3)),
    spec(ApiKeys::AddOffsetsToTxn, 0, 3, Some(3)),
    spec(ApiKeys::EndTxn, 0, 3, Some(3)),
    spec(ApiKeys::TxnOffsetCommit, 0, 3, Some(3)),
    spec(ApiKeys::DescribeConfigs, 1, 4, Some(4)),
    spec(ApiKeys::AlterConfigs, 0, 2, Some(2)),
    spec(ApiKeys::AlterReplicaLogDirs, 0, 2, Some(2)),
    spec(ApiKeys::DescribeLogDirs, 0, 4, Some(2)),
    spec(ApiKeys::SaslAuthenticate, 0, 2, Some(2)),
    spec(ApiKeys::CreateDelegationToken, 0, 2, Some(2)),
    spec(ApiKeys::RenewDelegationToken, 0, 2, Some(2)),
    spec(ApiKeys::ExpireDelegationToken, 0, 2, Some(2)),
    spec(ApiKeys::DescribeDelegationToken, 0, 2, Some(2)),
    spec(ApiKeys::DeleteGroups, 0, 2, Some(2)),
    spec(ApiKeys::IncrementalAlterConfigs, 0, 1, Some(1)),
    spec(ApiKeys::AlterPartitionReassignments, 0, 0, Some(0)),
    spec(ApiKeys::ListPartitionReassignments, 0, 0, Some(0)),
    spec(ApiKeys::OffsetDelete, 0, 0, None),
    spec(ApiKeys::DescribeClientQuotas, 0, 1, Some(1)),
    spec(ApiKeys::AlterClientQuotas, 0, 1, Some(1)),
    spec(ApiKeys::DescribeUserScramCredentials, 0, 0, Some(0)),
    spec(ApiKeys::AlterUserScramCredentials, 0, 0, Some(0)),
    spec(ApiKeys::UpdateFeatures, 0, 1, Some(0)),
    spec(ApiKeys::DescribeCluster, 0, 0, Some(0)),
    spec(ApiKeys::DescribeProducers, 0, 0, Some(0)),
];

lazy_static! {
    static ref API_INDEX: HashMap<ApiKey, &'static ApiSpec> = SUPPORTED_APIS
        .iter()
        .map(|spec| (spec.key.key(), spec))
        .collect();
}

pub fn api_spec(key: ApiKeys) -> &'static ApiSpec {
    API_INDEX[&key.key()]
}

/// Choose the highest version both sides implement, or fail with the range
/// the broker advertised.
pub fn select_version(
    key: ApiKeys,
    broker_range: Option<(ApiVersion, ApiVersion)>,
) -> Result<ApiVersion> {
    let spec = api_spec(key);

    match broker_range {
        Some((broker_min, broker_max)) => {
            let hi = spec.max_version.min(broker_max);
            let lo = spec.min_version.max(broker_min);
            if hi < lo {
                bail!(ErrorKind::UnsupportedApiVersion(
                    key.key(),
                    broker_min,
                    broker_max
                ));
            }
            Ok(hi)
        }
        // the broker did not advertise; stay at the client floor
        None => Ok(spec.min_version),
    }
}

pub fn request_header_version(key: ApiKeys, api_version: ApiVersion) -> i16 {
    if api_spec(key).is_flexible(api_version) {
        2
    } else {
        1
    }
}

pub fn response_header_version(key: ApiKeys, api_version: ApiVersion) -> i16 {
    if api_spec(key).is_flexible(api_version) {
        // ApiVersions responses keep the v0 header at every version so that
        // clients can parse them before knowing whether the broker speaks
        // flexible encodings.
        if key == ApiKeys::ApiVersions {
            0
        } else {
            1
        }
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_selection() {
        assert_eq!(select_version(ApiKeys::Metadata, Some((0, 12))).unwrap(), 12);
        assert_eq!(select_version(ApiKeys::Metadata, Some((0, 7))).unwrap(), 7);
        assert_eq!(select_version(ApiKeys::Produce, Some((0, 8))).unwrap(), 8);
        assert_eq!(select_version(ApiKeys::Fetch, None).unwrap(), 4);
    }

    #[test]
    fn test_version_selection_no_overlap() {
        let err = select_version(ApiKeys::Produce, Some((0, 2))).unwrap_err();
        match err.kind() {
            crate::errors::ErrorKind::UnsupportedApiVersion(key, min, max) => {
                assert_eq!(*key, ApiKeys::Produce.key());
                assert_eq!((*min, *max), (0, 2));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_header_versions() {
        assert_eq!(request_header_version(ApiKeys::Metadata, 8), 1);
        assert_eq!(request_header_version(ApiKeys::Metadata, 9), 2);
        assert_eq!(response_header_version(ApiKeys::Metadata, 9), 1);
        assert_eq!(response_header_version(ApiKeys::ApiVersions, 3), 0);
        assert_eq!(response_header_version(ApiKeys::SaslHandshake, 1), 0);
    }

    #[test]
    fn test_every_spec_indexed() {
        for spec in SUPPORTED_APIS {
            assert!(spec.min_version <= spec.max_version, "{:?}", spec.key);
            assert_eq!(api_spec(spec.key).key, spec.key);
        }
    }
}
