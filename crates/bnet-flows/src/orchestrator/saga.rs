//! Persisted record of one network creation request

use bnet_core::{
    BnError, BusinessIdentity, GroupId, MembershipId, NetworkId, Result, StateRef,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a saga record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SagaId(pub Uuid);

impl SagaId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SagaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "saga-{}", self.0)
    }
}

/// Position of a network creation in its step sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SagaStep {
    /// Nothing done yet
    Start,
    /// The network id was not visible locally
    GuardChecked,
    /// Self-issued PENDING membership committed
    PendingCommitted,
    /// Membership activated
    ActiveCommitted,
    /// Administrative role granted
    AuthorisedCommitted,
    /// Default group issued; the saga is complete
    GroupCreated,
}

impl fmt::Display for SagaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "START",
            Self::GuardChecked => "GUARD_CHECKED",
            Self::PendingCommitted => "PENDING_COMMITTED",
            Self::ActiveCommitted => "ACTIVE_COMMITTED",
            Self::AuthorisedCommitted => "AUTHORISED_COMMITTED",
            Self::GroupCreated => "GROUP_CREATED",
        };
        f.write_str(label)
    }
}

/// Parameters of a network creation request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNetworkRequest {
    /// Externally supplied network id; generated when absent
    pub network_id: Option<NetworkId>,
    /// Business identity for the creator's membership
    pub business_identity: Option<BusinessIdentity>,
    /// Default group id; generated when absent
    pub group_id: Option<GroupId>,
    /// Default group name
    pub group_name: Option<String>,
}

impl CreateNetworkRequest {
    /// Request for a specific network id
    pub fn new(network_id: impl Into<NetworkId>) -> Self {
        Self {
            network_id: Some(network_id.into()),
            ..Self::default()
        }
    }

    /// Name the default group
    pub fn with_group(mut self, group_id: impl Into<GroupId>, group_name: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self.group_name = Some(group_name.into());
        self
    }

    /// Attach a business identity
    pub fn with_business_identity(mut self, business_identity: BusinessIdentity) -> Self {
        self.business_identity = Some(business_identity);
        self
    }
}

/// Why a saga stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaFailure {
    /// Step the saga had reached when the failure happened
    pub step: SagaStep,
    /// The failure
    pub error: BnError,
}

/// Record of one network creation, persisted after every step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNetworkSaga {
    /// Saga id
    pub id: SagaId,
    /// Original request
    pub request: CreateNetworkRequest,
    /// Network id in use, generated ids included
    pub network_id: NetworkId,
    /// Membership id allocated before the first commit
    pub membership_id: MembershipId,
    /// Group id in use, generated ids included
    pub group_id: GroupId,
    /// Last completed step
    pub cursor: SagaStep,
    /// Latest committed membership version
    pub membership_ref: Option<StateRef>,
    /// Committed default group
    pub group_ref: Option<StateRef>,
    /// Failure that stopped the last run
    pub failure: Option<SagaFailure>,
    /// Number of resumes
    pub attempts: u8,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl CreateNetworkSaga {
    /// New saga at `Start`, with every identifier fixed up front
    pub fn new(request: CreateNetworkRequest, now: DateTime<Utc>) -> Self {
        let network_id = request.network_id.clone().unwrap_or_else(NetworkId::random);
        let group_id = request.group_id.clone().unwrap_or_else(GroupId::random);
        Self {
            id: SagaId::new(),
            request,
            network_id,
            membership_id: MembershipId::new(),
            group_id,
            cursor: SagaStep::Start,
            membership_ref: None,
            group_ref: None,
            failure: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the saga completed
    pub fn is_complete(&self) -> bool {
        self.cursor == SagaStep::GroupCreated
    }

    /// Whether resuming could not change the outcome
    pub fn is_terminal(&self) -> bool {
        self.is_complete()
            || matches!(
                self.failure,
                Some(SagaFailure {
                    error: BnError::DuplicateNetwork { .. },
                    ..
                })
            )
    }

    /// Record a completed step
    pub fn advance(&mut self, step: SagaStep, now: DateTime<Utc>) {
        self.cursor = step;
        self.failure = None;
        self.updated_at = now;
    }

    /// Record the failure that stopped this run
    pub fn fail(&mut self, error: BnError, now: DateTime<Utc>) {
        self.failure = Some(SagaFailure {
            step: self.cursor,
            error,
        });
        self.updated_at = now;
    }

    /// Serialize for a saga store
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from a saga store
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_fixed_at_creation() {
        let saga = CreateNetworkSaga::new(CreateNetworkRequest::default(), Utc::now());
        let restored = CreateNetworkSaga::from_bytes(&saga.to_bytes().unwrap()).unwrap();

        assert_eq!(restored.network_id, saga.network_id);
        assert_eq!(restored.membership_id, saga.membership_id);
        assert_eq!(restored.group_id, saga.group_id);
        assert_eq!(restored.cursor, SagaStep::Start);
    }

    #[test]
    fn test_duplicate_network_failure_is_terminal() {
        let mut saga = CreateNetworkSaga::new(CreateNetworkRequest::new("NET-1"), Utc::now());
        saga.advance(SagaStep::GuardChecked, Utc::now());
        saga.fail(BnError::storage("disk full"), Utc::now());
        assert!(!saga.is_terminal());
        assert_eq!(saga.failure.as_ref().map(|f| f.step), Some(SagaStep::GuardChecked));

        saga.fail(
            BnError::DuplicateNetwork {
                network_id: NetworkId::new("NET-1"),
            },
            Utc::now(),
        );
        assert!(saga.is_terminal());
    }
}
