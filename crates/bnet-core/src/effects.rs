//! Effect interfaces for the collaborators the membership pipeline depends on
//!
//! Storage, transport and contract rules live outside this workspace's core;
//! components only see these traits. In-memory implementations live next to
//! the components that use them and in `bnet-testkit`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::errors::Result;
use crate::identifiers::{MembershipId, NetworkId, PartyId};
use crate::membership::{MembershipRecord, MembershipStatus};
use crate::transition::{
    CommittedRecord, FinalityProof, ProposedTransition, SignedTransition, TransitionSignature,
};

/// Decides whether a proposed transition is a legal state change
#[async_trait]
pub trait ContractValidator: Send + Sync {
    /// Accept the transition or fail with `BnError::InvalidTransition`
    ///
    /// `ledger` is the validating node's view of committed memberships, for
    /// rules that depend on what else exists in a network.
    async fn validate(
        &self,
        transition: &ProposedTransition,
        ledger: &dyn MembershipQuery,
    ) -> Result<()>;
}

/// Gathers signatures from the parties a transition requires
#[async_trait]
pub trait SignatureCollector: Send + Sync {
    /// Return one signature per required signer, or `BnError::Signature`
    /// naming the first party that could not sign
    async fn collect(
        &self,
        transition: &ProposedTransition,
        signers: &BTreeSet<PartyId>,
    ) -> Result<Vec<TransitionSignature>>;
}

/// Finalises and totally orders transitions
///
/// Implementations guarantee that no two transitions consuming the same input
/// both finalise; the loser receives `BnError::Conflict`.
#[async_trait]
pub trait ConsensusService: Send + Sync {
    /// Service name, as reported in finality proofs
    fn name(&self) -> &str;

    /// Finalise a signed transition
    async fn finalize(&self, transition: &SignedTransition) -> Result<FinalityProof>;
}

/// Local record of committed transitions
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Record a finalised output and mark its input consumed
    async fn record(&self, committed: &CommittedRecord) -> Result<()>;

    /// Most recent unconsumed version of a membership
    async fn latest_membership(&self, membership_id: MembershipId)
        -> Result<Option<CommittedRecord>>;

    /// Every committed version of a membership, oldest first
    async fn membership_history(&self, membership_id: MembershipId) -> Result<Vec<CommittedRecord>>;

    /// Relationship groups issued for a membership
    async fn groups_for_membership(&self, membership_id: MembershipId)
        -> Result<Vec<CommittedRecord>>;
}

/// Read model over current membership state
#[async_trait]
pub trait MembershipQuery: Send + Sync {
    /// Current memberships of a network whose status is in `statuses`
    async fn query_memberships(
        &self,
        network_id: &NetworkId,
        statuses: &BTreeSet<MembershipStatus>,
    ) -> Result<Vec<MembershipRecord>>;

    /// Whether any membership of the network is visible locally
    async fn network_exists(&self, network_id: &NetworkId) -> Result<bool>;
}

/// Source of wall-clock time for record timestamps
pub trait TimeSource: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Production time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
