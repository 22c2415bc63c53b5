//! Membership lifecycle transitions
//!
//! Bootstrap steps (a creator issuing, activating and authorising its own
//! membership) are signed by the owner alone. Every other change is authorised
//! by the caller's ACTIVE membership in the same network, attached as a
//! reference state, and signed by both the caller and the member.

use bnet_core::{
    BnError, BusinessIdentity, Command, CommittedRecord, LedgerState, MembershipId,
    MembershipQuery, MembershipRecord, MembershipStatus, NetworkId, PartyId, ProposedChange,
    Result, Role,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::pipeline::CommitPipeline;
use crate::vault::require_latest;

/// Issues and modifies memberships through the commit pipeline
#[derive(Clone)]
pub struct MembershipManager {
    pipeline: Arc<CommitPipeline>,
    query: Arc<dyn MembershipQuery>,
}

impl MembershipManager {
    /// Manager submitting through `pipeline`
    pub fn new(pipeline: Arc<CommitPipeline>, query: Arc<dyn MembershipQuery>) -> Self {
        Self { pipeline, query }
    }

    /// Party this manager acts for
    pub fn party(&self) -> &PartyId {
        self.pipeline.party()
    }

    /// Current version of a membership
    pub async fn current(&self, membership_id: MembershipId) -> Result<CommittedRecord> {
        require_latest(self.pipeline.vault().as_ref(), membership_id).await
    }

    /// Issue a PENDING membership for `party`, signed by that party
    pub async fn request_membership(
        &self,
        membership_id: MembershipId,
        party: PartyId,
        network_id: NetworkId,
        business_identity: Option<BusinessIdentity>,
    ) -> Result<CommittedRecord> {
        let record = MembershipRecord::pending(
            membership_id,
            party.clone(),
            network_id,
            business_identity,
            self.now(),
        );
        let change = ProposedChange::new(LedgerState::Membership(record), Command::RequestMembership);
        let committed = self
            .pipeline
            .submit(None, change, BTreeSet::from([party]))
            .await?;
        info!(membership_id = %membership_id, state_ref = %committed.state_ref, "Membership requested");
        Ok(committed)
    }

    /// Self-issue a PENDING membership for this node's party
    pub async fn issue_pending(
        &self,
        membership_id: MembershipId,
        network_id: NetworkId,
        business_identity: Option<BusinessIdentity>,
    ) -> Result<CommittedRecord> {
        self.request_membership(membership_id, self.party().clone(), network_id, business_identity)
            .await
    }

    /// Activate this node's own PENDING membership
    pub async fn activate_own(&self, prior: &CommittedRecord) -> Result<CommittedRecord> {
        let record = self.owned(prior)?;
        let output = record.with_status(MembershipStatus::Active, self.now());
        self.submit_own(prior, output, Command::ActivateMembership { bootstrap: true })
            .await
    }

    /// Grant the administrative role to this node's own ACTIVE membership
    pub async fn authorise_own(&self, prior: &CommittedRecord) -> Result<CommittedRecord> {
        let record = self.owned(prior)?;
        let output = record.with_roles(BTreeSet::from([Role::admin()]), self.now());
        self.submit_own(prior, output, Command::ModifyRoles { bootstrap: true })
            .await
    }

    /// Activate a PENDING or SUSPENDED membership
    pub async fn activate(&self, membership_id: MembershipId) -> Result<CommittedRecord> {
        self.authorised_change(membership_id, Command::ActivateMembership { bootstrap: false }, |record, now| {
            record.with_status(MembershipStatus::Active, now)
        })
        .await
    }

    /// Suspend an ACTIVE membership
    pub async fn suspend(&self, membership_id: MembershipId) -> Result<CommittedRecord> {
        self.authorised_change(membership_id, Command::SuspendMembership, |record, now| {
            record.with_status(MembershipStatus::Suspended, now)
        })
        .await
    }

    /// Revoke a membership permanently
    pub async fn revoke(&self, membership_id: MembershipId) -> Result<CommittedRecord> {
        self.authorised_change(membership_id, Command::RevokeMembership, |record, now| {
            record.with_status(MembershipStatus::Revoked, now)
        })
        .await
    }

    /// Replace the role set of an ACTIVE membership
    pub async fn modify_roles(
        &self,
        membership_id: MembershipId,
        roles: BTreeSet<Role>,
    ) -> Result<CommittedRecord> {
        self.authorised_change(membership_id, Command::ModifyRoles { bootstrap: false }, move |record, now| {
            record.with_roles(roles, now)
        })
        .await
    }

    /// Replace the business identity; owners may change their own
    pub async fn modify_business_identity(
        &self,
        membership_id: MembershipId,
        business_identity: Option<BusinessIdentity>,
    ) -> Result<CommittedRecord> {
        let prior = self.current(membership_id).await?;
        let record = prior.membership()?;
        if record.owner() == self.party() {
            let output = record.with_business_identity(business_identity, self.now());
            return self
                .submit_own(&prior, output, Command::ModifyBusinessIdentity)
                .await;
        }
        self.authorised_change(membership_id, Command::ModifyBusinessIdentity, move |record, now| {
            record.with_business_identity(business_identity, now)
        })
        .await
    }

    /// Memberships of a network filtered by status
    pub async fn query(
        &self,
        network_id: &NetworkId,
        statuses: &BTreeSet<MembershipStatus>,
    ) -> Result<Vec<MembershipRecord>> {
        self.query.query_memberships(network_id, statuses).await
    }

    fn now(&self) -> DateTime<Utc> {
        self.pipeline.clock().now()
    }

    fn owned<'a>(&self, prior: &'a CommittedRecord) -> Result<&'a MembershipRecord> {
        let record = prior.membership()?;
        if record.owner() != self.party() {
            return Err(BnError::invalid(format!(
                "{} is owned by {}, not {}",
                record.membership_id,
                record.owner(),
                self.party()
            )));
        }
        Ok(record)
    }

    async fn submit_own(
        &self,
        prior: &CommittedRecord,
        output: MembershipRecord,
        command: Command,
    ) -> Result<CommittedRecord> {
        let membership_id = output.membership_id;
        let status = output.status;
        let change = ProposedChange::new(LedgerState::Membership(output), command);
        let committed = self
            .pipeline
            .submit(Some(prior), change, BTreeSet::from([self.party().clone()]))
            .await?;
        info!(membership_id = %membership_id, status = %status, command = %command, "Membership updated");
        Ok(committed)
    }

    /// The caller's ACTIVE membership in `network_id`
    async fn authority(&self, network_id: &NetworkId) -> Result<CommittedRecord> {
        let active = BTreeSet::from([MembershipStatus::Active]);
        let own = self
            .query
            .query_memberships(network_id, &active)
            .await?
            .into_iter()
            .find(|record| record.owner() == self.party())
            .ok_or_else(|| {
                BnError::invalid_transition(
                    "authorise",
                    format!("{} has no active membership in {network_id}", self.party()),
                )
            })?;
        self.current(own.membership_id).await
    }

    async fn authorised_change<F>(
        &self,
        membership_id: MembershipId,
        command: Command,
        next: F,
    ) -> Result<CommittedRecord>
    where
        F: FnOnce(&MembershipRecord, DateTime<Utc>) -> MembershipRecord,
    {
        let prior = self.current(membership_id).await?;
        let record = prior.membership()?;
        let authority = self.authority(&record.network_id).await?;

        let output = next(record, self.now());
        let status = output.status;
        let signers = BTreeSet::from([self.party().clone(), record.owner().clone()]);
        let change = ProposedChange::new(LedgerState::Membership(output), command)
            .with_reference(authority.resolved());

        let committed = self.pipeline.submit(Some(&prior), change, signers).await?;
        info!(
            membership_id = %membership_id,
            status = %status,
            command = %command,
            authorised_by = %authority.state_ref,
            "Membership updated"
        );
        Ok(committed)
    }
}
