//! Relationship group issuance

use bnet_core::{
    Command, CommittedRecord, GroupId, LedgerState, MembershipId, ProposedChange,
    RelationshipGroup, Result,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::pipeline::CommitPipeline;
use crate::vault::require_latest;

/// Issues relationship groups authorised by a membership
#[derive(Clone)]
pub struct RelationshipGroupManager {
    pipeline: Arc<CommitPipeline>,
}

impl RelationshipGroupManager {
    /// Manager submitting through `pipeline`
    pub fn new(pipeline: Arc<CommitPipeline>) -> Self {
        Self { pipeline }
    }

    /// Issue the default group for an authorised membership
    ///
    /// Every call commits a new group, even for a membership that already
    /// has one.
    pub async fn create_default_group(
        &self,
        membership_id: MembershipId,
        group_id: GroupId,
        group_name: Option<String>,
    ) -> Result<CommittedRecord> {
        let authority = require_latest(self.pipeline.vault().as_ref(), membership_id).await?;
        let owner = authority.membership()?.owner().clone();

        let group = RelationshipGroup::default_for(
            membership_id,
            group_id.clone(),
            group_name,
            self.pipeline.party().clone(),
            self.pipeline.clock().now(),
        );
        let change = ProposedChange::new(LedgerState::Group(group), Command::IssueGroup)
            .with_reference(authority.resolved());
        let signers = BTreeSet::from([self.pipeline.party().clone(), owner]);

        let committed = self.pipeline.submit(None, change, signers).await?;
        info!(
            membership_id = %membership_id,
            group_id = %group_id,
            state_ref = %committed.state_ref,
            "Default relationship group issued"
        );
        Ok(committed)
    }
}
