//! In-memory vault and read model

use async_trait::async_trait;
use bnet_core::{
    BnError, CommittedRecord, LedgerState, MembershipId, MembershipQuery, MembershipRecord,
    MembershipStatus, NetworkId, Result, StateRef, VaultStore,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

#[derive(Debug, Default)]
struct VaultIndex {
    known: HashSet<StateRef>,
    consumed: HashSet<StateRef>,
    memberships: HashMap<MembershipId, Vec<CommittedRecord>>,
    groups: HashMap<MembershipId, Vec<CommittedRecord>>,
}

impl VaultIndex {
    fn latest(&self, membership_id: &MembershipId) -> Option<&CommittedRecord> {
        self.memberships
            .get(membership_id)?
            .iter()
            .rev()
            .find(|record| !self.consumed.contains(&record.state_ref))
    }
}

/// Committed records held in memory, shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryVault {
    index: Arc<RwLock<VaultIndex>>,
}

impl MemoryVault {
    /// Empty vault
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct committed outputs
    pub async fn len(&self) -> usize {
        self.index.read().await.known.len()
    }

    /// Whether nothing has been recorded
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VaultStore for MemoryVault {
    async fn record(&self, committed: &CommittedRecord) -> Result<()> {
        let mut index = self.index.write().await;
        if !index.known.insert(committed.state_ref) {
            return Ok(());
        }
        if let Some(input) = committed.input {
            index.consumed.insert(input);
        }

        match &committed.state {
            LedgerState::Membership(record) => {
                let history = index.memberships.entry(record.membership_id).or_default();
                history.push(committed.clone());
                // Records may arrive out of order; finality order is authoritative
                history.sort_by_key(|version| version.proof.sequence);
            }
            LedgerState::Group(group) => {
                index
                    .groups
                    .entry(group.membership_id)
                    .or_default()
                    .push(committed.clone());
            }
        }
        trace!(state_ref = %committed.state_ref, command = %committed.command, "Recorded committed output");
        Ok(())
    }

    async fn latest_membership(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<CommittedRecord>> {
        Ok(self.index.read().await.latest(&membership_id).cloned())
    }

    async fn membership_history(&self, membership_id: MembershipId) -> Result<Vec<CommittedRecord>> {
        Ok(self
            .index
            .read()
            .await
            .memberships
            .get(&membership_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn groups_for_membership(
        &self,
        membership_id: MembershipId,
    ) -> Result<Vec<CommittedRecord>> {
        Ok(self
            .index
            .read()
            .await
            .groups
            .get(&membership_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl MembershipQuery for MemoryVault {
    async fn query_memberships(
        &self,
        network_id: &NetworkId,
        statuses: &BTreeSet<MembershipStatus>,
    ) -> Result<Vec<MembershipRecord>> {
        let index = self.index.read().await;
        let mut current = Vec::new();
        for membership_id in index.memberships.keys() {
            let Some(latest) = index.latest(membership_id) else {
                continue;
            };
            let record = latest.membership()?;
            if &record.network_id == network_id && statuses.contains(&record.status) {
                current.push(record.clone());
            }
        }
        current.sort_by_key(|record| record.issued);
        Ok(current)
    }

    async fn network_exists(&self, network_id: &NetworkId) -> Result<bool> {
        let index = self.index.read().await;
        Ok(index
            .memberships
            .values()
            .flatten()
            .filter_map(|version| version.state.as_membership())
            .any(|record| &record.network_id == network_id))
    }
}

/// Resolve the current version of a membership or fail with `NotFound`
pub async fn require_latest(
    vault: &dyn VaultStore,
    membership_id: MembershipId,
) -> Result<CommittedRecord> {
    vault
        .latest_membership(membership_id)
        .await?
        .ok_or_else(|| BnError::not_found(format!("no current version of {membership_id}")))
}
