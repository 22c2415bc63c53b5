//! Network creation saga
//!
//! Creating a network is four independent commits: self-issue a PENDING
//! membership, activate it, grant it the admin role, issue the default group.
//! The saga record is persisted after every step. A failed or interrupted run
//! leaves the ledger in its last committed state; `resume` re-derives the step
//! from what the vault holds instead of trusting the stored cursor, so a crash
//! between a commit and the cursor write never re-issues a committed step.

pub mod saga;
pub mod store;

pub use saga::{CreateNetworkRequest, CreateNetworkSaga, SagaFailure, SagaId, SagaStep};
pub use store::{MemorySagaStore, SagaStore};

use bnet_core::{
    BnError, CommittedRecord, MembershipStatus, NetworkId, Result, SagaConfig, TimeSource,
    VaultStore,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::groups::RelationshipGroupManager;
use crate::guard::DuplicateNetworkGuard;
use crate::membership::MembershipManager;

/// Outcome of a completed network creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCreated {
    /// Saga that created the network
    pub saga_id: SagaId,
    /// The created network
    pub network_id: NetworkId,
    /// The creator's authorised membership
    pub membership: CommittedRecord,
    /// The default relationship group
    pub group: CommittedRecord,
}

/// Drives network creation sagas
pub struct MembershipLifecycleOrchestrator {
    guard: DuplicateNetworkGuard,
    memberships: MembershipManager,
    groups: RelationshipGroupManager,
    vault: Arc<dyn VaultStore>,
    store: Arc<dyn SagaStore>,
    clock: Arc<dyn TimeSource>,
    config: SagaConfig,
}

impl MembershipLifecycleOrchestrator {
    /// Assemble an orchestrator
    pub fn new(
        guard: DuplicateNetworkGuard,
        memberships: MembershipManager,
        groups: RelationshipGroupManager,
        vault: Arc<dyn VaultStore>,
        store: Arc<dyn SagaStore>,
        clock: Arc<dyn TimeSource>,
        config: SagaConfig,
    ) -> Self {
        Self {
            guard,
            memberships,
            groups,
            vault,
            store,
            clock,
            config,
        }
    }

    /// Stored saga record
    pub async fn saga(&self, saga_id: SagaId) -> Result<CreateNetworkSaga> {
        self.store
            .load(saga_id)
            .await?
            .ok_or_else(|| BnError::not_found(format!("{saga_id}")))
    }

    /// Every stored saga record, oldest first
    pub async fn sagas(&self) -> Result<Vec<CreateNetworkSaga>> {
        self.store.list().await
    }

    /// Run a new network creation to completion or first failure
    pub async fn start(&self, request: CreateNetworkRequest) -> Result<NetworkCreated> {
        let saga = CreateNetworkSaga::new(request, self.clock.now());
        info!(
            saga_id = %saga.id,
            network_id = %saga.network_id,
            membership_id = %saga.membership_id,
            "Creating business network"
        );
        self.store.save(&saga).await?;
        self.drive(saga).await
    }

    /// Continue a stopped saga from the step its committed state implies
    pub async fn resume(&self, saga_id: SagaId) -> Result<NetworkCreated> {
        let mut saga = self.saga(saga_id).await?;
        if saga.is_complete() {
            return self.completed(&saga).await;
        }
        if let Some(SagaFailure {
            error: error @ BnError::DuplicateNetwork { .. },
            ..
        }) = &saga.failure
        {
            return Err(error.clone());
        }
        if saga.attempts >= self.config.max_resume_attempts {
            return Err(BnError::invalid(format!(
                "{saga_id} exhausted {} resume attempts",
                self.config.max_resume_attempts
            )));
        }

        saga.attempts = saga.attempts.saturating_add(1);
        self.rederive(&mut saga).await?;
        self.store.save(&saga).await?;
        info!(saga_id = %saga_id, step = %saga.cursor, attempt = saga.attempts, "Resuming network creation");
        self.drive(saga).await
    }

    /// Resume every saga that stopped short of completion
    pub async fn recover_incomplete(&self) -> Result<Vec<(SagaId, Result<NetworkCreated>)>> {
        let pending: Vec<SagaId> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|saga| !saga.is_terminal() && saga.attempts < self.config.max_resume_attempts)
            .map(|saga| saga.id)
            .collect();
        if pending.is_empty() {
            debug!("No incomplete network creations");
            return Ok(Vec::new());
        }

        info!(count = pending.len(), "Recovering incomplete network creations");
        let mut outcomes = Vec::with_capacity(pending.len());
        for saga_id in pending {
            let outcome = self.resume(saga_id).await;
            outcomes.push((saga_id, outcome));
        }
        Ok(outcomes)
    }

    /// Run a network creation as a background task
    pub fn spawn(
        self: &Arc<Self>,
        request: CreateNetworkRequest,
    ) -> tokio::task::JoinHandle<Result<NetworkCreated>> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.start(request).await })
    }

    async fn drive(&self, mut saga: CreateNetworkSaga) -> Result<NetworkCreated> {
        while !saga.is_complete() {
            let next = match self.step(&mut saga).await {
                Ok(next) => next,
                Err(error) => return self.halt(saga, error).await,
            };
            debug!(saga_id = %saga.id, from = %saga.cursor, to = %next, "Saga step committed");
            saga.advance(next, self.clock.now());
            if let Err(error) = self.store.save(&saga).await {
                return self.halt(saga, error).await;
            }
        }
        let created = self.completed(&saga).await?;
        info!(
            saga_id = %saga.id,
            network_id = %saga.network_id,
            membership_id = %saga.membership_id,
            group_id = %saga.group_id,
            "Business network created"
        );
        Ok(created)
    }

    /// Execute the step after the cursor and return the step reached
    async fn step(&self, saga: &mut CreateNetworkSaga) -> Result<SagaStep> {
        let membership_id = saga.membership_id;
        match saga.cursor {
            SagaStep::Start => {
                self.guard.ensure_absent(&saga.network_id).await?;
                Ok(SagaStep::GuardChecked)
            }
            SagaStep::GuardChecked => {
                let pending = self
                    .memberships
                    .issue_pending(
                        membership_id,
                        saga.network_id.clone(),
                        saga.request.business_identity.clone(),
                    )
                    .await?;
                saga.membership_ref = Some(pending.state_ref);
                Ok(SagaStep::PendingCommitted)
            }
            SagaStep::PendingCommitted => {
                let prior = self.memberships.current(membership_id).await?;
                let active = self.memberships.activate_own(&prior).await?;
                saga.membership_ref = Some(active.state_ref);
                Ok(SagaStep::ActiveCommitted)
            }
            SagaStep::ActiveCommitted => {
                let prior = self.memberships.current(membership_id).await?;
                let authorised = self.memberships.authorise_own(&prior).await?;
                saga.membership_ref = Some(authorised.state_ref);
                Ok(SagaStep::AuthorisedCommitted)
            }
            SagaStep::AuthorisedCommitted => {
                let group = self
                    .groups
                    .create_default_group(
                        membership_id,
                        saga.group_id.clone(),
                        saga.request.group_name.clone(),
                    )
                    .await
                    .map_err(|cause| BnError::group_creation(membership_id, cause))?;
                saga.group_ref = Some(group.state_ref);
                Ok(SagaStep::GroupCreated)
            }
            SagaStep::GroupCreated => Ok(SagaStep::GroupCreated),
        }
    }

    async fn halt(&self, mut saga: CreateNetworkSaga, error: BnError) -> Result<NetworkCreated> {
        warn!(
            saga_id = %saga.id,
            network_id = %saga.network_id,
            step = %saga.cursor,
            error = %error,
            "Network creation stopped"
        );
        saga.fail(error.clone(), self.clock.now());
        if let Err(save_error) = self.store.save(&saga).await {
            warn!(saga_id = %saga.id, error = %save_error, "Failed to persist saga failure");
        }
        Err(error)
    }

    /// Align the cursor with committed state
    async fn rederive(&self, saga: &mut CreateNetworkSaga) -> Result<()> {
        let membership_id = saga.membership_id;
        let latest = self.vault.latest_membership(membership_id).await?;
        let derived = match &latest {
            None => SagaStep::Start,
            Some(committed) => {
                let record = committed.membership()?;
                match record.status {
                    MembershipStatus::Pending => SagaStep::PendingCommitted,
                    MembershipStatus::Active if !record.is_authorised() => SagaStep::ActiveCommitted,
                    MembershipStatus::Active => {
                        let groups = self.vault.groups_for_membership(membership_id).await?;
                        match groups.first() {
                            Some(group) => {
                                saga.group_ref = Some(group.state_ref);
                                SagaStep::GroupCreated
                            }
                            None => SagaStep::AuthorisedCommitted,
                        }
                    }
                    status => {
                        return Err(BnError::invalid(format!(
                            "membership {membership_id} is {status}; network creation cannot continue"
                        )));
                    }
                }
            }
        };
        saga.membership_ref = latest.map(|committed| committed.state_ref);

        if derived != saga.cursor {
            info!(
                saga_id = %saga.id,
                recorded = %saga.cursor,
                derived = %derived,
                "Saga cursor re-derived from committed state"
            );
        }
        saga.advance(derived, self.clock.now());
        Ok(())
    }

    async fn completed(&self, saga: &CreateNetworkSaga) -> Result<NetworkCreated> {
        let membership = self.memberships.current(saga.membership_id).await?;
        let group = self
            .vault
            .groups_for_membership(saga.membership_id)
            .await?
            .into_iter()
            .find(|group| Some(group.state_ref) == saga.group_ref)
            .ok_or_else(|| {
                BnError::not_found(format!("default group of {}", saga.membership_id))
            })?;
        Ok(NetworkCreated {
            saga_id: saga.id,
            network_id: saga.network_id.clone(),
            membership,
            group,
        })
    }
}
