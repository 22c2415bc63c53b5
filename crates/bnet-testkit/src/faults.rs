//! Fault injectors wrapping the real collaborators

use async_trait::async_trait;
use bnet_core::{
    BnError, ConsensusService, ContractValidator, FinalityProof, MembershipQuery, PartyId,
    ProposedTransition, Result, SignatureCollector, SignedTransition, TransitionSignature,
};
use bnet_flows::{CreateNetworkSaga, MemorySagaStore, SagaId, SagaStore};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Rejects transitions carrying one intent tag until healed
pub struct RejectingValidator {
    inner: Arc<dyn ContractValidator>,
    rejected: Mutex<Option<String>>,
    rejections: AtomicUsize,
}

impl RejectingValidator {
    /// Reject every transition whose command label is `command`
    pub fn rejecting(inner: Arc<dyn ContractValidator>, command: &str) -> Self {
        Self {
            inner,
            rejected: Mutex::new(Some(command.to_string())),
            rejections: AtomicUsize::new(0),
        }
    }

    /// Stop rejecting
    pub fn heal(&self) {
        *self.rejected.lock() = None;
    }

    /// Transitions rejected so far
    pub fn rejections(&self) -> usize {
        self.rejections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContractValidator for RejectingValidator {
    async fn validate(
        &self,
        transition: &ProposedTransition,
        ledger: &dyn MembershipQuery,
    ) -> Result<()> {
        let command = transition.command();
        let rejected = self.rejected.lock().as_deref() == Some(command.to_string().as_str());
        if rejected {
            self.rejections.fetch_add(1, Ordering::SeqCst);
            return Err(BnError::invalid_transition(command, "rejected by injected fault"));
        }
        self.inner.validate(transition, ledger).await
    }
}

/// Declines on behalf of selected parties
pub struct DecliningSigner {
    inner: Arc<dyn SignatureCollector>,
    declining: Mutex<BTreeSet<PartyId>>,
}

impl DecliningSigner {
    /// Wrap a collector; nobody declines yet
    pub fn new(inner: Arc<dyn SignatureCollector>) -> Self {
        Self {
            inner,
            declining: Mutex::new(BTreeSet::new()),
        }
    }

    /// Make `party` decline every request
    pub fn decline(&self, party: PartyId) {
        self.declining.lock().insert(party);
    }
}

#[async_trait]
impl SignatureCollector for DecliningSigner {
    async fn collect(
        &self,
        transition: &ProposedTransition,
        signers: &BTreeSet<PartyId>,
    ) -> Result<Vec<TransitionSignature>> {
        let declined = {
            let declining = self.declining.lock();
            signers.iter().find(|party| declining.contains(*party)).cloned()
        };
        if let Some(party) = declined {
            return Err(BnError::signature(party, "declined to sign"));
        }
        self.inner.collect(transition, signers).await
    }
}

/// Saga store that loses every write from the Nth on, until healed
///
/// Models a process that commits a step and crashes before persisting the
/// cursor.
#[derive(Debug, Default)]
pub struct FlakySagaStore {
    inner: MemorySagaStore,
    saves: AtomicUsize,
    fail_from: AtomicUsize,
}

impl FlakySagaStore {
    /// Fail the `nth` save (1-based) and every save after it
    pub fn failing_from(nth: usize) -> Self {
        Self {
            fail_from: AtomicUsize::new(nth),
            ..Self::default()
        }
    }

    /// Accept writes again
    pub fn heal(&self) {
        self.fail_from.store(0, Ordering::SeqCst);
    }

    /// Save attempts so far, failed ones included
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SagaStore for FlakySagaStore {
    async fn save(&self, saga: &CreateNetworkSaga) -> Result<()> {
        let attempt = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_from = self.fail_from.load(Ordering::SeqCst);
        if fail_from != 0 && attempt >= fail_from {
            return Err(BnError::storage(format!("saga write {attempt} lost")));
        }
        self.inner.save(saga).await
    }

    async fn load(&self, id: SagaId) -> Result<Option<CreateNetworkSaga>> {
        self.inner.load(id).await
    }

    async fn list(&self) -> Result<Vec<CreateNetworkSaga>> {
        self.inner.list().await
    }
}

/// Consensus service that answers only after a delay
pub struct DelayedConsensus {
    inner: Arc<dyn ConsensusService>,
    delay: Duration,
}

impl DelayedConsensus {
    /// Delay every finalisation of `inner` by `delay`
    pub fn new(inner: Arc<dyn ConsensusService>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl ConsensusService for DelayedConsensus {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn finalize(&self, transition: &SignedTransition) -> Result<FinalityProof> {
        tokio::time::sleep(self.delay).await;
        self.inner.finalize(transition).await
    }
}
