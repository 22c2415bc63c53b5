//! Commit pipeline: one transition from proposal to durable record
//!
//! Each submission builds a transition over the optional prior version,
//! validates it, collects the required signatures and hands it to the bound
//! consensus service. The wait for finality is unbounded but monitored: a
//! warning is logged every `finality_warn_interval` until the service answers.
//! A conflict is returned to the caller as is; nothing here retries.

use bnet_core::{
    BnError, CommittedRecord, ConsensusService, ContractValidator, FinalityProof,
    MembershipQuery, PartyId, PipelineConfig, ProposedChange, ProposedTransition, Result, SignatureCollector,
    SignedTransition, TimeSource, TransitionBody, VaultStore,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Drives single transitions to finality on behalf of one party
pub struct CommitPipeline {
    party: PartyId,
    validator: Arc<dyn ContractValidator>,
    signer: Arc<dyn SignatureCollector>,
    consensus: Arc<dyn ConsensusService>,
    vault: Arc<dyn VaultStore>,
    ledger: Arc<dyn MembershipQuery>,
    clock: Arc<dyn TimeSource>,
    finality_warn_interval: Duration,
}

impl CommitPipeline {
    /// Assemble a pipeline proposing transitions as `party`
    pub fn new(
        party: PartyId,
        validator: Arc<dyn ContractValidator>,
        signer: Arc<dyn SignatureCollector>,
        consensus: Arc<dyn ConsensusService>,
        vault: Arc<dyn VaultStore>,
        ledger: Arc<dyn MembershipQuery>,
        clock: Arc<dyn TimeSource>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            party,
            validator,
            signer,
            consensus,
            vault,
            ledger,
            clock,
            finality_warn_interval: config.finality_warn_interval().max(Duration::from_millis(1)),
        }
    }

    /// Party proposing transitions
    pub fn party(&self) -> &PartyId {
        &self.party
    }

    /// Time source used for record timestamps
    pub fn clock(&self) -> &Arc<dyn TimeSource> {
        &self.clock
    }

    /// Vault committed records are written to
    pub fn vault(&self) -> &Arc<dyn VaultStore> {
        &self.vault
    }

    /// Submit one change and wait for it to become durable
    pub async fn submit(
        &self,
        prior: Option<&CommittedRecord>,
        change: ProposedChange,
        required_signers: BTreeSet<PartyId>,
    ) -> Result<CommittedRecord> {
        let command = change.command;
        let transition = ProposedTransition::seal(TransitionBody {
            input: prior.map(CommittedRecord::resolved),
            output: change.output,
            command,
            references: change.references,
            required_signers,
            proposer: self.party.clone(),
            nonce: Uuid::new_v4(),
            created_at: self.clock.now(),
        })?;
        let tx_id = transition.id();
        debug!(tx_id = %tx_id, command = %command, "Proposed transition");

        self.validator
            .validate(&transition, self.ledger.as_ref())
            .await?;

        let signatures = self
            .signer
            .collect(&transition, &transition.body().required_signers)
            .await?;
        let signed = SignedTransition {
            transition,
            signatures,
        };
        signed.verify_required_signatures()?;

        let proof = match self.await_finality(&signed).await {
            Ok(proof) => proof,
            Err(err @ BnError::Conflict { .. }) => {
                warn!(tx_id = %tx_id, command = %command, error = %err, "Prior version no longer current");
                return Err(err);
            }
            Err(err) => {
                warn!(tx_id = %tx_id, command = %command, error = %err, "Finality outcome unknown");
                return Err(err);
            }
        };
        proof.verify(&tx_id)?;

        let committed = CommittedRecord::from_finalised(&signed.transition, proof);
        self.vault.record(&committed).await?;
        info!(
            tx_id = %tx_id,
            command = %command,
            sequence = committed.proof.sequence,
            service = %committed.proof.service,
            "Transition committed"
        );
        Ok(committed)
    }

    async fn await_finality(&self, signed: &SignedTransition) -> Result<FinalityProof> {
        let started = Instant::now();
        let finality = self.consensus.finalize(signed);
        tokio::pin!(finality);

        let mut monitor = interval(self.finality_warn_interval);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        monitor.tick().await;

        loop {
            tokio::select! {
                outcome = &mut finality => return outcome,
                _ = monitor.tick() => {
                    warn!(
                        tx_id = %signed.id(),
                        service = %self.consensus.name(),
                        waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Still awaiting finality"
                    );
                }
            }
        }
    }
}
