//! Single-coordinator service: one node owns the uniqueness record

use async_trait::async_trait;
use bnet_core::{ConsensusService, FinalityProof, NodeIdentity, Result, SignedTransition};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::{BuiltinAlgorithm, UniquenessRequest};
use crate::uniqueness::UniquenessProvider;

/// Finalises transitions against a single local uniqueness provider
#[derive(Debug)]
pub struct SingleCoordinatorService {
    identity: NodeIdentity,
    provider: UniquenessProvider,
    sequence: AtomicU64,
}

impl SingleCoordinatorService {
    /// Create a coordinator signing proofs with `identity`
    pub fn new(identity: NodeIdentity) -> Self {
        Self {
            identity,
            provider: UniquenessProvider::new(),
            sequence: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ConsensusService for SingleCoordinatorService {
    fn name(&self) -> &str {
        BuiltinAlgorithm::SingleCoordinator.name()
    }

    async fn finalize(&self, transition: &SignedTransition) -> Result<FinalityProof> {
        transition.verify_required_signatures()?;
        let request = UniquenessRequest::from_transition(transition);

        let sequence = self.provider.commit(request.tx_id, &request.inputs, || {
            self.sequence.fetch_add(1, Ordering::SeqCst) + 1
        })?;

        debug!(tx_id = %request.tx_id, sequence, "Coordinator finalised transaction");
        Ok(FinalityProof::issue(
            &self.identity,
            self.name(),
            request.tx_id,
            sequence,
        ))
    }
}
