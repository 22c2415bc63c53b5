//! Signature collection from locally reachable parties

use async_trait::async_trait;
use bnet_core::{
    BnError, NodeIdentity, PartyId, ProposedTransition, Result, SignatureCollector,
    TransitionSignature,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Signs with every identity it holds; any other party is unreachable
#[derive(Debug, Default)]
pub struct KeyStoreSigner {
    identities: RwLock<BTreeMap<PartyId, NodeIdentity>>,
}

impl KeyStoreSigner {
    /// Empty key store
    pub fn new() -> Self {
        Self::default()
    }

    /// Key store holding one identity
    pub fn with_identity(identity: NodeIdentity) -> Self {
        let signer = Self::new();
        signer.add_identity(identity);
        signer
    }

    /// Make another party reachable
    pub fn add_identity(&self, identity: NodeIdentity) {
        self.identities
            .write()
            .insert(identity.party().clone(), identity);
    }

    /// Make a party unreachable
    pub fn remove_identity(&self, party: &PartyId) -> Option<NodeIdentity> {
        self.identities.write().remove(party)
    }
}

#[async_trait]
impl SignatureCollector for KeyStoreSigner {
    async fn collect(
        &self,
        transition: &ProposedTransition,
        required_signers: &BTreeSet<PartyId>,
    ) -> Result<Vec<TransitionSignature>> {
        let identities = self.identities.read();
        required_signers
            .iter()
            .map(|party| {
                let identity = identities
                    .get(party)
                    .ok_or_else(|| BnError::signature(party.clone(), "party unreachable"))?;
                debug!(party = %party, tx_id = %transition.id(), "Signed transition");
                Ok(TransitionSignature::sign(identity, transition))
            })
            .collect()
    }
}
