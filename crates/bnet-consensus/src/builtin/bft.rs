//! Byzantine-fault-tolerant replica quorum
//!
//! With `n` replicas the service tolerates `f = (n - 1) / 3` faulty ones and
//! needs `(n + f) / 2 + 1` matching accept votes to finalise. More than `f`
//! conflict votes prove the input was already spent and the request is
//! rejected. A round runs in two phases: every reachable replica votes on
//! the request, then the accepting replicas apply it, so a replica that
//! missed earlier rounds cannot commit a double spend on its own.

use async_trait::async_trait;
use bnet_core::{
    BftParams, BnError, ConsensusService, FinalityProof, NodeIdentity, Result, SignedTransition,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{wire_types, BuiltinAlgorithm, UniquenessRequest};
use crate::serial_filter::SerialFilterSlot;
use crate::uniqueness::UniquenessProvider;
use crate::wire;

#[derive(Debug)]
struct BftReplica {
    address: String,
    online: AtomicBool,
    provider: UniquenessProvider,
}

enum Vote {
    Accept,
    Reject(BnError),
}

/// BFT quorum over an in-process replica set
pub struct BftService {
    identity: NodeIdentity,
    replica_id: usize,
    replicas: Vec<BftReplica>,
    fault_tolerance: usize,
    quorum: usize,
    sequence: Mutex<u64>,
    filter: Arc<SerialFilterSlot>,
}

impl BftService {
    /// Build the replica set described by `params`
    pub fn new(identity: NodeIdentity, params: &BftParams, filter: Arc<SerialFilterSlot>) -> Result<Self> {
        let n = params.cluster_addresses.len();
        if n == 0 || params.replica_id >= n {
            return Err(BnError::invalid(format!(
                "BFT replica {} outside cluster of {n}",
                params.replica_id
            )));
        }
        let fault_tolerance = (n - 1) / 3;
        let quorum = (n + fault_tolerance) / 2 + 1;
        let replicas = params
            .cluster_addresses
            .iter()
            .map(|address| BftReplica {
                address: address.clone(),
                online: AtomicBool::new(true),
                provider: UniquenessProvider::new(),
            })
            .collect();

        debug!(replicas = n, fault_tolerance, quorum, "Starting BFT service");
        Ok(Self {
            identity,
            replica_id: params.replica_id,
            replicas,
            fault_tolerance,
            quorum,
            sequence: Mutex::new(0),
            filter,
        })
    }

    /// Replicas that may be faulty without losing safety
    pub fn fault_tolerance(&self) -> usize {
        self.fault_tolerance
    }

    /// Accept votes needed to finalise
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Take a replica offline or bring it back
    pub fn set_replica_online(&self, index: usize, online: bool) -> Result<()> {
        let replica = self
            .replicas
            .get(index)
            .ok_or_else(|| BnError::not_found(format!("BFT replica {index}")))?;
        replica.online.store(online, Ordering::SeqCst);
        Ok(())
    }

    fn vote(&self, replica: &BftReplica, message: &[u8]) -> Vote {
        let request: UniquenessRequest = match wire::decode(message, &self.filter) {
            Ok(request) => request,
            Err(e) => return Vote::Reject(e),
        };
        match replica.provider.check(request.tx_id, &request.inputs) {
            Ok(()) => Vote::Accept,
            Err(e) => Vote::Reject(e),
        }
    }
}

#[async_trait]
impl ConsensusService for BftService {
    fn name(&self) -> &str {
        BuiltinAlgorithm::Bft.name()
    }

    async fn finalize(&self, transition: &SignedTransition) -> Result<FinalityProof> {
        transition.verify_required_signatures()?;
        let request = UniquenessRequest::from_transition(transition);
        let message = wire::encode(&wire_types(transition), &request)?;

        let mut sequence = self.sequence.lock();

        let mut accepting = Vec::new();
        let mut conflicts = Vec::new();
        let mut failures = Vec::new();
        for replica in self.replicas.iter().filter(|r| r.online.load(Ordering::SeqCst)) {
            match self.vote(replica, &message) {
                Vote::Accept => accepting.push(replica),
                Vote::Reject(err @ BnError::Conflict { .. }) => conflicts.push(err),
                Vote::Reject(err) => {
                    warn!(replica = %replica.address, error = %err, "Replica failed to vote");
                    failures.push(err);
                }
            }
        }

        if conflicts.len() > self.fault_tolerance {
            warn!(tx_id = %request.tx_id, conflicts = conflicts.len(), "BFT quorum reported conflict");
            return Err(conflicts.remove(0));
        }
        if accepting.len() < self.quorum {
            let reason = failures
                .first()
                .map(|e| format!(": {e}"))
                .unwrap_or_default();
            return Err(BnError::finality(format!(
                "{} of {} replicas accepted transaction {}, quorum is {}{reason}",
                accepting.len(),
                self.replicas.len(),
                request.tx_id,
                self.quorum
            )));
        }

        let assigned = match accepting
            .iter()
            .find_map(|replica| replica.provider.sequence_of(&request.tx_id))
        {
            Some(existing) => existing,
            None => {
                *sequence += 1;
                *sequence
            }
        };
        for replica in &accepting {
            replica.provider.apply(request.tx_id, &request.inputs, assigned);
        }

        debug!(
            tx_id = %request.tx_id,
            sequence = assigned,
            votes = accepting.len(),
            leader = self.replica_id,
            "BFT quorum finalised transaction"
        );
        Ok(FinalityProof::issue(
            &self.identity,
            self.name(),
            request.tx_id,
            assigned,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnet_core::PartyId;

    fn params(n: usize) -> BftParams {
        BftParams {
            replica_id: 0,
            cluster_addresses: (0..n).map(|i| format!("bft{i}:11000")).collect(),
        }
    }

    #[test]
    fn test_quorum_sizes() {
        let identity = NodeIdentity::from_seed(PartyId::new("O=BFT,L=Zurich,C=CH"), [3u8; 32]);
        let slot = Arc::new(SerialFilterSlot::new());

        let single = BftService::new(identity.clone(), &params(1), slot.clone()).unwrap();
        assert_eq!((single.fault_tolerance(), single.quorum()), (0, 1));

        let four = BftService::new(identity.clone(), &params(4), slot.clone()).unwrap();
        assert_eq!((four.fault_tolerance(), four.quorum()), (1, 3));

        let seven = BftService::new(identity, &params(7), slot).unwrap();
        assert_eq!((seven.fault_tolerance(), seven.quorum()), (2, 5));
    }

    #[test]
    fn test_replica_out_of_range() {
        let identity = NodeIdentity::from_seed(PartyId::new("O=BFT,L=Zurich,C=CH"), [3u8; 32]);
        let mut bad = params(4);
        bad.replica_id = 4;
        assert!(BftService::new(identity, &bad, Arc::new(SerialFilterSlot::new())).is_err());
    }
}
