//! Leader-based replicated log
//!
//! This node leads. A request is checked against the leader's applied state,
//! appended as the next log entry and shipped to every reachable follower;
//! lagging followers first receive the entries they missed. The entry
//! commits once a majority of the replica set holds it, and its log index is
//! the transaction's position in the total order.

use async_trait::async_trait;
use bnet_core::{
    BnError, ConsensusService, FinalityProof, NodeIdentity, ReplicatedLogParams, Result,
    SignedTransition,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{wire_types, BuiltinAlgorithm, UniquenessRequest};
use crate::serial_filter::SerialFilterSlot;
use crate::uniqueness::UniquenessProvider;
use crate::wire;

/// One committed log position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// 1-based log index
    pub index: u64,
    /// Request decided at this index
    pub request: UniquenessRequest,
}

#[derive(Debug)]
struct Follower {
    address: String,
    online: AtomicBool,
    log: Mutex<Vec<LogEntry>>,
}

#[derive(Debug, Default)]
struct Leader {
    log: Vec<(LogEntry, Vec<u8>)>,
    applied: UniquenessProvider,
}

/// Replicated-log service led by this node
pub struct ReplicatedLogService {
    identity: NodeIdentity,
    address: String,
    followers: Vec<Follower>,
    majority: usize,
    leader: Mutex<Leader>,
    filter: Arc<SerialFilterSlot>,
}

impl ReplicatedLogService {
    /// Build the replica set described by `params`; this node is the leader
    pub fn new(identity: NodeIdentity, params: &ReplicatedLogParams, filter: Arc<SerialFilterSlot>) -> Result<Self> {
        let replicas = params.replica_set();
        let Some((leader, others)) = replicas.split_first() else {
            return Err(BnError::invalid("replicated log needs at least one replica"));
        };
        let followers = others
            .iter()
            .map(|address| Follower {
                address: address.clone(),
                online: AtomicBool::new(true),
                log: Mutex::new(Vec::new()),
            })
            .collect();
        let majority = replicas.len() / 2 + 1;

        debug!(leader = %leader, replicas = replicas.len(), majority, "Starting replicated log service");
        Ok(Self {
            identity,
            address: leader.clone(),
            followers,
            majority,
            leader: Mutex::new(Leader::default()),
            filter,
        })
    }

    /// Replicas that must hold an entry before it commits
    pub fn majority(&self) -> usize {
        self.majority
    }

    /// Take a follower offline or bring it back
    pub fn set_follower_online(&self, index: usize, online: bool) -> Result<()> {
        let follower = self
            .followers
            .get(index)
            .ok_or_else(|| BnError::not_found(format!("log follower {index}")))?;
        follower.online.store(online, Ordering::SeqCst);
        Ok(())
    }

    /// Number of entries a follower holds
    pub fn follower_log_len(&self, index: usize) -> Option<usize> {
        self.followers.get(index).map(|f| f.log.lock().len())
    }

    /// Number of committed entries
    pub fn committed_len(&self) -> usize {
        self.leader.lock().log.len()
    }

    /// Ship every entry the follower is missing, ending with `pending`
    fn replicate(&self, follower: &Follower, leader: &Leader, pending: &[u8]) -> Result<()> {
        let mut log = follower.log.lock();
        // Entries beyond the committed prefix were never acknowledged by a majority
        log.truncate(leader.log.len());
        let missing = leader.log[log.len()..]
            .iter()
            .map(|(_, bytes)| bytes.as_slice())
            .chain(std::iter::once(pending));
        for bytes in missing {
            let entry: LogEntry = wire::decode(bytes, &self.filter)?;
            if entry.index != log.len() as u64 + 1 {
                return Err(BnError::finality(format!(
                    "follower {} expected index {} but received {}",
                    follower.address,
                    log.len() + 1,
                    entry.index
                )));
            }
            log.push(entry);
        }
        Ok(())
    }
}

#[async_trait]
impl ConsensusService for ReplicatedLogService {
    fn name(&self) -> &str {
        BuiltinAlgorithm::ReplicatedLog.name()
    }

    async fn finalize(&self, transition: &SignedTransition) -> Result<FinalityProof> {
        transition.verify_required_signatures()?;
        let request = UniquenessRequest::from_transition(transition);

        let mut leader = self.leader.lock();
        if let Some(index) = leader.applied.sequence_of(&request.tx_id) {
            return Ok(FinalityProof::issue(&self.identity, self.name(), request.tx_id, index));
        }
        leader.applied.check(request.tx_id, &request.inputs)?;

        let reachable: Vec<&Follower> = self
            .followers
            .iter()
            .filter(|f| f.online.load(Ordering::SeqCst))
            .collect();
        if reachable.len() + 1 < self.majority {
            return Err(BnError::finality(format!(
                "{} of {} replicas reachable from {}, majority is {}",
                reachable.len() + 1,
                self.followers.len() + 1,
                self.address,
                self.majority
            )));
        }

        let index = leader.log.len() as u64 + 1;
        let entry = LogEntry {
            index,
            request: request.clone(),
        };
        let mut types = vec!["LogEntry"];
        types.extend(wire_types(transition));
        let bytes = wire::encode(&types, &entry)?;

        let mut acks = 1;
        for follower in reachable {
            match self.replicate(follower, &leader, &bytes) {
                Ok(()) => acks += 1,
                Err(e) => warn!(follower = %follower.address, error = %e, "Replication failed"),
            }
        }
        if acks < self.majority {
            return Err(BnError::finality(format!(
                "entry {index} held by {acks} replicas, majority is {}",
                self.majority
            )));
        }

        leader.applied.apply(request.tx_id, &request.inputs, index);
        leader.log.push((entry, bytes));

        debug!(tx_id = %request.tx_id, index, acks, "Log entry committed");
        Ok(FinalityProof::issue(&self.identity, self.name(), request.tx_id, index))
    }
}
