//! Built-in consensus services
//!
//! Replica transport is outside this workspace, so the multi-replica
//! algorithms keep their replicas in process and exchange wire-encoded
//! messages through [`crate::wire`]. Every service verifies the required
//! signatures of a transition before it considers the inputs.

use bnet_core::{SignedTransition, StateRef, TxId};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod bft;
pub mod replicated_log;
pub mod single;

pub use bft::BftService;
pub use replicated_log::ReplicatedLogService;
pub use single::SingleCoordinatorService;

/// Algorithms shipped with the workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinAlgorithm {
    /// One node decides; the default
    SingleCoordinator,
    /// Byzantine-fault-tolerant replica quorum
    Bft,
    /// Leader-based replicated log with majority commit
    ReplicatedLog,
}

impl BuiltinAlgorithm {
    /// Every built-in
    pub const ALL: [BuiltinAlgorithm; 3] = [
        BuiltinAlgorithm::SingleCoordinator,
        BuiltinAlgorithm::Bft,
        BuiltinAlgorithm::ReplicatedLog,
    ];

    /// Registry name
    pub fn name(&self) -> &'static str {
        match self {
            Self::SingleCoordinator => "single-coordinator",
            Self::Bft => "bft",
            Self::ReplicatedLog => "replicated-log",
        }
    }
}

impl fmt::Display for BuiltinAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a replica needs to decide on a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniquenessRequest {
    /// Transaction to finalise
    pub tx_id: TxId,
    /// Inputs it consumes
    pub inputs: Vec<StateRef>,
}

impl UniquenessRequest {
    /// Wire type tag
    pub const TYPE_NAME: &'static str = "UniquenessRequest";

    /// Extract the request from a signed transition
    pub fn from_transition(transition: &SignedTransition) -> Self {
        Self {
            tx_id: transition.id(),
            inputs: transition.transition.input_ref().into_iter().collect(),
        }
    }
}

/// Wire type tags for a request about `transition`
pub(crate) fn wire_types(transition: &SignedTransition) -> [&'static str; 2] {
    [
        UniquenessRequest::TYPE_NAME,
        transition.transition.body().output.type_name(),
    ]
}
