//! Multi-node test network
//!
//! Every node shares one consensus service, one key store standing in for
//! peer signature collection, and one stepping clock. Each node keeps its own
//! vault, so reads are local exactly as on separate machines.

use bnet_consensus::SingleCoordinatorService;
use bnet_core::{ConsensusService, NodeConfig, NodeIdentity, PartyId};
use bnet_flows::{BusinessNetworkNode, KeyStoreSigner, NodeBuilder};
use std::ops::Deref;
use std::sync::Arc;

use crate::time::SteppingClock;
use crate::transitions::party_identity;

/// Legal name of the default notary
pub const NOTARY: &str = "O=Notary,L=London,C=GB";

/// Nodes sharing consensus, signing reachability and time
pub struct TestNetwork {
    consensus: Arc<dyn ConsensusService>,
    signer: Arc<KeyStoreSigner>,
    clock: Arc<SteppingClock>,
}

impl TestNetwork {
    /// Network finalised by a single coordinator
    pub fn new() -> Self {
        Self::with_consensus(Arc::new(SingleCoordinatorService::new(party_identity(NOTARY))))
    }

    /// Network finalised by `consensus`
    pub fn with_consensus(consensus: Arc<dyn ConsensusService>) -> Self {
        Self {
            consensus,
            signer: Arc::new(KeyStoreSigner::new()),
            clock: Arc::new(SteppingClock::default()),
        }
    }

    /// Shared consensus service
    pub fn consensus(&self) -> &Arc<dyn ConsensusService> {
        &self.consensus
    }

    /// Shared key store
    pub fn signer(&self) -> &Arc<KeyStoreSigner> {
        &self.signer
    }

    /// Shared clock
    pub fn clock(&self) -> &Arc<SteppingClock> {
        &self.clock
    }

    /// Register a party that can sign but runs no node
    pub fn party(&self, legal_name: &str) -> PartyId {
        let identity = party_identity(legal_name);
        self.signer.add_identity(identity.clone());
        identity.party().clone()
    }

    /// Builder for a node, already wired to the shared collaborators
    pub fn builder(&self, legal_name: &str) -> NodeBuilder {
        let identity = party_identity(legal_name);
        self.signer.add_identity(identity.clone());
        NodeBuilder::new(NodeConfig::test(legal_name), identity)
            .with_consensus(Arc::clone(&self.consensus))
            .with_signer(self.signer.clone())
            .with_clock(self.clock.clone())
    }

    /// Start a node with default collaborators
    pub fn node(&self, legal_name: &str) -> TestNode {
        self.node_with(legal_name, |builder| builder)
    }

    /// Start a node after customising its builder
    pub fn node_with(&self, legal_name: &str, customise: impl FnOnce(NodeBuilder) -> NodeBuilder) -> TestNode {
        let identity = party_identity(legal_name);
        let node = customise(self.builder(legal_name)).build().unwrap();
        TestNode { identity, node }
    }
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// A started node and its identity
pub struct TestNode {
    identity: NodeIdentity,
    node: BusinessNetworkNode,
}

impl TestNode {
    /// Signing identity of the node's party
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }
}

impl Deref for TestNode {
    type Target = BusinessNetworkNode;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}
