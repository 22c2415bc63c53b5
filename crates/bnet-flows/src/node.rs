//! Node assembly
//!
//! ```rust,ignore
//! let node = NodeBuilder::new(config, identity)
//!     .with_registry(registry)
//!     .build()?;
//! let created = node.orchestrator().start(CreateNetworkRequest::new("NET-1")).await?;
//! ```

use bnet_consensus::{ConsensusResolver, ConsensusServiceHandle, SerialFilterSlot, ServiceRegistry};
use bnet_core::{
    ConsensusService, ContractValidator, MembershipQuery, NodeConfig, NodeIdentity, PartyId,
    Result, SignatureCollector, SystemClock, TimeSource, VaultStore,
};
use std::sync::Arc;
use tracing::info;

use crate::contract::BusinessNetworkContract;
use crate::groups::RelationshipGroupManager;
use crate::guard::DuplicateNetworkGuard;
use crate::membership::MembershipManager;
use crate::orchestrator::{MemorySagaStore, MembershipLifecycleOrchestrator, SagaStore};
use crate::pipeline::CommitPipeline;
use crate::signing::KeyStoreSigner;
use crate::vault::MemoryVault;

/// Builder for a node's membership services
pub struct NodeBuilder {
    config: NodeConfig,
    identity: NodeIdentity,
    registry: Option<ServiceRegistry>,
    filter_slot: Option<Arc<SerialFilterSlot>>,
    consensus: Option<Arc<dyn ConsensusService>>,
    validator: Option<Arc<dyn ContractValidator>>,
    signer: Option<Arc<dyn SignatureCollector>>,
    vault: Option<MemoryVault>,
    saga_store: Option<Arc<dyn SagaStore>>,
    clock: Option<Arc<dyn TimeSource>>,
}

impl NodeBuilder {
    /// Builder for the node described by `config`, acting as `identity`
    pub fn new(config: NodeConfig, identity: NodeIdentity) -> Self {
        Self {
            config,
            identity,
            registry: None,
            filter_slot: None,
            consensus: None,
            validator: None,
            signer: None,
            vault: None,
            saga_store: None,
            clock: None,
        }
    }

    /// Resolve consensus against this registry instead of the built-ins only
    pub fn with_registry(mut self, registry: ServiceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Install filters into this slot instead of the process-wide one
    pub fn with_filter_slot(mut self, slot: Arc<SerialFilterSlot>) -> Self {
        self.filter_slot = Some(slot);
        self
    }

    /// Use an already running consensus service, skipping resolution
    pub fn with_consensus(mut self, consensus: Arc<dyn ConsensusService>) -> Self {
        self.consensus = Some(consensus);
        self
    }

    /// Replace the contract validator
    pub fn with_validator(mut self, validator: Arc<dyn ContractValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace the signature collector
    pub fn with_signer(mut self, signer: Arc<dyn SignatureCollector>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Use an existing vault
    pub fn with_vault(mut self, vault: MemoryVault) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Replace the saga store
    pub fn with_saga_store(mut self, store: Arc<dyn SagaStore>) -> Self {
        self.saga_store = Some(store);
        self
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate configuration, bind consensus and wire the components
    pub fn build(self) -> Result<BusinessNetworkNode> {
        self.config.validate()?;
        let party = self.identity.party().clone();

        let consensus: Arc<dyn ConsensusService> = match self.consensus {
            Some(consensus) => consensus,
            None => {
                let mut resolver = ConsensusResolver::new(self.registry.unwrap_or_default());
                if let Some(slot) = self.filter_slot {
                    resolver = resolver.with_filter_slot(slot);
                }
                let handle: ConsensusServiceHandle =
                    resolver.resolve(&self.config.consensus, Some(self.identity.clone()))?;
                Arc::new(handle)
            }
        };

        let vault = self.vault.unwrap_or_default();
        let vault_store: Arc<dyn VaultStore> = Arc::new(vault.clone());
        let query: Arc<dyn MembershipQuery> = Arc::new(vault.clone());
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(BusinessNetworkContract::new()));
        let signer = self
            .signer
            .unwrap_or_else(|| Arc::new(KeyStoreSigner::with_identity(self.identity.clone())));
        let saga_store = self
            .saga_store
            .unwrap_or_else(|| Arc::new(MemorySagaStore::new()));

        let pipeline = Arc::new(CommitPipeline::new(
            party.clone(),
            validator,
            signer,
            Arc::clone(&consensus),
            Arc::clone(&vault_store),
            Arc::clone(&query),
            Arc::clone(&clock),
            &self.config.pipeline,
        ));
        let memberships = MembershipManager::new(Arc::clone(&pipeline), Arc::clone(&query));
        let groups = RelationshipGroupManager::new(Arc::clone(&pipeline));
        let orchestrator = Arc::new(MembershipLifecycleOrchestrator::new(
            DuplicateNetworkGuard::new(Arc::clone(&query)),
            memberships.clone(),
            groups.clone(),
            vault_store,
            saga_store,
            clock,
            self.config.saga.clone(),
        ));

        info!(party = %party, consensus = %consensus.name(), "Node services ready");
        Ok(BusinessNetworkNode {
            party,
            consensus,
            vault,
            memberships,
            groups,
            orchestrator,
        })
    }
}

/// A node's wired membership services
#[derive(Clone)]
pub struct BusinessNetworkNode {
    party: PartyId,
    consensus: Arc<dyn ConsensusService>,
    vault: MemoryVault,
    memberships: MembershipManager,
    groups: RelationshipGroupManager,
    orchestrator: Arc<MembershipLifecycleOrchestrator>,
}

impl BusinessNetworkNode {
    /// Party this node acts for
    pub fn party(&self) -> &PartyId {
        &self.party
    }

    /// Bound consensus service
    pub fn consensus(&self) -> &Arc<dyn ConsensusService> {
        &self.consensus
    }

    /// Local vault and read model
    pub fn vault(&self) -> &MemoryVault {
        &self.vault
    }

    /// Membership management
    pub fn memberships(&self) -> &MembershipManager {
        &self.memberships
    }

    /// Relationship group management
    pub fn groups(&self) -> &RelationshipGroupManager {
        &self.groups
    }

    /// Network creation saga driver
    pub fn orchestrator(&self) -> &Arc<MembershipLifecycleOrchestrator> {
        &self.orchestrator
    }
}
