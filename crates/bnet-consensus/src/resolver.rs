//! Startup resolution of the consensus service
//!
//! Selection rules:
//! - an external name (blank counts as absent) is looked up among the
//!   registered extensions only;
//! - otherwise the built-in is chosen by which parameter block is populated,
//!   single-coordinator when none is, and more than one is an error.
//!
//! A node identity is mandatory. If the chosen implementation declares a
//! deserialization filter it is installed before the service is built.

use async_trait::async_trait;
use bnet_core::{
    BnError, ConsensusService, ConsensusServiceDescriptor, FinalityProof, NodeIdentity, Result,
    SignedTransition,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::builtin::BuiltinAlgorithm;
use crate::registry::{ServiceContext, ServiceEntry, ServiceRegistry};
use crate::serial_filter::SerialFilterSlot;

/// Which implementation a descriptor selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusAlgorithm {
    /// A workspace built-in
    Builtin(BuiltinAlgorithm),
    /// A registered extension
    External(String),
}

impl fmt::Display for ConsensusAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin(algorithm) => write!(f, "{algorithm}"),
            Self::External(name) => write!(f, "external:{name}"),
        }
    }
}

/// The consensus service bound for this process
#[derive(Clone)]
pub struct ConsensusServiceHandle {
    algorithm: ConsensusAlgorithm,
    service: Arc<dyn ConsensusService>,
}

impl ConsensusServiceHandle {
    /// Wrap an already constructed service
    pub fn new(algorithm: ConsensusAlgorithm, service: Arc<dyn ConsensusService>) -> Self {
        Self { algorithm, service }
    }

    /// Selected implementation
    pub fn algorithm(&self) -> &ConsensusAlgorithm {
        &self.algorithm
    }

    /// Underlying service
    pub fn service(&self) -> Arc<dyn ConsensusService> {
        Arc::clone(&self.service)
    }
}

impl fmt::Debug for ConsensusServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsensusServiceHandle")
            .field("algorithm", &self.algorithm)
            .field("service", &self.service.name())
            .finish()
    }
}

#[async_trait]
impl ConsensusService for ConsensusServiceHandle {
    fn name(&self) -> &str {
        self.service.name()
    }

    async fn finalize(&self, transition: &SignedTransition) -> Result<FinalityProof> {
        self.service.finalize(transition).await
    }
}

/// Resolves descriptors against a registry
#[derive(Debug, Clone)]
pub struct ConsensusResolver {
    registry: ServiceRegistry,
    filter_slot: Arc<SerialFilterSlot>,
}

impl ConsensusResolver {
    /// Resolver installing filters into the process-wide slot
    pub fn new(registry: ServiceRegistry) -> Self {
        Self {
            registry,
            filter_slot: SerialFilterSlot::process(),
        }
    }

    /// Use a specific filter slot instead of the process-wide one
    pub fn with_filter_slot(mut self, filter_slot: Arc<SerialFilterSlot>) -> Self {
        self.filter_slot = filter_slot;
        self
    }

    /// The slot filters are installed into
    pub fn filter_slot(&self) -> &Arc<SerialFilterSlot> {
        &self.filter_slot
    }

    /// Pick the implementation a descriptor names, without side effects
    pub fn select(
        &self,
        descriptor: &ConsensusServiceDescriptor,
    ) -> Result<(ConsensusAlgorithm, &ServiceEntry)> {
        if let Some(name) = descriptor.external_name() {
            let available = self.registry.extension_names();
            debug!(available = ?available, "Consensus service implementations found");
            return self
                .registry
                .extension(name)
                .map(|entry| (ConsensusAlgorithm::External(name.to_string()), entry))
                .ok_or_else(|| BnError::ServiceNotFound {
                    requested: name.to_string(),
                    available,
                });
        }

        let algorithm = match descriptor.populated_algorithms().as_slice() {
            [] => BuiltinAlgorithm::SingleCoordinator,
            [ConsensusServiceDescriptor::BFT] => BuiltinAlgorithm::Bft,
            [ConsensusServiceDescriptor::REPLICATED_LOG] => BuiltinAlgorithm::ReplicatedLog,
            populated => {
                return Err(BnError::AmbiguousConfiguration {
                    algorithms: populated.iter().map(|a| a.to_string()).collect(),
                });
            }
        };
        let entry = self
            .registry
            .builtin(algorithm)
            .ok_or_else(|| BnError::not_found(format!("built-in {algorithm} not registered")))?;
        Ok((ConsensusAlgorithm::Builtin(algorithm), entry))
    }

    /// Select, bind the node identity, build the service and install any declared filter
    pub fn resolve(
        &self,
        descriptor: &ConsensusServiceDescriptor,
        node_identity: Option<NodeIdentity>,
    ) -> Result<ConsensusServiceHandle> {
        let (algorithm, entry) = self.select(descriptor)?;
        descriptor.validate()?;
        info!(service = %algorithm, "Starting consensus service");

        let identity = node_identity.ok_or_else(|| BnError::MissingIdentity {
            service: algorithm.to_string(),
        })?;

        let context = ServiceContext {
            identity,
            descriptor: descriptor.clone(),
            filter_slot: Arc::clone(&self.filter_slot),
        };
        let service = entry.instantiate(&context)?;

        // A service that failed to build must not leave its filter in force.
        // Nothing is decoded before `resolve` returns.
        if let Some(filter) = entry.serial_filter() {
            self.filter_slot.install(filter.clone())?;
        }
        Ok(ConsensusServiceHandle::new(algorithm, service))
    }
}
