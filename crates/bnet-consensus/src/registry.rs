//! Registry of consensus service implementations
//!
//! Built-ins are registered when the registry is created; extensions are
//! added by an explicit [`ServiceRegistry::register_extension`] call during
//! startup. Resolution is a plain name lookup.

use bnet_core::{BnError, ConsensusService, ConsensusServiceDescriptor, NodeIdentity, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::builtin::{BftService, BuiltinAlgorithm, ReplicatedLogService, SingleCoordinatorService};
use crate::serial_filter::{SerialFilter, SerialFilterSlot};

/// Everything a factory may use to build a service
#[derive(Debug, Clone)]
pub struct ServiceContext {
    /// Identity the service signs finality proofs with
    pub identity: NodeIdentity,
    /// The descriptor being resolved, including algorithm parameters
    pub descriptor: ConsensusServiceDescriptor,
    /// Filter slot wire decoding must consult
    pub filter_slot: Arc<SerialFilterSlot>,
}

/// Builds a consensus service for a resolved descriptor
pub type ServiceFactory =
    Arc<dyn Fn(&ServiceContext) -> Result<Arc<dyn ConsensusService>> + Send + Sync>;

/// A named implementation and its optional deserialization filter
#[derive(Clone)]
pub struct ServiceEntry {
    name: String,
    factory: ServiceFactory,
    serial_filter: Option<SerialFilter>,
}

impl ServiceEntry {
    /// Entry built by `factory`
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ServiceContext) -> Result<Arc<dyn ConsensusService>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            serial_filter: None,
        }
    }

    /// Declare the deserialization filter this implementation requires
    pub fn with_serial_filter(mut self, filter: SerialFilter) -> Self {
        self.serial_filter = Some(filter);
        self
    }

    /// Registered name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared filter
    pub fn serial_filter(&self) -> Option<&SerialFilter> {
        self.serial_filter.as_ref()
    }

    /// Instantiate the service
    pub fn instantiate(&self, context: &ServiceContext) -> Result<Arc<dyn ConsensusService>> {
        (self.factory)(context)
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("name", &self.name)
            .field("serial_filter", &self.serial_filter)
            .finish()
    }
}

fn builtin_entry(algorithm: BuiltinAlgorithm) -> ServiceEntry {
    match algorithm {
        BuiltinAlgorithm::SingleCoordinator => ServiceEntry::new(algorithm.name(), |ctx| {
            Ok(Arc::new(SingleCoordinatorService::new(ctx.identity.clone())) as Arc<dyn ConsensusService>)
        }),
        BuiltinAlgorithm::Bft => ServiceEntry::new(algorithm.name(), |ctx| {
            let params = ctx
                .descriptor
                .bft
                .as_ref()
                .ok_or_else(|| BnError::invalid("BFT service requires consensus.bft parameters"))?;
            let service = BftService::new(ctx.identity.clone(), params, ctx.filter_slot.clone())?;
            Ok(Arc::new(service) as Arc<dyn ConsensusService>)
        }),
        BuiltinAlgorithm::ReplicatedLog => ServiceEntry::new(algorithm.name(), |ctx| {
            let params = ctx.descriptor.replicated_log.as_ref().ok_or_else(|| {
                BnError::invalid("replicated log service requires consensus.replicated_log parameters")
            })?;
            let service = ReplicatedLogService::new(ctx.identity.clone(), params, ctx.filter_slot.clone())?;
            Ok(Arc::new(service) as Arc<dyn ConsensusService>)
        }),
    }
}

/// Mapping from implementation names to factories
#[derive(Debug, Clone)]
pub struct ServiceRegistry {
    builtins: BTreeMap<BuiltinAlgorithm, ServiceEntry>,
    extensions: BTreeMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    /// Registry holding only the built-in algorithms
    pub fn with_builtins() -> Self {
        let builtins = BuiltinAlgorithm::ALL
            .into_iter()
            .map(|algorithm| (algorithm, builtin_entry(algorithm)))
            .collect();
        Self {
            builtins,
            extensions: BTreeMap::new(),
        }
    }

    /// Register an externally supplied implementation
    pub fn register_extension(&mut self, entry: ServiceEntry) -> Result<()> {
        if self.extensions.contains_key(entry.name()) {
            return Err(BnError::invalid(format!(
                "consensus extension '{}' registered twice",
                entry.name()
            )));
        }
        tracing::debug!(name = %entry.name(), "Registered consensus extension");
        self.extensions.insert(entry.name().to_string(), entry);
        Ok(())
    }

    /// Built-in entry
    pub fn builtin(&self, algorithm: BuiltinAlgorithm) -> Option<&ServiceEntry> {
        self.builtins.get(&algorithm)
    }

    /// Extension entry by name
    pub fn extension(&self, name: &str) -> Option<&ServiceEntry> {
        self.extensions.get(name)
    }

    /// Names of the registered extensions, sorted
    pub fn extension_names(&self) -> Vec<String> {
        self.extensions.keys().cloned().collect()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_extension_rejected() {
        let mut registry = ServiceRegistry::with_builtins();
        let entry = ServiceEntry::new("custom", |ctx| {
            Ok(Arc::new(SingleCoordinatorService::new(ctx.identity.clone())) as Arc<dyn ConsensusService>)
        });
        registry.register_extension(entry.clone()).unwrap();
        assert!(registry.register_extension(entry).is_err());
        assert_eq!(registry.extension_names(), vec!["custom".to_string()]);
    }

    #[test]
    fn test_builtins_present() {
        let registry = ServiceRegistry::default();
        for algorithm in BuiltinAlgorithm::ALL {
            assert_eq!(registry.builtin(algorithm).unwrap().name(), algorithm.name());
        }
        assert!(registry.extension_names().is_empty());
    }
}
