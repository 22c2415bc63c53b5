//! Process-scoped deserialization allow-list
//!
//! Some consensus implementations only accept a narrow set of wire types. The
//! resolver installs the filter such an implementation declares into a
//! [`SerialFilterSlot`]. The slot accepts exactly one filter for its lifetime:
//! a later install is rejected so a weaker filter can never replace a stronger
//! one already in force.

use bnet_core::{BnError, Result};
use once_cell::sync::{Lazy, OnceCell};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Predicate deciding whether a wire type may be deserialized
pub type FilterPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Named deserialization filter
#[derive(Clone)]
pub struct SerialFilter {
    name: String,
    predicate: FilterPredicate,
}

impl SerialFilter {
    /// Filter backed by an arbitrary predicate
    pub fn new(name: impl Into<String>, predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Filter admitting only the listed type names
    pub fn allow_list<I, S>(name: impl Into<String>, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: BTreeSet<String> = types.into_iter().map(Into::into).collect();
        Self::new(name, move |type_name| allowed.contains(type_name))
    }

    /// Filter name, used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the type may be deserialized
    pub fn allows(&self, type_name: &str) -> bool {
        (self.predicate)(type_name)
    }
}

impl fmt::Debug for SerialFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialFilter").field("name", &self.name).finish()
    }
}

static PROCESS_SLOT: Lazy<Arc<SerialFilterSlot>> = Lazy::new(|| Arc::new(SerialFilterSlot::new()));

/// Install-once holder for the active deserialization filter
#[derive(Debug, Default)]
pub struct SerialFilterSlot {
    installed: OnceCell<SerialFilter>,
}

impl SerialFilterSlot {
    /// Empty slot; no filter means every type is admitted
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot shared by the whole process
    pub fn process() -> Arc<SerialFilterSlot> {
        Arc::clone(&PROCESS_SLOT)
    }

    /// Install `filter`, or reject it if a filter is already in force
    pub fn install(&self, filter: SerialFilter) -> Result<()> {
        match self.installed.set(filter) {
            Ok(()) => {
                info!(filter = %self.active_name().unwrap_or_default(), "Installed deserialization filter");
                Ok(())
            }
            Err(rejected) => {
                let installed = self.active_name().unwrap_or_default();
                warn!(installed = %installed, rejected = %rejected.name(), "Refusing second deserialization filter");
                Err(BnError::FilterAlreadyInstalled {
                    installed,
                    rejected: rejected.name().to_string(),
                })
            }
        }
    }

    /// Filter currently in force
    pub fn active(&self) -> Option<&SerialFilter> {
        self.installed.get()
    }

    fn active_name(&self) -> Option<String> {
        self.active().map(|filter| filter.name().to_string())
    }

    /// Whether the type may be deserialized under the active filter
    pub fn allows(&self, type_name: &str) -> bool {
        self.active().map_or(true, |filter| filter.allows(type_name))
    }

    /// Fail with a serialization error if the type is not admitted
    pub fn check(&self, type_name: &str) -> Result<()> {
        if self.allows(type_name) {
            Ok(())
        } else {
            Err(BnError::serialization(format!(
                "type {type_name} rejected by deserialization filter"
            )))
        }
    }
}
