//! Node configuration
//!
//! Loaded from TOML at startup. The `[consensus]` table is the consensus
//! service descriptor handed to the resolver:
//!
//! ```toml
//! legal_name = "O=BNO,L=New York,C=US"
//!
//! [consensus.bft]
//! replica_id = 0
//! cluster_addresses = ["bft0:11000", "bft1:11000", "bft2:11000", "bft3:11000"]
//!
//! [pipeline]
//! finality_warn_interval_ms = 10000
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{BnError, Result};

/// Parameters of the Byzantine-fault-tolerant built-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BftParams {
    /// This node's index in the replica set
    pub replica_id: usize,
    /// Addresses of every replica, including this one
    pub cluster_addresses: Vec<String>,
}

/// Parameters of the replicated-log built-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedLogParams {
    /// This node's replication address
    pub node_address: String,
    /// Addresses of the other replicas
    #[serde(default)]
    pub cluster_addresses: Vec<String>,
}

impl ReplicatedLogParams {
    /// Every replica address with this node first, duplicates removed
    pub fn replica_set(&self) -> Vec<String> {
        let mut replicas = vec![self.node_address.clone()];
        for address in &self.cluster_addresses {
            if !replicas.contains(address) {
                replicas.push(address.clone());
            }
        }
        replicas
    }
}

/// Startup configuration selecting the consensus service implementation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusServiceDescriptor {
    /// Name of an externally registered implementation
    #[serde(default)]
    pub external_service: Option<String>,
    /// Byzantine-fault-tolerant parameters
    #[serde(default)]
    pub bft: Option<BftParams>,
    /// Replicated-log parameters
    #[serde(default)]
    pub replicated_log: Option<ReplicatedLogParams>,
}

impl ConsensusServiceDescriptor {
    /// Algorithm label for the BFT parameter block
    pub const BFT: &'static str = "bft";
    /// Algorithm label for the replicated-log parameter block
    pub const REPLICATED_LOG: &'static str = "replicated-log";

    /// External implementation name; blank counts as absent
    pub fn external_name(&self) -> Option<&str> {
        self.external_service
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Labels of the built-in algorithms whose parameters are populated
    pub fn populated_algorithms(&self) -> Vec<&'static str> {
        let mut populated = Vec::new();
        if self.bft.is_some() {
            populated.push(Self::BFT);
        }
        if self.replicated_log.is_some() {
            populated.push(Self::REPLICATED_LOG);
        }
        populated
    }

    /// Shape checks that do not depend on the registry
    pub fn validate(&self) -> Result<()> {
        if let Some(bft) = &self.bft {
            if bft.cluster_addresses.is_empty() {
                return Err(BnError::invalid("consensus.bft.cluster_addresses is empty"));
            }
            if bft.replica_id >= bft.cluster_addresses.len() {
                return Err(BnError::invalid(format!(
                    "consensus.bft.replica_id {} out of range for {} replicas",
                    bft.replica_id,
                    bft.cluster_addresses.len()
                )));
            }
        }
        if let Some(log) = &self.replicated_log {
            if log.node_address.trim().is_empty() {
                return Err(BnError::invalid("consensus.replicated_log.node_address is empty"));
            }
        }
        Ok(())
    }
}

/// Commit pipeline settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How often a pending finality wait is reported
    pub finality_warn_interval_ms: u64,
}

impl PipelineConfig {
    /// Finality warning interval as a duration
    pub fn finality_warn_interval(&self) -> Duration {
        Duration::from_millis(self.finality_warn_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            finality_warn_interval_ms: 10_000,
        }
    }
}

/// Saga orchestration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    /// Resume attempts before `recover_incomplete` stops picking a saga up
    pub max_resume_attempts: u8,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            max_resume_attempts: 10,
        }
    }
}

/// Minimal essential configuration for node startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's legal identity
    pub legal_name: String,
    /// Consensus service descriptor
    #[serde(default)]
    pub consensus: ConsensusServiceDescriptor,
    /// Commit pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Saga settings
    #[serde(default)]
    pub saga: SagaConfig,
}

impl NodeConfig {
    /// Create minimal config for testing
    pub fn test(legal_name: impl Into<String>) -> Self {
        Self {
            legal_name: legal_name.into(),
            consensus: ConsensusServiceDescriptor::default(),
            pipeline: PipelineConfig::default(),
            saga: SagaConfig::default(),
        }
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BnError::invalid(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BnError::storage(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), legal_name = %config.legal_name, "Loaded node configuration");
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.legal_name.trim().is_empty() {
            return Err(BnError::invalid("legal_name is required"));
        }
        if self.pipeline.finality_warn_interval_ms == 0 {
            return Err(BnError::invalid(
                "pipeline.finality_warn_interval_ms must be positive",
            ));
        }
        self.consensus.validate()
    }
}
