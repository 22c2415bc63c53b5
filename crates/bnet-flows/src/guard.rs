//! Duplicate network guard
//!
//! A point-in-time read of locally visible memberships. It does not lock the
//! identifier across the cluster: two nodes checking the same id before
//! either commits both pass.

use bnet_core::{BnError, MembershipQuery, NetworkId, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rejects network ids that already have committed memberships
#[derive(Clone)]
pub struct DuplicateNetworkGuard {
    query: Arc<dyn MembershipQuery>,
}

impl DuplicateNetworkGuard {
    /// Guard reading from `query`
    pub fn new(query: Arc<dyn MembershipQuery>) -> Self {
        Self { query }
    }

    /// Whether any membership of the network is visible locally
    pub async fn exists(&self, network_id: &NetworkId) -> Result<bool> {
        self.query.network_exists(network_id).await
    }

    /// Fail with `DuplicateNetwork` if the network is already visible
    pub async fn ensure_absent(&self, network_id: &NetworkId) -> Result<()> {
        if self.exists(network_id).await? {
            warn!(network_id = %network_id, "Network already exists");
            return Err(BnError::DuplicateNetwork {
                network_id: network_id.clone(),
            });
        }
        debug!(network_id = %network_id, "Network id not yet in use");
        Ok(())
    }
}
