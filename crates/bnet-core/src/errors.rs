//! Unified error type for business network operations
//!
//! Every component in the workspace reports failures through [`BnError`]. The
//! variants follow the propagation policy of the membership pipeline: local
//! validation errors surface immediately, consensus conflicts are handed back
//! to the caller without retry, and resolver errors are fatal at startup.

use crate::identifiers::{MembershipId, NetworkId, PartyId, StateRef, TxId};
use serde::{Deserialize, Serialize};

/// Unified error type for all business network operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BnError {
    /// A network with the requested identifier is already visible locally
    #[error("Business network {network_id} already exists")]
    DuplicateNetwork {
        /// The rejected network identifier
        network_id: NetworkId,
    },

    /// The contract validator rejected a proposed transition
    #[error("Invalid transition ({command}): {reason}")]
    InvalidTransition {
        /// Intent tag of the rejected transition
        command: String,
        /// Why the transition is illegal
        reason: String,
    },

    /// A required signer was unreachable, declined, or produced a bad signature
    #[error("Signature from {party} unavailable: {reason}")]
    Signature {
        /// The party whose signature is missing
        party: PartyId,
        /// Reason reported by the collector
        reason: String,
    },

    /// The consensus service reports the referenced input as already consumed
    #[error("Conflict: input {state_ref} already consumed by transaction {consumed_by}")]
    Conflict {
        /// The stale input
        state_ref: StateRef,
        /// The transaction that consumed it first
        consumed_by: TxId,
    },

    /// Consensus did not confirm finality; the outcome must be re-read
    #[error("Finality not reached: {message}")]
    Finality {
        /// Error message describing the consensus failure
        message: String,
    },

    /// An external consensus implementation name did not match any extension
    #[error("Consensus service '{requested}' not found. Available implementations: {}", .available.join(", "))]
    ServiceNotFound {
        /// Name from the descriptor
        requested: String,
        /// Names registered as extensions
        available: Vec<String>,
    },

    /// More than one built-in algorithm has parameters configured
    #[error("Ambiguous consensus configuration: parameters given for {}", .algorithms.join(" and "))]
    AmbiguousConfiguration {
        /// Algorithms whose parameter blocks are populated
        algorithms: Vec<String>,
    },

    /// A consensus participant cannot start without a bound identity
    #[error("Unable to start consensus service {service}: node identity not found")]
    MissingIdentity {
        /// The service that was about to start
        service: String,
    },

    /// The process-wide deserialization filter is already installed
    #[error("Deserialization filter '{installed}' already installed; refusing '{rejected}'")]
    FilterAlreadyInstalled {
        /// Name of the filter currently in force
        installed: String,
        /// Name of the filter that was refused
        rejected: String,
    },

    /// The default group step failed after the membership was authorised
    #[error("Group creation failed for membership {membership_id}: {cause}")]
    GroupCreation {
        /// Membership left authorised but ungrouped
        membership_id: MembershipId,
        /// Underlying failure
        cause: Box<BnError>,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Error message describing the cryptographic failure
        message: String,
    },
}

impl BnError {
    /// Create an invalid transition error
    pub fn invalid_transition(command: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidTransition {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a signature error
    pub fn signature(party: PartyId, reason: impl Into<String>) -> Self {
        Self::Signature {
            party,
            reason: reason.into(),
        }
    }

    /// Create a finality error
    pub fn finality(message: impl Into<String>) -> Self {
        Self::Finality {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Wrap a failure of the default group step
    pub fn group_creation(membership_id: MembershipId, cause: BnError) -> Self {
        Self::GroupCreation {
            membership_id,
            cause: Box::new(cause),
        }
    }

    /// Whether the caller must re-read committed state before deciding to retry.
    ///
    /// Conflicts and ambiguous consensus failures both leave the caller unsure
    /// which version is current.
    pub fn requires_state_refresh(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::Finality { .. } => true,
            Self::GroupCreation { cause, .. } => cause.requires_state_refresh(),
            _ => false,
        }
    }

    /// Whether this error prevents the node from becoming a consensus participant
    pub fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound { .. }
                | Self::AmbiguousConfiguration { .. }
                | Self::MissingIdentity { .. }
                | Self::FilterAlreadyInstalled { .. }
        )
    }
}

/// Standard Result type for business network operations
pub type Result<T> = std::result::Result<T, BnError>;

impl From<serde_json::Error> for BnError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for BnError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        Self::crypto(err.to_string())
    }
}

impl From<std::io::Error> for BnError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::storage(err.to_string()),
        }
    }
}
