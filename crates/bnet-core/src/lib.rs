//! # Business Network Core
//!
//! Shared vocabulary for the membership ledger: identifiers, membership and
//! relationship records, transitions and finality proofs, the unified error
//! type, node configuration, and the effect traits through which the commit
//! pipeline talks to its collaborators.
//!
//! ## Architecture
//!
//! - **identifiers**: network, membership, group, party and transaction ids
//! - **membership** / **relationship**: immutable ledger records
//! - **transition**: proposals, signatures, finality proofs, committed records
//! - **effects**: validator, signer, consensus, vault and read-model traits
//! - **config**: TOML node configuration and the consensus descriptor

pub mod config;
pub mod crypto;
pub mod effects;
pub mod errors;
pub mod identifiers;
pub mod membership;
pub mod relationship;
pub mod transition;

pub use config::{
    BftParams, ConsensusServiceDescriptor, NodeConfig, PipelineConfig, ReplicatedLogParams,
    SagaConfig,
};
pub use crypto::{verify_signature, NodeIdentity};
pub use effects::{
    ConsensusService, ContractValidator, MembershipQuery, SignatureCollector, SystemClock,
    TimeSource, VaultStore,
};
pub use errors::{BnError, Result};
pub use identifiers::{GroupId, MembershipId, NetworkId, PartyId, StateRef, TxId};
pub use membership::{
    BusinessIdentity, MembershipIdentity, MembershipRecord, MembershipStatus, Permission, Role,
};
pub use relationship::RelationshipGroup;
pub use transition::{
    Command, CommittedRecord, FinalityProof, LedgerState, ProposedChange, ProposedTransition,
    ResolvedState, SignedTransition, TransitionBody, TransitionSignature,
};
