//! # Business Network Flows
//!
//! Membership lifecycle on top of the core vocabulary: the commit pipeline
//! that takes one transition to finality, the managers that build membership
//! and group transitions, and the saga that creates a network.
//!
//! ## Architecture
//!
//! - **pipeline**: validate, sign, finalise and record one transition
//! - **contract**: membership and relationship group rules
//! - **guard**: duplicate network check
//! - **membership** / **groups**: transition builders
//! - **orchestrator**: persisted, resumable network creation
//! - **signing** / **vault**: in-memory signer and vault
//! - **node**: builder wiring configuration to services

#![forbid(unsafe_code)]

pub mod contract;
pub mod groups;
pub mod guard;
pub mod membership;
pub mod node;
pub mod orchestrator;
pub mod pipeline;
pub mod signing;
pub mod vault;

pub use contract::BusinessNetworkContract;
pub use groups::RelationshipGroupManager;
pub use guard::DuplicateNetworkGuard;
pub use membership::MembershipManager;
pub use node::{BusinessNetworkNode, NodeBuilder};
pub use orchestrator::{
    CreateNetworkRequest, CreateNetworkSaga, MembershipLifecycleOrchestrator, MemorySagaStore,
    NetworkCreated, SagaFailure, SagaId, SagaStep, SagaStore,
};
pub use pipeline::CommitPipeline;
pub use signing::KeyStoreSigner;
pub use vault::MemoryVault;
