//! # Business Network Consensus
//!
//! Chooses and constructs the consensus service a node uses to finalise
//! membership transitions, and ships the built-in implementations.
//!
//! ## Architecture
//!
//! - **registry**: named service factories, built-ins plus extensions
//! - **resolver**: descriptor-driven selection, identity binding, filter install
//! - **serial_filter**: install-once deserialization filter slot
//! - **wire**: type-tagged envelope checked against the active filter
//! - **uniqueness**: consumed-input bookkeeping shared by the built-ins
//! - **builtin**: single-coordinator, BFT quorum and replicated log services

#![forbid(unsafe_code)]

pub mod builtin;
pub mod registry;
pub mod resolver;
pub mod serial_filter;
pub mod uniqueness;
pub mod wire;

pub use builtin::{
    BftService, BuiltinAlgorithm, ReplicatedLogService, SingleCoordinatorService, UniquenessRequest,
};
pub use registry::{ServiceContext, ServiceEntry, ServiceFactory, ServiceRegistry};
pub use resolver::{ConsensusAlgorithm, ConsensusResolver, ConsensusServiceHandle};
pub use serial_filter::{SerialFilter, SerialFilterSlot};
pub use uniqueness::UniquenessProvider;
