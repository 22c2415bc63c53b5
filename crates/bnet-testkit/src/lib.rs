//! Business network testing infrastructure
//!
//! Shared fixtures for the workspace's integration tests: a multi-node test
//! network over one consensus service, signed transition builders, a
//! deterministic clock, fault injectors for validators, signers, saga stores
//! and consensus, and log capture for asserting on emitted warnings.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! bnet-testkit = { path = "../bnet-testkit" }
//! ```
//!
//! ```rust,ignore
//! use bnet_testkit::*;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     init_test_tracing();
//!     let network = TestNetwork::new();
//!     let node = network.node("O=Bank A,L=London,C=GB");
//!     // ... test logic
//! }
//! ```

pub mod faults;
pub mod logs;
pub mod network;
pub mod time;
pub mod transitions;

pub use faults::{DecliningSigner, DelayedConsensus, FlakySagaStore, RejectingValidator};
pub use logs::LogCapture;
pub use network::{TestNetwork, TestNode};
pub use time::SteppingClock;

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

static TRACING: Lazy<()> = Lazy::new(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Another harness may already own the global subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
});

/// Install a test-friendly tracing subscriber once per process; `RUST_LOG` applies
pub fn init_test_tracing() {
    Lazy::force(&TRACING);
}
