//! Decision Resolution Engine
//!
//! Multi-option elections whose voting power is fixed at proposal time
//! by an immutable snapshot of the equity ledger. The lifecycle is a
//! small state machine (draft → active → passed/rejected/expired), vote
//! casting is idempotent per (decision, voter), and resolution is a
//! pure function of (votes, snapshot, method, quorum) applied at most
//! once.

pub mod engine;
pub mod snapshot;
pub mod tally;

pub use engine::{DecisionEngine, SnapshotSummary};
pub use snapshot::SnapshotStore;
pub use tally::resolve;
