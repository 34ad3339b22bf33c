//! Equity Ledger - conservation-guarded fractional ownership
//!
//! Mutates ownership stakes while preserving the strict conservation
//! invariant `sum(stakes) + treasury == total_equity` under concurrent
//! operations. Every mutation passes through a single validation choke
//! point (the Conservation Guard) and an injected capability gate;
//! commits append to a single immutable transaction log and are
//! re-verified post-commit.
//!
//! Serialization is per entity: writes to one entity are mutually
//! exclusive, writes to distinct entities are concurrent.

#![deny(unsafe_code)]

pub mod gate;
pub mod guard;
pub mod ledger;
pub mod service;

pub use gate::{AllowAll, FrozenTransfers, OperationGate};
pub use guard::PendingOp;
pub use ledger::EntityLedger;
pub use service::LedgerService;
