//! Equity domain types
//!
//! Shared vocabulary for the equity ledger and the decision resolution
//! engine: identifiers, exact fixed-point amounts, stake and transaction
//! records, decision lifecycle types, and the error taxonomy.
//!
//! These are data structures, not execution engines. Policy lives in
//! `equity-ledger` and `equity-governance`.

pub mod amount;
pub mod decision;
pub mod ledger;

pub use amount::{EquityAmount, SCALE};
pub use decision::{
    Decision, DecisionStatus, Outcome, Snapshot, Tally, VoteRecord, VotingMethod, MAX_OPTIONS,
    MIN_OPTIONS,
};
pub use ledger::{EntityBook, LedgerTransaction, Stake, TransactionKind};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for an entity (a company-like ownership pool)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new random EntityId
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create an EntityId from a known string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Short display form (first 8 chars)
    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a member holding equity
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl MemberId {
    /// Generate a new random MemberId
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create a MemberId from a known string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a governance decision
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl DecisionId {
    /// Generate a new random DecisionId
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create a DecisionId from a known string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Short display form (first 8 chars)
    pub fn short(&self) -> String {
        self.0.chars().take(8).collect()
    }
}

impl std::fmt::Display for DecisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Convenience alias for fallible equity operations
pub type EquityResult<T> = Result<T, EquityError>;

/// Errors produced by ledger and governance operations.
///
/// Every variant except `IntegrityViolation` is an expected, locally
/// recoverable outcome returned to the caller. `IntegrityViolation` means
/// a committed mutation broke conservation for an entity; the ledger
/// suspends further writes to that entity and never corrects it silently.
#[derive(Debug, Error)]
pub enum EquityError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: EquityAmount,
        available: EquityAmount,
    },

    #[error("invalid state: {0}")]
    State(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("decision not found: {0}")]
    DecisionNotFound(DecisionId),

    #[error(
        "conservation violated for entity {entity_id}: total equity {expected}, \
         distributed {actual}"
    )]
    IntegrityViolation {
        entity_id: EntityId,
        expected: EquityAmount,
        actual: EquityAmount,
    },
}
