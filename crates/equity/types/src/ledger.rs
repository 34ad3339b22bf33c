//! Ledger state: stakes, transactions, and the per-entity book
//!
//! The `EntityBook` is the authoritative ownership state for one entity.
//! It is a data structure, not an execution engine — validation and
//! policy live in `equity-ledger`. The treasury is always derived as
//! `total_equity - sum(stakes)`, never stored.

use crate::{EntityId, EquityAmount, EquityError, EquityResult, MemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A member's ownership position in one entity.
///
/// Stake records are never deleted: a former member's stake is forfeited
/// to zero and the record persists for audit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stake {
    pub entity_id: EntityId,
    pub member_id: MemberId,
    /// Absolute quantity of ownership units. Non-negative by type.
    pub amount: EquityAmount,
    /// Whether the holder is a current member (eligible to receive equity)
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stake {
    pub fn new(entity_id: EntityId, member_id: MemberId) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            member_id,
            amount: EquityAmount::ZERO,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_amount(mut self, amount: EquityAmount) -> Self {
        self.amount = amount;
        self
    }

    /// Increase the stake
    pub fn credit(&mut self, amount: EquityAmount) -> EquityResult<()> {
        self.amount = self
            .amount
            .checked_add(amount)
            .ok_or_else(|| EquityError::Validation("stake overflow".into()))?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Decrease the stake (fails rather than going negative)
    pub fn debit(&mut self, amount: EquityAmount) -> EquityResult<()> {
        self.amount = self
            .amount
            .checked_sub(amount)
            .ok_or(EquityError::InsufficientFunds {
                requested: amount,
                available: self.amount,
            })?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Zero the stake and mark the holder inactive. The record stays.
    pub fn forfeit(&mut self) -> EquityAmount {
        let forfeited = self.amount;
        self.amount = EquityAmount::ZERO;
        self.active = false;
        self.updated_at = Utc::now();
        forfeited
    }
}

/// Kinds of ledger mutation, tagging the single append-only log
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Grant,
    Transfer,
    Dilution,
    Reward,
}

/// One immutable entry in the append-only transaction log.
///
/// The log is the sole source of truth for replaying ledger history;
/// there is no second table for legacy shapes — those are computed views
/// (`EntityBook::transactions_of_kind`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: String,
    pub entity_id: EntityId,
    pub kind: TransactionKind,
    pub amount: EquityAmount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_member: Option<MemberId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_member: Option<MemberId>,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn new(
        entity_id: EntityId,
        kind: TransactionKind,
        amount: EquityAmount,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: uuid::Uuid::new_v4().to_string(),
            entity_id,
            kind,
            amount,
            from_member: None,
            to_member: None,
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_from(mut self, member: MemberId) -> Self {
        self.from_member = Some(member);
        self
    }

    pub fn with_to(mut self, member: MemberId) -> Self {
        self.to_member = Some(member);
        self
    }
}

/// The complete ownership state for one entity
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityBook {
    pub entity_id: EntityId,
    /// The full pool. Only grows, and only via dilution.
    pub total_equity: EquityAmount,
    /// All stake records, keyed by member (inactive holders included)
    pub stakes: HashMap<MemberId, Stake>,
    /// Append-only transaction log
    pub log: Vec<LedgerTransaction>,
    pub created_at: DateTime<Utc>,
}

impl EntityBook {
    pub fn new(entity_id: EntityId, total_equity: EquityAmount) -> Self {
        Self {
            entity_id,
            total_equity,
            stakes: HashMap::new(),
            log: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Sum of all held stakes
    pub fn distributed(&self) -> EquityAmount {
        self.stakes
            .values()
            .fold(EquityAmount::ZERO, |acc, s| acc.saturating_add(s.amount))
    }

    /// The unallocated pool, derived on every read
    pub fn treasury(&self) -> EquityAmount {
        self.total_equity.saturating_sub(self.distributed())
    }

    pub fn stake_of(&self, member: &MemberId) -> EquityAmount {
        self.stakes
            .get(member)
            .map(|s| s.amount)
            .unwrap_or(EquityAmount::ZERO)
    }

    pub fn get_stake(&self, member: &MemberId) -> Option<&Stake> {
        self.stakes.get(member)
    }

    /// Whether the member is a current (active) member
    pub fn is_member(&self, member: &MemberId) -> bool {
        self.stakes.get(member).map(|s| s.active).unwrap_or(false)
    }

    /// Whether a stake record exists at all, active or not
    pub fn has_record(&self, member: &MemberId) -> bool {
        self.stakes.contains_key(member)
    }

    pub fn member_count(&self) -> usize {
        self.stakes.values().filter(|s| s.active).count()
    }

    /// All current members' positions
    pub fn holders(&self) -> Vec<&Stake> {
        self.stakes.values().filter(|s| s.active).collect()
    }

    /// Append to the immutable log
    pub fn append(&mut self, transaction: LedgerTransaction) {
        self.log.push(transaction);
    }

    /// Computed view over the single log, filtered by kind
    pub fn transactions_of_kind(&self, kind: TransactionKind) -> Vec<&LedgerTransaction> {
        self.log.iter().filter(|t| t.kind == kind).collect()
    }

    /// Verify the conservation invariant from authoritative state.
    ///
    /// The treasury is derived, so the residual check is that the
    /// distributed sum never exceeds the total pool. A failure here after
    /// a commit signals a serialization defect, not a caller mistake.
    pub fn verify_conservation(&self) -> EquityResult<()> {
        let distributed = self.distributed();
        if distributed > self.total_equity {
            return Err(EquityError::IntegrityViolation {
                entity_id: self.entity_id.clone(),
                expected: self.total_equity,
                actual: distributed,
            });
        }
        Ok(())
    }
}
