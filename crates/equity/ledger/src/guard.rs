//! Conservation Guard — pure pre-commit validation
//!
//! Every ledger mutation passes through `check` immediately before
//! commit. The guard recomputes the treasury from authoritative current
//! state and confirms the pending operation keeps every conservation
//! invariant true. No mutation bypasses it.

use equity_types::{EntityBook, EquityAmount, EquityError, EquityResult, MemberId, TransactionKind};

/// A ledger mutation awaiting validation
#[derive(Clone, Debug)]
pub enum PendingOp {
    Grant {
        to: MemberId,
        amount: EquityAmount,
    },
    Transfer {
        from: MemberId,
        to: MemberId,
        amount: EquityAmount,
    },
    /// Grows the total pool. The only operation allowed to do so.
    Dilute { amount: EquityAmount },
    /// A grant keyed to a completed unit of work
    Reward {
        to: MemberId,
        amount: EquityAmount,
    },
}

impl PendingOp {
    pub fn amount(&self) -> EquityAmount {
        match self {
            PendingOp::Grant { amount, .. }
            | PendingOp::Transfer { amount, .. }
            | PendingOp::Dilute { amount }
            | PendingOp::Reward { amount, .. } => *amount,
        }
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            PendingOp::Grant { .. } => TransactionKind::Grant,
            PendingOp::Transfer { .. } => TransactionKind::Transfer,
            PendingOp::Dilute { .. } => TransactionKind::Dilution,
            PendingOp::Reward { .. } => TransactionKind::Reward,
        }
    }
}

/// Validate a pending operation against the book's current state.
///
/// The checks are exactly the conservation statement projected onto each
/// operation: a grant or reward may not exceed the derived treasury, a
/// transfer may not exceed the source stake or target a non-member, and
/// only dilution may grow `total_equity`. Typed failures carry the
/// current availability alongside the requested amount.
pub fn check(book: &EntityBook, op: &PendingOp) -> EquityResult<()> {
    if op.amount().is_zero() {
        return Err(EquityError::Validation("amount must be positive".into()));
    }

    match op {
        PendingOp::Grant { to, amount } | PendingOp::Reward { to, amount } => {
            if !book.is_member(to) {
                return Err(EquityError::MemberNotFound(to.clone()));
            }
            let treasury = book.treasury();
            if *amount > treasury {
                return Err(EquityError::InsufficientFunds {
                    requested: *amount,
                    available: treasury,
                });
            }
        }
        PendingOp::Transfer { from, to, amount } => {
            if from == to {
                return Err(EquityError::Validation(
                    "transfer endpoints must differ".into(),
                ));
            }
            if !book.has_record(from) {
                return Err(EquityError::MemberNotFound(from.clone()));
            }
            if !book.is_member(to) {
                return Err(EquityError::MemberNotFound(to.clone()));
            }
            let held = book.stake_of(from);
            if *amount > held {
                return Err(EquityError::InsufficientFunds {
                    requested: *amount,
                    available: held,
                });
            }
        }
        PendingOp::Dilute { amount } => {
            if book.total_equity.checked_add(*amount).is_none() {
                return Err(EquityError::Validation("total equity overflow".into()));
            }
        }
    }

    Ok(())
}
