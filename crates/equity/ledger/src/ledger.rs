//! Per-entity equity ledger
//!
//! `EntityLedger` owns one entity's book and is the only writer to it.
//! Every mutation runs gate → guard → commit → append → post-commit
//! verification. A post-commit conservation failure is treated as a
//! serialization defect: it raises a critical integrity alert and
//! suspends all further writes to the entity pending manual
//! reconciliation.

use crate::gate::{AllowAll, OperationGate};
use crate::guard::{self, PendingOp};
use equity_types::{
    EntityBook, EntityId, EquityAmount, EquityError, EquityResult, LedgerTransaction, MemberId,
    Stake, TransactionKind,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Single-writer ledger for one entity
pub struct EntityLedger {
    book: EntityBook,
    suspended: bool,
    gate: Arc<dyn OperationGate>,
}

impl EntityLedger {
    pub fn new(entity_id: EntityId, total_equity: EquityAmount) -> Self {
        Self {
            book: EntityBook::new(entity_id, total_equity),
            suspended: false,
            gate: Arc::new(AllowAll),
        }
    }

    /// Rehydrate from an existing book (e.g. replayed from the log)
    pub fn from_book(book: EntityBook) -> Self {
        Self {
            book,
            suspended: false,
            gate: Arc::new(AllowAll),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn OperationGate>) -> Self {
        self.gate = gate;
        self
    }

    // --- Membership ---

    /// Register a new member with a zero stake
    pub fn add_member(&mut self, member: MemberId) -> EquityResult<()> {
        self.reject_if_suspended()?;
        if self.book.has_record(&member) {
            return Err(EquityError::Conflict(format!(
                "member already has a stake record: {}",
                member
            )));
        }
        let record = Stake::new(self.book.entity_id.clone(), member.clone());
        self.book.stakes.insert(member.clone(), record);

        info!(entity = %self.book.entity_id, member = %member, "Member added");
        Ok(())
    }

    /// Admit a member and grant their pool share from the treasury.
    ///
    /// The share is an equal fraction of the unallocated treasury over
    /// the post-join member count. Existing members' stored stakes are
    /// never rebalanced; their percentage share shrinks only through
    /// explicit dilution.
    pub fn join(&mut self, member: MemberId, reason: &str) -> EquityResult<Stake> {
        self.add_member(member.clone())?;

        let share = EquityAmount::from_base_units(
            self.book.treasury().base_units() / self.book.member_count() as u64,
        );
        if share.is_zero() {
            // Nothing left to share; membership alone is the grant.
            return Ok(self.book.stakes[&member].clone());
        }
        match self.grant(&member, &member, share, reason) {
            Ok(stake) => Ok(stake),
            Err(error) => {
                // Admission and share grant are one operation: a failed
                // grant must not leave a half-applied join behind.
                self.book.stakes.remove(&member);
                Err(error)
            }
        }
    }

    /// Forfeit a member's stake to zero and mark them inactive.
    ///
    /// The record persists for audit; the forfeited amount returns to
    /// the implicit treasury.
    pub fn deactivate_member(&mut self, member: &MemberId) -> EquityResult<EquityAmount> {
        self.reject_if_suspended()?;
        let stake = self
            .book
            .stakes
            .get_mut(member)
            .ok_or_else(|| EquityError::MemberNotFound(member.clone()))?;
        let forfeited = stake.forfeit();

        warn!(
            entity = %self.book.entity_id,
            member = %member,
            forfeited = %forfeited,
            "Member deactivated, stake forfeited to treasury"
        );
        Ok(forfeited)
    }

    // --- Ledger operations ---

    /// Grant equity from the treasury to a current member
    pub fn grant(
        &mut self,
        actor: &MemberId,
        to: &MemberId,
        amount: EquityAmount,
        reason: &str,
    ) -> EquityResult<Stake> {
        let op = PendingOp::Grant {
            to: to.clone(),
            amount,
        };
        self.apply(actor, op, reason)?;
        Ok(self.book.stakes[to].clone())
    }

    /// Move equity between two current members
    pub fn transfer(
        &mut self,
        actor: &MemberId,
        from: &MemberId,
        to: &MemberId,
        amount: EquityAmount,
        reason: &str,
    ) -> EquityResult<(Stake, Stake)> {
        let op = PendingOp::Transfer {
            from: from.clone(),
            to: to.clone(),
            amount,
        };
        self.apply(actor, op, reason)?;
        Ok((self.book.stakes[from].clone(), self.book.stakes[to].clone()))
    }

    /// Grow the total pool. No absolute stake changes; every holder's
    /// derived percentage share shrinks.
    pub fn dilute(
        &mut self,
        actor: &MemberId,
        amount: EquityAmount,
        reason: &str,
    ) -> EquityResult<EquityAmount> {
        let op = PendingOp::Dilute { amount };
        self.apply(actor, op, reason)?;
        Ok(self.book.total_equity)
    }

    /// Grant keyed to a completed unit of work
    pub fn reward(
        &mut self,
        actor: &MemberId,
        to: &MemberId,
        amount: EquityAmount,
        task_ref: &str,
    ) -> EquityResult<Stake> {
        let op = PendingOp::Reward {
            to: to.clone(),
            amount,
        };
        self.apply(actor, op, task_ref)?;
        Ok(self.book.stakes[to].clone())
    }

    /// The single mutation path: gate, guard, commit, log, verify.
    fn apply(&mut self, actor: &MemberId, op: PendingOp, reason: &str) -> EquityResult<()> {
        self.reject_if_suspended()?;
        self.gate.authorize(actor, &op)?;
        guard::check(&self.book, &op)?;

        let kind = op.kind();
        let amount = op.amount();
        let mut transaction =
            LedgerTransaction::new(self.book.entity_id.clone(), kind, amount, reason);

        match &op {
            PendingOp::Grant { to, amount } | PendingOp::Reward { to, amount } => {
                self.stake_mut(to)?.credit(*amount)?;
                transaction = transaction.with_to(to.clone());
            }
            PendingOp::Transfer { from, to, amount } => {
                self.stake_mut(from)?.debit(*amount)?;
                self.stake_mut(to)?.credit(*amount)?;
                transaction = transaction.with_from(from.clone()).with_to(to.clone());
            }
            PendingOp::Dilute { amount } => {
                // Guard already checked for overflow.
                self.book.total_equity = self
                    .book
                    .total_equity
                    .checked_add(*amount)
                    .ok_or_else(|| EquityError::Validation("total equity overflow".into()))?;
            }
        }

        self.book.append(transaction);
        self.verify_after_commit()?;

        info!(
            entity = %self.book.entity_id,
            kind = ?kind,
            amount = %amount,
            actor = %actor,
            treasury = %self.book.treasury(),
            "Ledger operation committed"
        );
        Ok(())
    }

    /// Re-check conservation from authoritative state and suspend the
    /// entity on failure. Never corrects silently.
    fn verify_after_commit(&mut self) -> EquityResult<()> {
        if let Err(violation) = self.book.verify_conservation() {
            self.suspended = true;
            error!(
                entity = %self.book.entity_id,
                total = %self.book.total_equity,
                distributed = %self.book.distributed(),
                "CRITICAL integrity alert: conservation violated, suspending entity writes"
            );
            return Err(violation);
        }
        Ok(())
    }

    /// Reconciliation probe: verify conservation now, suspending writes
    /// if the invariant no longer holds.
    pub fn verify_integrity(&mut self) -> EquityResult<()> {
        self.verify_after_commit()
    }

    fn reject_if_suspended(&self) -> EquityResult<()> {
        if self.suspended {
            return Err(EquityError::State(format!(
                "entity {} is suspended pending reconciliation",
                self.book.entity_id
            )));
        }
        Ok(())
    }

    fn stake_mut(&mut self, member: &MemberId) -> EquityResult<&mut Stake> {
        self.book
            .stakes
            .get_mut(member)
            .ok_or_else(|| EquityError::MemberNotFound(member.clone()))
    }

    // --- Read surface ---

    pub fn book(&self) -> &EntityBook {
        &self.book
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn stake_of(&self, member: &MemberId) -> EquityAmount {
        self.book.stake_of(member)
    }

    pub fn treasury(&self) -> EquityAmount {
        self.book.treasury()
    }

    pub fn total_equity(&self) -> EquityAmount {
        self.book.total_equity
    }

    /// Current members and their absolute stakes
    pub fn distribution(&self) -> Vec<(MemberId, EquityAmount)> {
        self.book
            .holders()
            .into_iter()
            .map(|s| (s.member_id.clone(), s.amount))
            .collect()
    }

    /// Percentage shares, derived at read time and never persisted
    pub fn percentages(&self) -> Vec<(MemberId, f64)> {
        self.book
            .holders()
            .into_iter()
            .map(|s| {
                (
                    s.member_id.clone(),
                    s.amount.percent_of(self.book.total_equity),
                )
            })
            .collect()
    }

    pub fn transactions(&self) -> &[LedgerTransaction] {
        &self.book.log
    }

    pub fn transactions_of_kind(&self, kind: TransactionKind) -> Vec<&LedgerTransaction> {
        self.book.transactions_of_kind(kind)
    }
}
