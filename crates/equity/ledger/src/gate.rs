//! Capability gate — injected authorization for ledger operations
//!
//! External policy (trust tiers, emergency freezes) is modeled as a
//! collaborator passed into the ledger, not as state the ledger owns.
//! The ledger stays pure and independently testable.

use crate::guard::PendingOp;
use equity_types::{EquityError, EquityResult, MemberId};

/// Capability check consulted before every ledger operation
pub trait OperationGate: Send + Sync {
    fn authorize(&self, actor: &MemberId, op: &PendingOp) -> EquityResult<()>;
}

/// Permits everything. The default gate.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl OperationGate for AllowAll {
    fn authorize(&self, _actor: &MemberId, _op: &PendingOp) -> EquityResult<()> {
        Ok(())
    }
}

/// Rejects transfers while leaving other operations open.
///
/// Stands in for the externally owned "equity transfers disabled"
/// switch; flipping it means swapping the gate, not mutating the ledger.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrozenTransfers;

impl OperationGate for FrozenTransfers {
    fn authorize(&self, actor: &MemberId, op: &PendingOp) -> EquityResult<()> {
        if matches!(op, PendingOp::Transfer { .. }) {
            return Err(EquityError::Unauthorized(format!(
                "equity transfers are frozen (requested by {})",
                actor
            )));
        }
        Ok(())
    }
}
