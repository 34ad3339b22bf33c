//! Snapshot store — immutable voting-power captures
//!
//! One snapshot per decision, taken when the decision is created and
//! never rewritten. Transfers during an open vote cannot move voting
//! power because resolution reads only the frozen capture.

use equity_types::{DecisionId, EntityId, EquityAmount, EquityError, EquityResult, MemberId, Snapshot};
use std::collections::HashMap;
use tracing::info;

/// Holds the frozen stake distribution for every decision
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<DecisionId, Snapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshots: HashMap::new(),
        }
    }

    /// Capture the distribution for a decision, exactly once.
    ///
    /// A second capture for the same decision is a conflict: snapshots
    /// are never rewritten.
    pub fn take(
        &mut self,
        decision_id: DecisionId,
        entity_id: EntityId,
        distribution: Vec<(MemberId, EquityAmount)>,
    ) -> EquityResult<&Snapshot> {
        if self.snapshots.contains_key(&decision_id) {
            return Err(EquityError::Conflict(format!(
                "snapshot already exists for decision {}",
                decision_id
            )));
        }

        let snapshot = Snapshot::capture(decision_id.clone(), entity_id, distribution);
        info!(
            decision = %decision_id,
            eligible = snapshot.eligible_count(),
            total_weight = %snapshot.total_weight(),
            "Snapshot taken"
        );
        Ok(self.snapshots.entry(decision_id).or_insert(snapshot))
    }

    pub fn get(&self, decision_id: &DecisionId) -> Option<&Snapshot> {
        self.snapshots.get(decision_id)
    }

    pub fn contains(&self, decision_id: &DecisionId) -> bool {
        self.snapshots.contains_key(decision_id)
    }
}
