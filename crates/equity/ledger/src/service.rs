//! Thread-safe ledger facade
//!
//! Serializes all mutations per entity behind one mutex per
//! `EntityLedger`, while operations on distinct entities proceed
//! concurrently. Correctness of fractional ownership outranks write
//! throughput here: two unserialized grants could each validate against
//! a treasury with room for only one.

use crate::gate::{AllowAll, OperationGate};
use crate::ledger::EntityLedger;
use equity_types::{
    EntityId, EquityAmount, EquityError, EquityResult, LedgerTransaction, MemberId, Stake,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// Concurrent registry of per-entity ledgers
pub struct LedgerService {
    gate: Arc<dyn OperationGate>,
    entities: RwLock<HashMap<EntityId, Arc<Mutex<EntityLedger>>>>,
}

impl LedgerService {
    pub fn new() -> Self {
        Self::with_gate(Arc::new(AllowAll))
    }

    pub fn with_gate(gate: Arc<dyn OperationGate>) -> Self {
        Self {
            gate,
            entities: RwLock::new(HashMap::new()),
        }
    }

    pub fn create_entity(
        &self,
        entity_id: EntityId,
        total_equity: EquityAmount,
    ) -> EquityResult<()> {
        if total_equity.is_zero() {
            return Err(EquityError::Validation(
                "total equity must be positive".into(),
            ));
        }
        let mut entities = self
            .entities
            .write()
            .map_err(|_| poisoned(&entity_id))?;
        if entities.contains_key(&entity_id) {
            return Err(EquityError::Conflict(format!(
                "entity already exists: {}",
                entity_id
            )));
        }
        let ledger = EntityLedger::new(entity_id.clone(), total_equity)
            .with_gate(Arc::clone(&self.gate));
        entities.insert(entity_id, Arc::new(Mutex::new(ledger)));
        Ok(())
    }

    fn entity(&self, entity_id: &EntityId) -> EquityResult<Arc<Mutex<EntityLedger>>> {
        let entities = self
            .entities
            .read()
            .map_err(|_| poisoned(entity_id))?;
        entities
            .get(entity_id)
            .cloned()
            .ok_or_else(|| EquityError::EntityNotFound(entity_id.clone()))
    }

    /// Run a closure holding the entity's write lock. One acquisition is
    /// one transaction: mutations and the snapshot read both use this.
    fn with_ledger<T>(
        &self,
        entity_id: &EntityId,
        f: impl FnOnce(&mut EntityLedger) -> EquityResult<T>,
    ) -> EquityResult<T> {
        let ledger = self.entity(entity_id)?;
        let mut guard: MutexGuard<'_, EntityLedger> =
            ledger.lock().map_err(|_| poisoned(entity_id))?;
        f(&mut guard)
    }

    // --- Membership ---

    pub fn add_member(&self, entity_id: &EntityId, member: MemberId) -> EquityResult<()> {
        self.with_ledger(entity_id, |l| l.add_member(member))
    }

    pub fn join(
        &self,
        entity_id: &EntityId,
        member: MemberId,
        reason: &str,
    ) -> EquityResult<Stake> {
        self.with_ledger(entity_id, |l| l.join(member, reason))
    }

    pub fn deactivate_member(
        &self,
        entity_id: &EntityId,
        member: &MemberId,
    ) -> EquityResult<EquityAmount> {
        self.with_ledger(entity_id, |l| l.deactivate_member(member))
    }

    // --- Ledger operations ---

    pub fn grant(
        &self,
        entity_id: &EntityId,
        actor: &MemberId,
        to: &MemberId,
        amount: EquityAmount,
        reason: &str,
    ) -> EquityResult<Stake> {
        self.with_ledger(entity_id, |l| l.grant(actor, to, amount, reason))
    }

    pub fn transfer(
        &self,
        entity_id: &EntityId,
        actor: &MemberId,
        from: &MemberId,
        to: &MemberId,
        amount: EquityAmount,
        reason: &str,
    ) -> EquityResult<(Stake, Stake)> {
        self.with_ledger(entity_id, |l| l.transfer(actor, from, to, amount, reason))
    }

    pub fn dilute(
        &self,
        entity_id: &EntityId,
        actor: &MemberId,
        amount: EquityAmount,
        reason: &str,
    ) -> EquityResult<EquityAmount> {
        self.with_ledger(entity_id, |l| l.dilute(actor, amount, reason))
    }

    pub fn reward_for_task(
        &self,
        entity_id: &EntityId,
        actor: &MemberId,
        to: &MemberId,
        amount: EquityAmount,
        task_ref: &str,
    ) -> EquityResult<Stake> {
        self.with_ledger(entity_id, |l| l.reward(actor, to, amount, task_ref))
    }

    // --- Read surface ---

    pub fn stake_of(&self, entity_id: &EntityId, member: &MemberId) -> EquityResult<EquityAmount> {
        self.with_ledger(entity_id, |l| Ok(l.stake_of(member)))
    }

    pub fn treasury_of(&self, entity_id: &EntityId) -> EquityResult<EquityAmount> {
        self.with_ledger(entity_id, |l| Ok(l.treasury()))
    }

    pub fn total_equity_of(&self, entity_id: &EntityId) -> EquityResult<EquityAmount> {
        self.with_ledger(entity_id, |l| Ok(l.total_equity()))
    }

    /// Consistent point-in-time read of every current member's stake.
    ///
    /// Used to freeze voting power for a decision: the single lock
    /// acquisition is the transactional read, so no mutation can
    /// interleave with the capture.
    pub fn snapshot_distribution(
        &self,
        entity_id: &EntityId,
    ) -> EquityResult<Vec<(MemberId, EquityAmount)>> {
        self.with_ledger(entity_id, |l| Ok(l.distribution()))
    }

    /// Percentage shares, derived on read
    pub fn percentages(&self, entity_id: &EntityId) -> EquityResult<Vec<(MemberId, f64)>> {
        self.with_ledger(entity_id, |l| Ok(l.percentages()))
    }

    pub fn transactions(&self, entity_id: &EntityId) -> EquityResult<Vec<LedgerTransaction>> {
        self.with_ledger(entity_id, |l| Ok(l.transactions().to_vec()))
    }
}

impl Default for LedgerService {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(entity_id: &EntityId) -> EquityError {
    EquityError::State(format!(
        "ledger lock poisoned for entity {}; writes require reconciliation",
        entity_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn setup() -> (LedgerService, EntityId, Vec<MemberId>) {
        let service = LedgerService::new();
        let entity = EntityId::new("acme");
        service
            .create_entity(entity.clone(), EquityAmount::from_points(100))
            .unwrap();
        let members: Vec<MemberId> = (0..4).map(|i| MemberId::new(format!("m-{}", i))).collect();
        for m in &members {
            service.add_member(&entity, m.clone()).unwrap();
        }
        (service, entity, members)
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let (service, entity, _) = setup();
        let err = service
            .create_entity(entity, EquityAmount::from_points(1))
            .unwrap_err();
        assert!(matches!(err, EquityError::Conflict(_)));
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let service = LedgerService::new();
        let err = service
            .treasury_of(&EntityId::new("ghost"))
            .unwrap_err();
        assert!(matches!(err, EquityError::EntityNotFound(_)));
    }

    #[test]
    fn test_operations_route_through_entity_ledger() {
        let (service, entity, members) = setup();
        let actor = MemberId::new("system");

        service
            .grant(&entity, &actor, &members[0], EquityAmount::from_points(60), "g")
            .unwrap();
        service
            .transfer(
                &entity,
                &members[0],
                &members[0],
                &members[1],
                EquityAmount::from_points(20),
                "t",
            )
            .unwrap();

        assert_eq!(
            service.stake_of(&entity, &members[0]).unwrap(),
            EquityAmount::from_points(40)
        );
        assert_eq!(
            service.stake_of(&entity, &members[1]).unwrap(),
            EquityAmount::from_points(20)
        );
        assert_eq!(
            service.treasury_of(&entity).unwrap(),
            EquityAmount::from_points(40)
        );
    }

    #[test]
    fn test_concurrent_grants_cannot_overdraw_treasury() {
        let (service, entity, members) = setup();
        let service = Arc::new(service);

        // Treasury holds 100 points; 8 threads each try to grant 30.
        // At most 3 can succeed no matter the interleaving.
        let mut handles = Vec::new();
        for i in 0..8 {
            let service = Arc::clone(&service);
            let entity = entity.clone();
            let to = members[i % members.len()].clone();
            handles.push(thread::spawn(move || {
                let actor = MemberId::new("system");
                service
                    .grant(&entity, &actor, &to, EquityAmount::from_points(30), "race")
                    .is_ok()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|granted| *granted)
            .count();
        assert!(successes <= 3);

        let treasury = service.treasury_of(&entity).unwrap();
        let granted = EquityAmount::from_points(30 * successes as u64);
        assert_eq!(
            treasury.saturating_add(granted),
            EquityAmount::from_points(100)
        );
    }

    #[test]
    fn test_concurrent_mixed_operations_conserve() {
        let (service, entity, members) = setup();
        let service = Arc::new(service);
        let actor = MemberId::new("system");

        service
            .grant(&entity, &actor, &members[0], EquityAmount::from_points(50), "seed")
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = Arc::clone(&service);
            let entity = entity.clone();
            let from = members[0].clone();
            let to = members[1 + (i % 3)].clone();
            handles.push(thread::spawn(move || {
                let actor = MemberId::new("system");
                for _ in 0..25 {
                    let _ = service.grant(
                        &entity,
                        &actor,
                        &to,
                        EquityAmount::from_base_units(7),
                        "c-grant",
                    );
                    let _ = service.transfer(
                        &entity,
                        &from,
                        &from,
                        &to,
                        EquityAmount::from_base_units(3),
                        "c-transfer",
                    );
                    let _ = service.dilute(
                        &entity,
                        &actor,
                        EquityAmount::from_base_units(11),
                        "c-dilute",
                    );
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Conservation held through every interleaving.
        let total = service.total_equity_of(&entity).unwrap();
        let treasury = service.treasury_of(&entity).unwrap();
        let distributed: EquityAmount = service
            .snapshot_distribution(&entity)
            .unwrap()
            .into_iter()
            .fold(EquityAmount::ZERO, |acc, (_, a)| acc.saturating_add(a));
        assert_eq!(distributed.saturating_add(treasury), total);
    }

    #[test]
    fn test_entities_are_isolated() {
        let (service, entity_a, members) = setup();
        let entity_b = EntityId::new("other-co");
        service
            .create_entity(entity_b.clone(), EquityAmount::from_points(10))
            .unwrap();
        service.add_member(&entity_b, members[0].clone()).unwrap();
        let actor = MemberId::new("system");

        service
            .grant(&entity_b, &actor, &members[0], EquityAmount::from_points(10), "g")
            .unwrap();

        assert_eq!(
            service.treasury_of(&entity_b).unwrap(),
            EquityAmount::ZERO
        );
        assert_eq!(
            service.treasury_of(&entity_a).unwrap(),
            EquityAmount::from_points(100)
        );
    }

    #[test]
    fn test_snapshot_distribution_lists_current_members_only() {
        let (service, entity, members) = setup();
        let actor = MemberId::new("system");

        service
            .grant(&entity, &actor, &members[0], EquityAmount::from_points(30), "g")
            .unwrap();
        service.deactivate_member(&entity, &members[3]).unwrap();

        let distribution = service.snapshot_distribution(&entity).unwrap();
        assert_eq!(distribution.len(), 3);
        assert!(distribution.iter().all(|(m, _)| *m != members[3]));
    }
}
