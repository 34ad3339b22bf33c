//! Vote tally and resolution — a pure function
//!
//! `resolve` computes a deterministic outcome from votes, the frozen
//! snapshot, the voting method, and the quorum threshold. No side
//! effects, no clock, no storage: the same inputs always produce the
//! same outcome.

use equity_types::{
    DecisionStatus, EquityAmount, MemberId, Outcome, Snapshot, Tally, VoteRecord, VotingMethod,
};
use std::collections::BTreeMap;

/// A voter's weight under the given method.
///
/// Unit-weight methods count one point per voter on both sides of the
/// quorum fraction, so turnout means participation; equity weighting
/// counts snapshotted stake on both sides, so turnout means capital.
pub fn method_weight(method: VotingMethod, snapshot: &Snapshot, member: &MemberId) -> EquityAmount {
    match method {
        VotingMethod::EquityWeighted => snapshot.weight_of(member).unwrap_or(EquityAmount::ZERO),
        VotingMethod::OneMemberOneVote | VotingMethod::Unanimous => EquityAmount::from_points(1),
    }
}

/// Resolve a decision to `Passed` or `Rejected`.
///
/// Winner is the option with the greatest aggregate weight; ties break
/// to the option declared earliest in `options`. Quorum is checked
/// before tallies: an under-quorum decision is rejected regardless of
/// who led.
pub fn resolve(
    options: &[String],
    votes: &BTreeMap<MemberId, VoteRecord>,
    snapshot: &Snapshot,
    method: VotingMethod,
    quorum_threshold: f64,
) -> Outcome {
    let eligible_weight = snapshot
        .weights
        .keys()
        .fold(EquityAmount::ZERO, |acc, member| {
            acc.saturating_add(method_weight(method, snapshot, member))
        });

    let mut tally = Tally {
        totals: options
            .iter()
            .map(|option| (option.clone(), EquityAmount::ZERO))
            .collect(),
    };
    let mut cast_weight = EquityAmount::ZERO;
    for (voter, vote) in votes {
        // Votes from outside the snapshot never reach here; skip rather
        // than count.
        if !snapshot.contains(voter) {
            continue;
        }
        let weight = method_weight(method, snapshot, voter);
        cast_weight = cast_weight.saturating_add(weight);
        if let Some(slot) = tally.totals.iter_mut().find(|(name, _)| *name == vote.option) {
            slot.1 = slot.1.saturating_add(weight);
        }
    }

    if eligible_weight.is_zero() {
        return rejected(tally, false, 0.0, "no eligible voting weight");
    }

    let turnout = cast_weight.base_units() as f64 / eligible_weight.base_units() as f64;
    let quorum_met = turnout >= quorum_threshold;

    if method == VotingMethod::Unanimous {
        let voted = votes.keys().filter(|voter| snapshot.contains(voter)).count();
        if voted < snapshot.eligible_count() {
            return rejected(
                tally,
                quorum_met,
                turnout,
                format!(
                    "unanimous decision requires every snapshotted member to vote \
                     ({} of {} voted)",
                    voted,
                    snapshot.eligible_count()
                ),
            );
        }
        let mut chosen: Option<&str> = None;
        for (voter, vote) in votes {
            // Same eligibility rule as the tally loop: ballots from
            // outside the snapshot can neither veto nor win.
            if !snapshot.contains(voter) {
                continue;
            }
            match chosen {
                None => chosen = Some(&vote.option),
                Some(option) if option != vote.option => {
                    return rejected(
                        tally,
                        quorum_met,
                        turnout,
                        "unanimous decision split across options",
                    );
                }
                Some(_) => {}
            }
        }
        let winner = chosen.map(str::to_owned);
        let reason = match &winner {
            Some(option) => format!("unanimous for {:?}", option),
            None => return rejected(tally, quorum_met, turnout, "no votes cast"),
        };
        return Outcome {
            status: DecisionStatus::Passed,
            winning_option: winner,
            tally,
            quorum_met,
            turnout,
            reason,
        };
    }

    if !quorum_met {
        return rejected(tally, false, turnout, "quorum not met");
    }
    if cast_weight.is_zero() {
        return rejected(tally, quorum_met, turnout, "no votes cast");
    }

    // Greatest aggregate weight wins; strict comparison keeps the
    // earliest-declared option on ties.
    let mut winner = &tally.totals[0];
    for candidate in &tally.totals[1..] {
        if candidate.1 > winner.1 {
            winner = candidate;
        }
    }
    let (winning_option, winning_weight) = (winner.0.clone(), winner.1);

    Outcome {
        status: DecisionStatus::Passed,
        winning_option: Some(winning_option.clone()),
        tally,
        quorum_met,
        turnout,
        reason: format!(
            "option {:?} leads with weight {}",
            winning_option, winning_weight
        ),
    }
}

fn rejected(
    tally: Tally,
    quorum_met: bool,
    turnout: f64,
    reason: impl Into<String>,
) -> Outcome {
    Outcome {
        status: DecisionStatus::Rejected,
        winning_option: None,
        tally,
        quorum_met,
        turnout,
        reason: reason.into(),
    }
}
