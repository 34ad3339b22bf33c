//! Decision lifecycle types: proposals, snapshots, votes, and outcomes
//!
//! Voting power is fixed by an immutable `Snapshot` taken when the
//! decision is created, so ledger mutations during an open vote cannot
//! move an outcome after the fact.

use crate::{DecisionId, EntityId, EquityAmount, EquityError, EquityResult, MemberId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fewest options a decision may offer
pub const MIN_OPTIONS: usize = 2;
/// Most options a decision may offer
pub const MAX_OPTIONS: usize = 10;

/// How cast votes are weighted at resolution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingMethod {
    /// Weight = the voter's snapshotted stake
    EquityWeighted,
    /// Weight = one unit per voter, regardless of equity
    OneMemberOneVote,
    /// One unit per voter; passes only on full, unanimous participation
    Unanimous,
}

/// Lifecycle state of a decision
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Created with a scheduled future start
    Draft,
    /// Open for votes inside the voting window
    #[default]
    Active,
    Passed,
    Rejected,
    /// Explicitly cancelled while draft or active
    Expired,
}

impl DecisionStatus {
    /// Terminal states accept no further votes or transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DecisionStatus::Passed | DecisionStatus::Rejected | DecisionStatus::Expired
        )
    }
}

/// Immutable capture of every current member's stake at proposal time.
///
/// A member absent from the snapshot is not eligible to vote on this
/// decision — that is an explicit rejection, never a zero-weight vote.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub decision_id: DecisionId,
    pub entity_id: EntityId,
    pub weights: BTreeMap<MemberId, EquityAmount>,
    pub taken_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn capture(
        decision_id: DecisionId,
        entity_id: EntityId,
        distribution: impl IntoIterator<Item = (MemberId, EquityAmount)>,
    ) -> Self {
        Self {
            decision_id,
            entity_id,
            weights: distribution.into_iter().collect(),
            taken_at: Utc::now(),
        }
    }

    pub fn contains(&self, member: &MemberId) -> bool {
        self.weights.contains_key(member)
    }

    pub fn weight_of(&self, member: &MemberId) -> Option<EquityAmount> {
        self.weights.get(member).copied()
    }

    pub fn eligible_count(&self) -> usize {
        self.weights.len()
    }

    /// Sum of all snapshotted stakes
    pub fn total_weight(&self) -> EquityAmount {
        self.weights
            .values()
            .fold(EquityAmount::ZERO, |acc, w| acc.saturating_add(*w))
    }
}

/// One member's vote on one decision.
///
/// Uniqueness per `(decision_id, voter)` is enforced by the decision
/// engine's vote map, not by convention.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteRecord {
    pub decision_id: DecisionId,
    pub voter: MemberId,
    pub option: String,
    /// The voter's weight under the decision's method, frozen at cast time
    pub weight_at_cast: EquityAmount,
    pub cast_at: DateTime<Utc>,
}

/// Aggregate weight per option, in option declaration order
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Tally {
    pub totals: Vec<(String, EquityAmount)>,
}

impl Tally {
    pub fn weight_for(&self, option: &str) -> EquityAmount {
        self.totals
            .iter()
            .find(|(name, _)| name == option)
            .map(|(_, w)| *w)
            .unwrap_or(EquityAmount::ZERO)
    }

    /// Total weight cast across all options
    pub fn total_cast(&self) -> EquityAmount {
        self.totals
            .iter()
            .fold(EquityAmount::ZERO, |acc, (_, w)| acc.saturating_add(*w))
    }
}

/// The stored result of resolving a decision
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outcome {
    pub status: DecisionStatus,
    pub winning_option: Option<String>,
    pub tally: Tally,
    pub quorum_met: bool,
    /// Cast weight over eligible weight, in `[0, 1]`
    pub turnout: f64,
    pub reason: String,
}

/// A multi-option proposal resolved by weighted voting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub entity_id: EntityId,
    pub proposer: MemberId,
    pub title: String,
    /// Between `MIN_OPTIONS` and `MAX_OPTIONS` distinct choices
    pub options: Vec<String>,
    pub method: VotingMethod,
    pub status: DecisionStatus,
    pub voting_starts_at: DateTime<Utc>,
    pub voting_ends_at: DateTime<Utc>,
    /// Minimum fraction of eligible weight that must participate
    pub quorum_threshold: f64,
    /// Set exactly once, when the decision reaches a terminal state
    pub outcome: Option<Outcome>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    /// Validate and create a decision proposal.
    ///
    /// Status starts `Active` if the window has already opened, otherwise
    /// `Draft` awaiting the scheduled start.
    pub fn new(
        entity_id: EntityId,
        proposer: MemberId,
        title: impl Into<String>,
        options: Vec<String>,
        method: VotingMethod,
        voting_starts_at: DateTime<Utc>,
        voting_ends_at: DateTime<Utc>,
    ) -> EquityResult<Self> {
        if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
            return Err(EquityError::Validation(format!(
                "decision needs {} to {} options, got {}",
                MIN_OPTIONS,
                MAX_OPTIONS,
                options.len()
            )));
        }
        for (i, option) in options.iter().enumerate() {
            if option.trim().is_empty() {
                return Err(EquityError::Validation("empty option label".into()));
            }
            if options[..i].contains(option) {
                return Err(EquityError::Validation(format!(
                    "duplicate option: {:?}",
                    option
                )));
            }
        }
        if voting_ends_at <= voting_starts_at {
            return Err(EquityError::Validation(
                "voting window must end after it starts".into(),
            ));
        }

        let now = Utc::now();
        let status = if voting_starts_at <= now {
            DecisionStatus::Active
        } else {
            DecisionStatus::Draft
        };

        Ok(Self {
            id: DecisionId::generate(),
            entity_id,
            proposer,
            title: title.into(),
            options,
            method,
            status,
            voting_starts_at,
            voting_ends_at,
            quorum_threshold: 0.0,
            outcome: None,
            resolved_at: None,
            created_at: now,
        })
    }

    pub fn with_quorum(mut self, threshold: f64) -> Self {
        self.quorum_threshold = threshold;
        self
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether `now` falls inside the voting window
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        self.voting_starts_at <= now && now <= self.voting_ends_at
    }

    pub fn winning_option(&self) -> Option<&str> {
        self.outcome
            .as_ref()
            .and_then(|o| o.winning_option.as_deref())
    }

    pub fn tally(&self) -> Option<&Tally> {
        self.outcome.as_ref().map(|o| &o.tally)
    }
}
