//! Consensus evaluation — classifies a closed round as converged or not.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::position::{Position, PositionTally};
use super::round::{DebateRound, Roster};
use crate::config::ProjectDebateConfig;

/// Outcome of evaluating one closed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundVerdict {
    /// Every opinion shares one classified position (and the PM
    /// requirement, when enabled, is met).
    Converged,
    /// Positions differ, the round was empty, or too few PMs responded.
    Diverged,
    /// Dual-PM consensus is required but the roster holds fewer than two
    /// PMs, so no round can ever converge.
    PmQuorumUnreachable,
}

impl RoundVerdict {
    pub fn is_converged(self) -> bool {
        self == Self::Converged
    }
}

impl std::fmt::Display for RoundVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::Diverged => write!(f, "diverged"),
            Self::PmQuorumUnreachable => write!(f, "pm_quorum_unreachable"),
        }
    }
}

/// Full evaluation of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundEvaluation {
    pub round: u32,
    pub verdict: RoundVerdict,
    /// Shared position when the round was unanimous.
    pub position: Option<Position>,
    pub tally: PositionTally,
    /// Reporting metric only; never gates convergence.
    pub average_confidence: Option<f64>,
    /// Distinct agents that responded.
    pub respondents: usize,
    /// Distinct PM-flagged agents that responded.
    pub pm_respondents: usize,
}

/// Evaluation record stored on the proposal once a round closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedRound {
    pub round: u32,
    pub verdict: RoundVerdict,
    pub position: Option<Position>,
    pub average_confidence: Option<f64>,
    pub respondents: usize,
    /// Closed by timeout rather than full roster participation.
    pub forced: bool,
    pub closed_at: DateTime<Utc>,
}

impl ClosedRound {
    pub fn from_evaluation(
        evaluation: &RoundEvaluation,
        forced: bool,
        closed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            round: evaluation.round,
            verdict: evaluation.verdict,
            position: evaluation.position,
            average_confidence: evaluation.average_confidence,
            respondents: evaluation.respondents,
            forced,
            closed_at,
        }
    }
}

/// Mean confidence across opinions, `None` for an empty slice.
pub fn average_confidence(opinions: &[DebateRound]) -> Option<f64> {
    if opinions.is_empty() {
        return None;
    }
    let sum: f64 = opinions.iter().map(|o| o.confidence).sum();
    Some(sum / opinions.len() as f64)
}

/// Applies the convergence policy to a closed round.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConsensusEvaluator {
    /// Require agreeing opinions from at least two distinct PM agents.
    pub require_dual_pm: bool,
}

impl ConsensusEvaluator {
    pub fn new(require_dual_pm: bool) -> Self {
        Self { require_dual_pm }
    }

    pub fn from_config(config: &ProjectDebateConfig) -> Self {
        Self::new(config.require_dual_pm_consensus)
    }

    /// Evaluate the opinions of `round`. Opinions from other rounds are ignored.
    pub fn evaluate(
        &self,
        round: u32,
        opinions: &[DebateRound],
        roster: &Roster,
    ) -> RoundEvaluation {
        let in_round: Vec<DebateRound> = opinions
            .iter()
            .filter(|o| o.round == round)
            .cloned()
            .collect();

        let tally: PositionTally = in_round
            .iter()
            .map(DebateRound::classified_position)
            .collect();
        let position = tally.unanimous();

        let agents: HashSet<&str> = in_round.iter().map(|o| o.agent_id.as_str()).collect();
        let pm_respondents = agents.iter().filter(|a| roster.is_pm(a)).count();

        let verdict = if self.require_dual_pm && roster.pm_count() < 2 {
            RoundVerdict::PmQuorumUnreachable
        } else if position.is_none() {
            RoundVerdict::Diverged
        } else if self.require_dual_pm && pm_respondents < 2 {
            RoundVerdict::Diverged
        } else {
            RoundVerdict::Converged
        };

        RoundEvaluation {
            round,
            verdict,
            position,
            tally,
            average_confidence: average_confidence(&in_round),
            respondents: agents.len(),
            pm_respondents,
        }
    }
}
