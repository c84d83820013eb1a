//! Escalation policy — decides what follows a closed round.
//!
//! All decisions are deterministic functions of the round evaluation and
//! the project's debate configuration.

use serde::{Deserialize, Serialize};

use super::consensus::{RoundEvaluation, RoundVerdict};
use super::position::Position;
use crate::config::ProjectDebateConfig;

/// Why a proposal was handed to a human or designated PM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
    /// `max_debate_rounds` rounds closed without convergence.
    RoundsExhausted { rounds: u32 },
    /// Dual-PM consensus is required but cannot be reached with this roster.
    PmQuorumUnreachable,
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundsExhausted { rounds } => {
                write!(f, "no convergence after {} rounds", rounds)
            }
            Self::PmQuorumUnreachable => {
                write!(f, "dual PM consensus required but fewer than two PMs on roster")
            }
        }
    }
}

/// What the engine does after a round closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EscalationDecision {
    /// Round converged. `instant` marks the round-1 fast path to `approved`.
    Finalize { instant: bool },
    /// Keep debating; the orchestrator now accepts `next_round`.
    OpenNextRound { next_round: u32 },
    /// Stop accepting opinions and wait for an explicit decision.
    Escalate { reason: EscalationReason },
}

impl std::fmt::Display for EscalationDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finalize { instant: true } => write!(f, "finalize (instant consensus)"),
            Self::Finalize { instant: false } => write!(f, "finalize"),
            Self::OpenNextRound { next_round } => write!(f, "open round {}", next_round),
            Self::Escalate { reason } => write!(f, "escalate: {}", reason),
        }
    }
}

/// Round cap and fast-path policy for one project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub max_debate_rounds: u32,
    pub auto_flag_instant_consensus: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::from_config(&ProjectDebateConfig::default())
    }
}

impl EscalationPolicy {
    pub fn from_config(config: &ProjectDebateConfig) -> Self {
        Self {
            max_debate_rounds: config.max_debate_rounds,
            auto_flag_instant_consensus: config.auto_flag_instant_consensus,
        }
    }

    /// Whether more rounds are available after `round`.
    pub fn has_rounds_remaining(&self, round: u32) -> bool {
        round < self.max_debate_rounds
    }

    /// Decide the follow-up to an evaluated round.
    ///
    /// The instant fast path only applies to a supportive round 1; unanimous
    /// opposition or neutrality still lands in `consensus` for review.
    pub fn decide(&self, evaluation: &RoundEvaluation) -> EscalationDecision {
        match evaluation.verdict {
            RoundVerdict::Converged => EscalationDecision::Finalize {
                instant: self.auto_flag_instant_consensus
                    && evaluation.round == 1
                    && evaluation.position == Some(Position::Supportive),
            },
            RoundVerdict::PmQuorumUnreachable => EscalationDecision::Escalate {
                reason: EscalationReason::PmQuorumUnreachable,
            },
            RoundVerdict::Diverged if self.has_rounds_remaining(evaluation.round) => {
                EscalationDecision::OpenNextRound {
                    next_round: evaluation.round + 1,
                }
            }
            RoundVerdict::Diverged => EscalationDecision::Escalate {
                reason: EscalationReason::RoundsExhausted {
                    rounds: evaluation.round,
                },
            },
        }
    }
}
