//! Debate rounds — opinions, rosters and per-round views.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::consensus::{average_confidence, ClosedRound};
use super::position::{Position, PositionTally};
use crate::error::ValidationError;
use crate::proposal::{AgentId, ProposalId};

/// One agent expected to weigh in on a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Agent identifier as known to the agent registry.
    pub agent_id: AgentId,
    /// Whether the agent holds the project-manager role.
    #[serde(default)]
    pub is_pm: bool,
}

impl Participant {
    pub fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            is_pm: false,
        }
    }

    pub fn pm(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            is_pm: true,
        }
    }
}

/// The set of agents expected to opine on a proposal.
///
/// An empty roster means open participation: any agent may submit, and a
/// round closes on its first opinion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    members: Vec<Participant>,
}

impl Roster {
    /// Build a roster, keeping the first entry for any repeated agent id.
    pub fn new(members: impl IntoIterator<Item = Participant>) -> Self {
        let mut deduped: Vec<Participant> = Vec::new();
        for member in members {
            if !deduped.iter().any(|m| m.agent_id == member.agent_id) {
                deduped.push(member);
            }
        }
        Self { members: deduped }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the agent may submit opinions.
    pub fn admits(&self, agent_id: &str) -> bool {
        self.is_empty() || self.contains(agent_id)
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.members.iter().any(|m| m.agent_id == agent_id)
    }

    /// Whether the agent is on the roster with the PM role.
    pub fn is_pm(&self, agent_id: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.agent_id == agent_id && m.is_pm)
    }

    /// Number of PM-flagged members.
    pub fn pm_count(&self) -> usize {
        self.members.iter().filter(|m| m.is_pm).count()
    }

    /// Whether every member has an opinion among `respondents`.
    ///
    /// Empty rosters are complete as soon as anyone has responded.
    pub fn is_complete<'a>(&self, respondents: impl IntoIterator<Item = &'a str>) -> bool {
        let respondents: Vec<&str> = respondents.into_iter().collect();
        if self.is_empty() {
            return !respondents.is_empty();
        }
        self.members
            .iter()
            .all(|m| respondents.contains(&m.agent_id.as_str()))
    }
}

impl FromIterator<Participant> for Roster {
    fn from_iter<I: IntoIterator<Item = Participant>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// One agent's opinion within one numbered round of one proposal.
///
/// Append-only: never edited once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    /// Unique opinion identifier.
    pub id: String,
    /// Parent proposal.
    pub proposal_id: ProposalId,
    /// Round number (1-indexed).
    pub round: u32,
    /// Submitting agent.
    pub agent_id: AgentId,
    /// Position exactly as submitted.
    pub position: String,
    /// Free-text reasoning.
    pub reasoning: String,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// When the opinion was stored.
    pub created_at: DateTime<Utc>,
}

impl DebateRound {
    /// Stance derived from the position text.
    pub fn classified_position(&self) -> Position {
        Position::classify(&self.position)
    }
}

/// Request to submit an opinion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpinionSubmission {
    pub proposal_id: ProposalId,
    pub agent_id: AgentId,
    pub position: String,
    #[serde(default)]
    pub reasoning: String,
    pub confidence: f64,
    /// Round the agent believes is open. `None` targets the current round.
    #[serde(default)]
    pub round: Option<u32>,
}

impl OpinionSubmission {
    pub fn new(
        proposal_id: impl Into<ProposalId>,
        agent_id: impl Into<AgentId>,
        position: impl Into<String>,
        reasoning: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            proposal_id: proposal_id.into(),
            agent_id: agent_id.into(),
            position: position.into(),
            reasoning: reasoning.into(),
            confidence,
            round: None,
        }
    }

    /// Pin the submission to an explicit round number.
    pub fn for_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    /// Check input shape. Out-of-range confidence is rejected, never clamped.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.agent_id.trim().is_empty() {
            return Err(ValidationError::BlankField { field: "agent_id" });
        }
        if self.position.trim().is_empty() {
            return Err(ValidationError::BlankField { field: "position" });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::ConfidenceOutOfRange {
                value: self.confidence,
            });
        }
        if self.round == Some(0) {
            return Err(ValidationError::InvalidRound(0));
        }
        Ok(())
    }
}

/// All opinions of one round, with their classification summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundView {
    pub round: u32,
    pub opinions: Vec<DebateRound>,
    pub tally: PositionTally,
    pub average_confidence: Option<f64>,
    /// Evaluation record, once the round has closed.
    pub closure: Option<ClosedRound>,
}

/// Group a proposal's opinions by round number, ascending.
pub fn group_rounds(opinions: &[DebateRound], closed: &[ClosedRound]) -> Vec<RoundView> {
    let mut by_round: BTreeMap<u32, Vec<DebateRound>> = BTreeMap::new();
    for opinion in opinions {
        by_round
            .entry(opinion.round)
            .or_default()
            .push(opinion.clone());
    }
    // Rounds force-closed with no opinions still get a view.
    for record in closed {
        by_round.entry(record.round).or_default();
    }

    by_round
        .into_iter()
        .map(|(round, mut opinions)| {
            opinions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            RoundView {
                round,
                tally: opinions.iter().map(DebateRound::classified_position).collect(),
                average_confidence: average_confidence(&opinions),
                closure: closed.iter().find(|c| c.round == round).cloned(),
                opinions,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opinion(round: u32, agent: &str, position: &str, confidence: f64) -> DebateRound {
        DebateRound {
            id: format!("op-{}-{}", round, agent),
            proposal_id: "p-1".to_string(),
            round,
            agent_id: agent.to_string(),
            position: position.to_string(),
            reasoning: String::new(),
            confidence,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_roster_dedupes_agents() {
        let roster = Roster::new([
            Participant::pm("pm-1"),
            Participant::new("pm-1"),
            Participant::new("dev-1"),
        ]);
        assert_eq!(roster.len(), 2);
        assert!(roster.is_pm("pm-1"));
        assert_eq!(roster.pm_count(), 1);
    }

    #[test]
    fn test_roster_completion() {
        let roster: Roster = [Participant::new("a"), Participant::new("b")]
            .into_iter()
            .collect();
        assert!(!roster.is_complete(["a"]));
        assert!(roster.is_complete(["b", "a"]));
        assert!(!roster.admits("c"));
    }

    #[test]
    fn test_empty_roster_is_open() {
        let roster = Roster::default();
        assert!(roster.admits("anyone"));
        assert!(!roster.is_complete(Vec::<&str>::new()));
        assert!(roster.is_complete(["anyone"]));
    }

    #[test]
    fn test_submission_confidence_bounds() {
        let base = OpinionSubmission::new("p-1", "a", "approve", "", 0.0);
        assert!(base.validate().is_ok());
        assert!(OpinionSubmission { confidence: 1.0, ..base.clone() }
            .validate()
            .is_ok());

        for bad in [-0.1, 1.1, f64::NAN] {
            let err = OpinionSubmission {
                confidence: bad,
                ..base.clone()
            }
            .validate()
            .unwrap_err();
            assert!(matches!(err, ValidationError::ConfidenceOutOfRange { .. }));
        }
    }

    #[test]
    fn test_submission_blank_fields() {
        let err = OpinionSubmission::new("p-1", " ", "approve", "", 0.5)
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::BlankField { field: "agent_id" });

        let err = OpinionSubmission::new("p-1", "a", "", "", 0.5)
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::BlankField { field: "position" });

        let err = OpinionSubmission::new("p-1", "a", "approve", "", 0.5)
            .for_round(0)
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::InvalidRound(0));
    }

    #[test]
    fn test_group_rounds() {
        let opinions = vec![
            opinion(2, "a", "approve", 0.5),
            opinion(1, "a", "approve", 0.9),
            opinion(1, "b", "reject", 0.7),
        ];
        let views = group_rounds(&opinions, &[]);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].round, 1);
        assert_eq!(views[0].tally.supportive, 1);
        assert_eq!(views[0].tally.opposing, 1);
        assert!((views[0].average_confidence.unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(views[1].round, 2);
        assert!(views[1].closure.is_none());
    }
}
