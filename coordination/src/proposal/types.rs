//! Proposal records — types, lifecycle statuses, and transitions.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ProjectDebateConfig;
use crate::debate::{ClosedRound, Roster};
use crate::directory::ProjectProfile;
use crate::error::ValidationError;

/// Proposal identifier.
pub type ProposalId = String;
/// Owning project identifier.
pub type ProjectId = String;
/// Agent identifier as known to the agent registry.
pub type AgentId = String;

/// Kind of decision a proposal asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalType {
    TaskCreation,
    SprintPlan,
    ArchitectureDecision,
    ResourceAllocation,
    PriorityChange,
    Other,
}

impl ProposalType {
    pub const ALL: [ProposalType; 6] = [
        Self::TaskCreation,
        Self::SprintPlan,
        Self::ArchitectureDecision,
        Self::ResourceAllocation,
        Self::PriorityChange,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCreation => "task_creation",
            Self::SprintPlan => "sprint_plan",
            Self::ArchitectureDecision => "architecture_decision",
            Self::ResourceAllocation => "resource_allocation",
            Self::PriorityChange => "priority_change",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ProposalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownProposalType(s.to_string()))
    }
}

/// Lifecycle status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Created, no opinions yet.
    Open,
    /// At least one opinion received; rounds in progress.
    Debating,
    /// Latest closed round converged; awaiting review.
    Consensus,
    /// Round cap reached or PM quorum impossible; awaiting a decision.
    Escalated,
    Approved,
    Rejected,
}

impl ProposalStatus {
    /// Whether this is a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Whether opinions can still be submitted.
    pub fn accepts_opinions(self) -> bool {
        matches!(self, Self::Open | Self::Debating)
    }

    /// Whether an explicit decision may resolve the proposal.
    pub fn awaits_decision(self) -> bool {
        matches!(self, Self::Consensus | Self::Escalated)
    }

    /// Valid transitions from this status.
    ///
    /// `debating → approved` is only taken by the instant-consensus fast path.
    pub fn valid_transitions(self) -> &'static [ProposalStatus] {
        match self {
            Self::Open => &[Self::Debating],
            Self::Debating => &[Self::Consensus, Self::Escalated, Self::Approved],
            Self::Consensus => &[Self::Approved, Self::Rejected],
            Self::Escalated => &[Self::Approved, Self::Rejected],
            Self::Approved | Self::Rejected => &[],
        }
    }

    pub fn can_transition_to(self, to: ProposalStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Debating => write!(f, "debating"),
            Self::Consensus => write!(f, "consensus"),
            Self::Escalated => write!(f, "escalated"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A status transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: ProposalStatus,
    pub to: ProposalStatus,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid status transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ProposalStatus,
    pub to: ProposalStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for TransitionError {}

/// Request to create a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProposal {
    pub project_id: ProjectId,
    pub proposal_type: ProposalType,
    pub title: String,
    #[serde(default)]
    pub content: serde_json::Value,
    /// `None` for human-originated proposals.
    #[serde(default)]
    pub proposed_by: Option<AgentId>,
}

impl NewProposal {
    pub fn new(
        project_id: impl Into<ProjectId>,
        proposal_type: ProposalType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            proposal_type,
            title: title.into(),
            content: serde_json::Value::Null,
            proposed_by: None,
        }
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn proposed_by(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.proposed_by = Some(agent_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingTitle);
        }
        if self.project_id.trim().is_empty() {
            return Err(ValidationError::BlankField {
                field: "project_id",
            });
        }
        if matches!(&self.proposed_by, Some(agent) if agent.trim().is_empty()) {
            return Err(ValidationError::BlankField {
                field: "proposed_by",
            });
        }
        Ok(())
    }
}

/// A proposal under debate.
///
/// Immutable after creation except for status, resolution timestamp and
/// round bookkeeping. Opinions live in the store, not on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub project_id: ProjectId,
    pub proposal_type: ProposalType,
    pub title: String,
    pub content: serde_json::Value,
    pub proposed_by: Option<AgentId>,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    /// Set once the proposal reaches a terminal status.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Open round number; 0 until the first opinion arrives.
    pub current_round: u32,
    /// When the current round opened.
    pub round_opened_at: Option<DateTime<Utc>>,
    /// Project debate policy pinned at creation time.
    #[serde(default)]
    pub config: ProjectDebateConfig,
    /// Participants pinned at creation time.
    pub roster: Roster,
    /// Evaluation records of every closed round, ascending.
    #[serde(default)]
    pub closed_rounds: Vec<ClosedRound>,
    /// Status transition history.
    #[serde(default)]
    pub transitions: Vec<StatusTransition>,
    /// Optimistic concurrency version, bumped by every store update.
    #[serde(default)]
    pub version: u64,
}

impl Proposal {
    /// Build a fresh `open` proposal from a validated request.
    pub fn new(id: impl Into<ProposalId>, request: NewProposal, profile: ProjectProfile) -> Self {
        Self {
            id: id.into(),
            project_id: request.project_id,
            proposal_type: request.proposal_type,
            title: request.title,
            content: request.content,
            proposed_by: request.proposed_by,
            status: ProposalStatus::Open,
            created_at: Utc::now(),
            resolved_at: None,
            current_round: 0,
            round_opened_at: None,
            config: profile.config,
            roster: profile.roster,
            closed_rounds: Vec::new(),
            transitions: Vec::new(),
            version: 0,
        }
    }

    /// Transition to a new status, recording the reason.
    pub fn transition(
        &mut self,
        to: ProposalStatus,
        reason: &str,
    ) -> Result<StatusTransition, TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }

        let record = StatusTransition {
            from: self.status,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        };
        self.transitions.push(record.clone());
        self.status = to;
        if to.is_terminal() {
            self.resolved_at = Some(record.timestamp);
        }
        Ok(record)
    }

    /// Round that the next opinion belongs to.
    pub fn open_round(&self) -> u32 {
        self.current_round.max(1)
    }

    /// Move bookkeeping to `round`, stamping its opening time.
    pub fn open_next_round(&mut self, round: u32, at: DateTime<Utc>) {
        self.current_round = round;
        self.round_opened_at = Some(at);
    }

    /// Most recent closed round.
    pub fn last_closed_round(&self) -> Option<&ClosedRound> {
        self.closed_rounds.last()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} round {} | {} | project={}",
            self.status, self.id, self.current_round, self.title, self.project_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal() -> Proposal {
        Proposal::new(
            "p-1",
            NewProposal::new("proj", ProposalType::SprintPlan, "Sprint 12"),
            ProjectProfile::default(),
        )
    }

    #[test]
    fn test_proposal_type_parse() {
        assert_eq!(
            "architecture_decision".parse::<ProposalType>().unwrap(),
            ProposalType::ArchitectureDecision
        );
        assert_eq!(" Other ".parse::<ProposalType>().unwrap(), ProposalType::Other);
        let err = "budget".parse::<ProposalType>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownProposalType("budget".into()));
    }

    #[test]
    fn test_proposal_type_serde_matches_display() {
        for t in ProposalType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t));
        }
    }

    #[test]
    fn test_new_proposal_validation() {
        let ok = NewProposal::new("proj", ProposalType::Other, "Title");
        assert!(ok.validate().is_ok());

        let blank = NewProposal::new("proj", ProposalType::Other, "   ");
        assert_eq!(blank.validate().unwrap_err(), ValidationError::MissingTitle);

        let no_project = NewProposal::new("", ProposalType::Other, "Title");
        assert!(no_project.validate().is_err());
    }

    #[test]
    fn test_new_proposal_is_open() {
        let p = proposal();
        assert_eq!(p.status, ProposalStatus::Open);
        assert_eq!(p.current_round, 0);
        assert_eq!(p.open_round(), 1);
        assert!(p.resolved_at.is_none());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut p = proposal();
        p.transition(ProposalStatus::Debating, "first opinion").unwrap();
        p.transition(ProposalStatus::Consensus, "round 1 converged")
            .unwrap();
        assert!(p.resolved_at.is_none());
        p.transition(ProposalStatus::Approved, "review window elapsed")
            .unwrap();
        assert!(p.resolved_at.is_some());
        assert_eq!(p.transitions.len(), 3);
        assert_eq!(p.transitions[0].from, ProposalStatus::Open);
        assert_eq!(p.transitions[2].to, ProposalStatus::Approved);
    }

    #[test]
    fn test_no_skipping_open() {
        let mut p = proposal();
        let err = p
            .transition(ProposalStatus::Consensus, "skip")
            .unwrap_err();
        assert_eq!(err.from, ProposalStatus::Open);
        assert_eq!(err.to, ProposalStatus::Consensus);
        assert!(p.transitions.is_empty());
    }

    #[test]
    fn test_terminal_statuses_are_final() {
        for terminal in [ProposalStatus::Approved, ProposalStatus::Rejected] {
            assert!(terminal.is_terminal());
            assert!(terminal.valid_transitions().is_empty());
            assert!(!terminal.accepts_opinions());
        }
    }

    #[test]
    fn test_nothing_reenters_open() {
        for status in [
            ProposalStatus::Open,
            ProposalStatus::Debating,
            ProposalStatus::Consensus,
            ProposalStatus::Escalated,
            ProposalStatus::Approved,
            ProposalStatus::Rejected,
        ] {
            assert!(!status.can_transition_to(ProposalStatus::Open));
        }
    }

    #[test]
    fn test_escalated_needs_decision() {
        assert!(ProposalStatus::Escalated.awaits_decision());
        assert!(!ProposalStatus::Escalated.accepts_opinions());
        assert!(!ProposalStatus::Escalated.can_transition_to(ProposalStatus::Consensus));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ProposalStatus::Open.to_string(), "open");
        assert_eq!(ProposalStatus::Debating.to_string(), "debating");
        assert_eq!(ProposalStatus::Consensus.to_string(), "consensus");
        assert_eq!(ProposalStatus::Escalated.to_string(), "escalated");
        assert_eq!(ProposalStatus::Approved.to_string(), "approved");
        assert_eq!(ProposalStatus::Rejected.to_string(), "rejected");
    }

    #[test]
    fn test_status_line() {
        let line = proposal().status_line();
        assert!(line.contains("[open]"));
        assert!(line.contains("Sprint 12"));
    }
}
