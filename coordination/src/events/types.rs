//! Event types emitted by the debate engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::{Position, RoundVerdict};
use crate::proposal::{AgentId, ProjectId, ProposalId, ProposalStatus, ProposalType};

/// Payload handed to status-change notifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub proposal_id: ProposalId,
    pub project_id: ProjectId,
    pub from: ProposalStatus,
    pub to: ProposalStatus,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Display for StatusChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "proposal {} ({}): {} → {} ({})",
            self.proposal_id, self.project_id, self.from, self.to, self.reason
        )
    }
}

/// All debate engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalEvent {
    /// A proposal was created
    ProposalCreated {
        proposal_id: ProposalId,
        project_id: ProjectId,
        proposal_type: ProposalType,
        title: String,
        proposed_by: Option<AgentId>,
        timestamp: DateTime<Utc>,
    },

    /// An agent's opinion was accepted
    OpinionSubmitted {
        proposal_id: ProposalId,
        project_id: ProjectId,
        round: u32,
        agent_id: AgentId,
        position: Position,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// A round closed and was evaluated
    RoundClosed {
        proposal_id: ProposalId,
        project_id: ProjectId,
        round: u32,
        verdict: RoundVerdict,
        position: Option<Position>,
        average_confidence: Option<f64>,
        forced: bool,
        timestamp: DateTime<Utc>,
    },

    /// A further round opened after divergence
    RoundOpened {
        proposal_id: ProposalId,
        project_id: ProjectId,
        round: u32,
        timestamp: DateTime<Utc>,
    },

    /// Proposal status changed
    StatusChanged(StatusChange),
}

impl ProposalEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ProposalEvent::ProposalCreated { timestamp, .. } => *timestamp,
            ProposalEvent::OpinionSubmitted { timestamp, .. } => *timestamp,
            ProposalEvent::RoundClosed { timestamp, .. } => *timestamp,
            ProposalEvent::RoundOpened { timestamp, .. } => *timestamp,
            ProposalEvent::StatusChanged(change) => change.timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            ProposalEvent::ProposalCreated { .. } => "proposal_created",
            ProposalEvent::OpinionSubmitted { .. } => "opinion_submitted",
            ProposalEvent::RoundClosed { .. } => "round_closed",
            ProposalEvent::RoundOpened { .. } => "round_opened",
            ProposalEvent::StatusChanged(_) => "status_changed",
        }
    }

    pub fn proposal_id(&self) -> &str {
        match self {
            ProposalEvent::ProposalCreated { proposal_id, .. }
            | ProposalEvent::OpinionSubmitted { proposal_id, .. }
            | ProposalEvent::RoundClosed { proposal_id, .. }
            | ProposalEvent::RoundOpened { proposal_id, .. } => proposal_id,
            ProposalEvent::StatusChanged(change) => &change.proposal_id,
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            ProposalEvent::ProposalCreated { project_id, .. }
            | ProposalEvent::OpinionSubmitted { project_id, .. }
            | ProposalEvent::RoundClosed { project_id, .. }
            | ProposalEvent::RoundOpened { project_id, .. } => project_id,
            ProposalEvent::StatusChanged(change) => &change.project_id,
        }
    }

    /// The status change carried by this event, if any
    pub fn status_change(&self) -> Option<&StatusChange> {
        match self {
            ProposalEvent::StatusChanged(change) => Some(change),
            _ => None,
        }
    }
}
