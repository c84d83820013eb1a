//! Explicit resolution of proposals awaiting a decision.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::proposal::{AgentId, ProposalStatus};

/// Final verdict on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Terminal status this decision leads to.
    pub fn target_status(self) -> ProposalStatus {
        match self {
            Self::Approve => ProposalStatus::Approved,
            Self::Reject => ProposalStatus::Rejected,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for Decision {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "approve" | "approved" => Ok(Self::Approve),
            "reject" | "rejected" => Ok(Self::Reject),
            _ => Err(ValidationError::UnknownDecision(s.to_string())),
        }
    }
}

/// Who made the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decider {
    /// A human reviewer; accepted as-is.
    Human { name: String },
    /// An agent; must hold the PM role on the proposal's roster.
    Agent { agent_id: AgentId },
}

impl Decider {
    pub fn human(name: impl Into<String>) -> Self {
        Self::Human { name: name.into() }
    }

    pub fn agent(agent_id: impl Into<AgentId>) -> Self {
        Self::Agent {
            agent_id: agent_id.into(),
        }
    }
}

impl std::fmt::Display for Decider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Human { name } => write!(f, "human:{}", name),
            Self::Agent { agent_id } => write!(f, "agent:{}", agent_id),
        }
    }
}

/// Request to resolve a `consensus` or `escalated` proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub decision: Decision,
    pub decided_by: Decider,
    #[serde(default)]
    pub note: Option<String>,
}

impl Resolution {
    pub fn new(decision: Decision, decided_by: Decider) -> Self {
        Self {
            decision,
            decided_by,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let blank = match &self.decided_by {
            Decider::Human { name } => name.trim().is_empty(),
            Decider::Agent { agent_id } => agent_id.trim().is_empty(),
        };
        if blank {
            return Err(ValidationError::BlankField {
                field: "decided_by",
            });
        }
        Ok(())
    }

    /// Transition reason recorded on the proposal.
    pub fn reason(&self) -> String {
        match &self.note {
            Some(note) if !note.trim().is_empty() => {
                format!("{} by {}: {}", self.decision, self.decided_by, note.trim())
            }
            _ => format!("{} by {}", self.decision, self.decided_by),
        }
    }
}
