//! Engine error types
//!
//! Every engine operation returns an [`EngineError`] from one of four
//! classes: validation, state conflict, not found, or store failure.
//! Notification failures never surface here; they are logged and dropped
//! by the engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::proposal::{AgentId, ProjectId, ProposalId, ProposalStatus, StoreError};

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

// ============================================================================
// Structured Error Response (Agent-Friendly)
// ============================================================================

/// Structured error response returned to tool callers.
///
/// # Example Response
/// ```json
/// {
///   "code": "DUPLICATE_SUBMISSION",
///   "message": "state conflict on proposal p-1 (status=debating, round=2): ...",
///   "recovery_action": "Wait for round 2 to close, then submit for the next round",
///   "context": { "proposal_id": "p-1", "status": "debating", "current_round": 2 },
///   "retryable": false
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Actionable recovery instruction for the caller
    pub recovery_action: String,

    /// Relevant context (proposal id, current status, round)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Whether the same request may succeed on retry
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    /// Create a new structured error
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    /// Add context key-value pair
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Mark as retryable
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    /// Serialize to a JSON string, falling back to the plain message.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_string())
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

// ============================================================================
// Error taxonomy
// ============================================================================

/// Malformed input, rejected before any state is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Proposal title is empty or whitespace
    #[error("proposal title must not be empty")]
    MissingTitle,

    /// A required text field is empty or whitespace
    #[error("{field} must not be empty")]
    BlankField { field: &'static str },

    /// Confidence outside the closed interval [0, 1] (or NaN)
    #[error("confidence {value} is outside [0, 1]")]
    ConfidenceOutOfRange { value: f64 },

    /// Proposal type string did not match a known type
    #[error("unknown proposal type '{0}' (expected one of: task_creation, sprint_plan, architecture_decision, resource_allocation, priority_change, other)")]
    UnknownProposalType(String),

    /// Decision string did not match approve/reject
    #[error("unknown decision '{0}' (expected approve or reject)")]
    UnknownDecision(String),

    /// Round numbers start at 1
    #[error("round number must be at least 1, got {0}")]
    InvalidRound(u32),

    /// An agent tried to resolve a proposal without holding the PM role
    #[error("agent {agent_id} is not a designated PM for this proposal")]
    NotDesignatedPm { agent_id: AgentId },
}

/// Why a request conflicts with the proposal's current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    /// The agent already has an opinion in this round
    #[error("agent {agent_id} already submitted an opinion for round {round}")]
    DuplicateSubmission { agent_id: AgentId, round: u32 },

    /// Proposal no longer accepts opinions
    #[error("proposal is closed to further opinions")]
    ProposalClosed,

    /// Submission or closure targets a round other than the current one
    #[error("round {requested} is not the open round")]
    WrongRound { requested: u32 },

    /// Resolution requested for a proposal that is not awaiting a decision
    #[error("proposal is not awaiting a decision")]
    NotAwaitingDecision,

    /// Closure requested before the first opinion opened round 1
    #[error("no round is open yet")]
    NoOpenRound,

    /// Lifecycle graph forbids the requested status change
    #[error("cannot move to {to}")]
    InvalidTransition { to: ProposalStatus },

    /// Optimistic version check failed in the store
    #[error("proposal was modified concurrently (expected version {expected}, found {found})")]
    ConcurrentModification { expected: u64, found: u64 },
}

/// Identifier that could not be resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    #[error("proposal {0}")]
    Proposal(ProposalId),

    #[error("agent {agent_id} is not on the roster of proposal {proposal_id}")]
    Agent {
        agent_id: AgentId,
        proposal_id: ProposalId,
    },

    #[error("project {0}")]
    Project(ProjectId),
}

/// Errors returned by engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed input
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Request conflicts with the proposal's current state
    #[error("state conflict on proposal {proposal_id} (status={status}, round={current_round}): {kind}")]
    StateConflict {
        proposal_id: ProposalId,
        status: ProposalStatus,
        current_round: u32,
        kind: ConflictKind,
    },

    /// Unknown identifier
    #[error("not found: {0}")]
    NotFound(#[from] NotFound),

    /// Proposal store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Build a state-conflict error from a proposal snapshot.
    pub fn conflict(proposal: &crate::proposal::Proposal, kind: ConflictKind) -> Self {
        Self::StateConflict {
            proposal_id: proposal.id.clone(),
            status: proposal.status,
            current_round: proposal.current_round,
            kind,
        }
    }

    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::StateConflict {
                kind: ConflictKind::ConcurrentModification { .. },
                ..
            } => true,
            _ => false,
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::ConfidenceOutOfRange { .. }) => {
                "CONFIDENCE_OUT_OF_RANGE"
            }
            Self::Validation(ValidationError::UnknownProposalType(_)) => "UNKNOWN_PROPOSAL_TYPE",
            Self::Validation(ValidationError::NotDesignatedPm { .. }) => "NOT_DESIGNATED_PM",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::StateConflict { kind, .. } => match kind {
                ConflictKind::DuplicateSubmission { .. } => "DUPLICATE_SUBMISSION",
                ConflictKind::ProposalClosed => "PROPOSAL_CLOSED",
                ConflictKind::WrongRound { .. } => "WRONG_ROUND",
                ConflictKind::NotAwaitingDecision => "NOT_AWAITING_DECISION",
                ConflictKind::NoOpenRound => "NO_OPEN_ROUND",
                ConflictKind::InvalidTransition { .. } => "INVALID_TRANSITION",
                ConflictKind::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            },
            Self::NotFound(NotFound::Proposal(_)) => "PROPOSAL_NOT_FOUND",
            Self::NotFound(NotFound::Agent { .. }) => "AGENT_NOT_FOUND",
            Self::NotFound(NotFound::Project(_)) => "PROJECT_NOT_FOUND",
            Self::Store(_) => "STORE_UNAVAILABLE",
        }
    }

    /// Convert to structured error for tool responses
    pub fn to_structured(&self) -> StructuredError {
        let recovery = match self {
            Self::Validation(_) => "Fix the request parameters and resubmit".to_string(),
            Self::StateConflict {
                status,
                current_round,
                kind,
                ..
            } => match kind {
                ConflictKind::DuplicateSubmission { .. } => format!(
                    "Wait for round {} to close, then submit for the next round",
                    current_round
                ),
                ConflictKind::ProposalClosed => format!(
                    "Proposal is {}; no further opinions are accepted",
                    status
                ),
                ConflictKind::WrongRound { .. } => {
                    format!("Resubmit targeting round {}", current_round)
                }
                ConflictKind::NotAwaitingDecision => format!(
                    "Only consensus or escalated proposals can be resolved (current: {})",
                    status
                ),
                ConflictKind::NoOpenRound => {
                    "Round 1 opens with the first submitted opinion".to_string()
                }
                ConflictKind::InvalidTransition { .. } => format!(
                    "Proposal is {}; re-read it before retrying",
                    status
                ),
                ConflictKind::ConcurrentModification { .. } => {
                    "Re-read the proposal and retry".to_string()
                }
            },
            Self::NotFound(_) => {
                "Verify the identifier with list_proposals or get_proposal".to_string()
            }
            Self::Store(_) => "Proposal store unavailable; retry shortly".to_string(),
        };

        let mut structured = StructuredError::new(self.code(), self.to_string(), recovery);
        if let Self::StateConflict {
            proposal_id,
            status,
            current_round,
            ..
        } = self
        {
            structured = structured
                .with_context("proposal_id", proposal_id.clone())
                .with_context("status", status.to_string())
                .with_context("current_round", *current_round);
        }
        if self.is_retryable() {
            structured = structured.retryable();
        }
        structured
    }

    /// Convert to structured JSON string for tool responses
    pub fn to_structured_json(&self) -> String {
        self.to_structured().to_json()
    }
}
