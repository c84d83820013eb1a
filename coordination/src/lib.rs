//! PM Coordination Library
//!
//! This library provides:
//! - A proposal lifecycle for project-manager agent councils
//! - Round-based debate with consensus evaluation and escalation
//! - Explicit resolution of consensus and escalated proposals
//! - Status-change events over a broadcast bus plus outbound notifiers
//!
//! # Features
//!
//! ## MCP Tools
//! - `create_proposal`: Open a proposal for a project
//! - `submit_opinion`: Record one agent's opinion in the open round
//! - `close_round`: Force-close the open round and evaluate it
//! - `resolve_proposal`: Approve or reject a consensus/escalated proposal
//! - `list_proposals`: Proposals, optionally filtered by project
//! - `get_proposal`: One proposal with its transition history
//! - `get_debate_history`: Opinions in submission order
//! - `get_round_view`: Opinions grouped by round with tallies
//!
//! # Usage
//!
//! ```bash
//! # Volatile store, every project admitted with default policy
//! pm-coordination
//!
//! # Council file with rosters, snapshot persistence, webhook notifications
//! pm-coordination --config council.toml --state-path ./debate-state.json \
//!     --webhook-url http://localhost:8080/hooks/proposals
//!
//! # Force-close rounds after 15 minutes
//! DEBATE_ROUND_TIMEOUT_SECS=900 pm-coordination --config council.toml
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod debate;
pub mod directory;
pub mod error;
pub mod events;
pub mod proposal;

// Re-export key engine types
pub use config::{CouncilFile, EngineConfig, ProjectDebateConfig};
pub use debate::{
    DebateEngine, DebateRound, Decider, Decision, OpinionSubmission, Participant, Position,
    Resolution, Roster, RoundWatcher, SharedDebateEngine,
};
pub use directory::{ProjectDirectory, ProjectProfile, SharedDirectory, StaticDirectory};
pub use error::{EngineError, EngineResult, StructuredError};

// Re-export key proposal types
pub use proposal::{
    JsonFileStore, MemoryProposalStore, NewProposal, Proposal, ProposalStatus, ProposalStore,
    ProposalType, SharedProposalStore,
};

// Re-export key event types
pub use events::{
    EventBus, EventFilter, LogNotifier, ProposalEvent, SharedEventBus, StatusChange,
    StatusNotifier, WebhookNotifier,
};
