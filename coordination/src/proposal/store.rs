//! Proposal store — the system of record the engine mutates.
//!
//! The engine talks to storage only through [`ProposalStore`]. Proposal
//! updates carry an optimistic version check; opinions are append-only and
//! unique per (proposal, round, agent).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::{AgentId, Proposal, ProposalId};
use crate::debate::DebateRound;

/// Error type for proposal store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("proposal {0} already exists")]
    AlreadyExists(ProposalId),

    #[error("proposal {0} not found")]
    NotFound(ProposalId),

    #[error("opinion already recorded for agent {agent_id} in round {round} of proposal {proposal_id}")]
    DuplicateOpinion {
        proposal_id: ProposalId,
        round: u32,
        agent_id: AgentId,
    },

    #[error("version conflict on proposal {proposal_id}: expected {expected}, found {found}")]
    VersionConflict {
        proposal_id: ProposalId,
        expected: u64,
        found: u64,
    },

    #[error("snapshot schema version {found} is newer than supported {expected}")]
    VersionMismatch { expected: u32, found: u32 },
}

impl StoreError {
    /// Transient infrastructure failure worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

/// Result type for proposal store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared reference to a proposal store
pub type SharedProposalStore = Arc<dyn ProposalStore>;

/// Persistence boundary for proposals and their opinions.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Insert a new proposal. Fails if the id is taken.
    async fn insert_proposal(&self, proposal: &Proposal) -> StoreResult<()>;

    async fn get_proposal(&self, id: &str) -> StoreResult<Option<Proposal>>;

    /// Proposals ordered by creation time, optionally for one project.
    async fn list_proposals(&self, project_id: Option<&str>) -> StoreResult<Vec<Proposal>>;

    /// Replace a proposal if its stored version equals `expected_version`.
    ///
    /// Returns the stored record with its version bumped.
    async fn update_proposal(
        &self,
        proposal: &Proposal,
        expected_version: u64,
    ) -> StoreResult<Proposal>;

    /// Append an opinion and replace its proposal in one step.
    ///
    /// Rejects a second opinion for the same (proposal, round, agent) and
    /// applies the same version check as [`update_proposal`]. On any error
    /// neither write takes effect.
    ///
    /// [`update_proposal`]: ProposalStore::update_proposal
    async fn record_opinion(
        &self,
        opinion: &DebateRound,
        proposal: &Proposal,
        expected_version: u64,
    ) -> StoreResult<Proposal>;

    /// Opinions in insertion order, optionally for one proposal.
    async fn list_rounds(&self, proposal_id: Option<&str>) -> StoreResult<Vec<DebateRound>>;
}

// ============================================================================
// Shared in-memory state
// ============================================================================

/// Plain state behind both the in-memory and snapshot stores.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub(crate) proposals: HashMap<ProposalId, Proposal>,
    pub(crate) rounds: Vec<DebateRound>,
}

impl StoreState {
    pub(crate) fn insert_proposal(&mut self, proposal: &Proposal) -> StoreResult<()> {
        if self.proposals.contains_key(&proposal.id) {
            return Err(StoreError::AlreadyExists(proposal.id.clone()));
        }
        self.proposals.insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    pub(crate) fn list_proposals(&self, project_id: Option<&str>) -> Vec<Proposal> {
        let mut proposals: Vec<Proposal> = self
            .proposals
            .values()
            .filter(|p| project_id.map_or(true, |id| p.project_id == id))
            .cloned()
            .collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        proposals
    }

    pub(crate) fn update_proposal(
        &mut self,
        proposal: &Proposal,
        expected_version: u64,
    ) -> StoreResult<Proposal> {
        let stored = self
            .proposals
            .get_mut(&proposal.id)
            .ok_or_else(|| StoreError::NotFound(proposal.id.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                proposal_id: proposal.id.clone(),
                expected: expected_version,
                found: stored.version,
            });
        }
        let mut updated = proposal.clone();
        updated.version = expected_version + 1;
        *stored = updated.clone();
        Ok(updated)
    }

    /// Both checks run before either write.
    pub(crate) fn record_opinion(
        &mut self,
        opinion: &DebateRound,
        proposal: &Proposal,
        expected_version: u64,
    ) -> StoreResult<Proposal> {
        let stored = self
            .proposals
            .get(&proposal.id)
            .ok_or_else(|| StoreError::NotFound(proposal.id.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                proposal_id: proposal.id.clone(),
                expected: expected_version,
                found: stored.version,
            });
        }
        let duplicate = self.rounds.iter().any(|r| {
            r.proposal_id == opinion.proposal_id
                && r.round == opinion.round
                && r.agent_id == opinion.agent_id
        });
        if duplicate {
            return Err(StoreError::DuplicateOpinion {
                proposal_id: opinion.proposal_id.clone(),
                round: opinion.round,
                agent_id: opinion.agent_id.clone(),
            });
        }
        self.rounds.push(opinion.clone());
        self.update_proposal(proposal, expected_version)
    }

    pub(crate) fn list_rounds(&self, proposal_id: Option<&str>) -> Vec<DebateRound> {
        self.rounds
            .iter()
            .filter(|r| proposal_id.map_or(true, |id| r.proposal_id == id))
            .cloned()
            .collect()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Volatile store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryProposalStore {
    state: RwLock<StoreState>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedProposalStore {
        Arc::new(self)
    }
}

#[async_trait]
impl ProposalStore for MemoryProposalStore {
    async fn insert_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        self.state.write().await.insert_proposal(proposal)
    }

    async fn get_proposal(&self, id: &str) -> StoreResult<Option<Proposal>> {
        Ok(self.state.read().await.proposals.get(id).cloned())
    }

    async fn list_proposals(&self, project_id: Option<&str>) -> StoreResult<Vec<Proposal>> {
        Ok(self.state.read().await.list_proposals(project_id))
    }

    async fn update_proposal(
        &self,
        proposal: &Proposal,
        expected_version: u64,
    ) -> StoreResult<Proposal> {
        self.state
            .write()
            .await
            .update_proposal(proposal, expected_version)
    }

    async fn record_opinion(
        &self,
        opinion: &DebateRound,
        proposal: &Proposal,
        expected_version: u64,
    ) -> StoreResult<Proposal> {
        self.state
            .write()
            .await
            .record_opinion(opinion, proposal, expected_version)
    }

    async fn list_rounds(&self, proposal_id: Option<&str>) -> StoreResult<Vec<DebateRound>> {
        Ok(self.state.read().await.list_rounds(proposal_id))
    }
}
