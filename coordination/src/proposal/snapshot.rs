//! Snapshot persistence — proposals and opinions checkpointed to one JSON file.
//!
//! Every mutation is applied to a copy of the state, written to a temp file
//! and renamed over the snapshot. The in-memory state only advances once the
//! write succeeds, so a failed write leaves both disk and memory unchanged.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::store::{ProposalStore, SharedProposalStore, StoreError, StoreResult, StoreState};
use super::types::Proposal;
use crate::debate::DebateRound;

/// Serialized form of the whole store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Monotonic write sequence number.
    pub sequence: u64,
    pub saved_at: DateTime<Utc>,
    pub proposals: Vec<Proposal>,
    pub rounds: Vec<DebateRound>,
}

impl StoreSnapshot {
    /// Current schema version.
    pub const CURRENT_VERSION: u32 = 1;

    fn capture(state: &StoreState, sequence: u64) -> Self {
        let mut proposals: Vec<Proposal> = state.proposals.values().cloned().collect();
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Self {
            version: Self::CURRENT_VERSION,
            sequence,
            saved_at: Utc::now(),
            proposals,
            rounds: state.rounds.clone(),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> StoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Deserialize from JSON string, refusing newer schema versions.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| StoreError::Serialization(e.to_string()))?;

        if snapshot.version > Self::CURRENT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: Self::CURRENT_VERSION,
                found: snapshot.version,
            });
        }

        Ok(snapshot)
    }

    fn into_state(self) -> StoreState {
        StoreState {
            proposals: self
                .proposals
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
            rounds: self.rounds,
        }
    }
}

struct Inner {
    state: StoreState,
    sequence: u64,
}

/// Proposal store persisted as a JSON snapshot on every write.
pub struct JsonFileStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl JsonFileStore {
    /// Open the snapshot at `path`, starting empty when the file is absent.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (state, sequence) = match tokio::fs::read_to_string(&path).await {
            Ok(json) => {
                let snapshot = StoreSnapshot::from_json(&json)?;
                info!(
                    path = %path.display(),
                    proposals = snapshot.proposals.len(),
                    opinions = snapshot.rounds.len(),
                    sequence = snapshot.sequence,
                    "Restored proposal snapshot"
                );
                let sequence = snapshot.sequence;
                (snapshot.into_state(), sequence)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (StoreState::default(), 0),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            inner: Mutex::new(Inner { state, sequence }),
        })
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedProposalStore {
        Arc::new(self)
    }

    /// Get the snapshot path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn persist(&self, state: &StoreState, sequence: u64) -> StoreResult<()> {
        let json = StoreSnapshot::capture(state, sequence).to_json()?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), sequence, "Snapshot written");
        Ok(())
    }

    /// Apply `mutate` to a copy of the state, persist it, then commit.
    async fn write_with<T>(
        &self,
        mutate: impl FnOnce(&mut StoreState) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut inner = self.inner.lock().await;
        let mut next = inner.state.clone();
        let output = mutate(&mut next)?;
        let sequence = inner.sequence + 1;
        self.persist(&next, sequence).await?;
        inner.state = next;
        inner.sequence = sequence;
        Ok(output)
    }
}

#[async_trait]
impl ProposalStore for JsonFileStore {
    async fn insert_proposal(&self, proposal: &Proposal) -> StoreResult<()> {
        self.write_with(|state| state.insert_proposal(proposal))
            .await
    }

    async fn get_proposal(&self, id: &str) -> StoreResult<Option<Proposal>> {
        Ok(self.inner.lock().await.state.proposals.get(id).cloned())
    }

    async fn list_proposals(&self, project_id: Option<&str>) -> StoreResult<Vec<Proposal>> {
        Ok(self.inner.lock().await.state.list_proposals(project_id))
    }

    async fn update_proposal(
        &self,
        proposal: &Proposal,
        expected_version: u64,
    ) -> StoreResult<Proposal> {
        self.write_with(|state| state.update_proposal(proposal, expected_version))
            .await
    }

    async fn record_opinion(
        &self,
        opinion: &DebateRound,
        proposal: &Proposal,
        expected_version: u64,
    ) -> StoreResult<Proposal> {
        self.write_with(|state| state.record_opinion(opinion, proposal, expected_version))
            .await
    }

    async fn list_rounds(&self, proposal_id: Option<&str>) -> StoreResult<Vec<DebateRound>> {
        Ok(self.inner.lock().await.state.list_rounds(proposal_id))
    }
}
