//! Debate engine — accepts opinions, closes rounds, drives the lifecycle.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. validate the request (no state touched),
//! 2. take the proposal's lock,
//! 3. reload the proposal and check preconditions,
//! 4. mutate a local copy, collecting events,
//! 5. commit with an optimistic version check (an opinion and the
//!    proposal change it causes are written together),
//! 6. publish events and await notifiers.
//!
//! Notifier failures are logged and dropped after the commit; they never
//! undo a transition.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::consensus::{ClosedRound, ConsensusEvaluator};
use super::escalation::{EscalationDecision, EscalationPolicy};
use super::position::Position;
use super::resolution::{Decider, Resolution};
use super::round::{group_rounds, DebateRound, OpinionSubmission, RoundView};
use crate::config::EngineConfig;
use crate::directory::SharedDirectory;
use crate::error::{ConflictKind, EngineError, EngineResult, NotFound, ValidationError};
use crate::events::{EventBus, ProposalEvent, SharedEventBus, SharedNotifier, StatusChange};
use crate::proposal::{
    NewProposal, Proposal, ProposalId, ProposalStatus, SharedProposalStore, StoreError,
};

/// Shared reference to DebateEngine
pub type SharedDebateEngine = Arc<DebateEngine>;

type ProposalLock = Arc<tokio::sync::Mutex<()>>;

/// Exclusive hold on one proposal.
///
/// On drop the lock is released and its map entry removed unless another
/// caller is already waiting on it.
struct ProposalGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    proposal_id: ProposalId,
    locks: &'a Mutex<HashMap<ProposalId, ProposalLock>>,
}

impl Drop for ProposalGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(self.guard.take());
        let idle = locks
            .get(&self.proposal_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.proposal_id);
        }
    }
}

/// A round closed by the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedClosure {
    pub proposal_id: ProposalId,
    pub round: u32,
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub rounds_closed: Vec<ForcedClosure>,
    pub auto_approved: Vec<ProposalId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.rounds_closed.is_empty() && self.auto_approved.is_empty()
    }
}

/// Proposal debate engine.
///
/// Sole writer of proposal status and round closure. Safe to share across
/// request handlers; mutations of one proposal are serialized by a lock
/// keyed on the proposal id, held only for the duration of the call.
pub struct DebateEngine {
    store: SharedProposalStore,
    directory: SharedDirectory,
    events: SharedEventBus,
    notifiers: Vec<SharedNotifier>,
    config: EngineConfig,
    locks: Mutex<HashMap<ProposalId, ProposalLock>>,
}

impl DebateEngine {
    pub fn new(store: SharedProposalStore, directory: SharedDirectory) -> Self {
        Self::with_config(store, directory, EngineConfig::default())
    }

    pub fn with_config(
        store: SharedProposalStore,
        directory: SharedDirectory,
        config: EngineConfig,
    ) -> Self {
        let events = EventBus::with_capacity(config.event_capacity).shared();
        Self {
            store,
            directory,
            events,
            notifiers: Vec::new(),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a status-change notifier.
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Create a shared reference to this engine
    pub fn shared(self) -> SharedDebateEngine {
        Arc::new(self)
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_proposal(&self, proposal_id: &str) -> EngineResult<Proposal> {
        self.load(proposal_id).await
    }

    pub async fn list_proposals(&self, project_id: Option<&str>) -> EngineResult<Vec<Proposal>> {
        Ok(self.store.list_proposals(project_id).await?)
    }

    /// Opinions in submission order, for one proposal or all of them.
    pub async fn get_debate_history(
        &self,
        proposal_id: Option<&str>,
    ) -> EngineResult<Vec<DebateRound>> {
        if let Some(id) = proposal_id {
            self.load(id).await?;
        }
        let mut opinions = self.store.list_rounds(proposal_id).await?;
        opinions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.round.cmp(&b.round)));
        Ok(opinions)
    }

    /// Opinions of one proposal grouped by round.
    pub async fn round_view(&self, proposal_id: &str) -> EngineResult<Vec<RoundView>> {
        let proposal = self.load(proposal_id).await?;
        let opinions = self.store.list_rounds(Some(proposal_id)).await?;
        Ok(group_rounds(&opinions, &proposal.closed_rounds))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create an `open` proposal, pinning the project's roster and config.
    pub async fn create_proposal(&self, request: NewProposal) -> EngineResult<Proposal> {
        request.validate()?;
        let profile = self
            .directory
            .profile(&request.project_id)
            .await
            .ok_or_else(|| NotFound::Project(request.project_id.clone()))?;

        let proposal = Proposal::new(Uuid::new_v4().to_string(), request, profile);
        self.store.insert_proposal(&proposal).await?;

        info!(
            proposal_id = %proposal.id,
            project_id = %proposal.project_id,
            proposal_type = %proposal.proposal_type,
            roster = proposal.roster.len(),
            "Proposal created"
        );
        self.events.publish(ProposalEvent::ProposalCreated {
            proposal_id: proposal.id.clone(),
            project_id: proposal.project_id.clone(),
            proposal_type: proposal.proposal_type,
            title: proposal.title.clone(),
            proposed_by: proposal.proposed_by.clone(),
            timestamp: proposal.created_at,
        });
        Ok(proposal)
    }

    /// Record one agent's opinion in the open round.
    ///
    /// The first opinion moves the proposal to `debating`. When the roster
    /// has fully responded the round closes and is evaluated before this
    /// call returns.
    pub async fn submit_opinion(&self, submission: OpinionSubmission) -> EngineResult<DebateRound> {
        submission.validate()?;
        let _guard = self.lock_proposal(&submission.proposal_id).await;

        let mut proposal = self.load(&submission.proposal_id).await?;
        if !proposal.status.accepts_opinions() {
            return Err(EngineError::conflict(&proposal, ConflictKind::ProposalClosed));
        }
        if !proposal.roster.admits(&submission.agent_id) {
            return Err(NotFound::Agent {
                agent_id: submission.agent_id,
                proposal_id: proposal.id,
            }
            .into());
        }
        let round = proposal.open_round();
        if let Some(requested) = submission.round {
            if requested != round {
                return Err(EngineError::conflict(
                    &proposal,
                    ConflictKind::WrongRound { requested },
                ));
            }
        }

        let mut round_opinions: Vec<DebateRound> = self
            .store
            .list_rounds(Some(proposal.id.as_str()))
            .await?
            .into_iter()
            .filter(|o| o.round == round)
            .collect();
        if round_opinions
            .iter()
            .any(|o| o.agent_id == submission.agent_id)
        {
            return Err(EngineError::conflict(
                &proposal,
                ConflictKind::DuplicateSubmission {
                    agent_id: submission.agent_id,
                    round,
                },
            ));
        }

        let now = Utc::now();
        let opinion = DebateRound {
            id: Uuid::new_v4().to_string(),
            proposal_id: proposal.id.clone(),
            round,
            agent_id: submission.agent_id,
            position: submission.position,
            reasoning: submission.reasoning,
            confidence: submission.confidence,
            created_at: now,
        };
        let classified = opinion.classified_position();
        let expected_version = proposal.version;
        let mut outbox = Vec::new();
        if proposal.status == ProposalStatus::Open {
            proposal.open_next_round(1, now);
            Self::apply_transition(
                &mut proposal,
                ProposalStatus::Debating,
                "first opinion submitted",
                &mut outbox,
            )?;
        }
        outbox.push(ProposalEvent::OpinionSubmitted {
            proposal_id: proposal.id.clone(),
            project_id: proposal.project_id.clone(),
            round,
            agent_id: opinion.agent_id.clone(),
            position: classified,
            confidence: opinion.confidence,
            timestamp: now,
        });

        round_opinions.push(opinion.clone());
        let complete = proposal
            .roster
            .is_complete(round_opinions.iter().map(|o| o.agent_id.as_str()));
        if complete {
            Self::close_round_inner(&mut proposal, round, &round_opinions, false, now, &mut outbox)?;
        }

        self.store
            .record_opinion(&opinion, &proposal, expected_version)
            .await
            .map_err(|e| Self::store_error(&proposal, e))?;
        debug!(
            proposal_id = %proposal.id,
            round,
            agent_id = %opinion.agent_id,
            position = %classified,
            confidence = opinion.confidence,
            "Opinion recorded"
        );

        self.publish(outbox).await;
        Ok(opinion)
    }

    /// Force-close the open round, evaluating whatever opinions exist.
    pub async fn close_round(&self, proposal_id: &str, round: u32) -> EngineResult<Proposal> {
        if round == 0 {
            return Err(ValidationError::InvalidRound(0).into());
        }
        let _guard = self.lock_proposal(proposal_id).await;

        let mut proposal = self.load(proposal_id).await?;
        match proposal.status {
            ProposalStatus::Debating => {}
            ProposalStatus::Open => {
                return Err(EngineError::conflict(&proposal, ConflictKind::NoOpenRound));
            }
            _ => {
                return Err(EngineError::conflict(&proposal, ConflictKind::ProposalClosed));
            }
        }
        if round != proposal.current_round {
            return Err(EngineError::conflict(
                &proposal,
                ConflictKind::WrongRound { requested: round },
            ));
        }

        let opinions = self.store.list_rounds(Some(proposal_id)).await?;
        let expected_version = proposal.version;
        let mut outbox = Vec::new();
        Self::close_round_inner(&mut proposal, round, &opinions, true, Utc::now(), &mut outbox)?;
        self.commit(&proposal, expected_version, outbox).await
    }

    /// Approve or reject a proposal in `consensus` or `escalated`.
    pub async fn resolve_proposal(
        &self,
        proposal_id: &str,
        resolution: Resolution,
    ) -> EngineResult<Proposal> {
        resolution.validate()?;
        let _guard = self.lock_proposal(proposal_id).await;

        let mut proposal = self.load(proposal_id).await?;
        if !proposal.status.awaits_decision() {
            return Err(EngineError::conflict(
                &proposal,
                ConflictKind::NotAwaitingDecision,
            ));
        }
        if let Decider::Agent { agent_id } = &resolution.decided_by {
            if !proposal.roster.is_pm(agent_id) {
                return Err(ValidationError::NotDesignatedPm {
                    agent_id: agent_id.clone(),
                }
                .into());
            }
        }

        let expected_version = proposal.version;
        let mut outbox = Vec::new();
        Self::apply_transition(
            &mut proposal,
            resolution.decision.target_status(),
            &resolution.reason(),
            &mut outbox,
        )?;
        self.commit(&proposal, expected_version, outbox).await
    }

    /// Apply the configured timeouts as of `now`.
    ///
    /// Force-closes rounds open longer than `round_timeout` and approves
    /// supportive consensus left unreviewed past `consensus_review_window`.
    /// Proposals that change underneath the sweep are skipped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();
        if !self.config.needs_watcher() {
            return Ok(report);
        }

        for proposal in self.store.list_proposals(None).await? {
            if self.round_timed_out(&proposal, now) {
                let round = proposal.current_round;
                match self.close_round(&proposal.id, round).await {
                    Ok(_) => report.rounds_closed.push(ForcedClosure {
                        proposal_id: proposal.id.clone(),
                        round,
                    }),
                    Err(EngineError::StateConflict { .. }) => {
                        debug!(proposal_id = %proposal.id, round, "Round moved on before sweep");
                    }
                    Err(e) => {
                        warn!(proposal_id = %proposal.id, round, error = %e, "Sweep failed to close round");
                    }
                }
            } else if self.review_window_elapsed(&proposal, now) {
                match self.approve_after_review(&proposal.id, now).await {
                    Ok(true) => report.auto_approved.push(proposal.id.clone()),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(proposal_id = %proposal.id, error = %e, "Sweep failed to approve consensus");
                    }
                }
            }
        }

        if !report.is_empty() {
            info!(
                rounds_closed = report.rounds_closed.len(),
                auto_approved = report.auto_approved.len(),
                "Sweep complete"
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn approve_after_review(&self, proposal_id: &str, now: DateTime<Utc>) -> EngineResult<bool> {
        let _guard = self.lock_proposal(proposal_id).await;

        let mut proposal = self.load(proposal_id).await?;
        if !self.review_window_elapsed(&proposal, now) {
            return Ok(false);
        }
        let expected_version = proposal.version;
        let mut outbox = Vec::new();
        Self::apply_transition(
            &mut proposal,
            ProposalStatus::Approved,
            "consensus review window elapsed without rejection",
            &mut outbox,
        )?;
        self.commit(&proposal, expected_version, outbox).await?;
        Ok(true)
    }

    fn round_timed_out(&self, proposal: &Proposal, now: DateTime<Utc>) -> bool {
        match (self.config.round_timeout, proposal.round_opened_at) {
            (Some(timeout), Some(opened)) if proposal.status == ProposalStatus::Debating => {
                elapsed_at_least(opened, now, timeout)
            }
            _ => false,
        }
    }

    fn review_window_elapsed(&self, proposal: &Proposal, now: DateTime<Utc>) -> bool {
        let Some(window) = self.config.consensus_review_window else {
            return false;
        };
        if proposal.status != ProposalStatus::Consensus {
            return false;
        }
        let supportive = proposal
            .last_closed_round()
            .and_then(|c| c.position)
            == Some(Position::Supportive);
        let since = proposal
            .transitions
            .iter()
            .rev()
            .find(|t| t.to == ProposalStatus::Consensus)
            .map(|t| t.timestamp);
        supportive && since.is_some_and(|since| elapsed_at_least(since, now, window))
    }

    /// Evaluate `round`, record the closure, and act on the policy decision.
    fn close_round_inner(
        proposal: &mut Proposal,
        round: u32,
        opinions: &[DebateRound],
        forced: bool,
        now: DateTime<Utc>,
        outbox: &mut Vec<ProposalEvent>,
    ) -> EngineResult<EscalationDecision> {
        let evaluation =
            ConsensusEvaluator::from_config(&proposal.config).evaluate(round, opinions, &proposal.roster);
        let decision = EscalationPolicy::from_config(&proposal.config).decide(&evaluation);

        info!(
            proposal_id = %proposal.id,
            round,
            verdict = %evaluation.verdict,
            respondents = evaluation.respondents,
            forced,
            decision = %decision,
            "Round closed"
        );
        proposal
            .closed_rounds
            .push(ClosedRound::from_evaluation(&evaluation, forced, now));
        outbox.push(ProposalEvent::RoundClosed {
            proposal_id: proposal.id.clone(),
            project_id: proposal.project_id.clone(),
            round,
            verdict: evaluation.verdict,
            position: evaluation.position,
            average_confidence: evaluation.average_confidence,
            forced,
            timestamp: now,
        });

        match decision {
            EscalationDecision::Finalize { instant: true } => Self::apply_transition(
                proposal,
                ProposalStatus::Approved,
                "instant consensus: unanimous support in round 1",
                outbox,
            )?,
            EscalationDecision::Finalize { instant: false } => {
                let reason = match evaluation.position {
                    Some(position) => format!("round {} converged ({})", round, position),
                    None => format!("round {} converged", round),
                };
                Self::apply_transition(proposal, ProposalStatus::Consensus, &reason, outbox)?
            }
            EscalationDecision::OpenNextRound { next_round } => {
                proposal.open_next_round(next_round, now);
                info!(proposal_id = %proposal.id, round = next_round, "Round opened");
                outbox.push(ProposalEvent::RoundOpened {
                    proposal_id: proposal.id.clone(),
                    project_id: proposal.project_id.clone(),
                    round: next_round,
                    timestamp: now,
                });
            }
            EscalationDecision::Escalate { reason } => Self::apply_transition(
                proposal,
                ProposalStatus::Escalated,
                &reason.to_string(),
                outbox,
            )?,
        }
        Ok(decision)
    }

    fn apply_transition(
        proposal: &mut Proposal,
        to: ProposalStatus,
        reason: &str,
        outbox: &mut Vec<ProposalEvent>,
    ) -> EngineResult<()> {
        let record = proposal
            .transition(to, reason)
            .map_err(|e| EngineError::conflict(proposal, ConflictKind::InvalidTransition { to: e.to }))?;

        info!(
            proposal_id = %proposal.id,
            from = %record.from,
            to = %record.to,
            reason,
            "Proposal status changed"
        );
        outbox.push(ProposalEvent::StatusChanged(StatusChange {
            proposal_id: proposal.id.clone(),
            project_id: proposal.project_id.clone(),
            from: record.from,
            to: record.to,
            reason: record.reason,
            timestamp: record.timestamp,
        }));
        Ok(())
    }

    /// Persist the proposal, then publish its events and notify.
    async fn commit(
        &self,
        proposal: &Proposal,
        expected_version: u64,
        outbox: Vec<ProposalEvent>,
    ) -> EngineResult<Proposal> {
        let stored = self
            .store
            .update_proposal(proposal, expected_version)
            .await
            .map_err(|e| Self::store_error(proposal, e))?;
        self.publish(outbox).await;
        Ok(stored)
    }

    /// Only called once the write behind `outbox` has landed.
    async fn publish(&self, outbox: Vec<ProposalEvent>) {
        for event in outbox {
            let change = event.status_change().cloned();
            self.events.publish(event);
            if let Some(change) = change {
                self.notify(&change).await;
            }
        }
    }

    /// Deliver to every notifier concurrently; failures are only logged.
    async fn notify(&self, change: &StatusChange) {
        let deliveries = self.notifiers.iter().map(|notifier| async move {
            (notifier, notifier.notify(change).await)
        });
        for (notifier, result) in join_all(deliveries).await {
            if let Err(e) = result {
                warn!(
                    notifier = notifier.name(),
                    proposal_id = %change.proposal_id,
                    to = %change.to,
                    error = %e,
                    "Status notification failed"
                );
            }
        }
    }

    async fn load(&self, proposal_id: &str) -> EngineResult<Proposal> {
        self.store
            .get_proposal(proposal_id)
            .await?
            .ok_or_else(|| NotFound::Proposal(proposal_id.to_string()).into())
    }

    fn store_error(proposal: &Proposal, err: StoreError) -> EngineError {
        match err {
            StoreError::DuplicateOpinion {
                agent_id, round, ..
            } => EngineError::conflict(proposal, ConflictKind::DuplicateSubmission { agent_id, round }),
            StoreError::VersionConflict {
                expected, found, ..
            } => {
                warn!(
                    proposal_id = %proposal.id,
                    expected,
                    found,
                    "Optimistic version check failed"
                );
                EngineError::conflict(
                    proposal,
                    ConflictKind::ConcurrentModification { expected, found },
                )
            }
            StoreError::NotFound(id) => NotFound::Proposal(id).into(),
            other => other.into(),
        }
    }

    async fn lock_proposal(&self, proposal_id: &str) -> ProposalGuard<'_> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(locks.entry(proposal_id.to_string()).or_default())
        };
        // built before awaiting so a cancelled wait still prunes the entry
        let mut held = ProposalGuard {
            guard: None,
            proposal_id: proposal_id.to_string(),
            locks: &self.locks,
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }
}

fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, limit: Duration) -> bool {
    now.signed_duration_since(since)
        .to_std()
        .map_or(false, |elapsed| elapsed >= limit)
}
