//! Debate lifecycle integration tests — drives the engine through full
//! proposal lifecycles against the in-memory store.
//!
//! Covers: create → debate → consensus/escalation → resolution, plus the
//! timeout sweep and concurrent submissions.

use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use pm_coordination::config::{EngineConfig, ProjectDebateConfig};
use pm_coordination::debate::{
    DebateEngine, Decider, Decision, OpinionSubmission, Participant, Position, Resolution, Roster,
    RoundVerdict,
};
use pm_coordination::directory::StaticDirectory;
use pm_coordination::events::ProposalEvent;
use pm_coordination::proposal::{
    MemoryProposalStore, NewProposal, Proposal, ProposalStatus, ProposalType,
};

const PROJECT: &str = "apollo";

fn engine(config: ProjectDebateConfig, roster: Roster) -> DebateEngine {
    engine_with(config, roster, EngineConfig::default())
}

fn engine_with(
    config: ProjectDebateConfig,
    roster: Roster,
    engine_config: EngineConfig,
) -> DebateEngine {
    let directory = StaticDirectory::new(ProjectDebateConfig::default())
        .with_project(PROJECT, config, roster)
        .shared();
    DebateEngine::with_config(MemoryProposalStore::new().shared(), directory, engine_config)
}

fn agents(ids: &[&str]) -> Roster {
    ids.iter().map(|id| Participant::new(*id)).collect()
}

async fn propose(engine: &DebateEngine) -> Proposal {
    engine
        .create_proposal(
            NewProposal::new(PROJECT, ProposalType::ArchitectureDecision, "Adopt event sourcing")
                .proposed_by("agentA"),
        )
        .await
        .unwrap()
}

async fn opine(engine: &DebateEngine, proposal: &Proposal, agent: &str, position: &str) {
    engine
        .submit_opinion(OpinionSubmission::new(
            proposal.id.clone(),
            agent,
            position,
            format!("{} thinks so", agent),
            0.8,
        ))
        .await
        .unwrap();
}

fn assert_valid_path(proposal: &Proposal) {
    let mut status = ProposalStatus::Open;
    for t in &proposal.transitions {
        assert_eq!(t.from, status, "transition chain broken at {:?}", t);
        assert!(t.from.can_transition_to(t.to));
        status = t.to;
    }
    assert_eq!(status, proposal.status);
}

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_agents_agree_in_round_one() {
    let engine = engine(ProjectDebateConfig::default(), agents(&["agentA", "agentB"]));
    let p = propose(&engine).await;
    assert_eq!(p.status, ProposalStatus::Open);
    assert_eq!(p.current_round, 0);

    opine(&engine, &p, "agentA", "approve, confidence 0.9").await;
    let mid = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(mid.status, ProposalStatus::Debating);

    opine(&engine, &p, "agentB", "approve, confidence 0.8").await;
    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Consensus);
    assert_eq!(done.closed_rounds.len(), 1);
    assert_eq!(done.closed_rounds[0].verdict, RoundVerdict::Converged);
    assert_eq!(done.closed_rounds[0].position, Some(Position::Supportive));
    assert!(done.resolved_at.is_none());

    let history = engine.get_debate_history(Some(&p.id)).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|o| o.round == 1));
    assert_valid_path(&done);
}

#[tokio::test]
async fn test_unanimous_round_of_five() {
    let roster = agents(&["a1", "a2", "a3", "a4", "a5"]);
    let engine = engine(ProjectDebateConfig::default(), roster);
    let p = propose(&engine).await;

    for agent in ["a1", "a2", "a3", "a4"] {
        opine(&engine, &p, agent, "support").await;
        let current = engine.get_proposal(&p.id).await.unwrap();
        assert_eq!(current.status, ProposalStatus::Debating);
    }
    opine(&engine, &p, "a5", "I agree").await;

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Consensus);
    assert_eq!(done.current_round, 1);
}

#[tokio::test]
async fn test_unanimous_opposition_is_consensus_not_approval() {
    let config = ProjectDebateConfig {
        auto_flag_instant_consensus: true,
        ..ProjectDebateConfig::default()
    };
    let engine = engine(config, agents(&["agentA", "agentB"]));
    let p = propose(&engine).await;
    opine(&engine, &p, "agentA", "reject").await;
    opine(&engine, &p, "agentB", "I disagree").await;

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Consensus);
    assert_eq!(done.closed_rounds[0].position, Some(Position::Opposing));
}

#[tokio::test]
async fn test_instant_consensus_approves_directly() {
    let config = ProjectDebateConfig {
        auto_flag_instant_consensus: true,
        ..ProjectDebateConfig::default()
    };
    let engine = engine(config, agents(&["agentA", "agentB"]));
    let p = propose(&engine).await;
    opine(&engine, &p, "agentA", "approve").await;
    opine(&engine, &p, "agentB", "approve").await;

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Approved);
    assert!(done.resolved_at.is_some());
    assert_valid_path(&done);
}

#[tokio::test]
async fn test_instant_flag_ignored_after_round_one() {
    let config = ProjectDebateConfig {
        auto_flag_instant_consensus: true,
        ..ProjectDebateConfig::default()
    };
    let engine = engine(config, agents(&["agentA", "agentB"]));
    let p = propose(&engine).await;
    opine(&engine, &p, "agentA", "approve").await;
    opine(&engine, &p, "agentB", "reject").await;
    opine(&engine, &p, "agentA", "approve").await;
    opine(&engine, &p, "agentB", "approve after changes").await;

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Consensus);
    assert_eq!(done.current_round, 2);
}

// ── Escalation ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_persistent_disagreement_escalates_after_max_rounds() {
    let engine = engine(ProjectDebateConfig::default(), agents(&["agentA", "agentB"]));
    let p = propose(&engine).await;
    let mut events = engine.events().subscribe();

    for round in 1..=3 {
        opine(&engine, &p, "agentA", "approve").await;
        opine(&engine, &p, "agentB", "reject").await;
        let current = engine.get_proposal(&p.id).await.unwrap();
        if round < 3 {
            assert_eq!(current.status, ProposalStatus::Debating);
            assert_eq!(current.current_round, round + 1);
        }
    }

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Escalated);
    assert_eq!(done.closed_rounds.len(), 3);
    assert!(done
        .transitions
        .iter()
        .all(|t| t.to != ProposalStatus::Consensus));
    assert_valid_path(&done);

    let mut statuses = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ProposalEvent::StatusChanged(change) = event {
            statuses.push(change.to);
        }
    }
    assert_eq!(
        statuses,
        vec![ProposalStatus::Debating, ProposalStatus::Escalated]
    );

    // escalated proposals take no more opinions
    let err = engine
        .submit_opinion(OpinionSubmission::new(p.id.clone(), "agentA", "approve", "", 0.5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PROPOSAL_CLOSED");
}

#[tokio::test]
async fn test_single_round_budget_escalates_immediately() {
    let config = ProjectDebateConfig {
        max_debate_rounds: 1,
        ..ProjectDebateConfig::default()
    };
    let engine = engine(config, agents(&["agentA", "agentB"]));
    let p = propose(&engine).await;
    opine(&engine, &p, "agentA", "approve").await;
    opine(&engine, &p, "agentB", "needs more detail").await;

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Escalated);
    assert_eq!(done.closed_rounds.len(), 1);
}

// ── Dual-PM consensus ──────────────────────────────────────────────

fn dual_pm() -> ProjectDebateConfig {
    ProjectDebateConfig {
        require_dual_pm_consensus: true,
        ..ProjectDebateConfig::default()
    }
}

#[tokio::test]
async fn test_dual_pm_converges_with_two_pms() {
    let roster = Roster::new([
        Participant::pm("pm-1"),
        Participant::pm("pm-2"),
        Participant::new("dev-1"),
    ]);
    let engine = engine(dual_pm(), roster);
    let p = propose(&engine).await;
    for agent in ["pm-1", "pm-2", "dev-1"] {
        opine(&engine, &p, agent, "approve").await;
    }

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Consensus);
    assert_eq!(done.closed_rounds[0].respondents, 3);
}

#[tokio::test]
async fn test_dual_pm_without_pm_quorum_escalates() {
    let roster = Roster::new([Participant::pm("pm-1"), Participant::new("dev-1")]);
    let engine = engine(dual_pm(), roster);
    let p = propose(&engine).await;
    opine(&engine, &p, "pm-1", "approve").await;
    opine(&engine, &p, "dev-1", "approve").await;

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Escalated);
    assert_eq!(done.closed_rounds.len(), 1);
}

#[tokio::test]
async fn test_dual_pm_missing_pm_opinion_keeps_debating() {
    let roster = Roster::new([
        Participant::pm("pm-1"),
        Participant::pm("pm-2"),
        Participant::new("dev-1"),
    ]);
    let engine = engine(dual_pm(), roster);
    let p = propose(&engine).await;
    opine(&engine, &p, "pm-1", "approve").await;
    opine(&engine, &p, "dev-1", "approve").await;

    // pm-2 never answers; forcing the round leaves one PM voice
    let p = engine.close_round(&p.id, 1).await.unwrap();
    assert_eq!(p.status, ProposalStatus::Debating);
    assert_eq!(p.current_round, 2);
    assert_eq!(p.closed_rounds[0].verdict, RoundVerdict::Diverged);
}

// ── Input validation ───────────────────────────────────────────────

#[tokio::test]
async fn test_confidence_bounds() {
    let engine = engine(ProjectDebateConfig::default(), Roster::default());
    let p = propose(&engine).await;

    for bad in [-0.1, 1.1, f64::NAN] {
        let err = engine
            .submit_opinion(OpinionSubmission::new(p.id.clone(), "agentA", "approve", "", bad))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFIDENCE_OUT_OF_RANGE");
    }
    let untouched = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(untouched.status, ProposalStatus::Open);
    assert!(engine.get_debate_history(Some(&p.id)).await.unwrap().is_empty());

    // bounds are inclusive
    let engine = engine_with_open_roster();
    for (i, ok) in [0.0, 1.0].into_iter().enumerate() {
        let p = propose(&engine).await;
        let stored = engine
            .submit_opinion(OpinionSubmission::new(
                p.id.clone(),
                format!("agent-{}", i),
                "approve",
                "",
                ok,
            ))
            .await
            .unwrap();
        assert_eq!(stored.confidence, ok);
    }
}

fn engine_with_open_roster() -> DebateEngine {
    engine(ProjectDebateConfig::default(), Roster::default())
}

#[tokio::test]
async fn test_duplicate_submission_has_no_side_effect() {
    let engine = engine(
        ProjectDebateConfig::default(),
        agents(&["agentA", "agentB", "agentC"]),
    );
    let p = propose(&engine).await;
    opine(&engine, &p, "agentA", "approve").await;
    let before = engine.get_proposal(&p.id).await.unwrap();

    let err = engine
        .submit_opinion(OpinionSubmission::new(
            p.id.clone(),
            "agentA",
            "reject",
            "changed my mind",
            0.3,
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_SUBMISSION");

    let after = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(after.version, before.version);
    let history = engine.get_debate_history(Some(&p.id)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].position, "approve");
}

#[tokio::test]
async fn test_missing_title_rejected() {
    let engine = engine_with_open_roster();
    let err = engine
        .create_proposal(NewProposal::new(PROJECT, ProposalType::Other, "   "))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(engine.list_proposals(None).await.unwrap().is_empty());
}

// ── Resolution ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_escalated_proposal_resolved_by_human() {
    let config = ProjectDebateConfig {
        max_debate_rounds: 1,
        ..ProjectDebateConfig::default()
    };
    let engine = engine(config, agents(&["agentA", "agentB"]));
    let p = propose(&engine).await;
    opine(&engine, &p, "agentA", "approve").await;
    opine(&engine, &p, "agentB", "reject").await;

    let resolution =
        Resolution::new(Decision::Approve, Decider::human("dana")).with_note("ship it");
    let done = engine.resolve_proposal(&p.id, resolution).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Approved);
    assert!(done.resolved_at.is_some());
    let last = done.transitions.last().unwrap();
    assert_eq!(last.from, ProposalStatus::Escalated);
    assert!(last.reason.contains("human:dana"));
    assert_valid_path(&done);

    // terminal proposals cannot be resolved twice
    let again = Resolution::new(Decision::Reject, Decider::human("dana"));
    let err = engine.resolve_proposal(&p.id, again).await.unwrap_err();
    assert_eq!(err.code(), "NOT_AWAITING_DECISION");
}

#[tokio::test]
async fn test_resolve_while_debating_rejected() {
    let engine = engine(ProjectDebateConfig::default(), agents(&["agentA", "agentB"]));
    let p = propose(&engine).await;
    opine(&engine, &p, "agentA", "approve").await;

    let resolution = Resolution::new(Decision::Approve, Decider::human("dana"));
    let err = engine.resolve_proposal(&p.id, resolution).await.unwrap_err();
    assert_eq!(err.code(), "NOT_AWAITING_DECISION");
    let current = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(current.status, ProposalStatus::Debating);
}

#[tokio::test]
async fn test_unknown_proposal() {
    let engine = engine_with_open_roster();
    let err = engine.get_proposal("nope").await.unwrap_err();
    assert_eq!(err.code(), "PROPOSAL_NOT_FOUND");
    let err = engine.get_debate_history(Some("nope")).await.unwrap_err();
    assert_eq!(err.code(), "PROPOSAL_NOT_FOUND");
}

// ── Timeout sweep ──────────────────────────────────────────────────

#[tokio::test]
async fn test_sweep_force_closes_expired_round() {
    let engine_config = EngineConfig {
        round_timeout: Some(Duration::from_secs(600)),
        ..EngineConfig::default()
    };
    let engine = engine_with(
        ProjectDebateConfig::default(),
        agents(&["agentA", "agentB"]),
        engine_config,
    );
    let p = propose(&engine).await;
    opine(&engine, &p, "agentA", "approve").await;

    let early = engine.sweep(Utc::now()).await.unwrap();
    assert!(early.is_empty());

    let late = engine
        .sweep(Utc::now() + chrono::Duration::seconds(601))
        .await
        .unwrap();
    assert_eq!(late.rounds_closed.len(), 1);
    assert_eq!(late.rounds_closed[0].round, 1);

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert!(done.closed_rounds[0].forced);
    assert_eq!(done.closed_rounds[0].respondents, 1);
    assert_eq!(done.status, ProposalStatus::Consensus);
}

#[tokio::test]
async fn test_sweep_approves_supportive_consensus_after_review_window() {
    let engine_config = EngineConfig {
        consensus_review_window: Some(Duration::from_secs(3600)),
        ..EngineConfig::default()
    };
    let engine = engine_with(
        ProjectDebateConfig::default(),
        agents(&["agentA", "agentB"]),
        engine_config,
    );

    let supportive = propose(&engine).await;
    opine(&engine, &supportive, "agentA", "approve").await;
    opine(&engine, &supportive, "agentB", "approve").await;

    let opposing = propose(&engine).await;
    opine(&engine, &opposing, "agentA", "reject").await;
    opine(&engine, &opposing, "agentB", "reject").await;

    let report = engine
        .sweep(Utc::now() + chrono::Duration::seconds(3601))
        .await
        .unwrap();
    assert_eq!(report.auto_approved, vec![supportive.id.clone()]);

    let approved = engine.get_proposal(&supportive.id).await.unwrap();
    assert_eq!(approved.status, ProposalStatus::Approved);
    assert_valid_path(&approved);

    // opposing consensus waits for an explicit decision
    let waiting = engine.get_proposal(&opposing.id).await.unwrap();
    assert_eq!(waiting.status, ProposalStatus::Consensus);
}

// ── Concurrency ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_final_opinions_close_round_once() {
    let roster = agents(&["a1", "a2", "a3", "a4", "a5", "a6"]);
    let engine = engine(ProjectDebateConfig::default(), roster).shared();
    let p = propose(&engine).await;
    let mut events = engine.events().subscribe();

    let submissions = ["a1", "a2", "a3", "a4", "a5", "a6"].map(|agent| {
        let engine = engine.clone();
        let id = p.id.clone();
        tokio::spawn(async move {
            engine
                .submit_opinion(OpinionSubmission::new(id, agent, "approve", "", 0.9))
                .await
        })
    });
    for result in join_all(submissions).await {
        result.unwrap().unwrap();
    }

    let done = engine.get_proposal(&p.id).await.unwrap();
    assert_eq!(done.status, ProposalStatus::Consensus);
    assert_eq!(done.closed_rounds.len(), 1);
    assert_valid_path(&done);

    let mut closes = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ProposalEvent::RoundClosed { .. }) {
            closes += 1;
        }
    }
    assert_eq!(closes, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_store_one_opinion() {
    let engine = engine(
        ProjectDebateConfig::default(),
        agents(&["agentA", "agentB"]),
    )
    .shared();
    let p = propose(&engine).await;

    let attempts = (0..8).map(|i| {
        let engine = engine.clone();
        let id = p.id.clone();
        tokio::spawn(async move {
            engine
                .submit_opinion(OpinionSubmission::new(
                    id,
                    "agentA",
                    "approve",
                    format!("attempt {}", i),
                    0.5,
                ))
                .await
        })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.code(), "DUPLICATE_SUBMISSION");
    }
    assert_eq!(engine.get_debate_history(Some(&p.id)).await.unwrap().len(), 1);
}
