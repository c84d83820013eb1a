//! MCP Server for PM debate coordination
//!
//! Exposes the debate engine to project-manager agents over stdio:
//! - `create_proposal` / `submit_opinion` / `close_round` / `resolve_proposal`
//! - `list_proposals` / `get_proposal` / `get_debate_history` / `get_round_view`
//!
//! # Usage
//!
//! ```bash
//! # Volatile store, every project admitted with default policy
//! pm-coordination
//!
//! # Council file, snapshot persistence and webhook notifications
//! pm-coordination --config council.toml --state-path ./debate-state.json \
//!     --webhook-url http://localhost:8080/hooks/proposals
//! ```

// Suppress false positive dead_code warnings from #[tool_router] macro and serde deserialization
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pm_coordination::config::{CouncilFile, EngineConfig, ProjectDebateConfig};
use pm_coordination::debate::{
    DebateEngine, Decider, Decision, OpinionSubmission, Resolution, RoundWatcher,
    SharedDebateEngine,
};
use pm_coordination::directory::StaticDirectory;
use pm_coordination::error::EngineError;
use pm_coordination::events::{LogNotifier, WebhookNotifier};
use pm_coordination::proposal::{JsonFileStore, MemoryProposalStore, NewProposal, ProposalType};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use tokio::io::{stdin, stdout};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Council file (TOML) with engine settings, project policies and rosters.
    /// Without it every project is admitted with default policy and open participation.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON snapshot file for persistence. Omit for an in-memory store.
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// POST every status change to this URL
    #[arg(long)]
    webhook_url: Option<String>,

    /// Force-close rounds open longer than this (overrides DEBATE_ROUND_TIMEOUT_SECS, 0 disables)
    #[arg(long)]
    round_timeout_secs: Option<u64>,

    /// Do not run the background round watcher
    #[arg(long, default_value_t = false)]
    no_watcher: bool,
}

// ============================================================================
// Tool request types
// ============================================================================

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CreateProposalRequest {
    #[schemars(description = "Project the proposal belongs to")]
    project_id: String,

    #[schemars(
        description = "One of: task_creation, sprint_plan, architecture_decision, resource_allocation, priority_change, other"
    )]
    proposal_type: String,

    #[schemars(description = "Short, non-empty title")]
    title: String,

    #[schemars(description = "Free-form structured payload (JSON object)")]
    content: Option<serde_json::Value>,

    #[schemars(description = "Agent id of the proposer")]
    proposed_by: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SubmitOpinionRequest {
    #[schemars(description = "Proposal id returned by create_proposal")]
    proposal_id: String,

    #[schemars(description = "Submitting agent id; must be on the project roster when one is configured")]
    agent_id: String,

    #[schemars(
        description = "Free-text stance, e.g. 'approve', 'reject', 'needs changes'. Classified as supportive, opposing or neutral."
    )]
    position: String,

    #[schemars(description = "Reasoning behind the stance")]
    reasoning: Option<String>,

    #[schemars(description = "Confidence in [0.0, 1.0]; out-of-range values are rejected")]
    confidence: f64,

    #[schemars(description = "Round the agent believes is open. Omit to target the current round.")]
    round: Option<u32>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct CloseRoundRequest {
    #[schemars(description = "Proposal id")]
    proposal_id: String,

    #[schemars(description = "Round number to close; must be the currently open round")]
    round: u32,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ResolveProposalRequest {
    #[schemars(description = "Proposal id in consensus or escalated status")]
    proposal_id: String,

    #[schemars(description = "approve or reject")]
    decision: String,

    #[schemars(description = "Human reviewer name. Exactly one of decided_by_human / decided_by_agent.")]
    decided_by_human: Option<String>,

    #[schemars(description = "Deciding agent id; must be a PM on the proposal's roster")]
    decided_by_agent: Option<String>,

    #[schemars(description = "Optional note recorded with the transition")]
    note: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ListProposalsRequest {
    #[schemars(description = "Only proposals of this project")]
    project_id: Option<String>,

    #[schemars(description = "Only proposals in this status (open, debating, consensus, escalated, approved, rejected)")]
    status: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ProposalIdRequest {
    #[schemars(description = "Proposal id")]
    proposal_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DebateHistoryRequest {
    #[schemars(description = "Proposal id. Omit for the history of every proposal.")]
    proposal_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ProposalSummary {
    id: String,
    project_id: String,
    proposal_type: ProposalType,
    title: String,
    status: String,
    current_round: u32,
    summary: String,
}

/// The MCP server handler
#[derive(Clone)]
struct DebateServer {
    engine: SharedDebateEngine,
    tool_router: ToolRouter<Self>,
}

impl DebateServer {
    fn new(engine: SharedDebateEngine) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }
}

fn render<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn tool_error(err: EngineError) -> String {
    err.to_structured_json()
}

#[tool_router]
impl DebateServer {
    // ========================================================================
    // Mutations
    // ========================================================================

    #[tool(
        description = "Create a proposal for a project. It starts in 'open' status; the first submitted opinion opens debate round 1."
    )]
    async fn create_proposal(
        &self,
        Parameters(req): Parameters<CreateProposalRequest>,
    ) -> Result<String, String> {
        let proposal_type: ProposalType = req
            .proposal_type
            .parse()
            .map_err(|e| tool_error(EngineError::from(e)))?;

        let mut request = NewProposal::new(req.project_id, proposal_type, req.title);
        if let Some(content) = req.content {
            request = request.with_content(content);
        }
        if let Some(agent) = req.proposed_by {
            request = request.proposed_by(agent);
        }

        let proposal = self
            .engine
            .create_proposal(request)
            .await
            .map_err(tool_error)?;
        render(&proposal)
    }

    #[tool(
        description = "Submit one opinion for the open round. One opinion per agent per round. When every roster member has responded the round closes and is evaluated immediately."
    )]
    async fn submit_opinion(
        &self,
        Parameters(req): Parameters<SubmitOpinionRequest>,
    ) -> Result<String, String> {
        let mut submission = OpinionSubmission::new(
            req.proposal_id.clone(),
            req.agent_id,
            req.position,
            req.reasoning.unwrap_or_default(),
            req.confidence,
        );
        if let Some(round) = req.round {
            submission = submission.for_round(round);
        }

        let opinion = self
            .engine
            .submit_opinion(submission)
            .await
            .map_err(tool_error)?;
        let proposal = self
            .engine
            .get_proposal(&req.proposal_id)
            .await
            .map_err(tool_error)?;

        render(&serde_json::json!({
            "opinion": opinion,
            "proposal_status": proposal.status,
            "current_round": proposal.current_round,
            "summary": proposal.status_line(),
        }))
    }

    #[tool(
        description = "Force-close the open round with whatever opinions exist and evaluate it. Use when an agent is unresponsive."
    )]
    async fn close_round(
        &self,
        Parameters(req): Parameters<CloseRoundRequest>,
    ) -> Result<String, String> {
        let proposal = self
            .engine
            .close_round(&req.proposal_id, req.round)
            .await
            .map_err(tool_error)?;
        render(&proposal)
    }

    #[tool(
        description = "Approve or reject a proposal in 'consensus' or 'escalated' status. Agent deciders must be a PM on the roster."
    )]
    async fn resolve_proposal(
        &self,
        Parameters(req): Parameters<ResolveProposalRequest>,
    ) -> Result<String, String> {
        let decision: Decision = req
            .decision
            .parse()
            .map_err(|e| tool_error(EngineError::from(e)))?;
        let decided_by = match (req.decided_by_human, req.decided_by_agent) {
            (Some(name), None) => Decider::human(name),
            (None, Some(agent_id)) => Decider::agent(agent_id),
            _ => {
                return Err(
                    "Provide exactly one of decided_by_human or decided_by_agent".to_string(),
                )
            }
        };

        let mut resolution = Resolution::new(decision, decided_by);
        if let Some(note) = req.note {
            resolution = resolution.with_note(note);
        }

        let proposal = self
            .engine
            .resolve_proposal(&req.proposal_id, resolution)
            .await
            .map_err(tool_error)?;
        render(&proposal)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[tool(
        description = "List proposals ordered by creation time, optionally filtered by project and status.",
        annotations(read_only_hint = true)
    )]
    async fn list_proposals(
        &self,
        Parameters(req): Parameters<ListProposalsRequest>,
    ) -> Result<String, String> {
        let proposals = self
            .engine
            .list_proposals(req.project_id.as_deref())
            .await
            .map_err(tool_error)?;

        let summaries: Vec<ProposalSummary> = proposals
            .into_iter()
            .filter(|p| {
                req.status
                    .as_deref()
                    .map_or(true, |s| p.status.to_string() == s.trim().to_lowercase())
            })
            .map(|p| ProposalSummary {
                summary: p.status_line(),
                status: p.status.to_string(),
                id: p.id,
                project_id: p.project_id,
                proposal_type: p.proposal_type,
                title: p.title,
                current_round: p.current_round,
            })
            .collect();
        render(&summaries)
    }

    #[tool(
        description = "Get one proposal including its pinned roster, closed rounds and status transition history.",
        annotations(read_only_hint = true)
    )]
    async fn get_proposal(
        &self,
        Parameters(req): Parameters<ProposalIdRequest>,
    ) -> Result<String, String> {
        let proposal = self
            .engine
            .get_proposal(&req.proposal_id)
            .await
            .map_err(tool_error)?;
        render(&proposal)
    }

    #[tool(
        description = "Get submitted opinions in submission order, for one proposal or all proposals.",
        annotations(read_only_hint = true)
    )]
    async fn get_debate_history(
        &self,
        Parameters(req): Parameters<DebateHistoryRequest>,
    ) -> Result<String, String> {
        let history = self
            .engine
            .get_debate_history(req.proposal_id.as_deref())
            .await
            .map_err(tool_error)?;
        render(&history)
    }

    #[tool(
        description = "Get a proposal's opinions grouped by round with position tallies, average confidence and closure verdicts.",
        annotations(read_only_hint = true)
    )]
    async fn get_round_view(
        &self,
        Parameters(req): Parameters<ProposalIdRequest>,
    ) -> Result<String, String> {
        let rounds = self
            .engine
            .round_view(&req.proposal_id)
            .await
            .map_err(tool_error)?;
        render(&rounds)
    }
}

#[tool_handler]
impl ServerHandler for DebateServer {
    fn get_info(&self) -> ServerInfo {
        let instructions = "MCP server coordinating proposal debates between project-manager agents.\n\
\n\
### Workflow:\n\
1. `create_proposal` → proposal starts `open`\n\
2. `submit_opinion` from each roster agent → first opinion moves it to `debating`\n\
3. When all roster agents have answered the round closes automatically:\n\
   - unanimous positions → `consensus` (or `approved` with instant consensus)\n\
   - divided → next round, until max rounds, then `escalated`\n\
4. `resolve_proposal` → `approved` or `rejected`\n\
\n\
### Notes:\n\
- `close_round` force-closes a stalled round\n\
- `list_proposals`, `get_proposal`, `get_debate_history`, `get_round_view`: read-only\n\
- Errors are structured JSON; follow the `recovery_action` field";

        ServerInfo {
            instructions: Some(instructions.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pm_coordination=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting PM Coordination MCP Server");

    // Council file supplies the directory and engine settings
    let (directory, mut engine_config) = match &args.config {
        Some(path) => {
            let council = CouncilFile::load(path)
                .with_context(|| format!("Failed to load council file {}", path.display()))?;
            tracing::info!(
                "Council config: path={}, projects={}",
                path.display(),
                council.projects.len()
            );
            (council.to_directory().shared(), council.engine_config())
        }
        None => {
            tracing::info!("No council file; admitting all projects with default policy");
            (
                StaticDirectory::permissive(ProjectDebateConfig::default()).shared(),
                EngineConfig::from_env(),
            )
        }
    };
    if let Some(secs) = args.round_timeout_secs {
        engine_config.round_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    let store = match &args.state_path {
        Some(path) => {
            tracing::info!("Proposal state path: {}", path.display());
            JsonFileStore::open(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to open state file: {}", e))?
                .shared()
        }
        None => MemoryProposalStore::new().shared(),
    };

    let run_watcher = !args.no_watcher && engine_config.needs_watcher();
    let mut engine = DebateEngine::with_config(store, directory, engine_config)
        .with_notifier(Arc::new(LogNotifier));
    if let Some(url) = &args.webhook_url {
        tracing::info!("Status webhook: {}", url);
        let webhook = WebhookNotifier::new(url.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create webhook client: {}", e))?;
        engine = engine.with_notifier(Arc::new(webhook));
    }
    let engine = engine.shared();

    let watcher = if run_watcher {
        Some(RoundWatcher::new(engine.clone()).spawn())
    } else {
        tracing::info!("Round watcher disabled");
        None
    };

    let server = DebateServer::new(engine);
    let transport = (stdin(), stdout());
    let service = server.serve(transport).await?;

    service.waiting().await?;

    if let Some((handle, token)) = watcher {
        token.cancel();
        let _ = handle.await;
    }

    Ok(())
}
