//! Configuration — per-project debate policy, engine tuning, and the
//! TOML council file that ties projects to rosters.
//!
//! # Council file
//!
//! ```toml
//! [engine]
//! round_timeout_secs = 900
//! consensus_review_window_secs = 3600
//!
//! [defaults]
//! max_debate_rounds = 3
//!
//! [projects.apollo.debate]
//! max_debate_rounds = 5
//! require_dual_pm_consensus = true
//!
//! [[projects.apollo.roster]]
//! agent_id = "pm-alpha"
//! is_pm = true
//! ```
//!
//! Environment variables (`DEBATE_*`) override `[engine]` values. Omitted
//! timeouts keep their defaults; `0` disables one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debate::{Participant, Roster};
use crate::directory::StaticDirectory;
use crate::proposal::ProjectId;

/// Default number of rounds before an undecided proposal escalates.
pub const DEFAULT_MAX_DEBATE_ROUNDS: u32 = 3;

/// Default interval between watcher sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Default time supportive consensus waits for review before auto-approval.
pub const DEFAULT_CONSENSUS_REVIEW_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Default broadcast capacity of the event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Debate policy of one project. Read-only to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectDebateConfig {
    /// Rounds allowed before a diverged proposal escalates.
    pub max_debate_rounds: u32,
    /// Convergence additionally needs opinions from two distinct PM agents.
    pub require_dual_pm_consensus: bool,
    /// A supportive, unanimous round 1 goes straight to `approved`.
    pub auto_flag_instant_consensus: bool,
}

impl Default for ProjectDebateConfig {
    fn default() -> Self {
        Self {
            max_debate_rounds: DEFAULT_MAX_DEBATE_ROUNDS,
            require_dual_pm_consensus: false,
            auto_flag_instant_consensus: false,
        }
    }
}

impl ProjectDebateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_debate_rounds == 0 {
            return Err(ConfigError::Invalid(
                "max_debate_rounds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Engine-wide tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Force-close rounds that stay open longer than this.
    pub round_timeout: Option<Duration>,
    /// Auto-approve supportive consensus left unreviewed for this long.
    /// `None` leaves consensus waiting for an explicit decision.
    pub consensus_review_window: Option<Duration>,
    /// How often the watcher sweeps.
    pub sweep_interval: Duration,
    /// Broadcast channel capacity for engine events.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            round_timeout: None,
            consensus_review_window: Some(DEFAULT_CONSENSUS_REVIEW_WINDOW),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `DEBATE_*` environment variables on top of this config.
    ///
    /// Unparseable values are ignored; `0` disables an optional timeout.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = env_u64("DEBATE_ROUND_TIMEOUT_SECS") {
            self.round_timeout = optional_secs(secs);
        }
        if let Some(secs) = env_u64("DEBATE_REVIEW_WINDOW_SECS") {
            self.consensus_review_window = optional_secs(secs);
        }
        if let Some(secs) = env_u64("DEBATE_SWEEP_INTERVAL_SECS") {
            if secs > 0 {
                self.sweep_interval = Duration::from_secs(secs);
            }
        }
        if let Some(capacity) = env_u64("DEBATE_EVENT_CAPACITY") {
            if capacity > 0 {
                self.event_capacity = capacity as usize;
            }
        }
        self
    }

    /// Whether a periodic watcher has anything to do.
    pub fn needs_watcher(&self) -> bool {
        self.round_timeout.is_some() || self.consensus_review_window.is_some()
    }
}

fn env_u64(var: &str) -> Option<u64> {
    std::env::var(var).ok()?.trim().parse().ok()
}

fn optional_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// `[engine]` table of the council file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub round_timeout_secs: Option<u64>,
    pub consensus_review_window_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub event_capacity: Option<usize>,
}

impl EngineSettings {
    pub fn to_engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            round_timeout: self
                .round_timeout_secs
                .map_or(defaults.round_timeout, optional_secs),
            consensus_review_window: self
                .consensus_review_window_secs
                .map_or(defaults.consensus_review_window, optional_secs),
            sweep_interval: self
                .sweep_interval_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            event_capacity: self
                .event_capacity
                .filter(|c| *c > 0)
                .unwrap_or(defaults.event_capacity),
        }
    }
}

/// One `[projects.<id>]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectEntry {
    /// Replaces `[defaults]` wholesale when present.
    pub debate: Option<ProjectDebateConfig>,
    pub roster: Vec<Participant>,
}

/// Parsed council file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilFile {
    pub engine: EngineSettings,
    pub defaults: ProjectDebateConfig,
    pub projects: HashMap<ProjectId, ProjectEntry>,
}

impl CouncilFile {
    /// Load and validate a council file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate council TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: Self = toml::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.defaults.validate()?;
        for (project_id, entry) in &self.projects {
            if let Some(debate) = &entry.debate {
                debate
                    .validate()
                    .map_err(|e| ConfigError::Invalid(format!("project {}: {}", project_id, e)))?;
            }
            if entry.roster.iter().any(|p| p.agent_id.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "project {}: roster entry with empty agent_id",
                    project_id
                )));
            }
        }
        Ok(())
    }

    /// Engine config from `[engine]`, with environment overrides applied.
    pub fn engine_config(&self) -> EngineConfig {
        self.engine.to_engine_config().with_env_overrides()
    }

    /// Build the static project directory described by this file.
    pub fn to_directory(&self) -> StaticDirectory {
        let mut directory = StaticDirectory::new(self.defaults);
        for (project_id, entry) in &self.projects {
            directory.insert_project(
                project_id.clone(),
                entry.debate.unwrap_or(self.defaults),
                Roster::new(entry.roster.iter().cloned()),
            );
        }
        directory
    }
}
