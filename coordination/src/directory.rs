//! Project directory — debate configuration and agent rosters per project.
//!
//! The engine reads a project's profile once, when a proposal is created,
//! and pins the roster on the proposal. Later directory changes never
//! affect proposals already under debate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProjectDebateConfig;
use crate::debate::Roster;
use crate::proposal::ProjectId;

/// Everything the engine needs to know about a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectProfile {
    pub config: ProjectDebateConfig,
    pub roster: Roster,
}

/// Shared reference to a project directory
pub type SharedDirectory = Arc<dyn ProjectDirectory>;

/// Source of project configuration and agent rosters.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// Profile of `project_id`, or `None` if the project is unknown.
    async fn profile(&self, project_id: &str) -> Option<ProjectProfile>;
}

/// Directory backed by a fixed map, usually built from a council file.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    defaults: ProjectDebateConfig,
    projects: HashMap<ProjectId, ProjectProfile>,
    admit_unknown: bool,
}

impl StaticDirectory {
    /// Directory that only knows explicitly registered projects.
    pub fn new(defaults: ProjectDebateConfig) -> Self {
        Self {
            defaults,
            projects: HashMap::new(),
            admit_unknown: false,
        }
    }

    /// Directory that treats unknown projects as having the default
    /// config and an open (empty) roster.
    pub fn permissive(defaults: ProjectDebateConfig) -> Self {
        Self {
            admit_unknown: true,
            ..Self::new(defaults)
        }
    }

    pub fn insert_project(
        &mut self,
        project_id: impl Into<ProjectId>,
        config: ProjectDebateConfig,
        roster: Roster,
    ) {
        self.projects
            .insert(project_id.into(), ProjectProfile { config, roster });
    }

    /// Builder form of [`insert_project`](Self::insert_project).
    pub fn with_project(
        mut self,
        project_id: impl Into<ProjectId>,
        config: ProjectDebateConfig,
        roster: Roster,
    ) -> Self {
        self.insert_project(project_id, config, roster);
        self
    }

    pub fn project_ids(&self) -> impl Iterator<Item = &ProjectId> {
        self.projects.keys()
    }

    /// Create a shared reference to this directory
    pub fn shared(self) -> SharedDirectory {
        Arc::new(self)
    }
}

#[async_trait]
impl ProjectDirectory for StaticDirectory {
    async fn profile(&self, project_id: &str) -> Option<ProjectProfile> {
        match self.projects.get(project_id) {
            Some(profile) => Some(profile.clone()),
            None if self.admit_unknown => Some(ProjectProfile {
                config: self.defaults,
                roster: Roster::default(),
            }),
            None => None,
        }
    }
}
