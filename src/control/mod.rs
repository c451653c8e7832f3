//! Control plane: pause/cancel signals for running jobs
//!
//! The orchestrator consults this store between pipeline stages, never
//! mid-call, so a connector invocation always completes before a signal is
//! honored. Signals can target one job or a whole project; a job-level
//! signal wins over the project-level one.
//!
//! Backed by concurrent maps so signals set from an API handler are visible
//! to every worker task without locking the pipeline.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Pause,
    Cancel,
}

/// Process-wide signal store
#[derive(Default)]
pub struct ControlPlane {
    jobs: DashMap<Uuid, Signal>,
    projects: DashMap<Uuid, Signal>,
}

impl ControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective signal for a job, job-level first
    pub fn get(&self, job_id: Uuid, project_id: Uuid) -> Option<Signal> {
        self.jobs
            .get(&job_id)
            .map(|s| *s)
            .or_else(|| self.projects.get(&project_id).map(|s| *s))
    }

    pub fn set(&self, job_id: Uuid, signal: Signal) {
        self.jobs.insert(job_id, signal);
    }

    pub fn set_project(&self, project_id: Uuid, signal: Signal) {
        self.projects.insert(project_id, signal);
    }

    pub fn clear(&self, job_id: Uuid) {
        self.jobs.remove(&job_id);
    }

    pub fn clear_project(&self, project_id: Uuid) {
        self.projects.remove(&project_id);
    }

    /// Whether a pause is pending for this job (used by resume to decide
    /// between clearing a signal and a no-op)
    pub fn is_paused(&self, job_id: Uuid) -> bool {
        matches!(self.jobs.get(&job_id).map(|s| *s), Some(Signal::Pause))
    }
}
