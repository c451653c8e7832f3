//! Enrichment job aggregate: status machine, stages and typed results
//!
//! A job is one "enrich this company" unit of work. The orchestrator is the
//! only writer; everything else reads. Status transitions are monotonic
//! except running <-> paused, and a terminal job is immutable.

use crate::errors::{EnrichError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Paused)
                | (Paused, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                // cancel can land before the job ever starts or while parked
                | (Pending, Cancelled)
                | (Paused, Cancelled)
                | (Pending, Failed)
        )
    }
}

/// Pipeline stages, executed strictly in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cliente,
    Mercado,
    Produtos,
    Concorrentes,
    Leads,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Cliente,
        Stage::Mercado,
        Stage::Produtos,
        Stage::Concorrentes,
        Stage::Leads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Cliente => "cliente",
            Stage::Mercado => "mercado",
            Stage::Produtos => "produtos",
            Stage::Concorrentes => "concorrentes",
            Stage::Leads => "leads",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded on a failed job: which stage broke and why
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub stage: Option<Stage>,
    pub kind: ErrorKind,
    pub message: String,
}

/// One market discovered by the generator, with its nested derivations.
/// This is the typed form of what used to travel between stages as loose
/// JSON: stages after `mercado` read from here instead of re-calling the
/// generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredMarket {
    pub name: String,
    pub category: Option<String>,
    pub segmentation: Option<crate::model::Segmentation>,
    pub estimated_size: Option<String>,
    pub annual_growth: Option<String>,
    pub products: Vec<DiscoveredProduct>,
    pub competitors: Vec<DiscoveredCompany>,
    pub leads: Vec<DiscoveredCompany>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredProduct {
    pub name: String,
    pub description: Option<String>,
}

/// A competitor or lead proposed by the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredCompany {
    pub name: String,
    pub tax_id: Option<String>,
    pub site: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub size: Option<crate::model::CompanySize>,
    pub sector: Option<String>,
    /// 0-100 confidence reported by the generator
    #[serde(default)]
    pub confidence: u8,
}

/// Accumulated, strongly-typed partial results. Persisted with the job so a
/// paused run resumes without re-calling connectors for completed stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResult {
    /// Discovery bundle captured by the `mercado` stage
    pub markets: Vec<DiscoveredMarket>,
    /// Entity ids persisted per stage
    pub market_ids: Vec<Uuid>,
    pub product_ids: Vec<Uuid>,
    pub competitor_ids: Vec<Uuid>,
    pub lead_ids: Vec<Uuid>,
}

/// One enrichment workflow instance bound to a seed entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    pub id: Uuid,
    pub project_id: Uuid,
    pub entity_id: Uuid,

    pub status: JobStatus,
    /// 0-100, recomputed after each stage; non-decreasing while running
    pub progress: u8,
    pub current_stage: Option<Stage>,
    pub completed_stages: Vec<Stage>,
    pub result: JobResult,

    /// Accumulated connector cost in micro-USD
    pub cost_micros: u64,
    pub error: Option<JobError>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl EnrichmentJob {
    pub fn new(project_id: Uuid, entity_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            entity_id,
            status: JobStatus::Pending,
            progress: 0,
            current_stage: None,
            completed_stages: Vec::new(),
            result: JobResult::default(),
            cost_micros: 0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some((f - s).num_milliseconds()),
            _ => None,
        }
    }

    pub fn is_stage_done(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Record a finished stage and recompute progress
    pub fn complete_stage(&mut self, stage: Stage) {
        if !self.is_stage_done(stage) {
            self.completed_stages.push(stage);
        }
        self.progress = (self.completed_stages.len() * 100 / Stage::ALL.len()) as u8;
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), EnrichError> {
        if !self.status.can_transition_to(next) {
            return Err(EnrichError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), EnrichError> {
        self.transition(JobStatus::Running)?;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn mark_paused(&mut self) -> Result<(), EnrichError> {
        self.transition(JobStatus::Paused)?;
        self.current_stage = None;
        Ok(())
    }

    pub fn mark_completed(&mut self) -> Result<(), EnrichError> {
        self.transition(JobStatus::Completed)?;
        self.current_stage = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, error: JobError) -> Result<(), EnrichError> {
        self.transition(JobStatus::Failed)?;
        self.current_stage = None;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_cancelled(&mut self) -> Result<(), EnrichError> {
        self.transition(JobStatus::Cancelled)?;
        self.current_stage = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}
