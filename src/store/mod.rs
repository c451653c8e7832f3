//! Persistence boundary
//!
//! The core never talks to a database directly; it goes through these
//! traits. The surrounding CRM wires its relational layer in, and the
//! bundled `MemoryStore` serves tests and embedded runs.
//!
//! Dedup contract: `insert` is insert-or-skip keyed on
//! (project, kind, identity hash) over non-deleted entities. Concurrent
//! jobs rely on this instead of application-level locking.

use crate::errors::{EnrichError, Result};
use crate::job::{EnrichmentJob, JobStatus};
use crate::model::{Entity, EntityKind};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

/// Outcome of an insert attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New record persisted
    Inserted(Uuid),
    /// An equivalent non-deleted record already existed; its id is returned
    /// so callers can attach relations to it
    SkippedDuplicate(Uuid),
}

impl InsertOutcome {
    pub fn entity_id(&self) -> Uuid {
        match self {
            InsertOutcome::Inserted(id) | InsertOutcome::SkippedDuplicate(id) => *id,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert-or-skip on the identity hash
    async fn insert(&self, entity: Entity) -> Result<InsertOutcome>;

    /// Replace an existing entity (quality passes, tax-id backfill)
    async fn update(&self, entity: Entity) -> Result<()>;

    async fn load(&self, id: Uuid) -> Result<Option<Entity>>;

    /// Non-deleted entities of one kind under a project
    async fn list(&self, project_id: Uuid, kind: EntityKind) -> Result<Vec<Entity>>;
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: EnrichmentJob) -> Result<()>;

    /// Persist the job's current state; called after every stage so pause
    /// and crash recovery see consistent progress
    async fn save(&self, job: &EnrichmentJob) -> Result<()>;

    async fn load_job(&self, id: Uuid) -> Result<Option<EnrichmentJob>>;

    /// Jobs eligible for dispatch under a project, FIFO by creation time.
    /// Includes paused jobs (the scheduler filters those with a pending
    /// pause signal).
    async fn dispatchable(&self, project_id: Uuid) -> Result<Vec<EnrichmentJob>>;

    /// Projects that currently have dispatchable jobs
    async fn projects_with_backlog(&self) -> Result<Vec<Uuid>>;

    /// How many jobs are running under a project
    async fn running_count(&self, project_id: Uuid) -> Result<usize>;
}

/// In-memory reference implementation of both stores
#[derive(Default)]
pub struct MemoryStore {
    entities: DashMap<Uuid, Entity>,
    /// (project, kind, identity hash) -> entity id, non-deleted only
    identity_index: DashMap<(Uuid, EntityKind, String), Uuid>,
    jobs: DashMap<Uuid, EnrichmentJob>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_key(entity: &Entity) -> (Uuid, EntityKind, String) {
        (entity.project_id, entity.kind, entity.identity_hash.clone())
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn insert(&self, entity: Entity) -> Result<InsertOutcome> {
        let key = Self::index_key(&entity);
        // entry API keeps check-and-insert atomic under concurrent jobs
        match self.identity_index.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                Ok(InsertOutcome::SkippedDuplicate(*existing.get()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let id = entity.id;
                slot.insert(id);
                self.entities.insert(id, entity);
                Ok(InsertOutcome::Inserted(id))
            }
        }
    }

    async fn update(&self, entity: Entity) -> Result<()> {
        let id = entity.id;
        match self.entities.get(&id).map(|e| Self::index_key(&e)) {
            Some(old_key) => {
                // identity hash may change on tax-id backfill; keep the
                // index in step, and drop the entry on soft delete
                let new_key = Self::index_key(&entity);
                if old_key != new_key || entity.is_deleted() {
                    self.identity_index.remove(&old_key);
                }
                if !entity.is_deleted() {
                    self.identity_index.insert(new_key, id);
                }
                self.entities.insert(id, entity);
                Ok(())
            }
            None => Err(EnrichError::EntityNotFound { id: id.to_string() }),
        }
    }

    async fn load(&self, id: Uuid) -> Result<Option<Entity>> {
        Ok(self.entities.get(&id).map(|e| e.clone()))
    }

    async fn list(&self, project_id: Uuid, kind: EntityKind) -> Result<Vec<Entity>> {
        let mut out: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| e.project_id == project_id && e.kind == kind && !e.is_deleted())
            .map(|e| e.clone())
            .collect();
        out.sort_by_key(|e| e.created_at);
        Ok(out)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create(&self, job: EnrichmentJob) -> Result<()> {
        self.jobs.insert(job.id, job);
        Ok(())
    }

    async fn save(&self, job: &EnrichmentJob) -> Result<()> {
        if !self.jobs.contains_key(&job.id) {
            return Err(EnrichError::JobNotFound {
                id: job.id.to_string(),
            });
        }
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, id: Uuid) -> Result<Option<EnrichmentJob>> {
        Ok(self.jobs.get(&id).map(|j| j.clone()))
    }

    async fn dispatchable(&self, project_id: Uuid) -> Result<Vec<EnrichmentJob>> {
        let mut out: Vec<EnrichmentJob> = self
            .jobs
            .iter()
            .filter(|j| {
                j.project_id == project_id
                    && matches!(j.status, JobStatus::Pending | JobStatus::Paused)
            })
            .map(|j| j.clone())
            .collect();
        out.sort_by_key(|j| j.created_at);
        Ok(out)
    }

    async fn projects_with_backlog(&self) -> Result<Vec<Uuid>> {
        let mut projects: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Paused))
            .map(|j| j.project_id)
            .collect();
        projects.sort_unstable();
        projects.dedup();
        Ok(projects)
    }

    async fn running_count(&self, project_id: Uuid) -> Result<usize> {
        Ok(self
            .jobs
            .iter()
            .filter(|j| j.project_id == project_id && j.status == JobStatus::Running)
            .count())
    }
}
