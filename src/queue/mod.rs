//! Job scheduling: enqueue, drain, and the pause/resume/cancel surface
//!
//! One scheduler per process. `drain` walks every project with backlog and
//! dispatches eligible jobs up to the per-project concurrency limit; the
//! worker binary calls it on an interval. Control operations return
//! immediately; a running job observes its signal at the next stage
//! boundary.

use crate::config::EnrichmentConfig;
use crate::control::{ControlPlane, Signal};
use crate::errors::{EnrichError, ErrorKind, Result};
use crate::job::{EnrichmentJob, JobError, JobStatus};
use crate::metrics;
use crate::orchestrator::Orchestrator;
use crate::store::JobStore;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Result of a control operation. Signals against jobs in the wrong state
/// are reported as no-ops rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    NoOp,
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    jobs: Arc<dyn JobStore>,
    control: Arc<ControlPlane>,
    config: EnrichmentConfig,
    /// Dispatched jobs (job id -> project id) that have not finished,
    /// counted against the concurrency limit before they reach `running`
    in_flight: Arc<DashMap<Uuid, Uuid>>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        jobs: Arc<dyn JobStore>,
        control: Arc<ControlPlane>,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            orchestrator,
            jobs,
            control,
            config,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Queue a new enrichment job for a seed entity
    pub async fn enqueue(&self, project_id: Uuid, entity_id: Uuid) -> Result<Uuid> {
        let job = EnrichmentJob::new(project_id, entity_id);
        let id = job.id;
        self.jobs.create(job).await?;
        metrics::record_job_enqueued();
        info!(job_id = %id, project_id = %project_id, "job enqueued");
        Ok(id)
    }

    /// Request a pause. Only a running job can pause; anything else is a
    /// no-op.
    pub async fn pause(&self, job_id: Uuid) -> Result<ControlOutcome> {
        let job = self.load(job_id).await?;
        if job.status != JobStatus::Running {
            return Ok(ControlOutcome::NoOp);
        }
        self.control.set(job_id, Signal::Pause);
        info!(job_id = %job_id, "pause requested");
        Ok(ControlOutcome::Applied)
    }

    /// Clear a pending pause so the next drain re-dispatches the job.
    /// Covers both a parked job and a pause requested but not yet honored.
    pub async fn resume(&self, job_id: Uuid) -> Result<ControlOutcome> {
        let job = self.load(job_id).await?;
        let pause_pending = self.control.is_paused(job_id);
        if job.status != JobStatus::Paused && !pause_pending {
            return Ok(ControlOutcome::NoOp);
        }
        if pause_pending {
            self.control.clear(job_id);
        }
        info!(job_id = %job_id, "resume requested");
        Ok(ControlOutcome::Applied)
    }

    /// Cancel a job. Pending and paused jobs are finalized on the spot;
    /// a running job is signalled and finalizes itself at the next stage
    /// boundary. Entities persisted by completed stages are kept.
    pub async fn cancel(&self, job_id: Uuid) -> Result<ControlOutcome> {
        let mut job = self.load(job_id).await?;
        match job.status {
            _ if job.is_terminal() => Ok(ControlOutcome::NoOp),
            JobStatus::Running => {
                self.control.set(job_id, Signal::Cancel);
                info!(job_id = %job_id, "cancel requested");
                Ok(ControlOutcome::Applied)
            }
            _ => {
                job.mark_cancelled()?;
                self.jobs.save(&job).await?;
                self.control.clear(job_id);
                metrics::record_job_finished(job.status.as_str(), 0.0);
                info!(job_id = %job_id, "job cancelled before dispatch");
                Ok(ControlOutcome::Applied)
            }
        }
    }

    /// Park every job under a project. Running jobs pause at their next
    /// stage boundary; queued ones stay queued until resumed.
    pub fn pause_project(&self, project_id: Uuid) {
        self.control.set_project(project_id, Signal::Pause);
        info!(project_id = %project_id, "project paused");
    }

    pub fn resume_project(&self, project_id: Uuid) {
        self.control.clear_project(project_id);
        info!(project_id = %project_id, "project resumed");
    }

    /// Dispatch eligible jobs across all projects with backlog. Returns
    /// how many jobs were handed to the orchestrator.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<usize> {
        let mut dispatched = 0;
        let mut pending_total = 0;

        for project_id in self.jobs.projects_with_backlog().await? {
            let running = self.jobs.running_count(project_id).await?;
            let occupied = running.max(self.occupied_slots(project_id));
            let slots = self.config.concurrency_limit.saturating_sub(occupied);

            let queue = self.jobs.dispatchable(project_id).await?;
            pending_total += queue.len();
            if slots == 0 {
                continue;
            }

            let eligible = queue.into_iter().filter(|job| {
                !self.in_flight.contains_key(&job.id)
                    && self.control.get(job.id, project_id) != Some(Signal::Pause)
            });

            for job in eligible.take(slots) {
                self.dispatch(job);
                dispatched += 1;
            }
        }

        metrics::record_queue_depth(pending_total, self.in_flight.len());
        Ok(dispatched)
    }

    /// Dispatched jobs that have not yet released their slot
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// In-flight jobs cover the gap between dispatch and `running`
    fn occupied_slots(&self, project_id: Uuid) -> usize {
        self.in_flight
            .iter()
            .filter(|entry| *entry.value() == project_id)
            .count()
    }

    fn dispatch(&self, job: EnrichmentJob) {
        let job_id = job.id;
        self.in_flight.insert(job_id, job.project_id);

        let orchestrator = Arc::clone(&self.orchestrator);
        let jobs = Arc::clone(&self.jobs);
        let in_flight = Arc::clone(&self.in_flight);
        let timeout = std::time::Duration::from_secs(self.config.job_timeout_secs);

        tokio::spawn(async move {
            let run = tokio::time::timeout(timeout, orchestrator.run(job_id)).await;
            match run {
                Ok(Ok(outcome)) => {
                    info!(job_id = %job_id, ?outcome, "job run finished");
                }
                Ok(Err(err)) => {
                    error!(job_id = %job_id, error = %err, "job run errored");
                    fail_job(&*jobs, job_id, None, &err.to_string(), err.kind()).await;
                }
                Err(_) => {
                    warn!(job_id = %job_id, timeout_secs = timeout.as_secs(), "job run timed out");
                    fail_job(
                        &*jobs,
                        job_id,
                        None,
                        &format!("job exceeded {}s deadline", timeout.as_secs()),
                        ErrorKind::Timeout,
                    )
                    .await;
                }
            }
            in_flight.remove(&job_id);
        });
    }

    async fn load(&self, job_id: Uuid) -> Result<EnrichmentJob> {
        self.jobs
            .load_job(job_id)
            .await?
            .ok_or_else(|| EnrichError::JobNotFound {
                id: job_id.to_string(),
            })
    }
}

/// Best-effort terminal write for a run that died outside the pipeline
async fn fail_job(jobs: &dyn JobStore, job_id: Uuid, stage: Option<crate::job::Stage>, message: &str, kind: ErrorKind) {
    let Ok(Some(mut job)) = jobs.load_job(job_id).await else {
        return;
    };
    if job.is_terminal() {
        return;
    }
    let failed = job.mark_failed(JobError {
        stage,
        kind,
        message: message.to_string(),
    });
    if failed.is_ok() {
        if let Err(err) = jobs.save(&job).await {
            error!(job_id = %job_id, error = %err, "could not persist job failure");
        }
        metrics::record_job_finished(job.status.as_str(), 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::{CostLedger, RateGate};
    use crate::audit::AuditSink;
    use crate::config::AppConfig;
    use crate::connectors::{
        CompanySearch, ConnectorResult, DiscoveryOptions, MarketDiscovery, RegistrationData,
        RegistryLookup, SearchHit, SeedCompany,
    };
    use crate::errors::ConnectorError;
    use crate::job::DiscoveredMarket;
    use crate::model::{Entity, EntityKind, Provenance};
    use crate::orchestrator::Connectors;
    use crate::store::{EntityStore, MemoryStore};
    use crate::taxid::Cnpj;
    use async_trait::async_trait;
    use std::time::Duration;

    struct NoRegistry;

    #[async_trait]
    impl RegistryLookup for NoRegistry {
        async fn lookup(&self, cnpj: &Cnpj) -> ConnectorResult<RegistrationData> {
            Err(ConnectorError::NotFound {
                query: cnpj.digits().to_string(),
            })
        }
    }

    struct NoSearch;

    #[async_trait]
    impl CompanySearch for NoSearch {
        async fn search(
            &self,
            _query: &str,
            _location: Option<&str>,
        ) -> ConnectorResult<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    struct EmptyGenerator;

    #[async_trait]
    impl MarketDiscovery for EmptyGenerator {
        async fn discover(
            &self,
            _seed: &SeedCompany,
            _options: &DiscoveryOptions,
        ) -> ConnectorResult<Vec<DiscoveredMarket>> {
            Ok(Vec::new())
        }
    }

    fn scheduler_with_limit(limit: usize) -> (Scheduler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let control = Arc::new(ControlPlane::new());
        let defaults = AppConfig::default();
        let mut config = defaults.enrichment.clone();
        config.concurrency_limit = limit;

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone() as Arc<dyn EntityStore>,
            store.clone() as Arc<dyn JobStore>,
            Arc::clone(&control),
            Arc::new(CostLedger::new()),
            Arc::new(RateGate::new(&defaults.rate_limit)),
            AuditSink::disabled(),
            Connectors {
                registry: Arc::new(NoRegistry),
                search: Arc::new(NoSearch),
                generator: Arc::new(EmptyGenerator),
            },
            config.clone(),
        ));

        let scheduler = Scheduler::new(
            orchestrator,
            store.clone() as Arc<dyn JobStore>,
            control,
            config,
        );
        (scheduler, store)
    }

    async fn seed_entity(store: &MemoryStore, project: Uuid, name: &str) -> Uuid {
        let mut entity = Entity::new(project, EntityKind::Client, name, None, Provenance::manual());
        entity.site = Some("https://example.com.br".to_string());
        store.insert(entity).await.unwrap().entity_id()
    }

    async fn wait_terminal(scheduler: &Scheduler, store: &MemoryStore, ids: &[Uuid]) {
        for _ in 0..200 {
            let mut all_done = scheduler.in_flight_count() == 0;
            for id in ids {
                let job = store.load_job(*id).await.unwrap().unwrap();
                if !job.is_terminal() {
                    all_done = false;
                }
            }
            if all_done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("jobs did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn test_enqueue_creates_pending_job() {
        let (scheduler, store) = scheduler_with_limit(3);
        let project = Uuid::new_v4();
        let entity = seed_entity(&store, project, "Acme Ltda").await;

        let job_id = scheduler.enqueue(project, entity).await.unwrap();
        let job = store.load_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
    }

    #[tokio::test]
    async fn test_pause_non_running_is_noop() {
        let (scheduler, store) = scheduler_with_limit(3);
        let project = Uuid::new_v4();
        let entity = seed_entity(&store, project, "Acme Ltda").await;
        let job_id = scheduler.enqueue(project, entity).await.unwrap();

        assert_eq!(scheduler.pause(job_id).await.unwrap(), ControlOutcome::NoOp);
    }

    #[tokio::test]
    async fn test_cancel_pending_is_immediate() {
        let (scheduler, store) = scheduler_with_limit(3);
        let project = Uuid::new_v4();
        let entity = seed_entity(&store, project, "Acme Ltda").await;
        let job_id = scheduler.enqueue(project, entity).await.unwrap();

        assert_eq!(
            scheduler.cancel(job_id).await.unwrap(),
            ControlOutcome::Applied
        );
        let job = store.load_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);

        // cancelling a terminal job changes nothing
        assert_eq!(scheduler.cancel(job_id).await.unwrap(), ControlOutcome::NoOp);
    }

    #[tokio::test]
    async fn test_resume_clears_pending_pause() {
        let (scheduler, store) = scheduler_with_limit(3);
        let project = Uuid::new_v4();
        let entity = seed_entity(&store, project, "Acme Ltda").await;
        let job_id = scheduler.enqueue(project, entity).await.unwrap();

        let mut job = store.load_job(job_id).await.unwrap().unwrap();
        job.mark_running().unwrap();
        store.save(&job).await.unwrap();

        assert_eq!(
            scheduler.pause(job_id).await.unwrap(),
            ControlOutcome::Applied
        );
        assert_eq!(
            scheduler.resume(job_id).await.unwrap(),
            ControlOutcome::Applied
        );
        assert_eq!(scheduler.resume(job_id).await.unwrap(), ControlOutcome::NoOp);
    }

    #[tokio::test]
    async fn test_drain_respects_concurrency_limit() {
        let (scheduler, store) = scheduler_with_limit(2);
        let project = Uuid::new_v4();

        let mut job_ids = Vec::new();
        for i in 0..5 {
            let entity = seed_entity(&store, project, &format!("Empresa {i}")).await;
            job_ids.push(scheduler.enqueue(project, entity).await.unwrap());
        }

        assert_eq!(scheduler.drain().await.unwrap(), 2);
        wait_terminal(&scheduler, &store, &job_ids[..2]).await;

        assert_eq!(scheduler.drain().await.unwrap(), 2);
        wait_terminal(&scheduler, &store, &job_ids[..4]).await;

        assert_eq!(scheduler.drain().await.unwrap(), 1);
        wait_terminal(&scheduler, &store, &job_ids).await;

        for id in &job_ids {
            let job = store.load_job(*id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_drain_skips_paused_project() {
        let (scheduler, store) = scheduler_with_limit(3);
        let project = Uuid::new_v4();
        let entity = seed_entity(&store, project, "Acme Ltda").await;
        scheduler.enqueue(project, entity).await.unwrap();

        scheduler.pause_project(project);
        assert_eq!(scheduler.drain().await.unwrap(), 0);

        scheduler.resume_project(project);
        assert_eq!(scheduler.drain().await.unwrap(), 1);
    }
}
