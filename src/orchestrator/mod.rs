//! Enrichment orchestrator: drives one job through its pipeline stages
//!
//! Stage order is fixed: cliente -> mercado -> produtos -> concorrentes ->
//! leads. Between stages the orchestrator consults the control plane;
//! pause suspends the run (partial results persisted), cancel ends it
//! without rolling back entities already persisted by completed stages.
//!
//! Connector calls always run to completion before a signal is honored,
//! so external side effects are never half-applied.

use crate::accounting::{CostLedger, RateGate, Service};
use crate::audit::{AuditSink, CallRecord};
use crate::config::EnrichmentConfig;
use crate::connectors::{
    CompanySearch, ConnectorResult, DiscoveryOptions, MarketDiscovery, RegistryLookup, SeedCompany,
};
use crate::control::{ControlPlane, Signal};
use crate::errors::{ConnectorError, EnrichError, Result};
use crate::job::{DiscoveredCompany, EnrichmentJob, JobError, Stage};
use crate::metrics::{self, ConnectorCallTimer};
use crate::model::{Entity, EntityKind, Provenance};
use crate::store::{EntityStore, JobStore};
use crate::taxid::Cnpj;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// The three connector seams the pipeline drives
pub struct Connectors {
    pub registry: Arc<dyn RegistryLookup>,
    pub search: Arc<dyn CompanySearch>,
    pub generator: Arc<dyn MarketDiscovery>,
}

/// How one `run` invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Pause signal honored; job parked, resumable
    Suspended,
    Cancelled,
    Failed,
}

pub struct Orchestrator {
    entities: Arc<dyn EntityStore>,
    jobs: Arc<dyn JobStore>,
    control: Arc<ControlPlane>,
    ledger: Arc<CostLedger>,
    gate: Arc<RateGate>,
    audit: AuditSink,
    connectors: Connectors,
    config: EnrichmentConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        entities: Arc<dyn EntityStore>,
        jobs: Arc<dyn JobStore>,
        control: Arc<ControlPlane>,
        ledger: Arc<CostLedger>,
        gate: Arc<RateGate>,
        audit: AuditSink,
        connectors: Connectors,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            entities,
            jobs,
            control,
            ledger,
            gate,
            audit,
            connectors,
            config,
        }
    }

    /// Execute a job from its next incomplete stage to a terminal state or
    /// a suspension point
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn run(&self, job_id: Uuid) -> Result<RunOutcome> {
        let mut job = self
            .jobs
            .load_job(job_id)
            .await?
            .ok_or_else(|| EnrichError::JobNotFound {
                id: job_id.to_string(),
            })?;

        if job.is_terminal() {
            warn!(status = job.status.as_str(), "job already terminal, nothing to run");
            return Ok(match job.status {
                crate::job::JobStatus::Cancelled => RunOutcome::Cancelled,
                crate::job::JobStatus::Failed => RunOutcome::Failed,
                _ => RunOutcome::Completed,
            });
        }

        let mut seed = self
            .entities
            .load(job.entity_id)
            .await?
            .ok_or_else(|| EnrichError::EntityNotFound {
                id: job.entity_id.to_string(),
            })?;

        job.mark_running()?;
        self.jobs.save(&job).await?;
        info!(entity = %seed.name, progress = job.progress, "job running");

        for stage in Stage::ALL {
            if job.is_stage_done(stage) {
                continue;
            }

            // signals are honored only here, at stage boundaries
            match self.control.get(job.id, job.project_id) {
                Some(Signal::Cancel) => {
                    job.mark_cancelled()?;
                    self.jobs.save(&job).await?;
                    self.control.clear(job.id);
                    self.finish_metrics(&job);
                    info!(stage = %stage, "job cancelled; prior stages' entities kept");
                    return Ok(RunOutcome::Cancelled);
                }
                Some(Signal::Pause) => {
                    job.mark_paused()?;
                    self.jobs.save(&job).await?;
                    info!(stage = %stage, progress = job.progress, "job paused");
                    return Ok(RunOutcome::Suspended);
                }
                None => {}
            }

            job.current_stage = Some(stage);
            self.jobs.save(&job).await?;

            let stage_result = match stage {
                Stage::Cliente => self.stage_cliente(&mut job, &mut seed).await,
                Stage::Mercado => self.stage_mercado(&mut job, &seed).await,
                Stage::Produtos => self.stage_produtos(&mut job).await,
                Stage::Concorrentes => self.stage_concorrentes(&mut job).await,
                Stage::Leads => self.stage_leads(&mut job).await,
            };

            if let Err(err) = stage_result {
                let job_error = JobError {
                    stage: Some(stage),
                    kind: err.kind(),
                    message: err.to_string(),
                };
                warn!(stage = %stage, error = %err, "stage failed, job failed");
                job.mark_failed(job_error)?;
                self.jobs.save(&job).await?;
                self.finish_metrics(&job);
                return Ok(RunOutcome::Failed);
            }

            job.current_stage = None;
            job.complete_stage(stage);
            self.jobs.save(&job).await?;
            info!(stage = %stage, progress = job.progress, "stage completed");
        }

        job.mark_completed()?;
        self.jobs.save(&job).await?;
        self.finish_metrics(&job);
        info!(cost_micros = job.cost_micros, "job completed");
        Ok(RunOutcome::Completed)
    }

    fn finish_metrics(&self, job: &EnrichmentJob) {
        let duration_secs = job.duration_ms().unwrap_or(0) as f64 / 1000.0;
        metrics::record_job_finished(job.status.as_str(), duration_secs);
    }

    /// Rate-gate, time, audit and charge one connector call. Cost is
    /// charged on success and failure alike.
    async fn call<T, F, Fut>(
        &self,
        job: &mut EnrichmentJob,
        service: Service,
        op: F,
    ) -> ConnectorResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ConnectorResult<T>>,
    {
        self.gate.acquire(service).await;

        let timer = ConnectorCallTimer::start(service.as_str());
        let result = op().await;
        let latency_ms = timer.finish(result.is_ok());

        let cost = service.unit_cost_micros();
        self.ledger.charge(job.project_id, service);
        job.cost_micros += cost;
        metrics::record_cost(service.as_str(), cost);

        self.audit.emit(CallRecord {
            service: service.as_str().to_string(),
            job_id: job.id,
            timestamp: Utc::now(),
            success: result.is_ok(),
            latency_ms,
            cost_micros: cost,
        });

        result
    }

    fn connector_err(stage: Stage, source: ConnectorError) -> EnrichError {
        EnrichError::Connector {
            stage: stage.as_str().to_string(),
            source,
        }
    }

    /// Stage 1: enrich the seed itself. Registry lookup when a tax id is
    /// known, site discovery via search when not, then contact validation
    /// and quality rescoring.
    async fn stage_cliente(&self, job: &mut EnrichmentJob, seed: &mut Entity) -> Result<()> {
        if let Some(cnpj) = seed.tax_id.clone() {
            let registry = Arc::clone(&self.connectors.registry);
            let lookup = self
                .call(job, Service::Registry, || async move {
                    registry.lookup(&cnpj).await
                })
                .await;

            match lookup {
                Ok(data) => {
                    // registry names: fantasia fills a blank display name,
                    // razão social is kept alongside it
                    if seed.name.trim().is_empty() {
                        seed.name = data
                            .trade_name
                            .clone()
                            .unwrap_or_else(|| data.legal_name.clone());
                    }
                    if seed.legal_name.is_none() {
                        seed.legal_name = Some(data.legal_name);
                    }
                    if seed.email.is_none() {
                        seed.email = data.email;
                    }
                    if seed.phone.is_none() {
                        seed.phone = data.phone;
                    }
                    if seed.city.is_none() {
                        seed.city = data.city;
                    }
                    if seed.state.is_none() {
                        seed.state = data.state;
                    }
                    if seed.sector.is_none() {
                        seed.sector = data.activity;
                    }
                }
                // a valid id missing from the registry is tolerable; the
                // seed just stays at whatever quality its fields support
                Err(ConnectorError::NotFound { query }) => {
                    warn!(%query, "tax id not in registry, continuing without registration data");
                }
                Err(err) => return Err(Self::connector_err(Stage::Cliente, err)),
            }
        } else if seed.site.is_none() {
            let search = Arc::clone(&self.connectors.search);
            let query = format!("{} site oficial", seed.name);
            let location = seed.city.clone();
            let hits = self
                .call(job, Service::Search, || async move {
                    search.search(&query, location.as_deref()).await
                })
                .await
                .map_err(|e| Self::connector_err(Stage::Cliente, e))?;

            seed.site = hits.into_iter().find_map(|h| h.site);
        }

        seed.rescore();
        self.entities.update(seed.clone()).await?;
        Ok(())
    }

    /// Stage 2: discover markets via the structured generator. The budget
    /// ceiling is checked first; a denied call never reaches the connector.
    async fn stage_mercado(&self, job: &mut EnrichmentJob, seed: &Entity) -> Result<()> {
        let ceiling = self.config.budget_ceiling_micros;
        if self
            .ledger
            .would_exceed(job.project_id, Service::Generator, ceiling)
        {
            metrics::record_budget_denial();
            return Err(EnrichError::BudgetExceeded {
                spent_micros: self.ledger.spent(job.project_id),
                ceiling_micros: ceiling,
            });
        }

        // leads must not repeat competitors the project already knows
        let known_competitors: Vec<String> = self
            .entities
            .list(job.project_id, EntityKind::Competitor)
            .await?
            .into_iter()
            .map(|e| e.name)
            .collect();

        let seed_company = SeedCompany {
            name: seed.name.clone(),
            tax_id: seed.tax_id.clone(),
            sector: seed.sector.clone(),
            city: seed.city.clone(),
            state: seed.state.clone(),
            segmentation: seed.segmentation,
            size: seed.size,
        };
        let options = DiscoveryOptions {
            competitors_per_market: self.config.competitors_per_market,
            leads_per_market: self.config.leads_per_market,
            exclude_names: known_competitors,
        };

        let generator = Arc::clone(&self.connectors.generator);
        let markets = self
            .call(job, Service::Generator, || async move {
                generator.discover(&seed_company, &options).await
            })
            .await
            .map_err(|e| Self::connector_err(Stage::Mercado, e))?;

        for market in &markets {
            let entity = Entity::new(
                job.project_id,
                EntityKind::Market,
                market.name.clone(),
                None,
                Provenance::enrichment(job.id, 80),
            );
            let outcome = self.entities.insert(entity).await?;
            metrics::record_persist(EntityKind::Market.as_str(), !outcome.was_inserted());
            job.result.market_ids.push(outcome.entity_id());
        }

        job.result.markets = markets;
        Ok(())
    }

    /// Stage 3: persist products nested in the discovery bundle
    async fn stage_produtos(&self, job: &mut EnrichmentJob) -> Result<()> {
        let products: Vec<_> = job
            .result
            .markets
            .iter()
            .flat_map(|m| m.products.iter().cloned())
            .collect();

        for product in products {
            let entity = Entity::new(
                job.project_id,
                EntityKind::Product,
                product.name,
                None,
                Provenance::enrichment(job.id, 80),
            );
            let outcome = self.entities.insert(entity).await?;
            metrics::record_persist(EntityKind::Product.as_str(), !outcome.was_inserted());
            job.result.product_ids.push(outcome.entity_id());
        }
        Ok(())
    }

    /// Stage 4: persist competitors, deduplicated against existing entities
    async fn stage_concorrentes(&self, job: &mut EnrichmentJob) -> Result<()> {
        let companies: Vec<DiscoveredCompany> = job
            .result
            .markets
            .iter()
            .flat_map(|m| m.competitors.iter().cloned())
            .collect();

        for company in companies {
            let outcome = self
                .persist_company(job.project_id, job.id, EntityKind::Competitor, company)
                .await?;
            job.result.competitor_ids.push(outcome.entity_id());
        }
        Ok(())
    }

    /// Stage 5: persist leads, deduplicated against existing entities
    async fn stage_leads(&self, job: &mut EnrichmentJob) -> Result<()> {
        let companies: Vec<DiscoveredCompany> = job
            .result
            .markets
            .iter()
            .flat_map(|m| m.leads.iter().cloned())
            .collect();

        for company in companies {
            let outcome = self
                .persist_company(job.project_id, job.id, EntityKind::Lead, company)
                .await?;
            job.result.lead_ids.push(outcome.entity_id());
        }
        Ok(())
    }

    /// Map a generator-discovered company onto an entity and insert it.
    /// A syntactically invalid tax id from the generator is dropped rather
    /// than rejected; the record then carries the inexact name-based hash.
    async fn persist_company(
        &self,
        project_id: Uuid,
        job_id: Uuid,
        kind: EntityKind,
        company: DiscoveredCompany,
    ) -> Result<crate::store::InsertOutcome> {
        let tax_id = company.tax_id.as_deref().and_then(|raw| {
            Cnpj::parse(raw)
                .map_err(|e| {
                    warn!(name = %company.name, error = %e, "discarding invalid generated tax id");
                })
                .ok()
        });

        let mut entity = Entity::new(
            project_id,
            kind,
            company.name,
            tax_id,
            Provenance::enrichment(job_id, company.confidence),
        );
        entity.email = company.email;
        entity.phone = company.phone;
        entity.site = company.site;
        entity.city = company.city;
        entity.state = company.state;
        entity.size = company.size;
        entity.sector = company.sector;
        entity.rescore();

        let outcome = self.entities.insert(entity).await?;
        metrics::record_persist(kind.as_str(), !outcome.was_inserted());
        Ok(outcome)
    }
}
