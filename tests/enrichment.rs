//! End-to-end pipeline tests against scripted connectors

use async_trait::async_trait;
use prospecta::accounting::{CostLedger, RateGate, Service};
use prospecta::audit::AuditSink;
use prospecta::config::{AppConfig, EnrichmentConfig, RateLimitConfig};
use prospecta::connectors::{
    CompanySearch, ConnectorResult, DiscoveryOptions, MarketDiscovery, RegistrationData,
    RegistryLookup, SearchHit, SeedCompany,
};
use prospecta::control::{ControlPlane, Signal};
use prospecta::errors::{ConnectorError, ErrorKind};
use prospecta::job::{DiscoveredCompany, DiscoveredMarket, DiscoveredProduct, Stage};
use prospecta::model::{Entity, EntityKind, Provenance, QualityTier};
use prospecta::store::{EntityStore, JobStore, MemoryStore};
use prospecta::{
    Cnpj, Connectors, EnrichmentJob, JobStatus, Orchestrator, RunOutcome,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const SEED_CNPJ: &str = "11222333000181";
const AEGEA_CNPJ: &str = "33000167000101";
const AMBEV_CNPJ: &str = "60701190000104";
const SOLVI_CNPJ: &str = "47960950000121";
const GERDAU_CNPJ: &str = "18236120000158";

struct ScriptedRegistry {
    calls: AtomicU32,
}

impl ScriptedRegistry {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RegistryLookup for ScriptedRegistry {
    async fn lookup(&self, cnpj: &Cnpj) -> ConnectorResult<RegistrationData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RegistrationData {
            cnpj: cnpj.clone(),
            legal_name: "VEOLIA BRASIL SERVICOS AMBIENTAIS LTDA".into(),
            trade_name: Some("Veolia".into()),
            email: Some("contato@veolia.com.br".into()),
            phone: Some("(11) 3888-9000".into()),
            city: Some("São Paulo".into()),
            state: Some("SP".into()),
            activity: Some("Tratamento e disposição de resíduos".into()),
        })
    }
}

struct ScriptedSearch {
    calls: AtomicU32,
}

impl ScriptedSearch {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CompanySearch for ScriptedSearch {
    async fn search(
        &self,
        query: &str,
        _location: Option<&str>,
    ) -> ConnectorResult<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchHit {
            name: query.to_string(),
            site: Some("https://www.veolia.com.br".into()),
            snippet: None,
            source: "search".into(),
            position: 1,
        }])
    }
}

enum GeneratorMode {
    Ok,
    Unauthorized,
}

/// Generator double that can raise a control signal mid-call, so tests can
/// exercise signals landing while a connector call is in flight
struct ScriptedGenerator {
    calls: AtomicU32,
    mode: GeneratorMode,
    bundle: Vec<DiscoveredMarket>,
    last_options: Mutex<Option<DiscoveryOptions>>,
    signal_on_first_call: Option<(Arc<ControlPlane>, Uuid, Signal)>,
}

impl ScriptedGenerator {
    fn ok(bundle: Vec<DiscoveredMarket>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            mode: GeneratorMode::Ok,
            bundle,
            last_options: Mutex::new(None),
            signal_on_first_call: None,
        }
    }

    fn unauthorized() -> Self {
        Self {
            calls: AtomicU32::new(0),
            mode: GeneratorMode::Unauthorized,
            bundle: Vec::new(),
            last_options: Mutex::new(None),
            signal_on_first_call: None,
        }
    }

    fn with_signal(mut self, control: Arc<ControlPlane>, job_id: Uuid, signal: Signal) -> Self {
        self.signal_on_first_call = Some((control, job_id, signal));
        self
    }
}

#[async_trait]
impl MarketDiscovery for ScriptedGenerator {
    async fn discover(
        &self,
        _seed: &SeedCompany,
        options: &DiscoveryOptions,
    ) -> ConnectorResult<Vec<DiscoveredMarket>> {
        let first = self.calls.fetch_add(1, Ordering::SeqCst) == 0;
        *self.last_options.lock().unwrap() = Some(options.clone());

        if first {
            if let Some((control, job_id, signal)) = &self.signal_on_first_call {
                control.set(*job_id, *signal);
            }
        }

        match self.mode {
            GeneratorMode::Ok => Ok(self.bundle.clone()),
            GeneratorMode::Unauthorized => Err(ConnectorError::Unauthorized {
                service: "generator".into(),
            }),
        }
    }
}

fn company(name: &str, cnpj: &str) -> DiscoveredCompany {
    DiscoveredCompany {
        name: name.to_string(),
        tax_id: Some(cnpj.to_string()),
        site: None,
        email: None,
        phone: None,
        city: Some("São Paulo".into()),
        state: Some("SP".into()),
        size: None,
        sector: None,
        confidence: 75,
    }
}

fn veolia_bundle() -> Vec<DiscoveredMarket> {
    vec![
        DiscoveredMarket {
            name: "Saneamento Industrial".into(),
            category: Some("Infraestrutura".into()),
            segmentation: None,
            estimated_size: Some("R$ 12 bi".into()),
            annual_growth: Some("6% a.a.".into()),
            products: vec![
                DiscoveredProduct {
                    name: "Tratamento de efluentes".into(),
                    description: None,
                },
                DiscoveredProduct {
                    name: "Reúso de água".into(),
                    description: None,
                },
            ],
            competitors: vec![company("Aegea Saneamento", AEGEA_CNPJ)],
            leads: vec![company("Ambev", AMBEV_CNPJ)],
        },
        DiscoveredMarket {
            name: "Gestão de Resíduos".into(),
            category: Some("Meio ambiente".into()),
            segmentation: None,
            estimated_size: None,
            annual_growth: None,
            products: vec![
                DiscoveredProduct {
                    name: "Coleta seletiva".into(),
                    description: None,
                },
                DiscoveredProduct {
                    name: "Logística reversa".into(),
                    description: None,
                },
            ],
            competitors: vec![company("Solví Essencis", SOLVI_CNPJ)],
            leads: vec![company("Gerdau", GERDAU_CNPJ)],
        },
    ]
}

struct Harness {
    store: Arc<MemoryStore>,
    control: Arc<ControlPlane>,
    ledger: Arc<CostLedger>,
    orchestrator: Orchestrator,
    project: Uuid,
}

fn harness(
    registry: Arc<ScriptedRegistry>,
    search: Arc<ScriptedSearch>,
    generator: Arc<ScriptedGenerator>,
    config: EnrichmentConfig,
    control: Arc<ControlPlane>,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(CostLedger::new());
    // generous quotas: these tests exercise the pipeline, not throttling
    let gate = Arc::new(RateGate::new(&RateLimitConfig {
        registry_per_minute: 1000,
        search_per_minute: 1000,
        generator_per_minute: 1000,
    }));

    let orchestrator = Orchestrator::new(
        store.clone() as Arc<dyn EntityStore>,
        store.clone() as Arc<dyn JobStore>,
        Arc::clone(&control),
        Arc::clone(&ledger),
        gate,
        AuditSink::disabled(),
        Connectors {
            registry,
            search,
            generator,
        },
        config,
    );

    Harness {
        store,
        control,
        ledger,
        orchestrator,
        project: Uuid::new_v4(),
    }
}

async fn seed_client(h: &Harness, tax_id: Option<Cnpj>) -> Uuid {
    let entity = Entity::new(
        h.project,
        EntityKind::Client,
        "Veolia",
        tax_id,
        Provenance::manual(),
    );
    h.store.insert(entity).await.unwrap().entity_id()
}

async fn enqueue(h: &Harness, entity_id: Uuid) -> Uuid {
    let job = EnrichmentJob::new(h.project, entity_id);
    let id = job.id;
    h.store.create(job).await.unwrap();
    id
}

async fn count(h: &Harness, kind: EntityKind) -> usize {
    h.store.list(h.project, kind).await.unwrap().len()
}

#[tokio::test]
async fn test_full_pipeline_persists_discovery_graph() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let generator = Arc::new(ScriptedGenerator::ok(veolia_bundle()));
    let control = Arc::new(ControlPlane::new());
    let h = harness(
        registry.clone(),
        search.clone(),
        generator.clone(),
        AppConfig::default().enrichment,
        control,
    );

    let entity_id = seed_client(&h, Some(Cnpj::parse(SEED_CNPJ).unwrap())).await;
    let job_id = enqueue(&h, entity_id).await;

    let outcome = h.orchestrator.run(job_id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let job = h.store.load_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert!(job.error.is_none());

    // one registry lookup, one generator call, no search (tax id known)
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(search.calls.load(Ordering::SeqCst), 0);

    assert_eq!(count(&h, EntityKind::Market).await, 2);
    assert_eq!(count(&h, EntityKind::Product).await, 4);
    assert_eq!(count(&h, EntityKind::Competitor).await, 2);
    assert_eq!(count(&h, EntityKind::Lead).await, 2);

    assert_eq!(job.result.market_ids.len(), 2);
    assert_eq!(job.result.product_ids.len(), 4);
    assert_eq!(job.result.competitor_ids.len(), 2);
    assert_eq!(job.result.lead_ids.len(), 2);

    let competitor_names: Vec<String> = h
        .store
        .list(h.project, EntityKind::Competitor)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(
        competitor_names,
        vec!["Aegea Saneamento".to_string(), "Solví Essencis".to_string()]
    );

    // registration data merged into the seed and rescored
    let seed = h.store.load(entity_id).await.unwrap().unwrap();
    assert_eq!(
        seed.legal_name.as_deref(),
        Some("VEOLIA BRASIL SERVICOS AMBIENTAIS LTDA")
    );
    assert_eq!(seed.name, "Veolia");
    assert_eq!(seed.email.as_deref(), Some("contato@veolia.com.br"));
    assert_eq!(seed.phone.as_deref(), Some("(11) 3888-9000"));
    assert_eq!(seed.state.as_deref(), Some("SP"));
    assert_eq!(seed.quality_score, 40);
    assert_eq!(seed.quality_tier, QualityTier::Low);

    // registry is free, the generator call is the whole bill
    assert_eq!(job.cost_micros, Service::Generator.unit_cost_micros());
    assert_eq!(h.ledger.spent(h.project), Service::Generator.unit_cost_micros());
}

#[tokio::test]
async fn test_second_run_deduplicates_everything() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let generator = Arc::new(ScriptedGenerator::ok(veolia_bundle()));
    let control = Arc::new(ControlPlane::new());
    let h = harness(
        registry.clone(),
        search,
        generator.clone(),
        AppConfig::default().enrichment,
        control,
    );

    let entity_id = seed_client(&h, Some(Cnpj::parse(SEED_CNPJ).unwrap())).await;

    let first_job = enqueue(&h, entity_id).await;
    h.orchestrator.run(first_job).await.unwrap();

    let second_job = enqueue(&h, entity_id).await;
    h.orchestrator.run(second_job).await.unwrap();

    // connectors ran again, but every insert hit the identity index
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(count(&h, EntityKind::Market).await, 2);
    assert_eq!(count(&h, EntityKind::Product).await, 4);
    assert_eq!(count(&h, EntityKind::Competitor).await, 2);
    assert_eq!(count(&h, EntityKind::Lead).await, 2);

    // skipped duplicates still resolve to the original entity ids
    let first = h.store.load_job(first_job).await.unwrap().unwrap();
    let second = h.store.load_job(second_job).await.unwrap().unwrap();
    assert_eq!(first.result.market_ids, second.result.market_ids);
    assert_eq!(first.result.competitor_ids, second.result.competitor_ids);
    assert_eq!(first.result.lead_ids, second.result.lead_ids);

    // competitors from the first run are excluded from the second prompt
    let options = generator.last_options.lock().unwrap().clone().unwrap();
    assert!(options.exclude_names.contains(&"Aegea Saneamento".to_string()));
    assert!(options.exclude_names.contains(&"Solví Essencis".to_string()));
}

#[tokio::test]
async fn test_registry_names_fill_blank_seed_name() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let generator = Arc::new(ScriptedGenerator::ok(veolia_bundle()));
    let control = Arc::new(ControlPlane::new());
    let h = harness(
        registry,
        search,
        generator,
        AppConfig::default().enrichment,
        control,
    );

    // imported seed with a tax id but no usable display name
    let entity = Entity::new(
        h.project,
        EntityKind::Client,
        "  ",
        Some(Cnpj::parse(SEED_CNPJ).unwrap()),
        Provenance::manual(),
    );
    let entity_id = h.store.insert(entity).await.unwrap().entity_id();
    let job_id = enqueue(&h, entity_id).await;

    h.orchestrator.run(job_id).await.unwrap();

    // nome fantasia becomes the display name, razão social sits beside it
    let seed = h.store.load(entity_id).await.unwrap().unwrap();
    assert_eq!(seed.name, "Veolia");
    assert_eq!(
        seed.legal_name.as_deref(),
        Some("VEOLIA BRASIL SERVICOS AMBIENTAIS LTDA")
    );
}

#[tokio::test]
async fn test_seed_without_tax_id_uses_search() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let generator = Arc::new(ScriptedGenerator::ok(veolia_bundle()));
    let control = Arc::new(ControlPlane::new());
    let h = harness(
        registry.clone(),
        search.clone(),
        generator,
        AppConfig::default().enrichment,
        control,
    );

    let entity_id = seed_client(&h, None).await;
    let job_id = enqueue(&h, entity_id).await;

    let outcome = h.orchestrator.run(job_id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    assert_eq!(registry.calls.load(Ordering::SeqCst), 0);
    assert_eq!(search.calls.load(Ordering::SeqCst), 1);

    let seed = h.store.load(entity_id).await.unwrap().unwrap();
    assert_eq!(seed.site.as_deref(), Some("https://www.veolia.com.br"));
}

#[tokio::test]
async fn test_pause_suspends_and_resume_skips_completed_stages() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let control = Arc::new(ControlPlane::new());

    let store_harness = |generator: Arc<ScriptedGenerator>| {
        harness(
            registry.clone(),
            search.clone(),
            generator,
            AppConfig::default().enrichment,
            Arc::clone(&control),
        )
    };

    // pre-create the job so the generator double can target it
    let placeholder = Arc::new(ScriptedGenerator::ok(veolia_bundle()));
    let h = store_harness(placeholder);
    let entity_id = seed_client(&h, Some(Cnpj::parse(SEED_CNPJ).unwrap())).await;
    let job_id = enqueue(&h, entity_id).await;

    let generator = Arc::new(ScriptedGenerator::ok(veolia_bundle()).with_signal(
        Arc::clone(&h.control),
        job_id,
        Signal::Pause,
    ));
    let h = Harness {
        orchestrator: Orchestrator::new(
            h.store.clone() as Arc<dyn EntityStore>,
            h.store.clone() as Arc<dyn JobStore>,
            Arc::clone(&h.control),
            Arc::clone(&h.ledger),
            Arc::new(RateGate::new(&RateLimitConfig {
                registry_per_minute: 1000,
                search_per_minute: 1000,
                generator_per_minute: 1000,
            })),
            AuditSink::disabled(),
            Connectors {
                registry: registry.clone(),
                search: search.clone(),
                generator: generator.clone(),
            },
            AppConfig::default().enrichment,
        ),
        ..h
    };

    // pause lands during the generator call; the call still completes and
    // the job parks at the next stage boundary
    let outcome = h.orchestrator.run(job_id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Suspended);

    let job = h.store.load_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Paused);
    assert_eq!(job.progress, 40);
    assert!(job.is_stage_done(Stage::Mercado));
    assert!(!job.is_stage_done(Stage::Produtos));
    assert_eq!(count(&h, EntityKind::Market).await, 2);
    assert_eq!(count(&h, EntityKind::Competitor).await, 0);

    // resume clears the signal; the rerun replays from stage three without
    // touching the connectors again
    h.control.clear(job_id);
    let outcome = h.orchestrator.run(job_id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let job = h.store.load_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.progress, 100);
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(count(&h, EntityKind::Competitor).await, 2);
    assert_eq!(count(&h, EntityKind::Lead).await, 2);
}

#[tokio::test]
async fn test_cancel_keeps_entities_from_completed_stages() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let control = Arc::new(ControlPlane::new());

    let placeholder = Arc::new(ScriptedGenerator::ok(veolia_bundle()));
    let h = harness(
        registry.clone(),
        search.clone(),
        placeholder,
        AppConfig::default().enrichment,
        Arc::clone(&control),
    );
    let entity_id = seed_client(&h, Some(Cnpj::parse(SEED_CNPJ).unwrap())).await;
    let job_id = enqueue(&h, entity_id).await;

    let generator = Arc::new(ScriptedGenerator::ok(veolia_bundle()).with_signal(
        Arc::clone(&control),
        job_id,
        Signal::Cancel,
    ));
    let orchestrator = Orchestrator::new(
        h.store.clone() as Arc<dyn EntityStore>,
        h.store.clone() as Arc<dyn JobStore>,
        Arc::clone(&control),
        Arc::clone(&h.ledger),
        Arc::new(RateGate::new(&RateLimitConfig {
            registry_per_minute: 1000,
            search_per_minute: 1000,
            generator_per_minute: 1000,
        })),
        AuditSink::disabled(),
        Connectors {
            registry: registry.clone(),
            search: search.clone(),
            generator: generator.clone(),
        },
        AppConfig::default().enrichment,
    );

    let outcome = orchestrator.run(job_id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);

    let job = h.store.load_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.progress, 40);

    // markets from the completed stage survive; later stages never ran
    assert_eq!(count(&h, EntityKind::Market).await, 2);
    assert_eq!(count(&h, EntityKind::Product).await, 0);
    assert_eq!(count(&h, EntityKind::Competitor).await, 0);

    // the signal is consumed, not left to affect future jobs
    assert_eq!(h.control.get(job_id, h.project), None);
}

#[tokio::test]
async fn test_budget_ceiling_blocks_generator_call() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let generator = Arc::new(ScriptedGenerator::ok(veolia_bundle()));
    let control = Arc::new(ControlPlane::new());

    let mut config = AppConfig::default().enrichment;
    config.budget_ceiling_micros = Service::Generator.unit_cost_micros() - 1;

    let h = harness(registry, search, generator.clone(), config, control);
    let entity_id = seed_client(&h, Some(Cnpj::parse(SEED_CNPJ).unwrap())).await;
    let job_id = enqueue(&h, entity_id).await;

    let outcome = h.orchestrator.run(job_id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);

    // the denied call never reached the connector
    assert_eq!(generator.calls.load(Ordering::SeqCst), 0);

    let job = h.store.load_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::BudgetExceeded);
    assert_eq!(error.stage, Some(Stage::Mercado));

    // stage one results are kept even though the job failed
    assert!(job.completed_stages.contains(&Stage::Cliente));
    assert_eq!(count(&h, EntityKind::Market).await, 0);
}

#[tokio::test]
async fn test_unauthorized_generator_fails_without_retry() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let generator = Arc::new(ScriptedGenerator::unauthorized());
    let control = Arc::new(ControlPlane::new());
    let h = harness(
        registry,
        search,
        generator.clone(),
        AppConfig::default().enrichment,
        control,
    );

    let entity_id = seed_client(&h, Some(Cnpj::parse(SEED_CNPJ).unwrap())).await;
    let job_id = enqueue(&h, entity_id).await;

    let outcome = h.orchestrator.run(job_id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);

    let job = h.store.load_job(job_id).await.unwrap().unwrap();
    let error = job.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Unauthorized);
    assert_eq!(error.stage, Some(Stage::Mercado));

    // failed calls are still billed
    assert_eq!(job.cost_micros, Service::Generator.unit_cost_micros());
}

#[tokio::test]
async fn test_backfilled_tax_id_deduplicates_next_run() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let generator = Arc::new(ScriptedGenerator::ok(veolia_bundle()));
    let control = Arc::new(ControlPlane::new());
    let h = harness(
        registry.clone(),
        search,
        generator,
        AppConfig::default().enrichment,
        control,
    );

    // first run with no tax id: the seed carries the name+nonce hash
    let entity_id = seed_client(&h, None).await;
    let first_job = enqueue(&h, entity_id).await;
    h.orchestrator.run(first_job).await.unwrap();
    assert_eq!(registry.calls.load(Ordering::SeqCst), 0);

    // the operator resolves the registration later; hash is recomputed
    let mut seed = h.store.load(entity_id).await.unwrap().unwrap();
    seed.backfill_tax_id(Cnpj::parse(SEED_CNPJ).unwrap());
    h.store.update(seed).await.unwrap();

    let second_job = enqueue(&h, entity_id).await;
    h.orchestrator.run(second_job).await.unwrap();

    // the rerun goes through the registry and re-derives everything, but
    // no entity of any kind is duplicated
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
    assert_eq!(count(&h, EntityKind::Client).await, 1);
    assert_eq!(count(&h, EntityKind::Market).await, 2);
    assert_eq!(count(&h, EntityKind::Product).await, 4);
    assert_eq!(count(&h, EntityKind::Competitor).await, 2);
    assert_eq!(count(&h, EntityKind::Lead).await, 2);
}

#[tokio::test]
async fn test_invalid_generated_tax_id_is_dropped() {
    let registry = Arc::new(ScriptedRegistry::new());
    let search = Arc::new(ScriptedSearch::new());
    let mut bundle = veolia_bundle();
    bundle[0].competitors[0].tax_id = Some("12345".into());
    let generator = Arc::new(ScriptedGenerator::ok(bundle));
    let control = Arc::new(ControlPlane::new());
    let h = harness(
        registry,
        search,
        generator,
        AppConfig::default().enrichment,
        control,
    );

    let entity_id = seed_client(&h, Some(Cnpj::parse(SEED_CNPJ).unwrap())).await;
    let job_id = enqueue(&h, entity_id).await;
    h.orchestrator.run(job_id).await.unwrap();

    let competitors = h.store.list(h.project, EntityKind::Competitor).await.unwrap();
    let aegea = competitors
        .iter()
        .find(|c| c.name == "Aegea Saneamento")
        .unwrap();
    // bad id from the generator is discarded, the record is still kept
    assert!(aegea.tax_id.is_none());

    let solvi = competitors.iter().find(|c| c.name == "Solví Essencis").unwrap();
    assert_eq!(solvi.tax_id.as_ref().unwrap().digits(), SOLVI_CNPJ);
}
