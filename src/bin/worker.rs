//! Prospecta Enrichment Worker
//!
//! Long-running worker process:
//! 1. Drains the job queue on an interval
//! 2. Runs enrichment pipelines against the live connectors
//! 3. Persists call records from the audit channel
//! 4. Exposes Prometheus metrics

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use prospecta::accounting::{CostLedger, RateGate};
use prospecta::audit::AuditSink;
use prospecta::connectors::{OpenAiGenerator, ReceitaClient, SerperClient};
use prospecta::metrics::{register_metrics, CONNECTOR_BUCKETS};
use prospecta::store::{EntityStore, JobStore, MemoryStore};
use prospecta::{AppConfig, Connectors, ControlPlane, Orchestrator, Scheduler, VERSION};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(&config);
    info!("Starting Prospecta enrichment worker v{}", VERSION);

    if config.observability.metrics_port > 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
        register_metrics();
    }

    let store = Arc::new(MemoryStore::new());
    let control = Arc::new(ControlPlane::new());
    let ledger = Arc::new(CostLedger::new());
    let gate = Arc::new(RateGate::new(&config.rate_limit));

    // Audit records are drained off the pipeline's critical path
    let (audit, mut audit_rx) = AuditSink::channel();
    tokio::spawn(async move {
        while let Some(record) = audit_rx.recv().await {
            info!(
                target: "prospecta::audit",
                service = %record.service,
                job_id = %record.job_id,
                success = record.success,
                latency_ms = record.latency_ms,
                cost_micros = record.cost_micros,
                "connector call"
            );
        }
    });

    let connectors = Connectors {
        registry: Arc::new(ReceitaClient::new(&config.registry)),
        search: Arc::new(SerperClient::new(&config.search)),
        generator: Arc::new(OpenAiGenerator::new(&config.generator)),
    };

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone() as Arc<dyn EntityStore>,
        store.clone() as Arc<dyn JobStore>,
        Arc::clone(&control),
        ledger,
        gate,
        audit,
        connectors,
        config.enrichment.clone(),
    ));

    let scheduler = Scheduler::new(
        orchestrator,
        store as Arc<dyn JobStore>,
        control,
        config.enrichment.clone(),
    );

    info!(
        drain_interval_secs = config.enrichment.drain_interval_secs,
        concurrency_limit = config.enrichment.concurrency_limit,
        "Worker ready, starting queue polling"
    );

    let mut ticker = tokio::time::interval(config.drain_interval());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = ticker.tick() => {
                match scheduler.drain().await {
                    Ok(0) => {}
                    Ok(dispatched) => info!(dispatched, "dispatched jobs"),
                    Err(e) => error!(error = %e, "queue drain failed"),
                }
            }
        }
    }

    info!(
        in_flight = scheduler.in_flight_count(),
        "Enrichment worker shutting down"
    );
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));

    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            CONNECTOR_BUCKETS,
        )?
        .install()?;
    info!(port, "Prometheus exporter listening");
    Ok(())
}
