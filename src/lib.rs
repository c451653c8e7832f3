//! Prospecta Enrichment Core
//!
//! Market-intelligence enrichment pipeline for Brazilian B2B prospecting:
//! - Seed validation against the CNPJ registry
//! - LLM-driven discovery of markets, products, competitors and leads
//! - Identity-hash deduplication across enrichment runs
//! - Job queue with pause, resume and cancel
//! - Per-project cost accounting and rate limiting
//!
//! The crate is storage-agnostic: the surrounding CRM implements the
//! `store` traits, and `prospecta-worker` runs the bundled in-memory
//! variant for embedded and development use.

pub mod accounting;
pub mod audit;
pub mod config;
pub mod connectors;
pub mod control;
pub mod dedup;
pub mod errors;
pub mod job;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod store;
pub mod taxid;

// Re-export commonly used types
pub use config::AppConfig;
pub use control::ControlPlane;
pub use errors::{EnrichError, Result};
pub use job::{EnrichmentJob, JobStatus, Stage};
pub use model::{Entity, EntityKind};
pub use orchestrator::{Connectors, Orchestrator, RunOutcome};
pub use queue::{ControlOutcome, Scheduler};
pub use taxid::Cnpj;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
