//! External data connectors
//!
//! Three capabilities behind trait seams so the orchestrator can be tested
//! against scripted doubles:
//! - `RegistryLookup`: CNPJ registry resolution (validate)
//! - `CompanySearch`: free-text company search (search)
//! - `MarketDiscovery`: LLM structured generation (generate)
//!
//! Transient failures are retried here with exponential backoff; auth and
//! config failures are surfaced immediately so the orchestrator fails the
//! job without requeueing.

pub mod generator;
pub mod registry;
pub mod search;

pub use generator::OpenAiGenerator;
pub use registry::ReceitaClient;
pub use search::SerperClient;

use crate::errors::ConnectorError;
use crate::job::DiscoveredMarket;
use crate::model::{CompanySize, Segmentation};
use crate::taxid::Cnpj;
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Normalized company registration data from the CNPJ registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationData {
    pub cnpj: Cnpj,
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Primary CNAE activity description
    pub activity: Option<String>,
}

/// One ranked company search result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub site: Option<String>,
    pub snippet: Option<String>,
    pub source: String,
    pub position: usize,
}

/// Seed attributes fed to the structured generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCompany {
    pub name: String,
    pub tax_id: Option<Cnpj>,
    pub sector: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub segmentation: Option<Segmentation>,
    pub size: Option<CompanySize>,
}

/// Generation knobs, project configuration plus per-run exclusions
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub competitors_per_market: usize,
    pub leads_per_market: usize,
    /// Company names leads must not repeat (already-known competitors)
    pub exclude_names: Vec<String>,
}

#[async_trait]
pub trait RegistryLookup: Send + Sync {
    async fn lookup(&self, cnpj: &Cnpj) -> ConnectorResult<RegistrationData>;
}

#[async_trait]
pub trait CompanySearch: Send + Sync {
    /// Empty result list is a valid outcome, not an error
    async fn search(&self, query: &str, location: Option<&str>)
        -> ConnectorResult<Vec<SearchHit>>;
}

#[async_trait]
pub trait MarketDiscovery: Send + Sync {
    /// One call yields the full graph: markets with nested products,
    /// competitors and leads
    async fn discover(
        &self,
        seed: &SeedCompany,
        options: &DiscoveryOptions,
    ) -> ConnectorResult<Vec<DiscoveredMarket>>;
}

/// Bounded-retry backoff policy for one connector call sequence
fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(100),
        multiplier: 2.0,
        max_interval: Duration::from_secs(2),
        // attempts are bounded by count in with_retry, not elapsed time
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    }
}

/// Run `op`, retrying transient failures up to `max_retries` extra attempts
/// with exponential backoff. Non-retryable errors pass through untouched.
pub async fn with_retry<T, F, Fut>(
    service: &str,
    max_retries: u32,
    mut op: F,
) -> ConnectorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ConnectorResult<T>>,
{
    // atomic so the retry future stays Send; connector calls run inside
    // spawned job tasks
    let attempts = AtomicU32::new(0);

    backoff::future::retry(retry_policy(), || {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        let fut = op();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    tracing::warn!(
                        service,
                        attempt = attempt + 1,
                        error = %err,
                        "transient connector failure, retrying"
                    );
                    Err(backoff::Error::transient(err))
                }
                Err(err) => Err(backoff::Error::permanent(err)),
            }
        }
    })
    .await
}
