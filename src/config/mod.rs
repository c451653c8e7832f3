//! Configuration management
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{env}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Pipeline and scheduler tunables
    pub enrichment: EnrichmentConfig,

    /// CNPJ registry connector
    pub registry: RegistryConfig,

    /// Company search connector
    pub search: SearchConfig,

    /// LLM structured generator connector
    pub generator: GeneratorConfig,

    /// Per-service rate limits
    pub rate_limit: RateLimitConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrichmentConfig {
    /// Maximum jobs in `running` state per project
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Per-project connector spend ceiling in micro-USD (0 disables)
    #[serde(default = "default_budget_ceiling")]
    pub budget_ceiling_micros: u64,

    /// Hard deadline for one job run; elapsed runs fail with a timeout
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// How often the worker drains the queue
    #[serde(default = "default_drain_interval")]
    pub drain_interval_secs: u64,

    /// How many competitors to request per market
    #[serde(default = "default_companies_per_market")]
    pub competitors_per_market: usize,

    /// How many leads to request per market
    #[serde(default = "default_companies_per_market")]
    pub leads_per_market: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub base_url: String,

    /// Optional; the public registry tier needs none
    pub api_key: Option<String>,

    #[serde(default = "default_connector_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub base_url: String,

    pub api_key: Option<String>,

    #[serde(default = "default_connector_timeout")]
    pub timeout_secs: u64,

    /// Maximum hits to keep per query
    #[serde(default = "default_search_limit")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_generator_url")]
    pub base_url: String,

    pub api_key: Option<String>,

    #[serde(default = "default_generator_model")]
    pub model: String,

    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient failures (the corrective retry on malformed
    /// output is separate and always exactly one)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Registry lookups per minute (public tier is tight)
    #[serde(default = "default_registry_rpm")]
    pub registry_per_minute: u32,

    /// Search queries per minute
    #[serde(default = "default_search_rpm")]
    pub search_per_minute: u32,

    /// Generator calls per minute
    #[serde(default = "default_generator_rpm")]
    pub generator_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus exporter port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_concurrency_limit() -> usize { 3 }
fn default_budget_ceiling() -> u64 { 5_000_000 } // $5.00 per project
fn default_job_timeout() -> u64 { 600 }
fn default_drain_interval() -> u64 { 10 }
fn default_companies_per_market() -> usize { 10 }
fn default_registry_url() -> String { "https://receitaws.com.br/v1".to_string() }
fn default_search_url() -> String { "https://google.serper.dev".to_string() }
fn default_generator_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_generator_model() -> String { "gpt-4o-mini".to_string() }
fn default_connector_timeout() -> u64 { 15 }
fn default_generator_timeout() -> u64 { 60 }
fn default_search_limit() -> usize { 10 }
fn default_max_retries() -> u32 { 2 }
fn default_registry_rpm() -> u32 { 3 }
fn default_search_rpm() -> u32 { 60 }
fn default_generator_rpm() -> u32 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "prospecta".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__ENRICHMENT__CONCURRENCY_LIMIT=5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment.job_timeout_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.enrichment.drain_interval_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enrichment: EnrichmentConfig {
                concurrency_limit: default_concurrency_limit(),
                budget_ceiling_micros: default_budget_ceiling(),
                job_timeout_secs: default_job_timeout(),
                drain_interval_secs: default_drain_interval(),
                competitors_per_market: default_companies_per_market(),
                leads_per_market: default_companies_per_market(),
            },
            registry: RegistryConfig {
                base_url: default_registry_url(),
                api_key: None,
                timeout_secs: default_connector_timeout(),
            },
            search: SearchConfig {
                base_url: default_search_url(),
                api_key: None,
                timeout_secs: default_connector_timeout(),
                max_results: default_search_limit(),
            },
            generator: GeneratorConfig {
                base_url: default_generator_url(),
                api_key: None,
                model: default_generator_model(),
                timeout_secs: default_generator_timeout(),
                max_retries: default_max_retries(),
            },
            rate_limit: RateLimitConfig {
                registry_per_minute: default_registry_rpm(),
                search_per_minute: default_search_rpm(),
                generator_per_minute: default_generator_rpm(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}
