//! Cost and rate accounting for external connectors
//!
//! Two concerns:
//! - `CostLedger`: per-project accumulated spend in micro-USD, checked
//!   against a budget ceiling before the expensive generator calls
//! - `RateGate`: per-service token buckets; `acquire` waits until the
//!   service window has capacity before a connector call goes out

use dashmap::DashMap;
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use uuid::Uuid;

use crate::config::RateLimitConfig;

/// The external services the core talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// CNPJ registry lookup
    Registry,
    /// Company/competitor web search
    Search,
    /// LLM structured generation
    Generator,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Registry => "registry",
            Service::Search => "search",
            Service::Generator => "generator",
        }
    }

    /// Unit cost per call in micro-USD. The generator dominates spend;
    /// the public registry tier is free but rate-limited.
    pub fn unit_cost_micros(&self) -> u64 {
        match self {
            Service::Registry => 0,
            Service::Search => 1_000,   // $0.001
            Service::Generator => 15_000, // $0.015
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-project accumulated connector spend
#[derive(Default)]
pub struct CostLedger {
    spent: DashMap<Uuid, u64>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call's cost; returns the project's new total
    pub fn charge(&self, project_id: Uuid, service: Service) -> u64 {
        let mut entry = self.spent.entry(project_id).or_insert(0);
        *entry += service.unit_cost_micros();
        *entry
    }

    pub fn spent(&self, project_id: Uuid) -> u64 {
        self.spent.get(&project_id).map(|v| *v).unwrap_or(0)
    }

    /// Whether charging one more call of `service` would cross the ceiling.
    /// A ceiling of 0 disables budget enforcement.
    pub fn would_exceed(&self, project_id: Uuid, service: Service, ceiling_micros: u64) -> bool {
        if ceiling_micros == 0 {
            return false;
        }
        self.spent(project_id) + service.unit_cost_micros() > ceiling_micros
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Per-service call throttles shared by all concurrent jobs
pub struct RateGate {
    registry: DirectLimiter,
    search: DirectLimiter,
    generator: DirectLimiter,
}

impl RateGate {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            registry: Self::limiter(config.registry_per_minute),
            search: Self::limiter(config.search_per_minute),
            generator: Self::limiter(config.generator_per_minute),
        }
    }

    fn limiter(per_minute: u32) -> DirectLimiter {
        let quota = Quota::per_minute(
            NonZeroU32::new(per_minute.max(1)).expect("max(1) is non-zero"),
        );
        RateLimiter::direct(quota)
    }

    fn for_service(&self, service: Service) -> &DirectLimiter {
        match service {
            Service::Registry => &self.registry,
            Service::Search => &self.search,
            Service::Generator => &self.generator,
        }
    }

    /// Wait until the service window admits one more call
    pub async fn acquire(&self, service: Service) {
        self.for_service(service).until_ready().await;
    }

    /// Non-waiting probe, used by tests and health reporting
    pub fn check(&self, service: Service) -> bool {
        self.for_service(service).check().is_ok()
    }
}
