//! Error types for the enrichment core
//!
//! Two layers of errors:
//! - `ConnectorError`: what an external data source call can produce,
//!   classified as retryable or not
//! - `EnrichError`: everything the orchestrator and scheduler can surface,
//!   including policy failures (budget, timeout)

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using EnrichError
pub type Result<T> = std::result::Result<T, EnrichError>;

/// Machine-readable error kinds, recorded on failed jobs and call records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Local validation (1xxx)
    InvalidFormat,

    // Valid request, no data (2xxx)
    NotFound,

    // Transient upstream (3xxx)
    ServiceUnavailable,

    // Credentials / configuration (4xxx)
    Unauthorized,
    ConfigError,

    // Connector output failed schema validation (5xxx)
    MalformedResponse,

    // Policy (6xxx)
    BudgetExceeded,
    Timeout,

    // Persistence boundary (7xxx)
    Storage,

    // Everything else (9xxx)
    Internal,
}

impl ErrorKind {
    /// Numeric code for dashboards and call records
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorKind::InvalidFormat => 1001,
            ErrorKind::NotFound => 2001,
            ErrorKind::ServiceUnavailable => 3001,
            ErrorKind::Unauthorized => 4001,
            ErrorKind::ConfigError => 4002,
            ErrorKind::MalformedResponse => 5001,
            ErrorKind::BudgetExceeded => 6001,
            ErrorKind::Timeout => 6002,
            ErrorKind::Storage => 7001,
            ErrorKind::Internal => 9001,
        }
    }
}

/// Errors produced by external data connectors
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("not found: {query}")]
    NotFound { query: String },

    #[error("service unavailable: {service}: {message}")]
    ServiceUnavailable { service: String, message: String },

    #[error("unauthorized: {service}")]
    Unauthorized { service: String },

    #[error("connector misconfigured: {message}")]
    Config { message: String },

    #[error("malformed response from {service}: {message}")]
    MalformedResponse { service: String, message: String },
}

impl ConnectorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            ConnectorError::NotFound { .. } => ErrorKind::NotFound,
            ConnectorError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            ConnectorError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ConnectorError::Config { .. } => ErrorKind::ConfigError,
            ConnectorError::MalformedResponse { .. } => ErrorKind::MalformedResponse,
        }
    }

    /// Transient failures are retried with backoff; everything else is not.
    /// A `MalformedResponse` gets exactly one corrective retry, handled by
    /// the generator connector itself rather than the generic retry loop.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::ServiceUnavailable { .. })
    }

    /// Auth and config failures must not be requeued by the scheduler
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConnectorError::Unauthorized { .. } | ConnectorError::Config { .. }
        )
    }

    /// Map transport-level failures from reqwest onto the taxonomy
    pub fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        if err.is_status() {
            match err.status() {
                Some(s) if s.as_u16() == 401 || s.as_u16() == 403 => {
                    return ConnectorError::Unauthorized {
                        service: service.to_string(),
                    }
                }
                Some(s) if s.as_u16() == 404 => {
                    return ConnectorError::NotFound {
                        query: service.to_string(),
                    }
                }
                _ => {}
            }
        }
        ConnectorError::ServiceUnavailable {
            service: service.to_string(),
            message: err.to_string(),
        }
    }
}

/// Top-level errors for orchestration, scheduling and persistence
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("connector failure at stage {stage}: {source}")]
    Connector {
        stage: String,
        #[source]
        source: ConnectorError,
    },

    #[error("project budget exceeded: spent {spent_micros} of {ceiling_micros} micro-USD")]
    BudgetExceeded {
        spent_micros: u64,
        ceiling_micros: u64,
    },

    #[error("job timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("job not found: {id}")]
    JobNotFound { id: String },

    #[error("entity not found: {id}")]
    EntityNotFound { id: String },

    #[error("invalid job transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl EnrichError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnrichError::Connector { source, .. } => source.kind(),
            EnrichError::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            EnrichError::Timeout { .. } => ErrorKind::Timeout,
            EnrichError::JobNotFound { .. } | EnrichError::EntityNotFound { .. } => {
                ErrorKind::NotFound
            }
            EnrichError::InvalidTransition { .. } => ErrorKind::Internal,
            EnrichError::Storage { .. } => ErrorKind::Storage,
            EnrichError::Configuration { .. } => ErrorKind::ConfigError,
            EnrichError::Serialization(_) => ErrorKind::Internal,
            EnrichError::Internal { .. } => ErrorKind::Internal,
        }
    }
}
