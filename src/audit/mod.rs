//! Call-record emission
//!
//! Every connector invocation, success or failure, produces a `CallRecord`.
//! The orchestrator must never block or fail on audit delivery, so records
//! go over an unbounded channel and a separate consumer persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// One external-service invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub service: String,
    pub job_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub latency_ms: u64,
    pub cost_micros: u64,
}

/// Sending half handed to the orchestrator
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::UnboundedSender<CallRecord>,
}

impl AuditSink {
    /// Create a sink plus the receiver a consumer task drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CallRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// A sink whose records go nowhere, for tests and embedded use
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Emit a record. A closed receiver is logged once at debug level and
    /// otherwise ignored; auditing must not take the pipeline down.
    pub fn emit(&self, record: CallRecord) {
        if self.tx.send(record).is_err() {
            tracing::debug!("audit channel closed, dropping call record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_drain() {
        let (sink, mut rx) = AuditSink::channel();
        sink.emit(CallRecord {
            service: "registry".into(),
            job_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            success: true,
            latency_ms: 42,
            cost_micros: 100,
        });

        let record = rx.recv().await.unwrap();
        assert_eq!(record.service, "registry");
        assert!(record.success);
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = AuditSink::channel();
        drop(rx);
        sink.emit(CallRecord {
            service: "search".into(),
            job_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            success: false,
            latency_ms: 7,
            cost_micros: 0,
        });
        // no panic is the assertion
    }
}
