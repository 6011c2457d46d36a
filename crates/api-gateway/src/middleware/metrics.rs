//! Gateway counters, exported as JSON on the admin server.

use crate::domain::error::GatewayError;
use crate::domain::request::Procedure;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Gateway metrics
#[derive(Default)]
pub struct GatewayMetrics {
    // Single-result calls
    pub calls_total: AtomicU64,
    pub calls_success: AtomicU64,
    pub queries_total: AtomicU64,
    pub publishes_total: AtomicU64,

    // Failures by outcome
    pub rejected_invalid: AtomicU64,
    pub rejected_unknown_key: AtomicU64,
    pub rejected_permission: AtomicU64,
    pub failed_upstream: AtomicU64,
    pub cancelled: AtomicU64,
    pub failed_other: AtomicU64,

    // Streaming
    pub stream_sessions: AtomicU64,
    pub stream_subscriptions: AtomicU64,
    pub stream_messages_sent: AtomicU64,
    pub stream_errors_sent: AtomicU64,

    // Registry
    pub registrations_total: AtomicU64,
    pub revocations_total: AtomicU64,

    // Latency (simplified - sum and count)
    pub total_latency_ms: AtomicU64,
    pub request_count_for_latency: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished call
    pub fn record_call(&self, proc: Procedure, outcome: Result<(), &GatewayError>, latency_ms: u64) {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
        match proc {
            Procedure::Query => {
                self.queries_total.fetch_add(1, Ordering::Relaxed);
            }
            Procedure::Publish => {
                self.publishes_total.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        match outcome {
            Ok(()) => {
                self.calls_success.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.record_error(e),
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.request_count_for_latency.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failure under its outcome
    pub fn record_error(&self, error: &GatewayError) {
        let counter = match error {
            GatewayError::InvalidRequest(_)
            | GatewayError::MalformedEntity(_)
            | GatewayError::UnsupportedPayloadType(_)
            | GatewayError::NoSuchMethod(_) => &self.rejected_invalid,
            GatewayError::UnknownKey => &self.rejected_unknown_key,
            GatewayError::PermissionDenied(_) => &self.rejected_permission,
            GatewayError::UpstreamFailure(_) | GatewayError::BusUnavailable(_) => {
                &self.failed_upstream
            }
            GatewayError::Cancelled => &self.cancelled,
            _ => &self.failed_other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_open(&self) {
        self.stream_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_close(&self) {
        self.stream_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_subscribe(&self) {
        self.stream_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unsubscribe(&self) {
        self.stream_subscriptions.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_stream_message(&self) {
        self.stream_messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_error(&self, error: &GatewayError) {
        self.stream_errors_sent.fetch_add(1, Ordering::Relaxed);
        self.record_error(error);
    }

    pub fn record_registration(&self) {
        self.registrations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revocation(&self) {
        self.revocations_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get average call latency in ms
    pub fn average_latency_ms(&self) -> f64 {
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        let count = self.request_count_for_latency.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Export metrics as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "calls": {
                "total": self.calls_total.load(Ordering::Relaxed),
                "success": self.calls_success.load(Ordering::Relaxed),
                "query": self.queries_total.load(Ordering::Relaxed),
                "publish": self.publishes_total.load(Ordering::Relaxed),
            },
            "errors": {
                "invalid": self.rejected_invalid.load(Ordering::Relaxed),
                "unknown_key": self.rejected_unknown_key.load(Ordering::Relaxed),
                "permission_denied": self.rejected_permission.load(Ordering::Relaxed),
                "upstream": self.failed_upstream.load(Ordering::Relaxed),
                "cancelled": self.cancelled.load(Ordering::Relaxed),
                "other": self.failed_other.load(Ordering::Relaxed),
            },
            "streaming": {
                "sessions": self.stream_sessions.load(Ordering::Relaxed),
                "subscriptions": self.stream_subscriptions.load(Ordering::Relaxed),
                "messages_sent": self.stream_messages_sent.load(Ordering::Relaxed),
                "errors_sent": self.stream_errors_sent.load(Ordering::Relaxed),
            },
            "registry": {
                "registrations": self.registrations_total.load(Ordering::Relaxed),
                "revocations": self.revocations_total.load(Ordering::Relaxed),
            },
            "latency": {
                "average_ms": self.average_latency_ms(),
            }
        })
    }
}

/// Call timing helper
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<GatewayMetrics>,
    proc: Procedure,
}

impl RequestTimer {
    pub fn new(metrics: Arc<GatewayMetrics>, proc: Procedure) -> Self {
        Self {
            start: Instant::now(),
            metrics,
            proc,
        }
    }

    pub fn finish<T>(self, result: &Result<T, GatewayError>) {
        let latency_ms = self.start.elapsed().as_millis() as u64;
        self.metrics
            .record_call(self.proc, result.as_ref().map(|_| ()), latency_ms);
    }
}
