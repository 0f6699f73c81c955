use crate::monitor::PerformanceMonitor;
use async_trait::async_trait;
use condeval_protocol::{
    classify, EngineError, EvaluationRequest, EvaluationResult, TransportFailure, WireResponse,
};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Opaque remote evaluation call. Hosts implement this over whatever
/// transport and serialization they use; the engine only sees the
/// wire shape or a transport failure.
#[async_trait]
pub trait EvaluationTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        request: &EvaluationRequest,
    ) -> Result<WireResponse, TransportFailure>;
}

/// Single-flight evaluation client: at most one call outstanding, a
/// timeout raced against the transport, and cancellation that
/// discards any late response.
///
/// `evaluate_conditions` never panics and always resolves to an
/// [`EvaluationResult`]; failures are values, not exceptions.
pub struct ApiService {
    transport: Arc<dyn EvaluationTransport>,
    endpoint: String,
    timeout: Duration,
    in_progress: AtomicBool,
    /// Bumped by cancellation; a call only applies its outcome when
    /// the generation it started under is still current.
    generation: AtomicU64,
    monitor: Arc<PerformanceMonitor>,
}

impl ApiService {
    pub fn new(
        transport: Arc<dyn EvaluationTransport>,
        endpoint: impl Into<String>,
        timeout: Duration,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            timeout,
            in_progress: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            monitor,
        }
    }

    pub async fn evaluate_conditions(&self, request: &EvaluationRequest) -> EvaluationResult {
        // The generation is captured before the flag is taken; a
        // cancellation landing between the two still invalidates this
        // call at the comparison below.
        let generation = self.generation.load(Ordering::SeqCst);
        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!("evaluation overlap rejected by single-flight guard");
            return EvaluationResult::err(EngineError::EvaluationInProgress);
        }
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.timeout, self.transport.send(&self.endpoint, request))
            .await;
        let duration = started.elapsed();

        let result = match outcome {
            Ok(Ok(wire)) => normalize(wire),
            Ok(Err(failure)) => EvaluationResult::err(classify(&failure)),
            Err(_elapsed) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                EvaluationResult::err(classify(&TransportFailure::Timeout { timeout_ms }))
            }
        };

        // Every completed attempt is one metric sample.
        self.monitor.record(duration, result.success);

        if self.generation.load(Ordering::SeqCst) != generation {
            // Cancelled mid-flight: the next cycle owns the flag now,
            // and this outcome must never reach the UI.
            debug!("discarding evaluation outcome superseded by cancellation");
            return EvaluationResult::discarded();
        }
        self.in_progress.store(false, Ordering::SeqCst);
        if let Some(err) = &result.error {
            warn!("evaluation failed ({}): {err}", err.code());
        }
        result
    }

    pub fn is_evaluation_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Abandon the outstanding call, if any: the in-progress flag
    /// resets immediately and the call's eventual outcome is
    /// discarded.
    pub fn cancel_evaluation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

/// Normalize the wire shape: success with fields passes through,
/// anything else is a validation failure.
fn normalize(wire: WireResponse) -> EvaluationResult {
    match (wire.success, wire.fields) {
        (true, Some(fields)) => EvaluationResult::ok(fields),
        (true, None) => EvaluationResult::err(EngineError::validation(
            "Evaluation response missing field states",
            String::new(),
        )),
        (false, _) => EvaluationResult::err(EngineError::validation(
            wire.message.unwrap_or_else(|| "Evaluation failed".to_string()),
            String::new(),
        )),
    }
}
