use crate::api::{ApiService, EvaluationTransport};
use crate::monitor::{MonitorSnapshot, PerformanceMonitor};
use crate::ready::ReadyGate;
use crate::state::StateManager;
use condeval_cache::{fingerprint, EvalCache};
use condeval_form::FieldValidator;
use condeval_protocol::{
    CacheStats, EngineConfig, EngineError, EvaluationRequest, FieldStateMap, FormData,
};
use condeval_ui::{AccessibilityManager, SharedTree, UiManager};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Options for constructing a [`ConditionalEngine`].
pub struct EngineOptions {
    pub endpoint: String,
    /// Opaque anti-forgery token forwarded with every request.
    pub nonce: String,
    pub config: EngineConfig,
    /// Inject a shared cache to pool results across engines; `None`
    /// gives the engine a private cache sized from the config.
    pub cache: Option<EvalCache<FieldStateMap>>,
    pub ready: ReadyGate,
}

impl EngineOptions {
    pub fn new(endpoint: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            nonce: nonce.into(),
            config: EngineConfig::default(),
            cache: None,
            ready: ReadyGate::ready_now(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: EvalCache<FieldStateMap>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_ready_gate(mut self, ready: ReadyGate) -> Self {
        self.ready = ready;
        self
    }
}

enum EngineCommand {
    /// A form change event; schedules a debounced evaluation.
    Change,
    /// The retry control was activated; evaluate immediately.
    Retry,
    Shutdown,
}

struct EngineShared {
    form_id: String,
    tree: SharedTree,
    config: EngineConfig,
    validator: FieldValidator,
    ui: UiManager,
    a11y: AccessibilityManager,
    api: ApiService,
    state: StateManager,
    monitor: Arc<PerformanceMonitor>,
    nonce: String,
    destroyed: AtomicBool,
}

/// Orchestrator for one form: listens for change events, debounces
/// them, resolves field states from the cache or the remote endpoint,
/// and applies them through the UI and accessibility managers.
///
/// One engine instance per form; created once, destroyed when the
/// form is torn down.
pub struct ConditionalEngine {
    shared: Arc<EngineShared>,
    command_tx: mpsc::Sender<EngineCommand>,
    command_rx: Mutex<Option<mpsc::Receiver<EngineCommand>>>,
    ready: ReadyGate,
}

impl ConditionalEngine {
    /// Build the engine and its collaborators. Fails synchronously
    /// with [`EngineError::FormNotFound`] when the tree is not the
    /// requested form; no other construction error is recoverable.
    pub fn new(
        tree: SharedTree,
        form_id: &str,
        transport: Arc<dyn EvaluationTransport>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        let validator = {
            let guard = tree.lock().unwrap_or_else(|e| e.into_inner());
            if guard.form_id() != form_id {
                return Err(EngineError::FormNotFound {
                    form_id: form_id.to_string(),
                });
            }
            // Declarative rules come from the field markup attributes.
            FieldValidator::from_tree(&guard)
        };

        let config = options.config;
        let monitor = Arc::new(PerformanceMonitor::new(config.enable_performance_monitoring));
        let cache = options
            .cache
            .unwrap_or_else(|| EvalCache::new(config.cache_max_items, config.cache_max_bytes));

        let shared = Arc::new(EngineShared {
            form_id: form_id.to_string(),
            tree: SharedTree::clone(&tree),
            validator,
            ui: UiManager::new(SharedTree::clone(&tree)),
            a11y: AccessibilityManager::new(SharedTree::clone(&tree)),
            api: ApiService::new(
                transport,
                options.endpoint,
                config.request_timeout,
                Arc::clone(&monitor),
            ),
            state: StateManager::new(cache),
            monitor,
            nonce: options.nonce,
            config,
            destroyed: AtomicBool::new(false),
        });

        let (command_tx, command_rx) = mpsc::channel(64);
        Ok(Self {
            shared,
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            ready: options.ready,
        })
    }

    /// Spawn the engine task: initialize the UI (hiding conditional
    /// fields before anything is evaluated), wait for the readiness
    /// gate, run the first evaluation, then serve change events until
    /// shutdown. Subsequent calls are no-ops.
    pub fn start(&self) {
        let Some(command_rx) = self.lock_rx().take() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        let ready = self.ready.clone();
        let retry_tx = self.command_tx.clone();
        shared.ui.initialize();
        shared.a11y.setup_form_landmarks();
        shared.ui.set_retry_callback(move || {
            let _ = retry_tx.try_send(EngineCommand::Retry);
        });
        tokio::spawn(run_loop(shared, ready, command_rx));
    }

    /// Feed one form change event into the debounce window.
    pub fn notify_change(&self) {
        if self.shared.destroyed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.command_tx.try_send(EngineCommand::Change);
    }

    /// Tear down: stop the task, cancel any in-flight request, and
    /// remove the injected UI nodes. Idempotent.
    pub fn destroy(&self) {
        if self.shared.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.command_tx.try_send(EngineCommand::Shutdown);
        self.shared.api.cancel_evaluation();
        self.shared.ui.destroy();
        self.shared.a11y.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    pub fn ui(&self) -> &UiManager {
        &self.shared.ui
    }

    pub fn accessibility(&self) -> &AccessibilityManager {
        &self.shared.a11y
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.state.cache_stats()
    }

    pub fn clear_cache(&self) {
        self.shared.state.clear_cache();
    }

    pub fn monitor_snapshot(&self) -> MonitorSnapshot {
        self.shared.monitor.snapshot()
    }

    fn lock_rx(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Receiver<EngineCommand>>> {
        self.command_rx.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for ConditionalEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

async fn run_loop(
    shared: Arc<EngineShared>,
    ready: ReadyGate,
    mut command_rx: mpsc::Receiver<EngineCommand>,
) {
    ready.wait().await;
    let mut cycle = EvaluationCycle::new(&shared);
    cycle.evaluate().await;

    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            command = command_rx.recv() => match command {
                Some(EngineCommand::Change) => {
                    // A fresh event restarts the quiet period; bursts
                    // collapse into the single pending deadline.
                    deadline = Some(Instant::now() + shared.config.debounce_delay);
                }
                Some(EngineCommand::Retry) => {
                    deadline = None;
                    cycle.evaluate().await;
                }
                Some(EngineCommand::Shutdown) | None => break,
            },
            () = sleep_until(deadline), if deadline.is_some() => {
                deadline = None;
                cycle.evaluate().await;
            }
        }
        if shared.destroyed.load(Ordering::SeqCst) {
            break;
        }
    }
    debug!("engine loop for form '{}' stopped", shared.form_id);
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// One form's evaluation state across cycles: tracks the fingerprint
/// of the snapshot that last failed so the retry affordance can be
/// withheld once `max_retries` is exhausted.
struct EvaluationCycle<'a> {
    shared: &'a EngineShared,
    failing_fingerprint: Option<u64>,
    attempts: u32,
}

impl<'a> EvaluationCycle<'a> {
    fn new(shared: &'a EngineShared) -> Self {
        Self {
            shared,
            failing_fingerprint: None,
            attempts: 0,
        }
    }

    async fn evaluate(&mut self) {
        let shared = self.shared;
        if shared.destroyed.load(Ordering::SeqCst) {
            return;
        }

        let form_data = {
            let tree = shared.tree.lock().unwrap_or_else(|e| e.into_inner());
            shared.state.collect_form_data(&tree, &shared.validator)
        };
        if shared.config.enable_debug_logging {
            debug!(
                "evaluating form '{}' with {} field(s)",
                shared.form_id,
                form_data.len()
            );
        }

        if let Some(fields) = shared.state.cached_result(&form_data) {
            if shared.config.enable_debug_logging {
                debug!("cache hit for form '{}'", shared.form_id);
            }
            self.apply_success(form_data, &fields);
            return;
        }

        shared.ui.show_loading();
        let request =
            EvaluationRequest::new(shared.form_id.clone(), form_data.clone(), shared.nonce.clone());
        let result = shared.api.evaluate_conditions(&request).await;
        shared.ui.hide_loading();

        if shared.destroyed.load(Ordering::SeqCst) || result.is_discarded() {
            return;
        }

        match (result.fields, result.error) {
            (Some(fields), None) => {
                shared.state.cache_result(&form_data, &fields);
                self.apply_success(form_data, &fields);
            }
            (_, Some(EngineError::EvaluationInProgress)) => {
                // Our own loop never overlaps itself; a host driving
                // the API service directly can. Nothing to apply.
                debug!("evaluation overlapped an external call; skipped");
            }
            (_, Some(err)) => self.surface_error(&form_data, &err),
            (None, None) => {}
        }
    }

    fn apply_success(&mut self, form_data: FormData, fields: &FieldStateMap) {
        let shared = self.shared;
        self.failing_fingerprint = None;
        self.attempts = 0;
        shared.state.update_last_form_data(form_data);
        shared.ui.hide_error();
        let changes = shared.ui.update_fields(fields, &shared.a11y);
        if shared.config.enable_debug_logging && !changes.is_empty() {
            debug!("applied field changes: {changes:?}");
        }
    }

    fn surface_error(&mut self, form_data: &FormData, err: &EngineError) {
        let shared = self.shared;
        let current = fingerprint(form_data);
        if self.failing_fingerprint == Some(current) {
            self.attempts += 1;
        } else {
            self.failing_fingerprint = Some(current);
            self.attempts = 1;
        }
        let offer_retry = err.is_retryable() && self.attempts <= shared.config.max_retries;
        warn!(
            "evaluation for form '{}' failed (attempt {}): {err}",
            shared.form_id, self.attempts
        );
        shared.ui.show_error(&err.to_string(), offer_retry);
        shared.a11y.announce(&err.to_string(), true);
    }
}
