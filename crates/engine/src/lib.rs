//! # Condeval Engine
//!
//! Orchestration layer for conditional field evaluation: debounced
//! change handling, a single-flight API service with timeout and
//! cancellation, result caching keyed by form data, and application
//! of results to the form tree through the UI and accessibility
//! managers.
//!
//! ## Control flow
//!
//! ```text
//! change event ──> debounce ──> collect FormData ──> cache?
//!                                   │                 │ hit
//!                                   │ miss            └─> apply to UI
//!                                   └─> API call ─ ok ──> cache + apply
//!                                              └─ err ──> typed error + retry
//! ```
//!
//! Hosts build a [`FormTree`], pick a transport, and drive the engine
//! with [`ConditionalEngine::notify_change`] whenever the form
//! changes.
//!
//! [`FormTree`]: condeval_form::FormTree

mod api;
mod engine;
mod monitor;
mod ready;
mod state;

pub use api::{ApiService, EvaluationTransport};
pub use engine::{ConditionalEngine, EngineOptions};
pub use monitor::{MonitorSnapshot, PerformanceMonitor};
pub use ready::ReadyGate;
pub use state::StateManager;
