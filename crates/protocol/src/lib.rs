//! # Condeval Protocol
//!
//! Shared data model for the conditional field evaluation engine:
//! field states, form data snapshots, the evaluation wire shapes, the
//! error taxonomy, and engine configuration.
//!
//! Everything here is plain data. The behavior lives in the cache,
//! form, ui, and engine crates, which all speak these types.

mod config;
mod error;
mod types;

pub use config::{ConfigOverlay, EngineConfig};
pub use error::{classify, EngineError, TransportFailure};
pub use types::{
    CacheStats, EvaluationRequest, EvaluationResult, FieldState, FieldStateMap, FormData,
    ValidationRule, WireResponse, EVALUATE_ACTION,
};
