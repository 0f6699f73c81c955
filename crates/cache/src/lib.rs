//! # Condeval Cache
//!
//! Capacity-bounded LRU cache for evaluation results, keyed by an
//! order-independent fingerprint of structured values.
//!
//! Evaluation results are a pure function of their input, so entries
//! never expire by age; eviction is purely capacity-driven (byte and
//! item budgets). Every operation is total: nothing here returns an
//! error or panics on cache misses.

mod fingerprint;
mod lru;

pub use fingerprint::{canonicalize, fingerprint};
pub use lru::EvalCache;
