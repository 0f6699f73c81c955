//! # Condeval Form
//!
//! Headless form model for the conditional field evaluation engine.
//!
//! The [`FormTree`] is a retained, in-memory element tree standing in
//! for the host's UI: inputs carry names, values, classes, and
//! attributes, conditional fields sit inside marker-classed wrapper
//! containers, and the tree tracks keyboard focus. Hosts mirror their
//! real UI into a tree (or render the tree out); the engine, UI
//! manager, and accessibility manager all operate on it.
//!
//! Alongside the tree live the per-field validator/sanitizer and the
//! data collector that reads the tree into a canonical [`FormData`]
//! snapshot.
//!
//! [`FormData`]: condeval_protocol::FormData

mod collector;
mod tree;
mod validator;

pub use collector::collect_form_data;
pub use tree::{
    compose_field_name, parse_field_name, Element, ElementId, ElementKind, FormTree,
    HIDDEN_CLASS, LABEL_ATTR, MARKER_CLASS, VALIDATE_ATTR,
};
pub use validator::{FieldOutcome, FieldValidator, SanitizedValue, MAX_VALUE_LEN};
