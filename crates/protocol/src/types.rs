use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Action verb carried by every evaluation request.
pub const EVALUATE_ACTION: &str = "evaluate_conditions";

/// Authoritative per-field presentation state returned by the
/// evaluation endpoint. The engine never synthesizes these locally;
/// it only replays them from the endpoint or the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldState {
    pub visible: bool,
    pub required: bool,
}

impl FieldState {
    pub fn new(visible: bool, required: bool) -> Self {
        Self { visible, required }
    }

    /// Visible and optional, the neutral state.
    pub fn visible() -> Self {
        Self::new(true, false)
    }

    pub fn hidden() -> Self {
        Self::new(false, false)
    }
}

/// Field identifier -> presentation state for one form.
pub type FieldStateMap = BTreeMap<String, FieldState>;

/// Field identifier -> current string value, as read from the form
/// tree. Doubles as the cache key material and the request payload.
pub type FormData = BTreeMap<String, String>;

/// Request sent to the evaluation endpoint.
///
/// `nonce` is an opaque anti-forgery token supplied by the host; the
/// engine forwards it without interpreting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub action: String,
    pub form_id: String,
    pub data: FormData,
    pub nonce: String,
}

impl EvaluationRequest {
    pub fn new(form_id: impl Into<String>, data: FormData, nonce: impl Into<String>) -> Self {
        Self {
            action: EVALUATE_ACTION.to_string(),
            form_id: form_id.into(),
            data,
            nonce: nonce.into(),
        }
    }
}

/// Raw endpoint response shape. Transport collaborators deserialize
/// into this; the engine immediately normalizes it into an
/// [`EvaluationResult`] with a typed error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldStateMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The engine's normalized view of one remote call outcome: either
/// success with a field state map, or failure with a typed error.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub success: bool,
    pub fields: Option<FieldStateMap>,
    pub error: Option<EngineError>,
}

impl EvaluationResult {
    pub fn ok(fields: FieldStateMap) -> Self {
        Self {
            success: true,
            fields: Some(fields),
            error: None,
        }
    }

    pub fn err(error: EngineError) -> Self {
        Self {
            success: false,
            fields: None,
            error: Some(error),
        }
    }

    /// Outcome of a call whose response arrived after cancellation or
    /// timeout superseded it; carries neither fields nor an error and
    /// must not be applied to the UI.
    pub fn discarded() -> Self {
        Self {
            success: false,
            fields: None,
            error: None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        !self.success && self.fields.is_none() && self.error.is_none()
    }

    /// Human-readable failure message, empty on success.
    pub fn error_message(&self) -> String {
        self.error.as_ref().map(ToString::to_string).unwrap_or_default()
    }
}

/// Declarative validation rule for one field. Absent fields mean
/// "no constraint"; a field with no rule at all passes through with
/// default sanitization only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationRule {
    pub required: Option<bool>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub error_message: Option<String>,
}

impl ValidationRule {
    pub fn required() -> Self {
        Self {
            required: Some(true),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Cache counters exposed for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_size: usize,
    pub item_count: usize,
    /// `hits / (hits + misses)`, 0 when nothing has been requested.
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn recompute_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_request_carries_action() {
        let req = EvaluationRequest::new("contact", FormData::new(), "abc123");
        assert_eq!(req.action, EVALUATE_ACTION);
        assert_eq!(req.form_id, "contact");
    }

    #[test]
    fn test_wire_response_tolerates_missing_fields() {
        let resp: WireResponse = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(resp.success);
        assert!(resp.fields.is_none());
        assert!(resp.message.is_none());
    }

    #[test]
    fn test_validation_rule_camel_case() {
        let rule: ValidationRule =
            serde_json::from_str(r#"{"minLength":2,"maxLength":8,"required":true}"#).unwrap();
        assert_eq!(rule.min_length, Some(2));
        assert_eq!(rule.max_length, Some(8));
        assert_eq!(rule.required, Some(true));
        assert!(rule.pattern.is_none());
    }

    #[test]
    fn test_hit_rate_zero_without_requests() {
        let mut stats = CacheStats::default();
        stats.recompute_hit_rate();
        assert_eq!(stats.hit_rate, 0.0);

        stats.hits = 3;
        stats.misses = 1;
        stats.recompute_hit_rate();
        assert_eq!(stats.hit_rate, 0.75);
    }
}
