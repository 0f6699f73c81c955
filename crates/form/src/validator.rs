use crate::tree::{parse_field_name, FormTree, VALIDATE_ATTR};
use condeval_protocol::ValidationRule;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Hard ceiling on a single field value, in characters, enforced for
/// every field regardless of per-field rules, so pathological
/// payloads never reach the network layer.
pub const MAX_VALUE_LEN: usize = 10_000;

// Dangerous markup is stripped tag-by-tag: first whole blocks with
// their content, then any stray open/close tags.
static MARKUP_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "iframe", "object", "embed"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("static markup pattern")
        })
        .collect()
});

static MARKUP_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(script|iframe|object|embed)\b[^>]*>").expect("static markup pattern")
});

/// Sanitized value with its original scalar type restored: values
/// that looked numeric or boolean before sanitization come back as
/// that type, everything else stays text.
#[derive(Debug, Clone, PartialEq)]
pub enum SanitizedValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl fmt::Display for SanitizedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Outcome of validating one field value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOutcome {
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub sanitized_value: SanitizedValue,
}

impl FieldOutcome {
    fn ok(value: SanitizedValue) -> Self {
        Self {
            is_valid: true,
            error_message: None,
            sanitized_value: value,
        }
    }

    fn fail(message: impl Into<String>, value: SanitizedValue) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            sanitized_value: value,
        }
    }
}

type CustomValidator = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Per-field declarative rules plus generic sanitization.
///
/// A field with no rule passes through with default sanitization
/// only. Checks run in a fixed order, short-circuiting on the first
/// failure: required-empty, size ceiling, min length, max length,
/// pattern, custom validator.
#[derive(Default)]
pub struct FieldValidator {
    rules: HashMap<String, ValidationRule>,
    custom: HashMap<String, CustomValidator>,
}

impl fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldValidator")
            .field("rules", &self.rules)
            .field("custom_fields", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FieldValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a validator from the `data-validate` attributes found on
    /// the tree's inputs. Malformed rules are skipped with a warning;
    /// collection must never be blocked by bad markup.
    pub fn from_tree(tree: &FormTree) -> Self {
        let mut validator = Self::new();
        for id in tree.inputs() {
            let Some(el) = tree.element(id) else { continue };
            let Some(raw_rule) = el.attr(VALIDATE_ATTR) else {
                continue;
            };
            let field = parse_field_name(&el.name, tree.form_id())
                .unwrap_or_else(|| el.name.clone());
            match serde_json::from_str::<ValidationRule>(raw_rule) {
                Ok(rule) if !rule.is_empty() => validator.add_rule(&field, rule),
                Ok(_) => {}
                Err(err) => warn!("Ignoring malformed validation rule on '{field}': {err}"),
            }
        }
        validator
    }

    pub fn add_rule(&mut self, field: &str, rule: ValidationRule) {
        self.rules.insert(field.to_string(), rule);
    }

    pub fn rule(&self, field: &str) -> Option<&ValidationRule> {
        self.rules.get(field)
    }

    pub fn set_custom<F>(&mut self, field: &str, validator: F)
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        self.custom.insert(field.to_string(), Box::new(validator));
    }

    pub fn validate_field(&self, field: &str, value: &str) -> FieldOutcome {
        let rule = self.rules.get(field);

        if rule.and_then(|r| r.required) == Some(true) && value.trim().is_empty() {
            let message = rule
                .and_then(|r| r.error_message.clone())
                .unwrap_or_else(|| format!("{field} is required"));
            return FieldOutcome::fail(message, SanitizedValue::Text(String::new()));
        }

        // Counted in characters, like the length rules below; the
        // iteration stops as soon as the ceiling is crossed.
        if value.chars().nth(MAX_VALUE_LEN).is_some() {
            let truncated: String = value.chars().take(MAX_VALUE_LEN).collect();
            return FieldOutcome::fail(
                format!("{field} exceeds the maximum input size"),
                coerce(sanitize(&truncated), value),
            );
        }

        let sanitized = sanitize(value);
        let coerced = coerce(sanitized.clone(), value);

        if let Some(rule) = rule {
            let message = |fallback: String| rule.error_message.clone().unwrap_or(fallback);
            // Length rules are denominated in characters, not bytes.
            let char_count = sanitized.chars().count();
            if let Some(min) = rule.min_length {
                if char_count < min {
                    return FieldOutcome::fail(
                        message(format!("{field} must be at least {min} characters")),
                        coerced,
                    );
                }
            }
            if let Some(max) = rule.max_length {
                if char_count > max {
                    return FieldOutcome::fail(
                        message(format!("{field} must be at most {max} characters")),
                        coerced,
                    );
                }
            }
            if let Some(pattern) = &rule.pattern {
                match Regex::new(pattern) {
                    Ok(re) => {
                        if !re.is_match(&sanitized) {
                            return FieldOutcome::fail(
                                message(format!("{field} has an invalid format")),
                                coerced,
                            );
                        }
                    }
                    Err(err) => {
                        warn!("Unusable pattern rule on '{field}': {err}");
                    }
                }
            }
        }

        if let Some(custom) = self.custom.get(field) {
            if let Err(message) = custom(&sanitized) {
                return FieldOutcome::fail(message, coerced);
            }
        }

        FieldOutcome::ok(coerced)
    }
}

/// Strip dangerous markup and control characters, then trim.
fn sanitize(value: &str) -> String {
    let mut out = value.to_string();
    for block in MARKUP_BLOCKS.iter() {
        out = block.replace_all(&out, "").into_owned();
    }
    out = MARKUP_TAGS.replace_all(&out, "").into_owned();
    out.retain(|c| !c.is_control() || c == '\n' || c == '\t');
    out.trim().to_string()
}

/// Restore the scalar type the original value carried: numbers and
/// booleans survive sanitization as their own kind.
fn coerce(sanitized: String, original: &str) -> SanitizedValue {
    let original = original.trim();
    if let Ok(b) = original.parse::<bool>() {
        return SanitizedValue::Bool(b);
    }
    if let Ok(n) = original.parse::<f64>() {
        if n.is_finite() {
            return SanitizedValue::Number(n);
        }
    }
    SanitizedValue::Text(sanitized)
}
