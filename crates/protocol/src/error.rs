use thiserror::Error;

/// Typed failure kinds for the evaluation engine.
///
/// Caller-recoverable kinds (timeout, rate limit, validation,
/// permission) are surfaced to the user with a retry affordance and
/// never panic across the public API. `FormNotFound` is the one
/// construction-time error: it is returned synchronously from engine
/// construction, where no recovery is meaningful.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The remote call did not settle within the configured budget.
    #[error("Evaluation timed out after {timeout_ms}ms")]
    ApiTimeout { timeout_ms: u64 },

    /// The remote call reported a structurally invalid or
    /// unsuccessful response.
    #[error("Evaluation rejected: {message}")]
    ApiValidation { message: String, details: String },

    /// Transport-level or HTTP-status failure.
    #[error("Network error ({status}): {message}")]
    Network { status: u16, message: String },

    /// Status 429 specifically.
    #[error("Rate limited{}", match .retry_after { Some(s) => format!(", retry after {s}s"), None => String::new() })]
    RateLimit { retry_after: Option<u64> },

    /// Engine construction precondition failure.
    #[error("Form not found: {form_id}")]
    FormNotFound { form_id: String },

    /// A field state could not be applied to the form tree.
    #[error("Invalid field state for '{field_id}': {reason}")]
    InvalidFieldState { field_id: String, reason: String },

    /// Single-flight guard: a call overlapped an outstanding one and
    /// was rejected without touching the network.
    #[error("Evaluation already in progress")]
    EvaluationInProgress,
}

impl EngineError {
    /// Stable machine-readable code for logging and UI mapping.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ApiTimeout { .. } => "api_timeout",
            Self::ApiValidation { .. } => "api_validation",
            Self::Network { .. } => "network",
            Self::RateLimit { .. } => "rate_limit",
            Self::FormNotFound { .. } => "form_not_found",
            Self::InvalidFieldState { .. } => "invalid_field_state",
            Self::EvaluationInProgress => "in_progress",
        }
    }

    /// Whether the user can meaningfully retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ApiTimeout { .. }
                | Self::ApiValidation { .. }
                | Self::Network { .. }
                | Self::RateLimit { .. }
        )
    }

    pub fn network(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ApiValidation {
            message: message.into(),
            details: details.into(),
        }
    }
}

/// What the transport collaborator observed when a remote call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The call returned an HTTP error status.
    Status { code: u16, body: String },
    /// The call did not settle inside the timeout budget.
    Timeout { timeout_ms: u64 },
    /// Connection-level failure before any status was received.
    Connection { message: String },
}

/// Map a transport failure onto the error taxonomy.
///
/// Pure function, consumed by both the API service and the UI layer so
/// the retry affordance and the announced message always agree on the
/// error kind.
pub fn classify(failure: &TransportFailure) -> EngineError {
    match failure {
        TransportFailure::Timeout { timeout_ms } => EngineError::ApiTimeout {
            timeout_ms: *timeout_ms,
        },
        TransportFailure::Connection { message } => EngineError::network(0, message.clone()),
        TransportFailure::Status { code, body } => match *code {
            400 => EngineError::validation("Invalid evaluation request", body.clone()),
            403 => EngineError::network(403, "permission denied"),
            429 => EngineError::RateLimit {
                retry_after: parse_retry_after(body),
            },
            code if code >= 500 => EngineError::network(code, "server error"),
            code => EngineError::network(code, format!("unexpected status {code}")),
        },
    }
}

fn parse_retry_after(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("retry_after")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_codes() {
        let cases = [
            (400, "api_validation"),
            (403, "network"),
            (429, "rate_limit"),
            (500, "network"),
            (503, "network"),
            (418, "network"),
        ];
        for (code, expected) in cases {
            let err = classify(&TransportFailure::Status {
                code,
                body: String::new(),
            });
            assert_eq!(err.code(), expected, "status {code}");
        }
    }

    #[test]
    fn test_classify_timeout() {
        let err = classify(&TransportFailure::Timeout { timeout_ms: 30_000 });
        assert_eq!(err, EngineError::ApiTimeout { timeout_ms: 30_000 });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_rate_limit_retry_after() {
        let err = classify(&TransportFailure::Status {
            code: 429,
            body: r#"{"retry_after": 12}"#.to_string(),
        });
        assert_eq!(
            err,
            EngineError::RateLimit {
                retry_after: Some(12)
            }
        );
    }

    #[test]
    fn test_form_not_found_not_retryable() {
        let err = EngineError::FormNotFound {
            form_id: "signup".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Form not found: signup");
    }
}
