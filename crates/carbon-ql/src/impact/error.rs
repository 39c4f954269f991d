use crate::reference::ProviderError;

/// Input rejected by a parameter schema. Never corrected silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingRequiredField(String),
    #[error("field `{field}` expects {expected}, got {got}")]
    InvalidFieldType {
        field: String,
        expected: String,
        got: String,
    },
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("expected a {expected}, got {got}")]
    InvalidShape {
        expected: &'static str,
        got: &'static str,
    },
}

/// Failure evaluating one scenario against a configured model.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unknown hardware model `{name}`")]
    UnknownHardwareModel { name: String },
    #[error(transparent)]
    CoefficientSourceUnavailable(#[from] ProviderError),
    #[error("estimate for `{name}` overflows; reduce hours_use_time or core_units")]
    NonFiniteEstimate { name: String },
}

impl EvaluationError {
    pub const fn kind(&self) -> &'static str {
        match self {
            EvaluationError::Validation(_) => "validation",
            EvaluationError::UnknownHardwareModel { .. } => "unknown_hardware_model",
            EvaluationError::CoefficientSourceUnavailable(_) => "coefficient_source_unavailable",
            EvaluationError::NonFiniteEstimate { .. } => "non_finite_estimate",
        }
    }

    /// Retrying can help only when fetching reference data failed transiently.
    pub fn is_retryable(&self) -> bool {
        match self {
            EvaluationError::CoefficientSourceUnavailable(err) => err.is_transient(),
            EvaluationError::Validation(_)
            | EvaluationError::UnknownHardwareModel { .. }
            | EvaluationError::NonFiniteEstimate { .. } => false,
        }
    }
}
