//! Error types for the assessment protocol.
//!
//! `ProviderError` lives here so the service can downcast generator failures
//! and classify them without string matching. `StoreError` is the structured
//! failure surface of every persistence backend.

use thiserror::Error;

/// Errors that can occur when interacting with a text generation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and a caller retry is pointless.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Failures reported by a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists under the given id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A record with the same id already exists.
    #[error("{kind} already exists: {id}")]
    Conflict { kind: &'static str, id: String },

    /// The backend refused a record that violates its invariants.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Underlying I/O failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored document could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Every failure the assessment core can hand back to its caller.
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// Caller input was malformed; rejected before any external call.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The acting profile may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The generator was unreachable or exceeded its time bound.
    ///
    /// `provider` holds the classified provider failure when there was one.
    #[error("generator transport failure: {message}")]
    Transport {
        message: String,
        provider: Option<ProviderError>,
    },

    /// Generator output was not a single JSON value.
    #[error("generator output is not valid JSON: {0}")]
    Parse(String),

    /// Generator output parsed but violated the assessment schema.
    #[error("generator output violates schema at `{field}`")]
    Schema { field: String },

    /// A candidate-question payload was malformed.
    #[error("candidate generation failed: {0}")]
    Generation(String),

    /// A store read or write failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl AssessmentError {
    pub(crate) fn schema(field: impl Into<String>) -> Self {
        AssessmentError::Schema {
            field: field.into(),
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        AssessmentError::Transport {
            message: message.into(),
            provider: None,
        }
    }

    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Input and authorization failures need caller correction instead, and so
    /// do provider failures that are permanent (bad key, unknown model).
    pub fn is_retryable(&self) -> bool {
        match self {
            AssessmentError::Validation(_) | AssessmentError::Forbidden(_) => false,
            AssessmentError::Transport {
                provider: Some(provider),
                ..
            } => !provider.is_permanent(),
            _ => true,
        }
    }

    /// How long the provider asked callers to wait before retrying.
    pub fn retry_after_ms(&self) -> Option<u64> {
        self.provider_error().and_then(ProviderError::retry_after_ms)
    }

    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            AssessmentError::Transport { provider, .. } => provider.as_ref(),
            _ => None,
        }
    }

    /// Classify a generator failure into the transport bucket, keeping the
    /// provider's classification when the failure carries one.
    pub(crate) fn from_generator(err: anyhow::Error) -> Self {
        match err.downcast::<ProviderError>() {
            Ok(provider) => AssessmentError::Transport {
                message: provider.to_string(),
                provider: Some(provider),
            },
            Err(err) => AssessmentError::transport(format!("{err:#}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_not_retryable() {
        assert!(!AssessmentError::Validation("empty essay".into()).is_retryable());
        assert!(!AssessmentError::Forbidden("student".into()).is_retryable());
        assert!(AssessmentError::transport("down").is_retryable());
        assert!(AssessmentError::schema("wordCount").is_retryable());
    }

    #[test]
    fn provider_errors_classify_as_transport() {
        let err = anyhow::Error::from(ProviderError::Timeout(30));
        match AssessmentError::from_generator(err) {
            AssessmentError::Transport { message, provider } => {
                assert!(message.contains("timed out"));
                assert!(matches!(provider, Some(ProviderError::Timeout(30))));
            }
            other => panic!("expected transport, got {other:?}"),
        }
    }

    #[test]
    fn provider_classification_drives_retry_advice() {
        let limited = AssessmentError::from_generator(anyhow::Error::from(
            ProviderError::RateLimited {
                retry_after_ms: 2000,
            },
        ));
        assert!(limited.is_retryable());
        assert_eq!(limited.retry_after_ms(), Some(2000));

        let bad_key = AssessmentError::from_generator(anyhow::Error::from(
            ProviderError::AuthenticationFailed("invalid x-api-key".into()),
        ));
        assert!(!bad_key.is_retryable());
        assert_eq!(bad_key.retry_after_ms(), None);

        let other = AssessmentError::from_generator(anyhow::anyhow!("connection refused"));
        assert!(other.is_retryable());
        assert!(other.provider_error().is_none());
        assert_eq!(other.to_string(), "generator transport failure: connection refused");
    }

    #[test]
    fn permanent_provider_errors() {
        assert!(ProviderError::AuthenticationFailed("bad".into()).is_permanent());
        assert!(!ProviderError::NetworkError("reset".into()).is_permanent());
        assert_eq!(
            ProviderError::RateLimited {
                retry_after_ms: 5000
            }
            .retry_after_ms(),
            Some(5000)
        );
    }
}
