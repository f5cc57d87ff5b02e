//! Bounded, single-shot generator calls.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AssessmentError;
use crate::traits::{GenerateRequest, GenerateResponse, TextGenerator};

/// Model parameters shared by every generator call of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature (0.0 keeps marking as repeatable as possible).
    pub temperature: f64,
    /// Output budget for grading calls.
    pub max_tokens: u32,
    /// Output budget for candidate-question calls.
    pub candidate_max_tokens: u32,
    /// Upper bound on one generator call.
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            temperature: 0.0,
            max_tokens: 3000,
            candidate_max_tokens: 2000,
            timeout: Duration::from_secs(90),
        }
    }
}

/// Call the generator exactly once, bounded by `settings.timeout`.
///
/// Provider failures and elapsed timeouts both surface as
/// [`AssessmentError::Transport`]; there is no retry here.
pub(crate) async fn generate_once(
    generator: &dyn TextGenerator,
    settings: &GenerationSettings,
    system_prompt: String,
    prompt: String,
    max_tokens: u32,
) -> Result<GenerateResponse, AssessmentError> {
    let request = GenerateRequest {
        model: settings.model.clone(),
        system_prompt,
        prompt,
        max_tokens,
        temperature: settings.temperature,
    };

    let response = tokio::time::timeout(settings.timeout, generator.generate(&request))
        .await
        .map_err(|_| {
            tracing::warn!(
                provider = generator.name(),
                timeout_secs = settings.timeout.as_secs(),
                "generator call exceeded its time bound"
            );
            AssessmentError::transport(format!(
                "{} did not respond within {}s",
                generator.name(),
                settings.timeout.as_secs()
            ))
        })?
        .map_err(|e| {
            tracing::warn!(provider = generator.name(), "generator call failed: {e:#}");
            AssessmentError::from_generator(e)
        })?;

    tracing::info!(
        provider = generator.name(),
        model = %response.model,
        latency_ms = response.latency_ms,
        total_tokens = response.token_usage.total_tokens,
        "generator responded"
    );
    Ok(response)
}
