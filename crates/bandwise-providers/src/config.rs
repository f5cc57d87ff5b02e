//! Configuration loading and the provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bandwise_core::generation::GenerationSettings;
use bandwise_core::service::ServiceConfig;
use bandwise_core::traits::TextGenerator;

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single text generation provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

impl ProviderConfig {
    fn api_key(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { api_key, .. } | ProviderConfig::Anthropic { api_key, .. } => {
                api_key
            }
        }
    }
}

/// Top-level bandwise configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandwiseConfig {
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature (0.0 keeps marking repeatable).
    #[serde(default)]
    pub temperature: f64,
    /// Output budget for grading calls.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Output budget for candidate-question calls.
    #[serde(default = "default_candidate_max_tokens")]
    pub candidate_max_tokens: u32,
    /// Upper bound on a single generator call.
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,
    /// Max concurrent gradings in a batch.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Submissions considered by the dashboard.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Directory holding prompts, profiles and the submission ledger.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
fn default_max_tokens() -> u32 {
    3000
}
fn default_candidate_max_tokens() -> u32 {
    2000
}
fn default_generation_timeout() -> u64 {
    90
}
fn default_parallelism() -> usize {
    4
}
fn default_history_window() -> usize {
    20
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./bandwise-data")
}

impl Default for BandwiseConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            candidate_max_tokens: default_candidate_max_tokens(),
            generation_timeout_secs: default_generation_timeout(),
            parallelism: default_parallelism(),
            history_window: default_history_window(),
            data_dir: default_data_dir(),
            providers: HashMap::new(),
        }
    }
}

impl BandwiseConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Service settings derived from this configuration.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            generation: GenerationSettings {
                model: self.default_model.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                candidate_max_tokens: self.candidate_max_tokens,
                timeout: self.generation_timeout(),
            },
            parallelism: self.parallelism,
            history_window: self.history_window,
        }
    }

    /// Build the default provider.
    pub fn default_generator(&self) -> Result<Arc<dyn TextGenerator>> {
        let provider = self.providers.get(&self.default_provider).with_context(|| {
            format!(
                "provider '{}' is not configured; add it to bandwise.toml or set BANDWISE_{}_KEY",
                self.default_provider,
                self.default_provider.to_uppercase()
            )
        })?;
        create_provider(provider, self.generation_timeout())
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are copied verbatim and never scanned again. An
/// unterminated `${` is kept as written.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + end + 1..];
    }
    result.push_str(rest);
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `bandwise.toml` in the current directory
/// 2. `~/.config/bandwise/config.toml`
///
/// Environment variable overrides: `BANDWISE_ANTHROPIC_KEY`, `BANDWISE_OPENAI_KEY`.
pub fn load_config() -> Result<BandwiseConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<BandwiseConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("bandwise.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => BandwiseConfig::default(),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a config document and resolve `${VAR}` references in provider entries.
pub fn parse_config(content: &str) -> Result<BandwiseConfig> {
    let mut config: BandwiseConfig = toml::from_str(content)?;
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    Ok(config)
}

fn apply_env_overrides(config: &mut BandwiseConfig) {
    if let Ok(key) = std::env::var("BANDWISE_ANTHROPIC_KEY") {
        config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let Some(ProviderConfig::Anthropic { api_key, .. }) =
            config.providers.get_mut("anthropic")
        {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("BANDWISE_OPENAI_KEY") {
        config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let Some(ProviderConfig::OpenAI { api_key, .. }) = config.providers.get_mut("openai") {
            *api_key = key;
        }
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("bandwise"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig, timeout: Duration) -> Result<Arc<dyn TextGenerator>> {
    if config.api_key().trim().is_empty() {
        anyhow::bail!("provider API key is empty");
    }
    match config {
        ProviderConfig::Anthropic { api_key, base_url } => Ok(Arc::new(AnthropicProvider::new(
            api_key,
            base_url.clone(),
            timeout,
        )?)),
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Ok(Arc::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
            timeout,
        )?)),
    }
}
