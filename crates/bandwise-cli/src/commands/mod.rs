//! Subcommand implementations and the wiring they share.

pub mod dashboard;
pub mod grade;
pub mod init;
pub mod list_models;
pub mod profile;
pub mod questions;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use bandwise_core::model::{Subtype, TaskType};
use bandwise_core::service::AssessmentService;
use bandwise_core::store::JsonStore;
use bandwise_core::traits::{GenerateRequest, GenerateResponse, ModelInfo, TextGenerator};
use bandwise_providers::config::load_config_from;
use bandwise_providers::BandwiseConfig;

/// Flags accepted by every subcommand.
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
}

impl GlobalOptions {
    pub fn load_config(&self) -> Result<BandwiseConfig> {
        let mut config = load_config_from(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        Ok(config)
    }

    /// Open the data directory and wire up the service.
    ///
    /// A missing provider only fails the commands that call the generator.
    pub async fn service(&self) -> Result<AssessmentService> {
        let config = self.load_config()?;
        let store = JsonStore::open(&config.data_dir)
            .await
            .with_context(|| format!("failed to open data dir: {}", config.data_dir.display()))?;

        let generator: Arc<dyn TextGenerator> = match config.default_generator() {
            Ok(generator) => generator,
            Err(e) => {
                tracing::debug!("no generator available: {e:#}");
                Arc::new(Unconfigured {
                    reason: format!("{e:#}"),
                })
            }
        };

        Ok(AssessmentService::with_store(
            Arc::new(store),
            generator,
            config.service_config(),
        ))
    }
}

/// Stands in for the provider when none is configured.
struct Unconfigured {
    reason: String,
}

#[async_trait]
impl TextGenerator for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn generate(&self, _request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        anyhow::bail!("{}", self.reason)
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}

pub fn parse_task(value: &str) -> Result<TaskType> {
    value.parse().map_err(|e: String| anyhow::anyhow!(e))
}

pub fn parse_subtype(value: Option<&str>) -> Result<Option<Subtype>> {
    value
        .map(|s| s.parse::<Subtype>().map_err(|e| anyhow::anyhow!(e)))
        .transpose()
}
