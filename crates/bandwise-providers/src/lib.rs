//! bandwise-providers: Text generation providers.
//!
//! Implements the `TextGenerator` trait for Anthropic and OpenAI-compatible
//! APIs, plus a scripted mock, and loads provider configuration from TOML.

pub mod anthropic;
pub mod config;
mod http;
pub mod mock;
pub mod openai;

pub use bandwise_core::error::ProviderError;
pub use config::{create_provider, load_config, BandwiseConfig, ProviderConfig};
