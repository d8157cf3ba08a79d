// Layered client configuration: defaults, optional TOML file, NAI_* env vars

use anyhow::{Context, Result};
use config::{Config as ConfigLoader, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::retry::RetryPolicy;
use crate::settings::GenerationSettings;

/// Everything needed to build an HTTP-backed [`crate::Conversation`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Completions URL override; the NovelAI endpoint when unset
    pub endpoint: Option<String>,
    /// Bearer token. Not discovered implicitly, see
    /// [`crate::credentials::discover_api_key`].
    pub api_key: Option<String>,
    /// Total deadline for buffered requests
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub generation: GenerationSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            request_timeout_secs: 120,
            connect_timeout_secs: 30,
            retry: RetryPolicy::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. Built-in defaults
    /// 2. The TOML file at `path`, if given and present
    /// 3. Environment variables prefixed `NAI_`, nested with `__`
    ///    (e.g. `NAI_API_KEY`, `NAI_GENERATION__MODEL`, `NAI_RETRY__MAX_RETRIES`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLoader::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("NAI")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read client configuration")?;

        config
            .try_deserialize()
            .context("Invalid client configuration")
    }

    /// Load config from a specific file only (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = ConfigLoader::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()
            .with_context(|| format!("Failed to read {}", path.display()))?;

        config
            .try_deserialize()
            .with_context(|| format!("Invalid client configuration in {}", path.display()))
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}
