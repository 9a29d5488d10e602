//! Configuration for the hosted model provider

use crate::error::{ProviderError, Result};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "mistral-embed";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1024;
pub const DEFAULT_CHAT_MODEL: &str = "mistral-small-latest";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection and model settings shared by the embedding and chat adapters.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Bearer token sent with every request
    pub api_key: Option<String>,
    /// API root, without a trailing slash
    pub base_url: String,
    pub embedding_model: String,
    /// Length of every vector the embedding model returns
    pub embedding_dimension: usize,
    pub chat_model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimension", &self.embedding_dimension)
            .field("chat_model", &self.chat_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ProviderConfig {
    /// Read settings from the process environment.
    ///
    /// Recognised variables: `MISTRAL_API_KEY`, `MISTRAL_BASE_URL`,
    /// `MISTRAL_EMBEDDING_MODEL`, `MISTRAL_EMBEDDING_DIM`, `MISTRAL_CHAT_MODEL`.
    /// Unset or empty variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ProviderConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(key) = get("MISTRAL_API_KEY") {
            config.api_key = Some(key);
        }
        if let Some(url) = get("MISTRAL_BASE_URL") {
            config = config.with_base_url(url);
        }
        if let Some(model) = get("MISTRAL_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        if let Some(dim) = get("MISTRAL_EMBEDDING_DIM") {
            let dim = dim.trim().parse::<usize>().map_err(|e| {
                ProviderError::invalid_config(format!("MISTRAL_EMBEDDING_DIM={dim}: {e}"))
            })?;
            config.embedding_dimension = dim;
        }
        if let Some(model) = get("MISTRAL_CHAT_MODEL") {
            config.chat_model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the API key (builder style)
    pub fn with_api_key<S: Into<String>>(self, api_key: S) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..self
        }
    }

    /// Set the API root (builder style). A trailing slash is dropped.
    pub fn with_base_url<S: Into<String>>(self, base_url: S) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, ..self }
    }

    /// Set the embedding model and its vector length (builder style)
    pub fn with_embedding_model<S: Into<String>>(self, model: S, dimension: usize) -> Self {
        Self {
            embedding_model: model.into(),
            embedding_dimension: dimension,
            ..self
        }
    }

    /// Set the chat model (builder style)
    pub fn with_chat_model<S: Into<String>>(self, model: S) -> Self {
        Self {
            chat_model: model.into(),
            ..self
        }
    }

    /// Set the per-request timeout (builder style)
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_dimension == 0 {
            return Err(ProviderError::invalid_config(
                "embedding dimension must be positive",
            ));
        }
        if self.base_url.is_empty() {
            return Err(ProviderError::invalid_config("base URL is empty"));
        }
        Ok(())
    }

    /// The API key, or an error naming the variable that provides it.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::invalid_config("MISTRAL_API_KEY is not set"))
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}
