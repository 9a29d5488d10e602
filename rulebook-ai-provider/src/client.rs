//! Thin JSON-over-HTTP client shared by the Mistral adapters.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub(crate) const PROVIDER_NAME: &str = "mistral";

#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    config: ProviderConfig,
    api_key: String,
}

impl ApiClient {
    pub(crate) fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let api_key = config.require_api_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::invalid_config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    pub(crate) fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// POST `body` as JSON and decode the 2xx response into `R`.
    ///
    /// Non-2xx responses become [`ProviderError::Http`] carrying the raw body.
    pub(crate) async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.config.endpoint(path);
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        let text = response.text().await.map_err(network_error)?;

        if !status.is_success() {
            return Err(ProviderError::Http {
                provider: PROVIDER_NAME.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| ProviderError::decode(PROVIDER_NAME, e))
    }
}

fn network_error(source: reqwest::Error) -> ProviderError {
    ProviderError::Network {
        provider: PROVIDER_NAME.to_string(),
        source,
    }
}
