//! Chat-completion providers

use crate::client::{ApiClient, PROVIDER_NAME};
use crate::config::ProviderConfig;
use crate::envelope::CompletionEnvelope;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single, non-streaming completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.0,
        }
    }

    /// Set the sampling temperature (builder style)
    pub fn with_temperature(self, temperature: f32) -> Self {
        Self {
            temperature,
            ..self
        }
    }
}

/// Generated text plus the tokens the call consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub text: String,
    pub usage_tokens: u64,
}

/// Trait for providers that turn a message list into generated text
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion>;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

/// Chat provider backed by the Mistral `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct MistralChatProvider {
    client: ApiClient,
}

impl MistralChatProvider {
    /// Fails when the configuration has no API key.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(config)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.client.config().chat_model
    }
}

#[async_trait]
impl ChatProvider for MistralChatProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
        let body = CompletionBody {
            model: self.model(),
            messages: &request.messages,
            temperature: request.temperature,
        };

        let envelope: CompletionEnvelope = self.client.post_json("chat/completions", &body).await?;
        let completion = envelope.into_completion();
        tracing::debug!(
            "{} completion: {} chars, {} tokens",
            self.model(),
            completion.text.len(),
            completion.usage_tokens
        );
        Ok(completion)
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server;
    use crate::error::ProviderError;

    #[tokio::test]
    async fn test_complete_sends_model_and_decodes_reply() {
        let (url, server) = test_server::serve(vec![(
            200,
            r#"{"choices":[{"message":{"content":"{\"format\":[],\"phase\":[\"deal\"]}"}}],"usage":{"total_tokens":21}}"#
                .to_string(),
        )])
        .await;
        let provider = MistralChatProvider::new(
            ProviderConfig::default()
                .with_api_key("k")
                .with_base_url(url)
                .with_chat_model("mistral-tiny"),
        )
        .unwrap();

        let completion = provider
            .complete(ChatRequest::new(vec![
                ChatMessage::system("classify"),
                ChatMessage::user("who deals?"),
            ]))
            .await
            .unwrap();

        assert_eq!(completion.text, r#"{"format":[],"phase":["deal"]}"#);
        assert_eq!(completion.usage_tokens, 21);

        let requests = server.await.unwrap();
        assert_eq!(requests[0].request_line, "POST /chat/completions HTTP/1.1");
        assert!(requests[0].headers.contains("authorization: bearer k"));
        let sent: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
        assert_eq!(sent["model"], "mistral-tiny");
        assert_eq!(sent["temperature"], 0.0);
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][1]["content"], "who deals?");
    }

    #[tokio::test]
    async fn test_http_failure_is_not_retried() {
        let (url, server) =
            test_server::serve(vec![(503, r#"{"error":"overloaded"}"#.to_string())]).await;
        let provider =
            MistralChatProvider::new(ProviderConfig::default().with_api_key("k").with_base_url(url))
                .unwrap();

        let err = provider
            .complete(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap_err();

        match err {
            ProviderError::Http { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, r#"{"error":"overloaded"}"#);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[test]
    fn test_requires_api_key() {
        let err = MistralChatProvider::new(ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidConfig { .. }));
    }
}
