//! Decoding of chat-completion response envelopes.
//!
//! Chat providers disagree on where the generated text and the token usage
//! live. Every known variant is modelled here as an explicit record with
//! optional fields, and [`decode_completion`] resolves them in a fixed order.
//!
//! ## Text priority
//!
//! 1. `choices[0].message.content` when it is a string.
//! 2. `choices[0].message.content` when it is a list of segments: each
//!    segment is either a string or an object with a `text` field; segments are
//!    concatenated and unknown segments contribute nothing.
//! 3. `choices[0].text` (legacy completion shape).
//! 4. The empty string.
//!
//! ## Usage priority
//!
//! 1. `usage.total_tokens`.
//! 2. `usage.prompt_tokens + usage.completion_tokens` when either is present.
//! 3. `usage.input_tokens + usage.output_tokens` when either is present.
//! 4. Zero.

use crate::chat::ChatCompletion;
use crate::client::PROVIDER_NAME;
use crate::error::{ProviderError, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct CompletionEnvelope {
    #[serde(default)]
    pub choices: Vec<ChoiceEnvelope>,
    #[serde(default)]
    pub usage: Option<UsageEnvelope>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChoiceEnvelope {
    #[serde(default)]
    pub message: Option<MessageEnvelope>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageEnvelope {
    #[serde(default)]
    pub content: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Segments(Vec<ContentSegment>),
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ContentSegment {
    Text(String),
    Part {
        #[serde(default)]
        text: Option<String>,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Default, Deserialize)]
pub struct UsageEnvelope {
    pub total_tokens: Option<u64>,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

impl CompletionEnvelope {
    pub fn text(&self) -> String {
        let Some(choice) = self.choices.first() else {
            return String::new();
        };

        let from_message = choice
            .message
            .as_ref()
            .and_then(|m| m.content.as_ref())
            .and_then(|content| match content {
                MessageContent::Text(text) => Some(text.clone()),
                MessageContent::Segments(segments) => Some(
                    segments
                        .iter()
                        .filter_map(|seg| match seg {
                            ContentSegment::Text(text) => Some(text.as_str()),
                            ContentSegment::Part { text } => text.as_deref(),
                            ContentSegment::Other(_) => None,
                        })
                        .collect(),
                ),
                MessageContent::Other(_) => None,
            });

        from_message
            .or_else(|| choice.text.clone())
            .unwrap_or_default()
    }

    pub fn usage_tokens(&self) -> u64 {
        let Some(usage) = &self.usage else {
            return 0;
        };

        if let Some(total) = usage.total_tokens {
            return total;
        }
        if usage.prompt_tokens.is_some() || usage.completion_tokens.is_some() {
            return usage.prompt_tokens.unwrap_or(0) + usage.completion_tokens.unwrap_or(0);
        }
        if usage.input_tokens.is_some() || usage.output_tokens.is_some() {
            return usage.input_tokens.unwrap_or(0) + usage.output_tokens.unwrap_or(0);
        }
        0
    }

    pub fn into_completion(self) -> ChatCompletion {
        ChatCompletion {
            text: self.text(),
            usage_tokens: self.usage_tokens(),
        }
    }
}

/// Decode a raw chat-completion body into text and usage.
///
/// Only a body that is not a JSON object at all is an error; missing fields
/// fall through the priority lists above.
pub fn decode_completion(body: &str) -> Result<ChatCompletion> {
    let envelope: CompletionEnvelope =
        serde_json::from_str(body).map_err(|e| ProviderError::decode(PROVIDER_NAME, e))?;
    Ok(envelope.into_completion())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_string_content() {
        let completion = decode_completion(
            r#"{"choices":[{"message":{"role":"assistant","content":"Burn one card."}}],
                "usage":{"prompt_tokens":12,"completion_tokens":4,"total_tokens":16}}"#,
        )
        .unwrap();

        assert_eq!(completion.text, "Burn one card.");
        assert_eq!(completion.usage_tokens, 16);
    }

    #[test]
    fn test_segmented_content_is_concatenated() {
        let completion = decode_completion(
            r#"{"choices":[{"message":{"content":[
                "Burn ",
                {"type":"text","text":"one card"},
                {"type":"image_url","image_url":{"url":"x"}},
                42,
                "."
            ]}}]}"#,
        )
        .unwrap();

        assert_eq!(completion.text, "Burn one card.");
        assert_eq!(completion.usage_tokens, 0);
    }

    #[test]
    fn test_legacy_text_and_usage_fallbacks() {
        let completion = decode_completion(
            r#"{"choices":[{"text":"legacy"}],"usage":{"prompt_tokens":7}}"#,
        )
        .unwrap();
        assert_eq!(completion.text, "legacy");
        assert_eq!(completion.usage_tokens, 7);

        let completion = decode_completion(
            r#"{"choices":[{"message":{"content":null},"text":"fallback"}],
                "usage":{"input_tokens":3,"output_tokens":5}}"#,
        )
        .unwrap();
        assert_eq!(completion.text, "fallback");
        assert_eq!(completion.usage_tokens, 8);
    }

    #[test]
    fn test_empty_and_unusable_envelopes() {
        let completion = decode_completion(r#"{"choices":[]}"#).unwrap();
        assert_eq!(completion.text, "");
        assert_eq!(completion.usage_tokens, 0);

        let completion = decode_completion(r#"{"choices":[{"message":{"content":{"odd":true}}}]}"#)
            .unwrap();
        assert_eq!(completion.text, "");

        assert!(matches!(
            decode_completion("not json"),
            Err(ProviderError::Decode { .. })
        ));
    }
}
