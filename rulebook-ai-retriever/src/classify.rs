//! Question classification into format and phase tags.
//!
//! The chat provider is asked for a compact JSON object. Its output is only
//! advisory: any provider failure, unparsable text or malformed shape yields
//! an empty [`Classification`] and retrieval carries on untagged.

use crate::index::TagFilter;
use itertools::Itertools;
use rulebook_ai_provider::{ChatMessage, ChatProvider, ChatRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Tags kept per category.
pub const MAX_TAGS: usize = 5;

const CLASSIFIER_PROMPT: &str = r#"Catégorise la question poker en JSON compact:
{"format": ["associatif"|"croupier"|"cash"|"sng"|"home"...?],
 "phase": ["deal"|"preflop"|"postflop"|"showdown"|"penalties"...?]}
Réponds UNIQUEMENT ce JSON, sans commentaire. Si doute, liste vide."#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub format: Vec<String>,
    pub phase: Vec<String>,
}

impl Classification {
    pub fn is_empty(&self) -> bool {
        self.format.is_empty() && self.phase.is_empty()
    }

    pub fn to_filter(&self) -> TagFilter {
        TagFilter::new(self.format.clone(), self.phase.clone())
    }

    /// Parse model output, tolerating code fences and prose around the
    /// object. Returns `None` when no JSON object can be read.
    pub fn parse(text: &str) -> Option<Self> {
        let body = strip_code_fence(text.trim());
        let body = if body.is_empty() { "{}" } else { body };

        let value: Value = serde_json::from_str(body).ok().or_else(|| {
            let start = body.find('{')?;
            let end = body.rfind('}')?;
            serde_json::from_str(body.get(start..=end)?).ok()
        })?;
        let object = value.as_object()?;

        Some(Self {
            format: tags(object.get("format")),
            phase: tags(object.get("phase")),
        })
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// String entries of a JSON array, trimmed, deduplicated, at most [`MAX_TAGS`].
fn tags(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unique()
        .take(MAX_TAGS)
        .collect()
}

pub struct QueryClassifier {
    chat: Arc<dyn ChatProvider>,
}

impl QueryClassifier {
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self { chat }
    }

    /// Classify `question`. Never fails.
    pub async fn classify(&self, question: &str) -> Classification {
        let request = ChatRequest::new(vec![
            ChatMessage::system(CLASSIFIER_PROMPT),
            ChatMessage::user(question),
        ]);

        let completion = match self.chat.complete(request).await {
            Ok(completion) => completion,
            Err(e) => {
                warn!(
                    "Classification via {} failed, continuing without tags: {}",
                    self.chat.provider_name(),
                    e
                );
                return Classification::default();
            }
        };

        match Classification::parse(&completion.text) {
            Some(classification) => {
                debug!(
                    "Classified question: format={:?} phase={:?}",
                    classification.format, classification.phase
                );
                classification
            }
            None => {
                warn!("Unparsable classification {:?}, continuing without tags", completion.text);
                Classification::default()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use rulebook_ai_provider::{ChatCompletion, ProviderError};
    use std::sync::Mutex;

    /// Chat provider that replays scripted replies and records requests.
    pub(crate) struct ScriptedChat {
        replies: Mutex<Vec<rulebook_ai_provider::Result<ChatCompletion>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedChat {
        pub(crate) fn new(replies: Vec<rulebook_ai_provider::Result<ChatCompletion>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn text(text: &str) -> rulebook_ai_provider::Result<ChatCompletion> {
            Ok(ChatCompletion {
                text: text.to_string(),
                usage_tokens: 10,
            })
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn complete(&self, request: ChatRequest) -> rulebook_ai_provider::Result<ChatCompletion> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(ChatCompletion::default()))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_parse_plain_object() {
        let c = Classification::parse(r#"{"format":["cash","mtt"],"phase":["showdown"]}"#).unwrap();
        assert_eq!(c.format, vec!["cash", "mtt"]);
        assert_eq!(c.phase, vec!["showdown"]);
    }

    #[test]
    fn test_parse_fenced_and_wrapped_output() {
        let fenced = "```json\n{\"format\": [\"sng\"], \"phase\": []}\n```";
        assert_eq!(Classification::parse(fenced).unwrap().format, vec!["sng"]);

        let chatty = "Voici: {\"format\": [], \"phase\": [\"deal\"]} voilà";
        assert_eq!(Classification::parse(chatty).unwrap().phase, vec!["deal"]);
    }

    #[test]
    fn test_parse_caps_and_cleans_tags() {
        let c = Classification::parse(
            r#"{"format":["a","b","A","c","d","e","f"],"phase":[" Deal ", 3, null, ""]}"#,
        )
        .unwrap();
        assert_eq!(c.format, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(c.phase, vec!["deal"]);
    }

    #[test]
    fn test_parse_malformed_shapes() {
        assert_eq!(Classification::parse("").unwrap(), Classification::default());
        assert_eq!(
            Classification::parse(r#"{"format":"cash","phase":{"x":1}}"#).unwrap(),
            Classification::default()
        );
        assert_eq!(Classification::parse("not json at all"), None);
        assert_eq!(Classification::parse("[1, 2]"), None);
    }

    #[tokio::test]
    async fn test_classify_sends_prompt_at_zero_temperature() {
        let chat = Arc::new(ScriptedChat::new(vec![ScriptedChat::text(
            r#"{"format":["cash"],"phase":[]}"#,
        )]));
        let classifier = QueryClassifier::new(chat.clone());

        let c = classifier.classify("Qui parle en premier ?").await;

        assert_eq!(c.format, vec!["cash"]);
        let requests = chat.requests.lock().unwrap();
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].messages[1].content, "Qui parle en premier ?");
    }

    #[tokio::test]
    async fn test_classify_degrades_on_garbage_and_errors() {
        let chat = Arc::new(ScriptedChat::new(vec![
            ScriptedChat::text("Je ne sais pas."),
            Err(ProviderError::Http {
                provider: "scripted".into(),
                status: 503,
                body: "overloaded".into(),
            }),
        ]));
        let classifier = QueryClassifier::new(chat);

        assert!(classifier.classify("q1").await.is_empty());
        assert!(classifier.classify("q2").await.is_empty());
    }
}
