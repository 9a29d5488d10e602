//! Retrieval and answer composition over the indexed rulebooks.
//!
//! [`RagService`] wires the classifier, the re-ranking search engine, the
//! evidence selector and the chat provider together. Every dependency is
//! passed in, so tests can swap any of them for a local substitute.

use crate::boost::DocBooster;
use crate::classify::{Classification, QueryClassifier};
use crate::config::RetrieverConfig;
use crate::error::{Result, RetrieverError};
use crate::evidence::{Evidence, EvidenceOptions, select_evidence};
use crate::index::VectorIndex;
use crate::search::{RescoredHit, SearchEngine, SearchOptions};
use rulebook_ai_provider::{ChatMessage, ChatProvider, ChatRequest, EmbeddingProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

const ANSWER_TEMPERATURE: f32 = 0.2;

const BEGINNER_PROMPT: &str = "Règles strictes:
- Ne pas inventer.
- Réponds en 4–8 lignes, français simple.
- Si plusieurs règlements sont pertinents, structure la réponse par document (ex: ROPTA, TDA) et indique les différences éventuelles.
- Utilise la version la plus récente indiquée dans les contextes.
- Donne 2–4 citations en fin.";

const REFEREE_PROMPT: &str = "Règles strictes (Arbitre):
- Ne pas inventer. Réponse concise et structurée.
- Si plusieurs règlements sont pertinents, compare-les brièvement, sections séparées par document.
- Toujours citer précisément (Doc, section, pages, version), sans mélanger les docs.";

/// A retrieved chunk as handed to callers and to the answer prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Re-ranked score.
    pub score: f32,
    /// Raw cosine similarity.
    pub similarity: f32,
    pub text: String,
    pub doc_id: String,
    pub title: String,
    pub section: String,
    pub page_start: usize,
    pub page_end: usize,
    pub version: String,
    pub chunk_index: usize,
}

impl From<RescoredHit> for Context {
    fn from(hit: RescoredHit) -> Self {
        let p = hit.payload;
        Self {
            score: hit.score,
            similarity: hit.similarity,
            text: p.text,
            doc_id: p.doc_id,
            title: p.title,
            section: p.section,
            page_start: p.page_start,
            page_end: p.page_end,
            version: p.version,
            chunk_index: p.chunk_index,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Retrieval {
    pub classified: Classification,
    pub contexts: Vec<Context>,
    /// Question embedding, reused for evidence selection.
    #[serde(skip)]
    pub query_vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Short plain-language answer.
    #[default]
    Beginner,
    /// Structured answer with precise citations, per document.
    Referee,
}

impl AnswerMode {
    fn system_prompt(self) -> &'static str {
        match self {
            Self::Beginner => BEGINNER_PROMPT,
            Self::Referee => REFEREE_PROMPT,
        }
    }
}

impl FromStr for AnswerMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Self::Beginner),
            "referee" => Ok(Self::Referee),
            _ => Err(format!("Invalid answer mode: {s}. Valid options: beginner, referee")),
        }
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Beginner => write!(f, "beginner"),
            Self::Referee => write!(f, "referee"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub usage_tokens: u64,
    pub contexts: Vec<Context>,
    pub classified: Classification,
}

/// `[i] Doc: doc_id, §section, p.start–end, v.version`, one line per context.
pub fn format_citations(contexts: &[Context]) -> String {
    contexts
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let section = if c.section.is_empty() { "-" } else { c.section.as_str() };
            format!(
                "[{}] Doc: {}, §{}, p.{}–{}, v.{}",
                i + 1,
                c.doc_id,
                section,
                c.page_start,
                c.page_end,
                c.version
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `[#i] (doc_id) text` blocks separated by blank lines.
pub fn format_contexts(contexts: &[Context]) -> String {
    contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[#{}] ({}) {}", i + 1, c.doc_id, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn json_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

fn answer_prompt(question: &str, classified: &Classification, contexts: &[Context]) -> String {
    format!(
        "Question: {question}\n\nCatégorisation:\nformat={} phase={}\n\nCONTEXTES:\n{}\n\nCitations (à utiliser en fin de réponse):\n{}",
        json_tags(&classified.format),
        json_tags(&classified.phase),
        format_contexts(contexts),
        format_citations(contexts)
    )
}

pub struct RagService {
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatProvider>,
    index: Arc<dyn VectorIndex>,
    classifier: QueryClassifier,
    engine: SearchEngine,
    booster: DocBooster,
    evidence: EvidenceOptions,
}

impl RagService {
    /// A service with default search and evidence settings and no boosts.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            classifier: QueryClassifier::new(chat.clone()),
            embedder,
            chat,
            index,
            engine: SearchEngine::default(),
            booster: DocBooster::default(),
            evidence: EvidenceOptions::default(),
        }
    }

    pub fn from_config(
        config: &RetrieverConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        Self::new(embedder, chat, index)
            .with_search_options(config.search.clone())?
            .with_booster(DocBooster::new(&config.doc_boosts)?)
            .with_evidence_options(config.evidence.clone())
    }

    pub fn with_search_options(self, options: SearchOptions) -> Result<Self> {
        Ok(Self {
            engine: SearchEngine::new(options)?,
            ..self
        })
    }

    pub fn with_booster(self, booster: DocBooster) -> Self {
        Self { booster, ..self }
    }

    pub fn with_evidence_options(self, evidence: EvidenceOptions) -> Result<Self> {
        evidence.validate()?;
        Ok(Self { evidence, ..self })
    }

    /// Default number of contexts returned by [`RagService::retrieve`].
    pub fn default_k(&self) -> usize {
        self.engine.options().k_final
    }

    /// Classify and embed the question, then search and re-rank.
    ///
    /// A blank question returns an empty retrieval without calling any
    /// provider.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Retrieval> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(Retrieval::default());
        }
        if k == 0 {
            return Err(RetrieverError::config("k must be positive"));
        }

        let (classified, query_vector) = tokio::join!(
            self.classifier.classify(question),
            self.embedder.embed_one(question)
        );
        let query_vector = query_vector?;
        let boosts = self.booster.boosts_for(question);

        let hits = self
            .engine
            .search(
                self.index.as_ref(),
                query_vector.clone(),
                k,
                &classified.to_filter(),
                &boosts,
            )
            .await?;
        info!("Retrieved {} contexts", hits.len());

        Ok(Retrieval {
            classified,
            contexts: hits.into_iter().map(Context::from).collect(),
            query_vector,
        })
    }

    /// Retrieve, then have the chat provider write a cited answer.
    pub async fn answer(&self, question: &str, mode: AnswerMode, k: usize) -> Result<Answer> {
        let retrieval = self.retrieve(question, k).await?;
        if retrieval.query_vector.is_empty() {
            return Ok(Answer::default());
        }
        self.compose(question.trim(), mode, retrieval).await
    }

    /// Like [`RagService::answer`], also returning the retrieval for evidence.
    pub async fn answer_with_retrieval(
        &self,
        question: &str,
        mode: AnswerMode,
        k: usize,
    ) -> Result<(Answer, Retrieval)> {
        let retrieval = self.retrieve(question, k).await?;
        if retrieval.query_vector.is_empty() {
            return Ok((Answer::default(), retrieval));
        }
        let answer = self.compose(question.trim(), mode, retrieval.clone()).await?;
        Ok((answer, retrieval))
    }

    async fn compose(&self, question: &str, mode: AnswerMode, retrieval: Retrieval) -> Result<Answer> {
        let Retrieval {
            classified,
            contexts,
            ..
        } = retrieval;

        let request = ChatRequest::new(vec![
            ChatMessage::system(mode.system_prompt()),
            ChatMessage::user(answer_prompt(question, &classified, &contexts)),
        ])
        .with_temperature(ANSWER_TEMPERATURE);
        let completion = self.chat.complete(request).await?;

        Ok(Answer {
            text: completion.text.trim().to_string(),
            usage_tokens: completion.usage_tokens,
            contexts,
            classified,
        })
    }

    /// Sentence evidence for a retrieval.
    pub async fn evidence(&self, retrieval: &Retrieval) -> Result<Vec<Evidence>> {
        if retrieval.query_vector.is_empty() || retrieval.contexts.is_empty() {
            return Ok(Vec::new());
        }
        select_evidence(
            self.embedder.as_ref(),
            &retrieval.query_vector,
            &retrieval.contexts,
            &self.evidence,
        )
        .await
    }
}
