use anyhow::Result;
use async_trait::async_trait;
use rulebook_ai_context::{ChunkOptions, Chunker, TiktokenTokenizer};
use rulebook_ai_provider::{ChatCompletion, ChatProvider, ChatRequest, EmbeddingProvider};
use rulebook_ai_retriever::addressing::{doc_hash32, point_id};
use rulebook_ai_retriever::{
    AnswerMode, DocumentKind, DocumentRegistry, InMemoryIndex, IngestRequest, IngestSettings,
    Ingestor, RagService, RetrieverError, VectorIndex,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

const DIMENSION: usize = 64;

/// Bag of hashed words: texts sharing words get close vectors.
struct HashingEmbedder;

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> rulebook_ai_provider::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; DIMENSION];
                for word in text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w.len() > 2)
                {
                    vector[doc_hash32(word) as usize % DIMENSION] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn embedding_dimension(&self) -> usize {
        DIMENSION
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

/// Answers every classification request with `classification` and every
/// answer request with a fixed text.
struct FixedChat {
    classification: String,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FixedChat {
    fn new(classification: &str) -> Self {
        Self {
            classification: classification.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatProvider for FixedChat {
    async fn complete(&self, request: ChatRequest) -> rulebook_ai_provider::Result<ChatCompletion> {
        let is_answer = request.temperature > 0.0;
        self.requests.lock().unwrap().push(request);
        Ok(ChatCompletion {
            text: if is_answer {
                "Le dernier agresseur montre en premier [1].".to_string()
            } else {
                self.classification.clone()
            },
            usage_tokens: 42,
        })
    }

    fn provider_name(&self) -> &str {
        "fixed"
    }
}

const RULES: &str = "RÈGLE 1: LE BOUTON\nLe bouton avance d'un siège vers la gauche après chaque donne. Le donneur distribue en commençant à gauche du bouton.\x0c\
RÈGLE 2: LES BLINDES\nLa petite blinde est placée à gauche du bouton. La grosse blinde suit la petite blinde.\x0c\
RÈGLE 3: LE SHOWDOWN\nAu showdown, le dernier agresseur montre ses cartes en premier. Les cartes restent visibles sur la table.";

const TDA: &str = "Rule 1 Button\nThe button moves clockwise after every hand. Dead button rules apply in tournaments.";

fn ingestor(index: Arc<InMemoryIndex>) -> Result<Ingestor> {
    let chunker = Chunker::new(
        Arc::new(TiktokenTokenizer::cl100k()?),
        ChunkOptions::default(),
    )?;
    Ok(Ingestor::new(
        chunker,
        Arc::new(HashingEmbedder),
        index,
        IngestSettings::default(),
    )?)
}

fn rules_request(text: &str) -> IngestRequest {
    IngestRequest::new(text.as_bytes().to_vec(), DocumentKind::Text, "rules.txt")
        .with_title("Règlement maison")
        .with_version("2025-02")
        .with_tags(vec!["cash".into()], vec!["deal".into(), "showdown".into()])
}

async fn point_ids(index: &InMemoryIndex, doc_id: &str) -> BTreeSet<u64> {
    index
        .points()
        .await
        .into_iter()
        .filter(|p| p.payload.doc_id == doc_id)
        .map(|p| p.id)
        .collect()
}

#[tokio::test]
async fn test_ingest_retrieve_and_evidence() -> Result<()> {
    let index = Arc::new(InMemoryIndex::new("poker_rules"));
    let ingestor = ingestor(index.clone())?;

    let report = ingestor.ingest(&rules_request(RULES)).await?;
    assert_eq!(report.pages, 3);
    assert_eq!(report.chunks_written, 3);
    ingestor
        .ingest(&IngestRequest::new(TDA.as_bytes().to_vec(), DocumentKind::Text, "tda.txt").with_version("2024"))
        .await?;
    assert_eq!(index.len().await, 4);

    let stored = index.points().await;
    let showdown = stored
        .iter()
        .find(|p| p.payload.doc_id == "rules.txt" && p.payload.chunk_index == 2)
        .expect("third chunk stored");
    assert_eq!(showdown.id, point_id("rules.txt", 2));
    assert_eq!(showdown.payload.section, "RÈGLE 3: LE SHOWDOWN");
    assert_eq!((showdown.payload.page_start, showdown.payload.page_end), (3, 3));
    assert_eq!(showdown.payload.title, "Règlement maison");

    let chat = Arc::new(FixedChat::new(r#"{"format":[],"phase":["showdown"]}"#));
    let service = RagService::new(Arc::new(HashingEmbedder), chat.clone(), index.clone());

    let retrieval = service
        .retrieve("Qui montre ses cartes en premier au showdown ?", 12)
        .await?;
    assert_eq!(retrieval.classified.phase, vec!["showdown"]);
    assert!(!retrieval.contexts.is_empty());
    assert_eq!(retrieval.contexts[0].doc_id, "rules.txt");
    assert_eq!(retrieval.contexts[0].chunk_index, 2);
    assert!(retrieval.contexts[0].score > retrieval.contexts[0].similarity);

    let evidence = service.evidence(&retrieval).await?;
    assert!(!evidence.is_empty() && evidence.len() <= 8);
    assert!(evidence[0].sent_text.contains("agresseur"));
    for e in &evidence {
        assert!(e.rel_start <= e.rel_end && e.rel_end <= e.preview.len());
    }

    let answer = service
        .answer("Qui montre ses cartes en premier au showdown ?", AnswerMode::Beginner, 2)
        .await?;
    assert_eq!(answer.usage_tokens, 42);
    assert!(answer.contexts.len() <= 2);
    let requests = chat.requests.lock().unwrap();
    let prompt = &requests.last().unwrap().messages[1].content;
    assert!(prompt.contains("[1] Doc: rules.txt, §RÈGLE 3: LE SHOWDOWN, p.3–3, v.2025-02"));
    Ok(())
}

#[tokio::test]
async fn test_reingest_is_idempotent() -> Result<()> {
    let index = Arc::new(InMemoryIndex::new("poker_rules"));
    let ingestor = ingestor(index.clone())?;

    ingestor.ingest(&rules_request(RULES)).await?;
    let first = point_ids(&index, "rules.txt").await;
    let second_report = ingestor.ingest(&rules_request(RULES)).await?;
    let second = point_ids(&index, "rules.txt").await;

    assert_eq!(first, second);
    assert_eq!(index.len().await, 3);
    assert_eq!(
        second_report.collection,
        Some(rulebook_ai_retriever::CollectionStatus::Unchanged)
    );
    Ok(())
}

#[tokio::test]
async fn test_shorter_revision_removes_stale_chunks() -> Result<()> {
    let index = Arc::new(InMemoryIndex::new("poker_rules"));
    let ingestor = ingestor(index.clone())?;
    ingestor
        .ingest(&IngestRequest::new(TDA.as_bytes().to_vec(), DocumentKind::Text, "tda.txt"))
        .await?;

    ingestor.ingest(&rules_request(RULES)).await?;
    let shorter: String = RULES.split('\x0c').take(1).collect();
    let report = ingestor.ingest(&rules_request(&shorter)).await?;

    assert_eq!(report.chunks_written, 1);
    assert_eq!(
        point_ids(&index, "rules.txt").await,
        BTreeSet::from([point_id("rules.txt", 0)])
    );
    assert_eq!(point_ids(&index, "tda.txt").await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unparsable_classification_still_retrieves() -> Result<()> {
    let index = Arc::new(InMemoryIndex::new("poker_rules"));
    ingestor(index.clone())?.ingest(&rules_request(RULES)).await?;

    let service = RagService::new(
        Arc::new(HashingEmbedder),
        Arc::new(FixedChat::new("Bien sûr ! La question porte sur le showdown.")),
        index,
    );
    let retrieval = service
        .retrieve("Où se place la petite blinde par rapport au bouton ?", 12)
        .await?;

    assert!(retrieval.classified.format.is_empty());
    assert!(retrieval.classified.phase.is_empty());
    assert_eq!(retrieval.contexts[0].chunk_index, 1);
    Ok(())
}

#[tokio::test]
async fn test_blank_document_fails_extraction() -> Result<()> {
    let index = Arc::new(InMemoryIndex::new("poker_rules"));
    let err = ingestor(index.clone())?
        .ingest(&IngestRequest::new(b" \x0c \n ".to_vec(), DocumentKind::Text, "blank.txt"))
        .await
        .unwrap_err();

    assert!(matches!(err, RetrieverError::Extraction { .. }));
    assert_eq!(index.collection_dimension().await?, None);
    Ok(())
}

#[tokio::test]
async fn test_token_ceiling_aborts_before_embedding() -> Result<()> {
    let index = Arc::new(InMemoryIndex::new("poker_rules"));
    let chunker = Chunker::new(Arc::new(TiktokenTokenizer::cl100k()?), ChunkOptions::default())?;
    let ingestor = Ingestor::new(
        chunker,
        Arc::new(HashingEmbedder),
        index.clone(),
        IngestSettings {
            batch_size: 32,
            token_ceiling: 10,
        },
    )?;

    let err = ingestor.ingest(&rules_request(RULES)).await.unwrap_err();

    assert!(matches!(
        err,
        RetrieverError::TokenBudget { chunk_index: 0, limit: 10, .. }
    ));
    assert!(index.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_registry_tracks_revisions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = DocumentRegistry::open(&dir.path().join("registry.db")).await?;
    let index = Arc::new(InMemoryIndex::new("poker_rules"));
    let ingestor = ingestor(index)?
        .with_registry(registry.clone())
        .with_skip_unchanged(true);

    ingestor.ingest(&rules_request(RULES)).await?;
    let skipped = ingestor.ingest(&rules_request(RULES)).await?;
    assert!(skipped.skipped);

    let records = registry.list().await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].chunk_count, 3);
    assert_eq!(records[0].version, "2025-02");
    Ok(())
}
