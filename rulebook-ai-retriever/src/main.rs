use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rulebook_ai_context::{Chunker, TiktokenTokenizer};
use rulebook_ai_provider::{MistralChatProvider, MistralEmbedProvider, ProviderConfig};
use rulebook_ai_retriever::{
    AnswerMode, DocumentKind, DocumentRegistry, Evidence, IngestRequest, Ingestor, QdrantIndex,
    RagService, Retrieval, RetrieverConfig, VectorIndex,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ingest poker rulebooks into a vector index and ask questions about them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a PDF or text document
    Ingest {
        /// Document to ingest
        file: PathBuf,
        /// Document identifier (defaults to the file name)
        #[arg(long)]
        doc_id: Option<String>,
        /// Display title (defaults to the document identifier)
        #[arg(long)]
        title: Option<String>,
        /// Version label (defaults to today's date)
        #[arg(long)]
        version: Option<String>,
        /// Format tags (comma-separated)
        #[arg(long, value_delimiter = ',')]
        format_tags: Vec<String>,
        /// Phase tags (comma-separated)
        #[arg(long, value_delimiter = ',')]
        phase_tags: Vec<String>,
        /// Skip the document when the registry already holds the same bytes
        #[arg(long)]
        skip_unchanged: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Retrieve re-ranked contexts for a question
    Retrieve {
        question: String,
        /// Number of contexts
        #[arg(short)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Answer a question with citations
    Ask {
        question: String,
        /// Answer style: beginner or referee
        #[arg(short, long, default_value = "beginner")]
        mode: AnswerMode,
        /// Number of contexts
        #[arg(short)]
        k: Option<usize>,
        /// Also select supporting sentences
        #[arg(long)]
        evidence: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show the sentences that best support a question
    Evidence {
        question: String,
        /// Number of contexts
        #[arg(short)]
        k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// List ingested document revisions
    Docs {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Create the collection or rebuild it for the embedding dimension
    EnsureCollection {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    answer: &'a rulebook_ai_retriever::Answer,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence: Option<&'a [Evidence]>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn rag_service(config: &RetrieverConfig) -> anyhow::Result<RagService> {
    let provider = ProviderConfig::from_env()?;
    let embedder = Arc::new(MistralEmbedProvider::new(provider.clone())?);
    let chat = Arc::new(MistralChatProvider::new(provider)?);
    let index = Arc::new(QdrantIndex::new(&config.qdrant)?);
    Ok(RagService::from_config(config, embedder, chat, index)?)
}

async fn open_registry(config: &RetrieverConfig) -> anyhow::Result<Option<DocumentRegistry>> {
    match &config.registry {
        Some(path) => Ok(Some(DocumentRegistry::open(path).await?)),
        None => Ok(None),
    }
}

fn print_retrieval(retrieval: &Retrieval) {
    println!(
        "Classification: format={:?} phase={:?}",
        retrieval.classified.format, retrieval.classified.phase
    );
    if retrieval.contexts.is_empty() {
        println!("No contexts found.");
        return;
    }
    for (i, c) in retrieval.contexts.iter().enumerate() {
        println!(
            "[{}] {:.4} (sim {:.4}) {} §{} p.{}-{} v.{}",
            i + 1,
            c.score,
            c.similarity,
            c.doc_id,
            if c.section.is_empty() { "-" } else { &c.section },
            c.page_start,
            c.page_end,
            c.version
        );
        let preview: String = c.text.chars().take(160).collect();
        println!("    {}", preview.replace('\n', " "));
    }
}

fn print_evidence(evidence: &[Evidence]) {
    if evidence.is_empty() {
        println!("No evidence found.");
        return;
    }
    for e in evidence {
        println!(
            "- ({:.4}) {} p.{}: {}",
            e.sent_score, e.context.doc_id, e.context.page_start, e.sent_text
        );
    }
}

fn default_doc_id(file: &Path) -> anyhow::Result<String> {
    file.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("Cannot derive a document id from {}", file.display()))
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = RetrieverConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Ingest {
            file,
            doc_id,
            title,
            version,
            format_tags,
            phase_tags,
            skip_unchanged,
            format,
        } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let doc_id = match doc_id {
                Some(id) => id,
                None => default_doc_id(&file)?,
            };

            let mut request = IngestRequest::new(bytes, DocumentKind::from_path(&file), doc_id)
                .with_tags(
                    format_tags.into_iter().filter(|t| !t.is_empty()).collect(),
                    phase_tags.into_iter().filter(|t| !t.is_empty()).collect(),
                );
            if let Some(title) = title {
                request = request.with_title(title);
            }
            if let Some(version) = version {
                request = request.with_version(version);
            }

            let chunker = Chunker::new(
                Arc::new(TiktokenTokenizer::cl100k()?),
                config.chunking,
            )?;
            let embedder = Arc::new(MistralEmbedProvider::new(ProviderConfig::from_env()?)?);
            let index = Arc::new(QdrantIndex::new(&config.qdrant)?);

            let mut ingestor = Ingestor::new(chunker, embedder, index, config.ingest.clone())?
                .with_allow_recreate(config.qdrant.allow_recreate)
                .with_skip_unchanged(skip_unchanged);
            if let Some(registry) = open_registry(&config).await? {
                ingestor = ingestor.with_registry(registry);
            } else if skip_unchanged {
                anyhow::bail!("--skip-unchanged needs a registry (set `registry` or RULEBOOK_REGISTRY)");
            }

            let report = ingestor.ingest(&request).await?;
            match format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Summary => {
                    if report.skipped {
                        println!("{} unchanged ({}), skipped", report.doc_id, report.fingerprint);
                    } else {
                        println!(
                            "Ingested {} v.{}: {} pages, {} chunks into {}",
                            report.doc_id,
                            report.version,
                            report.pages,
                            report.chunks_written,
                            config.qdrant.collection
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::Retrieve { question, k, format } => {
            let service = rag_service(&config)?;
            let retrieval = service
                .retrieve(&question, k.unwrap_or_else(|| service.default_k()))
                .await?;
            match format {
                OutputFormat::Json => print_json(&retrieval)?,
                OutputFormat::Summary => print_retrieval(&retrieval),
            }
            Ok(())
        }
        Commands::Ask {
            question,
            mode,
            k,
            evidence,
            format,
        } => {
            let service = rag_service(&config)?;
            let k = k.unwrap_or_else(|| service.default_k());
            let (answer, retrieval) = service.answer_with_retrieval(&question, mode, k).await?;
            let evidence = if evidence {
                Some(service.evidence(&retrieval).await?)
            } else {
                None
            };

            match format {
                OutputFormat::Json => print_json(&AskOutput {
                    answer: &answer,
                    evidence: evidence.as_deref(),
                })?,
                OutputFormat::Summary => {
                    println!("{}\n", answer.text);
                    println!(
                        "{} contexts, {} tokens used",
                        answer.contexts.len(),
                        answer.usage_tokens
                    );
                    if let Some(evidence) = &evidence {
                        println!("\nEvidence:");
                        print_evidence(evidence);
                    }
                }
            }
            Ok(())
        }
        Commands::Evidence { question, k, format } => {
            let service = rag_service(&config)?;
            let retrieval = service
                .retrieve(&question, k.unwrap_or_else(|| service.default_k()))
                .await?;
            let evidence = service.evidence(&retrieval).await?;
            match format {
                OutputFormat::Json => print_json(&evidence)?,
                OutputFormat::Summary => print_evidence(&evidence),
            }
            Ok(())
        }
        Commands::Docs { format } => {
            let registry = open_registry(&config).await?.ok_or_else(|| {
                anyhow::anyhow!("No registry configured (set `registry` or RULEBOOK_REGISTRY)")
            })?;
            let records = registry.list().await?;
            match format {
                OutputFormat::Json => print_json(&records)?,
                OutputFormat::Summary => {
                    if records.is_empty() {
                        println!("No documents ingested.");
                    }
                    for r in &records {
                        println!(
                            "{} v.{} \"{}\" {} chunks, {} ({})",
                            r.doc_id,
                            r.version,
                            r.title,
                            r.chunk_count,
                            r.ingested_at.format("%Y-%m-%d %H:%M"),
                            r.fingerprint
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::EnsureCollection { format } => {
            let dimension = ProviderConfig::from_env()?.embedding_dimension;
            let index = QdrantIndex::new(&config.qdrant)?;
            let status = index
                .ensure_collection(dimension, config.qdrant.allow_recreate)
                .await?;
            match format {
                OutputFormat::Json => print_json(&status)?,
                OutputFormat::Summary => println!(
                    "Collection {} ({} dimensions): {:?}",
                    index.collection_name(),
                    dimension,
                    status
                ),
            }
            Ok(())
        }
    }
}
