use clap::Parser;
use rulebook_ai_context::{ChunkOptions, Chunker, TiktokenTokenizer, detect_section};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::sync::Arc;

/// Chunk a text document into token-bounded JSON chunks.
///
/// Pages are separated by form feed characters.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum number of tokens per chunk.
    #[arg(short, long, default_value_t = rulebook_ai_context::chunker::DEFAULT_MAX_TOKENS)]
    max_tokens: usize,

    /// Tokens shared by consecutive chunks of one page.
    #[arg(short, long, default_value_t = rulebook_ai_context::chunker::DEFAULT_OVERLAP_TOKENS)]
    overlap_tokens: usize,
}

#[derive(Serialize)]
struct ChunkRecord<'a> {
    chunk_index: usize,
    page_start: usize,
    page_end: usize,
    tokens: usize,
    section: String,
    text: &'a str,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let tokenizer = Arc::new(TiktokenTokenizer::cl100k()?);
    let chunker = Chunker::new(
        tokenizer,
        ChunkOptions::new(args.max_tokens, args.overlap_tokens),
    )?;

    let pages: Vec<&str> = content.split('\u{000C}').collect();
    let chunks = chunker.chunk_pages(&pages);

    let records: Vec<ChunkRecord> = chunks
        .iter()
        .map(|c| ChunkRecord {
            chunk_index: c.chunk_index,
            page_start: c.page_start,
            page_end: c.page_end,
            tokens: chunker.count_tokens(&c.text),
            section: detect_section(&c.text),
            text: &c.text,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&records)?);

    Ok(())
}
