//! Scholas CLI
//!
//! Ingest a directory of papers into a Chroma collection, then ask questions
//! answered from those papers with page-level citations.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use futures::StreamExt;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use scholas_lib::chroma::ChromaError;
use scholas_lib::{
    ChromaClient, ChromaIndex, DocumentOutcome, Embedder, Ingestor, OllamaEmbedder, OllamaGenerator,
    QueryError, QueryPipeline, Settings, VectorIndex,
};

/// Characters shown per hit by `search`
const PREVIEW_CHARS: usize = 300;

#[derive(Parser)]
#[command(name = "scholas")]
#[command(about = "Scholas - ask questions answered from your own papers", long_about = None)]
struct Cli {
    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Number of chunks to retrieve (overrides TOP_K)
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Confidence floor for context (overrides MIN_SCORE)
    #[arg(long, global = true)]
    min_score: Option<f32>,

    /// Wait for the whole answer instead of streaming it
    #[arg(long, global = true)]
    no_stream: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk and index every PDF/text file in a directory
    Ingest {
        /// Directory holding the source documents
        dir: PathBuf,
    },
    /// Answer a question from the indexed documents
    Ask {
        /// Question (prompted for when omitted)
        question: Vec<String>,
    },
    /// Show matching chunks without generating an answer
    Search {
        /// Question (prompted for when omitted)
        question: Vec<String>,
    },
    /// Check the Chroma server and count indexed chunks
    Status,
    /// Drop the collection and everything in it
    Reset,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(top_k) = cli.top_k {
        settings.top_k = top_k;
    }
    if let Some(min_score) = cli.min_score {
        settings.min_score = min_score;
    }
    if cli.no_stream {
        settings.stream_output = false;
    }
    settings.validate()?;

    let client = ChromaClient::new(&settings.chroma_url);

    match cli.command {
        Commands::Ingest { dir } => handle_ingest(&settings, client, dir).await,
        Commands::Ask { question } => handle_ask(&settings, client, question).await,
        Commands::Search { question } => handle_search(&settings, client, question).await,
        Commands::Status => handle_status(&settings, client).await,
        Commands::Reset => handle_reset(&settings, client).await,
    }
}

// ============ Handlers ============

async fn open_index(settings: &Settings, client: ChromaClient) -> Result<ChromaIndex> {
    let embedder: Arc<dyn Embedder> =
        Arc::new(OllamaEmbedder::new(&settings.ollama_url, &settings.embed_model));
    let url = client.base_url().to_string();
    let name = &settings.chroma_collection;
    ChromaIndex::open(client, name, settings.distance_metric()?, embedder)
        .await
        .with_context(|| format!("Failed to open collection '{}' at {}", name, url))
}

async fn handle_ingest(settings: &Settings, client: ChromaClient, dir: PathBuf) -> Result<()> {
    let index = open_index(settings, client).await?;
    let report = Ingestor::new(&index, settings.chunker()?)
        .with_batch_size(settings.batch_size)
        .ingest_directory(&dir)
        .await?;

    for doc in &report.documents {
        match &doc.outcome {
            DocumentOutcome::Indexed { chunks, .. } => {
                println!("[+] {}: {} chunks", doc.source_file, chunks)
            }
            DocumentOutcome::Skipped => println!("[skip] {} – no text found", doc.source_file),
            DocumentOutcome::Failed { error } => println!("[fail] {}: {}", doc.source_file, error),
        }
    }
    println!("\nIngest complete. {} chunks added.", report.total_chunks);

    index.close().await?;
    Ok(())
}

async fn handle_ask(settings: &Settings, client: ChromaClient, words: Vec<String>) -> Result<()> {
    let question = read_question(words)?;
    let index = open_index(settings, client).await?;
    let pipeline = QueryPipeline::new(&index, settings.top_k, settings.prompt_assembler());

    let prepared = match pipeline.prepare(&question).await {
        Ok(prepared) => prepared,
        Err(QueryError::NoHits) => {
            println!("No results found.");
            index.close().await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("\nBest match score: {:.3}", prepared.best_score);
    if prepared.low_confidence {
        println!("⚠️ Low confidence retrieval — answer may be uncertain.\n");
    }

    let generator = OllamaGenerator::new(
        &settings.ollama_url,
        &settings.llm_model,
        settings.generation_options(),
    );
    println!("\n=== ANSWER ===\n");
    let mut fragments = pipeline
        .answer(&prepared, &generator, settings.generation_mode())
        .await?;

    let mut stdout = io::stdout();
    while let Some(fragment) = fragments.next().await {
        print!("{}", fragment?);
        stdout.flush()?;
    }
    println!();

    println!("\n=== TOP MATCHES ===");
    for (i, hit) in prepared.hits.iter().enumerate() {
        println!("[{}] {} — score={:.3}", i + 1, hit.label(), hit.score);
    }

    index.close().await?;
    Ok(())
}

async fn handle_search(
    settings: &Settings,
    client: ChromaClient,
    words: Vec<String>,
) -> Result<()> {
    let question = read_question(words)?;
    let index = open_index(settings, client).await?;
    let pipeline = QueryPipeline::new(&index, settings.top_k, settings.prompt_assembler());

    let hits = match pipeline.search(&question).await {
        Ok(hits) => hits,
        Err(QueryError::NoHits) => {
            println!("No results found.");
            index.close().await?;
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for (i, hit) in hits.iter().enumerate() {
        if hit.score < pipeline.min_score() {
            continue;
        }
        println!("\n[{}] score={:.3} | {}", i + 1, hit.score, hit.label());
        println!("     {}", hit.preview(PREVIEW_CHARS));
    }

    index.close().await?;
    Ok(())
}

async fn handle_status(settings: &Settings, client: ChromaClient) -> Result<()> {
    client
        .heartbeat()
        .await
        .with_context(|| format!("Chroma is not reachable at {}", client.base_url()))?;
    println!("Chroma: reachable at {}", client.base_url());

    match client.get_collection(&settings.chroma_collection).await {
        Ok(collection) => {
            let count = client.count(&collection.id).await?;
            println!("Collection '{}': {} chunks", collection.name, count);
        }
        Err(ChromaError::CollectionNotFound(name)) => {
            println!("Collection '{}' does not exist yet. Run `scholas ingest <DIR>`.", name);
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn handle_reset(settings: &Settings, client: ChromaClient) -> Result<()> {
    client.delete_collection(&settings.chroma_collection).await?;
    println!("Collection '{}' removed.", settings.chroma_collection);
    Ok(())
}

/// Question from trailing arguments, or one line from stdin
fn read_question(words: Vec<String>) -> Result<String> {
    let question = if words.is_empty() {
        print!("Question: ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        line
    } else {
        words.join(" ")
    };

    let question = question.trim().to_string();
    if question.is_empty() {
        bail!("No question given");
    }
    Ok(question)
}
