use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use docqa_core::config::{Config, Settings};
use docqa_core::data_processor::{ChunkingConfig, DataProcessor};
use docqa_core::metrics::MetricsCollector;
use docqa_core::traits::{DocumentProcessor, DocumentStore, Embedder, LlmClient};
use docqa_embed::embedder_from_settings;
use docqa_hybrid::HybridIndex;
use docqa_llm::OpenAiCompatClient;
use docqa_retrieval::{AnswerService, EmbeddingReranker, LlmTranslator, Retriever, Role, FALLBACK_ANSWER};

const USAGE: &str = "Usage:
  docqa list <dir>
  docqa ingest <dir>
  docqa retrieve <dir> \"<query>\"
  docqa context <dir> \"<query>\"
  docqa ask <dir> \"<query>\" [--role teacher|interviewer|research|debugger]";

struct Args {
    cmd: String,
    dir: PathBuf,
    query: Option<String>,
    role: Role,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = env::args().skip(1);
    let cmd = args.next().context(USAGE)?;
    let mut positional = Vec::new();
    let mut role = Role::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--role" | "-r" => {
                let value = args.next().context("--role requires a value")?;
                role = value.parse().map_err(anyhow::Error::msg)?;
            }
            "--help" | "-h" => bail!(USAGE),
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    let dir = positional.next().map(PathBuf::from).context(USAGE)?;
    let query = positional.next();
    Ok(Args { cmd, dir, query, role })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// In-memory index over every supported file under `dir`.
fn build_index(
    settings: &Settings,
    dir: &Path,
    embedder: Arc<dyn Embedder>,
    metrics: Arc<MetricsCollector>,
) -> anyhow::Result<Arc<HybridIndex>> {
    let index = HybridIndex::new(embedder, metrics, settings.hybrid.clone())?
        .with_recall_safeguard(settings.retrieval.min_candidates, settings.retrieval.retry_ceiling);

    let processor = DataProcessor::with_config(ChunkingConfig::from(&settings.ingest));
    let files = processor.supported_files(dir);
    if files.is_empty() {
        tracing::warn!("No supported files under {}", dir.display());
        return Ok(Arc::new(index));
    }
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    for file in &files {
        pb.set_message(file.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string());
        let chunks = processor.process(std::slice::from_ref(file))?;
        if !chunks.is_empty() {
            index.add(chunks).with_context(|| format!("indexing {}", file.display()))?;
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("{} chunks", index.len()));
    Ok(Arc::new(index))
}

fn llm_client(settings: &Settings) -> anyhow::Result<Arc<dyn LlmClient>> {
    Ok(Arc::new(OpenAiCompatClient::new(settings.llm.clone())?))
}

fn build_retriever(
    settings: &Settings,
    index: Arc<HybridIndex>,
    embedder: Arc<dyn Embedder>,
    metrics: Arc<MetricsCollector>,
) -> anyhow::Result<Retriever> {
    let retriever = Retriever::new(index, Arc::new(EmbeddingReranker::new(embedder)), metrics, settings.retrieval.clone());
    // Without credentials the translation call would only fail and time out.
    if settings.llm.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
        return Ok(retriever.with_translator(Arc::new(LlmTranslator::new(llm_client(settings)?))));
    }
    Ok(retriever)
}

fn require_query(args: &Args) -> anyhow::Result<&str> {
    args.query.as_deref().filter(|q| !q.trim().is_empty()).context(USAGE)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = parse_args()?;
    let config = Config::load().context("loading configuration")?;
    let settings = config.settings()?;
    tracing::debug!("Running in {} environment", config.env_name());

    let metrics = Arc::new(MetricsCollector::new(&settings.metrics));
    let embedder = embedder_from_settings(&settings.embedding).context("initializing embedder")?;
    let index = build_index(&settings, &args.dir, Arc::clone(&embedder), Arc::clone(&metrics))?;

    match args.cmd.as_str() {
        "list" => {
            for s in index.sources() {
                println!("{:>5}  {}", s.chunk_count, s.source);
            }
        }
        "ingest" => {
            println!("Indexed {} chunks from {} files", index.len(), index.sources().len());
        }
        "retrieve" => {
            let query = require_query(&args)?;
            let retriever = build_retriever(&settings, index, embedder, Arc::clone(&metrics))?;
            let retrieval = retriever.retrieve_with_intent(query).await;
            if retrieval.effective_query != retrieval.original_query {
                println!("Query (translated): {}", retrieval.effective_query);
            }
            for (rank, chunk) in retrieval.chunks.iter().enumerate() {
                let preview: String = chunk.content.chars().take(160).collect();
                println!("{:>2}. {} #{}  {}", rank + 1, chunk.display_name(), chunk.metadata.chunk_index, preview.replace('\n', " "));
            }
            tracing::info!("Metrics: {}", serde_json::to_string(&metrics.snapshot())?);
        }
        "context" => {
            let query = require_query(&args)?;
            let retriever = build_retriever(&settings, index, embedder, Arc::clone(&metrics))?;
            let context = retriever.get_relevant_context(query).await;
            if context.is_empty() {
                println!("{FALLBACK_ANSWER}");
            } else {
                println!("{context}");
            }
        }
        "ask" => {
            let query = require_query(&args)?;
            let retriever = build_retriever(&settings, index, embedder, Arc::clone(&metrics))?;
            let service = AnswerService::new(retriever, llm_client(&settings)?);
            let answer = service.answer(query, args.role, &[]).await;
            let mut stream = answer.stream;
            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.next().await {
                match fragment {
                    Ok(text) => {
                        write!(stdout, "{text}")?;
                        stdout.flush()?;
                    }
                    Err(e) => tracing::error!("{:#}", e),
                }
            }
            writeln!(stdout)?;
            for source in answer.sources {
                println!("[image] {} ({})", source.image_url, source.title);
            }
            tracing::info!("Metrics: {}", serde_json::to_string(&metrics.snapshot())?);
        }
        other => bail!("Unknown command: {other}\n{USAGE}"),
    }
    Ok(())
}
