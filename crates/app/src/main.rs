use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use rag_context_core::{
    chunk_text, index_folder_best_effort, make_snippet, AskOptions, CharacterNgramEmbedder,
    DocumentScope, Embedder, FileTextExtractor, InMemoryVectorIndex, OllamaChatClient,
    OllamaEmbedder, QdrantStore, RagConfig, RagPipeline, Retriever, TextExtractor, VectorIndex,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rag-context", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file. Missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the built-in character n-gram embedder and an in-process index instead of
    /// Ollama embeddings and Qdrant.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_BASE_URL")]
    ollama_url: Option<String>,

    /// Ollama embedding model
    #[arg(long, env = "OLLAMA_EMBED_MODEL")]
    embed_model: Option<String>,

    /// Ollama chat model
    #[arg(long, env = "OLLAMA_CHAT_MODEL")]
    chat_model: Option<String>,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL")]
    qdrant_url: Option<String>,

    /// Qdrant collection
    #[arg(long)]
    qdrant_collection: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Split a document into chunks and print them as JSON.
    Chunk {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        max_words: Option<usize>,
        #[arg(long)]
        overlap_words: Option<usize>,
        /// Carry overlap words across paragraph boundaries too.
        #[arg(long, default_value_t = false)]
        carry_overlap: bool,
    },
    /// Extract, chunk, embed and index every document in a folder.
    Ingest {
        /// Folder searched recursively for .txt, .md and .pdf files.
        #[arg(long)]
        folder: PathBuf,
    },
    /// Print the chunks nearest to a query.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
        /// Restrict results to these document ids. Repeatable.
        #[arg(long = "document")]
        documents: Vec<String>,
        /// Index this folder before searching. Needed with --offline.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Answer a question from the indexed documents, with citations.
    Ask {
        #[arg(long)]
        question: String,
        /// Let the chat model reorder retrieved chunks before answering.
        #[arg(long, default_value_t = false)]
        rerank: bool,
        #[arg(long)]
        top_n_candidates: Option<usize>,
        #[arg(long)]
        top_k_final: Option<usize>,
        /// Restrict retrieval to these document ids. Repeatable.
        #[arg(long = "document")]
        documents: Vec<String>,
        /// Index this folder before asking. Needed with --offline.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    info!(
        version = app_version,
        offline = cli.offline,
        started_at = %Utc::now().to_rfc3339(),
        "rag-context boot"
    );

    if cli.offline {
        let embedder = CharacterNgramEmbedder {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        };
        let index = InMemoryVectorIndex::new(config.qdrant.distance, embedder.dimensions());
        run(cli.command, config, embedder, index).await
    } else {
        let embedder = OllamaEmbedder::new(&config.ollama, config.qdrant.vector_size)?;
        let store = QdrantStore::new(&config.qdrant);
        let writes = matches!(
            cli.command,
            Command::Ingest { .. }
                | Command::Search { folder: Some(_), .. }
                | Command::Ask { folder: Some(_), .. }
        );
        if writes {
            store
                .ensure_collection()
                .await
                .context("qdrant collection is not usable")?;
        }
        run(cli.command, config, embedder, store).await
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<RagConfig> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RagConfig::default(),
    };

    if let Some(url) = &cli.ollama_url {
        config.ollama.base_url = url.clone();
    }
    if let Some(model) = &cli.embed_model {
        config.ollama.embed_model = model.clone();
    }
    if let Some(model) = &cli.chat_model {
        config.ollama.chat_model = model.clone();
    }
    if let Some(url) = &cli.qdrant_url {
        config.qdrant.url = url.clone();
    }
    if let Some(collection) = &cli.qdrant_collection {
        config.qdrant.collection = collection.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run<E, V>(command: Command, config: RagConfig, embedder: E, index: V) -> anyhow::Result<()>
where
    E: Embedder,
    V: VectorIndex,
{
    match command {
        Command::Chunk {
            file,
            max_words,
            overlap_words,
            carry_overlap,
        } => {
            let mut chunking = config.chunking;
            if let Some(max_words) = max_words {
                chunking.max_words = max_words;
            }
            if let Some(overlap_words) = overlap_words {
                chunking.overlap_words = overlap_words;
            }
            chunking.carry_paragraph_overlap |= carry_overlap;

            let text = FileTextExtractor.extract(&file)?;
            let source = file.to_string_lossy();
            let chunks = chunk_text(&text, chunking, Some(&*source))?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        }
        Command::Ingest { folder } => {
            ingest(&folder, &config, &embedder, &index).await?;
        }
        Command::Search {
            query,
            top_k,
            documents,
            folder,
        } => {
            if let Some(folder) = folder {
                ingest(&folder, &config, &embedder, &index).await?;
            }

            let top_k = top_k.unwrap_or(config.retrieval.top_k);
            let scope = DocumentScope::documents(documents);
            let candidates = Retriever::new(&embedder, &index)
                .retrieve(&query, top_k, &scope)
                .await?;

            println!("query: {query}");
            if candidates.is_empty() {
                println!("no matching chunks");
            }
            for candidate in candidates {
                let (snippet, _) =
                    make_snippet(&candidate.content, config.retrieval.citation_snippet_chars);
                println!(
                    "[{}] score={:.4} file={} chunk={}",
                    candidate.local_id,
                    candidate.similarity_score,
                    candidate.file_name,
                    candidate.chunk_index
                );
                println!("  {snippet}");
            }
        }
        Command::Ask {
            question,
            rerank,
            top_n_candidates,
            top_k_final,
            documents,
            folder,
        } => {
            if let Some(folder) = folder {
                ingest(&folder, &config, &embedder, &index).await?;
            }

            let mut options = AskOptions::from_config(&config.retrieval);
            options.use_rerank |= rerank;
            if let Some(top_n_candidates) = top_n_candidates {
                options.top_n_candidates = top_n_candidates;
            }
            if let Some(top_k_final) = top_k_final {
                options.top_k_final = top_k_final;
            }
            options.scope = DocumentScope::documents(documents);

            let generator = OllamaChatClient::new(&config.ollama)?;
            info!(model = generator.model(), rerank = options.use_rerank, "asking");
            let pipeline = RagPipeline::new(embedder, index, generator, config)?;
            let answer = pipeline.answer(&question, &options).await?;

            if let Some(reason) = &answer.rerank_fallback {
                warn!(?reason, "rerank reply was unusable, retrieval order kept");
            }

            println!("question: {}", answer.question);
            println!("answer:\n{}", answer.answer);
            if !answer.citations.is_empty() {
                println!("sources:");
            }
            for citation in answer.citations {
                println!(
                    "[{}] rank={} score={:.3} file={} chunk={}",
                    citation.local_id,
                    citation.original_rank,
                    citation.rerank_score.unwrap_or(citation.similarity_score),
                    citation.file_name,
                    citation.chunk_index
                );
                println!("  {}", citation.snippet);
            }
        }
    }

    Ok(())
}

async fn ingest<E, V>(folder: &Path, config: &RagConfig, embedder: &E, index: &V) -> anyhow::Result<()>
where
    E: Embedder,
    V: VectorIndex,
{
    let report =
        index_folder_best_effort(folder, &FileTextExtractor, embedder, index, config.chunking)
            .await
            .with_context(|| format!("failed to ingest {}", folder.display()))?;

    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for folder={}",
            report.skipped_files.len(),
            folder.display()
        );
        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
        }
    }

    for document in &report.documents {
        println!(
            "{} chunks={} id={} sha256={}",
            document.document.file_name,
            document.chunk_count,
            document.document.document_id,
            document.content_digest
        );
    }
    println!(
        "{} documents, {} chunks ingested at {}",
        report.documents.len(),
        report.chunk_count(),
        Utc::now().to_rfc3339()
    );
    Ok(())
}
