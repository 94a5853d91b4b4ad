use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use policyqa::{
    ChunkStore, DataDir, Pipeline, PipelineConfig, Settings, VectorIndex,
    cli::{Cli, Command, IngestArgs, ServeArgs, StatusArgs},
    embedding::HttpEmbedder,
    error::{Error, Result},
    generate::ChatGenerator,
    ingestion,
    loader::SUPPORTED_EXTENSIONS,
    server::{self, AppState},
    webhook::WebhookState,
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("POLICYQA_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let settings = Settings::from_env()?;
    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let store = Arc::new(ChunkStore::open(
        &data_dir.index_db(&settings.vectorstore_name),
    )?);

    match cli.command {
        Command::Serve(args) => serve(&args, &settings, store).await,
        Command::Ingest(args) => cmd_ingest(&args, &settings, &store).await,
        Command::Status(args) => cmd_status(&args, &store),
    }
}

fn provider_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?)
}

fn embedder(
    settings: &Settings,
    http: &reqwest::Client,
) -> Result<HttpEmbedder> {
    let api_key = settings
        .embedding_api_key
        .clone()
        .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".into()))?;
    Ok(HttpEmbedder::new(
        http.clone(),
        settings.embedding_api_base.clone(),
        api_key,
        settings.embedding_model.clone(),
    ))
}

async fn serve(
    args: &ServeArgs,
    settings: &Settings,
    store: Arc<ChunkStore>,
) -> Result<()> {
    let http = provider_client()?;

    let generator_key = settings
        .llm_api_key
        .clone()
        .ok_or_else(|| Error::Config("GROQ_API_KEY is not set".into()))?;
    let generator = ChatGenerator::new(
        http.clone(),
        settings.llm_api_base.clone(),
        generator_key,
        settings.llm_model.clone(),
    );

    let pipeline = Pipeline::new(
        VectorIndex::new(store.clone()),
        embedder(settings, &http)?,
        generator,
        PipelineConfig {
            default_top_k: settings.default_top_k,
            max_top_k: settings.max_top_k,
            score_threshold: settings.score_threshold,
            model_name: settings.llm_model.clone(),
        },
    );

    let webhook = settings
        .webhook
        .as_ref()
        .map(|w| WebhookState::from_settings(w, http.clone()));
    if webhook.is_none() {
        tracing::warn!("webhook not configured; /webhook will reject traffic");
    }

    let state = Arc::new(AppState {
        pipeline,
        store,
        chunking: policyqa::chunking::ChunkingConfig {
            chunk_size: settings.chunk_size,
            overlap: settings.chunk_overlap,
        },
        api_key: settings.api_key.clone(),
        webhook,
    });

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(addr = %args.bind, "listening");
    axum::serve(listener, server::router(state)).await?;
    Ok(())
}

async fn cmd_ingest(
    args: &IngestArgs,
    settings: &Settings,
    store: &ChunkStore,
) -> Result<()> {
    let http = provider_client()?;
    let embedder = embedder(settings, &http)?;

    let mut files = Vec::new();
    for path in &args.paths {
        collect_files(path, &mut files)?;
    }
    if files.is_empty() {
        return Err(Error::Config(format!(
            "no policy files found (supported: {})",
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let config = policyqa::chunking::ChunkingConfig {
        chunk_size: settings.chunk_size,
        overlap: settings.chunk_overlap,
    };
    let report =
        ingestion::ingest_batch(store, &embedder, &config, &files).await;

    println!("{} chunk(s) upserted", report.upserted);
    for error in &report.errors {
        eprintln!("error: {error}");
    }
    Ok(())
}

/// Gather ingestable files: explicit file paths are taken as-is, while
/// directories are walked recursively for supported extensions, skipping
/// hidden entries.
fn collect_files(
    path: &PathBuf,
    files: &mut Vec<(String, Vec<u8>)>,
) -> Result<()> {
    if path.is_dir() {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        for entry in entries {
            let hidden = entry
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if hidden {
                continue;
            }
            if entry.is_dir() {
                collect_files(&entry, files)?;
            } else if entry
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| {
                    SUPPORTED_EXTENSIONS
                        .contains(&e.to_ascii_lowercase().as_str())
                })
            {
                push_file(&entry, files)?;
            }
        }
    } else {
        push_file(path, files)?;
    }
    Ok(())
}

fn push_file(
    path: &PathBuf,
    files: &mut Vec<(String, Vec<u8>)>,
) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::Config(format!("invalid path: {}", path.display()))
        })?
        .to_string();
    files.push((filename, std::fs::read(path)?));
    Ok(())
}

fn cmd_status(args: &StatusArgs, store: &ChunkStore) -> Result<()> {
    let docs = store.list_documents()?;
    let chunks = store.chunk_count()?;

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "documents": docs.len(),
                "chunks": chunks,
                "docs": docs,
            })
        );
    } else {
        println!("{} document(s), {} chunk(s)", docs.len(), chunks);
        for doc in &docs {
            println!(
                "  {} [{}] {} chunk(s)",
                doc.doc_id,
                doc.category.as_deref().unwrap_or("-"),
                doc.chunks
            );
        }
    }
    Ok(())
}
