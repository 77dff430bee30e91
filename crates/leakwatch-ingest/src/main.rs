//! Leakwatch - archive attachment ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use leakwatch_common::checksum;
use leakwatch_common::logging::{init_logging, LogConfig, LogLevel};
use leakwatch_ingest::archive::ArchiveExtractor;
use leakwatch_ingest::fetch::{AttachmentFetcher, HttpFetcher, SpoolFetcher};
use leakwatch_ingest::parser::RecordParser;
use leakwatch_ingest::source::{AttachmentSource, JsonLinesSource, SpoolWatcher};
use leakwatch_ingest::store::StoreBackend;
use leakwatch_ingest::{
    Attachment, DedupStore, IngestConfig, IngestionPipeline, MessageId, Monitor, Outcome,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "leakwatch")]
#[command(
    author,
    version,
    about = "Archive attachment ingestion into a deduplicated credential table"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Root for the store, staging areas and inbox
    #[arg(long, global = true, env = "LEAKWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Store file (defaults to a file under the data directory)
    #[arg(long, global = true, env = "LEAKWATCH_STORE_PATH")]
    store: Option<PathBuf>,

    /// Store backend: sqlite or csv
    #[arg(long, global = true, env = "LEAKWATCH_STORE_BACKEND")]
    backend: Option<StoreBackend>,

    /// Attachments processed concurrently
    #[arg(long, global = true, env = "LEAKWATCH_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the data directories and the record table
    Init,

    /// Ingest local archive files once
    Ingest {
        /// Archive files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Provenance id recorded on every row (defaults to a digest of each file)
        #[arg(long)]
        message_id: Option<String>,
    },

    /// Process attachments until interrupted
    Watch {
        /// Read JSON-lines notices from stdin instead of polling the inbox
        #[arg(long)]
        stdin: bool,
    },

    /// Show row count and most frequent domains
    Stats {
        /// Number of domains to list
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("leakwatch")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(path) = cli.store {
        config.store_path = Some(path);
    }
    if let Some(backend) = cli.backend {
        config.store_backend = backend;
    }
    if let Some(max) = cli.max_concurrent {
        config.max_concurrent = max;
    }
    config.validate()?;

    match cli.command {
        Command::Init => init(&config).await,
        Command::Ingest { files, message_id } => ingest(&config, files, message_id).await,
        Command::Watch { stdin } => watch(&config, stdin).await,
        Command::Stats { top } => stats(&config, top).await,
    }
}

async fn open_store(config: &IngestConfig) -> Result<DedupStore> {
    let path = config.store_path();
    let store = DedupStore::open(&path, config.store_backend)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    store
        .initialize()
        .await
        .with_context(|| format!("Failed to initialize store at {}", path.display()))?;
    Ok(store)
}

async fn build_pipeline(
    config: &IngestConfig,
    fetcher: Arc<dyn AttachmentFetcher>,
) -> Result<IngestionPipeline> {
    let staging = config.staging();
    staging
        .ensure()
        .with_context(|| {
            format!(
                "Failed to create staging directories under {}",
                config.data_dir.display()
            )
        })?;

    let store = open_store(config).await?;
    let extractor =
        ArchiveExtractor::new(config.decode_policy).with_max_entry_bytes(config.max_entry_bytes);

    Ok(IngestionPipeline::new(
        fetcher,
        extractor,
        RecordParser::default(),
        store,
        staging,
    ))
}

async fn init(config: &IngestConfig) -> Result<()> {
    config.staging().ensure()?;
    std::fs::create_dir_all(config.inbox_dir())?;

    let store = open_store(config).await?;
    let rows = store.len().await?;

    println!("Data directory: {}", config.data_dir.display());
    println!("Inbox:          {}", config.inbox_dir().display());
    println!("Store:          {} ({} rows)", store.location(), rows);
    Ok(())
}

fn local_message_id(path: &Path, bytes: &[u8]) -> MessageId {
    let digest = checksum::sha256_hex(bytes);
    let id = format!("local-{}", &digest[..16]);
    info!(file = %path.display(), message_id = %id, "Derived message id from file digest");
    MessageId::from(id)
}

async fn ingest(
    config: &IngestConfig,
    files: Vec<PathBuf>,
    message_id: Option<String>,
) -> Result<()> {
    let pipeline = build_pipeline(config, Arc::new(SpoolFetcher::new(config.inbox_dir()))).await?;
    let pipeline = &pipeline;
    let message_id = message_id.as_deref();

    let results: Vec<(PathBuf, Result<Outcome>)> = futures::stream::iter(files)
        .map(|path| async move {
            let outcome = async {
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let filename = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let id = match message_id {
                    Some(id) => MessageId::from(id),
                    None => local_message_id(&path, &bytes),
                };
                let attachment = Attachment::new(id, filename, bytes);
                Ok::<_, anyhow::Error>(pipeline.ingest_bytes(attachment).await)
            }
            .await;
            (path, outcome)
        })
        .buffered(config.max_concurrent)
        .collect()
        .await;

    let mut failures = 0;
    let mut inserted = 0;
    for (path, outcome) in results {
        match outcome {
            Ok(Outcome::Success(n)) => {
                inserted += n;
                println!("{}: {} new records", path.display(), n);
            },
            Ok(Outcome::Skipped(reason)) => println!("{}: skipped ({})", path.display(), reason),
            Ok(Outcome::Failed { stage, reason }) => {
                failures += 1;
                println!("{}: failed after {} ({})", path.display(), stage, reason);
            },
            Err(e) => {
                failures += 1;
                println!("{}: {:#}", path.display(), e);
            },
        }
    }

    println!("Inserted {} records", inserted);
    if failures > 0 {
        anyhow::bail!("{} file(s) failed; see {}", failures, config.staging().quarantine.display());
    }
    Ok(())
}

async fn watch(config: &IngestConfig, stdin: bool) -> Result<()> {
    let fetcher: Arc<dyn AttachmentFetcher> = match &config.fetch_url {
        Some(url) => Arc::new(HttpFetcher::new(
            url,
            config.fetch_token.clone(),
            config.fetch_timeout(),
        )?),
        None => Arc::new(SpoolFetcher::new(config.inbox_dir()).consuming()),
    };
    let pipeline = Arc::new(build_pipeline(config, fetcher).await?);

    let source: Box<dyn AttachmentSource> = if stdin {
        Box::new(JsonLinesSource::new(BufReader::new(tokio::io::stdin())))
    } else {
        std::fs::create_dir_all(config.inbox_dir())?;
        Box::new(SpoolWatcher::new(config.inbox_dir(), config.poll_interval()))
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let (tx, rx) = mpsc::channel(config.max_concurrent * 4);
    let source_shutdown = shutdown.clone();
    let source_task = tokio::spawn(async move {
        if let Err(e) = source.run(tx, source_shutdown).await {
            error!(error = %e, "Attachment source stopped");
        }
    });

    let monitor = Monitor::new(pipeline, config.max_concurrent);
    let stats = monitor.run(rx, shutdown.clone()).await;

    shutdown.cancel();
    if let Err(e) = source_task.await {
        warn!(error = %e, "Attachment source task failed");
    }

    println!(
        "Processed {} attachments: {} succeeded, {} skipped, {} failed, {} new records",
        stats.completed(),
        stats.succeeded,
        stats.skipped,
        stats.failed,
        stats.inserted
    );
    Ok(())
}

async fn stats(config: &IngestConfig, top: usize) -> Result<()> {
    let store = open_store(config).await?;
    let rows = store.rows().await?;

    let mut domains: HashMap<&str, usize> = HashMap::new();
    for row in &rows {
        *domains.entry(row.domain.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(&str, usize)> = domains.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    println!("Store: {}", store.location());
    println!("Records: {}", rows.len());
    for (domain, count) in ranked.into_iter().take(top) {
        println!("  {:>8}  {}", count, domain);
    }
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, finishing in-flight attachments");
        },
        _ = terminate => {
            info!("Received SIGTERM, finishing in-flight attachments");
        },
    }

    shutdown.cancel();
}
