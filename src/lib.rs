//! Batch Transcoder - a queue-driven batch media transcoder built around ffmpeg.
//!
//! Clients submit batches of files with one set of output options. Options are
//! checked against a static capability registry, each file becomes a job on a
//! Redis-backed queue, and a worker runs one ffmpeg process per job with
//! bounded concurrency while recording progress and outcome per job and batch.

pub mod capability;
pub mod cli;
pub mod config;
pub mod encoder;
pub mod error;
pub mod media;
pub mod notify;
pub mod queue;
pub mod store;
pub mod submit;
pub mod validation;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::capability::{CategoryType, FormatType};
use crate::cli::{Cli, Commands, RunArgs, SubmitArgs, TranscodeArgs};
use crate::config::AppConfig;
use crate::encoder::EncoderSettings;
use crate::notify::{Metrics, MetricsServer};
use crate::queue::{MemoryQueue, QueueTransport, RedisQueue};
use crate::store::{JobStatus, MemoryStore, Page, RedisStore};
use crate::submit::{Submitter, Upload};
use crate::worker::TranscoderService;

/// Runs the transcoder with the provided CLI arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level())?;

    match cli.command {
        Commands::Run(args) => run_worker(args, &cli.config).await,
        Commands::Submit(args) => submit_batch(args, &cli.config).await,
        Commands::Transcode(args) => transcode_local(args, &cli.config).await,
        Commands::Status { batch_id } => show_batch(&cli.config, &batch_id).await,
        Commands::Batches {
            owner,
            page,
            per_page,
        } => list_batches(&cli.config, &owner, Page::new(page, per_page)).await,
        Commands::Download { job_id, dest } => download(&cli.config, &job_id, &dest).await,
        Commands::Abort { job_id } => request_abort(&cli.config, &job_id).await,
        Commands::QueueList => list_queue(&cli.config).await,
        Commands::QueueReset => reset_queue(&cli.config).await,
        Commands::Reconcile => reconcile(&cli.config).await,
        Commands::Formats => {
            print_formats();
            Ok(())
        }
        Commands::ConfigValidate => validate_config(&cli.config).await,
        Commands::ConfigShow => show_config(&cli.config).await,
    }
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Redis-backed collaborators shared by every command that talks to a worker.
struct Backends {
    queue: Arc<RedisQueue>,
    service: TranscoderService,
    submitter: Submitter,
}

async fn connect(config: &AppConfig) -> Result<Backends> {
    let redis_url = config.redis.url();

    let store = Arc::new(
        RedisStore::new(&redis_url)
            .await
            .context("Failed to connect job store")?,
    );
    let queue = Arc::new(
        RedisQueue::new(&redis_url)
            .await
            .context("Failed to connect queue")?,
    );
    info!(host = %config.redis.host, port = config.redis.port, "Connected to Redis");

    let service = TranscoderService::new(
        store.clone(),
        queue.clone(),
        EncoderSettings::from(&config.encoder),
        &config.worker,
    );
    let submitter = Submitter::new(store, service.clone(), config.storage.clone());

    Ok(Backends {
        queue,
        service,
        submitter,
    })
}

/// Runs the worker until Ctrl+C or SIGTERM.
async fn run_worker(args: RunArgs, config_path: &Path) -> Result<()> {
    info!("Starting transcoder");

    let config = config::loader::load_and_validate(config_path)?;
    info!("Configuration loaded and validated");

    let backends = connect(&config).await?;

    let metrics = Arc::new(Metrics::new()?);
    let service = backends.service.with_metrics(metrics.clone());

    if config.prometheus.enabled {
        let metrics_server = MetricsServer::new(metrics.clone(), config.prometheus.port);
        tokio::spawn(async move {
            if let Err(e) = metrics_server.start().await {
                error!(error = %e, "Prometheus server failed");
            }
        });
        info!(port = config.prometheus.port, "Prometheus metrics server started");
    }

    if config.worker.reconcile_on_start && !args.no_reconcile {
        let repaired = service
            .reconcile()
            .await
            .context("Failed to reconcile interrupted jobs")?;
        info!(repaired, "Startup reconciliation complete");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn({
        let service = service.clone();
        async move { service.run(shutdown_rx).await }
    });

    info!("Transcoder is running. Press Ctrl+C to stop.");
    shutdown_signal().await;

    info!("Shutting down transcoder");
    let _ = shutdown_tx.send(true);
    worker.await.context("Worker task panicked")?;

    let running = service.running();
    if !running.is_empty() {
        warn!(jobs = ?running, "Encoders still running at shutdown will be killed");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

fn uploads(files: Vec<PathBuf>) -> Vec<Upload> {
    files.into_iter().map(Upload::from_path).collect()
}

/// Submits files to the shared queue.
async fn submit_batch(args: SubmitArgs, config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let backends = connect(&config).await?;

    let view = backends
        .submitter
        .submit(uploads(args.files), &args.options, &args.owner)
        .await
        .context("Submission rejected")?;

    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Runs a batch entirely in this process with in-memory store and queue.
async fn transcode_local(args: TranscodeArgs, config_path: &Path) -> Result<()> {
    let mut config = if config_path.exists() {
        config::loader::load_and_validate(config_path)?
    } else {
        AppConfig::default()
    };

    let workdir = std::env::temp_dir().join(format!("transcoderd-{}", uuid::Uuid::new_v4()));
    config.storage.upload_dir = workdir.join("uploads");
    config.storage.output_dir = workdir.join("outputs");

    let result = transcode_in(&config, args).await;

    if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = ?workdir, error = %e, "Failed to remove work directory");
        }
    }
    result
}

async fn transcode_in(config: &AppConfig, args: TranscodeArgs) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let service = TranscoderService::new(
        store.clone(),
        queue,
        EncoderSettings::from(&config.encoder),
        &config.worker,
    );
    let submitter = Submitter::new(store, service.clone(), config.storage.clone());

    let batch = submitter
        .submit(uploads(args.files), &args.options, "local")
        .await
        .context("Submission rejected")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn({
        let service = service.clone();
        async move { service.run(shutdown_rx).await }
    });

    let interrupted = shutdown_signal();
    tokio::pin!(interrupted);

    let finished = loop {
        tokio::select! {
            _ = &mut interrupted => {
                service.reset().await?;
                let _ = shutdown_tx.send(true);
                worker.await.context("Worker task panicked")?;
                anyhow::bail!("Interrupted before batch {} finished", batch.id);
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }

        let view = submitter.batch(&batch.id).await?;
        if view.status.is_terminal() {
            break view;
        }
    };

    let _ = shutdown_tx.send(true);
    worker.await.context("Worker task panicked")?;

    tokio::fs::create_dir_all(&args.dest).await?;
    for job in &finished.jobs {
        match job.status {
            JobStatus::Succeeded => {
                let download = submitter.download(&job.id).await?;
                let target = args.dest.join(&download.file_name);
                tokio::fs::copy(&download.path, &target)
                    .await
                    .with_context(|| format!("Failed to copy output to {}", target.display()))?;
                println!("{} -> {}", job.title, target.display());
            }
            status => println!(
                "{} {}: {}",
                job.title,
                status,
                job.error.as_deref().unwrap_or("no output")
            ),
        }
    }

    if finished.status != JobStatus::Succeeded {
        anyhow::bail!("Batch finished with status {}", finished.status);
    }
    Ok(())
}

/// Prints a batch and its jobs.
async fn show_batch(config_path: &Path, batch_id: &str) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let backends = connect(&config).await?;

    let view = backends.submitter.batch(batch_id).await?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Prints an owner's batches.
async fn list_batches(config_path: &Path, owner: &str, page: Page) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let backends = connect(&config).await?;

    let views = backends.submitter.batches(owner, page).await?;
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

/// Copies a finished output into `dest`.
async fn download(config_path: &Path, job_id: &str, dest: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let backends = connect(&config).await?;

    let download = backends.submitter.download(job_id).await?;
    let target = dest.join(&download.file_name);
    tokio::fs::copy(&download.path, &target)
        .await
        .with_context(|| format!("Failed to copy output to {}", target.display()))?;

    println!("{}", target.display());
    Ok(())
}

/// Forwards an abort request to the running worker.
async fn request_abort(config_path: &Path, job_id: &str) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let backends = connect(&config).await?;

    backends.queue.request_abort(job_id).await?;
    println!("Abort requested for job {}.", job_id);
    Ok(())
}

/// Lists all items in the queue.
async fn list_queue(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let backends = connect(&config).await?;

    let items = backends.service.inspect().await?;

    if items.is_empty() {
        println!("Queue is empty.");
    } else {
        println!("Queue ({} items):", items.len());
        for queued in items {
            let progress = queued
                .progress
                .map(|p| format!(" {}%", p))
                .unwrap_or_default();
            println!(
                "  {} job {} - {} ({:?}{})",
                queued.item.id,
                queued.item.job_id,
                queued.item.input_path.display(),
                queued.state,
                progress
            );
        }
    }

    Ok(())
}

/// Clears all items from the queue.
async fn reset_queue(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let backends = connect(&config).await?;

    let count = backends.service.reset().await?;
    println!("Removed {} item(s) from queue.", count);
    Ok(())
}

/// Fails jobs left processing. Only safe while no worker is running.
async fn reconcile(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let backends = connect(&config).await?;

    let repaired = backends.service.reconcile().await?;
    println!("Marked {} interrupted job(s) as failed.", repaired);
    Ok(())
}

/// Prints the capability matrix.
fn print_formats() {
    for category in CategoryType::ALL {
        println!("{}:", category);
        for format in FormatType::ALL
            .into_iter()
            .filter(|f| f.info().category == category)
        {
            let info = format.info();
            let list = |codecs: &[capability::CodecType]| {
                codecs.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
            };
            match category {
                CategoryType::Audio => {
                    println!("  {:<6} audio: {}", format.as_str(), list(info.audio))
                }
                CategoryType::Video => println!(
                    "  {:<6} video: {}; audio: {}",
                    format.as_str(),
                    list(info.video),
                    list(info.audio)
                ),
                CategoryType::Image => {
                    println!("  {:<6} image: {}", format.as_str(), list(info.image))
                }
            }
        }
    }
}

/// Validates the configuration file and reports any issues.
async fn validate_config(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;

    println!("Configuration is valid.");
    println!(
        "Worker: concurrency {}, poll interval {}ms",
        config.worker.concurrency, config.worker.poll_interval_ms
    );
    println!(
        "Storage: uploads in {}, outputs in {}",
        config.storage.upload_dir.display(),
        config.storage.output_dir.display()
    );

    Ok(())
}

/// Displays the parsed configuration.
async fn show_config(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;
    let yaml = serde_yaml::to_string(&config)?;
    println!("{}", yaml);
    Ok(())
}
