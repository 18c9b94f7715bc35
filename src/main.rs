//! CLI entry point for the transfer tool.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transfer_core::{
    ArtifactHandle, Database, Direction, DownloadEngine, DownloadRequest, LocalStorage,
    ProgressSnapshot, ReqwestTransport, SqliteResumeStore, Status, TransferConfig,
    TransferController, TransferResult, TransferTicket, UploadEngine, UploadReceipt,
};

mod app_config;
mod cli;
mod progress_ui;

use cli::{Args, Command, DownloadArgs, UploadArgs};

/// Resume-record database created under the storage root when none is configured.
const DEFAULT_STATE_DB: &str = ".transfer-state.db";

/// Final line printed with `--json`.
#[derive(Debug, Serialize)]
struct Summary {
    outcome: &'static str,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_status: Option<u16>,
    progress: ProgressSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = app_config::load(args.config.as_deref())?;
    let mut config = TransferConfig::default();
    file_config.apply_to(&mut config);
    if let Some(secs) = args.connect_timeout {
        config.connect_timeout_secs = secs;
    }
    if let Some(secs) = args.read_timeout {
        config.read_timeout_secs = secs;
    }

    let show_progress = !args.quiet && !args.json;
    match &args.command {
        Command::Download(download) => {
            run_download(download, &file_config, config, args.json, show_progress).await
        }
        Command::Upload(upload) => run_upload(upload, config, args.json, show_progress).await,
    }
}

async fn run_download(
    args: &DownloadArgs,
    file_config: &app_config::FileConfig,
    config: TransferConfig,
    json: bool,
    show_progress: bool,
) -> Result<()> {
    config.validate().context("Invalid transfer configuration")?;

    let root = args
        .root
        .clone()
        .or_else(|| file_config.storage_root.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let state_db = args
        .state_db
        .clone()
        .or_else(|| file_config.state_db.clone())
        .unwrap_or_else(|| root.join(DEFAULT_STATE_DB));
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Failed to create storage root '{}'", root.display()))?;

    let db = Database::new(&state_db)
        .await
        .with_context(|| format!("Failed to open state database '{}'", state_db.display()))?;
    let transport = ReqwestTransport::from_config(&config).context("Failed to build HTTP client")?;
    let engine = DownloadEngine::new(
        Arc::new(transport),
        Arc::new(SqliteResumeStore::new(db.clone())),
        Arc::new(LocalStorage::new(&root)),
        config,
    );

    let mut request = DownloadRequest::new(&args.dir, &args.url);
    if let Some(name) = args.rename.clone() {
        request = request.with_rename(move |_| name.clone());
    }

    let controller = TransferController::<ArtifactHandle>::new(Direction::Download);
    let ticket = controller.start_download(engine, request)?;
    info!(url = %args.url, root = %root.display(), "download started");

    let result = drive(&controller, ticket, &args.url, show_progress).await;
    let progress = *controller.snapshot().borrow();
    db.close().await;

    let summary = match result {
        Some(TransferResult::Success(handle)) => {
            info!(path = %handle.path().display(), bytes = progress.transferred, "download complete");
            Summary {
                outcome: "success",
                url: args.url.clone(),
                path: Some(handle.path().to_path_buf()),
                http_status: None,
                progress,
                error: None,
            }
        }
        Some(TransferResult::Failure(error)) => {
            emit(json, &failure_summary(&args.url, progress, &error.to_string()))?;
            bail!("Download failed: {error}");
        }
        None => {
            info!("download cancelled, partial file kept for resume");
            cancelled_summary(&args.url, progress)
        }
    };
    emit(json, &summary)
}

async fn run_upload(
    args: &UploadArgs,
    mut config: TransferConfig,
    json: bool,
    show_progress: bool,
) -> Result<()> {
    if let Some(content_type) = &args.content_type {
        config.upload_content_type.clone_from(content_type);
    }
    config.validate().context("Invalid transfer configuration")?;

    let transport = ReqwestTransport::from_config(&config).context("Failed to build HTTP client")?;
    let engine = UploadEngine::new(Arc::new(transport), config);

    let controller = TransferController::<UploadReceipt>::new(Direction::Upload);
    let path = args.file.clone();
    let ticket = controller.start_upload(engine, args.url.clone(), move || {
        std::fs::File::open(&path).map(tokio::fs::File::from_std)
    })?;
    info!(url = %args.url, file = %args.file.display(), "upload started");

    let result = drive(&controller, ticket, &args.url, show_progress).await;
    let progress = *controller.snapshot().borrow();

    let summary = match result {
        Some(TransferResult::Success(receipt)) => {
            info!(status = receipt.status(), bytes = progress.transferred, "upload complete");
            Summary {
                outcome: "success",
                url: args.url.clone(),
                path: Some(args.file.clone()),
                http_status: Some(receipt.status()),
                progress,
                error: None,
            }
        }
        Some(TransferResult::Failure(error)) => {
            emit(json, &failure_summary(&args.url, progress, &error.to_string()))?;
            bail!("Upload failed: {error}");
        }
        None => cancelled_summary(&args.url, progress),
    };
    emit(json, &summary)
}

/// Waits for the transfer, cancelling it on Ctrl-C.
async fn drive<T>(
    controller: &TransferController<T>,
    ticket: TransferTicket,
    label: &str,
    show_progress: bool,
) -> Option<TransferResult<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let stop_ui = CancellationToken::new();
    let ui = progress_ui::spawn_progress_ui(
        show_progress,
        controller.snapshot(),
        label_for(label),
        stop_ui.clone(),
    );

    let mut status = controller.status();
    tokio::select! {
        settled = status.wait_for(|status| *status != Status::InProgress) => {
            if settled.is_err() {
                warn!("controller closed before the transfer settled");
            }
        }
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(error) = interrupted {
                warn!(error = %error, "could not listen for Ctrl-C");
            }
            info!("interrupt received, cancelling");
            controller.cancel(ticket).await;
        }
    }
    let result = controller.wait(ticket).await;

    stop_ui.cancel();
    if let Some(handle) = ui {
        let _ = handle.await;
    }
    if controller.current_status() == Status::Unknown {
        warn!("transfer ended abnormally");
    }
    result
}

fn label_for(url: &str) -> String {
    transfer_core::transfer::file_name_from_url(url).unwrap_or_else(|_| url.to_string())
}

fn failure_summary(url: &str, progress: ProgressSnapshot, error: &str) -> Summary {
    Summary {
        outcome: "failure",
        url: url.to_string(),
        path: None,
        http_status: None,
        progress,
        error: Some(error.to_string()),
    }
}

fn cancelled_summary(url: &str, progress: ProgressSnapshot) -> Summary {
    Summary {
        outcome: "cancelled",
        url: url.to_string(),
        path: None,
        http_status: None,
        progress,
        error: None,
    }
}

fn emit(json: bool, summary: &Summary) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
    } else if summary.outcome == "success"
        && let Some(path) = &summary.path
    {
        println!("{}", path.display());
    }
    Ok(())
}
