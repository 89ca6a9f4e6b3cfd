//! blobsend command line entry point.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use blobsend_protocol::{UploadEvent, UploadPhase};
use blobsend_resume::{FileStateStore, StateStore};
use blobsend_store::DirObjectStore;
use blobsend_transfer::{Payload, TabularFormat, object_key_for};
use blobsend_upload::{UploadConfig, UploadError, UploadReport, Uploader};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;

/// Suffix appended to a source path to name its default resume-state file.
const STATE_SUFFIX: &str = ".blobsend-state.json";

#[derive(Debug, Parser)]
#[command(name = "blobsend", version, about = "Resumable, integrity-verified uploads")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file, resuming an interrupted session if one is recorded.
    Upload {
        /// File to upload.
        file: PathBuf,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Export a JSON array of records as CSV or JSON and upload it.
    UploadRecords {
        /// JSON file holding an array of objects.
        records: PathBuf,
        /// CSV delimiter (single byte).
        #[arg(long)]
        delimiter: Option<char>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show the resume state recorded for a file.
    Status {
        file: PathBuf,
        /// Resume-state file (default: `<FILE>.blobsend-state.json`).
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Destination bucket.
    #[arg(long)]
    bucket: String,
    /// Destination key (default: `<PREFIX>/<file name>`).
    #[arg(long, conflicts_with = "prefix")]
    key: Option<String>,
    /// Folder prefix joined with the file name when no key is given.
    #[arg(long, default_value = "")]
    prefix: String,
    /// Root directory of the object store.
    #[arg(long)]
    store_dir: PathBuf,
    /// Resume-state file (default: `<FILE>.blobsend-state.json`).
    #[arg(long)]
    state: Option<PathBuf>,
    /// Configuration file (default: `$XDG_CONFIG_HOME/blobsend/config.toml`).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Bytes per part.
    #[arg(long)]
    part_size: Option<u64>,
    /// Retries per part after the first failure.
    #[arg(long)]
    max_retries: Option<u32>,
    /// Parts uploaded at once.
    #[arg(long)]
    concurrency: Option<usize>,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

impl TargetArgs {
    fn upload_config(&self) -> anyhow::Result<UploadConfig> {
        let mut config = CliConfig::load(self.config.as_deref())?.upload;
        if let Some(part_size) = self.part_size {
            config.part_size = part_size;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        Ok(config)
    }

    fn object_key(&self, source: &Path) -> anyhow::Result<String> {
        match &self.key {
            Some(key) => Ok(key.clone()),
            None => Ok(object_key_for(&self.prefix, source)?),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Upload { file, target } => {
            let payload = Payload::from_file(&file)
                .with_context(|| format!("opening {}", file.display()))?;
            run_upload(&file, payload, &target).await
        }
        Command::UploadRecords {
            records,
            delimiter,
            target,
        } => {
            let key = target.object_key(&records)?;
            let delimiter = delimiter.map(delimiter_byte).transpose()?;
            let format = TabularFormat::for_key(&key, delimiter)?;
            let data = std::fs::read(&records)
                .with_context(|| format!("reading {}", records.display()))?;
            let rows: Vec<Map<String, Value>> = serde_json::from_slice(&data)
                .with_context(|| format!("{} is not a JSON array of objects", records.display()))?;
            info!(rows = rows.len(), ?format, "exporting records");
            let payload = Payload::from_records(&rows, format)?;
            run_upload(&records, payload, &target).await
        }
        Command::Status { file, state } => {
            let store = FileStateStore::new(state.unwrap_or_else(|| default_state_path(&file)));
            match store.load().await {
                Some(record) => {
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
                None => println!("no resumable session recorded at {}", store.describe()),
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_upload(
    source: &Path,
    payload: Payload,
    target: &TargetArgs,
) -> anyhow::Result<ExitCode> {
    let config = target.upload_config()?;
    let key = target.object_key(source)?;
    let state_path = target
        .state
        .clone()
        .unwrap_or_else(|| default_state_path(source));

    let store = DirObjectStore::new(&target.store_dir);
    store.ensure_bucket(&target.bucket).await?;

    info!(
        source = %source.display(),
        bucket = %target.bucket,
        %key,
        bytes = payload.len(),
        state = %state_path.display(),
        "starting upload"
    );

    let (events_tx, events_rx) = mpsc::channel(256);
    let uploader = Uploader::new(
        Arc::new(store),
        Arc::new(FileStateStore::new(state_path)),
        config,
    )
    .with_events(events_tx);

    let cancel = uploader.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after parts in flight");
            cancel.cancel();
        }
    });
    let progress = tokio::spawn(log_events(events_rx));

    let result = uploader.upload(&payload, &target.bucket, &key).await;
    drop(uploader);
    let _ = progress.await;

    match result {
        Ok(report) => {
            print_report(&report, target.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            report_failure(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn log_events(mut rx: mpsc::Receiver<UploadEvent>) {
    while let Some(event) = rx.recv().await {
        match &event {
            UploadEvent::PartUploaded {
                part_number,
                completed,
                total_parts,
                ..
            } => {
                let percent = event.fraction().unwrap_or(0.0) * 100.0;
                info!(part_number, completed, total_parts, "{percent:.0}% uploaded");
            }
            UploadEvent::Phase {
                phase: UploadPhase::Aborted,
            } => warn!("session aborted"),
            _ => {}
        }
    }
}

fn print_report(report: &UploadReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!(
            "uploaded {} bytes to {}/{} ({:?}), sha256 {} verified",
            report.bytes_uploaded,
            report.bucket,
            report.key,
            report.mode,
            report.local_digest()
        );
    }
    Ok(())
}

fn report_failure(e: &UploadError) {
    error!(kind = ?e.kind(), error = %e, "upload failed");
    if let Some(abort) = e.abort_error() {
        error!(error = %abort, "remote session could not be aborted");
    }
    if let Some(v) = e.verification() {
        error!(
            local = %v.local_digest,
            remote = v.remote_digest.as_deref().unwrap_or("-"),
            local_len = v.local_len,
            remote_len = v.remote_len,
            "stored object does not match the source"
        );
    }
}

/// `<source>.blobsend-state.json`, next to the source.
fn default_state_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(STATE_SUFFIX);
    PathBuf::from(name)
}

fn delimiter_byte(c: char) -> anyhow::Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .with_context(|| format!("delimiter must be a single ASCII character, got {c:?}"))
}
