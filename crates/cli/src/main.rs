//! Resumable upload client for spool.

mod api_client;

use anyhow::{Context, Result};
use api_client::{ApiClient, ApiError, UploadMetadataResponse};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use reqwest::StatusCode;
use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;
const DEFAULT_PARALLEL: usize = 4;
/// Finish attempts that may resend chunks reported missing by the server.
const MAX_FINISH_ROUNDS: usize = 3;

#[derive(Parser)]
#[command(name = "spoolctl")]
#[command(about = "Resumable upload client for spool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Server URL
    #[arg(long, env = "SPOOL_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Owner identity sent with every request
    #[arg(long, env = "SPOOL_OWNER")]
    owner: String,

    /// Header the server reads the owner from
    #[arg(long, env = "SPOOL_OWNER_HEADER", default_value = api_client::DEFAULT_OWNER_HEADER)]
    owner_header: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file in chunks, resuming an earlier attempt if asked
    Upload {
        /// File to upload
        file: PathBuf,

        /// Chunk size in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,

        /// Resume an existing upload instead of starting a new one
        #[arg(long)]
        resume: Option<String>,

        /// Name to store the file under (defaults to the file's own name)
        #[arg(long)]
        name: Option<String>,

        /// Maximum chunks in flight
        #[arg(long, default_value_t = DEFAULT_PARALLEL)]
        parallel: usize,

        #[command(flatten)]
        api: ApiArgs,
    },
    /// Show an upload's progress
    Status {
        upload_id: String,

        #[command(flatten)]
        api: ApiArgs,
    },
    /// Download a completed upload
    Download {
        upload_id: String,

        /// Destination file
        dest: PathBuf,

        #[command(flatten)]
        api: ApiArgs,
    },
    /// Delete an upload and everything staged for it
    Delete {
        upload_id: String,

        #[command(flatten)]
        api: ApiArgs,
    },
    /// Check server health
    Health {
        #[command(flatten)]
        api: ApiArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { command } = Cli::parse();

    match command {
        Commands::Upload {
            file,
            chunk_size,
            resume,
            name,
            parallel,
            api,
        } => {
            let client = get_api_client(&api)?;
            let options = UploadOptions {
                chunk_size,
                resume,
                name,
                parallel,
            };
            handle_upload_command(&client, &file, options).await
        }
        Commands::Status { upload_id, api } => {
            let client = get_api_client(&api)?;
            let upload = client.get_upload(&upload_id).await?;
            print_upload(&upload);
            Ok(())
        }
        Commands::Download {
            upload_id,
            dest,
            api,
        } => {
            let client = get_api_client(&api)?;
            let written = client.download(&upload_id, &dest).await?;
            println!("Downloaded {} to {}", format_bytes(written), dest.display());
            Ok(())
        }
        Commands::Delete { upload_id, api } => {
            let client = get_api_client(&api)?;
            client.delete_upload(&upload_id).await?;
            println!("Deleted upload {upload_id}");
            Ok(())
        }
        Commands::Health { api } => {
            let client = get_api_client(&api)?;
            let health = client.health().await?;
            println!(
                "{} (v{}) storage={} presence={}",
                health.status, health.version, health.storage, health.presence
            );
            Ok(())
        }
    }
}

fn get_api_client(api: &ApiArgs) -> Result<ApiClient> {
    let server = normalize_base_url(&api.server)?;
    Ok(ApiClient::new(&server, &api.owner)?.with_owner_header(&api.owner_header))
}

struct UploadOptions {
    chunk_size: u64,
    resume: Option<String>,
    name: Option<String>,
    parallel: usize,
}

async fn handle_upload_command(client: &ApiClient, file: &Path, options: UploadOptions) -> Result<()> {
    if options.chunk_size == 0 {
        anyhow::bail!("--chunk-size must be greater than zero");
    }

    let file_size = tokio::fs::metadata(file)
        .await
        .with_context(|| format!("failed to stat {}", file.display()))?
        .len();
    let total_chunks = chunk_count(file_size, options.chunk_size);

    let upload_id = match options.resume {
        Some(upload_id) => {
            let upload = client.get_upload(&upload_id).await?;
            if upload.total_chunks != total_chunks {
                anyhow::bail!(
                    "upload {upload_id} expects {} chunks but {} splits into {total_chunks} at this chunk size",
                    upload.total_chunks,
                    file.display()
                );
            }
            if upload.status == "completed" {
                println!("Upload {upload_id} is already complete");
                print_upload(&upload);
                return Ok(());
            }
            println!(
                "Resuming upload {upload_id} ({}/{} chunks received)",
                upload.received_count, total_chunks
            );
            upload_id
        }
        None => {
            let file_name = match options.name {
                Some(name) => name,
                None => file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| anyhow::anyhow!("cannot derive a name from {}", file.display()))?,
            };
            let upload_id = client.create_upload(&file_name, total_chunks).await?;
            println!("Started upload {upload_id} ({total_chunks} chunks)");
            upload_id
        }
    };

    let received: BTreeSet<u64> = client.received_chunks(&upload_id).await?.into_iter().collect();
    let mut missing = missing_indices(total_chunks, &received);

    for _ in 0..MAX_FINISH_ROUNDS {
        if !missing.is_empty() {
            println!("Sending {} chunk(s)", missing.len());
            upload_missing_chunks(
                client,
                file,
                &upload_id,
                &missing,
                ChunkLayout {
                    chunk_size: options.chunk_size,
                    file_size,
                    total_chunks,
                },
                options.parallel,
            )
            .await?;
        }

        match client.finish_upload(&upload_id).await {
            Ok(finished) => {
                println!(
                    "Upload {} complete: {} stored at {}",
                    finished.upload_id,
                    format_bytes(finished.size),
                    finished.stored_path
                );
                return Ok(());
            }
            Err(e) => match e.downcast_ref::<ApiError>() {
                // Staged chunks can expire between sending and finishing.
                Some(api_err) if api_err.status == StatusCode::CONFLICT => {
                    missing = if api_err.missing_is_complete() {
                        api_err.missing.clone().unwrap_or_default()
                    } else {
                        let received: BTreeSet<u64> =
                            client.received_chunks(&upload_id).await?.into_iter().collect();
                        missing_indices(total_chunks, &received)
                    };
                    tracing::info!(count = missing.len(), "server reported missing chunks");
                }
                _ => return Err(e),
            },
        }
    }

    anyhow::bail!(
        "upload {upload_id} still incomplete after {MAX_FINISH_ROUNDS} attempts; rerun with --resume {upload_id}"
    )
}

#[derive(Clone, Copy, Debug)]
struct ChunkLayout {
    chunk_size: u64,
    file_size: u64,
    total_chunks: u64,
}

impl ChunkLayout {
    /// Byte offset and length of chunk `index`.
    fn range(&self, index: u64) -> (u64, u64) {
        let offset = index.saturating_mul(self.chunk_size);
        let len = self.chunk_size.min(self.file_size.saturating_sub(offset));
        (offset, len)
    }
}

async fn upload_missing_chunks(
    client: &ApiClient,
    file: &Path,
    upload_id: &str,
    missing: &[u64],
    layout: ChunkLayout,
    max_parallel: usize,
) -> Result<()> {
    let mut reader = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;
    let parallel = std::cmp::max(1, max_parallel);
    let mut in_flight = FuturesUnordered::new();

    for &index in missing {
        let (offset, len) = layout.range(index);
        let size = usize::try_from(len)
            .map_err(|_| anyhow::anyhow!("chunk size exceeds platform limits"))?;
        let mut data = vec![0u8; size];
        reader.seek(SeekFrom::Start(offset)).await?;
        reader.read_exact(&mut data).await?;
        let data = Bytes::from(data);

        in_flight.push(async move {
            client
                .upload_chunk(upload_id, index, layout.total_chunks, data)
                .await
                .with_context(|| format!("chunk {index} failed"))
        });

        if in_flight.len() >= parallel
            && let Some(result) = in_flight.next().await
        {
            result?;
        }
    }

    while let Some(result) = in_flight.next().await {
        result?;
    }

    Ok(())
}

/// Number of chunks a file of `file_size` bytes splits into. An empty file
/// still counts as one (empty) chunk.
fn chunk_count(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(chunk_size).max(1)
}

fn missing_indices(total_chunks: u64, received: &BTreeSet<u64>) -> Vec<u64> {
    (0..total_chunks).filter(|i| !received.contains(i)).collect()
}

fn print_upload(upload: &UploadMetadataResponse) {
    println!("Upload:   {}", upload.upload_id);
    println!("File:     {}", upload.file_name);
    println!("Status:   {}", upload.status);
    println!(
        "Chunks:   {}/{}",
        upload.received_count, upload.total_chunks
    );
    println!("Size:     {}", format_bytes(upload.size));
    if let Some(path) = &upload.stored_path {
        println!("Stored:   {path}");
    }
    println!("Created:  {}", upload.created_at);
    println!("Updated:  {}", upload.updated_at);
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn normalize_base_url(url: &str) -> Result<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("server URL must start with http:// or https://");
    }
    Ok(url.trim_end_matches('/').to_string())
}
