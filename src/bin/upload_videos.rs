//! CLI for pushing a video file into the store, chunked by default.

use anyhow::Result;
use clap::Parser;
use property_video_store::client::{CHUNK_SIZE, UploadClient, chunk_count};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Upload one video file to the property video store.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked video uploader")]
struct Args {
    /// Video file to upload
    file: PathBuf,

    /// Property the video belongs to (e.g. `9220-james-ave-s-bloomington`)
    #[arg(long)]
    property_id: String,

    /// Video category, such as `drone` or `property`
    #[arg(long)]
    video_type: String,

    /// Stored filename; defaults to the file's own name
    #[arg(long)]
    filename: Option<String>,

    /// Server base URL (overrides UPLOAD_URL)
    #[arg(long)]
    url: Option<String>,

    /// Send the whole file in one request instead of chunking
    #[arg(long)]
    direct: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "property_video_store=info".into()),
        )
        .init();

    let args = Args::parse();

    let base_url = args
        .url
        .or_else(|| std::env::var("UPLOAD_URL").ok())
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    let filename = match &args.filename {
        Some(name) => name.clone(),
        None => args
            .file
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                anyhow::anyhow!("Cannot derive a filename from {}", args.file.display())
            })?,
    };

    let client = UploadClient::new(base_url)?;

    let key = if args.direct {
        println!("Uploading {} in one request...", args.file.display());
        client
            .upload_direct(&args.file, &args.property_id, &args.video_type, &filename)
            .await?
    } else {
        let len = tokio::fs::metadata(&args.file).await?.len();
        println!(
            "Uploading {} ({} bytes) in {} chunks...",
            args.file.display(),
            len,
            chunk_count(len, CHUNK_SIZE)
        );
        client
            .upload_file(&args.file, &args.property_id, &args.video_type, &filename)
            .await?
    };

    println!("Upload complete. Key: {key}");
    Ok(())
}
