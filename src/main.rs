//! b2ctl - command line access to Backblaze B2
//!
//! Thin driver over the `b2_client` library for listing, uploading,
//! downloading and deleting files.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use b2_client::{B2Client, B2Config, DownloadOverrides};

/// Content type used when `upload` is not given one
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// CLI command
#[derive(Debug)]
enum Command {
    /// List buckets of the account
    Buckets,
    /// List files in a bucket
    Ls {
        bucket_name: String,
        prefix: Option<String>,
        max: Option<u32>,
    },
    /// Upload a local file
    Upload {
        bucket_name: String,
        local_path: PathBuf,
        remote_name: String,
        content_type: String,
    },
    /// Download a file by name
    Download {
        bucket_name: String,
        file_name: String,
        out_path: PathBuf,
    },
    /// Delete a file version
    Rm { file_name: String, file_id: String },
    /// Show help
    Help,
}

fn print_help() {
    eprintln!(
        r#"b2ctl - Backblaze B2 from the command line

USAGE:
    b2ctl buckets
    b2ctl ls <bucket_name> [prefix] [max]
    b2ctl upload <bucket_name> <local_path> <remote_name> [content_type]
    b2ctl download <bucket_name> <file_name> <out_path>
    b2ctl rm <file_name> <file_id>
    b2ctl help

COMMANDS:
    buckets   List buckets in the account
    ls        List files (default max 100, 0 also means 100)
    upload    Upload a local file to a bucket
    download  Download a file by name
    rm        Delete a file version
    help      Show this help message

ENVIRONMENT:
    B2_KEY_ID        B2 application key ID (required)
    B2_KEY           B2 application key (required)
    B2_AUTH_URL      Authorization endpoint override
    B2_TIMEOUT_SECS  Request timeout in seconds (default 30)
    RUST_LOG         Log filter (trace, debug, info, warn, error)
"#
    );
}

fn parse_args(args: &[String]) -> Result<Command> {
    if args.len() < 2 {
        return Ok(Command::Help);
    }

    let usage = |text: &str| anyhow!("Usage: b2ctl {}", text);

    match args[1].as_str() {
        "buckets" => Ok(Command::Buckets),
        "ls" => {
            if args.len() < 3 {
                return Err(usage("ls <bucket_name> [prefix] [max]"));
            }
            let max = args
                .get(4)
                .map(|m| m.parse::<u32>().with_context(|| format!("Invalid max: {}", m)))
                .transpose()?;
            Ok(Command::Ls {
                bucket_name: args[2].clone(),
                prefix: args.get(3).filter(|p| !p.is_empty()).cloned(),
                max,
            })
        }
        "upload" => {
            if args.len() < 5 {
                return Err(usage(
                    "upload <bucket_name> <local_path> <remote_name> [content_type]",
                ));
            }
            Ok(Command::Upload {
                bucket_name: args[2].clone(),
                local_path: PathBuf::from(&args[3]),
                remote_name: args[4].clone(),
                content_type: args
                    .get(5)
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            })
        }
        "download" => {
            if args.len() < 5 {
                return Err(usage("download <bucket_name> <file_name> <out_path>"));
            }
            Ok(Command::Download {
                bucket_name: args[2].clone(),
                file_name: args[3].clone(),
                out_path: PathBuf::from(&args[4]),
            })
        }
        "rm" => {
            if args.len() < 4 {
                return Err(usage("rm <file_name> <file_id>"));
            }
            Ok(Command::Rm {
                file_name: args[2].clone(),
                file_id: args[3].clone(),
            })
        }
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => {
            eprintln!("Unknown command: {}", other);
            Ok(Command::Help)
        }
    }
}

async fn run(client: Arc<B2Client>, command: Command) -> Result<()> {
    match command {
        Command::Buckets => {
            let buckets = client.list_buckets().await.context("Failed to list buckets")?;
            if buckets.is_empty() {
                println!("No buckets in this account.");
            }
            for bucket in buckets {
                println!(
                    "{}  {:<12} {}",
                    bucket.bucket_id, bucket.bucket_type, bucket.bucket_name
                );
            }
        }
        Command::Ls {
            bucket_name,
            prefix,
            max,
        } => {
            let bucket = client.get_bucket_from_name(&bucket_name).await?;
            let files = client
                .list_file_names(&bucket.bucket_id, None, max, prefix.as_deref(), Some("/"))
                .await
                .with_context(|| format!("Failed to list files in {}", bucket_name))?;
            for file in files {
                if file.is_directory() {
                    println!("{:>12}  {}", "-", file.file_name);
                } else {
                    println!("{:>12}  {}", file.content_length, file.file_name);
                }
            }
        }
        Command::Upload {
            bucket_name,
            local_path,
            remote_name,
            content_type,
        } => {
            let data = tokio::fs::read(&local_path)
                .await
                .with_context(|| format!("Failed to read {}", local_path.display()))?;
            let file = client
                .upload_file(&data, &content_type, &remote_name, None, Some(&bucket_name))
                .await
                .with_context(|| format!("Failed to upload {}", remote_name))?;
            println!(
                "{}  {}",
                file.file_id.as_deref().unwrap_or("-"),
                file.file_name
            );
        }
        Command::Download {
            bucket_name,
            file_name,
            out_path,
        } => {
            let file = client
                .download_file_by_name(&file_name, &bucket_name, &DownloadOverrides::default())
                .await
                .with_context(|| format!("Failed to download {}", file_name))?;
            tokio::fs::write(&out_path, &file.content)
                .await
                .with_context(|| format!("Failed to write {}", out_path.display()))?;
            info!(file = %file_name, size = file.content.len(), out = %out_path.display(), "Download complete");
        }
        Command::Rm { file_name, file_id } => {
            let deleted = client
                .delete_file(&file_name, &file_id)
                .await
                .with_context(|| format!("Failed to delete {}", file_name))?;
            println!("Deleted {} ({})", deleted.file_name, deleted.file_id);
        }
        Command::Help => print_help(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Parse command
    let args: Vec<String> = env::args().collect();
    let command = match parse_args(&args) {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    if let Command::Help = command {
        print_help();
        return Ok(());
    }

    let config = B2Config::from_env().context("Missing B2 credentials")?;
    debug!(config = ?config, "Loaded configuration");

    let client = B2Client::new(config);
    let result = client.scoped(|client| run(client, command)).await;
    if let Err(e) = &result {
        error!(error = %e, "Command failed");
    }
    result
}
