//! weasel - command-line client for the weasel-ai compliance service

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weasel_common::metadata::FileStatus;

use weasel_cli::{ApiClient, ClientError, StatusPoller, TrackedFile, TrackedStatus};

#[derive(Parser, Debug)]
#[command(name = "weasel")]
#[command(about = "Upload call logs and follow their compliance analysis")]
#[command(version)]
struct Cli {
    /// Base URL of the weasel-ai service
    #[arg(long, global = true, env = "WEASEL_SERVER", default_value = "http://127.0.0.1:5780")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload call logs and wait for their analysis
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Back up and overwrite files that already exist
        #[arg(long)]
        replace: bool,

        /// Return once uploaded instead of waiting for analysis
        #[arg(long)]
        no_wait: bool,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 5000)]
        interval: u64,
    },
    /// Start (or restart) analysis of a stored call log
    Process {
        filename: String,

        /// Block until the analysis finishes
        #[arg(long)]
        wait: bool,
    },
    /// Show the current status of files
    Status {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Follow files until none is still in flight
    Watch {
        #[arg(required = true)]
        names: Vec<String>,

        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 5000)]
        interval: u64,
    },
    /// List stored call logs
    List {
        /// Only files with this status
        #[arg(long)]
        status: Option<FileStatus>,
    },
    /// Delete a call log and its analysis
    Delete { filename: String },
    /// Print the stored analysis as JSON
    Analysis { filename: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weasel=warn,weasel_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let client = ApiClient::new(&cli.server).context("Failed to build HTTP client")?;

    match cli.command {
        Command::Upload {
            paths,
            replace,
            no_wait,
            interval,
        } => upload(&client, &paths, replace, no_wait, interval).await,
        Command::Process { filename, wait } => {
            let reply = client.process(&filename, wait).await?;
            println!("{}", reply.message);
            if let Some(error) = reply.error_message {
                println!("  error: {}", error);
            }
            Ok(())
        }
        Command::Status { names } => {
            for update in client.status(&names).await? {
                print_file(&TrackedFile {
                    name: update.name,
                    status: update.status.into(),
                    risk_score: update.risk_score,
                    error_message: update.error_message,
                });
            }
            Ok(())
        }
        Command::Watch { names, interval } => {
            let mut poller = StatusPoller::new(client).with_interval(Duration::from_millis(interval));
            for name in &names {
                poller.track(name, TrackedStatus::Queued);
            }
            poller.run_until_settled(print_file).await;
            Ok(())
        }
        Command::List { status } => {
            let files = client.list(status).await?;
            if files.is_empty() {
                println!("No files");
            }
            for file in files {
                let risk = file.risk_score.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "-".into());
                println!(
                    "{:<40} {:<10} risk {:>4}  {}  {}",
                    file.name,
                    file.status,
                    risk,
                    file.uploaded_at,
                    file.agent_name.unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Delete { filename } => {
            client.delete(&filename).await?;
            println!("Deleted {}", filename);
            Ok(())
        }
        Command::Analysis { filename } => {
            let analysis = client.analysis(&filename).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(())
        }
    }
}

async fn upload(client: &ApiClient, paths: &[PathBuf], replace: bool, no_wait: bool, interval: u64) -> Result<()> {
    let mut poller = StatusPoller::new(client.clone()).with_interval(Duration::from_millis(interval));
    let mut failures = 0usize;

    for path in paths {
        match client.upload(path, replace).await {
            Ok(reply) => {
                match reply.backup_filename {
                    Some(backup) => println!("Replaced {} (backup: {})", reply.file.name, backup),
                    None => println!("Uploaded {}", reply.file.name),
                }
                poller.track(&reply.file.name, TrackedStatus::Queued);
            }
            Err(e @ ClientError::Collision(_)) => {
                eprintln!("{}", e);
                failures += 1;
            }
            Err(e) => {
                eprintln!("Failed to upload {}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    if !no_wait {
        poller.run_until_settled(print_file).await;
    }

    if failures > 0 {
        bail!("{} of {} uploads failed", failures, paths.len());
    }
    Ok(())
}

fn print_file(file: &TrackedFile) {
    match (file.status, file.risk_score, &file.error_message) {
        (TrackedStatus::Analyzed, Some(score), _) => println!("{}: analyzed (risk {:.1})", file.name, score),
        (TrackedStatus::Error, _, Some(error)) => println!("{}: error ({})", file.name, error),
        (status, _, _) => println!("{}: {}", file.name, status),
    }
}
