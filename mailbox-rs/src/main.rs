//! Command line front end for the mailbox store
//!
//! # Usage
//!
//! ```bash
//! # Store messages in a database file
//! mailbox-rs --data-file mail.db ingest message1.eml message2.eml
//!
//! # Show the newest messages
//! mailbox-rs --data-file mail.db list --limit 20
//!
//! # Search
//! mailbox-rs --data-file mail.db search 'from:alice is:unread "quarterly report"'
//!
//! # Run retention until interrupted
//! mailbox-rs --config mailbox.toml run
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailbox_rs::config::Config;
use mailbox_rs::logging;
use mailbox_rs::store::{Mailbox, MessageSummary};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mailbox-rs")]
#[command(about = "Store and query captured email", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides the configuration)
    #[arg(short, long, global = true)]
    data_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store raw email files
    Ingest {
        /// Files containing one raw message each
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List the newest messages
    List {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Search messages
    Search {
        query: String,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Show a message as JSON (marks it read)
    Show {
        /// Message id, or "latest"
        id: String,
    },
    /// Write the original raw message to stdout
    Raw {
        /// Message id, or "latest"
        id: String,
    },
    /// Print mailbox statistics
    Stats,
    /// Delete messages by id
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Delete every message matching a search query
    DeleteMatching { query: String },
    /// Delete all messages and tags
    DeleteAll,
    /// Apply the retention policy once
    Prune,
    /// Run background maintenance until SIGINT/SIGTERM
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(path) = cli.data_file {
        config.storage.data_file = Some(path);
    }

    logging::init(&config.logging)?;

    let mailbox = Mailbox::open(config).await?;
    let result = run(&mailbox, cli.command).await;

    mailbox.shutdown().await;
    result
}

async fn run(mailbox: &Arc<Mailbox>, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest { files } => {
            for file in files {
                let raw = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("reading {}", file.display()))?;
                match mailbox.store(&raw).await {
                    Ok(id) => println!("{}  {}", id, file.display()),
                    Err(e) => eprintln!("Error: {}: {}", file.display(), e),
                }
            }
        }
        Commands::List { offset, limit } => {
            for summary in mailbox.list(offset, limit).await? {
                print_summary(&summary);
            }
        }
        Commands::Search {
            query,
            offset,
            limit,
        } => {
            let results = mailbox.search(&query, offset, limit).await?;
            for summary in &results.messages {
                print_summary(summary);
            }
            println!("{} of {} matches", results.messages.len(), results.total);
        }
        Commands::Show { id } => {
            let id = resolve_id(mailbox, id).await?;
            let message = mailbox.get_message(&id).await?;
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        Commands::Raw { id } => {
            let id = resolve_id(mailbox, id).await?;
            let raw = mailbox.get_raw(&id).await?;
            std::io::stdout().write_all(&raw)?;
        }
        Commands::Stats => {
            let stats = mailbox.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Delete { ids } => {
            for id in ids {
                mailbox.delete_one(&id).await?;
                println!("✓ Deleted {}", id);
            }
        }
        Commands::DeleteMatching { query } => {
            let deleted = mailbox.delete_matching(&query).await?;
            println!("✓ Deleted {} messages", deleted);
        }
        Commands::DeleteAll => {
            let deleted = mailbox.delete_all().await?;
            println!("✓ Deleted {} messages", deleted);
        }
        Commands::Prune => {
            let deleted = mailbox.prune().await?;
            println!("✓ Pruned {} messages", deleted);
        }
        Commands::Run => {
            mailbox.install_signal_handler();
            mailbox.start_background();
            info!("Mailbox running, press Ctrl+C to stop");
            mailbox.wait_closed().await;
        }
    }

    Ok(())
}

async fn resolve_id(mailbox: &Mailbox, id: String) -> Result<String> {
    if id == "latest" {
        Ok(mailbox.latest_id(None).await?)
    } else {
        Ok(id)
    }
}

fn print_summary(summary: &MessageSummary) {
    let from = summary
        .from
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_default();
    let marker = if summary.read { ' ' } else { '*' };

    println!(
        "{} {}  {}  {:<30}  {}",
        marker,
        summary.id,
        summary.created.format("%Y-%m-%d %H:%M"),
        from,
        summary.subject
    );
}
