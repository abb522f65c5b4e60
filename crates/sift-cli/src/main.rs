use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sift_config::SiftConfig;
use sift_wire::Shutdown;

mod commands;

#[derive(Parser)]
#[command(name = "sift", version, about = "Document indexing and retrieval pipeline")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "sift.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and emit file events
    Watch,
    /// Extract text from incoming file events
    Preprocess,
    /// Chunk, embed, and index extracted documents
    Postprocess,
    /// Run the notification mailbox
    Mailbox,
    /// Run the chat API
    Serve,
    /// Ask a one-off question from the command line
    Ask {
        /// The question to answer
        question: String,
        /// User to run the query as
        #[arg(short, long)]
        user: String,
        /// Retrieval mode: normal, deep, or deeper
        #[arg(short, long)]
        mode: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = SiftConfig::from_file(&cli.config)?;
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("config error: {problem}");
        }
        return Err("invalid configuration".into());
    }

    // Staged shutdown: reply sockets stop first so pending requesters
    // see clean failures, then push/pull, then req/router, with the
    // configured grace period between stages.
    let grace = Duration::from_secs(config.transport.shutdown_grace_secs);
    let shutdown = Shutdown::with_grace(grace);
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received; draining in stages");
            signal.begin().await;
        }
    });

    match cli.command {
        Commands::Watch => commands::watch::run(&config, shutdown).await?,
        Commands::Preprocess => commands::preprocess::run(&config, shutdown).await?,
        Commands::Postprocess => commands::postprocess::run(&config, shutdown).await?,
        Commands::Mailbox => commands::mailbox::run(&config, shutdown).await?,
        Commands::Serve => commands::serve::run(&config, shutdown).await?,
        Commands::Ask {
            question,
            user,
            mode,
        } => commands::ask::run(&config, &question, &user, mode.as_deref()).await?,
    }

    Ok(())
}
