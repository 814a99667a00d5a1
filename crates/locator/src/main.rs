mod cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "taskfiles")]
#[command(about = "Resolve and fetch files from task sandboxes on cluster agents", version, author)]
struct Cli {
    /// Settings file (defaults to the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cluster-info provider base URL
    #[arg(long, global = true)]
    marathon_url: Option<String>,

    /// Leader URL; with --framework-id skips the info lookup
    #[arg(long, global = true)]
    leader_url: Option<String>,

    #[arg(long, global = true)]
    framework_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Resolve one file of a task and optionally download it
    Fetch {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        task: String,
        #[arg(long)]
        file: String,
        /// Write the file here instead of only printing its URI
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Print a task's whole sandbox listing as JSON
    Files {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        task: String,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
    /// Show the launch queue, or one app's remaining delay
    Queue {
        #[arg(long)]
        app: Option<String>,
    },
    /// Run the resolver behind a small HTTP server
    Serve {
        #[arg(long, default_value = "127.0.0.1:9921")]
        bind: String,
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let overrides = cmd::Overrides {
        marathon_url: cli.marathon_url,
        leader_url: cli.leader_url,
        framework_id: cli.framework_id,
    };
    let settings = cmd::load_settings(cli.config.as_deref(), overrides)?;

    match cli.command {
        Commands::Fetch { agent, task, file, out, timeout_secs } => {
            cmd::fetch(settings, agent, task, file, out, timeout_secs).await
        }
        Commands::Files { agent, task, timeout_secs } => cmd::files(settings, agent, task, timeout_secs).await,
        Commands::Queue { app } => cmd::queue(settings, app).await,
        Commands::Serve { bind, timeout_secs } => {
            let shutdown = setup_shutdown_handler();
            tokio::select! {
                result = cmd::serve(settings, bind, timeout_secs) => result,
                _ = shutdown => {
                    info!("Shutdown signal received, stopping server");
                    Ok(())
                }
            }
        }
    }
}

async fn setup_shutdown_handler() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
