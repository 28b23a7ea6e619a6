//! sandctl CLI - run a local sandbox and follow remote tasks.
//!
//! # Usage
//!
//! ```bash
//! # Start a sandbox in the foreground (Ctrl+C to stop)
//! sandctl sandbox start box1 --exec /opt/sandbox/bin/server
//!
//! # Start it in the background, then stop it
//! sandctl sandbox start box1 --exec /opt/sandbox/bin/server --detach
//! sandctl sandbox stop
//!
//! # Trigger a remote task and follow its progress
//! sandctl task run repo/export --data '{"repository":"main"}'
//!
//! # Follow a task that is already running
//! sandctl task watch 7f1c2d
//!
//! # Refresh the version reminder
//! sandctl latest
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use sandctl::SandctlConfig;
use sandctl::output;
use sandctl::commands::{self, StartArgs};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "sandctl")]
#[command(about = "Local sandbox supervisor and remote task monitor", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to ~/.sandctl/config.toml)
    #[arg(long, global = true, env = "SANDCTL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the local sandbox process
    #[command(subcommand)]
    Sandbox(SandboxCommands),

    /// Run and follow remote tasks
    #[command(subcommand)]
    Task(TaskCommands),

    /// Check for the latest sandctl version
    Latest,
}

#[derive(Subcommand)]
enum SandboxCommands {
    /// Start a sandbox
    Start {
        /// Sandbox name
        name: String,

        /// Path to the sandbox executable
        #[arg(long = "exec")]
        executable: PathBuf,

        /// Run in the background
        #[arg(short, long)]
        detach: bool,

        /// Run in production mode instead of development mode
        #[arg(long)]
        prod: bool,

        /// HTTP port the sandbox will listen on
        #[arg(long)]
        http_port: Option<u16>,

        /// Extra arguments passed to the executable
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Stop the running sandbox and its child processes
    Stop,

    /// Show the running sandbox
    Status,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Send a request that schedules a task and follow it to completion
    Run {
        /// API path relative to the remote URL
        path: String,

        /// HTTP method
        #[arg(short, long, default_value = "POST")]
        method: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,

        /// Label shown next to the progress bar
        #[arg(long)]
        description: Option<String>,
    },

    /// Follow an already scheduled task
    Watch {
        /// Task id
        id: String,

        /// Label shown next to the progress bar
        #[arg(long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("Error: {:#}", e));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => SandctlConfig::load_explicit(path)?,
        None => SandctlConfig::load()?,
    };

    match cli.command {
        Commands::Sandbox(sandbox_cmd) => match sandbox_cmd {
            SandboxCommands::Start {
                name,
                executable,
                detach,
                prod,
                http_port,
                args,
            } => {
                commands::sandbox_start(
                    &config,
                    StartArgs {
                        name,
                        executable,
                        args,
                        detach,
                        prod,
                        http_port,
                    },
                )
                .await?;
            }
            SandboxCommands::Stop => {
                commands::sandbox_stop(&config).await?;
            }
            SandboxCommands::Status => {
                commands::sandbox_status().await?;
            }
        },

        Commands::Task(task_cmd) => match task_cmd {
            TaskCommands::Run {
                path,
                method,
                data,
                description,
            } => {
                commands::task_run(&config, path, method, data, description).await?;
            }
            TaskCommands::Watch { id, description } => {
                commands::task_watch(&config, id, description).await?;
            }
        },

        Commands::Latest => {
            commands::latest(&config).await?;
        }
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new("sandctl=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sandctl=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
