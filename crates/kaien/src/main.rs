//! Kaien - sandboxed tool-orchestrating agent

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{engage_command, init_command, status_command, tools_command};

/// Kaien - agent for your terminal
#[derive(Parser)]
#[command(name = "kaien")]
#[command(about = "◆ A sandboxed tool-orchestrating agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and workspace
    Init,
    /// Chat with the agent
    Engage {
        /// Message to send
        #[arg(short, long)]
        message: Option<String>,
        /// Session ID
        #[arg(short, long, default_value = "default")]
        session: String,
    },
    /// List enabled tools and their argument schemas
    Tools {
        /// Print the schemas sent to the model as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show system status
    Status,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => init_command().await,
        Commands::Engage { message, session } => engage_command(message, session).await,
        Commands::Tools { json } => tools_command(json).await,
        Commands::Status => status_command().await,
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        eprintln!("◆ {:#}", e);
        std::process::exit(1);
    }
}
