use agora_node::config::NodeConfig;
use agora_node::logging::init_logging;
use agora_node::node::AgoraNode;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_CONFIG_PATH: &str = "./agora.toml";

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Agora - paid-service task orchestration node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestration node
    Start {
        /// Host for the HTTP API
        #[arg(long)]
        host: Option<String>,

        /// Port for the HTTP API
        #[arg(long)]
        port: Option<u16>,
    },

    /// Write a default configuration file
    Init {
        /// Output directory for the configuration
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(ref path) = cli.config {
        NodeConfig::from_file(path)?
    } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
        NodeConfig::from_file(Path::new(DEFAULT_CONFIG_PATH))?
    } else {
        NodeConfig::default()
    };
    config.apply_env_overrides();

    init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Start { host, port } => {
            if let Some(host) = host {
                config.api.host = host;
            }
            if let Some(port) = port {
                config.api.port = port;
            }
            config.validate()?;

            info!(
                version = env!("CARGO_PKG_VERSION"),
                registry = %config.registry.gateway_url,
                storage = %config.storage.bridge_url,
                "Starting Agora node"
            );
            AgoraNode::new(config)?.serve().await
        }
        Commands::Init { output } => {
            let path = output.join("agora.toml");
            NodeConfig::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}
