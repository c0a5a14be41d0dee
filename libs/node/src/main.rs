use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sheetwire_node::{logging::init_logging, Node, NodeConfig};
use tokio::net::TcpListener;
use tracing::info;

/// Sheetwire node - serves SQLite calls to remote clients over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "SHEETWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory for database files (in memory when omitted)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let mut config = match &args.config {
        Some(path) => NodeConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }

    let filter = if args.debug {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    init_logging(&filter)?;

    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    let node = Node::new(config).context("Failed to start node")?;

    node.serve(listener, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    })
    .await?;

    Ok(())
}
