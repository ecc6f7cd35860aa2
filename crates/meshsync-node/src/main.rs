#![warn(missing_docs)]

//! meshsync node daemon

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshsync_node::{Node, NodeConfig};

#[derive(Parser)]
#[command(name = "msyncd")]
#[command(about = "meshsync peer-to-peer file sharing node", long_about = None)]
struct Cli {
    /// Host to bind and advertise to peers.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind (0 picks an ephemeral port).
    #[arg(short, long, default_value = "59878")]
    port: u16,

    /// Username advertised to peers.
    #[arg(short, long, env = "MESHSYNC_USERNAME", default_value = "anonymous")]
    username: String,

    /// Bootstrap peer as host:port. Omit for the first node of a mesh.
    #[arg(short, long)]
    bootstrap: Option<String>,

    /// Directory containing Files/ and SyncFiles/.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// TOML or JSON config file; overrides all other flags when given.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig {
            host: cli.host,
            port: cli.port,
            username: cli.username,
            bootstrap: cli.bootstrap,
            data_dir: cli.data_dir,
            ..NodeConfig::default()
        },
    };

    let node = Node::start(config).await?;
    tracing::info!(peer = %node.self_peer(), "meshsync node running, SIGINT to stop");

    // SIGUSR1 stands in for the "I saved my edits" action of an
    // interactive driver: it arms the sync watcher's save flag.
    #[cfg(unix)]
    {
        let save = node.save_trigger();
        tokio::spawn(async move {
            let Ok(mut usr1) =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
            else {
                tracing::warn!("could not install SIGUSR1 handler");
                return;
            };
            while usr1.recv().await.is_some() {
                tracing::info!("save triggered");
                save.arm();
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    node.shutdown().await;
    Ok(())
}
