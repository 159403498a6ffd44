use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use patch_replica::{cli::Cli, node::Node};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.to_config()?;
    let name = config.name.clone();

    let listener = TcpListener::bind(cli.listen_addr()).await?;
    let node = Node::new(listener, config);
    let addr = node.local_addr()?;
    info!("node {} listening on {}", name, addr);

    if let Err(err) = node.run_until_ctrl_c().await {
        warn!("node exited with error: {err:?}");
        return Err(err);
    }

    Ok(())
}
