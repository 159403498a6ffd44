use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use crate::config::{self, NodeConfig, DEFAULT_PEER_PORT};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Node identity, stamped as the source of every local write.
    #[arg(long, default_value = "default")]
    pub name: String,

    /// Address to listen on for HTTP and replication connections.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Peer list file, one `host[:port] [pull|push|both]` entry per line.
    #[arg(long, default_value = "peers.txt")]
    pub peers: PathBuf,

    /// Additional peer entry, same syntax as a peer list line. Repeatable.
    #[arg(long = "peer")]
    pub extra_peers: Vec<String>,

    /// Port used for peers listed without one.
    #[arg(long, default_value_t = DEFAULT_PEER_PORT)]
    pub peer_port: u16,

    /// Fixed delay between replication reconnect attempts, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    pub reconnect_delay_ms: u64,

    /// Capacity of the sequencer's arrival queue.
    #[arg(long, default_value_t = config::DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,
}

impl Cli {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Builds the node configuration, reading the peer list file if present.
    pub fn to_config(&self) -> Result<NodeConfig> {
        let mut links = if self.peers.exists() {
            config::load_peer_list(&self.peers, self.peer_port)
                .with_context(|| format!("invalid peer list {}", self.peers.display()))?
        } else {
            warn!(path = %self.peers.display(), "peer list not found; starting without peers");
            Vec::new()
        };

        for (index, entry) in self.extra_peers.iter().enumerate() {
            let link = config::parse_peer_line(entry, index + 1, self.peer_port)
                .with_context(|| format!("invalid --peer '{entry}'"))?;
            links.extend(link);
        }

        Ok(NodeConfig {
            name: self.name.clone(),
            links,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            queue_capacity: self.queue_capacity,
        })
    }
}
