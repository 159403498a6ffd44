//! Node and peer configuration.
//!
//! A peer list has one entry per line:
//!
//! ```text
//! # host[:port] [pull|push|both]
//! node-b
//! node-c:9000 both
//! 10.0.0.7 push
//! ```
//!
//! Blank lines and `#` comments are skipped. A host without a port is dialed
//! on the configured peer port. The direction defaults to `pull`.

use std::net::{Ipv6Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Fixed delay between replication dial attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_PEER_PORT: u16 = 8080;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Which way transactions flow over the links created for one peer entry.
///
/// Replication connections are one-way: the accepting side writes its log
/// and the dialing side reads it (`pull`), or the dialing side writes and
/// the accepting side reads (`push`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Dial the peer and read its log.
    #[default]
    Pull,
    /// Dial the peer and write our log to it.
    Push,
    Both,
}

impl Direction {
    pub fn pulls(self) -> bool {
        matches!(self, Direction::Pull | Direction::Both)
    }

    pub fn pushes(self) -> bool {
        matches!(self, Direction::Push | Direction::Both)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pull" => Ok(Direction::Pull),
            "push" => Ok(Direction::Push),
            "both" => Ok(Direction::Both),
            other => Err(other.to_string()),
        }
    }
}

/// One configured peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLink {
    /// `host:port` to dial.
    pub target: String,
    pub direction: Direction,
}

impl PeerLink {
    pub fn new(target: impl Into<String>, direction: Direction) -> Self {
        Self {
            target: target.into(),
            direction,
        }
    }
}

/// Everything a [`Node`](crate::node::Node) needs at startup. Immutable once
/// the node is running.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Source id stamped on locally originated transactions.
    pub name: String,
    pub links: Vec<PeerLink>,
    pub reconnect_delay: Duration,
    pub queue_capacity: usize,
}

impl NodeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: Vec::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// Parses a single peer entry. Returns `None` for blank or comment lines.
pub fn parse_peer_line(
    line: &str,
    number: usize,
    default_port: u16,
) -> Result<Option<PeerLink>, ConfigError> {
    let content = line.split('#').next().unwrap_or_default().trim();
    let mut parts = content.split_whitespace();

    let Some(host) = parts.next() else {
        return Ok(None);
    };

    let direction = match parts.next() {
        Some(value) => value
            .parse()
            .map_err(|value| ConfigError::InvalidDirection {
                line: number,
                value,
            })?,
        None => Direction::default(),
    };

    if let Some(extra) = parts.next() {
        return Err(ConfigError::TrailingInput {
            line: number,
            value: extra.to_string(),
        });
    }

    Ok(Some(PeerLink::new(with_port(host, default_port), direction)))
}

/// Parses a whole peer list.
pub fn parse_peer_list(text: &str, default_port: u16) -> Result<Vec<PeerLink>, ConfigError> {
    let mut links = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(link) = parse_peer_line(line, index + 1, default_port)? {
            links.push(link);
        }
    }
    Ok(links)
}

/// Reads and parses a peer list file.
pub fn load_peer_list(path: &Path, default_port: u16) -> Result<Vec<PeerLink>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_peer_list(&text, default_port)
}

fn with_port(host: &str, default_port: u16) -> String {
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    if host.parse::<Ipv6Addr>().is_ok() {
        return format!("[{host}]:{default_port}");
    }

    let has_port = host
        .rsplit_once(':')
        .is_some_and(|(name, port)| !name.contains(':') && port.parse::<u16>().is_ok());

    if has_port {
        host.to_string()
    } else {
        format!("{host}:{default_port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hosts_ports_and_directions() {
        let text = "\
# cluster peers
node-b
node-c:9000 both

10.0.0.7 PUSH   # trailing comment
[::1]:7000
::1
[fe80::2]
";
        let links = parse_peer_list(text, 8080).unwrap();
        assert_eq!(
            links,
            vec![
                PeerLink::new("node-b:8080", Direction::Pull),
                PeerLink::new("node-c:9000", Direction::Both),
                PeerLink::new("10.0.0.7:8080", Direction::Push),
                PeerLink::new("[::1]:7000", Direction::Pull),
                PeerLink::new("[::1]:8080", Direction::Pull),
                PeerLink::new("[fe80::2]:8080", Direction::Pull),
            ]
        );
    }

    #[test]
    fn bare_ipv6_hosts_are_bracketed() {
        let link = parse_peer_line("::1 both", 1, 8080).unwrap().unwrap();
        assert_eq!(link.target, "[::1]:8080");
        assert!(link.target.parse::<SocketAddr>().is_ok());
    }

    #[test]
    fn empty_list_has_no_peers() {
        assert!(parse_peer_list("", 8080).unwrap().is_empty());
        assert!(parse_peer_list("\n\n  \n", 8080).unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_direction() {
        let err = parse_peer_list("node-b\nnode-c sideways\n", 8080).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDirection { line: 2, ref value } if value == "sideways"
        ));
    }

    #[test]
    fn rejects_trailing_input() {
        let err = parse_peer_list("node-b pull extra", 8080).unwrap_err();
        assert!(matches!(err, ConfigError::TrailingInput { line: 1, .. }));
    }

    #[test]
    fn direction_roles() {
        assert!(Direction::Pull.pulls() && !Direction::Pull.pushes());
        assert!(!Direction::Push.pulls() && Direction::Push.pushes());
        assert!(Direction::Both.pulls() && Direction::Both.pushes());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_peer_list(Path::new("/definitely/not/here/peers.txt"), 8080).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
