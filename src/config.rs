use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// Node settings, read from flags or `MINICOIN_*` environment variables
#[derive(Debug, Clone, Parser)]
#[command(name = "minicoin", version, about = "Proof-of-work ledger node")]
pub struct NodeConfig {
    /// Interface the HTTP server binds to
    #[arg(long, env = "MINICOIN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port the HTTP server listens on
    #[arg(long, env = "MINICOIN_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory of the sled database
    #[arg(long, env = "MINICOIN_DATA_DIR", default_value = "data/ledger")]
    pub data_dir: PathBuf,

    /// Peer to replicate with (host:port); repeatable
    #[arg(long = "peer", env = "MINICOIN_PEERS", value_delimiter = ',')]
    pub peers: Vec<String>,

    /// Hex encoded ed25519 secret key; a fresh wallet is generated if absent
    #[arg(long, env = "MINICOIN_SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Timeout for each request to a peer, in milliseconds
    #[arg(long, env = "MINICOIN_PEER_TIMEOUT_MS", default_value_t = 2000)]
    pub peer_timeout_ms: u64,
}

impl NodeConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::try_parse_from(["minicoin"]).unwrap();

        assert_eq!(config.bind_address(), ("127.0.0.1".to_string(), 5000));
        assert_eq!(config.data_dir, PathBuf::from("data/ledger"));
        assert!(config.peers.is_empty());
        assert_eq!(config.peer_timeout(), Duration::from_millis(2000));
    }

    #[test]
    fn test_flags() {
        let config = NodeConfig::try_parse_from([
            "minicoin",
            "--port",
            "5001",
            "--peer",
            "localhost:5002",
            "--peer",
            "localhost:5003,localhost:5004",
            "--peer-timeout-ms",
            "500",
        ])
        .unwrap();

        assert_eq!(config.port, 5001);
        assert_eq!(config.peers, vec!["localhost:5002", "localhost:5003", "localhost:5004"]);
        assert_eq!(config.peer_timeout_ms, 500);
    }
}
