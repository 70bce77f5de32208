//! `NodeConfig` assembly from the CLI surface named in the spec.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "chaincoin-core", about = "A minimal UTXO proof-of-work node")]
pub struct Cli {
    /// Index of this node among the --ips list; determines its ports.
    #[arg(long)]
    pub index: usize,

    /// Every node's host in the network, in index order.
    #[arg(long, num_args = 1.., required = true)]
    pub ips: Vec<String>,

    /// Proof-of-work difficulty (leading zero hex digits).
    #[arg(long, default_value_t = 2)]
    pub difficulty: u32,

    /// Base P2P port; this node listens on `p2p_port + index`.
    #[arg(long, default_value_t = 9000)]
    pub p2p_port: u16,

    /// Base HTTP API port; this node listens on `api_port + index`.
    #[arg(long, default_value_t = 8000)]
    pub api_port: u16,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub p2p_port: u16,
    pub api_port: u16,
    pub difficulty: u32,
    pub bootstrap_peers: Vec<(String, u16)>,
    pub chain_file: PathBuf,
}

impl NodeConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        let host = cli.ips[cli.index].clone();
        let p2p_port = cli.p2p_port + cli.index as u16;
        let api_port = cli.api_port + cli.index as u16;
        let bootstrap_peers = cli
            .ips
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != cli.index)
            .map(|(i, host)| (host.clone(), cli.p2p_port + i as u16))
            .collect();

        NodeConfig {
            host,
            p2p_port,
            api_port,
            difficulty: cli.difficulty,
            bootstrap_peers,
            chain_file: PathBuf::from(format!("chain-{}.json", cli.index)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_peers_are_every_other_ip_at_base_plus_index() {
        let cli = Cli {
            index: 1,
            ips: vec!["a".into(), "b".into(), "c".into()],
            difficulty: 2,
            p2p_port: 9000,
            api_port: 8000,
        };
        let config = NodeConfig::from_cli(&cli);
        assert_eq!(config.host, "b");
        assert_eq!(config.p2p_port, 9001);
        assert_eq!(config.api_port, 8001);
        assert_eq!(config.bootstrap_peers, vec![("a".to_string(), 9000), ("c".to_string(), 9002)]);
    }
}
