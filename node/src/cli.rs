//! # CLI Interface
//!
//! Defines the command-line argument structure for `graymatter-node` using
//! `clap` derive. Supports four subcommands: `run`, `keygen`, `status`,
//! and `version`. Every `run` flag can also come from a `GRAYMATTER_*`
//! environment variable, which is how container deployments configure it.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use graymatter_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT, PEER_REQUEST_TIMEOUT};
use graymatter_protocol::crypto::{Keypair, PublicKey};
use graymatter_protocol::network::NodeType;

use crate::logging::LogFormat;

/// Gray Matter news ledger node.
///
/// Keeps a hash-linked chain of signed articles, accepts new articles
/// (publisher mode), replicates blocks from peers, and serves the JSON API.
#[derive(Parser, Debug)]
#[command(
    name = "graymatter-node",
    about = "Gray Matter news ledger node",
    version,
    propagate_version = true
)]
pub struct GrayMatterCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a node.
    Run(RunArgs),
    /// Generate a publisher keypair and print it as hex.
    Keygen,
    /// Query the status of a running node.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// The `--mode` values, mapped onto [`NodeType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Publisher,
    Replica,
    Utility,
}

impl From<Mode> for NodeType {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Publisher => NodeType::Publisher,
            Mode::Replica => NodeType::Replica,
            Mode::Utility => NodeType::Utility,
        }
    }
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Public base URL other nodes use to reach this one,
    /// e.g. `http://10.0.0.5:8080`.
    #[arg(long, env = "GRAYMATTER_ADDRESS")]
    pub address: String,

    /// Node role.
    #[arg(long, value_enum, env = "GRAYMATTER_MODE", default_value = "publisher")]
    pub mode: Mode,

    /// Base URL of a running node to bootstrap from. Required for replicas.
    #[arg(long, env = "GRAYMATTER_DONOR")]
    pub donor: Option<String>,

    /// Hex-encoded Ed25519 secret key of the publisher. Required for
    /// publishers.
    #[arg(long, env = "GRAYMATTER_PUBLISHER_SIGNING_KEY", hide_env_values = true)]
    pub publisher_signing_key: Option<String>,

    /// Hex-encoded public key matching `--publisher-signing-key`.
    #[arg(long, env = "GRAYMATTER_PUBLISHER_PUBLIC_KEY")]
    pub publisher_public_key: Option<String>,

    /// Directory for the sled chain database.
    #[arg(long, short = 'd', env = "GRAYMATTER_DATA_DIR", default_value = "./graymatter-data")]
    pub data_dir: PathBuf,

    /// Keep the chain in memory only. Nothing is written to `--data-dir`.
    #[arg(long)]
    pub ephemeral: bool,

    /// Port for the HTTP API.
    #[arg(long, env = "GRAYMATTER_PORT", default_value_t = DEFAULT_API_PORT)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "GRAYMATTER_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Timeout for each outbound call to a peer, in milliseconds.
    #[arg(long, default_value_t = PEER_REQUEST_TIMEOUT.as_millis() as u64)]
    pub peer_timeout_ms: u64,

    /// Log output format.
    #[arg(long, value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Why a `run` configuration cannot start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--address must not be blank")]
    BlankAddress,

    #[error("replica nodes require --donor")]
    MissingDonor,

    #[error("publisher nodes require --publisher-signing-key and --publisher-public-key")]
    MissingPublisherKeys,

    #[error("invalid publisher key material: {0}")]
    InvalidPublisherKey(#[from] graymatter_protocol::crypto::KeyError),
}

impl RunArgs {
    pub fn node_type(&self) -> NodeType {
        self.mode.into()
    }

    /// Donor address, with a blank value treated as absent.
    pub fn donor(&self) -> Option<&str> {
        self.donor.as_deref().map(str::trim).filter(|d| !d.is_empty())
    }

    /// Check the combination of flags before anything is opened or bound.
    ///
    /// Publishers must carry a matching keypair; replicas must know a donor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::BlankAddress);
        }
        match self.node_type() {
            NodeType::Publisher => {
                let (Some(secret), Some(public)) = (
                    self.publisher_signing_key.as_deref(),
                    self.publisher_public_key.as_deref(),
                ) else {
                    return Err(ConfigError::MissingPublisherKeys);
                };
                let keypair = Keypair::from_hex(secret)?;
                keypair.ensure_matches(&PublicKey::from_hex(public)?)?;
            }
            NodeType::Replica if self.donor().is_none() => return Err(ConfigError::MissingDonor),
            NodeType::Replica | NodeType::Utility => {}
        }
        Ok(())
    }
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the running node.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use graymatter_protocol::crypto::KeyError;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        GrayMatterCli::command().debug_assert();
    }

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["graymatter-node", "run", "--address", "http://127.0.0.1:8080"];
        argv.extend_from_slice(extra);
        match GrayMatterCli::try_parse_from(argv).expect("parse").command {
            Commands::Run(args) => args,
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn defaults() {
        let args = run_args(&["--mode", "utility"]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.metrics_port, 9090);
        assert_eq!(args.node_type(), NodeType::Utility);
        assert!(!args.ephemeral);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn replica_requires_donor() {
        let args = run_args(&["--mode", "replica"]);
        assert!(matches!(args.validate(), Err(ConfigError::MissingDonor)));

        let blank = run_args(&["--mode", "replica", "--donor", "  "]);
        assert!(matches!(blank.validate(), Err(ConfigError::MissingDonor)));

        let ok = run_args(&["--mode", "replica", "--donor", "http://donor:8080"]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn publisher_requires_matching_keys() {
        let keypair = Keypair::from_seed(&[5; 32]);
        let other = Keypair::from_seed(&[6; 32]);
        let secret = keypair.secret_key_hex();
        let public = keypair.public_key().to_hex();
        let wrong_public = other.public_key().to_hex();

        let missing = run_args(&["--mode", "publisher"]);
        assert!(matches!(missing.validate(), Err(ConfigError::MissingPublisherKeys)));

        let mismatched = run_args(&[
            "--publisher-signing-key",
            &secret,
            "--publisher-public-key",
            &wrong_public,
        ]);
        assert!(matches!(
            mismatched.validate(),
            Err(ConfigError::InvalidPublisherKey(KeyError::KeypairMismatch))
        ));

        let good = run_args(&[
            "--publisher-signing-key",
            &secret,
            "--publisher-public-key",
            &public,
        ]);
        assert!(good.validate().is_ok());
    }
}
