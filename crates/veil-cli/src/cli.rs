//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Veilguard - WireGuard tunnels to managed nodes.
#[derive(Parser, Debug, Clone)]
#[command(name = "veilguard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML settings file.
    #[arg(short, long, env = "VEILGUARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Control-plane base URL; overrides the settings file.
    #[arg(long, env = "VEILGUARD_API_URL")]
    pub api_url: Option<String>,

    /// Tunnel interface name; overrides the settings file.
    #[arg(short, long, env = "VEILGUARD_INTERFACE")]
    pub interface: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long)]
    pub verbose: bool,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Plain text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Connect to a node and bring the tunnel up.
    Connect {
        /// Bearer token from `login`.
        #[arg(short, long, env = "VEILGUARD_TOKEN", hide_env_values = true)]
        token: String,

        /// Node to connect to.
        #[arg(short, long)]
        node: String,
    },

    /// Tear the tunnel down. Safe to run when nothing is up.
    Disconnect {
        /// Config file used to connect, if not the configured one.
        #[arg(long)]
        config_path: Option<PathBuf>,
    },

    /// List nodes available for connection.
    Nodes {
        /// Bearer token from `login`.
        #[arg(short, long, env = "VEILGUARD_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Exchange an API key for a bearer token.
    Login {
        /// Organization API key.
        #[arg(long, env = "VEILGUARD_API_KEY", hide_env_values = true)]
        api_key: String,
    },

    /// Create a new organization and print its API key.
    Register,

    /// Show the tunnel interface and, with a token, the subscription.
    Status {
        /// Bearer token from `login`.
        #[arg(short, long, env = "VEILGUARD_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}
