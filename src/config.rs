//! Command line and environment configuration
//!
//! Every flag can also be set through the environment variable named in
//! its `env` attribute; the flag wins when both are present.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::trace;

/// Upper bound for any single operation against a durable medium
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(15);

const DEFAULT_STORE_INTERVAL: Duration = Duration::from_secs(300);

/// Parse a duration given either as bare seconds (`"300"`) or in humantime
/// notation (`"300s"`, `"2m"`, `"1h 30m"`)
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tallyhub-server", about = "Collects and stores metrics reported by agents")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
    pub address: String,

    /// Snapshot interval; 0 writes after every update
    #[arg(
        short = 'i',
        long,
        env = "STORE_INTERVAL",
        default_value = "300s",
        value_parser = parse_duration
    )]
    pub store_interval: Duration,

    /// Snapshot file; empty disables file storage
    #[arg(
        short = 'f',
        long,
        env = "STORE_FILE",
        default_value = "/tmp/devops-metrics-db.json"
    )]
    pub store_file: String,

    /// Load the previous snapshot on start
    #[arg(short = 'r', long, env = "RESTORE")]
    pub restore: bool,

    /// Shared secret for metric hashes
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// SQLite connection URL, e.g. sqlite://metrics.db
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,
}

impl ServerConfig {
    pub fn storage_settings(&self) -> StorageSettings {
        let settings = StorageSettings {
            database_dsn: self.database_dsn.clone().filter(|dsn| !dsn.is_empty()),
            store_file: Some(self.store_file.trim())
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            store_interval: self.store_interval,
            restore: self.restore,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        };
        trace!("storage settings: {settings:?}");
        settings
    }

    /// Hashing key, `None` when unset or empty
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tallyhub-agent", about = "Polls process metrics and reports them to a server")]
pub struct AgentConfig {
    /// Server address
    #[arg(short = 'a', long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
    pub address: String,

    #[arg(
        short = 'r',
        long,
        env = "REPORT_INTERVAL",
        default_value = "10s",
        value_parser = parse_duration
    )]
    pub report_interval: Duration,

    #[arg(
        short = 'p',
        long,
        env = "POLL_INTERVAL",
        default_value = "2s",
        value_parser = parse_duration
    )]
    pub poll_interval: Duration,

    /// Shared secret for metric hashes
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Send one raw `/update/{kind}/{id}/{value}` request per metric
    /// instead of a JSON batch
    #[arg(long, env = "RAW_REPORT")]
    pub raw: bool,
}

impl AgentConfig {
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref().filter(|k| !k.is_empty())
    }

    /// Base URL of the server, accepting addresses with or without scheme
    pub fn base_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("http://{address}")
        }
    }
}

/// Everything the repository tiers need to initialize
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub database_dsn: Option<String>,
    pub store_file: Option<PathBuf>,
    pub store_interval: Duration,
    pub restore: bool,
    pub operation_timeout: Duration,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_dsn: None,
            store_file: None,
            store_interval: DEFAULT_STORE_INTERVAL,
            restore: false,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}
