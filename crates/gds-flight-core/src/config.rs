//! Client configuration.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`GDS_FLIGHT__` prefix, e.g. `GDS_FLIGHT__HOST`)
//! 2. Config file (`gds-flight.toml` by default)
//! 3. Defaults

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Connection and session settings for one client instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    /// Flight service host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Flight service port (default: 8491).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Target database name.
    #[serde(default = "default_database")]
    pub database: String,

    /// Graph (projection or database) name used for imports and reads.
    #[serde(default)]
    pub graph: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Use TLS for the transport.
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Server-side concurrency requested for imports.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout in seconds. Unset means no client-side limit.
    #[serde(default)]
    pub timeout_secs: Option<f64>,

    /// Maximum rows per uploaded batch when slicing a table.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Strict lifecycle checking: out-of-order calls fail fast.
    #[serde(default)]
    pub debug: bool,

    /// GDS version of the server, used to pick procedure names.
    #[serde(default)]
    pub gds_version: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8491
}

fn default_database() -> String {
    "neo4j".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "neo4j".to_string()
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_max_chunk_size() -> usize {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            graph: String::new(),
            user: default_user(),
            password: default_password(),
            tls: default_true(),
            concurrency: default_concurrency(),
            timeout_secs: None,
            max_chunk_size: default_max_chunk_size(),
            debug: false,
            gds_version: None,
        }
    }
}

impl ClientConfig {
    /// Default settings targeting the given graph.
    pub fn for_graph(host: impl Into<String>, graph: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            graph: graph.into(),
            ..Default::default()
        }
    }

    /// Load from an optional config file and `GDS_FLIGHT__*` environment variables.
    pub fn load(file_prefix: &str) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("GDS_FLIGHT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: ClientConfig = cfg.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".to_string()));
        }
        if self.max_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "max_chunk_size must be at least 1".to_string(),
            ));
        }
        if let Some(secs) = self.timeout_secs {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "timeout_secs must be a non-negative number of representable size, got {secs}"
                )));
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Transport location URI, e.g. `grpc+tls://localhost:8491`.
    pub fn location(&self) -> String {
        let scheme = if self.tls { "grpc+tls" } else { "grpc+tcp" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{}/{}?graph={}&encrypted={}&concurrency={}&debug={}&timeout={}&max_chunk_size={}",
            self.user,
            self.host,
            self.port,
            self.database,
            self.graph,
            self.tls,
            self.concurrency,
            self.debug,
            self.timeout_secs
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.max_chunk_size,
        )
    }
}
