// packages/ingest/src/utils/config.rs
//! Server configuration
//!
//! Loaded once at startup from an optional config file layered under
//! `BES_INGEST_*` environment variables, e.g.
//!
//! ```text
//! BES_INGEST_SERVER__PORT=1985
//! BES_INGEST_STORAGE__DISK__ROOT_DIRECTORY=/var/lib/bes-ingest
//! BES_INGEST_PROXY__TARGETS=http://mirror-a:1985,http://mirror-b:1985
//! ```

use crate::blobstore::BackendConfig;
use crate::utils::errors::{IngestError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Environment variable naming the config file (without extension)
pub const CONFIG_PATH_ENV: &str = "BES_INGEST_CONFIG";

const DEFAULT_CONFIG_NAME: &str = "bes-ingest";
const ENV_PREFIX: &str = "BES_INGEST";

/// Top-level server configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// gRPC listen address
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1985,
        }
    }
}

/// Blob storage settings; exactly one backend must be set
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    pub disk: Option<DiskConfig>,
    pub cloud: Option<CloudConfig>,
}

/// Local filesystem backend
#[derive(Debug, Clone, Deserialize)]
pub struct DiskConfig {
    pub root_directory: PathBuf,
}

/// Object-storage backend
#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    pub bucket: String,

    /// Project the stored builds belong to
    pub project_id: Option<String>,

    /// Account ID sent with every bucket and object request; the service
    /// rejects requests against a bucket owned by anyone else
    pub expected_bucket_owner: Option<String>,

    /// Named credentials profile; the default provider chain is used otherwise
    pub credentials_profile: Option<String>,

    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
}

/// Secondary servers receiving a best-effort copy of all traffic
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub targets: Vec<String>,

    /// Events buffered per proxy target before new ones are dropped
    #[serde(default = "default_forward_buffer")]
    pub forward_buffer: usize,
}

fn default_forward_buffer() -> usize {
    1024
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            forward_buffer: default_forward_buffer(),
        }
    }
}

/// Prometheus exporter; disabled when `listen` is unset
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    pub listen: Option<SocketAddr>,
}

impl ServerConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_NAME.to_string());

        let config = Config::builder()
            .add_source(File::with_name(&path).required(false))
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Resolve the single configured storage backend
    pub fn backend(&self) -> Result<BackendConfig> {
        match (&self.storage.disk, &self.storage.cloud) {
            (Some(disk), None) => Ok(BackendConfig::Disk(disk.clone())),
            (None, Some(cloud)) if !cloud.bucket.is_empty() => Ok(BackendConfig::Cloud(cloud.clone())),
            (None, Some(_)) => Err(IngestError::ConfigError(
                "storage.cloud.bucket must not be empty".to_string(),
            )),
            (Some(_), Some(_)) => Err(IngestError::ConfigError(
                "both storage.disk and storage.cloud are configured; pick exactly one".to_string(),
            )),
            (None, None) => Err(IngestError::ConfigError(
                "no storage backend configured; set storage.disk or storage.cloud".to_string(),
            )),
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| IngestError::ConfigError(format!("Invalid listen address: {}", e)))
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("proxy.targets")
        .try_parsing(true)
}
