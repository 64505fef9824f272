use crate::storage::{StorageBackend, StorageConfig};
use crate::uploader::{DEFAULT_BUFFER_CHUNKS, UploadPolicy};
use crate::validator::{ContentPolicy, DEFAULT_ALLOWED_CONTENT_TYPES, DEFAULT_MAX_FILE_SIZE};
use clap::ArgAction::Append;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure that can be loaded from CLI, environment, or config file
///
/// Example configuration file content
/// # URL relay configuration
///
/// # Server configuration
/// listen_on_port = 3000
/// environment = "production"
///
/// # Storage configuration
/// storage_backend = "s3"  # Options: "local" or "s3"
/// workspace = "./data"    # Root of the "local" backend
///
/// # S3 configuration (required when storage_backend = "s3")
/// s3_bucket = "media"
/// s3_endpoint = "http://localhost:9000"  # Optional: for MinIO or custom S3
/// s3_region = "us-east-1"                # Optional
/// s3_access_key_id = "minioadmin"
/// s3_secret_access_key = "minioadmin"
///
/// # Upload limits
/// max_file_size = 200000000000
/// allowed_content_types = ["image/jpeg", "image/png", "video/mp4"]
/// buffer_chunks = 16
/// stall_timeout_secs = 60
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Deployment environment; "local" prints where the API docs are served
    #[arg(short, long, env = "APP_ENV", default_value = "local")]
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Configuration file path
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Storage backend: local or s3
    #[arg(short, long, env = "STORAGE_BACKEND", default_value = "local")]
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,

    /// Root directory of the local storage backend
    #[arg(short = 'w', long, env = "WORKSPACE", default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// S3 bucket name (required when storage-backend is s3)
    #[arg(long, env = "S3_BUCKET")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<String>,

    /// S3 endpoint (for MinIO/custom S3)
    #[arg(long, env = "S3_ENDPOINT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,

    /// S3 region
    #[arg(long, env = "S3_REGION")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_region: Option<String>,

    /// S3 access key ID
    #[arg(long, env = "S3_ACCESS_KEY", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long, env = "S3_SECRET_KEY", hide_env_values = true)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_secret_access_key: Option<String>,

    /// Largest accepted object, in bytes
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Accepted content type, matched exactly. Can be specified multiple times;
    /// the built-in list is used when none is given.
    #[arg(long = "allowed-content-type", action = Append)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_content_types: Vec<String>,

    /// Chunks buffered between the source download and the storage writer
    #[arg(long, default_value_t = DEFAULT_BUFFER_CHUNKS)]
    #[serde(default = "default_buffer_chunks")]
    pub buffer_chunks: usize,

    /// Seconds to wait for the next chunk of a source body (0 = no limit)
    #[arg(long, default_value_t = 60)]
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,

    /// Seconds to wait for a source connection (0 = no limit)
    #[arg(long, default_value_t = 10)]
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Seconds allowed for each storage operation (0 = no limit)
    #[arg(long, default_value_t = 300)]
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            environment: default_environment(),
            config: None,
            storage_backend: default_storage_backend(),
            workspace: default_workspace(),
            s3_bucket: None,
            s3_endpoint: None,
            s3_region: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            max_file_size: default_max_file_size(),
            allowed_content_types: Vec::new(),
            buffer_chunks: default_buffer_chunks(),
            stall_timeout_secs: default_stall_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            storage_timeout_secs: default_storage_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from CLI args and environment, optionally merging with a config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args and environment take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.environment == default_environment() {
            self.environment = file_config.environment;
        }
        if self.storage_backend == default_storage_backend() {
            self.storage_backend = file_config.storage_backend;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.max_file_size == default_max_file_size() {
            self.max_file_size = file_config.max_file_size;
        }
        if self.buffer_chunks == default_buffer_chunks() {
            self.buffer_chunks = file_config.buffer_chunks;
        }
        if self.stall_timeout_secs == default_stall_timeout_secs() {
            self.stall_timeout_secs = file_config.stall_timeout_secs;
        }
        if self.connect_timeout_secs == default_connect_timeout_secs() {
            self.connect_timeout_secs = file_config.connect_timeout_secs;
        }
        if self.storage_timeout_secs == default_storage_timeout_secs() {
            self.storage_timeout_secs = file_config.storage_timeout_secs;
        }

        if self.s3_bucket.is_none() {
            self.s3_bucket = file_config.s3_bucket;
        }
        if self.s3_endpoint.is_none() {
            self.s3_endpoint = file_config.s3_endpoint;
        }
        if self.s3_region.is_none() {
            self.s3_region = file_config.s3_region;
        }
        if self.s3_access_key_id.is_none() {
            self.s3_access_key_id = file_config.s3_access_key_id;
        }
        if self.s3_secret_access_key.is_none() {
            self.s3_secret_access_key = file_config.s3_secret_access_key;
        }
        if self.allowed_content_types.is_empty() {
            self.allowed_content_types = file_config.allowed_content_types;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.storage_backend.as_str() {
            "local" => {
                if self.workspace.is_empty() {
                    return Err(anyhow::anyhow!(
                        "Workspace is required when backend is 'local'"
                    ));
                }
            }
            "s3" => {
                if self
                    .s3_bucket
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 bucket name is required when backend is 's3'"
                    ));
                }
                if self
                    .s3_access_key_id
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 access key ID is required when backend is 's3'"
                    ));
                }
                if self
                    .s3_secret_access_key
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 secret access key is required when backend is 's3'"
                    ));
                }
            }
            backend => {
                return Err(anyhow::anyhow!(
                    "Unsupported storage backend: {}. Use 'local' or 's3'",
                    backend
                ));
            }
        }

        if self.max_file_size == 0 {
            return Err(anyhow::anyhow!("Max file size must be greater than 0"));
        }
        if self.buffer_chunks == 0 {
            return Err(anyhow::anyhow!("Buffer chunks must be greater than 0"));
        }
        if self.allowed_content_types.iter().any(String::is_empty) {
            return Err(anyhow::anyhow!("Allowed content types cannot be empty"));
        }

        Ok(())
    }

    /// Convert to S3 storage backend configuration
    pub fn to_s3_config(&self) -> Option<S3Config> {
        if self.storage_backend != "s3" {
            return None;
        }

        Some(S3Config {
            bucket: self.s3_bucket.clone()?,
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            access_key_id: self.s3_access_key_id.clone()?,
            secret_access_key: self.s3_secret_access_key.clone()?,
        })
    }

    pub fn storage_config(&self) -> anyhow::Result<StorageConfig> {
        let backend = match self.to_s3_config() {
            Some(s3) => StorageBackend::S3 {
                bucket: s3.bucket,
                endpoint: s3.endpoint,
                region: s3.region,
                access_key_id: s3.access_key_id,
                secret_access_key: s3.secret_access_key,
            },
            None if self.storage_backend == "local" => StorageBackend::Local {
                root: std::path::absolute(PathBuf::from(&self.workspace))?,
            },
            None => {
                return Err(anyhow::anyhow!(
                    "Incomplete configuration for storage backend '{}'",
                    self.storage_backend
                ));
            }
        };

        Ok(StorageConfig {
            backend,
            io_timeout: secs(self.storage_timeout_secs),
        })
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        let allowed_content_types = if self.allowed_content_types.is_empty() {
            DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(ToString::to_string)
                .collect()
        } else {
            self.allowed_content_types.clone()
        };

        UploadPolicy {
            content: ContentPolicy {
                max_file_size: self.max_file_size,
                allowed_content_types,
            },
            buffer_chunks: self.buffer_chunks,
            stall_timeout: secs(self.stall_timeout_secs),
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        secs(self.connect_timeout_secs)
    }

    pub fn is_local_environment(&self) -> bool {
        self.environment == "local"
    }
}

// S3 configuration subset
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

// Default value functions
fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "local".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_buffer_chunks() -> usize {
    DEFAULT_BUFFER_CHUNKS
}

fn default_stall_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_storage_timeout_secs() -> u64 {
    300
}
