use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub janitor: JanitorConfig,
    /// Maximum number of tags per file
    pub max_tags: usize,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for local storage backend
    pub local_storage_path: String,
    /// S3-compatible endpoint URL (required when backend is s3)
    pub s3_endpoint: Option<String>,
    /// Bucket name (required when backend is s3)
    pub s3_bucket: Option<String>,
    pub s3_region: String,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Age in hours after which PENDING/FAILED records are reclaimed
    pub retention_hours: u64,
    /// How often the sweeper runs (seconds)
    pub sweep_interval_secs: u64,
    /// Records fetched per sweep batch
    pub batch_size: usize,
    /// Ceiling on batches per run, against unbounded runs on a large backlog
    pub max_batches: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./files".to_string(),
            s3_endpoint: None,
            s3_bucket: None,
            s3_region: "us-east-1".to_string(),
            s3_access_key: None,
            s3_secret_key: None,
        }
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            retention_hours: 4,
            sweep_interval_secs: 3600,
            batch_size: 1000,
            max_batches: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50 * 1024 * 1024); // 50MB

        let max_tags = std::env::var("MAX_TAGS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let storage_backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3,
            _ => StorageBackend::Local,
        };

        let local_storage_path =
            std::env::var("LOCAL_STORAGE_PATH").unwrap_or_else(|_| "./files".to_string());

        let janitor_defaults = JanitorConfig::default();
        let janitor = JanitorConfig {
            retention_hours: env_parsed("RETENTION_HOURS", janitor_defaults.retention_hours),
            sweep_interval_secs: env_parsed(
                "SWEEP_INTERVAL_SECS",
                janitor_defaults.sweep_interval_secs,
            ),
            batch_size: env_parsed("SWEEP_BATCH_SIZE", janitor_defaults.batch_size),
            max_batches: env_parsed("SWEEP_MAX_BATCHES", janitor_defaults.max_batches),
        };

        let config = Config {
            server: ServerConfig {
                bind_address,
                data_dir,
            },
            storage: StorageConfig {
                backend: storage_backend,
                local_storage_path,
                s3_endpoint: std::env::var("S3_ENDPOINT").ok(),
                s3_bucket: std::env::var("S3_BUCKET").ok(),
                s3_region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                s3_access_key: std::env::var("S3_ACCESS_KEY").ok(),
                s3_secret_key: std::env::var("S3_SECRET_KEY").ok(),
            },
            janitor,
            max_tags,
            max_upload_size,
            test_mode,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if matches!(self.storage.backend, StorageBackend::S3) {
            for (var, value) in [
                ("S3_ENDPOINT", &self.storage.s3_endpoint),
                ("S3_BUCKET", &self.storage.s3_bucket),
                ("S3_ACCESS_KEY", &self.storage.s3_access_key),
                ("S3_SECRET_KEY", &self.storage.s3_secret_key),
            ] {
                if value.is_none() {
                    return Err(ConfigError::ValidationError(format!(
                        "{var} is required when STORAGE_BACKEND=s3"
                    )));
                }
            }
        }

        if self.janitor.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "SWEEP_BATCH_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.janitor.max_batches == 0 {
            return Err(ConfigError::ValidationError(
                "SWEEP_MAX_BATCHES must be greater than 0".to_string(),
            ));
        }

        if self.max_tags == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_TAGS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
