use anyhow::{Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

/// Root configuration, layered from defaults, `config.toml` and
/// `PICRANK_*` environment variables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub middleware: MiddlewareConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub compressor: CompressorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on receiving a request body
    #[serde(with = "duration_serde", default = "default_read_timeout")]
    pub read_timeout: Duration,
    /// Upper bound on the time spent producing a response
    #[serde(with = "duration_serde", default = "default_write_timeout")]
    pub write_timeout: Duration,
    #[serde(with = "duration_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
    /// Public domain for TLS certificates; termination happens in front of the service
    #[serde(default)]
    pub tls_domain: Option<String>,
    #[serde(default)]
    pub h2c: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_max_number_of_files")]
    pub max_number_of_files: usize,
    /// Per-file cap in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Use the first `X-Forwarded-For` entry as the client key
    #[serde(default)]
    pub trust_forwarded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Keys unseen for this long are evicted
    #[serde(with = "duration_serde", default = "default_limiter_ttl")]
    pub time_to_live: Duration,
    #[serde(with = "duration_serde", default = "default_cleanup_interval")]
    pub cleanup_interval: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_number_of_workers_calc")]
    pub number_of_workers_calc: usize,
    #[serde(default = "default_number_of_workers_comp")]
    pub number_of_workers_comp: usize,
    /// Reserved; ratings always run a fixed number of iterations
    #[serde(default = "default_accuracy")]
    pub accuracy: f64,
    /// Serve images through `/api/images/{token}/` instead of publishing `src`
    #[serde(default)]
    pub temp_links: bool,
    #[serde(default = "default_true")]
    pub compression: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheConfig {
    Memory {
        /// Lifetime of pair stacks, tokens and temporary links
        #[serde(with = "duration_serde", default = "default_cache_ttl")]
        time_to_live: Duration,
        #[serde(with = "duration_serde", default = "default_cleanup_interval")]
        cleanup_interval: Duration,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CompressorConfig {
    /// Identity compresser
    Mock,
    /// In-process re-encoding with the `image` crate
    Local {
        #[serde(default = "default_jpeg_quality")]
        quality: u8,
    },
    /// External HTTP image processing service
    Imaginary {
        #[serde(default = "default_imaginary_url")]
        url: String,
        #[serde(with = "duration_serde", default = "default_upload_timeout")]
        timeout: Duration,
        #[serde(with = "duration_serde", default = "default_restart_in")]
        restart_in: Duration,
    },
    /// Remote compression API with a shrink-then-download protocol
    Shrink {
        #[serde(default = "default_shrink_url")]
        url: String,
        #[serde(default)]
        key: String,
        #[serde(default = "default_compressor_retries")]
        retries: u32,
        #[serde(with = "duration_serde", default = "default_upload_timeout")]
        upload_timeout: Duration,
        #[serde(with = "duration_serde", default = "default_download_timeout")]
        download_timeout: Duration,
        #[serde(with = "duration_serde", default = "default_restart_in")]
        restart_in: Duration,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory {
        #[serde(default = "default_public_prefix")]
        prefix: String,
        #[serde(default = "default_bucket")]
        bucket: String,
    },
    Filesystem {
        #[serde(default = "default_storage_path")]
        path: PathBuf,
        #[serde(default = "default_public_prefix")]
        prefix: String,
        #[serde(default = "default_bucket")]
        bucket: String,
    },
    S3 {
        #[serde(default = "default_s3_endpoint")]
        endpoint: String,
        #[serde(default = "default_s3_region")]
        region: String,
        #[serde(default)]
        access_key: String,
        #[serde(default)]
        secret_key: String,
        #[serde(default = "default_bucket")]
        bucket: String,
        #[serde(default = "default_public_prefix")]
        prefix: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DatabaseConfig {
    Memory,
    /// SeaORM over SQLite or PostgreSQL, picked from the URL scheme
    Sql {
        #[serde(default = "default_database_url")]
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Entries in the album to image source cache
        #[serde(default = "default_lru_size")]
        lru_size: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_write_timeout() -> Duration {
    DEFAULT_WRITE_TIMEOUT
}

fn default_shutdown_timeout() -> Duration {
    DEFAULT_SHUTDOWN_TIMEOUT
}

fn default_max_number_of_files() -> usize {
    DEFAULT_MAX_NUMBER_OF_FILES
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_requests_per_second() -> u32 {
    DEFAULT_REQUESTS_PER_SECOND
}

fn default_burst() -> u32 {
    DEFAULT_BURST
}

fn default_limiter_ttl() -> Duration {
    DEFAULT_LIMITER_TTL
}

fn default_cleanup_interval() -> Duration {
    DEFAULT_CLEANUP_INTERVAL
}

fn default_cors_origin() -> String {
    DEFAULT_CORS_ORIGIN.to_string()
}

fn default_number_of_workers_calc() -> usize {
    DEFAULT_NUMBER_OF_WORKERS_CALC
}

fn default_number_of_workers_comp() -> usize {
    DEFAULT_NUMBER_OF_WORKERS_COMP
}

fn default_accuracy() -> f64 {
    DEFAULT_ACCURACY
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_imaginary_url() -> String {
    DEFAULT_IMAGINARY_URL.to_string()
}

fn default_shrink_url() -> String {
    DEFAULT_SHRINK_URL.to_string()
}

fn default_compressor_retries() -> u32 {
    DEFAULT_COMPRESSOR_RETRIES
}

fn default_upload_timeout() -> Duration {
    DEFAULT_UPLOAD_TIMEOUT
}

fn default_download_timeout() -> Duration {
    DEFAULT_DOWNLOAD_TIMEOUT
}

fn default_restart_in() -> Duration {
    DEFAULT_RESTART_IN
}

fn default_public_prefix() -> String {
    DEFAULT_PUBLIC_PREFIX.to_string()
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORAGE_PATH)
}

fn default_s3_endpoint() -> String {
    DEFAULT_S3_ENDPOINT.to_string()
}

fn default_s3_region() -> String {
    DEFAULT_S3_REGION.to_string()
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_lru_size() -> usize {
    DEFAULT_LRU_SIZE
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            tls_domain: None,
            h2c: false,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_number_of_files: default_max_number_of_files(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl ControllerConfig {
    /// Largest request body accepted by the upload route
    pub fn body_limit(&self) -> usize {
        let files = self
            .max_file_size
            .saturating_mul(self.max_number_of_files as u64)
            .saturating_add(MULTIPART_OVERHEAD);
        usize::try_from(files).unwrap_or(usize::MAX)
    }
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            limiter: LimiterConfig::default(),
            cors_origin: default_cors_origin(),
            trust_forwarded: false,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            time_to_live: default_limiter_ttl(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            number_of_workers_calc: default_number_of_workers_calc(),
            number_of_workers_comp: default_number_of_workers_comp(),
            accuracy: default_accuracy(),
            temp_links: false,
            compression: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::Memory {
            time_to_live: default_cache_ttl(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self::Mock
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory {
            prefix: default_public_prefix(),
            bucket: default_bucket(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from `<dir>/config.toml` (optional) and the
    /// environment, on top of the compiled defaults
    pub fn load(dir: &Path) -> Result<Self> {
        let file = dir.join("config.toml");
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if file.exists() {
            info!("Loading configuration from {}", file.display());
            figment = figment.merge(Toml::file(&file));
        } else {
            debug!("No config file found at {}", file.display());
        }

        let config: Config = figment
            .merge(Env::prefixed("PICRANK_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults, ignoring the environment
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(text))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.service.number_of_workers_calc == 0 || self.service.number_of_workers_comp == 0 {
            bail!("service worker counts must be at least 1");
        }
        if self.controller.max_number_of_files < 2 {
            bail!("controller.max_number_of_files must be at least 2");
        }
        if self.controller.max_file_size == 0 {
            bail!("controller.max_file_size must be positive");
        }
        if self.middleware.limiter.requests_per_second == 0 || self.middleware.limiter.burst == 0 {
            bail!("middleware.limiter rate and burst must be positive");
        }
        if let CompressorConfig::Local { quality } = self.compressor {
            if !(1..=100).contains(&quality) {
                bail!("compressor.quality must be within 1..=100");
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
