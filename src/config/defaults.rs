//! Configuration default values
//!
//! This module contains all the default values for configuration options,
//! making them easily changeable in one central location.
use std::time::Duration;

// Server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// Controller defaults
pub const DEFAULT_MAX_NUMBER_OF_FILES: usize = 100;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Room for multipart boundaries and the duration field on top of the files
pub const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

// Middleware defaults
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 10_000;
pub const DEFAULT_BURST: u32 = 10;
pub const DEFAULT_LIMITER_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_CORS_ORIGIN: &str = "*";

// Service defaults
pub const DEFAULT_NUMBER_OF_WORKERS_CALC: usize = 2;
pub const DEFAULT_NUMBER_OF_WORKERS_COMP: usize = 2;
pub const DEFAULT_ACCURACY: f64 = 1e-15;

// Cache defaults
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

// Compressor defaults
pub const DEFAULT_JPEG_QUALITY: u8 = 85;
pub const DEFAULT_IMAGINARY_URL: &str = "http://localhost:9000";
pub const DEFAULT_SHRINK_URL: &str = "https://api.tinify.com";
pub const DEFAULT_COMPRESSOR_RETRIES: u32 = 3;
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_RESTART_IN: Duration = Duration::from_secs(3600);

// Storage defaults
pub const DEFAULT_PUBLIC_PREFIX: &str = "/s3";
pub const DEFAULT_BUCKET: &str = "picrank";
pub const DEFAULT_STORAGE_PATH: &str = "./data/blobs";
pub const DEFAULT_S3_ENDPOINT: &str = "http://localhost:9000";
pub const DEFAULT_S3_REGION: &str = "us-east-1";

// Database defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://./data/picrank.db?mode=rwc";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_LRU_SIZE: usize = 1000;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";
