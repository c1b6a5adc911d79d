use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::cache::CacheBackend;

/// Command-line arguments for the longbox binary.
#[derive(Debug, Parser)]
#[command(name = "longbox", version, about = "Comic collection catalog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "LONGBOX_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub deployment: DeploymentOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate,
}

/// Settings every command honours, also read from the legacy `COMICS_*` variables.
#[derive(Debug, Args, Default, Clone)]
pub struct DeploymentOverrides {
    /// Path to the SQLite catalog database.
    #[arg(long = "db-path", env = "COMICS_DB_PATH", value_name = "PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Redis URL for the response cache.
    #[arg(long = "redis-url", env = "COMICS_REDIS_URL", value_name = "URL", global = true)]
    pub redis_url: Option<String>,

    /// Response cache TTL; unparsable values fall back to the default.
    #[arg(
        long = "cache-ttl-seconds",
        env = "COMICS_CACHE_TTL_SECONDS",
        value_name = "SECONDS",
        global = true
    )]
    pub cache_ttl_seconds: Option<String>,

    /// Root directory for stored copy images.
    #[arg(long = "image-root", env = "COMICS_IMAGE_ROOT", value_name = "PATH", global = true)]
    pub image_root: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Enable or disable the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the cache backend.
    #[arg(long = "cache-backend", value_name = "BACKEND", value_enum)]
    pub cache_backend: Option<CacheBackend>,

    /// Override the per-call cache store timeout.
    #[arg(long = "cache-operation-timeout-ms", value_name = "MS")]
    pub cache_operation_timeout_ms: Option<u64>,

    /// Override the largest response body the cache stores.
    #[arg(long = "cache-max-body-bytes", value_name = "BYTES")]
    pub cache_max_body_bytes: Option<usize>,

    /// Override the maximum multipart upload size in bytes.
    #[arg(long = "images-max-upload-bytes", value_name = "BYTES")]
    pub images_max_upload_bytes: Option<u64>,

    /// Override the image job queue capacity.
    #[arg(long = "jobs-queue-capacity", value_name = "COUNT")]
    pub jobs_queue_capacity: Option<usize>,

    /// Override how many image jobs run at once.
    #[arg(long = "jobs-max-concurrency", value_name = "COUNT")]
    pub jobs_max_concurrency: Option<usize>,
}
