use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// JWT authentication configuration
    pub jwt: JwtAuthConfig,
    /// Batch processing limits and worker tuning
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn to_pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Allowed CORS origins. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// HMAC secret used to verify HS256 bearer tokens
    #[serde(default)]
    pub secret: String,

    /// Lifetime of tokens issued by the signing helper (default: 86400 = 24 hours)
    #[serde(default = "default_access_token_expiry")]
    pub access_token_expiry_secs: i64,

    /// Leeway in seconds for clock skew tolerance (default: 30)
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

/// Limits and worker tuning for the batch endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_sync_items")]
    pub max_sync_items: usize,

    #[serde(default = "default_max_async_items")]
    pub max_async_items: usize,

    #[serde(default = "default_max_csv_rows")]
    pub max_csv_rows: usize,

    /// Upper bound on the multipart body of a CSV upload
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Number of jobs allowed to run at the same time
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Fixed pause before each asynchronous item
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,

    /// Token bucket rate for asynchronous items; 0 disables it
    #[serde(default)]
    pub items_per_second: u32,

    #[serde(default = "default_persist_max_retries")]
    pub persist_max_retries: u32,

    #[serde(default = "default_persist_backoff_ms")]
    pub persist_backoff_ms: u64,

    #[serde(default = "default_persist_max_backoff_ms")]
    pub persist_max_backoff_ms: u64,

    /// How long shutdown waits for running jobs to drain
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// At startup, non-terminal jobs untouched for this long are closed.
    /// 0 closes everything a previous run left unfinished.
    #[serde(default)]
    pub stale_job_after_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_sync_items: default_max_sync_items(),
            max_async_items: default_max_async_items(),
            max_csv_rows: default_max_csv_rows(),
            max_upload_bytes: default_max_upload_bytes(),
            worker_concurrency: default_worker_concurrency(),
            item_delay_ms: default_item_delay_ms(),
            items_per_second: 0,
            persist_max_retries: default_persist_max_retries(),
            persist_backoff_ms: default_persist_backoff_ms(),
            persist_max_backoff_ms: default_persist_max_backoff_ms(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            stale_job_after_secs: 0,
        }
    }
}

impl BatchConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_body_size() -> usize {
    1_048_576
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_access_token_expiry() -> i64 {
    shared::jwt::DEFAULT_ACCESS_TOKEN_EXPIRY_SECS
}
fn default_jwt_leeway() -> u64 {
    shared::jwt::DEFAULT_LEEWAY_SECS
}
fn default_max_sync_items() -> usize {
    domain::models::MAX_SYNC_BATCH_ITEMS
}
fn default_max_async_items() -> usize {
    domain::models::MAX_ASYNC_BATCH_ITEMS
}
fn default_max_csv_rows() -> usize {
    domain::models::MAX_CSV_IMPORT_ROWS
}
fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}
fn default_worker_concurrency() -> usize {
    4
}
fn default_item_delay_ms() -> u64 {
    500
}
fn default_persist_max_retries() -> u32 {
    3
}
fn default_persist_backoff_ms() -> u64 {
    200
}
fn default_persist_max_backoff_ms() -> u64 {
    5000
}
fn default_shutdown_timeout() -> u64 {
    30
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with ET__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("ET")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.cors_origins")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus `overrides`.
    ///
    /// Does not touch the file system and skips validation, so tests can
    /// build partial configs.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30
            max_body_size = 1048576

            [database]
            url = ""
            max_connections = 10
            min_connections = 1
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "pretty"

            [security]
            cors_origins = []

            [jwt]
            secret = "test-secret-key-for-batch-service"
            access_token_expiry_secs = 3600
            leeway_secs = 30

            [batch]
            item_delay_ms = 0
            persist_backoff_ms = 1
            persist_max_backoff_ms = 5
            shutdown_timeout_secs = 5
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "ET__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.jwt.secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "ET__JWT__SECRET environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.batch.worker_concurrency == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "batch.worker_concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
