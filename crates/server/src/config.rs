//! Server configuration: a YAML file overlaid with environment variables.
//!
//! Loading order is `.env` (if present), then the YAML file (missing file
//! means built-in defaults), then environment overrides, then validation.
//!
//! # Environment Overrides
//!
//! - `ENVIRONMENT` - `development`, `staging` or `production`
//! - `SERVER_HOST`, `SERVER_PORT` - Bind address
//! - `DATABASE_URL` - Full `PostgreSQL` URL (wins over the `DB_*` parts)
//! - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME`, `DB_SSLMODE`
//! - `REDIS_URL` - Full Redis URL (wins over the `REDIS_*` parts)
//! - `REDIS_HOST`, `REDIS_PORT`, `REDIS_PASSWORD`
//! - `JWT_SECRET` - Token signing secret (min 32 chars, high entropy in production)
//! - `OPENAI_API_KEY` - Enables semantic search when set
//! - `EMBEDDING_MODEL` - Embedding model name
//! - `CORS_ALLOWED_ORIGINS` - Comma separated origin list
//! - `RATE_LIMIT_REQUESTS` - Requests allowed per window per client IP
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use thiserror::Error;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "change-this",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    Parse(String, serde_yaml::Error),
    #[error("Missing configuration value: {0}")]
    MissingValue(String),
    #[error("Invalid configuration value {0}: {1}")]
    InvalidValue(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::InvalidValue(
                "environment".to_string(),
                format!("unknown environment '{other}'"),
            )),
        }
    }
}

/// Fully resolved application configuration. Immutable after load.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    /// `None` when no provider API key is configured; semantic search then
    /// always falls back to keyword search.
    pub embedding: Option<EmbeddingConfig>,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub sentry: SentryConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub request_timeout: Duration,
    pub shutdown_grace: Duration,
}

/// `PostgreSQL` settings.
///
/// Implements `Debug` manually to redact the password and URL.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: Option<SecretString>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub name: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl DatabaseConfig {
    /// Build connection options, preferring the full URL when one is set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unparsable URL or SSL mode.
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url.expose_secret()).map_err(|e| {
                ConfigError::InvalidValue("database.url".to_string(), e.to_string())
            });
        }

        let ssl_mode = PgSslMode::from_str(&self.ssl_mode).map_err(|e| {
            ConfigError::InvalidValue("database.sslmode".to_string(), e.to_string())
        })?;

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.name)
            .ssl_mode(ssl_mode))
    }
}

/// Redis settings. The URL embeds the password, so it is kept secret.
#[derive(Clone)]
pub struct RedisConfig {
    pub url: SecretString,
    pub key_prefix: String,
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &"[REDACTED]")
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: SecretString,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Embedding provider (OpenAI-compatible `/v1/embeddings`).
#[derive(Clone)]
pub struct EmbeddingConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub dimensions: usize,
    pub timeout: Duration,
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBackendKind {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests: u64,
    pub window: Duration,
    pub backend: RateLimitBackendKind,
}

#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
}

// =============================================================================
// File representation
// =============================================================================

/// On-disk shape of `config.yaml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    environment: Option<String>,
    server: FileServer,
    database: FileDatabase,
    redis: FileRedis,
    jwt: FileJwt,
    embedding: FileEmbedding,
    cors: FileCors,
    rate_limit: FileRateLimit,
    sentry: FileSentry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileServer {
    host: Option<String>,
    port: Option<u16>,
    request_timeout_secs: Option<u64>,
    shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileDatabase {
    url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    name: Option<String>,
    sslmode: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileRedis {
    url: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    password: Option<String>,
    db: Option<i64>,
    key_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileJwt {
    secret: Option<String>,
    access_ttl_hours: Option<u64>,
    refresh_ttl_days: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileEmbedding {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileCors {
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileRateLimit {
    requests: Option<u64>,
    window_secs: Option<u64>,
    backend: Option<RateLimitBackendKind>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSentry {
    dsn: Option<String>,
    environment: Option<String>,
    sample_rate: Option<f32>,
    traces_sample_rate: Option<f32>,
}

// =============================================================================
// Loading
// =============================================================================

impl AppConfig {
    /// Load configuration from `path` and the process environment.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, if a value
    /// is malformed, or if the JWT secret fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let file = match std::fs::read_to_string(path) {
            Ok(raw) => parse_file(&raw, &path.display().to_string())?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => return Err(ConfigError::Io(path.display().to_string(), e)),
        };

        Self::resolve(file, &|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Load from a YAML string with an explicit environment lookup.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::load`].
    pub fn from_yaml_with_env(
        raw: &str,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::resolve(parse_file(raw, "<inline>")?, env)
    }

    fn resolve(file: FileConfig, env: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = env("ENVIRONMENT")
            .or(file.environment)
            .map_or(Ok(Environment::Development), |s| s.parse())?;

        let server = ServerConfig {
            host: parse_value(
                "server.host",
                env("SERVER_HOST").or(file.server.host),
                IpAddr::from([0, 0, 0, 0]),
            )?,
            port: parse_value(
                "server.port",
                env("SERVER_PORT"),
                file.server.port.unwrap_or(8080),
            )?,
            request_timeout: Duration::from_secs(file.server.request_timeout_secs.unwrap_or(30)),
            shutdown_grace: Duration::from_secs(file.server.shutdown_grace_secs.unwrap_or(5)),
        };

        let database = DatabaseConfig {
            url: env("DATABASE_URL").or(file.database.url).map(SecretString::from),
            host: env("DB_HOST")
                .or(file.database.host)
                .unwrap_or_else(|| "localhost".to_string()),
            port: parse_value("DB_PORT", env("DB_PORT"), file.database.port.unwrap_or(5432))?,
            user: env("DB_USER")
                .or(file.database.user)
                .unwrap_or_else(|| "greens_user".to_string()),
            password: SecretString::from(
                env("DB_PASSWORD")
                    .or(file.database.password)
                    .unwrap_or_else(|| "greens_password".to_string()),
            ),
            name: env("DB_NAME")
                .or(file.database.name)
                .unwrap_or_else(|| "greens_marketplace".to_string()),
            ssl_mode: env("DB_SSLMODE")
                .or(file.database.sslmode)
                .unwrap_or_else(|| "disable".to_string()),
            max_connections: file.database.max_connections.unwrap_or(25),
        };

        let redis = RedisConfig {
            url: SecretString::from(match env("REDIS_URL").or(file.redis.url) {
                Some(url) => url,
                None => redis_url(
                    &env("REDIS_HOST")
                        .or(file.redis.host)
                        .unwrap_or_else(|| "localhost".to_string()),
                    parse_value("REDIS_PORT", env("REDIS_PORT"), file.redis.port.unwrap_or(6379))?,
                    env("REDIS_PASSWORD").or(file.redis.password).as_deref(),
                    file.redis.db.unwrap_or(0),
                ),
            }),
            key_prefix: file.redis.key_prefix.unwrap_or_else(|| "greens".to_string()),
        };

        let jwt_secret = env("JWT_SECRET")
            .or(file.jwt.secret)
            .ok_or_else(|| ConfigError::MissingValue("jwt.secret (JWT_SECRET)".to_string()))?;
        validate_jwt_secret(&jwt_secret, "JWT_SECRET")?;
        if environment.is_production() {
            validate_secret_strength(&jwt_secret, "JWT_SECRET")?;
        }
        let jwt = JwtConfig {
            secret: SecretString::from(jwt_secret),
            access_ttl: Duration::from_secs(file.jwt.access_ttl_hours.unwrap_or(24) * 3600),
            refresh_ttl: Duration::from_secs(file.jwt.refresh_ttl_days.unwrap_or(7) * 86_400),
        };

        let embedding = env("OPENAI_API_KEY")
            .or(file.embedding.api_key)
            .map(|api_key| EmbeddingConfig {
                api_key: SecretString::from(api_key),
                base_url: file
                    .embedding
                    .base_url
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                model: env("EMBEDDING_MODEL")
                    .or(file.embedding.model)
                    .unwrap_or_else(|| "text-embedding-ada-002".to_string()),
                dimensions: file.embedding.dimensions.unwrap_or(1536),
                timeout: Duration::from_millis(file.embedding.timeout_ms.unwrap_or(3000)),
            });

        let cors = CorsConfig {
            allowed_origins: env("CORS_ALLOWED_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .or(file.cors.allowed_origins)
                .unwrap_or_else(|| {
                    vec![
                        "http://localhost:3000".to_string(),
                        "http://localhost:3001".to_string(),
                    ]
                }),
        };

        let rate_limit = RateLimitConfig {
            requests: parse_value(
                "RATE_LIMIT_REQUESTS",
                env("RATE_LIMIT_REQUESTS"),
                file.rate_limit.requests.unwrap_or(100),
            )?,
            window: Duration::from_secs(file.rate_limit.window_secs.unwrap_or(60).max(1)),
            backend: file.rate_limit.backend.unwrap_or_default(),
        };
        if rate_limit.requests == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.requests".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let sentry = SentryConfig {
            dsn: env("SENTRY_DSN").or(file.sentry.dsn),
            environment: env("SENTRY_ENVIRONMENT")
                .or(file.sentry.environment)
                .or_else(|| Some(environment.as_str().to_string())),
            sample_rate: file.sentry.sample_rate.unwrap_or(1.0),
            traces_sample_rate: file.sentry.traces_sample_rate.unwrap_or(0.1),
        };

        Ok(Self {
            environment,
            server,
            database,
            redis,
            jwt,
            embedding,
            cors,
            rate_limit,
            sentry,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_file(raw: &str, origin: &str) -> Result<FileConfig, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(FileConfig::default());
    }
    serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse(origin.to_string(), e))
}

/// Parse an override if present, else keep `default`.
fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.map_or(Ok(default), |v| {
        v.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
    })
}

fn redis_url(host: &str, port: u16, password: Option<&str>, db: i64) -> String {
    match password.filter(|p| !p.is_empty()) {
        Some(password) => format!(
            "redis://:{}@{host}:{port}/{db}",
            urlencoding::encode(password)
        ),
        None => format!("redis://{host}:{port}/{db}"),
    }
}

/// Validate that the JWT secret meets minimum length requirements.
fn validate_jwt_secret(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                secret.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}
