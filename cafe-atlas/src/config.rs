use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::rate_limit::RateLimitConfig;
use crate::search::DEFAULT_THRESHOLD;

const DEFAULT_API_KEY: &str = "guess-it-right";
const DEFAULT_DATABASE_URL: &str = "sqlite://cafe-atlas.db";
const DEFAULT_PORT: u16 = 5000;
const MIN_SECRET_KEY_BYTES: usize = 32;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Parser)]
#[command(
    name = "cafe-atlas",
    version,
    about = "Cafe catalogue with a JWT-secured JSON API and server-rendered pages"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(long, global = true, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,

    #[arg(long, global = true, value_name = "DIR")]
    pub upload_dir: Option<PathBuf>,

    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the web server (default).
    Serve,
    /// Grant (or with --revoke, remove) admin rights for a registered user.
    PromoteAdmin {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long)]
        revoke: bool,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub database_url: String,
    /// Signs session cookies. `None` means a random key per process.
    pub secret_key: Option<SecretString>,
    pub api_key: SecretString,
    pub upload_dir: PathBuf,
    /// Body limit for the multipart cafe forms.
    pub max_upload_bytes: usize,
    pub secure_cookies: bool,
    pub session_ttl: Duration,
    pub remember_ttl: Duration,
    pub token_ttl: Duration,
    pub search_threshold: u8,
    pub rate_limits: RateLimitConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid value for env var {key}: {value}")]
    InvalidEnv { key: String, value: String },
    #[error("invalid duration for {key}: {value}")]
    InvalidDuration { key: String, value: String },
    #[error("SECRET_KEY must be at least {MIN_SECRET_KEY_BYTES} bytes long")]
    SecretKeyTooShort,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    bind: Option<SocketAddr>,
    #[serde(alias = "database_uri")]
    database_url: Option<String>,
    upload_dir: Option<PathBuf>,
    max_upload_bytes: Option<usize>,
    secure_cookies: Option<bool>,
    session_ttl: Option<String>,
    remember_ttl: Option<String>,
    token_ttl: Option<String>,
    search_threshold: Option<u8>,
    #[serde(default)]
    rate_limits: FileRateLimits,
}

#[derive(Debug, Default, Deserialize)]
struct FileRateLimits {
    login_per_minute: Option<u32>,
    read_per_minute: Option<u32>,
    write_per_minute: Option<u32>,
    global_period_ms: Option<u64>,
    global_burst: Option<u32>,
    trust_proxy_headers: Option<bool>,
}

type EnvReader<'a> = &'a dyn Fn(&str) -> Result<Option<String>, ConfigError>;

impl AppConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let from_file = read_file_config(cli.config.as_deref())?;
        Self::resolve(cli, from_file, &read_env)
    }

    fn resolve(cli: &Cli, from_file: FileConfig, env: EnvReader<'_>) -> Result<Self, ConfigError> {
        let env_bind = env("PORT")?
            .map(|raw| {
                raw.trim()
                    .parse::<u16>()
                    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
                    .map_err(|_| ConfigError::InvalidEnv {
                        key: String::from("PORT"),
                        value: raw,
                    })
            })
            .transpose()?;
        let bind = cli
            .bind
            .or(env_bind)
            .or(from_file.bind)
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        let database_url = cli
            .database_url
            .clone()
            .or(env("DATABASE_URI")?)
            .or(from_file.database_url)
            .unwrap_or_else(|| String::from(DEFAULT_DATABASE_URL));

        let upload_dir = cli
            .upload_dir
            .clone()
            .or(env("CAFE_ATLAS_UPLOAD_DIR")?.map(PathBuf::from))
            .or(from_file.upload_dir)
            .unwrap_or_else(|| PathBuf::from("./uploads"));

        let secure_cookies = match env("CAFE_ATLAS_SECURE_COOKIES")? {
            Some(raw) => Some(parse_bool_value("CAFE_ATLAS_SECURE_COOKIES", &raw)?),
            None => None,
        }
        .or(from_file.secure_cookies)
        .unwrap_or(false);

        let trust_proxy_headers = match env("CAFE_ATLAS_TRUST_PROXY_HEADERS")? {
            Some(raw) => Some(parse_bool_value("CAFE_ATLAS_TRUST_PROXY_HEADERS", &raw)?),
            None => None,
        }
        .or(from_file.rate_limits.trust_proxy_headers)
        .unwrap_or(false);

        let secret_key = match env("SECRET_KEY")? {
            Some(raw) if raw.len() < MIN_SECRET_KEY_BYTES => {
                return Err(ConfigError::SecretKeyTooShort)
            }
            Some(raw) => Some(SecretString::from(raw)),
            None => {
                warn!("SECRET_KEY not set; sessions will not survive a restart");
                None
            }
        };

        let api_key = env("API_KEY")?.unwrap_or_else(|| {
            warn!("API_KEY not set; falling back to the built-in development key");
            String::from(DEFAULT_API_KEY)
        });

        let limits = from_file.rate_limits;
        let defaults = RateLimitConfig::default();
        let rate_limits = RateLimitConfig {
            login_per_minute: limits.login_per_minute.unwrap_or(defaults.login_per_minute),
            read_per_minute: limits.read_per_minute.unwrap_or(defaults.read_per_minute),
            write_per_minute: limits.write_per_minute.unwrap_or(defaults.write_per_minute),
            global_period_ms: limits
                .global_period_ms
                .unwrap_or(defaults.global_period_ms)
                .max(1),
            global_burst: limits.global_burst.unwrap_or(defaults.global_burst).max(1),
            trust_proxy_headers,
        };

        Ok(Self {
            bind,
            database_url,
            secret_key,
            api_key: SecretString::from(api_key),
            upload_dir,
            max_upload_bytes: from_file
                .max_upload_bytes
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
                .max(1),
            secure_cookies,
            session_ttl: parse_duration("session_ttl", from_file.session_ttl, "24h")?,
            remember_ttl: parse_duration("remember_ttl", from_file.remember_ttl, "30days")?,
            token_ttl: parse_duration("token_ttl", from_file.token_ttl, "1h")?,
            search_threshold: from_file
                .search_threshold
                .unwrap_or(DEFAULT_THRESHOLD)
                .min(100),
            rate_limits,
        })
    }

    pub fn secret_key_bytes(&self) -> Option<&[u8]> {
        self.secret_key
            .as_ref()
            .map(|key| key.expose_secret().as_bytes())
    }
}

fn read_file_config(path: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };

    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;

    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn read_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidEnv {
            key: String::from(key),
            value: String::from("<non-unicode>"),
        }),
    }
}

fn parse_duration(key: &str, raw: Option<String>, default: &str) -> Result<Duration, ConfigError> {
    let raw = raw.unwrap_or_else(|| String::from(default));
    humantime::parse_duration(raw.trim()).map_err(|_| ConfigError::InvalidDuration {
        key: String::from(key),
        value: raw,
    })
}

fn parse_bool_value(key: &str, raw: &str) -> Result<bool, ConfigError> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key: String::from(key),
            value: String::from(raw),
        }),
    }
}
