use crate::error::{CollectorError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Panel host or IP, optionally with a port
    pub host: String,
    /// Bearer token issued by the panel
    pub api_key: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    5
}

impl DeviceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Direct connection to Postgres/Timescale
    Postgres(PostgresConfig),
    /// PostgREST endpoint (Supabase)
    Postgrest(PostgrestConfig),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full connection URL; wins over the discrete fields when set
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

fn default_pg_port() -> u16 {
    5432
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgrestConfig {
    pub url: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Sleep between the end of one cycle and the start of the next
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    1
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_secs() -> u64 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_secs: default_backoff_secs(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.backoff_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_file() -> String {
    "span.log".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

impl Config {
    /// `APP_CONFIG` names a YAML file when set; otherwise everything comes
    /// from the environment.
    pub fn resolve() -> Result<Self> {
        match std::env::var("APP_CONFIG") {
            Ok(path) => Self::load(path),
            Err(_) => Self::from_env(),
        }
    }

    /// Load YAML from disk, substitute $(VAR) with env vars, parse, then apply
    /// the same environment overrides as [`Config::from_env`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&raw, |k| std::env::var(k).ok())?;
        let mut cfg: Self = serde_yaml::from_str(&expanded)?;
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            get(key).ok_or_else(|| {
                CollectorError::Config(format!("missing environment variable: {key}"))
            })
        };

        let device = DeviceConfig {
            host: require("SPAN_IP")?,
            api_key: require("SPAN_API_KEY")?,
            request_timeout_secs: default_request_timeout_secs(),
        };

        let store = if let Some(url) = get("DATABASE_URL") {
            StoreConfig::Postgres(PostgresConfig {
                url: Some(url),
                port: default_pg_port(),
                ..Default::default()
            })
        } else if let Some(host) = get("DB_HOST") {
            StoreConfig::Postgres(PostgresConfig {
                url: None,
                host: Some(host),
                port: parse_opt(&get, "DB_PORT")?.unwrap_or_else(default_pg_port),
                user: get("DB_USER"),
                password: get("DB_PASSWORD"),
                database: get("DB_NAME"),
            })
        } else if let (Some(url), Some(key)) = (get("SUPABASE_URL"), get("SUPABASE_KEY")) {
            StoreConfig::Postgrest(PostgrestConfig { url, key })
        } else {
            return Err(CollectorError::Config(
                "no store configured: set DATABASE_URL, DB_HOST or SUPABASE_URL/SUPABASE_KEY"
                    .into(),
            ));
        };

        let mut cfg = Config {
            device,
            store,
            poll: PollConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        };
        cfg.apply_overrides(get)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_overrides<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = get("SPAN_IP") {
            self.device.host = host;
        }
        if let Some(key) = get("SPAN_API_KEY") {
            self.device.api_key = key;
        }
        if let Some(url) = get("DATABASE_URL") {
            if let StoreConfig::Postgres(pg) = &mut self.store {
                pg.url = Some(url);
            } else {
                self.store = StoreConfig::Postgres(PostgresConfig {
                    url: Some(url),
                    port: default_pg_port(),
                    ..Default::default()
                });
            }
        }
        if let Some(v) = parse_opt(&get, "REQUEST_TIMEOUT_SECS")? {
            self.device.request_timeout_secs = v;
        }
        if let Some(v) = parse_opt(&get, "POLL_INTERVAL_SECS")? {
            self.poll.interval_secs = v;
        }
        if let Some(v) = parse_opt(&get, "RETRY_MAX_ATTEMPTS")? {
            self.retry.max_retries = v;
        }
        if let Some(v) = parse_opt(&get, "RETRY_BACKOFF_SECS")? {
            self.retry.backoff_secs = v;
        }
        if let Some(file) = get("LOG_FILE") {
            self.logging.file = file;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(CollectorError::Config("device host cannot be empty".into()));
        }
        if self.device.api_key.trim().is_empty() {
            return Err(CollectorError::Config("device api_key cannot be empty".into()));
        }
        if self.device.request_timeout_secs == 0 {
            return Err(CollectorError::Config(
                "device request_timeout_secs must be positive".into(),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(CollectorError::Config(
                "retry max_retries must be at least 1".into(),
            ));
        }
        match &self.store {
            StoreConfig::Postgres(pg) if pg.url.is_none() && pg.host.is_none() => {
                return Err(CollectorError::Config(
                    "postgres store needs either url or host".into(),
                ));
            }
            StoreConfig::Postgrest(rest) if rest.url.is_empty() || rest.key.is_empty() => {
                return Err(CollectorError::Config(
                    "postgrest store needs both url and key".into(),
                ));
            }
            _ => {}
        }
        if self.logging.file.trim().is_empty() {
            return Err(CollectorError::Config("logging file cannot be empty".into()));
        }
        Ok(())
    }
}

fn parse_opt<F, T>(get: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| CollectorError::Config(format!("{key}={raw:?}: {e}"))),
    }
}

/// Expand $(VAR_NAME) placeholders; a placeholder with no value is an error.
fn expand_env_vars<F>(content: &str, get: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = regex::Regex::new(r"\$\(([A-Za-z_][A-Za-z0-9_]*)\)")
        .map_err(|e| CollectorError::Config(e.to_string()))?;

    let mut missing = Vec::new();
    let expanded = re.replace_all(content, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        get(name).unwrap_or_else(|| {
            missing.push(name.to_string());
            String::new()
        })
    });

    if !missing.is_empty() {
        return Err(CollectorError::Config(format!(
            "missing environment variable(s): {}",
            missing.join(", ")
        )));
    }
    Ok(expanded.into_owned())
}
