use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "taskhub.toml",
    "config/taskhub.toml",
    "crates/config/taskhub.toml",
    "../taskhub.toml",
    "../config/taskhub.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 7070,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/taskhub.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "AuthConfig::default_token_ttl")]
    pub token_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
            token_ttl_seconds: Self::default_token_ttl(),
        }
    }
}

impl AuthConfig {
    const fn default_token_ttl() -> u64 {
        86_400
    }
}

/// Timers and buffers for the socket layer.
///
/// ```
/// use taskhub_config::RealtimeConfig;
///
/// let realtime = RealtimeConfig::default();
/// assert_eq!(realtime.sweep_interval_seconds, 60);
/// assert_eq!(realtime.stale_after_seconds, 300);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "RealtimeConfig::default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "RealtimeConfig::default_stale_after")]
    pub stale_after_seconds: u64,
    #[serde(default = "RealtimeConfig::default_session_buffer")]
    pub session_buffer: usize,
    #[serde(default = "RealtimeConfig::default_poll_wait")]
    pub poll_wait_seconds: u64,
    #[serde(default = "RealtimeConfig::default_poll_idle_timeout")]
    pub poll_idle_timeout_seconds: u64,
}

impl RealtimeConfig {
    const fn default_sweep_interval() -> u64 {
        60
    }

    const fn default_stale_after() -> u64 {
        300
    }

    const fn default_session_buffer() -> usize {
        64
    }

    const fn default_poll_wait() -> u64 {
        25
    }

    const fn default_poll_idle_timeout() -> u64 {
        60
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_seconds)
    }

    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.poll_wait_seconds)
    }

    pub fn poll_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_idle_timeout_seconds)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: Self::default_sweep_interval(),
            stale_after_seconds: Self::default_stale_after(),
            session_buffer: Self::default_session_buffer(),
            poll_wait_seconds: Self::default_poll_wait(),
            poll_idle_timeout_seconds: Self::default_poll_idle_timeout(),
        }
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use taskhub_config::load;
///
/// std::env::remove_var("TASKHUB_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("http.allowed_origins", Vec::<String>::new())?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret.clone())?
        .set_default(
            "auth.token_ttl_seconds",
            clamp_to_i64(defaults.auth.token_ttl_seconds),
        )?
        .set_default(
            "realtime.sweep_interval_seconds",
            clamp_to_i64(defaults.realtime.sweep_interval_seconds),
        )?
        .set_default(
            "realtime.stale_after_seconds",
            clamp_to_i64(defaults.realtime.stale_after_seconds),
        )?
        .set_default(
            "realtime.session_buffer",
            clamp_to_i64(defaults.realtime.session_buffer as u64),
        )?
        .set_default(
            "realtime.poll_wait_seconds",
            clamp_to_i64(defaults.realtime.poll_wait_seconds),
        )?
        .set_default(
            "realtime.poll_idle_timeout_seconds",
            clamp_to_i64(defaults.realtime.poll_idle_timeout_seconds),
        )?;

    let environment_overrides = config::Environment::with_prefix("TASKHUB")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("http.allowed_origins")
        .try_parsing(true);

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("TASKHUB_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via TASKHUB_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.jwt_secret == defaults.auth.jwt_secret {
        debug!("using the built-in development jwt secret");
    }

    debug!(
        http.port = config.http.port,
        database.url = %config.database.url,
        realtime.sweep_interval_seconds = config.realtime.sweep_interval_seconds,
        "loaded backend configuration"
    );
    Ok(config)
}
