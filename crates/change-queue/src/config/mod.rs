use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::workflows::change_queue::ChangeQueueSettings;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub change_queue: ChangeQueueSettings,
    pub authorization: AuthorizationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = ChangeQueueSettings::default();
        let change_queue = ChangeQueueSettings {
            default_page_size: read_count("CHANGE_QUEUE_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: read_count("CHANGE_QUEUE_MAX_PAGE_SIZE", defaults.max_page_size)?,
            max_export_claim: read_count(
                "CHANGE_QUEUE_MAX_EXPORT_CLAIM",
                defaults.max_export_claim,
            )?,
        };

        let authorization = AuthorizationConfig {
            reviewers: read_list("CHANGE_QUEUE_REVIEWERS"),
            sevis_officers: read_list("CHANGE_QUEUE_SEVIS_OFFICERS"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            change_queue,
            authorization,
        })
    }
}

fn read_count(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidCount { key, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

fn read_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Actor grants for the bundled static authorization provider. Sevis
/// officers are implicitly reviewers as well.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationConfig {
    pub reviewers: Vec<String>,
    pub sevis_officers: Vec<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidCount { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidCount { key, value } => {
                write!(f, "{key} must be a positive integer (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidCount { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "CHANGE_QUEUE_PAGE_SIZE",
            "CHANGE_QUEUE_MAX_PAGE_SIZE",
            "CHANGE_QUEUE_MAX_EXPORT_CLAIM",
            "CHANGE_QUEUE_REVIEWERS",
            "CHANGE_QUEUE_SEVIS_OFFICERS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.change_queue, ChangeQueueSettings::default());
        assert_eq!(config.authorization, AuthorizationConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_queue_limits_and_actor_lists() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CHANGE_QUEUE_PAGE_SIZE", "10");
        env::set_var("CHANGE_QUEUE_MAX_EXPORT_CLAIM", "5");
        env::set_var("CHANGE_QUEUE_REVIEWERS", "coordinator-ana, staff-li,");
        env::set_var("CHANGE_QUEUE_SEVIS_OFFICERS", "rso-maria");

        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.change_queue.default_page_size, 10);
        assert_eq!(config.change_queue.max_page_size, 100);
        assert_eq!(config.change_queue.max_export_claim, 5);
        assert_eq!(
            config.authorization.reviewers,
            vec!["coordinator-ana".to_string(), "staff-li".to_string()]
        );
        assert_eq!(config.authorization.sevis_officers, vec!["rso-maria".to_string()]);
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_queue_limits() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CHANGE_QUEUE_MAX_EXPORT_CLAIM", "lots");

        match AppConfig::load() {
            Err(ConfigError::InvalidCount { key, value }) => {
                assert_eq!(key, "CHANGE_QUEUE_MAX_EXPORT_CLAIM");
                assert_eq!(value, "lots");
            }
            other => panic!("expected invalid count, got {other:?}"),
        }
        reset_env();
    }
}
