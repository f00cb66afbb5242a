use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

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
    pub workflow: WorkflowConfig,
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

        let workflow = WorkflowConfig::from_env()?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            workflow,
        })
    }
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the apprenticeship workflows (TSF slicing, links, retention, reminders).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    pub tsf_period_months: u32,
    pub magic_link_ttl_hours: i64,
    pub archive_retention_days: i64,
    pub reminder_after_days: i64,
    pub cron_secret: Option<String>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            tsf_period_months: 6,
            magic_link_ttl_hours: 72,
            archive_retention_days: 1095,
            reminder_after_days: 7,
            cron_secret: None,
        }
    }
}

impl WorkflowConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let tsf_period_months = match env::var("ALT_TSF_PERIOD_MONTHS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|months| (1..=24).contains(months))
                .ok_or(ConfigError::InvalidPeriodMonths(raw))?,
            Err(_) => defaults.tsf_period_months,
        };

        let magic_link_ttl_hours = bounded_from_env(
            "ALT_MAGIC_LINK_TTL_HOURS",
            defaults.magic_link_ttl_hours,
            MAX_MAGIC_LINK_TTL_HOURS,
        )?;
        let archive_retention_days = bounded_from_env(
            "ALT_ARCHIVE_RETENTION_DAYS",
            defaults.archive_retention_days,
            MAX_ARCHIVE_RETENTION_DAYS,
        )?;
        let reminder_after_days = bounded_from_env(
            "ALT_REMINDER_AFTER_DAYS",
            defaults.reminder_after_days,
            MAX_REMINDER_AFTER_DAYS,
        )?;

        let cron_secret = env::var("ALT_CRON_SECRET")
            .ok()
            .map(|secret| secret.trim().to_string())
            .filter(|secret| !secret.is_empty());

        Ok(Self {
            tsf_period_months,
            magic_link_ttl_hours,
            archive_retention_days,
            reminder_after_days,
            cron_secret,
        })
    }
}

/// One year of signing-link validity.
pub const MAX_MAGIC_LINK_TTL_HOURS: i64 = 8_760;
/// One century of retention.
pub const MAX_ARCHIVE_RETENTION_DAYS: i64 = 36_500;
pub const MAX_REMINDER_AFTER_DAYS: i64 = 3_650;

fn bounded_from_env(key: &'static str, default: i64, max: i64) -> Result<i64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|value| (1..=max).contains(value))
            .ok_or(ConfigError::InvalidDuration {
                key,
                value: raw,
                max,
            }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPeriodMonths(String),
    InvalidDuration {
        key: &'static str,
        value: String,
        max: i64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPeriodMonths(value) => write!(
                f,
                "ALT_TSF_PERIOD_MONTHS must be between 1 and 24 (found '{}')",
                value
            ),
            ConfigError::InvalidDuration { key, value, max } => write!(
                f,
                "{} must be an integer between 1 and {} (found '{}')",
                key, max, value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidPeriodMonths(_)
            | ConfigError::InvalidDuration { .. } => None,
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
            "ALT_TSF_PERIOD_MONTHS",
            "ALT_MAGIC_LINK_TTL_HOURS",
            "ALT_ARCHIVE_RETENTION_DAYS",
            "ALT_REMINDER_AFTER_DAYS",
            "ALT_CRON_SECRET",
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
        assert_eq!(config.workflow, WorkflowConfig::default());
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
    fn workflow_overrides_are_parsed() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ALT_TSF_PERIOD_MONTHS", "3");
        env::set_var("ALT_CRON_SECRET", "  s3cret ");
        env::set_var("ALT_REMINDER_AFTER_DAYS", "10");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.workflow.tsf_period_months, 3);
        assert_eq!(config.workflow.cron_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.workflow.reminder_after_days, 10);
        reset_env();
    }

    #[test]
    fn rejects_out_of_range_period() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ALT_TSF_PERIOD_MONTHS", "0");
        let error = AppConfig::load().expect_err("zero months rejected");
        assert!(matches!(error, ConfigError::InvalidPeriodMonths(_)));
        reset_env();
    }

    #[test]
    fn rejects_negative_durations() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ALT_MAGIC_LINK_TTL_HOURS", "-4");
        let error = AppConfig::load().expect_err("negative ttl rejected");
        assert!(matches!(
            error,
            ConfigError::InvalidDuration {
                key: "ALT_MAGIC_LINK_TTL_HOURS",
                ..
            }
        ));
        reset_env();
    }

    #[test]
    fn rejects_durations_past_their_bound() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ALT_ARCHIVE_RETENTION_DAYS", "100000000000");
        let error = AppConfig::load().expect_err("oversized retention rejected");
        assert!(matches!(
            error,
            ConfigError::InvalidDuration {
                key: "ALT_ARCHIVE_RETENTION_DAYS",
                max: MAX_ARCHIVE_RETENTION_DAYS,
                ..
            }
        ));

        reset_env();
        env::set_var("ALT_MAGIC_LINK_TTL_HOURS", "8761");
        assert!(AppConfig::load().is_err());

        reset_env();
        env::set_var("ALT_MAGIC_LINK_TTL_HOURS", "8760");
        env::set_var("ALT_ARCHIVE_RETENTION_DAYS", "36500");
        let config = AppConfig::load().expect("bounds are inclusive");
        assert_eq!(config.workflow.magic_link_ttl_hours, MAX_MAGIC_LINK_TTL_HOURS);
        assert_eq!(config.workflow.archive_retention_days, MAX_ARCHIVE_RETENTION_DAYS);
        reset_env();
    }
}
