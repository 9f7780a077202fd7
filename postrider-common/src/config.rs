//! Process configuration, read from the environment.
//!
//! Every option has a default, so a bare `postrider` starts against a local
//! file-backed store and an unauthenticated SMTP relay on localhost. The
//! recognized variables are documented in the README.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the document collection holding outbound mail requests.
pub const MAIL_COLLECTION: &str = "mail";

const fn default_poll_interval() -> u64 {
    60
}

const fn default_max_retry_count() -> u32 {
    5
}

const fn default_admin_port() -> u16 {
    8787
}

/// Severity threshold understood by the admin config document and
/// `LOG_LEVEL`. `WARNING` is accepted alongside `WARN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parse a case-insensitive level name, `None` for anything unknown.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownLogLevel(s.to_string()))
    }
}

/// Error for an unrecognized log level name.
#[derive(Debug, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct UnknownLogLevel(String);

/// Where the document store lives and how to reach it.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Credentials file for a remote store endpoint. Ignored by the bundled
    /// file backend.
    pub credentials_path: PathBuf,
    /// Store endpoint. `file://<dir>` or a plain path selects the bundled
    /// file backend rooted at that directory.
    pub database_url: String,
}

/// SMTP relay settings for the outbound client.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub from_email: String,
    pub from_name: String,
}

/// Logging destination and initial severity.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Log file mirrored by the admin `/logs` endpoint. Empty `LOG_FILE`
    /// disables the file layer.
    pub file: Option<PathBuf>,
}

/// Static defaults for the delivery loop; the admin config document may
/// override each of these at runtime.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval_secs: u64,
    pub max_retry_count: u32,
    /// Raw `PROCESS_FROM_AFTER` value, kept for display.
    pub process_from_after: String,
    /// Parsed cutoff, `None` when unset or unparseable.
    pub cutoff: Option<DateTime<Utc>>,
}

/// Admin HTTP surface settings. Basic auth engages only when both user and
/// pass are non-empty.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub port: u16,
    pub user: String,
    pub pass: String,
}

/// The full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub smtp: SmtpConfig,
    pub log: LogConfig,
    pub engine: EngineConfig,
    pub admin: AdminConfig,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Build the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let credentials_path = std::env::var("FIREBASE_SERVICE_ACCOUNT_PATH")
            .or_else(|_| std::env::var("GOOGLE_APPLICATION_CREDENTIALS"))
            .unwrap_or_else(|_| "serviceAccountKey.json".to_string());

        let process_from_after = env_or("PROCESS_FROM_AFTER", "").trim().to_string();
        let cutoff = parse_cutoff(&process_from_after);

        let log_file = match env_or("LOG_FILE", "postrider.log") {
            s if s.trim().is_empty() => None,
            s => Some(PathBuf::from(s)),
        };

        Self {
            store: StoreConfig {
                credentials_path: PathBuf::from(credentials_path),
                database_url: env_or("FIREBASE_DATABASE_URL", "./mailstore"),
            },
            smtp: SmtpConfig {
                server: env_or("SMTP_SERVER", "localhost"),
                port: env_parsed("SMTP_PORT", 587),
                username: env_or("SMTP_USERNAME", ""),
                password: env_or("SMTP_PASSWORD", ""),
                use_tls: env_or("SMTP_USE_TLS", "true").trim().eq_ignore_ascii_case("true"),
                from_email: env_or("SMTP_FROM_EMAIL", "postrider@localhost"),
                from_name: env_or("SMTP_FROM_NAME", "Postrider"),
            },
            log: LogConfig {
                level: LogLevel::parse(&env_or("LOG_LEVEL", "INFO")).unwrap_or(LogLevel::Info),
                file: log_file,
            },
            engine: EngineConfig {
                poll_interval_secs: env_parsed("POLL_INTERVAL", default_poll_interval()),
                max_retry_count: env_parsed("MAX_RETRY_COUNT", default_max_retry_count()),
                process_from_after,
                cutoff,
            },
            admin: AdminConfig {
                port: env_parsed("ADMIN_PORT", default_admin_port()),
                user: env_or("ADMIN_USER", ""),
                pass: env_or("ADMIN_PASS", ""),
            },
        }
    }
}

/// Parse a processing cutoff.
///
/// Accepts a bare `YYYY-MM-DD` (midnight UTC), an ISO-8601 instant (a
/// trailing `Z` reads as `+00:00`), or a naive timestamp assumed to be UTC.
/// Anything else yields `None`, meaning no cutoff.
#[must_use]
pub fn parse_cutoff(value: &str) -> Option<DateTime<Utc>> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }

    if v.len() == 10 && v.as_bytes()[4] == b'-' && v.as_bytes()[7] == b'-' {
        let date = NaiveDate::parse_from_str(v, "%Y-%m-%d").ok()?;
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(v) {
        return Some(instant.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(v, format) {
            return Some(naive.and_utc());
        }
    }

    None
}
