//! Live configuration overlay.
//!
//! The admin config document is fetched at the start of every tick and
//! merged field-by-field over the process defaults. An absent option falls
//! back to its default; an invalid option (non-positive integer, unknown
//! level, unparseable cutoff) is silently discarded and the previously
//! effective value stands. A change to `logLevel` takes effect immediately
//! on the global filter; everything else applies from the next tick.

use chrono::{DateTime, Utc};
use postrider_common::{Config, LogLevel, logging, parse_cutoff};
use postrider_store::AdminOverrides;

/// Process defaults the overlay merges onto.
#[derive(Debug, Clone)]
pub struct OverlayDefaults {
    pub poll_interval_secs: u64,
    pub max_retry_count: u32,
    pub process_from_after: String,
    pub cutoff: Option<DateTime<Utc>>,
    pub log_level: LogLevel,
}

impl OverlayDefaults {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval_secs: config.engine.poll_interval_secs,
            max_retry_count: config.engine.max_retry_count,
            process_from_after: config.engine.process_from_after.clone(),
            cutoff: config.engine.cutoff,
            log_level: config.log.level,
        }
    }
}

/// The merged configuration a tick runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    pub poll_interval_secs: u64,
    pub max_retry_count: u32,
    /// Raw cutoff string, kept for operator display.
    pub process_from_after: String,
    pub cutoff: Option<DateTime<Utc>>,
    pub log_level: LogLevel,
    pub dashboard_refresh_secs: Option<u32>,
}

impl EffectiveConfig {
    /// The configuration in force before any override has been seen.
    #[must_use]
    pub fn from_defaults(defaults: &OverlayDefaults) -> Self {
        Self {
            poll_interval_secs: defaults.poll_interval_secs,
            max_retry_count: defaults.max_retry_count,
            process_from_after: defaults.process_from_after.clone(),
            cutoff: defaults.cutoff,
            log_level: defaults.log_level,
            dashboard_refresh_secs: None,
        }
    }
}

/// Merge overrides onto defaults.
///
/// Per field: absent override falls back to the default, a valid override
/// wins, an invalid override keeps the value from `previous`.
#[must_use]
pub fn merge(
    defaults: &OverlayDefaults,
    previous: &EffectiveConfig,
    overrides: &AdminOverrides,
) -> EffectiveConfig {
    let poll_interval_secs = match overrides.poll_interval {
        None => defaults.poll_interval_secs,
        Some(v) => u64::try_from(v)
            .ok()
            .filter(|&v| v > 0)
            .unwrap_or(previous.poll_interval_secs),
    };

    let max_retry_count = match overrides.max_retry_count {
        None => defaults.max_retry_count,
        Some(v) => u32::try_from(v)
            .ok()
            .filter(|&v| v > 0)
            .unwrap_or(previous.max_retry_count),
    };

    let (process_from_after, cutoff) = match overrides
        .process_from_after
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        None => (defaults.process_from_after.clone(), defaults.cutoff),
        Some(raw) => match parse_cutoff(raw) {
            Some(parsed) => (raw.to_string(), Some(parsed)),
            None => (previous.process_from_after.clone(), previous.cutoff),
        },
    };

    let log_level = match overrides.log_level.as_deref().map(str::trim) {
        None | Some("") => defaults.log_level,
        Some(raw) => LogLevel::parse(raw).unwrap_or(previous.log_level),
    };

    let dashboard_refresh_secs = match overrides.dashboard_refresh_secs {
        None => None,
        Some(v) => u32::try_from(v)
            .ok()
            .filter(|&v| v > 0)
            .or(previous.dashboard_refresh_secs),
    };

    EffectiveConfig {
        poll_interval_secs,
        max_retry_count,
        process_from_after,
        cutoff,
        log_level,
        dashboard_refresh_secs,
    }
}

/// Holds the defaults and the currently effective configuration for the
/// delivery loop.
#[derive(Debug, Clone)]
pub struct ConfigOverlay {
    defaults: OverlayDefaults,
    current: EffectiveConfig,
}

impl ConfigOverlay {
    #[must_use]
    pub fn new(defaults: OverlayDefaults) -> Self {
        let current = EffectiveConfig::from_defaults(&defaults);
        Self { defaults, current }
    }

    #[must_use]
    pub const fn effective(&self) -> &EffectiveConfig {
        &self.current
    }

    /// Recompute the effective configuration from fresh overrides, logging
    /// every changed value and applying a log-level change to the global
    /// filter.
    pub fn apply(&mut self, overrides: &AdminOverrides) -> &EffectiveConfig {
        let next = merge(&self.defaults, &self.current, overrides);

        if next.poll_interval_secs != self.current.poll_interval_secs {
            tracing::info!(
                "applying override: pollInterval {} -> {}",
                self.current.poll_interval_secs,
                next.poll_interval_secs
            );
        }
        if next.max_retry_count != self.current.max_retry_count {
            tracing::info!(
                "applying override: maxRetryCount {} -> {}",
                self.current.max_retry_count,
                next.max_retry_count
            );
        }
        if next.cutoff != self.current.cutoff {
            tracing::info!(
                "applying override: processFromAfter {:?} -> {:?}",
                self.current.cutoff,
                next.cutoff
            );
        }
        if next.log_level != self.current.log_level {
            tracing::info!(
                "applying override: logLevel {} -> {}",
                self.current.log_level,
                next.log_level
            );
            logging::set_level(next.log_level);
        }

        self.current = next;
        &self.current
    }
}
