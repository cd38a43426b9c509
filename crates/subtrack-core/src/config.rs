//! Settings loaded from TOML
//!
//! Defaults are compiled in from `config/subtrack.toml`. A user override
//! file replaces individual keys; anything it leaves out keeps the default.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::billing::{BillingNormalizer, CustomCyclePolicy};
use crate::error::{Error, Result};
use crate::report::{AggregatorOptions, ReportAggregator};

/// Default config embedded at compile time
const DEFAULT_CONFIG: &str = include_str!("../../../config/subtrack.toml");

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingSettings {
    pub custom_cycle: CustomCyclePolicy,
}

/// Sizes for one aggregation surface (report email or dashboard)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub enabled: bool,
    pub top_subscriptions: usize,
    pub upcoming_window_days: i64,
    pub upcoming_limit: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            top_subscriptions: 5,
            upcoming_window_days: 30,
            upcoming_limit: 5,
        }
    }
}

impl ReportSettings {
    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            top_n: self.top_subscriptions,
            upcoming_window_days: self.upcoming_window_days,
            upcoming_limit: self.upcoming_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub top_subscriptions: usize,
    pub upcoming_window_days: i64,
    pub upcoming_limit: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            top_subscriptions: 3,
            upcoming_window_days: 30,
            upcoming_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    pub enabled: bool,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// Sender address, overridden by `EMAIL_FROM`
    pub from: String,
    /// Base URL linked from emails
    pub app_url: String,
    pub timeout_secs: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            from: "Subtrack <notifications@subtrack.local>".to_string(),
            app_url: "http://localhost:3000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl EmailSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One-time verification codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeSettings {
    pub ttl_minutes: i64,
    pub max_attempts: u32,
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self {
            ttl_minutes: 10,
            max_attempts: 5,
        }
    }
}

/// All runtime settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub billing: BillingSettings,
    pub reports: ReportSettings,
    pub dashboard: DashboardSettings,
    pub reminders: ReminderSettings,
    pub email: EmailSettings,
    pub codes: CodeSettings,
}

impl Settings {
    /// Load settings, preferring `override_path`, then the default user
    /// config location, then the embedded defaults
    ///
    /// An explicit override path that does not exist is an error; a missing
    /// file at the default location is not.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = override_path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Self::parse(DEFAULT_CONFIG),
        }
    }

    /// Settings from the embedded defaults only
    pub fn embedded() -> Result<Self> {
        Self::parse(DEFAULT_CONFIG)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let settings = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Parse settings from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.reports.upcoming_window_days < 0 || self.dashboard.upcoming_window_days < 0 {
            return Err(Error::Config(
                "upcoming_window_days must not be negative".to_string(),
            ));
        }
        if self.codes.ttl_minutes <= 0 {
            return Err(Error::Config("codes.ttl_minutes must be positive".to_string()));
        }
        if self.codes.max_attempts == 0 {
            return Err(Error::Config("codes.max_attempts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn normalizer(&self) -> BillingNormalizer {
        BillingNormalizer::new(self.billing.custom_cycle)
    }

    /// Aggregator sized for monthly report emails
    pub fn report_aggregator(&self) -> ReportAggregator {
        ReportAggregator::new(self.normalizer(), self.reports.aggregator_options())
    }

    /// Aggregator sized for the dashboard
    pub fn dashboard_aggregator(&self) -> ReportAggregator {
        ReportAggregator::new(
            self.normalizer(),
            AggregatorOptions {
                top_n: self.dashboard.top_subscriptions,
                upcoming_window_days: self.dashboard.upcoming_window_days,
                upcoming_limit: self.dashboard.upcoming_limit,
            },
        )
    }
}

/// Default user config location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("subtrack").join("config.toml"))
}
