//! Ads configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AdsError, AdsResult};

/// Ads configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdsConfig {
    /// Directory holding the ads database
    pub data_dir: PathBuf,

    /// Whether the host is a mobile platform
    pub is_mobile_platform: bool,

    /// Page land settings
    pub site_visit: SiteVisitConfig,

    /// Ad history settings
    pub history: HistoryConfig,

    /// Reminder settings
    pub reminders: ReminderConfig,

    /// Database maintenance settings
    pub maintenance: MaintenanceConfig,

    /// Which ad categories the user opted in to
    pub opt_ins: OptIns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteVisitConfig {
    /// Delay before evaluating whether the user landed, in seconds
    pub page_land_after_secs: u64,

    /// Reserved cap on concurrent page lands (0 = unbounded). Not enforced.
    pub page_land_cap: u32,

    /// Pause the page land timer while the tab is hidden
    pub should_suspend_and_resume_page_land: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Days to keep ad history, ad events and deposits
    pub retention_days: u32,

    /// Rows per insert statement when saving history
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Remind the user on every Nth click of the same ad (0 disables)
    pub remind_user_if_clicking_the_same_ad_after: u32,

    /// Debounce before checking for a reminder, in milliseconds
    pub maybe_show_reminder_after_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between retention sweeps, in seconds
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptIns {
    pub notification_ads: bool,
    pub new_tab_page_ads: bool,
    /// Covers inline content and promoted content ads
    pub brave_news_ads: bool,
    pub search_result_ads: bool,
}

impl AdsConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> AdsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AdsConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> AdsResult<Self> {
        if !path.exists() {
            log::info!("No ads config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> AdsResult<()> {
        if self.history.batch_size == 0 {
            return Err(AdsError::config("history.batch_size must be at least 1"));
        }
        if self.maintenance.interval_secs == 0 {
            return Err(AdsError::config(
                "maintenance.interval_secs must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ads.sqlite")
    }
}

impl SiteVisitConfig {
    pub fn page_land_after(&self) -> Duration {
        Duration::seconds(self.page_land_after_secs as i64)
    }
}

impl HistoryConfig {
    pub fn retention_period(&self) -> Duration {
        Duration::days(self.retention_days as i64)
    }
}

impl ReminderConfig {
    pub fn maybe_show_reminder_after(&self) -> Duration {
        Duration::milliseconds(self.maybe_show_reminder_after_ms as i64)
    }
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::seconds(self.interval_secs as i64)
    }
}

impl Default for AdsConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pageland"),
            is_mobile_platform: false,
            site_visit: SiteVisitConfig::default(),
            history: HistoryConfig::default(),
            reminders: ReminderConfig::default(),
            maintenance: MaintenanceConfig::default(),
            opt_ins: OptIns::default(),
        }
    }
}

impl Default for SiteVisitConfig {
    fn default() -> Self {
        Self {
            page_land_after_secs: 5,
            page_land_cap: 0,
            should_suspend_and_resume_page_land: true,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            batch_size: 50,
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            remind_user_if_clicking_the_same_ad_after: 3,
            maybe_show_reminder_after_ms: 100,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60, // 1 day
        }
    }
}

impl Default for OptIns {
    fn default() -> Self {
        Self {
            notification_ads: true,
            new_tab_page_ads: true,
            brave_news_ads: true,
            search_result_ads: true,
        }
    }
}
