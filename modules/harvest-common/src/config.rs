use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::HarvestError;

/// Harvest tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    // Pagination
    pub max_cycles: u32,
    pub max_cycles_sorted: u32,
    pub settle_delay: Duration,
    pub patience: u32,
    pub patience_sorted: u32,

    // Early stop
    pub early_stop_window: usize,
    pub early_stop_min_items: usize,
    pub skip_threshold: usize,
    pub sort_optimization: bool,
    pub sort_max_score: u8,

    // Extraction
    pub advanced_date_parsing: bool,
    pub expand_settle: Duration,

    // Navigation
    pub nav_settle: Duration,
    /// Wait after opening a menu, before picking an option from it.
    pub menu_settle: Duration,
    pub locator_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_cycles: 100,
            max_cycles_sorted: 50,
            settle_delay: Duration::from_millis(2000),
            patience: 5,
            patience_sorted: 3,
            early_stop_window: 5,
            early_stop_min_items: 10,
            skip_threshold: 5,
            sort_optimization: true,
            sort_max_score: 3,
            advanced_date_parsing: true,
            expand_settle: Duration::from_millis(500),
            nav_settle: Duration::from_millis(3000),
            menu_settle: Duration::from_millis(2000),
            locator_timeout: Duration::from_millis(3000),
        }
    }
}

impl HarvestConfig {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, HarvestError> {
        let d = Self::default();
        let config = Self {
            max_cycles: env_or("HARVEST_MAX_CYCLES", d.max_cycles)?,
            max_cycles_sorted: env_or("HARVEST_MAX_CYCLES_SORTED", d.max_cycles_sorted)?,
            settle_delay: env_millis("HARVEST_SETTLE_MS", d.settle_delay)?,
            patience: env_or("HARVEST_PATIENCE", d.patience)?,
            patience_sorted: env_or("HARVEST_PATIENCE_SORTED", d.patience_sorted)?,
            early_stop_window: env_or("HARVEST_EARLY_STOP_WINDOW", d.early_stop_window)?,
            early_stop_min_items: env_or("HARVEST_EARLY_STOP_MIN_ITEMS", d.early_stop_min_items)?,
            skip_threshold: env_or("HARVEST_SKIP_THRESHOLD", d.skip_threshold)?,
            sort_optimization: env_flag("HARVEST_SORT_OPTIMIZATION", d.sort_optimization)?,
            sort_max_score: env_or("HARVEST_SORT_MAX_SCORE", d.sort_max_score)?,
            advanced_date_parsing: env_flag("HARVEST_ADVANCED_DATES", d.advanced_date_parsing)?,
            expand_settle: env_millis("HARVEST_EXPAND_SETTLE_MS", d.expand_settle)?,
            nav_settle: env_millis("HARVEST_NAV_SETTLE_MS", d.nav_settle)?,
            menu_settle: env_millis("HARVEST_MENU_SETTLE_MS", d.menu_settle)?,
            locator_timeout: env_millis("HARVEST_LOCATOR_TIMEOUT_MS", d.locator_timeout)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Config with every delay zeroed. Used by tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            expand_settle: Duration::ZERO,
            nav_settle: Duration::ZERO,
            menu_settle: Duration::ZERO,
            locator_timeout: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.max_cycles == 0 || self.max_cycles_sorted == 0 {
            return Err(HarvestError::Config("cycle caps must be positive".into()));
        }
        if self.patience == 0 || self.patience_sorted == 0 {
            return Err(HarvestError::Config("stability patience must be positive".into()));
        }
        if self.early_stop_window == 0 || self.skip_threshold == 0 {
            return Err(HarvestError::Config(
                "early-stop window and skip threshold must be positive".into(),
            ));
        }
        if !(1..=5).contains(&self.sort_max_score) {
            return Err(HarvestError::Config(
                "HARVEST_SORT_MAX_SCORE must be within 1..=5".into(),
            ));
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        info!(
            max_cycles = self.max_cycles,
            max_cycles_sorted = self.max_cycles_sorted,
            settle_ms = self.settle_delay.as_millis() as u64,
            patience = self.patience,
            patience_sorted = self.patience_sorted,
            sort_optimization = self.sort_optimization,
            advanced_date_parsing = self.advanced_date_parsing,
            "Harvest config loaded"
        );
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, HarvestError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| HarvestError::Config(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn env_millis(key: &str, default: Duration) -> Result<Duration, HarvestError> {
    let ms = env_or(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

fn env_flag(key: &str, default: bool) -> Result<bool, HarvestError> {
    match env::var(key) {
        Ok(raw) => parse_flag(&raw)
            .ok_or_else(|| HarvestError::Config(format!("{key} must be a boolean, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = HarvestConfig::default();
        assert_eq!(c.max_cycles, 100);
        assert_eq!(c.max_cycles_sorted, 50);
        assert_eq!(c.patience, 5);
        assert_eq!(c.patience_sorted, 3);
        assert_eq!(c.early_stop_window, 5);
        assert_eq!(c.skip_threshold, 5);
        assert_eq!(c.settle_delay, Duration::from_secs(2));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn validate_rejects_zero_patience() {
        let c = HarvestConfig {
            patience: 0,
            ..HarvestConfig::default()
        };
        assert!(matches!(c.validate(), Err(HarvestError::Config(_))));
    }

    #[test]
    fn immediate_zeroes_every_delay() {
        let c = HarvestConfig::immediate();
        assert_eq!(c.settle_delay, Duration::ZERO);
        assert_eq!(c.nav_settle, Duration::ZERO);
        assert_eq!(c.menu_settle, Duration::ZERO);
        assert_eq!(c.max_cycles, 100);
    }

    #[test]
    fn menu_settles_shorter_than_navigation() {
        let c = HarvestConfig::default();
        assert_eq!(c.menu_settle, Duration::from_millis(2000));
        assert_eq!(c.nav_settle, Duration::from_millis(3000));
    }
}
