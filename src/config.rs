// ⚙️ Configuration - JSON file + environment overrides
//
// Lookup order: $PARKINUP_CONFIG, then ./parkinup.json, then built-in
// defaults. PARKINUP_DB / PARKINUP_RATE_PER_HOUR / PARKINUP_LOG override
// whatever the file said.

use crate::fee::Rate;
use anyhow::{anyhow, Context as AnyhowContext, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "PARKINUP_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "parkinup.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding slots, vehicles and payments
    pub database_path: PathBuf,

    /// Currency units charged per hour (billed per minute)
    pub rate_per_hour: f64,

    pub currency_symbol: String,

    /// Slots seeded on first run when the lot is empty
    pub default_slots: u32,

    /// How often the UI recomputes parked durations
    pub refresh_interval_secs: u64,

    pub ocr_timeout_ms: u64,

    /// tracing filter used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("parking.db"),
            rate_per_hour: 10.0,
            currency_symbol: "P".to_string(),
            default_slots: 20,
            refresh_interval_secs: 30,
            ocr_timeout_ms: 2000,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {:?}", path.as_ref()))?;

        Ok(config)
    }

    /// Resolve the config file and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("PARKINUP_DB") {
            self.database_path = PathBuf::from(db);
        }

        if let Some(rate) = lookup("PARKINUP_RATE_PER_HOUR") {
            self.rate_per_hour = rate
                .trim()
                .parse()
                .with_context(|| format!("PARKINUP_RATE_PER_HOUR is not a number: {:?}", rate))?;
        }

        if let Some(level) = lookup("PARKINUP_LOG") {
            self.log_level = level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.rate()?;
        if self.refresh_interval_secs == 0 {
            return Err(anyhow!("refresh_interval_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn rate(&self) -> Result<Rate> {
        let per_hour = Decimal::from_f64(self.rate_per_hour)
            .ok_or_else(|| anyhow!("rate_per_hour {} is not a finite number", self.rate_per_hour))?;
        Ok(Rate::per_hour(per_hour)?)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn ocr_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.rate().unwrap(), Rate::default());
        assert_eq!(config.default_slots, 20);
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rate_per_hour": 25.5, "currency_symbol": "$"}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.rate().unwrap().hourly(), Decimal::new(255, 1));
        assert_eq!(config.currency_symbol, "$");
        assert_eq!(config.database_path, PathBuf::from("parking.db"));
    }

    #[test]
    fn test_bad_file_has_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config JSON"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PARKINUP_DB", "/var/lib/parkinup/lot.db"),
            ("PARKINUP_RATE_PER_HOUR", " 12 "),
            ("PARKINUP_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/parkinup/lot.db"));
        assert_eq!(config.rate_per_hour, 12.0);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let mut config = Config::default();
        assert!(config
            .apply_overrides(|key| (key == "PARKINUP_RATE_PER_HOUR").then(|| "ten".to_string()))
            .is_err());

        config.rate_per_hour = -5.0;
        assert!(config.validate().is_err());
    }
}
