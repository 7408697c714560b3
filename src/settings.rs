use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::attendance::UnmarkedPolicy;
use crate::error::ConfigError;
use crate::ranking::DEFAULT_TIE_PRECISION;
use crate::trend::{DEFAULT_TREND_DEADBAND, DEFAULT_WINDOW_DAYS};

pub const DEFAULT_CONFIG_FILE: &str = "performance.toml";
pub const ENV_PREFIX: &str = "PERF_ENGINE";

/// Root configuration for the aggregation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub trend: TrendSettings,
    pub attendance: AttendanceSettings,
    pub ranking: RankingSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendSettings {
    /// Percentage-point change that still counts as stable.
    pub deadband: Decimal,
    /// Length of each of the two comparison windows.
    pub window_days: u32,
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            deadband: DEFAULT_TREND_DEADBAND,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceSettings {
    pub unmarked_policy: UnmarkedPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    /// Decimal places compared when deciding ties.
    pub tie_precision: u32,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            tie_precision: DEFAULT_TIE_PRECISION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub timeout_secs: u64,
    pub max_workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_workers: 4,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trend.deadband < Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "trend.deadband must not be negative".to_string(),
            ));
        }
        if self.trend.window_days == 0 {
            return Err(ConfigError::ValidationError(
                "trend.window_days must be at least 1".to_string(),
            ));
        }
        if self.ranking.tie_precision > 10 {
            return Err(ConfigError::ValidationError(
                "ranking.tie_precision must be at most 10".to_string(),
            ));
        }
        if self.batch.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "batch.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.batch.max_workers == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads settings from `path` (or an optional `performance.toml` in the
/// working directory), overridden by `PERF_ENGINE__SECTION__KEY` variables.
pub fn load_settings(path: Option<&Path>) -> Result<EngineSettings, ConfigError> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<EngineSettings>()?;

    settings.validate()?;
    Ok(settings)
}

/// Parses settings from an in-memory TOML document.
pub fn settings_from_toml(source: &str) -> Result<EngineSettings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from_str(source, config::FileFormat::Toml))
        .build()?
        .try_deserialize::<EngineSettings>()?;

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = settings_from_toml("").unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.trend.deadband, dec!(2));
        assert_eq!(settings.attendance.unmarked_policy, UnmarkedPolicy::Absent);
    }

    #[test]
    fn sections_override_individual_keys() {
        let settings = settings_from_toml(
            r#"
            [trend]
            deadband = 3.5

            [attendance]
            unmarked_policy = "excluded"

            [batch]
            max_workers = 8
            "#,
        )
        .unwrap();

        assert_eq!(settings.trend.deadband, dec!(3.5));
        assert_eq!(settings.trend.window_days, DEFAULT_WINDOW_DAYS);
        assert_eq!(settings.attendance.unmarked_policy, UnmarkedPolicy::Excluded);
        assert_eq!(settings.batch.max_workers, 8);
        assert_eq!(settings.batch.timeout_secs, 30);
    }

    #[test]
    fn environment_overrides_the_settings_file() {
        let path = std::env::temp_dir().join(format!("performance-{}.toml", std::process::id()));
        std::fs::write(&path, "[trend]\ndeadband = 1.5\nwindow_days = 10\n").unwrap();
        std::env::set_var("PERF_ENGINE__TREND__DEADBAND", "5");
        std::env::set_var("PERF_ENGINE__BATCH__MAX_WORKERS", "2");

        let loaded = load_settings(Some(path.as_path()));
        std::env::remove_var("PERF_ENGINE__TREND__DEADBAND");
        std::env::remove_var("PERF_ENGINE__BATCH__MAX_WORKERS");
        let _ = std::fs::remove_file(&path);

        let settings = loaded.unwrap();
        assert_eq!(settings.trend.deadband, dec!(5));
        assert_eq!(settings.trend.window_days, 10);
        assert_eq!(settings.batch.max_workers, 2);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = settings_from_toml("[trend]\nwindow_days = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = settings_from_toml("[batch]\nmax_workers = 0").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
