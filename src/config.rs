use crate::errors::{AppError, AppResult};
use crate::forecast::{TableFormat, DEFAULT_LOOKBACK_DAYS, DEFAULT_TRIAL_COUNT};
use crate::models::{SizeClass, TaskWeights};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "shipcast.yml";

/// Settings loaded once at startup. Nothing mutates a `Config` after
/// [`Config::load`] returns; callers pass it around by reference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    pub task_weights: TaskWeights,
    #[serde(default)]
    pub forecast: ForecastSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub lists: Option<ListSettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastSettings {
    pub trials: usize,
    pub lookback_days: i64,
    pub output: TableFormat,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIAL_COUNT,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            output: TableFormat::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database: PathBuf,
    pub in_progress_cards: PathBuf,
    pub completed_cards: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("shipcast.db"),
            in_progress_cards: PathBuf::from("cards/in-progress"),
            completed_cards: PathBuf::from("cards/completed"),
        }
    }
}

/// Board list ids used to recover work windows from card action history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListSettings {
    pub work_begins_in: String,
    pub work_ends_in: String,
}

impl Config {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("cannot read {}: {}", path.display(), error)))?;
        Self::from_yaml_str(&raw).map_err(|error| match error {
            AppError::Config(message) => AppError::Config(format!("{}: {}", path.display(), message)),
            other => other,
        })
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        let config: Config = serde_yaml::from_str(raw).map_err(|error| AppError::Config(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        for size in SizeClass::ALL {
            let weight = self.task_weights.get(size);
            if !weight.is_finite() || weight < 0.0 {
                return Err(AppError::Config(format!(
                    "task weight for {} must be a non-negative number",
                    size.as_str()
                )));
            }
        }
        if self.forecast.trials == 0 {
            return Err(AppError::Config("forecast.trials must be positive".to_string()));
        }
        if self.forecast.lookback_days <= 0 {
            return Err(AppError::Config("forecast.lookback_days must be positive".to_string()));
        }
        Ok(())
    }
}
