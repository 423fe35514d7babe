use crate::constants::{
    ANCHOR_SCAN_STRATEGY, DEFAULT_LISTING_URL, DEFAULT_USER_AGENT, TABLE_ROWS_STRATEGY,
};
use crate::error::{PipelineError, Result};
use crate::strategies::factory::AVAILABLE_STRATEGIES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "pipeline.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub validation: ValidationConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub listing_url: String,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Detail fetches in flight at once
    pub concurrency: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_pages: u32,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub requests_per_min: Option<u64>,
    /// Wall-clock budget for a whole run; exceeding it cancels the run
    pub run_budget_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            min_delay_ms: 500,
            max_delay_ms: 1500,
            request_timeout_secs: 30,
            max_pages: 50,
            max_retries: 3,
            retry_backoff_ms: 1000,
            requests_per_min: Some(60),
            run_budget_secs: Some(3600),
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn run_budget(&self) -> Option<Duration> {
        self.run_budget_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum confidence score (0-100) for a passing verdict
    pub confidence_threshold: f64,
    pub strategy_a: String,
    pub strategy_b: String,
    /// Whether a partial crawl on either side may still pass
    pub allow_partial: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 90.0,
            strategy_a: TABLE_ROWS_STRATEGY.to_string(),
            strategy_b: ANCHOR_SCAN_STRATEGY.to_string(),
            allow_partial: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/disasters.db"),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from `pipeline.toml` when no path
    /// is given. A missing default file falls back to built-in defaults; a
    /// missing explicit file is an error. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                    Self::default()
                }
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        info!("Loaded configuration from {}", path.display());
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DISASTER_LISTING_URL") {
            self.source.listing_url = url;
        }
        if let Ok(path) = std::env::var("DISASTER_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Ok(threshold) = std::env::var("DISASTER_CONFIDENCE_THRESHOLD") {
            self.validation.confidence_threshold = threshold.parse().map_err(|_| {
                PipelineError::Config(format!(
                    "DISASTER_CONFIDENCE_THRESHOLD is not a number: '{}'",
                    threshold
                ))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.concurrency == 0 {
            return Err(PipelineError::Config(
                "pipeline.concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.min_delay_ms > self.pipeline.max_delay_ms {
            return Err(PipelineError::Config(format!(
                "pipeline.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.pipeline.min_delay_ms, self.pipeline.max_delay_ms
            )));
        }
        if self.pipeline.max_pages == 0 {
            return Err(PipelineError::Config(
                "pipeline.max_pages must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.validation.confidence_threshold) {
            return Err(PipelineError::Config(format!(
                "validation.confidence_threshold must be within 0-100, got {}",
                self.validation.confidence_threshold
            )));
        }
        for name in [&self.validation.strategy_a, &self.validation.strategy_b] {
            if !AVAILABLE_STRATEGIES.contains(&name.as_str()) {
                return Err(PipelineError::UnknownStrategy(name.clone()));
            }
        }
        reqwest::Url::parse(&self.source.listing_url).map_err(|e| {
            PipelineError::Config(format!(
                "source.listing_url '{}' is not a valid URL: {}",
                self.source.listing_url, e
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validation.confidence_threshold, 90.0);
        assert_eq!(config.pipeline.concurrency, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [pipeline]
            concurrency = 5
            max_pages = 2

            [validation]
            confidence_threshold = 95.0
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.concurrency, 5);
        assert_eq!(config.pipeline.max_pages, 2);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.validation.confidence_threshold, 95.0);
        assert_eq!(config.validation.strategy_a, TABLE_ROWS_STRATEGY);
        assert_eq!(config.source.listing_url, DEFAULT_LISTING_URL);
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut config = Config::default();
        config.pipeline.min_delay_ms = 2000;
        config.pipeline.max_delay_ms = 100;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let mut config = Config::default();
        config.validation.confidence_threshold = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_strategy() {
        let mut config = Config::default();
        config.validation.strategy_b = "headless".to_string();
        assert!(matches!(config.validate(), Err(PipelineError::UnknownStrategy(_))));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/pipeline.toml")));
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
