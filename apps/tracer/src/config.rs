use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::analysis::context::DEFAULT_CACHE_TTL;
use crate::analysis::formatter::DEFAULT_BATCH_CAP;
use crate::analysis::DEFAULT_POLL_INTERVAL;
use crate::llm_client::rate_limit::DEFAULT_RATE_INTERVAL;

/// Runtime configuration loaded from environment variables (and `.env` if present).
/// Fails before any data is loaded if a required variable is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub dataset_dir: PathBuf,
    pub curriculum_path: PathBuf,
    pub problems_path: PathBuf,
    pub batch_size: usize,
    pub rate_limit: Duration,
    pub poll_interval: Duration,
    /// Overall bound on waiting for one batch job; unbounded when unset.
    pub poll_timeout: Option<Duration>,
    pub cache_ttl: Duration,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process environment.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let batch_size: usize = parse_or(&get, "BATCH_SIZE", DEFAULT_BATCH_CAP)?;
        if batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be at least 1");
        }

        Ok(Config {
            gemini_api_key: require(&get, "GEMINI_API_KEY")?,
            dataset_dir: get("DATASET_DIR")
                .unwrap_or_else(|| "dataset/CodeWorkout".to_string())
                .into(),
            curriculum_path: get("CURRICULUM_PATH")
                .unwrap_or_else(|| "dataset/curriculum.json".to_string())
                .into(),
            problems_path: get("PROBLEMS_PATH")
                .unwrap_or_else(|| "dataset/problems.csv".to_string())
                .into(),
            batch_size,
            rate_limit: Duration::from_secs(parse_or(
                &get,
                "RATE_LIMIT_SECS",
                DEFAULT_RATE_INTERVAL.as_secs(),
            )?),
            poll_interval: Duration::from_secs(parse_or(
                &get,
                "POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL.as_secs(),
            )?),
            poll_timeout: get("POLL_TIMEOUT_SECS")
                .map(|raw| parse::<u64>("POLL_TIMEOUT_SECS", &raw))
                .transpose()?
                .map(Duration::from_secs),
            cache_ttl: Duration::from_secs(parse_or(
                &get,
                "CACHE_TTL_SECS",
                DEFAULT_CACHE_TTL.as_secs(),
            )?),
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    get(key)
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'"))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}
