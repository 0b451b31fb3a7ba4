use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Runtime settings: `playmode.toml` in the working directory (optional),
/// then `PLAYMODE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: String,
    pub max_attempts: u32,
    pub retry_interval_ms: u64,
    pub column_width: u32,
    pub viewport_width: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: "data/playmode.sqlite".to_string(),
            max_attempts: 10,
            retry_interval_ms: 200,
            column_width: 400,
            viewport_width: 1280,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name("playmode").required(false))
            .add_source(config::Environment::with_prefix("PLAYMODE"))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            interval: Duration::from_millis(self.retry_interval_ms),
        }
    }
}

/// Fixed-interval polling for content that has not rendered yet.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Settings::default().retry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.interval, Duration::from_millis(200));
        assert_eq!(Settings::default().column_width, 400);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let settings = Settings {
            max_attempts: 0,
            ..Settings::default()
        };
        assert_eq!(settings.retry().max_attempts, 1);
    }

    #[test]
    fn partial_source_keeps_defaults() {
        let settings: Settings = config::Config::builder()
            .set_override("max_attempts", 3)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.db_path, "data/playmode.sqlite");
    }
}
