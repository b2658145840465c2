use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;

use super::leagues::LeaguePriorities;
use crate::database::DEFAULT_BUSY_TIMEOUT;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub max_retries: u32,
    pub poll_delay: Duration,
    pub error_backoff: Duration,
    /// Tries per queue update before a claimed tournament is given up on
    pub bookkeeping_attempts: u32,
    pub priorities: LeaguePriorities,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            poll_delay: Duration::from_millis(500),
            error_backoff: Duration::from_secs(5),
            bookkeeping_attempts: 5,
            priorities: LeaguePriorities::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub results_dir: PathBuf,
    pub retention: TimeDelta,
    pub staleness_cutoff: TimeDelta,
    pub full_bracket_threshold: usize,
    pub top_players: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            retention: hours(42.5),
            staleness_cutoff: hours(28.0),
            full_bracket_threshold: 28,
            top_players: 25,
        }
    }
}

impl LiveSettings {
    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub busy_timeout: Duration,
    pub queue: QueueSettings,
    pub live: LiveSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "tower_standings.db".to_string()),
            busy_timeout: std::env::var("DATABASE_BUSY_TIMEOUT_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .map_or(DEFAULT_BUSY_TIMEOUT, Duration::from_millis),
            queue: QueueSettings::default(),
            live: LiveSettings::default(),
        }
    }
}

/// Converts fractional hours (as accepted on the command line) to a chrono delta
pub fn hours(value: f64) -> TimeDelta {
    TimeDelta::milliseconds((value * 3_600_000.0).round() as i64)
}

fn default_results_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LIVE_RESULTS_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("tourney").join("results_cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_hours_keep_minutes() {
        assert_eq!(hours(42.5), TimeDelta::minutes(2550));
        assert_eq!(hours(28.0), TimeDelta::hours(28));
    }
}
