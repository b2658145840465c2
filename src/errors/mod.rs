use std::path::{Path, PathBuf};

use crate::config::League;

/// Failures while assembling the live view of a league
#[derive(thiserror::Error, Debug)]
pub enum LiveDataError {
    /// No usable snapshot exists yet. Callers show a waiting message.
    #[error("no current data for {league}, wait until the tourney day")]
    NoData { league: League },

    #[error("failed to read live results directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Every snapshot in the window failed to parse
    #[error("malformed live snapshot {path}: {source}")]
    Malformed { path: PathBuf, source: csv::Error },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl LiveDataError {
    pub fn is_no_data(&self) -> bool {
        matches!(self, LiveDataError::NoData { .. })
    }
}

/// Failures while turning a results export into tournament rows
#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("failed to read results file {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("unexpected column layout in {path}: {detail}")]
    Layout { path: PathBuf, detail: String },

    #[error("invalid wave {value:?} on line {line} of {path}")]
    InvalidWave {
        path: PathBuf,
        line: u64,
        value: String,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ImportError {
    pub fn csv(path: &Path, source: csv::Error) -> Self {
        ImportError::Csv {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn layout(path: &Path, detail: impl Into<String>) -> Self {
        ImportError::Layout {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

/// Context message for storage failures scoped to a tournament
pub fn tournament_context(operation: &str, tournament_id: i64) -> String {
    format!("Failed to {} for tournament {}", operation, tournament_id)
}

/// Context message for file operations
pub fn file_context(operation: &str, path: &Path) -> String {
    format!("Failed to {} {}", operation, path.display())
}
