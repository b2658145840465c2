use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta};
use log::warn;
use serde::Deserialize;

use crate::config::League;
use crate::database::NewRow;
use crate::errors::LiveDataError;

/// Snapshot files are named after the moment they were taken: `2024-05-01__13_45.csv`
pub const SNAPSHOT_TIME_FORMAT: &str = "%Y-%m-%d__%H_%M";

pub fn parse_snapshot_time(path: &Path) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_str()?;
    NaiveDateTime::parse_from_str(stem, SNAPSHOT_TIME_FORMAT).ok()
}

/// One line of a live snapshot export
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LiveRecord {
    pub player_id: String,
    pub name: String,
    pub avatar: Option<i32>,
    pub relic: Option<i32>,
    pub wave: i32,
    pub bracket: String,
    pub tourney_number: Option<i64>,
}

impl From<LiveRecord> for NewRow {
    fn from(record: LiveRecord) -> Self {
        let nickname = if record.name.is_empty() {
            record.player_id.clone()
        } else {
            record.name
        };
        NewRow {
            avatar_id: record.avatar.unwrap_or(-1),
            relic_id: record.relic.unwrap_or(-1),
            ..NewRow::new(record.player_id, nickname, record.wave)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub taken_at: NaiveDateTime,
    pub path: PathBuf,
    pub records: Vec<LiveRecord>,
}

/// The `<League>_live` directory of one league
#[derive(Debug, Clone)]
pub struct SnapshotDirectory {
    league: League,
    root: PathBuf,
}

impl SnapshotDirectory {
    pub fn new(results_dir: &Path, league: League) -> Self {
        Self {
            league,
            root: results_dir.join(league.live_dir_name()),
        }
    }

    /// Non-empty snapshot files, oldest first. A missing directory has none.
    pub fn list(&self) -> Result<Vec<(NaiveDateTime, PathBuf)>, LiveDataError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LiveDataError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut files: Vec<(NaiveDateTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.metadata().is_ok_and(|meta| meta.is_file() && meta.len() > 0))
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .filter_map(|path| parse_snapshot_time(&path).map(|taken_at| (taken_at, path)))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Loads every snapshot taken less than `retention` before the newest one.
    ///
    /// Unreadable files are skipped with a warning. The result is
    /// [`LiveDataError::NoData`] when nothing usable exists and
    /// [`LiveDataError::Malformed`] when every candidate failed to parse.
    pub fn load_window(&self, retention: TimeDelta) -> Result<Vec<Snapshot>, LiveDataError> {
        let files = self.list()?;
        let Some(&(latest, _)) = files.last() else {
            return Err(LiveDataError::NoData { league: self.league });
        };

        let mut snapshots = Vec::new();
        let mut first_failure = None;
        for (taken_at, path) in files.into_iter().filter(|(taken_at, _)| latest - *taken_at < retention) {
            match read_snapshot(&path) {
                Ok(records) if records.is_empty() => {}
                Ok(records) => snapshots.push(Snapshot {
                    taken_at,
                    path,
                    records,
                }),
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    first_failure.get_or_insert((path, e));
                }
            }
        }

        match (snapshots.is_empty(), first_failure) {
            (false, _) => Ok(snapshots),
            (true, Some((path, source))) => Err(LiveDataError::Malformed { path, source }),
            (true, None) => Err(LiveDataError::NoData { league: self.league }),
        }
    }
}

pub fn read_snapshot(path: &Path) -> Result<Vec<LiveRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    reader.deserialize().collect()
}
