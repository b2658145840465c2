use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use log::{error, info, warn};
use regex::Regex;

use crate::config::League;
use crate::database::{self, get_connection, DbPool, NewRow, Tournament};
use crate::errors::{file_context, ImportError};
use crate::ranking::compute_positions;
use crate::services::moderation::ModerationLookup;

const RESULT_FILE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Extracts cosmetics packed into raw export names like `Name#avatar=12$$$$$relic=5`
pub struct CosmeticsParser {
    avatar_regex: Regex,
    relic_regex: Regex,
}

impl CosmeticsParser {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            avatar_regex: Regex::new(r"#avatar=([-\d]+)\${5}").context("Failed to compile avatar regex")?,
            relic_regex: Regex::new(r"#avatar=\d+\${5}relic=([-\d]+)").context("Failed to compile relic regex")?,
        })
    }

    /// Returns (name, avatar id, relic id); missing cosmetics are -1
    pub fn split(&self, raw: &str) -> (String, i32, i32) {
        let name = raw.split('#').next().unwrap_or_default().to_string();
        (name, Self::capture(&self.avatar_regex, raw), Self::capture(&self.relic_regex, raw))
    }

    fn capture(regex: &Regex, raw: &str) -> i32 {
        regex
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(-1)
    }
}

/// Reads a results export in either supported layout.
///
/// Headerless files are `player_id,name,wave` with cosmetics packed into the
/// name; headered files name their columns and may carry `avatar`/`relic`.
pub fn parse_results_file(path: &Path) -> Result<Vec<NewRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ImportError::csv(path, e))?;

    let mut records = reader.records();
    let Some(first) = records.next() else {
        return Ok(Vec::new());
    };
    let first = first.map_err(|e| ImportError::csv(path, e))?;

    if first.get(0) == Some("player_id") {
        let columns: HashMap<&str, usize> = first.iter().enumerate().map(|(idx, name)| (name, idx)).collect();
        let column = |name: &str| {
            columns
                .get(name)
                .copied()
                .ok_or_else(|| ImportError::layout(path, format!("missing column {:?}", name)))
        };
        let (id_col, name_col, wave_col) = (column("player_id")?, column("name")?, column("wave")?);
        let avatar_col = columns.get("avatar").copied();
        let relic_col = columns.get("relic").copied();

        records
            .map(|record| {
                let record = record.map_err(|e| ImportError::csv(path, e))?;
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                let player_id = field(&record, id_col, path)?;
                let mut row = NewRow::new(player_id, field(&record, name_col, path)?, parse_wave(&record, wave_col, path, line)?);
                if row.nickname.is_empty() {
                    row.nickname = row.player_id.clone();
                }
                row.avatar_id = optional_int(&record, avatar_col);
                row.relic_id = optional_int(&record, relic_col);
                Ok(row)
            })
            .collect()
    } else {
        let cosmetics = CosmeticsParser::new()?;
        std::iter::once(Ok(first))
            .chain(records)
            .map(|record| {
                let record = record.map_err(|e| ImportError::csv(path, e))?;
                if record.len() < 3 {
                    return Err(ImportError::layout(path, format!("expected 3 columns, found {}", record.len())));
                }
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                let player_id = field(&record, 0, path)?;
                let (mut nickname, avatar_id, relic_id) = cosmetics.split(field(&record, 1, path)?);
                if nickname.is_empty() {
                    nickname = player_id.to_string();
                }
                Ok(NewRow {
                    avatar_id,
                    relic_id,
                    ..NewRow::new(player_id, nickname, parse_wave(&record, 2, path, line)?)
                })
            })
            .collect()
    }
}

fn field<'r>(record: &'r csv::StringRecord, idx: usize, path: &Path) -> Result<&'r str, ImportError> {
    record
        .get(idx)
        .ok_or_else(|| ImportError::layout(path, format!("missing field {}", idx + 1)))
}

fn parse_wave(record: &csv::StringRecord, idx: usize, path: &Path, line: u64) -> Result<i32, ImportError> {
    let raw = field(record, idx, path)?;
    // Some exports write waves as floats ("123.0")
    raw.parse::<i32>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|w| w.fract() == 0.0 && (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(w))
                .map(|w| w as i32)
        })
        .ok_or_else(|| ImportError::InvalidWave {
            path: path.to_path_buf(),
            line,
            value: raw.to_string(),
        })
}

fn optional_int(record: &csv::StringRecord, idx: Option<usize>) -> i32 {
    idx.and_then(|idx| record.get(idx))
        .and_then(|value| value.parse().ok())
        .unwrap_or(-1)
}

/// Orders rows by wave descending (stable) and assigns initial positions
pub fn rank_rows(rows: &mut [NewRow], moderation: &impl ModerationLookup) -> anyhow::Result<()> {
    rows.sort_by(|a, b| b.wave.cmp(&a.wave));
    let excluded = moderation.excluded_ids()?;
    let entries: Vec<(&str, i32)> = rows.iter().map(|row| (row.player_id.as_str(), row.wave)).collect();
    let positions = compute_positions(&entries, &excluded);
    for (row, position) in rows.iter_mut().zip(positions) {
        row.position = position;
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct DirectoryImport {
    pub imported: Vec<Tournament>,
    pub skipped_existing: usize,
    pub empty: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct ImportService<M> {
    pool: DbPool,
    moderation: M,
}

impl<M: ModerationLookup> ImportService<M> {
    pub fn new(pool: DbPool, moderation: M) -> Self {
        Self { pool, moderation }
    }

    /// Creates a tournament with ranked rows from one export.
    /// Returns `None` for an empty file; nothing is written then.
    pub fn import_file(
        &self,
        path: &Path,
        league: League,
        date: NaiveDate,
        public: bool,
    ) -> Result<Option<Tournament>, ImportError> {
        let mut rows = parse_results_file(path)?;
        if rows.is_empty() {
            error!("Empty csv file: {}", path.display());
            return Ok(None);
        }

        let blank_names = rows.iter().filter(|row| row.nickname == row.player_id).count();
        if blank_names > 0 {
            info!("There are {} blank tourney names in {}", blank_names, path.display());
        }

        rank_rows(&mut rows, &self.moderation)?;

        let mut conn = get_connection(&self.pool)?;
        let tx = conn.transaction().context("Failed to start import transaction")?;
        let source = path.to_string_lossy();
        let tournament = database::tournaments::insert_tournament(&tx, league, date, public, Some(source.as_ref()))?;
        database::rows::insert_rows(&tx, tournament.id, &rows)?;
        tx.commit().with_context(|| file_context("commit import of", path))?;

        info!(
            "Imported {} rows into tournament {} ({} {})",
            rows.len(),
            tournament.id,
            league,
            date
        );
        Ok(Some(tournament))
    }

    /// Imports every `YYYY-MM-DD.csv` in a directory that has not been imported yet.
    /// Malformed files are logged and skipped so a later run can retry them.
    pub fn import_directory(&self, dir: &Path, league: League, public: bool) -> anyhow::Result<DirectoryImport> {
        let mut files: Vec<(NaiveDate, PathBuf)> = fs::read_dir(dir)
            .with_context(|| file_context("list", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .filter_map(|path| result_file_date(&path).map(|date| (date, path)))
            .collect();
        files.sort();

        let mut summary = DirectoryImport::default();
        for (date, path) in files {
            let conn = get_connection(&self.pool)?;
            let existing = database::tournaments::find_by_source_file(&conn, &path.to_string_lossy())?;
            drop(conn);
            if existing.is_some() {
                summary.skipped_existing += 1;
                continue;
            }

            match self.import_file(&path, league, date, public) {
                Ok(Some(tournament)) => summary.imported.push(tournament),
                Ok(None) => summary.empty.push(path),
                Err(ImportError::Store(e)) => return Err(e),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    summary.failed.push((path, e.to_string()));
                }
            }
        }

        Ok(summary)
    }
}

/// Tournament date encoded in an export file name (`2024-05-01.csv`)
pub fn result_file_date(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, RESULT_FILE_DATE_FORMAT).ok()
}
