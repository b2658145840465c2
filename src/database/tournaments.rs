use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::models::Tournament;
use crate::config::League;

pub(crate) const TOURNAMENT_COLUMNS: &str = "id, league, date, public, source_file, needs_recalc, recalc_retry_count, last_recalc_at, last_failed_at, created_at";

pub fn insert_tournament(
    conn: &Connection,
    league: League,
    date: NaiveDate,
    public: bool,
    source_file: Option<&str>,
) -> Result<Tournament> {
    let sql = format!(
        "INSERT INTO tournaments (league, date, public, source_file) VALUES (?1, ?2, ?3, ?4) RETURNING {}",
        TOURNAMENT_COLUMNS
    );

    conn.query_row(&sql, params![league, date, public, source_file], parse_tournament_row)
        .context("Failed to insert new tournament")
}

pub(crate) fn parse_tournament_row(row: &rusqlite::Row) -> rusqlite::Result<Tournament> {
    Ok(Tournament {
        id: row.get(0)?,
        league: row.get(1)?,
        date: row.get(2)?,
        public: row.get(3)?,
        source_file: row.get(4)?,
        needs_recalc: row.get(5)?,
        recalc_retry_count: row.get(6)?,
        last_recalc_at: row.get(7)?,
        last_failed_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Tournament>> {
    let sql = format!("SELECT {} FROM tournaments WHERE id = ?1", TOURNAMENT_COLUMNS);

    conn.query_row(&sql, params![id], parse_tournament_row)
        .optional()
        .context("Failed to query tournament by id")
}

pub fn find_by_source_file(conn: &Connection, source_file: &str) -> Result<Option<Tournament>> {
    let sql = format!("SELECT {} FROM tournaments WHERE source_file = ?1", TOURNAMENT_COLUMNS);

    conn.query_row(&sql, params![source_file], parse_tournament_row)
        .optional()
        .context("Failed to query tournament by source file")
}

/// Most recent public tournament of a league
pub fn latest_public(conn: &Connection, league: League) -> Result<Option<Tournament>> {
    let sql = format!(
        "SELECT {} FROM tournaments WHERE league = ?1 AND public = 1 ORDER BY date DESC, id DESC LIMIT 1",
        TOURNAMENT_COLUMNS
    );

    conn.query_row(&sql, params![league], parse_tournament_row)
        .optional()
        .context("Failed to query latest public tournament")
}

pub fn list_by_league(conn: &Connection, league: League) -> Result<Vec<Tournament>> {
    let sql = format!(
        "SELECT {} FROM tournaments WHERE league = ?1 ORDER BY date DESC, id DESC",
        TOURNAMENT_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![league], parse_tournament_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}
