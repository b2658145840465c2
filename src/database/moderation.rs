use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use itertools::Itertools;
use rusqlite::{params, params_from_iter, Connection};

use super::models::ModerationRecord;

pub fn insert_record(conn: &Connection, player_id: &str, kind: &str, reason: Option<&str>) -> Result<ModerationRecord> {
    let sql = "INSERT INTO moderation_records (player_id, kind, reason) VALUES (?1, ?2, ?3) RETURNING id, player_id, kind, reason, created_at, resolved_at";

    conn.query_row(sql, params![player_id, kind, reason], parse_record_row)
        .context("Failed to insert moderation record")
}

fn parse_record_row(row: &rusqlite::Row) -> rusqlite::Result<ModerationRecord> {
    Ok(ModerationRecord {
        id: row.get(0)?,
        player_id: row.get(1)?,
        kind: row.get(2)?,
        reason: row.get(3)?,
        created_at: row.get(4)?,
        resolved_at: row.get(5)?,
    })
}

/// Resolves every active record of `kind` for the player
pub fn resolve_active(conn: &Connection, player_id: &str, kind: &str, now: NaiveDateTime) -> Result<usize> {
    let sql = "UPDATE moderation_records SET resolved_at = ?1 WHERE player_id = ?2 AND kind = ?3 AND resolved_at IS NULL";

    conn.execute(sql, params![now, player_id, kind])
        .context("Failed to resolve moderation records")
}

pub fn active_kinds(conn: &Connection, player_id: &str) -> Result<HashSet<String>> {
    let sql = "SELECT DISTINCT kind FROM moderation_records WHERE player_id = ?1 AND resolved_at IS NULL";

    let mut stmt = conn.prepare(sql)?;
    let kinds = stmt
        .query_map(params![player_id], |row| row.get(0))?
        .collect::<rusqlite::Result<HashSet<String>>>()
        .context("Failed to query active moderation kinds")?;

    Ok(kinds)
}

/// Player ids with an active record of any of the given kinds
pub fn active_player_ids(conn: &Connection, kinds: &[&str]) -> Result<HashSet<String>> {
    if kinds.is_empty() {
        return Ok(HashSet::new());
    }

    let placeholders = kinds.iter().map(|_| "?").join(", ");
    let sql = format!(
        "SELECT DISTINCT player_id FROM moderation_records WHERE resolved_at IS NULL AND kind IN ({})",
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(kinds), |row| row.get(0))?
        .collect::<rusqlite::Result<HashSet<String>>>()
        .context("Failed to query moderated player ids")?;

    Ok(ids)
}
