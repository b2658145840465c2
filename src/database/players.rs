use std::collections::HashMap;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

/// Records (or renames) the verified real name of a player id
pub fn upsert_known_player(conn: &Connection, player_id: &str, name: &str, approved: bool) -> Result<()> {
    let sql = "INSERT INTO known_players (player_id, name, approved) VALUES (?1, ?2, ?3) ON CONFLICT (player_id) DO UPDATE SET name = excluded.name, approved = excluded.approved";

    conn.execute(sql, params![player_id, name.trim(), approved])
        .context("Failed to upsert known player")?;
    Ok(())
}

/// Approved player id -> real name mapping
pub fn verified_names(conn: &Connection) -> Result<HashMap<String, String>> {
    let sql = "SELECT player_id, name FROM known_players WHERE approved = 1";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<HashMap<String, String>>>()
        .context("Failed to load verified player names")?;

    Ok(rows)
}
