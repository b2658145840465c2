use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, TransactionBehavior};

use super::connection::{get_connection, DbPool};
use super::models::{NewRow, RankedRow, TourneyRow};
use crate::errors::tournament_context;

/// Storage of ranked tournament rows as needed by import and recalculation.
///
/// `bulk_update_positions` writes back by index: `positions[i]` belongs to the
/// i-th row returned by the preceding `fetch_rows_ordered_by_wave_desc` call.
pub trait RowStore {
    /// Inserts rows for a tournament. Calling it twice duplicates the rows.
    fn create_rows(&self, tournament_id: i64, rows: &[NewRow]) -> Result<()>;

    fn fetch_rows_ordered_by_wave_desc(&self, tournament_id: i64) -> Result<Vec<RankedRow>>;

    /// Returns how many rows actually changed position
    fn bulk_update_positions(&self, tournament_id: i64, positions: &[i32]) -> Result<usize>;
}

#[derive(Clone)]
pub struct SqliteRowStore {
    pool: DbPool,
}

impl SqliteRowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl RowStore for SqliteRowStore {
    fn create_rows(&self, tournament_id: i64, rows: &[NewRow]) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        let tx = conn.transaction()?;
        insert_rows(&tx, tournament_id, rows)?;
        tx.commit()
            .with_context(|| tournament_context("commit rows", tournament_id))
    }

    fn fetch_rows_ordered_by_wave_desc(&self, tournament_id: i64) -> Result<Vec<RankedRow>> {
        let conn = get_connection(&self.pool)?;
        fetch_ranked(&conn, tournament_id)
    }

    fn bulk_update_positions(&self, tournament_id: i64, positions: &[i32]) -> Result<usize> {
        let mut conn = get_connection(&self.pool)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = update_positions(&tx, tournament_id, positions)?;
        tx.commit()
            .with_context(|| tournament_context("commit positions", tournament_id))?;
        Ok(changed)
    }
}

pub fn insert_rows(conn: &Connection, tournament_id: i64, rows: &[NewRow]) -> Result<()> {
    let sql = "INSERT INTO tourney_rows (tournament_id, player_id, nickname, wave, position, avatar_id, relic_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

    let mut stmt = conn.prepare(sql)?;
    for row in rows {
        stmt.execute(params![
            tournament_id,
            row.player_id,
            row.nickname,
            row.wave,
            row.position,
            row.avatar_id,
            row.relic_id
        ])
        .with_context(|| tournament_context("insert row", tournament_id))?;
    }

    Ok(())
}

// Row id breaks wave ties so that fetch and write-back see the same order.
const RANKED_ORDER: &str = "ORDER BY wave DESC, id ASC";

pub fn fetch_ranked(conn: &Connection, tournament_id: i64) -> Result<Vec<RankedRow>> {
    let sql = format!(
        "SELECT player_id, nickname, wave, position FROM tourney_rows WHERE tournament_id = ?1 {}",
        RANKED_ORDER
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![tournament_id], |row| {
            Ok(RankedRow {
                player_id: row.get(0)?,
                nickname: row.get(1)?,
                wave: row.get(2)?,
                position: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| tournament_context("fetch ranked rows", tournament_id))?;

    Ok(rows)
}

fn update_positions(conn: &Connection, tournament_id: i64, positions: &[i32]) -> Result<usize> {
    let sql = format!("SELECT id FROM tourney_rows WHERE tournament_id = ?1 {}", RANKED_ORDER);
    let ids = conn
        .prepare(&sql)?
        .query_map(params![tournament_id], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if ids.len() != positions.len() {
        bail!(
            "Tournament {} has {} rows but {} positions were computed",
            tournament_id,
            ids.len(),
            positions.len()
        );
    }

    let mut stmt = conn.prepare("UPDATE tourney_rows SET position = ?1 WHERE id = ?2 AND position != ?1")?;
    let mut changed = 0;
    for (id, position) in ids.iter().zip(positions) {
        changed += stmt
            .execute(params![position, id])
            .with_context(|| tournament_context("update position", tournament_id))?;
    }

    Ok(changed)
}

pub fn list_by_tournament(conn: &Connection, tournament_id: i64) -> Result<Vec<TourneyRow>> {
    let sql = "SELECT id, tournament_id, player_id, nickname, wave, position, avatar_id, relic_id FROM tourney_rows WHERE tournament_id = ?1 ORDER BY wave DESC, id ASC";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![tournament_id], parse_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

fn parse_row(row: &rusqlite::Row) -> rusqlite::Result<TourneyRow> {
    Ok(TourneyRow {
        id: row.get(0)?,
        tournament_id: row.get(1)?,
        player_id: row.get(2)?,
        nickname: row.get(3)?,
        wave: row.get(4)?,
        position: row.get(5)?,
        avatar_id: row.get(6)?,
        relic_id: row.get(7)?,
    })
}

/// Distinct player ids of a tournament, best result first
pub fn player_ids(conn: &Connection, tournament_id: i64) -> Result<Vec<String>> {
    let sql = "SELECT player_id FROM tourney_rows WHERE tournament_id = ?1 GROUP BY player_id ORDER BY MAX(wave) DESC, MIN(id) ASC";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![tournament_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    Ok(rows)
}
