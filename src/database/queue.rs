//! Recalculation queue kept as columns on `tournaments`.
//!
//! A tournament is PENDING while `needs_recalc` is set and its retry counter is
//! below the configured maximum, EXHAUSTED once the counter reaches it, and
//! CLEAN otherwise. Claiming flips `needs_recalc` off under the database write
//! lock, so no two workers can ever claim the same tournament.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeDelta};
use itertools::Itertools;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};

use super::models::{LeagueCount, QueueStatus, Tournament};
use super::tournaments::{parse_tournament_row, TOURNAMENT_COLUMNS};
use crate::config::{League, LeaguePriorities};
use crate::errors::tournament_context;

const NEXT_UP_LIMIT: usize = 5;
const EXHAUSTED_LIST_LIMIT: usize = 10;

/// League priority first, newest date first within a league, id as tie-break
fn priority_order(priorities: &LeaguePriorities) -> String {
    let ranks = League::ALL
        .iter()
        .map(|league| format!("WHEN '{}' THEN {}", league, priorities.rank(*league)))
        .join(" ");
    format!("ORDER BY CASE league {} ELSE {} END, date DESC, id ASC", ranks, u32::MAX)
}

/// Flags every tournament containing the player and resets its retry counter.
/// This is the hook for moderation changes.
pub fn enqueue_player(conn: &Connection, player_id: &str) -> Result<usize> {
    let sql = "UPDATE tournaments SET needs_recalc = 1, recalc_retry_count = 0 WHERE id IN (SELECT DISTINCT tournament_id FROM tourney_rows WHERE player_id = ?1)";

    conn.execute(sql, params![player_id])
        .with_context(|| format!("Failed to enqueue tournaments of player {}", player_id))
}

pub fn enqueue_tournaments(conn: &Connection, ids: &[i64]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = ids.iter().map(|_| "?").join(", ");
    let sql = format!(
        "UPDATE tournaments SET needs_recalc = 1, recalc_retry_count = 0 WHERE id IN ({})",
        placeholders
    );

    conn.execute(&sql, params_from_iter(ids))
        .context("Failed to enqueue tournaments")
}

/// Tournaments that may still be claimed, in processing order
pub fn list_pending(conn: &Connection, max_retries: u32, priorities: &LeaguePriorities) -> Result<Vec<Tournament>> {
    select_pending(conn, max_retries, priorities, None)
}

fn select_pending(
    conn: &Connection,
    max_retries: u32,
    priorities: &LeaguePriorities,
    limit: Option<usize>,
) -> Result<Vec<Tournament>> {
    let sql = format!(
        "SELECT {} FROM tournaments WHERE needs_recalc = 1 AND recalc_retry_count < ?1 {} LIMIT ?2",
        TOURNAMENT_COLUMNS,
        priority_order(priorities)
    );
    // SQLite reads a negative limit as "no limit"
    let limit = limit.map_or(-1, |n| n as i64);

    let mut stmt = conn.prepare(&sql)?;
    let pending = stmt
        .query_map(params![max_retries, limit], parse_tournament_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list pending tournaments")?;

    Ok(pending)
}

pub fn list_exhausted(conn: &Connection, max_retries: u32) -> Result<Vec<Tournament>> {
    let sql = format!(
        "SELECT {} FROM tournaments WHERE needs_recalc = 1 AND recalc_retry_count >= ?1 ORDER BY recalc_retry_count DESC, date ASC, id ASC",
        TOURNAMENT_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![max_retries], parse_tournament_row)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list exhausted tournaments")?;

    Ok(rows)
}

/// Claims the highest-priority pending tournament.
///
/// Runs in an IMMEDIATE transaction, which takes SQLite's write lock before
/// the candidate is read; the lock is released on commit, before any
/// recalculation work starts.
pub fn claim_next(
    conn: &mut Connection,
    max_retries: u32,
    priorities: &LeaguePriorities,
) -> Result<Option<Tournament>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to acquire queue lock")?;

    let Some(mut tournament) = select_pending(&tx, max_retries, priorities, Some(1))?.into_iter().next() else {
        return Ok(None);
    };

    let claimed = tx
        .execute(
            "UPDATE tournaments SET needs_recalc = 0 WHERE id = ?1 AND needs_recalc = 1",
            params![tournament.id],
        )
        .with_context(|| tournament_context("claim", tournament.id))?;
    tx.commit().context("Failed to release queue lock")?;

    if claimed == 0 {
        return Ok(None);
    }

    tournament.needs_recalc = false;
    Ok(Some(tournament))
}

pub fn mark_completed(conn: &Connection, tournament_id: i64, now: NaiveDateTime) -> Result<()> {
    conn.execute(
        "UPDATE tournaments SET last_recalc_at = ?1, recalc_retry_count = 0 WHERE id = ?2",
        params![now, tournament_id],
    )
    .with_context(|| tournament_context("mark completed", tournament_id))?;
    Ok(())
}

/// Puts the tournament back in the queue and returns its new retry count
pub fn mark_failed(conn: &Connection, tournament_id: i64, now: NaiveDateTime) -> Result<u32> {
    conn.query_row(
        "UPDATE tournaments SET needs_recalc = 1, recalc_retry_count = recalc_retry_count + 1, last_failed_at = ?1 WHERE id = ?2 RETURNING recalc_retry_count",
        params![now, tournament_id],
        |row| row.get(0),
    )
    .with_context(|| tournament_context("mark failed", tournament_id))
}

/// Operator reset: one tournament, or every exhausted one when `tournament_id` is None
pub fn reset_retries(conn: &Connection, tournament_id: Option<i64>, max_retries: u32) -> Result<usize> {
    let updated = match tournament_id {
        Some(id) => conn.execute(
            "UPDATE tournaments SET needs_recalc = 1, recalc_retry_count = 0 WHERE id = ?1",
            params![id],
        ),
        None => conn.execute(
            "UPDATE tournaments SET needs_recalc = 1, recalc_retry_count = 0 WHERE recalc_retry_count >= ?1",
            params![max_retries],
        ),
    };
    updated.context("Failed to reset retry counters")
}

pub fn queue_status(
    conn: &Connection,
    max_retries: u32,
    priorities: &LeaguePriorities,
    now: NaiveDateTime,
) -> Result<QueueStatus> {
    let since = now - TimeDelta::hours(24);
    let count = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<usize> {
        conn.query_row(sql, args, |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .context("Failed to count queue entries")
    };

    let pending = count(
        "SELECT COUNT(*) FROM tournaments WHERE needs_recalc = 1 AND recalc_retry_count < ?1",
        &[&max_retries],
    )?;
    let exhausted = count(
        "SELECT COUNT(*) FROM tournaments WHERE needs_recalc = 1 AND recalc_retry_count >= ?1",
        &[&max_retries],
    )?;
    let processed_last_day = count(
        "SELECT COUNT(*) FROM tournaments WHERE last_recalc_at >= ?1",
        &[&since],
    )?;
    let failed_attempts_last_day = count(
        "SELECT COUNT(*) FROM tournaments WHERE last_failed_at >= ?1",
        &[&since],
    )?;

    let counts = pending_by_league(conn, max_retries)?;
    let pending_by_league = priorities
        .ordered()
        .into_iter()
        .filter_map(|league| counts.get(&league).map(|&count| LeagueCount { league, count }))
        .collect();

    let next_up = select_pending(conn, max_retries, priorities, Some(NEXT_UP_LIMIT))?;
    let exhausted_tournaments = list_exhausted(conn, max_retries)?
        .into_iter()
        .take(EXHAUSTED_LIST_LIMIT)
        .collect();

    Ok(QueueStatus {
        pending,
        exhausted,
        processed_last_day,
        failed_attempts_last_day,
        pending_by_league,
        next_up,
        exhausted_tournaments,
    })
}

fn pending_by_league(conn: &Connection, max_retries: u32) -> Result<HashMap<League, usize>> {
    let sql = "SELECT league, COUNT(*) FROM tournaments WHERE needs_recalc = 1 AND recalc_retry_count < ?1 GROUP BY league";

    let mut stmt = conn.prepare(sql)?;
    let counts = stmt
        .query_map(params![max_retries], |row| {
            Ok((row.get::<_, League>(0)?, row.get::<_, i64>(1)? as usize))
        })?
        .collect::<rusqlite::Result<HashMap<_, _>>>()
        .context("Failed to group pending tournaments by league")?;

    Ok(counts)
}
