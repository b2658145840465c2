use std::thread;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::watch;

use crate::config::settings::QueueSettings;
use crate::database::{self, get_connection, DbPool, RowStore, Tournament};
use crate::ranking::{compute_positions, count_changes};
use crate::services::moderation::ModerationLookup;

/// Recomputes the positions of one tournament and returns how many rows changed.
/// With `dry_run` nothing is written.
pub fn reposition<S, M>(store: &S, moderation: &M, tournament_id: i64, dry_run: bool, verbose: bool) -> Result<usize>
where
    S: RowStore + ?Sized,
    M: ModerationLookup + ?Sized,
{
    let rows = store.fetch_rows_ordered_by_wave_desc(tournament_id)?;
    let excluded = moderation.excluded_ids()?;

    let entries: Vec<(&str, i32)> = rows.iter().map(|row| (row.player_id.as_str(), row.wave)).collect();
    let positions = compute_positions(&entries, &excluded);
    let current: Vec<i32> = rows.iter().map(|row| row.position).collect();

    if verbose {
        for (row, position) in rows.iter().zip(&positions).filter(|(row, new)| row.position != **new) {
            info!(
                "Player {} ({}) at wave {}: position changing from {} to {}",
                row.player_id, row.nickname, row.wave, row.position, position
            );
        }
    }

    let changes = count_changes(&current, &positions);
    if !dry_run && changes > 0 {
        store.bulk_update_positions(tournament_id, &positions)?;
    }

    if changes > 0 {
        info!("Repositioned {} rows in tournament {}", changes, tournament_id);
    }
    Ok(changes)
}

/// What a single claim-and-process step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Empty,
    Recalculated { tournament_id: i64, changes: usize },
    Failed { tournament_id: i64, attempts: u32, exhausted: bool },
}

impl ProcessOutcome {
    pub fn processed(&self) -> bool {
        !matches!(self, ProcessOutcome::Empty)
    }
}

/// Drains the recalculation queue one tournament at a time
pub struct RecalculationWorker<S, M> {
    pool: DbPool,
    store: S,
    moderation: M,
    settings: QueueSettings,
}

impl<S: RowStore, M: ModerationLookup> RecalculationWorker<S, M> {
    pub fn new(pool: DbPool, store: S, moderation: M, settings: QueueSettings) -> Self {
        Self {
            pool,
            store,
            moderation,
            settings,
        }
    }

    /// Claims the next pending tournament and recomputes it.
    ///
    /// A failed recomputation is recorded on the tournament and reported as
    /// [`ProcessOutcome::Failed`]. Queue updates after the claim are retried
    /// with `error_backoff` between attempts; `Err` means they never went through.
    pub fn process_next(&self) -> Result<ProcessOutcome> {
        let Some(tournament) = self.claim()? else {
            return Ok(ProcessOutcome::Empty);
        };

        info!(
            "Processing tournament {} ({} {})",
            tournament.id, tournament.league, tournament.date
        );

        match reposition(&self.store, &self.moderation, tournament.id, false, false) {
            Ok(changes) => {
                self.update_queue(tournament.id, |conn| {
                    database::queue::mark_completed(conn, tournament.id, Utc::now().naive_utc())
                })?;
                info!("Recalculated tournament {}: {} changes", tournament.id, changes);
                Ok(ProcessOutcome::Recalculated {
                    tournament_id: tournament.id,
                    changes,
                })
            }
            Err(e) => self.record_failure(&tournament, e),
        }
    }

    /// One-shot mode: processes at most one tournament
    pub fn run_once(&self) -> Result<bool> {
        Ok(self.process_next()?.processed())
    }

    /// Processes tournaments until `shutdown` turns true (or its sender is
    /// dropped). Returns the number of tournaments handled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<usize> {
        info!(
            "Starting tournament recalculation worker (max_retries={}, delay={:?})",
            self.settings.max_retries, self.settings.poll_delay
        );

        let mut handled = 0;
        while !*shutdown.borrow() {
            let pause = match self.process_next() {
                Ok(ProcessOutcome::Empty) => Some(self.settings.poll_delay),
                Ok(_) => {
                    handled += 1;
                    None
                }
                Err(e) => {
                    error!("Worker error: {:#}", e);
                    Some(self.settings.error_backoff)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!("Shutting down worker after {} tournaments", handled);
        Ok(handled)
    }

    fn claim(&self) -> Result<Option<Tournament>> {
        let mut conn = get_connection(&self.pool)?;
        database::queue::claim_next(&mut conn, self.settings.max_retries, &self.settings.priorities)
    }

    fn record_failure(&self, tournament: &Tournament, cause: anyhow::Error) -> Result<ProcessOutcome> {
        let attempts = self.update_queue(tournament.id, |conn| {
            database::queue::mark_failed(conn, tournament.id, Utc::now().naive_utc())
        })?;
        let exhausted = attempts >= self.settings.max_retries;

        error!(
            "Failed to recalculate tournament {} (attempt {}/{}): {:#}",
            tournament.id, attempts, self.settings.max_retries, cause
        );
        if exhausted {
            warn!(
                "Tournament {} exceeded max retries and will not be retried automatically",
                tournament.id
            );
        }

        Ok(ProcessOutcome::Failed {
            tournament_id: tournament.id,
            attempts,
            exhausted,
        })
    }

    /// Runs a queue update for a claimed tournament, retrying while the
    /// database is busy. Giving up would leave the tournament claimed but
    /// never recalculated.
    fn update_queue<T>(&self, tournament_id: i64, update: impl Fn(&Connection) -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match get_connection(&self.pool).and_then(|conn| update(&conn)) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.settings.bookkeeping_attempts => {
                    warn!(
                        "Queue update for tournament {} failed (attempt {}/{}): {:#}",
                        tournament_id, attempt, self.settings.bookkeeping_attempts, e
                    );
                    thread::sleep(self.settings.error_backoff);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Tournament {} was claimed but its queue state could not be saved", tournament_id)
                    });
                }
            }
        }
    }
}
