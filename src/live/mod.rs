//! Live tournament views assembled from periodic snapshot exports.
//!
//! Snapshots land in `<results_dir>/<League>_live/YYYY-MM-DD__HH_MM.csv`
//! while a tournament is running. Every view is built from the snapshots of
//! one retention window, with moderated players removed and verified names
//! substituted.

pub mod analysis;
pub mod snapshot;
pub mod table;

use std::collections::HashSet;
use std::time::Instant;

use chrono::{NaiveDateTime, Utc};
use log::{debug, warn};

use crate::config::{League, LiveSettings};
use crate::database::{self, get_connection, DbPool};
use crate::errors::LiveDataError;
use crate::services::moderation::ModerationLookup;

pub use analysis::{analyze_wave_placement, bracket_stats, fill_progress, BracketStats, FillPoint, PlacementReport};
pub use snapshot::{parse_snapshot_time, LiveRecord, Snapshot, SnapshotDirectory};
pub use table::{BracketSummary, LiveRow, LiveTable};

/// Full-bracket rows ready for placement analysis
#[derive(Debug, Clone)]
pub struct PlacementTable {
    pub table: LiveTable,
    pub latest: NaiveDateTime,
}

pub struct LiveAggregator<M> {
    pool: DbPool,
    moderation: M,
    settings: LiveSettings,
}

impl<M: ModerationLookup> LiveAggregator<M> {
    pub fn new(pool: DbPool, moderation: M, settings: LiveSettings) -> Self {
        Self {
            pool,
            moderation,
            settings,
        }
    }

    /// Merged window for a league. Sus and banned players are always
    /// dropped; shunned players only unless `include_shun` is set.
    pub fn live_view(&self, league: League, include_shun: bool) -> Result<LiveTable, LiveDataError> {
        let started = Instant::now();
        let snapshots = SnapshotDirectory::new(&self.settings.results_dir, league).load_window(self.settings.retention)?;

        let mut hidden = self.moderation.excluded_ids()?;
        if !include_shun {
            hidden.extend(self.moderation.shunned_ids()?);
        }
        let names = {
            let conn = get_connection(&self.pool)?;
            database::players::verified_names(&conn)?
        };

        let table = LiveTable::from_snapshots(&snapshots, &hidden, &names);
        debug!("live_view({}) took {:?}", league, started.elapsed());
        if table.is_empty() {
            return Err(LiveDataError::NoData { league });
        }
        Ok(table)
    }

    /// Every sample of the league's current top players
    pub fn top_progress(&self, league: League, include_shun: bool) -> Result<LiveTable, LiveDataError> {
        Ok(self.live_view(league, include_shun)?.top_players(self.settings.top_players))
    }

    /// Rows of the newest snapshot, highest wave first
    pub fn latest_standings(&self, league: League, include_shun: bool) -> Result<Vec<LiveRow>, LiveDataError> {
        let view = self.live_view(league, include_shun)?;
        Ok(view.latest_rows().into_iter().cloned().collect())
    }

    pub fn placement_table(&self, league: League, include_shun: bool) -> Result<PlacementTable, LiveDataError> {
        let table = self
            .live_view(league, include_shun)?
            .full_brackets_only(self.settings.full_bracket_threshold);
        let latest = table.latest_time().ok_or(LiveDataError::NoData { league })?;
        Ok(PlacementTable { table, latest })
    }

    /// Where `wave` would place in each full bracket right now
    pub fn placement(&self, league: League, wave: i32, include_shun: bool) -> Result<Vec<PlacementReport>, LiveDataError> {
        let PlacementTable { table, latest } = self.placement_table(league, include_shun)?;
        Ok(analyze_wave_placement(&table, wave, latest))
    }

    /// Fill-up of the running tournament measured against the players of the
    /// league's last public tournament (Champion when the league has none).
    /// `None` when no reference tournament exists.
    pub fn fill_progress(&self, league: League) -> Result<Option<Vec<FillPoint>>, LiveDataError> {
        let view = self.live_view(league, false)?;
        let first_moment = view
            .top_players(self.settings.top_players)
            .first_time()
            .ok_or(LiveDataError::NoData { league })?;

        let conn = get_connection(&self.pool)?;
        let reference = match database::tournaments::latest_public(&conn, league)? {
            Some(tournament) => Some(tournament),
            None => database::tournaments::latest_public(&conn, League::Champion)?,
        };
        let Some(reference) = reference else {
            warn!("No reference tournament available for {} fill progress", league);
            return Ok(None);
        };

        let reference_ids: HashSet<String> = database::rows::player_ids(&conn, reference.id)?.into_iter().collect();
        Ok(Some(fill_progress(&view, &reference_ids, first_moment)))
    }

    /// Statistics over the full brackets of the newest snapshot
    pub fn bracket_stats(&self, league: League, include_shun: bool) -> Result<Option<BracketStats>, LiveDataError> {
        let PlacementTable { table, .. } = self.placement_table(league, include_shun)?;
        Ok(bracket_stats(&table.latest_rows()))
    }

    /// Whether the player shows up in a full bracket of the league's newest
    /// snapshot. Missing or stale data answers `false`.
    pub fn check_live_entry(&self, league: League, player_id: &str) -> Result<bool, LiveDataError> {
        self.check_live_entry_at(league, player_id, Utc::now().naive_utc())
    }

    pub fn check_live_entry_at(&self, league: League, player_id: &str, now: NaiveDateTime) -> Result<bool, LiveDataError> {
        let started = Instant::now();
        let view = match self.live_view(league, true) {
            Ok(view) => view,
            Err(e) if e.is_no_data() => return Ok(false),
            Err(e) => return Err(e),
        };

        let Some(latest) = view.latest_time() else {
            return Ok(false);
        };
        if now - latest > self.settings.staleness_cutoff {
            debug!("Live data for {} is stale (latest snapshot {})", league, latest);
            return Ok(false);
        }

        let full = view.bracket_summary(self.settings.full_bracket_threshold).full;
        let found = view
            .rows_at(latest)
            .any(|row| row.player_id == player_id && full.contains(&row.bracket));

        debug!(
            "check_live_entry({}, {}) took {:?}",
            league,
            player_id,
            started.elapsed()
        );
        Ok(found)
    }

    /// Whether the player has entered the running tournament of any league.
    /// Leagues whose data cannot be read are skipped with a warning.
    pub fn check_any_live_entry(&self, player_id: &str) -> bool {
        self.check_any_live_entry_at(player_id, Utc::now().naive_utc())
    }

    pub fn check_any_live_entry_at(&self, player_id: &str, now: NaiveDateTime) -> bool {
        League::ALL.iter().any(|league| match self.check_live_entry_at(*league, player_id, now) {
            Ok(found) => found,
            Err(e) => {
                warn!("Skipping {} live entry check: {}", league, e);
                false
            }
        })
    }
}
