use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use log::info;

use crate::database::{self, get_connection, DbPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModerationKind {
    Sus,
    Ban,
    Shun,
    SoftBan,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown moderation kind: {0:?}")]
pub struct UnknownModerationKind(pub String);

impl ModerationKind {
    /// Kinds whose players are ranked with position -1
    pub const RANKING_EXCLUDED: [ModerationKind; 2] = [ModerationKind::Sus, ModerationKind::Ban];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationKind::Sus => "sus",
            ModerationKind::Ban => "ban",
            ModerationKind::Shun => "shun",
            ModerationKind::SoftBan => "soft_ban",
        }
    }
}

impl fmt::Display for ModerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationKind {
    type Err = UnknownModerationKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sus" => Ok(ModerationKind::Sus),
            "ban" => Ok(ModerationKind::Ban),
            "shun" => Ok(ModerationKind::Shun),
            "soft_ban" | "soft-ban" => Ok(ModerationKind::SoftBan),
            _ => Err(UnknownModerationKind(s.to_string())),
        }
    }
}

/// Read-only view of who is currently hidden from results
pub trait ModerationLookup {
    /// Players ranked with position -1 and dropped from live views
    fn excluded_ids(&self) -> Result<HashSet<String>>;

    /// Players hidden from live views unless shunned players are included
    fn shunned_ids(&self) -> Result<HashSet<String>>;
}

impl<M: ModerationLookup + ?Sized> ModerationLookup for &M {
    fn excluded_ids(&self) -> Result<HashSet<String>> {
        (**self).excluded_ids()
    }

    fn shunned_ids(&self) -> Result<HashSet<String>> {
        (**self).shunned_ids()
    }
}

/// Fixed sets, for callers that already know the moderation state
#[derive(Debug, Clone, Default)]
pub struct StaticModeration {
    pub excluded: HashSet<String>,
    pub shunned: HashSet<String>,
}

impl StaticModeration {
    pub fn excluding<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: ids.into_iter().map(Into::into).collect(),
            shunned: HashSet::new(),
        }
    }
}

impl ModerationLookup for StaticModeration {
    fn excluded_ids(&self) -> Result<HashSet<String>> {
        Ok(self.excluded.clone())
    }

    fn shunned_ids(&self) -> Result<HashSet<String>> {
        Ok(self.shunned.clone())
    }
}

#[derive(Clone)]
pub struct SqliteModeration {
    pool: DbPool,
}

impl SqliteModeration {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl ModerationLookup for SqliteModeration {
    fn excluded_ids(&self) -> Result<HashSet<String>> {
        let conn = get_connection(&self.pool)?;
        let kinds = ModerationKind::RANKING_EXCLUDED.map(|kind| kind.as_str());
        database::moderation::active_player_ids(&conn, &kinds)
    }

    fn shunned_ids(&self) -> Result<HashSet<String>> {
        let conn = get_connection(&self.pool)?;
        database::moderation::active_player_ids(&conn, &[ModerationKind::Shun.as_str()])
    }
}

struct CachedSets {
    loaded_at: Instant,
    excluded: HashSet<String>,
    shunned: HashSet<String>,
}

/// Read-through cache in front of another lookup.
/// Entries expire after `ttl`; writers call [`CachedModeration::invalidate`].
pub struct CachedModeration<M> {
    inner: M,
    ttl: Duration,
    cached: Mutex<Option<CachedSets>>,
}

impl<M: ModerationLookup> CachedModeration<M> {
    pub fn new(inner: M, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cached: Mutex::new(None),
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut cached) = self.cached.lock() {
            *cached = None;
        }
    }

    fn with_sets<T>(&self, read: impl Fn(&CachedSets) -> T) -> Result<T> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| anyhow::anyhow!("Moderation cache lock poisoned"))?;

        let fresh = cached
            .as_ref()
            .is_some_and(|sets| sets.loaded_at.elapsed() < self.ttl);
        if !fresh {
            *cached = Some(CachedSets {
                loaded_at: Instant::now(),
                excluded: self.inner.excluded_ids()?,
                shunned: self.inner.shunned_ids()?,
            });
        }

        match cached.as_ref() {
            Some(sets) => Ok(read(sets)),
            None => anyhow::bail!("Moderation cache is empty after refresh"),
        }
    }
}

impl<M: ModerationLookup> ModerationLookup for CachedModeration<M> {
    fn excluded_ids(&self) -> Result<HashSet<String>> {
        self.with_sets(|sets| sets.excluded.clone())
    }

    fn shunned_ids(&self) -> Result<HashSet<String>> {
        self.with_sets(|sets| sets.shunned.clone())
    }
}

/// Outcome of a flag/unflag request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationChange {
    pub player_id: String,
    pub kind: ModerationKind,
    pub status_changed: bool,
    pub tournaments_enqueued: usize,
}

/// Writes moderation records and triggers recalculation when a player's
/// visibility actually flips
pub struct ModerationService {
    pool: DbPool,
}

impl ModerationService {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn flag(&self, player_id: &str, kind: ModerationKind, reason: Option<&str>) -> Result<ModerationChange> {
        self.apply(player_id, kind, |conn| {
            database::moderation::insert_record(conn, player_id, kind.as_str(), reason).map(|_| ())
        })
    }

    pub fn unflag(&self, player_id: &str, kind: ModerationKind) -> Result<ModerationChange> {
        self.apply(player_id, kind, |conn| {
            let now = Utc::now().naive_utc();
            database::moderation::resolve_active(conn, player_id, kind.as_str(), now).map(|_| ())
        })
    }

    fn apply(
        &self,
        player_id: &str,
        kind: ModerationKind,
        write: impl FnOnce(&rusqlite::Connection) -> Result<()>,
    ) -> Result<ModerationChange> {
        let mut conn = get_connection(&self.pool)?;
        let tx = conn.transaction()?;

        let before = visibility(&database::moderation::active_kinds(&tx, player_id)?);
        write(&*tx)?;
        let after = visibility(&database::moderation::active_kinds(&tx, player_id)?);

        let status_changed = before != after;
        let tournaments_enqueued = if status_changed {
            database::queue::enqueue_player(&tx, player_id)?
        } else {
            0
        };
        tx.commit()?;

        if status_changed {
            info!(
                "Moderation of {} changed ({}), {} tournaments queued for recalculation",
                player_id, kind, tournaments_enqueued
            );
        }

        Ok(ModerationChange {
            player_id: player_id.to_string(),
            kind,
            status_changed,
            tournaments_enqueued,
        })
    }
}

/// (ranking-excluded, shunned) for a set of active kinds
fn visibility(active: &HashSet<String>) -> (bool, bool) {
    let excluded = ModerationKind::RANKING_EXCLUDED
        .iter()
        .any(|kind| active.contains(kind.as_str()));
    let shunned = active.contains(ModerationKind::Shun.as_str());
    (excluded, shunned)
}
