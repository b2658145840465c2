use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::config::League;

/// Where a tournament sits in the recalculation queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueueState {
    Clean,
    Pending,
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tournament {
    pub id: i64,
    pub league: League,
    pub date: NaiveDate,
    pub public: bool,
    pub source_file: Option<String>,
    pub needs_recalc: bool,
    pub recalc_retry_count: u32,
    pub last_recalc_at: Option<NaiveDateTime>,
    pub last_failed_at: Option<NaiveDateTime>,
    pub created_at: Option<NaiveDateTime>,
}

impl Tournament {
    pub fn queue_state(&self, max_retries: u32) -> QueueState {
        match (self.needs_recalc, self.recalc_retry_count >= max_retries) {
            (false, _) => QueueState::Clean,
            (true, false) => QueueState::Pending,
            (true, true) => QueueState::Exhausted,
        }
    }
}

/// One player's stored result within a tournament
#[derive(Debug, Clone, Serialize)]
pub struct TourneyRow {
    pub id: i64,
    pub tournament_id: i64,
    pub player_id: String,
    pub nickname: String,
    pub wave: i32,
    pub position: i32,
    pub avatar_id: i32,
    pub relic_id: i32,
}

/// Row shape every export format is normalised to before ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRow {
    pub player_id: String,
    pub nickname: String,
    pub wave: i32,
    pub position: i32,
    pub avatar_id: i32,
    pub relic_id: i32,
}

impl NewRow {
    pub fn new(player_id: impl Into<String>, nickname: impl Into<String>, wave: i32) -> Self {
        Self {
            player_id: player_id.into(),
            nickname: nickname.into(),
            wave,
            position: 0,
            avatar_id: -1,
            relic_id: -1,
        }
    }
}

/// Input of a recalculation: a row as fetched in wave-descending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedRow {
    pub player_id: String,
    pub nickname: String,
    pub wave: i32,
    pub position: i32,
}

#[derive(Debug, Clone)]
pub struct ModerationRecord {
    pub id: i64,
    pub player_id: String,
    pub kind: String,
    pub reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeagueCount {
    pub league: League,
    pub count: usize,
}

/// Snapshot of the recalculation queue for operators
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub exhausted: usize,
    pub processed_last_day: usize,
    pub failed_attempts_last_day: usize,
    pub pending_by_league: Vec<LeagueCount>,
    pub next_up: Vec<Tournament>,
    pub exhausted_tournaments: Vec<Tournament>,
}

impl QueueStatus {
    pub fn is_healthy(&self) -> bool {
        self.pending == 0 && self.exhausted == 0
    }
}
