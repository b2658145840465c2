#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use tempfile::TempDir;

use tower_standings::config::League;
use tower_standings::database::{self, get_connection, DbPool, NewRow, RowStore, SqliteRowStore, Tournament};

/// A fresh database file inside a temporary directory
pub struct TestDb {
    pub dir: TempDir,
    pub pool: DbPool,
}

impl TestDb {
    pub fn new() -> Self {
        Self::with_busy_timeout(database::DEFAULT_BUSY_TIMEOUT)
    }

    /// For tests that contend for the write lock
    pub fn with_busy_timeout(busy_timeout: Duration) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("standings.db");
        let pool = database::open_with_busy_timeout(path.to_str().unwrap(), busy_timeout).unwrap();
        Self { dir, pool }
    }

    /// Holds the database write lock from another connection for `hold`.
    /// Returns once the lock is taken.
    pub fn lock_for(&self, hold: Duration) -> thread::JoinHandle<()> {
        let pool = self.pool.clone();
        let (locked_tx, locked_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let conn = get_connection(&pool).unwrap();
            conn.execute_batch("BEGIN IMMEDIATE").unwrap();
            locked_tx.send(()).unwrap();
            thread::sleep(hold);
            conn.execute_batch("COMMIT").unwrap();
        });
        locked_rx.recv().unwrap();
        handle
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Stores a tournament whose rows carry the given positions as-is
    pub fn tournament(&self, league: League, date: &str, rows: &[(&str, i32, i32)]) -> Tournament {
        let conn = get_connection(&self.pool).unwrap();
        let tournament =
            database::tournaments::insert_tournament(&conn, league, date_of(date), true, None).unwrap();
        let rows: Vec<NewRow> = rows
            .iter()
            .map(|(id, wave, position)| NewRow {
                position: *position,
                ..NewRow::new(*id, format!("nick-{id}"), *wave)
            })
            .collect();
        SqliteRowStore::new(self.pool.clone()).create_rows(tournament.id, &rows).unwrap();
        tournament
    }

    pub fn find(&self, id: i64) -> Tournament {
        let conn = get_connection(&self.pool).unwrap();
        database::tournaments::find_by_id(&conn, id).unwrap().unwrap()
    }

    pub fn enqueue(&self, ids: &[i64]) {
        let conn = get_connection(&self.pool).unwrap();
        database::queue::enqueue_tournaments(&conn, ids).unwrap();
    }

    /// (player_id, position) in stored wave order
    pub fn positions(&self, tournament_id: i64) -> Vec<(String, i32)> {
        let conn = get_connection(&self.pool).unwrap();
        database::rows::fetch_ranked(&conn, tournament_id)
            .unwrap()
            .into_iter()
            .map(|row| (row.player_id, row.position))
            .collect()
    }
}

pub fn date_of(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}
