use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::Serialize;

use super::snapshot::Snapshot;

/// One player sample from one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveRow {
    pub player_id: String,
    /// Verified real name when known, otherwise the submitted name
    pub real_name: String,
    pub submitted_name: String,
    pub wave: i32,
    pub bracket: String,
    pub taken_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BracketSummary {
    /// Brackets in the order they first appeared
    pub order: Vec<String>,
    /// Brackets with at least the full-bracket number of distinct players
    pub full: HashSet<String>,
}

/// Rows merged from a window of snapshots, newest snapshot first and
/// highest wave first within a snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveTable {
    rows: Vec<LiveRow>,
}

impl LiveTable {
    /// Merges snapshots, dropping `hidden` players and resolving verified names
    pub fn from_snapshots(snapshots: &[Snapshot], hidden: &HashSet<String>, names: &HashMap<String, String>) -> Self {
        let rows = snapshots
            .iter()
            .flat_map(|snapshot| {
                snapshot.records.iter().map(move |record| LiveRow {
                    player_id: record.player_id.clone(),
                    real_name: names.get(&record.player_id).cloned().unwrap_or_else(|| record.name.clone()),
                    submitted_name: record.name.clone(),
                    wave: record.wave,
                    bracket: record.bracket.clone(),
                    taken_at: snapshot.taken_at,
                })
            })
            .filter(|row| !hidden.contains(&row.player_id))
            .collect();
        Self::from_rows(rows)
    }

    pub fn from_rows(mut rows: Vec<LiveRow>) -> Self {
        rows.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then(b.wave.cmp(&a.wave)));
        Self { rows }
    }

    pub fn rows(&self) -> &[LiveRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn latest_time(&self) -> Option<NaiveDateTime> {
        self.rows.iter().map(|row| row.taken_at).max()
    }

    pub fn first_time(&self) -> Option<NaiveDateTime> {
        self.rows.iter().map(|row| row.taken_at).min()
    }

    /// Distinct snapshot times, oldest first
    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.rows.iter().map(|row| row.taken_at).unique().sorted().collect()
    }

    /// Rows of the snapshot taken at `at`, highest wave first
    pub fn rows_at(&self, at: NaiveDateTime) -> impl Iterator<Item = &LiveRow> {
        self.rows.iter().filter(move |row| row.taken_at == at)
    }

    /// Rows of the newest snapshot
    pub fn latest_rows(&self) -> Vec<&LiveRow> {
        match self.latest_time() {
            Some(latest) => self.rows_at(latest).collect(),
            None => Vec::new(),
        }
    }

    pub fn bracket_summary(&self, full_bracket_threshold: usize) -> BracketSummary {
        let mut first_seen: HashMap<&str, NaiveDateTime> = HashMap::new();
        let mut players: HashMap<&str, HashSet<&str>> = HashMap::new();
        for row in &self.rows {
            first_seen
                .entry(row.bracket.as_str())
                .and_modify(|seen| *seen = (*seen).min(row.taken_at))
                .or_insert(row.taken_at);
            players.entry(row.bracket.as_str()).or_default().insert(row.player_id.as_str());
        }

        let order = first_seen
            .into_iter()
            .sorted_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(b.0)))
            .map(|(bracket, _)| bracket.to_string())
            .collect();
        let full = players
            .into_iter()
            .filter(|(_, ids)| ids.len() >= full_bracket_threshold)
            .map(|(bracket, _)| bracket.to_string())
            .collect();

        BracketSummary { order, full }
    }

    /// Keeps only brackets that have filled up; small or sniped brackets are dropped
    pub fn full_brackets_only(&self, full_bracket_threshold: usize) -> LiveTable {
        let full = self.bracket_summary(full_bracket_threshold).full;
        self.filtered(|row| full.contains(&row.bracket))
    }

    /// Every sample of the `n` players with the highest wave in the window
    pub fn top_players(&self, n: usize) -> LiveTable {
        let mut best: HashMap<&str, i32> = HashMap::new();
        for row in &self.rows {
            let wave = best.entry(row.player_id.as_str()).or_insert(row.wave);
            *wave = (*wave).max(row.wave);
        }

        let top: HashSet<String> = best
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)))
            .take(n)
            .map(|(id, _)| id.to_string())
            .collect();
        self.filtered(|row| top.contains(&row.player_id))
    }

    /// Player id to a name that is unique within this table; real names
    /// shared by several ids get the id appended
    pub fn display_names(&self) -> HashMap<String, String> {
        let mut ids_by_name: BTreeMap<&str, HashSet<&str>> = BTreeMap::new();
        for row in &self.rows {
            ids_by_name.entry(row.real_name.as_str()).or_default().insert(row.player_id.as_str());
        }

        self.rows
            .iter()
            .map(|row| {
                let shared = ids_by_name.get(row.real_name.as_str()).is_some_and(|ids| ids.len() > 1);
                let display = if shared {
                    format!("{} ({})", row.real_name, row.player_id)
                } else {
                    row.real_name.clone()
                };
                (row.player_id.clone(), display)
            })
            .collect()
    }

    pub fn player_ids(&self) -> HashSet<&str> {
        self.rows.iter().map(|row| row.player_id.as_str()).collect()
    }

    fn filtered(&self, keep: impl Fn(&LiveRow) -> bool) -> LiveTable {
        LiveTable {
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::NaiveDate;

    use super::*;

    pub(crate) fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .unwrap()
    }

    pub(crate) fn row(id: &str, wave: i32, bracket: &str, taken_at: NaiveDateTime) -> LiveRow {
        LiveRow {
            player_id: id.to_string(),
            real_name: id.to_string(),
            submitted_name: id.to_string(),
            wave,
            bracket: bracket.to_string(),
            taken_at,
        }
    }

    #[test]
    fn brackets_are_full_at_threshold() {
        let mut rows: Vec<LiveRow> = (0..28).map(|i| row(&format!("a{i}"), 100 + i, "A", at(10, 0))).collect();
        rows.extend((0..27).map(|i| row(&format!("b{i}"), 100 + i, "B", at(9, 0))));
        // repeated samples of one player do not count twice
        rows.push(row("b0", 300, "B", at(11, 0)));
        let table = LiveTable::from_rows(rows);

        let summary = table.bracket_summary(28);
        assert_eq!(summary.order, vec!["B".to_string(), "A".to_string()]);
        assert_eq!(summary.full, HashSet::from(["A".to_string()]));
        assert!(table.full_brackets_only(28).rows().iter().all(|r| r.bracket == "A"));
    }

    #[test]
    fn top_players_keep_all_samples() {
        let table = LiveTable::from_rows(vec![
            row("x", 50, "A", at(10, 0)),
            row("x", 90, "A", at(11, 0)),
            row("y", 80, "A", at(11, 0)),
            row("z", 10, "A", at(11, 0)),
        ]);
        let top = table.top_players(2);
        assert_eq!(top.len(), 3);
        assert!(!top.player_ids().contains("z"));
        assert_eq!(top.rows()[0].player_id, "x");
    }

    #[test]
    fn duplicate_names_get_ids() {
        let mut first = row("p1", 10, "A", at(10, 0));
        let mut second = row("p2", 20, "A", at(10, 0));
        first.real_name = "Sam".to_string();
        second.real_name = "Sam".to_string();
        let table = LiveTable::from_rows(vec![first, second, row("p3", 5, "A", at(10, 0))]);

        let names = table.display_names();
        assert_eq!(names["p1"], "Sam (p1)");
        assert_eq!(names["p2"], "Sam (p2)");
        assert_eq!(names["p3"], "p3");
    }
}
