use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::table::{LiveRow, LiveTable};

/// Where a wave would currently place within one bracket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacementReport {
    pub bracket: String,
    pub rank: usize,
    pub total: usize,
    pub top_wave: i32,
    pub median_wave: i32,
    pub players_above: usize,
    pub start_time: NaiveDateTime,
}

impl PlacementReport {
    pub fn would_place(&self) -> String {
        format!("{}/{}", self.rank, self.total)
    }
}

/// Places `candidate_wave` in every bracket as it stood at `as_of`.
/// Brackets without a sample at `as_of` are left out.
pub fn analyze_wave_placement(table: &LiveTable, candidate_wave: i32, as_of: NaiveDateTime) -> Vec<PlacementReport> {
    brackets(table.rows())
        .into_iter()
        .filter_map(|(bracket, rows)| {
            let start_time = rows.iter().map(|row| row.taken_at).min()?;
            let waves: Vec<i32> = rows.iter().filter(|row| row.taken_at == as_of).map(|row| row.wave).collect();
            let top_wave = waves.iter().copied().max()?;
            let players_above = waves.iter().filter(|wave| **wave > candidate_wave).count();

            Some(PlacementReport {
                bracket: bracket.to_string(),
                rank: players_above + 1,
                total: waves.len(),
                top_wave,
                median_wave: median(&waves)? as i32,
                players_above,
                start_time,
            })
        })
        .collect()
}

/// Reference players joined by the time of one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillPoint {
    pub hours: f64,
    pub joined: usize,
}

/// How many of `reference_ids` had joined at each snapshot, measured in
/// hours since `first_moment`
pub fn fill_progress(table: &LiveTable, reference_ids: &HashSet<String>, first_moment: NaiveDateTime) -> Vec<FillPoint> {
    table
        .timestamps()
        .into_iter()
        .map(|at| {
            let joined: HashSet<&str> = table
                .rows_at(at)
                .map(|row| row.player_id.as_str())
                .filter(|id| reference_ids.contains(*id))
                .collect();
            FillPoint {
                hours: (at - first_moment).num_seconds() as f64 / 3600.0,
                joined: joined.len(),
            }
        })
        .collect()
}

/// Extremes across brackets, named by bracket id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BracketStats {
    pub total_brackets: usize,
    pub highest_total: String,
    pub lowest_total: String,
    pub highest_median: String,
    pub lowest_median: String,
}

struct BracketWaves<'a> {
    bracket: &'a str,
    total: i64,
    median: f64,
}

/// Ties resolve to the bracket id that sorts first
pub fn bracket_stats(rows: &[&LiveRow]) -> Option<BracketStats> {
    let per_bracket: Vec<BracketWaves> = brackets(rows.iter().copied())
        .into_iter()
        .filter_map(|(bracket, rows)| {
            let waves: Vec<i32> = rows.iter().map(|row| row.wave).collect();
            Some(BracketWaves {
                bracket,
                total: waves.iter().map(|w| i64::from(*w)).sum(),
                median: median(&waves)?,
            })
        })
        .collect();

    let highest_total = per_bracket
        .iter()
        .max_by(|a, b| a.total.cmp(&b.total).then(b.bracket.cmp(a.bracket)))?;
    let lowest_total = per_bracket
        .iter()
        .min_by(|a, b| a.total.cmp(&b.total).then(a.bracket.cmp(b.bracket)))?;
    let highest_median = per_bracket
        .iter()
        .max_by(|a, b| a.median.total_cmp(&b.median).then(b.bracket.cmp(a.bracket)))?;
    let lowest_median = per_bracket
        .iter()
        .min_by(|a, b| a.median.total_cmp(&b.median).then(a.bracket.cmp(b.bracket)))?;

    Some(BracketStats {
        total_brackets: per_bracket.len(),
        highest_total: highest_total.bracket.to_string(),
        lowest_total: lowest_total.bracket.to_string(),
        highest_median: highest_median.bracket.to_string(),
        lowest_median: lowest_median.bracket.to_string(),
    })
}

fn brackets<'a>(rows: impl IntoIterator<Item = &'a LiveRow>) -> BTreeMap<&'a str, Vec<&'a LiveRow>> {
    let mut grouped: BTreeMap<&str, Vec<&LiveRow>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.bracket.as_str()).or_default().push(row);
    }
    grouped
}

fn median(waves: &[i32]) -> Option<f64> {
    let mut sorted = waves.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => None,
        n if n % 2 == 1 => Some(f64::from(sorted[mid])),
        _ => Some((f64::from(sorted[mid - 1]) + f64::from(sorted[mid])) / 2.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::table::tests::{at, row};

    #[test]
    fn placement_counts_strictly_higher_waves() {
        let now = at(12, 0);
        let table = LiveTable::from_rows(vec![
            row("a", 900, "B1", now),
            row("b", 700, "B1", now),
            row("c", 700, "B1", now),
            row("d", 100, "B1", now),
            row("a", 500, "B1", at(8, 0)),
            row("e", 50, "B2", at(8, 0)),
        ]);

        let reports = analyze_wave_placement(&table, 700, now);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.would_place(), "2/4");
        assert_eq!((report.top_wave, report.median_wave, report.players_above), (900, 700, 1));
        assert_eq!(report.start_time, at(8, 0));
    }

    #[test]
    fn median_truncates_even_counts() {
        assert_eq!(median(&[1, 2]).map(|m| m as i32), Some(1));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn fill_progress_counts_reference_players() {
        let table = LiveTable::from_rows(vec![
            row("a", 10, "B1", at(10, 0)),
            row("a", 20, "B1", at(11, 30)),
            row("b", 20, "B1", at(11, 30)),
            row("z", 20, "B1", at(11, 30)),
        ]);
        let reference = HashSet::from(["a".to_string(), "b".to_string()]);

        let points = fill_progress(&table, &reference, at(10, 0));
        assert_eq!(
            points,
            vec![FillPoint { hours: 0.0, joined: 1 }, FillPoint { hours: 1.5, joined: 2 }]
        );
    }

    #[test]
    fn stats_name_extreme_brackets() {
        let now = at(12, 0);
        let rows = [
            row("a", 100, "B1", now),
            row("b", 100, "B1", now),
            row("c", 500, "B2", now),
            row("d", 10, "B3", now),
            row("e", 10, "B3", now),
            row("f", 10, "B3", now),
        ];
        let refs: Vec<&LiveRow> = rows.iter().collect();

        let stats = bracket_stats(&refs).unwrap();
        assert_eq!(stats.total_brackets, 3);
        assert_eq!(stats.highest_total, "B2");
        assert_eq!(stats.lowest_total, "B3");
        assert_eq!(stats.highest_median, "B2");
        assert_eq!(stats.lowest_median, "B3");
        assert_eq!(bracket_stats(&[]), None);
    }
}
