mod common;

use std::collections::HashSet;
use std::path::Path;

use chrono::{NaiveDateTime, TimeDelta};

use common::{write_file, TestDb};
use tower_standings::config::{League, LiveSettings};
use tower_standings::database::{self, get_connection};
use tower_standings::errors::LiveDataError;
use tower_standings::live::{parse_snapshot_time, FillPoint, LiveAggregator};
use tower_standings::services::moderation::StaticModeration;

const HEADER: &str = "player_id,name,avatar,relic,wave,bracket,tourney_number\n";

fn snapshot(results_dir: &Path, league: League, stamp: &str, rows: &[(String, i32, &str)]) {
    let body: String = rows
        .iter()
        .map(|(id, wave, bracket)| format!("{id},name-{id},1,2,{wave},{bracket},42\n"))
        .collect();
    write_file(
        &results_dir.join(league.live_dir_name()),
        &format!("{stamp}.csv"),
        &format!("{HEADER}{body}"),
    );
}

fn time(stamp: &str) -> NaiveDateTime {
    parse_snapshot_time(Path::new(&format!("{stamp}.csv"))).unwrap()
}

/// Legend snapshots:
/// - bracket AAA: a0..a28, a0 is sus, so 28 players remain
/// - bracket BBB: b0..b27, b0 is shunned, so 27 players remain unless shunned players are kept
/// - an early partial snapshot and one outside the retention window
fn legend_fixture(db: &TestDb) -> LiveAggregator<StaticModeration> {
    let results_dir = db.path().join("results");
    let mut latest: Vec<(String, i32, &str)> = (0..29).map(|i| (format!("a{i}"), 1000 + 10 * i, "AAA")).collect();
    latest.extend((0..28).map(|i| (format!("b{i}"), 500 + i, "BBB")));
    snapshot(&results_dir, League::Legend, "2024-05-01__12_00", &latest);

    let early: Vec<(String, i32, &str)> = (1..=5).map(|i| (format!("a{i}"), 900 + i, "AAA")).collect();
    snapshot(&results_dir, League::Legend, "2024-05-01__10_00", &early);
    snapshot(
        &results_dir,
        League::Legend,
        "2024-04-29__12_00",
        &[("ancient".to_string(), 5000, "OLD")],
    );

    let moderation = StaticModeration {
        excluded: HashSet::from(["a0".to_string()]),
        shunned: HashSet::from(["b0".to_string()]),
    };
    LiveAggregator::new(
        db.pool.clone(),
        moderation,
        LiveSettings::default().with_results_dir(results_dir),
    )
}

#[test]
fn view_merges_window_and_hides_moderated_players() {
    let db = TestDb::new();
    let live = legend_fixture(&db);

    let view = live.live_view(League::Legend, false).unwrap();
    assert_eq!(view.timestamps(), vec![time("2024-05-01__10_00"), time("2024-05-01__12_00")]);
    let ids = view.player_ids();
    assert!(!ids.contains("ancient"));
    assert!(!ids.contains("a0"));
    assert!(!ids.contains("b0"));
    assert!(live.live_view(League::Legend, true).unwrap().player_ids().contains("b0"));
}

#[test]
fn verified_names_replace_submitted_names() {
    let db = TestDb::new();
    let conn = get_connection(&db.pool).unwrap();
    database::players::upsert_known_player(&conn, "a1", "Skye", true).unwrap();
    database::players::upsert_known_player(&conn, "a2", "Unapproved", false).unwrap();
    let live = legend_fixture(&db);

    let latest = live.latest_standings(League::Legend, false).unwrap();
    let name_of = |id: &str| latest.iter().find(|row| row.player_id == id).unwrap().real_name.clone();
    assert_eq!(name_of("a1"), "Skye");
    assert_eq!(name_of("a2"), "name-a2");
}

#[test]
fn only_full_brackets_reach_placement() {
    let db = TestDb::new();
    let live = legend_fixture(&db);

    let without_shunned = live.placement_table(League::Legend, false).unwrap();
    let brackets: HashSet<&str> = without_shunned.table.rows().iter().map(|row| row.bracket.as_str()).collect();
    assert_eq!(brackets, HashSet::from(["AAA"]));

    let with_shunned = live.placement_table(League::Legend, true).unwrap();
    let brackets: HashSet<&str> = with_shunned.table.rows().iter().map(|row| row.bracket.as_str()).collect();
    assert_eq!(brackets, HashSet::from(["AAA", "BBB"]));
}

#[test]
fn placement_reports_rank_within_each_bracket() {
    let db = TestDb::new();
    let live = legend_fixture(&db);

    let reports = live.placement(League::Legend, 1200, false).unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.bracket, "AAA");
    assert_eq!(report.would_place(), "9/28");
    assert_eq!(report.top_wave, 1280);
    assert_eq!(report.median_wave, 1145);
    assert_eq!(report.start_time, time("2024-05-01__10_00"));

    let top = live.placement(League::Legend, 5000, true).unwrap();
    assert!(top.iter().all(|report| report.rank == 1));
}

#[test]
fn entry_check_requires_fresh_full_bracket() {
    let db = TestDb::new();
    let live = legend_fixture(&db);
    let latest = time("2024-05-01__12_00");
    let soon = latest + TimeDelta::hours(2);

    assert!(live.check_live_entry_at(League::Legend, "a3", soon).unwrap());
    // shunned players still count as entered
    assert!(live.check_live_entry_at(League::Legend, "b0", soon).unwrap());
    assert!(!live.check_live_entry_at(League::Legend, "a0", soon).unwrap());
    assert!(!live.check_live_entry_at(League::Legend, "nobody", soon).unwrap());
    assert!(!live.check_live_entry_at(League::Legend, "a3", latest + TimeDelta::hours(30)).unwrap());
    assert!(!live.check_live_entry_at(League::Gold, "a3", soon).unwrap());

    assert!(live.check_any_live_entry_at("a3", soon));
    assert!(!live.check_any_live_entry_at("a3", latest + TimeDelta::hours(30)));
}

#[test]
fn bracket_of_27_is_not_full_but_28_is() {
    let db = TestDb::new();
    let results_dir = db.path().join("results");
    let mut rows: Vec<(String, i32, &str)> = (0..27).map(|i| (format!("s{i}"), 100 + i, "SMALL")).collect();
    rows.extend((0..28).map(|i| (format!("f{i}"), 100 + i, "FULL")));
    snapshot(&results_dir, League::Silver, "2024-05-01__12_00", &rows);
    let live = LiveAggregator::new(
        db.pool.clone(),
        StaticModeration::default(),
        LiveSettings::default().with_results_dir(results_dir),
    );
    let soon = time("2024-05-01__13_00");

    assert!(live.check_live_entry_at(League::Silver, "f0", soon).unwrap());
    assert!(!live.check_live_entry_at(League::Silver, "s0", soon).unwrap());
    let stats = live.bracket_stats(League::Silver, false).unwrap().unwrap();
    assert_eq!(stats.total_brackets, 1);
    assert_eq!(stats.highest_total, "FULL");
}

#[test]
fn missing_data_is_distinct_from_malformed_data() {
    let db = TestDb::new();
    let results_dir = db.path().join("results");
    write_file(&results_dir.join(League::Copper.live_dir_name()), "2024-05-01__12_00.csv", "");
    write_file(
        &results_dir.join(League::Silver.live_dir_name()),
        "2024-05-01__12_00.csv",
        "player_id,name\nx,y\n",
    );
    let live = LiveAggregator::new(
        db.pool.clone(),
        StaticModeration::default(),
        LiveSettings::default().with_results_dir(results_dir),
    );

    let missing = live.live_view(League::Gold, false).unwrap_err();
    assert!(missing.is_no_data());
    let empty = live.live_view(League::Copper, false).unwrap_err();
    assert!(empty.is_no_data());
    let malformed = live.live_view(League::Silver, false).unwrap_err();
    assert!(matches!(malformed, LiveDataError::Malformed { .. }));
    assert!(!malformed.is_no_data());
}

#[test]
fn fill_progress_counts_players_of_last_public_tournament() {
    let db = TestDb::new();
    let live = legend_fixture(&db);
    assert_eq!(live.fill_progress(League::Legend).unwrap(), None);

    db.tournament(
        League::Legend,
        "2024-04-20",
        &[("a1", 10, 1), ("a2", 9, 2), ("b1", 8, 3), ("gone", 7, 4)],
    );
    let points = live.fill_progress(League::Legend).unwrap().unwrap();
    assert_eq!(
        points,
        vec![FillPoint { hours: 0.0, joined: 2 }, FillPoint { hours: 2.0, joined: 3 }]
    );
}

#[test]
fn top_progress_keeps_configured_number_of_players() {
    let db = TestDb::new();
    let live = legend_fixture(&db);

    let top = live.top_progress(League::Legend, false).unwrap();
    assert_eq!(top.player_ids().len(), 25);
    assert!(top.player_ids().contains("a28"));
    assert!(!top.player_ids().contains("a3"));
}
