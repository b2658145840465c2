mod common;

use common::{date_of, write_file, TestDb};
use tower_standings::config::League;
use tower_standings::database::{self, get_connection};
use tower_standings::errors::ImportError;
use tower_standings::services::import::{parse_results_file, ImportService};
use tower_standings::services::moderation::StaticModeration;

#[test]
fn headered_exports_keep_cosmetics_and_fill_blank_names() {
    let db = TestDb::new();
    let path = write_file(
        db.path(),
        "2024-06-01.csv",
        "player_id,name,avatar,relic,wave\nAAA,Skye,12,48,900\nBBB,,,,850.0\n",
    );

    let rows = parse_results_file(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].nickname.as_str(), rows[0].avatar_id, rows[0].relic_id), ("Skye", 12, 48));
    assert_eq!((rows[1].nickname.as_str(), rows[1].avatar_id, rows[1].wave), ("BBB", -1, 850));
}

#[test]
fn invalid_wave_names_the_line() {
    let db = TestDb::new();
    let path = write_file(db.path(), "2024-06-01.csv", "AAA,Skye,900\nBBB,Rook,lots\n");

    match parse_results_file(&path) {
        Err(ImportError::InvalidWave { line, value, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(value, "lots");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn waves_outside_the_integer_range_are_rejected() {
    let db = TestDb::new();
    let path = write_file(db.path(), "2024-06-01.csv", "AAA,Skye,900.0\nBBB,Rook,3000000000\n");

    match parse_results_file(&path) {
        Err(ImportError::InvalidWave { line, value, .. }) => {
            assert_eq!(line, 2);
            assert_eq!(value, "3000000000");
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let path = write_file(db.path(), "2024-06-02.csv", "AAA,Skye,-1e12\n");
    assert!(matches!(parse_results_file(&path), Err(ImportError::InvalidWave { .. })));
}

#[test]
fn short_rows_are_a_layout_error() {
    let db = TestDb::new();
    let path = write_file(db.path(), "2024-06-01.csv", "AAA,900\n");
    assert!(matches!(parse_results_file(&path), Err(ImportError::Layout { .. })));
}

#[test]
fn excluded_players_are_imported_with_sentinel_position() {
    let db = TestDb::new();
    let path = write_file(db.path(), "2024-06-01.csv", "A,Ann,300\nB,Bob,500\nC,Cid,400\n");
    let service = ImportService::new(db.pool.clone(), StaticModeration::excluding(["B"]));

    let tournament = service
        .import_file(&path, League::Gold, date_of("2024-06-01"), false)
        .unwrap()
        .unwrap();
    assert!(!tournament.public);
    assert_eq!(
        db.positions(tournament.id),
        vec![("B".to_string(), -1), ("C".to_string(), 1), ("A".to_string(), 2)]
    );
}

#[test]
fn empty_file_creates_nothing() {
    let db = TestDb::new();
    let path = write_file(db.path(), "2024-06-01.csv", "");
    let service = ImportService::new(db.pool.clone(), StaticModeration::default());

    assert!(service
        .import_file(&path, League::Gold, date_of("2024-06-01"), true)
        .unwrap()
        .is_none());
    let conn = get_connection(&db.pool).unwrap();
    assert!(database::tournaments::list_by_league(&conn, League::Gold).unwrap().is_empty());
}

#[test]
fn directory_import_skips_bad_and_known_files() {
    let db = TestDb::new();
    let dir = db.path().join("Gold");
    write_file(&dir, "2024-06-01.csv", "A,Ann,300\nB,Bob,500\n");
    write_file(&dir, "2024-06-04.csv", "A,Ann,300\nB,Bob,five hundred\n");
    write_file(&dir, "2024-06-08.csv", "");
    write_file(&dir, "notes.csv", "A,Ann,1\n");
    let service = ImportService::new(db.pool.clone(), StaticModeration::default());

    let first = service.import_directory(&dir, League::Gold, true).unwrap();
    assert_eq!(first.imported.len(), 1);
    assert_eq!(first.imported[0].date, date_of("2024-06-01"));
    assert_eq!(first.failed.len(), 1);
    assert!(first.failed[0].0.ends_with("2024-06-04.csv"));
    assert_eq!(first.empty.len(), 1);

    let second = service.import_directory(&dir, League::Gold, true).unwrap();
    assert!(second.imported.is_empty());
    assert_eq!(second.skipped_existing, 1);
    assert_eq!(second.failed.len(), 1);
}

#[test]
fn stored_rows_keep_cosmetics() {
    let db = TestDb::new();
    let path = write_file(db.path(), "2024-06-01.csv", "A,Ann#avatar=7$$$$$relic=19,300\nB,Bob,500\n");
    let service = ImportService::new(db.pool.clone(), StaticModeration::default());
    let tournament = service
        .import_file(&path, League::Gold, date_of("2024-06-01"), true)
        .unwrap()
        .unwrap();

    let conn = get_connection(&db.pool).unwrap();
    let rows = database::rows::list_by_tournament(&conn, tournament.id).unwrap();
    let stored: Vec<(&str, &str, i32, i32, i32)> = rows
        .iter()
        .map(|row| (row.player_id.as_str(), row.nickname.as_str(), row.position, row.avatar_id, row.relic_id))
        .collect();
    assert_eq!(stored, vec![("B", "Bob", 1, -1, -1), ("A", "Ann", 2, 7, 19)]);
    assert_eq!(
        database::tournaments::find_by_source_file(&conn, &path.to_string_lossy()).unwrap().map(|t| t.id),
        Some(tournament.id)
    );
}
