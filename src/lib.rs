pub mod cli;
pub mod config;
pub mod database;
pub mod errors;
pub mod live;
pub mod ranking;
pub mod services;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{CommandFactory, Parser};
use cli::Cli;
use colored::Colorize;
use log::info;
use tokio::sync::watch;

use crate::cli::{Command, LiveCommand, LiveOptions};
use crate::config::settings::{hours, AppConfig};
use crate::config::League;
use crate::database::{get_connection, DbPool, SqliteRowStore};
use crate::errors::LiveDataError;
use crate::live::LiveAggregator;
use crate::services::import::{result_file_date, ImportService};
use crate::services::moderation::{CachedModeration, ModerationKind, ModerationService, SqliteModeration};
use crate::services::recalculation::{reposition, RecalculationWorker};

const LIVE_MODERATION_TTL: Duration = Duration::from_secs(300);

pub fn interpret() -> Command {
    let cli = Cli::parse();
    cli.command
}

fn open_database(config: &AppConfig) -> Result<DbPool> {
    database::open_with_busy_timeout(&config.database_path, config.busy_timeout)
        .with_context(|| format!("Failed to open database {}", config.database_path))
}

pub fn handle_import(file: &Path, league: League, date: Option<NaiveDate>, private: bool) -> Result<()> {
    let Some(date) = date.or_else(|| result_file_date(file)) else {
        bail!("No date given and none found in file name {}", file.display());
    };

    let config = AppConfig::new();
    let pool = open_database(&config)?;
    let service = ImportService::new(pool.clone(), SqliteModeration::new(pool));

    match service.import_file(file, league, date, !private)? {
        Some(tournament) => println!("Imported tournament {} ({} {})", tournament.id, league, date),
        None => println!("{}", format!("{} is empty, nothing imported", file.display()).yellow()),
    }
    Ok(())
}

pub fn handle_import_dir(dir: &Path, league: League, private: bool) -> Result<()> {
    let config = AppConfig::new();
    let pool = open_database(&config)?;
    let service = ImportService::new(pool.clone(), SqliteModeration::new(pool));

    let summary = service.import_directory(dir, league, !private)?;
    println!(
        "Imported {} tournaments, {} already present",
        summary.imported.len(),
        summary.skipped_existing
    );
    for path in &summary.empty {
        println!("{}", format!("  empty: {}", path.display()).yellow());
    }
    for (path, reason) in &summary.failed {
        println!("{}", format!("  failed: {}: {}", path.display(), reason).red());
    }
    Ok(())
}

pub fn handle_worker(max_retries: u32, delay: f64, one_shot: bool) -> Result<()> {
    let config = AppConfig::new();
    let mut settings = config.queue.clone();
    settings.max_retries = max_retries;
    settings.poll_delay = Duration::try_from_secs_f64(delay).with_context(|| format!("Invalid delay {}", delay))?;

    let pool = open_database(&config)?;
    let worker = RecalculationWorker::new(
        pool.clone(),
        SqliteRowStore::new(pool.clone()),
        SqliteModeration::new(pool),
        settings,
    );

    if one_shot {
        if worker.run_once()? {
            println!("Processed one tournament");
        } else {
            println!("No tournaments processed");
        }
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping after the current tournament");
                let _ = shutdown_tx.send(true);
            }
        });

        let handled = worker.run(shutdown_rx).await?;
        println!("Processed {} tournaments", handled);
        Ok(())
    })
}

pub fn handle_recalc(tournament_id: i64, dry_run: bool, verbose: bool) -> Result<()> {
    let config = AppConfig::new();
    let pool = open_database(&config)?;
    {
        let conn = get_connection(&pool)?;
        if database::tournaments::find_by_id(&conn, tournament_id)?.is_none() {
            bail!("Tournament {} not found", tournament_id);
        }
    }

    let store = SqliteRowStore::new(pool.clone());
    let changes = reposition(&store, &SqliteModeration::new(pool), tournament_id, dry_run, verbose)?;
    if dry_run {
        println!("{} positions would change in tournament {}", changes, tournament_id);
    } else {
        println!("Updated {} positions in tournament {}", changes, tournament_id);
    }
    Ok(())
}

pub fn handle_queue_status(detailed: bool, max_retries: u32) -> Result<()> {
    let config = AppConfig::new();
    let pool = open_database(&config)?;
    let conn = get_connection(&pool)?;
    let status = database::queue::queue_status(&conn, max_retries, &config.queue.priorities, Utc::now().naive_utc())?;

    let health = if status.is_healthy() {
        "idle".green()
    } else if status.exhausted > 0 {
        "needs attention".red()
    } else {
        "draining".yellow()
    };
    println!("Recalculation queue: {}", health);
    println!("  pending:            {}", status.pending);
    println!("  exhausted:          {}", paint_count(status.exhausted));
    println!("  processed (24h):    {}", status.processed_last_day);
    println!("  failing (24h):      {}", paint_count(status.failed_attempts_last_day));

    if !status.pending_by_league.is_empty() {
        println!("Pending by league:");
        for entry in &status.pending_by_league {
            println!("  {:<10} {}", entry.league, entry.count);
        }
    }

    if detailed {
        if !status.next_up.is_empty() {
            println!("Next up:");
            for tournament in &status.next_up {
                println!("  #{:<6} {:<10} {}", tournament.id, tournament.league, tournament.date);
            }
        }
        if !status.exhausted_tournaments.is_empty() {
            println!("{}", "Exhausted (run reset-retries after fixing the cause):".red());
            for tournament in &status.exhausted_tournaments {
                println!(
                    "  #{:<6} {:<10} {} ({} attempts)",
                    tournament.id, tournament.league, tournament.date, tournament.recalc_retry_count
                );
            }
        }
    }
    Ok(())
}

fn paint_count(count: usize) -> colored::ColoredString {
    if count == 0 {
        count.to_string().green()
    } else {
        count.to_string().red()
    }
}

pub fn handle_enqueue(tournament_ids: &[i64]) -> Result<()> {
    let config = AppConfig::new();
    let pool = open_database(&config)?;
    let conn = get_connection(&pool)?;
    let queued = database::queue::enqueue_tournaments(&conn, tournament_ids)?;
    println!("Marked {} tournaments for recalculation", queued);
    Ok(())
}

pub fn handle_reset_retries(tournament_id: Option<i64>, max_retries: u32) -> Result<()> {
    let config = AppConfig::new();
    let pool = open_database(&config)?;
    let conn = get_connection(&pool)?;
    let reset = database::queue::reset_retries(&conn, tournament_id, max_retries)?;
    println!("Reset {} tournaments", reset);
    Ok(())
}

pub fn handle_flag(player_id: &str, kind: ModerationKind, reason: Option<&str>) -> Result<()> {
    let config = AppConfig::new();
    let service = ModerationService::new(open_database(&config)?);
    let change = service.flag(player_id, kind, reason)?;
    report_moderation_change(&change);
    Ok(())
}

pub fn handle_unflag(player_id: &str, kind: ModerationKind) -> Result<()> {
    let config = AppConfig::new();
    let service = ModerationService::new(open_database(&config)?);
    let change = service.unflag(player_id, kind)?;
    report_moderation_change(&change);
    Ok(())
}

fn report_moderation_change(change: &services::moderation::ModerationChange) {
    if change.status_changed {
        println!(
            "{}: {} updated, {} tournaments queued for recalculation",
            change.player_id, change.kind, change.tournaments_enqueued
        );
    } else {
        println!("{}: {} recorded, visibility unchanged", change.player_id, change.kind);
    }
}

pub fn handle_verify(player_id: &str, name: &str) -> Result<()> {
    let config = AppConfig::new();
    let pool = open_database(&config)?;
    let conn = get_connection(&pool)?;
    database::players::upsert_known_player(&conn, player_id, name, true)?;
    println!("{} is now shown as {}", player_id, name);
    Ok(())
}

pub fn handle_completions(shell: clap_complete::Shell) -> Result<()> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
    Ok(())
}

pub fn handle_live(view: &LiveCommand, options: &LiveOptions) -> Result<()> {
    let config = AppConfig::new();
    let mut settings = config.live.clone();
    if let Some(dir) = &options.results_dir {
        settings = settings.with_results_dir(dir);
    }
    if let Some(value) = options.retention_hours {
        settings.retention = hours(value);
    }
    if let Some(value) = options.staleness_hours {
        settings.staleness_cutoff = hours(value);
    }
    if let Some(value) = options.threshold {
        settings.full_bracket_threshold = value;
    }

    let pool = open_database(&config)?;
    let moderation = CachedModeration::new(SqliteModeration::new(pool.clone()), LIVE_MODERATION_TTL);
    let aggregator = LiveAggregator::new(pool, moderation, settings);

    match show_live(&aggregator, view, options) {
        Err(e) if e.is_no_data() => {
            println!("{}", e.to_string().yellow());
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), LiveDataError> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize live view")?;
    println!("{}", json);
    Ok(())
}

fn show_live<M>(aggregator: &LiveAggregator<M>, view: &LiveCommand, options: &LiveOptions) -> Result<(), LiveDataError>
where
    M: services::moderation::ModerationLookup,
{
    let include_shun = options.include_shun;
    match view {
        LiveCommand::Top { league } => {
            let top = aggregator.top_progress(*league, include_shun)?;
            if options.json {
                return print_json(&top);
            }
            let names = top.display_names();
            let mut best: BTreeMap<&str, (i32, usize)> = BTreeMap::new();
            for row in top.rows() {
                let entry = best.entry(row.player_id.as_str()).or_insert((row.wave, 0));
                entry.0 = entry.0.max(row.wave);
                entry.1 += 1;
            }
            let mut ordered: Vec<_> = best.into_iter().collect();
            ordered.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.0.cmp(b.0)));

            println!("Top {} in {}", ordered.len(), league);
            for (idx, (player_id, (wave, samples))) in ordered.iter().enumerate() {
                let name = names.get(*player_id).map(String::as_str).unwrap_or(*player_id);
                println!("{:>3}. {:<30} {:>6}  ({} samples)", idx + 1, name, wave, samples);
            }
        }
        LiveCommand::Latest { league } => {
            let rows = aggregator.latest_standings(*league, include_shun)?;
            if options.json {
                return print_json(&rows);
            }
            let table = live::LiveTable::from_rows(rows);
            let names = table.display_names();
            if let Some(latest) = table.latest_time() {
                println!("{} standings at {}", league, latest);
            }
            for (idx, row) in table.rows().iter().enumerate() {
                let name = names.get(&row.player_id).unwrap_or(&row.real_name);
                println!("{:>5}. {:<30} {:>6}  {}", idx + 1, name, row.wave, row.bracket);
            }
        }
        LiveCommand::Placement { league, wave } => {
            let reports = aggregator.placement(*league, *wave, include_shun)?;
            if options.json {
                return print_json(&reports);
            }
            println!("Wave {} in {} ({} full brackets)", wave, league, reports.len());
            println!("{:<20} {:>8} {:>8} {:>8} {:>6}  started", "bracket", "place", "top", "median", "above");
            for report in &reports {
                let place = if report.rank == 1 {
                    report.would_place().green()
                } else {
                    report.would_place().normal()
                };
                println!(
                    "{:<20} {:>8} {:>8} {:>8} {:>6}  {}",
                    report.bracket, place, report.top_wave, report.median_wave, report.players_above, report.start_time
                );
            }
        }
        LiveCommand::Entry { player_id, league } => {
            let entered = match league {
                Some(league) => aggregator.check_live_entry(*league, player_id)?,
                None => aggregator.check_any_live_entry(player_id),
            };
            if options.json {
                return print_json(&entered);
            }
            if entered {
                println!("{}", format!("{} has entered", player_id).green());
            } else {
                println!("{}", format!("{} has not entered", player_id).yellow());
            }
        }
        LiveCommand::Progress { league } => match aggregator.fill_progress(*league)? {
            Some(points) if options.json => print_json(&points)?,
            Some(points) => {
                println!("{} fill-up against the last public tournament", league);
                for point in &points {
                    println!("  {:>6.2}h  {:>6}", point.hours, point.joined);
                }
            }
            None => println!("{}", "No reference data available".yellow()),
        },
        LiveCommand::Brackets { league } => match aggregator.bracket_stats(*league, include_shun)? {
            Some(stats) if options.json => print_json(&stats)?,
            Some(stats) => {
                println!("{} full brackets: {}", league, stats.total_brackets);
                println!("  highest total:  {}", stats.highest_total);
                println!("  lowest total:   {}", stats.lowest_total);
                println!("  highest median: {}", stats.highest_median);
                println!("  lowest median:  {}", stats.lowest_median);
            }
            None => println!("{}", "No full brackets yet".yellow()),
        },
    }
    Ok(())
}
