use anyhow::Result;

use tower_standings::cli::Command;
use tower_standings::{
    handle_completions, handle_enqueue, handle_flag, handle_import, handle_import_dir, handle_live, handle_queue_status,
    handle_recalc, handle_reset_retries, handle_unflag, handle_verify, handle_worker, interpret,
};

fn main() {
    setup_logging();
    parse_and_execute().unwrap_or_else(|e| {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    });
}

fn setup_logging() {
    sensible_env_logger::init!();
}

fn parse_and_execute() -> Result<()> {
    let command = interpret();
    execute_command(&command)
}

fn execute_command(command: &Command) -> Result<()> {
    match command {
        Command::Import {
            file,
            league,
            date,
            private,
        } => handle_import(file, *league, *date, *private),
        Command::ImportDir { dir, league, private } => handle_import_dir(dir, *league, *private),
        Command::Worker {
            max_retries,
            delay,
            one_shot,
        } => handle_worker(*max_retries, *delay, *one_shot),
        Command::Recalc {
            tournament_id,
            dry_run,
            verbose,
        } => handle_recalc(*tournament_id, *dry_run, *verbose),
        Command::QueueStatus { detailed, max_retries } => handle_queue_status(*detailed, *max_retries),
        Command::Enqueue { tournament_ids } => handle_enqueue(tournament_ids),
        Command::ResetRetries {
            tournament_id,
            max_retries,
        } => handle_reset_retries(*tournament_id, *max_retries),
        Command::Flag { player_id, kind, reason } => handle_flag(player_id, *kind, reason.as_deref()),
        Command::Unflag { player_id, kind } => handle_unflag(player_id, *kind),
        Command::Verify { player_id, name } => handle_verify(player_id, name),
        Command::Live { view, options } => handle_live(view, options),
        Command::Completions { shell } => handle_completions(*shell),
    }
}
