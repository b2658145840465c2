use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::League;
use crate::services::moderation::ModerationKind;

#[derive(Parser, Debug)]
#[command(author, version, about = "tournament standings: ranking recalculation and live results")]
pub struct Cli {
    /// Command
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Import one results export as a tournament
    Import {
        /// Results csv file
        file: PathBuf,
        #[arg(short, long)]
        league: League,
        /// Tournament date (defaults to the date in the file name)
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Keep the tournament hidden from public results
        #[arg(long)]
        private: bool,
    },
    /// Import every YYYY-MM-DD.csv in a directory that is not imported yet
    ImportDir {
        dir: PathBuf,
        #[arg(short, long)]
        league: League,
        #[arg(long)]
        private: bool,
    },
    /// Process tournaments marked for recalculation
    Worker {
        /// Attempts per tournament before it needs an operator reset
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
        /// Seconds to wait when the queue is empty
        #[arg(long, default_value_t = 0.5)]
        delay: f64,
        /// Process at most one tournament and exit
        #[arg(long)]
        one_shot: bool,
    },
    /// Recompute the positions of one tournament now
    Recalc {
        tournament_id: i64,
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
        /// Log every position change
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show the recalculation queue
    QueueStatus {
        /// List upcoming and exhausted tournaments
        #[arg(short, long)]
        detailed: bool,
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
    },
    /// Mark tournaments for recalculation
    Enqueue {
        #[arg(required = true)]
        tournament_ids: Vec<i64>,
    },
    /// Clear the retry counter of exhausted tournaments
    ResetRetries {
        /// Only this tournament (defaults to all exhausted ones)
        tournament_id: Option<i64>,
        #[arg(long, default_value_t = 3)]
        max_retries: u32,
    },
    /// Add a moderation record
    Flag {
        player_id: String,
        #[arg(short, long, default_value = "sus")]
        kind: ModerationKind,
        #[arg(short, long)]
        reason: Option<String>,
    },
    /// Resolve active moderation records
    Unflag {
        player_id: String,
        #[arg(short, long, default_value = "sus")]
        kind: ModerationKind,
    },
    /// Record the verified real name of a player
    Verify { player_id: String, name: String },
    /// Views over the running tournament
    Live {
        #[clap(subcommand)]
        view: LiveCommand,
        #[command(flatten)]
        options: LiveOptions,
    },
    /// Print shell completions
    Completions { shell: Shell },
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct LiveOptions {
    /// Directory holding the <League>_live snapshot directories
    #[arg(long, global = true)]
    pub results_dir: Option<PathBuf>,
    /// Hours of snapshots merged into one view
    #[arg(long, global = true)]
    pub retention_hours: Option<f64>,
    /// Snapshots older than this many hours do not count as live
    #[arg(long, global = true)]
    pub staleness_hours: Option<f64>,
    /// Distinct players needed for a bracket to count as full
    #[arg(long, global = true)]
    pub threshold: Option<usize>,
    /// Keep shunned players in the view
    #[arg(long, global = true)]
    pub include_shun: bool,
    /// Print the view as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
#[clap(rename_all = "kebab-case")]
pub enum LiveCommand {
    /// Progress of the top players
    Top { league: League },
    /// Standings of the newest snapshot
    Latest { league: League },
    /// Where a wave would place in each full bracket
    Placement { league: League, wave: i32 },
    /// Whether a player has entered the running tournament
    Entry {
        player_id: String,
        /// Only this league (defaults to all)
        #[arg(short, long)]
        league: Option<League>,
    },
    /// How many of the last tournament's players have joined
    Progress { league: League },
    /// Bracket statistics of the newest snapshot
    Brackets { league: League },
}
