// CLI module
// Argument definitions; handlers live in commands.rs

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

pub use commands::{handle_command, parse_field, parse_since, CommandContext};

/// Quality-gated content generation with learned thresholds
#[derive(Parser, Debug)]
#[command(name = "adaptgen")]
#[command(version)]
#[command(about = "Quality-gated content generation with learned thresholds and parameter selection")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to $ADAPTGEN_CONFIG, then ~/.adaptgen/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate content for one subject through the quality gate
    Run {
        #[arg(long)]
        category: String,
        #[arg(long)]
        subject: String,
        /// Context field passed to the generator, as key=value (repeatable)
        #[arg(long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        #[command(flatten)]
        gate: GateArgs,
    },

    /// Generate content for every subject in a CSV file (needs a subject_id column)
    Batch {
        #[arg(long)]
        category: String,
        #[arg(long)]
        subjects: PathBuf,
        /// Subjects in flight at once
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
        #[command(flatten)]
        gate: GateArgs,
    },

    /// Show the learned threshold and its relaxation schedule
    Threshold {
        #[arg(long)]
        category: String,
        /// Record the computed threshold in the audit history
        #[arg(long)]
        record: bool,
    },

    /// Show parameter sweet spots and excluded parameters
    SweetSpots {
        #[arg(long)]
        category: String,
    },

    /// List logged attempts
    History {
        #[arg(long)]
        category: String,
        #[arg(long)]
        subject: Option<String>,
        /// Only accepted attempts
        #[arg(long)]
        accepted: bool,
        /// Only attempts from this run
        #[arg(long)]
        run: Option<uuid::Uuid>,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long, value_parser = parse_since)]
        since: Option<chrono::DateTime<chrono::Utc>>,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long, value_parser = parse_since)]
        until: Option<chrono::DateTime<chrono::Utc>>,
        /// Show only the most recent N attempts
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Per-category acceptance statistics
    Stats {
        /// Limit to one category (default: every configured category)
        #[arg(long)]
        category: Option<String>,
    },

    /// Show recorded threshold changes over time
    ThresholdsHistory {
        #[arg(long)]
        category: String,
    },
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct GateArgs {
    /// Gate on the static default threshold instead of the learned one
    #[arg(long)]
    pub static_threshold: bool,
    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}
