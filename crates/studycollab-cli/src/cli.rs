use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use studycollab_core::config::SyncStrategy;
use studycollab_core::models::{ConflictChoice, ConflictResolution, OperationType, SyncPriority};

#[derive(Parser)]
#[command(name = "studycollab")]
#[command(about = "Inspect and sync StudyCollab's offline cache and queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to config.json
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show connectivity, queue and cache status
    Status {
        /// Skip the network probe
        #[arg(long)]
        no_probe: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read and write cached rows
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Inspect or add queued changes
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Replay queued changes against the remote store
    Sync {
        /// Override the configured strategy
        #[arg(long, value_name = "STRATEGY")]
        strategy: Option<SyncStrategy>,
        /// Override the configured conflict resolution
        #[arg(long, value_name = "RESOLUTION")]
        resolution: Option<ConflictResolution>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch rows changed remotely into the cache
    Pull {
        /// Remote table
        table: String,
        /// Only rows updated after this Unix ms timestamp
        #[arg(long, value_name = "MS")]
        since: Option<i64>,
    },
    /// Failed changes that left the queue
    Errors {
        #[command(subcommand)]
        command: ErrorCommands,
    },
    /// Sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Manage config.json
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Print a cached row
    Get {
        key: String,
        /// Output the full entry as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store a row
    Put {
        key: String,
        /// Row as JSON
        data: String,
        /// Time to live in milliseconds
        #[arg(long, value_name = "MS")]
        ttl_ms: Option<u64>,
    },
    /// Remove a row
    Evict { key: String },
    /// Show hit/miss statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Purge expired rows
    Cleanup,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued changes in drain order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a change locally and queue it
    Add {
        /// CREATE, UPDATE or DELETE
        op: OperationType,
        /// Remote table
        table: String,
        /// Row as JSON; must include `id` unless creating
        data: String,
        /// HIGH, MEDIUM or LOW
        #[arg(long, default_value = "MEDIUM")]
        priority: SyncPriority,
    },
}

#[derive(Subcommand)]
pub enum ErrorCommands {
    /// List recorded sync errors
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue a failed change again
    Retry {
        /// Error ID or unique ID prefix
        id: String,
    },
    /// Drop a failed change
    Dismiss {
        /// Error ID or unique ID prefix
        id: String,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List recorded conflicts, newest first
    List {
        /// Only conflicts awaiting a decision
        #[arg(long)]
        pending: bool,
        /// Number of conflicts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Settle a conflict parked by the MANUAL strategy
    Resolve {
        id: i64,
        /// Side to keep
        #[arg(long, value_enum)]
        keep: KeepSide,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Write config.json with defaults and the given remote settings
    Init {
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Default sync strategy
        #[arg(long, value_name = "STRATEGY")]
        strategy: Option<SyncStrategy>,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KeepSide {
    Local,
    Remote,
}

impl From<KeepSide> for ConflictChoice {
    fn from(side: KeepSide) -> Self {
        match side {
            KeepSide::Local => Self::KeepLocal,
            KeepSide::Remote => Self::KeepRemote,
        }
    }
}
