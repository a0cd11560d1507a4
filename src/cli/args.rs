//! CLI argument definitions.

use clap::{Parser, Subcommand, ValueEnum};

/// Invoice Desk - invoices and users over tiered storage
#[derive(Parser, Debug)]
#[command(name = "invoice-desk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Manage the schema of a SQL tier
    Migrate(MigrateArgs),

    /// Inspect or replay the offline change log
    Sync(SyncArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "SERVER_HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "3000", env = "SERVER_PORT")]
    pub port: u16,
}

#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Which SQL tier to migrate
    #[arg(short, long, value_enum, default_value = "mysql")]
    pub target: MigrateTarget,

    #[command(subcommand)]
    pub action: MigrateAction,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrateTarget {
    /// MYSQL_URL
    Mysql,
    /// HOSTED_DATABASE_URL
    Hosted,
}

#[derive(Subcommand, Debug)]
pub enum MigrateAction {
    /// Run pending migrations
    Up,
    /// Rollback last migration
    Down,
    /// Show migration status
    Status,
    /// Reset and re-run all migrations
    Fresh,
}

#[derive(Parser, Debug)]
pub struct SyncArgs {
    #[command(subcommand)]
    pub action: SyncAction,
}

#[derive(Subcommand, Debug)]
pub enum SyncAction {
    /// Print tier health and pending changes
    Status,
    /// Push pending offline changes to the first reachable remote tier
    Replay,
}
