//! Migrate command - schema management for one SQL tier.

use std::time::Duration;

use crate::cli::args::{MigrateAction, MigrateArgs, MigrateTarget};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::infra::{Database, MigrationState};

fn target_url(target: MigrateTarget, config: &Config) -> AppResult<&str> {
    let (url, var) = match target {
        MigrateTarget::Mysql => (config.mysql_url.as_deref(), "MYSQL_URL"),
        MigrateTarget::Hosted => (config.hosted_database_url.as_deref(), "HOSTED_DATABASE_URL"),
    };
    url.ok_or_else(|| AppError::BadRequest(format!("{} is not set", var)))
}

pub async fn execute(args: MigrateArgs, config: Config) -> AppResult<()> {
    let url = target_url(args.target, &config)?;
    tracing::info!(target = ?args.target, action = ?args.action, "Running migration command");

    let db = Database::connect(url, Duration::from_secs(config.http_timeout_seconds)).await?;

    match args.action {
        MigrateAction::Up => {
            db.migrate_up().await?;
            tracing::info!("Schema is up to date");
        }
        MigrateAction::Down => {
            db.migrate_down().await?;
            tracing::info!("Rolled back the latest migration");
        }
        MigrateAction::Status => print_status(&db.migration_states().await?),
        MigrateAction::Fresh => {
            tracing::warn!(target = ?args.target, "Dropping all tables");
            db.migrate_fresh().await?;
            tracing::info!("Schema recreated");
        }
    }

    Ok(())
}

fn print_status(states: &[MigrationState]) {
    let pending = states.iter().filter(|s| !s.applied).count();
    for state in states {
        let mark = if state.applied { "applied" } else { "pending" };
        println!("{:<8} {}", mark, state.name);
    }
    println!("{} migrations, {} pending", states.len(), pending);
}
