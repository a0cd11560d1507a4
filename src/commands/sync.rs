//! Sync command - offline change log status and replay.

use crate::cli::args::{SyncAction, SyncArgs};
use crate::commands::open_data_service;
use crate::config::Config;
use crate::errors::AppResult;
use crate::infra::WalOp;

fn describe(op: &WalOp) -> String {
    match op {
        WalOp::Upsert { invoice, .. } => format!("upsert {} ({})", invoice.number, invoice.id),
        WalOp::Delete { id, .. } => format!("delete {}", id),
    }
}

/// `status` only pings the tiers; pending changes stay in the log.
pub async fn execute(args: SyncArgs, config: Config) -> AppResult<()> {
    let data = open_data_service(&config).await?;
    data.check_tiers().await;

    match args.action {
        SyncAction::Status => {
            let status = data.status().await;
            println!("active: {}", status.active);
            for tier in &status.tiers {
                println!(
                    "{:<8} {:?} (consecutive failures: {})",
                    tier.kind.as_str(),
                    tier.state,
                    tier.consecutive_failures
                );
            }
            println!("pending changes: {}", status.pending_wal);
            for entry in data.pending_changes().await {
                println!("  #{} {} at {}", entry.seq, describe(&entry.op), entry.recorded_at);
            }
        }
        SyncAction::Replay => {
            if !data.has_remote() {
                tracing::warn!("No remote tier configured, nothing to replay to");
                return Ok(());
            }
            let report = data.replay().await?;
            match report.target {
                Some(target) => println!(
                    "replayed to {}: {} applied, {} conflicts, {} remaining",
                    target, report.applied, report.conflicts, report.remaining
                ),
                None => println!("no remote tier reachable, {} remaining", report.remaining),
            }
        }
    }

    Ok(())
}
