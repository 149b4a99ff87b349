//! Queue inspection commands for CLI.
//!
//! Both commands expand the stored alarms into a throwaway in-process
//! notification center; nothing is registered with the OS.

use std::sync::Arc;

use alarmchain_core::gateway::{InMemoryNotificationCenter, SchedulerKind};
use alarmchain_core::queue::{MemoryQueueStore, QueueState, QueueStatus, QueueStore};
use alarmchain_core::{FileQueueStore, SystemClock, Visibility};
use chrono::Local;
use clap::Subcommand;
use serde::Serialize;

use super::{offline_engine, CliResult};

#[derive(Subcommand)]
pub enum QueueAction {
    /// Show which chain links would occupy the pending slots right now
    Plan {
        /// Include candidates that did not get a slot
        #[arg(long)]
        all: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print queue diagnostics and the last persisted snapshot as JSON
    Status,
}

#[derive(Serialize)]
struct StatusOutput {
    backend: SchedulerKind,
    status: QueueStatus,
    /// Snapshot left by the last `simulate` run, if any.
    snapshot: Option<QueueState>,
}

pub async fn run(action: QueueAction) -> CliResult {
    let center = Arc::new(InMemoryNotificationCenter::default());
    let engine = offline_engine(
        center,
        Arc::new(MemoryQueueStore::new()),
        Arc::new(SystemClock),
        Visibility::Foreground,
    )?;
    let report = engine.alarms_changed().await?;

    match action {
        QueueAction::Plan { all, json } => {
            let events: Vec<_> = engine
                .queue()
                .candidates()
                .await
                .into_iter()
                .filter(|e| all || e.is_registered)
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
                return Ok(());
            }
            if events.is_empty() {
                println!("nothing to schedule");
                return Ok(());
            }
            for event in &events {
                println!(
                    "{}  {:<8}  {}  {}",
                    event.fire_date.with_timezone(&Local).format("%a %H:%M:%S"),
                    event.priority.as_str(),
                    if event.is_registered { "*" } else { " " },
                    event.id,
                );
            }
            println!(
                "{} registered, {} failed",
                report.registered.len(),
                report.failed.len()
            );
        }
        QueueAction::Status => {
            let status = engine.queue().status().await;
            let snapshot = FileQueueStore::in_data_dir()?.load().await?;
            let out = StatusOutput {
                backend: engine.scheduler_kind(),
                status,
                snapshot,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}
