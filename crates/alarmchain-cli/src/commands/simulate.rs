//! Dry run of the stored alarms.
//!
//! Drives the real engine with a manual clock over an in-process
//! notification center, answering every ring the way a user would, and
//! prints each lifecycle event as one JSON line.

use std::sync::Arc;

use alarmchain_core::clock::{Clock, FixedClock};
use alarmchain_core::gateway::InMemoryNotificationCenter;
use alarmchain_core::{AlarmEvent, FileQueueStore, Visibility};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use tracing::info;

use super::{offline_engine, CliResult};

#[derive(Args)]
pub struct SimulateArgs {
    /// How far ahead to simulate
    #[arg(long, default_value = "24")]
    hours: u32,
    /// Clock step between delivery checks
    #[arg(long, default_value = "15")]
    step_secs: u32,
    /// How long each alarm rings before the user reacts
    #[arg(long, default_value = "60")]
    ring_secs: u32,
    /// Snooze every first ring of an occurrence instead of dismissing it
    #[arg(long)]
    snooze: bool,
    /// Run with the app in the background (chain notifications only)
    #[arg(long)]
    background: bool,
}

pub async fn run(args: SimulateArgs) -> CliResult {
    if args.step_secs == 0 {
        return Err("step must be at least 1 second".into());
    }
    let start = Utc::now();
    let clock = Arc::new(FixedClock::new(start));
    let center = Arc::new(InMemoryNotificationCenter::default());
    let visibility = if args.background {
        Visibility::Background
    } else {
        Visibility::Foreground
    };
    let engine = offline_engine(
        center.clone(),
        Arc::new(FileQueueStore::in_data_dir()?),
        clock.clone(),
        visibility,
    )?;

    let report = engine.start().await?;
    info!(
        registered = report.registered.len(),
        hours = args.hours,
        "simulation started"
    );

    let end = start + Duration::hours(i64::from(args.hours));
    let step = Duration::seconds(i64::from(args.step_secs));
    let ring = Duration::seconds(i64::from(args.ring_secs));
    let mut ringing_since: Option<DateTime<Utc>> = None;
    let mut snoozed_current = false;
    let mut delivered_total = 0usize;
    let mut last_refill = start;

    while clock.now() < end {
        clock.advance(step);
        let now = clock.now();

        for delivered in center.deliver_due(now) {
            delivered_total += 1;
            if let Some(event) = engine.handle_delivered(&delivered.content).await? {
                if matches!(event, AlarmEvent::AlarmFired { .. }) {
                    ringing_since = Some(now);
                }
                emit(&event)?;
            }
        }

        if let Some(since) = ringing_since {
            if now - since >= ring {
                let event = if args.snooze && !snoozed_current {
                    snoozed_current = true;
                    engine.snooze(None).await?
                } else {
                    snoozed_current = false;
                    engine.orchestrator().handle_dismiss().await?
                };
                ringing_since = None;
                if let Some(event) = event {
                    emit(&event)?;
                }
            }
        }

        // A host app rebuilds at least on every launch; once an hour stands in for that.
        if now - last_refill >= Duration::hours(1) {
            engine.alarms_changed().await?;
            last_refill = now;
        }
    }

    let status = engine.queue().status().await;
    eprintln!(
        "simulated {}h: {} notifications delivered, {} still pending",
        args.hours, delivered_total, status.registered
    );
    Ok(())
}

fn emit(event: &AlarmEvent) -> CliResult {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
