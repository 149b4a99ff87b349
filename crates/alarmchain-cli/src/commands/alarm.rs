//! Alarm management commands for CLI.

use std::collections::BTreeSet;

use alarmchain_core::alarm::weekday_label;
use alarmchain_core::{Alarm, AlarmId, AudioRef, Database};
use chrono::{NaiveTime, Timelike};
use clap::Subcommand;
use uuid::Uuid;

use super::CliResult;

#[derive(Subcommand)]
pub enum AlarmAction {
    /// Create a new alarm
    Add {
        /// Time of day, HH:MM (24h)
        time: String,
        /// Alarm label
        #[arg(long)]
        label: Option<String>,
        /// Comma-separated repeat days (sun,mon,... or 0-6); omit for one-shot
        #[arg(long)]
        days: Option<String>,
        /// Sound name
        #[arg(long, requires = "sound_bytes")]
        sound: Option<String>,
        /// Size of the sound file in bytes
        #[arg(long, requires = "sound")]
        sound_bytes: Option<u64>,
        /// Snooze length in minutes
        #[arg(long)]
        snooze: Option<u32>,
        /// Alarm ID (default: generated)
        #[arg(long)]
        id: Option<String>,
    },
    /// List alarms
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one alarm as JSON
    Get {
        /// Alarm ID
        id: String,
    },
    /// Delete an alarm
    Remove {
        /// Alarm ID
        id: String,
    },
    /// Enable an alarm
    Enable {
        /// Alarm ID
        id: String,
    },
    /// Disable an alarm
    Disable {
        /// Alarm ID
        id: String,
    },
}

pub fn run(action: AlarmAction) -> CliResult {
    let db = Database::open()?;

    match action {
        AlarmAction::Add {
            time,
            label,
            days,
            sound,
            sound_bytes,
            snooze,
            id,
        } => {
            let (hour, minute) = parse_time(&time)?;
            let id = id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
            let mut alarm = Alarm::new(id, hour, minute);
            if let Some(label) = label {
                alarm = alarm.with_label(label);
            }
            if let Some(days) = days {
                alarm = alarm.with_repeat(parse_days(&days)?);
            }
            if let (Some(name), Some(bytes)) = (sound, sound_bytes) {
                alarm = alarm.with_audio(AudioRef::new(name, bytes));
            }
            if let Some(minutes) = snooze {
                if minutes == 0 {
                    return Err("snooze must be at least 1 minute".into());
                }
                alarm = alarm.with_snooze(minutes);
            }
            alarm.validate()?;
            db.upsert_alarm(&alarm)?;
            println!("Alarm created: {}", alarm.id);
            println!("{}", serde_json::to_string_pretty(&alarm)?);
        }
        AlarmAction::List { json } => {
            let alarms = db.list_alarms()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&alarms)?);
            } else if alarms.is_empty() {
                println!("no alarms");
            } else {
                for alarm in &alarms {
                    println!("{}", describe(alarm));
                }
            }
        }
        AlarmAction::Get { id } => match db.get_alarm(&AlarmId::new(id.as_str()))? {
            Some(alarm) => println!("{}", serde_json::to_string_pretty(&alarm)?),
            None => return Err(format!("alarm not found: {id}").into()),
        },
        AlarmAction::Remove { id } => {
            if !db.delete_alarm(&AlarmId::new(id.as_str()))? {
                return Err(format!("alarm not found: {id}").into());
            }
            println!("Alarm removed: {id}");
        }
        AlarmAction::Enable { id } => set_enabled(&db, &id, true)?,
        AlarmAction::Disable { id } => set_enabled(&db, &id, false)?,
    }
    Ok(())
}

fn set_enabled(db: &Database, id: &str, enabled: bool) -> CliResult {
    if !db.set_enabled(&AlarmId::new(id), enabled)? {
        return Err(format!("alarm not found: {id}").into());
    }
    println!("Alarm {}: {id}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn describe(alarm: &Alarm) -> String {
    let days = if alarm.is_repeating() {
        alarm
            .repeat_days
            .iter()
            .map(|&d| weekday_label(d))
            .collect::<Vec<_>>()
            .join(",")
    } else {
        "once".to_string()
    };
    let state = if alarm.enabled { "on" } else { "off" };
    format!(
        "{}  {:02}:{:02}  {:<20}  {:<3}  {}",
        alarm.id,
        alarm.hour,
        alarm.minute,
        days,
        state,
        alarm.title()
    )
}

fn parse_time(s: &str) -> Result<(u32, u32), String> {
    let time = NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| format!("invalid time '{s}', expected HH:MM"))?;
    Ok((time.hour(), time.minute()))
}

fn parse_days(s: &str) -> Result<BTreeSet<u8>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            let lower = d.to_ascii_lowercase();
            if let Ok(n) = lower.parse::<u8>() {
                return if n <= 6 {
                    Ok(n)
                } else {
                    Err(format!("invalid day '{d}'"))
                };
            }
            (0..=6u8)
                .find(|&n| lower.starts_with(weekday_label(n)))
                .ok_or_else(|| format!("invalid day '{d}'"))
        })
        .collect()
}
