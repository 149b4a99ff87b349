//! SQLite-based alarm storage.
//!
//! Provides persistent storage for user alarms (time, repeat days, sound,
//! snooze length).

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::data_dir;
use crate::alarm::{Alarm, AlarmId, AlarmStore, AudioRef};
use crate::error::StoreError;

/// Raw column values of one `alarms` row.
type AlarmRow = (
    String,
    String,
    i64,
    i64,
    bool,
    String,
    Option<String>,
    Option<i64>,
    Option<i64>,
);

const ALARM_COLUMNS: &str =
    "id, label, hour, minute, enabled, repeat_days, audio_name, audio_bytes, snooze_minutes";

/// SQLite database holding the user's alarms.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/alarmchain/alarmchain.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::DataDir(e.to_string()))?;
        Self::open_at(dir.join("alarmchain.db"))
    }

    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn().execute_batch(
            "CREATE TABLE IF NOT EXISTS alarms (
                id             TEXT PRIMARY KEY,
                label          TEXT NOT NULL DEFAULT '',
                hour           INTEGER NOT NULL,
                minute         INTEGER NOT NULL,
                enabled        INTEGER NOT NULL DEFAULT 1,
                repeat_days    TEXT NOT NULL DEFAULT '',
                audio_name     TEXT,
                audio_bytes    INTEGER,
                snooze_minutes INTEGER,
                updated_at     TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_alarms_enabled ON alarms(enabled);",
        )?;
        Ok(())
    }

    /// Insert or replace an alarm.
    pub fn upsert_alarm(&self, alarm: &Alarm) -> Result<(), StoreError> {
        let repeat_days = alarm
            .repeat_days
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.conn().execute(
            "INSERT INTO alarms (id, label, hour, minute, enabled, repeat_days,
                                 audio_name, audio_bytes, snooze_minutes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                label = excluded.label,
                hour = excluded.hour,
                minute = excluded.minute,
                enabled = excluded.enabled,
                repeat_days = excluded.repeat_days,
                audio_name = excluded.audio_name,
                audio_bytes = excluded.audio_bytes,
                snooze_minutes = excluded.snooze_minutes,
                updated_at = excluded.updated_at",
            params![
                alarm.id.as_str(),
                alarm.label,
                alarm.hour,
                alarm.minute,
                alarm.enabled,
                repeat_days,
                alarm.audio.as_ref().map(|a| a.name.as_str()),
                alarm.audio.as_ref().map(|a| a.byte_size as i64),
                alarm.snooze_minutes,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_alarm(&self, id: &AlarmId) -> Result<Option<Alarm>, StoreError> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {ALARM_COLUMNS} FROM alarms WHERE id = ?1"),
                params![id.as_str()],
                read_row,
            )
            .optional()?;
        row.map(decode_row).transpose()
    }

    /// All alarms ordered by time of day.
    pub fn list_alarms(&self) -> Result<Vec<Alarm>, StoreError> {
        self.query_alarms("")
    }

    /// Returns false when no alarm has this id.
    pub fn delete_alarm(&self, id: &AlarmId) -> Result<bool, StoreError> {
        let changed = self
            .conn()
            .execute("DELETE FROM alarms WHERE id = ?1", params![id.as_str()])?;
        Ok(changed > 0)
    }

    /// Returns false when no alarm has this id.
    pub fn set_enabled(&self, id: &AlarmId, enabled: bool) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE alarms SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled, Utc::now().to_rfc3339(), id.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn query_alarms(&self, filter: &str) -> Result<Vec<Alarm>, StoreError> {
        self.query_rows(filter)?.into_iter().map(decode_row).collect()
    }

    fn query_rows(&self, filter: &str) -> Result<Vec<AlarmRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALARM_COLUMNS} FROM alarms {filter} ORDER BY hour, minute, id"
        ))?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AlarmRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn decode_row(row: AlarmRow) -> Result<Alarm, StoreError> {
    let (id, label, hour, minute, enabled, repeat_days, audio_name, audio_bytes, snooze) = row;
    let corrupt = |message: String| StoreError::Corrupt {
        id: id.clone(),
        message,
    };

    let hour = u32::try_from(hour).map_err(|_| corrupt(format!("hour {hour}")))?;
    let minute = u32::try_from(minute).map_err(|_| corrupt(format!("minute {minute}")))?;
    let repeat_days: BTreeSet<u8> = repeat_days
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim()
                .parse::<u8>()
                .map_err(|_| corrupt(format!("repeat day '{s}'")))
        })
        .collect::<Result<_, _>>()?;
    let audio = match (audio_name, audio_bytes) {
        (Some(name), Some(bytes)) => Some(AudioRef::new(
            name,
            u64::try_from(bytes).map_err(|_| corrupt(format!("audio size {bytes}")))?,
        )),
        _ => None,
    };
    let snooze_minutes = snooze
        .map(|m| u32::try_from(m).map_err(|_| corrupt(format!("snooze {m}"))))
        .transpose()?;

    Ok(Alarm {
        id: AlarmId::new(id.clone()),
        label,
        hour,
        minute,
        enabled,
        repeat_days,
        audio,
        snooze_minutes,
    })
}

impl AlarmStore for Database {
    /// Rows that fail to decode are logged and skipped; one corrupt alarm
    /// must not keep the others from being scheduled.
    fn fetch_enabled_alarms(&self) -> Result<Vec<Alarm>, StoreError> {
        let alarms = self
            .query_rows("WHERE enabled = 1")?
            .into_iter()
            .filter_map(|row| match decode_row(row) {
                Ok(alarm) => Some(alarm),
                Err(e) => {
                    warn!(error = %e, "skipping corrupt alarm row");
                    None
                }
            })
            .collect();
        Ok(alarms)
    }

    fn fetch_alarm(&self, id: &AlarmId) -> Result<Option<Alarm>, StoreError> {
        self.get_alarm(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_roundtrip() {
        let db = Database::open_memory().unwrap();
        let alarm = Alarm::new("a", 6, 45)
            .with_label("Gym")
            .with_repeat([1, 3, 5])
            .with_audio(AudioRef::new("birds.caf", 1_093_680))
            .with_snooze(5);
        db.upsert_alarm(&alarm).unwrap();
        assert_eq!(db.get_alarm(&"a".into()).unwrap(), Some(alarm));
        assert!(db.get_alarm(&"missing".into()).unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_existing_alarm() {
        let db = Database::open_memory().unwrap();
        db.upsert_alarm(&Alarm::new("a", 6, 45)).unwrap();
        db.upsert_alarm(&Alarm::new("a", 7, 0).with_label("Later")).unwrap();
        let all = db.list_alarms().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!((all[0].hour, all[0].minute), (7, 0));
        assert_eq!(all[0].label, "Later");
    }

    #[test]
    fn only_enabled_alarms_are_fetched() {
        let db = Database::open_memory().unwrap();
        db.upsert_alarm(&Alarm::new("b", 9, 0)).unwrap();
        db.upsert_alarm(&Alarm::new("a", 7, 0)).unwrap();
        db.upsert_alarm(&Alarm::new("off", 8, 0).disabled()).unwrap();

        let enabled = db.fetch_enabled_alarms().unwrap();
        let ids: Vec<&str> = enabled.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(db.set_enabled(&"off".into(), true).unwrap());
        assert_eq!(db.fetch_enabled_alarms().unwrap().len(), 3);
        assert!(!db.set_enabled(&"nope".into(), true).unwrap());
    }

    #[test]
    fn delete_reports_whether_row_existed() {
        let db = Database::open_memory().unwrap();
        db.upsert_alarm(&Alarm::new("a", 7, 0)).unwrap();
        assert!(db.delete_alarm(&"a".into()).unwrap());
        assert!(!db.delete_alarm(&"a".into()).unwrap());
    }

    #[test]
    fn corrupt_repeat_days_are_reported() {
        let db = Database::open_memory().unwrap();
        db.upsert_alarm(&Alarm::new("a", 7, 0)).unwrap();
        db.conn()
            .execute("UPDATE alarms SET repeat_days = 'x' WHERE id = 'a'", [])
            .unwrap();
        assert!(matches!(
            db.get_alarm(&"a".into()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn corrupt_row_does_not_hide_healthy_alarms() {
        let db = Database::open_memory().unwrap();
        db.upsert_alarm(&Alarm::new("good", 8, 0)).unwrap();
        db.upsert_alarm(&Alarm::new("bad", 7, 0)).unwrap();
        db.conn()
            .execute("UPDATE alarms SET repeat_days = 'x' WHERE id = 'bad'", [])
            .unwrap();

        let enabled = db.fetch_enabled_alarms().unwrap();
        let ids: Vec<&str> = enabled.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
        // Direct lookups still surface the corruption.
        assert!(matches!(
            db.fetch_alarm(&"bad".into()),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn refill_schedules_healthy_alarms_past_corrupt_row() {
        use crate::clock::FixedClock;
        use crate::gateway::{InMemoryNotificationCenter, NotificationScheduler};
        use crate::queue::{
            ChainIntervalCalculator, MemoryQueueStore, NotificationQueueManager, QueueSettings,
            TieredPriorityStrategy,
        };
        use chrono::TimeZone;
        use std::sync::Arc;

        let db = Database::open_memory().unwrap();
        db.upsert_alarm(&Alarm::new("good", 8, 0)).unwrap();
        db.upsert_alarm(&Alarm::new("bad", 9, 0)).unwrap();
        db.conn()
            .execute("UPDATE alarms SET repeat_days = 'x' WHERE id = 'bad'", [])
            .unwrap();

        let center = Arc::new(InMemoryNotificationCenter::default());
        let queue = NotificationQueueManager::new(
            Arc::new(db),
            Arc::new(NotificationScheduler::new(center.clone())),
            Arc::new(MemoryQueueStore::new()),
            Arc::new(TieredPriorityStrategy::default()),
            ChainIntervalCalculator::default(),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap())),
            QueueSettings::default(),
        );

        let report = queue.refill().await.unwrap();
        assert_eq!(report.registered.len(), 15);
        assert!(report.registered.iter().all(|id| id.starts_with("good-")));
        assert_eq!(center.pending_count(), 15);
    }

    #[test]
    fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.upsert_alarm(&Alarm::new("a", 7, 0)).unwrap();
        }
        let reopened = Database::open_at(&path).unwrap();
        assert_eq!(reopened.list_alarms().unwrap().len(), 1);
    }
}
