use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{Alarm, AlarmId};
use crate::error::StoreError;

/// Read-only view of the application's alarms.
///
/// The engine never writes through this trait.
pub trait AlarmStore: Send + Sync {
    fn fetch_enabled_alarms(&self) -> Result<Vec<Alarm>, StoreError>;

    fn fetch_alarm(&self, id: &AlarmId) -> Result<Option<Alarm>, StoreError>;
}

/// Alarm store held in memory (tests and simulations).
#[derive(Debug, Default)]
pub struct MemoryAlarmStore {
    alarms: Mutex<BTreeMap<AlarmId, Alarm>>,
}

impl MemoryAlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alarms(alarms: impl IntoIterator<Item = Alarm>) -> Self {
        let store = Self::new();
        for alarm in alarms {
            store.upsert(alarm);
        }
        store
    }

    pub fn upsert(&self, alarm: Alarm) {
        self.lock().insert(alarm.id.clone(), alarm);
    }

    pub fn remove(&self, id: &AlarmId) -> Option<Alarm> {
        self.lock().remove(id)
    }

    pub fn set_enabled(&self, id: &AlarmId, enabled: bool) -> bool {
        match self.lock().get_mut(id) {
            Some(alarm) => {
                alarm.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<AlarmId, Alarm>> {
        self.alarms.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AlarmStore for MemoryAlarmStore {
    fn fetch_enabled_alarms(&self) -> Result<Vec<Alarm>, StoreError> {
        Ok(self.lock().values().filter(|a| a.enabled).cloned().collect())
    }

    fn fetch_alarm(&self, id: &AlarmId) -> Result<Option<Alarm>, StoreError> {
        Ok(self.lock().get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_alarms_are_not_fetched() {
        let store = MemoryAlarmStore::with_alarms([
            Alarm::new("on", 7, 0),
            Alarm::new("off", 8, 0).disabled(),
        ]);
        let enabled = store.fetch_enabled_alarms().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id.as_str(), "on");
        assert!(store.fetch_alarm(&"off".into()).unwrap().is_some());
    }

    #[test]
    fn toggling_enabled_flag() {
        let store = MemoryAlarmStore::with_alarms([Alarm::new("a", 7, 0)]);
        assert!(store.set_enabled(&"a".into(), false));
        assert!(store.fetch_enabled_alarms().unwrap().is_empty());
        assert!(!store.set_enabled(&"missing".into(), true));
    }
}
