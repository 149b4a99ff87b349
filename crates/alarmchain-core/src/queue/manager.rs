//! Scheduling core.
//!
//! Expands enabled alarms into chain links, ranks them, and keeps the
//! notification service's limited pending pool filled with the most urgent
//! links that are not registered yet.
//!
//! All state lives behind a single async mutex, so structural mutations of
//! the candidate set and the registered set never interleave. Every
//! capacity-sensitive operation synchronizes against the notification
//! service first: registrations can disappear without this process noticing
//! (delivery, user clearing them, OS eviction).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, Offset, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::event::{by_fire_date, by_urgency, identifier_belongs_to, parse_chain_identifier};
use super::interval::ChainIntervalCalculator;
use super::persistence::{QueueState, QueueStore};
use super::priority::{PriorityStrategy, PriorityTier};
use super::ScheduledEvent;
use crate::alarm::{Alarm, AlarmId, AlarmStore, AudioRef, Occurrence};
use crate::clock::Clock;
use crate::error::{EngineError, GatewayError, Result};
use crate::gateway::{AuthorizationStatus, NotificationScheduler};

/// Occurrence anchors closer than this are treated as the same occurrence.
const OCCURRENCE_TOLERANCE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Pending slots the engine may occupy at once.
    pub max_external_slots: usize,
    /// Upper bound on registrations done by a quick refill.
    pub quick_refill_batch: usize,
    /// Offset used to turn alarm wall-clock times into instants.
    pub utc_offset: FixedOffset,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_external_slots: 60,
            quick_refill_batch: 8,
            utc_offset: Utc.fix(),
        }
    }
}

/// Outcome of a registration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    pub registered: Vec<String>,
    pub failed: Vec<String>,
    /// Registrations withdrawn to make room for a ringing chain.
    pub evicted: Vec<String>,
    /// Orphaned registrations withdrawn during a full refill.
    pub pruned: Vec<String>,
}

/// Outcome of reconciling against the notification service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pending: usize,
    /// Identifiers we believed registered that the service no longer holds.
    pub lost: Vec<String>,
    /// Identifiers the service holds that we did not know about.
    pub found: usize,
}

/// Diagnostics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub version: u64,
    pub candidates: usize,
    pub registered: usize,
    pub unregistered_candidates: usize,
    pub max_external_slots: usize,
    pub free_slots: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub by_tier: BTreeMap<PriorityTier, usize>,
    pub active_chain: Option<AlarmId>,
    pub active_occurrence: Option<DateTime<Utc>>,
}

/// Links registered for the occurrence that is currently ringing.
#[derive(Debug, Clone)]
struct ActiveChain {
    alarm_id: AlarmId,
    occurrence: DateTime<Utc>,
    ids: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct QueueInner {
    candidates: Vec<ScheduledEvent>,
    alarms: HashMap<AlarmId, Alarm>,
    /// Last known pending set of the notification service.
    registered: BTreeSet<String>,
    version: u64,
    last_sync: Option<DateTime<Utc>>,
    active_chain: Option<ActiveChain>,
}

impl QueueInner {
    fn free_slots(&self, max: usize) -> usize {
        max.saturating_sub(self.registered.len())
    }

    fn mark_registered(&mut self, id: &str, registered: bool) {
        for c in self.candidates.iter_mut().filter(|c| c.id == id) {
            c.is_registered = registered;
        }
    }

    fn select(&self, count: usize, now: DateTime<Utc>) -> Vec<ScheduledEvent> {
        if count == 0 {
            return Vec::new();
        }
        // Past-due links are left for the next rebuild to drop; registering
        // them would re-ring an occurrence that already fired.
        let mut eligible: Vec<ScheduledEvent> = self
            .candidates
            .iter()
            .filter(|c| !c.is_registered && !self.registered.contains(&c.id) && c.fire_date > now)
            .cloned()
            .collect();
        eligible.sort_by(by_urgency);
        eligible.truncate(count);
        eligible
    }

    fn snapshot(&self) -> QueueState {
        QueueState {
            registered_identifiers: self.registered.clone(),
            version: self.version,
            last_sync_timestamp: self.last_sync,
        }
    }
}

/// Whether two occurrence anchors name the same firing of an alarm.
pub fn same_occurrence(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    (a - b).num_seconds().abs() < OCCURRENCE_TOLERANCE_SECS
}

pub struct NotificationQueueManager {
    alarms: Arc<dyn AlarmStore>,
    scheduler: Arc<NotificationScheduler>,
    store: Arc<dyn QueueStore>,
    priority: Arc<dyn PriorityStrategy>,
    intervals: ChainIntervalCalculator,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    state: Mutex<QueueInner>,
}

impl NotificationQueueManager {
    pub fn new(
        alarms: Arc<dyn AlarmStore>,
        scheduler: Arc<NotificationScheduler>,
        store: Arc<dyn QueueStore>,
        priority: Arc<dyn PriorityStrategy>,
        intervals: ChainIntervalCalculator,
        clock: Arc<dyn Clock>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            alarms,
            scheduler,
            store,
            priority,
            intervals,
            clock,
            settings,
            state: Mutex::new(QueueInner::default()),
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load the last persisted snapshot, then correct it against the
    /// notification service. Called once per launch.
    pub async fn restore(&self) -> SyncReport {
        let mut inner = self.state.lock().await;
        match self.store.load().await {
            Ok(Some(state)) => {
                info!(
                    registered = state.registered_identifiers.len(),
                    version = state.version,
                    "restored queue snapshot"
                );
                inner.registered = state.registered_identifiers;
                inner.version = inner.version.max(state.version);
                inner.last_sync = state.last_sync_timestamp;
            }
            Ok(None) => debug!("no queue snapshot to restore"),
            Err(e) => warn!(error = %e, "failed to load queue snapshot, starting empty"),
        }
        let report = self.synchronize_locked(&mut inner).await;
        self.persist_locked(&inner).await;
        report
    }

    /// Re-expand every enabled alarm into the candidate set.
    ///
    /// Returns the number of candidates. Expanding twice without alarm
    /// changes yields the same identifiers.
    pub async fn rebuild_queue(&self) -> Result<usize> {
        let mut inner = self.state.lock().await;
        self.rebuild_locked(&mut inner)
    }

    /// Most urgent unregistered candidates, at most `limit` minus what is
    /// already registered.
    pub async fn select_next(&self, limit: usize) -> Vec<ScheduledEvent> {
        let inner = self.state.lock().await;
        let count = limit.saturating_sub(inner.registered.len());
        inner.select(count, self.clock.now())
    }

    /// Synchronize, then register the next most urgent candidates up to
    /// `limit` occupied slots (never more than `max_external_slots`).
    pub async fn schedule_next(&self, limit: usize) -> Result<ScheduleReport> {
        let mut inner = self.state.lock().await;
        self.ensure_authorized().await?;
        self.synchronize_locked(&mut inner).await;
        let limit = limit.min(self.settings.max_external_slots);
        let count = limit.saturating_sub(inner.registered.len());
        let batch = inner.select(count, self.clock.now());
        self.register_candidates(&mut inner, batch).await
    }

    /// Reconcile registration flags against what the service actually holds.
    pub async fn synchronize(&self) -> SyncReport {
        let mut inner = self.state.lock().await;
        let report = self.synchronize_locked(&mut inner).await;
        self.persist_locked(&inner).await;
        report
    }

    /// Full pass: rebuild, synchronize, withdraw orphans, fill every free slot.
    pub async fn refill(&self) -> Result<ScheduleReport> {
        let mut inner = self.state.lock().await;
        self.ensure_authorized().await?;
        self.rebuild_locked(&mut inner)?;
        self.synchronize_locked(&mut inner).await;
        let pruned = self.prune_orphans_locked(&mut inner).await;

        let count = inner.free_slots(self.settings.max_external_slots);
        let batch = inner.select(count, self.clock.now());
        let mut report = self.register_candidates(&mut inner, batch).await?;
        report.pruned = pruned;
        info!(
            registered = report.registered.len(),
            failed = report.failed.len(),
            pruned = report.pruned.len(),
            pending = inner.registered.len(),
            "queue refilled"
        );
        Ok(report)
    }

    /// Cheap refill for hot paths: no rebuild, at most `limit` registrations.
    pub async fn quick_refill(&self, limit: usize) -> Result<ScheduleReport> {
        let mut inner = self.state.lock().await;
        self.ensure_authorized().await?;
        self.synchronize_locked(&mut inner).await;
        let count = limit.min(inner.free_slots(self.settings.max_external_slots));
        let batch = inner.select(count, self.clock.now());
        self.register_candidates(&mut inner, batch).await
    }

    /// Forget every candidate of `alarm_id` and withdraw its registrations,
    /// including a pending snooze. Returns the number of withdrawn
    /// registrations.
    pub async fn remove_alarm(&self, alarm_id: &AlarmId) -> usize {
        let mut inner = self.state.lock().await;

        let mut ids: BTreeSet<String> = inner
            .candidates
            .iter()
            .filter(|c| &c.alarm_id == alarm_id)
            .map(|c| c.id.clone())
            .collect();
        ids.extend(
            inner
                .registered
                .iter()
                .filter(|id| identifier_belongs_to(id, alarm_id))
                .cloned(),
        );
        if inner
            .active_chain
            .as_ref()
            .is_some_and(|chain| &chain.alarm_id == alarm_id)
        {
            if let Some(chain) = inner.active_chain.take() {
                ids.extend(chain.ids);
            }
        }

        inner.candidates.retain(|c| &c.alarm_id != alarm_id);
        inner.alarms.remove(alarm_id);

        let ids: Vec<String> = ids.into_iter().collect();
        self.scheduler.cancel(&ids).await;
        let withdrawn = ids.iter().filter(|id| inner.registered.remove(*id)).count();
        info!(alarm_id = %alarm_id, withdrawn, "removed alarm from queue");

        self.persist_locked(&inner).await;
        withdrawn
    }

    /// Withdraw every pending registration, ours or not. Candidates are kept
    /// and come back with the next refill.
    pub async fn clear_all(&self) -> usize {
        let mut inner = self.state.lock().await;
        self.scheduler.cancel_all().await;
        let withdrawn = inner.registered.len();
        inner.registered.clear();
        inner.active_chain = None;
        for c in inner.candidates.iter_mut() {
            c.is_registered = false;
        }
        inner.version += 1;
        info!(withdrawn, "cleared all pending registrations");

        self.persist_locked(&inner).await;
        withdrawn
    }

    /// Withdraw every link of one occurrence and drop those links from the
    /// candidate set, so later refills do not re-register them.
    pub async fn cancel_chain(&self, alarm_id: &AlarmId, occurrence: DateTime<Utc>) -> usize {
        let mut inner = self.state.lock().await;

        let in_chain = |c: &ScheduledEvent| {
            &c.alarm_id == alarm_id && same_occurrence(c.occurrence, occurrence)
        };
        let mut ids: BTreeSet<String> = inner
            .candidates
            .iter()
            .filter(|c| in_chain(c))
            .map(|c| c.id.clone())
            .collect();
        if inner
            .active_chain
            .as_ref()
            .is_some_and(|chain| &chain.alarm_id == alarm_id)
        {
            if let Some(chain) = inner.active_chain.take() {
                ids.extend(chain.ids);
            }
        }
        inner.candidates.retain(|c| !in_chain(c));

        if ids.is_empty() {
            return 0;
        }
        let ids: Vec<String> = ids.into_iter().collect();
        self.scheduler.cancel(&ids).await;
        let mut withdrawn = 0;
        for id in &ids {
            if inner.registered.remove(id) {
                withdrawn += 1;
            }
            // Another occurrence may share the identifier.
            inner.mark_registered(id, false);
        }
        debug!(alarm_id = %alarm_id, withdrawn, "cancelled chain");

        self.persist_locked(&inner).await;
        withdrawn
    }

    /// Make sure the remaining links of a ringing occurrence are registered.
    ///
    /// If every link already lies in the past, the chain is re-anchored just
    /// after now. When there are not enough free slots, the least urgent
    /// registrations of other alarms are withdrawn; they stay candidates and
    /// come back with a later refill.
    pub async fn ensure_chain(
        &self,
        alarm_id: &AlarmId,
        title: &str,
        audio: Option<&AudioRef>,
        occurrence: DateTime<Utc>,
    ) -> Result<ScheduleReport> {
        let mut inner = self.state.lock().await;
        self.ensure_authorized().await?;
        self.synchronize_locked(&mut inner).await;

        let now = self.clock.now();
        let weekday = self.occurrence_weekday(alarm_id, occurrence);
        let count = self.priority.chain_count(PriorityTier::Critical);
        let link = |index: usize, fire: DateTime<Utc>| {
            ScheduledEvent::new(
                alarm_id.clone(),
                weekday,
                index as u32,
                occurrence,
                fire,
                PriorityTier::Critical,
            )
        };

        let mut links: Vec<ScheduledEvent> = self
            .intervals
            .link_dates(occurrence, audio, count)
            .into_iter()
            .enumerate()
            .filter(|(_, fire)| *fire > now)
            .map(|(i, fire)| link(i, fire))
            .collect();
        if links.is_empty() {
            let step = self.intervals.interval(audio);
            links = self
                .intervals
                .link_dates(now + step, audio, count)
                .into_iter()
                .enumerate()
                .map(|(i, fire)| link(i, fire))
                .collect();
            debug!(alarm_id = %alarm_id, "re-anchored exhausted chain");
        }

        let needed = links
            .iter()
            .filter(|l| !inner.registered.contains(&l.id))
            .count();
        let free = inner.free_slots(self.settings.max_external_slots);
        let evicted = if needed > free {
            self.evict_locked(&mut inner, needed - free, alarm_id).await
        } else {
            Vec::new()
        };

        inner.active_chain = Some(ActiveChain {
            alarm_id: alarm_id.clone(),
            occurrence,
            ids: links.iter().map(|l| l.id.clone()).collect(),
        });

        let batch = links
            .into_iter()
            .map(|l| (l, title.to_string(), audio.cloned()))
            .collect();
        let mut report = self.register_batch(&mut inner, batch).await?;
        report.evicted = evicted;
        info!(
            alarm_id = %alarm_id,
            registered = report.registered.len(),
            evicted = report.evicted.len(),
            "chain registered for ringing alarm"
        );
        Ok(report)
    }

    /// Bump the diagnostics version counter.
    pub async fn increment_queue_version(&self) -> u64 {
        let mut inner = self.state.lock().await;
        inner.version += 1;
        inner.version
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn status(&self) -> QueueStatus {
        let inner = self.state.lock().await;
        let mut by_tier = BTreeMap::new();
        for c in &inner.candidates {
            *by_tier.entry(c.priority).or_insert(0) += 1;
        }
        QueueStatus {
            version: inner.version,
            candidates: inner.candidates.len(),
            registered: inner.registered.len(),
            unregistered_candidates: inner.candidates.iter().filter(|c| !c.is_registered).count(),
            max_external_slots: self.settings.max_external_slots,
            free_slots: inner.free_slots(self.settings.max_external_slots),
            last_sync: inner.last_sync,
            by_tier,
            active_chain: inner.active_chain.as_ref().map(|c| c.alarm_id.clone()),
            active_occurrence: inner.active_chain.as_ref().map(|c| c.occurrence),
        }
    }

    /// Candidate set, ordered by fire date.
    pub async fn candidates(&self) -> Vec<ScheduledEvent> {
        self.state.lock().await.candidates.clone()
    }

    pub async fn registered_identifiers(&self) -> BTreeSet<String> {
        self.state.lock().await.registered.clone()
    }

    pub async fn version(&self) -> u64 {
        self.state.lock().await.version
    }

    // ── Internal ─────────────────────────────────────────────────────

    async fn ensure_authorized(&self) -> Result<()> {
        if self.scheduler.authorization().await == AuthorizationStatus::Denied {
            warn!("notification permission denied, scheduling aborted");
            return Err(EngineError::AuthorizationDenied);
        }
        Ok(())
    }

    fn rebuild_locked(&self, inner: &mut QueueInner) -> Result<usize> {
        let now = self.clock.now();
        let alarms = self.alarms.fetch_enabled_alarms()?;

        let mut candidates = Vec::new();
        let mut by_id = HashMap::with_capacity(alarms.len());
        for alarm in alarms {
            let occurrences = match alarm.occurrences(now, self.settings.utc_offset) {
                Ok(o) => o,
                Err(e) => {
                    warn!(alarm_id = %alarm.id, error = %e, "skipping alarm with invalid schedule");
                    continue;
                }
            };
            for occurrence in occurrences {
                candidates.extend(self.expand(&alarm, occurrence, now));
            }
            by_id.insert(alarm.id.clone(), alarm);
        }

        for c in candidates.iter_mut() {
            c.is_registered = inner.registered.contains(&c.id);
        }
        candidates.sort_by(by_fire_date);

        inner.candidates = candidates;
        inner.alarms = by_id;
        inner.version += 1;
        debug!(
            candidates = inner.candidates.len(),
            alarms = inner.alarms.len(),
            version = inner.version,
            "queue rebuilt"
        );
        Ok(inner.candidates.len())
    }

    fn expand(&self, alarm: &Alarm, occurrence: Occurrence, now: DateTime<Utc>) -> Vec<ScheduledEvent> {
        let tier = self.priority.calculate_priority(occurrence.fire_date, now);
        let count = self.priority.chain_count(tier);
        self.intervals
            .link_dates(occurrence.fire_date, alarm.audio.as_ref(), count)
            .into_iter()
            .enumerate()
            .map(|(i, fire)| {
                ScheduledEvent::new(
                    alarm.id.clone(),
                    occurrence.weekday,
                    i as u32,
                    occurrence.fire_date,
                    fire,
                    tier,
                )
            })
            .collect()
    }

    fn occurrence_weekday(&self, alarm_id: &AlarmId, occurrence: DateTime<Utc>) -> Option<u8> {
        match self.alarms.fetch_alarm(alarm_id) {
            Ok(Some(alarm)) if alarm.is_repeating() => Some(
                occurrence
                    .with_timezone(&self.settings.utc_offset)
                    .weekday()
                    .num_days_from_sunday() as u8,
            ),
            Ok(_) => None,
            Err(e) => {
                warn!(alarm_id = %alarm_id, error = %e, "could not read alarm, assuming one-shot");
                None
            }
        }
    }

    async fn synchronize_locked(&self, inner: &mut QueueInner) -> SyncReport {
        let pending = self.scheduler.pending().await;
        let report = SyncReport {
            pending: pending.len(),
            lost: inner.registered.difference(&pending).cloned().collect(),
            found: pending.difference(&inner.registered).count(),
        };
        for c in inner.candidates.iter_mut() {
            c.is_registered = pending.contains(&c.id);
        }
        inner.registered = pending;
        inner.last_sync = Some(self.clock.now());
        if !report.lost.is_empty() || report.found > 0 {
            debug!(
                pending = report.pending,
                lost = report.lost.len(),
                found = report.found,
                "registration drift corrected"
            );
        }
        report
    }

    /// Withdraw chain registrations that belong to no candidate and no
    /// ringing chain (alarm deleted or disabled while we were not running).
    async fn prune_orphans_locked(&self, inner: &mut QueueInner) -> Vec<String> {
        let orphans: Vec<String> = {
            let mut known: BTreeSet<&str> =
                inner.candidates.iter().map(|c| c.id.as_str()).collect();
            if let Some(chain) = &inner.active_chain {
                known.extend(chain.ids.iter().map(String::as_str));
            }
            inner
                .registered
                .iter()
                .filter(|id| parse_chain_identifier(id).is_some() && !known.contains(id.as_str()))
                .cloned()
                .collect()
        };
        if orphans.is_empty() {
            return orphans;
        }
        self.scheduler.cancel(&orphans).await;
        for id in &orphans {
            inner.registered.remove(id);
        }
        info!(count = orphans.len(), "withdrew orphaned registrations");
        orphans
    }

    /// Withdraw up to `n` registered candidates of alarms other than
    /// `keep`, least urgent first.
    async fn evict_locked(&self, inner: &mut QueueInner, n: usize, keep: &AlarmId) -> Vec<String> {
        let mut victims: Vec<&ScheduledEvent> = inner
            .candidates
            .iter()
            .filter(|c| c.is_registered && &c.alarm_id != keep)
            .collect();
        victims.sort_by(|a, b| by_urgency(b, a));
        let ids: Vec<String> = victims.into_iter().take(n).map(|c| c.id.clone()).collect();
        if ids.is_empty() {
            return ids;
        }
        self.scheduler.cancel(&ids).await;
        for id in &ids {
            inner.registered.remove(id);
            inner.mark_registered(id, false);
        }
        ids
    }

    async fn register_candidates(
        &self,
        inner: &mut QueueInner,
        events: Vec<ScheduledEvent>,
    ) -> Result<ScheduleReport> {
        let batch = events
            .into_iter()
            .filter_map(|event| match inner.alarms.get(&event.alarm_id) {
                Some(alarm) => {
                    let title = alarm.title();
                    let audio = alarm.audio.clone();
                    Some((event, title, audio))
                }
                None => {
                    debug!(event_id = %event.id, "owning alarm vanished, skipping");
                    None
                }
            })
            .collect();
        self.register_batch(inner, batch).await
    }

    async fn register_batch(
        &self,
        inner: &mut QueueInner,
        batch: Vec<(ScheduledEvent, String, Option<AudioRef>)>,
    ) -> Result<ScheduleReport> {
        let mut report = ScheduleReport::default();
        for (event, title, audio) in batch {
            match self
                .scheduler
                .schedule_with(&event, &title, audio.as_ref())
                .await
            {
                Ok(()) => {
                    inner.registered.insert(event.id.clone());
                    inner.mark_registered(&event.id, true);
                    report.registered.push(event.id);
                }
                Err(GatewayError::AuthorizationDenied) => {
                    self.persist_locked(inner).await;
                    warn!("notification permission revoked mid-pass");
                    return Err(EngineError::AuthorizationDenied);
                }
                Err(GatewayError::CapacityExceeded { capacity }) => {
                    // Our occupancy count was stale; the next pass resynchronizes.
                    warn!(capacity, event_id = %event.id, "notification service full, stopping pass");
                    report.failed.push(event.id);
                    break;
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "registration failed, will retry on next refill");
                    report.failed.push(event.id);
                }
            }
        }
        self.persist_locked(inner).await;
        Ok(report)
    }

    async fn persist_locked(&self, inner: &QueueInner) {
        if let Err(e) = self.store.save(&inner.snapshot()).await {
            warn!(error = %e, "failed to persist queue snapshot");
        }
    }
}
