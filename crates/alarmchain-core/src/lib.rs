//! # Alarmchain Core Library
//!
//! This library keeps alarms audible on platforms that cap how many pending
//! notifications an application may hold and that silence an application
//! once it leaves the foreground. Each alarm occurrence is expanded into a
//! chain of notifications spaced by the alarm sound's length, and a bounded
//! queue decides which links occupy the scarce external slots.
//!
//! ## Architecture
//!
//! - **Queue**: Priority tiers, chain interval calculation and the queue
//!   manager that registers, reconciles and persists notification links
//! - **Gateway**: Traits over the host notification service and the optional
//!   platform-managed alarm backend, plus an in-memory notification center
//! - **Playback**: Foreground (in-app audio) and background (notification
//!   chain) strategies for a ringing alarm
//! - **Orchestrator**: Owns the ringing alarm and switches strategies as the
//!   application changes visibility
//! - **Storage**: SQLite alarm storage, TOML configuration and the JSON queue
//!   snapshot
//!
//! ## Key Components
//!
//! - [`AlarmEngine`]: Composition root and host entry points
//! - [`NotificationQueueManager`]: Bounded chain notification queue
//! - [`AlarmChainOrchestrator`]: Ringing alarm state machine
//! - [`EngineConfig`]: Application configuration management

pub mod alarm;
pub mod clock;
pub mod engine;
pub mod error;
pub mod events;
pub mod gateway;
pub mod orchestrator;
pub mod playback;
pub mod queue;
pub mod storage;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use alarm::{Alarm, AlarmId, AlarmStore, AudioRef, MemoryAlarmStore};
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{AlarmEngine, AlarmEngineBuilder};
pub use error::{
    ConfigError, EngineError, GatewayError, PersistenceError, ScheduleError, StoreError,
};
pub use events::AlarmEvent;
pub use gateway::{
    AlarmScheduler, AuthorizationStatus, InMemoryNotificationCenter, ManagedAlarmService,
    NotificationContent, NotificationGateway, SchedulerKind,
};
pub use orchestrator::{AlarmChainOrchestrator, LogPresenter, Presenter};
pub use playback::{AlarmContext, AudioDriver, StrategyKind, Visibility};
pub use queue::{
    NotificationQueueManager, PriorityTier, QueueStatus, ScheduleReport, ScheduledEvent,
    SyncReport,
};
pub use storage::{Database, EngineConfig, FileQueueStore};
