pub mod alarm;
pub mod config;
pub mod queue;
pub mod simulate;

use std::sync::Arc;

use alarmchain_core::clock::Clock;
use alarmchain_core::gateway::InMemoryNotificationCenter;
use alarmchain_core::queue::QueueStore;
use alarmchain_core::{AlarmEngine, Database, EngineConfig, Visibility};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Engine over the stored alarms and config, registering into an
/// in-process notification center.
pub fn offline_engine(
    center: Arc<InMemoryNotificationCenter>,
    queue_store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
    visibility: Visibility,
) -> Result<AlarmEngine, Box<dyn std::error::Error>> {
    let config = EngineConfig::load()?;
    let db = Database::open()?;
    let engine = AlarmEngine::builder(config)
        .alarm_store(Arc::new(db))
        .gateway(center)
        .queue_store(queue_store)
        .clock(clock)
        .visibility(visibility)
        .build()?;
    Ok(engine)
}
