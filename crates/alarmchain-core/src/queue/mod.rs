//! Chain expansion, ranking and the registration queue.

mod event;
mod interval;
mod manager;
mod persistence;
mod priority;

pub use event::{
    by_fire_date, by_urgency, identifier_belongs_to, parse_chain_identifier, ChainIdentifier,
    ScheduledEvent,
};
pub use interval::{AudioFormat, ChainIntervalCalculator};
pub use manager::{
    same_occurrence, NotificationQueueManager, QueueSettings, QueueStatus, ScheduleReport, SyncReport,
};
pub use persistence::{MemoryQueueStore, QueueState, QueueStore};
pub use priority::{ChainLengths, PriorityStrategy, PriorityTier, TieredPriorityStrategy};
