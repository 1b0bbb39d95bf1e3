//! Site visit tracking and ad event triggering for Pageland
//!
//! Everything here runs on one logical sequence. Timers are kept in a
//! [`TimerQueue`] that the host drains through [`AdsContext::run_due_timers`].

pub mod catalog;
pub mod context;
pub mod deposit;
pub mod dispatcher;
pub mod events;
pub mod ledger;
pub mod maintenance;
pub mod reminders;
pub mod site_visit;
pub mod tabs;
pub mod timers;

#[cfg(test)]
mod tests;

pub use catalog::{CreativeAdCatalog, InMemoryCatalog};
pub use context::AdsContext;
pub use deposit::{DepositRequest, DepositSink, RecordingDepositSink};
pub use dispatcher::AdEventDispatcher;
pub use events::{AdEventNotification, AdHistoryEvent, EventBus, ReminderEvent, SiteVisitEvent};
pub use ledger::AdLedger;
pub use maintenance::{PurgeStats, RetentionMaintenance};
pub use reminders::ReminderEngine;
pub use site_visit::{PageLand, PageLandResolution, SiteVisitTracker};
pub use tabs::{TabChange, TabRegistry};
pub use timers::{TimerId, TimerQueue, TimerTask};
