//! Typed notification channels, one per event category

use chrono::Duration;
use pageland_core::{AdInfo, AdType, ConfirmationType, TabId};
use pageland_history::AdHistoryItem;
use serde::Serialize;
use std::fmt::Debug;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// In-memory fan-out channel. Publishing never blocks and never fails;
/// subscribers that fall behind by more than the capacity miss events.
#[derive(Debug)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E> EventBus<E>
where
    E: Clone + Debug,
{
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: E) {
        log::debug!("Publishing {:?}", event);
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

impl<E> Default for EventBus<E>
where
    E: Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

mod duration_ms {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_milliseconds())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SiteVisitEvent {
    MaybeLandOnPage {
        tab_id: TabId,
        ad: AdInfo,
        #[serde(rename = "after_ms", serialize_with = "duration_ms::serialize")]
        after: Duration,
    },
    DidSuspendPageLand {
        tab_id: TabId,
        #[serde(rename = "remaining_ms", serialize_with = "duration_ms::serialize")]
        remaining: Duration,
    },
    DidResumePageLand {
        tab_id: TabId,
        #[serde(rename = "remaining_ms", serialize_with = "duration_ms::serialize")]
        remaining: Duration,
    },
    DidLandOnPage {
        tab_id: TabId,
        ad: AdInfo,
    },
    DidNotLandOnPage {
        tab_id: TabId,
        ad: AdInfo,
    },
    CanceledPageLand {
        tab_id: TabId,
        ad: AdInfo,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdHistoryEvent {
    DidAddAdHistoryItem { item: AdHistoryItem },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderType {
    ClickedSameAdMultipleTimes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReminderEvent {
    RemindUser {
        reminder: ReminderType,
        creative_instance_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdEventNotification {
    DidFireAdEvent {
        ad: AdInfo,
        confirmation_type: ConfirmationType,
    },
    FailedToFireAdEvent {
        ad_type: AdType,
        placement_id: String,
        creative_instance_id: String,
        confirmation_type: ConfirmationType,
    },
}
