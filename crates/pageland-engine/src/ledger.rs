//! Side effects of a fired ad event: event log, history and deposit

use chrono::Duration;
use pageland_core::{AdInfo, AdType, AdsConfig, AdsResult, Clock, ConfirmationType};
use pageland_history::{
    build_ad_history_item, AdEventLog, AdHistoryItem, AdHistoryStore, Database, ReactionStore,
};
use std::sync::Arc;

use crate::deposit::{DepositRequest, DepositSink};
use crate::events::{AdEventNotification, AdHistoryEvent, EventBus};

pub struct AdLedger {
    clock: Arc<dyn Clock>,
    history: AdHistoryStore,
    ad_events: AdEventLog,
    reactions: ReactionStore,
    deposits: Arc<dyn DepositSink>,
    retention_period: Duration,
    history_events: EventBus<AdHistoryEvent>,
    notifications: EventBus<AdEventNotification>,
}

impl AdLedger {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        config: &AdsConfig,
        deposits: Arc<dyn DepositSink>,
    ) -> Self {
        let retention_period = config.history.retention_period();
        Self {
            history: AdHistoryStore::new(
                db.clone(),
                clock.clone(),
                retention_period,
                config.history.batch_size,
            ),
            ad_events: AdEventLog::new(db.clone(), clock.clone(), retention_period),
            reactions: ReactionStore::new(db, clock.clone()),
            clock,
            deposits,
            retention_period,
            history_events: EventBus::new(),
            notifications: EventBus::new(),
        }
    }

    pub fn history(&self) -> &AdHistoryStore {
        &self.history
    }

    pub fn ad_events(&self) -> &AdEventLog {
        &self.ad_events
    }

    pub fn reactions(&self) -> &ReactionStore {
        &self.reactions
    }

    pub fn history_events(&self) -> &EventBus<AdHistoryEvent> {
        &self.history_events
    }

    pub fn notifications(&self) -> &EventBus<AdEventNotification> {
        &self.notifications
    }

    pub fn has_fired(&self, placement_id: &str, confirmation_type: ConfirmationType) -> AdsResult<bool> {
        self.ad_events.has_fired(placement_id, confirmation_type)
    }

    /// Records that `confirmation_type` fired for `ad`. Confirmable events are
    /// also appended to history and deposited; the new history item is
    /// returned for those.
    pub fn confirm(
        &self,
        ad: &AdInfo,
        confirmation_type: ConfirmationType,
        title: &str,
        description: &str,
    ) -> AdsResult<Option<AdHistoryItem>> {
        if !confirmation_type.is_confirmable() {
            self.ad_events.record(ad, confirmation_type)?;
            return Ok(None);
        }

        let item = build_ad_history_item(
            ad,
            confirmation_type,
            title,
            description,
            self.clock.now(),
        );
        self.history.save_with_event(&item)?;
        self.history_events
            .publish(AdHistoryEvent::DidAddAdHistoryItem { item: item.clone() });

        self.deposit(ad, confirmation_type);

        Ok(Some(item))
    }

    /// Hands a deposit to the sink. Failures are logged and dropped.
    pub fn deposit(&self, ad: &AdInfo, confirmation_type: ConfirmationType) {
        let request = DepositRequest::new(ad, confirmation_type, self.clock.now());
        match self.deposits.deposit(&request) {
            Ok(()) => log::debug!(
                "Deposited {} for creative instance {}",
                confirmation_type,
                ad.creative_instance_id
            ),
            Err(e) => log::warn!(
                "Failed to deposit {} for creative instance {}: {}",
                confirmation_type,
                ad.creative_instance_id,
                e
            ),
        }
    }

    pub fn purge_expired_deposits(&self) -> AdsResult<usize> {
        self.deposits
            .purge_expired(self.clock.now() - self.retention_period)
    }

    pub fn notify_did_fire(&self, ad: &AdInfo, confirmation_type: ConfirmationType) {
        log::info!(
            "Fired {} {} event for placement {}",
            ad.ad_type,
            confirmation_type,
            ad.placement_id
        );
        self.notifications.publish(AdEventNotification::DidFireAdEvent {
            ad: ad.clone(),
            confirmation_type,
        });
    }

    pub fn notify_failed_to_fire(
        &self,
        ad_type: AdType,
        placement_id: &str,
        creative_instance_id: &str,
        confirmation_type: ConfirmationType,
    ) {
        log::info!(
            "Failed to fire {} {} event for placement {}",
            ad_type,
            confirmation_type,
            placement_id
        );
        self.notifications
            .publish(AdEventNotification::FailedToFireAdEvent {
                ad_type,
                placement_id: placement_id.to_string(),
                creative_instance_id: creative_instance_id.to_string(),
                confirmation_type,
            });
    }
}
