//! Reminds the user when they keep clicking the same ad

use chrono::{DateTime, Duration, Utc};
use pageland_core::{AdType, AdsConfig, AdsResult, ConfirmationType};
use pageland_history::{AdHistoryItem, AdHistoryStore};
use std::collections::HashMap;

use crate::events::{EventBus, ReminderEvent, ReminderType};
use crate::timers::{TimerId, TimerQueue, TimerTask};

pub struct ReminderEngine {
    is_mobile_platform: bool,
    remind_after_clicks: u32,
    maybe_show_reminder_after: Duration,
    pending: HashMap<String, TimerId>,
    events: EventBus<ReminderEvent>,
}

impl ReminderEngine {
    pub fn new(config: &AdsConfig) -> Self {
        Self {
            is_mobile_platform: config.is_mobile_platform,
            remind_after_clicks: config.reminders.remind_user_if_clicking_the_same_ad_after,
            maybe_show_reminder_after: config.reminders.maybe_show_reminder_after(),
            pending: HashMap::new(),
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus<ReminderEvent> {
        &self.events
    }

    /// Starts the debounce for a clicked notification ad. A click while the
    /// debounce is running restarts it.
    pub fn on_did_add_ad_history_item(
        &mut self,
        item: &AdHistoryItem,
        timers: &mut TimerQueue<TimerTask>,
        now: DateTime<Utc>,
    ) {
        if self.is_mobile_platform
            || self.remind_after_clicks == 0
            || item.ad_type != AdType::NotificationAd
            || item.confirmation_type != ConfirmationType::Clicked
        {
            return;
        }

        if let Some(timer) = self.pending.remove(&item.creative_instance_id) {
            timers.cancel(timer);
        }

        let timer = timers.schedule(
            now + self.maybe_show_reminder_after,
            TimerTask::Reminder {
                creative_instance_id: item.creative_instance_id.clone(),
            },
        );
        self.pending
            .insert(item.creative_instance_id.clone(), timer);
    }

    /// Returns whether a reminder was raised
    pub fn on_timer_fired(
        &mut self,
        creative_instance_id: &str,
        history: &AdHistoryStore,
    ) -> AdsResult<bool> {
        self.pending.remove(creative_instance_id);

        let clicks = history
            .get_for_creative_instance_id(creative_instance_id)?
            .iter()
            .filter(|item| item.confirmation_type == ConfirmationType::Clicked)
            .count();

        if !should_remind(clicks, self.remind_after_clicks) {
            return Ok(false);
        }

        log::info!(
            "Clicked creative instance {} {} times",
            creative_instance_id,
            clicks
        );
        self.events.publish(ReminderEvent::RemindUser {
            reminder: ReminderType::ClickedSameAdMultipleTimes,
            creative_instance_id: creative_instance_id.to_string(),
        });
        Ok(true)
    }

    pub fn cancel_all(&mut self, timers: &mut TimerQueue<TimerTask>) {
        for (_, timer) in self.pending.drain() {
            timers.cancel(timer);
        }
    }
}

/// True at every multiple of `remind_after_clicks`
fn should_remind(clicks: usize, remind_after_clicks: u32) -> bool {
    let n = remind_after_clicks as usize;
    n > 0 && clicks > 0 && (clicks - 1) % n == n - 1
}
