use pageland_core::config::OptIns;
use pageland_core::{AdType, ConfirmationType};
use std::collections::VecDeque;

use super::AdEventHandler;

/// Completion for a queued viewed event, called with whether it fired
pub type ViewedCallback = Box<dyn FnOnce(bool) + Send>;

pub(super) struct PendingViewedEvent {
    pub placement_id: String,
    pub creative_instance_id: String,
    pub callback: ViewedCallback,
}

/// Search result ads. Viewed events go through a process-wide queue so only
/// one is in flight at a time.
#[derive(Default)]
pub struct SearchResultAdEventHandler {
    ad_viewed_event_queue: VecDeque<PendingViewedEvent>,
    trigger_ad_viewed_event_in_progress: bool,
}

impl SearchResultAdEventHandler {
    pub(super) fn enqueue(
        &mut self,
        placement_id: &str,
        creative_instance_id: &str,
        callback: ViewedCallback,
    ) {
        self.ad_viewed_event_queue.push_back(PendingViewedEvent {
            placement_id: placement_id.to_string(),
            creative_instance_id: creative_instance_id.to_string(),
            callback,
        });
    }

    /// Takes the next queued event unless one is already in flight
    pub(super) fn start_next(&mut self) -> Option<PendingViewedEvent> {
        if self.trigger_ad_viewed_event_in_progress {
            return None;
        }
        let pending = self.ad_viewed_event_queue.pop_front()?;
        self.trigger_ad_viewed_event_in_progress = true;
        Some(pending)
    }

    pub(super) fn finish(&mut self) {
        self.trigger_ad_viewed_event_in_progress = false;
    }

    pub fn pending_len(&self) -> usize {
        self.ad_viewed_event_queue.len()
    }
}

impl AdEventHandler for SearchResultAdEventHandler {
    fn ad_type(&self) -> AdType {
        AdType::SearchResultAd
    }

    fn is_opted_in(&self, opt_ins: &OptIns) -> bool {
        opt_ins.search_result_ads
    }

    fn supports(&self, confirmation_type: ConfirmationType) -> bool {
        matches!(
            confirmation_type,
            ConfirmationType::ViewedImpression | ConfirmationType::Clicked
        )
    }
}
