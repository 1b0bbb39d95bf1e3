//! Drives an [`AdsContext`] through a script on a manual clock

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use pageland_core::{Clock, ManualClock, TabId};
use pageland_engine::{
    AdEventNotification, AdHistoryEvent, AdsContext, ReminderEvent, SiteVisitEvent,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::script::{ScriptEvent, Step};

/// One published event as printed
#[derive(Debug, Serialize)]
pub struct OutputLine {
    pub at_ms: i64,
    pub channel: &'static str,
    #[serde(flatten)]
    pub event: Value,
}

pub struct Replayer {
    ads: AdsContext,
    clock: Arc<ManualClock>,
    start: DateTime<Utc>,
    site_visits: broadcast::Receiver<SiteVisitEvent>,
    ad_history: broadcast::Receiver<AdHistoryEvent>,
    reminders: broadcast::Receiver<ReminderEvent>,
    ad_events: broadcast::Receiver<AdEventNotification>,
    output: Vec<OutputLine>,
}

impl Replayer {
    pub fn new(ads: AdsContext, clock: Arc<ManualClock>) -> Self {
        Self {
            site_visits: ads.subscribe_site_visits(),
            ad_history: ads.subscribe_ad_history(),
            reminders: ads.subscribe_reminders(),
            ad_events: ads.subscribe_ad_events(),
            start: clock.now(),
            ads,
            clock,
            output: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn ads(&self) -> &AdsContext {
        &self.ads
    }

    /// Applies every step, then lets timers run for `drain_ms` past the last one
    pub fn run(&mut self, steps: &[Step], drain_ms: u64) -> anyhow::Result<Vec<OutputLine>> {
        for step in steps {
            let at = offset(self.start, step.at_ms)
                .with_context(|| format!("Step at {}ms is out of range", step.at_ms))?;
            self.advance_to(at);
            self.apply(&step.event);
            self.collect();
        }

        let end = offset(self.clock.now(), drain_ms)
            .with_context(|| format!("Drain of {}ms is out of range", drain_ms))?;
        self.advance_to(end);
        self.ads.shutdown();

        Ok(std::mem::take(&mut self.output))
    }

    /// Fires timers due up to `at` one deadline at a time
    fn advance_to(&mut self, at: DateTime<Utc>) {
        while let Some(deadline) = self.ads.next_timer_deadline() {
            if deadline > at {
                break;
            }
            if deadline > self.clock.now() {
                self.clock.set(deadline);
            }
            let fired = self.ads.run_due_timers();
            debug!("Fired {} timers at {}", fired, deadline);
            self.collect();
        }

        if at > self.clock.now() {
            self.clock.set(at);
        }
    }

    fn apply(&mut self, event: &ScriptEvent) {
        match event {
            ScriptEvent::OpenTab(state) => self.ads.on_did_open_new_tab(state.to_tab()),
            ScriptEvent::ChangeTab(state) => self.ads.on_tab_did_change(state.to_tab()),
            ScriptEvent::CloseTab { tab_id } => self.ads.on_did_close_tab(TabId(*tab_id)),
            ScriptEvent::FocusTab { tab_id } => {
                if !self.ads.on_tab_did_change_focus(TabId(*tab_id)) {
                    warn!("Cannot focus unknown tab {}", tab_id);
                }
            }
            ScriptEvent::Serve {
                ad_type,
                placement_id,
                creative_instance_id,
            } => {
                let served =
                    self.ads
                        .trigger_served_event(*ad_type, placement_id, creative_instance_id);
                info!("Serve {} placement {}: {}", ad_type, placement_id, served);
            }
            ScriptEvent::Trigger {
                ad_type,
                placement_id,
                creative_instance_id,
                confirmation_type,
            } => {
                let fired = self.ads.trigger_ad_event(
                    *ad_type,
                    placement_id,
                    creative_instance_id,
                    *confirmation_type,
                );
                info!(
                    "Trigger {} {} placement {}: {}",
                    ad_type, confirmation_type, placement_id, fired
                );
            }
        }
    }

    fn collect(&mut self) {
        let at_ms = (self.clock.now() - self.start).num_milliseconds();
        drain_into(&mut self.output, &mut self.site_visits, at_ms, "site_visit");
        drain_into(&mut self.output, &mut self.ad_history, at_ms, "ad_history");
        drain_into(&mut self.output, &mut self.reminders, at_ms, "reminder");
        drain_into(&mut self.output, &mut self.ad_events, at_ms, "ad_event");
    }
}

/// `at` plus `ms` milliseconds, if representable
fn offset(at: DateTime<Utc>, ms: u64) -> Option<DateTime<Utc>> {
    let ms = i64::try_from(ms).ok()?;
    at.checked_add_signed(Duration::try_milliseconds(ms)?)
}

fn drain_into<E: Clone + Serialize>(
    output: &mut Vec<OutputLine>,
    receiver: &mut broadcast::Receiver<E>,
    at_ms: i64,
    channel: &'static str,
) {
    loop {
        match receiver.try_recv() {
            Ok(event) => match serde_json::to_value(&event) {
                Ok(event) => output.push(OutputLine {
                    at_ms,
                    channel,
                    event,
                }),
                Err(e) => warn!("Failed to serialize {} event: {}", channel, e),
            },
            Err(TryRecvError::Lagged(missed)) => {
                warn!("Missed {} {} events", missed, channel);
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}
