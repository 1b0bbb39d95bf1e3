//! Owner of every ads service. The host reports tab and ad events here and
//! pumps timers through [`AdsContext::run_due_timers`].

use chrono::{DateTime, Utc};
use pageland_core::config::OptIns;
use pageland_core::{AdType, AdsConfig, AdsResult, Clock, ConfirmationType, Tab, TabId};
use pageland_history::{build_ad_history_value, AdHistoryEntry, AdHistoryItem, Database, Reaction};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::catalog::CreativeAdCatalog;
use crate::deposit::DepositSink;
use crate::dispatcher::{AdEventDispatcher, DispatchEnv, ViewedCallback};
use crate::events::{AdEventNotification, AdHistoryEvent, ReminderEvent, SiteVisitEvent};
use crate::ledger::AdLedger;
use crate::maintenance::{PurgeStats, RetentionMaintenance};
use crate::reminders::ReminderEngine;
use crate::site_visit::{PageLandResolution, SiteVisitTracker};
use crate::tabs::TabRegistry;
use crate::timers::{TimerQueue, TimerTask};

pub struct AdsContext {
    config: AdsConfig,
    clock: Arc<dyn Clock>,
    catalog: Box<dyn CreativeAdCatalog>,
    tabs: TabRegistry,
    timers: TimerQueue<TimerTask>,
    site_visit: SiteVisitTracker,
    dispatcher: AdEventDispatcher,
    ledger: AdLedger,
    reminders: ReminderEngine,
    maintenance: RetentionMaintenance,
    history_feed: broadcast::Receiver<AdHistoryEvent>,
}

impl AdsContext {
    pub fn new(
        config: AdsConfig,
        clock: Arc<dyn Clock>,
        db: Database,
        catalog: Box<dyn CreativeAdCatalog>,
        deposits: Arc<dyn DepositSink>,
    ) -> AdsResult<Self> {
        config.validate()?;

        let ledger = AdLedger::new(db, clock.clone(), &config, deposits);
        let history_feed = ledger.history_events().subscribe();
        let mut timers = TimerQueue::new();
        let mut maintenance = RetentionMaintenance::new(config.maintenance.interval());
        maintenance.start(&mut timers, clock.now());

        Ok(Self {
            site_visit: SiteVisitTracker::new(&config.site_visit),
            reminders: ReminderEngine::new(&config),
            tabs: TabRegistry::new(),
            dispatcher: AdEventDispatcher::new(),
            config,
            clock,
            catalog,
            timers,
            ledger,
            maintenance,
            history_feed,
        })
    }

    /// Opens the database under the configured data directory
    pub fn open(
        config: AdsConfig,
        clock: Arc<dyn Clock>,
        catalog: Box<dyn CreativeAdCatalog>,
        deposits: Arc<dyn DepositSink>,
    ) -> AdsResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db = Database::open(&config.database_path())?;
        Self::new(config, clock, db, catalog, deposits)
    }

    pub fn config(&self) -> &AdsConfig {
        &self.config
    }

    pub fn tabs(&self) -> &TabRegistry {
        &self.tabs
    }

    pub fn site_visit(&self) -> &SiteVisitTracker {
        &self.site_visit
    }

    pub fn ledger(&self) -> &AdLedger {
        &self.ledger
    }

    pub fn opt_ins(&self) -> &OptIns {
        &self.config.opt_ins
    }

    pub fn set_opt_ins(&mut self, opt_ins: OptIns) {
        log::info!("Opt-ins changed to {:?}", opt_ins);
        self.config.opt_ins = opt_ins;
    }

    // Tab events

    pub fn on_did_open_new_tab(&mut self, tab: Tab) {
        let now = self.clock.now();
        let change = self.tabs.on_did_open_new_tab(tab.clone());
        if change.is_new {
            self.site_visit
                .on_did_open_new_tab(&tab, &mut self.timers, now);
        } else {
            self.site_visit
                .on_tab_changed(&tab, change, &mut self.timers, now);
        }
    }

    pub fn on_tab_did_change(&mut self, tab: Tab) {
        let now = self.clock.now();
        let change = self.tabs.on_tab_did_change(tab.clone());
        self.site_visit
            .on_tab_changed(&tab, change, &mut self.timers, now);
    }

    pub fn on_did_close_tab(&mut self, tab_id: TabId) {
        self.tabs.on_did_close_tab(tab_id);
        self.site_visit.on_tab_closed(tab_id, &mut self.timers);
    }

    pub fn on_tab_did_change_focus(&mut self, tab_id: TabId) -> bool {
        self.tabs.on_tab_did_change_focus(tab_id)
    }

    pub fn on_media_playing(&mut self, tab_id: TabId) -> bool {
        self.tabs.on_media_playing(tab_id)
    }

    pub fn on_media_stopped(&mut self, tab_id: TabId) -> bool {
        self.tabs.on_media_stopped(tab_id)
    }

    // Ad events

    pub fn trigger_ad_event(
        &mut self,
        ad_type: AdType,
        placement_id: &str,
        creative_instance_id: &str,
        confirmation_type: ConfirmationType,
    ) -> bool {
        let mut env = DispatchEnv {
            opt_ins: &self.config.opt_ins,
            catalog: self.catalog.as_ref(),
            ledger: &self.ledger,
            site_visit: &mut self.site_visit,
        };
        let fired = self.dispatcher.trigger_event(
            &mut env,
            ad_type,
            placement_id,
            creative_instance_id,
            confirmation_type,
        );
        self.drain_history_feed();
        fired
    }

    /// Serve path entry point
    pub fn trigger_served_event(
        &mut self,
        ad_type: AdType,
        placement_id: &str,
        creative_instance_id: &str,
    ) -> bool {
        let mut env = DispatchEnv {
            opt_ins: &self.config.opt_ins,
            catalog: self.catalog.as_ref(),
            ledger: &self.ledger,
            site_visit: &mut self.site_visit,
        };
        let fired = self.dispatcher.trigger_served_event(
            &mut env,
            ad_type,
            placement_id,
            creative_instance_id,
        );
        self.drain_history_feed();
        fired
    }

    pub fn trigger_search_result_ad_viewed_event(
        &mut self,
        placement_id: &str,
        creative_instance_id: &str,
        callback: ViewedCallback,
    ) {
        let mut env = DispatchEnv {
            opt_ins: &self.config.opt_ins,
            catalog: self.catalog.as_ref(),
            ledger: &self.ledger,
            site_visit: &mut self.site_visit,
        };
        self.dispatcher.trigger_search_result_ad_viewed_event(
            &mut env,
            placement_id,
            creative_instance_id,
            callback,
        );
        self.drain_history_feed();
    }

    // History

    /// The most significant interaction per placement, ready for display
    pub fn get_ad_history(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AdsResult<Vec<AdHistoryEntry>> {
        let items = self
            .ledger
            .history()
            .get_highest_ranked_placements_for_date_range(from, to)?;
        build_ad_history_value(&items, self.ledger.reactions())
    }

    /// Forgets all history, fired events and reactions
    pub fn remove_all_history(&mut self) -> AdsResult<()> {
        let history = self.ledger.history().remove_all()?;
        let events = self.ledger.ad_events().remove_all()?;
        let reactions = self.ledger.reactions().clear()?;
        self.reminders.cancel_all(&mut self.timers);
        self.site_visit.cancel_all(&mut self.timers);
        log::info!(
            "Removed {} ad history items, {} ad events and {} reactions",
            history,
            events,
            reactions
        );
        Ok(())
    }

    // Reactions

    pub fn toggle_like_ad(&self, item: &AdHistoryItem) -> AdsResult<Reaction> {
        let reaction = self.ledger.reactions().toggle_like_ad(&item.advertiser_id)?;
        if reaction == Reaction::Liked {
            self.ledger
                .deposit(&item.to_ad_info(), ConfirmationType::LikedAd);
        }
        Ok(reaction)
    }

    pub fn toggle_dislike_ad(&self, item: &AdHistoryItem) -> AdsResult<Reaction> {
        let reaction = self
            .ledger
            .reactions()
            .toggle_dislike_ad(&item.advertiser_id)?;
        if reaction == Reaction::Disliked {
            self.ledger
                .deposit(&item.to_ad_info(), ConfirmationType::DislikedAd);
        }
        Ok(reaction)
    }

    pub fn toggle_like_segment(&self, segment: &str) -> AdsResult<Reaction> {
        self.ledger.reactions().toggle_like_segment(segment)
    }

    pub fn toggle_dislike_segment(&self, segment: &str) -> AdsResult<Reaction> {
        self.ledger.reactions().toggle_dislike_segment(segment)
    }

    pub fn toggle_save_ad(&self, item: &AdHistoryItem) -> AdsResult<bool> {
        let saved = self
            .ledger
            .reactions()
            .toggle_save_ad(&item.creative_instance_id)?;
        if saved {
            self.ledger
                .deposit(&item.to_ad_info(), ConfirmationType::SavedAd);
        }
        Ok(saved)
    }

    pub fn toggle_mark_ad_as_inappropriate(&self, item: &AdHistoryItem) -> AdsResult<bool> {
        let flagged = self
            .ledger
            .reactions()
            .toggle_mark_ad_as_inappropriate(&item.creative_set_id)?;
        if flagged {
            self.ledger
                .deposit(&item.to_ad_info(), ConfirmationType::MarkAdAsInappropriate);
        }
        Ok(flagged)
    }

    // Subscriptions

    pub fn subscribe_site_visits(&self) -> broadcast::Receiver<SiteVisitEvent> {
        self.site_visit.events().subscribe()
    }

    pub fn subscribe_ad_history(&self) -> broadcast::Receiver<AdHistoryEvent> {
        self.ledger.history_events().subscribe()
    }

    pub fn subscribe_reminders(&self) -> broadcast::Receiver<ReminderEvent> {
        self.reminders.events().subscribe()
    }

    pub fn subscribe_ad_events(&self) -> broadcast::Receiver<AdEventNotification> {
        self.ledger.notifications().subscribe()
    }

    // Timers

    pub fn next_timer_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Runs every timer due at the clock's current time, in deadline order.
    /// Returns how many fired.
    pub fn run_due_timers(&mut self) -> usize {
        let mut fired = 0;
        while let Some((_, _, task)) = self.timers.pop_due(self.clock.now()) {
            fired += 1;
            match task {
                TimerTask::PageLand(tab_id) => self.on_page_land_timer(tab_id),
                TimerTask::Reminder {
                    creative_instance_id,
                } => {
                    if let Err(e) = self
                        .reminders
                        .on_timer_fired(&creative_instance_id, self.ledger.history())
                    {
                        log::error!("Failed to check reminders: {}", e);
                    }
                }
                TimerTask::Maintenance => {
                    let now = self.clock.now();
                    if let Err(e) =
                        self.maintenance
                            .on_timer_fired(&self.ledger, &mut self.timers, now)
                    {
                        log::error!("Failed to purge expired ads data: {}", e);
                    }
                }
            }
            self.drain_history_feed();
        }
        fired
    }

    pub fn run_maintenance(&self) -> AdsResult<PurgeStats> {
        self.maintenance.run(&self.ledger)
    }

    /// Cancels every pending timer and page land
    pub fn shutdown(&mut self) {
        self.maintenance.stop(&mut self.timers);
        self.reminders.cancel_all(&mut self.timers);
        self.site_visit.cancel_all(&mut self.timers);
        self.timers.clear();
        log::info!("Ads context shut down");
    }

    fn on_page_land_timer(&mut self, tab_id: TabId) {
        let tab = self.tabs.get(tab_id).cloned();
        let Some(resolution) = self.site_visit.resolve_page_land(tab_id, tab.as_ref()) else {
            return;
        };

        if !resolution.landed {
            self.site_visit.notify_did_not_land_on_page(resolution);
            return;
        }

        match self.confirm_landed(&resolution) {
            Ok(()) => self.site_visit.notify_did_land_on_page(resolution),
            Err(e) => {
                log::error!(
                    "Failed to record landing for placement {}: {}",
                    resolution.ad.placement_id,
                    e
                );
                self.ledger.notify_failed_to_fire(
                    resolution.ad.ad_type,
                    &resolution.ad.placement_id,
                    &resolution.ad.creative_instance_id,
                    ConfirmationType::Landed,
                );
                self.site_visit.notify_did_not_land_on_page(resolution);
            }
        }
    }

    fn confirm_landed(&self, resolution: &PageLandResolution) -> AdsResult<()> {
        let ad = &resolution.ad;
        let (title, description) = self
            .catalog
            .get(ad.ad_type, &ad.creative_instance_id)
            .map(|creative| (creative.title, creative.description))
            .unwrap_or_default();

        self.ledger
            .confirm(ad, ConfirmationType::Landed, &title, &description)?;
        self.ledger.notify_did_fire(ad, ConfirmationType::Landed);
        Ok(())
    }

    /// Feeds new history items to the reminder engine
    fn drain_history_feed(&mut self) {
        let now = self.clock.now();
        loop {
            match self.history_feed.try_recv() {
                Ok(AdHistoryEvent::DidAddAdHistoryItem { item }) => {
                    self.reminders
                        .on_did_add_ad_history_item(&item, &mut self.timers, now);
                }
                Err(TryRecvError::Lagged(missed)) => {
                    log::warn!("Reminder feed missed {} ad history items", missed);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}
