//! Decides whether a user landed on the page of an ad they clicked.
//!
//! A click is remembered in a single process-wide slot. When a tab then shows
//! the ad's site, a page land starts for that tab: after `page_land_after` the
//! tab's redirect chain is checked again and the landing is resolved. While the
//! tab is hidden the timer is paused and the remaining time kept.

use chrono::{DateTime, Duration, Utc};
use pageland_core::{config::SiteVisitConfig, AdInfo, Tab, TabId};
use std::collections::HashMap;
use url::Url;

use crate::events::{EventBus, SiteVisitEvent};
use crate::tabs::TabChange;
use crate::timers::{TimerId, TimerQueue, TimerTask};

/// In-progress landing evaluation for one tab
#[derive(Debug, Clone)]
pub struct PageLand {
    pub tab_id: TabId,
    pub ad: AdInfo,
    timer: Option<TimerId>,
    deadline: DateTime<Utc>,
    suspended_remaining: Option<Duration>,
}

impl PageLand {
    pub fn is_suspended(&self) -> bool {
        self.timer.is_none() && self.suspended_remaining.is_some()
    }

    /// Remaining time, only present while suspended
    pub fn suspended_remaining(&self) -> Option<Duration> {
        self.suspended_remaining
    }

    /// When the timer fires, only meaningful while not suspended
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }
}

/// Outcome of a page land whose timer fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLandResolution {
    pub tab_id: TabId,
    pub ad: AdInfo,
    pub landed: bool,
}

pub struct SiteVisitTracker {
    page_land_after: Duration,
    should_suspend_and_resume: bool,
    last_clicked_ad: Option<AdInfo>,
    page_lands: HashMap<TabId, PageLand>,
    events: EventBus<SiteVisitEvent>,
}

impl SiteVisitTracker {
    pub fn new(config: &SiteVisitConfig) -> Self {
        if config.page_land_cap > 0 {
            log::debug!(
                "page_land_cap {} is reserved and not enforced",
                config.page_land_cap
            );
        }

        Self {
            page_land_after: config.page_land_after(),
            should_suspend_and_resume: config.should_suspend_and_resume_page_land,
            last_clicked_ad: None,
            page_lands: HashMap::new(),
            events: EventBus::new(),
        }
    }

    pub fn events(&self) -> &EventBus<SiteVisitEvent> {
        &self.events
    }

    /// Remember the most recently clicked ad, replacing any earlier click
    pub fn set_last_clicked_ad(&mut self, ad: AdInfo) {
        log::debug!(
            "Last clicked ad is now placement {} targeting {}",
            ad.placement_id,
            ad.target_url
        );
        self.last_clicked_ad = Some(ad);
    }

    pub fn last_clicked_ad(&self) -> Option<&AdInfo> {
        self.last_clicked_ad.as_ref()
    }

    pub fn page_land(&self, tab_id: TabId) -> Option<&PageLand> {
        self.page_lands.get(&tab_id)
    }

    pub fn page_land_count(&self) -> usize {
        self.page_lands.len()
    }

    /// A tab opened while a click is outstanding is the click's target tab
    pub fn on_did_open_new_tab(
        &mut self,
        tab: &Tab,
        timers: &mut TimerQueue<TimerTask>,
        now: DateTime<Utc>,
    ) {
        if self.page_lands.contains_key(&tab.id) {
            self.on_tab_changed(tab, TabChange::default(), timers, now);
            return;
        }

        if let Some(ad) = self.last_clicked_ad.take() {
            self.start_page_land(tab, ad, timers, now);
        }
    }

    pub fn on_tab_changed(
        &mut self,
        tab: &Tab,
        change: TabChange,
        timers: &mut TimerQueue<TimerTask>,
        now: DateTime<Utc>,
    ) {
        if let Some(page_land) = self.page_lands.get(&tab.id) {
            // A tab that took the click on opening may not match yet
            if change.redirect_chain_changed
                && !domain_or_host_exists(&tab.redirect_chain, &page_land.ad.target_url)
            {
                log::info!("Tab {} navigated away from the ad's site", tab.id);
                self.cancel_page_land(tab.id, timers);
                return;
            }
        } else if self
            .last_clicked_ad
            .as_ref()
            .is_some_and(|ad| domain_or_host_exists(&tab.redirect_chain, &ad.target_url))
        {
            if let Some(ad) = self.last_clicked_ad.take() {
                self.start_page_land(tab, ad, timers, now);
            }
            return;
        }

        if change.visibility_changed {
            self.maybe_suspend_or_resume(tab, timers, now);
        }
    }

    pub fn on_tab_closed(&mut self, tab_id: TabId, timers: &mut TimerQueue<TimerTask>) {
        if self.page_lands.contains_key(&tab_id) {
            log::info!("Tab {} closed before the page land resolved", tab_id);
            self.cancel_page_land(tab_id, timers);
        }
    }

    /// Called when the page land timer for `tab_id` fired. `tab` is the tab's
    /// current state, if it still exists.
    pub fn resolve_page_land(
        &mut self,
        tab_id: TabId,
        tab: Option<&Tab>,
    ) -> Option<PageLandResolution> {
        let page_land = self.page_lands.remove(&tab_id)?;

        let Some(tab) = tab else {
            log::info!("Tab {} no longer exists", tab_id);
            self.events.publish(SiteVisitEvent::CanceledPageLand {
                tab_id,
                ad: page_land.ad,
            });
            return None;
        };

        let landed =
            !tab.is_error_page && domain_or_host_exists(&tab.redirect_chain, &page_land.ad.target_url);

        Some(PageLandResolution {
            tab_id,
            ad: page_land.ad,
            landed,
        })
    }

    pub fn notify_did_land_on_page(&self, resolution: PageLandResolution) {
        log::info!(
            "Landed on page for placement {} in tab {}",
            resolution.ad.placement_id,
            resolution.tab_id
        );
        self.events.publish(SiteVisitEvent::DidLandOnPage {
            tab_id: resolution.tab_id,
            ad: resolution.ad,
        });
    }

    pub fn notify_did_not_land_on_page(&self, resolution: PageLandResolution) {
        log::info!(
            "Did not land on page for placement {} in tab {}",
            resolution.ad.placement_id,
            resolution.tab_id
        );
        self.events.publish(SiteVisitEvent::DidNotLandOnPage {
            tab_id: resolution.tab_id,
            ad: resolution.ad,
        });
    }

    /// Drops every page land and its timer without notifying
    pub fn cancel_all(&mut self, timers: &mut TimerQueue<TimerTask>) {
        for (_, page_land) in self.page_lands.drain() {
            if let Some(timer) = page_land.timer {
                timers.cancel(timer);
            }
        }
        self.last_clicked_ad = None;
    }

    fn start_page_land(
        &mut self,
        tab: &Tab,
        ad: AdInfo,
        timers: &mut TimerQueue<TimerTask>,
        now: DateTime<Utc>,
    ) {
        log::info!(
            "Maybe land on page for placement {} in tab {} after {}s",
            ad.placement_id,
            tab.id,
            self.page_land_after.num_seconds()
        );
        self.events.publish(SiteVisitEvent::MaybeLandOnPage {
            tab_id: tab.id,
            ad: ad.clone(),
            after: self.page_land_after,
        });

        let deadline = now + self.page_land_after;
        let timer = timers.schedule(deadline, TimerTask::PageLand(tab.id));
        let previous = self.page_lands.insert(
            tab.id,
            PageLand {
                tab_id: tab.id,
                ad,
                timer: Some(timer),
                deadline,
                suspended_remaining: None,
            },
        );
        debug_assert!(previous.is_none(), "two page lands for tab {}", tab.id);

        if !tab.is_visible && self.should_suspend_and_resume {
            self.suspend(tab.id, timers, now);
        }
    }

    fn cancel_page_land(&mut self, tab_id: TabId, timers: &mut TimerQueue<TimerTask>) {
        let Some(page_land) = self.page_lands.remove(&tab_id) else {
            return;
        };
        if let Some(timer) = page_land.timer {
            timers.cancel(timer);
        }
        self.events.publish(SiteVisitEvent::CanceledPageLand {
            tab_id,
            ad: page_land.ad,
        });
    }

    fn maybe_suspend_or_resume(
        &mut self,
        tab: &Tab,
        timers: &mut TimerQueue<TimerTask>,
        now: DateTime<Utc>,
    ) {
        if !self.should_suspend_and_resume {
            return;
        }

        if tab.is_visible {
            self.resume(tab.id, timers, now);
        } else {
            self.suspend(tab.id, timers, now);
        }
    }

    fn suspend(&mut self, tab_id: TabId, timers: &mut TimerQueue<TimerTask>, now: DateTime<Utc>) {
        let Some(page_land) = self.page_lands.get_mut(&tab_id) else {
            return;
        };
        let Some(timer) = page_land.timer.take() else {
            return;
        };
        timers.cancel(timer);

        let remaining = (page_land.deadline - now).max(Duration::zero());
        page_land.suspended_remaining = Some(remaining);

        log::debug!(
            "Suspended page land for tab {} with {}ms remaining",
            tab_id,
            remaining.num_milliseconds()
        );
        self.events
            .publish(SiteVisitEvent::DidSuspendPageLand { tab_id, remaining });
    }

    fn resume(&mut self, tab_id: TabId, timers: &mut TimerQueue<TimerTask>, now: DateTime<Utc>) {
        let Some(page_land) = self.page_lands.get_mut(&tab_id) else {
            return;
        };
        if page_land.timer.is_some() {
            return;
        }
        let Some(remaining) = page_land.suspended_remaining.take() else {
            return;
        };

        page_land.deadline = now + remaining;
        page_land.timer = Some(timers.schedule(page_land.deadline, TimerTask::PageLand(tab_id)));

        log::debug!(
            "Resumed page land for tab {} with {}ms remaining",
            tab_id,
            remaining.num_milliseconds()
        );
        self.events
            .publish(SiteVisitEvent::DidResumePageLand { tab_id, remaining });
    }
}

/// Whether any URL in the chain shares a registrable domain or host with `url`
pub fn domain_or_host_exists(redirect_chain: &[Url], url: &Url) -> bool {
    redirect_chain
        .iter()
        .any(|candidate| same_domain_or_host(candidate, url))
}

fn same_domain_or_host(lhs: &Url, rhs: &Url) -> bool {
    let (Some(lhs_host), Some(rhs_host)) = (lhs.host_str(), rhs.host_str()) else {
        return false;
    };

    if lhs_host.eq_ignore_ascii_case(rhs_host) {
        return true;
    }

    match (psl::domain_str(lhs_host), psl::domain_str(rhs_host)) {
        (Some(lhs_domain), Some(rhs_domain)) => lhs_domain.eq_ignore_ascii_case(rhs_domain),
        _ => false,
    }
}
