//! Validates and sequences ad events per ad type
//!
//! Every trigger runs the same checks in order: a creative id is present, a
//! placement id is present, the user opted in to the ad category, the handler
//! supports the event, the creative is known, the event has not fired for the
//! placement yet, and the event's predecessor has fired. Viewed events fire a
//! missing served event first. Failures are reported as `false` and through
//! [`AdEventNotification::FailedToFireAdEvent`](crate::events::AdEventNotification).

mod inline_content_ad;
mod new_tab_page_ad;
mod notification_ad;
mod promoted_content_ad;
mod search_result_ad;

pub use inline_content_ad::InlineContentAdEventHandler;
pub use new_tab_page_ad::NewTabPageAdEventHandler;
pub use notification_ad::NotificationAdEventHandler;
pub use promoted_content_ad::PromotedContentAdEventHandler;
pub use search_result_ad::{SearchResultAdEventHandler, ViewedCallback};

use pageland_core::config::OptIns;
use pageland_core::{AdInfo, AdType, ConfirmationType, CreativeAd};

use crate::catalog::CreativeAdCatalog;
use crate::ledger::AdLedger;
use crate::site_visit::SiteVisitTracker;

/// Eligibility rules for one ad type
pub trait AdEventHandler {
    fn ad_type(&self) -> AdType;

    fn is_opted_in(&self, opt_ins: &OptIns) -> bool;

    /// Whether the event can be triggered from outside. Served events are
    /// always allowed from the serve path.
    fn supports(&self, confirmation_type: ConfirmationType) -> bool;
}

/// Services a trigger touches, borrowed from the owning context
pub struct DispatchEnv<'a> {
    pub opt_ins: &'a OptIns,
    pub catalog: &'a dyn CreativeAdCatalog,
    pub ledger: &'a AdLedger,
    pub site_visit: &'a mut SiteVisitTracker,
}

struct Trigger<'a> {
    ad_type: AdType,
    placement_id: &'a str,
    creative_instance_id: &'a str,
    confirmation_type: ConfirmationType,
}

#[derive(Default)]
pub struct AdEventDispatcher {
    inline_content_ad: InlineContentAdEventHandler,
    new_tab_page_ad: NewTabPageAdEventHandler,
    notification_ad: NotificationAdEventHandler,
    promoted_content_ad: PromotedContentAdEventHandler,
    search_result_ad: SearchResultAdEventHandler,
}

impl AdEventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self, ad_type: AdType) -> &dyn AdEventHandler {
        match ad_type {
            AdType::InlineContentAd => &self.inline_content_ad,
            AdType::NewTabPageAd => &self.new_tab_page_ad,
            AdType::NotificationAd => &self.notification_ad,
            AdType::PromotedContentAd => &self.promoted_content_ad,
            AdType::SearchResultAd => &self.search_result_ad,
        }
    }

    /// Externally triggered events. Served events only come from the serve path.
    pub fn trigger_event(
        &self,
        env: &mut DispatchEnv<'_>,
        ad_type: AdType,
        placement_id: &str,
        creative_instance_id: &str,
        confirmation_type: ConfirmationType,
    ) -> bool {
        if confirmation_type == ConfirmationType::ServedImpression {
            let trigger = Trigger {
                ad_type,
                placement_id,
                creative_instance_id,
                confirmation_type,
            };
            return self.reject(env, &trigger, "served events cannot be triggered");
        }

        self.fire(
            env,
            ad_type,
            placement_id,
            creative_instance_id,
            confirmation_type,
        )
    }

    pub fn trigger_served_event(
        &self,
        env: &mut DispatchEnv<'_>,
        ad_type: AdType,
        placement_id: &str,
        creative_instance_id: &str,
    ) -> bool {
        self.fire(
            env,
            ad_type,
            placement_id,
            creative_instance_id,
            ConfirmationType::ServedImpression,
        )
    }

    /// Queues a search result ad viewed event. Queued events fire one at a
    /// time in arrival order and `callback` runs once the event resolved.
    pub fn trigger_search_result_ad_viewed_event(
        &mut self,
        env: &mut DispatchEnv<'_>,
        placement_id: &str,
        creative_instance_id: &str,
        callback: ViewedCallback,
    ) {
        self.search_result_ad
            .enqueue(placement_id, creative_instance_id, callback);

        while let Some(pending) = self.search_result_ad.start_next() {
            let success = self.trigger_event(
                env,
                AdType::SearchResultAd,
                &pending.placement_id,
                &pending.creative_instance_id,
                ConfirmationType::ViewedImpression,
            );
            self.search_result_ad.finish();
            (pending.callback)(success);
        }
    }

    pub fn pending_search_result_ad_viewed_events(&self) -> usize {
        self.search_result_ad.pending_len()
    }

    fn fire(
        &self,
        env: &mut DispatchEnv<'_>,
        ad_type: AdType,
        placement_id: &str,
        creative_instance_id: &str,
        confirmation_type: ConfirmationType,
    ) -> bool {
        if creative_instance_id.is_empty() {
            // Super referral placements carry no creative
            log::debug!(
                "Ignoring {} {} event without a creative instance id",
                ad_type,
                confirmation_type
            );
            return false;
        }

        let trigger = Trigger {
            ad_type,
            placement_id,
            creative_instance_id,
            confirmation_type,
        };

        if placement_id.is_empty() {
            return self.reject(env, &trigger, "missing placement id");
        }

        let handler = self.handler(ad_type);
        if !handler.is_opted_in(env.opt_ins) {
            return self.reject(env, &trigger, "user has not opted in");
        }

        if confirmation_type != ConfirmationType::ServedImpression
            && !handler.supports(confirmation_type)
        {
            return self.reject(env, &trigger, "unsupported event");
        }

        let Some(creative_ad) = env.catalog.get(ad_type, creative_instance_id) else {
            return self.reject(env, &trigger, "unknown creative instance");
        };

        let ad = creative_ad.to_ad_info(placement_id);
        if !ad.is_valid() {
            return self.reject(env, &trigger, "invalid ad");
        }

        match env.ledger.has_fired(placement_id, confirmation_type) {
            Ok(false) => {}
            Ok(true) => return self.reject(env, &trigger, "already fired for placement"),
            Err(e) => {
                log::error!("Failed to read ad events: {}", e);
                return self.reject(env, &trigger, "ad events unavailable");
            }
        }

        match confirmation_type {
            ConfirmationType::ViewedImpression => {
                match env
                    .ledger
                    .has_fired(placement_id, ConfirmationType::ServedImpression)
                {
                    Ok(true) => {}
                    Ok(false) => {
                        if !self.fire_event(env, &creative_ad, &ad, ConfirmationType::ServedImpression)
                        {
                            return self.reject(env, &trigger, "served event failed");
                        }
                    }
                    Err(e) => {
                        log::error!("Failed to read ad events: {}", e);
                        return self.reject(env, &trigger, "ad events unavailable");
                    }
                }
            }
            ConfirmationType::Clicked | ConfirmationType::Dismissed => {
                match env
                    .ledger
                    .has_fired(placement_id, ConfirmationType::ViewedImpression)
                {
                    Ok(true) => {}
                    Ok(false) => return self.reject(env, &trigger, "ad was not viewed"),
                    Err(e) => {
                        log::error!("Failed to read ad events: {}", e);
                        return self.reject(env, &trigger, "ad events unavailable");
                    }
                }
            }
            _ => {}
        }

        self.fire_event(env, &creative_ad, &ad, confirmation_type)
    }

    fn fire_event(
        &self,
        env: &mut DispatchEnv<'_>,
        creative_ad: &CreativeAd,
        ad: &AdInfo,
        confirmation_type: ConfirmationType,
    ) -> bool {
        if let Err(e) = env.ledger.confirm(
            ad,
            confirmation_type,
            &creative_ad.title,
            &creative_ad.description,
        ) {
            log::error!(
                "Failed to record {} event for placement {}: {}",
                confirmation_type,
                ad.placement_id,
                e
            );
            let trigger = Trigger {
                ad_type: ad.ad_type,
                placement_id: &ad.placement_id,
                creative_instance_id: &ad.creative_instance_id,
                confirmation_type,
            };
            return self.reject(env, &trigger, "failed to record event");
        }

        if confirmation_type == ConfirmationType::Clicked {
            env.site_visit.set_last_clicked_ad(ad.clone());
        }

        env.ledger.notify_did_fire(ad, confirmation_type);
        true
    }

    fn reject(&self, env: &DispatchEnv<'_>, trigger: &Trigger<'_>, reason: &str) -> bool {
        log::debug!(
            "Not firing {} {} event for placement {}: {}",
            trigger.ad_type,
            trigger.confirmation_type,
            trigger.placement_id,
            reason
        );
        env.ledger.notify_failed_to_fire(
            trigger.ad_type,
            trigger.placement_id,
            trigger.creative_instance_id,
            trigger.confirmation_type,
        );
        false
    }
}
