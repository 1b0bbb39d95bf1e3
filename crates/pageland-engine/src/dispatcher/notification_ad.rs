use pageland_core::config::OptIns;
use pageland_core::{AdType, ConfirmationType};

use super::AdEventHandler;

#[derive(Debug, Default)]
pub struct NotificationAdEventHandler;

impl AdEventHandler for NotificationAdEventHandler {
    fn ad_type(&self) -> AdType {
        AdType::NotificationAd
    }

    fn is_opted_in(&self, opt_ins: &OptIns) -> bool {
        opt_ins.notification_ads
    }

    fn supports(&self, confirmation_type: ConfirmationType) -> bool {
        matches!(
            confirmation_type,
            ConfirmationType::ViewedImpression
                | ConfirmationType::Clicked
                | ConfirmationType::Dismissed
        )
    }
}
