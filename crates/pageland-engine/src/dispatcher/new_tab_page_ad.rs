use pageland_core::config::OptIns;
use pageland_core::{AdType, ConfirmationType};

use super::AdEventHandler;

/// New tab page ads, which may carry a video
#[derive(Debug, Default)]
pub struct NewTabPageAdEventHandler;

impl AdEventHandler for NewTabPageAdEventHandler {
    fn ad_type(&self) -> AdType {
        AdType::NewTabPageAd
    }

    fn is_opted_in(&self, opt_ins: &OptIns) -> bool {
        opt_ins.new_tab_page_ads
    }

    fn supports(&self, confirmation_type: ConfirmationType) -> bool {
        matches!(
            confirmation_type,
            ConfirmationType::ViewedImpression
                | ConfirmationType::Clicked
                | ConfirmationType::MediaPlay
                | ConfirmationType::Media25
                | ConfirmationType::Media100
        )
    }
}
