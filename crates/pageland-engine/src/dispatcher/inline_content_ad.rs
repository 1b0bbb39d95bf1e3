use pageland_core::config::OptIns;
use pageland_core::{AdType, ConfirmationType};

use super::AdEventHandler;

/// Inline content ads shown in the news feed
#[derive(Debug, Default)]
pub struct InlineContentAdEventHandler;

impl AdEventHandler for InlineContentAdEventHandler {
    fn ad_type(&self) -> AdType {
        AdType::InlineContentAd
    }

    fn is_opted_in(&self, opt_ins: &OptIns) -> bool {
        opt_ins.brave_news_ads
    }

    fn supports(&self, confirmation_type: ConfirmationType) -> bool {
        matches!(
            confirmation_type,
            ConfirmationType::ViewedImpression | ConfirmationType::Clicked
        )
    }
}
