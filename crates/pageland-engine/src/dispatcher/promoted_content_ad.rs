use pageland_core::config::OptIns;
use pageland_core::{AdType, ConfirmationType};

use super::AdEventHandler;

/// Promoted content ads share the news feed opt-in with inline content ads
#[derive(Debug, Default)]
pub struct PromotedContentAdEventHandler;

impl AdEventHandler for PromotedContentAdEventHandler {
    fn ad_type(&self) -> AdType {
        AdType::PromotedContentAd
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
