//! UI-facing view of ad history joined with the user's reactions

use pageland_core::{AdType, AdsResult, ConfirmationType};
use serde::{Deserialize, Serialize};

use crate::reactions::ReactionStore;
use crate::types::{AdHistoryItem, Reaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdHistoryEntry {
    pub uuid: String,
    pub timestamp_in_milliseconds: i64,
    pub ad_content: AdContent,
    pub segment_content: SegmentContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdContent {
    pub ad_type: AdType,
    pub placement_id: String,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub brand: String,
    pub brand_info: String,
    pub brand_url: String,
    pub ad_action: ConfirmationType,
    pub like_action: Reaction,
    pub is_saved: bool,
    pub is_flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentContent {
    pub segment: String,
    pub opt_action: Reaction,
}

/// Builds the list shown on the ads history page
pub fn build_ad_history_value(
    items: &[AdHistoryItem],
    reactions: &ReactionStore,
) -> AdsResult<Vec<AdHistoryEntry>> {
    items
        .iter()
        .enumerate()
        .map(|(uuid, item)| {
            Ok(AdHistoryEntry {
                uuid: uuid.to_string(),
                timestamp_in_milliseconds: item.created_at.timestamp_millis(),
                ad_content: AdContent {
                    ad_type: item.ad_type,
                    placement_id: item.placement_id.clone(),
                    creative_instance_id: item.creative_instance_id.clone(),
                    creative_set_id: item.creative_set_id.clone(),
                    campaign_id: item.campaign_id.clone(),
                    advertiser_id: item.advertiser_id.clone(),
                    brand: item.title.clone(),
                    brand_info: item.description.clone(),
                    brand_url: item.target_url.to_string(),
                    ad_action: item.confirmation_type,
                    like_action: reactions.reaction_for_ad(&item.advertiser_id)?,
                    is_saved: reactions.is_saved(&item.creative_instance_id)?,
                    is_flagged: reactions.is_marked_as_inappropriate(&item.creative_set_id)?,
                },
                segment_content: SegmentContent {
                    segment: item.segment.clone(),
                    opt_action: reactions.reaction_for_segment(&item.segment)?,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::build_ad_history_item;
    use crate::Database;
    use chrono::{DateTime, Utc};
    use pageland_core::{AdInfo, ManualClock};
    use std::sync::Arc;
    use url::Url;

    #[test]
    fn test_value_reflects_reactions() {
        let created_at = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let reactions = ReactionStore::new(
            Database::open_in_memory().unwrap(),
            Arc::new(ManualClock::new(created_at)),
        );
        let ad = AdInfo {
            ad_type: AdType::NotificationAd,
            placement_id: "placement".to_string(),
            creative_instance_id: "creative-instance".to_string(),
            creative_set_id: "creative-set".to_string(),
            campaign_id: "campaign".to_string(),
            advertiser_id: "advertiser".to_string(),
            segment: "travel".to_string(),
            target_url: Url::parse("https://brave.com/landing").unwrap(),
        };
        let item = build_ad_history_item(
            &ad,
            ConfirmationType::Clicked,
            "Brave",
            "Browse privately",
            created_at,
        );

        reactions.toggle_like_ad("advertiser").unwrap();
        reactions.toggle_dislike_segment("travel").unwrap();
        reactions.toggle_save_ad("creative-instance").unwrap();

        let entries = build_ad_history_value(&[item], &reactions).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.timestamp_in_milliseconds, 1_700_000_000_000);
        assert_eq!(entry.ad_content.like_action, Reaction::Liked);
        assert!(entry.ad_content.is_saved);
        assert!(!entry.ad_content.is_flagged);
        assert_eq!(entry.segment_content.opt_action, Reaction::Disliked);

        let json = serde_json::to_value(entry).unwrap();
        assert_eq!(json["adContent"]["brand"], "Brave");
        assert_eq!(json["adContent"]["adAction"], "clicked");
    }
}
