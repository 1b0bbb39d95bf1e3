use chrono::{DateTime, Utc};
use pageland_core::{AdInfo, AdType, AdsError, AdsResult, ConfirmationType};
use serde::{Deserialize, Serialize};
use url::Url;

/// One persisted record of a confirmable ad interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdHistoryItem {
    pub created_at: DateTime<Utc>,
    pub ad_type: AdType,
    pub confirmation_type: ConfirmationType,
    pub placement_id: String,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub segment: String,
    pub title: String,
    pub description: String,
    pub target_url: Url,
}

impl AdHistoryItem {
    pub fn is_valid(&self) -> bool {
        !self.placement_id.is_empty()
            && !self.creative_instance_id.is_empty()
            && !self.creative_set_id.is_empty()
            && !self.campaign_id.is_empty()
            && !self.advertiser_id.is_empty()
    }

    /// Identity of the ad this item was recorded for
    pub fn to_ad_info(&self) -> AdInfo {
        AdInfo {
            ad_type: self.ad_type,
            placement_id: self.placement_id.clone(),
            creative_instance_id: self.creative_instance_id.clone(),
            creative_set_id: self.creative_set_id.clone(),
            campaign_id: self.campaign_id.clone(),
            advertiser_id: self.advertiser_id.clone(),
            segment: self.segment.clone(),
            target_url: self.target_url.clone(),
        }
    }
}

/// Builds the history record for a confirmable event fired for `ad`
pub fn build_ad_history_item(
    ad: &AdInfo,
    confirmation_type: ConfirmationType,
    title: &str,
    description: &str,
    created_at: DateTime<Utc>,
) -> AdHistoryItem {
    AdHistoryItem {
        created_at,
        ad_type: ad.ad_type,
        confirmation_type,
        placement_id: ad.placement_id.clone(),
        creative_instance_id: ad.creative_instance_id.clone(),
        creative_set_id: ad.creative_set_id.clone(),
        campaign_id: ad.campaign_id.clone(),
        advertiser_id: ad.advertiser_id.clone(),
        segment: ad.segment.clone(),
        title: title.to_string(),
        description: description.to_string(),
        target_url: ad.target_url.clone(),
    }
}

/// Raw `ad_history` row, before enum and URL columns are checked
#[derive(Debug, Clone)]
pub(crate) struct AdHistoryRow {
    pub created_at: i64,
    pub ad_type: String,
    pub confirmation_type: String,
    pub placement_id: String,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub segment: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub target_url: String,
}

impl TryFrom<AdHistoryRow> for AdHistoryItem {
    type Error = AdsError;

    fn try_from(row: AdHistoryRow) -> AdsResult<Self> {
        let created_at = DateTime::<Utc>::from_timestamp_micros(row.created_at).ok_or_else(
            || AdsError::invalid_history_item(format!("Bad timestamp: {}", row.created_at)),
        )?;
        let target_url = Url::parse(&row.target_url).map_err(|e| {
            AdsError::invalid_history_item(format!("Bad target url {}: {}", row.target_url, e))
        })?;

        let item = AdHistoryItem {
            created_at,
            ad_type: row.ad_type.parse()?,
            confirmation_type: row.confirmation_type.parse()?,
            placement_id: row.placement_id,
            creative_instance_id: row.creative_instance_id,
            creative_set_id: row.creative_set_id,
            campaign_id: row.campaign_id,
            advertiser_id: row.advertiser_id,
            segment: row.segment,
            title: row.title.unwrap_or_default(),
            description: row.description.unwrap_or_default(),
            target_url,
        };

        if !item.is_valid() {
            return Err(AdsError::invalid_history_item(format!(
                "Missing ids for placement {:?}",
                item.placement_id
            )));
        }

        Ok(item)
    }
}

/// Like/dislike state for an advertiser or segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    #[default]
    Neutral,
    Liked,
    Disliked,
}

impl Reaction {
    pub(crate) fn to_db(self) -> i64 {
        match self {
            Reaction::Neutral => 0,
            Reaction::Liked => 1,
            Reaction::Disliked => -1,
        }
    }

    pub(crate) fn from_db(value: i64) -> Self {
        match value {
            1 => Reaction::Liked,
            -1 => Reaction::Disliked,
            _ => Reaction::Neutral,
        }
    }
}
