//! Common types used throughout Pageland

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::AdsError;

/// Opaque identifier for a browser tab, stable for the tab's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TabId(pub i32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Navigation state of one browser tab as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub is_visible: bool,
    /// URLs of the current navigation, most recent last
    pub redirect_chain: Vec<Url>,
    #[serde(default)]
    pub is_error_page: bool,
    #[serde(default)]
    pub is_playing_media: bool,
}

impl Tab {
    /// Creates a visible tab with an empty redirect chain
    pub fn new(id: TabId) -> Self {
        Self {
            id,
            is_visible: true,
            redirect_chain: Vec::new(),
            is_error_page: false,
            is_playing_media: false,
        }
    }

    pub fn with_redirect_chain(mut self, redirect_chain: Vec<Url>) -> Self {
        self.redirect_chain = redirect_chain;
        self
    }

    pub fn with_visibility(mut self, is_visible: bool) -> Self {
        self.is_visible = is_visible;
        self
    }

    /// The URL the tab finally committed to
    pub fn url(&self) -> Option<&Url> {
        self.redirect_chain.last()
    }
}

/// Kind of ad placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdType {
    InlineContentAd,
    NewTabPageAd,
    NotificationAd,
    PromotedContentAd,
    SearchResultAd,
}

impl AdType {
    pub const ALL: [AdType; 5] = [
        AdType::InlineContentAd,
        AdType::NewTabPageAd,
        AdType::NotificationAd,
        AdType::PromotedContentAd,
        AdType::SearchResultAd,
    ];

    /// Stable string form, also used as the persisted column value
    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::InlineContentAd => "inline_content_ad",
            AdType::NewTabPageAd => "new_tab_page_ad",
            AdType::NotificationAd => "ad_notification",
            AdType::PromotedContentAd => "promoted_content_ad",
            AdType::SearchResultAd => "search_result_ad",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdType {
    type Err = AdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdType::ALL
            .into_iter()
            .find(|ad_type| ad_type.as_str() == s)
            .ok_or_else(|| AdsError::invalid_history_item(format!("Unknown ad type: {}", s)))
    }
}

/// Kind of interaction recorded for an ad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationType {
    ServedImpression,
    ViewedImpression,
    Clicked,
    Dismissed,
    Landed,
    MediaPlay,
    Media25,
    Media100,
    Conversion,
    LikedAd,
    DislikedAd,
    SavedAd,
    MarkAdAsInappropriate,
}

impl ConfirmationType {
    pub const ALL: [ConfirmationType; 13] = [
        ConfirmationType::ServedImpression,
        ConfirmationType::ViewedImpression,
        ConfirmationType::Clicked,
        ConfirmationType::Dismissed,
        ConfirmationType::Landed,
        ConfirmationType::MediaPlay,
        ConfirmationType::Media25,
        ConfirmationType::Media100,
        ConfirmationType::Conversion,
        ConfirmationType::LikedAd,
        ConfirmationType::DislikedAd,
        ConfirmationType::SavedAd,
        ConfirmationType::MarkAdAsInappropriate,
    ];

    /// Stable string form, also used as the persisted column value
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationType::ServedImpression => "served",
            ConfirmationType::ViewedImpression => "view",
            ConfirmationType::Clicked => "click",
            ConfirmationType::Dismissed => "dismiss",
            ConfirmationType::Landed => "landed",
            ConfirmationType::MediaPlay => "media_play",
            ConfirmationType::Media25 => "media_25",
            ConfirmationType::Media100 => "media_100",
            ConfirmationType::Conversion => "conversion",
            ConfirmationType::LikedAd => "upvote",
            ConfirmationType::DislikedAd => "downvote",
            ConfirmationType::SavedAd => "bookmark",
            ConfirmationType::MarkAdAsInappropriate => "flag",
        }
    }

    /// Served impressions are bookkeeping only; everything else is
    /// recorded in history and deposited.
    pub fn is_confirmable(&self) -> bool {
        !matches!(self, ConfirmationType::ServedImpression)
    }
}

impl fmt::Display for ConfirmationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmationType {
    type Err = AdsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfirmationType::ALL
            .into_iter()
            .find(|confirmation_type| confirmation_type.as_str() == s)
            .ok_or_else(|| {
                AdsError::invalid_history_item(format!("Unknown confirmation type: {}", s))
            })
    }
}

/// Identity of one ad instance that was served or clicked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdInfo {
    pub ad_type: AdType,
    pub placement_id: String,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub segment: String,
    pub target_url: Url,
}

impl AdInfo {
    pub fn is_valid(&self) -> bool {
        !self.placement_id.is_empty()
            && !self.creative_instance_id.is_empty()
            && !self.creative_set_id.is_empty()
            && !self.campaign_id.is_empty()
            && !self.advertiser_id.is_empty()
            && is_valid_target_url(&self.target_url)
    }
}

/// Catalog entry describing a creative instance, independent of placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeAd {
    pub ad_type: AdType,
    pub creative_instance_id: String,
    pub creative_set_id: String,
    pub campaign_id: String,
    pub advertiser_id: String,
    pub segment: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub target_url: Url,
}

impl CreativeAd {
    /// Binds this creative to a concrete placement
    pub fn to_ad_info(&self, placement_id: &str) -> AdInfo {
        AdInfo {
            ad_type: self.ad_type,
            placement_id: placement_id.to_string(),
            creative_instance_id: self.creative_instance_id.clone(),
            creative_set_id: self.creative_set_id.clone(),
            campaign_id: self.campaign_id.clone(),
            advertiser_id: self.advertiser_id.clone(),
            segment: self.segment.clone(),
            target_url: self.target_url.clone(),
        }
    }
}

fn is_valid_target_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
}
