//! Lookup of served creatives by creative instance id

use pageland_core::{AdType, CreativeAd};
use std::collections::HashMap;

/// Source of the creatives that can be triggered
pub trait CreativeAdCatalog: Send + Sync {
    fn get(&self, ad_type: AdType, creative_instance_id: &str) -> Option<CreativeAd>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    creatives: HashMap<(AdType, String), CreativeAd>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a creative
    pub fn insert(&mut self, creative: CreativeAd) {
        self.creatives.insert(
            (creative.ad_type, creative.creative_instance_id.clone()),
            creative,
        );
    }

    pub fn len(&self) -> usize {
        self.creatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creatives.is_empty()
    }
}

impl FromIterator<CreativeAd> for InMemoryCatalog {
    fn from_iter<I: IntoIterator<Item = CreativeAd>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for creative in iter {
            catalog.insert(creative);
        }
        catalog
    }
}

impl CreativeAdCatalog for InMemoryCatalog {
    fn get(&self, ad_type: AdType, creative_instance_id: &str) -> Option<CreativeAd> {
        self.creatives
            .get(&(ad_type, creative_instance_id.to_string()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn creative(ad_type: AdType, creative_instance_id: &str) -> CreativeAd {
        CreativeAd {
            ad_type,
            creative_instance_id: creative_instance_id.to_string(),
            creative_set_id: "creative-set".to_string(),
            campaign_id: "campaign".to_string(),
            advertiser_id: "advertiser".to_string(),
            segment: "travel".to_string(),
            title: "Brave".to_string(),
            description: "Browse privately".to_string(),
            target_url: Url::parse("https://brave.com").unwrap(),
        }
    }

    #[test]
    fn test_lookup_is_per_ad_type() {
        let catalog: InMemoryCatalog = vec![creative(AdType::NotificationAd, "creative-instance")]
            .into_iter()
            .collect();

        assert!(catalog
            .get(AdType::NotificationAd, "creative-instance")
            .is_some());
        assert!(catalog
            .get(AdType::NewTabPageAd, "creative-instance")
            .is_none());
        assert!(catalog.get(AdType::NotificationAd, "missing").is_none());
    }
}
