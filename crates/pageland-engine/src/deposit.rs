//! Reward deposits for confirmed ad events

use chrono::{DateTime, Utc};
use pageland_core::{AdInfo, AdType, AdsError, AdsResult, ConfirmationType};
use serde::Serialize;
use serde_json::json;
use std::sync::Mutex;

/// One credit handed to the rewards side
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositRequest {
    pub creative_instance_id: String,
    pub segment: String,
    pub ad_type: AdType,
    pub confirmation_type: ConfirmationType,
    pub user_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DepositRequest {
    pub fn new(ad: &AdInfo, confirmation_type: ConfirmationType, created_at: DateTime<Utc>) -> Self {
        Self {
            creative_instance_id: ad.creative_instance_id.clone(),
            segment: ad.segment.clone(),
            ad_type: ad.ad_type,
            confirmation_type,
            user_data: json!({
                "placementId": ad.placement_id,
                "campaignId": ad.campaign_id,
                "advertiserId": ad.advertiser_id,
            }),
            created_at,
        }
    }
}

/// Receiver of deposits. Calls are fire-and-forget; the host owns retries.
pub trait DepositSink: Send + Sync {
    fn deposit(&self, request: &DepositRequest) -> AdsResult<()>;

    /// Drop deposits created before `cutoff`, returning how many were removed
    fn purge_expired(&self, _cutoff: DateTime<Utc>) -> AdsResult<usize> {
        Ok(0)
    }
}

/// Keeps deposits in memory, for tests and replays
#[derive(Debug, Default)]
pub struct RecordingDepositSink {
    deposits: Mutex<Vec<DepositRequest>>,
}

impl RecordingDepositSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposits(&self) -> Vec<DepositRequest> {
        match self.deposits.lock() {
            Ok(deposits) => deposits.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl DepositSink for RecordingDepositSink {
    fn deposit(&self, request: &DepositRequest) -> AdsResult<()> {
        self.deposits
            .lock()
            .map_err(|_| AdsError::deposit("Deposit sink lock poisoned"))?
            .push(request.clone());
        Ok(())
    }

    fn purge_expired(&self, cutoff: DateTime<Utc>) -> AdsResult<usize> {
        let mut deposits = self
            .deposits
            .lock()
            .map_err(|_| AdsError::deposit("Deposit sink lock poisoned"))?;
        let before = deposits.len();
        deposits.retain(|deposit| deposit.created_at >= cutoff);
        Ok(before - deposits.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use url::Url;

    fn ad() -> AdInfo {
        AdInfo {
            ad_type: AdType::NotificationAd,
            placement_id: "placement".to_string(),
            creative_instance_id: "creative-instance".to_string(),
            creative_set_id: "creative-set".to_string(),
            campaign_id: "campaign".to_string(),
            advertiser_id: "advertiser".to_string(),
            segment: "travel".to_string(),
            target_url: Url::parse("https://brave.com").unwrap(),
        }
    }

    #[test]
    fn test_request_carries_user_data() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let request = DepositRequest::new(&ad(), ConfirmationType::Landed, now);
        assert_eq!(request.user_data["placementId"], "placement");
        assert_eq!(request.user_data["campaignId"], "campaign");
        assert_eq!(request.user_data["advertiserId"], "advertiser");
    }

    #[test]
    fn test_recording_sink_purges_before_cutoff() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let sink = RecordingDepositSink::new();
        sink.deposit(&DepositRequest::new(
            &ad(),
            ConfirmationType::ViewedImpression,
            now - Duration::days(31),
        ))
        .unwrap();
        sink.deposit(&DepositRequest::new(&ad(), ConfirmationType::Clicked, now))
            .unwrap();

        assert_eq!(sink.purge_expired(now - Duration::days(30)).unwrap(), 1);
        let remaining = sink.deposits();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].confirmation_type, ConfirmationType::Clicked);
    }
}
