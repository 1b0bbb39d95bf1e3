//! Periodic purge of expired ad history, ad events and deposits

use chrono::{DateTime, Duration, Utc};
use pageland_core::AdsResult;
use serde::Serialize;

use crate::ledger::AdLedger;
use crate::timers::{TimerId, TimerQueue, TimerTask};

/// Rows removed by one maintenance run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeStats {
    pub ad_history: usize,
    pub ad_events: usize,
    pub deposits: usize,
}

pub struct RetentionMaintenance {
    interval: Duration,
    timer: Option<TimerId>,
}

impl RetentionMaintenance {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timer: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    /// Schedules the next run one interval from `now`, unless one is pending
    pub fn start(&mut self, timers: &mut TimerQueue<TimerTask>, now: DateTime<Utc>) {
        if self.timer.is_some() {
            return;
        }
        self.timer = Some(timers.schedule(now + self.interval, TimerTask::Maintenance));
    }

    pub fn stop(&mut self, timers: &mut TimerQueue<TimerTask>) {
        if let Some(timer) = self.timer.take() {
            timers.cancel(timer);
        }
    }

    pub fn run(&self, ledger: &AdLedger) -> AdsResult<PurgeStats> {
        let stats = PurgeStats {
            ad_history: ledger.history().purge_expired()?,
            ad_events: ledger.ad_events().purge_expired()?,
            deposits: ledger.purge_expired_deposits()?,
        };
        log::info!(
            "Purged {} ad history items, {} ad events and {} deposits",
            stats.ad_history,
            stats.ad_events,
            stats.deposits
        );
        Ok(stats)
    }

    /// Runs the purge and schedules the next one
    pub fn on_timer_fired(
        &mut self,
        ledger: &AdLedger,
        timers: &mut TimerQueue<TimerTask>,
        now: DateTime<Utc>,
    ) -> AdsResult<PurgeStats> {
        self.timer = None;
        self.start(timers, now);
        self.run(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deposit::{DepositSink, RecordingDepositSink};
    use crate::DepositRequest;
    use pageland_core::{AdInfo, AdType, AdsConfig, ConfirmationType, ManualClock};
    use pageland_history::Database;
    use std::sync::Arc;
    use url::Url;

    #[test]
    fn test_reschedules_after_each_run() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let ledger = AdLedger::new(
            Database::open_in_memory().unwrap(),
            Arc::new(ManualClock::new(now)),
            &AdsConfig::default(),
            Arc::new(RecordingDepositSink::new()),
        );
        let mut maintenance = RetentionMaintenance::new(Duration::days(1));
        let mut timers = TimerQueue::new();

        maintenance.start(&mut timers, now);
        maintenance.start(&mut timers, now);
        assert_eq!(timers.len(), 1);

        let fired_at = now + Duration::days(1);
        assert_eq!(timers.pop_due(fired_at).unwrap().2, TimerTask::Maintenance);
        maintenance
            .on_timer_fired(&ledger, &mut timers, fired_at)
            .unwrap();
        assert_eq!(timers.next_deadline(), Some(fired_at + Duration::days(1)));

        maintenance.stop(&mut timers);
        assert!(!maintenance.is_running());
        assert!(timers.is_empty());
    }

    #[test]
    fn test_run_purges_every_store() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let deposits = Arc::new(RecordingDepositSink::new());
        let ledger = AdLedger::new(
            Database::open_in_memory().unwrap(),
            clock.clone(),
            &AdsConfig::default(),
            deposits.clone(),
        );
        let ad = AdInfo {
            ad_type: AdType::NotificationAd,
            placement_id: "placement".to_string(),
            creative_instance_id: "creative-instance".to_string(),
            creative_set_id: "creative-set".to_string(),
            campaign_id: "campaign".to_string(),
            advertiser_id: "advertiser".to_string(),
            segment: "travel".to_string(),
            target_url: Url::parse("https://brave.com").unwrap(),
        };

        ledger
            .confirm(&ad, ConfirmationType::ServedImpression, "Brave", "")
            .unwrap();
        ledger
            .confirm(&ad, ConfirmationType::ViewedImpression, "Brave", "")
            .unwrap();
        deposits
            .deposit(&DepositRequest::new(&ad, ConfirmationType::Clicked, start))
            .unwrap();

        clock.advance(Duration::days(31));
        let stats = RetentionMaintenance::new(Duration::days(1))
            .run(&ledger)
            .unwrap();

        assert_eq!(
            stats,
            PurgeStats {
                ad_history: 1,
                ad_events: 2,
                deposits: 2,
            }
        );
    }
}
