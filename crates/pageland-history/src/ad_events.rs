//! Record of which events fired for which placement

use chrono::Duration;
use pageland_core::{AdInfo, AdsResult, Clock, ConfirmationType};
use std::sync::Arc;

use crate::{database, Database};

/// Fired ad events, used to order and deduplicate events per placement
pub struct AdEventLog {
    db: Database,
    clock: Arc<dyn Clock>,
    retention_period: Duration,
}

impl AdEventLog {
    pub fn new(db: Database, clock: Arc<dyn Clock>, retention_period: Duration) -> Self {
        Self {
            db,
            clock,
            retention_period,
        }
    }

    pub fn record(&self, ad: &AdInfo, confirmation_type: ConfirmationType) -> AdsResult<()> {
        let conn = self.db.lock()?;
        database::insert_ad_event(
            &conn,
            &ad.placement_id,
            ad.ad_type.as_str(),
            confirmation_type.as_str(),
            &ad.creative_instance_id,
            self.clock.now().timestamp_micros(),
        )
    }

    pub fn has_fired(
        &self,
        placement_id: &str,
        confirmation_type: ConfirmationType,
    ) -> AdsResult<bool> {
        let conn = self.db.lock()?;
        database::has_ad_event(&conn, placement_id, confirmation_type.as_str())
    }

    /// Delete events strictly older than the retention period
    pub fn purge_expired(&self) -> AdsResult<usize> {
        let cutoff = self.clock.now() - self.retention_period;
        let conn = self.db.lock()?;
        database::purge_expired_ad_events(&conn, cutoff.timestamp_micros())
    }

    pub fn remove_all(&self) -> AdsResult<usize> {
        let conn = self.db.lock()?;
        database::delete_all_ad_events(&conn)
    }
}
