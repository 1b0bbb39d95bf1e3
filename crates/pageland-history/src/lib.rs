//! Persisted ad history, ad events and reactions for Pageland

pub mod ad_events;
pub mod database;
pub mod reactions;
pub mod types;
pub mod value;

use chrono::{DateTime, Duration, Utc};
use pageland_core::{AdsError, AdsResult, Clock, ConfirmationType};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub use ad_events::AdEventLog;
pub use reactions::ReactionStore;
pub use types::*;
pub use value::{build_ad_history_value, AdContent, AdHistoryEntry, SegmentContent};

use types::AdHistoryRow;

/// Shared handle to the ads database
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (and migrate) the database at the given path
    pub fn open(path: &Path) -> AdsResult<Self> {
        log::info!("Opening ads database at {:?}", path);
        let conn = database::init_database(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> AdsResult<Self> {
        let conn = database::init_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> AdsResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AdsError::database("Failed to acquire database lock"))
    }
}

/// Append-only log of ad interactions
pub struct AdHistoryStore {
    db: Database,
    clock: Arc<dyn Clock>,
    retention_period: Duration,
    batch_size: usize,
}

impl AdHistoryStore {
    pub fn new(
        db: Database,
        clock: Arc<dyn Clock>,
        retention_period: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            db,
            clock,
            retention_period,
            batch_size,
        }
    }

    /// Append items. Saving nothing succeeds.
    pub fn save(&self, items: &[AdHistoryItem]) -> AdsResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut conn = self.db.lock()?;
        database::insert_ad_history(&mut conn, items, self.batch_size)?;
        log::debug!("Saved {} ad history items", items.len());
        Ok(())
    }

    /// Append `item` and record its event for exactly-once checks. Nothing is
    /// written unless both succeed, so a failed write can be retried.
    pub fn save_with_event(&self, item: &AdHistoryItem) -> AdsResult<()> {
        let mut conn = self.db.lock()?;
        database::insert_ad_event_with_history(&mut conn, item)?;
        log::debug!(
            "Saved {} ad history item for placement {}",
            item.confirmation_type,
            item.placement_id
        );
        Ok(())
    }

    /// Items created within `[from, to]`, newest first
    pub fn get_for_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AdsResult<Vec<AdHistoryItem>> {
        let rows = {
            let conn = self.db.lock()?;
            database::get_ad_history_for_date_range(
                &conn,
                from.timestamp_micros(),
                to.timestamp_micros(),
            )?
        };
        Ok(into_valid_items(rows))
    }

    /// The most significant row per placement within `[from, to]`, newest first.
    ///
    /// Clicks outrank dismissals, which outrank views. Any other confirmation
    /// is only returned for a placement that has nothing ranked.
    pub fn get_highest_ranked_placements_for_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AdsResult<Vec<AdHistoryItem>> {
        let items = self.get_for_date_range(from, to)?;

        let mut best: HashMap<String, AdHistoryItem> = HashMap::new();
        for item in items {
            match best.get(&item.placement_id) {
                // Rows arrive newest first, so equal ranks keep the newer row
                Some(current) if rank(current.confirmation_type) >= rank(item.confirmation_type) => {}
                _ => {
                    best.insert(item.placement_id.clone(), item);
                }
            }
        }

        let mut placements: Vec<AdHistoryItem> = best.into_values().collect();
        placements.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(placements)
    }

    /// All items for a creative instance in storage order
    pub fn get_for_creative_instance_id(
        &self,
        creative_instance_id: &str,
    ) -> AdsResult<Vec<AdHistoryItem>> {
        let rows = {
            let conn = self.db.lock()?;
            database::get_ad_history_for_creative_instance_id(&conn, creative_instance_id)?
        };
        Ok(into_valid_items(rows))
    }

    /// Delete items strictly older than the retention period
    pub fn purge_expired(&self) -> AdsResult<usize> {
        let cutoff = self.clock.now() - self.retention_period;
        let conn = self.db.lock()?;
        let deleted = database::purge_expired_ad_history(&conn, cutoff.timestamp_micros())?;
        if deleted > 0 {
            log::info!("Purged {} expired ad history items", deleted);
        }
        Ok(deleted)
    }

    /// Clear all history (for privacy)
    pub fn remove_all(&self) -> AdsResult<usize> {
        let conn = self.db.lock()?;
        database::delete_all_ad_history(&conn)
    }
}

fn rank(confirmation_type: ConfirmationType) -> u8 {
    match confirmation_type {
        ConfirmationType::Clicked => 3,
        ConfirmationType::Dismissed => 2,
        ConfirmationType::ViewedImpression => 1,
        _ => 0,
    }
}

fn into_valid_items(rows: Vec<AdHistoryRow>) -> Vec<AdHistoryItem> {
    rows.into_iter()
        .filter_map(|row| match AdHistoryItem::try_from(row) {
            Ok(item) => Some(item),
            Err(e) => {
                log::warn!("Dropping invalid ad history row: {}", e);
                None
            }
        })
        .collect()
}
