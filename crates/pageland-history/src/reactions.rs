//! User reactions to ads: like/dislike, save and flag

use pageland_core::{AdsResult, Clock};
use std::sync::Arc;

use crate::types::Reaction;
use crate::{database, Database};

const AD_REACTION: &str = "ad";
const SEGMENT_REACTION: &str = "segment";
const SAVED_AD: &str = "saved";
const FLAGGED_AD: &str = "flagged";

/// Keyed store of user reactions.
///
/// Like/dislike is keyed by advertiser id (ads) or segment; saving by
/// creative instance id; marking as inappropriate by creative set id.
pub struct ReactionStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl ReactionStore {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn reaction_for_ad(&self, advertiser_id: &str) -> AdsResult<Reaction> {
        self.reaction(AD_REACTION, advertiser_id)
    }

    pub fn toggle_like_ad(&self, advertiser_id: &str) -> AdsResult<Reaction> {
        self.toggle_reaction(AD_REACTION, advertiser_id, Reaction::Liked)
    }

    pub fn toggle_dislike_ad(&self, advertiser_id: &str) -> AdsResult<Reaction> {
        self.toggle_reaction(AD_REACTION, advertiser_id, Reaction::Disliked)
    }

    pub fn reaction_for_segment(&self, segment: &str) -> AdsResult<Reaction> {
        self.reaction(SEGMENT_REACTION, segment)
    }

    pub fn toggle_like_segment(&self, segment: &str) -> AdsResult<Reaction> {
        self.toggle_reaction(SEGMENT_REACTION, segment, Reaction::Liked)
    }

    pub fn toggle_dislike_segment(&self, segment: &str) -> AdsResult<Reaction> {
        self.toggle_reaction(SEGMENT_REACTION, segment, Reaction::Disliked)
    }

    pub fn is_saved(&self, creative_instance_id: &str) -> AdsResult<bool> {
        self.flag(SAVED_AD, creative_instance_id)
    }

    /// Returns whether the ad is saved after toggling
    pub fn toggle_save_ad(&self, creative_instance_id: &str) -> AdsResult<bool> {
        self.toggle_flag(SAVED_AD, creative_instance_id)
    }

    pub fn is_marked_as_inappropriate(&self, creative_set_id: &str) -> AdsResult<bool> {
        self.flag(FLAGGED_AD, creative_set_id)
    }

    /// Returns whether the creative set is flagged after toggling
    pub fn toggle_mark_ad_as_inappropriate(&self, creative_set_id: &str) -> AdsResult<bool> {
        self.toggle_flag(FLAGGED_AD, creative_set_id)
    }

    pub fn clear(&self) -> AdsResult<usize> {
        let conn = self.db.lock()?;
        database::delete_all_reactions(&conn)
    }

    fn reaction(&self, kind: &str, key: &str) -> AdsResult<Reaction> {
        let conn = self.db.lock()?;
        Ok(database::get_reaction(&conn, kind, key)?
            .map(Reaction::from_db)
            .unwrap_or_default())
    }

    fn toggle_reaction(&self, kind: &str, key: &str, toggled: Reaction) -> AdsResult<Reaction> {
        let conn = self.db.lock()?;
        let current = database::get_reaction(&conn, kind, key)?
            .map(Reaction::from_db)
            .unwrap_or_default();

        let next = if current == toggled {
            Reaction::Neutral
        } else {
            toggled
        };

        if next == Reaction::Neutral {
            database::delete_reaction(&conn, kind, key)?;
        } else {
            database::set_reaction(
                &conn,
                kind,
                key,
                next.to_db(),
                self.clock.now().timestamp_micros(),
            )?;
        }

        log::debug!("Reaction {} {} is now {:?}", kind, key, next);
        Ok(next)
    }

    fn flag(&self, kind: &str, key: &str) -> AdsResult<bool> {
        let conn = self.db.lock()?;
        Ok(database::get_reaction(&conn, kind, key)?.is_some())
    }

    fn toggle_flag(&self, kind: &str, key: &str) -> AdsResult<bool> {
        let conn = self.db.lock()?;
        let is_set = database::get_reaction(&conn, kind, key)?.is_some();
        if is_set {
            database::delete_reaction(&conn, kind, key)?;
        } else {
            database::set_reaction(&conn, kind, key, 1, self.clock.now().timestamp_micros())?;
        }
        Ok(!is_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use pageland_core::ManualClock;

    fn start() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn store() -> ReactionStore {
        ReactionStore::new(
            Database::open_in_memory().unwrap(),
            Arc::new(ManualClock::new(start())),
        )
    }

    fn updated_at(reactions: &ReactionStore, kind: &str, key: &str) -> i64 {
        let conn = reactions.db.lock().unwrap();
        conn.query_row(
            "SELECT updated_at FROM reactions WHERE kind = ? AND key = ?",
            [kind, key],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_like_toggles_back_to_neutral() {
        let reactions = store();
        assert_eq!(reactions.reaction_for_ad("advertiser").unwrap(), Reaction::Neutral);
        assert_eq!(reactions.toggle_like_ad("advertiser").unwrap(), Reaction::Liked);
        assert_eq!(reactions.reaction_for_ad("advertiser").unwrap(), Reaction::Liked);
        assert_eq!(reactions.toggle_like_ad("advertiser").unwrap(), Reaction::Neutral);
        assert_eq!(reactions.reaction_for_ad("advertiser").unwrap(), Reaction::Neutral);
    }

    #[test]
    fn test_dislike_replaces_like() {
        let reactions = store();
        reactions.toggle_like_segment("travel").unwrap();
        assert_eq!(
            reactions.toggle_dislike_segment("travel").unwrap(),
            Reaction::Disliked
        );
        assert_eq!(
            reactions.reaction_for_segment("travel").unwrap(),
            Reaction::Disliked
        );
        // Ads and segments are keyed independently
        assert_eq!(reactions.reaction_for_ad("travel").unwrap(), Reaction::Neutral);
    }

    #[test]
    fn test_save_and_flag() {
        let reactions = store();
        assert!(reactions.toggle_save_ad("creative-instance").unwrap());
        assert!(reactions.is_saved("creative-instance").unwrap());
        assert!(!reactions.is_marked_as_inappropriate("creative-instance").unwrap());

        assert!(reactions.toggle_mark_ad_as_inappropriate("creative-set").unwrap());
        assert!(!reactions.toggle_save_ad("creative-instance").unwrap());
        assert!(!reactions.is_saved("creative-instance").unwrap());

        assert_eq!(reactions.clear().unwrap(), 1);
        assert!(!reactions.is_marked_as_inappropriate("creative-set").unwrap());
    }

    #[test]
    fn test_reactions_are_stamped_with_clock_time() {
        let clock = Arc::new(ManualClock::new(start()));
        let reactions = ReactionStore::new(Database::open_in_memory().unwrap(), clock.clone());

        reactions.toggle_like_ad("advertiser").unwrap();
        assert_eq!(
            updated_at(&reactions, AD_REACTION, "advertiser"),
            start().timestamp_micros()
        );

        clock.advance(Duration::hours(1));
        reactions.toggle_dislike_ad("advertiser").unwrap();
        reactions.toggle_save_ad("creative-instance").unwrap();
        let later = (start() + Duration::hours(1)).timestamp_micros();
        assert_eq!(updated_at(&reactions, AD_REACTION, "advertiser"), later);
        assert_eq!(updated_at(&reactions, SAVED_AD, "creative-instance"), later);
    }
}
