//! End-to-end behaviour of the ads context driven by a manual clock

use chrono::{DateTime, Duration, Utc};
use pageland_core::{AdType, AdsConfig, Clock, ConfirmationType, CreativeAd, ManualClock, Tab, TabId};
use pageland_history::{Database, Reaction};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use url::Url;

use crate::events::{AdEventNotification, ReminderEvent, SiteVisitEvent};
use crate::{AdsContext, InMemoryCatalog, RecordingDepositSink};

const CREATIVE: &str = "creative-instance";

struct Harness {
    clock: Arc<ManualClock>,
    deposits: Arc<RecordingDepositSink>,
    ads: AdsContext,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(AdsConfig::default())
    }

    fn with_config(config: AdsConfig) -> Self {
        Self::with_database(config, Database::open_in_memory().unwrap())
    }

    fn with_database(config: AdsConfig, db: Database) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let deposits = Arc::new(RecordingDepositSink::new());
        let catalog: InMemoryCatalog = [AdType::NotificationAd, AdType::SearchResultAd]
            .into_iter()
            .map(|ad_type| CreativeAd {
                ad_type,
                creative_instance_id: CREATIVE.to_string(),
                creative_set_id: "creative-set".to_string(),
                campaign_id: "campaign".to_string(),
                advertiser_id: "advertiser".to_string(),
                segment: "travel".to_string(),
                title: "X marks the spot".to_string(),
                description: "Visit x.com".to_string(),
                target_url: url("https://x.com/landing"),
            })
            .collect();

        let ads = AdsContext::new(
            config,
            clock.clone(),
            db,
            Box::new(catalog),
            deposits.clone(),
        )
        .unwrap();

        Self {
            clock,
            deposits,
            ads,
        }
    }

    fn click(&mut self, placement_id: &str) {
        assert!(self.ads.trigger_ad_event(
            AdType::NotificationAd,
            placement_id,
            CREATIVE,
            ConfirmationType::ViewedImpression
        ));
        assert!(self.ads.trigger_ad_event(
            AdType::NotificationAd,
            placement_id,
            CREATIVE,
            ConfirmationType::Clicked
        ));
    }

    fn advance(&mut self, by: Duration) -> usize {
        self.clock.advance(by);
        self.ads.run_due_timers()
    }

    fn history(&self, confirmation_type: ConfirmationType) -> usize {
        self.ads
            .ledger()
            .history()
            .get_for_creative_instance_id(CREATIVE)
            .unwrap()
            .iter()
            .filter(|item| item.confirmation_type == confirmation_type)
            .count()
    }
}

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn tab(id: i32, s: &str) -> Tab {
    Tab::new(TabId(id)).with_redirect_chain(vec![url(s)])
}

/// Renames a table through a second connection so writes to it fail
fn rename_table(path: &Path, from: &str, to: &str) {
    rusqlite::Connection::open(path)
        .unwrap()
        .execute_batch(&format!("ALTER TABLE {} RENAME TO {}", from, to))
        .unwrap();
}

fn drain<T: Clone>(receiver: &mut broadcast::Receiver<T>) -> Vec<T> {
    std::iter::from_fn(|| receiver.try_recv().ok()).collect()
}

fn names(events: &[SiteVisitEvent]) -> Vec<&'static str> {
    events
        .iter()
        .map(|event| match event {
            SiteVisitEvent::MaybeLandOnPage { .. } => "maybe_land",
            SiteVisitEvent::DidSuspendPageLand { .. } => "suspend",
            SiteVisitEvent::DidResumePageLand { .. } => "resume",
            SiteVisitEvent::DidLandOnPage { .. } => "landed",
            SiteVisitEvent::DidNotLandOnPage { .. } => "not_landed",
            SiteVisitEvent::CanceledPageLand { .. } => "canceled",
        })
        .collect()
}

#[test]
fn test_lands_after_delay_when_tab_shows_ad_site() {
    let mut h = Harness::new();
    let mut site_visits = h.ads.subscribe_site_visits();

    h.ads.on_did_open_new_tab(tab(1, "https://search.example/"));
    h.click("placement-1");
    h.ads.on_tab_did_change(tab(1, "https://x.com/landing"));
    assert_eq!(names(&drain(&mut site_visits)), vec!["maybe_land"]);

    h.advance(Duration::milliseconds(4999));
    assert!(drain(&mut site_visits).is_empty());

    h.advance(Duration::milliseconds(1));
    let events = drain(&mut site_visits);
    assert_eq!(names(&events), vec!["landed"]);
    match &events[0] {
        SiteVisitEvent::DidLandOnPage { tab_id, ad } => {
            assert_eq!(*tab_id, TabId(1));
            assert_eq!(ad.placement_id, "placement-1");
        }
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(h.history(ConfirmationType::Landed), 1);
    let landed = h
        .ads
        .ledger()
        .history()
        .get_for_creative_instance_id(CREATIVE)
        .unwrap()
        .into_iter()
        .find(|item| item.confirmation_type == ConfirmationType::Landed)
        .unwrap();
    assert_eq!(landed.title, "X marks the spot");
    assert!(h
        .deposits
        .deposits()
        .iter()
        .any(|deposit| deposit.confirmation_type == ConfirmationType::Landed));
    assert_eq!(h.ads.site_visit().page_land_count(), 0);
}

#[test]
fn test_new_tab_on_other_site_does_not_land() {
    let mut h = Harness::new();
    let mut site_visits = h.ads.subscribe_site_visits();

    h.click("placement-1");
    h.ads.on_did_open_new_tab(tab(1, "https://other.com/"));
    h.advance(Duration::seconds(5));

    assert_eq!(
        names(&drain(&mut site_visits)),
        vec!["maybe_land", "not_landed"]
    );
    assert_eq!(h.history(ConfirmationType::Landed), 0);
}

#[test]
fn test_unrelated_new_tab_takes_the_click() {
    let mut h = Harness::new();
    let mut site_visits = h.ads.subscribe_site_visits();

    h.click("placement-1");
    h.ads.on_did_open_new_tab(Tab::new(TabId(1)));
    assert_eq!(
        h.ads.site_visit().page_land(TabId(1)).unwrap().ad.placement_id,
        "placement-1"
    );
    assert!(h.ads.site_visit().last_clicked_ad().is_none());

    // The click is spent, so a later tab on the ad's site does not start one
    h.ads.on_tab_did_change(tab(2, "https://x.com/landing"));
    assert_eq!(h.ads.site_visit().page_land_count(), 1);

    h.advance(Duration::seconds(5));
    assert_eq!(
        names(&drain(&mut site_visits)),
        vec!["maybe_land", "not_landed"]
    );
    assert_eq!(h.ads.site_visit().page_land_count(), 0);
    assert_eq!(h.history(ConfirmationType::Landed), 0);
}

#[test]
fn test_failed_landed_write_reports_did_not_land() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ads.sqlite");
    let mut h = Harness::with_database(AdsConfig::default(), Database::open(&path).unwrap());
    let mut site_visits = h.ads.subscribe_site_visits();
    let mut ad_events = h.ads.subscribe_ad_events();

    h.click("placement-1");
    h.ads.on_did_open_new_tab(tab(1, "https://x.com/landing"));
    drain(&mut ad_events);

    rename_table(&path, "ad_history", "ad_history_offline");
    h.advance(Duration::seconds(5));
    rename_table(&path, "ad_history_offline", "ad_history");

    let events = drain(&mut site_visits);
    assert_eq!(names(&events), vec!["maybe_land", "not_landed"]);
    match &events[1] {
        SiteVisitEvent::DidNotLandOnPage { tab_id, ad } => {
            assert_eq!(*tab_id, TabId(1));
            assert_eq!(ad.placement_id, "placement-1");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(drain(&mut ad_events).iter().any(|event| matches!(
        event,
        AdEventNotification::FailedToFireAdEvent {
            confirmation_type: ConfirmationType::Landed,
            ..
        }
    )));

    assert_eq!(h.history(ConfirmationType::Clicked), 1);
    assert_eq!(h.history(ConfirmationType::Landed), 0);
    assert!(!h
        .ads
        .ledger()
        .has_fired("placement-1", ConfirmationType::Landed)
        .unwrap());
    assert!(!h
        .deposits
        .deposits()
        .iter()
        .any(|deposit| deposit.confirmation_type == ConfirmationType::Landed));
}

#[test]
fn test_failed_history_write_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ads.sqlite");
    let mut h = Harness::with_database(AdsConfig::default(), Database::open(&path).unwrap());

    rename_table(&path, "ad_history", "ad_history_offline");
    assert!(!h.ads.trigger_ad_event(
        AdType::NotificationAd,
        "placement-1",
        CREATIVE,
        ConfirmationType::ViewedImpression
    ));
    rename_table(&path, "ad_history_offline", "ad_history");
    assert!(h.ads.trigger_ad_event(
        AdType::NotificationAd,
        "placement-1",
        CREATIVE,
        ConfirmationType::ViewedImpression
    ));

    assert_eq!(h.history(ConfirmationType::ViewedImpression), 1);
    assert_eq!(h.deposits.deposits().len(), 1);
}

#[test]
fn test_hidden_tab_pauses_page_land() {
    let mut h = Harness::new();
    let mut site_visits = h.ads.subscribe_site_visits();

    h.click("placement-1");
    h.ads.on_did_open_new_tab(tab(1, "https://x.com/landing"));
    h.advance(Duration::seconds(2));
    h.ads
        .on_tab_did_change(tab(1, "https://x.com/landing").with_visibility(false));

    h.advance(Duration::seconds(100));
    let events = drain(&mut site_visits);
    assert_eq!(names(&events), vec!["maybe_land", "suspend"]);
    assert_eq!(
        events[1],
        SiteVisitEvent::DidSuspendPageLand {
            tab_id: TabId(1),
            remaining: Duration::seconds(3)
        }
    );

    h.ads.on_tab_did_change(tab(1, "https://x.com/landing"));
    assert_eq!(
        drain(&mut site_visits),
        vec![SiteVisitEvent::DidResumePageLand {
            tab_id: TabId(1),
            remaining: Duration::seconds(3)
        }]
    );

    h.advance(Duration::milliseconds(2999));
    assert!(drain(&mut site_visits).is_empty());
    h.advance(Duration::milliseconds(1));
    assert_eq!(names(&drain(&mut site_visits)), vec!["landed"]);
}

#[test]
fn test_navigating_away_cancels_page_land() {
    let mut h = Harness::new();
    let mut site_visits = h.ads.subscribe_site_visits();

    h.click("placement-1");
    h.ads.on_tab_did_change(tab(1, "https://x.com/landing"));
    h.advance(Duration::seconds(1));
    h.ads.on_tab_did_change(tab(1, "https://other.com/"));

    assert_eq!(
        names(&drain(&mut site_visits)),
        vec!["maybe_land", "canceled"]
    );
    assert_eq!(h.ads.site_visit().page_land_count(), 0);

    h.advance(Duration::seconds(10));
    assert!(drain(&mut site_visits).is_empty());
    assert_eq!(h.history(ConfirmationType::Landed), 0);
}

#[test]
fn test_closing_tab_cancels_page_land() {
    let mut h = Harness::new();
    let mut site_visits = h.ads.subscribe_site_visits();

    h.click("placement-1");
    h.ads.on_did_open_new_tab(tab(1, "https://x.com/landing"));
    h.ads.on_did_close_tab(TabId(1));

    assert_eq!(
        names(&drain(&mut site_visits)),
        vec!["maybe_land", "canceled"]
    );
    h.advance(Duration::seconds(5));
    assert!(drain(&mut site_visits).is_empty());
}

#[test]
fn test_one_page_land_per_tab() {
    let mut h = Harness::new();

    h.click("placement-1");
    h.ads.on_tab_did_change(tab(1, "https://x.com/landing"));
    h.click("placement-2");
    h.ads.on_tab_did_change(tab(1, "https://x.com/pricing"));

    // The second click waits for a tab without a page land
    assert_eq!(h.ads.site_visit().page_land_count(), 1);
    assert_eq!(
        h.ads.site_visit().last_clicked_ad().unwrap().placement_id,
        "placement-2"
    );

    h.ads.on_tab_did_change(tab(2, "https://x.com/landing"));
    assert_eq!(h.ads.site_visit().page_land_count(), 2);
    assert_eq!(
        h.ads.site_visit().page_land(TabId(2)).unwrap().ad.placement_id,
        "placement-2"
    );
}

#[test]
fn test_viewed_without_served_fires_served_first() {
    let mut h = Harness::new();
    let mut notifications = h.ads.subscribe_ad_events();

    assert!(h.ads.trigger_ad_event(
        AdType::NotificationAd,
        "placement-1",
        CREATIVE,
        ConfirmationType::ViewedImpression
    ));

    let fired: Vec<ConfirmationType> = drain(&mut notifications)
        .into_iter()
        .filter_map(|notification| match notification {
            AdEventNotification::DidFireAdEvent {
                confirmation_type, ..
            } => Some(confirmation_type),
            AdEventNotification::FailedToFireAdEvent { .. } => None,
        })
        .collect();
    assert_eq!(
        fired,
        vec![
            ConfirmationType::ServedImpression,
            ConfirmationType::ViewedImpression
        ]
    );

    // Served events never reach history or deposits
    assert_eq!(h.history(ConfirmationType::ServedImpression), 0);
    assert_eq!(h.history(ConfirmationType::ViewedImpression), 1);
    assert_eq!(h.deposits.deposits().len(), 1);
}

#[test]
fn test_served_event_fires_once() {
    let mut h = Harness::new();
    assert!(h
        .ads
        .trigger_served_event(AdType::NotificationAd, "placement-1", CREATIVE));
    assert!(!h
        .ads
        .trigger_served_event(AdType::NotificationAd, "placement-1", CREATIVE));
    assert!(h.ads.trigger_ad_event(
        AdType::NotificationAd,
        "placement-1",
        CREATIVE,
        ConfirmationType::ViewedImpression
    ));
    assert!(h.deposits.deposits().iter().all(|deposit| deposit.confirmation_type
        == ConfirmationType::ViewedImpression));
}

#[test]
fn test_reminds_on_every_third_click() {
    let mut h = Harness::new();
    let mut reminders = h.ads.subscribe_reminders();

    let mut reminded_after = Vec::new();
    for click in 1..=9 {
        h.click(&format!("placement-{}", click));
        h.advance(Duration::milliseconds(100));
        if !drain(&mut reminders).is_empty() {
            reminded_after.push(click);
        }
    }

    assert_eq!(reminded_after, vec![3, 6, 9]);
}

#[test]
fn test_reminder_debounce_waits_for_last_click() {
    let mut h = Harness::new();
    let mut reminders = h.ads.subscribe_reminders();

    for click in 1..=3 {
        h.click(&format!("placement-{}", click));
        h.advance(Duration::milliseconds(50));
    }
    assert!(drain(&mut reminders).is_empty());

    h.advance(Duration::milliseconds(50));
    assert_eq!(
        drain(&mut reminders),
        vec![ReminderEvent::RemindUser {
            reminder: crate::events::ReminderType::ClickedSameAdMultipleTimes,
            creative_instance_id: CREATIVE.to_string(),
        }]
    );
}

#[test]
fn test_reminders_disabled_on_mobile() {
    let mut h = Harness::with_config(AdsConfig {
        is_mobile_platform: true,
        ..AdsConfig::default()
    });
    let mut reminders = h.ads.subscribe_reminders();

    for click in 1..=3 {
        h.click(&format!("placement-{}", click));
    }
    h.advance(Duration::seconds(1));
    assert!(drain(&mut reminders).is_empty());
}

#[test]
fn test_search_result_viewed_events_resolve_in_order() {
    let mut h = Harness::new();
    let results: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));

    for placement_id in ["placement-1", "placement-2", "placement-1"] {
        let results = results.clone();
        let placement = placement_id.to_string();
        h.ads.trigger_search_result_ad_viewed_event(
            placement_id,
            CREATIVE,
            Box::new(move |success| results.lock().unwrap().push((placement, success))),
        );
    }

    assert_eq!(
        *results.lock().unwrap(),
        vec![
            ("placement-1".to_string(), true),
            ("placement-2".to_string(), true),
            ("placement-1".to_string(), false),
        ]
    );
}

#[test]
fn test_opted_out_user_fires_nothing() {
    let mut h = Harness::new();
    let mut opt_ins = h.ads.opt_ins().clone();
    opt_ins.notification_ads = false;
    h.ads.set_opt_ins(opt_ins);

    assert!(!h.ads.trigger_ad_event(
        AdType::NotificationAd,
        "placement-1",
        CREATIVE,
        ConfirmationType::ViewedImpression
    ));
    assert!(h.deposits.deposits().is_empty());
}

#[test]
fn test_ad_history_shows_most_significant_interaction() {
    let mut h = Harness::new();
    h.click("placement-1");

    let entries = h
        .ads
        .get_ad_history(start() - Duration::days(1), h.clock.now())
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].ad_content.ad_action, ConfirmationType::Clicked);
    assert_eq!(entries[0].ad_content.brand, "X marks the spot");
}

#[test]
fn test_reactions_deposit_when_activated() {
    let mut h = Harness::new();
    h.click("placement-1");
    let item = h
        .ads
        .ledger()
        .history()
        .get_for_creative_instance_id(CREATIVE)
        .unwrap()
        .remove(0);
    let deposited_before = h.deposits.deposits().len();

    assert_eq!(h.ads.toggle_like_ad(&item).unwrap(), Reaction::Liked);
    assert_eq!(h.ads.toggle_like_ad(&item).unwrap(), Reaction::Neutral);
    assert!(h.ads.toggle_save_ad(&item).unwrap());
    assert!(h.ads.toggle_mark_ad_as_inappropriate(&item).unwrap());
    assert_eq!(h.ads.toggle_dislike_segment("travel").unwrap(), Reaction::Disliked);

    let reactions: Vec<ConfirmationType> = h.deposits.deposits()[deposited_before..]
        .iter()
        .map(|deposit| deposit.confirmation_type)
        .collect();
    assert_eq!(
        reactions,
        vec![
            ConfirmationType::LikedAd,
            ConfirmationType::SavedAd,
            ConfirmationType::MarkAdAsInappropriate
        ]
    );

    let entries = h
        .ads
        .get_ad_history(start() - Duration::days(1), h.clock.now())
        .unwrap();
    assert!(entries[0].ad_content.is_saved);
    assert!(entries[0].ad_content.is_flagged);
    assert_eq!(entries[0].segment_content.opt_action, Reaction::Disliked);
}

#[test]
fn test_remove_all_history() {
    let mut h = Harness::new();
    h.click("placement-1");
    h.ads.remove_all_history().unwrap();

    assert_eq!(h.history(ConfirmationType::Clicked), 0);
    assert!(h.ads.site_visit().last_clicked_ad().is_none());
    // Event log is cleared too, so the placement can be viewed again
    assert!(h.ads.trigger_ad_event(
        AdType::NotificationAd,
        "placement-1",
        CREATIVE,
        ConfirmationType::ViewedImpression
    ));
}

#[test]
fn test_daily_maintenance_purges_expired_data() {
    let mut h = Harness::new();
    assert_eq!(h.ads.next_timer_deadline(), Some(start() + Duration::days(1)));
    h.click("placement-1");

    // Reminder debounce, then the first maintenance run
    assert_eq!(h.advance(Duration::days(31)), 2);

    assert_eq!(h.history(ConfirmationType::Clicked), 0);
    assert!(h.deposits.deposits().is_empty());
    assert_eq!(
        h.ads.next_timer_deadline(),
        Some(h.clock.now() + Duration::days(1))
    );
}

#[test]
fn test_shutdown_cancels_timers() {
    let mut h = Harness::new();
    h.click("placement-1");
    h.ads.on_did_open_new_tab(tab(1, "https://x.com/landing"));
    assert!(h.ads.pending_timers() > 0);

    h.ads.shutdown();
    assert_eq!(h.ads.pending_timers(), 0);
    assert_eq!(h.ads.site_visit().page_land_count(), 0);
}

#[test]
fn test_open_creates_database_in_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = AdsConfig {
        data_dir: dir.path().join("profile"),
        ..AdsConfig::default()
    };
    let database_path = config.database_path();

    let ads = AdsContext::open(
        config,
        Arc::new(ManualClock::new(start())),
        Box::new(InMemoryCatalog::new()),
        Arc::new(RecordingDepositSink::new()),
    )
    .unwrap();

    assert!(database_path.exists());
    assert!(ads.tabs().is_empty());
}
