// One watch cycle: reminder pass, then discovery pass.
//
// This is the only component that mutates the cache, and it persists after
// every mutation so an interrupted run loses at most one pending update.
// Notification ordering is send-then-persist: a failed send leaves no trace
// in the cache and the event is picked up again on the next run
// (at-least-once delivery, never silently dropped).
use crate::cache::{CacheStore, TrackedCtf, WatchCache};
use crate::classifier;
use crate::client::Catalog;
use crate::compose;
use crate::mailer::Mailer;
use chrono::{DateTime, Utc};

/// Counters for one cycle, folded into the end-of-run log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub reminders_sent: usize,
    pub new_ctfs: usize,
}

pub struct WatchCycle<'a, C, M> {
    catalog: &'a C,
    mailer: &'a M,
    store: &'a CacheStore,
    remind_window: chrono::Duration,
    detail_delay: std::time::Duration,
}

impl<'a, C: Catalog, M: Mailer> WatchCycle<'a, C, M> {
    pub fn new(
        catalog: &'a C,
        mailer: &'a M,
        store: &'a CacheStore,
        remind_window_hours: i64,
        detail_delay: std::time::Duration,
    ) -> Self {
        Self {
            catalog,
            mailer,
            store,
            remind_window: chrono::Duration::hours(remind_window_hours),
            detail_delay,
        }
    }

    /// Run one complete cycle. Per-item failures are logged and skipped; a
    /// catalog-listing failure aborts the discovery pass only. Never fails
    /// the caller.
    pub async fn run(&self) -> CycleStats {
        let mut cache = self.store.load();
        let mut stats = CycleStats::default();
        self.reminder_pass(&mut cache, &mut stats).await;
        self.discovery_pass(&mut cache, &mut stats).await;
        stats
    }

    /// Remind about tracked CTFs whose start falls inside the look-ahead
    /// window. Already-started events are not reminded. The record is only
    /// flagged (and persisted) after the send succeeded, so a failed send is
    /// retried on the next run.
    async fn reminder_pass(&self, cache: &mut WatchCache, stats: &mut CycleStats) {
        let now = Utc::now();

        let mut pending: Vec<(String, String, String)> = cache
            .ctfs
            .iter()
            .filter(|(_, record)| !record.reminder_sent)
            .filter_map(|(id, record)| {
                record
                    .starts_at
                    .as_ref()
                    .map(|starts| (id.clone(), record.slug.clone(), starts.clone()))
            })
            .collect();
        // The map iterates in arbitrary order; keep runs deterministic.
        pending.sort();

        for (id, slug, starts_raw) in pending {
            let starts = match DateTime::parse_from_rfc3339(&starts_raw) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(e) => {
                    log::warn!(
                        "Tracked CTF {} has an unparseable start time '{}': {}",
                        id,
                        starts_raw,
                        e
                    );
                    continue;
                }
            };

            let until_start = starts - now;
            if until_start < chrono::Duration::zero() || until_start > self.remind_window {
                continue;
            }

            // Re-fetch the detail for the current display name.
            let detail = match self.catalog.detail(&slug).await {
                Ok(Some(detail)) => detail,
                Ok(None) => {
                    log::warn!("Detail for '{}' is unavailable, reminder postponed", slug);
                    continue;
                }
                Err(e) => {
                    log::warn!(
                        "Detail fetch for '{}' failed, reminder postponed: {:#}",
                        slug,
                        e
                    );
                    continue;
                }
            };
            let name = detail.name.clone().unwrap_or_else(|| slug.clone());

            let message = compose::compose_reminder(&name, &slug);
            if let Err(e) = self.mailer.send(&message) {
                log::warn!(
                    "Reminder for '{}' failed to send, will retry next run: {:#}",
                    name,
                    e
                );
                continue;
            }

            if let Some(record) = cache.ctfs.get_mut(&id) {
                record.reminder_sent = true;
                record.checked = now.to_rfc3339();
            }
            if let Err(e) = self.store.save(cache) {
                log::warn!("Failed to persist cache after reminder for '{}': {:#}", name, e);
            }
            stats.reminders_sent += 1;
            log::info!("Reminder sent for '{}' (starts {})", name, starts_raw);
        }
    }

    /// Sweep the catalog for identifiers without a tracking record. Only a
    /// positive classification creates a record: gated events without a
    /// published code stay unseen and are re-evaluated every run.
    async fn discovery_pass(&self, cache: &mut WatchCache, stats: &mut CycleStats) {
        let summaries = match self.catalog.list().await {
            Ok(list) => list,
            Err(e) => {
                log::error!("Failed to fetch the CTF catalog, skipping discovery: {:#}", e);
                return;
            }
        };

        for summary in summaries {
            let key = summary.cache_key();
            if cache.is_tracked(&key) {
                continue;
            }

            // Politeness pause to stay within the catalog's rate limits.
            if !self.detail_delay.is_zero() {
                tokio::time::sleep(self.detail_delay).await;
            }

            let detail = match self.catalog.detail(&summary.slug).await {
                Ok(Some(detail)) => detail,
                Ok(None) => {
                    log::debug!("No detail for '{}', will retry next run", summary.slug);
                    continue;
                }
                Err(e) => {
                    log::warn!(
                        "Detail fetch for '{}' failed, will retry next run: {:#}",
                        summary.slug,
                        e
                    );
                    continue;
                }
            };

            let classification = classifier::classify(&detail);
            if !classification.eligible {
                log::debug!(
                    "'{}' requires an access code and none was found, skipping",
                    summary.name
                );
                continue;
            }

            let message =
                compose::compose_discovery(&summary, &detail, classification.token.as_deref());
            if let Err(e) = self.mailer.send(&message) {
                log::warn!(
                    "Notification for '{}' failed to send, will retry next run: {:#}",
                    summary.name,
                    e
                );
                continue;
            }

            let starts_at = summary
                .starts_at
                .clone()
                .or_else(|| detail.starts_at.clone());
            cache
                .ctfs
                .insert(key, TrackedCtf::new(&summary.slug, starts_at));
            if let Err(e) = self.store.save(cache) {
                log::warn!(
                    "Failed to persist cache after discovering '{}': {:#}",
                    summary.name,
                    e
                );
            }
            stats.new_ctfs += 1;
            log::info!("New CTF: {}", summary.name);
        }

        if stats.new_ctfs > 0 {
            log::info!("Found {} new CTF(s)", stats.new_ctfs);
        } else {
            log::info!("No new CTFs found");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Message;
    use crate::model::{CtfDetail, CtfSummary, ImageRefs};
    use anyhow::Result;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockCatalog {
        summaries: Vec<CtfSummary>,
        details: HashMap<String, CtfDetail>,
        fail_list: bool,
        detail_calls: AtomicUsize,
    }

    impl MockCatalog {
        fn new(summaries: Vec<CtfSummary>, details: Vec<(&str, CtfDetail)>) -> Self {
            Self {
                summaries,
                details: details
                    .into_iter()
                    .map(|(slug, detail)| (slug.to_string(), detail))
                    .collect(),
                fail_list: false,
                detail_calls: AtomicUsize::new(0),
            }
        }

        fn detail_calls(&self) -> usize {
            self.detail_calls.load(Ordering::SeqCst)
        }
    }

    impl Catalog for MockCatalog {
        async fn list(&self) -> Result<Vec<CtfSummary>> {
            if self.fail_list {
                anyhow::bail!("catalog unavailable");
            }
            Ok(self.summaries.clone())
        }

        async fn detail(&self, slug: &str) -> Result<Option<CtfDetail>> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.details.get(slug).cloned())
        }
    }

    #[derive(Default)]
    struct MockMailer {
        sent: Mutex<Vec<Message>>,
        fail: bool,
    }

    impl MockMailer {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn subjects(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.subject.clone())
                .collect()
        }
    }

    impl Mailer for MockMailer {
        fn send(&self, message: &Message) -> Result<()> {
            if self.fail {
                anyhow::bail!("smtp down");
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn summary(id: u64, slug: &str) -> CtfSummary {
        CtfSummary {
            id,
            name: format!("CTF {}", id),
            org_name: Some("HTB".to_string()),
            slug: slug.to_string(),
            starts_at: Some("2026-09-01T10:00:00Z".to_string()),
            ends_at: None,
            images: ImageRefs::default(),
        }
    }

    fn open_detail(name: &str) -> CtfDetail {
        CtfDetail {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn gated_detail(text: &str) -> CtfDetail {
        CtfDetail {
            has_code: Some(true),
            description: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn store_in(dir: &tempfile::TempDir) -> CacheStore {
        CacheStore::new(dir.path().join("ctf_cache.json"))
    }

    fn cycle<'a>(
        catalog: &'a MockCatalog,
        mailer: &'a MockMailer,
        store: &'a CacheStore,
    ) -> WatchCycle<'a, MockCatalog, MockMailer> {
        WatchCycle::new(catalog, mailer, store, 72, Duration::ZERO)
    }

    fn seed_record(store: &CacheStore, id: &str, slug: &str, starts_at: Option<String>) {
        let mut cache = store.load();
        cache
            .ctfs
            .insert(id.to_string(), TrackedCtf::new(slug, starts_at));
        store.save(&cache).unwrap();
    }

    fn in_hours(hours: i64) -> String {
        (Utc::now() + chrono::Duration::hours(hours)).to_rfc3339()
    }

    #[tokio::test]
    async fn discovery_notifies_each_eligible_ctf_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let catalog = MockCatalog::new(
            vec![summary(1, "open-event"), summary(2, "gated-event")],
            vec![
                ("open-event", open_detail("Open Event")),
                ("gated-event", gated_detail("join code: SECR3T-pass")),
            ],
        );
        let mailer = MockMailer::default();

        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.new_ctfs, 2);
        assert_eq!(mailer.sent_count(), 2);
        assert_eq!(catalog.detail_calls(), 2);

        let cache = store.load();
        assert!(cache.is_tracked("1"));
        assert!(cache.is_tracked("2"));
        assert!(!cache.ctfs["1"].reminder_sent);

        // Second run against the unchanged catalog: nothing new, and the
        // tracked identifiers are not even re-fetched.
        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.new_ctfs, 0);
        assert_eq!(mailer.sent_count(), 2);
        assert_eq!(catalog.detail_calls(), 2);
    }

    #[tokio::test]
    async fn gated_ctf_without_code_is_reevaluated_every_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let catalog = MockCatalog::new(
            vec![summary(5, "invite-only")],
            vec![("invite-only", gated_detail("Ask your captain."))],
        );
        let mailer = MockMailer::default();

        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.new_ctfs, 0);
        assert_eq!(mailer.sent_count(), 0);
        assert!(store.load().ctfs.is_empty());

        // Still unseen, so the next run fetches the detail again.
        cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(catalog.detail_calls(), 2);
        assert!(store.load().ctfs.is_empty());
    }

    #[tokio::test]
    async fn missing_detail_skips_without_creating_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let catalog = MockCatalog::new(vec![summary(3, "flaky")], vec![]);
        let mailer = MockMailer::default();

        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.new_ctfs, 0);
        assert!(store.load().ctfs.is_empty());
    }

    #[tokio::test]
    async fn send_failure_leaves_the_ctf_unseen_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let catalog = MockCatalog::new(
            vec![summary(4, "open-event")],
            vec![("open-event", open_detail("Open Event"))],
        );

        let broken = MockMailer::failing();
        let stats = cycle(&catalog, &broken, &store).run().await;
        assert_eq!(stats.new_ctfs, 0);
        assert!(store.load().ctfs.is_empty());

        // Delivery recovered: the same event is found and recorded.
        let mailer = MockMailer::default();
        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.new_ctfs, 1);
        assert!(store.load().is_tracked("4"));
    }

    #[tokio::test]
    async fn record_takes_summary_start_then_detail_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut no_start = summary(6, "detail-start");
        no_start.starts_at = None;
        let mut detail = open_detail("Detail Start");
        detail.starts_at = Some("2026-12-24T18:00:00Z".to_string());

        let catalog = MockCatalog::new(
            vec![summary(7, "summary-start"), no_start],
            vec![
                ("summary-start", open_detail("Summary Start")),
                ("detail-start", detail),
            ],
        );
        let mailer = MockMailer::default();
        cycle(&catalog, &mailer, &store).run().await;

        let cache = store.load();
        assert_eq!(
            cache.ctfs["7"].starts_at.as_deref(),
            Some("2026-09-01T10:00:00Z")
        );
        assert_eq!(
            cache.ctfs["6"].starts_at.as_deref(),
            Some("2026-12-24T18:00:00Z")
        );
    }

    #[tokio::test]
    async fn reminder_fires_once_inside_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        seed_record(&store, "10", "cyber-apocalypse", Some(in_hours(10)));

        let catalog = MockCatalog::new(
            vec![],
            vec![("cyber-apocalypse", open_detail("Cyber Apocalypse"))],
        );
        let mailer = MockMailer::default();

        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.reminders_sent, 1);
        assert_eq!(
            mailer.subjects(),
            vec!["Starting soon: Cyber Apocalypse".to_string()]
        );
        assert!(store.load().ctfs["10"].reminder_sent);

        // Flag is persisted: a later run does not re-fire.
        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.reminders_sent, 0);
        assert_eq!(mailer.sent_count(), 1);
    }

    #[tokio::test]
    async fn reminder_respects_the_window_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        seed_record(&store, "20", "far-future", Some(in_hours(100)));
        seed_record(&store, "21", "already-started", Some(in_hours(-1)));
        seed_record(&store, "22", "no-start", None);

        let catalog = MockCatalog::new(
            vec![],
            vec![
                ("far-future", open_detail("Far")),
                ("already-started", open_detail("Past")),
            ],
        );
        let mailer = MockMailer::default();

        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.reminders_sent, 0);
        assert_eq!(mailer.sent_count(), 0);

        let cache = store.load();
        assert!(!cache.ctfs["20"].reminder_sent);
        assert!(!cache.ctfs["21"].reminder_sent);
        assert!(!cache.ctfs["22"].reminder_sent);
    }

    #[tokio::test]
    async fn unparseable_start_time_skips_only_that_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        seed_record(&store, "30", "bad-date", Some("soon-ish".to_string()));
        seed_record(&store, "31", "good-date", Some(in_hours(10)));

        let catalog = MockCatalog::new(vec![], vec![("good-date", open_detail("Good"))]);
        let mailer = MockMailer::default();

        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.reminders_sent, 1);

        let cache = store.load();
        assert!(!cache.ctfs["30"].reminder_sent);
        assert!(cache.ctfs["31"].reminder_sent);
    }

    #[tokio::test]
    async fn reminder_send_failure_is_retried_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        seed_record(&store, "40", "retry-me", Some(in_hours(10)));

        let catalog = MockCatalog::new(vec![], vec![("retry-me", open_detail("Retry Me"))]);

        let broken = MockMailer::failing();
        let stats = cycle(&catalog, &broken, &store).run().await;
        assert_eq!(stats.reminders_sent, 0);
        assert!(!store.load().ctfs["40"].reminder_sent);

        let mailer = MockMailer::default();
        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.reminders_sent, 1);
        assert!(store.load().ctfs["40"].reminder_sent);
    }

    #[tokio::test]
    async fn reminder_detail_failure_postpones_without_flagging() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        seed_record(&store, "50", "no-detail", Some(in_hours(10)));

        let catalog = MockCatalog::new(vec![], vec![]);
        let mailer = MockMailer::default();

        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.reminders_sent, 0);
        assert!(!store.load().ctfs["50"].reminder_sent);
    }

    #[tokio::test]
    async fn catalog_failure_aborts_discovery_but_not_reminders() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        seed_record(&store, "60", "still-reminded", Some(in_hours(10)));

        let mut catalog = MockCatalog::new(
            vec![],
            vec![("still-reminded", open_detail("Still Reminded"))],
        );
        catalog.fail_list = true;
        let mailer = MockMailer::default();

        let stats = cycle(&catalog, &mailer, &store).run().await;
        assert_eq!(stats.reminders_sent, 1);
        assert_eq!(stats.new_ctfs, 0);
        assert!(store.load().ctfs["60"].reminder_sent);
    }
}
