//! Integration tests for the read-through booking coordinator
//!
//! Uses the simulated booking service with a manual clock so expiry is
//! deterministic, and a paused tokio clock so the simulated latency costs
//! nothing.

use std::fs;
use std::sync::{Arc, Mutex};

use bookings::cache::{CacheStore, FileBackend, MemoryBackend, BOOKING_CACHE_KEY};
use bookings::clock::{Clock, ManualClock};
use bookings::coordinator::{BookingCoordinator, SubscriptionId};
use bookings::data::{BookingDataset, BookingService, FetchError, SegmentId, SourceConfig};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()
}

fn sfo_jfk_payload() -> Value {
    json!({
        "segments": [{
            "id": 1,
            "originAndDestinationPair": {
                "origin": { "code": "SFO" },
                "destination": { "code": "JFK" }
            }
        }]
    })
}

struct Harness {
    coordinator: BookingCoordinator,
    service: Arc<BookingService>,
    store: CacheStore,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn with_store(payload: Value, store: CacheStore, clock: Arc<ManualClock>) -> Self {
        let service = Arc::new(BookingService::new(
            payload,
            SourceConfig::default(),
            clock.clone(),
        ));
        let coordinator = BookingCoordinator::new(service.clone(), store.clone(), clock.clone());
        Self {
            coordinator,
            service,
            store,
            clock,
        }
    }

    fn in_memory(payload: Value) -> Self {
        Self::with_store(
            payload,
            CacheStore::new(Arc::new(MemoryBackend::new())),
            Arc::new(ManualClock::new(start())),
        )
    }

    fn cached(&self) -> Option<BookingDataset> {
        self.store.load(BOOKING_CACHE_KEY).unwrap()
    }

    /// Puts a dataset fetched at `fetched_at` straight into the cache
    fn seed_cache(&self, fetched_at: DateTime<Utc>, id: i64) -> BookingDataset {
        let dataset = BookingDataset {
            segments: vec![serde_json::from_value(json!({ "id": id })).unwrap()],
            fetch_timestamp: fetched_at,
            expiry_timestamp: fetched_at + Duration::minutes(30),
        };
        self.store.save(BOOKING_CACHE_KEY, &dataset).unwrap();
        dataset
    }
}

fn recorder() -> (
    Arc<Mutex<Vec<BookingDataset>>>,
    impl Fn(&BookingDataset) -> Result<(), bookings::coordinator::SubscriberError> + Send + Sync,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |dataset: &BookingDataset| {
        sink.lock().unwrap().push(dataset.clone());
        Ok(())
    })
}

// ============================================================================
// Cache freshness
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fresh_cache_is_served_without_fetching() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let seeded = h.seed_cache(start() - Duration::minutes(10), 77);

    let dataset = h.coordinator.get_data().await.unwrap();

    assert_eq!(dataset, seeded);
    assert_eq!(h.service.fetch_count(), 0);
    assert_eq!(h.coordinator.current(), Some(seeded));
}

#[tokio::test(start_paused = true)]
async fn test_absent_cache_fetches_once_and_persists() {
    let h = Harness::in_memory(sfo_jfk_payload());

    let dataset = h.coordinator.get_data().await.unwrap();

    assert_eq!(h.service.fetch_count(), 1);
    assert_eq!(h.cached(), Some(dataset));
}

#[tokio::test(start_paused = true)]
async fn test_expired_cache_fetches_once_and_persists() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let old = h.seed_cache(start() - Duration::minutes(45), 77);

    let dataset = h.coordinator.get_data().await.unwrap();

    assert_eq!(h.service.fetch_count(), 1);
    assert_ne!(dataset, old);
    assert_eq!(dataset.fetch_timestamp, start());
    assert_eq!(h.cached(), Some(dataset));
}

#[tokio::test(start_paused = true)]
async fn test_data_expires_after_thirty_minutes() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.coordinator.get_data().await.unwrap();

    h.clock.advance(Duration::minutes(30));
    h.coordinator.get_data().await.unwrap();
    assert_eq!(h.service.fetch_count(), 1, "still fresh at the expiry instant");

    h.clock.advance(Duration::seconds(1));
    h.coordinator.get_data().await.unwrap();
    assert_eq!(h.service.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_corrupt_cache_entry_falls_through_to_fetch() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("booking_data.json"), "{ definitely not json").unwrap();
    let store = CacheStore::new(Arc::new(FileBackend::with_dir(temp_dir.path().to_path_buf())));
    let h = Harness::with_store(sfo_jfk_payload(), store, Arc::new(ManualClock::new(start())));

    let dataset = h.coordinator.get_data().await.unwrap();

    assert_eq!(h.service.fetch_count(), 1);
    assert_eq!(h.cached(), Some(dataset), "corrupt entry is replaced");
}

#[tokio::test(start_paused = true)]
async fn test_cache_entry_without_timestamps_counts_as_expired() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.store
        .save(BOOKING_CACHE_KEY, &json!({ "segments": [{ "id": 3 }] }))
        .unwrap();

    h.coordinator.get_data().await.unwrap();

    assert_eq!(h.service.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_survives_new_coordinator() {
    let temp_dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let open_store =
        || CacheStore::new(Arc::new(FileBackend::with_dir(temp_dir.path().to_path_buf())));

    let first = Harness::with_store(sfo_jfk_payload(), open_store(), clock.clone());
    let fetched = first.coordinator.get_data().await.unwrap();

    clock.advance(Duration::minutes(5));
    let second = Harness::with_store(sfo_jfk_payload(), open_store(), clock);
    let restored = second.coordinator.get_data().await.unwrap();

    assert_eq!(restored, fetched);
    assert_eq!(second.service.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_write_failure_does_not_fail_fetch() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("blocker");
    fs::write(&blocker, "not a directory").unwrap();
    let store = CacheStore::new(Arc::new(FileBackend::with_dir(blocker)));
    let h = Harness::with_store(sfo_jfk_payload(), store, Arc::new(ManualClock::new(start())));
    let (seen, callback) = recorder();
    h.coordinator.subscribe(callback);

    let dataset = h.coordinator.get_data().await.unwrap();

    assert_eq!(h.coordinator.current(), Some(dataset.clone()));
    assert_eq!(*seen.lock().unwrap(), vec![dataset]);
}

// ============================================================================
// Fetch deduplication
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_fetches_share_one_remote_call() {
    let h = Harness::in_memory(sfo_jfk_payload());

    let (a, b, c) = tokio::join!(
        h.coordinator.fetch_fresh(),
        h.coordinator.fetch_fresh(),
        h.coordinator.fetch_fresh()
    );

    assert_eq!(h.service.fetch_count(), 1);
    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_get_data_from_tasks_share_one_remote_call() {
    let h = Harness::in_memory(sfo_jfk_payload());

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.get_data().await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(h.service.fetch_count(), 1);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_failure_and_next_call_refetches() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.service.fail_next(1);

    let (a, b) = tokio::join!(h.coordinator.fetch_fresh(), h.coordinator.fetch_fresh());

    assert_eq!(h.service.fetch_count(), 1);
    assert!(matches!(a, Err(FetchError::Unavailable(_))));
    assert_eq!(a, b);
    assert!(!h.coordinator.is_loading());

    h.coordinator.fetch_fresh().await.unwrap();
    assert_eq!(h.service.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_fetches_are_not_deduplicated() {
    let h = Harness::in_memory(sfo_jfk_payload());

    h.coordinator.fetch_fresh().await.unwrap();
    h.coordinator.fetch_fresh().await.unwrap();

    assert_eq!(h.service.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_completes_after_caller_times_out() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let (seen, callback) = recorder();
    h.coordinator.subscribe(callback);

    let waited = tokio::time::timeout(
        std::time::Duration::from_millis(500),
        h.coordinator.fetch_fresh(),
    )
    .await;
    assert!(waited.is_err(), "caller gives up before the simulated latency");

    tokio::time::sleep(std::time::Duration::from_secs(10)).await;

    assert!(!h.coordinator.is_loading());
    assert!(h.coordinator.current().is_some());
    assert!(h.cached().is_some());
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(h.service.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_completes_after_caller_task_is_aborted() {
    let h = Harness::in_memory(sfo_jfk_payload());

    let caller = tokio::spawn({
        let coordinator = h.coordinator.clone();
        async move { coordinator.get_data().await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    assert!(h.coordinator.is_loading());
    caller.abort();

    tokio::time::sleep(std::time::Duration::from_secs(10)).await;

    assert!(!h.coordinator.is_loading());
    assert!(h.cached().is_some());

    // Later callers are served from the completed fetch's cache entry
    h.coordinator.get_data().await.unwrap();
    assert_eq!(h.service.fetch_count(), 1);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_returns_stale_dataset_from_this_session() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let first = h.coordinator.get_data().await.unwrap();

    h.clock.advance(Duration::minutes(31));
    h.service.fail_next(1);
    let again = h.coordinator.get_data().await;

    assert_eq!(again, Ok(first));
    assert_eq!(h.service.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_fetch_without_prior_data_propagates() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.service.fail_next(1);

    let result = h.coordinator.get_data().await;

    assert!(matches!(result, Err(FetchError::Unavailable(_))));
    assert!(h.coordinator.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missing_segments_propagates_data_format_error() {
    let h = Harness::in_memory(json!({}));

    let result = h.coordinator.get_data().await;

    assert!(matches!(result, Err(FetchError::DataFormat(_))));
    assert!(h.cached().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_persisted_data_from_earlier_run_is_not_a_fallback() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.seed_cache(start() - Duration::hours(2), 77);
    h.service.fail_next(1);

    let result = h.coordinator.get_data().await;

    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_forced_refresh_failure_propagates_even_with_current_data() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.coordinator.get_data().await.unwrap();
    h.service.fail_next(1);

    let result = h.coordinator.refresh().await;

    assert!(matches!(result, Err(FetchError::Unavailable(_))));
    assert!(h.coordinator.current().is_some());
}

// ============================================================================
// Forced refresh and clear
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_refresh_fetches_even_when_cache_is_fresh() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let seeded = h.seed_cache(start(), 77);

    let refreshed = h.coordinator.refresh().await.unwrap();

    assert_eq!(h.service.fetch_count(), 1);
    assert_ne!(refreshed, seeded);
    assert_eq!(h.cached(), Some(refreshed));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_deletes_prior_entry() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.seed_cache(start(), 77);
    h.service.fail_next(1);

    let _ = h.coordinator.refresh().await;

    assert!(h.cached().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_clear_drops_current_and_cache_but_keeps_subscribers() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let (seen, callback) = recorder();
    h.coordinator.subscribe(callback);
    h.coordinator.get_data().await.unwrap();

    h.coordinator.clear();

    assert!(h.coordinator.current().is_none());
    assert!(h.cached().is_none());
    assert_eq!(h.coordinator.subscriber_count(), 1);

    h.coordinator.get_data().await.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_clear_drops_stale_fallback() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.coordinator.get_data().await.unwrap();
    h.coordinator.clear();
    h.service.fail_next(1);

    assert!(h.coordinator.get_data().await.is_err());
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_subscribers_receive_each_new_dataset() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let (seen, callback) = recorder();
    h.coordinator.subscribe(callback);

    let first = h.coordinator.fetch_fresh().await.unwrap();
    h.clock.advance(Duration::minutes(1));
    let second = h.coordinator.refresh().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![first, second]);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_does_not_notify_subscribers() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.seed_cache(start(), 77);
    let (seen, callback) = recorder();
    h.coordinator.subscribe(callback);

    h.coordinator.get_data().await.unwrap();

    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_late_subscriber_is_called_immediately() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let loaded = h.coordinator.get_data().await.unwrap();
    let (seen, callback) = recorder();

    h.coordinator.subscribe(callback);

    // No await between subscribe and this check
    assert_eq!(*seen.lock().unwrap(), vec![loaded]);
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_before_any_data_is_not_called() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let (seen, callback) = recorder();

    h.coordinator.subscribe(callback);

    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failing_subscriber_does_not_block_others() {
    let h = Harness::in_memory(sfo_jfk_payload());
    h.coordinator
        .subscribe(|_| Err("subscriber exploded".into()));
    let (seen, callback) = recorder();
    h.coordinator.subscribe(callback);

    let dataset = h.coordinator.fetch_fresh().await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![dataset]);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_callback_is_not_called() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let (seen, callback) = recorder();
    let id = h.coordinator.subscribe(callback);

    assert!(h.coordinator.unsubscribe(id));
    h.coordinator.fetch_fresh().await.unwrap();

    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_subscriber_may_unsubscribe_itself_during_notification() {
    let h = Harness::in_memory(sfo_jfk_payload());
    let own_id: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
    let calls = Arc::new(Mutex::new(0));

    let id = h.coordinator.subscribe({
        let coordinator = h.coordinator.clone();
        let own_id = Arc::clone(&own_id);
        let calls = Arc::clone(&calls);
        move |_: &BookingDataset| {
            *calls.lock().unwrap() += 1;
            if let Some(id) = *own_id.lock().unwrap() {
                coordinator.unsubscribe(id);
            }
            Ok(())
        }
    });
    *own_id.lock().unwrap() = Some(id);
    let (seen, callback) = recorder();
    h.coordinator.subscribe(callback);

    h.coordinator.fetch_fresh().await.unwrap();
    h.coordinator.fetch_fresh().await.unwrap();

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(seen.lock().unwrap().len(), 2, "later subscriber still notified");
}

// ============================================================================
// End-to-end scenario
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_sfo_jfk_scenario() {
    let h = Harness::in_memory(sfo_jfk_payload());

    let dataset = h.coordinator.get_data().await.unwrap();

    assert_eq!(dataset.segments[0].id, Some(SegmentId::Number(1)));
    assert_eq!(dataset.segments[0].route_label(), "SFO - JFK");
    assert!(dataset.expiry_timestamp > dataset.fetch_timestamp);
    assert_eq!(dataset.fetch_timestamp, h.clock.now());
}
