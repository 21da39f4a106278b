//! Read-through coordination between the booking source and the local cache
//!
//! [`BookingCoordinator`] is the single path consumers use to obtain booking
//! data. It serves fresh cached data without touching the network, refetches
//! when the cache is missing, expired or unreadable, collapses concurrent
//! fetches into one, notifies subscribers, and falls back to the last known
//! good dataset when a fetch fails.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheError, CacheStore, BOOKING_CACHE_KEY};
use crate::clock::Clock;
use crate::data::{is_expired, BookingDataset, BookingSource, FetchError};

/// Error a subscriber callback may return
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Subscriber = Arc<dyn Fn(&BookingDataset) -> Result<(), SubscriberError> + Send + Sync>;

/// Outcome of a spawned fetch that every concurrent caller awaits together
type PendingFetch = Shared<BoxFuture<'static, Result<BookingDataset, FetchError>>>;

/// Handle returned by [`BookingCoordinator::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct State {
    /// Last known good dataset this session
    current: Option<BookingDataset>,
    /// Fetch currently running, if any
    in_flight: Option<PendingFetch>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Subscriber)>,
}

struct Inner {
    source: Arc<dyn BookingSource>,
    store: CacheStore,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    subscribers: Mutex<Subscribers>,
}

/// Clears the in-flight slot when the fetch future finishes, however it finishes
struct InFlightReset<'a>(&'a Inner);

impl Drop for InFlightReset<'_> {
    fn drop(&mut self) {
        self.0.lock_state().in_flight = None;
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_fetch(self: Arc<Self>) -> Result<BookingDataset, FetchError> {
        let _reset = InFlightReset(&self);

        info!("fetching fresh booking data");
        let dataset = match self.source.fetch().await {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(error = %e, "booking fetch failed");
                return Err(e);
            }
        };

        self.lock_state().current = Some(dataset.clone());

        if let Err(e) = self.store.save(BOOKING_CACHE_KEY, &dataset) {
            warn!(error = %e, "failed to persist booking data");
        }

        self.notify(&dataset);

        info!(
            segments = dataset.segments.len(),
            expires_at = %dataset.expiry_timestamp,
            "fetched fresh booking data"
        );
        Ok(dataset)
    }

    fn notify(&self, dataset: &BookingDataset) {
        // Snapshot so callbacks may subscribe or unsubscribe while we iterate
        let snapshot: Vec<(SubscriptionId, Subscriber)> = self
            .lock_subscribers()
            .entries
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        for (id, callback) in snapshot {
            invoke(id, &callback, dataset);
        }
    }
}

fn invoke(id: SubscriptionId, callback: &Subscriber, dataset: &BookingDataset) {
    if let Err(e) = callback(dataset) {
        warn!(subscription = id.0, error = %e, "booking data subscriber failed");
    }
}

/// Coordinates cached and fetched booking data
///
/// Cloning is cheap and every clone shares the same state, so one coordinator
/// built at startup can be handed to every consumer.
#[derive(Clone)]
pub struct BookingCoordinator {
    inner: Arc<Inner>,
}

impl BookingCoordinator {
    /// Creates a coordinator with no data and no subscribers
    pub fn new(source: Arc<dyn BookingSource>, store: CacheStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                clock,
                state: Mutex::new(State {
                    current: None,
                    in_flight: None,
                }),
                subscribers: Mutex::new(Subscribers::default()),
            }),
        }
    }

    /// Returns booking data, preferring a fresh cache entry
    ///
    /// # Behavior
    /// - Returns the cached dataset if present and not expired, without fetching
    /// - Otherwise fetches (joining any fetch already running) and caches the result
    /// - If the fetch fails but a dataset was obtained earlier this session,
    ///   returns that dataset instead of the error
    pub async fn get_data(&self) -> Result<BookingDataset, FetchError> {
        if let Some(cached) = self.load_fresh_cached() {
            self.inner.lock_state().current = Some(cached.clone());
            return Ok(cached);
        }

        let err = match self.fetch_fresh().await {
            Ok(dataset) => return Ok(dataset),
            Err(e) => e,
        };

        match self.current() {
            Some(stale) => {
                warn!(error = %err, "returning possibly stale booking data");
                Ok(stale)
            }
            None => {
                error!(error = %err, "no booking data available");
                Err(err)
            }
        }
    }

    /// Fetches from the source, sharing one fetch among concurrent callers
    ///
    /// The fetch runs to completion even if the caller is dropped. On success the dataset becomes current, is written to the cache and is
    /// pushed to every subscriber. A cache write failure is logged and does
    /// not fail the fetch.
    pub async fn fetch_fresh(&self) -> Result<BookingDataset, FetchError> {
        let pending = {
            let mut state = self.inner.lock_state();
            match &state.in_flight {
                Some(pending) => {
                    debug!("joining in-flight booking fetch");
                    pending.clone()
                }
                None => {
                    // The fetch runs on its own task so it finishes even if
                    // every caller stops waiting
                    let task = tokio::spawn(Arc::clone(&self.inner).run_fetch());
                    let pending = async move {
                        task.await.unwrap_or_else(|e| {
                            error!(error = %e, "booking fetch task stopped");
                            Err(FetchError::Interrupted(e.to_string()))
                        })
                    }
                    .boxed()
                    .shared();
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    /// Drops the cache entry and fetches unconditionally
    pub async fn refresh(&self) -> Result<BookingDataset, FetchError> {
        info!("forcing booking data refresh");
        if let Err(e) = self.inner.store.delete(BOOKING_CACHE_KEY) {
            warn!(error = %e, "failed to clear cached booking data before refresh");
        }
        self.fetch_fresh().await
    }

    /// Registers `callback` for every new dataset
    ///
    /// If data is already loaded, the callback runs immediately with it
    /// before this returns.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&BookingDataset) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let callback: Subscriber = Arc::new(callback);
        let id = {
            let mut subscribers = self.inner.lock_subscribers();
            let id = SubscriptionId(subscribers.next_id);
            subscribers.next_id += 1;
            subscribers.entries.push((id, Arc::clone(&callback)));
            id
        };

        if let Some(dataset) = self.current() {
            invoke(id, &callback, &dataset);
        }
        id
    }

    /// Removes a subscriber; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.lock_subscribers();
        let before = subscribers.entries.len();
        subscribers.entries.retain(|(entry_id, _)| *entry_id != id);
        subscribers.entries.len() != before
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_subscribers().entries.len()
    }

    /// Forgets the current dataset and removes the cache entry
    ///
    /// Running fetches and subscribers are left alone.
    pub fn clear(&self) {
        info!("clearing booking data");
        self.inner.lock_state().current = None;
        if let Err(e) = self.inner.store.delete(BOOKING_CACHE_KEY) {
            warn!(error = %e, "failed to clear cached booking data");
        }
    }

    /// Most recent known good dataset, if any
    pub fn current(&self) -> Option<BookingDataset> {
        self.inner.lock_state().current.clone()
    }

    /// True while a fetch is running
    pub fn is_loading(&self) -> bool {
        self.inner.lock_state().in_flight.is_some()
    }

    /// True if there is no current dataset or it has expired
    pub fn is_data_expired(&self) -> bool {
        let state = self.inner.lock_state();
        is_expired(state.current.as_ref(), self.inner.clock.now())
    }

    fn load_fresh_cached(&self) -> Option<BookingDataset> {
        match self.inner.store.load::<BookingDataset>(BOOKING_CACHE_KEY) {
            Ok(Some(cached)) if !cached.is_expired_at(self.inner.clock.now()) => {
                debug!("using valid cached booking data");
                Some(cached)
            }
            Ok(Some(cached)) => {
                debug!(expired_at = %cached.expiry_timestamp, "cached booking data expired");
                None
            }
            Ok(None) => {
                debug!("no cached booking data");
                None
            }
            Err(e @ CacheError::Corrupt { .. }) => {
                warn!(error = %e, "cached booking data is corrupt, fetching fresh");
                None
            }
            Err(e) => {
                warn!(error = %e, "could not read cached booking data, fetching fresh");
                None
            }
        }
    }
}
