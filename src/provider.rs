//! Render-ready view of the booking data
//!
//! [`BookingProvider`] wraps a coordinator and tracks what a screen needs to
//! draw: whether a load is running, the last error, and the data itself.
//! Changes are published on a `tokio::sync::watch` channel.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::coordinator::{BookingCoordinator, SubscriptionId};
use crate::data::{BookingDataset, FetchError, Segment};

/// Loading, error and data state for rendering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// Latest dataset; may be stale, which is not shown to the user
    pub data: Option<BookingDataset>,
    /// True while a load started through the provider is running
    pub is_loading: bool,
    /// Error from the most recent failed load
    pub error: Option<FetchError>,
}

/// What a screen should draw for a [`ViewState`]
#[derive(Debug, Clone, PartialEq)]
pub enum Screen<'a> {
    Loading,
    Error(String),
    Populated(&'a [Segment]),
}

impl ViewState {
    /// Picks the screen to draw; loading wins over error, error over data
    pub fn screen(&self) -> Screen<'_> {
        if self.is_loading {
            return Screen::Loading;
        }
        if let Some(error) = &self.error {
            return Screen::Error(error.to_string());
        }
        Screen::Populated(
            self.data
                .as_ref()
                .map(|dataset| dataset.segments.as_slice())
                .unwrap_or(&[]),
        )
    }
}

/// Removes the provider's coordinator subscription once the last clone is gone
struct Subscription {
    coordinator: BookingCoordinator,
    id: SubscriptionId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.coordinator.unsubscribe(self.id);
    }
}

/// Keeps the loading count right even if a load future is dropped early
struct ActiveLoad<'a> {
    provider: &'a BookingProvider,
}

impl<'a> ActiveLoad<'a> {
    fn start(provider: &'a BookingProvider) -> Self {
        provider.active_loads.fetch_add(1, Ordering::SeqCst);
        provider.state.send_modify(|view| {
            view.is_loading = true;
            view.error = None;
        });
        Self { provider }
    }
}

impl Drop for ActiveLoad<'_> {
    fn drop(&mut self) {
        let remaining = self.provider.active_loads.fetch_sub(1, Ordering::SeqCst) - 1;
        self.provider
            .state
            .send_modify(|view| view.is_loading = remaining > 0);
    }
}

/// Consumer-facing entry point to the booking data
#[derive(Clone)]
pub struct BookingProvider {
    coordinator: BookingCoordinator,
    state: Arc<watch::Sender<ViewState>>,
    active_loads: Arc<AtomicUsize>,
    _subscription: Arc<Subscription>,
}

impl BookingProvider {
    /// Creates a provider and subscribes it to `coordinator`
    ///
    /// Data published by any other path through the coordinator (a background
    /// refresh, another consumer) also lands in the view.
    pub fn new(coordinator: BookingCoordinator) -> Self {
        let (tx, _rx) = watch::channel(ViewState::default());
        let state = Arc::new(tx);

        let sink = Arc::clone(&state);
        let id = coordinator.subscribe(move |dataset| {
            sink.send_modify(|view| view.data = Some(dataset.clone()));
            Ok(())
        });

        Self {
            coordinator: coordinator.clone(),
            state,
            active_loads: Arc::new(AtomicUsize::new(0)),
            _subscription: Arc::new(Subscription { coordinator, id }),
        }
    }

    /// Loads data through the cache, fetching only if needed
    pub async fn load(&self) -> Result<BookingDataset, FetchError> {
        self.track(self.coordinator.get_data()).await
    }

    /// Forces a fresh fetch, bypassing the cache
    pub async fn reload(&self) -> Result<BookingDataset, FetchError> {
        self.track(self.coordinator.refresh()).await
    }

    /// Snapshot of the current view state
    ///
    /// `is_loading` is also set while a fetch started directly on the
    /// coordinator is running.
    pub fn state(&self) -> ViewState {
        let mut view = self.state.borrow().clone();
        view.is_loading |= self.coordinator.is_loading();
        view
    }

    /// Receiver that wakes when a provider load starts or ends and when new
    /// data arrives
    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    /// The coordinator behind this provider
    pub fn coordinator(&self) -> &BookingCoordinator {
        &self.coordinator
    }

    async fn track<F>(&self, operation: F) -> Result<BookingDataset, FetchError>
    where
        F: Future<Output = Result<BookingDataset, FetchError>>,
    {
        let active = ActiveLoad::start(self);
        let result = operation.await;

        self.state.send_modify(|view| match &result {
            Ok(dataset) => view.data = Some(dataset.clone()),
            Err(e) => view.error = Some(e.clone()),
        });
        drop(active);

        result
    }
}
