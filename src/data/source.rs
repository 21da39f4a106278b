//! Simulated booking API
//!
//! The booking "service" serves a JSON payload after a fixed delay, validates
//! that it carries a `segments` field, and stamps it with a 30 minute
//! freshness window. It can also be told to fail a number of fetches to
//! simulate a flaky network.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use super::{BookingDataset, Segment};
use crate::clock::Clock;

/// Bundled sample payload served by default
const SAMPLE_PAYLOAD: &str = include_str!("../../assets/booking.json");

/// Simulated network latency in milliseconds
const DEFAULT_LATENCY_MS: u64 = 1000;

/// Time-to-live for fetched data in minutes
const DEFAULT_TTL_MINUTES: i64 = 30;

/// Errors that can occur when fetching booking data
///
/// Cloneable so a single outcome can be handed to every caller waiting on the
/// same fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The payload is missing required fields or could not be decoded
    #[error("Failed to fetch booking data: invalid booking data format ({0})")]
    DataFormat(String),

    /// The service could not be reached
    #[error("Failed to fetch booking data: {0}")]
    Unavailable(String),

    /// The fetch task panicked or was aborted before finishing
    #[error("Failed to fetch booking data: fetch interrupted ({0})")]
    Interrupted(String),
}

/// Remote side of the data layer
#[async_trait]
pub trait BookingSource: Send + Sync {
    /// Fetches a freshly stamped dataset
    async fn fetch(&self) -> Result<BookingDataset, FetchError>;
}

/// Rejected time-to-live for [`SourceConfig`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("time-to-live must be positive, got {0}")]
pub struct InvalidTtl(pub Duration);

/// Latency and freshness settings for [`BookingService`]
///
/// The time-to-live is always positive, so every fetched dataset expires
/// strictly after it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    latency: std::time::Duration,
    ttl: Duration,
}

impl SourceConfig {
    /// Creates a config, rejecting a zero or negative `ttl`
    pub fn new(latency: std::time::Duration, ttl: Duration) -> Result<Self, InvalidTtl> {
        if ttl <= Duration::zero() {
            return Err(InvalidTtl(ttl));
        }
        Ok(Self { latency, ttl })
    }

    /// Delay before each fetch resolves
    pub fn latency(&self) -> std::time::Duration {
        self.latency
    }

    /// How long fetched data stays fresh
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            latency: std::time::Duration::from_millis(DEFAULT_LATENCY_MS),
            ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
        }
    }
}

/// Returns true if there is no dataset or `now` is past its expiry
pub fn is_expired(dataset: Option<&BookingDataset>, now: DateTime<Utc>) -> bool {
    match dataset {
        Some(dataset) => dataset.is_expired_at(now),
        None => true,
    }
}

/// Extracts the `segments` list of a raw payload
///
/// Only the list itself is checked; each element is decoded leniently.
fn parse_segments(payload: &Value) -> Result<Vec<Segment>, FetchError> {
    let segments = payload
        .get("segments")
        .filter(|value| !value.is_null())
        .ok_or_else(|| FetchError::DataFormat("missing `segments` field".to_string()))?;

    let items = segments
        .as_array()
        .ok_or_else(|| FetchError::DataFormat("`segments` field is not a list".to_string()))?;

    Ok(items.iter().map(Segment::from_value).collect())
}

/// In-process stand-in for the booking API
pub struct BookingService {
    payload: Mutex<Value>,
    config: SourceConfig,
    clock: Arc<dyn Clock>,
    /// Number of upcoming fetches that should fail
    pending_failures: AtomicU32,
    /// Total fetches started
    fetches: AtomicUsize,
}

impl BookingService {
    /// Creates a service that serves `payload`
    pub fn new(payload: Value, config: SourceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            payload: Mutex::new(payload),
            config,
            clock,
            pending_failures: AtomicU32::new(0),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Creates a service that serves the bundled sample payload
    pub fn sample(config: SourceConfig, clock: Arc<dyn Clock>) -> Self {
        // The sample is compiled in; if it ever fails to parse, fetches report
        // a format error instead of panicking here.
        let payload = serde_json::from_str(SAMPLE_PAYLOAD).unwrap_or(Value::Null);
        Self::new(payload, config, clock)
    }

    /// Replaces the payload served by subsequent fetches
    pub fn set_payload(&self, payload: Value) {
        *self.payload.lock().unwrap_or_else(PoisonError::into_inner) = payload;
    }

    /// Makes the next `count` fetches fail with [`FetchError::Unavailable`]
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of fetches started so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BookingSource for BookingService {
    async fn fetch(&self) -> Result<BookingDataset, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(self.config.latency).await;

        if self.take_failure() {
            return Err(FetchError::Unavailable(
                "simulated network failure".to_string(),
            ));
        }

        let segments = {
            let payload = self.payload.lock().unwrap_or_else(PoisonError::into_inner);
            parse_segments(&payload)?
        };

        let now = self.clock.now();
        Ok(BookingDataset {
            segments,
            fetch_timestamp: now,
            expiry_timestamp: now + self.config.ttl,
        })
    }
}
