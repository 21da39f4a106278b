//! Background data refresh system
//!
//! Periodically reloads booking data in the background and reports progress
//! over a tokio channel. Each tick goes through the cache, so the remote
//! source is only hit once the current data has expired.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::provider::BookingProvider;

/// Messages sent from background refresh to main app
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshMessage {
    /// Refresh started
    RefreshStarted,
    /// Refresh completed; carries when the served data was fetched
    RefreshCompleted { fetched_at: DateTime<Utc> },
    /// An error occurred during refresh
    RefreshError(String),
}

/// Configuration for refresh intervals
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between background reloads
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh system
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Creates a new RefreshHandle and spawns the background refresh task
    ///
    /// # Arguments
    /// * `provider` - Provider to reload through
    /// * `config` - Configuration for the refresh interval
    ///
    /// # Returns
    /// A RefreshHandle that receives updates via the `receiver` channel
    pub fn spawn(provider: BookingProvider, config: RefreshConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            let tx = msg_tx;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            debug!("background booking refresh tick");
                            let _ = tx.send(RefreshMessage::RefreshStarted).await;

                            let message = match provider.load().await {
                                Ok(dataset) => RefreshMessage::RefreshCompleted {
                                    fetched_at: dataset.fetch_timestamp,
                                },
                                Err(e) => RefreshMessage::RefreshError(e.to_string()),
                            };
                            let _ = tx.send(message).await;
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            shutdown_tx,
        }
    }

    /// Shuts down the background refresh task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Checks for pending refresh messages without blocking
///
/// # Arguments
/// * `handle` - The RefreshHandle to check
///
/// # Returns
/// * `Some(RefreshMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}
