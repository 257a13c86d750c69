//! Operator feed: busy indicator and notifications.
//!
//! Producers never block. Events go through a bounded channel with `try_send`;
//! when the queue is full the event is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::config::FeedConfig;
use crate::error::{ChoucasError, ChoucasResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
    Error,
}

/// Something the operator should see.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorEvent {
    /// A long-running request started.
    Busy { message: String },
    /// The request finished, successfully or not.
    Idle,
    Notification {
        level: Level,
        message: String,
        at: DateTime<Utc>,
    },
}

/// Sending half, cheap to clone into in-flight requests.
#[derive(Debug, Clone)]
pub struct OperatorFeed {
    tx: Sender<OperatorEvent>,
    rx: Receiver<OperatorEvent>,
    dropped: Arc<AtomicU64>,
}

impl OperatorFeed {
    #[must_use]
    pub fn new(cfg: &FeedConfig) -> Self {
        let (tx, rx) = bounded(cfg.capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn send(&self, event: OperatorEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn notify(&self, level: Level, message: impl Into<String>) {
        self.send(OperatorEvent::Notification {
            level,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(Level::Error, message);
    }

    /// Shows the busy indicator until the returned guard is dropped.
    #[must_use = "the busy indicator is cleared when the guard is dropped"]
    pub fn busy(&self, message: impl Into<String>) -> BusyGuard {
        self.send(OperatorEvent::Busy {
            message: message.into(),
        });
        BusyGuard { feed: self.clone() }
    }

    /// Events dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// A receiving handle. Handles compete for events.
    #[must_use]
    pub fn stream(&self) -> FeedStream {
        FeedStream { rx: self.rx.clone() }
    }
}

impl Default for OperatorFeed {
    fn default() -> Self {
        Self::new(&FeedConfig::default())
    }
}

/// Clears the busy indicator on drop.
#[derive(Debug)]
pub struct BusyGuard {
    feed: OperatorFeed,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.feed.send(OperatorEvent::Idle);
    }
}

#[derive(Debug, Clone)]
pub struct FeedStream {
    rx: Receiver<OperatorEvent>,
}

impl FeedStream {
    /// Receive the next event with a timeout.
    ///
    /// # Errors
    ///
    /// Returns an internal error when no event arrived in time.
    pub fn recv_timeout(&self, timeout: Duration) -> ChoucasResult<OperatorEvent> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ChoucasError::internal("operator feed: timed out"),
            RecvTimeoutError::Disconnected => ChoucasError::internal("operator feed: disconnected"),
        })
    }

    /// Everything queued right now.
    #[must_use]
    pub fn drain(&self) -> Vec<OperatorEvent> {
        self.rx.try_iter().collect()
    }
}
