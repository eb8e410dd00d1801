//! Seam traits: the delivery port and the clock.
//!
//! The dispatch loop is generic over both so tests can script delivery
//! outcomes and move time by hand.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{ChannelRef, RenderedPost};

/// Successful delivery receipt.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Message id assigned by the channel, when the API reports one.
    pub message_id: Option<String>,
}

/// A typed delivery failure.
///
/// `retryable` decides whether the publication goes back to pending with an
/// advanced `ready_at` or becomes terminally failed.
#[derive(Debug, Clone)]
pub struct DeliveryError {
    pub retryable: bool,
    pub reason: String,
    /// Server-requested delay (e.g. Telegram 429 retry_after). When larger
    /// than the configured backoff it wins.
    pub retry_after: Option<Duration>,
}

impl DeliveryError {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            retryable: true,
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            retryable: false,
            reason: reason.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(reason: impl Into<String>, retry_after_secs: u64) -> Self {
        Self {
            retryable: true,
            reason: reason.into(),
            retry_after: Some(Duration::from_secs(retry_after_secs)),
        }
    }
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

/// Where rendered posts go. Implemented by the Telegram port; tests use a
/// scripted mock. Calls are bounded by the engine's send timeout, so an
/// implementation may block on network I/O but never indefinitely stall the
/// ordered queue.
#[async_trait]
pub trait DeliveryPort: Send + Sync {
    async fn send(
        &self,
        destination: &ChannelRef,
        post: &RenderedPost,
    ) -> std::result::Result<Delivery, DeliveryError>;
}

/// Injectable "now" source. The engine never calls `Utc::now()` directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
