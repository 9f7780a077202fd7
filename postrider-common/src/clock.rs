//! Time source abstraction.
//!
//! The delivery engine never calls `Utc::now()` or `tokio::time::sleep`
//! directly; it goes through a [`Clock`] so tests can drive time by hand.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Monotonic-enough UTC "now" plus a sleep primitive.
#[async_trait]
pub trait Clock: Send + Sync {
    /// The current instant in UTC.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// The production clock: wall time and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
