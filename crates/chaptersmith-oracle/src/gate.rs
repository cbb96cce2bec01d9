//! Shared request gate: an RPM quota plus an in-flight concurrency cap.
//!
//! Every oracle call in the process funnels through one gate, so parallel
//! segmentation runs cannot collectively exceed the provider's quota.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chaptersmith_core::{Error, Result};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct RequestGate {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    jitter: Jitter,
    in_flight: Arc<Semaphore>,
}

impl RequestGate {
    /// Build a gate allowing `rpm` requests per minute with at most
    /// `max_in_flight` concurrent calls.
    pub fn new(rpm: u32, max_in_flight: usize) -> Result<Self> {
        let quota = Quota::per_minute(
            NonZeroU32::new(rpm)
                .ok_or_else(|| Error::InvalidInput("rpm must be positive".into()))?,
        );

        Ok(Self {
            limiter: RateLimiter::direct(quota),
            jitter: Jitter::new(Duration::from_millis(10), Duration::from_millis(100)),
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }

    /// Wait for both a rate-limit slot and an in-flight permit. The permit
    /// is released when the returned guard drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        let permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::OracleUnavailable("request gate closed".into()))?;
        self.limiter.until_ready_with_jitter(self.jitter).await;
        Ok(permit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_releases_on_drop() {
        let gate = RequestGate::new(600, 2).unwrap();
        let a = gate.acquire().await.unwrap();
        let b = gate.acquire().await.unwrap();
        drop(a);
        drop(b);
        // A third acquire succeeds once permits are back
        let _c = gate.acquire().await.unwrap();
    }

    #[test]
    fn test_zero_rpm_rejected() {
        assert!(RequestGate::new(0, 5).is_err());
    }
}
