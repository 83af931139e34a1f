//! Per-provider request pacing.
//!
//! Every provider has its own slot schedule; waiting on one provider never
//! delays another. The lock is never held across an `.await`.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Slot {
    interval: Duration,
    next: Instant,
}

/// Enforces a minimum interval between consecutive requests per provider.
#[derive(Debug, Default)]
pub struct RateLimiter {
    slots: Mutex<BTreeMap<String, Slot>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` with its minimum request interval.
    ///
    /// Re-registering updates the interval and keeps the current schedule.
    pub fn register(&self, provider: &str, interval: Duration) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(provider.to_string())
            .and_modify(|s| s.interval = interval)
            .or_insert_with(|| Slot {
                interval,
                next: Instant::now(),
            });
    }

    /// Waits until `provider` may be called again and reserves the slot.
    ///
    /// Unregistered providers are not paced.
    pub async fn acquire(&self, provider: &str) {
        let wait_until = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(slot) = slots.get_mut(provider) else {
                return;
            };
            let now = Instant::now();
            let start = slot.next.max(now);
            slot.next = start + slot.interval;
            start
        };

        if wait_until > Instant::now() {
            log::trace!(
                "Pacing {provider} for {:?}",
                wait_until.saturating_duration_since(Instant::now())
            );
            tokio::time::sleep_until(wait_until).await;
        }
    }

    /// Pushes the next slot for `provider` at least `delay` into the future.
    pub fn back_off(&self, provider: &str, delay: Duration) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(provider) {
            let until = Instant::now() + delay;
            if until > slot.next {
                slot.next = until;
            }
            log::warn!("{provider} rate limited, backing off {delay:?}");
        }
    }
}
