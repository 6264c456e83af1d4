//! Per-provider request spacing.
//!
//! Enforces a minimum interval between consecutive calls to the same
//! external provider, independent of retry logic. This is a minimum
//! inter-call gap, not a token bucket: within one process it strictly
//! serializes a provider's call rate, which is sufficient because stages
//! within a job are sequential and cross-job concurrency is bounded
//! upstream.
//!
//! The spacer is an explicit shared-state object injected into the
//! pipeline (one per process), so it can be unit-tested in isolation and
//! scoped deliberately in a multi-tenant deployment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Shared gate keyed by provider. Callers under the same key are mutually
/// excluded while the gap is enforced; different keys never delay each
/// other.
#[derive(Default)]
pub struct RequestSpacer {
    // Outer lock only guards map shape; the per-key mutex is held across
    // the enforced sleep.
    keys: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Option<Instant>>>>>,
}

impl RequestSpacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend the caller until `min_interval` has elapsed since the last
    /// call spaced under `provider_key`, then record this call's time.
    pub async fn space(&self, provider_key: &str, min_interval: Duration) {
        let slot = {
            let mut keys = self.keys.lock().expect("spacer lock poisoned");
            Arc::clone(
                keys.entry(provider_key.to_string())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(None))),
            )
        };

        let mut last_call = slot.lock().await;
        if let Some(last) = *last_call {
            let next_allowed = last + min_interval;
            if next_allowed > Instant::now() {
                tracing::debug!(
                    provider = provider_key,
                    wait_ms = (next_allowed - Instant::now()).as_millis() as u64,
                    "Spacing request to provider"
                );
                tokio::time::sleep_until(next_allowed).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn back_to_back_calls_are_separated_by_the_minimum_interval() {
        let spacer = RequestSpacer::new();
        let interval = Duration::from_millis(1_000);

        let started = Instant::now();
        spacer.space("vendorA", interval).await;
        spacer.space("vendorA", interval).await;

        assert!(started.elapsed() >= interval);
    }

    #[tokio::test(start_paused = true)]
    async fn different_keys_are_spaced_independently() {
        let spacer = RequestSpacer::new();
        let interval = Duration::from_millis(1_000);

        spacer.space("vendorA", interval).await;

        // vendorB is not delayed by vendorA activity.
        let started = Instant::now();
        spacer.space("vendorB", interval).await;
        assert!(started.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_on_one_key_are_serialized() {
        let spacer = Arc::new(RequestSpacer::new());
        let interval = Duration::from_millis(500);

        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let spacer = Arc::clone(&spacer);
            handles.push(tokio::spawn(async move {
                spacer.space("vendorA", interval).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Three calls: the last is at least two intervals after the first.
        assert!(started.elapsed() >= interval * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_interval_means_no_wait() {
        let spacer = RequestSpacer::new();
        let interval = Duration::from_millis(100);

        spacer.space("vendorA", interval).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        spacer.space("vendorA", interval).await;
        assert!(started.elapsed() < Duration::from_millis(10));
    }
}
