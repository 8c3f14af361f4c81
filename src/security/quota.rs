//! Per-client, per-endpoint-class request quotas.
//!
//! # Responsibilities
//! - Count requests per `(client, endpoint class)` in fixed windows
//! - Decide admit/reject against the class policy
//! - Evict expired entries on an independent schedule
//!
//! # Design Decisions
//! - Fixed-window counter: a client can burst up to 2x the limit across a
//!   window boundary. Accepted; a stricter algorithm must be a separate
//!   `QuotaStore` implementation, not a silent change here.
//! - The table is a `DashMap`. `entry()` holds the shard write lock for the
//!   whole read-modify-write, so concurrent checks on one key never lose updates.
//! - Sweeping uses `retain`, which locks one shard at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::{QuotaConfig, QuotaPolicy};
use crate::observability::metrics;
use crate::security::endpoint::EndpointClass;

/// Result of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl QuotaStatus {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_at - now).num_milliseconds();
        if millis <= 0 {
            0
        } else {
            (millis as u64).div_ceil(1000)
        }
    }
}

/// Storage and algorithm behind quota decisions.
///
/// The in-process [`FixedWindowQuota`] is single-instance only. A multi-instance
/// deployment implements this trait over a shared atomic counter store.
pub trait QuotaStore: Send + Sync {
    /// Count one request and decide whether it is within quota.
    fn check(&self, client_id: &str, class: EndpointClass, now: DateTime<Utc>) -> QuotaStatus;

    /// Report the current status without counting a request.
    fn peek(&self, client_id: &str, class: EndpointClass, now: DateTime<Utc>) -> QuotaStatus;

    /// Remove entries whose window has ended. Returns how many were removed.
    fn sweep(&self, now: DateTime<Utc>) -> usize;

    /// Number of tracked entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct QuotaEntry {
    count: u64,
    reset_at: DateTime<Utc>,
}

impl QuotaEntry {
    fn fresh(now: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self {
            count: 0,
            reset_at: now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuotaKey {
    client_id: String,
    class: EndpointClass,
}

/// In-memory fixed-window quota table.
pub struct FixedWindowQuota {
    entries: DashMap<QuotaKey, QuotaEntry>,
    policies: QuotaConfig,
}

impl FixedWindowQuota {
    pub fn new(policies: QuotaConfig) -> Self {
        Self {
            entries: DashMap::new(),
            policies,
        }
    }

    pub fn policy(&self, class: EndpointClass) -> &QuotaPolicy {
        self.policies.policy(class)
    }

    fn window(&self, class: EndpointClass) -> chrono::Duration {
        i64::try_from(self.policy(class).window_ms)
            .ok()
            .and_then(chrono::Duration::try_milliseconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    fn key(client_id: &str, class: EndpointClass) -> QuotaKey {
        QuotaKey {
            client_id: client_id.to_string(),
            class,
        }
    }
}

impl QuotaStore for FixedWindowQuota {
    fn check(&self, client_id: &str, class: EndpointClass, now: DateTime<Utc>) -> QuotaStatus {
        let max = self.policy(class).max_requests;
        let window = self.window(class);

        let mut entry = self
            .entries
            .entry(Self::key(client_id, class))
            .or_insert_with(|| QuotaEntry::fresh(now, window));

        if now >= entry.reset_at {
            *entry = QuotaEntry::fresh(now, window);
        }
        entry.count = entry.count.saturating_add(1);

        QuotaStatus {
            allowed: entry.count <= max,
            limit: max,
            remaining: max.saturating_sub(entry.count),
            reset_at: entry.reset_at,
        }
    }

    fn peek(&self, client_id: &str, class: EndpointClass, now: DateTime<Utc>) -> QuotaStatus {
        let max = self.policy(class).max_requests;
        let current = self
            .entries
            .get(&Self::key(client_id, class))
            .map(|e| *e)
            .filter(|e| now < e.reset_at)
            .unwrap_or_else(|| QuotaEntry::fresh(now, self.window(class)));

        QuotaStatus {
            allowed: current.count < max,
            limit: max,
            remaining: max.saturating_sub(current.count),
            reset_at: current.reset_at,
        }
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.reset_at);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Background task that periodically evicts expired quota entries.
pub struct QuotaSweeper {
    store: Arc<dyn QuotaStore>,
    interval: Duration,
}

impl QuotaSweeper {
    pub fn new(store: Arc<dyn QuotaStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run one sweep and record metrics.
    pub fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let evicted = self.store.sweep(now);
        let remaining = self.store.len();
        metrics::record_quota_sweep(evicted, remaining);
        tracing::debug!(evicted, remaining, "Quota sweep completed");
        evicted
    }

    /// Sweep on every tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Quota sweeper starting");

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once(Utc::now());
                }
                _ = shutdown.recv() => {
                    tracing::info!("Quota sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policies(max: u64, window_ms: u64) -> QuotaConfig {
        let mut config = QuotaConfig::default();
        config.general.max_requests = max;
        config.general.window_ms = window_ms;
        config
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn ms(n: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(n)
    }

    #[test]
    fn test_monotonic_within_window() {
        let quota = FixedWindowQuota::new(policies(5, 60_000));
        let now = t0();

        let mut last_remaining = u64::MAX;
        for i in 1..=5u64 {
            let status = quota.check("1.2.3.4", EndpointClass::GeneralApi, now);
            assert!(status.allowed, "request {} should be admitted", i);
            assert_eq!(status.remaining, 5 - i);
            assert!(status.remaining <= last_remaining);
            assert_eq!(status.reset_at, now + ms(60_000));
            last_remaining = status.remaining;
        }

        for i in 0..3 {
            let status = quota.check("1.2.3.4", EndpointClass::GeneralApi, now + ms(100 + i));
            assert!(!status.allowed);
            assert_eq!(status.remaining, 0);
            assert_eq!(status.reset_at, now + ms(60_000));
        }
    }

    #[test]
    fn test_window_reset() {
        let quota = FixedWindowQuota::new(policies(2, 1_000));
        let now = t0();

        quota.check("c", EndpointClass::GeneralApi, now);
        quota.check("c", EndpointClass::GeneralApi, now);
        assert!(!quota.check("c", EndpointClass::GeneralApi, now + ms(999)).allowed);

        // At exactly reset_at the window is over.
        let later = now + ms(1_000);
        let status = quota.check("c", EndpointClass::GeneralApi, later);
        assert!(status.allowed);
        assert_eq!(status.remaining, 1);
        assert_eq!(status.reset_at, later + ms(1_000));
    }

    #[test]
    fn test_keys_are_independent() {
        let quota = FixedWindowQuota::new(policies(1, 60_000));
        let now = t0();

        assert!(quota.check("a", EndpointClass::GeneralApi, now).allowed);
        assert!(!quota.check("a", EndpointClass::GeneralApi, now).allowed);
        assert!(quota.check("b", EndpointClass::GeneralApi, now).allowed);
        // Same client, different class has its own entry and policy.
        let status = quota.check("a", EndpointClass::Auth, now);
        assert!(status.allowed);
        assert_eq!(status.limit, 5);
        assert_eq!(quota.len(), 3);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let quota = FixedWindowQuota::new(policies(3, 60_000));
        let now = t0();

        let status = quota.peek("p", EndpointClass::GeneralApi, now);
        assert_eq!(status.remaining, 3);
        assert!(status.allowed);
        assert!(quota.is_empty());

        quota.check("p", EndpointClass::GeneralApi, now);
        let status = quota.peek("p", EndpointClass::GeneralApi, now);
        assert_eq!(status.remaining, 2);
        assert_eq!(quota.peek("p", EndpointClass::GeneralApi, now).remaining, 2);
    }

    #[test]
    fn test_oversized_window_saturates() {
        let quota = FixedWindowQuota::new(policies(1, u64::MAX));
        let now = t0();

        let first = quota.check("far", EndpointClass::GeneralApi, now);
        assert!(first.allowed);
        assert!(first.reset_at > now);

        let second = quota.check("far", EndpointClass::GeneralApi, now);
        assert!(!second.allowed);
        assert_eq!(second.reset_at, first.reset_at);

        let peeked = quota.peek("other", EndpointClass::GeneralApi, now);
        assert_eq!(peeked.remaining, 1);
        assert!(peeked.retry_after_secs(now) > 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = t0();
        let status = QuotaStatus {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_at: now + ms(1_001),
        };
        assert_eq!(status.retry_after_secs(now), 2);
        assert_eq!(status.retry_after_secs(now + ms(1)), 1);
        assert_eq!(status.retry_after_secs(now + ms(5_000)), 0);
    }

    #[test]
    fn test_sweep_evicts_only_expired() {
        let mut config = policies(10, 1_000);
        config.auth.window_ms = 10_000;
        let quota = FixedWindowQuota::new(config);
        let now = t0();

        quota.check("old", EndpointClass::GeneralApi, now);
        quota.check("long", EndpointClass::Auth, now);
        assert_eq!(quota.sweep(now + ms(500)), 0);
        assert_eq!(quota.sweep(now + ms(1_000)), 1);
        assert_eq!(quota.len(), 1);

        // An evicted key starts over instead of resurrecting its old count.
        let status = quota.check("old", EndpointClass::GeneralApi, now + ms(1_500));
        assert_eq!(status.remaining, 9);
        assert_eq!(status.reset_at, now + ms(2_500));
    }

    #[test]
    fn test_concurrent_checks_lose_no_updates() {
        let max = 100;
        let quota = Arc::new(FixedWindowQuota::new(policies(max, 60_000)));
        let now = t0();

        let handles: Vec<_> = (0..max + 50)
            .map(|_| {
                let quota = quota.clone();
                std::thread::spawn(move || quota.check("hot", EndpointClass::GeneralApi, now).allowed)
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted as u64, max);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_shutdown() {
        let store: Arc<dyn QuotaStore> = Arc::new(FixedWindowQuota::new(policies(10, 1)));
        store.check("x", EndpointClass::GeneralApi, Utc::now() - ms(10));

        let (tx, rx) = broadcast::channel(1);
        let sweeper = QuotaSweeper::new(store.clone(), Duration::from_secs(1));
        let task = tokio::spawn(sweeper.run(rx));

        time::sleep(Duration::from_millis(1_500)).await;
        assert!(store.is_empty());

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
