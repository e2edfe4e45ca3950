//! Notification rate limiting with coalescing.
//!
//! Enforces a minimum interval between notifications for a given key
//! (recipient + room). Triggers that land inside the window are not dropped:
//! they accumulate in a pending counter that is surfaced and reset the next
//! time a notification is actually allowed through.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default maximum cache size (100,000 entries).
pub const DEFAULT_MAX_SIZE: usize = 100_000;

/// Default minimum interval between notifications for one key.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(60);

/// Entries idle for this long are dropped during cleanup.
const STALE_AFTER: Duration = Duration::from_secs(3600);

/// Maximum entries to scan per cleanup cycle.
const CLEANUP_BATCH_SIZE: usize = 1000;

/// Decision for a single trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether a notification should be sent now.
    pub should_send: bool,
    /// Notifications coalesced since the last one actually sent.
    ///
    /// When `should_send` is true this is the count the delivered body may
    /// surface; when false it includes the trigger just suppressed.
    pub pending: u32,
}

/// Entry tracking coalescing state for a single key.
#[derive(Debug, Clone)]
struct NotifyEntry {
    last_sent: Instant,
    pending: u32,
    touched: Instant,
}

/// Statistics returned from rate limiter cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    /// Number of entries evicted during cleanup.
    pub evicted: usize,
    /// Number of entries remaining after cleanup.
    pub remaining: usize,
}

/// Coalescing rate limiter bounded by an LRU cache.
///
/// The decision mutates the pending counter as a side effect of being asked;
/// callers never adjust counters directly. All state sits behind one lock,
/// so check-and-update is atomic under concurrent triggers.
pub struct NotifyRateLimiter<K: Hash + Eq + Clone + Send + Sync + 'static> {
    entries: RwLock<LruCache<K, NotifyEntry>>,
    min_interval: Duration,
}

impl<K: Hash + Eq + Clone + Send + Sync + 'static> NotifyRateLimiter<K> {
    /// Creates a new rate limiter.
    pub fn new(min_interval: Duration, max_entries: usize) -> Self {
        let size = NonZeroUsize::new(max_entries)
            .unwrap_or(NonZeroUsize::new(DEFAULT_MAX_SIZE).expect("DEFAULT_MAX_SIZE is non-zero"));

        Self {
            entries: RwLock::new(LruCache::new(size)),
            min_interval,
        }
    }

    /// Decides whether a notification for `key` should be sent now.
    ///
    /// Outside the window (or on first sight of the key): allowed. The
    /// accumulated pending count is returned and reset, and the window
    /// restarts. Inside the window: suppressed, pending count incremented.
    pub async fn check_and_update(&self, key: &K) -> RateLimitDecision {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let Some(entry) = entries.get_mut(key) else {
            entries.put(
                key.clone(),
                NotifyEntry {
                    last_sent: now,
                    pending: 0,
                    touched: now,
                },
            );
            return RateLimitDecision {
                should_send: true,
                pending: 0,
            };
        };

        entry.touched = now;

        if now.duration_since(entry.last_sent) >= self.min_interval {
            let pending = entry.pending;
            entry.pending = 0;
            entry.last_sent = now;
            RateLimitDecision {
                should_send: true,
                pending,
            }
        } else {
            entry.pending += 1;
            RateLimitDecision {
                should_send: false,
                pending: entry.pending,
            }
        }
    }

    /// Removes entries with no activity in the stale window.
    ///
    /// Processes up to `CLEANUP_BATCH_SIZE` entries per call.
    pub async fn cleanup(&self) -> CleanupStats {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();

        let stale: Vec<K> = entries
            .iter()
            .take(CLEANUP_BATCH_SIZE)
            .filter(|(_, entry)| now.duration_since(entry.touched) >= STALE_AFTER)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &stale {
            entries.pop(key);
        }

        CleanupStats {
            evicted: stale.len(),
            remaining: before - stale.len(),
        }
    }

    /// Returns the current number of entries in the rate limiter.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Reads the current pending count without updating anything.
    #[cfg(test)]
    pub async fn peek_pending(&self, key: &K) -> Option<u32> {
        let entries = self.entries.read().await;
        entries.peek(key).map(|entry| entry.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(min_interval_secs: u64, max_entries: usize) -> NotifyRateLimiter<(String, String)> {
        NotifyRateLimiter::new(Duration::from_secs(min_interval_secs), max_entries)
    }

    fn key(user: &str, room: &str) -> (String, String) {
        (user.to_string(), room.to_string())
    }

    #[tokio::test]
    async fn test_first_trigger_allowed() {
        let limiter = limiter(60, 100);

        let decision = limiter.check_and_update(&key("bob", "room-1")).await;
        assert!(decision.should_send);
        assert_eq!(decision.pending, 0);
    }

    #[tokio::test]
    async fn test_window_coalesces() {
        let limiter = limiter(60, 100);
        let k = key("bob", "room-1");

        assert!(limiter.check_and_update(&k).await.should_send);

        let second = limiter.check_and_update(&k).await;
        assert!(!second.should_send);
        assert_eq!(second.pending, 1);

        let third = limiter.check_and_update(&k).await;
        assert!(!third.should_send);
        assert_eq!(third.pending, 2);
    }

    #[tokio::test]
    async fn test_window_expiry_surfaces_pending() {
        tokio::time::pause();

        let limiter = limiter(60, 100);
        let k = key("bob", "room-1");

        assert!(limiter.check_and_update(&k).await.should_send);
        assert!(!limiter.check_and_update(&k).await.should_send);
        assert!(!limiter.check_and_update(&k).await.should_send);

        tokio::time::advance(Duration::from_secs(61)).await;

        let decision = limiter.check_and_update(&k).await;
        assert!(decision.should_send);
        assert_eq!(decision.pending, 2);

        // Counter resets once surfaced.
        assert_eq!(limiter.peek_pending(&k).await, Some(0));
    }

    #[tokio::test]
    async fn test_window_restarts_after_send() {
        tokio::time::pause();

        let limiter = limiter(60, 100);
        let k = key("bob", "room-1");

        assert!(limiter.check_and_update(&k).await.should_send);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.check_and_update(&k).await.should_send);

        // Back inside the fresh window.
        assert!(!limiter.check_and_update(&k).await.should_send);
    }

    #[tokio::test]
    async fn test_independent_keys() {
        let limiter = limiter(60, 100);

        assert!(limiter.check_and_update(&key("bob", "room-1")).await.should_send);
        assert!(!limiter.check_and_update(&key("bob", "room-1")).await.should_send);

        // Same user, different room: independent window.
        assert!(limiter.check_and_update(&key("bob", "room-2")).await.should_send);
        // Different user, same room: independent window.
        assert!(limiter.check_and_update(&key("carol", "room-1")).await.should_send);
    }

    #[tokio::test]
    async fn test_cleanup() {
        tokio::time::pause();

        let limiter = limiter(60, 100);

        limiter.check_and_update(&key("bob", "room-1")).await;
        limiter.check_and_update(&key("carol", "room-1")).await;
        assert_eq!(limiter.len().await, 2);

        tokio::time::advance(Duration::from_secs(3601)).await;

        let stats = limiter.cleanup().await;
        assert_eq!(stats.evicted, 2);
        assert_eq!(stats.remaining, 0);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_active_entries() {
        tokio::time::pause();

        let limiter = limiter(60, 100);

        limiter.check_and_update(&key("bob", "room-1")).await;
        tokio::time::advance(Duration::from_secs(3000)).await;
        // Touched again inside the stale window.
        limiter.check_and_update(&key("bob", "room-1")).await;
        tokio::time::advance(Duration::from_secs(1000)).await;

        let stats = limiter.cleanup().await;
        assert_eq!(stats.evicted, 0);
        assert_eq!(stats.remaining, 1);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let limiter = limiter(60, 3);

        limiter.check_and_update(&key("a", "r")).await;
        limiter.check_and_update(&key("b", "r")).await;
        limiter.check_and_update(&key("c", "r")).await;
        assert_eq!(limiter.len().await, 3);

        // Adding a 4th evicts the least recently used entry.
        limiter.check_and_update(&key("d", "r")).await;
        assert_eq!(limiter.len().await, 3);
        assert_eq!(limiter.peek_pending(&key("a", "r")).await, None);

        // An evicted key starts a fresh window: allowed again.
        assert!(limiter.check_and_update(&key("a", "r")).await.should_send);
    }

    #[tokio::test]
    async fn test_zero_max_entries_falls_back_to_default() {
        let limiter: NotifyRateLimiter<u64> = NotifyRateLimiter::new(DEFAULT_MIN_INTERVAL, 0);
        assert!(limiter.check_and_update(&1u64).await.should_send);
    }
}
