//! In-flight request deduplication.
//!
//! Concurrent callers asking for the same request key share one execution:
//! the first call starts the producer and stores the resulting future; later
//! calls joining before settlement get a clone of that future, and every
//! caller observes the identical outcome, success or failure alike. Entries
//! remove themselves the moment they settle, so the map is a rendezvous
//! point, not a response cache.
//!
//! Invariants:
//! - At most one entry per key at any instant.
//! - Entry removal is guarded by a generation id: a superseded entry that
//!   settles late can never delete its replacement.
//! - Stale entries (abandoned before anyone polled them to completion) are
//!   purged opportunistically on the next call; this is housekeeping against
//!   unbounded growth, not a correctness requirement.

use crate::error::ApiError;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(5 * 60);

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, ApiError>>>;

struct PendingEntry<T> {
    outcome: SharedOutcome<T>,
    created_at: Instant,
    generation: u64,
}

/// Collapses concurrent identical requests into one underlying execution.
///
/// One instance per client; constructed at startup and passed by reference
/// rather than held in a module-level global.
pub struct RequestDeduplicator<T> {
    pending: Arc<Mutex<HashMap<String, PendingEntry<T>>>>,
    max_age: Duration,
    generations: AtomicU64,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_max_age(DEFAULT_MAX_AGE)
    }

    /// Override how long an abandoned entry may linger before purging.
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            max_age,
            generations: AtomicU64::new(0),
        }
    }

    /// Join the in-flight request for `key`, or start one via `producer`.
    ///
    /// `producer` is called at most once per stored entry, synchronously and
    /// under the registry lock; it must only build its future, not run it.
    pub fn join<F, Fut>(&self, key: &str, producer: F) -> impl Future<Output = Result<T, ApiError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap();
        Self::purge_stale(&mut pending, self.max_age);

        if let Some(entry) = pending.get(key) {
            trace!(key, "joining in-flight request");
            return entry.outcome.clone();
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.pending);
        let owned_key = key.to_string();
        let outcome = producer()
            .map(move |result| {
                // Settlement cleanup: only this entry's own slot, never a
                // replacement that took the key over in the meantime.
                let mut pending = registry.lock().unwrap();
                if pending.get(&owned_key).is_some_and(|e| e.generation == generation) {
                    pending.remove(&owned_key);
                }
                result
            })
            .boxed()
            .shared();

        pending.insert(
            key.to_string(),
            PendingEntry { outcome: outcome.clone(), created_at: Instant::now(), generation },
        );
        outcome
    }

    /// Drop the pending entry for `key`, if any. Callers already joined to
    /// it keep their shared future; the next `join` starts fresh. Returns
    /// whether an entry was present.
    pub fn evict(&self, key: &str) -> bool {
        self.pending.lock().unwrap().remove(key).is_some()
    }

    /// Drop every pending entry.
    pub fn clear(&self) {
        self.pending.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_stale(pending: &mut HashMap<String, PendingEntry<T>>, max_age: Duration) {
        pending.retain(|key, entry| {
            let fresh = entry.created_at.elapsed() <= max_age;
            if !fresh {
                debug!(key = key.as_str(), "purging stale pending request");
            }
            fresh
        });
    }
}

impl<T> Default for RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
