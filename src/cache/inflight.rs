//! Registry of in-flight requests keyed by cache key.
//!
//! Concurrent callers asking for the same key share one underlying future.
//! The registry only holds weak handles: an entry disappears when its future
//! settles or when every waiter has gone away, whichever comes first.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use tracing::debug;

type SharedResult<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct Slot<T, E> {
    generation: u64,
    future: WeakShared<BoxFuture<'static, Result<T, E>>>,
}

type Registry<T, E> = Arc<Mutex<HashMap<String, Slot<T, E>>>>;

pub struct InflightRequests<T, E> {
    slots: Registry<T, E>,
    generation: Arc<AtomicU64>,
}

impl<T, E> Clone for InflightRequests<T, E> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            generation: self.generation.clone(),
        }
    }
}

impl<T, E> Default for InflightRequests<T, E> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Removes its slot when the producing future finishes or is dropped
struct SlotGuard<T, E> {
    slots: Registry<T, E>,
    key: String,
    generation: u64,
}

impl<T, E> Drop for SlotGuard<T, E> {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        // A newer request may already own the key
        if slots.get(&self.key).is_some_and(|slot| slot.generation == self.generation) {
            slots.remove(&self.key);
        }
    }
}

fn lock<T, E>(slots: &Registry<T, E>) -> MutexGuard<'_, HashMap<String, Slot<T, E>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T, E> InflightRequests<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `producer` for `key` unless a request for the same key is already
    /// running, in which case the running request's result is shared.
    pub fn dedupe<F, Fut>(&self, key: &str, producer: F) -> SharedResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let mut slots = lock(&self.slots);

        if let Some(existing) = slots.get(key).and_then(|slot| slot.future.upgrade()) {
            debug!("Joining in-flight request for key: {}", key);
            return existing;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let guard = SlotGuard {
            slots: self.slots.clone(),
            key: key.to_string(),
            generation,
        };
        let work = producer();
        let future = async move {
            let _guard = guard;
            work.await
        }
        .boxed()
        .shared();

        if let Some(weak) = future.downgrade() {
            slots.insert(key.to_string(), Slot { generation, future: weak });
        }
        future
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.slots).contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_run() {
        let inflight: InflightRequests<u32, String> = InflightRequests::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let calls: Vec<_> = (0..10)
            .map(|_| {
                let runs = runs.clone();
                inflight.dedupe("page-0", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(7)
                })
            })
            .collect();

        assert_eq!(inflight.in_flight_count(), 1);
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r == &Ok(7)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(inflight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failure_clears_the_slot() {
        let inflight: InflightRequests<u32, String> = InflightRequests::new();

        let first = inflight.dedupe("k", || async { Err("boom".to_string()) }).await;
        assert_eq!(first, Err("boom".to_string()));
        assert!(!inflight.is_in_flight("k"));

        let second = inflight.dedupe("k", || async { Ok(1) }).await;
        assert_eq!(second, Ok(1));
    }

    #[tokio::test]
    async fn dropping_every_waiter_clears_the_slot() {
        let inflight: InflightRequests<u32, String> = InflightRequests::new();

        let pending = inflight.dedupe("k", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(1)
        });
        assert!(inflight.is_in_flight("k"));

        drop(pending);
        assert!(!inflight.is_in_flight("k"));
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let inflight: InflightRequests<u32, String> = InflightRequests::new();

        let a = inflight.dedupe("a", || async { Ok(1) });
        let b = inflight.dedupe("b", || async { Ok(2) });
        assert_eq!(inflight.in_flight_count(), 2);

        assert_eq!(a.await, Ok(1));
        assert_eq!(b.await, Ok(2));
    }
}
