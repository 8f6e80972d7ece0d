//! Per-key request coalescing (single flight).
//!
//! Concurrent calls to [`Group::work`] with the same key share one execution:
//! the first caller runs its future, the rest wait and receive a clone of the
//! output. If the running caller is dropped mid-flight, one of the waiters
//! runs its own future instead.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

pub struct Group<T> {
    calls: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for Group<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

/// Removes the key's call when the caller is done with it: after the call
/// completed, or when the caller running it is cancelled with nobody waiting.
/// A cancelled waiter, or a cancelled runner with waiters left to take over,
/// leaves the call in place.
struct Release<'a, T> {
    calls: &'a Mutex<HashMap<String, Arc<OnceCell<T>>>>,
    key: &'a str,
    call: Arc<OnceCell<T>>,
    ran: AtomicBool,
}

impl<T> Drop for Release<'_, T> {
    fn drop(&mut self) {
        let done = self.call.initialized();
        if !done && !self.ran.load(Ordering::Relaxed) {
            return;
        }
        let mut calls = self.calls.lock();
        // One reference in the map, one here; anything more is a waiter.
        if !done && Arc::strong_count(&self.call) > 2 {
            return;
        }
        if calls
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.call))
        {
            calls.remove(self.key);
        }
    }
}

impl<T: Clone> Group<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` unless a call for `key` is already in flight, in which case
    /// wait for that call's output instead.
    ///
    /// Returns the output and whether it came from another caller's run.
    pub async fn work<F, Fut>(&self, key: &str, f: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let call = self
            .calls
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let release = Release {
            calls: &self.calls,
            key,
            call,
            ran: AtomicBool::new(false),
        };

        let value = release
            .call
            .get_or_init(|| {
                release.ran.store(true, Ordering::Relaxed);
                f()
            })
            .await
            .clone();

        (value, !release.ran.load(Ordering::Relaxed))
    }

    /// Number of keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_run() {
        let group = Arc::new(Group::<u64>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let group = group.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                group
                    .work("key", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        7
                    })
                    .await
            }));
        }

        let mut shared = 0;
        for handle in handles {
            let (value, was_shared) = handle.await.unwrap();
            assert_eq!(value, 7);
            if was_shared {
                shared += 1;
            }
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(shared, 15);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let group = Group::<u32>::new();
        let (first, shared) = group.work("k", || async { 1 }).await;
        assert_eq!((first, shared), (1, false));
        let (second, shared) = group.work("k", || async { 2 }).await;
        assert_eq!((second, shared), (2, false));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block_each_other() {
        let group = Arc::new(Group::<&'static str>::new());
        let slow = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .work("slow", || async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        "slow"
                    })
                    .await
            })
        };

        let fast = tokio::time::timeout(
            Duration::from_millis(100),
            group.work("fast", || async { "fast" }),
        )
        .await
        .expect("fast key waited on slow key");
        assert_eq!(fast.0, "fast");
        assert_eq!(slow.await.unwrap().0, "slow");
    }

    #[tokio::test]
    async fn test_cancelled_sole_caller_releases_key() {
        let group = Arc::new(Group::<u32>::new());

        let leader = {
            let group = group.clone();
            tokio::spawn(async move {
                group
                    .work("k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();
        let _ = leader.await;
        assert_eq!(group.in_flight(), 0);

        let (value, _) = group.work("k", || async { 2 }).await;
        assert_eq!(value, 2);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_waiter_runs_after_leader_is_cancelled() {
        let group = Arc::new(Group::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let leader = {
            let group = group.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                group
                    .work("k", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = {
            let group = group.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                group
                    .work("k", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        2
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        leader.abort();
        let _ = leader.await;
        assert_eq!(group.in_flight(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let (late, shared) = group.work("k", || async { 3 }).await;
        assert_eq!((late, shared), (2, true));
        assert_eq!(waiter.await.unwrap(), (2, false));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_timed_out_caller_releases_key() {
        let group = Group::<u32>::new();
        for i in 0..8 {
            let key = format!("k{i}");
            let slow = group.work(&key, || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                1
            });
            assert!(tokio::time::timeout(Duration::from_millis(10), slow).await.is_err());
        }
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_keeps_call_running() {
        let group = Arc::new(Group::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let leader = {
            let group = group.clone();
            let runs = runs.clone();
            tokio::spawn(async move {
                group
                    .work("k", || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = group.work("k", || async { 2 });
        assert!(tokio::time::timeout(Duration::from_millis(10), waiter).await.is_err());
        assert_eq!(group.in_flight(), 1);

        let (value, shared) = group.work("k", || async { 3 }).await;
        assert_eq!((value, shared), (1, true));
        assert_eq!(leader.await.unwrap(), (1, false));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }
}
