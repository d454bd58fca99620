//! Cost-bounded concurrent cache, used for both the cluster
//! cache and the dirent cache.
//!
//! Mirrors the shape of a promise/future based cache: a miss installs a
//! pending slot under a short-held index lock, releases the lock, and runs
//! the factory outside of it. Concurrent callers for the same key block on
//! that slot's own condvar rather than the index lock, so unrelated keys
//! stay reachable while a slow factory runs.

use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Computes the accounting cost of a cached value. Pluggable per cache
/// instance so the cluster cache and the dirent cache can size entries
/// differently.
pub trait CostEstimator<V> {
    fn cost(value: &V) -> usize;
}

enum SlotState<V> {
    Pending,
    Ready(Arc<V>),
    Failed,
}

struct Slot<V> {
    state: Mutex<SlotState<V>>,
    cond: Condvar,
}

struct Index<K, V> {
    slots: HashMap<K, Arc<Slot<V>>>,
    costs: HashMap<K, usize>,
    /// Least-recently-used order, oldest first. Touched on every hit, so
    /// this is a linear scan rather than O(1) — acceptable for the
    /// entry counts these caches hold (hundreds to low thousands of
    /// clusters/dirents), and kept simple over pulling in an LRU-ordered
    /// map dependency.
    order: VecDeque<K>,
    total_cost: usize,
}

pub struct ConcurrentCache<K, V, C> {
    max_cost: usize,
    index: Mutex<Index<K, V>>,
    _cost: PhantomData<fn(&V) -> C>,
}

impl<K, V, C> ConcurrentCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Send + Sync,
    C: CostEstimator<V>,
{
    pub fn new(max_cost: usize) -> ConcurrentCache<K, V, C> {
        ConcurrentCache {
            max_cost,
            index: Mutex::new(Index {
                slots: HashMap::new(),
                costs: HashMap::new(),
                order: VecDeque::new(),
                total_cost: 0,
            }),
            _cost: PhantomData,
        }
    }

    /// Returns the cached value for `key`, computing it via `factory` on a
    /// miss. Exactly one concurrent caller per key runs `factory`; the rest
    /// block on its result. If `factory` fails, the slot is dropped and the
    /// error is returned to every waiter so a later call can retry.
    pub fn get_or_put<F>(&self, key: K, factory: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        let (slot, is_new) = {
            let mut idx = self.index.lock().unwrap();
            if let Some(slot) = idx.slots.get(&key) {
                let slot = Arc::clone(slot);
                touch(&mut idx.order, &key);
                (slot, false)
            } else {
                let slot = Arc::new(Slot {
                    state: Mutex::new(SlotState::Pending),
                    cond: Condvar::new(),
                });
                idx.slots.insert(key.clone(), Arc::clone(&slot));
                (slot, true)
            }
        };

        if !is_new {
            let state = slot.state.lock().unwrap();
            let state = wait_ready(state, &slot);
            return match &*state {
                SlotState::Ready(v) => Ok(Arc::clone(v)),
                SlotState::Failed => Err(Error::invalid_state(
                    "cache factory failed for a concurrent waiter",
                )),
                SlotState::Pending => unreachable!("wait_ready only returns once settled"),
            };
        }

        log::trace!("cache miss, materializing new entry");
        match factory() {
            Ok(value) => {
                let cost = C::cost(&value);
                let value = Arc::new(value);
                *slot.state.lock().unwrap() = SlotState::Ready(Arc::clone(&value));
                slot.cond.notify_all();

                let mut idx = self.index.lock().unwrap();
                idx.costs.insert(key.clone(), cost);
                idx.total_cost += cost;
                idx.order.push_back(key);
                self.evict(&mut idx);
                Ok(value)
            }
            Err(e) => {
                *slot.state.lock().unwrap() = SlotState::Failed;
                slot.cond.notify_all();
                self.index.lock().unwrap().slots.remove(&key);
                Err(e)
            }
        }
    }

    fn evict(&self, idx: &mut Index<K, V>) {
        while idx.total_cost > self.max_cost {
            let Some(oldest) = idx.order.pop_front() else {
                break;
            };
            if let Some(cost) = idx.costs.remove(&oldest) {
                idx.total_cost -= cost;
                idx.slots.remove(&oldest);
                log::debug!(
                    "evicted cache entry (cost {cost}), {} remaining of {} budget",
                    idx.total_cost,
                    self.max_cost
                );
            }
        }
    }

    pub fn drop_entry(&self, key: &K) -> bool {
        let mut idx = self.index.lock().unwrap();
        if let Some(cost) = idx.costs.remove(key) {
            idx.total_cost -= cost;
        }
        idx.order.retain(|k| k != key);
        idx.slots.remove(key).is_some()
    }

    pub fn current_cost(&self) -> usize {
        self.index.lock().unwrap().total_cost
    }

    pub fn max_cost(&self) -> usize {
        self.max_cost
    }

    /// Shrinks the cost budget, evicting least-recently-used entries
    /// immediately if the new budget is below the current total cost.
    pub fn set_max_cost(&mut self, max_cost: usize) {
        self.max_cost = max_cost;
        let mut idx = self.index.lock().unwrap();
        self.evict(&mut idx);
    }
}

fn touch<K: Eq>(order: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = order.iter().position(|k| k == key) {
        if let Some(k) = order.remove(pos) {
            order.push_back(k);
        }
    }
}

fn wait_ready<'a, V>(
    mut state: MutexGuard<'a, SlotState<V>>,
    slot: &'a Slot<V>,
) -> MutexGuard<'a, SlotState<V>> {
    while matches!(*state, SlotState::Pending) {
        state = slot.cond.wait(state).unwrap();
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    struct UnitCost;
    impl CostEstimator<String> for UnitCost {
        fn cost(_value: &String) -> usize {
            1
        }
    }

    #[test]
    fn caches_materialized_value() {
        let cache: ConcurrentCache<u32, String, UnitCost> = ConcurrentCache::new(100);
        let calls = AtomicUsize::new(0);
        let factory = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("value".to_string())
        };
        let a = cache.get_or_put(1, factory).unwrap();
        let b = cache.get_or_put(1, factory).unwrap();
        assert_eq!(*a, "value");
        assert_eq!(*b, "value");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn factory_error_does_not_poison_future_attempts() {
        let cache: ConcurrentCache<u32, String, UnitCost> = ConcurrentCache::new(100);
        let err = cache.get_or_put(1, || Err(Error::format("boom")));
        assert!(err.is_err());
        let ok = cache.get_or_put(1, || Ok("retried".to_string())).unwrap();
        assert_eq!(*ok, "retried");
    }

    #[test]
    fn evicts_past_cost_budget() {
        let cache: ConcurrentCache<u32, String, UnitCost> = ConcurrentCache::new(2);
        cache.get_or_put(1, || Ok("a".to_string())).unwrap();
        cache.get_or_put(2, || Ok("b".to_string())).unwrap();
        cache.get_or_put(3, || Ok("c".to_string())).unwrap();
        assert!(cache.current_cost() <= 2);
        // key 1 was least-recently-used and should have been evicted first.
        let calls = AtomicUsize::new(0);
        cache
            .get_or_put(1, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("a-again".to_string())
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_max_cost_shrinks_eagerly() {
        let mut cache: ConcurrentCache<u32, String, UnitCost> = ConcurrentCache::new(100);
        cache.get_or_put(1, || Ok("a".to_string())).unwrap();
        cache.get_or_put(2, || Ok("b".to_string())).unwrap();
        cache.get_or_put(3, || Ok("c".to_string())).unwrap();
        assert_eq!(cache.current_cost(), 3);

        cache.set_max_cost(1);
        assert_eq!(cache.max_cost(), 1);
        assert!(cache.current_cost() <= 1);
    }

    #[test]
    fn concurrent_callers_materialize_exactly_once() {
        let cache: Arc<ConcurrentCache<u32, String, UnitCost>> = Arc::new(ConcurrentCache::new(100));
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache
                        .get_or_put(42, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(5));
                            Ok("shared".to_string())
                        })
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            assert_eq!(*h.join().unwrap(), "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
