//! Window TinyLFU store.
//!
//! New keys enter a small LRU window (1% of capacity). When the window
//! overflows, its least-recent key competes with the least-recent key of the
//! main segment's probation area; whichever the frequency sketch estimates
//! as more popular survives. The main segment is a segmented LRU: keys hit
//! while on probation are promoted to the protected area (80% of main).
//!
//! Nodes live in a slab and are linked by index, so all list operations are
//! O(1) with no per-operation allocation. Not thread-safe; the local tier
//! wraps it in a mutex.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::cache::sketch::Admittor;

const NIL: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Window = 0,
    Probation = 1,
    Protected = 2,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    prev: usize,
    next: usize,
    region: Region,
    hash: u64,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            prev: NIL,
            next: NIL,
            region: Region::Window,
            hash: 0,
        }
    }
}

/// An intrusive LRU list: `head` is most recent, `tail` least recent.
#[derive(Debug, Clone, Copy)]
struct Segment {
    head: usize,
    tail: usize,
    len: usize,
    capacity: usize,
}

impl Segment {
    fn new(capacity: usize) -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
            capacity,
        }
    }
}

#[derive(Debug)]
struct Slot<V> {
    key: String,
    value: V,
}

/// Bounded approximate-LFU map from `String` keys to `V`.
#[derive(Debug)]
pub struct TinyLfu<V> {
    index: HashMap<String, usize>,
    slots: Vec<Option<Slot<V>>>,
    links: Vec<Link>,
    free: Vec<usize>,
    segments: [Segment; 3],
    main_capacity: usize,
    admittor: Admittor,
    hasher: RandomState,
}

impl<V> TinyLfu<V> {
    /// `size` bounds the number of entries; `samples` is the sketch aging
    /// period, raised to at least `size` so history outlives one pass over
    /// the cache.
    pub fn new(size: usize, samples: usize) -> Self {
        let size = size.max(1);
        let samples = samples.max(size);
        let window = (size / 100).max(1);
        let main_capacity = size.saturating_sub(window);
        let protected = main_capacity * 8 / 10;

        Self {
            index: HashMap::with_capacity(size),
            slots: Vec::with_capacity(size),
            links: Vec::with_capacity(size),
            free: Vec::new(),
            segments: [
                Segment::new(window),
                Segment::new(main_capacity - protected),
                Segment::new(protected),
            ],
            main_capacity,
            admittor: Admittor::new(samples, samples),
            hasher: RandomState::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum number of entries held at once.
    pub fn capacity(&self) -> usize {
        self.segments[Region::Window as usize].capacity + self.main_capacity
    }

    /// Look up `key`, recording the access and refreshing its position.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let hash = self.hasher.hash_one(key);
        self.admittor.record(hash);

        let idx = *self.index.get(key)?;
        self.on_hit(idx);
        self.slots[idx].as_ref().map(|slot| &slot.value)
    }

    /// Look up `key` without touching frequency or recency.
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|slot| &slot.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace `key`. Returns the entry evicted to make room, if
    /// any; that may be the new entry itself when it loses admission.
    pub fn insert(&mut self, key: String, value: V) -> Option<(String, V)> {
        if let Some(&idx) = self.index.get(&key) {
            if let Some(slot) = self.slots[idx].as_mut() {
                slot.value = value;
            }
            self.on_hit(idx);
            return None;
        }

        let hash = self.hasher.hash_one(key.as_str());
        self.admittor.record(hash);

        let idx = self.alloc(key.clone(), value);
        self.index.insert(key, idx);
        self.links[idx].hash = hash;
        self.push_front(idx, Region::Window);

        let window = self.segments[Region::Window as usize];
        if window.len <= window.capacity {
            return None;
        }

        let candidate = window.tail;
        self.unlink(candidate);
        self.admit(candidate)
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = *self.index.get(key)?;
        self.unlink(idx);
        self.release(idx).map(|(_, value)| value)
    }

    /// Move a window overflow candidate into the main segment, evicting
    /// either the candidate or the main victim.
    fn admit(&mut self, candidate: usize) -> Option<(String, V)> {
        let probation = self.segments[Region::Probation as usize];
        let protected = self.segments[Region::Protected as usize];

        if probation.len + protected.len < self.main_capacity {
            self.push_front(candidate, Region::Probation);
            return None;
        }

        let victim = if probation.tail != NIL {
            probation.tail
        } else {
            protected.tail
        };
        if victim == NIL {
            return self.release(candidate);
        }

        let candidate_freq = self.admittor.estimate(self.links[candidate].hash);
        let victim_freq = self.admittor.estimate(self.links[victim].hash);

        if candidate_freq > victim_freq {
            self.unlink(victim);
            let evicted = self.release(victim);
            self.push_front(candidate, Region::Probation);
            evicted
        } else {
            self.release(candidate)
        }
    }

    fn on_hit(&mut self, idx: usize) {
        match self.links[idx].region {
            Region::Window => {
                self.unlink(idx);
                self.push_front(idx, Region::Window);
            }
            Region::Probation => {
                self.unlink(idx);
                self.push_front(idx, Region::Protected);

                let protected = self.segments[Region::Protected as usize];
                if protected.len > protected.capacity {
                    let demoted = protected.tail;
                    self.unlink(demoted);
                    self.push_front(demoted, Region::Probation);
                }
            }
            Region::Protected => {
                self.unlink(idx);
                self.push_front(idx, Region::Protected);
            }
        }
    }

    fn alloc(&mut self, key: String, value: V) -> usize {
        let slot = Some(Slot { key, value });
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = slot;
                self.links[idx] = Link::default();
                idx
            }
            None => {
                self.slots.push(slot);
                self.links.push(Link::default());
                self.slots.len() - 1
            }
        }
    }

    /// Drop an already-unlinked node and recycle its index.
    fn release(&mut self, idx: usize) -> Option<(String, V)> {
        let slot = self.slots[idx].take()?;
        self.index.remove(&slot.key);
        self.free.push(idx);
        Some((slot.key, slot.value))
    }

    fn push_front(&mut self, idx: usize, region: Region) {
        let segment = &mut self.segments[region as usize];
        let old_head = segment.head;
        segment.head = idx;
        if segment.tail == NIL {
            segment.tail = idx;
        }
        segment.len += 1;

        let link = &mut self.links[idx];
        link.prev = NIL;
        link.next = old_head;
        link.region = region;

        if old_head != NIL {
            self.links[old_head].prev = idx;
        }
    }

    fn unlink(&mut self, idx: usize) {
        let Link {
            prev, next, region, ..
        } = self.links[idx];
        let segment = &mut self.segments[region as usize];

        if prev != NIL {
            self.links[prev].next = next;
        } else {
            segment.head = next;
        }
        if next != NIL {
            self.links[next].prev = prev;
        } else {
            segment.tail = prev;
        }
        segment.len -= 1;

        self.links[idx].prev = NIL;
        self.links[idx].next = NIL;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut lfu = TinyLfu::new(100, 1000);
        assert!(lfu.insert("a".into(), 1).is_none());
        assert!(lfu.insert("b".into(), 2).is_none());

        assert_eq!(lfu.get("a"), Some(&1));
        assert_eq!(lfu.peek("b"), Some(&2));
        assert_eq!(lfu.len(), 2);

        assert_eq!(lfu.remove("a"), Some(1));
        assert!(lfu.get("a").is_none());
        assert_eq!(lfu.len(), 1);
    }

    #[test]
    fn test_replace_keeps_single_entry() {
        let mut lfu = TinyLfu::new(10, 100);
        lfu.insert("k".into(), 1);
        lfu.insert("k".into(), 2);
        assert_eq!(lfu.len(), 1);
        assert_eq!(lfu.get("k"), Some(&2));
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut lfu = TinyLfu::new(50, 1000);
        for i in 0..1_000 {
            lfu.insert(format!("key-{i}"), i);
            assert!(lfu.len() <= lfu.capacity());
        }
        assert_eq!(lfu.len(), 50);
    }

    #[test]
    fn test_frequent_keys_survive_scan() {
        let mut lfu = TinyLfu::new(100, 100_000);
        for i in 0..100 {
            lfu.insert(format!("hot-{i}"), i);
        }
        for _ in 0..5 {
            for i in 0..100 {
                lfu.get(&format!("hot-{i}"));
            }
        }

        // A one-pass scan of cold keys must not flush the hot set.
        for i in 0..1_000 {
            lfu.insert(format!("cold-{i}"), i);
        }

        let survivors = (0..100)
            .filter(|i| lfu.contains(&format!("hot-{i}")))
            .count();
        assert!(survivors >= 90, "only {survivors} hot keys survived");
    }

    #[test]
    fn test_zero_samples_still_tracks_frequency() {
        let mut lfu: TinyLfu<u32> = TinyLfu::new(10, 0);
        lfu.insert("k".into(), 1);
        for _ in 0..5 {
            lfu.get("k");
        }
        let hash = lfu.hasher.hash_one("k");
        assert!(lfu.admittor.estimate(hash) >= 2);
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut lfu = TinyLfu::new(4, 100);
        for round in 0..10 {
            for i in 0..4 {
                lfu.insert(format!("r{round}-{i}"), i);
            }
            for i in 0..4 {
                lfu.remove(&format!("r{round}-{i}"));
            }
        }
        assert!(lfu.is_empty());
        assert!(lfu.slots.len() <= 5);
    }

    #[test]
    fn test_single_slot_cache() {
        let mut lfu = TinyLfu::new(1, 100);
        lfu.insert("a".into(), 1);
        lfu.insert("b".into(), 2);
        assert_eq!(lfu.len(), 1);
        assert_eq!(lfu.capacity(), 1);
    }
}
