//! Frequency estimation for TinyLFU admission.
//!
//! A count-min sketch tracks how often each key hash was seen, in 4-bit
//! saturating counters. A bloom-filter doorkeeper sits in front of it so
//! keys seen only once never reach the sketch. After `samples` recorded
//! accesses every counter is halved and the doorkeeper is cleared, which
//! ages out historical popularity.

/// Number of sketch rows (independent hash functions).
const DEPTH: usize = 4;

/// Counters saturate at the 4-bit maximum.
const MAX_COUNT: u8 = 15;

/// Bloom filter hash functions per key.
const DOORKEEPER_HASHES: u64 = 3;

const SEEDS: [u64; DEPTH] = [
    0xc3a5_c85c_97cb_3127,
    0xb492_b66f_be98_f273,
    0x9ae1_6a3b_2f90_404f,
    0xcbf2_9ce4_8422_2325,
];

#[inline]
fn spread(hash: u64, seed: u64) -> u64 {
    let h = (hash ^ seed).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    h ^ (h >> 31)
}

/// Count-min sketch with 4-bit saturating counters.
#[derive(Debug)]
pub struct CountMinSketch {
    counters: Vec<u8>,
    width: usize,
    mask: u64,
}

impl CountMinSketch {
    /// Create a sketch with at least `width` counters per row.
    pub fn new(width: usize) -> Self {
        let width = width.max(16).next_power_of_two();
        Self {
            counters: vec![0; width * DEPTH],
            width,
            mask: (width - 1) as u64,
        }
    }

    #[inline]
    fn slot(&self, hash: u64, row: usize) -> usize {
        row * self.width + (spread(hash, SEEDS[row]) & self.mask) as usize
    }

    pub fn increment(&mut self, hash: u64) {
        for row in 0..DEPTH {
            let slot = self.slot(hash, row);
            if self.counters[slot] < MAX_COUNT {
                self.counters[slot] += 1;
            }
        }
    }

    pub fn estimate(&self, hash: u64) -> u8 {
        (0..DEPTH)
            .map(|row| self.counters[self.slot(hash, row)])
            .min()
            .unwrap_or(0)
    }

    /// Halve every counter.
    pub fn halve(&mut self) {
        for counter in &mut self.counters {
            *counter >>= 1;
        }
    }
}

/// Bloom filter that absorbs first-time accesses.
#[derive(Debug)]
pub struct Doorkeeper {
    bits: Vec<u64>,
    mask: u64,
}

impl Doorkeeper {
    pub fn new(expected_items: usize) -> Self {
        let nbits = (expected_items.max(64) * 8).next_power_of_two();
        Self {
            bits: vec![0; nbits / 64],
            mask: (nbits - 1) as u64,
        }
    }

    /// Insert `hash`. Returns `true` if it was (probably) already present.
    pub fn insert(&mut self, hash: u64) -> bool {
        let mut present = true;
        for round in 0..DOORKEEPER_HASHES {
            let bit = self.bit(hash, round);
            let (word, mask) = ((bit / 64) as usize, 1u64 << (bit % 64));
            if self.bits[word] & mask == 0 {
                present = false;
                self.bits[word] |= mask;
            }
        }
        present
    }

    pub fn contains(&self, hash: u64) -> bool {
        (0..DOORKEEPER_HASHES).all(|round| {
            let bit = self.bit(hash, round);
            self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0
        })
    }

    pub fn clear(&mut self) {
        self.bits.fill(0);
    }

    #[inline]
    fn bit(&self, hash: u64, round: u64) -> u64 {
        // Double hashing: h1 + i * h2.
        let h1 = hash;
        let h2 = spread(hash, SEEDS[0]) | 1;
        h1.wrapping_add(round.wrapping_mul(h2)) & self.mask
    }
}

/// Doorkeeper + sketch, with periodic aging.
#[derive(Debug)]
pub struct Admittor {
    sketch: CountMinSketch,
    doorkeeper: Doorkeeper,
    samples: usize,
    recorded: usize,
}

impl Admittor {
    /// `width` sizes the sketch rows; `samples` is the aging period.
    pub fn new(width: usize, samples: usize) -> Self {
        let samples = samples.max(1);
        Self {
            sketch: CountMinSketch::new(width),
            doorkeeper: Doorkeeper::new(samples),
            samples,
            recorded: 0,
        }
    }

    /// Record one access to `hash`.
    pub fn record(&mut self, hash: u64) {
        if self.doorkeeper.insert(hash) {
            self.sketch.increment(hash);
        }

        self.recorded += 1;
        if self.recorded >= self.samples {
            self.sketch.halve();
            self.doorkeeper.clear();
            self.recorded = 0;
        }
    }

    /// Estimated access frequency of `hash`.
    pub fn estimate(&self, hash: u64) -> u32 {
        let mut freq = u32::from(self.sketch.estimate(hash));
        if self.doorkeeper.contains(hash) {
            freq += 1;
        }
        freq
    }
}
