//! Injectable randomness
//!
//! The service never calls `rand` directly. It receives an [`IdGenerator`]
//! and a [`Shuffler`] so tests can make ids and pair orderings predictable.

use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

type IdFn = dyn Fn() -> u64 + Send + Sync;
type ShuffleFn = dyn Fn(usize, &mut dyn FnMut(usize, usize)) + Send + Sync;

/// Source of 64-bit identifiers
#[derive(Clone)]
pub struct IdGenerator(Arc<IdFn>);

impl IdGenerator {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Uniformly random ids from the thread-local generator
    pub fn random() -> Self {
        Self::new(|| rand::rng().random())
    }

    /// `start`, `start + 1`, ... in call order
    pub fn sequential(start: u64) -> Self {
        let next = Arc::new(AtomicU64::new(start));
        Self::new(move || next.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_id(&self) -> u64 {
        (self.0)()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdGenerator")
    }
}

/// In-place permutation expressed as a sequence of swaps
#[derive(Clone)]
pub struct Shuffler(Arc<ShuffleFn>);

impl Shuffler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(usize, &mut dyn FnMut(usize, usize)) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Fisher-Yates driven by the thread-local generator
    pub fn random() -> Self {
        Self::new(|n, swap| {
            let mut rng = rand::rng();
            for i in (1..n).rev() {
                let j = rng.random_range(0..=i);
                swap(i, j);
            }
        })
    }

    /// Leaves the order untouched
    pub fn identity() -> Self {
        Self::new(|_, _| {})
    }

    pub fn shuffle<T>(&self, items: &mut [T]) {
        let n = items.len();
        (self.0)(n, &mut |i, j| items.swap(i, j));
    }
}

impl Default for Shuffler {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for Shuffler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Shuffler")
    }
}
