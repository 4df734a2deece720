// Bounded top-K selection
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Scored item ranked by score, then by smaller item for ties.
#[derive(Debug, Clone)]
struct Ranked<T> {
    score: f64,
    item: T,
}

impl<T: Ord> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for Ranked<T> {}

impl<T: Ord> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Ranked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.item.cmp(&self.item))
    }
}

/// Keeps the `k` best items seen so far in a min-heap.
///
/// # Memory Optimizations
/// - Heap never grows beyond `k + 1` entries
#[derive(Debug, Clone)]
pub struct TopK<T: Ord> {
    k: usize,
    heap: BinaryHeap<Reverse<Ranked<T>>>,
}

impl<T: Ord> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    /// Offer an item; the worst entry is evicted once more than `k` are held.
    #[inline]
    pub fn push(&mut self, score: f64, item: T) {
        if self.k == 0 {
            return;
        }
        self.heap.push(Reverse(Ranked { score, item }));
        if self.heap.len() > self.k {
            self.heap.pop();
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Best first; ties ordered by ascending item.
    pub fn into_sorted_vec(self) -> Vec<(f64, T)> {
        let mut ranked: Vec<Ranked<T>> = self.heap.into_iter().map(|Reverse(r)| r).collect();
        ranked.sort_by(|a, b| b.cmp(a));
        ranked.into_iter().map(|r| (r.score, r.item)).collect()
    }
}
