//! Bounded top-K accumulator for one query point.

use crate::types::{PointId, ResultEntry};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct Ranked {
    distance: f64,
    id: PointId,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: the worst entry (farthest, then highest id) is on top.
        self.distance
            .total_cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

/// Keeps the `k` smallest `(distance, id)` pairs offered so far.
///
/// Ties on distance are broken by ascending candidate id, so the retained set
/// and its order do not depend on the order candidates are offered in.
///
/// # Examples
///
/// ```
/// use spatio_knn::TopKAccumulator;
///
/// let mut acc = TopKAccumulator::new(1, 2);
/// acc.offer(30, 5.0);
/// acc.offer(20, 1.0);
/// acc.offer(10, 5.0);
///
/// assert_eq!(acc.kth_distance(), 5.0);
/// let ids: Vec<_> = acc.snapshot().iter().map(|e| e.candidate_id).collect();
/// assert_eq!(ids, vec![20, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct TopKAccumulator {
    query_id: PointId,
    k: usize,
    heap: BinaryHeap<Ranked>,
}

impl TopKAccumulator {
    pub fn new(query_id: PointId, k: usize) -> Self {
        Self {
            query_id,
            k,
            heap: BinaryHeap::with_capacity(k.min(1024) + 1),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Holds `k` entries.
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Offer a candidate; returns whether it was retained.
    ///
    /// NaN distances are ignored.
    pub fn offer(&mut self, candidate_id: PointId, distance: f64) -> bool {
        if self.k == 0 || distance.is_nan() {
            return false;
        }

        let entry = Ranked {
            distance,
            id: candidate_id,
        };
        if self.heap.len() < self.k {
            self.heap.push(entry);
            return true;
        }

        if let Some(worst) = self.heap.peek()
            && entry < *worst
        {
            self.heap.pop();
            self.heap.push(entry);
            return true;
        }
        false
    }

    /// Distance of the K-th best entry, or infinity while fewer than `k` are
    /// held.
    pub fn kth_distance(&self) -> f64 {
        if self.is_full() {
            self.heap
                .peek()
                .map_or(f64::INFINITY, |worst| worst.distance)
        } else {
            f64::INFINITY
        }
    }

    /// Entries sorted by distance, ties by ascending candidate id.
    pub fn snapshot(&self) -> Vec<ResultEntry> {
        let mut ranked: Vec<Ranked> = self.heap.iter().copied().collect();
        ranked.sort_unstable();
        to_entries(self.query_id, ranked)
    }

    pub fn into_sorted(self) -> Vec<ResultEntry> {
        to_entries(self.query_id, self.heap.into_sorted_vec())
    }
}

fn to_entries(query_id: PointId, ranked: Vec<Ranked>) -> Vec<ResultEntry> {
    ranked
        .into_iter()
        .map(|r| ResultEntry {
            query_id,
            candidate_id: r.id,
            distance: r.distance,
        })
        .collect()
}
