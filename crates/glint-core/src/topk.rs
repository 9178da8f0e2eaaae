//! Top-K and grouped accumulator (component C9, spec §4.7).
//!
//! A bounded min-heap of size K keyed on a composite score tuple, with an
//! optional secondary per-distinct-key heap for grouping. `std::BinaryHeap`
//! is a max-heap, so — matching the teacher's own `BinaryHeap<Reverse<_>>`
//! idiom wherever it needs a bounded min-heap — candidates are pushed
//! wrapped in `Reverse`, and the heap is capped by popping the current
//! worst entry once it exceeds `k`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use ordered_float::OrderedFloat;

/// Composite sort key: three sort-by expression values in priority order,
/// lexicographically compared, with seq_id descending as the final
/// tie-break (spec §4.7). Each component is pre-negated by the caller so
/// that `Ord`'s natural ascending order always means "better is greater" —
/// letting this type stay a plain `#[derive(Ord)]` tuple-alike instead of a
/// hand-written `Ord` impl with per-field direction flags.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ScoreKey {
    pub primary: OrderedFloat<f64>,
    pub secondary: OrderedFloat<f64>,
    pub tertiary: OrderedFloat<f64>,
}

impl Eq for ScoreKey {}
impl Ord for ScoreKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.partial_cmp(other).expect("OrderedFloat never produces NaN ordering")
    }
}

#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub seq_id: u32,
    pub score: ScoreKey,
    pub payload: T,
}

/// Higher-is-better ordering on `(score, seq_id)`, with seq_id descending as
/// the tie-break, matching spec §4.7.
impl<T> PartialEq for Candidate<T> {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.seq_id == other.seq_id
    }
}
impl<T> Eq for Candidate<T> {}
impl<T> PartialOrd for Candidate<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Candidate<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score.cmp(&other.score).then_with(|| self.seq_id.cmp(&other.seq_id))
    }
}

/// Bounded min-heap of size `k`: worst-scoring candidate sits at the top and
/// is the one evicted when a better candidate arrives at capacity.
pub struct TopKHeap<T> {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate<T>>>,
}

impl<T> TopKHeap<T> {
    pub fn new(k: usize) -> Self {
        Self { k, heap: BinaryHeap::with_capacity(k.max(1)) }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, candidate: Candidate<T>) {
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return;
        }
        if let Some(Reverse(worst)) = self.heap.peek() {
            if candidate > *worst {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
            }
        }
    }

    /// Drains into a descending (best-first) vector.
    pub fn into_sorted_vec(self) -> Vec<Candidate<T>> {
        let mut out: Vec<Candidate<T>> = self.heap.into_iter().map(|Reverse(c)| c).collect();
        out.sort_by(|a, b| b.cmp(a));
        out
    }
}

/// Grouped accumulator: documents sharing a 64-bit group key compete for
/// `group_limit` slots within their group, and the outer Top-K is keyed on
/// group representatives (the group's single best-scoring member).
pub struct GroupedTopK<T> {
    group_limit: usize,
    groups: HashMap<u64, TopKHeap<T>>,
    outer_k: usize,
}

impl<T> GroupedTopK<T> {
    pub fn new(outer_k: usize, group_limit: usize) -> Self {
        Self { group_limit, groups: HashMap::new(), outer_k }
    }

    pub fn push(&mut self, group_key: u64, candidate: Candidate<T>) {
        let group_limit = self.group_limit;
        let heap = self.groups.entry(group_key).or_insert_with(|| TopKHeap::new(group_limit));
        heap.push(candidate);
    }

    /// Flattens groups, each ranked by its best member, then truncates the
    /// outer result to `outer_k` groups' worth of hits.
    pub fn into_grouped_hits(self) -> Vec<(u64, Vec<Candidate<T>>)> {
        let mut groups: Vec<(u64, Vec<Candidate<T>>)> = self
            .groups
            .into_iter()
            .map(|(key, heap)| (key, heap.into_sorted_vec()))
            .collect();
        groups.sort_by(|a, b| {
            let best_a = a.1.first();
            let best_b = b.1.first();
            best_b.cmp(&best_a)
        });
        groups.truncate(self.outer_k);
        groups
    }
}

/// 64-bit hash-combine of a document's `group_by_fields` raw values,
/// matching spec §4.7's "distinct key is the hash-combine of the sequence
/// of group-by field values" — FxHash's combine, the same hasher already
/// used by `PostingList`/posting-token maps throughout this crate.
pub fn group_key(values: &[&str]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = fxhash::FxHasher::default();
    for v in values {
        v.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(score: f64) -> ScoreKey {
        ScoreKey { primary: OrderedFloat(score), secondary: OrderedFloat(0.0), tertiary: OrderedFloat(0.0) }
    }

    #[test]
    fn keeps_only_the_k_best_candidates() {
        let mut heap = TopKHeap::new(2);
        heap.push(Candidate { seq_id: 1, score: key(1.0), payload: () });
        heap.push(Candidate { seq_id: 2, score: key(5.0), payload: () });
        heap.push(Candidate { seq_id: 3, score: key(3.0), payload: () });
        let sorted = heap.into_sorted_vec();
        assert_eq!(sorted.iter().map(|c| c.seq_id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn ties_break_by_seq_id_descending() {
        let mut heap = TopKHeap::new(3);
        heap.push(Candidate { seq_id: 1, score: key(1.0), payload: () });
        heap.push(Candidate { seq_id: 5, score: key(1.0), payload: () });
        heap.push(Candidate { seq_id: 3, score: key(1.0), payload: () });
        let sorted = heap.into_sorted_vec();
        assert_eq!(sorted.iter().map(|c| c.seq_id).collect::<Vec<_>>(), vec![5, 3, 1]);
    }

    #[test]
    fn grouped_top_k_caps_members_per_group() {
        let mut grouped = GroupedTopK::new(10, 2);
        let g1 = group_key(&["red"]);
        grouped.push(g1, Candidate { seq_id: 1, score: key(1.0), payload: () });
        grouped.push(g1, Candidate { seq_id: 2, score: key(2.0), payload: () });
        grouped.push(g1, Candidate { seq_id: 3, score: key(3.0), payload: () });
        let groups = grouped.into_grouped_hits();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1.iter().map(|c| c.seq_id).collect::<Vec<_>>(), vec![3, 2]);
    }

    #[test]
    fn group_key_is_stable_for_same_values() {
        assert_eq!(group_key(&["a", "b"]), group_key(&["a", "b"]));
        assert_ne!(group_key(&["a", "b"]), group_key(&["b", "a"]));
    }
}
