//! Filter iterator tree (component C8, spec §4.6).
//!
//! A recursive structure mirroring `glint_filter_parser::FilterExpr`. Every
//! node exposes the same cursor shape the posting-list iterators (C2) use —
//! `valid`/`seq_id`/`next`/`skip_to` — so AND/OR composition is just another
//! synchronized-advance loop, the same idiom `PostingList::intersect`/
//! `union` already established.

use std::cmp::Ordering;

use roaring::RoaringBitmap;

/// Tri-state membership probe result for `valid_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    No,
    Yes,
    /// No id in range `[id, +inf)` can ever match; the caller should stop.
    End,
}

/// Common cursor contract for every filter tree node.
pub trait FilterIterator {
    fn valid(&self) -> bool;
    fn seq_id(&self) -> u32;
    fn next(&mut self);
    fn skip_to(&mut self, id: u32);
    /// Rough cardinality estimate used to decide evaluation order (smaller
    /// side first for AND, per spec §4.6).
    fn approx_cardinality(&self) -> u64;
}

/// A leaf over a fully materialized id set — used for numeric/bool/geo
/// leaves, the literal `id` field filter, string leaves (collapsed to the
/// union of their posting-list intersections), and reference leaves after
/// resolution, all of which spec §4.6 says dominate on intersection and so
/// materialize eagerly rather than staying lazy.
pub struct IdSetIter {
    ids: Vec<u32>,
    pos: usize,
}

impl IdSetIter {
    pub fn new(ids: RoaringBitmap) -> Self {
        Self { ids: ids.iter().collect(), pos: 0 }
    }

    pub fn from_sorted_vec(ids: Vec<u32>) -> Self {
        Self { ids, pos: 0 }
    }
}

impl FilterIterator for IdSetIter {
    fn valid(&self) -> bool {
        self.pos < self.ids.len()
    }

    fn seq_id(&self) -> u32 {
        self.ids[self.pos]
    }

    fn next(&mut self) {
        self.pos += 1;
    }

    fn skip_to(&mut self, id: u32) {
        while self.pos < self.ids.len() && self.ids[self.pos] < id {
            self.pos += 1;
        }
    }

    fn approx_cardinality(&self) -> u64 {
        self.ids.len() as u64
    }
}

/// NOT-equals gap-walking cursor (SPEC_FULL §C.3): tracks a "previous
/// match" id against the sorted set of ids *that carry the value* and
/// emits every id in `all_ids` not in that set, grounded directly on
/// `filter_result_iterator.h`'s described behavior.
pub struct NotEqualsIter {
    all_ids: Vec<u32>,
    excluded: RoaringBitmap,
    pos: usize,
}

impl NotEqualsIter {
    pub fn new(all_ids: RoaringBitmap, excluded: RoaringBitmap) -> Self {
        let mut iter = Self { all_ids: all_ids.iter().collect(), excluded, pos: 0 };
        iter.advance_to_next_match();
        iter
    }

    fn advance_to_next_match(&mut self) {
        while self.pos < self.all_ids.len() && self.excluded.contains(self.all_ids[self.pos]) {
            self.pos += 1;
        }
    }
}

impl FilterIterator for NotEqualsIter {
    fn valid(&self) -> bool {
        self.pos < self.all_ids.len()
    }

    fn seq_id(&self) -> u32 {
        self.all_ids[self.pos]
    }

    fn next(&mut self) {
        self.pos += 1;
        self.advance_to_next_match();
    }

    fn skip_to(&mut self, id: u32) {
        while self.pos < self.all_ids.len() && self.all_ids[self.pos] < id {
            self.pos += 1;
        }
        self.advance_to_next_match();
    }

    fn approx_cardinality(&self) -> u64 {
        (self.all_ids.len() as u64).saturating_sub(self.excluded.len())
    }
}

/// AND: synchronized advance, skipping the lagging side forward to the
/// leader on every step.
pub struct AndIter {
    left: Box<dyn FilterIterator + Send>,
    right: Box<dyn FilterIterator + Send>,
}

impl AndIter {
    /// Orders operands smaller-cardinality-first per spec §4.6.
    pub fn new(a: Box<dyn FilterIterator + Send>, b: Box<dyn FilterIterator + Send>) -> Self {
        if a.approx_cardinality() <= b.approx_cardinality() {
            let mut node = Self { left: a, right: b };
            node.sync();
            node
        } else {
            let mut node = Self { left: b, right: a };
            node.sync();
            node
        }
    }

    fn sync(&mut self) {
        while self.left.valid() && self.right.valid() {
            match self.left.seq_id().cmp(&self.right.seq_id()) {
                Ordering::Equal => break,
                Ordering::Less => self.left.skip_to(self.right.seq_id()),
                Ordering::Greater => self.right.skip_to(self.left.seq_id()),
            }
        }
    }
}

impl FilterIterator for AndIter {
    fn valid(&self) -> bool {
        self.left.valid() && self.right.valid() && self.left.seq_id() == self.right.seq_id()
    }

    fn seq_id(&self) -> u32 {
        self.left.seq_id()
    }

    fn next(&mut self) {
        self.left.next();
        self.sync();
    }

    fn skip_to(&mut self, id: u32) {
        self.left.skip_to(id);
        self.right.skip_to(id);
        self.sync();
    }

    fn approx_cardinality(&self) -> u64 {
        self.left.approx_cardinality().min(self.right.approx_cardinality())
    }
}

/// OR: emits the minimum of the two current ids, advancing only the
/// side(s) that matched it.
pub struct OrIter {
    left: Box<dyn FilterIterator + Send>,
    right: Box<dyn FilterIterator + Send>,
}

impl OrIter {
    pub fn new(left: Box<dyn FilterIterator + Send>, right: Box<dyn FilterIterator + Send>) -> Self {
        Self { left, right }
    }
}

impl FilterIterator for OrIter {
    fn valid(&self) -> bool {
        self.left.valid() || self.right.valid()
    }

    fn seq_id(&self) -> u32 {
        match (self.left.valid(), self.right.valid()) {
            (true, true) => self.left.seq_id().min(self.right.seq_id()),
            (true, false) => self.left.seq_id(),
            (false, true) => self.right.seq_id(),
            (false, false) => panic!("seq_id called on exhausted OrIter"),
        }
    }

    fn next(&mut self) {
        let current = self.seq_id();
        if self.left.valid() && self.left.seq_id() == current {
            self.left.next();
        }
        if self.right.valid() && self.right.seq_id() == current {
            self.right.next();
        }
    }

    fn skip_to(&mut self, id: u32) {
        if self.left.valid() {
            self.left.skip_to(id);
        }
        if self.right.valid() {
            self.right.skip_to(id);
        }
    }

    fn approx_cardinality(&self) -> u64 {
        self.left.approx_cardinality().max(self.right.approx_cardinality())
    }
}

/// Drains a filter iterator tree into a materialized id set, e.g. to feed
/// the Top-K heap (C9) or the vector adapter's `query_with_filter` (C7).
pub fn collect_ids(mut iter: Box<dyn FilterIterator + Send>) -> RoaringBitmap {
    let mut out = RoaringBitmap::new();
    while iter.valid() {
        out.insert(iter.seq_id());
        iter.next();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[u32]) -> RoaringBitmap {
        values.iter().copied().collect()
    }

    #[test]
    fn and_iter_intersects() {
        let a = Box::new(IdSetIter::new(ids(&[1, 2, 3, 4])));
        let b = Box::new(IdSetIter::new(ids(&[2, 4, 6])));
        let and = AndIter::new(a, b);
        assert_eq!(collect_ids(Box::new(and)).iter().collect::<Vec<_>>(), vec![2, 4]);
    }

    #[test]
    fn or_iter_unions() {
        let a = Box::new(IdSetIter::new(ids(&[1, 3, 5])));
        let b = Box::new(IdSetIter::new(ids(&[2, 3, 6])));
        let or = OrIter::new(a, b);
        assert_eq!(collect_ids(Box::new(or)).iter().collect::<Vec<_>>(), vec![1, 2, 3, 5, 6]);
    }

    #[test]
    fn not_equals_emits_gap_ids() {
        let all = ids(&[1, 2, 3, 4, 5]);
        let excluded = ids(&[2, 4]);
        let iter = NotEqualsIter::new(all, excluded);
        assert_eq!(collect_ids(Box::new(iter)).iter().collect::<Vec<_>>(), vec![1, 3, 5]);
    }

    #[test]
    fn not_equals_on_absent_value_yields_all_ids() {
        let all = ids(&[1, 2, 3]);
        let excluded = RoaringBitmap::new();
        let iter = NotEqualsIter::new(all, excluded);
        assert_eq!(collect_ids(Box::new(iter)).iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn and_orders_smaller_side_first_without_changing_result() {
        let big = Box::new(IdSetIter::new((0..1000u32).collect()));
        let small = Box::new(IdSetIter::new(ids(&[500, 999])));
        let and = AndIter::new(big, small);
        assert_eq!(and.approx_cardinality(), 2);
        assert_eq!(collect_ids(Box::new(and)).iter().collect::<Vec<_>>(), vec![500, 999]);
    }

    #[test]
    fn nested_and_or_composes() {
        let a = Box::new(IdSetIter::new(ids(&[1, 2, 3])));
        let b = Box::new(IdSetIter::new(ids(&[2, 3, 4])));
        let c = Box::new(IdSetIter::new(ids(&[3, 4, 5])));
        let and_ab: Box<dyn FilterIterator + Send> = Box::new(AndIter::new(a, b));
        let tree = OrIter::new(and_ab, c);
        assert_eq!(collect_ids(Box::new(tree)).iter().collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    }
}
