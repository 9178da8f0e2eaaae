//! The posting list engine (component C2): a per-token index of
//! `(seq_id, offsets)` pairs, represented compactly for short lists and as
//! a chain of blocks for long ones (spec §4.2).

mod block;
mod compact;
pub mod offsets;

use std::cmp::Ordering;

use crate::config::EngineConfig;
pub use block::{Block, ChainedList};
pub use compact::CompactList;

/// A single `(seq_id, offsets)` pair as seen from outside the posting list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub id: u32,
    pub offsets: Vec<u32>,
}

/// Tagged sum type standing in for the source's pointer-tagged compact vs
/// chained representation (spec §9 "Design notes"): callers match on the
/// variant instead of branching on a tag bit.
#[derive(Debug, Clone)]
pub enum PostingList {
    Compact(CompactList),
    Chained(ChainedList),
}

impl PostingList {
    pub fn new() -> Self {
        PostingList::Compact(CompactList::new())
    }

    pub fn num_ids(&self) -> usize {
        match self {
            PostingList::Compact(c) => c.num_ids(),
            PostingList::Chained(c) => c.num_ids(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_ids() == 0
    }

    pub fn first_id(&self) -> Option<u32> {
        match self {
            PostingList::Compact(c) => c.first_id(),
            PostingList::Chained(c) => c.first_id(),
        }
    }

    pub fn last_id(&self) -> Option<u32> {
        match self {
            PostingList::Compact(c) => c.last_id(),
            PostingList::Chained(c) => c.last_id(),
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        match self {
            PostingList::Compact(c) => c.contains(id),
            PostingList::Chained(c) => c.contains(id),
        }
    }

    /// Short-circuit existence probe against a candidate id set, used by
    /// the orchestrator's rare-token drop fallback (spec §4.8 step 5;
    /// supplemented from `posting.h`'s `contains_atleast_one`).
    pub fn contains_any(&self, target_ids: &[u32]) -> bool {
        target_ids.iter().any(|&id| self.contains(id))
    }

    pub fn offsets_of(&self, id: u32) -> Option<Vec<u32>> {
        match self {
            PostingList::Compact(c) => c.offsets_of(id),
            PostingList::Chained(c) => c.offsets_of(id),
        }
    }

    /// Inserts or overwrites the offsets for `id`. Materializes into a
    /// chained list if growing past the compact threshold.
    pub fn upsert(&mut self, id: u32, offsets: Vec<u32>, config: &EngineConfig) {
        if let PostingList::Compact(compact) = self {
            let projected_len = if compact.contains(id) { compact.num_ids() } else { compact.num_ids() + 1 };
            if projected_len > config.compact_posting_threshold {
                let mut chained = compact.to_chained(config.block_max_elements);
                chained.upsert(id, offsets);
                *self = PostingList::Chained(chained);
                return;
            }
        }
        match self {
            PostingList::Compact(c) => c.upsert(id, offsets),
            PostingList::Chained(c) => c.upsert(id, offsets),
        }
    }

    /// Removes `id`, demoting back to compact form if the chain has
    /// collapsed down to a single, mostly-empty block.
    pub fn erase(&mut self, id: u32, config: &EngineConfig) {
        match self {
            PostingList::Compact(c) => c.erase(id),
            PostingList::Chained(c) => {
                c.erase(id);
                if c.num_blocks() == 1 && c.num_ids() <= 10 {
                    *self = PostingList::Compact(c.to_compact());
                }
                let _ = config.block_max_elements;
            }
        }
    }

    /// All `(id, offsets)` pairs in ascending id order.
    pub fn entries(&self) -> Vec<Posting> {
        match self {
            PostingList::Compact(c) => c.entries(),
            PostingList::Chained(c) => c.entries(),
        }
    }

    pub fn iter(&self) -> PostingIter<'_> {
        PostingIter { entries: self.entries(), pos: 0, _marker: std::marker::PhantomData }
    }
}

impl Default for PostingList {
    fn default() -> Self {
        Self::new()
    }
}

/// A cursor over a posting list's entries. Spec §4.2's block iterator
/// contract (`valid`, `id`, `offset`, `next`, `skip_to`, `skip_to_rev`)
/// realized over the materialized entry list rather than raw blocks: the
/// posting list underneath may still be block-chained, but the cursor
/// itself walks a flat, already-decoded view.
pub struct PostingIter<'a> {
    entries: Vec<Posting>,
    pos: usize,
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> PostingIter<'a> {
    pub fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    pub fn id(&self) -> Option<u32> {
        self.entries.get(self.pos).map(|p| p.id)
    }

    pub fn offsets(&self) -> Option<&[u32]> {
        self.entries.get(self.pos).map(|p| p.offsets.as_slice())
    }

    pub fn next(&mut self) {
        if self.valid() {
            self.pos += 1;
        }
    }

    /// Advances until `id() >= target`, invalidating the iterator if no
    /// such entry exists.
    pub fn skip_to(&mut self, target: u32) {
        while let Some(id) = self.id() {
            if id >= target {
                return;
            }
            self.pos += 1;
        }
    }

    /// Advances backwards until `id() <= target`, invalidating the iterator
    /// off the front if no such entry exists.
    pub fn skip_to_rev(&mut self, target: u32) {
        loop {
            match self.id() {
                Some(id) if id <= target => return,
                Some(_) => {
                    if self.pos == 0 {
                        self.pos = self.entries.len();
                        return;
                    }
                    self.pos -= 1;
                }
                None => return,
            }
        }
    }
}

/// Intersects N posting lists via synchronized N-way advance: repeatedly
/// pick the maximum of the current ids, skip every other iterator to it,
/// emit on full agreement, advance all on a hit. A specialized two-list
/// path is used when `lists.len() == 2` (spec §4.2).
pub fn intersect(lists: &[&PostingList]) -> Vec<u32> {
    match lists.len() {
        0 => return Vec::new(),
        1 => return lists[0].entries().into_iter().map(|p| p.id).collect(),
        2 => return intersect_two(lists[0], lists[1]),
        _ => {}
    }

    let mut iters: Vec<PostingIter> = lists.iter().map(|l| l.iter()).collect();
    let mut result = Vec::new();

    'outer: loop {
        let mut max_id = None;
        for it in &iters {
            if !it.valid() {
                break 'outer;
            }
            max_id = Some(max_id.map_or(it.id().unwrap(), |m: u32| m.max(it.id().unwrap())));
        }
        let max_id = match max_id {
            Some(v) => v,
            None => break,
        };

        let mut all_match = true;
        for it in &mut iters {
            it.skip_to(max_id);
            if !it.valid() || it.id() != Some(max_id) {
                all_match = false;
            }
        }

        if all_match {
            result.push(max_id);
            for it in &mut iters {
                it.next();
            }
        }
    }

    result
}

fn intersect_two(a: &PostingList, b: &PostingList) -> Vec<u32> {
    let mut ia = a.iter();
    let mut ib = b.iter();
    let mut out = Vec::new();
    while ia.valid() && ib.valid() {
        let (ida, idb) = (ia.id().unwrap(), ib.id().unwrap());
        match ida.cmp(&idb) {
            Ordering::Equal => {
                out.push(ida);
                ia.next();
                ib.next();
            }
            Ordering::Less => ia.skip_to(idb),
            Ordering::Greater => ib.skip_to(ida),
        }
    }
    out
}

/// Symmetric union/merge of N posting lists: emits the minimum of the
/// current ids, advancing only the iterators that matched it.
pub fn union(lists: &[&PostingList]) -> Vec<u32> {
    let mut iters: Vec<PostingIter> = lists.iter().map(|l| l.iter()).collect();
    let mut out = Vec::new();
    loop {
        let min_id = iters.iter().filter(|it| it.valid()).filter_map(|it| it.id()).min();
        let min_id = match min_id {
            Some(v) => v,
            None => break,
        };
        out.push(min_id);
        for it in &mut iters {
            if it.id() == Some(min_id) {
                it.next();
            }
        }
    }
    out
}

/// Token offset streams for one document across an ordered query token
/// sequence, used by exact/phrase matching (spec §4.2).
pub struct DocTokenOffsets<'a> {
    pub per_token: Vec<&'a [u32]>,
    pub field_is_array: bool,
}

/// True iff, for the given document, each query token `i` has an
/// occurrence at a position directly following token `i-1`'s occurrence
/// (scalar fields), and the last query token's final offset is a
/// last-token sentinel when the field is an array.
pub fn exact_match(doc: &DocTokenOffsets) -> bool {
    if doc.per_token.is_empty() {
        return false;
    }
    if doc.field_is_array {
        return exact_match_array(doc);
    }
    if doc.per_token.len() == 1 {
        return !doc.per_token[0].is_empty();
    }
    // For a scalar field, an exact match requires token i's offset stream
    // to contain, for some starting position p, `p+i` for every i.
    let first = doc.per_token[0];
    'candidates: for &p in first {
        for (i, stream) in doc.per_token.iter().enumerate().skip(1) {
            if !stream.contains(&(p + i as u32)) {
                continue 'candidates;
            }
        }
        return true;
    }
    false
}

fn exact_match_array(doc: &DocTokenOffsets) -> bool {
    let decoded: Vec<Vec<offsets::ArrayOccurrence>> =
        doc.per_token.iter().map(|s| offsets::decode_array_offsets(s)).collect();
    let Some(first) = decoded.first() else { return false };
    'candidates: for occ in first {
        for (i, occs) in decoded.iter().enumerate().skip(1) {
            let found = occs
                .iter()
                .any(|o| o.array_index == occ.array_index && o.offset == occ.offset + i as u32);
            if !found {
                continue 'candidates;
            }
        }
        // The match is exact only if the last token's matching occurrence
        // is itself the field's last token.
        let last_occs = decoded.last().unwrap();
        let k = decoded.len() as u32 - 1;
        let is_last = last_occs
            .iter()
            .any(|o| o.array_index == occ.array_index && o.offset == occ.offset + k && o.is_last_token);
        if is_last {
            return true;
        }
    }
    false
}

/// The array indices where every query token matched at consecutive
/// positions within that element, for reporting which array entry (or
/// entries) satisfied a phrase match — used for highlighting
/// array-typed fields (SPEC_FULL §C.2a, grounded on the source's
/// `get_matching_array_indices`).
pub fn matching_array_indices(doc: &DocTokenOffsets) -> Vec<u32> {
    if !doc.field_is_array || doc.per_token.is_empty() {
        return Vec::new();
    }
    let decoded: Vec<Vec<offsets::ArrayOccurrence>> =
        doc.per_token.iter().map(|s| offsets::decode_array_offsets(s)).collect();
    let Some(first) = decoded.first() else { return Vec::new() };
    let mut indices = Vec::new();
    for occ in first {
        let matched = decoded.iter().enumerate().skip(1).all(|(i, occs)| {
            occs.iter().any(|o| o.array_index == occ.array_index && o.offset == occ.offset + i as u32)
        });
        if matched && !indices.contains(&occ.array_index) {
            indices.push(occ.array_index);
        }
    }
    indices
}

/// True iff there exists a starting occurrence of the first token such
/// that tokens `1..k` occur at consecutive following positions, without
/// wrapping across array elements (spec §4.2).
pub fn phrase_match(doc: &DocTokenOffsets) -> bool {
    if doc.per_token.is_empty() {
        return false;
    }
    if doc.field_is_array {
        let decoded: Vec<Vec<offsets::ArrayOccurrence>> =
            doc.per_token.iter().map(|s| offsets::decode_array_offsets(s)).collect();
        let Some(first) = decoded.first() else { return false };
        return first.iter().any(|occ| {
            decoded.iter().enumerate().skip(1).all(|(i, occs)| {
                occs.iter().any(|o| o.array_index == occ.array_index && o.offset == occ.offset + i as u32)
            })
        });
    }
    let first = doc.per_token[0];
    first.iter().any(|&p| {
        doc.per_token.iter().enumerate().skip(1).all(|(i, stream)| stream.contains(&(p + i as u32)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_from(pairs: &[(u32, Vec<u32>)], config: &EngineConfig) -> PostingList {
        let mut list = PostingList::new();
        for (id, offsets) in pairs {
            list.upsert(*id, offsets.clone(), config);
        }
        list
    }

    #[test]
    fn upsert_then_contains_and_skip_to() {
        let config = EngineConfig::default();
        let list = list_from(&[(1, vec![0]), (5, vec![2]), (9, vec![4])], &config);
        assert!(list.contains(5));
        let mut it = list.iter();
        it.skip_to(5);
        assert!(it.valid());
        assert_eq!(it.id(), Some(5));
    }

    #[test]
    fn compact_materializes_into_chained_past_threshold() {
        let config = EngineConfig::default();
        let mut list = PostingList::new();
        for id in 0..100u32 {
            list.upsert(id, vec![id], &config);
        }
        assert!(matches!(list, PostingList::Chained(_)));
        assert_eq!(list.num_ids(), 100);
        for id in 0..100u32 {
            assert!(list.contains(id));
            assert_eq!(list.offsets_of(id), Some(vec![id]));
        }
    }

    #[test]
    fn erase_collapses_chained_back_to_compact() {
        let config = EngineConfig::default();
        let mut list = PostingList::new();
        for id in 0..300u32 {
            list.upsert(id, vec![id], &config);
        }
        assert!(matches!(list, PostingList::Chained(_)));
        for id in 5..300u32 {
            list.erase(id, &config);
        }
        assert!(matches!(list, PostingList::Compact(_)));
        assert_eq!(list.num_ids(), 5);
    }

    #[test]
    fn intersect_matches_set_semantics() {
        let config = EngineConfig::default();
        let a = list_from(&[(1, vec![0]), (2, vec![1]), (3, vec![2])], &config);
        let b = list_from(&[(2, vec![1]), (3, vec![2]), (4, vec![3])], &config);
        assert_eq!(intersect(&[&a, &b]), vec![2, 3]);
    }

    #[test]
    fn intersect_offsets_concatenate_from_each_side() {
        let config = EngineConfig::default();
        let a = list_from(&[(2, vec![1, 9])], &config);
        let b = list_from(&[(2, vec![1])], &config);
        assert_eq!(a.offsets_of(2), Some(vec![1, 9]));
        assert_eq!(b.offsets_of(2), Some(vec![1]));
        // Callers concatenate per spec §8; the posting list itself only
        // guarantees each side's offsets are retrievable independently.
        let mut combined = a.offsets_of(2).unwrap();
        combined.extend(b.offsets_of(2).unwrap());
        assert_eq!(combined, vec![1, 9, 1]);
    }

    #[test]
    fn union_is_the_sorted_superset() {
        let config = EngineConfig::default();
        let a = list_from(&[(1, vec![0]), (3, vec![0])], &config);
        let b = list_from(&[(2, vec![0]), (3, vec![0])], &config);
        assert_eq!(union(&[&a, &b]), vec![1, 2, 3]);
    }

    #[test]
    fn three_way_intersect_uses_generic_path() {
        let config = EngineConfig::default();
        let a = list_from(&[(1, vec![0]), (2, vec![0]), (3, vec![0])], &config);
        let b = list_from(&[(2, vec![0]), (3, vec![0])], &config);
        let c = list_from(&[(2, vec![0]), (3, vec![0]), (4, vec![0])], &config);
        assert_eq!(intersect(&[&a, &b, &c]), vec![2, 3]);
    }

    #[test]
    fn exact_match_requires_consecutive_offsets() {
        let doc = DocTokenOffsets { per_token: vec![&[0], &[1]], field_is_array: false };
        assert!(exact_match(&doc));
        let doc = DocTokenOffsets { per_token: vec![&[0], &[5]], field_is_array: false };
        assert!(!exact_match(&doc));
    }

    #[test]
    fn phrase_match_finds_any_consecutive_run() {
        let doc = DocTokenOffsets { per_token: vec![&[0, 10], &[1, 20]], field_is_array: false };
        assert!(phrase_match(&doc));
        let doc = DocTokenOffsets { per_token: vec![&[0], &[20]], field_is_array: false };
        assert!(!phrase_match(&doc));
    }

    #[test]
    fn array_phrase_match_rejects_cross_element_wraparound() {
        use offsets::{encode_array_offsets, ArrayOccurrence};
        // token "a" at element 0 offset 2 (last token of element 0), token
        // "b" at element 1 offset 0: a phrase query "a b" must not match
        // even though 2+1==3 would coincide only if they wrapped.
        let a = encode_array_offsets(&[ArrayOccurrence { offset: 2, array_index: 0, is_last_token: false }]);
        let b = encode_array_offsets(&[ArrayOccurrence { offset: 0, array_index: 1, is_last_token: true }]);
        let doc = DocTokenOffsets { per_token: vec![&a, &b], field_is_array: true };
        assert!(!phrase_match(&doc));
    }

    #[test]
    fn matching_array_indices_reports_the_matched_element() {
        use offsets::{encode_array_offsets, ArrayOccurrence};
        // "red" appears in element 0 and element 2; "shoes" only follows it
        // in element 2, so only element 2 should be reported as a match.
        let red = encode_array_offsets(&[
            ArrayOccurrence { offset: 0, array_index: 0, is_last_token: false },
            ArrayOccurrence { offset: 0, array_index: 2, is_last_token: false },
        ]);
        let shoes = encode_array_offsets(&[ArrayOccurrence { offset: 1, array_index: 2, is_last_token: true }]);
        let doc = DocTokenOffsets { per_token: vec![&red, &shoes], field_is_array: true };
        assert_eq!(matching_array_indices(&doc), vec![2]);
    }

    #[test]
    fn matching_array_indices_is_empty_for_non_array_fields() {
        let doc = DocTokenOffsets { per_token: vec![&[0], &[1]], field_is_array: false };
        assert!(matching_array_indices(&doc).is_empty());
    }
}
