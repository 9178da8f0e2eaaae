//! Block-chained posting list representation (spec §4.2): used once a
//! token's logical length outgrows the compact threshold. A singly linked
//! list of blocks, each capped at `block_max_elements` ids, built on top of
//! the C1 containers ([`SortedArray`] for ids and the offset index,
//! [`UnsortedArray`] for the raw offsets stream).
//!
//! The source keeps a side map from each block's last id to the block
//! pointer for O(log n) random access. Since our blocks live in a `Vec`
//! kept sorted by ascending `last_id`, a `partition_point` binary search
//! over that `Vec` *is* that map — no separate structure is needed.

use super::compact::CompactList;
use super::Posting;
use crate::containers::{SortedArray, UnsortedArray};

#[derive(Debug, Clone)]
pub struct Block {
    ids: SortedArray,
    /// Ascending start index into `offsets` for each id in `ids`.
    offset_index: SortedArray,
    offsets: UnsortedArray,
}

impl Block {
    fn new() -> Self {
        Self { ids: SortedArray::new(), offset_index: SortedArray::new(), offsets: UnsortedArray::new() }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn last_id(&self) -> Option<u32> {
        self.ids.max()
    }

    fn id_vec(&self) -> Vec<u32> {
        self.ids.uncompress()
    }

    fn offset_index_vec(&self) -> Vec<u32> {
        self.offset_index.uncompress()
    }

    fn offsets_vec(&self) -> Vec<u32> {
        self.offsets.uncompress()
    }

    fn offsets_at(&self, pos: usize) -> Vec<u32> {
        let idx = self.offset_index_vec();
        let all = self.offsets_vec();
        let start = idx[pos] as usize;
        let end = if pos + 1 < idx.len() { idx[pos + 1] as usize } else { all.len() };
        all[start..end].to_vec()
    }

    pub(super) fn entries(&self) -> Vec<Posting> {
        let ids = self.id_vec();
        (0..ids.len()).map(|i| Posting { id: ids[i], offsets: self.offsets_at(i) }).collect()
    }

    /// Inserts sorted, or replaces the existing entry if `id` is already
    /// present, shifting the offset index to account for the splice
    /// (`insert_and_shift_offset_index` / `remove_and_shift_offset_index`
    /// in the source).
    pub(super) fn upsert(&mut self, id: u32, new_offsets: Vec<u32>) {
        let mut ids = self.id_vec();
        let mut idx = self.offset_index_vec();
        let mut all = self.offsets_vec();

        match ids.binary_search(&id) {
            Ok(pos) => {
                let start = idx[pos] as usize;
                let end = if pos + 1 < idx.len() { idx[pos + 1] as usize } else { all.len() };
                let delta = new_offsets.len() as i64 - (end - start) as i64;
                all.splice(start..end, new_offsets.iter().copied());
                for slot in idx.iter_mut().skip(pos + 1) {
                    *slot = (*slot as i64 + delta) as u32;
                }
            }
            Err(pos) => {
                let start = if pos < idx.len() { idx[pos] as usize } else { all.len() };
                all.splice(start..start, new_offsets.iter().copied());
                idx.insert(pos, start as u32);
                for slot in idx.iter_mut().skip(pos + 1) {
                    *slot += new_offsets.len() as u32;
                }
                ids.insert(pos, id);
            }
        }

        self.ids = SortedArray::load(&ids);
        self.offset_index = SortedArray::load(&idx);
        self.offsets = UnsortedArray::load(&all);
    }

    pub(super) fn erase(&mut self, id: u32) {
        let mut ids = self.id_vec();
        let mut idx = self.offset_index_vec();
        let mut all = self.offsets_vec();

        if let Ok(pos) = ids.binary_search(&id) {
            let start = idx[pos] as usize;
            let end = if pos + 1 < idx.len() { idx[pos + 1] as usize } else { all.len() };
            let removed = (end - start) as u32;
            all.drain(start..end);
            ids.remove(pos);
            idx.remove(pos);
            for slot in idx.iter_mut().skip(pos) {
                *slot -= removed;
            }
        }

        self.ids = SortedArray::load(&ids);
        self.offset_index = SortedArray::load(&idx);
        self.offsets = UnsortedArray::load(&all);
    }
}

#[derive(Debug, Clone)]
pub struct ChainedList {
    block_max_elements: usize,
    /// Kept sorted ascending by `last_id`. `blocks[0]` (the root) is never
    /// physically dropped, matching the source's invariant.
    blocks: Vec<Block>,
}

impl ChainedList {
    pub fn new(block_max_elements: usize) -> Self {
        Self { block_max_elements, blocks: vec![Block::new()] }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn num_ids(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    pub fn first_id(&self) -> Option<u32> {
        self.blocks.iter().find_map(|b| b.id_vec().first().copied())
    }

    pub fn last_id(&self) -> Option<u32> {
        self.blocks.last().and_then(|b| b.last_id())
    }

    fn block_index_for(&self, id: u32) -> usize {
        let found = self.blocks.partition_point(|b| b.last_id().map_or(false, |l| l < id));
        found.min(self.blocks.len() - 1)
    }

    pub fn contains(&self, id: u32) -> bool {
        let i = self.block_index_for(id);
        self.blocks[i].id_vec().binary_search(&id).is_ok()
    }

    pub fn offsets_of(&self, id: u32) -> Option<Vec<u32>> {
        let i = self.block_index_for(id);
        let ids = self.blocks[i].id_vec();
        ids.binary_search(&id).ok().map(|pos| self.blocks[i].offsets_at(pos))
    }

    pub fn entries(&self) -> Vec<Posting> {
        self.blocks.iter().flat_map(|b| b.entries()).collect()
    }

    pub fn upsert(&mut self, id: u32, offsets: Vec<u32>) {
        let i = self.block_index_for(id);
        let exists = self.blocks[i].id_vec().binary_search(&id).is_ok();
        let is_full = self.blocks[i].len() >= self.block_max_elements;

        if !is_full || exists {
            self.blocks[i].upsert(id, offsets);
            return;
        }

        let is_last_block = i == self.blocks.len() - 1;
        if is_last_block && self.blocks[i].last_id().map_or(true, |last| id > last) {
            let mut new_block = Block::new();
            new_block.upsert(id, offsets);
            self.blocks.push(new_block);
            return;
        }

        // Full, and the new id belongs inside this block's range: upsert
        // then split evenly in two, threading the new block into the chain.
        self.blocks[i].upsert(id, offsets);
        let entries = self.blocks[i].entries();
        let mid = entries.len() / 2;
        let mut left = Block::new();
        let mut right = Block::new();
        for e in &entries[..mid] {
            left.upsert(e.id, e.offsets.clone());
        }
        for e in &entries[mid..] {
            right.upsert(e.id, e.offsets.clone());
        }
        self.blocks[i] = left;
        self.blocks.insert(i + 1, right);
    }

    pub fn erase(&mut self, id: u32) {
        let i = self.block_index_for(id);
        if self.blocks[i].id_vec().binary_search(&id).is_err() {
            return;
        }
        self.blocks[i].erase(id);

        let half_capacity = self.block_max_elements / 2;
        if self.blocks[i].len() < half_capacity {
            if i + 1 < self.blocks.len() {
                let next_len = self.blocks[i + 1].len();
                if self.blocks[i].len() + next_len <= self.block_max_elements {
                    let next = self.blocks.remove(i + 1);
                    for e in next.entries() {
                        self.blocks[i].upsert(e.id, e.offsets);
                    }
                } else {
                    let move_count = (self.block_max_elements / 2).min(next_len);
                    let mut next_entries = self.blocks[i + 1].entries();
                    let moved: Vec<Posting> = next_entries.drain(0..move_count).collect();
                    for e in moved {
                        self.blocks[i].upsert(e.id, e.offsets);
                    }
                    let mut rebuilt = Block::new();
                    for e in next_entries {
                        rebuilt.upsert(e.id, e.offsets);
                    }
                    self.blocks[i + 1] = rebuilt;
                }
            }
        }

        if i != 0 && self.blocks[i].len() == 0 {
            self.blocks.remove(i);
        }

        // Root block is never physically dropped: if it emptied and a
        // successor exists, pull the successor's contents up into it.
        if self.blocks[0].len() == 0 && self.blocks.len() > 1 {
            let next = self.blocks.remove(1);
            self.blocks[0] = next;
        }
    }

    pub fn to_compact(&self) -> CompactList {
        let mut compact = CompactList::new();
        for e in self.entries() {
            compact.upsert(e.id, e.offsets);
        }
        compact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_block_once_past_max_elements() {
        let mut list = ChainedList::new(8);
        for id in 0..20u32 {
            list.upsert(id, vec![id]);
        }
        assert!(list.num_blocks() > 1);
        assert_eq!(list.num_ids(), 20);
        for id in 0..20u32 {
            assert!(list.contains(id));
        }
    }

    #[test]
    fn merges_adjacent_blocks_on_erase_below_half_capacity() {
        let mut list = ChainedList::new(8);
        for id in 0..20u32 {
            list.upsert(id, vec![id]);
        }
        let blocks_before = list.num_blocks();
        for id in 0..10u32 {
            list.erase(id);
        }
        assert!(list.num_blocks() <= blocks_before);
        assert_eq!(list.num_ids(), 10);
        for id in 10..20u32 {
            assert!(list.contains(id));
        }
    }

    #[test]
    fn root_block_survives_full_drain() {
        let mut list = ChainedList::new(4);
        for id in 0..12u32 {
            list.upsert(id, vec![id]);
        }
        for id in 0..12u32 {
            list.erase(id);
        }
        assert_eq!(list.num_blocks(), 1);
        assert_eq!(list.num_ids(), 0);
    }

    #[test]
    fn insert_past_last_block_max_appends_new_block() {
        let mut list = ChainedList::new(4);
        for id in 0..4u32 {
            list.upsert(id, vec![id]);
        }
        assert_eq!(list.num_blocks(), 1);
        list.upsert(100, vec![100]);
        assert_eq!(list.num_blocks(), 2);
        assert!(list.contains(100));
    }

    #[test]
    fn splits_full_block_when_new_id_belongs_inside_range() {
        let mut list = ChainedList::new(4);
        // Seed two widely-spaced blocks, each at capacity.
        for id in [0u32, 10, 20, 30] {
            list.upsert(id, vec![id]);
        }
        assert_eq!(list.num_blocks(), 1);
        // Force a second block to exist.
        list.upsert(1000, vec![1000]);
        assert_eq!(list.num_blocks(), 2);
        // Root block [0,10,20,30] is full and has a successor: inserting an
        // id that belongs inside its range must split it rather than
        // silently growing it past the cap.
        list.upsert(15, vec![15]);
        assert_eq!(list.num_blocks(), 3);
        for id in [0u32, 10, 15, 20, 30, 1000] {
            assert!(list.contains(id), "missing id {id}");
        }
        assert_eq!(list.num_ids(), 6);
    }
}
