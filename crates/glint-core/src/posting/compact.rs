//! Compact posting list representation (spec §4.2): used while a token's
//! total logical length stays at or below the compact/chained threshold.
//! Backed by a single flat buffer shaped `[num_offsets, off0..offn-1, id]`
//! repeated in ascending id order, matching the source's
//! `compact_posting_list_t::id_offsets` layout.

use super::block::ChainedList;
use super::Posting;

#[derive(Debug, Clone, Default)]
pub struct CompactList {
    /// `[num_offsets, off_0, .., off_{n-1}, id]` repeated per entry,
    /// ascending by id. Growth is handled by `Vec`'s own amortized
    /// doubling; we additionally `reserve` in 1.3x steps on overflow to
    /// mirror the source's stated growth factor.
    buf: Vec<u32>,
    num_entries: usize,
}

struct EntryRef {
    start: usize,
    num_offsets: usize,
    id: u32,
}

impl CompactList {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries_meta(&self) -> Vec<EntryRef> {
        let mut out = Vec::with_capacity(self.num_entries);
        let mut i = 0;
        while i < self.buf.len() {
            let num_offsets = self.buf[i] as usize;
            let id = self.buf[i + 1 + num_offsets];
            out.push(EntryRef { start: i, num_offsets, id });
            i += 2 + num_offsets;
        }
        out
    }

    pub fn num_ids(&self) -> usize {
        self.num_entries
    }

    pub fn first_id(&self) -> Option<u32> {
        if self.buf.is_empty() {
            return None;
        }
        let num_offsets = self.buf[0] as usize;
        Some(self.buf[1 + num_offsets])
    }

    pub fn last_id(&self) -> Option<u32> {
        self.entries_meta().last().map(|e| e.id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries_meta().iter().any(|e| e.id == id)
    }

    pub fn offsets_of(&self, id: u32) -> Option<Vec<u32>> {
        self.entries_meta()
            .iter()
            .find(|e| e.id == id)
            .map(|e| self.buf[e.start + 1..e.start + 1 + e.num_offsets].to_vec())
    }

    pub fn entries(&self) -> Vec<Posting> {
        self.entries_meta()
            .iter()
            .map(|e| Posting { id: e.id, offsets: self.buf[e.start + 1..e.start + 1 + e.num_offsets].to_vec() })
            .collect()
    }

    /// Upserts `id` in-place with a memmove-equivalent splice; erase
    /// collapses the gap the same way.
    pub fn upsert(&mut self, id: u32, offsets: Vec<u32>) {
        let metas = self.entries_meta();
        let pos = metas.iter().position(|e| e.id >= id);
        match pos {
            Some(i) if metas[i].id == id => {
                let e = &metas[i];
                let old_len = 2 + e.num_offsets;
                let new_len = 2 + offsets.len();
                let mut new_entry = Vec::with_capacity(new_len);
                new_entry.push(offsets.len() as u32);
                new_entry.extend_from_slice(&offsets);
                new_entry.push(id);
                self.buf.splice(e.start..e.start + old_len, new_entry);
            }
            Some(i) => {
                let insert_at = metas[i].start;
                self.insert_entry(insert_at, id, &offsets);
                self.num_entries += 1;
            }
            None => {
                let insert_at = self.buf.len();
                self.insert_entry(insert_at, id, &offsets);
                self.num_entries += 1;
            }
        }
    }

    fn insert_entry(&mut self, at: usize, id: u32, offsets: &[u32]) {
        if self.buf.capacity() < self.buf.len() + 2 + offsets.len() {
            let grown = ((self.buf.capacity() as f32 * 1.3) as usize).max(self.buf.len() + 2 + offsets.len());
            self.buf.reserve(grown.saturating_sub(self.buf.len()));
        }
        let mut entry = Vec::with_capacity(2 + offsets.len());
        entry.push(offsets.len() as u32);
        entry.extend_from_slice(offsets);
        entry.push(id);
        for (i, v) in entry.into_iter().enumerate() {
            self.buf.insert(at + i, v);
        }
    }

    pub fn erase(&mut self, id: u32) {
        if let Some(e) = self.entries_meta().into_iter().find(|e| e.id == id) {
            let len = 2 + e.num_offsets;
            self.buf.drain(e.start..e.start + len);
            self.num_entries -= 1;
        }
    }

    pub fn to_chained(&self, block_max_elements: usize) -> ChainedList {
        let mut chained = ChainedList::new(block_max_elements);
        for e in self.entries() {
            chained.upsert(e.id, e.offsets);
        }
        chained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_ascending_order() {
        let mut list = CompactList::new();
        list.upsert(5, vec![1]);
        list.upsert(1, vec![0]);
        list.upsert(9, vec![2]);
        let ids: Vec<u32> = list.entries().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 5, 9]);
    }

    #[test]
    fn upsert_overwrites_existing_offsets() {
        let mut list = CompactList::new();
        list.upsert(5, vec![1]);
        list.upsert(5, vec![1, 2, 3]);
        assert_eq!(list.offsets_of(5), Some(vec![1, 2, 3]));
        assert_eq!(list.num_ids(), 1);
    }

    #[test]
    fn erase_collapses_gap() {
        let mut list = CompactList::new();
        for id in [1, 2, 3] {
            list.upsert(id, vec![id]);
        }
        list.erase(2);
        assert_eq!(list.entries().into_iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(list.num_ids(), 2);
    }
}
