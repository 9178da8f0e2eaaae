//! Facet index (component C5): per-field `value -> doc ids` map with a
//! counter list kept in descending-count order and high-cardinality
//! fallback (spec §4.4).
//!
//! The source keeps the counter list as an explicit doubly-linked list plus
//! a side `count -> iterator` map so a count bump can relocate a node in
//! O(1) amortized. A `BTreeSet<(Reverse(count), value)>` gives the same
//! "always sorted, descending count, value tie-break" invariant without
//! hand-rolled intrusive list pointers, while keeping insert/remove at
//! O(log n) — the same complexity class the source's map-assisted splice
//! achieves, expressed the way `milli`'s facet distribution code reaches
//! for `BTreeMap`/`BTreeSet` rather than a manual linked list.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use roaring::RoaringBitmap;

use crate::config::EngineConfig;

#[derive(Debug, Clone)]
struct FacetValueEntry {
    facet_id: u32,
    doc_ids: RoaringBitmap,
}

#[derive(Debug)]
pub struct FacetIndex {
    values: HashMap<String, FacetValueEntry>,
    /// `(Reverse(count), value)` — iterating this set front-to-back yields
    /// the counter list in descending-count, value-tie-break order.
    counter_order: BTreeSet<(Reverse<u32>, String)>,
    next_facet_id: u32,
    total_docs: RoaringBitmap,
    high_cardinality: bool,
    /// Hash-only counts retained once high-cardinality fallback engages;
    /// the per-value id lists above are cleared when this is `Some`.
    fallback_counts: Option<HashMap<String, u32>>,
}

impl FacetIndex {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            counter_order: BTreeSet::new(),
            next_facet_id: 0,
            total_docs: RoaringBitmap::new(),
            high_cardinality: false,
            fallback_counts: None,
        }
    }

    pub fn is_high_cardinality(&self) -> bool {
        self.high_cardinality
    }

    pub fn insert(&mut self, id: u32, value: &str, config: &EngineConfig) {
        self.total_docs.insert(id);

        if let Some(counts) = &mut self.fallback_counts {
            *counts.entry(value.to_string()).or_insert(0) += 1;
            return;
        }

        match self.values.get_mut(value) {
            Some(entry) => {
                let old_count = entry.doc_ids.len() as u32;
                entry.doc_ids.insert(id);
                self.counter_order.remove(&(Reverse(old_count), value.to_string()));
                self.counter_order.insert((Reverse(old_count + 1), value.to_string()));
            }
            None => {
                let facet_id = self.next_facet_id;
                self.next_facet_id += 1;
                let mut doc_ids = RoaringBitmap::new();
                doc_ids.insert(id);
                self.values.insert(value.to_string(), FacetValueEntry { facet_id, doc_ids });
                self.counter_order.insert((Reverse(1), value.to_string()));
            }
        }

        self.reindex_if_needed(config);
    }

    pub fn delete(&mut self, id: u32, value: &str) {
        self.total_docs.remove(id);

        if let Some(counts) = &mut self.fallback_counts {
            if let Some(count) = counts.get_mut(value) {
                *count -= 1;
                if *count == 0 {
                    counts.remove(value);
                }
            }
            return;
        }

        if let Some(entry) = self.values.get_mut(value) {
            let old_count = entry.doc_ids.len() as u32;
            entry.doc_ids.remove(id);
            let new_count = entry.doc_ids.len() as u32;
            self.counter_order.remove(&(Reverse(old_count), value.to_string()));
            if new_count == 0 {
                self.values.remove(value);
            } else {
                self.counter_order.insert((Reverse(new_count), value.to_string()));
            }
        }
    }

    /// Re-runs the `distinct_values > ratio * total_docs` check after every
    /// insert batch, matching the original's per-batch `check_for_high_cardinality`
    /// rather than a query-time-only approximation (SPEC_FULL §C.4).
    pub fn reindex_if_needed(&mut self, config: &EngineConfig) {
        if self.high_cardinality {
            return;
        }
        let total_docs = self.total_docs.len();
        if total_docs < config.facet_high_cardinality_min_docs as u64 {
            return;
        }
        let distinct = self.values.len() as u64;
        if (distinct as f64) > config.facet_high_cardinality_ratio * total_docs as f64 {
            self.high_cardinality = true;
            let mut counts = HashMap::with_capacity(self.values.len());
            for (value, entry) in self.values.drain() {
                counts.insert(value, entry.doc_ids.len() as u32);
            }
            self.counter_order.clear();
            self.fallback_counts = Some(counts);
        }
    }

    /// The live id set carrying `value`, or empty if absent or if the
    /// high-cardinality fallback has dropped per-value id tracking. Used by
    /// the filter compiler to turn a facet-field equality condition directly
    /// into a materialized leaf (SPEC_FULL §C.1).
    pub fn ids_of(&self, value: &str) -> RoaringBitmap {
        if self.fallback_counts.is_some() {
            return RoaringBitmap::new();
        }
        self.values.get(value).map(|e| e.doc_ids.clone()).unwrap_or_default()
    }

    /// Number of live docs carrying `value`, or `None` if the value is
    /// absent (SPEC_FULL §C.1, `facet_val_num_ids`).
    pub fn value_doc_count(&self, value: &str) -> Option<u32> {
        if let Some(counts) = &self.fallback_counts {
            return counts.get(value).copied();
        }
        self.values.get(value).map(|e| e.doc_ids.len() as u32)
    }

    /// 0-based rank of `value` within the descending counter list, or
    /// `None` if absent or if the fallback has dropped per-value tracking
    /// (SPEC_FULL §C.1, `facet_node_count`).
    pub fn counter_rank(&self, value: &str) -> Option<usize> {
        let entry = self.values.get(value)?;
        let count = entry.doc_ids.len() as u32;
        Some(self.counter_order.range(..(Reverse(count), value.to_string())).count())
    }

    /// Top-K `(value, count)` pairs, honoring §4.4's intersection rule: a
    /// `None` filter (wildcard) reports the counter list directly; a `Some`
    /// filter walks the counter list computing `|value.ids & filter_ids|`,
    /// stopping once `k` non-zero values are emitted or `2k` are examined.
    pub fn top_k(&self, k: usize, filter_ids: Option<&RoaringBitmap>) -> Vec<(String, u32)> {
        if self.fallback_counts.is_some() {
            // High-cardinality fallback: exact-count-only response, no
            // intersection against a filter is possible without id lists.
            let counts = self.fallback_counts.as_ref().unwrap();
            let mut out: Vec<(String, u32)> = counts.iter().map(|(v, &c)| (v.clone(), c)).collect();
            out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            out.truncate(k);
            return out;
        }

        let Some(filter_ids) = filter_ids else {
            return self
                .counter_order
                .iter()
                .take(k)
                .map(|(Reverse(count), value)| (value.clone(), *count))
                .collect();
        };

        let mut out = Vec::with_capacity(k);
        let mut examined = 0usize;
        for (_, value) in self.counter_order.iter() {
            if out.len() >= k || examined >= 2 * k {
                break;
            }
            examined += 1;
            let entry = &self.values[value];
            let overlap = (&entry.doc_ids & filter_ids).len() as u32;
            if overlap > 0 {
                out.push((value.clone(), overlap));
            }
        }
        out
    }

    pub fn total_docs(&self) -> u64 {
        self.total_docs.len()
    }
}

impl Default for FacetIndex {
    fn default() -> Self {
        Self::new()
    }
}
