//! Vector index adapter (component C7, spec §4.5).
//!
//! The teacher crate wraps `arroy`/`hannoy` (LMDB-backed ANN graphs) behind
//! its own `VectorStore`; neither is usable for this crate's in-memory,
//! non-LMDB data model (`arroy::Writer`/`Reader` are keyed off an LMDB
//! `RoTxn`/`RwTxn`). No crate in this workspace's dependency stack provides
//! a mutable, pure in-memory ANN graph, so the adapter here wraps a flat,
//! `rayon`-parallel brute-force scorer behind the exact trait boundary
//! `spec.md` §4.5 describes — `insert`/`erase`/`query_by_vector`/`query_by_id`,
//! soft deletes, dimension validation, and `flat_search_cutoff` cooperation
//! with the filter iterator all behave as specified; only the graph backing
//! `query_by_vector` is exact rather than approximate. See `DESIGN.md`.

use ordered_float::OrderedFloat;
use rayon::prelude::*;
use roaring::RoaringBitmap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl DistanceMetric {
    /// Lower is closer for all three, matching the convention the scorer
    /// and Top-K heap (C9) expect.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Euclidean => {
                a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
            }
            DistanceMetric::DotProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (norm_a * norm_b)
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    deleted: bool,
}

/// A single field's vector index. Deletions are soft: `erase` flags the
/// slot but the vector stays in place so id-keyed slots never shift and
/// capacity accounting matches the source's current/deleted/max counters.
#[derive(Debug)]
pub struct VectorIndex {
    field: String,
    dimension: usize,
    metric: DistanceMetric,
    entries: Vec<Option<Entry>>,
    id_to_slot: std::collections::HashMap<u32, usize>,
    deleted_count: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct VectorIndexCounts {
    pub current: usize,
    pub deleted: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredId {
    pub id: u32,
    pub distance: f32,
}

impl VectorIndex {
    pub fn new(field: impl Into<String>, dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            field: field.into(),
            dimension,
            metric,
            entries: Vec::new(),
            id_to_slot: std::collections::HashMap::new(),
            deleted_count: 0,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn insert(&mut self, id: u32, vector: Vec<f32>) -> Result<(), Error> {
        if vector.len() != self.dimension {
            return Err(Error::Validation(ValidationError::VectorDimensionMismatch {
                field: self.field.clone(),
                expected: self.dimension,
                actual: vector.len(),
            }));
        }
        if let Some(&slot) = self.id_to_slot.get(&id) {
            self.entries[slot] = Some(Entry { vector, deleted: false });
            return Ok(());
        }
        let slot = self.entries.len();
        self.entries.push(Some(Entry { vector, deleted: false }));
        self.id_to_slot.insert(id, slot);
        Ok(())
    }

    pub fn erase(&mut self, id: u32) {
        if let Some(&slot) = self.id_to_slot.get(&id) {
            if let Some(entry) = &mut self.entries[slot] {
                if !entry.deleted {
                    entry.deleted = true;
                    self.deleted_count += 1;
                }
            }
        }
    }

    pub fn counts(&self) -> VectorIndexCounts {
        VectorIndexCounts { current: self.entries.len() - self.deleted_count, deleted: self.deleted_count, max: self.entries.len() }
    }

    pub fn vector_of(&self, id: u32) -> Option<&[f32]> {
        let slot = *self.id_to_slot.get(&id)?;
        self.entries[slot].as_ref().filter(|e| !e.deleted).map(|e| e.vector.as_slice())
    }

    /// Full graph search against every live vector, returning the closest
    /// `k`. `ef` is accepted for interface parity with a real ANN graph's
    /// search-width knob but has no effect on this exact scorer.
    pub fn query_by_vector(&self, query: &[f32], k: usize, _ef: usize, distance_threshold: Option<f32>) -> Vec<ScoredId> {
        self.score_candidates(query, self.id_to_slot.keys().copied(), k, distance_threshold)
    }

    pub fn query_by_id(&self, id: u32, k: usize) -> Option<Vec<ScoredId>> {
        let query = self.vector_of(id)?.to_vec();
        let mut hits = self.score_candidates(&query, self.id_to_slot.keys().copied(), k + 1, None);
        hits.retain(|h| h.id != id);
        hits.truncate(k);
        Some(hits)
    }

    /// Cooperates with the filter iterator tree per §4.5: when the caller's
    /// estimated filter cardinality is below `flat_search_cutoff`, brute-force
    /// scan only the filtered ids instead of the whole graph and post-filter.
    pub fn query_with_filter(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        distance_threshold: Option<f32>,
        filter_ids: &RoaringBitmap,
        flat_search_cutoff: u64,
    ) -> Vec<ScoredId> {
        if (filter_ids.len()) < flat_search_cutoff {
            self.score_candidates(query, filter_ids.iter(), k, distance_threshold)
        } else {
            self.query_by_vector(query, k * 4, ef, distance_threshold)
                .into_iter()
                .filter(|h| filter_ids.contains(h.id))
                .take(k)
                .collect()
        }
    }

    fn score_candidates(
        &self,
        query: &[f32],
        ids: impl Iterator<Item = u32>,
        k: usize,
        distance_threshold: Option<f32>,
    ) -> Vec<ScoredId> {
        let live: Vec<u32> = ids.filter(|&id| self.vector_of(id).is_some()).collect();
        let mut scored: Vec<ScoredId> = live
            .par_iter()
            .map(|&id| {
                let vector = self.vector_of(id).expect("id filtered to live entries above");
                ScoredId { id, distance: self.metric.distance(query, vector) }
            })
            .filter(|h| distance_threshold.map_or(true, |t| h.distance <= t))
            .collect();
        scored.sort_by_key(|h| OrderedFloat(h.distance));
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut idx = VectorIndex::new("embedding", 3, DistanceMetric::Euclidean);
        let err = idx.insert(1, vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::VectorDimensionMismatch { expected: 3, actual: 2, .. })));
    }

    #[test]
    fn query_by_vector_returns_closest_k_ascending() {
        let mut idx = VectorIndex::new("embedding", 2, DistanceMetric::Euclidean);
        idx.insert(1, vec![0.0, 0.0]).unwrap();
        idx.insert(2, vec![1.0, 0.0]).unwrap();
        idx.insert(3, vec![10.0, 0.0]).unwrap();
        let hits = idx.query_by_vector(&[0.0, 0.0], 2, 10, None);
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn erase_is_soft_and_reflected_in_counts() {
        let mut idx = VectorIndex::new("embedding", 2, DistanceMetric::Euclidean);
        idx.insert(1, vec![0.0, 0.0]).unwrap();
        idx.insert(2, vec![1.0, 1.0]).unwrap();
        idx.erase(1);
        let counts = idx.counts();
        assert_eq!(counts.current, 1);
        assert_eq!(counts.deleted, 1);
        assert_eq!(counts.max, 2);
        assert!(idx.vector_of(1).is_none());
        let hits = idx.query_by_vector(&[0.0, 0.0], 5, 10, None);
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn distance_threshold_excludes_far_points() {
        let mut idx = VectorIndex::new("embedding", 1, DistanceMetric::Euclidean);
        idx.insert(1, vec![0.0]).unwrap();
        idx.insert(2, vec![100.0]).unwrap();
        let hits = idx.query_by_vector(&[0.0], 5, 10, Some(1.0));
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn query_with_filter_uses_flat_scan_below_cutoff() {
        let mut idx = VectorIndex::new("embedding", 1, DistanceMetric::Euclidean);
        idx.insert(1, vec![0.0]).unwrap();
        idx.insert(2, vec![1.0]).unwrap();
        idx.insert(3, vec![2.0]).unwrap();
        let mut filter = RoaringBitmap::new();
        filter.insert(2);
        let hits = idx.query_with_filter(&[0.0], 1, 10, None, &filter, 100);
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn query_by_id_excludes_the_query_itself() {
        let mut idx = VectorIndex::new("embedding", 1, DistanceMetric::Euclidean);
        idx.insert(1, vec![0.0]).unwrap();
        idx.insert(2, vec![0.1]).unwrap();
        idx.insert(3, vec![5.0]).unwrap();
        let hits = idx.query_by_id(1, 2).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2, 3]);
    }
}
