//! Tunable thresholds. Spec §9 leaves several constants ("`BLOCK_MAX_ELEMENTS`,
//! `DROP_TOKENS_THRESHOLD`, `TYPO_TOKENS_THRESHOLD`, `COMBINATION_LIMIT`, and
//! the `0.5 x total_docs` facet-fallback trigger") as implementer-chosen
//! tunables. We resolve that open question by exposing them here instead of
//! hard-coding them at each call site, with defaults matching §9 exactly.

/// Engine-wide tunables threaded through the posting list, facet index, and
/// search orchestrator. Not a config *file* format — CLI/env parsing is out
/// of scope per spec.md §1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Maximum ids per block in a block-chained posting list.
    pub block_max_elements: usize,
    /// Logical length at or below which a posting list stays in compact
    /// (flat-buffer) form.
    pub compact_posting_threshold: usize,
    /// Number of rarest tokens dropped, one at a time, while a search
    /// returns fewer than this many hits.
    pub drop_tokens_threshold: usize,
    /// Typo-combination budget beyond which further combinations are
    /// skipped once enough hits have accumulated.
    pub typo_tokens_threshold: usize,
    /// Cross-product bound on the number of per-token fuzzy-candidate
    /// combinations evaluated per query.
    pub combination_limit: usize,
    /// `distinct_values / total_docs` ratio above which a facet field falls
    /// back to hash-only (high cardinality) counting.
    pub facet_high_cardinality_ratio: f64,
    /// Absolute floor on `total_docs` before the high-cardinality ratio
    /// check engages at all.
    pub facet_high_cardinality_min_docs: usize,
    /// Default reciprocal-rank-fusion weight given to the text score when
    /// both a text and a vector query are present (spec §4.8 step 6).
    pub default_hybrid_alpha: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_max_elements: 256,
            compact_posting_threshold: 64,
            drop_tokens_threshold: 1,
            typo_tokens_threshold: 1,
            combination_limit: 10,
            facet_high_cardinality_ratio: 0.5,
            facet_high_cardinality_min_docs: 10_000,
            default_hybrid_alpha: 0.3,
        }
    }
}
