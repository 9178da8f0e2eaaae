//! Search orchestrator (component C10, spec §4.8): ties the filter tree
//! (C8), posting lists (C2), string trie (C6), vector adapter (C7), facet
//! index (C5), Top-K heap (C9), and curation engine (C11) into one ranked
//! query. Grounded on `milli::search::hybrid`'s ratio-weighted fusion of a
//! keyword result set against a vector result set, and on its
//! `Search`/`SearchResult` request/response split.

mod filter_compile;

use std::collections::HashMap;

use geoutils::Location;
use glint_filter_parser::parse_filter;
use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;

use crate::collection::Collection;
use crate::curation::CurationEngine;
use crate::error::{Error, ValidationError};
use crate::posting::{intersect, phrase_match, DocTokenOffsets, PostingList};
use crate::registry::CollectionManager;
use crate::schema::FieldType;
use crate::string::{tokenize, typo_budget};
use crate::synonyms::{remove_stop_words, SynonymTable};
use crate::topk::{Candidate, ScoreKey, TopKHeap};
use crate::vector::ScoredId;

pub use filter_compile::compile_filter;

/// How the query vector for a hybrid/vector-only search is obtained (spec
/// §4.8 step 6). Auto-embedding from query text requires an embedding-model
/// runtime, which spec.md §1 explicitly places out of scope, so it is not a
/// variant here.
#[derive(Debug, Clone)]
pub enum VectorSource {
    Explicit(Vec<f32>),
    FromDocument(u32),
}

#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub field: String,
    pub source: VectorSource,
    pub k: usize,
    pub ef: usize,
    pub alpha: Option<f32>,
    pub distance_threshold: Option<f32>,
    pub flat_search_cutoff: u64,
}

#[derive(Debug, Clone, Copy)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A sort-by expression (spec §4.7/§6). Up to 3 of these compose
/// lexicographically into a [`ScoreKey`]; a request may name up to 4, but
/// the 4th is dropped (with a warning) since the composite key carries only
/// `primary`/`secondary`/`tertiary`.
#[derive(Debug, Clone)]
pub enum SortExpr {
    Field { name: String, direction: SortDirection },
    Relevance,
    /// `loc(lat,lng)`: distance-based sort. Docs within `exclude_radius`
    /// meters tie at distance zero; `precision` rounds distance down to the
    /// nearest multiple of itself so near-equidistant docs tie too.
    Geo { field: String, lat: f64, lng: f64, direction: SortDirection, exclude_radius: Option<f64>, precision: Option<f64> },
    /// Quantizes the text-match score into coarse buckets so near-equal
    /// relevance ties and falls through to the next sort expression.
    TextMatchBuckets { buckets: u32, direction: SortDirection },
    /// Sorts matching docs first (or last, depending on direction).
    Eval { filter: String, direction: SortDirection },
    /// Deterministic hash-seeded pseudo-random order, for shuffled result
    /// pages that stay stable across repeated queries with the same seed.
    Random { seed: u64, direction: SortDirection },
}

pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub query_by: Vec<String>,
    pub filter_by: Option<&'a str>,
    pub sort_by: Vec<SortExpr>,
    pub num_typos: u8,
    pub per_page: usize,
    pub page: usize,
    pub drop_tokens_threshold: usize,
    pub vector_query: Option<VectorQuery>,
    pub prioritize_exact_match: bool,
    pub facet_by: Vec<String>,
    pub facet_limit: usize,
    pub hidden_hits: Vec<u32>,
    pub pinned_hits: Vec<(u32, usize)>,
}

impl<'a> Default for SearchRequest<'a> {
    fn default() -> Self {
        Self {
            query: "*",
            query_by: Vec::new(),
            filter_by: None,
            sort_by: Vec::new(),
            num_typos: 1,
            per_page: 10,
            page: 1,
            drop_tokens_threshold: 1,
            vector_query: None,
            prioritize_exact_match: true,
            facet_by: Vec::new(),
            facet_limit: 10,
            hidden_hits: Vec::new(),
            pinned_hits: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub seq_id: u32,
    pub text_score: f64,
    pub vector_distance: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub found: usize,
    pub facet_counts: HashMap<String, Vec<(String, u32)>>,
    pub timed_out: bool,
}

/// Weights combined into [`ScoreKey::primary`] for a single text match
/// (spec §4.8 step 4's component list). Not specified numerically by
/// spec.md; chosen so exact-match and field priority dominate typo cost,
/// matching the qualitative ordering §4.8 describes. See `DESIGN.md`.
fn text_match_score(
    token_count: usize,
    min_inter_token_gap: u32,
    is_exact: bool,
    field_priority_rank: usize,
    typo_cost: u32,
    prioritize_exact_match: bool,
) -> f64 {
    let exact_weight = if prioritize_exact_match { 1000.0 } else { 200.0 };
    let exact_bonus = if is_exact { exact_weight } else { 0.0 };
    let field_bonus = 50.0 / (field_priority_rank as f64 + 1.0);
    let proximity_penalty = min_inter_token_gap as f64;
    let typo_penalty = typo_cost as f64 * 10.0;
    (token_count as f64) * 100.0 + exact_bonus + field_bonus - proximity_penalty - typo_penalty
}

fn min_inter_token_gap(doc: &DocTokenOffsets) -> u32 {
    if doc.per_token.len() < 2 {
        return 0;
    }
    let mut total = 0u32;
    for pair in doc.per_token.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let best = a
            .iter()
            .flat_map(|&x| b.iter().map(move |&y| (x as i64 - y as i64).unsigned_abs() as u32))
            .min()
            .unwrap_or(u32::MAX / 2);
        total = total.saturating_add(best);
    }
    total
}

pub struct SearchOrchestrator<'a> {
    collection: &'a Collection,
    synonyms: Option<&'a SynonymTable>,
    curation: Option<&'a CurationEngine>,
    registry: Option<&'a CollectionManager>,
}

impl<'a> SearchOrchestrator<'a> {
    pub fn new(collection: &'a Collection) -> Self {
        Self { collection, synonyms: None, curation: None, registry: None }
    }

    pub fn with_synonyms(mut self, table: &'a SynonymTable) -> Self {
        self.synonyms = Some(table);
        self
    }

    pub fn with_curation(mut self, engine: &'a CurationEngine) -> Self {
        self.curation = Some(engine);
        self
    }

    /// Supplies the multi-collection registry reference filters (spec §4.6,
    /// `$Collection(inner_filter)`) resolve sub-filters against.
    pub fn with_registry(mut self, registry: &'a CollectionManager) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn search(&self, request: &SearchRequest, now: i64) -> Result<SearchResponse, Error> {
        let filter_ids = match request.filter_by {
            Some(expr) => {
                let ast = parse_filter(expr).map_err(|e| Error::Validation(ValidationError::MalformedFilter(e.to_string())))?;
                let iter = compile_filter(&ast, self.collection, self.registry)?;
                Some(crate::filter::collect_ids(iter))
            }
            None => None,
        };

        let curation_effect = self.curation.map(|c| c.resolve(request.query, now)).unwrap_or_default();
        let effective_query = curation_effect.replace_query.as_deref().unwrap_or(request.query);

        let mut text_hits: Vec<(u32, f64)> = Vec::new();
        let is_wildcard = effective_query.trim() == "*" || effective_query.trim().is_empty();
        if !is_wildcard {
            text_hits = self.run_text_search(effective_query, request, filter_ids.as_ref())?;
        }

        let universe = filter_ids.clone().unwrap_or_else(|| self.collection.all_ids());

        let merged = self.fuse(request, &universe, text_hits, is_wildcard)?;

        let mut ranked: Vec<(u32, f64, Option<f32>)> = merged;
        self.apply_sort(request, &mut ranked)?;
        apply_pinned_hits(&request.pinned_hits, &mut ranked);

        let mut ordered_ids: Vec<String> = ranked.iter().map(|(id, _, _)| self.collection.key_of(*id)).collect();
        ordered_ids = self.curation.map(|c| c.apply(&curation_effect, ordered_ids.clone())).unwrap_or(ordered_ids);

        let by_key: HashMap<String, (u32, f64, Option<f32>)> =
            ranked.iter().map(|&(id, score, dist)| (self.collection.key_of(id), (id, score, dist))).collect();
        let hidden: std::collections::HashSet<u32> = request.hidden_hits.iter().copied().collect();

        let hits: Vec<SearchHit> = ordered_ids
            .into_iter()
            .filter_map(|key| by_key.get(&key).copied().or_else(|| key.parse::<u32>().ok().map(|id| (id, 0.0, None))))
            .filter(|(id, _, _)| !hidden.contains(id))
            .map(|(seq_id, text_score, vector_distance)| SearchHit { seq_id, text_score, vector_distance })
            .collect();

        let found = hits.len();
        let page_start = request.page.saturating_sub(1) * request.per_page;
        let page_hits: Vec<SearchHit> = hits.into_iter().skip(page_start).take(request.per_page).collect();

        let hit_ids: RoaringBitmap = page_hits.iter().map(|h| h.seq_id).collect();
        let mut facet_counts = HashMap::new();
        for field in &request.facet_by {
            if let Some(facet) = self.collection.facet_field(field) {
                facet_counts.insert(field.clone(), facet.top_k(request.facet_limit, Some(&hit_ids)));
            }
        }

        Ok(SearchResponse { hits: page_hits, found, facet_counts, timed_out: false })
    }

    /// Runs the fuzzy/typo-tolerant text pipeline (spec §4.8 steps 1-5),
    /// including the rare-token drop-and-retry fallback.
    fn run_text_search(
        &self,
        query: &str,
        request: &SearchRequest,
        filter_ids: Option<&RoaringBitmap>,
    ) -> Result<Vec<(u32, f64)>, Error> {
        let (after_phrases, phrases) = split_phrase_markers(query);
        let (plain, exclude_words) = split_exclude_markers(&after_phrases);

        let mut tokens: Vec<String> = tokenize(&plain).into_iter().map(|t| t.text).collect();
        let locale = request
            .query_by
            .first()
            .and_then(|f| self.collection.schema.field(f))
            .and_then(|f| f.locale.as_deref());
        tokens = remove_stop_words(tokens, locale);
        if tokens.is_empty() && phrases.is_empty() {
            return Ok(Vec::new());
        }

        let exclude_ids = self.excluded_doc_ids(&exclude_words, request);

        loop {
            let mut heap: TopKHeap<()> = TopKHeap::new(request.per_page.max(1) * request.page.max(1) * 4 + 100);
            let groups: Vec<Vec<String>> = if tokens.is_empty() {
                Vec::new()
            } else {
                self.synonyms.map(|s| s.expand(&tokens)).unwrap_or_else(|| vec![tokens.clone()])
            };

            for group in &groups {
                self.score_subquery(group, request, filter_ids, exclude_ids.as_ref(), &mut heap);
            }
            for phrase in &phrases {
                self.score_phrase(phrase, request, filter_ids, exclude_ids.as_ref(), &mut heap);
            }

            let hits: Vec<(u32, f64)> =
                heap.into_sorted_vec().into_iter().map(|c: Candidate<()>| (c.seq_id, c.score.primary.0)).collect();

            if hits.len() >= request.drop_tokens_threshold || tokens.len() <= 1 {
                return Ok(hits);
            }

            let rarest = self.rarest_token(&tokens, request, filter_ids);
            if let Some(idx) = rarest {
                tokens.remove(idx);
            } else {
                return Ok(hits);
            }
        }
    }

    /// Picks the token to drop next in the rare-token fallback (spec §4.8
    /// step 5). A token whose posting list has no overlap at all with the
    /// current filter universe (checked via
    /// [`PostingList::contains_any`](crate::posting::PostingList::contains_any))
    /// contributes nothing under the active filter and is dropped first;
    /// otherwise the shortest posting list breaks the tie.
    fn rarest_token(&self, tokens: &[String], request: &SearchRequest, filter_ids: Option<&RoaringBitmap>) -> Option<usize> {
        let universe: Vec<u32> = filter_ids.map(|f| f.iter().collect()).unwrap_or_default();
        let mut best: Option<(usize, usize)> = None;
        for (idx, token) in tokens.iter().enumerate() {
            let mut min_len = usize::MAX;
            for field in &request.query_by {
                if let Some(index) = self.collection.string_field(field) {
                    if let Some(list) = index.postings.get(token) {
                        if filter_ids.is_some() && !list.contains_any(&universe) {
                            min_len = 0;
                            continue;
                        }
                        min_len = min_len.min(list.num_ids());
                    }
                }
            }
            if best.map_or(true, |(_, b)| min_len < b) {
                best = Some((idx, min_len));
            }
        }
        best.map(|(idx, _)| idx)
    }

    fn score_subquery(
        &self,
        tokens: &[String],
        request: &SearchRequest,
        filter_ids: Option<&RoaringBitmap>,
        exclude_ids: Option<&RoaringBitmap>,
        heap: &mut TopKHeap<()>,
    ) {
        for (priority, field_name) in request.query_by.iter().enumerate() {
            let Some(index) = self.collection.string_field(field_name) else { continue };
            let is_array = self.collection.schema.field(field_name).map(|f| f.field_type.is_array()).unwrap_or(false);

            let per_token_candidates: Vec<Vec<(String, u8)>> = tokens
                .iter()
                .map(|t| {
                    let budget = typo_budget(t.chars().count(), request.num_typos);
                    index.trie.fuzzy_search(t, budget)
                })
                .collect();
            if per_token_candidates.iter().any(|c| c.is_empty()) {
                continue;
            }

            let combos = bounded_cartesian_product(&per_token_candidates, request_combination_limit(self.collection, request));
            for combo in combos {
                let lists: Vec<&PostingList> = match combo.iter().map(|(w, _)| index.postings.get(w)).collect::<Option<Vec<_>>>() {
                    Some(l) => l,
                    None => continue,
                };
                let ids = intersect(&lists);
                let ids: Vec<u32> = ids
                    .into_iter()
                    .filter(|id| filter_ids.map_or(true, |f| f.contains(*id)))
                    .filter(|id| !exclude_ids.map_or(false, |e| e.contains(*id)))
                    .collect();
                let typo_cost: u32 = combo.iter().map(|(_, d)| *d as u32).sum();

                for id in ids {
                    let owned: Vec<Vec<u32>> = lists.iter().map(|l| l.offsets_of(id).unwrap_or_default()).collect();
                    let slices: Vec<&[u32]> = owned.iter().map(|v| v.as_slice()).collect();
                    let doc = DocTokenOffsets { per_token: slices, field_is_array: is_array };
                    let is_exact = crate::posting::exact_match(&doc);
                    let gap = min_inter_token_gap(&doc);
                    let score = text_match_score(tokens.len(), gap, is_exact, priority, typo_cost, request.prioritize_exact_match);
                    heap.push(Candidate {
                        seq_id: id,
                        score: ScoreKey { primary: OrderedFloat(score), secondary: OrderedFloat(0.0), tertiary: OrderedFloat(0.0) },
                        payload: (),
                    });
                }
            }
        }
    }

    /// Scores a `"quoted phrase"` subquery (spec §4.8 step 1): literal,
    /// untyped token lookups per field, kept only when
    /// [`phrase_match`](crate::posting::phrase_match) confirms the tokens
    /// occur at consecutive positions.
    fn score_phrase(
        &self,
        phrase_tokens: &[String],
        request: &SearchRequest,
        filter_ids: Option<&RoaringBitmap>,
        exclude_ids: Option<&RoaringBitmap>,
        heap: &mut TopKHeap<()>,
    ) {
        if phrase_tokens.is_empty() {
            return;
        }
        for (priority, field_name) in request.query_by.iter().enumerate() {
            let Some(index) = self.collection.string_field(field_name) else { continue };
            let is_array = self.collection.schema.field(field_name).map(|f| f.field_type.is_array()).unwrap_or(false);

            let lists: Vec<&PostingList> = match phrase_tokens.iter().map(|t| index.postings.get(t)).collect::<Option<Vec<_>>>() {
                Some(l) => l,
                None => continue,
            };

            let ids = intersect(&lists);
            for id in ids {
                if filter_ids.map_or(false, |f| !f.contains(id)) {
                    continue;
                }
                if exclude_ids.map_or(false, |e| e.contains(id)) {
                    continue;
                }
                let owned: Vec<Vec<u32>> = lists.iter().map(|l| l.offsets_of(id).unwrap_or_default()).collect();
                let slices: Vec<&[u32]> = owned.iter().map(|v| v.as_slice()).collect();
                let doc = DocTokenOffsets { per_token: slices, field_is_array: is_array };
                if !phrase_match(&doc) {
                    continue;
                }
                let score = text_match_score(phrase_tokens.len(), 0, true, priority, 0, request.prioritize_exact_match);
                heap.push(Candidate {
                    seq_id: id,
                    score: ScoreKey { primary: OrderedFloat(score), secondary: OrderedFloat(0.0), tertiary: OrderedFloat(0.0) },
                    payload: (),
                });
            }
        }
    }

    /// Union of every field-in-`query_by`'s posting list for each `-excluded`
    /// word (spec §4.8 step 1's exclude markers).
    fn excluded_doc_ids(&self, words: &[String], request: &SearchRequest) -> Option<RoaringBitmap> {
        if words.is_empty() {
            return None;
        }
        let mut out = RoaringBitmap::new();
        for field_name in &request.query_by {
            if let Some(index) = self.collection.string_field(field_name) {
                for word in words {
                    if let Some(list) = index.postings.get(word) {
                        for posting in list.entries() {
                            out.insert(posting.id);
                        }
                    }
                }
            }
        }
        Some(out)
    }

    /// Reciprocal-rank fusion of the text and vector result sets (spec
    /// §4.8 step 6). `k = 60` is the standard RRF smoothing constant.
    fn fuse(
        &self,
        request: &SearchRequest,
        universe: &RoaringBitmap,
        text_hits: Vec<(u32, f64)>,
        is_wildcard: bool,
    ) -> Result<Vec<(u32, f64, Option<f32>)>, Error> {
        const RRF_K: f64 = 60.0;

        let vector_hits: Option<Vec<ScoredId>> = match &request.vector_query {
            Some(vq) => Some(self.run_vector_query(vq, universe)?),
            None => None,
        };

        let Some(vector_hits) = vector_hits else {
            return Ok(if is_wildcard {
                universe.iter().map(|id| (id, 0.0, None)).collect()
            } else {
                text_hits.into_iter().map(|(id, score)| (id, score, None)).collect()
            });
        };

        if is_wildcard {
            return Ok(vector_hits.iter().enumerate().map(|(rank, h)| (h.id, 1.0 / (RRF_K + rank as f64 + 1.0), Some(h.distance))).collect());
        }

        let alpha = request.vector_query.as_ref().and_then(|v| v.alpha).unwrap_or(self.collection.config.default_hybrid_alpha) as f64;

        let text_rank: HashMap<u32, f64> =
            text_hits.iter().enumerate().map(|(rank, (id, _))| (*id, 1.0 / (RRF_K + rank as f64 + 1.0))).collect();
        let vector_rank: HashMap<u32, (f64, f32)> =
            vector_hits.iter().enumerate().map(|(rank, h)| (h.id, (1.0 / (RRF_K + rank as f64 + 1.0), h.distance))).collect();

        let mut all_ids: Vec<u32> = text_rank.keys().chain(vector_rank.keys()).copied().collect();
        all_ids.sort_unstable();
        all_ids.dedup();

        let mut merged: Vec<(u32, f64, Option<f32>)> = all_ids
            .into_iter()
            .map(|id| {
                let t = text_rank.get(&id).copied().unwrap_or(0.0);
                let (v, dist) = vector_rank.get(&id).map(|(r, d)| (*r, Some(*d))).unwrap_or((0.0, None));
                (id, alpha * t + (1.0 - alpha) * v, dist)
            })
            .collect();
        merged.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(merged)
    }

    fn run_vector_query(&self, vq: &VectorQuery, universe: &RoaringBitmap) -> Result<Vec<ScoredId>, Error> {
        let field = self
            .collection
            .vector_field(&vq.field)
            .ok_or_else(|| Error::Validation(ValidationError::UnknownField(vq.field.clone())))?;
        let index = field.lock();
        let query_vector = match &vq.source {
            VectorSource::Explicit(v) => v.clone(),
            VectorSource::FromDocument(id) => index
                .vector_of(*id)
                .ok_or_else(|| Error::Validation(ValidationError::MalformedVectorQuery(format!("document {id} has no vector in field `{}`", vq.field))))?
                .to_vec(),
        };
        Ok(index.query_with_filter(&query_vector, vq.k, vq.ef, vq.distance_threshold, universe, vq.flat_search_cutoff))
    }

    /// Applies up to 3 lexicographically-composed sort expressions (spec
    /// §4.7/§6) on top of the fused relevance score. A 4th requested
    /// expression is accepted (per spec §6's request-level cap of 4) but
    /// does not participate in the composite key, since [`ScoreKey`] carries
    /// only `primary`/`secondary`/`tertiary`.
    fn apply_sort(&self, request: &SearchRequest, ranked: &mut [(u32, f64, Option<f32>)]) -> Result<(), Error> {
        if request.sort_by.len() > 3 {
            tracing::warn!(requested = request.sort_by.len(), "only the first 3 sort_by expressions compose into the ranking key");
        }
        let ctx = self.build_sort_context(&request.sort_by)?;
        ranked.sort_by(|a, b| {
            let ka = self.composite_sort_key(&request.sort_by, a.0, a.1, &ctx);
            let kb = self.composite_sort_key(&request.sort_by, b.0, b.1, &ctx);
            kb.cmp(&ka)
        });
        Ok(())
    }

    /// Precomputes each `Eval(filter)` sort expression's matching id set
    /// once per search, rather than re-parsing/re-compiling per comparison.
    fn build_sort_context(&self, sort_by: &[SortExpr]) -> Result<SortContext, Error> {
        let mut eval_ids = Vec::with_capacity(sort_by.len().min(3));
        for expr in sort_by.iter().take(3) {
            match expr {
                SortExpr::Eval { filter, .. } => {
                    let ast =
                        parse_filter(filter).map_err(|e| Error::Validation(ValidationError::MalformedFilter(e.to_string())))?;
                    let iter = compile_filter(&ast, self.collection, self.registry)?;
                    eval_ids.push(Some(crate::filter::collect_ids(iter)));
                }
                _ => eval_ids.push(None),
            }
        }
        Ok(SortContext { eval_ids })
    }

    fn composite_sort_key(&self, sort_by: &[SortExpr], seq_id: u32, relevance: f64, ctx: &SortContext) -> ScoreKey {
        if sort_by.is_empty() {
            return ScoreKey { primary: OrderedFloat(relevance), secondary: OrderedFloat(0.0), tertiary: OrderedFloat(0.0) };
        }
        let mut slots = [0.0f64; 3];
        for (i, expr) in sort_by.iter().take(3).enumerate() {
            slots[i] = self.sort_component(expr, seq_id, relevance, ctx, i);
        }
        ScoreKey { primary: OrderedFloat(slots[0]), secondary: OrderedFloat(slots[1]), tertiary: OrderedFloat(slots[2]) }
    }

    /// Raw value for one sort expression, pre-negated by direction so that
    /// "greater `ScoreKey` wins" (the convention [`TopKHeap`]/[`Candidate`]
    /// already use) means "better by this expression" for both directions.
    fn sort_component(&self, expr: &SortExpr, seq_id: u32, relevance: f64, ctx: &SortContext, index: usize) -> f64 {
        let (raw, direction) = match expr {
            SortExpr::Field { name, direction } => (self.field_sort_raw_value(name, seq_id).unwrap_or(0.0), *direction),
            SortExpr::Relevance => (relevance, SortDirection::Desc),
            SortExpr::Geo { field, lat, lng, direction, exclude_radius, precision } => {
                let distance = self.geo_sort_distance(field, *lat, *lng, seq_id).unwrap_or(f64::MAX);
                let distance = match exclude_radius {
                    Some(r) if distance <= *r => 0.0,
                    _ => distance,
                };
                let distance = match precision {
                    Some(p) if *p > 0.0 => (distance / p).floor() * p,
                    _ => distance,
                };
                (distance, *direction)
            }
            SortExpr::TextMatchBuckets { buckets, direction } => (bucketed_relevance(relevance, *buckets), *direction),
            SortExpr::Eval { direction, .. } => {
                let ids = ctx.eval_ids.get(index).and_then(|o| o.as_ref());
                (eval_sort_value(ids, seq_id), *direction)
            }
            SortExpr::Random { seed, direction } => (random_sort_value(*seed, seq_id), *direction),
        };
        match direction {
            SortDirection::Desc => raw,
            SortDirection::Asc => -raw,
        }
    }

    fn field_sort_raw_value(&self, name: &str, seq_id: u32) -> Option<f64> {
        self.collection.document(seq_id).and_then(|doc| doc.body.get(name)).and_then(|v| v.as_f64())
    }

    fn geo_sort_distance(&self, field: &str, lat: f64, lng: f64, seq_id: u32) -> Option<f64> {
        let index = self.collection.geo_field(field)?;
        let (doc_lat, doc_lng) = index.coords_of(seq_id)?;
        Some(Location::new(lat, lng).haversine_distance_to(&Location::new(doc_lat, doc_lng)).meters())
    }
}

/// Holds each sort request's per-search precomputation, currently just the
/// `_eval(filter)` id sets (parallel to `sort_by`, up to the first 3 slots).
struct SortContext {
    eval_ids: Vec<Option<RoaringBitmap>>,
}

fn bucketed_relevance(relevance: f64, buckets: u32) -> f64 {
    (relevance / buckets.max(1) as f64).floor()
}

fn eval_sort_value(eval_ids: Option<&RoaringBitmap>, seq_id: u32) -> f64 {
    match eval_ids {
        Some(ids) if ids.contains(seq_id) => 1.0,
        _ => 0.0,
    }
}

/// Deterministic hash-seeded pseudo-random value in `[0, 1)`, the same
/// fxhash hash-combine idiom [`crate::topk::group_key`] uses.
fn random_sort_value(seed: u64, seq_id: u32) -> f64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = fxhash::FxHasher::default();
    seed.hash(&mut hasher);
    seq_id.hash(&mut hasher);
    (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64
}

/// Splits `"quoted phrases"` out of a query string (spec §4.8 step 1),
/// returning the query with phrase spans removed plus each phrase's tokens.
fn split_phrase_markers(query: &str) -> (String, Vec<Vec<String>>) {
    let mut remainder = String::with_capacity(query.len());
    let mut phrases = Vec::new();
    let mut chars = query.char_indices().peekable();
    let mut in_phrase = false;
    let mut phrase_start = 0;
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if !in_phrase {
                in_phrase = true;
                phrase_start = i + c.len_utf8();
            } else {
                in_phrase = false;
                let phrase_text = &query[phrase_start..i];
                let tokens: Vec<String> = tokenize(phrase_text).into_iter().map(|t| t.text).collect();
                if !tokens.is_empty() {
                    phrases.push(tokens);
                }
            }
        } else if !in_phrase {
            remainder.push(c);
        }
    }
    (remainder, phrases)
}

/// Splits `-excluded` words out of a query string (spec §4.8 step 1),
/// returning the query with exclude markers removed plus the excluded words.
fn split_exclude_markers(query: &str) -> (String, Vec<String>) {
    let mut remainder = Vec::new();
    let mut excluded = Vec::new();
    for word in query.split_whitespace() {
        if let Some(stripped) = word.strip_prefix('-') {
            if !stripped.is_empty() {
                excluded.extend(tokenize(stripped).into_iter().map(|t| t.text));
                continue;
            }
        }
        remainder.push(word);
    }
    (remainder.join(" "), excluded)
}

/// Per-request pin overrides (spec §6's `pinned_hits` request param, distinct
/// from the stored curation rules in [`crate::curation`]): moves each pinned
/// seq_id to its requested 0-based position, ahead of relevance ranking.
fn apply_pinned_hits(pins: &[(u32, usize)], ranked: &mut Vec<(u32, f64, Option<f32>)>) {
    for &(seq_id, position) in pins {
        let Some(idx) = ranked.iter().position(|(id, _, _)| *id == seq_id) else { continue };
        let entry = ranked.remove(idx);
        let position = position.min(ranked.len());
        ranked.insert(position, entry);
    }
}

fn request_combination_limit(collection: &Collection, _request: &SearchRequest) -> usize {
    collection.config.combination_limit
}

/// Cartesian product of each token's candidate list, capped at `limit`
/// combinations (spec §4.8 step 3's `combination_limit`).
fn bounded_cartesian_product(per_token: &[Vec<(String, u8)>], limit: usize) -> Vec<Vec<(String, u8)>> {
    use itertools::Itertools;
    per_token
        .iter()
        .map(|c| c.iter().cloned())
        .multi_cartesian_product()
        .take(limit.max(1))
        .collect()
}
