//! Curation/override engine (component C11, spec §4.9).

use std::collections::HashSet;

/// How a rule's `query` field is compared against the incoming query text.
#[derive(Debug, Clone)]
pub enum QueryPattern {
    Exact(String),
    Contains(String),
    /// A pattern with `{placeholder}` slots; matches if the query fits the
    /// pattern's literal segments in order, capturing the slot values.
    Templated(String),
}

impl QueryPattern {
    fn matches(&self, query: &str) -> bool {
        match self {
            QueryPattern::Exact(p) => p == query,
            QueryPattern::Contains(p) => query.contains(p.as_str()),
            QueryPattern::Templated(pattern) => template_matches(pattern, query),
        }
    }
}

fn template_matches(pattern: &str, query: &str) -> bool {
    let mut literal_segments = Vec::new();
    let mut current = String::new();
    let mut in_placeholder = false;
    for c in pattern.chars() {
        match c {
            '{' => {
                in_placeholder = true;
                literal_segments.push(std::mem::take(&mut current));
            }
            '}' => in_placeholder = false,
            _ if !in_placeholder => current.push(c),
            _ => {}
        }
    }
    literal_segments.push(current);

    let mut rest = query;
    for (i, segment) in literal_segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment.as_str()) {
            Some(pos) if i == 0 && pos != 0 => return false,
            Some(pos) => rest = &rest[pos + segment.len()..],
            None => return false,
        }
    }
    true
}

#[derive(Debug, Clone)]
pub struct CurationRule {
    pub query: QueryPattern,
    pub filter: Option<String>,
    pub effective_from: Option<i64>,
    pub effective_to: Option<i64>,
    pub tags: Vec<String>,
    /// `(doc_id, 0-based position)`.
    pub includes: Vec<(String, usize)>,
    pub excludes: Vec<String>,
    pub remove_matched_tokens: bool,
    pub filter_curated_hits: bool,
    pub stop_processing: bool,
    pub sort_by: Option<String>,
    pub replace_query: Option<String>,
}

/// The net effect of every matched rule, applied in stored order until one
/// with `stop_processing` fires.
#[derive(Debug, Clone, Default)]
pub struct CurationEffect {
    pub includes: Vec<(String, usize)>,
    pub excludes: HashSet<String>,
    pub remove_matched_tokens: bool,
    pub filter_curated_hits: bool,
    pub sort_by: Option<String>,
    pub replace_query: Option<String>,
    pub extra_filter: Option<String>,
}

pub struct CurationEngine {
    rules: Vec<CurationRule>,
}

impl CurationEngine {
    pub fn new(rules: Vec<CurationRule>) -> Self {
        Self { rules }
    }

    /// Matches `query` against rules in stored order; `now` gates
    /// `effective_from`/`effective_to`. Once a matching rule has
    /// `stop_processing = true`, later rules are skipped.
    pub fn resolve(&self, query: &str, now: i64) -> CurationEffect {
        let mut effect = CurationEffect::default();
        for rule in &self.rules {
            if !self.is_active(rule, now) {
                continue;
            }
            if !rule.query.matches(query) {
                continue;
            }

            effect.includes.extend(rule.includes.iter().cloned());
            effect.excludes.extend(rule.excludes.iter().cloned());
            effect.remove_matched_tokens |= rule.remove_matched_tokens;
            effect.filter_curated_hits |= rule.filter_curated_hits;
            if rule.sort_by.is_some() {
                effect.sort_by = rule.sort_by.clone();
            }
            if rule.replace_query.is_some() {
                effect.replace_query = rule.replace_query.clone();
            }
            if rule.filter.is_some() {
                effect.extra_filter = rule.filter.clone();
            }

            if rule.stop_processing {
                break;
            }
        }
        effect
    }

    fn is_active(&self, rule: &CurationRule, now: i64) -> bool {
        rule.effective_from.map_or(true, |from| now >= from) && rule.effective_to.map_or(true, |to| now <= to)
    }

    /// Applies a resolved [`CurationEffect`] to a ranked hit list: pins
    /// requested ids at their positions, then drops excluded ids.
    pub fn apply(&self, effect: &CurationEffect, mut hits: Vec<String>) -> Vec<String> {
        hits.retain(|id| !effect.excludes.contains(id));
        for (doc_id, position) in &effect.includes {
            hits.retain(|id| id != doc_id);
            let position = (*position).min(hits.len());
            hits.insert(position, doc_id.clone());
        }
        hits
    }
}
