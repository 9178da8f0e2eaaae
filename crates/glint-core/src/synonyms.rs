//! Synonym expansion (spec §4.8 step 2): a per-collection table of rules,
//! each mapping a root token sequence to one or more equivalent sequences.
//! Grounded on the teacher's own synonym store shape (`meilidb-core/src/
//! store/synonyms.rs`'s `alternatives_to(word) -> Set` lookup), re-expressed
//! over owned token vectors instead of an on-disk FST since this crate's
//! synonym table is small and entirely in-memory.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SynonymRule {
    pub root: Vec<String>,
    pub synonyms: Vec<Vec<String>>,
}

/// Maps a token sequence (joined by a single space, the same key shape
/// `tokenize` already normalizes to) to its equivalent sequences, and the
/// reverse direction so matching a synonym also surfaces its root.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    rules: Vec<SynonymRule>,
}

fn key(tokens: &[String]) -> String {
    tokens.join(" ")
}

impl SynonymTable {
    pub fn new(rules: Vec<SynonymRule>) -> Self {
        Self { rules }
    }

    /// Produces the candidate subquery groups for `tokens` (spec §4.8 step
    /// 2): the original sequence plus, for every rule whose root or any of
    /// whose synonym forms exactly matches the whole query, every other
    /// form of that rule.
    pub fn expand(&self, tokens: &[String]) -> Vec<Vec<String>> {
        let mut groups = vec![tokens.to_vec()];
        let query_key = key(tokens);
        for rule in &self.rules {
            let mut forms: Vec<&Vec<String>> = std::iter::once(&rule.root).chain(rule.synonyms.iter()).collect();
            let matched = forms.iter().any(|f| key(f) == query_key);
            if !matched {
                continue;
            }
            forms.retain(|f| key(f) != query_key);
            for form in forms {
                groups.push(form.clone());
            }
        }
        groups
    }
}

/// A small built-in stop-word set (spec §4.8 step 2's "per-locale set");
/// real locale data is out of this crate's scope, so only English's most
/// common function words are recognized.
pub fn is_stop_word(token: &str, locale: Option<&str>) -> bool {
    const EN_STOP_WORDS: &[&str] =
        &["a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on", "or", "the", "to", "with"];
    match locale {
        Some(loc) if loc != "en" => false,
        _ => EN_STOP_WORDS.contains(&token),
    }
}

/// Drops recognized stop words, but never down to an empty token stream —
/// an all-stop-word query (e.g. `"the"`) still needs something to search.
pub fn remove_stop_words(tokens: Vec<String>, locale: Option<&str>) -> Vec<String> {
    let filtered: Vec<String> = tokens.iter().filter(|t| !is_stop_word(t, locale)).cloned().collect();
    if filtered.is_empty() {
        tokens
    } else {
        filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn expands_query_matching_a_synonym_form_into_its_root() {
        let table = SynonymTable::new(vec![SynonymRule { root: toks("smart phone"), synonyms: vec![toks("iphone")] }]);
        let groups = table.expand(&toks("iphone"));
        assert!(groups.iter().any(|g| g == &toks("smart phone")));
    }

    #[test]
    fn expands_root_query_into_its_synonyms() {
        let table = SynonymTable::new(vec![SynonymRule { root: toks("smart phone"), synonyms: vec![toks("iphone")] }]);
        let groups = table.expand(&toks("smart phone"));
        assert!(groups.iter().any(|g| g == &toks("iphone")));
    }

    #[test]
    fn unrelated_query_is_returned_unexpanded() {
        let table = SynonymTable::new(vec![SynonymRule { root: toks("smart phone"), synonyms: vec![toks("iphone")] }]);
        let groups = table.expand(&toks("tablet"));
        assert_eq!(groups, vec![toks("tablet")]);
    }

    #[test]
    fn stop_words_are_dropped_but_not_down_to_nothing() {
        let filtered = remove_stop_words(toks("the cat and the hat"), Some("en"));
        assert_eq!(filtered, toks("cat hat"));
        let all_stop = remove_stop_words(toks("the a"), Some("en"));
        assert_eq!(all_stop, toks("the a"));
    }
}
