//! Adaptive radix trie (component C6): tokens keyed by UTF-8 byte sequence,
//! leaves carrying the token's posting-list key. Fuzzy prefix enumeration
//! walks a `levenshtein_automata::DFA` alongside the trie's edges instead of
//! materializing every candidate string, the same "automaton walks a
//! byte-keyed structure directly" idiom `fst`'s own `Automaton` trait uses
//! against an FST — here applied to our own mutable, insertable trie
//! (an FST is immutable and can't absorb incremental token inserts, which
//! the source's trie must support).

use std::collections::BTreeMap;

use fst::Automaton;
use levenshtein_automata::{Distance, LevenshteinAutomatonBuilder, DFA};

#[derive(Debug, Default)]
struct Node {
    /// Compressed edge label from this node to its parent's branch byte.
    edge: Vec<u8>,
    children: BTreeMap<u8, Box<Node>>,
    /// Set once a token terminates exactly at this node.
    terminal: bool,
}

impl Node {
    fn leaf(edge: Vec<u8>) -> Self {
        Self { edge, children: BTreeMap::new(), terminal: true }
    }
}

/// Radix trie over token byte sequences. Each inserted token is its own key;
/// callers join the trie with the posting-list map keyed by the same
/// string, matching the source's "leaf carries a pointer to the posting
/// list" shape without needing an intrusive pointer field here.
#[derive(Debug, Default)]
pub struct RadixTrie {
    root: Node,
    len: usize,
}

impl RadixTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, token: &str) {
        if Self::insert_rec(&mut self.root, token.as_bytes()) {
            self.len += 1;
        }
    }

    /// Returns `true` if this insert added a new terminal (vs. token already present).
    fn insert_rec(node: &mut Node, bytes: &[u8]) -> bool {
        let common = common_prefix_len(&node.edge, bytes);

        if common < node.edge.len() {
            // Split this node's edge at the divergence point.
            let (shared, rest_edge) = node.edge.split_at(common);
            let shared = shared.to_vec();
            let rest_edge = rest_edge.to_vec();
            let mut split_child = Node { edge: rest_edge[1..].to_vec(), children: BTreeMap::new(), terminal: node.terminal };
            std::mem::swap(&mut split_child.children, &mut node.children);
            node.edge = shared;
            node.terminal = false;
            node.children.insert(rest_edge[0], Box::new(split_child));
        }

        let remainder = &bytes[common.min(bytes.len())..];
        if remainder.is_empty() {
            let was_terminal = node.terminal;
            node.terminal = true;
            return !was_terminal;
        }

        match node.children.get_mut(&remainder[0]) {
            Some(child) => Self::insert_rec(child, remainder),
            None => {
                node.children.insert(remainder[0], Box::new(Node::leaf(remainder.to_vec())));
                true
            }
        }
    }

    pub fn contains(&self, token: &str) -> bool {
        let mut node = &self.root;
        let mut bytes = token.as_bytes();
        loop {
            let common = common_prefix_len(&node.edge, bytes);
            if common != node.edge.len() {
                return false;
            }
            bytes = &bytes[common..];
            if bytes.is_empty() {
                return node.terminal;
            }
            match node.children.get(&bytes[0]) {
                Some(child) => node = child,
                None => return false,
            }
        }
    }

    /// Enumerates every stored token within `max_edits` Levenshtein distance
    /// of `query`, each tagged with its exact edit distance. `max_edits`
    /// should already reflect the caller's length-scaled budget (spec
    /// §4.3: short tokens get at most 1 typo).
    pub fn fuzzy_search(&self, query: &str, max_edits: u8) -> Vec<(String, u8)> {
        let builder = LevenshteinAutomatonBuilder::new(max_edits, true);
        let dfa = builder.build_dfa(query);
        let mut out = Vec::new();
        let mut path = Vec::new();
        Self::fuzzy_rec(&self.root, &dfa, dfa.start(), &mut path, &mut out);
        out
    }

    fn fuzzy_rec(node: &Node, dfa: &DFA, state: <DFA as Automaton>::State, path: &mut Vec<u8>, out: &mut Vec<(String, u8)>) {
        let path_len_on_entry = path.len();
        let mut cur_state = state;
        for &b in &node.edge {
            if !dfa.can_match(&cur_state) {
                path.truncate(path_len_on_entry);
                return;
            }
            cur_state = dfa.accept(&cur_state, b);
            path.push(b);
        }

        if !dfa.can_match(&cur_state) {
            path.truncate(path_len_on_entry);
            return;
        }

        if node.terminal && dfa.is_match(&cur_state) {
            if let Ok(text) = std::str::from_utf8(path) {
                if let Distance::Exact(d) = dfa.eval(text) {
                    out.push((text.to_string(), d));
                }
            }
        }

        for child in node.children.values() {
            Self::fuzzy_rec(child, dfa, cur_state.clone(), path, out);
        }

        path.truncate(path_len_on_entry);
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Length-scaled typo budget: short tokens tolerate at most 1 edit
/// regardless of the user's requested `num_typos` (spec §4.3).
pub fn typo_budget(token_len: usize, num_typos: u8) -> u8 {
    let length_cap = if token_len <= 4 { 0 } else if token_len <= 8 { 1 } else { 2 };
    num_typos.min(length_cap)
}
