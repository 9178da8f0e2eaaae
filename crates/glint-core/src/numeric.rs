//! Numeric/range index (component C3): an ordered tree, keyed by the exact
//! integer value, over a single int/float/bool field (spec §4.3).
//!
//! Floats are packed to a monotone 64-bit integer via a sign-flip so that
//! ordinary integer comparison preserves float ordering; bools coerce to
//! `{0, 1}`. Backed by a `BTreeMap` — the teacher's own numeric facet
//! storage (`heed_codec::facet::OrderedF64Codec`) uses the same
//! sign-flip trick to get a byte-comparable, monotone key.

use std::collections::BTreeMap;

use roaring::RoaringBitmap;

/// Packs an `f64` into a monotone `u64`: for non-negative floats, flip the
/// sign bit; for negative floats, flip every bit. Matches
/// `OrderedF64Codec`'s encoding in the teacher crate.
pub fn f64_to_ordered_u64(v: f64) -> u64 {
    let bits = v.to_bits();
    if v.is_sign_negative() {
        !bits
    } else {
        bits | (1 << 63)
    }
}

pub fn ordered_u64_to_f64(bits: u64) -> f64 {
    if bits & (1 << 63) != 0 {
        f64::from_bits(bits & !(1 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

/// An ordered tree of `exact value -> doc ids` for one numeric field.
#[derive(Debug, Clone, Default)]
pub struct NumericTree {
    by_value: BTreeMap<u64, RoaringBitmap>,
    all_ids: RoaringBitmap,
}

/// Monotone key for a signed integer: flipping the sign bit makes ordinary
/// `u64` comparison agree with `i64` comparison, mirroring the float codec.
pub fn int_key(value: i64) -> u64 {
    value as u64 ^ (1 << 63)
}

pub fn bool_key(value: bool) -> u64 {
    value as u64
}

impl NumericTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_int(&mut self, id: u32, value: i64) {
        self.insert_key(id, int_key(value));
    }

    pub fn insert_float(&mut self, id: u32, value: f64) {
        self.insert_key(id, f64_to_ordered_u64(value));
    }

    pub fn insert_bool(&mut self, id: u32, value: bool) {
        self.insert_key(id, bool_key(value));
    }

    fn insert_key(&mut self, id: u32, key: u64) {
        self.by_value.entry(key).or_default().insert(id);
        self.all_ids.insert(id);
    }

    pub fn remove_int(&mut self, id: u32, value: i64) {
        self.remove_key(id, int_key(value));
    }

    pub fn remove_float(&mut self, id: u32, value: f64) {
        self.remove_key(id, f64_to_ordered_u64(value));
    }

    pub fn remove_bool(&mut self, id: u32, value: bool) {
        self.remove_key(id, bool_key(value));
    }

    fn remove_key(&mut self, id: u32, key: u64) {
        if let Some(ids) = self.by_value.get_mut(&key) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_value.remove(&key);
            }
        }
        self.all_ids.remove(id);
    }

    /// Equality against a raw encoded key (caller encodes via the typed
    /// `*_to_ordered_u64`/sign-flip helpers above).
    pub fn equals(&self, key: u64) -> RoaringBitmap {
        self.by_value.get(&key).cloned().unwrap_or_default()
    }

    /// Inclusive range `[lo, hi]`.
    pub fn range(&self, lo: u64, hi: u64) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        for ids in self.by_value.range(lo..=hi).map(|(_, v)| v) {
            out |= ids;
        }
        out
    }

    pub fn greater_than(&self, key: u64, inclusive: bool) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        let start = if inclusive { key } else { key.saturating_add(1) };
        for ids in self.by_value.range(start..).map(|(_, v)| v) {
            out |= ids;
        }
        out
    }

    pub fn less_than(&self, key: u64, inclusive: bool) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        let end = if inclusive { key.saturating_add(1) } else { key };
        for ids in self.by_value.range(..end).map(|(_, v)| v) {
            out |= ids;
        }
        out
    }

    /// `all_ids - equals(key)`, matching spec §4.3's `not_equals` definition.
    pub fn not_equals(&self, key: u64) -> RoaringBitmap {
        &self.all_ids - &self.equals(key)
    }

    pub fn all_ids(&self) -> &RoaringBitmap {
        &self.all_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_ordering_survives_sign_flip_packing() {
        let values = [-100.5, -1.0, 0.0, 1.0, 100.5];
        let mut packed: Vec<u64> = values.iter().map(|&v| f64_to_ordered_u64(v)).collect();
        let mut sorted = packed.clone();
        sorted.sort();
        assert_eq!(packed, sorted);
        packed.sort();
        for (&expected, &key) in values.iter().zip(packed.iter()) {
            assert_eq!(ordered_u64_to_f64(key), expected);
        }
    }

    #[test]
    fn range_query_is_inclusive_both_ends() {
        let mut tree = NumericTree::new();
        for (id, v) in [(1, 10i64), (2, 20), (3, 30), (4, 40)] {
            tree.insert_int(id, v);
        }
        let result = tree.range(10i64 as u64 ^ (1 << 63), 30i64 as u64 ^ (1 << 63));
        assert_eq!(result.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn not_equals_on_absent_value_returns_all_docs() {
        let mut tree = NumericTree::new();
        for (id, v) in [(1, 10i64), (2, 20)] {
            tree.insert_int(id, v);
        }
        let key = 999i64 as u64 ^ (1 << 63);
        assert_eq!(tree.not_equals(key).iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn bool_coerces_to_zero_one() {
        let mut tree = NumericTree::new();
        tree.insert_bool(1, true);
        tree.insert_bool(2, false);
        assert_eq!(tree.equals(1).iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(tree.equals(0).iter().collect::<Vec<_>>(), vec![2]);
    }
}
