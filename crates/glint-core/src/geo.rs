//! Geo index (component C4): per-field spatial index supporting radius and
//! polygon containment queries over `(lat, lng)` points (spec §4.4).
//!
//! The source indexes a quad-tree of S2-style cell tokens over a range tree.
//! Rather than pull in a dedicated S2 crate, cell ids are produced by
//! interleaving the latitude/longitude bits into a single Z-order (Morton)
//! 64-bit key — the same "pack two coordinates into one sortable integer"
//! trick `NumericTree`'s sign-flip packing already uses — and stored in an
//! `rstar::RTree` for exact radius/polygon membership, matching the teacher
//! crate's existing use of `rstar` for its own spatial facet filtering.

use geoutils::Location;
use rstar::primitives::GeomWithData;
use rstar::{RTree, RTreeObject, AABB};
use roaring::RoaringBitmap;

pub type GeoPoint = GeomWithData<[f64; 2], u32>;

/// Interleaves latitude/longitude into a single Morton-ordered `u64` cell
/// id, quantizing each coordinate to 32 bits of precision. Used as the
/// source's cell token for coarse bucket pruning; exact distance/contains
/// checks still run against the stored float coordinates.
pub fn cell_id(lat: f64, lng: f64) -> u64 {
    let lat_bits = quantize(lat, -90.0, 90.0);
    let lng_bits = quantize(lng, -180.0, 180.0);
    interleave(lat_bits, lng_bits)
}

fn quantize(v: f64, lo: f64, hi: f64) -> u32 {
    let clamped = v.clamp(lo, hi);
    let normalized = (clamped - lo) / (hi - lo);
    (normalized * u32::MAX as f64) as u32
}

fn interleave(a: u32, b: u32) -> u64 {
    fn spread(mut x: u64) -> u64 {
        x &= 0xFFFFFFFF;
        x = (x | (x << 16)) & 0x0000FFFF0000FFFF;
        x = (x | (x << 8)) & 0x00FF00FF00FF00FF;
        x = (x | (x << 4)) & 0x0F0F0F0F0F0F0F0F;
        x = (x | (x << 2)) & 0x3333333333333333;
        x = (x | (x << 1)) & 0x5555555555555555;
        x
    }
    spread(a as u64) | (spread(b as u64) << 1)
}

/// A simple closed polygon as a list of `(lat, lng)` vertices. Longitudes
/// that cross the antimeridian are expected pre-normalized: callers whose
/// polygon straddles +/-180 should split it into two polygons before
/// calling `polygon_contains`, as the source does via its own
/// antimeridian-splitting preprocessing step.
#[derive(Debug, Clone)]
pub struct Polygon {
    pub vertices: Vec<(f64, f64)>,
}

impl Polygon {
    /// Ray-casting point-in-polygon test, even-odd rule.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        let n = self.vertices.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (lat_i, lng_i) = self.vertices[i];
            let (lat_j, lng_j) = self.vertices[j];
            let intersects = ((lng_i > lng) != (lng_j > lng))
                && (lat < (lat_j - lat_i) * (lng - lng_i) / (lng_j - lng_i) + lat_i);
            if intersects {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Splits a polygon whose edges cross the antimeridian into two polygons
    /// clipped to `[-180, 0]` and `[0, 180]`. A polygon is considered
    /// crossing when consecutive vertices' longitudes differ by more than
    /// 180 degrees.
    pub fn split_at_antimeridian(&self) -> Vec<Polygon> {
        let crosses = self.vertices.windows(2).any(|w| (w[0].1 - w[1].1).abs() > 180.0);
        if !crosses {
            return vec![self.clone()];
        }
        // Shift all negative longitudes into [180, 360) so the polygon
        // becomes contiguous, then split back into two halves at 180.
        let shifted: Vec<(f64, f64)> =
            self.vertices.iter().map(|&(lat, lng)| (lat, if lng < 0.0 { lng + 360.0 } else { lng })).collect();
        let west = Polygon { vertices: shifted.iter().map(|&(lat, lng)| (lat, lng - 360.0)).collect() };
        let east = Polygon { vertices: shifted };
        vec![west, east]
    }
}

#[derive(Debug, Default)]
pub struct GeoIndex {
    tree: RTree<GeoPoint>,
    coords: std::collections::HashMap<u32, (f64, f64)>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, lat: f64, lng: f64) {
        if self.coords.contains_key(&id) {
            self.remove(id);
        }
        self.tree.insert(GeomWithData::new([lat, lng], id));
        self.coords.insert(id, (lat, lng));
    }

    pub fn remove(&mut self, id: u32) {
        if let Some(&(lat, lng)) = self.coords.get(&id) {
            let point = GeomWithData::new([lat, lng], id);
            self.tree.remove(&point);
            self.coords.remove(&id);
        }
    }

    pub fn coords_of(&self, id: u32) -> Option<(f64, f64)> {
        self.coords.get(&id).copied()
    }

    /// Docs with a point within `radius_m` meters of `(lat, lng)`, using the
    /// r-tree's bounding envelope to prune candidates before the exact
    /// geodesic distance check (`geoutils::Location::haversine_distance_to`).
    pub fn within_radius(&self, lat: f64, lng: f64, radius_m: f64) -> RoaringBitmap {
        let deg_margin = (radius_m / 111_000.0).max(0.01);
        let envelope = AABB::from_corners([lat - deg_margin, lng - deg_margin], [lat + deg_margin, lng + deg_margin]);
        let center = Location::new(lat, lng);
        let mut out = RoaringBitmap::new();
        for candidate in self.tree.locate_in_envelope(&envelope) {
            let [clat, clng] = *candidate.geom();
            let dist = center.haversine_distance_to(&Location::new(clat, clng));
            if dist.meters() <= radius_m {
                out.insert(candidate.data);
            }
        }
        out
    }

    /// Docs whose point falls inside `polygon`. Antimeridian-crossing
    /// polygons must already be pre-split via [`Polygon::split_at_antimeridian`];
    /// results across the resulting halves should be unioned by the caller.
    pub fn within_polygon(&self, polygon: &Polygon) -> RoaringBitmap {
        let (min_lat, max_lat) = polygon
            .vertices
            .iter()
            .fold((f64::MAX, f64::MIN), |(mn, mx), &(lat, _)| (mn.min(lat), mx.max(lat)));
        let (min_lng, max_lng) = polygon
            .vertices
            .iter()
            .fold((f64::MAX, f64::MIN), |(mn, mx), &(_, lng)| (mn.min(lng), mx.max(lng)));
        let envelope = AABB::from_corners([min_lat, min_lng], [max_lat, max_lng]);
        let mut out = RoaringBitmap::new();
        for candidate in self.tree.locate_in_envelope(&envelope) {
            let [clat, clng] = *candidate.geom();
            if polygon.contains(clat, clng) {
                out.insert(candidate.data);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_id_is_stable_and_order_preserving_per_axis() {
        let a = cell_id(10.0, 10.0);
        let b = cell_id(10.0, 10.0);
        assert_eq!(a, b);
        let c = cell_id(80.0, 10.0);
        assert_ne!(a, c);
    }

    #[test]
    fn within_radius_finds_nearby_points_only() {
        let mut idx = GeoIndex::new();
        idx.insert(1, 37.7749, -122.4194); // San Francisco
        idx.insert(2, 37.7750, -122.4195); // ~15m away
        idx.insert(3, 40.7128, -74.0060); // New York
        let hits = idx.within_radius(37.7749, -122.4194, 1000.0);
        assert!(hits.contains(1));
        assert!(hits.contains(2));
        assert!(!hits.contains(3));
    }

    #[test]
    fn remove_drops_point_from_subsequent_queries() {
        let mut idx = GeoIndex::new();
        idx.insert(1, 0.0, 0.0);
        idx.remove(1);
        assert!(idx.coords_of(1).is_none());
        assert!(idx.within_radius(0.0, 0.0, 1000.0).is_empty());
    }

    #[test]
    fn polygon_contains_respects_even_odd_rule() {
        let square = Polygon { vertices: vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)] };
        assert!(square.contains(5.0, 5.0));
        assert!(!square.contains(50.0, 50.0));
    }

    #[test]
    fn antimeridian_crossing_polygon_splits_into_two() {
        let polygon = Polygon { vertices: vec![(10.0, 170.0), (10.0, -170.0), (-10.0, -170.0), (-10.0, 170.0)] };
        let parts = polygon.split_at_antimeridian();
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn non_crossing_polygon_is_not_split() {
        let polygon = Polygon { vertices: vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)] };
        assert_eq!(polygon.split_at_antimeridian().len(), 1);
    }
}
