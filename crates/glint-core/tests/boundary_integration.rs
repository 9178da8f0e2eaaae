//! Black-box tests for the boundary behaviors spec §8 calls out: the
//! compact/chained posting-list crossover, NOT-equals over an absent
//! value, an empty-query vector lookup keyed by `id:`, and an
//! antimeridian-crossing polygon.

use glint_core::geo::{GeoIndex, Polygon};
use glint_core::numeric::{bool_key, int_key};
use glint_core::schema::{CollectionSchema, FieldSchema, FieldType};
use glint_core::search::{SearchOrchestrator, SearchRequest, VectorQuery, VectorSource};
use glint_core::vector::DistanceMetric;
use glint_core::{Collection, EngineConfig, WriteMode};
use serde_json::json;

fn schema() -> CollectionSchema {
    CollectionSchema { fields: vec![FieldSchema::new("title", FieldType::String)], key_field: Some("id".into()) }
}

/// A posting list with <= `compact_posting_threshold` (64) docs stays in
/// compact form; crossing it promotes to block-chained. Both forms must
/// answer `intersect`/search identically.
#[test]
fn posting_list_search_is_consistent_across_the_compact_chained_boundary() {
    let config = EngineConfig::default();
    let mut collection = Collection::new(schema(), config);
    for i in 0..config.compact_posting_threshold {
        collection.add_document(Some(i.to_string()), json!({"title": "widget"}), WriteMode::Create).unwrap();
    }
    let orchestrator = SearchOrchestrator::new(&collection);
    let response = orchestrator
        .search(&SearchRequest { query: "widget", query_by: vec!["title".into()], per_page: 1_000, ..Default::default() }, 0)
        .unwrap();
    assert_eq!(response.found, config.compact_posting_threshold);

    // One more document pushes this token's posting list past the compact
    // threshold into block-chained form.
    collection.add_document(Some("overflow".into()), json!({"title": "widget"}), WriteMode::Create).unwrap();
    let orchestrator = SearchOrchestrator::new(&collection);
    let response = orchestrator
        .search(&SearchRequest { query: "widget", query_by: vec!["title".into()], per_page: 1_000, ..Default::default() }, 0)
        .unwrap();
    assert_eq!(response.found, config.compact_posting_threshold + 1);
}

/// A posting list chained across more than one [`containers::BLOCK_SIZE`]
/// (256) block still returns every document on intersection.
#[test]
fn posting_list_spans_multiple_blocks_without_losing_documents() {
    let config = EngineConfig::default();
    let mut collection = Collection::new(schema(), config);
    let total = 600;
    for i in 0..total {
        collection.add_document(Some(i.to_string()), json!({"title": "widget"}), WriteMode::Create).unwrap();
    }
    let orchestrator = SearchOrchestrator::new(&collection);
    let response = orchestrator
        .search(&SearchRequest { query: "widget", query_by: vec!["title".into()], per_page: total, ..Default::default() }, 0)
        .unwrap();
    assert_eq!(response.found, total);
}

/// Removing every document from a posting list drains it back to empty
/// (block merge down to zero), and a subsequent search for that token
/// finds nothing rather than erroring.
#[test]
fn posting_list_empties_cleanly_after_deleting_every_document() {
    let config = EngineConfig::default();
    let mut collection = Collection::new(schema(), config);
    let mut ids = Vec::new();
    for i in 0..300 {
        ids.push(collection.add_document(Some(i.to_string()), json!({"title": "widget"}), WriteMode::Create).unwrap());
    }
    for id in ids {
        collection.remove_document(id).unwrap();
    }
    assert!(collection.string_field("title").unwrap().postings.get("widget").is_none());

    let orchestrator = SearchOrchestrator::new(&collection);
    let response = orchestrator
        .search(&SearchRequest { query: "widget", query_by: vec!["title".into()], ..Default::default() }, 0)
        .unwrap();
    assert_eq!(response.found, 0);
}

/// A `field:!=value` filter with no documents holding that value returns
/// every document instead of erroring or returning an empty set.
#[test]
fn not_equals_on_a_value_no_document_holds_returns_everything() {
    let schema = CollectionSchema { fields: vec![FieldSchema::new("price", FieldType::Int32)], key_field: Some("id".into()) };
    let mut collection = Collection::new(schema, EngineConfig::default());
    collection.add_document(Some("1".into()), json!({"price": 10}), WriteMode::Create).unwrap();
    collection.add_document(Some("2".into()), json!({"price": 20}), WriteMode::Create).unwrap();

    let tree = collection.numeric_field("price").unwrap();
    let ids = tree.not_equals(int_key(999));
    assert_eq!(ids, collection.all_ids());
}

/// A bool field's NOT-equals over a value no document has (degenerate but
/// well-formed: every doc is `true` or `false`, so `!= true` must equal
/// the `false` set exactly).
#[test]
fn bool_field_not_equals_matches_the_opposite_value() {
    let schema = CollectionSchema { fields: vec![FieldSchema::new("active", FieldType::Bool)], key_field: Some("id".into()) };
    let mut collection = Collection::new(schema, EngineConfig::default());
    collection.add_document(Some("1".into()), json!({"active": true}), WriteMode::Create).unwrap();
    collection.add_document(Some("2".into()), json!({"active": false}), WriteMode::Create).unwrap();

    let tree = collection.numeric_field("active").unwrap();
    let not_true = tree.not_equals(bool_key(true));
    assert_eq!(not_true.iter().collect::<Vec<_>>(), vec![1]);
}

/// A vector query resolved from a document id with no query text still
/// ranks the rest of the collection by distance to that document's vector.
#[test]
fn vector_only_query_with_no_text_ranks_by_document_id() {
    let schema = CollectionSchema {
        fields: vec![FieldSchema {
            vector_dimension: Some(2),
            vector_distance: Some(DistanceMetric::Euclidean),
            ..FieldSchema::new("embedding", FieldType::Vector)
        }],
        key_field: Some("id".into()),
    };
    let mut collection = Collection::new(schema, EngineConfig::default());
    let anchor = collection.add_document(Some("anchor".into()), json!({"embedding": [5.0, 5.0]}), WriteMode::Create).unwrap();
    collection.add_document(Some("close".into()), json!({"embedding": [5.0, 6.0]}), WriteMode::Create).unwrap();

    let orchestrator = SearchOrchestrator::new(&collection);
    let request = SearchRequest {
        query: "*",
        vector_query: Some(VectorQuery {
            field: "embedding".into(),
            source: VectorSource::FromDocument(anchor),
            k: 10,
            ef: 10,
            alpha: None,
            distance_threshold: None,
            flat_search_cutoff: 1_000,
        }),
        ..Default::default()
    };
    let response = orchestrator.search(&request, 0).unwrap();
    assert_eq!(response.hits.len(), 2);
    assert_eq!(collection.key_of(response.hits[0].seq_id), "anchor");
}

/// A polygon whose edges cross the antimeridian (+/-180 longitude) must be
/// split before point-in-polygon testing; a point just west of the line
/// should still be contained once split.
#[test]
fn geo_polygon_crossing_the_antimeridian_splits_and_still_contains_points() {
    // A polygon spanning roughly 170E to -170E (i.e. crossing 180).
    let polygon = Polygon { vertices: vec![(0.0, 170.0), (10.0, 170.0), (10.0, -170.0), (0.0, -170.0)] };
    let parts = polygon.split_at_antimeridian();
    assert_eq!(parts.len(), 2);

    let mut index = GeoIndex::new();
    index.insert(1, 5.0, 175.0);
    index.insert(2, 5.0, -175.0);
    index.insert(3, 5.0, 0.0);

    let contained: Vec<u32> = [1u32, 2, 3]
        .into_iter()
        .filter(|&id| {
            let (lat, lng) = index.coords_of(id).unwrap();
            parts.iter().any(|p| p.contains(lat, lng))
        })
        .collect();

    assert!(contained.contains(&1));
    assert!(contained.contains(&2));
    assert!(!contained.contains(&3));
}

/// A geo radius query returns only points within the requested distance.
#[test]
fn geo_within_radius_excludes_points_outside_the_requested_distance() {
    let mut index = GeoIndex::new();
    index.insert(1, 37.7749, -122.4194); // San Francisco
    index.insert(2, 34.0522, -118.2437); // Los Angeles, ~560km away
    let nearby = index.within_radius(37.7749, -122.4194, 10_000.0);
    assert!(nearby.contains(1));
    assert!(!nearby.contains(2));
}
