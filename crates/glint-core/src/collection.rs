//! Ties C1–C7 together into one collection's in-memory index set, and
//! realizes spec §5's concurrency model: callers wrap a [`Collection`] in
//! `parking_lot::RwLock` (shared access for search, exclusive for
//! upsert/delete/schema-change), matching `meilisearch-types`' own use of
//! `parking_lot` for shared mutable index state. The vector indices get
//! their own `Mutex` per field since the underlying adapter is not
//! re-entrant (spec §5 "Vector index").

use fxhash::FxHashMap;
use parking_lot::Mutex;
use roaring::RoaringBitmap;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::error::{Error, NotFoundError};
use crate::facet::FacetIndex;
use crate::geo::GeoIndex;
use crate::numeric::NumericTree;
use crate::posting::PostingList;
use crate::schema::{CollectionSchema, Document, FieldType};
use crate::string::{tokenize, RadixTrie};
use crate::vector::VectorIndex;

/// Per-field string index: a radix trie of seen tokens plus the token's
/// posting list, keyed by the same token string (spec §4.3's "leaves carry
/// a pointer to the token's posting list").
#[derive(Default)]
pub struct StringFieldIndex {
    pub trie: RadixTrie,
    pub postings: FxHashMap<String, PostingList>,
}

impl StringFieldIndex {
    fn insert_token(&mut self, token: &str, id: u32, offsets: Vec<u32>, config: &EngineConfig) {
        if !self.trie.contains(token) {
            self.trie.insert(token);
        }
        self.postings.entry(token.to_string()).or_insert_with(PostingList::new).upsert(id, offsets, config);
    }

    fn erase_token(&mut self, token: &str, id: u32, config: &EngineConfig) {
        if let Some(list) = self.postings.get_mut(token) {
            list.erase(id, config);
            if list.is_empty() {
                self.postings.remove(token);
            }
        }
    }
}

#[derive(Default)]
pub struct Collection {
    pub schema: CollectionSchema,
    pub config: EngineConfig,
    documents: FxHashMap<u32, Document>,
    /// User-declared key field value -> seq_id, for upsert/reference lookups.
    key_index: FxHashMap<String, u32>,
    string_fields: FxHashMap<String, StringFieldIndex>,
    numeric_fields: FxHashMap<String, NumericTree>,
    geo_fields: FxHashMap<String, GeoIndex>,
    facet_fields: FxHashMap<String, FacetIndex>,
    vector_fields: FxHashMap<String, Mutex<VectorIndex>>,
    next_seq_id: u32,
}

pub enum WriteMode {
    Create,
    Upsert,
    Update,
    Emplace,
}

impl Collection {
    pub fn new(schema: CollectionSchema, config: EngineConfig) -> Self {
        let mut collection = Self {
            schema,
            config,
            documents: FxHashMap::default(),
            key_index: FxHashMap::default(),
            string_fields: FxHashMap::default(),
            numeric_fields: FxHashMap::default(),
            geo_fields: FxHashMap::default(),
            facet_fields: FxHashMap::default(),
            vector_fields: FxHashMap::default(),
            next_seq_id: 0,
        };
        for field in collection.schema.fields.clone() {
            match field.field_type {
                FieldType::Vector => {
                    let dim = field.vector_dimension.unwrap_or(0);
                    let metric = field.vector_distance.unwrap_or(crate::vector::DistanceMetric::Cosine);
                    collection.vector_fields.insert(field.name.clone(), Mutex::new(VectorIndex::new(field.name.clone(), dim, metric)));
                }
                FieldType::GeoPoint => {
                    collection.geo_fields.insert(field.name.clone(), GeoIndex::new());
                }
                FieldType::Int32 | FieldType::Int64 | FieldType::Float | FieldType::Bool => {
                    collection.numeric_fields.insert(field.name.clone(), NumericTree::new());
                }
                _ => {}
            }
            if field.facet {
                collection.facet_fields.insert(field.name.clone(), FacetIndex::new());
            }
        }
        collection
    }

    pub fn document(&self, seq_id: u32) -> Option<&Document> {
        self.documents.get(&seq_id)
    }

    /// The user-declared key string a document was inserted under, or its
    /// `seq_id` rendered as a string if it has none. Used by the curation
    /// engine, which addresses documents by their external id.
    pub fn key_of(&self, seq_id: u32) -> String {
        self.key_index.iter().find(|(_, &v)| v == seq_id).map(|(k, _)| k.clone()).unwrap_or_else(|| seq_id.to_string())
    }

    /// The seq_id a document was assigned under its declared key, falling
    /// back to parsing the key itself as a raw seq_id (spec §6's `id` filter
    /// leaf accepts either form).
    pub fn seq_id_of(&self, key: &str) -> Option<u32> {
        self.key_index.get(key).copied().or_else(|| key.parse::<u32>().ok().filter(|id| self.documents.contains_key(id)))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn string_field(&self, name: &str) -> Option<&StringFieldIndex> {
        self.string_fields.get(name)
    }

    pub fn numeric_field(&self, name: &str) -> Option<&NumericTree> {
        self.numeric_fields.get(name)
    }

    pub fn geo_field(&self, name: &str) -> Option<&GeoIndex> {
        self.geo_fields.get(name)
    }

    pub fn facet_field(&self, name: &str) -> Option<&FacetIndex> {
        self.facet_fields.get(name)
    }

    pub fn vector_field(&self, name: &str) -> Option<&Mutex<VectorIndex>> {
        self.vector_fields.get(name)
    }

    /// Inserts (or, under `WriteMode::Upsert`/`Update`, replaces) a document,
    /// keeping every specialized index mutually consistent per spec §3's
    /// lifecycle invariant. A vector-field failure rejects the whole
    /// document rather than leaving a half-indexed state (spec §7).
    #[instrument(skip(self, body), fields(collection_docs = self.documents.len()))]
    pub fn add_document(&mut self, key: Option<String>, body: Value, mode: WriteMode) -> Result<u32, Error> {
        self.schema.validate(&body)?;

        let existing_seq_id = key.as_deref().and_then(|k| self.key_index.get(k).copied());
        match (&mode, existing_seq_id) {
            (WriteMode::Create, Some(_)) => {
                return Err(Error::Conflict(crate::error::ConflictError::SchemaInvariant(format!(
                    "document with key {:?} already exists",
                    key
                ))))
            }
            (WriteMode::Update, None) => {
                return Err(Error::NotFound(NotFoundError::Document(key.unwrap_or_default())))
            }
            _ => {}
        }

        if let Some(seq_id) = existing_seq_id {
            self.remove_document_indices(seq_id);
            self.documents.insert(seq_id, Document { seq_id, body: body.clone() });
            self.index_document(seq_id, &body)?;
            debug!(seq_id, "reindexed existing document");
            return Ok(seq_id);
        }

        let seq_id = self.next_seq_id;
        self.next_seq_id += 1;
        if let Some(k) = key {
            self.key_index.insert(k, seq_id);
        }
        self.documents.insert(seq_id, Document { seq_id, body: body.clone() });
        self.index_document(seq_id, &body)?;
        Ok(seq_id)
    }

    fn index_document(&mut self, seq_id: u32, body: &Value) -> Result<(), Error> {
        let fields = self.schema.fields.clone();
        for field in &fields {
            let Some(value) = body.get(&field.name) else { continue };
            match field.field_type {
                FieldType::String if field.index => {
                    let text = value.as_str().unwrap_or_default();
                    let entry = self.string_fields.entry(field.name.clone()).or_default();
                    for token in tokenize(text) {
                        entry.insert_token(&token.text, seq_id, vec![token.position], &self.config);
                    }
                }
                FieldType::Int32 | FieldType::Int64 if field.index => {
                    if let Some(n) = value.as_i64() {
                        self.numeric_fields.entry(field.name.clone()).or_default().insert_int(seq_id, n);
                    }
                }
                FieldType::Float if field.index => {
                    if let Some(n) = value.as_f64() {
                        self.numeric_fields.entry(field.name.clone()).or_default().insert_float(seq_id, n);
                    }
                }
                FieldType::Bool if field.index => {
                    if let Some(b) = value.as_bool() {
                        self.numeric_fields.entry(field.name.clone()).or_default().insert_bool(seq_id, b);
                    }
                }
                FieldType::GeoPoint if field.index => {
                    if let Some(arr) = value.as_array() {
                        if let [lat, lng] = arr.as_slice() {
                            if let (Some(lat), Some(lng)) = (lat.as_f64(), lng.as_f64()) {
                                self.geo_fields.entry(field.name.clone()).or_default().insert(seq_id, lat, lng);
                            }
                        }
                    }
                }
                FieldType::Vector => {
                    if let Some(arr) = value.as_array() {
                        let vector: Vec<f32> = arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect();
                        if let Some(index) = self.vector_fields.get(&field.name) {
                            index.lock().insert(seq_id, vector)?;
                        }
                    }
                }
                _ => {}
            }

            if field.facet {
                let facet_index = self.facet_fields.entry(field.name.clone()).or_default();
                for facet_value in facet_value_strings(value) {
                    facet_index.insert(seq_id, &facet_value, &self.config);
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn remove_document(&mut self, seq_id: u32) -> Result<(), Error> {
        if !self.documents.contains_key(&seq_id) {
            return Err(Error::NotFound(NotFoundError::Document(seq_id.to_string())));
        }
        self.remove_document_indices(seq_id);
        self.documents.remove(&seq_id);
        self.key_index.retain(|_, v| *v != seq_id);
        Ok(())
    }

    fn remove_document_indices(&mut self, seq_id: u32) {
        let Some(doc) = self.documents.get(&seq_id).cloned() else { return };
        let fields = self.schema.fields.clone();
        for field in &fields {
            let Some(value) = doc.body.get(&field.name) else { continue };
            match field.field_type {
                FieldType::String if field.index => {
                    let text = value.as_str().unwrap_or_default();
                    if let Some(entry) = self.string_fields.get_mut(&field.name) {
                        for token in tokenize(text) {
                            entry.erase_token(&token.text, seq_id, &self.config);
                        }
                    }
                }
                FieldType::Int32 | FieldType::Int64 if field.index => {
                    if let (Some(tree), Some(n)) = (self.numeric_fields.get_mut(&field.name), value.as_i64()) {
                        tree.remove_int(seq_id, n);
                    }
                }
                FieldType::Float if field.index => {
                    if let (Some(tree), Some(n)) = (self.numeric_fields.get_mut(&field.name), value.as_f64()) {
                        tree.remove_float(seq_id, n);
                    }
                }
                FieldType::Bool if field.index => {
                    if let (Some(tree), Some(b)) = (self.numeric_fields.get_mut(&field.name), value.as_bool()) {
                        tree.remove_bool(seq_id, b);
                    }
                }
                FieldType::GeoPoint if field.index => {
                    if let Some(geo) = self.geo_fields.get_mut(&field.name) {
                        geo.remove(seq_id);
                    }
                }
                FieldType::Vector => {
                    if let Some(index) = self.vector_fields.get(&field.name) {
                        index.lock().erase(seq_id);
                    }
                }
                _ => {}
            }

            if field.facet {
                if let Some(facet_index) = self.facet_fields.get_mut(&field.name) {
                    for facet_value in facet_value_strings(value) {
                        facet_index.delete(seq_id, &facet_value);
                    }
                }
            }
        }
    }

    /// All currently-live document ids, used by the orchestrator as the
    /// universe for wildcard queries and NOT-equals gap walking.
    pub fn all_ids(&self) -> RoaringBitmap {
        self.documents.keys().copied().collect()
    }

    pub fn check_facet_fallbacks(&mut self) {
        let config = self.config.clone();
        for facet in self.facet_fields.values_mut() {
            facet.reindex_if_needed(&config);
        }
        if self.facet_fields.is_empty() {
            warn!("check_facet_fallbacks called on a collection with no facet fields");
        }
    }
}

fn facet_value_strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.chars().take(255).collect()],
        Value::Array(items) => items.iter().flat_map(facet_value_strings).collect(),
        Value::Number(n) => vec![n.to_string()],
        Value::Bool(b) => vec![b.to_string()],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use serde_json::json;

    fn schema() -> CollectionSchema {
        CollectionSchema {
            fields: vec![
                FieldSchema { facet: true, ..FieldSchema::new("brand", FieldType::String) },
                FieldSchema::new("price", FieldType::Int32),
            ],
            key_field: Some("id".into()),
        }
    }

    #[test]
    fn inserts_and_retrieves_a_document() {
        let mut collection = Collection::new(schema(), EngineConfig::default());
        let seq_id = collection.add_document(Some("1".into()), json!({"brand": "nike", "price": 10}), WriteMode::Create).unwrap();
        assert_eq!(collection.document(seq_id).unwrap().body["brand"], "nike");
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn facet_counts_drop_to_one_then_disappear_on_last_delete() {
        let mut collection = Collection::new(schema(), EngineConfig::default());
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(collection.add_document(Some(i.to_string()), json!({"brand": "nike", "price": 5}), WriteMode::Create).unwrap());
        }
        assert_eq!(collection.facet_field("brand").unwrap().value_doc_count("nike"), Some(3));
        collection.remove_document(ids[0]).unwrap();
        collection.remove_document(ids[1]).unwrap();
        assert_eq!(collection.facet_field("brand").unwrap().value_doc_count("nike"), Some(1));
        collection.remove_document(ids[2]).unwrap();
        assert_eq!(collection.facet_field("brand").unwrap().value_doc_count("nike"), None);
    }

    #[test]
    fn upsert_reindexes_in_place_without_growing_seq_ids() {
        let mut collection = Collection::new(schema(), EngineConfig::default());
        let seq_id = collection.add_document(Some("1".into()), json!({"brand": "nike", "price": 5}), WriteMode::Create).unwrap();
        let seq_id2 =
            collection.add_document(Some("1".into()), json!({"brand": "adidas", "price": 7}), WriteMode::Upsert).unwrap();
        assert_eq!(seq_id, seq_id2);
        assert_eq!(collection.facet_field("brand").unwrap().value_doc_count("nike"), None);
        assert_eq!(collection.facet_field("brand").unwrap().value_doc_count("adidas"), Some(1));
    }

    #[test]
    fn create_on_existing_key_is_a_conflict() {
        let mut collection = Collection::new(schema(), EngineConfig::default());
        collection.add_document(Some("1".into()), json!({"brand": "nike", "price": 5}), WriteMode::Create).unwrap();
        let err = collection.add_document(Some("1".into()), json!({"brand": "nike", "price": 5}), WriteMode::Create).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn remove_unknown_document_is_not_found() {
        let mut collection = Collection::new(schema(), EngineConfig::default());
        let err = collection.remove_document(999).unwrap_err();
        assert!(matches!(err, Error::NotFound(NotFoundError::Document(_))));
    }
}
