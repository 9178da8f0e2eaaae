//! Multi-collection registry (spec §9's "collection manager" design note):
//! the source's `CollectionManager` singleton re-architected as a plain
//! service object passed by reference, each collection guarded by its own
//! `parking_lot::RwLock` per spec §5's concurrency model rather than one
//! global lock.
//!
//! Exists so reference filters (spec §4.6, `$Collection(inner_filter)`) can
//! resolve a sub-filter against another collection without the orchestrator
//! owning every collection directly.

use fxhash::FxHashMap;
use parking_lot::RwLock;

use crate::collection::Collection;
use crate::error::{Error, NotFoundError};

#[derive(Default)]
pub struct CollectionManager {
    collections: FxHashMap<String, RwLock<Collection>>,
}

impl CollectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, collection: Collection) {
        self.collections.insert(name.into(), RwLock::new(collection));
    }

    pub fn remove(&mut self, name: &str) -> Option<Collection> {
        self.collections.remove(name).map(RwLock::into_inner)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&RwLock<Collection>, Error> {
        self.collections.get(name).ok_or_else(|| Error::NotFound(NotFoundError::Collection(name.to_string())))
    }
}
