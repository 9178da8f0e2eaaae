//! Typo-tolerant, faceted, full-text + vector search engine core.
//!
//! Each module implements one of the spec's components: [`containers`]
//! (C1, bit-packed integer runs), [`posting`] (C2, per-token posting
//! lists), [`numeric`] (C3, ordered range tree), [`geo`] (C4, geo cell
//! index), [`facet`] (C5, faceted value counters), [`string`] (C6,
//! tokenizer + fuzzy radix trie), [`vector`] (C7, vector adapter),
//! [`filter`] (C8, filter iterator tree), [`topk`] (C9, bounded Top-K /
//! grouped heap), [`search`] (C10, the orchestrator), and [`curation`]
//! (C11, curation/override rules). [`collection`] ties C1–C7 into one
//! collection's index set; [`schema`] and [`config`] hold the document
//! schema model and tunable engine constants; [`error`] is the shared
//! error hierarchy.

pub mod collection;
pub mod config;
pub mod containers;
pub mod curation;
pub mod error;
pub mod facet;
pub mod filter;
pub mod geo;
pub mod numeric;
pub mod posting;
pub mod registry;
pub mod schema;
pub mod search;
pub mod string;
pub mod synonyms;
pub mod topk;
pub mod vector;

pub use collection::{Collection, WriteMode};
pub use config::EngineConfig;
pub use error::{Error, ErrorCode};
pub use registry::CollectionManager;
pub use schema::{CollectionSchema, Document, FieldSchema, FieldType};
pub use search::{SearchOrchestrator, SearchRequest, SearchResponse};
