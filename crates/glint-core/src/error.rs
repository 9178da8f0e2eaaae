//! Error types for the search core.
//!
//! Mirrors the teacher's `InternalError`/`UserError` split (see `milli::error`)
//! but carries the HTTP-style status codes from spec §7 directly on the
//! error kind so that the (out-of-scope) HTTP layer can map a [`Error`]
//! straight onto a response without re-deriving the code.

use thiserror::Error;

/// The HTTP-style status a caller should report for an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Conflict,
    UnprocessableEntity,
    RequestTimeout,
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    NotFound(#[from] NotFoundError),
    #[error("{0}")]
    Conflict(#[from] ConflictError),
    #[error("{0}")]
    Capacity(#[from] CapacityError),
    #[error("search timed out before completion")]
    Timeout,
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Validation(_) => ErrorCode::BadRequest,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Conflict(_) => ErrorCode::Conflict,
            Error::Capacity(_) => ErrorCode::UnprocessableEntity,
            Error::Timeout => ErrorCode::RequestTimeout,
            Error::Internal(_) => ErrorCode::Internal,
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("malformed JSON document: {0}")]
    MalformedJson(String),
    #[error("field `{0}` is required but missing")]
    MissingField(String),
    #[error("field `{field}` could not be coerced to {expected}")]
    TypeCoercion { field: String, expected: &'static str },
    #[error("malformed filter expression: {0}")]
    MalformedFilter(String),
    #[error("malformed sort expression: {0}")]
    MalformedSort(String),
    #[error("malformed vector query: {0}")]
    MalformedVectorQuery(String),
    #[error("vector for field `{field}` has dimension {actual}, expected {expected}")]
    VectorDimensionMismatch { field: String, expected: usize, actual: usize },
    #[error("unknown field `{0}`")]
    UnknownField(String),
}

#[derive(Error, Debug)]
pub enum NotFoundError {
    #[error("collection `{0}` not found")]
    Collection(String),
    #[error("document `{0}` not found")]
    Document(String),
    #[error("preset `{0}` not found")]
    Preset(String),
    #[error("override `{0}` not found")]
    Override(String),
}

#[derive(Error, Debug)]
pub enum ConflictError {
    #[error("collection `{0}` already exists")]
    CollectionExists(String),
    #[error("schema change would violate an existing invariant: {0}")]
    SchemaInvariant(String),
}

#[derive(Error, Debug)]
pub enum CapacityError {
    #[error("collection has reached its document capacity of {0}")]
    DocumentCapReached(usize),
    #[error("requested result window of {0} exceeds the maximum of {1}")]
    ResultCapExceeded(usize, usize),
}

#[derive(Error, Debug)]
pub enum InternalError {
    #[error("posting list invariant violated: {0}")]
    PostingListInvariant(String),
    #[error("facet index invariant violated: {0}")]
    FacetInvariant(String),
    #[error("vector graph inconsistency: {0}")]
    VectorGraph(String),
    #[error("unexpected invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
