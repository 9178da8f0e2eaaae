//! Collection schema and document model (spec §3).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ValidationError};
use crate::vector::DistanceMetric;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Int32,
    Int64,
    Float,
    Bool,
    GeoPoint,
    StringArray,
    Int32Array,
    Int64Array,
    FloatArray,
    BoolArray,
    Object,
    ObjectArray,
    Vector,
}

impl FieldType {
    pub fn is_array(&self) -> bool {
        matches!(
            self,
            FieldType::StringArray
                | FieldType::Int32Array
                | FieldType::Int64Array
                | FieldType::FloatArray
                | FieldType::BoolArray
                | FieldType::ObjectArray
        )
    }
}

/// One field's schema entry (spec §3 "Field schema entry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub facet: bool,
    pub sort: bool,
    pub index: bool,
    pub optional: bool,
    pub infix: bool,
    pub locale: Option<String>,
    pub vector_dimension: Option<usize>,
    pub vector_distance: Option<DistanceMetric>,
    /// Name of the collection this field's value is a key into, for
    /// reference (`$Collection`) fields.
    pub reference: Option<String>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            facet: false,
            sort: false,
            index: true,
            optional: false,
            infix: false,
            locale: None,
            vector_dimension: None,
            vector_distance: None,
            reference: None,
        }
    }
}

/// The collection-wide field schema, keyed by field name plus the
/// declared key field used for upsert/reference resolution.
#[derive(Debug, Clone, Default)]
pub struct CollectionSchema {
    pub fields: Vec<FieldSchema>,
    pub key_field: Option<String>,
}

impl CollectionSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Coerces and validates `doc` against the schema (spec §3's
    /// non-optional-field invariant): every declared, non-optional field
    /// must be present and coercible to its declared type, or the document
    /// is rejected outright.
    pub fn validate(&self, doc: &Value) -> Result<(), Error> {
        let Value::Object(map) = doc else {
            return Err(Error::Validation(ValidationError::MalformedJson("document root must be a JSON object".into())));
        };
        for field in &self.fields {
            match map.get(&field.name) {
                Some(value) => {
                    if !type_matches(&field.field_type, value) {
                        return Err(Error::Validation(ValidationError::TypeCoercion {
                            field: field.name.clone(),
                            expected: type_name(&field.field_type),
                        }));
                    }
                }
                None if !field.optional => {
                    return Err(Error::Validation(ValidationError::MissingField(field.name.clone())));
                }
                None => {}
            }
        }
        Ok(())
    }
}

fn type_matches(field_type: &FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Int32 | FieldType::Int64 => value.is_i64() || value.is_u64(),
        FieldType::Float => value.is_number(),
        FieldType::Bool => value.is_boolean(),
        FieldType::GeoPoint => value.as_array().map_or(false, |a| a.len() == 2 && a.iter().all(|v| v.is_number())),
        FieldType::StringArray => value.as_array().map_or(false, |a| a.iter().all(|v| v.is_string())),
        FieldType::Int32Array | FieldType::Int64Array => {
            value.as_array().map_or(false, |a| a.iter().all(|v| v.is_i64() || v.is_u64()))
        }
        FieldType::FloatArray => value.as_array().map_or(false, |a| a.iter().all(|v| v.is_number())),
        FieldType::BoolArray => value.as_array().map_or(false, |a| a.iter().all(|v| v.is_boolean())),
        FieldType::Object => value.is_object(),
        FieldType::ObjectArray => value.as_array().map_or(false, |a| a.iter().all(|v| v.is_object())),
        FieldType::Vector => value.as_array().map_or(false, |a| a.iter().all(|v| v.is_number())),
    }
}

fn type_name(field_type: &FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Int32 => "int32",
        FieldType::Int64 => "int64",
        FieldType::Float => "float",
        FieldType::Bool => "bool",
        FieldType::GeoPoint => "geopoint",
        FieldType::StringArray => "string[]",
        FieldType::Int32Array => "int32[]",
        FieldType::Int64Array => "int64[]",
        FieldType::FloatArray => "float[]",
        FieldType::BoolArray => "bool[]",
        FieldType::Object => "object",
        FieldType::ObjectArray => "object[]",
        FieldType::Vector => "vector",
    }
}

/// An accepted document: its assigned `seq_id` plus the raw JSON body, the
/// unit the posting/numeric/geo/facet/vector indices are built from.
#[derive(Debug, Clone)]
pub struct Document {
    pub seq_id: u32,
    pub body: Value,
}
