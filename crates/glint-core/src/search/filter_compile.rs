//! Compiles a parsed `glint_filter_parser::FilterExpr` into the C8 filter
//! iterator tree bound to one collection's indices. Grounded on spec §4.6's
//! leaf-materialization rule: numeric/bool leaves read straight off
//! [`NumericTree`](crate::numeric::NumericTree), facet-enabled string
//! leaves off [`FacetIndex::ids_of`](crate::facet::FacetIndex::ids_of), and
//! plain string leaves off the field's token posting lists.
//!
//! Reference leaves (`$Collection(inner_filter)`) resolve through a
//! [`CollectionManager`], per spec §4.6: the sub-filter runs against the
//! referenced collection, and matched ids are mapped back through whichever
//! field in *this* collection declares `reference: Some(that collection)`
//! (grounded on `filter_result_iterator.cpp`'s reference-filter branch).

use glint_filter_parser::{FilterExpr, Op, Token};
use roaring::RoaringBitmap;

use crate::collection::Collection;
use crate::error::{Error, ValidationError};
use crate::filter::{AndIter, FilterIterator, IdSetIter, NotEqualsIter, OrIter};
use crate::numeric::{bool_key, f64_to_ordered_u64, int_key};
use crate::posting::intersect;
use crate::registry::CollectionManager;
use crate::schema::FieldType;
use crate::string::tokenize;

pub fn compile_filter(
    expr: &FilterExpr,
    collection: &Collection,
    registry: Option<&CollectionManager>,
) -> Result<Box<dyn FilterIterator + Send>, Error> {
    match expr {
        FilterExpr::And(l, r) => {
            let (l, r) = (compile_filter(l, collection, registry)?, compile_filter(r, collection, registry)?);
            Ok(Box::new(AndIter::new(l, r)))
        }
        FilterExpr::Or(l, r) => {
            let (l, r) = (compile_filter(l, collection, registry)?, compile_filter(r, collection, registry)?);
            Ok(Box::new(OrIter::new(l, r)))
        }
        FilterExpr::Reference { collection: name, inner } => compile_reference_condition(name, inner, collection, registry),
        FilterExpr::Condition { field, op, values } => compile_condition(field, *op, values, collection),
    }
}

fn compile_reference_condition(
    ref_name: &Token,
    inner: &FilterExpr,
    collection: &Collection,
    registry: Option<&CollectionManager>,
) -> Result<Box<dyn FilterIterator + Send>, Error> {
    let ref_collection_name = ref_name.value();
    let registry = registry.ok_or_else(|| {
        Error::Validation(ValidationError::MalformedFilter(format!(
            "reference filter on `{ref_collection_name}` requires a collection registry"
        )))
    })?;

    let ref_lock = registry.get(ref_collection_name)?;

    let field = collection
        .schema
        .fields
        .iter()
        .find(|f| f.reference.as_deref() == Some(ref_collection_name))
        .ok_or_else(|| {
            Error::Validation(ValidationError::MalformedFilter(format!(
                "could not find a field in this collection referencing `{ref_collection_name}`"
            )))
        })?;
    let ref_collection = ref_lock.read();
    let inner_iter = compile_filter(inner, &ref_collection, Some(registry))?;
    let matched = crate::filter::collect_ids(inner_iter);

    let mut out = RoaringBitmap::new();
    for ref_seq_id in matched.iter() {
        let key = ref_collection.key_of(ref_seq_id);
        out |= string_value_ids(&field.name, &key, collection, field.facet);
    }
    Ok(Box::new(IdSetIter::new(out)))
}

fn compile_condition(
    field: &Token,
    op: Op,
    values: &[Token],
    collection: &Collection,
) -> Result<Box<dyn FilterIterator + Send>, Error> {
    let field_name = field.value();

    if field_name == "id" {
        return compile_id_condition(op, values, collection);
    }

    let Some(schema) = collection.schema.field(field_name) else {
        return Err(Error::Validation(ValidationError::UnknownField(field_name.to_string())));
    };

    match schema.field_type {
        FieldType::Int32 | FieldType::Int64 => compile_numeric_condition(field_name, op, values, collection, |t| {
            t.value().parse::<i64>().map(int_key).map_err(|_| malformed(field_name, t))
        }),
        FieldType::Float => compile_numeric_condition(field_name, op, values, collection, |t| {
            t.parse_finite_float().map(f64_to_ordered_u64).map_err(|_| malformed(field_name, t))
        }),
        FieldType::Bool => compile_numeric_condition(field_name, op, values, collection, |t| match t.value() {
            "true" => Ok(bool_key(true)),
            "false" => Ok(bool_key(false)),
            _ => Err(malformed(field_name, t)),
        }),
        FieldType::String => compile_string_condition(field_name, op, values, collection, schema.facet),
        _ => Err(Error::Validation(ValidationError::MalformedFilter(format!(
            "field `{field_name}` has a type this filter grammar does not support"
        )))),
    }
}

fn malformed(field: &str, token: &Token) -> Error {
    Error::Validation(ValidationError::MalformedFilter(format!(
        "value `{}` is not valid for field `{field}`",
        token.value()
    )))
}

fn compile_id_condition(op: Op, values: &[Token], collection: &Collection) -> Result<Box<dyn FilterIterator + Send>, Error> {
    let ids: Vec<u32> = values
        .iter()
        .filter_map(|t| collection.seq_id_of(t.value()))
        .collect();
    let set: RoaringBitmap = ids.into_iter().collect();
    if op == Op::NotEq {
        return Ok(Box::new(NotEqualsIter::new(collection.all_ids(), set)));
    }
    Ok(Box::new(IdSetIter::new(set)))
}

fn compile_numeric_condition(
    field_name: &str,
    op: Op,
    values: &[Token],
    collection: &Collection,
    encode: impl Fn(&Token) -> Result<u64, Error>,
) -> Result<Box<dyn FilterIterator + Send>, Error> {
    let Some(tree) = collection.numeric_field(field_name) else {
        return Ok(Box::new(IdSetIter::new(RoaringBitmap::new())));
    };

    if op == Op::NotEq {
        let t = values
            .first()
            .ok_or_else(|| Error::Validation(ValidationError::MalformedFilter(format!("field `{field_name}` needs a value"))))?;
        let excluded = tree.equals(encode(t)?);
        return Ok(Box::new(NotEqualsIter::new(tree.all_ids().clone(), excluded)));
    }

    let ids = match op {
        Op::Eq | Op::SetEq => {
            let mut out = RoaringBitmap::new();
            for t in values {
                out |= tree.equals(encode(t)?);
            }
            out
        }
        Op::NotEq => unreachable!("handled above"),
        Op::Gt => {
            let t = values.first().ok_or_else(|| Error::Validation(ValidationError::MalformedFilter(format!("field `{field_name}` needs a value"))))?;
            tree.greater_than(encode(t)?, false)
        }
        Op::Gte => {
            let t = values.first().ok_or_else(|| Error::Validation(ValidationError::MalformedFilter(format!("field `{field_name}` needs a value"))))?;
            tree.greater_than(encode(t)?, true)
        }
        Op::Lt => {
            let t = values.first().ok_or_else(|| Error::Validation(ValidationError::MalformedFilter(format!("field `{field_name}` needs a value"))))?;
            tree.less_than(encode(t)?, false)
        }
        Op::Lte => {
            let t = values.first().ok_or_else(|| Error::Validation(ValidationError::MalformedFilter(format!("field `{field_name}` needs a value"))))?;
            tree.less_than(encode(t)?, true)
        }
        Op::Range => {
            if values.len() != 2 {
                return Err(Error::Validation(ValidationError::MalformedFilter(format!("field `{field_name}` range needs exactly two bounds"))));
            }
            tree.range(encode(&values[0])?, encode(&values[1])?)
        }
    };
    Ok(Box::new(IdSetIter::new(ids)))
}

fn compile_string_condition(
    field_name: &str,
    op: Op,
    values: &[Token],
    collection: &Collection,
    is_facet: bool,
) -> Result<Box<dyn FilterIterator + Send>, Error> {
    let mut out = RoaringBitmap::new();
    for t in values {
        out |= string_value_ids(field_name, t.value(), collection, is_facet);
    }

    if op == Op::NotEq {
        return Ok(Box::new(NotEqualsIter::new(collection.all_ids(), out)));
    }
    Ok(Box::new(IdSetIter::new(out)))
}

/// The id set carrying `value` in a string field: the facet index's
/// materialized list when the field is facet-enabled (SPEC_FULL §C.1), or
/// the intersection of each value token's posting list otherwise.
fn string_value_ids(field_name: &str, value: &str, collection: &Collection, is_facet: bool) -> RoaringBitmap {
    if is_facet {
        if let Some(facet) = collection.facet_field(field_name) {
            return facet.ids_of(value);
        }
    }

    let Some(index) = collection.string_field(field_name) else {
        return RoaringBitmap::new();
    };
    let tokens = tokenize(value);
    if tokens.is_empty() {
        return RoaringBitmap::new();
    }
    let lists: Vec<&crate::posting::PostingList> = match tokens.iter().map(|t| index.postings.get(&t.text)).collect::<Option<Vec<_>>>() {
        Some(l) => l,
        None => return RoaringBitmap::new(),
    };
    intersect(&lists).into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::{CollectionSchema, FieldSchema};
    use crate::WriteMode;
    use glint_filter_parser::parse_filter;
    use serde_json::json;

    fn build() -> Collection {
        let schema = CollectionSchema {
            fields: vec![
                FieldSchema { facet: true, ..FieldSchema::new("brand", FieldType::String) },
                FieldSchema::new("price", FieldType::Int32),
            ],
            key_field: Some("id".into()),
        };
        let mut collection = Collection::new(schema, EngineConfig::default());
        collection.add_document(Some("0".into()), json!({"brand": "nike", "price": 10}), WriteMode::Create).unwrap();
        collection.add_document(Some("1".into()), json!({"brand": "adidas", "price": 20}), WriteMode::Create).unwrap();
        collection
    }

    #[test]
    fn compiles_facet_equality_to_a_materialized_id_set() {
        let collection = build();
        let ast = parse_filter("brand:nike").unwrap();
        let iter = compile_filter(&ast, &collection, None).unwrap();
        let ids = crate::filter::collect_ids(iter);
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn compiles_numeric_range() {
        let collection = build();
        let ast = parse_filter("price:[5..15]").unwrap();
        let iter = compile_filter(&ast, &collection, None).unwrap();
        let ids = crate::filter::collect_ids(iter);
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn compiles_and_of_two_conditions() {
        let collection = build();
        let ast = parse_filter("brand:nike && price:10").unwrap();
        let iter = compile_filter(&ast, &collection, None).unwrap();
        let ids = crate::filter::collect_ids(iter);
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn not_equals_on_a_facet_field_uses_the_notequals_cursor() {
        let collection = build();
        let ast = parse_filter("brand:!=nike").unwrap();
        let iter = compile_filter(&ast, &collection, None).unwrap();
        let ids = crate::filter::collect_ids(iter);
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn not_equals_on_a_numeric_field_uses_the_notequals_cursor() {
        let collection = build();
        let ast = parse_filter("price:!=10").unwrap();
        let iter = compile_filter(&ast, &collection, None).unwrap();
        let ids = crate::filter::collect_ids(iter);
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn reference_filter_without_a_registry_is_rejected() {
        let collection = build();
        let ast = parse_filter("$Authors(name:=[tolkien])").unwrap();
        let err = compile_filter(&ast, &collection, None).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::MalformedFilter(_))));
    }

    #[test]
    fn reference_filter_resolves_through_the_registry() {
        let authors_schema = CollectionSchema {
            fields: vec![FieldSchema::new("name", FieldType::String)],
            key_field: Some("id".into()),
        };
        let mut authors = Collection::new(authors_schema, EngineConfig::default());
        authors.add_document(Some("a1".into()), json!({"name": "tolkien"}), WriteMode::Create).unwrap();
        authors.add_document(Some("a2".into()), json!({"name": "orwell"}), WriteMode::Create).unwrap();

        let books_schema = CollectionSchema {
            fields: vec![
                FieldSchema::new("title", FieldType::String),
                FieldSchema { reference: Some("authors".into()), ..FieldSchema::new("author_id", FieldType::String) },
            ],
            key_field: Some("id".into()),
        };
        let mut books = Collection::new(books_schema, EngineConfig::default());
        books.add_document(Some("b1".into()), json!({"title": "the hobbit", "author_id": "a1"}), WriteMode::Create).unwrap();
        books.add_document(Some("b2".into()), json!({"title": "1984", "author_id": "a2"}), WriteMode::Create).unwrap();

        let mut registry = CollectionManager::new();
        registry.insert("authors", authors);

        let ast = parse_filter("$authors(name:=[tolkien])").unwrap();
        let iter = compile_filter(&ast, &books, Some(&registry)).unwrap();
        let ids = crate::filter::collect_ids(iter);
        assert_eq!(ids.iter().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn reference_filter_to_an_unregistered_collection_is_not_found() {
        let collection = build();
        let registry = CollectionManager::new();
        let ast = parse_filter("$Authors(name:=[tolkien])").unwrap();
        let err = compile_filter(&ast, &collection, Some(&registry)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
