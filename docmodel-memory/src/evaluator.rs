//! Filter evaluation for in-memory documents.
//!
//! This module provides the evaluation engine for filter expressions,
//! enabling filtering and comparison operations on BSON documents.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docmodel_core::{
    error::{ModelError, ModelResult},
    filter::{Expr, FieldOp, FilterVisitor},
};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to f64. Values without an ordering (binary data, regexes, ...)
/// compare by BSON equality only.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value (all integers and floats normalized to f64)
    Number(f64),
    /// DateTime value
    DateTime(DateTime),
    /// Object identifier
    ObjectId(ObjectId),
    /// String value
    String(&'a str),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other value
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Resolves a dotted field path (`address.city`) inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> ModelResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns true if `document` matches `expr`.
    pub fn matches(document: &'a Document, expr: &Expr) -> ModelResult<bool> {
        DocumentEvaluator::new(document).evaluate(expr)
    }
}

impl<'a> FilterVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = ModelError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = lookup(self.document, field) else {
            // Missing fields only satisfy negative operators.
            return Ok(matches!(op, FieldOp::Ne | FieldOp::NotContains | FieldOp::NoneOf));
        };

        match op {
            FieldOp::Eq => Ok(Comparable::from(field_value) == Comparable::from(value)),
            FieldOp::Ne => Ok(Comparable::from(field_value) != Comparable::from(value)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match Comparable::from(field_value).partial_cmp(&Comparable::from(value)) {
                    Some(ordering) => Ok(match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    }),
                    None => Ok(false),
                }
            },
            FieldOp::Contains => Ok(contains(field_value, value)),
            FieldOp::NotContains => Ok(!contains(field_value, value)),
            FieldOp::StartsWith => match (field_value, value) {
                (Bson::String(left), Bson::String(right)) => Ok(left.starts_with(right.as_str())),
                _ => Ok(false),
            },
            FieldOp::EndsWith => match (field_value, value) {
                (Bson::String(left), Bson::String(right)) => Ok(left.ends_with(right.as_str())),
                _ => Ok(false),
            },
            FieldOp::AnyOf => Ok(any_of(field_value, value)),
            FieldOp::NoneOf => Ok(!any_of(field_value, value)),
        }
    }
}

fn contains(field_value: &Bson, value: &Bson) -> bool {
    match (field_value, value) {
        (Bson::String(left), Bson::String(right)) => left.contains(right.as_str()),
        (Bson::Array(items), Bson::Array(values)) => values
            .iter()
            .all(|val| items.iter().any(|item| Comparable::from(item) == Comparable::from(val))),
        (Bson::Array(items), _) => items
            .iter()
            .any(|item| contains(item, value)),
        (left, right) => Comparable::from(left) == Comparable::from(right),
    }
}

fn any_of(field_value: &Bson, value: &Bson) -> bool {
    match (Comparable::from(field_value), Comparable::from(value)) {
        (Comparable::Array(array), Comparable::Array(values)) => values
            .iter()
            .any(|val| array.iter().any(|item| item == val)),
        (Comparable::Array(array), single_value) => array
            .iter()
            .any(|item| item == &single_value),
        (single_value, Comparable::Array(values)) => values
            .iter()
            .any(|val| val == &single_value),
        (left, right) => left == right,
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use docmodel_core::filter::Filter;

    use super::*;

    fn matches(document: &Document, expr: Expr) -> bool {
        DocumentEvaluator::matches(document, &expr).unwrap()
    }

    #[test]
    fn object_ids_compare_by_value() {
        let id = ObjectId::new();
        let document = doc! { "_id": id, "name": "Alice" };

        assert!(matches(&document, Filter::id(id)));
        assert!(!matches(&document, Filter::id(ObjectId::new())));
    }

    #[test]
    fn numbers_compare_across_types() {
        let document = doc! { "_id": 1, "score": 2.5 };

        assert!(matches(&document, Filter::id(1_i64)));
        assert!(matches(&document, Filter::gt("score", 2)));
        assert!(matches(&document, Filter::lte("score", 2.5)));
        assert!(!matches(&document, Filter::lt("score", 2)));
    }

    #[test]
    fn dotted_paths_reach_embedded_documents() {
        let document = doc! { "address": { "city": "Paris" } };

        assert!(matches(&document, Filter::eq("address.city", "Paris")));
        assert!(matches(&document, Filter::exists("address.city")));
        assert!(matches(&document, Filter::not_exists("address.zip")));
    }

    #[test]
    fn missing_fields_only_match_negative_operators() {
        let document = doc! { "name": "Alice" };

        assert!(!matches(&document, Filter::eq("age", 3)));
        assert!(matches(&document, Filter::ne("age", 3)));
        assert!(matches(&document, Filter::none_of("age", vec![1, 2])));
    }

    #[test]
    fn array_and_string_operators() {
        let document = doc! { "tags": ["a", "b"], "name": "Alice" };

        assert!(matches(&document, Filter::contains("tags", "a")));
        assert!(matches(&document, Filter::contains("tags", vec!["b", "a"])));
        assert!(matches(&document, Filter::contains("name", "lic")));
        assert!(matches(&document, Filter::not_contains("tags", "c")));
        assert!(matches(&document, Filter::any_of("tags", vec!["c", "b"])));
        assert!(matches(&document, Filter::any_of("name", vec!["Bob", "Alice"])));
        assert!(matches(&document, Filter::starts_with("name", "Al")));
        assert!(matches(&document, Filter::ends_with("name", "ce")));
    }

    #[test]
    fn logical_operators() {
        let document = doc! { "a": 1, "b": 2 };

        assert!(matches(&document, Filter::all()));
        assert!(matches(&document, Filter::eq("a", 1).and(Filter::eq("b", 2))));
        assert!(matches(&document, Filter::eq("a", 5).or(Filter::eq("b", 2))));
        assert!(matches(&document, Filter::eq("a", 5).not()));
    }
}
