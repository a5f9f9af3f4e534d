//! Application of update documents to stored records.
//!
//! Supports replacement documents and the `$set`, `$unset` and `$inc` operators. Operator
//! field names may be dotted paths into embedded documents.

use bson::{Bson, Document, oid::ObjectId};

use docmodel_core::{
    backend::is_operator_update,
    error::{ModelError, ModelResult},
    filter::{Expr, FieldOp},
    schema::ID_FIELD,
};

use crate::evaluator::lookup;

/// Computes the document that results from applying `update` to `document`.
///
/// `update` is either a replacement or an operator document, never a mix of both.
pub(crate) fn apply(document: &Document, update: &Document) -> ModelResult<Document> {
    if is_operator_update(update) {
        apply_operators(document, update)
    } else {
        replace(document, update)
    }
}

/// Builds the document inserted by an upsert when nothing matched `filter`.
///
/// Operator updates start from the top-level equality conditions of the filter. A record
/// without `_id` afterwards gets a fresh ObjectId.
pub(crate) fn upsert_document(filter: &Expr, update: &Document) -> ModelResult<Document> {
    let mut document = if is_operator_update(update) {
        apply_operators(&equality_seed(filter)?, update)?
    } else {
        let mut replacement = update.clone();

        if !replacement.contains_key(ID_FIELD) {
            if let Some(id) = equality_seed(filter)?.remove(ID_FIELD) {
                replacement.insert(ID_FIELD, id);
            }
        }

        replacement
    };

    let id = document
        .remove(ID_FIELD)
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));

    Ok(with_id_first(id, document))
}

fn replace(document: &Document, replacement: &Document) -> ModelResult<Document> {
    let current = document.get(ID_FIELD).cloned();
    let mut replacement = replacement.clone();

    match (replacement.remove(ID_FIELD), current) {
        (Some(new), Some(current)) if new != current => Err(immutable_id()),
        (_, Some(current)) => Ok(with_id_first(current, replacement)),
        (Some(new), None) => Ok(with_id_first(new, replacement)),
        (None, None) => Ok(replacement),
    }
}

fn apply_operators(document: &Document, update: &Document) -> ModelResult<Document> {
    let mut updated = document.clone();
    let has_id = document.contains_key(ID_FIELD);

    for (operator, arguments) in update {
        let arguments = arguments
            .as_document()
            .ok_or_else(|| ModelError::InvalidDocument(format!("{operator} expects a document")))?;

        match operator.as_str() {
            "$set" => {
                for (field, value) in arguments {
                    if has_id && touches_id(field) && !(field == ID_FIELD && document.get(ID_FIELD) == Some(value)) {
                        return Err(immutable_id());
                    }

                    set_path(&mut updated, field, value.clone())?;
                }
            },
            "$unset" => {
                for field in arguments.keys() {
                    if touches_id(field) {
                        return Err(immutable_id());
                    }

                    unset_path(&mut updated, field)?;
                }
            },
            "$inc" => {
                for (field, value) in arguments {
                    if has_id && touches_id(field) {
                        return Err(immutable_id());
                    }

                    let current = lookup(&updated, field)
                        .cloned()
                        .unwrap_or(Bson::Int32(0));

                    set_path(&mut updated, field, increment(field, &current, value)?)?;
                }
            },
            other => {
                return Err(ModelError::InvalidDocument(format!(
                    "unsupported update operator {other}"
                )));
            },
        }
    }

    Ok(updated)
}

/// Sets `value` at a dotted `path`, creating embedded documents along the way.
fn set_path(document: &mut Document, path: &str, value: Bson) -> ModelResult<()> {
    check_path(path)?;

    let Some((head, rest)) = path.split_once('.') else {
        document.insert(path, value);
        return Ok(());
    };

    if !document.contains_key(head) {
        document.insert(head, Document::new());
    }

    match document.get_mut(head) {
        Some(Bson::Document(child)) => set_path(child, rest, value),
        _ => Err(ModelError::InvalidDocument(format!(
            "cannot set {path}: {head} is not an embedded document"
        ))),
    }
}

/// Removes the value at a dotted `path`. Missing intermediate documents are ignored.
fn unset_path(document: &mut Document, path: &str) -> ModelResult<()> {
    check_path(path)?;

    match path.split_once('.') {
        None => {
            document.remove(path);
        },
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, rest)?;
            }
        },
    }

    Ok(())
}

fn check_path(path: &str) -> ModelResult<()> {
    if path.split('.').any(str::is_empty) {
        return Err(ModelError::InvalidDocument(format!("invalid field path {path:?}")));
    }

    Ok(())
}

fn touches_id(path: &str) -> bool {
    path.split('.').next() == Some(ID_FIELD)
}

fn increment(field: &str, current: &Bson, amount: &Bson) -> ModelResult<Bson> {
    let overflow = || ModelError::InvalidDocument(format!("incrementing field {field} overflows"));

    match (current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(
            a.checked_add(*b)
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(*a as i64 + *b as i64))
        ),
        (Bson::Int32(a), Bson::Int64(b)) => (*a as i64).checked_add(*b).map(Bson::Int64).ok_or_else(overflow),
        (Bson::Int64(a), Bson::Int32(b)) => a.checked_add(*b as i64).map(Bson::Int64).ok_or_else(overflow),
        (Bson::Int64(a), Bson::Int64(b)) => a.checked_add(*b).map(Bson::Int64).ok_or_else(overflow),
        (Bson::Double(a), _) => numeric(amount)
            .map(|b| Bson::Double(a + b))
            .ok_or_else(|| non_numeric(field)),
        (_, Bson::Double(b)) => numeric(current)
            .map(|a| Bson::Double(a + b))
            .ok_or_else(|| non_numeric(field)),
        _ => Err(non_numeric(field)),
    }
}

fn non_numeric(field: &str) -> ModelError {
    ModelError::InvalidDocument(format!("cannot increment non-numeric field {field}"))
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(*value as f64),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

fn equality_seed(filter: &Expr) -> ModelResult<Document> {
    let mut seed = Document::new();
    collect_equalities(filter, &mut seed)?;

    Ok(seed)
}

fn collect_equalities(filter: &Expr, seed: &mut Document) -> ModelResult<()> {
    match filter {
        Expr::Field { field, op: FieldOp::Eq, value } => set_path(seed, field, value.clone()),
        Expr::And(exprs) => exprs
            .iter()
            .try_for_each(|expr| collect_equalities(expr, seed)),
        _ => Ok(()),
    }
}

fn with_id_first(id: Bson, rest: Document) -> Document {
    let mut document = Document::new();
    document.insert(ID_FIELD, id);

    for (key, value) in rest {
        document.insert(key, value);
    }

    document
}

fn immutable_id() -> ModelError {
    ModelError::InvalidDocument(format!("the {ID_FIELD} field is immutable"))
}
