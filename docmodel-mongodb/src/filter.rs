//! Filter translation from docmodel expressions to MongoDB query syntax.

use bson::{Document, Bson, doc};

use docmodel_core::{
    filter::{FilterVisitor, Expr, FieldOp},
    error::ModelError,
};


/// Translates docmodel filter expressions into MongoDB query documents.
///
/// An empty AND translates to `{}` so that it matches every document.
pub(crate) struct MongoFilterTranslator;

impl MongoFilterTranslator {
    pub fn translate(expr: &Expr) -> Result<Document, ModelError> {
        MongoFilterTranslator.visit_expr(expr)
    }
}

impl FilterVisitor for MongoFilterTranslator {
    type Output = Document;
    type Error = ModelError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // $not only applies to operator expressions; $nor negates whole clauses.
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": escape_regex(s) },
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$eq": other },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": escape_regex(s) } },
                    Bson::Array(arr) => doc! { "$not": { "$all": arr } },
                    other => doc! { "$ne": other },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("^{}", escape_regex(s)) },
                    _ => return Err(ModelError::InvalidDocument("StartsWith operator requires a string value".to_string())),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(s) => doc! { "$regex": format!("{}$", escape_regex(s)) },
                    _ => return Err(ModelError::InvalidDocument("EndsWith operator requires a string value".to_string())),
                },
                FieldOp::AnyOf => doc! { "$in": as_list(value) },
                FieldOp::NoneOf => doc! { "$nin": as_list(value) },
            }
        })
    }
}

fn as_list(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        other => Bson::Array(vec![other.clone()]),
    }
}

fn escape_regex(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

#[cfg(test)]
mod tests {
    use docmodel_core::filter::Filter;

    use super::*;

    #[test]
    fn empty_and_matches_everything() {
        assert_eq!(MongoFilterTranslator::translate(&Filter::all()).unwrap(), doc! {});
    }

    #[test]
    fn comparisons_and_logic() {
        let expr = Filter::id(1).and(Filter::gte("age", 18).or(Filter::exists("guardian")));

        assert_eq!(
            MongoFilterTranslator::translate(&expr).unwrap(),
            doc! {
                "$and": [
                    { "_id": { "$eq": 1 } },
                    { "$or": [
                        { "age": { "$gte": 18 } },
                        { "guardian": { "$exists": true } },
                    ] },
                ]
            }
        );
    }

    #[test]
    fn negation_uses_nor() {
        assert_eq!(
            MongoFilterTranslator::translate(&Filter::eq("name", "Bob").not()).unwrap(),
            doc! { "$nor": [{ "name": { "$eq": "Bob" } }] }
        );
    }

    #[test]
    fn string_operators_escape_patterns() {
        assert_eq!(
            MongoFilterTranslator::translate(&Filter::starts_with("email", "a.b")).unwrap(),
            doc! { "email": { "$regex": "^a\\.b" } }
        );
        assert_eq!(
            MongoFilterTranslator::translate(&Filter::contains("tags", "x")).unwrap(),
            doc! { "tags": { "$regex": "x" } }
        );
        assert!(MongoFilterTranslator::translate(&Filter::ends_with("age", 3)).is_err());
    }

    #[test]
    fn membership_accepts_single_values() {
        assert_eq!(
            MongoFilterTranslator::translate(&Filter::any_of("role", "admin")).unwrap(),
            doc! { "role": { "$in": ["admin"] } }
        );
        assert_eq!(
            MongoFilterTranslator::translate(&Filter::none_of("role", vec!["a", "b"])).unwrap(),
            doc! { "role": { "$nin": ["a", "b"] } }
        );
    }
}
