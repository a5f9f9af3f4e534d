//! Query builder bound to a model.
//!
//! A [`Query`] is constructed per operation from the model, its schema and its collection
//! handle. It checks filters against the schema, forwards the operation to the collection and
//! wraps returned records as existing [`ModelDocument`]s.
//!
//! Every operation is lazy: nothing is sent to the store until the returned future is awaited.
//! [`Query::find`] returns a [`Find`] action that can be refined before it is awaited:
//!
//! ```ignore
//! let oldest = users
//!     .find(Filter::gte("age", 18))
//!     .sort("age", SortDirection::Desc)
//!     .limit(10)
//!     .await?;
//! ```

use bson::{Bson, Document};
use futures::future::BoxFuture;
use std::future::IntoFuture;
use tracing::trace;

use crate::{
    backend::{CollectionHandle, Database, is_operator_update},
    error::{ModelError, ModelResult},
    filter::{Expr, FieldOp, FilterVisitor},
    model::{Model, ModelDocument},
    options::{DeleteResult, FindOptions, Sort, SortDirection, UpdateResult},
    schema::CompiledSchema,
};

/// A single-use query builder bound to (model, schema, collection).
#[derive(Debug)]
pub struct Query<'m, D: Database> {
    model: &'m Model<D>,
    schema: Option<&'m CompiledSchema>,
    collection: &'m D::Collection,
}

impl<'m, D: Database> Query<'m, D> {
    pub fn new(
        model: &'m Model<D>,
        schema: Option<&'m CompiledSchema>,
        collection: &'m D::Collection,
    ) -> Self {
        Self { model, schema, collection }
    }

    pub async fn count(self, filter: Expr) -> ModelResult<u64> {
        self.check_filter(&filter)?;
        self.trace("count");

        self.collection.count_documents(filter).await
    }

    pub async fn distinct(self, field: &str, filter: Expr) -> ModelResult<Vec<Bson>> {
        self.check_path(field)?;
        self.check_filter(&filter)?;
        self.trace("distinct");

        self.collection.distinct(field, filter).await
    }

    /// Returns a [`Find`] action for the documents matching `filter`.
    pub fn find(self, filter: Expr) -> Find<'m, D> {
        Find {
            query: self,
            filter,
            options: FindOptions::default(),
        }
    }

    pub async fn find_one(self, filter: Expr) -> ModelResult<Option<ModelDocument<D>>> {
        self.check_filter(&filter)?;
        self.trace("find_one");

        Ok(self
            .collection
            .find_one(filter)
            .await?
            .map(|record| self.existing(record)))
    }

    pub async fn delete_one(self, filter: Expr) -> ModelResult<DeleteResult> {
        self.check_filter(&filter)?;
        self.trace("delete_one");

        self.collection.delete_one(filter).await
    }

    pub async fn delete_many(self, filter: Expr) -> ModelResult<DeleteResult> {
        self.check_filter(&filter)?;
        self.trace("delete_many");

        self.collection.delete_many(filter).await
    }

    pub async fn replace_one(self, filter: Expr, replacement: Document) -> ModelResult<UpdateResult> {
        self.check_filter(&filter)?;
        self.check_replacement(&replacement)?;
        self.trace("replace_one");

        self.collection.replace_one(filter, replacement).await
    }

    pub async fn update_one(self, filter: Expr, update: Document) -> ModelResult<UpdateResult> {
        self.check_filter(&filter)?;
        self.check_operators(&update)?;
        self.trace("update_one");

        self.collection.update_one(filter, update).await
    }

    pub async fn update_many(self, filter: Expr, update: Document) -> ModelResult<UpdateResult> {
        self.check_filter(&filter)?;
        self.check_operators(&update)?;
        self.trace("update_many");

        self.collection.update_many(filter, update).await
    }

    /// Deletes the first match and returns it.
    pub async fn find_one_and_delete(self, filter: Expr) -> ModelResult<Option<ModelDocument<D>>> {
        self.check_filter(&filter)?;
        self.trace("find_one_and_delete");

        Ok(self
            .collection
            .find_one_and_delete(filter)
            .await?
            .map(|record| self.existing(record)))
    }

    /// Replaces the first match and returns it as it was before the replacement.
    pub async fn find_one_and_replace(
        self,
        filter: Expr,
        replacement: Document,
    ) -> ModelResult<Option<ModelDocument<D>>> {
        self.check_filter(&filter)?;
        self.check_replacement(&replacement)?;
        self.trace("find_one_and_replace");

        Ok(self
            .collection
            .find_one_and_replace(filter, replacement)
            .await?
            .map(|record| self.existing(record)))
    }

    /// Updates the first match and returns it as it was before the update.
    pub async fn find_one_and_update(
        self,
        filter: Expr,
        update: Document,
    ) -> ModelResult<Option<ModelDocument<D>>> {
        self.check_filter(&filter)?;
        self.check_operators(&update)?;
        self.trace("find_one_and_update");

        Ok(self
            .collection
            .find_one_and_update(filter, update)
            .await?
            .map(|record| self.existing(record)))
    }

    fn existing(&self, record: Document) -> ModelDocument<D> {
        self.model.document_with_state(record, false)
    }

    fn trace(&self, operation: &'static str) {
        trace!(collection = self.model.collection_name(), operation, "dispatching query");
    }

    fn check_path(&self, path: &str) -> ModelResult<()> {
        match self.schema {
            Some(schema) => schema.check_path(path, self.model.collection_name()),
            None => Ok(()),
        }
    }

    fn check_filter(&self, filter: &Expr) -> ModelResult<()> {
        match self.schema {
            Some(schema) => SchemaCheck {
                schema,
                collection: self.model.collection_name(),
            }
            .visit_expr(filter),
            None => Ok(()),
        }
    }

    fn check_operators(&self, update: &Document) -> ModelResult<()> {
        if is_operator_update(update) {
            Ok(())
        } else {
            Err(ModelError::InvalidDocument(
                "update documents must only contain update operators".into(),
            ))
        }
    }

    fn check_replacement(&self, replacement: &Document) -> ModelResult<()> {
        if replacement.keys().any(|key| key.starts_with('$')) {
            return Err(ModelError::InvalidDocument(
                "replacement documents must not contain update operators".into(),
            ));
        }

        match self.schema {
            Some(schema) => schema.validate(replacement, self.model.collection_name()),
            None => Ok(()),
        }
    }
}

/// A pending `find`. Await it to run the query.
#[derive(Debug)]
pub struct Find<'m, D: Database> {
    query: Query<'m, D>,
    filter: Expr,
    options: FindOptions,
}

impl<'m, D: Database> Find<'m, D> {
    /// Returns at most `limit` documents.
    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Skips the first `skip` matches.
    pub fn skip(mut self, skip: usize) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Sorts the matches by one field.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.options.sort = Some(Sort { field: field.into(), direction });
        self
    }

    /// Returns the options collected so far.
    pub fn options(&self) -> &FindOptions {
        &self.options
    }
}

impl<'m, D: Database + 'm> IntoFuture for Find<'m, D> {
    type Output = ModelResult<Vec<ModelDocument<D>>>;
    type IntoFuture = BoxFuture<'m, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        let Find { query, filter, options } = self;

        Box::pin(async move {
            query.check_filter(&filter)?;
            if let Some(sort) = &options.sort {
                query.check_path(&sort.field)?;
            }
            query.trace("find");

            Ok(query
                .collection
                .find(filter, options)
                .await?
                .into_iter()
                .map(|record| query.existing(record))
                .collect())
        })
    }
}

/// Rejects filters that reference fields the schema does not declare.
struct SchemaCheck<'s> {
    schema: &'s CompiledSchema,
    collection: &'s str,
}

impl FilterVisitor for SchemaCheck<'_> {
    type Output = ();
    type Error = ModelError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        exprs
            .iter()
            .try_for_each(|expr| self.visit_expr(expr))
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        exprs
            .iter()
            .try_for_each(|expr| self.visit_expr(expr))
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        self.visit_expr(expr)
    }

    fn visit_exists(&mut self, field: &str, _should_exist: bool) -> Result<Self::Output, Self::Error> {
        self.schema.check_path(field, self.collection)
    }

    fn visit_field(&mut self, field: &str, _op: &FieldOp, _value: &Bson) -> Result<Self::Output, Self::Error> {
        self.schema.check_path(field, self.collection)
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::{
        backend::MockCollectionHandle,
        filter::Filter,
        model::{ModelConfig, create_model},
        schema::{FieldType, Schema},
        testing::{MockDatabase, modified},
    };

    fn with_schema(collection: MockCollectionHandle) -> Model<MockDatabase> {
        let schema = Schema::builder()
            .field("name", FieldType::String)
            .field("age", FieldType::Int32)
            .build();

        create_model(
            MockDatabase::new(collection),
            ModelConfig::new("users").with_schema(schema),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn find_results_are_existing_documents() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_find()
            .times(1)
            .withf(|filter, options| {
                *filter == Filter::gte("age", 18)
                    && options.limit == Some(2)
                    && options.skip == Some(1)
                    && options.sort == Some(Sort { field: "age".into(), direction: SortDirection::Desc })
            })
            .returning(|_, _| Ok(vec![doc! { "_id": 1, "age": 40 }, doc! { "_id": 2, "age": 30 }]));

        let model = with_schema(collection);
        let documents = model
            .find(Filter::gte("age", 18))
            .sort("age", SortDirection::Desc)
            .skip(1)
            .limit(2)
            .await
            .unwrap();

        assert_eq!(documents.len(), 2);
        assert!(documents.iter().all(|document| !document.is_new()));
        assert!(documents.iter().all(|document| document.delta().is_empty()));
    }

    #[tokio::test]
    async fn filters_on_undeclared_fields_are_rejected() {
        let mut collection = MockCollectionHandle::new();
        collection.expect_count_documents().never();

        let model = with_schema(collection);
        let result = model
            .count(Filter::eq("name", "Alice").and(Filter::exists("nickname").not()))
            .await;

        assert!(matches!(
            result,
            Err(ModelError::UnknownField(path, collection)) if path == "nickname" && collection == "users"
        ));
    }

    #[tokio::test]
    async fn sort_on_undeclared_field_is_rejected() {
        let mut collection = MockCollectionHandle::new();
        collection.expect_find().never();

        let model = with_schema(collection);
        let result = model
            .find(Filter::all())
            .sort("nickname", SortDirection::Asc)
            .await;

        assert!(matches!(result, Err(ModelError::UnknownField(..))));
    }

    #[tokio::test]
    async fn models_without_schema_accept_any_field() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_distinct()
            .times(1)
            .returning(|_, _| Ok(vec![Bson::String("blue".into())]));

        let model = create_model(MockDatabase::new(collection), "users").unwrap();
        let values = model.distinct("color", Filter::exists("anything")).await.unwrap();

        assert_eq!(values, vec![Bson::String("blue".into())]);
    }

    #[tokio::test]
    async fn updates_require_operators() {
        let mut collection = MockCollectionHandle::new();
        collection.expect_update_one().never();
        collection
            .expect_update_many()
            .times(1)
            .withf(|_, update| *update == doc! { "$set": { "age": 1 } })
            .returning(|_, _| Ok(modified(3)));

        let model = with_schema(collection);

        assert!(matches!(
            model.update_one(Filter::all(), doc! { "age": 1 }).await,
            Err(ModelError::InvalidDocument(_))
        ));
        assert_eq!(
            model
                .update_many(Filter::all(), doc! { "$set": { "age": 1 } })
                .await
                .unwrap()
                .modified_count,
            3
        );
    }

    #[tokio::test]
    async fn replacements_are_validated_against_schema() {
        let mut collection = MockCollectionHandle::new();
        collection.expect_replace_one().never();
        collection.expect_find_one_and_replace().never();

        let model = with_schema(collection);

        assert!(matches!(
            model.replace_one(Filter::id(1), doc! { "age": "old" }).await,
            Err(ModelError::InvalidDocument(_))
        ));
        assert!(matches!(
            model
                .find_one_and_replace(Filter::id(1), doc! { "$set": { "age": 2 } })
                .await,
            Err(ModelError::InvalidDocument(_))
        ));
    }

    #[tokio::test]
    async fn find_one_and_update_returns_previous_state_as_existing() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_find_one_and_update()
            .times(1)
            .returning(|_, _| Ok(Some(doc! { "_id": 1, "age": 30 })));

        let model = with_schema(collection);
        let previous = model
            .find_one_and_update(Filter::id(1), doc! { "$inc": { "age": 1 } })
            .await
            .unwrap()
            .unwrap();

        assert!(!previous.is_new());
        assert_eq!(previous.get("age"), Some(&Bson::Int32(30)));
    }
}
