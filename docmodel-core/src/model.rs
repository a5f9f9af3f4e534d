//! Models: collection-bound document constructors with helper operations.
//!
//! [`create_model`] combines a database handle, a collection name and an optional schema into a
//! [`Model`]. A model constructs [`ModelDocument`]s, tracked documents bound to the model's
//! shared context, and exposes collection-scoped helpers (`count`, `find`, `update_one`,
//! `insert_many`, ...).
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryDatabase};
//! use bson::doc;
//!
//! let users = create_model(InMemoryDatabase::new("app"), "users")?;
//!
//! let mut alice = users.document(doc! { "name": "Alice" });
//! alice.save().await?;
//!
//! alice.set("age", 30);
//! alice.save().await?; // sends { "$set": { "age": 30 } }
//! ```

use bson::{Bson, Document, doc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};
use tracing::debug;

use crate::{
    backend::Database,
    document::TrackedDocument,
    error::ModelResult,
    filter::Expr,
    options::{DeleteResult, UpdateResult},
    persist,
    query::{Find, Query},
    schema::{CompiledSchema, FieldType, ID_FIELD, Schema},
};

/// Model configuration: the collection to bind and an optional schema.
///
/// A bare collection name converts into a configuration without schema, so
/// `create_model(db, "users")` and `create_model(db, ModelConfig::new("users"))` are equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Name of the collection backing the model.
    pub collection: String,
    /// Optional schema, compiled once by the factory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

impl ModelConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into(), schema: None }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl From<&str> for ModelConfig {
    fn from(collection: &str) -> Self {
        ModelConfig::new(collection)
    }
}

impl From<String> for ModelConfig {
    fn from(collection: String) -> Self {
        ModelConfig::new(collection)
    }
}

/// State shared by a model and every document it constructs.
#[derive(Debug)]
pub(crate) struct ModelContext<D: Database> {
    pub(crate) database: D,
    pub(crate) collection_name: String,
    pub(crate) collection: D::Collection,
    pub(crate) schema: Option<CompiledSchema>,
}

/// Creates a model bound to `config`'s collection in `database`.
///
/// # Errors
///
/// Returns [`ModelError::SchemaCompilation`](crate::error::ModelError::SchemaCompilation) if
/// the configured schema does not compile.
pub fn create_model<D: Database>(
    database: D,
    config: impl Into<ModelConfig>,
) -> ModelResult<Model<D>> {
    Model::new(database, config)
}

/// A document constructor bound to one collection, plus collection-scoped helpers.
///
/// Cloning a model is cheap; clones share the same context.
#[derive(Debug)]
pub struct Model<D: Database> {
    context: Arc<ModelContext<D>>,
}

impl<D: Database> Clone for Model<D> {
    fn clone(&self) -> Self {
        Self { context: Arc::clone(&self.context) }
    }
}

impl<D: Database> Model<D> {
    /// See [`create_model`].
    pub fn new(database: D, config: impl Into<ModelConfig>) -> ModelResult<Self> {
        let ModelConfig { collection: collection_name, schema } = config.into();

        let collection = database.collection(&collection_name);
        let schema = schema.map(Schema::compile).transpose()?;

        debug!(
            database = database.name(),
            collection = %collection_name,
            schema = schema.is_some(),
            "model created"
        );

        Ok(Self {
            context: Arc::new(ModelContext {
                database,
                collection_name,
                collection,
                schema,
            }),
        })
    }

    /// Wraps `record` as a new document. Nothing is written until [`ModelDocument::save`].
    ///
    /// A missing `_id` is generated when the identifier type supports it
    /// ([`FieldType::ObjectId`], the default, or [`FieldType::Uuid`]).
    pub fn document(&self, record: Document) -> ModelDocument<D> {
        self.document_with_state(record, true)
    }

    /// Wraps `record` as a new or existing document.
    ///
    /// Existing documents are assumed to match what is stored, so only later changes are saved.
    pub fn document_with_state(&self, record: Document, is_new: bool) -> ModelDocument<D> {
        let record = if is_new && !record.contains_key(ID_FIELD) {
            match self.id_type().generate_id() {
                Some(id) => {
                    let mut with_id = doc! { ID_FIELD: id };
                    for (key, value) in record {
                        with_id.insert(key, value);
                    }
                    with_id
                }
                None => record,
            }
        } else {
            record
        };

        ModelDocument {
            document: TrackedDocument::new(record, is_new),
            context: Arc::clone(&self.context),
        }
    }

    /// Returns the database handle.
    pub fn db(&self) -> &D {
        &self.context.database
    }

    /// Returns the name of the backing collection.
    pub fn collection_name(&self) -> &str {
        &self.context.collection_name
    }

    /// Returns the compiled schema, if the model has one.
    pub fn schema(&self) -> Option<&CompiledSchema> {
        self.context.schema.as_ref()
    }

    /// Returns a fresh query builder bound to this model, its schema and its collection.
    pub fn query(&self) -> Query<'_, D> {
        Query::new(self, self.context.schema.as_ref(), &self.context.collection)
    }

    pub async fn count(&self, filter: Expr) -> ModelResult<u64> {
        self.query().count(filter).await
    }

    pub async fn distinct(&self, field: &str, filter: Expr) -> ModelResult<Vec<Bson>> {
        self.query().distinct(field, filter).await
    }

    /// Finds documents matching `filter`. Refine with `limit`, `skip` and `sort`, then await.
    pub fn find(&self, filter: Expr) -> Find<'_, D> {
        self.query().find(filter)
    }

    pub async fn find_one(&self, filter: Expr) -> ModelResult<Option<ModelDocument<D>>> {
        self.query().find_one(filter).await
    }

    pub async fn delete_one(&self, filter: Expr) -> ModelResult<DeleteResult> {
        self.query().delete_one(filter).await
    }

    pub async fn delete_many(&self, filter: Expr) -> ModelResult<DeleteResult> {
        self.query().delete_many(filter).await
    }

    pub async fn replace_one(&self, filter: Expr, replacement: Document) -> ModelResult<UpdateResult> {
        self.query().replace_one(filter, replacement).await
    }

    pub async fn update_one(&self, filter: Expr, update: Document) -> ModelResult<UpdateResult> {
        self.query().update_one(filter, update).await
    }

    pub async fn update_many(&self, filter: Expr, update: Document) -> ModelResult<UpdateResult> {
        self.query().update_many(filter, update).await
    }

    pub async fn find_one_and_delete(&self, filter: Expr) -> ModelResult<Option<ModelDocument<D>>> {
        self.query().find_one_and_delete(filter).await
    }

    pub async fn find_one_and_replace(
        &self,
        filter: Expr,
        replacement: Document,
    ) -> ModelResult<Option<ModelDocument<D>>> {
        self.query().find_one_and_replace(filter, replacement).await
    }

    pub async fn find_one_and_update(
        &self,
        filter: Expr,
        update: Document,
    ) -> ModelResult<Option<ModelDocument<D>>> {
        self.query().find_one_and_update(filter, update).await
    }

    /// Wraps `record` as a new document and saves it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Conflict`](crate::error::ModelError::Conflict) when a document with
    /// the same identifier already exists.
    pub async fn insert_one(&self, record: Document) -> ModelResult<ModelDocument<D>> {
        let mut document = self.document_with_state(record, true);
        document.save().await?;

        Ok(document)
    }

    /// Inserts each record independently, returning one result per record in input order.
    ///
    /// The inserts run concurrently and are not atomic: a failed record does not undo the
    /// records that succeeded.
    pub async fn insert_many(
        &self,
        records: impl IntoIterator<Item = Document>,
    ) -> Vec<ModelResult<ModelDocument<D>>> {
        join_all(
            records
                .into_iter()
                .map(|record| self.insert_one(record)),
        )
        .await
    }

    fn id_type(&self) -> FieldType {
        self.context
            .schema
            .as_ref()
            .map(CompiledSchema::id_type)
            .unwrap_or(FieldType::ObjectId)
    }
}

/// A tracked document bound to the model that constructed it.
///
/// Dereferences to [`TrackedDocument`] for field access and change tracking.
#[derive(Debug)]
pub struct ModelDocument<D: Database> {
    document: TrackedDocument,
    context: Arc<ModelContext<D>>,
}

impl<D: Database> Clone for ModelDocument<D> {
    fn clone(&self) -> Self {
        Self {
            document: self.document.clone(),
            context: Arc::clone(&self.context),
        }
    }
}

impl<D: Database> ModelDocument<D> {
    /// Persists the document.
    ///
    /// New documents are inserted with an upsert on their identifier and become existing once
    /// the store confirms the insert. Existing documents send only their changed fields; when
    /// nothing changed the store is not contacted.
    ///
    /// # Errors
    ///
    /// - [`ModelError::Conflict`](crate::error::ModelError::Conflict) if the insert did not
    ///   create exactly one document
    /// - [`ModelError::NotFound`](crate::error::ModelError::NotFound) if the update did not
    ///   modify exactly one document
    /// - [`ModelError::InvalidDocument`](crate::error::ModelError::InvalidDocument) if the
    ///   document has no `_id`
    /// - any backend error, unchanged
    pub async fn save(&mut self) -> ModelResult<()> {
        persist::save(&self.context, &mut self.document).await
    }

    /// Returns the model that constructed this document.
    pub fn model(&self) -> Model<D> {
        Model { context: Arc::clone(&self.context) }
    }

    /// Returns the model's compiled schema, if any.
    pub fn schema(&self) -> Option<&CompiledSchema> {
        self.context.schema.as_ref()
    }

    /// Detaches the tracked document from its model.
    pub fn into_tracked(self) -> TrackedDocument {
        self.document
    }
}

impl<D: Database> Deref for ModelDocument<D> {
    type Target = TrackedDocument;

    fn deref(&self) -> &Self::Target {
        &self.document
    }
}

impl<D: Database> DerefMut for ModelDocument<D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.document
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::{
        backend::MockCollectionHandle,
        error::ModelError,
        filter::Filter,
        options::UpdateOptions,
        testing::{MockDatabase, upserted},
    };

    #[test]
    fn bare_name_matches_structured_config() {
        assert_eq!(ModelConfig::from("users"), ModelConfig::new("users"));
        assert_eq!(ModelConfig::from("users".to_string()), ModelConfig { collection: "users".into(), schema: None });

        let model = create_model(MockDatabase::new(MockCollectionHandle::new()), "users").unwrap();
        assert_eq!(model.collection_name(), "users");
        assert!(model.schema().is_none());
    }

    #[test]
    fn config_deserializes_with_schema() {
        let config: ModelConfig = serde_json::from_str(
            r#"{ "collection": "users", "schema": { "name": "string" } }"#,
        )
        .unwrap();

        let schema = config.schema.as_ref().unwrap();
        assert_eq!(config.collection, "users");
        assert_eq!(schema.field("_id"), Some(&FieldType::ObjectId));
    }

    #[test]
    fn factory_compiles_schema_with_identifier() {
        let schema = Schema::builder().field("name", FieldType::String).build();
        let model = create_model(
            MockDatabase::new(MockCollectionHandle::new()),
            ModelConfig::new("users").with_schema(schema),
        )
        .unwrap();

        assert_eq!(model.schema().unwrap().id_type(), FieldType::ObjectId);
    }

    #[test]
    fn factory_surfaces_schema_compilation_errors() {
        let schema = Schema::builder().field("$bad", FieldType::String).build();
        let result = create_model(
            MockDatabase::new(MockCollectionHandle::new()),
            ModelConfig::new("users").with_schema(schema),
        );

        assert!(matches!(result, Err(ModelError::SchemaCompilation(_))));
    }

    #[test]
    fn new_documents_get_generated_identifier() {
        let model = create_model(MockDatabase::new(MockCollectionHandle::new()), "users").unwrap();

        let document = model.document(doc! { "name": "Alice" });
        assert!(document.is_new());
        assert!(matches!(document.id(), Some(Bson::ObjectId(_))));
        assert_eq!(document.fields().keys().next().map(String::as_str), Some("_id"));

        let existing = model.document_with_state(doc! { "name": "Bob" }, false);
        assert!(!existing.is_new());
        assert_eq!(existing.id(), None);
    }

    #[test]
    fn supplied_identifier_is_kept() {
        let model = create_model(MockDatabase::new(MockCollectionHandle::new()), "users").unwrap();

        let document = model.document(doc! { "_id": "alice", "name": "Alice" });
        assert_eq!(document.id(), Some(&Bson::String("alice".into())));
    }

    #[test]
    fn string_identifiers_are_not_generated() {
        let schema = Schema::builder().field("_id", FieldType::String).build();
        let model = create_model(
            MockDatabase::new(MockCollectionHandle::new()),
            ModelConfig::new("users").with_schema(schema),
        )
        .unwrap();

        assert_eq!(model.document(doc! { "name": "Alice" }).id(), None);
    }

    #[test]
    fn documents_point_back_to_their_model() {
        let schema = Schema::builder().field("name", FieldType::String).build();
        let model = create_model(
            MockDatabase::new(MockCollectionHandle::new()),
            ModelConfig::new("users").with_schema(schema),
        )
        .unwrap();

        let document = model.document(doc! { "name": "Alice" });
        assert_eq!(document.model().collection_name(), "users");
        assert_eq!(document.schema(), model.schema());
        assert_eq!(model.db().name(), "test");
    }

    #[tokio::test]
    async fn insert_one_saves_a_forced_new_document() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .withf(|filter, update, options| {
                *filter == Filter::id("alice")
                    && *update == doc! { "_id": "alice", "name": "Alice" }
                    && *options == UpdateOptions::upsert()
            })
            .returning(|_, _, _| Ok(upserted("alice")));

        let model = create_model(MockDatabase::new(collection), "users").unwrap();
        let document = model
            .insert_one(doc! { "_id": "alice", "name": "Alice" })
            .await
            .unwrap();

        assert!(!document.is_new());
    }

    #[tokio::test]
    async fn insert_many_reports_each_record_independently() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(2)
            .returning(|filter, _, _| {
                if filter == Filter::id("a") {
                    Ok(upserted("a"))
                } else {
                    Ok(UpdateResult { matched_count: 1, ..Default::default() })
                }
            });

        let model = create_model(MockDatabase::new(collection), "users").unwrap();
        let results = model
            .insert_many(vec![doc! { "_id": "a" }, doc! { "_id": "b" }])
            .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            &results[1],
            Err(ModelError::Conflict(id, collection)) if id == "b" && collection == "users"
        ));
    }
}
