//! The save protocol for model documents.
//!
//! New documents are written with an upsert keyed on `_id`; the store must report exactly one
//! upserted document, otherwise another writer already owns the identifier. Existing documents
//! send their cleaned delta; the store must report exactly one modified document.

use bson::Bson;
use tracing::{debug, trace};

use crate::{
    backend::{CollectionHandle, Database},
    document::TrackedDocument,
    error::{ModelError, ModelResult},
    filter::Filter,
    model::ModelContext,
    options::UpdateOptions,
};

pub(crate) async fn save<D: Database>(
    context: &ModelContext<D>,
    document: &mut TrackedDocument,
) -> ModelResult<()> {
    if document.is_new() {
        insert(context, document).await
    } else {
        update(context, document).await
    }
}

fn require_id<D: Database>(context: &ModelContext<D>, document: &TrackedDocument) -> ModelResult<Bson> {
    document
        .id()
        .cloned()
        .ok_or_else(|| {
            ModelError::InvalidDocument(format!(
                "document in collection {} has no _id",
                context.collection_name
            ))
        })
}

async fn insert<D: Database>(
    context: &ModelContext<D>,
    document: &mut TrackedDocument,
) -> ModelResult<()> {
    let id = require_id(context, document)?;

    debug!(
        database = context.database.name(),
        collection = %context.collection_name,
        document = ?document.fields(),
        "inserting new document"
    );

    let result = context
        .collection
        .update(
            Filter::id(id.clone()),
            document.fields().clone(),
            UpdateOptions::upsert(),
        )
        .await?;

    if result.upserted_ids.len() != 1 {
        return Err(ModelError::Conflict(
            display_id(&id),
            context.collection_name.clone(),
        ));
    }

    document.set_new(false);
    document.mark_persisted();

    Ok(())
}

async fn update<D: Database>(
    context: &ModelContext<D>,
    document: &mut TrackedDocument,
) -> ModelResult<()> {
    let Some(delta) = document.delta().clean() else {
        trace!(collection = %context.collection_name, "no changes to save");
        return Ok(());
    };

    let id = require_id(context, document)?;

    debug!(
        database = context.database.name(),
        collection = %context.collection_name,
        id = %display_id(&id),
        delta = ?delta,
        "updating document"
    );

    let result = context
        .collection
        .update(Filter::id(id.clone()), delta, UpdateOptions::default())
        .await?;

    if result.modified_count != 1 {
        return Err(ModelError::NotFound(
            display_id(&id),
            context.collection_name.clone(),
        ));
    }

    document.mark_persisted();

    Ok(())
}

/// Renders an identifier for error messages and traces without BSON type decoration.
pub(crate) fn display_id(id: &Bson) -> String {
    match id {
        Bson::String(value) => value.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};

    use super::*;
    use crate::{
        backend::MockCollectionHandle,
        model::{ModelConfig, ModelDocument, create_model},
        schema::{FieldType, ID_FIELD, Schema},
        options::UpdateResult,
        testing::{MockDatabase, modified, upserted},
    };

    fn existing(collection: MockCollectionHandle, record: bson::Document) -> ModelDocument<MockDatabase> {
        create_model(MockDatabase::new(collection), "users")
            .unwrap()
            .document_with_state(record, false)
    }

    #[tokio::test]
    async fn insert_flips_new_flag_after_confirmed_upsert() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .withf(|filter, update, options| {
                *filter == Filter::id(1)
                    && *update == doc! { "_id": 1, "name": "Alice" }
                    && options.upsert
                    && !options.multi
            })
            .returning(|_, _, _| Ok(upserted(1)));

        let model = create_model(MockDatabase::new(collection), "users").unwrap();
        let mut document = model.document_with_state(doc! { "_id": 1, "name": "Alice" }, true);

        document.save().await.unwrap();

        assert!(!document.is_new());
        assert!(document.delta().is_empty());
    }

    #[tokio::test]
    async fn insert_without_upsert_is_a_conflict() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .returning(|_, _, _| Ok(UpdateResult { matched_count: 1, ..Default::default() }));

        let model = create_model(MockDatabase::new(collection), "users").unwrap();
        let mut document = model.document(doc! { "_id": "alice" });

        let err = document.save().await.unwrap_err();

        assert!(matches!(
            &err,
            ModelError::Conflict(id, collection) if id == "alice" && collection == "users"
        ));
        assert_eq!(
            err.to_string(),
            "There is already a document with _id alice in collection users"
        );
        assert!(document.is_new());
    }

    #[tokio::test]
    async fn insert_with_several_upserts_is_a_conflict() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .returning(|_, _, _| {
                Ok(UpdateResult {
                    upserted_ids: vec![Bson::Int32(1), Bson::Int32(2)],
                    ..Default::default()
                })
            });

        let model = create_model(MockDatabase::new(collection), "users").unwrap();
        let mut document = model.document(doc! { "_id": 1 });

        assert!(matches!(document.save().await, Err(ModelError::Conflict(..))));
        assert!(document.is_new());
    }

    #[tokio::test]
    async fn unchanged_existing_document_skips_the_store() {
        let mut collection = MockCollectionHandle::new();
        collection.expect_update().never();

        let mut document = existing(collection, doc! { "_id": 1, "name": "Alice" });

        document.save().await.unwrap();
    }

    #[tokio::test]
    async fn update_sends_only_changed_fields() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .withf(|filter, update, options| {
                *filter == Filter::id(1)
                    && *update == doc! { "$set": { "age": 31 } }
                    && *options == UpdateOptions::default()
            })
            .returning(|_, _, _| Ok(modified(1)));

        let mut document = existing(collection, doc! { "_id": 1, "name": "Alice", "age": 30 });
        document.set("age", 31);

        document.save().await.unwrap();
    }

    #[tokio::test]
    async fn update_sends_unset_for_removed_fields() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .withf(|_, update, _| *update == doc! { "$unset": { "nick": "" } })
            .returning(|_, _, _| Ok(modified(1)));

        let mut document = existing(collection, doc! { "_id": 1, "nick": "al" });
        document.unset("nick");

        document.save().await.unwrap();
    }

    #[tokio::test]
    async fn saving_twice_sends_the_delta_once() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .returning(|_, _, _| Ok(modified(1)));

        let mut document = existing(collection, doc! { "_id": 1, "name": "Alice" });
        document.set("name", "Alicia");

        document.save().await.unwrap();
        document.save().await.unwrap();
    }

    #[tokio::test]
    async fn update_without_modification_is_not_found() {
        let oid = ObjectId::new();
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .returning(|_, _, _| Ok(modified(0)));

        let mut document = existing(collection, doc! { "_id": oid, "name": "Alice" });
        document.set("name", "Alicia");

        let err = document.save().await.unwrap_err();

        assert!(matches!(
            &err,
            ModelError::NotFound(id, collection) if *id == oid.to_hex() && collection == "users"
        ));
        assert!(document.delta().set.contains_key("name"));
    }

    #[tokio::test]
    async fn backend_errors_pass_through() {
        let mut collection = MockCollectionHandle::new();
        collection
            .expect_update()
            .times(1)
            .returning(|_, _, _| Err(ModelError::Backend("connection reset".into())));

        let model = create_model(MockDatabase::new(collection), "users").unwrap();
        let mut document = model.document(doc! { "name": "Alice" });

        assert!(matches!(
            document.save().await,
            Err(ModelError::Backend(message)) if message == "connection reset"
        ));
        assert!(document.is_new());
    }

    #[tokio::test]
    async fn documents_without_identifier_are_rejected() {
        let mut collection = MockCollectionHandle::new();
        collection.expect_update().never();

        let mut document = existing(collection, doc! { "name": "Alice" });
        document.set("name", "Alicia");

        assert!(matches!(
            document.save().await,
            Err(ModelError::InvalidDocument(_))
        ));
    }

    #[tokio::test]
    async fn unchanged_document_without_identifier_is_a_no_op() {
        let mut collection = MockCollectionHandle::new();
        collection.expect_update().never();

        let mut document = existing(collection, doc! { "name": "Alice" });

        document.save().await.unwrap();
    }

    #[tokio::test]
    async fn new_document_without_identifier_is_rejected() {
        let mut collection = MockCollectionHandle::new();
        collection.expect_update().never();

        let schema = Schema::builder().field(ID_FIELD, FieldType::String).build();
        let model = create_model(
            MockDatabase::new(collection),
            ModelConfig::new("users").with_schema(schema),
        )
        .unwrap();
        let mut document = model.document(doc! { "name": "Alice" });

        assert!(matches!(
            document.save().await,
            Err(ModelError::InvalidDocument(_))
        ));
        assert!(document.is_new());
    }

    #[test]
    fn identifiers_render_without_decoration() {
        let oid = ObjectId::new();

        assert_eq!(display_id(&Bson::String("alice".into())), "alice");
        assert_eq!(display_id(&Bson::ObjectId(oid)), oid.to_hex());
        assert_eq!(display_id(&Bson::Int32(7)), "7");
    }
}
