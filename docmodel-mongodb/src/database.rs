use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection as DriverCollection, Database as DriverDatabase,
    options::{ClientOptions, FindOptions as DriverFindOptions},
    results::UpdateResult as DriverUpdateResult,
};
use tracing::{debug, trace};

use docmodel_core::{
    backend::{CollectionHandle, Database, DatabaseBuilder, is_operator_update},
    error::{ModelError, ModelResult},
    filter::Expr,
    options::{DeleteResult, FindOptions, SortDirection, UpdateOptions, UpdateResult},
};

use crate::filter::MongoFilterTranslator;


#[derive(Debug, Clone)]
pub struct MongoDatabase {
    database: DriverDatabase,
}

impl MongoDatabase {
    pub fn new(client: Client, database: &str) -> Self {
        Self { database: client.database(database) }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDatabaseBuilder {
        MongoDatabaseBuilder::new(dsn, database)
    }

    /// The underlying driver database.
    pub fn inner(&self) -> &DriverDatabase {
        &self.database
    }
}

impl Database for MongoDatabase {
    type Collection = MongoCollection;

    fn name(&self) -> &str {
        self.database.name()
    }

    fn collection(&self, name: &str) -> Self::Collection {
        MongoCollection {
            inner: self.database.collection(name),
        }
    }
}


#[derive(Debug, Clone)]
pub struct MongoCollection {
    inner: DriverCollection<Document>,
}

impl MongoCollection {
    fn translate(&self, filter: &Expr) -> ModelResult<Document> {
        let translated = MongoFilterTranslator::translate(filter)?;

        trace!(collection = self.inner.name(), filter = ?translated, "translated filter");

        Ok(translated)
    }
}

/// Driver call used for a generic `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    ReplaceOne,
    UpdateOne,
    UpdateMany,
}

impl WriteKind {
    /// Replacements always target one document; operator updates honor `multi`.
    fn of(update: &Document, options: UpdateOptions) -> Self {
        if !is_operator_update(update) {
            WriteKind::ReplaceOne
        } else if options.multi {
            WriteKind::UpdateMany
        } else {
            WriteKind::UpdateOne
        }
    }
}

fn update_result(result: DriverUpdateResult) -> UpdateResult {
    counts(result.matched_count, result.modified_count, result.upserted_id)
}

fn counts(matched_count: u64, modified_count: u64, upserted_id: Option<Bson>) -> UpdateResult {
    UpdateResult {
        matched_count,
        modified_count,
        upserted_ids: upserted_id.into_iter().collect(),
    }
}

#[async_trait]
impl CollectionHandle for MongoCollection {
    async fn update(
        &self,
        filter: Expr,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateResult> {
        let filter = self.translate(&filter)?;

        debug!(
            collection = self.inner.name(),
            upsert = options.upsert,
            multi = options.multi,
            "sending update"
        );

        let result = match WriteKind::of(&update, options) {
            WriteKind::ReplaceOne => self.inner
                .replace_one(filter, update)
                .upsert(options.upsert)
                .await,
            WriteKind::UpdateMany => self.inner
                .update_many(filter, update)
                .upsert(options.upsert)
                .await,
            WriteKind::UpdateOne => self.inner
                .update_one(filter, update)
                .upsert(options.upsert)
                .await,
        }
        .map_err(|e| ModelError::Backend(e.to_string()))?;

        Ok(update_result(result))
    }

    async fn count_documents(&self, filter: Expr) -> ModelResult<u64> {
        self.inner
            .count_documents(self.translate(&filter)?)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn distinct(&self, field: &str, filter: Expr) -> ModelResult<Vec<Bson>> {
        self.inner
            .distinct(field, self.translate(&filter)?)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn find(&self, filter: Expr, options: FindOptions) -> ModelResult<Vec<Document>> {
        let mut find_options = DriverFindOptions::default();

        if let Some(limit) = options.limit {
            find_options.limit = Some(limit as i64);
        }
        if let Some(skip) = options.skip {
            find_options.skip = Some(skip as u64);
        }
        if let Some(sort) = &options.sort {
            find_options.sort = Some(doc! {
                sort.field.clone(): match sort.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                }
            })
        }

        self.inner
            .find(self.translate(&filter)?)
            .with_options(find_options)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn find_one(&self, filter: Expr) -> ModelResult<Option<Document>> {
        self.inner
            .find_one(self.translate(&filter)?)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn delete_one(&self, filter: Expr) -> ModelResult<DeleteResult> {
        let result = self.inner
            .delete_one(self.translate(&filter)?)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))?;

        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn delete_many(&self, filter: Expr) -> ModelResult<DeleteResult> {
        let result = self.inner
            .delete_many(self.translate(&filter)?)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))?;

        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn replace_one(&self, filter: Expr, replacement: Document) -> ModelResult<UpdateResult> {
        self.inner
            .replace_one(self.translate(&filter)?, replacement)
            .await
            .map(update_result)
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn update_one(&self, filter: Expr, update: Document) -> ModelResult<UpdateResult> {
        self.inner
            .update_one(self.translate(&filter)?, update)
            .await
            .map(update_result)
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn update_many(&self, filter: Expr, update: Document) -> ModelResult<UpdateResult> {
        self.inner
            .update_many(self.translate(&filter)?, update)
            .await
            .map(update_result)
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn find_one_and_delete(&self, filter: Expr) -> ModelResult<Option<Document>> {
        self.inner
            .find_one_and_delete(self.translate(&filter)?)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn find_one_and_replace(
        &self,
        filter: Expr,
        replacement: Document,
    ) -> ModelResult<Option<Document>> {
        self.inner
            .find_one_and_replace(self.translate(&filter)?, replacement)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))
    }

    async fn find_one_and_update(
        &self,
        filter: Expr,
        update: Document,
    ) -> ModelResult<Option<Document>> {
        self.inner
            .find_one_and_update(self.translate(&filter)?, update)
            .await
            .map_err(|e| ModelError::Backend(e.to_string()))
    }
}


pub struct MongoDatabaseBuilder {
    dsn: String,
    database: String,
}

impl MongoDatabaseBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl DatabaseBuilder for MongoDatabaseBuilder {
    type Database = MongoDatabase;

    async fn build(self) -> ModelResult<Self::Database> {
        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| ModelError::Initialization(e.to_string()))?,
        )
        .map_err(|e| ModelError::Initialization(e.to_string()))?;

        debug!(database = %self.database, "connected to mongodb");

        Ok(MongoDatabase::new(client, &self.database))
    }
}
