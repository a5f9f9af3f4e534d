//! In-memory database implementation.
//!
//! Collections are ordered vectors of BSON documents kept behind a single async-aware
//! read-write lock, so every write (including the match-then-insert of an upsert) is atomic
//! with respect to other handles on the same database.

use std::{cmp::Ordering, collections::HashMap, fmt, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document};
use tracing::{debug, trace};

use docmodel_core::{
    backend::{CollectionHandle, Database, DatabaseBuilder},
    error::{ModelError, ModelResult},
    filter::Expr,
    options::{DeleteResult, FindOptions, SortDirection, UpdateOptions, UpdateResult},
    schema::ID_FIELD,
};

use crate::{
    evaluator::{Comparable, DocumentEvaluator, lookup},
    update,
};

type CollectionData = Vec<Document>;
type StoreMap = HashMap<String, CollectionData>;


/// Thread-safe in-memory database.
///
/// `InMemoryDatabase` is cloneable and uses an `Arc`-wrapped internal state. Clones, and
/// every collection handle obtained from them, share the same underlying data.
///
/// Queries scan every document of a collection; there are no indexes besides the
/// uniqueness check on `_id`.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryDatabase;
/// use docmodel::backend::{Database, CollectionHandle};
/// use docmodel::filter::Filter;
///
/// let database = InMemoryDatabase::new("app");
/// let users = database.collection("users");
///
/// let count = users.count_documents(Filter::all()).await?;
/// assert_eq!(count, 0);
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDatabase {
    name: String,
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryDatabase {
    /// Creates a new empty database.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryDatabase`.
    pub fn builder() -> InMemoryDatabaseBuilder {
        InMemoryDatabaseBuilder::default()
    }

    /// Lists the collections that have received at least one write.
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();
        names
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new("default")
    }
}

impl Database for InMemoryDatabase {
    type Collection = InMemoryCollection;

    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Self::Collection {
        InMemoryCollection {
            name: name.to_string(),
            store: Arc::clone(&self.store),
        }
    }
}


/// Handle to one collection of an [`InMemoryDatabase`].
#[derive(Clone)]
pub struct InMemoryCollection {
    name: String,
    store: Arc<RwLock<StoreMap>>,
}

impl fmt::Debug for InMemoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryCollection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl InMemoryCollection {
    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn matching(&self, filter: &Expr) -> ModelResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = match store.get(&self.name) {
            Some(col) => col,
            None => return Ok(vec![]),
        };

        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::matches(document, filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    /// Applies `update` to the first (or every, with `multi`) matching document.
    fn apply_update(
        &self,
        documents: &mut CollectionData,
        filter: &Expr,
        update: &Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateResult> {
        let mut result = UpdateResult::default();

        for document in documents.iter_mut() {
            if !DocumentEvaluator::matches(document, filter)? {
                continue;
            }

            result.matched_count += 1;

            let updated = update::apply(document, update)?;

            if updated != *document {
                *document = updated;
                result.modified_count += 1;
            }

            if !options.multi {
                break;
            }
        }

        if result.matched_count == 0 && options.upsert {
            let document = update::upsert_document(filter, update)?;
            let id = document
                .get(ID_FIELD)
                .cloned()
                .unwrap_or(Bson::Null);

            self.ensure_unique(documents, &id)?;

            trace!(collection = %self.name, id = %id, "upserted document");

            documents.push(document);
            result.upserted_ids.push(id);
        }

        Ok(result)
    }

    fn ensure_unique(&self, documents: &CollectionData, id: &Bson) -> ModelResult<()> {
        if documents.iter().any(|document| document.get(ID_FIELD) == Some(id)) {
            return Err(ModelError::Backend(format!(
                "duplicate key {id} in collection {}",
                self.name
            )));
        }

        Ok(())
    }

    async fn find_one_and_modify(
        &self,
        filter: &Expr,
        update: Option<&Document>,
    ) -> ModelResult<Option<Document>> {
        let mut store = self.store.write().await;
        let documents = match store.get_mut(&self.name) {
            Some(col) => col,
            None => return Ok(None),
        };

        let mut position = None;

        for (index, document) in documents.iter().enumerate() {
            if DocumentEvaluator::matches(document, filter)? {
                position = Some(index);
                break;
            }
        }

        let Some(index) = position else {
            return Ok(None);
        };

        match update {
            Some(update) => {
                let updated = update::apply(&documents[index], update)?;
                Ok(Some(std::mem::replace(&mut documents[index], updated)))
            },
            None => Ok(Some(documents.remove(index))),
        }
    }
}

fn compare(a: &Document, b: &Document, field: &str, direction: &SortDirection) -> Ordering {
    let left = lookup(a, field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null);
    let right = lookup(b, field)
        .map(Comparable::from)
        .unwrap_or(Comparable::Null);

    match direction {
        SortDirection::Asc => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        SortDirection::Desc => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
    }
}


#[async_trait]
impl CollectionHandle for InMemoryCollection {
    async fn update(
        &self,
        filter: Expr,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateResult> {
        let mut store = self.store.write().await;
        let documents = store
            .entry(self.name.clone())
            .or_default();

        let result = self.apply_update(documents, &filter, &update, options)?;

        debug!(
            collection = %self.name,
            matched = result.matched_count,
            modified = result.modified_count,
            upserted = result.upserted_ids.len(),
            "applied update"
        );

        Ok(result)
    }

    async fn count_documents(&self, filter: Expr) -> ModelResult<u64> {
        Ok(self.matching(&filter).await?.len() as u64)
    }

    async fn distinct(&self, field: &str, filter: Expr) -> ModelResult<Vec<Bson>> {
        let mut values = Vec::new();

        for document in self.matching(&filter).await? {
            let candidates = match lookup(&document, field) {
                Some(Bson::Array(items)) => items.clone(),
                Some(value) => vec![value.clone()],
                None => continue,
            };

            for value in candidates {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }

        Ok(values)
    }

    async fn find(&self, filter: Expr, options: FindOptions) -> ModelResult<Vec<Document>> {
        let mut documents = self.matching(&filter).await?;

        if let Some(sort) = &options.sort {
            documents.sort_by(|a, b| compare(a, b, &sort.field, &sort.direction));
        }

        Ok(
            documents
                .into_iter()
                .skip(options.skip.unwrap_or(0))
                .take(options.limit.unwrap_or(usize::MAX))
                .collect()
        )
    }

    async fn find_one(&self, filter: Expr) -> ModelResult<Option<Document>> {
        let store = self.store.read().await;
        let documents = match store.get(&self.name) {
            Some(col) => col,
            None => return Ok(None),
        };

        for document in documents {
            if DocumentEvaluator::matches(document, &filter)? {
                return Ok(Some(document.clone()));
            }
        }

        Ok(None)
    }

    async fn delete_one(&self, filter: Expr) -> ModelResult<DeleteResult> {
        let deleted = self.find_one_and_modify(&filter, None).await?;

        Ok(DeleteResult { deleted_count: deleted.map_or(0, |_| 1) })
    }

    async fn delete_many(&self, filter: Expr) -> ModelResult<DeleteResult> {
        let mut store = self.store.write().await;
        let documents = match store.get_mut(&self.name) {
            Some(col) => col,
            None => return Ok(DeleteResult::default()),
        };

        let mut kept = Vec::with_capacity(documents.len());
        let mut deleted_count = 0;

        for document in documents.drain(..) {
            if DocumentEvaluator::matches(&document, &filter)? {
                deleted_count += 1;
            } else {
                kept.push(document);
            }
        }

        *documents = kept;

        Ok(DeleteResult { deleted_count })
    }

    async fn replace_one(&self, filter: Expr, replacement: Document) -> ModelResult<UpdateResult> {
        self.update(filter, replacement, UpdateOptions::default()).await
    }

    async fn update_one(&self, filter: Expr, update: Document) -> ModelResult<UpdateResult> {
        self.update(filter, update, UpdateOptions::default()).await
    }

    async fn update_many(&self, filter: Expr, update: Document) -> ModelResult<UpdateResult> {
        self.update(filter, update, UpdateOptions::multi()).await
    }

    async fn find_one_and_delete(&self, filter: Expr) -> ModelResult<Option<Document>> {
        self.find_one_and_modify(&filter, None).await
    }

    async fn find_one_and_replace(
        &self,
        filter: Expr,
        replacement: Document,
    ) -> ModelResult<Option<Document>> {
        self.find_one_and_modify(&filter, Some(&replacement)).await
    }

    async fn find_one_and_update(
        &self,
        filter: Expr,
        update: Document,
    ) -> ModelResult<Option<Document>> {
        self.find_one_and_modify(&filter, Some(&update)).await
    }
}


/// Builder for constructing [`InMemoryDatabase`] instances.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryDatabase;
/// use docmodel::backend::DatabaseBuilder;
///
/// let database = InMemoryDatabase::builder().name("app").build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryDatabaseBuilder {
    name: Option<String>,
}

impl InMemoryDatabaseBuilder {
    /// Sets the database name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[async_trait]
impl DatabaseBuilder for InMemoryDatabaseBuilder {
    type Database = InMemoryDatabase;

    async fn build(self) -> ModelResult<Self::Database> {
        Ok(match self.name {
            Some(name) => InMemoryDatabase::new(name),
            None => InMemoryDatabase::default(),
        })
    }
}
