//! Database abstraction consumed by models.
//!
//! A [`Database`] hands out [`CollectionHandle`]s by name. Collection handles expose the raw,
//! document-level write and read operations the model layer is built on. Concrete
//! implementations live in the `docmodel-memory` and `docmodel-mongodb` crates.
//!
//! # Traits
//!
//! - [`Database`]: resolves collection handles and names the database for diagnostics
//! - [`CollectionHandle`]: async document operations on one collection
//! - [`DatabaseBuilder`]: factory trait for creating database instances
//!
//! # Update documents
//!
//! Every operation that takes an `update` document interprets it the way MongoDB does: when all
//! of its keys start with `$` it is a set of update operators (`$set`, `$unset`, ...), otherwise
//! it is a full replacement of the matched document. See [`is_operator_update`].

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    error::ModelResult,
    filter::Expr,
    options::{DeleteResult, FindOptions, UpdateOptions, UpdateResult},
};

/// A handle to a database that can resolve collections by name.
///
/// Handles are expected to be cheap to hold: MongoDB's `Database` and the in-memory database
/// are both reference-counted internally. A borrowed database (`&D`) is itself a database, so a
/// model may also borrow the caller's handle.
pub trait Database: Send + Sync + Debug {
    /// The collection handle type produced by this database.
    type Collection: CollectionHandle;

    /// Returns the database name. Used for diagnostics only.
    fn name(&self) -> &str;

    /// Returns a handle to the named collection.
    ///
    /// Resolving a handle never touches the store; collections are created lazily on first
    /// write.
    fn collection(&self, name: &str) -> Self::Collection;
}

impl<D> Database for &D
where
    D: Database,
{
    type Collection = D::Collection;

    fn name(&self) -> &str {
        (*self).name()
    }

    fn collection(&self, name: &str) -> Self::Collection {
        (*self).collection(name)
    }
}

/// Document-level operations on a single collection.
///
/// # Thread Safety
///
/// Implementations must be safe to share between tasks. The store, not the handle, is the
/// arbiter of concurrent writes to the same identifier.
///
/// # Error Handling
///
/// Store failures are reported as [`ModelError::Backend`](crate::error::ModelError::Backend)
/// and are never retried by callers in this workspace.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CollectionHandle: Send + Sync + Debug {
    /// Updates or replaces documents matching `filter`.
    ///
    /// With `options.upsert`, a document is inserted when nothing matches and its identifier is
    /// reported in [`UpdateResult::upserted_ids`]. With `options.multi`, every match is updated,
    /// otherwise only the first one.
    async fn update(
        &self,
        filter: Expr,
        update: Document,
        options: UpdateOptions,
    ) -> ModelResult<UpdateResult>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, filter: Expr) -> ModelResult<u64>;

    /// Returns the distinct values of `field` among the documents matching `filter`.
    async fn distinct(&self, field: &str, filter: Expr) -> ModelResult<Vec<Bson>>;

    /// Returns the documents matching `filter`, shaped by `options`.
    async fn find(&self, filter: Expr, options: FindOptions) -> ModelResult<Vec<Document>>;

    /// Returns the first document matching `filter`.
    async fn find_one(&self, filter: Expr) -> ModelResult<Option<Document>>;

    /// Deletes the first document matching `filter`.
    async fn delete_one(&self, filter: Expr) -> ModelResult<DeleteResult>;

    /// Deletes every document matching `filter`.
    async fn delete_many(&self, filter: Expr) -> ModelResult<DeleteResult>;

    /// Replaces the first document matching `filter` with `replacement`.
    async fn replace_one(&self, filter: Expr, replacement: Document) -> ModelResult<UpdateResult>;

    /// Applies the operator document `update` to the first document matching `filter`.
    async fn update_one(&self, filter: Expr, update: Document) -> ModelResult<UpdateResult>;

    /// Applies the operator document `update` to every document matching `filter`.
    async fn update_many(&self, filter: Expr, update: Document) -> ModelResult<UpdateResult>;

    /// Deletes the first document matching `filter` and returns it.
    async fn find_one_and_delete(&self, filter: Expr) -> ModelResult<Option<Document>>;

    /// Replaces the first document matching `filter` and returns it as it was before.
    async fn find_one_and_replace(
        &self,
        filter: Expr,
        replacement: Document,
    ) -> ModelResult<Option<Document>>;

    /// Updates the first document matching `filter` and returns it as it was before.
    async fn find_one_and_update(
        &self,
        filter: Expr,
        update: Document,
    ) -> ModelResult<Option<Document>>;
}

/// Factory trait for databases that need asynchronous setup (connections, handshakes).
#[async_trait]
pub trait DatabaseBuilder {
    type Database: Database;

    async fn build(self) -> ModelResult<Self::Database>;
}

/// Returns true when `update` is made of update operators rather than a replacement document.
///
/// An empty document counts as a replacement.
pub fn is_operator_update(update: &Document) -> bool {
    !update.is_empty() && update.keys().all(|key| key.starts_with('$'))
}
