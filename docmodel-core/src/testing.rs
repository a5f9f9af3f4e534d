//! Test doubles shared by the unit tests of this crate.

use bson::Bson;
use std::sync::Mutex;

use crate::{
    backend::{Database, MockCollectionHandle},
    options::UpdateResult,
};

/// A database that hands out one pre-configured mock collection.
#[derive(Debug)]
pub(crate) struct MockDatabase {
    collection: Mutex<Option<MockCollectionHandle>>,
}

impl MockDatabase {
    pub(crate) fn new(collection: MockCollectionHandle) -> Self {
        Self { collection: Mutex::new(Some(collection)) }
    }
}

impl Database for MockDatabase {
    type Collection = MockCollectionHandle;

    fn name(&self) -> &str {
        "test"
    }

    fn collection(&self, _name: &str) -> Self::Collection {
        self.collection
            .lock()
            .unwrap()
            .take()
            .expect("collection resolved more than once")
    }
}

/// The result a store reports after inserting `id` through an upsert.
pub(crate) fn upserted(id: impl Into<Bson>) -> UpdateResult {
    UpdateResult {
        matched_count: 0,
        modified_count: 0,
        upserted_ids: vec![id.into()],
    }
}

/// The result a store reports after modifying `count` documents.
pub(crate) fn modified(count: u64) -> UpdateResult {
    UpdateResult {
        matched_count: count,
        modified_count: count,
        upserted_ids: Vec::new(),
    }
}
