//! Option and result types shared by collection handles.

use bson::Bson;

/// Sort direction for query results.
#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Options for `find` operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub skip: Option<usize>,
    /// Sort specification for results.
    pub sort: Option<Sort>,
}

/// Options for the generic `update` operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert the document when nothing matches the filter.
    pub upsert: bool,
    /// Apply the update to every matching document instead of the first one.
    pub multi: bool,
}

impl UpdateOptions {
    /// Options for a single-document upsert.
    pub fn upsert() -> Self {
        Self { upsert: true, multi: false }
    }

    /// Options for a multi-document update.
    pub fn multi() -> Self {
        Self { upsert: false, multi: true }
    }
}

/// Outcome of an update or replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Number of documents matched by the filter.
    pub matched_count: u64,
    /// Number of documents actually changed.
    pub modified_count: u64,
    /// Identifiers of documents inserted by an upsert.
    pub upserted_ids: Vec<Bson>,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// Number of documents removed.
    pub deleted_count: u64,
}
