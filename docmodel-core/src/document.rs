//! Change-tracked documents.
//!
//! A [`TrackedDocument`] wraps a plain BSON record together with the snapshot of what was last
//! persisted and a flag telling whether the record exists in the store yet. The persistence
//! protocol uses the flag to pick between insert and update, and [`TrackedDocument::delta`] to
//! compute the minimal update.

use bson::{Bson, Document};

use crate::schema::ID_FIELD;

/// Field-level difference between a document and its last persisted snapshot.
///
/// Both maps are always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delta {
    /// Fields that are new or whose value changed, with their current value.
    pub set: Document,
    /// Fields that were removed. Values are ignored by stores; `""` is used.
    pub unset: Document,
}

impl Delta {
    /// Returns true when neither fields to set nor fields to unset remain.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Produces the update document for this delta.
    ///
    /// Returns `None` when there is nothing to apply. Otherwise the result holds `$set` and/or
    /// `$unset`, leaving out whichever is empty.
    pub fn clean(&self) -> Option<Document> {
        if self.is_empty() {
            return None;
        }

        let mut update = Document::new();

        if !self.set.is_empty() {
            update.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            update.insert("$unset", self.unset.clone());
        }

        Some(update)
    }
}

/// A record tagged as new or existing, with change tracking against its persisted snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedDocument {
    fields: Document,
    snapshot: Document,
    is_new: bool,
}

impl TrackedDocument {
    /// Wraps `fields`.
    ///
    /// An existing document (`is_new == false`) takes its current fields as the persisted
    /// snapshot. A new document starts with an empty snapshot.
    pub fn new(fields: Document, is_new: bool) -> Self {
        let snapshot = if is_new { Document::new() } else { fields.clone() };

        Self { fields, snapshot, is_new }
    }

    /// Returns true if the document has not been inserted yet.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Overrides the new/existing flag.
    pub fn set_new(&mut self, is_new: bool) {
        self.is_new = is_new;
    }

    /// Returns the identifier, if the document has one.
    pub fn id(&self) -> Option<&Bson> {
        self.fields.get(ID_FIELD)
    }

    /// Returns the value of a top-level field.
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.fields.get(key)
    }

    /// Sets a top-level field, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> Option<Bson> {
        self.fields.insert(key.into(), value.into())
    }

    /// Removes a top-level field, returning its value.
    pub fn unset(&mut self, key: &str) -> Option<Bson> {
        self.fields.remove(key)
    }

    /// Returns the current field values.
    pub fn fields(&self) -> &Document {
        &self.fields
    }

    /// Returns the current field values for in-place edits.
    pub fn fields_mut(&mut self) -> &mut Document {
        &mut self.fields
    }

    /// Computes the difference between the current fields and the persisted snapshot.
    ///
    /// Comparison is per top-level field; embedded documents and arrays are compared as whole
    /// values and set wholesale when they differ.
    pub fn delta(&self) -> Delta {
        let mut delta = Delta::default();

        for (key, value) in &self.fields {
            if self.snapshot.get(key) != Some(value) {
                delta.set.insert(key.clone(), value.clone());
            }
        }

        for key in self.snapshot.keys() {
            if !self.fields.contains_key(key) {
                delta.unset.insert(key.clone(), "");
            }
        }

        delta
    }

    /// Records the current fields as the persisted state.
    pub fn mark_persisted(&mut self) {
        self.snapshot = self.fields.clone();
    }

    /// Unwraps the current field values.
    pub fn into_inner(self) -> Document {
        self.fields
    }
}

impl From<Document> for TrackedDocument {
    fn from(fields: Document) -> Self {
        TrackedDocument::new(fields, true)
    }
}
