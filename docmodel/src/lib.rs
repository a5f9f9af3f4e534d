//! Main docmodel crate providing a minimal object-document mapper.
//!
//! This crate is the primary entry point for users of docmodel. It re-exports the core types
//! from the sub-crates and gives access to the available database backends.
//!
//! # Features
//!
//! - **Models** - Bind a collection (and optionally a schema) once, construct documents from it
//! - **Change tracking** - Existing documents save only the fields that changed
//! - **Safe inserts** - New documents are upserted on `_id` and fail on identifier collisions
//! - **Query helpers** - Schema-checked count, find, distinct, update and delete operations
//! - **Multiple backends** - In-memory and MongoDB databases behind one trait pair
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryDatabase};
//! use docmodel::bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> ModelResult<()> {
//!     let users = create_model(InMemoryDatabase::new("app"), "users")?;
//!
//!     // New documents are inserted on first save
//!     let mut alice = users.document(doc! { "name": "Alice", "age": 30 });
//!     alice.save().await?;
//!
//!     // Later saves send { "$set": ... } / { "$unset": ... } with the changed fields only
//!     alice.set("age", 31);
//!     alice.unset("name");
//!     alice.save().await?;
//!
//!     let adults = users
//!         .find(Filter::gte("age", 18))
//!         .sort("age", SortDirection::Desc)
//!         .limit(10)
//!         .await?;
//!
//!     println!("Found {} adults", adults.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Schemas
//!
//! A model can carry a schema. The identifier field `_id` is always part of it (an ObjectId
//! unless declared otherwise), and filters, sort fields and replacements are checked against
//! the declared fields.
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryDatabase};
//!
//! let schema = Schema::builder()
//!     .field("_id", FieldType::String)
//!     .field("name", FieldType::String)
//!     .build();
//!
//! let users = create_model(
//!     InMemoryDatabase::new("app"),
//!     ModelConfig::new("users").with_schema(schema),
//! )?;
//!
//! // Unknown fields are rejected before reaching the database
//! assert!(users.count(Filter::eq("nmae", "Alice")).await.is_err());
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory database for development and testing
//! - [`mongodb`] - MongoDB database (requires `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{backend, document, error, filter, model, options, query, schema};
pub use docmodel_core::model::create_model;

// Re-export BSON types for convenience
pub use bson;

/// In-memory database implementations.
pub mod memory {
    pub use docmodel_memory::{InMemoryCollection, InMemoryDatabase, InMemoryDatabaseBuilder};
}

/// MongoDB database implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoCollection, MongoDatabase, MongoDatabaseBuilder};
}
