//! In-memory database backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `Database` and
//! `CollectionHandle` traits. It uses async-aware read-write locks for concurrent access and
//! is meant for development, testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Atomic upserts** - Matching and inserting happen under one write lock
//! - **Filter evaluation** - Dotted paths, comparisons, array and string operators
//! - **Update operators** - `$set`, `$unset` and `$inc`, plus whole-document replacement
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryDatabase};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let database = InMemoryDatabase::builder().name("app").build().await?;
//!     let users = create_model(database, "users")?;
//!
//!     let mut alice = users.document(doc! { "name": "Alice" });
//!     alice.save().await?;
//!
//!     assert_eq!(users.count(Filter::all()).await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod database;
mod evaluator;
mod update;

pub use database::{InMemoryCollection, InMemoryDatabase, InMemoryDatabaseBuilder};
