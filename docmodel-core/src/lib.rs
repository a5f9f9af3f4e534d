//! A minimal object-document mapper for document databases.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Models** ([`model`]) - Collection-bound document constructors with helper operations
//! - **Tracked documents** ([`document`]) - New/existing tagging and change deltas
//! - **Query builder** ([`query`]) - Schema-checked, lazily evaluated collection operations
//! - **Schemas** ([`schema`]) - Field declarations with a guaranteed identifier field
//! - **Backend abstraction** ([`backend`]) - Traits implemented by concrete databases
//! - **Filters** ([`filter`]) - Backend-neutral filter expressions
//! - **Options** ([`options`]) - Option and result types of collection operations
//! - **Error handling** ([`error`]) - Error and result types
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
//! alice.save().await?;          // upsert on _id, must create exactly one document
//!
//! alice.set("age", 30);
//! alice.save().await?;          // { "$set": { "age": 30 } }, must modify exactly one document
//!
//! let adults = users.find(Filter::gte("age", 18)).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod backend;
pub mod document;
pub mod error;
pub mod filter;
pub mod model;
pub mod options;
pub mod query;
pub mod schema;

mod persist;

#[cfg(test)]
mod testing;
