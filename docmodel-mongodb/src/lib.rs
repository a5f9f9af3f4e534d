//! MongoDB backend implementation for docmodel.
//!
//! This crate provides a MongoDB-based implementation of the `Database` and
//! `CollectionHandle` traits. Filters are translated to MongoDB query documents, updates and
//! upserts are executed by the server, so the insert and update checks of the save protocol
//! rely on the driver's reported counts.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{prelude::*, mongodb::MongoDatabase};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let database = MongoDatabase::builder("mongodb://localhost:27017", "my_database")
//!         .build()
//!         .await?;
//!     let users = create_model(database, "users")?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_mongodb;

pub mod database;
mod filter;

pub use database::{MongoCollection, MongoDatabase, MongoDatabaseBuilder};
