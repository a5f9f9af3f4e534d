//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use docmodel_core::{
    backend::{CollectionHandle, Database, DatabaseBuilder},
    document::{Delta, TrackedDocument},
    error::{ModelError, ModelResult},
    filter::{Expr, FieldOp, Filter, FilterVisitor},
    model::{Model, ModelConfig, ModelDocument, create_model},
    options::{DeleteResult, FindOptions, Sort, SortDirection, UpdateOptions, UpdateResult},
    query::{Find, Query},
    schema::{CompiledSchema, FieldType, Schema, SchemaBuilder},
};
