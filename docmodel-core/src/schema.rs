//! Schema definitions for models.
//!
//! A [`Schema`] is an immutable map of field declarations produced by a [`SchemaBuilder`] (or
//! deserialized from configuration). Both paths guarantee the identifier field `_id` is
//! declared, defaulting to [`FieldType::ObjectId`]. The model factory compiles the schema
//! exactly once; [`Schema::compile`] consumes the schema so it cannot be compiled twice.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::schema::{Schema, FieldType};
//!
//! let schema = Schema::builder()
//!     .field("name", FieldType::String)
//!     .field("age", FieldType::Int32)
//!     .build();
//!
//! assert_eq!(schema.field("_id"), Some(&FieldType::ObjectId));
//! ```

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ModelError, ModelResult};

/// The identifier field every document carries.
pub const ID_FIELD: &str = "_id";

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// BSON object identifier. The default identifier type.
    ObjectId,
    /// UUID stored as BSON binary subtype 4.
    Uuid,
    String,
    Int32,
    Int64,
    Double,
    Bool,
    DateTime,
    /// Embedded document.
    Document,
    Array,
    /// Any value; never rejected.
    Any,
}

impl FieldType {
    /// Returns true if `value` is acceptable for a field of this type.
    ///
    /// `Null` is accepted for every type: declarations do not imply presence.
    pub fn accepts(&self, value: &Bson) -> bool {
        match (self, value) {
            (_, Bson::Null) | (FieldType::Any, _) => true,
            (FieldType::ObjectId, Bson::ObjectId(_)) => true,
            (FieldType::Uuid, Bson::Binary(binary)) => binary.to_uuid().is_ok(),
            (FieldType::String, Bson::String(_)) => true,
            (FieldType::Int32, Bson::Int32(_)) => true,
            (FieldType::Int64, Bson::Int64(_) | Bson::Int32(_)) => true,
            (FieldType::Double, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_)) => true,
            (FieldType::Bool, Bson::Boolean(_)) => true,
            (FieldType::DateTime, Bson::DateTime(_)) => true,
            (FieldType::Document, Bson::Document(_)) => true,
            (FieldType::Array, Bson::Array(_)) => true,
            _ => false,
        }
    }

    /// Generates a fresh identifier value for identifier types that support it.
    pub fn generate_id(&self) -> Option<Bson> {
        match self {
            FieldType::ObjectId => Some(Bson::ObjectId(bson::oid::ObjectId::new())),
            FieldType::Uuid => Some(Bson::from(bson::Uuid::new())),
            _ => None,
        }
    }
}

/// An uncompiled schema: field declarations keyed by field name.
///
/// The identifier field is always declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, FieldType>", into = "BTreeMap<String, FieldType>")]
pub struct Schema {
    fields: BTreeMap<String, FieldType>,
}

impl Schema {
    /// Creates a builder for a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Returns the declared type of `name`.
    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    /// Returns all field declarations.
    pub fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    /// Validates the field declarations and produces the compiled schema.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::SchemaCompilation`] if a field name is empty, starts with `$`,
    /// contains `.` or a NUL byte, or if the identifier is declared as an array.
    pub fn compile(self) -> ModelResult<CompiledSchema> {
        for (name, field_type) in &self.fields {
            if name.is_empty() {
                return Err(ModelError::SchemaCompilation("field names must not be empty".into()));
            }
            if name.starts_with('$') {
                return Err(ModelError::SchemaCompilation(format!(
                    "field {name} must not start with '$'"
                )));
            }
            if name.contains('.') || name.contains('\0') {
                return Err(ModelError::SchemaCompilation(format!(
                    "field {name} must not contain '.' or NUL"
                )));
            }
            if name == ID_FIELD && *field_type == FieldType::Array {
                return Err(ModelError::SchemaCompilation(
                    "the _id field cannot be an array".into(),
                ));
            }
        }

        let id_type = self
            .fields
            .get(ID_FIELD)
            .copied()
            .unwrap_or(FieldType::ObjectId);

        Ok(CompiledSchema { fields: self.fields, id_type })
    }
}

impl From<BTreeMap<String, FieldType>> for Schema {
    fn from(mut fields: BTreeMap<String, FieldType>) -> Self {
        fields
            .entry(ID_FIELD.to_string())
            .or_insert(FieldType::ObjectId);

        Schema { fields }
    }
}

impl From<Schema> for BTreeMap<String, FieldType> {
    fn from(schema: Schema) -> Self {
        schema.fields
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: BTreeMap<String, FieldType>,
}

impl SchemaBuilder {
    /// Declares a field. Declaring the same field twice keeps the last type.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    /// Builds the schema, declaring `_id` as [`FieldType::ObjectId`] when it is missing.
    pub fn build(self) -> Schema {
        Schema::from(self.fields)
    }
}

/// A compiled schema, shared read-only by every document of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSchema {
    fields: BTreeMap<String, FieldType>,
    id_type: FieldType,
}

impl CompiledSchema {
    /// Returns the declared type of `name`.
    pub fn field(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    /// Returns all field declarations.
    pub fn fields(&self) -> &BTreeMap<String, FieldType> {
        &self.fields
    }

    /// Returns the type of the identifier field.
    pub fn id_type(&self) -> FieldType {
        self.id_type
    }

    /// Checks that the first segment of a dotted field path is declared.
    pub fn check_path(&self, path: &str, collection: &str) -> ModelResult<()> {
        let root = path.split('.').next().unwrap_or(path);

        if self.fields.contains_key(root) {
            Ok(())
        } else {
            Err(ModelError::UnknownField(path.to_string(), collection.to_string()))
        }
    }

    /// Checks every declared field present in `document` against its declared type.
    ///
    /// Undeclared fields are allowed.
    pub fn validate(&self, document: &Document, collection: &str) -> ModelResult<()> {
        for (name, field_type) in &self.fields {
            if let Some(value) = document.get(name) {
                if !field_type.accepts(value) {
                    return Err(ModelError::InvalidDocument(format!(
                        "field {name} in collection {collection} expects {field_type:?}, got {:?}",
                        value.element_type()
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn builder_injects_default_identifier() {
        let schema = Schema::builder().field("name", FieldType::String).build();

        assert_eq!(schema.field(ID_FIELD), Some(&FieldType::ObjectId));
        assert_eq!(schema.fields().len(), 2);
    }

    #[test]
    fn builder_keeps_declared_identifier() {
        let schema = Schema::builder()
            .field(ID_FIELD, FieldType::String)
            .field("name", FieldType::String)
            .build();

        assert_eq!(schema.field(ID_FIELD), Some(&FieldType::String));
        assert_eq!(schema.compile().unwrap().id_type(), FieldType::String);
    }

    #[test]
    fn deserialized_schema_gets_identifier() {
        let schema: Schema = serde_json::from_str(r#"{ "name": "string", "tags": "array" }"#).unwrap();

        assert_eq!(schema.field(ID_FIELD), Some(&FieldType::ObjectId));
        assert_eq!(schema.field("tags"), Some(&FieldType::Array));
    }

    #[test]
    fn compile_rejects_invalid_field_names() {
        for name in ["", "$where", "a.b", "nul\0"] {
            let result = Schema::builder().field(name, FieldType::Any).build().compile();

            assert!(
                matches!(result, Err(ModelError::SchemaCompilation(_))),
                "{name:?} should not compile"
            );
        }
    }

    #[test]
    fn compile_rejects_array_identifier() {
        let result = Schema::builder().field(ID_FIELD, FieldType::Array).build().compile();

        assert!(matches!(result, Err(ModelError::SchemaCompilation(_))));
    }

    #[test]
    fn check_path_uses_root_segment() {
        let schema = Schema::builder()
            .field("address", FieldType::Document)
            .build()
            .compile()
            .unwrap();

        assert!(schema.check_path("address.city", "users").is_ok());
        assert!(schema.check_path("_id", "users").is_ok());
        assert!(matches!(
            schema.check_path("nickname", "users"),
            Err(ModelError::UnknownField(path, collection)) if path == "nickname" && collection == "users"
        ));
    }

    #[test]
    fn validate_checks_declared_types() {
        let schema = Schema::builder()
            .field("age", FieldType::Int32)
            .build()
            .compile()
            .unwrap();

        assert!(schema.validate(&doc! { "age": 3, "extra": "x" }, "users").is_ok());
        assert!(schema.validate(&doc! { "age": Bson::Null }, "users").is_ok());
        assert!(matches!(
            schema.validate(&doc! { "age": "three" }, "users"),
            Err(ModelError::InvalidDocument(_))
        ));
    }

    #[test]
    fn generated_identifiers_follow_type() {
        assert!(matches!(FieldType::ObjectId.generate_id(), Some(Bson::ObjectId(_))));
        assert!(FieldType::Uuid.accepts(&FieldType::Uuid.generate_id().unwrap()));
        assert_eq!(FieldType::String.generate_id(), None);
    }
}
