//! Schema definitions for EduHub collections
//!
//! Schemas define the structure of collections:
//! - Field definitions with types, including nested objects and arrays
//! - Required vs optional fields
//! - Enumerations, string length/pattern and numeric bounds
//!
//! A schema renders into the `$jsonSchema` validator applied when its
//! collection is created. Schemas can also be written to and read from
//! `{dir}/{collection}.yaml` so they can be inspected or overridden.

mod builtin;

use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// A field type in the schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Double,
    Bool,
    Date,
    Array(Box<FieldType>),
    /// Embedded document with its own fields
    Object(Vec<FieldDef>),
    /// The inner type, or null
    Nullable(Box<FieldType>),
}

impl Default for FieldType {
    fn default() -> Self {
        Self::String
    }
}

impl FieldType {
    fn bson_type_names(&self) -> Vec<&'static str> {
        match self {
            FieldType::String => vec!["string"],
            FieldType::Int => vec!["int"],
            FieldType::Double => vec!["double"],
            FieldType::Bool => vec!["bool"],
            FieldType::Date => vec!["date"],
            FieldType::Array(_) => vec!["array"],
            FieldType::Object(_) => vec!["object"],
            FieldType::Nullable(inner) => {
                let mut names = inner.bson_type_names();
                names.push("null");
                names
            }
        }
    }

    fn render_into(&self, out: &mut Document) {
        let names = self.bson_type_names();
        if names.len() == 1 {
            out.insert("bsonType", names[0]);
        } else {
            out.insert("bsonType", names);
        }

        match self {
            FieldType::Array(item) => {
                let mut items = Document::new();
                item.render_into(&mut items);
                out.insert("items", items);
            }
            FieldType::Object(fields) => {
                let (required, properties) = render_fields(fields);
                if !required.is_empty() {
                    out.insert("required", required);
                }
                out.insert("properties", properties);
            }
            FieldType::Nullable(inner) => {
                if let FieldType::Array(_) | FieldType::Object(_) = inner.as_ref() {
                    let mut nested = Document::new();
                    inner.render_into(&mut nested);
                    nested.remove("bsonType");
                    for (key, value) in nested {
                        out.insert(key, value);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Definition of a single field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FieldDef {
    pub name: String,
    /// Field type
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Whether the field is required
    #[serde(default)]
    pub required: bool,
    /// Allowed values
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn min_length(mut self, len: u32) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Render this field's `$jsonSchema` property
    pub fn to_json_schema(&self) -> Document {
        let mut out = Document::new();
        self.field_type.render_into(&mut out);

        if let Some(description) = &self.description {
            out.insert("description", description.as_str());
        }
        if let Some(values) = &self.enum_values {
            out.insert("enum", values.clone());
        }
        if let Some(len) = self.min_length {
            out.insert("minLength", len as i32);
        }
        if let Some(pattern) = &self.pattern {
            out.insert("pattern", pattern.as_str());
        }
        if let Some(minimum) = self.minimum {
            out.insert("minimum", number(minimum));
        }
        if let Some(maximum) = self.maximum {
            out.insert("maximum", number(maximum));
        }
        out
    }
}

fn number(value: f64) -> Bson {
    if value.fract() == 0.0 && value.abs() < i32::MAX as f64 {
        Bson::Int32(value as i32)
    } else {
        Bson::Double(value)
    }
}

fn render_fields(fields: &[FieldDef]) -> (Vec<String>, Document) {
    let required = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.clone())
        .collect();
    let properties = fields
        .iter()
        .map(|f| (f.name.clone(), Bson::Document(f.to_json_schema())))
        .collect();
    (required, properties)
}

/// Schema for a collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    /// Collection name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Field definitions, in document order
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl Schema {
    /// Create a new schema for a collection
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    /// Add a field definition
    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name.as_str())
    }

    /// The `$jsonSchema` body for this collection
    pub fn to_json_schema(&self) -> Document {
        let (required, properties) = render_fields(&self.fields);
        doc! {
            "bsonType": "object",
            "required": required,
            "properties": properties,
        }
    }

    /// The full validator document: `{"$jsonSchema": ...}`
    pub fn validator(&self) -> Document {
        doc! { "$jsonSchema": self.to_json_schema() }
    }
}

/// How `apply_schemas` treats collections that already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaMode {
    /// Drop and re-create every collection (destroys existing data)
    #[default]
    Recreate,
    /// Only create collections that are missing
    CreateMissing,
}

/// Registry of collection schemas
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Vec<Schema>,
}

impl SchemaRegistry {
    /// The six EduHub collection schemas
    pub fn eduhub() -> Self {
        Self {
            schemas: builtin::all(),
        }
    }

    /// Load schemas from `{dir}/*.yaml`
    ///
    /// Schemas found on disk replace the built-in schema of the same name.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut registry = Self::eduhub();

        let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| Error::io(dir, e))?.path();
            if path.extension().map(|e| e == "yaml").unwrap_or(false) {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            let schema: Schema = serde_yaml::from_str(&content)?;
            crate::validation::validate_collection_name(&schema.name)?;
            tracing::debug!(collection = %schema.name, path = %path.display(), "loaded schema");
            registry.register(schema);
        }

        Ok(registry)
    }

    /// Write every schema to `{dir}/{collection}.yaml`
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        for schema in &self.schemas {
            let file_path = dir.join(format!("{}.yaml", schema.name));
            let content = serde_yaml::to_string(schema)?;
            std::fs::write(&file_path, content).map_err(|e| Error::io(&file_path, e))?;
        }
        Ok(())
    }

    /// Get a schema by collection name
    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// Register a schema, replacing any schema with the same name
    pub fn register(&mut self, schema: Schema) {
        match self.schemas.iter_mut().find(|s| s.name == schema.name) {
            Some(existing) => *existing = schema,
            None => self.schemas.push(schema),
        }
    }

    /// List all registered schemas
    pub fn list(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.iter()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_schema_rendering() {
        let schema = Schema::new("submissions")
            .field(FieldDef::new("content", FieldType::String).required().min_length(1))
            .field(
                FieldDef::new("grade", FieldType::Nullable(Box::new(FieldType::Double)))
                    .range(Some(0.0), Some(100.0)),
            );

        let rendered = schema.to_json_schema();
        assert_eq!(rendered.get_str("bsonType").unwrap(), "object");
        assert_eq!(rendered.get_array("required").unwrap(), &vec![Bson::from("content")]);

        let grade = rendered.get_document("properties").unwrap().get_document("grade").unwrap();
        assert_eq!(
            grade.get_array("bsonType").unwrap(),
            &vec![Bson::from("double"), Bson::from("null")]
        );
        assert_eq!(grade.get_i32("maximum").unwrap(), 100);
    }

    #[test]
    fn test_nested_object_rendering() {
        let field = FieldDef::new(
            "profile",
            FieldType::Object(vec![FieldDef::new("skills", FieldType::Array(Box::new(FieldType::String)))]),
        );
        let rendered = field.to_json_schema();
        let skills = rendered.get_document("properties").unwrap().get_document("skills").unwrap();
        assert_eq!(skills.get_str("bsonType").unwrap(), "array");
        assert_eq!(skills.get_document("items").unwrap().get_str("bsonType").unwrap(), "string");
    }

    #[test]
    fn test_rendered_validator_parses() {
        for schema in SchemaRegistry::eduhub().list() {
            let validator = docql::validator(&schema.validator());
            assert!(validator.is_ok(), "{}: {:?}", schema.name, validator);
        }
    }

    #[test]
    fn test_registry_replace() {
        let mut registry = SchemaRegistry::eduhub();
        assert_eq!(registry.len(), 6);
        registry.register(Schema::new("users"));
        assert_eq!(registry.len(), 6);
        assert!(registry.get("users").unwrap().fields.is_empty());
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::eduhub();
        registry.save(dir.path()).unwrap();
        assert!(dir.path().join("lessons.yaml").exists());

        let loaded = SchemaRegistry::load(dir.path()).unwrap();
        assert_eq!(loaded.get("users"), registry.get("users"));
        assert_eq!(loaded.get("submissions"), registry.get("submissions"));
    }
}
