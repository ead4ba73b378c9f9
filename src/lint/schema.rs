//! JSON Schema generation for recipe catalogs.
//!
//! The schema is derived from the typed recipe model, enabling editor
//! autocomplete for `recipes/*.yml`.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::recipe::Recipe;

/// Generates JSON Schema for recipe catalog files.
pub struct SchemaGenerator;

impl SchemaGenerator {
    /// Create a new schema generator.
    pub fn new() -> Self {
        Self
    }

    /// Schema for a catalog file: recipe id → recipe.
    pub fn generate(&self) -> Value {
        let schema = schemars::schema_for!(BTreeMap<String, Recipe>);
        let mut value = serde_json::to_value(schema).unwrap_or(Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.insert("title".into(), Value::String("rigup recipe catalog".into()));
        }
        value
    }

    /// Serialized schema.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(&self.generate()).unwrap_or_default()
    }
}

impl Default for SchemaGenerator {
    fn default() -> Self {
        Self::new()
    }
}
