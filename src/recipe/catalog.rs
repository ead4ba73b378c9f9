//! The recipe catalog.
//!
//! Built-in recipes are YAML files embedded at compile time. Loading parses
//! every file, validates the whole catalog, and refuses to produce a
//! catalog if any recipe is invalid.

use include_dir::{include_dir, Dir};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use super::schema::{Recipe, ToolRecipe};
use crate::error::{Result, RigupError};
use crate::lint::{self, RuleId, SchemaError, Severity};

/// Embedded recipes directory.
static RECIPES_DIR: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/recipes");

/// Read-only recipe store, keyed by recipe id.
#[derive(Debug, Clone, Default)]
pub struct RecipeCatalog {
    recipes: BTreeMap<String, Recipe>,
}

impl RecipeCatalog {
    /// Load and validate the embedded catalog.
    pub fn builtin() -> Result<Self> {
        Self::from_documents(load_builtin_documents()?)
    }

    /// Parse a single YAML catalog file (recipe id → recipe) and validate it.
    pub fn from_yaml_str(content: &str, path: &Path) -> Result<Self> {
        Self::from_documents(parse_documents(content, path)?)
    }

    /// Validate raw documents and convert them into typed recipes.
    pub fn from_documents(documents: BTreeMap<String, Value>) -> Result<Self> {
        let mut errors = lint::validate_all(&documents);

        let mut recipes = BTreeMap::new();
        if errors.is_empty() {
            for (id, doc) in documents {
                match Recipe::from_value(doc) {
                    Ok(recipe) => {
                        recipes.insert(id, recipe);
                    }
                    Err(e) => errors.push(SchemaError::new(
                        RuleId::new("recipe-shape"),
                        Severity::Error,
                        id,
                        e.to_string(),
                    )),
                }
            }
        }

        if !errors.is_empty() {
            return Err(RigupError::InvalidCatalog { errors });
        }
        debug!("Loaded {} recipes", recipes.len());
        Ok(Self { recipes })
    }

    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.recipes.get(id)
    }

    /// A tool recipe by id.
    pub fn tool(&self, id: &str) -> Option<&ToolRecipe> {
        self.get(id).and_then(Recipe::as_tool)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.recipes.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Recipe)> {
        self.recipes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

/// Parse every embedded catalog file into raw documents.
pub fn load_builtin_documents() -> Result<BTreeMap<String, Value>> {
    let mut documents = BTreeMap::new();
    for file in RECIPES_DIR.files() {
        let is_yaml = file
            .path()
            .extension()
            .is_some_and(|ext| ext == "yml" || ext == "yaml");
        if !is_yaml {
            continue;
        }
        let content = file.contents_utf8().ok_or_else(|| RigupError::ParseError {
            path: file.path().to_path_buf(),
            message: "Invalid UTF-8".to_string(),
        })?;
        for (id, doc) in parse_documents(content, file.path())? {
            if documents.insert(id.clone(), doc).is_some() {
                return Err(RigupError::ParseError {
                    path: file.path().to_path_buf(),
                    message: format!("Recipe '{}' is defined more than once", id),
                });
            }
        }
    }
    Ok(documents)
}

/// Parse one YAML catalog file into raw documents.
pub fn parse_documents(content: &str, path: &Path) -> Result<BTreeMap<String, Value>> {
    serde_yaml::from_str(content).map_err(|e| RigupError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
