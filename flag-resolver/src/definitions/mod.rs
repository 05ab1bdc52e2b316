pub mod builtin;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::flags::flag_models::{FlagStore, FlagValue, ResolvedFlag};
use crate::logging::{FlagLogger, TracingLogger};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlagDefinition {
    pub key: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub default_value: FlagValue,
}

/// Display metadata for a category of flags.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlagCategory {
    pub category: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlagGroup {
    pub name: String,
    pub category: String,
    pub description: String,
    pub features: Vec<FlagDefinition>,
}

/// Read-only table of every flag the application knows about.
#[derive(Debug, Clone)]
pub struct DefinitionCatalog {
    definitions: Vec<FlagDefinition>,
    categories: Vec<FlagCategory>,
    index: HashMap<String, usize>,
}

impl DefinitionCatalog {
    /// Keys are unique; a repeated key keeps its first definition.
    pub fn new(definitions: Vec<FlagDefinition>, categories: Vec<FlagCategory>) -> Self {
        Self::with_logger(definitions, categories, &TracingLogger)
    }

    /// Like [`DefinitionCatalog::new`], reporting ignored duplicates to `logger`.
    pub fn with_logger(
        definitions: Vec<FlagDefinition>,
        categories: Vec<FlagCategory>,
        logger: &dyn FlagLogger,
    ) -> Self {
        let mut unique = Vec::with_capacity(definitions.len());
        let mut index = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            if index.contains_key(&definition.key) {
                logger.log_warn(
                    "duplicate flag definition ignored",
                    &json!({ "key": definition.key }),
                );
                continue;
            }
            index.insert(definition.key.clone(), unique.len());
            unique.push(definition);
        }

        Self {
            definitions: unique,
            categories,
            index,
        }
    }

    pub fn builtin() -> Self {
        Self::new(builtin::definitions(), builtin::categories())
    }

    pub fn get_all_definitions(&self) -> &[FlagDefinition] {
        &self.definitions
    }

    /// Groups definitions by category, in category table order. Categories with no
    /// definitions are left out; definitions whose category has no metadata are grouped
    /// at the end under the category name.
    pub fn get_grouped_definitions(&self) -> Vec<FlagGroup> {
        let mut groups: Vec<FlagGroup> = self
            .categories
            .iter()
            .map(|category| FlagGroup {
                name: category.name.clone(),
                category: category.category.clone(),
                description: category.description.clone(),
                features: Vec::new(),
            })
            .collect();

        for definition in &self.definitions {
            match groups
                .iter_mut()
                .find(|group| group.category == definition.category)
            {
                Some(group) => group.features.push(definition.clone()),
                None => groups.push(FlagGroup {
                    name: definition.category.clone(),
                    category: definition.category.clone(),
                    description: String::new(),
                    features: vec![definition.clone()],
                }),
            }
        }

        groups.retain(|group| !group.features.is_empty());
        groups
    }

    pub fn get(&self, key: &str) -> Option<&FlagDefinition> {
        self.index.get(key).map(|&i| &self.definitions[i])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// A fresh store holding every definition's default value, none marked as override.
    pub fn defaults(&self) -> FlagStore {
        self.definitions
            .iter()
            .map(|d| (d.key.clone(), ResolvedFlag::from_default(d.default_value)))
            .collect()
    }

    /// Keys with no matching definition, sorted and deduplicated.
    pub fn unknown_keys<'a, I>(&self, keys: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let unknown: HashSet<&String> = keys.into_iter().filter(|k| !self.contains(k)).collect();
        let mut unknown: Vec<String> = unknown.into_iter().cloned().collect();
        unknown.sort();
        unknown
    }
}

impl Default for DefinitionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
