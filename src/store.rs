//! Template Store: the key -> template mapping read from the prompt file.
//!
//! The store is built once by [`TemplateStore::load`] (or
//! [`TemplateStore::from_yaml_str`] for fixtures) and is read-only
//! afterwards. Share it between concurrent runs behind an `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::template::{PromptKey, Template};

#[derive(Debug, Clone)]
pub struct TemplateStore {
    origin: String,
    templates: BTreeMap<String, Template>,
}

impl TemplateStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_yaml_str(path.display().to_string(), &raw)?;
        info!("Loaded {} prompt templates from {}", store.len(), path.display());
        Ok(store)
    }

    /// Builds a store from YAML text. `origin` names the source in errors.
    /// The first bad prompt fails the whole load.
    pub fn from_yaml_str(origin: impl Into<String>, yaml: &str) -> Result<Self> {
        let origin = origin.into();
        let mut templates = BTreeMap::new();
        for (key, parsed) in Self::inspect(&origin, yaml)? {
            templates.insert(key, parsed?);
        }
        Ok(Self { origin, templates })
    }

    /// Parses every prompt of the document independently.
    ///
    /// Only a document that is not a mapping of names fails as a whole;
    /// each prompt gets its own result so callers can report all of them.
    pub fn inspect(origin: &str, yaml: &str) -> Result<Vec<(String, Result<Template>)>> {
        let corrupt = |reason: String| Error::TemplateStoreCorrupt {
            path: origin.to_string(),
            reason,
        };

        let doc: Value = serde_yaml::from_str(yaml).map_err(|e| corrupt(e.to_string()))?;
        let mapping = match doc {
            Value::Mapping(m) => m,
            Value::Null => serde_yaml::Mapping::new(),
            other => {
                return Err(corrupt(format!(
                    "expected a mapping of prompt names to strings, found {}",
                    value_kind(&other)
                )));
            }
        };

        let mut entries = Vec::with_capacity(mapping.len());
        for (k, v) in mapping {
            let key = match k {
                Value::String(s) => s,
                other => {
                    return Err(corrupt(format!(
                        "prompt names must be strings, found {}",
                        value_kind(&other)
                    )));
                }
            };
            let parsed = match v {
                Value::String(text) => Template::parse(key.clone(), text)
                    .map_err(|e| corrupt(format!("prompt '{key}': {e}")))
                    .and_then(|template| match PromptKey::from_key(&key) {
                        Some(known) => check_declared(known, &template)
                            .map(|()| template)
                            .map_err(corrupt),
                        None => Ok(template),
                    }),
                other => Err(corrupt(format!(
                    "prompt '{key}' is {} rather than a string",
                    value_kind(&other)
                ))),
            };
            if let Ok(template) = &parsed {
                debug!(
                    "Parsed prompt '{}' with placeholders {:?}",
                    key,
                    template.placeholders()
                );
            }
            entries.push((key, parsed));
        }
        Ok(entries)
    }

    pub fn get(&self, key: &str) -> Result<&Template> {
        self.templates.get(key).ok_or_else(|| Error::TemplateNotFound {
            key: key.to_string(),
        })
    }

    pub fn get_known(&self, key: PromptKey) -> Result<&Template> {
        self.get(key.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

fn check_declared(key: PromptKey, template: &Template) -> std::result::Result<(), String> {
    let declared: BTreeSet<&str> = key.placeholders().iter().copied().collect();
    let found: BTreeSet<&str> = template.placeholders().iter().map(String::as_str).collect();

    let unexpected: Vec<&str> = found.difference(&declared).copied().collect();
    if !unexpected.is_empty() {
        return Err(format!(
            "prompt '{key}' uses undeclared placeholders {unexpected:?} (allowed: {:?})",
            key.placeholders()
        ));
    }
    // An empty template is reported by the diagnostic, not here.
    let missing: Vec<&str> = declared.difference(&found).copied().collect();
    if !missing.is_empty() && !template.is_empty() {
        return Err(format!(
            "prompt '{key}' is missing placeholders {missing:?}"
        ));
    }
    Ok(())
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
