//! Validation profiles: which schema applies to which file

pub mod resolver;

pub use resolver::{resolve, MatchMethod, MatchType, Resolution, SchemaRule};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use sxd_document::dom::{ChildOfElement, ChildOfRoot, Element};
use sxd_document::parser;

use crate::error::ConfigError;

/// Profile names that ask for a listing instead of a run.
pub const LIST_KEYWORDS: &[&str] = &["l", "list"];

/// A loaded profile: ordered rules plus the source text of every schema they name.
#[derive(Debug, Clone)]
pub struct Profile {
    pub path: PathBuf,
    pub rules: Vec<SchemaRule>,
    schemas: HashMap<PathBuf, String>,
}

impl Profile {
    /// Parse a profile document and read all referenced schemas.
    ///
    /// Schema file names are relative to `schemas_dir`. Every problem here is
    /// fatal for the run.
    pub fn load(path: &Path, schemas_dir: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        let rules = parse_rules(&text, path, schemas_dir)?;

        let mut schemas = HashMap::new();
        for rule in &rules {
            if schemas.contains_key(&rule.schema_path) {
                continue;
            }
            if !rule.schema_path.is_file() {
                return Err(ConfigError::MissingFile(rule.schema_path.clone()));
            }
            let source = fs::read_to_string(&rule.schema_path)?;
            schemas.insert(rule.schema_path.clone(), source);
        }

        Ok(Profile {
            path: path.to_path_buf(),
            rules,
            schemas,
        })
    }

    /// Build a profile from rules and already loaded schema texts.
    pub fn from_parts(path: PathBuf, rules: Vec<SchemaRule>, schemas: HashMap<PathBuf, String>) -> Self {
        Profile { path, rules, schemas }
    }

    /// Source text of a schema named by one of the rules.
    pub fn schema_source(&self, schema_path: &Path) -> Option<&str> {
        self.schemas.get(schema_path).map(String::as_str)
    }

    pub fn resolve(&self, file: &Path) -> Resolution {
        resolve(&self.rules, file)
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> ConfigError {
    ConfigError::MalformedProfile {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn element_text(element: Element) -> String {
    element
        .children()
        .into_iter()
        .filter_map(|child| match child {
            ChildOfElement::Text(text) => Some(text.text().to_string()),
            _ => None,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

fn required_attribute<'d>(element: Element<'d>, name: &'static str, path: &Path) -> Result<&'d str, ConfigError> {
    element
        .attribute_value(name)
        .ok_or_else(|| malformed(path, format!("schema entry without '{}' attribute", name)))
}

/// Parse the `<schema>` entries of a profile document.
pub fn parse_rules(text: &str, path: &Path, schemas_dir: &Path) -> Result<Vec<SchemaRule>, ConfigError> {
    let package = parser::parse(text).map_err(|e| malformed(path, format!("{:?}", e)))?;
    let document = package.as_document();

    let root = document
        .root()
        .children()
        .into_iter()
        .find_map(|child| match child {
            ChildOfRoot::Element(element) => Some(element),
            _ => None,
        })
        .ok_or_else(|| malformed(path, "no root element"))?;

    let mut rules = Vec::new();
    for child in root.children() {
        let element = match child {
            ChildOfElement::Element(element) if element.name().local_part() == "schema" => element,
            _ => continue,
        };

        let attribute = |name: &'static str| required_attribute(element, name, path);

        let type_value = attribute("type")?;
        let match_type = type_value.parse::<MatchType>().map_err(|_| ConfigError::InvalidRule {
            path: path.to_path_buf(),
            attribute: "type",
            value: type_value.to_string(),
        })?;

        let match_value = attribute("match")?;
        let match_method = match_value.parse::<MatchMethod>().map_err(|_| ConfigError::InvalidRule {
            path: path.to_path_buf(),
            attribute: "match",
            value: match_value.to_string(),
        })?;

        let pattern = attribute("pattern")?.to_string();

        let schema_name = element_text(element);
        if schema_name.is_empty() {
            return Err(malformed(path, "schema entry without schema file name"));
        }

        rules.push(SchemaRule {
            match_type,
            match_method,
            pattern,
            schema_path: schemas_dir.join(schema_name),
        });
    }

    Ok(rules)
}

/// Names of the profiles available in `profiles_dir`, sorted.
pub fn list_profiles(profiles_dir: &Path) -> Result<Vec<String>, ConfigError> {
    if !profiles_dir.is_dir() {
        return Err(ConfigError::MissingDirectory(profiles_dir.to_path_buf()));
    }
    let mut names: Vec<String> = fs::read_dir(profiles_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names)
}
