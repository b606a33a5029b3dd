//! YAML front-matter parsing and property types
//!
//! A front-matter block is a `---` line at the very start of a file, YAML
//! content, and a closing `---` line. Offsets are byte offsets into the
//! file text and cover both delimiters.

use crate::host::CachedMetadata;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use vault_scripts_api::{Frontmatter, FrontmatterValue};

const DELIMITER: &str = "---";

/// Location of a front-matter block inside a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmatterBlock<'a> {
    /// YAML between the delimiters
    pub yaml: &'a str,
    /// Byte range of the whole block, delimiters included
    pub position: Range<usize>,
}

/// Find the front-matter block at the start of `text`
pub fn locate(text: &str) -> Option<FrontmatterBlock<'_>> {
    let first_line_end = text.find('\n')?;
    if text[..first_line_end].trim_end_matches('\r') != DELIMITER {
        return None;
    }

    let yaml_start = first_line_end + 1;
    let mut offset = yaml_start;
    while offset <= text.len() {
        let line_end = text[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(text.len());
        let line = text[offset..line_end].trim_end_matches('\r');

        if line == DELIMITER {
            return Some(FrontmatterBlock {
                yaml: &text[yaml_start..offset],
                position: 0..offset + DELIMITER.len(),
            });
        }

        if line_end == text.len() {
            break;
        }
        offset = line_end + 1;
    }

    None
}

/// Parse the metadata of a file's text
///
/// A block with empty YAML yields a position but no front-matter.
pub fn parse(text: &str) -> Result<CachedMetadata, String> {
    let Some(block) = locate(text) else {
        return Ok(CachedMetadata::default());
    };

    let frontmatter = if block.yaml.trim().is_empty() {
        None
    } else {
        let value: FrontmatterValue =
            serde_yaml_ng::from_str(block.yaml).map_err(|e| e.to_string())?;
        match value {
            FrontmatterValue::Object(map) => Some(map),
            FrontmatterValue::Null => None,
            _ => return Err("front-matter must be a mapping".to_string()),
        }
    };

    Ok(CachedMetadata {
        frontmatter,
        frontmatter_position: Some(block.position),
    })
}

/// Replace (or insert) the front-matter block of `text`
///
/// An empty map removes the block entirely.
pub fn render(text: &str, frontmatter: &Frontmatter) -> Result<String, String> {
    let block = if frontmatter.is_empty() {
        None
    } else {
        let yaml = serde_yaml_ng::to_string(frontmatter).map_err(|e| e.to_string())?;
        Some(format!("{}\n{}{}", DELIMITER, yaml, DELIMITER))
    };

    let rendered = match (locate(text), block) {
        (Some(existing), Some(block)) => format!("{}{}", block, &text[existing.position.end..]),
        (Some(existing), None) => {
            let rest = &text[existing.position.end..];
            rest.strip_prefix("\r\n")
                .or_else(|| rest.strip_prefix('\n'))
                .unwrap_or(rest)
                .to_string()
        }
        (None, Some(block)) => format!("{}\n{}", block, text),
        (None, None) => text.to_string(),
    };

    Ok(rendered)
}

/// Apply `update` to the front-matter of `text` and render the result
pub fn rewrite(text: &str, update: &mut dyn FnMut(&mut Frontmatter)) -> Result<String, String> {
    let mut values = parse(text)?.frontmatter.unwrap_or_default();
    update(&mut values);
    render(text, &values)
}

// ============================================================================
// Property types
// ============================================================================

/// Built-in property type widgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Text,
    Multitext,
    Number,
    Checkbox,
    Date,
    Datetime,
    Tags,
    Aliases,
}

impl PropertyType {
    pub const ALL: [PropertyType; 8] = [
        PropertyType::Text,
        PropertyType::Multitext,
        PropertyType::Number,
        PropertyType::Checkbox,
        PropertyType::Date,
        PropertyType::Datetime,
        PropertyType::Tags,
        PropertyType::Aliases,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PropertyType::Text => "text",
            PropertyType::Multitext => "multitext",
            PropertyType::Number => "number",
            PropertyType::Checkbox => "checkbox",
            PropertyType::Date => "date",
            PropertyType::Datetime => "datetime",
            PropertyType::Tags => "tags",
            PropertyType::Aliases => "aliases",
        }
    }

    /// Whether `value` is acceptable for this widget; null is always accepted
    pub fn validate(self, value: &FrontmatterValue) -> bool {
        if value.is_null() {
            return true;
        }

        match self {
            PropertyType::Text => value.is_string() || value.is_number() || value.is_boolean(),
            PropertyType::Multitext | PropertyType::Tags | PropertyType::Aliases => {
                match value {
                    FrontmatterValue::String(_) => true,
                    FrontmatterValue::Array(items) => items.iter().all(|item| item.is_string()),
                    _ => false,
                }
            }
            PropertyType::Number => match value {
                FrontmatterValue::Number(_) => true,
                FrontmatterValue::String(s) => s.trim().parse::<f64>().is_ok(),
                _ => false,
            },
            PropertyType::Checkbox => value.is_boolean(),
            PropertyType::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            PropertyType::Datetime => value.as_str().is_some_and(|s| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
                    || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").is_ok()
            }),
        }
    }
}

/// On-disk form of a property type table: `{ "types": { "<key>": "<type>" } }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TypesFile {
    #[serde(default)]
    types: HashMap<String, String>,
}

/// Property name → type name table plus the registered type widgets
#[derive(Debug, Clone)]
pub struct MetadataTypes {
    properties: HashMap<String, String>,
    widgets: HashMap<String, PropertyType>,
}

impl MetadataTypes {
    /// Create a table with every built-in widget registered and no properties
    pub fn new() -> Self {
        Self {
            properties: HashMap::new(),
            widgets: PropertyType::ALL
                .iter()
                .map(|ty| (ty.name().to_string(), *ty))
                .collect(),
        }
    }

    /// Parse a `types.json` document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: TypesFile = serde_json::from_str(json)?;
        let mut types = Self::new();
        for (key, type_name) in file.types {
            types.set_property(key, type_name);
        }
        Ok(types)
    }

    pub fn with_property(mut self, key: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.set_property(key, type_name);
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, type_name: impl Into<String>) {
        self.properties
            .insert(key.into().to_lowercase(), type_name.into());
    }

    pub fn register_widget(&mut self, type_name: impl Into<String>, widget: PropertyType) {
        self.widgets.insert(type_name.into(), widget);
    }

    /// The widget registered for a property, if both the property and its type are known
    pub fn property_type(&self, key: &str) -> Option<PropertyType> {
        let type_name = self.properties.get(&key.to_lowercase())?;
        self.widgets.get(type_name).copied()
    }

    /// `Some(valid)` when a widget is registered for `key`, `None` otherwise
    pub fn validate(&self, key: &str, value: &FrontmatterValue) -> Option<bool> {
        self.property_type(key).map(|widget| widget.validate(value))
    }
}

impl Default for MetadataTypes {
    fn default() -> Self {
        Self::new()
    }
}
