//! Raw config types matching the JSON files (`models.json`, `resources.json`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    pub app_label: String,
    /// Object name, e.g. `Product`. The lowercase form is used in labels, tables and slugs.
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    /// Default ordering, `-` prefixed for descending.
    #[serde(default)]
    pub ordering: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Char,
    Text,
    Integer,
    PositiveSmallInteger,
    Decimal,
    Boolean,
    #[serde(rename = "datetime")]
    DateTime,
    ForeignKey,
    ManyToMany,
}

impl FieldType {
    pub fn is_relation(self) -> bool {
        matches!(self, FieldType::ForeignKey | FieldType::ManyToMany)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldType,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub max_digits: Option<u32>,
    #[serde(default)]
    pub decimal_places: Option<u32>,
    #[serde(default)]
    pub min_value: Option<i64>,
    #[serde(default)]
    pub max_value: Option<i64>,
    /// Related model for relations: `app.model`, or a bare model name in the same app.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub null: bool,
    /// Defaults to true for booleans, false otherwise.
    #[serde(default)]
    pub blank: Option<bool>,
    #[serde(default = "default_true")]
    pub editable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub auto_now_add: bool,
    /// Regex the cleaned text must match.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Model label, `app.Model` (case-insensitive).
    pub model: String,
    #[serde(default)]
    pub display_fields: Vec<String>,
    #[serde(default)]
    pub collection_display_fields: Vec<String>,
    #[serde(default)]
    pub detail_display_fields: Vec<String>,
    #[serde(default, alias = "writable_fields")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub ordering: Vec<String>,
    #[serde(default)]
    pub pagination_size: Option<u32>,
    #[serde(default)]
    pub url_slug: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// `app.Model` -> `app.model`; a bare `Model` is taken to be in `app_label`.
pub fn normalize_label(app_label: &str, reference: &str) -> String {
    match reference.split_once('.') {
        Some((app, model)) => format!("{}.{}", app, model.to_lowercase()),
        None => format!("{}.{}", app_label, reference.to_lowercase()),
    }
}

impl ModelConfig {
    pub fn label(&self) -> String {
        normalize_label(&self.app_label, &self.name)
    }
}
