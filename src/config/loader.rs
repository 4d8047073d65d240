//! Load config from a directory of JSON files and resolve it into model metadata.

use crate::config::resolved::ResolvedConfig;
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::model::{FieldKind, FieldMeta, FieldValue, ModelMeta};
use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Build model metadata from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedConfig, ConfigError> {
    validate(config)?;
    let mut models = BTreeMap::new();
    for m in &config.models {
        let mut meta = ModelMeta::new(&m.app_label, &m.name).with_ordering(&m.ordering);
        for f in &m.fields {
            meta = meta.with_field(field_meta(m, f)?);
        }
        models.insert(meta.label(), meta);
    }
    Ok(ResolvedConfig::new(models, config.resources.clone()))
}

fn field_meta(model: &ModelConfig, f: &FieldConfig) -> Result<FieldMeta, ConfigError> {
    let related = || normalize_label(&model.app_label, f.to.as_deref().unwrap_or_default());
    let kind = match f.type_ {
        FieldType::Char => FieldKind::Char {
            max_length: f.max_length,
        },
        FieldType::Text => FieldKind::Text,
        FieldType::Integer => FieldKind::Integer {
            min: f.min_value,
            max: f.max_value,
        },
        FieldType::PositiveSmallInteger => FieldKind::Integer {
            min: Some(f.min_value.unwrap_or(0).max(0)),
            max: Some(f.max_value.unwrap_or(32767).min(32767)),
        },
        FieldType::Decimal => FieldKind::Decimal {
            max_digits: f.max_digits.unwrap_or_default(),
            decimal_places: f.decimal_places.unwrap_or_default(),
        },
        FieldType::Boolean => FieldKind::Boolean,
        FieldType::DateTime => FieldKind::DateTime,
        FieldType::ForeignKey => FieldKind::ForeignKey { to: related() },
        FieldType::ManyToMany => FieldKind::ManyToMany { to: related() },
    };

    let mut meta = FieldMeta::new(&f.name, kind);
    meta.null = f.null;
    meta.blank = f.blank.unwrap_or(f.type_ == FieldType::Boolean);
    meta.editable = f.editable;
    meta.unique = f.unique;
    if f.auto_now_add {
        meta = meta.auto_now_add();
    }
    if let Some(pattern) = &f.pattern {
        let re = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            field: format!("{}.{}", model.label(), f.name),
            message: e.to_string(),
        })?;
        meta = meta.pattern(re);
    }
    if let Some(default) = &f.default {
        let value = default_value(&meta.kind, default).ok_or_else(|| {
            ConfigError::Validation(format!("invalid default for {}.{}", model.label(), f.name))
        })?;
        meta = meta.default_value(value);
    }
    Ok(meta)
}

fn default_value(kind: &FieldKind, v: &Value) -> Option<FieldValue> {
    match (kind, v) {
        (_, Value::Null) => Some(FieldValue::Null),
        (FieldKind::Boolean, Value::Bool(b)) => Some(FieldValue::Bool(*b)),
        (FieldKind::Integer { .. } | FieldKind::ForeignKey { .. }, Value::Number(n)) => {
            n.as_i64().map(FieldValue::Int)
        }
        (FieldKind::Decimal { .. }, Value::Number(n)) => Decimal::from_str(&n.to_string()).ok().map(FieldValue::Decimal),
        (FieldKind::Decimal { .. }, Value::String(s)) => Decimal::from_str(s).ok().map(FieldValue::Decimal),
        (FieldKind::Char { .. } | FieldKind::Text, Value::String(s)) => Some(FieldValue::Text(s.clone())),
        (FieldKind::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| FieldValue::DateTime(t.with_timezone(&Utc))),
        (FieldKind::ManyToMany { .. }, Value::Array(items)) => items
            .iter()
            .map(Value::as_i64)
            .collect::<Option<Vec<_>>>()
            .map(FieldValue::Ids),
        _ => None,
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Read `models.json` (required) and `resources.json` (optional) from `dir`.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let models = read_json(&dir.join("models.json")).await?;
    let resources_path = dir.join("resources.json");
    let resources = if tokio::fs::metadata(&resources_path).await.is_ok() {
        read_json(&resources_path).await?
    } else {
        tracing::debug!(path = %resources_path.display(), "no resources file");
        Vec::new()
    };
    Ok(FullConfig { models, resources })
}
