//! Config validation: referential integrity and resource consistency.

use crate::config::{normalize_label, FieldType, FullConfig};
use crate::error::ConfigError;
use crate::model::{FieldKind, ModelMeta};
use crate::resource::ResourceDescriptor;
use crate::store::OrderBy;
use regex::Regex;
use std::collections::HashSet;

/// Largest scale a stored decimal can carry.
const MAX_DECIMAL_PLACES: u32 = 28;

fn check_decimal(field: String, max_digits: u32, decimal_places: u32) -> Result<(), ConfigError> {
    let message = if max_digits == 0 {
        "max_digits must be positive".to_string()
    } else if decimal_places > MAX_DECIMAL_PLACES {
        format!("decimal_places must be at most {}", MAX_DECIMAL_PLACES)
    } else if decimal_places > max_digits {
        "decimal_places cannot exceed max_digits".to_string()
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidDecimal { field, message })
}

fn check_ordering(model: &ModelMeta, ordering: &[OrderBy]) -> Result<(), ConfigError> {
    for o in ordering {
        match model.field(&o.field) {
            Some(f) if f.kind.is_many_to_many() => {
                return Err(ConfigError::UnorderableField {
                    model: model.label(),
                    field: o.field.clone(),
                })
            }
            Some(_) => {}
            None if o.field == "id" => {}
            None => {
                return Err(ConfigError::UnknownField {
                    model: model.label(),
                    field: o.field.clone(),
                })
            }
        }
    }
    Ok(())
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut labels = HashSet::new();
    for m in &config.models {
        if !labels.insert(m.label()) {
            return Err(ConfigError::DuplicateModel(m.label()));
        }
    }

    for m in &config.models {
        let mut names = HashSet::new();
        for f in &m.fields {
            if f.name == "id" || !names.insert(f.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate field {}.{}",
                    m.label(),
                    f.name
                )));
            }
            if f.type_.is_relation() {
                let to = f.to.as_deref().ok_or_else(|| {
                    ConfigError::Validation(format!("relation {}.{} needs 'to'", m.label(), f.name))
                })?;
                let target = normalize_label(&m.app_label, to);
                if !labels.contains(&target) {
                    return Err(ConfigError::MissingReference {
                        kind: "model",
                        id: target,
                    });
                }
            }
            if f.type_ == FieldType::Decimal {
                let (Some(max_digits), Some(places)) = (f.max_digits, f.decimal_places) else {
                    return Err(ConfigError::Validation(format!(
                        "decimal {}.{} needs max_digits and decimal_places",
                        m.label(),
                        f.name
                    )));
                };
                check_decimal(format!("{}.{}", m.label(), f.name), max_digits, places)?;
            }
            if let Some(pattern) = &f.pattern {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                    field: format!("{}.{}", m.label(), f.name),
                    message: e.to_string(),
                })?;
            }
        }
        for o in &m.ordering {
            let name = o.trim_start_matches('-');
            if name != "id" && !names.contains(name) {
                return Err(ConfigError::UnknownField {
                    model: m.label(),
                    field: name.to_string(),
                });
            }
            if m.fields.iter().any(|f| f.name == name && f.type_ == FieldType::ManyToMany) {
                return Err(ConfigError::UnorderableField {
                    model: m.label(),
                    field: name.to_string(),
                });
            }
        }
    }

    let mut routes = HashSet::new();
    for r in &config.resources {
        let label = normalize_label("", &r.model);
        let model = config
            .models
            .iter()
            .find(|m| m.label() == label)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "model",
                id: r.model.clone(),
            })?;
        let slug = r.url_slug.clone().unwrap_or_else(|| model.name.to_lowercase());
        let route = format!("{}/{}", model.app_label, slug);
        if !routes.insert(route.clone()) {
            return Err(ConfigError::DuplicateRoute(route));
        }
    }

    Ok(())
}

/// Checks run on every descriptor when a site is frozen. Display fields are resolved per
/// request and are not checked here.
pub fn validate_descriptor(descriptor: &ResourceDescriptor) -> Result<(), ConfigError> {
    let model = descriptor.model();
    for field in &model.fields {
        if let FieldKind::Decimal { max_digits, decimal_places } = field.kind {
            check_decimal(format!("{}.{}", model.label(), field.name), max_digits, decimal_places)?;
        }
    }
    for name in descriptor.writable() {
        let field = model.field(name).ok_or_else(|| ConfigError::UnknownField {
            model: model.label(),
            field: name.clone(),
        })?;
        if !field.editable {
            return Err(ConfigError::NotEditable {
                model: model.label(),
                field: name.clone(),
            });
        }
    }
    check_ordering(model, &model.ordering)?;
    check_ordering(model, descriptor.declared_ordering())?;
    if descriptor.page_size() == Some(0) {
        return Err(ConfigError::InvalidPagination(descriptor.name()));
    }
    let slug = descriptor.slug();
    if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ConfigError::InvalidSlug {
            model: model.label(),
            slug: slug.to_string(),
        });
    }
    Ok(())
}
