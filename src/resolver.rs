//! Display-field resolution: one record plus a field list becomes a JSON object.

use crate::error::ConfigurationFault;
use crate::model::{FieldKind, FieldValue, Record, RecordFn};
use crate::resource::{FieldSpec, ResourceDescriptor};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key-sorted serialized record. Always carries `id`.
pub type SerializedRecord = BTreeMap<String, Value>;

/// Where a display field's value comes from, in lookup priority order.
pub enum FieldSource<'a> {
    Callable(&'a RecordFn),
    DescriptorMethod(&'a RecordFn),
    PrimaryKey,
    /// Foreign key: the related id or null.
    Relation,
    /// Many-to-many: related ids in relation order.
    RelationSet,
    Property(&'a RecordFn),
    Column,
}

pub fn resolve_source<'a>(
    resource: &'a ResourceDescriptor,
    spec: &'a FieldSpec,
) -> Result<FieldSource<'a>, ConfigurationFault> {
    let name = match spec {
        FieldSpec::Callable { func, .. } => return Ok(FieldSource::Callable(func)),
        FieldSpec::Named(name) => name.as_str(),
    };
    if let Some(method) = resource.descriptor_method(name) {
        return Ok(FieldSource::DescriptorMethod(method));
    }
    if name == "id" {
        return Ok(FieldSource::PrimaryKey);
    }
    let model = resource.model();
    if let Some(field) = model.field(name) {
        return Ok(match field.kind {
            FieldKind::ForeignKey { .. } => FieldSource::Relation,
            FieldKind::ManyToMany { .. } => FieldSource::RelationSet,
            _ => FieldSource::Column,
        });
    }
    if let Some(property) = model.property(name) {
        return Ok(FieldSource::Property(property));
    }
    Err(ConfigurationFault::InvalidField {
        resource: resource.name(),
        field: name.to_string(),
    })
}

/// Serialize one record with the given fields. Plain columns are resolved in one batch.
pub fn serialize_record(
    resource: &ResourceDescriptor,
    record: &Record,
    fields: &[FieldSpec],
) -> Result<SerializedRecord, ConfigurationFault> {
    let mut out = SerializedRecord::new();
    let mut columns: Vec<&str> = Vec::new();
    for spec in fields {
        let name = spec.name();
        let value = match resolve_source(resource, spec)? {
            FieldSource::Callable(func) | FieldSource::DescriptorMethod(func) | FieldSource::Property(func) => {
                func(record)
            }
            FieldSource::PrimaryKey => Value::from(record.id),
            FieldSource::Relation => record
                .get(name)
                .and_then(FieldValue::as_id)
                .map(Value::from)
                .unwrap_or(Value::Null),
            FieldSource::RelationSet => match record.get(name) {
                Some(FieldValue::Ids(ids)) => Value::from(ids.clone()),
                _ => Value::Array(Vec::new()),
            },
            FieldSource::Column => {
                columns.push(name);
                continue;
            }
        };
        out.entry(name.to_string()).or_insert(value);
    }
    for (name, value) in resource.model().column_values(record, &columns) {
        out.entry(name).or_insert(value);
    }
    Ok(out)
}

pub fn serialize_records(
    resource: &ResourceDescriptor,
    records: &[Record],
    fields: &[FieldSpec],
) -> Result<Vec<SerializedRecord>, ConfigurationFault> {
    records
        .iter()
        .map(|record| serialize_record(resource, record, fields))
        .collect()
}
