//! Model metadata and records: what a store holds and how stored values become JSON.

use crate::store::OrderBy;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A value computed from a record: a model property or a descriptor-level method.
pub type RecordFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// Field name to stored value, for one record.
pub type FieldValues = BTreeMap<String, FieldValue>;

/// A stored value. Foreign keys are `Int` (or `Null`), many-to-many sets are `Ids`.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    DateTime(DateTime<Utc>),
    /// Related primary ids in relation order.
    Ids(Vec<i64>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_id(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON form: decimals as strings, datetimes as ISO-8601 with millisecond precision.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(n) => Value::from(*n),
            FieldValue::Decimal(d) => Value::String(d.to_string()),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::DateTime(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            FieldValue::Ids(ids) => Value::Array(ids.iter().map(|id| Value::from(*id)).collect()),
        }
    }

    /// Total order used for in-memory sorting and equality filters. Nulls sort last, as in PostgreSQL.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        use FieldValue as V;
        match (self, other) {
            (V::Null, V::Null) => Ordering::Equal,
            (V::Null, _) => Ordering::Greater,
            (_, V::Null) => Ordering::Less,
            (V::Bool(a), V::Bool(b)) => a.cmp(b),
            (V::Int(a), V::Int(b)) => a.cmp(b),
            (V::Decimal(a), V::Decimal(b)) => a.cmp(b),
            (V::Int(a), V::Decimal(b)) => Decimal::from(*a).cmp(b),
            (V::Decimal(a), V::Int(b)) => a.cmp(&Decimal::from(*b)),
            (V::Text(a), V::Text(b)) => a.cmp(b),
            (V::DateTime(a), V::DateTime(b)) => a.cmp(b),
            (V::Ids(a), V::Ids(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => 0,
            FieldValue::Int(_) | FieldValue::Decimal(_) => 1,
            FieldValue::Text(_) => 2,
            FieldValue::DateTime(_) => 3,
            FieldValue::Ids(_) => 4,
            FieldValue::Null => 5,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<Decimal> for FieldValue {
    fn from(d: Decimal) -> Self {
        FieldValue::Decimal(d)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        FieldValue::DateTime(t)
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(ids: Vec<i64>) -> Self {
        FieldValue::Ids(ids)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Char { max_length: Option<usize> },
    Text,
    Integer { min: Option<i64>, max: Option<i64> },
    Decimal { max_digits: u32, decimal_places: u32 },
    Boolean,
    DateTime,
    /// Single related record; `to` is the related model label (`app.model`).
    ForeignKey { to: String },
    ManyToMany { to: String },
}

impl FieldKind {
    pub fn related_model(&self) -> Option<&str> {
        match self {
            FieldKind::ForeignKey { to } | FieldKind::ManyToMany { to } => Some(to),
            _ => None,
        }
    }

    pub fn is_many_to_many(&self) -> bool {
        matches!(self, FieldKind::ManyToMany { .. })
    }
}

#[derive(Clone, Debug)]
pub struct FieldMeta {
    pub name: String,
    pub kind: FieldKind,
    pub null: bool,
    /// May be submitted empty. Booleans and many-to-many sets default to blank.
    pub blank: bool,
    pub editable: bool,
    pub unique: bool,
    pub default: Option<FieldValue>,
    pub auto_now_add: bool,
    pub pattern: Option<Regex>,
}

impl FieldMeta {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        let blank = matches!(kind, FieldKind::Boolean);
        FieldMeta {
            name: name.into(),
            kind,
            null: false,
            blank,
            editable: true,
            unique: false,
            default: None,
            auto_now_add: false,
            pattern: None,
        }
    }

    pub fn char(name: impl Into<String>, max_length: usize) -> Self {
        Self::new(name, FieldKind::Char { max_length: Some(max_length) })
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer { min: None, max: None })
    }

    pub fn positive_small_integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer { min: Some(0), max: Some(32767) })
    }

    pub fn decimal(name: impl Into<String>, max_digits: u32, decimal_places: u32) -> Self {
        Self::new(name, FieldKind::Decimal { max_digits, decimal_places })
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn foreign_key(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ForeignKey { to: to.into() })
    }

    pub fn many_to_many(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(name, FieldKind::ManyToMany { to: to.into() })
    }

    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    pub fn blank(mut self) -> Self {
        self.blank = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set once on insert, never accepted from payloads.
    pub fn auto_now_add(mut self) -> Self {
        self.auto_now_add = true;
        self.editable = false;
        self.blank = true;
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Value a field takes on insert when the caller supplied none.
    fn insert_default(&self) -> FieldValue {
        if let Some(default) = &self.default {
            return default.clone();
        }
        if self.auto_now_add {
            return FieldValue::DateTime(Utc::now());
        }
        match self.kind {
            FieldKind::ManyToMany { .. } => FieldValue::Ids(Vec::new()),
            FieldKind::Boolean => FieldValue::Bool(false),
            _ => FieldValue::Null,
        }
    }

    /// Store-native coercion of one column to JSON.
    pub fn column_json(&self, value: &FieldValue) -> Value {
        match (&self.kind, value) {
            (FieldKind::Decimal { decimal_places, .. }, FieldValue::Decimal(d)) => {
                let mut d = *d;
                d.rescale(*decimal_places);
                Value::String(d.to_string())
            }
            _ => value.to_json(),
        }
    }
}

/// Metadata for one record type.
#[derive(Clone)]
pub struct ModelMeta {
    pub app_label: String,
    pub object_name: String,
    /// Lowercase object name; used in permission strings, tables and default slugs.
    pub model_name: String,
    pub fields: Vec<FieldMeta>,
    /// Default ordering when a descriptor declares none.
    pub ordering: Vec<OrderBy>,
    properties: BTreeMap<String, RecordFn>,
}

impl fmt::Debug for ModelMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMeta")
            .field("label", &self.label())
            .field("fields", &self.fields)
            .field("ordering", &self.ordering)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ModelMeta {
    pub fn new(app_label: impl Into<String>, object_name: impl Into<String>) -> Self {
        let object_name = object_name.into();
        ModelMeta {
            app_label: app_label.into(),
            model_name: object_name.to_lowercase(),
            object_name,
            fields: Vec::new(),
            ordering: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: FieldMeta) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_ordering<I, S>(mut self, ordering: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ordering = ordering.into_iter().map(|s| OrderBy::parse(s.as_ref())).collect();
        self
    }

    /// Computed attribute of the record, resolved like a field when displayed.
    pub fn with_property<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.add_property(name, f);
        self
    }

    pub fn add_property<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.properties.insert(name.into(), Arc::new(f));
    }

    /// `app_label.model_name`, the key relations and stores use.
    pub fn label(&self) -> String {
        format!("{}.{}", self.app_label, self.model_name)
    }

    pub fn db_table(&self) -> String {
        format!("{}_{}", self.app_label, self.model_name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        name == "id" || self.field(name).is_some()
    }

    pub fn property(&self, name: &str) -> Option<&RecordFn> {
        self.properties.get(name)
    }

    /// Fill every field the caller left out with its insert default.
    pub fn with_defaults(&self, mut values: FieldValues) -> FieldValues {
        for field in &self.fields {
            if !values.contains_key(&field.name) {
                values.insert(field.name.clone(), field.insert_default());
            }
        }
        values
    }

    /// Batch column resolution for one record.
    pub fn column_values(&self, record: &Record, names: &[&str]) -> BTreeMap<String, Value> {
        names
            .iter()
            .map(|name| {
                let value = if *name == "id" {
                    Value::from(record.id)
                } else {
                    match (self.field(name), record.get(name)) {
                        (Some(field), Some(v)) => field.column_json(v),
                        _ => Value::Null,
                    }
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

pub fn table_for_label(label: &str) -> String {
    label.replace('.', "_")
}

#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub id: i64,
    pub values: FieldValues,
}

impl Record {
    pub fn new(id: i64, values: FieldValues) -> Self {
        Record { id, values }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Value used for filtering and ordering; `id` maps to the primary key.
    pub fn sort_value(&self, name: &str) -> FieldValue {
        if name == "id" {
            return FieldValue::Int(self.id);
        }
        self.values.get(name).cloned().unwrap_or(FieldValue::Null)
    }
}
