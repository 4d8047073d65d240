//! Model-form validation: payload JSON to typed, checked field values.
//!
//! A [`ModelForm`] is built per request from the model and the writable field list. Fields outside
//! that list are never read from the payload.

use crate::error::StoreError;
use crate::model::{FieldKind, FieldMeta, FieldValue, ModelMeta, Record};
use crate::store::{Queryset, RecordStore};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";
/// Key for errors raised by [`FormValidator::clean`] that belong to no single field.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Field name to cleaned value.
pub type CleanedData = BTreeMap<String, FieldValue>;

pub type ValidationResult = Result<CleanedData, ValidationErrors>;

/// Field name to its messages, in the order they were raised.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single message on a single field.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Number of fields with at least one message.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(field, messages)| {
                    let list = messages.iter().cloned().map(Value::String).collect();
                    (field.clone(), Value::Array(list))
                })
                .collect(),
        )
    }
}

/// Custom validation attached to a resource, run after the built-in field checks.
pub trait FormValidator: Send + Sync {
    /// Called for each field that passed its built-in checks. Return the (possibly rewritten) value
    /// or the message to attach to the field.
    fn clean_field(&self, _field: &str, value: FieldValue) -> Result<FieldValue, String> {
        Ok(value)
    }

    /// Whole-form check over the fields that are valid so far.
    fn clean(&self, _data: &mut CleanedData) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

pub struct ModelForm<'a> {
    model: &'a Arc<ModelMeta>,
    fields: Vec<&'a FieldMeta>,
    validator: Option<&'a dyn FormValidator>,
}

impl<'a> ModelForm<'a> {
    /// Form over the editable model fields named in `allowed`, in that order. Unknown or
    /// non-editable names are dropped.
    pub fn new(model: &'a Arc<ModelMeta>, allowed: &[String]) -> Self {
        let fields = allowed
            .iter()
            .filter_map(|name| model.field(name))
            .filter(|f| f.editable)
            .collect();
        ModelForm {
            model,
            fields,
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Option<&'a dyn FormValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Validate `data` against the form. A writable field missing from `data` is treated as
    /// submitted empty. `instance` is the record being updated, excluded from uniqueness checks.
    ///
    /// The outer `Result` carries store failures; the inner one is the validation outcome.
    pub async fn validate(
        &self,
        store: &dyn RecordStore,
        data: &Map<String, Value>,
        instance: Option<&Record>,
    ) -> Result<ValidationResult, StoreError> {
        let mut cleaned = CleanedData::new();
        let mut errors = ValidationErrors::new();

        for field in &self.fields {
            let raw = data.get(&field.name).unwrap_or(&Value::Null);
            let value = match clean_value(field, raw) {
                Ok(v) => v,
                Err(message) => {
                    errors.add(&field.name, message);
                    continue;
                }
            };
            if let Err(message) = check_related(store, field, &value).await? {
                errors.add(&field.name, message);
                continue;
            }
            let value = match self.validator {
                Some(v) => match v.clean_field(&field.name, value) {
                    Ok(v) => v,
                    Err(message) => {
                        errors.add(&field.name, message);
                        continue;
                    }
                },
                None => value,
            };
            cleaned.insert(field.name.clone(), value);
        }

        if let Some(validator) = self.validator {
            if let Err(e) = validator.clean(&mut cleaned) {
                for field in e.0.keys() {
                    cleaned.remove(field);
                }
                errors.merge(e);
            }
        }

        for field in self.fields.iter().filter(|f| f.unique) {
            let Some(value) = cleaned.get(&field.name).filter(|v| !v.is_null()) else { continue };
            let mut qs = Queryset::all(self.model.clone()).filter(field.name.clone(), value.clone());
            if let Some(instance) = instance {
                qs = qs.exclude("id", instance.id);
            }
            if store.count(&qs).await? > 0 {
                errors.add(
                    &field.name,
                    format!(
                        "{} with this {} already exists.",
                        verbose_name(&self.model.object_name),
                        capfirst(&field.name.replace('_', " "))
                    ),
                );
            }
        }

        if errors.is_empty() {
            Ok(Ok(cleaned))
        } else {
            Ok(Err(errors))
        }
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn capfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `ProductLine` -> `Product line`.
fn verbose_name(object_name: &str) -> String {
    let mut out = String::new();
    for (i, c) in object_name.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push(' ');
        }
        out.extend(c.to_lowercase());
    }
    capfirst(&out)
}

fn plural(n: u32, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}

/// Type conversion and the per-kind checks that need no store access.
fn clean_value(field: &FieldMeta, raw: &Value) -> Result<FieldValue, String> {
    if matches!(field.kind, FieldKind::Boolean) {
        let b = to_bool(raw);
        if !b && !field.blank {
            return Err(REQUIRED.into());
        }
        return Ok(FieldValue::Bool(b));
    }
    if is_empty(raw) {
        if !field.blank {
            return Err(REQUIRED.into());
        }
        return Ok(match field.kind {
            FieldKind::ManyToMany { .. } => FieldValue::Ids(Vec::new()),
            FieldKind::Char { .. } | FieldKind::Text if !field.null => FieldValue::Text(String::new()),
            _ => FieldValue::Null,
        });
    }
    match &field.kind {
        FieldKind::Char { max_length } => clean_text(field, raw, *max_length),
        FieldKind::Text => clean_text(field, raw, None),
        FieldKind::Integer { min, max } => clean_integer(raw, *min, *max),
        FieldKind::Decimal {
            max_digits,
            decimal_places,
        } => clean_decimal(raw, *max_digits, *decimal_places),
        FieldKind::DateTime => clean_datetime(raw),
        FieldKind::ForeignKey { .. } => to_id(raw).map(FieldValue::Int).ok_or_else(|| INVALID_CHOICE.to_string()),
        FieldKind::ManyToMany { .. } => clean_id_list(raw),
        FieldKind::Boolean => Ok(FieldValue::Bool(to_bool(raw))),
    }
}

fn to_bool(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            !(s.is_empty() || s == "false" || s == "0")
        }
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn clean_text(field: &FieldMeta, raw: &Value, max_length: Option<usize>) -> Result<FieldValue, String> {
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        _ => return Err("Enter a valid value.".into()),
    };
    let len = text.chars().count();
    if let Some(max) = max_length {
        if len > max {
            return Err(format!(
                "Ensure this value has at most {} characters (it has {}).",
                max, len
            ));
        }
    }
    if let Some(pattern) = &field.pattern {
        if !pattern.is_match(&text) {
            return Err("Enter a valid value.".into());
        }
    }
    Ok(FieldValue::Text(text))
}

fn clean_integer(raw: &Value, min: Option<i64>, max: Option<i64>) -> Result<FieldValue, String> {
    let n = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.2e18).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            let s = match s.split_once('.') {
                Some((whole, frac)) if frac.chars().all(|c| c == '0') => whole,
                _ => s,
            };
            s.parse::<i64>().ok()
        }
        _ => None,
    };
    let n = n.ok_or_else(|| "Enter a whole number.".to_string())?;
    if let Some(min) = min.filter(|m| n < *m) {
        return Err(format!("Ensure this value is greater than or equal to {}.", min));
    }
    if let Some(max) = max.filter(|m| n > *m) {
        return Err(format!("Ensure this value is less than or equal to {}.", max));
    }
    Ok(FieldValue::Int(n))
}

fn clean_decimal(raw: &Value, max_digits: u32, decimal_places: u32) -> Result<FieldValue, String> {
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err("Enter a number.".into()),
    };
    let mut d = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| "Enter a number.".to_string())?;

    let scale = d.scale();
    let significant = d.mantissa().unsigned_abs().to_string().len() as u32;
    let (digits, decimals) = if scale > significant {
        (scale, scale)
    } else {
        (significant, scale)
    };
    if digits > max_digits {
        return Err(format!(
            "Ensure that there are no more than {} in total.",
            plural(max_digits, "digit", "digits")
        ));
    }
    if decimals > decimal_places {
        return Err(format!(
            "Ensure that there are no more than {}.",
            plural(decimal_places, "decimal place", "decimal places")
        ));
    }
    let whole_limit = max_digits.saturating_sub(decimal_places);
    if digits - decimals > whole_limit {
        return Err(format!(
            "Ensure that there are no more than {} before the decimal point.",
            plural(whole_limit, "digit", "digits")
        ));
    }
    d.rescale(decimal_places);
    Ok(FieldValue::Decimal(d))
}

fn clean_datetime(raw: &Value) -> Result<FieldValue, String> {
    const INVALID: &str = "Enter a valid date/time.";
    let Value::String(s) = raw else { return Err(INVALID.into()) };
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(FieldValue::DateTime(t.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(FieldValue::DateTime(t.and_utc()));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| FieldValue::DateTime(t.and_utc()))
        .ok_or_else(|| INVALID.into())
}

fn to_id(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clean_id_list(raw: &Value) -> Result<FieldValue, String> {
    let Value::Array(items) = raw else {
        return Err("Enter a list of values.".into());
    };
    let mut ids: Vec<i64> = Vec::with_capacity(items.len());
    for item in items {
        let id = to_id(item).ok_or_else(|| {
            format!("Select a valid choice. {} is not one of the available choices.", display(item))
        })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(FieldValue::Ids(ids))
}

/// Related records must exist. Inner `Err` is a field message, outer is a store failure.
async fn check_related(
    store: &dyn RecordStore,
    field: &FieldMeta,
    value: &FieldValue,
) -> Result<Result<(), String>, StoreError> {
    match (&field.kind, value) {
        (FieldKind::ForeignKey { to }, FieldValue::Int(id)) => {
            let found = store.existing_ids(to, &[*id]).await?;
            Ok(if found.contains(id) { Ok(()) } else { Err(INVALID_CHOICE.into()) })
        }
        (FieldKind::ManyToMany { to }, FieldValue::Ids(ids)) if !ids.is_empty() => {
            let found = store.existing_ids(to, ids).await?;
            Ok(match ids.iter().find(|id| !found.contains(id)) {
                Some(missing) => Err(format!(
                    "Select a valid choice. {} is not one of the available choices.",
                    missing
                )),
                None => Ok(()),
            })
        }
        _ => Ok(Ok(())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValues;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn brand() -> Arc<ModelMeta> {
        Arc::new(ModelMeta::new("shop", "Brand").with_field(FieldMeta::char("name", 255).unique()))
    }

    fn product() -> Arc<ModelMeta> {
        Arc::new(
            ModelMeta::new("shop", "Product")
                .with_field(FieldMeta::char("name", 255))
                .with_field(FieldMeta::foreign_key("brand", "shop.brand").nullable().blank())
                .with_field(FieldMeta::many_to_many("tags", "shop.brand").blank())
                .with_field(FieldMeta::decimal("price", 8, 2))
                .with_field(FieldMeta::positive_small_integer("order").default_value(0))
                .with_field(FieldMeta::boolean("is_hidden"))
                .with_field(FieldMeta::datetime("created").auto_now_add()),
        )
    }

    fn writable() -> Vec<String> {
        ["name", "brand", "tags", "price", "order", "created"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn object(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let mut values = FieldValues::new();
        values.insert("name".into(), "Acme".into());
        store.insert(&brand(), values).await.unwrap();
        store
    }

    #[tokio::test]
    async fn empty_required_fields_report_each_error() {
        let store = seeded().await;
        let model = product();
        let form = ModelForm::new(&model, &writable());
        let data = object(json!({"name": "", "brand": "", "tags": [], "price": null, "order": ""}));
        let errors = form.validate(&store, &data, None).await.unwrap().unwrap_err();
        assert_eq!(errors.len(), 3);
        for field in ["name", "price", "order"] {
            assert_eq!(errors.get(field), Some(&[REQUIRED.to_string()][..]));
        }
    }

    #[tokio::test]
    async fn cleans_typed_values_and_ignores_non_editable() {
        let store = seeded().await;
        let model = product();
        let form = ModelForm::new(&model, &writable());
        assert_eq!(form.field_names(), vec!["name", "brand", "tags", "price", "order"]);
        let data = object(json!({
            "name": "  Lamp ",
            "brand": "1",
            "tags": [1, "1"],
            "price": 3.5,
            "order": "2",
            "created": "2020-01-01T00:00:00Z"
        }));
        let cleaned = form.validate(&store, &data, None).await.unwrap().unwrap();
        assert_eq!(cleaned["name"], FieldValue::from("Lamp"));
        assert_eq!(cleaned["brand"], FieldValue::Int(1));
        assert_eq!(cleaned["tags"], FieldValue::Ids(vec![1]));
        assert_eq!(cleaned["price"], FieldValue::Decimal(Decimal::new(350, 2)));
        assert_eq!(cleaned["order"], FieldValue::Int(2));
        assert!(!cleaned.contains_key("created"));
    }

    #[tokio::test]
    async fn relations_must_exist() {
        let store = seeded().await;
        let model = product();
        let form = ModelForm::new(&model, &writable());
        let data = object(json!({"name": "x", "brand": 9, "tags": [1, 7], "price": "1", "order": 0}));
        let errors = form.validate(&store, &data, None).await.unwrap().unwrap_err();
        assert_eq!(errors.get("brand"), Some(&[INVALID_CHOICE.to_string()][..]));
        assert_eq!(
            errors.get("tags"),
            Some(&["Select a valid choice. 7 is not one of the available choices.".to_string()][..])
        );
    }

    #[tokio::test]
    async fn numeric_bounds_and_digits() {
        let store = MemoryStore::new();
        let model = product();
        let form = ModelForm::new(&model, &writable());
        let data = object(json!({"name": "x", "price": "1234567.5", "order": -1}));
        let errors = form.validate(&store, &data, None).await.unwrap().unwrap_err();
        assert_eq!(
            errors.get("price"),
            Some(&["Ensure that there are no more than 6 digits before the decimal point.".to_string()][..])
        );
        assert_eq!(
            errors.get("order"),
            Some(&["Ensure this value is greater than or equal to 0.".to_string()][..])
        );

        let data = object(json!({"name": "x", "price": "1.005", "order": "abc"}));
        let errors = form.validate(&store, &data, None).await.unwrap().unwrap_err();
        assert_eq!(
            errors.get("price"),
            Some(&["Ensure that there are no more than 2 decimal places.".to_string()][..])
        );
        assert_eq!(errors.get("order"), Some(&["Enter a whole number.".to_string()][..]));
    }

    #[tokio::test]
    async fn unique_excludes_the_instance_being_updated() {
        let store = seeded().await;
        let model = brand();
        let fields = vec!["name".to_string()];
        let form = ModelForm::new(&model, &fields);
        let data = object(json!({"name": "Acme"}));

        let errors = form.validate(&store, &data, None).await.unwrap().unwrap_err();
        assert_eq!(
            errors.get("name"),
            Some(&["Brand with this Name already exists.".to_string()][..])
        );

        let existing = store.get(&Queryset::all(model.clone()), 1).await.unwrap().unwrap();
        assert!(form.validate(&store, &data, Some(&existing)).await.unwrap().is_ok());
    }

    struct Capitalised;

    impl FormValidator for Capitalised {
        fn clean_field(&self, field: &str, value: FieldValue) -> Result<FieldValue, String> {
            match (field, value.as_str()) {
                ("name", Some(s)) if !s.starts_with(char::is_uppercase) => {
                    Err("Brand name must start with a capital letter.".into())
                }
                _ => Ok(value),
            }
        }

        fn clean(&self, data: &mut CleanedData) -> Result<(), ValidationErrors> {
            if data.get("name") == Some(&FieldValue::from("Forbidden")) {
                return Err(ValidationErrors::field(NON_FIELD_ERRORS, "Reserved name."));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn custom_validator_hooks_run_after_field_checks() {
        let store = MemoryStore::new();
        let model = brand();
        let fields = vec!["name".to_string()];
        let form = ModelForm::new(&model, &fields).with_validator(Some(&Capitalised));

        let data = object(json!({"name": "acme"}));
        let errors = form.validate(&store, &data, None).await.unwrap().unwrap_err();
        assert_eq!(
            errors.to_json(),
            json!({"name": ["Brand name must start with a capital letter."]})
        );

        let data = object(json!({"name": "Forbidden"}));
        let errors = form.validate(&store, &data, None).await.unwrap().unwrap_err();
        assert_eq!(errors.get(NON_FIELD_ERRORS), Some(&["Reserved name.".to_string()][..]));

        let data = object(json!({"name": "Acme"}));
        assert!(form.validate(&store, &data, None).await.unwrap().is_ok());
    }

    #[test]
    fn booleans_coerce_like_form_checkboxes() {
        let field = FieldMeta::boolean("flag");
        assert_eq!(clean_value(&field, &json!("false")), Ok(FieldValue::Bool(false)));
        assert_eq!(clean_value(&field, &json!("yes")), Ok(FieldValue::Bool(true)));
        assert_eq!(clean_value(&field, &Value::Null), Ok(FieldValue::Bool(false)));
        let mut required = FieldMeta::boolean("agree");
        required.blank = false;
        assert_eq!(clean_value(&required, &json!(false)), Err(REQUIRED.to_string()));
    }

    #[test]
    fn text_length_and_pattern() {
        let field = FieldMeta::char("code", 3).pattern(regex::Regex::new("^[A-Z]+$").unwrap());
        assert_eq!(
            clean_value(&field, &json!("ABCD")),
            Err("Ensure this value has at most 3 characters (it has 4).".to_string())
        );
        assert_eq!(clean_value(&field, &json!("ab")), Err("Enter a valid value.".to_string()));
        assert_eq!(clean_value(&field, &json!("AB")), Ok(FieldValue::from("AB")));
    }
}
