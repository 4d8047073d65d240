//! Lazy queryset description: filters and ordering, executed by a [`RecordStore`](super::RecordStore).

use crate::error::StoreError;
use crate::model::{FieldValue, ModelMeta, Record};
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderBy { field: field.into(), descending: false }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderBy { field: field.into(), descending: true }
    }

    /// `"order"` ascending, `"-order"` descending.
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => OrderBy::desc(field),
            None => OrderBy::asc(spec),
        }
    }
}

/// Exact-match condition on one field (`id` included). On a many-to-many field the value is a
/// related id and the condition is set membership. `negated` turns it into an exclusion.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: FieldValue,
    pub negated: bool,
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        let hit = match (record.sort_value(&self.field), &self.value) {
            (FieldValue::Ids(ids), FieldValue::Int(id)) => ids.contains(id),
            (value, expected) => value.sort_cmp(expected) == Ordering::Equal,
        };
        hit != self.negated
    }
}

/// Offset/limit slice of an ordered queryset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Clone, Debug)]
pub struct Queryset {
    model: Arc<ModelMeta>,
    filters: Vec<Filter>,
    ordering: Vec<OrderBy>,
}

impl Queryset {
    /// Every record of the model, in the model's default ordering.
    pub fn all(model: Arc<ModelMeta>) -> Self {
        let ordering = model.ordering.clone();
        Queryset {
            model,
            filters: Vec::new(),
            ordering,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
            negated: false,
        });
        self
    }

    pub fn exclude(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
            negated: true,
        });
        self
    }

    /// Replaces the current ordering.
    pub fn order_by<I>(mut self, ordering: I) -> Self
    where
        I: IntoIterator<Item = OrderBy>,
    {
        self.ordering = ordering.into_iter().collect();
        self
    }

    pub fn model(&self) -> &ModelMeta {
        &self.model
    }

    pub fn model_arc(&self) -> &Arc<ModelMeta> {
        &self.model
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Declared ordering with the primary id appended as tie-break, so every page is deterministic.
    pub fn ordering(&self) -> Vec<OrderBy> {
        let mut ordering = self.ordering.clone();
        if !ordering.iter().any(|o| o.field == "id") {
            ordering.push(OrderBy::asc("id"));
        }
        ordering
    }

    /// Every filter and ordering field must exist on the model. Many-to-many fields can be filtered
    /// by one related id but not ordered on. Stores call this before running the queryset.
    pub fn check(&self) -> Result<(), StoreError> {
        let invalid = |message: String| StoreError::InvalidQuery {
            model: self.model.label(),
            message,
        };
        for filter in &self.filters {
            if filter.field == "id" {
                continue;
            }
            let field = self
                .model
                .field(&filter.field)
                .ok_or_else(|| invalid(format!("unknown filter field '{}'", filter.field)))?;
            if field.kind.is_many_to_many() && !matches!(filter.value, FieldValue::Int(_)) {
                return Err(invalid(format!(
                    "many-to-many filter '{}' needs a single related id",
                    filter.field
                )));
            }
        }
        for order in &self.ordering {
            if order.field == "id" {
                continue;
            }
            match self.model.field(&order.field) {
                Some(f) if !f.kind.is_many_to_many() => {}
                Some(_) => return Err(invalid(format!("cannot order on many-to-many '{}'", order.field))),
                None => return Err(invalid(format!("unknown ordering field '{}'", order.field))),
            }
        }
        Ok(())
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for order in self.ordering() {
            let ord = a.sort_value(&order.field).sort_cmp(&b.sort_value(&order.field));
            let ord = if order.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldMeta, FieldValues};

    fn meta() -> Arc<ModelMeta> {
        Arc::new(
            ModelMeta::new("shop", "Item")
                .with_field(FieldMeta::integer("rank"))
                .with_field(FieldMeta::boolean("hidden"))
                .with_field(FieldMeta::many_to_many("tags", "shop.tag")),
        )
    }

    fn record(id: i64, rank: i64, hidden: bool) -> Record {
        let mut values = FieldValues::new();
        values.insert("rank".into(), rank.into());
        values.insert("hidden".into(), hidden.into());
        Record::new(id, values)
    }

    #[test]
    fn parses_direction_prefix() {
        assert_eq!(OrderBy::parse("-rank"), OrderBy::desc("rank"));
        assert_eq!(OrderBy::parse("rank"), OrderBy::asc("rank"));
    }

    #[test]
    fn ordering_always_ends_with_id() {
        let qs = Queryset::all(meta()).order_by([OrderBy::asc("rank")]);
        assert_eq!(qs.ordering(), vec![OrderBy::asc("rank"), OrderBy::asc("id")]);

        let qs = qs.order_by([OrderBy::desc("id")]);
        assert_eq!(qs.ordering(), vec![OrderBy::desc("id")]);
    }

    #[test]
    fn ties_break_on_id() {
        let qs = Queryset::all(meta()).order_by([OrderBy::desc("rank")]);
        let mut rows = vec![record(3, 1, false), record(1, 1, false), record(2, 5, false)];
        rows.sort_by(|a, b| qs.compare(a, b));
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn filters_and_exclusions_combine() {
        let qs = Queryset::all(meta()).exclude("hidden", true).filter("rank", 1i64);
        assert!(qs.matches(&record(1, 1, false)));
        assert!(!qs.matches(&record(2, 1, true)));
        assert!(!qs.matches(&record(3, 2, false)));
        assert!(Queryset::all(meta()).filter("id", 4i64).matches(&record(4, 0, true)));
    }

    #[test]
    fn many_to_many_filters_test_membership() {
        let mut tagged = record(1, 0, false);
        tagged.values.insert("tags".into(), FieldValue::Ids(vec![3, 5]));
        let untagged = record(2, 0, false);

        let qs = Queryset::all(meta()).filter("tags", 5i64);
        assert!(qs.check().is_ok());
        assert!(qs.matches(&tagged));
        assert!(!qs.matches(&untagged));
        assert!(Queryset::all(meta()).exclude("tags", 5i64).matches(&untagged));
    }

    #[test]
    fn unknown_or_unsupported_fields_are_rejected() {
        let typo = Queryset::all(meta()).exclude("hiden", true);
        assert!(matches!(typo.check(), Err(StoreError::InvalidQuery { .. })));

        let set = Queryset::all(meta()).filter("tags", FieldValue::Ids(vec![1]));
        assert!(set.check().is_err());

        let ordered = Queryset::all(meta()).order_by([OrderBy::asc("tags")]);
        assert!(ordered.check().is_err());
        let ordered = Queryset::all(meta()).order_by([OrderBy::desc("nope")]);
        assert!(ordered.check().is_err());

        assert!(Queryset::all(meta()).filter("id", 1i64).check().is_ok());
    }
}
