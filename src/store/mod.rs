//! Data-access layer: the record store contract and its in-memory and PostgreSQL backends.

mod memory;
mod postgres;
mod query;
mod sql;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use query::{Filter, OrderBy, Queryset, Window};

use crate::error::StoreError;
use crate::model::{FieldValues, ModelMeta, Record};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Query, filter, order, window, save and delete on typed records.
///
/// Implementations must honour [`Queryset::ordering`] (which always ends with the primary id)
/// so that pagination windows are stable.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn count(&self, queryset: &Queryset) -> Result<u64, StoreError>;

    /// Records of the queryset in order, optionally sliced.
    async fn fetch(&self, queryset: &Queryset, window: Option<Window>) -> Result<Vec<Record>, StoreError>;

    /// One record by primary id, only if it is inside the queryset's scope.
    async fn get(&self, queryset: &Queryset, id: i64) -> Result<Option<Record>, StoreError> {
        let scoped = queryset.clone().filter("id", id);
        let mut rows = self.fetch(&scoped, Some(Window { offset: 0, limit: 1 })).await?;
        Ok(rows.pop())
    }

    /// Which of `ids` exist for the model with this label.
    async fn existing_ids(&self, model_label: &str, ids: &[i64]) -> Result<BTreeSet<i64>, StoreError>;

    /// Persist a new record. Fields absent from `values` take their defaults.
    async fn insert(&self, model: &ModelMeta, values: FieldValues) -> Result<Record, StoreError>;

    /// Overwrite the given fields of an existing record; other fields are left alone.
    async fn update(&self, model: &ModelMeta, id: i64, values: FieldValues) -> Result<Record, StoreError>;

    async fn delete(&self, model: &ModelMeta, id: i64) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
