//! In-process record store. Used by tests and by the demo server when no database is configured.

use super::{Queryset, RecordStore, Window};
use crate::error::StoreError;
use crate::model::{FieldKind, FieldValue, FieldValues, ModelMeta, Record};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Outgoing relation of a table, kept so deletes can follow inbound references.
struct Relation {
    field: String,
    to: String,
    many: bool,
}

struct Table {
    last_id: i64,
    rows: BTreeMap<i64, FieldValues>,
    relations: Vec<Relation>,
}

impl Table {
    fn new(model: &ModelMeta) -> Self {
        let relations = model
            .fields
            .iter()
            .filter_map(|f| match &f.kind {
                FieldKind::ForeignKey { to } => Some((f, to, false)),
                FieldKind::ManyToMany { to } => Some((f, to, true)),
                _ => None,
            })
            .map(|(f, to, many)| Relation {
                field: f.name.clone(),
                to: to.clone(),
                many,
            })
            .collect();
        Table {
            last_id: 0,
            rows: BTreeMap::new(),
            relations,
        }
    }
}

/// Tables keyed by model label. Ids are assigned sequentially per table, starting at 1.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn scoped(&self, queryset: &Queryset) -> Result<Vec<Record>, StoreError> {
        queryset.check()?;
        let tables = self.read()?;
        let Some(table) = tables.get(&queryset.model().label()) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<Record> = table
            .rows
            .iter()
            .map(|(id, values)| Record::new(*id, values.clone()))
            .filter(|r| queryset.matches(r))
            .collect();
        rows.sort_by(|a, b| queryset.compare(a, b));
        Ok(rows)
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count(&self, queryset: &Queryset) -> Result<u64, StoreError> {
        Ok(self.scoped(queryset)?.len() as u64)
    }

    async fn fetch(&self, queryset: &Queryset, window: Option<Window>) -> Result<Vec<Record>, StoreError> {
        let rows = self.scoped(queryset)?;
        Ok(match window {
            Some(w) => rows.into_iter().skip(w.offset).take(w.limit).collect(),
            None => rows,
        })
    }

    async fn existing_ids(&self, model_label: &str, ids: &[i64]) -> Result<BTreeSet<i64>, StoreError> {
        let tables = self.read()?;
        let Some(table) = tables.get(model_label) else {
            return Ok(BTreeSet::new());
        };
        Ok(ids.iter().copied().filter(|id| table.rows.contains_key(id)).collect())
    }

    async fn insert(&self, model: &ModelMeta, values: FieldValues) -> Result<Record, StoreError> {
        let values = model.with_defaults(values);
        let mut tables = self.write()?;
        let table = tables.entry(model.label()).or_insert_with(|| Table::new(model));
        table.last_id += 1;
        let id = table.last_id;
        table.rows.insert(id, values.clone());
        tracing::debug!(model = %model.label(), id, "memory insert");
        Ok(Record::new(id, values))
    }

    async fn update(&self, model: &ModelMeta, id: i64, values: FieldValues) -> Result<Record, StoreError> {
        let mut tables = self.write()?;
        let row = tables
            .get_mut(&model.label())
            .and_then(|t| t.rows.get_mut(&id))
            .ok_or_else(|| StoreError::Missing {
                model: model.label(),
                id,
            })?;
        row.extend(values);
        tracing::debug!(model = %model.label(), id, "memory update");
        Ok(Record::new(id, row.clone()))
    }

    /// Removes the row, drops it from every many-to-many set that names it and deletes the rows
    /// whose foreign key points at it, transitively.
    async fn delete(&self, model: &ModelMeta, id: i64) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let label = model.label();
        if !tables.get(&label).is_some_and(|t| t.rows.contains_key(&id)) {
            return Err(StoreError::Missing { model: label, id });
        }
        let mut pending = vec![(label, id)];
        while let Some((label, id)) = pending.pop() {
            let Some(table) = tables.get_mut(&label) else { continue };
            if table.rows.remove(&id).is_none() {
                continue;
            }
            tracing::debug!(model = %label, id, "memory delete");
            for (other, table) in tables.iter_mut() {
                let Table { rows, relations, .. } = table;
                for relation in relations.iter().filter(|r| r.to == label) {
                    for (row_id, row) in rows.iter_mut() {
                        match row.get_mut(&relation.field) {
                            Some(FieldValue::Ids(ids)) if relation.many => ids.retain(|t| *t != id),
                            Some(FieldValue::Int(fk)) if !relation.many && *fk == id => {
                                pending.push((other.clone(), *row_id));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
