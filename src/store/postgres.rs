//! PostgreSQL record store on sqlx.
//!
//! Each model lives in table `{app_label}_{model_name}` with an `id` primary key. Many-to-many fields
//! live in link tables `{table}_{field}` with columns `id`, `source_id`, `target_id`.
//! Deletes follow references between the models passed to [`PgStore::with_models`].

use super::sql::{self, QueryBuf};
use super::{Queryset, RecordStore, Window};
use crate::error::StoreError;
use crate::model::{table_for_label, FieldKind, FieldValue, FieldValues, ModelMeta, Record};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    models: Arc<BTreeMap<String, ModelMeta>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore {
            pool,
            models: Arc::default(),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Models whose foreign keys and link tables may reference deleted records.
    pub fn with_models<'a>(mut self, models: impl IntoIterator<Item = &'a ModelMeta>) -> Self {
        self.models = Arc::new(models.into_iter().map(|m| (m.label(), m.clone())).collect());
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_one(&self, model: &ModelMeta, id: i64) -> Result<Option<Record>, StoreError> {
        let sql = sql::select_by_id(model);
        tracing::debug!(sql = %sql, id, "query");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        let Some(row) = row else { return Ok(None) };
        let mut records = vec![decode_row(model, &row)?];
        self.load_links(model, &mut records).await?;
        Ok(records.pop())
    }

    /// Fill every many-to-many field of `records` with one query per field.
    async fn load_links(&self, model: &ModelMeta, records: &mut [Record]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        for field in model.fields.iter().filter(|f| f.kind.is_many_to_many()) {
            let sql = sql::select_links(model, &field.name);
            tracing::debug!(sql = %sql, "query");
            let rows = sqlx::query(&sql).bind(ids.clone()).fetch_all(&self.pool).await?;
            let mut links: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
            for row in &rows {
                let source: i64 = row.try_get(0)?;
                let target: i64 = row.try_get(1)?;
                links.entry(source).or_default().push(target);
            }
            for record in records.iter_mut() {
                let targets = links.remove(&record.id).unwrap_or_default();
                record.values.insert(field.name.clone(), FieldValue::Ids(targets));
            }
        }
        Ok(())
    }
}

fn bind_value<'q>(query: PgQuery<'q>, value: &FieldValue) -> PgQuery<'q> {
    match value {
        FieldValue::Null => query.bind(None::<String>),
        FieldValue::Bool(b) => query.bind(*b),
        FieldValue::Int(n) => query.bind(*n),
        FieldValue::Decimal(d) => query.bind(*d),
        FieldValue::Text(s) => query.bind(s.clone()),
        FieldValue::DateTime(t) => query.bind(*t),
        FieldValue::Ids(ids) => query.bind(ids.clone()),
    }
}

fn build(q: &QueryBuf) -> PgQuery<'_> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    q.params
        .iter()
        .fold(sqlx::query(&q.sql), |query, p| bind_value(query, p))
}

fn decode_row(model: &ModelMeta, row: &PgRow) -> Result<Record, StoreError> {
    let id: i64 = row.try_get("id")?;
    let mut values = FieldValues::new();
    for field in sql::columns(model) {
        let name = field.name.as_str();
        let value: FieldValue = match field.kind {
            FieldKind::Char { .. } | FieldKind::Text => row.try_get::<Option<String>, _>(name)?.into(),
            FieldKind::Integer { .. } | FieldKind::ForeignKey { .. } => {
                row.try_get::<Option<i64>, _>(name)?.into()
            }
            FieldKind::Decimal { .. } => row.try_get::<Option<Decimal>, _>(name)?.into(),
            FieldKind::Boolean => row.try_get::<Option<bool>, _>(name)?.into(),
            FieldKind::DateTime => row.try_get::<Option<DateTime<Utc>>, _>(name)?.into(),
            FieldKind::ManyToMany { .. } => continue,
        };
        values.insert(field.name.clone(), value);
    }
    Ok(Record::new(id, values))
}

/// Replace the link rows of every many-to-many field present in `values`.
async fn write_links(
    conn: &mut PgConnection,
    model: &ModelMeta,
    id: i64,
    values: &FieldValues,
) -> Result<(), StoreError> {
    for field in model.fields.iter().filter(|f| f.kind.is_many_to_many()) {
        let Some(FieldValue::Ids(targets)) = values.get(&field.name) else { continue };
        sqlx::query(&sql::delete_links(model, &field.name))
            .bind(id)
            .execute(&mut *conn)
            .await?;
        let insert = sql::insert_link(model, &field.name);
        for target in targets {
            sqlx::query(&insert).bind(id).bind(*target).execute(&mut *conn).await?;
        }
    }
    Ok(())
}

#[async_trait]
impl RecordStore for PgStore {
    async fn count(&self, queryset: &Queryset) -> Result<u64, StoreError> {
        let q = sql::count(queryset)?;
        let row = build(&q).fetch_one(&self.pool).await?;
        let n: i64 = row.try_get(0)?;
        Ok(n.max(0) as u64)
    }

    async fn fetch(&self, queryset: &Queryset, window: Option<Window>) -> Result<Vec<Record>, StoreError> {
        let q = sql::select(queryset, window)?;
        let rows = build(&q).fetch_all(&self.pool).await?;
        let model = queryset.model();
        let mut records = rows
            .iter()
            .map(|row| decode_row(model, row))
            .collect::<Result<Vec<_>, _>>()?;
        self.load_links(model, &mut records).await?;
        Ok(records)
    }

    async fn existing_ids(&self, model_label: &str, ids: &[i64]) -> Result<BTreeSet<i64>, StoreError> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let sql = sql::select_existing(&table_for_label(model_label));
        tracing::debug!(sql = %sql, ids = ?ids, "query");
        let rows = sqlx::query(&sql).bind(ids.to_vec()).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>(0).map_err(StoreError::from))
            .collect()
    }

    async fn insert(&self, model: &ModelMeta, values: FieldValues) -> Result<Record, StoreError> {
        let values = model.with_defaults(values);
        let q = sql::insert(model, &values);
        let mut tx = self.pool.begin().await?;
        let row = build(&q).fetch_one(&mut *tx).await?;
        let id: i64 = row.try_get(0)?;
        write_links(&mut *tx, model, id, &values).await?;
        tx.commit().await?;
        tracing::debug!(model = %model.label(), id, "inserted");
        Ok(Record::new(id, values))
    }

    async fn update(&self, model: &ModelMeta, id: i64, values: FieldValues) -> Result<Record, StoreError> {
        let missing = || StoreError::Missing {
            model: model.label(),
            id,
        };
        let mut tx = self.pool.begin().await?;
        match sql::update(model, id, &values) {
            Some(q) => {
                let done = build(&q).execute(&mut *tx).await?;
                if done.rows_affected() == 0 {
                    return Err(missing());
                }
            }
            None => {
                let exists = sqlx::query(&sql::select_by_id(model))
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
                if exists.is_none() {
                    return Err(missing());
                }
            }
        }
        write_links(&mut *tx, model, id, &values).await?;
        tx.commit().await?;
        self.load_one(model, id).await?.ok_or_else(missing)
    }

    /// Deletes the record together with every record whose foreign key reaches it, children first.
    /// Link rows on both sides of each deleted record go too.
    async fn delete(&self, model: &ModelMeta, id: i64) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let exists = sqlx::query(&sql::select_by_id(model))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::Missing {
                model: model.label(),
                id,
            });
        }

        let mut seen: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
        seen.entry(model.label()).or_default().insert(id);
        let mut doomed: Vec<(&ModelMeta, Vec<i64>)> = vec![(model, vec![id])];
        let mut next = 0;
        while next < doomed.len() {
            let (target, ids) = (doomed[next].0.label(), doomed[next].1.clone());
            next += 1;
            for other in self.models.values() {
                for field in other.fields.iter() {
                    if !matches!(&field.kind, FieldKind::ForeignKey { to } if *to == target) {
                        continue;
                    }
                    let sql = sql::select_referencing(other, &field.name);
                    tracing::debug!(sql = %sql, ids = ?ids, "query");
                    let rows = sqlx::query(&sql).bind(ids.clone()).fetch_all(&mut *tx).await?;
                    let known = seen.entry(other.label()).or_default();
                    let mut fresh = Vec::new();
                    for row in &rows {
                        let child: i64 = row.try_get(0)?;
                        if known.insert(child) {
                            fresh.push(child);
                        }
                    }
                    if !fresh.is_empty() {
                        doomed.push((other, fresh));
                    }
                }
            }
        }

        for (target, ids) in doomed.iter().rev() {
            let label = target.label();
            for field in target.fields.iter().filter(|f| f.kind.is_many_to_many()) {
                sqlx::query(&sql::purge_links(target, &field.name, false))
                    .bind(ids.clone())
                    .execute(&mut *tx)
                    .await?;
            }
            for other in self.models.values() {
                for field in other.fields.iter() {
                    if !matches!(&field.kind, FieldKind::ManyToMany { to } if *to == label) {
                        continue;
                    }
                    sqlx::query(&sql::purge_links(other, &field.name, true))
                        .bind(ids.clone())
                        .execute(&mut *tx)
                        .await?;
                }
            }
            sqlx::query(&sql::delete(target))
                .bind(ids.clone())
                .execute(&mut *tx)
                .await?;
            tracing::debug!(model = %label, ids = ?ids, "deleted");
        }
        tx.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
