//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from model metadata.
//! Identifiers come from registered models only; values are always bound parameters.

use super::{Queryset, Window};
use crate::error::StoreError;
use crate::model::{FieldKind, FieldMeta, FieldValue, FieldValues, ModelMeta};

/// Quote identifier for PostgreSQL (safe: only from registered models).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub(crate) fn link_table(model: &ModelMeta, field: &str) -> String {
    quoted(&format!("{}_{}", model.db_table(), field))
}

pub(crate) struct QueryBuf {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Pushes a value and returns its typed placeholder, e.g. `$3::numeric`.
    fn placeholder(&mut self, value: FieldValue, pg_type: &str) -> String {
        self.params.push(value);
        format!("${}::{}", self.params.len(), pg_type)
    }
}

/// Cast used for placeholders and select columns so binds and decodes line up regardless of column width.
pub(crate) fn pg_type(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Char { .. } | FieldKind::Text => "text",
        FieldKind::Integer { .. } | FieldKind::ForeignKey { .. } => "bigint",
        FieldKind::Decimal { .. } => "numeric",
        FieldKind::Boolean => "boolean",
        FieldKind::DateTime => "timestamptz",
        FieldKind::ManyToMany { .. } => "bigint[]",
    }
}

/// Fields stored as columns on the model's own table.
pub(crate) fn columns(model: &ModelMeta) -> impl Iterator<Item = &FieldMeta> {
    model.fields.iter().filter(|f| !f.kind.is_many_to_many())
}

fn select_column_list(model: &ModelMeta) -> String {
    std::iter::once(format!("{}::bigint AS {}", quoted("id"), quoted("id")))
        .chain(columns(model).map(|c| {
            let q = quoted(&c.name);
            format!("{}::{} AS {}", q, pg_type(&c.kind), q)
        }))
        .collect::<Vec<_>>()
        .join(", ")
}

fn field_type(model: &ModelMeta, name: &str) -> Option<&'static str> {
    if name == "id" {
        return Some("bigint");
    }
    model
        .field(name)
        .filter(|f| !f.kind.is_many_to_many())
        .map(|f| pg_type(&f.kind))
}

/// Call only on a checked queryset: every field is known, many-to-many filters carry one id.
fn where_clause(q: &mut QueryBuf, queryset: &Queryset) -> String {
    let model = queryset.model();
    let table = quoted(&model.db_table());
    let mut parts = Vec::new();
    for filter in queryset.filters() {
        match field_type(model, &filter.field) {
            Some(ty) => {
                let ph = q.placeholder(filter.value.clone(), ty);
                let op = if filter.negated { "IS DISTINCT FROM" } else { "IS NOT DISTINCT FROM" };
                parts.push(format!("{} {} {}", quoted(&filter.field), op, ph));
            }
            None => {
                let ph = q.placeholder(filter.value.clone(), "bigint");
                parts.push(format!(
                    "{}EXISTS (SELECT 1 FROM {} l WHERE l.source_id = {}.{} AND l.target_id = {})",
                    if filter.negated { "NOT " } else { "" },
                    link_table(model, &filter.field),
                    table,
                    quoted("id"),
                    ph
                ));
            }
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(queryset: &Queryset) -> String {
    let parts: Vec<String> = queryset
        .ordering()
        .iter()
        .map(|o| format!("{} {}", quoted(&o.field), if o.descending { "DESC" } else { "ASC" }))
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// SELECT over the queryset scope, ordered, optionally windowed.
pub(crate) fn select(queryset: &Queryset, window: Option<Window>) -> Result<QueryBuf, StoreError> {
    queryset.check()?;
    let mut q = QueryBuf::new();
    let model = queryset.model();
    let where_sql = where_clause(&mut q, queryset);
    let window_sql = window
        .map(|w| format!(" LIMIT {} OFFSET {}", w.limit, w.offset))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_column_list(model),
        quoted(&model.db_table()),
        where_sql,
        order_clause(queryset),
        window_sql
    );
    Ok(q)
}

pub(crate) fn count(queryset: &Queryset) -> Result<QueryBuf, StoreError> {
    queryset.check()?;
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, queryset);
    q.sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        quoted(&queryset.model().db_table()),
        where_sql
    );
    Ok(q)
}

/// SELECT one row by primary key; caller binds the id as `$1`.
pub(crate) fn select_by_id(model: &ModelMeta) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1",
        select_column_list(model),
        quoted(&model.db_table()),
        quoted("id")
    )
}

/// INSERT of every column present in `values`, returning the new id.
pub(crate) fn insert(model: &ModelMeta, values: &FieldValues) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&model.db_table());
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in columns(model) {
        let Some(v) = values.get(&c.name) else { continue };
        placeholders.push(q.placeholder(v.clone(), pg_type(&c.kind)));
        cols.push(quoted(&c.name));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}::bigint", table, quoted("id"))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}::bigint",
            table,
            cols.join(", "),
            placeholders.join(", "),
            quoted("id")
        )
    };
    q
}

/// UPDATE by id: SET only columns present in `values`. None when there is no column to set.
pub(crate) fn update(model: &ModelMeta, id: i64, values: &FieldValues) -> Option<QueryBuf> {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for c in columns(model) {
        let Some(v) = values.get(&c.name) else { continue };
        let ph = q.placeholder(v.clone(), pg_type(&c.kind));
        sets.push(format!("{} = {}", quoted(&c.name), ph));
    }
    if sets.is_empty() {
        return None;
    }
    let id_ph = q.placeholder(FieldValue::Int(id), "bigint");
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {}",
        quoted(&model.db_table()),
        sets.join(", "),
        quoted("id"),
        id_ph
    );
    Some(q)
}

/// DELETE of every id in `$1` (`bigint[]`).
pub(crate) fn delete(model: &ModelMeta) -> String {
    format!("DELETE FROM {} WHERE {} = ANY($1)", quoted(&model.db_table()), quoted("id"))
}

/// Ids of `model` rows whose foreign key `field` points at any id in `$1`.
pub(crate) fn select_referencing(model: &ModelMeta, field: &str) -> String {
    format!(
        "SELECT {}::bigint FROM {} WHERE {} = ANY($1)",
        quoted("id"),
        quoted(&model.db_table()),
        quoted(field)
    )
}

/// Link rows for a set of source ids, in insertion order. Binds `$1` as `bigint[]`.
pub(crate) fn select_links(model: &ModelMeta, field: &str) -> String {
    format!(
        "SELECT source_id::bigint, target_id::bigint FROM {} WHERE source_id = ANY($1) ORDER BY id",
        link_table(model, field)
    )
}

pub(crate) fn delete_links(model: &ModelMeta, field: &str) -> String {
    format!("DELETE FROM {} WHERE source_id = $1", link_table(model, field))
}

/// Link rows on either side of the ids in `$1`; `inbound` selects by target.
pub(crate) fn purge_links(model: &ModelMeta, field: &str, inbound: bool) -> String {
    format!(
        "DELETE FROM {} WHERE {} = ANY($1)",
        link_table(model, field),
        if inbound { "target_id" } else { "source_id" }
    )
}

pub(crate) fn insert_link(model: &ModelMeta, field: &str) -> String {
    format!(
        "INSERT INTO {} (source_id, target_id) VALUES ($1, $2)",
        link_table(model, field)
    )
}

pub(crate) fn select_existing(table: &str) -> String {
    format!("SELECT id::bigint FROM {} WHERE id = ANY($1)", quoted(table))
}
