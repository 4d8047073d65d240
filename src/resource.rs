//! Resource descriptors: what a model exposes over the API, and who may touch it.

use crate::model::{ModelMeta, Record, RecordFn};
use crate::store::{OrderBy, Queryset};
use crate::validation::{CleanedData, FormValidator};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// One declared display field.
#[derive(Clone)]
pub enum FieldSpec {
    /// Resolved by name against the descriptor, then the record.
    Named(String),
    /// Free function of the record; its output is keyed by `name`.
    Callable { name: String, func: RecordFn },
}

impl FieldSpec {
    pub fn callable<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        FieldSpec::Callable {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FieldSpec::Named(name) | FieldSpec::Callable { name, .. } => name,
        }
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSpec::Named(name) => f.debug_tuple("Named").field(name).finish(),
            FieldSpec::Callable { name, .. } => f.debug_struct("Callable").field("name", name).finish(),
        }
    }
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        FieldSpec::Named(name.to_string())
    }
}

impl From<String> for FieldSpec {
    fn from(name: String) -> Self {
        FieldSpec::Named(name)
    }
}

/// Capability checks on whoever issued the request.
pub trait Capabilities: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn has_permission(&self, permission: &str) -> bool;
}

/// Plain requestor: a username, a set of granted permission strings, and a superuser flag.
#[derive(Clone, Debug, Default)]
pub struct Requestor {
    pub username: Option<String>,
    pub permissions: BTreeSet<String>,
    pub is_superuser: bool,
}

impl Requestor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(username: impl Into<String>) -> Self {
        Requestor {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn superuser(username: impl Into<String>) -> Self {
        Requestor {
            is_superuser: true,
            ..Self::user(username)
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

impl Capabilities for Requestor {
    fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    /// Anonymous requestors hold no permissions; superusers hold all of them.
    fn has_permission(&self, permission: &str) -> bool {
        self.is_authenticated() && (self.is_superuser || self.permissions.contains(permission))
    }
}

/// Per-request inputs the hooks may inspect.
#[derive(Clone)]
pub struct RequestContext {
    requestor: Arc<dyn Capabilities>,
    query: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(requestor: Arc<dyn Capabilities>) -> Self {
        RequestContext {
            requestor,
            query: BTreeMap::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(Arc::new(Requestor::anonymous()))
    }

    pub fn with_query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn requestor(&self) -> &dyn Capabilities {
        self.requestor.as_ref()
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.requestor.has_permission(permission)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Add,
    Change,
    Delete,
}

impl Action {
    pub fn codename(self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Change => "change",
            Action::Delete => "delete",
        }
    }
}

/// Overridable scope and permission decisions for one resource. Every method has a default.
pub trait ResourceHooks: Send + Sync {
    /// Records the resource can see. Lookups outside this scope answer 404.
    fn queryset(&self, resource: &ResourceDescriptor, _ctx: &RequestContext) -> Queryset {
        resource.default_queryset()
    }

    fn has_get_permission(&self, _resource: &ResourceDescriptor, _ctx: &RequestContext) -> bool {
        true
    }

    fn has_add_permission(&self, resource: &ResourceDescriptor, ctx: &RequestContext) -> bool {
        ctx.has_permission(&resource.permission(Action::Add))
    }

    /// Checked after validation, before anything is written.
    fn has_add_permission_for_data(
        &self,
        _resource: &ResourceDescriptor,
        _ctx: &RequestContext,
        _cleaned: &CleanedData,
    ) -> bool {
        true
    }

    fn has_update_permission(&self, resource: &ResourceDescriptor, ctx: &RequestContext, _record: &Record) -> bool {
        ctx.has_permission(&resource.permission(Action::Change))
    }

    fn has_update_permission_for_data(
        &self,
        _resource: &ResourceDescriptor,
        _ctx: &RequestContext,
        _cleaned: &CleanedData,
    ) -> bool {
        true
    }

    fn has_delete_permission(&self, resource: &ResourceDescriptor, ctx: &RequestContext, _record: &Record) -> bool {
        ctx.has_permission(&resource.permission(Action::Delete))
    }
}

pub struct DefaultHooks;

impl ResourceHooks for DefaultHooks {}

/// Declarative API configuration for one model. Built once, then frozen into a registry.
#[derive(Clone)]
pub struct ResourceDescriptor {
    model: Arc<ModelMeta>,
    display_fields: Vec<FieldSpec>,
    collection_display_fields: Vec<FieldSpec>,
    detail_display_fields: Vec<FieldSpec>,
    writable_fields: Vec<String>,
    ordering: Vec<OrderBy>,
    pagination_size: Option<u32>,
    url_slug: Option<String>,
    validator: Option<Arc<dyn FormValidator>>,
    methods: BTreeMap<String, RecordFn>,
    hooks: Arc<dyn ResourceHooks>,
}

impl fmt::Debug for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor")
            .field("model", &self.model.label())
            .field("display_fields", &self.display_fields)
            .field("writable_fields", &self.writable_fields)
            .field("ordering", &self.ordering)
            .field("pagination_size", &self.pagination_size)
            .field("slug", &self.slug())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn specs<I, F>(fields: I) -> Vec<FieldSpec>
where
    I: IntoIterator<Item = F>,
    F: Into<FieldSpec>,
{
    fields.into_iter().map(Into::into).collect()
}

impl ResourceDescriptor {
    pub fn new(model: Arc<ModelMeta>) -> Self {
        ResourceDescriptor {
            model,
            display_fields: Vec::new(),
            collection_display_fields: Vec::new(),
            detail_display_fields: Vec::new(),
            writable_fields: Vec::new(),
            ordering: Vec::new(),
            pagination_size: None,
            url_slug: None,
            validator: None,
            methods: BTreeMap::new(),
            hooks: Arc::new(DefaultHooks),
        }
    }

    pub fn display_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldSpec>,
    {
        self.display_fields = specs(fields);
        self
    }

    pub fn collection_display_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldSpec>,
    {
        self.collection_display_fields = specs(fields);
        self
    }

    pub fn detail_display_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldSpec>,
    {
        self.detail_display_fields = specs(fields);
        self
    }

    pub fn writable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Field names, `-` prefixed for descending.
    pub fn ordering<I, S>(mut self, ordering: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ordering = ordering.into_iter().map(|s| OrderBy::parse(s.as_ref())).collect();
        self
    }

    pub fn pagination_size(mut self, size: u32) -> Self {
        self.pagination_size = Some(size);
        self
    }

    pub fn url_slug(mut self, slug: impl Into<String>) -> Self {
        self.url_slug = Some(slug.into());
        self
    }

    pub fn validator(mut self, validator: impl FormValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Descriptor-level method, resolved before any record attribute of the same name.
    pub fn method<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(func));
        self
    }

    pub fn hooks(mut self, hooks: impl ResourceHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ResourceHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn model(&self) -> &ModelMeta {
        &self.model
    }

    pub fn model_arc(&self) -> &Arc<ModelMeta> {
        &self.model
    }

    pub fn writable(&self) -> &[String] {
        &self.writable_fields
    }

    pub fn declared_ordering(&self) -> &[OrderBy] {
        &self.ordering
    }

    pub fn page_size(&self) -> Option<u32> {
        self.pagination_size
    }

    pub fn app_label(&self) -> &str {
        &self.model.app_label
    }

    /// Declared slug, or the lowercase model name.
    pub fn slug(&self) -> &str {
        self.url_slug.as_deref().unwrap_or(&self.model.model_name)
    }

    /// `app.slug`, unique per registry.
    pub fn name(&self) -> String {
        format!("{}.{}", self.app_label(), self.slug())
    }

    pub fn form_validator(&self) -> Option<&dyn FormValidator> {
        self.validator.as_deref()
    }

    pub fn descriptor_method(&self, name: &str) -> Option<&RecordFn> {
        self.methods.get(name)
    }

    /// `{app_label}.{action}_{model_name}`.
    pub fn permission(&self, action: Action) -> String {
        format!("{}.{}_{}", self.model.app_label, action.codename(), self.model.model_name)
    }

    /// All records, in the declared ordering or else the model's.
    pub fn default_queryset(&self) -> Queryset {
        let qs = Queryset::all(self.model.clone());
        if self.ordering.is_empty() {
            qs
        } else {
            qs.order_by(self.ordering.iter().cloned())
        }
    }

    pub fn collection_fields(&self) -> Vec<FieldSpec> {
        with_id(if self.collection_display_fields.is_empty() {
            &self.display_fields
        } else {
            &self.collection_display_fields
        })
    }

    pub fn detail_fields(&self) -> Vec<FieldSpec> {
        with_id(if self.detail_display_fields.is_empty() {
            &self.display_fields
        } else {
            &self.detail_display_fields
        })
    }

    pub fn queryset(&self, ctx: &RequestContext) -> Queryset {
        self.hooks.queryset(self, ctx)
    }

    pub fn has_get_permission(&self, ctx: &RequestContext) -> bool {
        self.hooks.has_get_permission(self, ctx)
    }

    pub fn has_add_permission(&self, ctx: &RequestContext) -> bool {
        self.hooks.has_add_permission(self, ctx)
    }

    pub fn has_add_permission_for_data(&self, ctx: &RequestContext, cleaned: &CleanedData) -> bool {
        self.hooks.has_add_permission_for_data(self, ctx, cleaned)
    }

    pub fn has_update_permission(&self, ctx: &RequestContext, record: &Record) -> bool {
        self.hooks.has_update_permission(self, ctx, record)
    }

    pub fn has_update_permission_for_data(&self, ctx: &RequestContext, cleaned: &CleanedData) -> bool {
        self.hooks.has_update_permission_for_data(self, ctx, cleaned)
    }

    pub fn has_delete_permission(&self, ctx: &RequestContext, record: &Record) -> bool {
        self.hooks.has_delete_permission(self, ctx, record)
    }
}

/// `id` first, then the declared fields with repeats dropped.
fn with_id(fields: &[FieldSpec]) -> Vec<FieldSpec> {
    let mut out = vec![FieldSpec::from("id")];
    for field in fields {
        if !out.iter().any(|f| f.name() == field.name()) {
            out.push(field.clone());
        }
    }
    out
}
