//! Request dispatcher: runs the read/write/delete protocol for one resource and one request.
//!
//! Client failures become [`ApiResponse`]s. Store failures and configuration faults come back as
//! [`DispatchError`] for the caller to handle.

use crate::error::{ApiError, ConfigurationFault, DispatchError, StoreError};
use crate::model::Record;
use crate::pagination::paginate;
use crate::registry::Registry;
use crate::resolver::{serialize_record, serialize_records, SerializedRecord};
use crate::resource::{RequestContext, ResourceDescriptor};
use crate::response::ApiResponse;
use crate::store::RecordStore;
use crate::validation::{CleanedData, ModelForm};
use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use serde_json::{Map, Value};

pub const UNPARSABLE_BODY: &str = "Unable to parse JSON request body.";
pub const NOT_AN_OBJECT: &str = "Request body must be a JSON object.";

/// One request addressed to a resource: the collection when `id` is `None`, a record otherwise.
pub struct ApiRequest {
    pub method: Method,
    pub id: Option<i64>,
    pub context: RequestContext,
    pub body: Bytes,
}

impl ApiRequest {
    pub fn new(method: Method, id: Option<i64>, context: RequestContext) -> Self {
        ApiRequest {
            method,
            id,
            context,
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

enum Failure {
    Client(ApiError),
    Fault(DispatchError),
}

impl From<ApiError> for Failure {
    fn from(e: ApiError) -> Self {
        Failure::Client(e)
    }
}

impl From<StoreError> for Failure {
    fn from(e: StoreError) -> Self {
        Failure::Fault(e.into())
    }
}

impl From<ConfigurationFault> for Failure {
    fn from(e: ConfigurationFault) -> Self {
        Failure::Fault(e.into())
    }
}

type Outcome = Result<ApiResponse, Failure>;

pub struct Dispatcher<'a> {
    registry: &'a Registry,
    resource: &'a ResourceDescriptor,
    store: &'a dyn RecordStore,
}

fn record_json(record: SerializedRecord) -> Value {
    Value::Object(record.into_iter().collect())
}

fn parse_body(body: &Bytes) -> Result<Map<String, Value>, ApiError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ApiError::BadRequest(NOT_AN_OBJECT.into())),
        Err(_) => Err(ApiError::BadRequest(UNPARSABLE_BODY.into())),
    }
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a Registry, resource: &'a ResourceDescriptor, store: &'a dyn RecordStore) -> Self {
        Dispatcher {
            registry,
            resource,
            store,
        }
    }

    pub async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, DispatchError> {
        tracing::debug!(
            resource = %self.resource.name(),
            method = %request.method,
            id = ?request.id,
            "dispatch"
        );
        let ctx = &request.context;
        let method = &request.method;
        let outcome = match request.id {
            None if method == Method::GET => self.get_collection(ctx).await,
            Some(id) if method == Method::GET => self.get_detail(ctx, id).await,
            None if method == Method::POST => self.create(ctx, &request.body).await,
            Some(id) if method == Method::PUT => self.update(ctx, id, &request.body).await,
            Some(id) if method == Method::DELETE => self.delete(ctx, id).await,
            _ => Err(ApiError::Forbidden.into()),
        };
        match outcome {
            Ok(response) => Ok(response),
            Err(Failure::Client(e)) => Ok(e.into()),
            Err(Failure::Fault(e)) => Err(e),
        }
    }

    fn deny(&self, action: &str) -> Failure {
        tracing::warn!(resource = %self.resource.name(), action, "permission denied");
        ApiError::Forbidden.into()
    }

    /// Record by id within the resource's scope.
    async fn lookup(&self, ctx: &RequestContext, id: i64) -> Result<Record, Failure> {
        let qs = self.resource.queryset(ctx);
        self.store
            .get(&qs, id)
            .await?
            .ok_or(Failure::Client(ApiError::NotFound))
    }

    fn detail(&self, record: &Record, status: StatusCode) -> Outcome {
        let data = serialize_record(self.resource, record, &self.resource.detail_fields())?;
        Ok(ApiResponse::json(status, record_json(data)))
    }

    async fn clean(
        &self,
        body: &Bytes,
        instance: Option<&Record>,
    ) -> Result<CleanedData, Failure> {
        let data = parse_body(body)?;
        let form = ModelForm::new(self.resource.model_arc(), self.resource.writable())
            .with_validator(self.resource.form_validator());
        form.validate(self.store, &data, instance).await?.map_err(|errors| {
            tracing::debug!(resource = %self.resource.name(), fields = errors.len(), "validation failed");
            Failure::Client(ApiError::Validation(errors))
        })
    }

    async fn get_collection(&self, ctx: &RequestContext) -> Outcome {
        if !self.resource.has_get_permission(ctx) {
            return Err(self.deny("view"));
        }
        let qs = self.resource.queryset(ctx);
        let records = match self.resource.page_size() {
            Some(size) => {
                let total = self.store.count(&qs).await?;
                let page = paginate(ctx.query_param("page"), size, total)?;
                self.store.fetch(&qs, Some(page.window)).await?
            }
            None => self.store.fetch(&qs, None).await?,
        };
        let data = serialize_records(self.resource, &records, &self.resource.collection_fields())?;
        let list = data.into_iter().map(record_json).collect();
        Ok(ApiResponse::json(StatusCode::OK, Value::Array(list)))
    }

    async fn get_detail(&self, ctx: &RequestContext, id: i64) -> Outcome {
        if !self.resource.has_get_permission(ctx) {
            return Err(self.deny("view"));
        }
        let record = self.lookup(ctx, id).await?;
        self.detail(&record, StatusCode::OK)
    }

    async fn create(&self, ctx: &RequestContext, body: &Bytes) -> Outcome {
        if !self.resource.has_add_permission(ctx) {
            return Err(self.deny("add"));
        }
        let cleaned = self.clean(body, None).await?;
        if !self.resource.has_add_permission_for_data(ctx, &cleaned) {
            return Err(self.deny("add"));
        }
        let record = self.store.insert(self.resource.model(), cleaned).await?;
        tracing::info!(resource = %self.resource.name(), id = record.id, "created");
        let location = self.registry.detail_url(self.resource, record.id);
        Ok(self.detail(&record, StatusCode::CREATED)?.with_location(location))
    }

    async fn update(&self, ctx: &RequestContext, id: i64, body: &Bytes) -> Outcome {
        let record = self.lookup(ctx, id).await?;
        if !self.resource.has_update_permission(ctx, &record) {
            return Err(self.deny("change"));
        }
        let cleaned = self.clean(body, Some(&record)).await?;
        if !self.resource.has_update_permission_for_data(ctx, &cleaned) {
            return Err(self.deny("change"));
        }
        let updated = self.store.update(self.resource.model(), record.id, cleaned).await?;
        tracing::info!(resource = %self.resource.name(), id = updated.id, "updated");
        self.detail(&updated, StatusCode::OK)
    }

    async fn delete(&self, ctx: &RequestContext, id: i64) -> Outcome {
        let record = self.lookup(ctx, id).await?;
        if !self.resource.has_delete_permission(ctx, &record) {
            return Err(self.deny("delete"));
        }
        self.store.delete(self.resource.model(), record.id).await?;
        tracing::info!(resource = %self.resource.name(), id = record.id, "deleted");
        Ok(ApiResponse::empty(StatusCode::NO_CONTENT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PERMISSION_DENIED;
    use crate::model::{FieldMeta, FieldValues, ModelMeta};
    use crate::registry::Site;
    use crate::resource::{Requestor, ResourceHooks};
    use crate::response::ResponseBody;
    use crate::store::{MemoryStore, Queryset};
    use serde_json::json;
    use std::sync::Arc;

    struct RejectShouting;

    impl ResourceHooks for RejectShouting {
        fn has_add_permission_for_data(
            &self,
            _resource: &ResourceDescriptor,
            _ctx: &RequestContext,
            cleaned: &CleanedData,
        ) -> bool {
            cleaned
                .get("name")
                .and_then(|v| v.as_str())
                .map_or(true, |s| s != s.to_uppercase())
        }
    }

    fn registry() -> Registry {
        let model = Arc::new(ModelMeta::new("shop", "Tag").with_field(FieldMeta::char("name", 20)));
        let mut site = Site::default();
        site.register(
            ResourceDescriptor::new(model)
                .display_fields(["name"])
                .writable_fields(["name"])
                .hooks(RejectShouting),
        );
        site.freeze().unwrap()
    }

    fn admin() -> RequestContext {
        RequestContext::new(Arc::new(Requestor::superuser("admin")))
    }

    #[tokio::test]
    async fn method_matrix_forbids_unsupported_combinations() {
        let registry = registry();
        let resource = registry.resource("shop", "tag").unwrap();
        let store = MemoryStore::new();
        let dispatcher = Dispatcher::new(&registry, resource, &store);
        for (method, id) in [
            (Method::POST, Some(1)),
            (Method::PUT, None),
            (Method::DELETE, None),
            (Method::PATCH, Some(1)),
            (Method::HEAD, None),
        ] {
            let res = dispatcher.dispatch(&ApiRequest::new(method, id, admin())).await.unwrap();
            assert_eq!(res.status, StatusCode::FORBIDDEN);
            assert_eq!(res.body, ResponseBody::Text(PERMISSION_DENIED.into()));
        }
    }

    #[tokio::test]
    async fn data_permission_runs_after_validation_and_before_insert() {
        let registry = registry();
        let resource = registry.resource("shop", "tag").unwrap();
        let store = MemoryStore::new();
        let dispatcher = Dispatcher::new(&registry, resource, &store);

        let invalid = ApiRequest::new(Method::POST, None, admin()).with_body(r#"{"name": ""}"#);
        let res = dispatcher.dispatch(&invalid).await.unwrap();
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body, ResponseBody::Json(json!({"name": ["This field is required."]})));

        let shouting = ApiRequest::new(Method::POST, None, admin()).with_body(r#"{"name": "LOUD"}"#);
        let res = dispatcher.dispatch(&shouting).await.unwrap();
        assert_eq!(res.status, StatusCode::FORBIDDEN);
        let qs = Queryset::all(resource.model_arc().clone());
        assert_eq!(store.count(&qs).await.unwrap(), 0);

        let fine = ApiRequest::new(Method::POST, None, admin()).with_body(r#"{"name": "quiet"}"#);
        let res = dispatcher.dispatch(&fine).await.unwrap();
        assert_eq!(res.status, StatusCode::CREATED);
        assert_eq!(res.location.as_deref(), Some("/shop/tag/1"));
        assert_eq!(res.body, ResponseBody::Json(json!({"id": 1, "name": "quiet"})));
    }

    #[tokio::test]
    async fn bodies_must_be_json_objects() {
        let registry = registry();
        let resource = registry.resource("shop", "tag").unwrap();
        let store = MemoryStore::new();
        let dispatcher = Dispatcher::new(&registry, resource, &store);

        for (body, message) in [("{oops", UNPARSABLE_BODY), ("", UNPARSABLE_BODY), ("[1]", NOT_AN_OBJECT)] {
            let req = ApiRequest::new(Method::POST, None, admin()).with_body(body);
            let res = dispatcher.dispatch(&req).await.unwrap();
            assert_eq!(res.status, StatusCode::BAD_REQUEST);
            assert_eq!(res.body, ResponseBody::Text(message.into()));
        }
    }

    #[tokio::test]
    async fn missing_record_is_not_found_before_permission_check() {
        let registry = registry();
        let resource = registry.resource("shop", "tag").unwrap();
        let store = MemoryStore::new();
        let mut values = FieldValues::new();
        values.insert("name".into(), "a".into());
        store.insert(resource.model(), values).await.unwrap();
        let dispatcher = Dispatcher::new(&registry, resource, &store);

        let res = dispatcher
            .dispatch(&ApiRequest::new(Method::DELETE, Some(9), RequestContext::anonymous()))
            .await
            .unwrap();
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        let res = dispatcher
            .dispatch(&ApiRequest::new(Method::DELETE, Some(1), RequestContext::anonymous()))
            .await
            .unwrap();
        assert_eq!(res.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unresolvable_display_field_is_returned_as_fault() {
        let model = Arc::new(ModelMeta::new("shop", "Tag").with_field(FieldMeta::char("name", 20)));
        let mut site = Site::default();
        site.register(ResourceDescriptor::new(model).display_fields(["name", "colour"]));
        let registry = site.freeze().unwrap();
        let resource = registry.resource("shop", "tag").unwrap();
        let store = MemoryStore::new();
        let mut values = FieldValues::new();
        values.insert("name".into(), "a".into());
        store.insert(resource.model(), values).await.unwrap();

        let err = Dispatcher::new(&registry, resource, &store)
            .dispatch(&ApiRequest::new(Method::GET, None, RequestContext::anonymous()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Configuration(ConfigurationFault::InvalidField { ref field, .. }) if field == "colour"
        ));
    }
}
