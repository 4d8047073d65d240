//! Shared fixtures: a small shop (brands, categories, products) served from the in-memory store.

#![allow(dead_code)]

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use resource_api::validation::CleanedData;
use resource_api::{
    app_router, resolve, AppState, FieldValue, FormValidator, FullConfig, MemoryStore, Queryset, Record,
    RecordStore, Registry, RequestContext, Requestor, ResourceDescriptor, ResourceHooks, Site,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;

pub const MOUNT: &str = "/backbone";

pub fn shop_config() -> FullConfig {
    serde_json::from_value(json!({
        "models": [
            {"app_label": "shop", "name": "Brand", "fields": [
                {"name": "name", "type": "char", "max_length": 255}
            ]},
            {"app_label": "shop", "name": "Category", "fields": [
                {"name": "name", "type": "char", "max_length": 255}
            ]},
            {"app_label": "shop", "name": "Product", "ordering": ["id"], "fields": [
                {"name": "creation_date", "type": "datetime", "auto_now_add": true},
                {"name": "name", "type": "char", "max_length": 255},
                {"name": "brand", "type": "foreign_key", "to": "Brand", "null": true, "blank": true},
                {"name": "categories", "type": "many_to_many", "to": "Category", "blank": true},
                {"name": "is_hidden", "type": "boolean", "default": false},
                {"name": "price", "type": "decimal", "max_digits": 8, "decimal_places": 2},
                {"name": "order", "type": "positive_small_integer", "default": 0}
            ]}
        ],
        "resources": [
            {
                "model": "shop.Product",
                "display_fields": ["creation_date", "name", "brand", "categories", "price", "order", "foo"],
                "fields": ["name", "brand", "categories", "price", "order"],
                "ordering": ["order", "id"]
            },
            {"model": "shop.Brand", "display_fields": ["name"], "fields": ["name"]},
            {"model": "shop.Category", "display_fields": ["name"], "fields": ["name"], "pagination_size": 2}
        ]
    }))
    .unwrap()
}

fn allowed_name(cleaned: &CleanedData) -> bool {
    cleaned.get("name").and_then(FieldValue::as_str) != Some("NOTALLOWED")
}

/// Hidden products are out of scope; the name `NOTALLOWED` may never be saved.
pub struct ProductHooks;

impl ResourceHooks for ProductHooks {
    fn queryset(&self, resource: &ResourceDescriptor, _ctx: &RequestContext) -> Queryset {
        resource.default_queryset().filter("is_hidden", false)
    }

    fn has_add_permission_for_data(&self, _: &ResourceDescriptor, _: &RequestContext, cleaned: &CleanedData) -> bool {
        allowed_name(cleaned)
    }

    fn has_update_permission_for_data(
        &self,
        _: &ResourceDescriptor,
        _: &RequestContext,
        cleaned: &CleanedData,
    ) -> bool {
        allowed_name(cleaned)
    }
}

/// Brands can never be deleted through the API.
pub struct BrandHooks;

impl ResourceHooks for BrandHooks {
    fn has_delete_permission(&self, _: &ResourceDescriptor, _: &RequestContext, _: &Record) -> bool {
        false
    }
}

pub const BRAND_CAPITAL: &str = "Brand name must start with a capital letter.";

pub struct BrandForm;

impl FormValidator for BrandForm {
    fn clean_field(&self, field: &str, value: FieldValue) -> Result<FieldValue, String> {
        if field == "name" {
            if let Some(first) = value.as_str().and_then(|s| s.chars().next()) {
                if first.to_uppercase().next() != Some(first) {
                    return Err(BRAND_CAPITAL.into());
                }
            }
        }
        Ok(value)
    }
}

pub fn user(permissions: &[&str]) -> Requestor {
    permissions
        .iter()
        .fold(Requestor::user("test"), |r, p| r.with_permission(*p))
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> Value {
        assert_eq!(
            self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(header::LOCATION).and_then(|v| v.to_str().ok())
    }
}

pub struct Shop {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub registry: Arc<Registry>,
}

pub fn shop() -> Shop {
    shop_with(|product| product)
}

/// The shop with its product descriptor adjusted by `product`.
pub fn shop_with(product: impl Fn(ResourceDescriptor) -> ResourceDescriptor) -> Shop {
    let mut resolved = resolve(&shop_config()).unwrap();
    resolved
        .attach_property("shop.product", "foo", |_| json!("foo"))
        .unwrap();
    let mut site = Site::default()
        .with_mount_path(MOUNT)
        .with_base_url("http://testserver");
    for descriptor in resolved.into_descriptors().unwrap() {
        let slug = descriptor.slug().to_string();
        let descriptor = match slug.as_str() {
            "product" => product(descriptor.hooks(ProductHooks)),
            "brand" => descriptor.validator(BrandForm).hooks(BrandHooks),
            _ => descriptor,
        };
        site.register(descriptor);
    }
    let registry = Arc::new(site.freeze().unwrap());
    let store = Arc::new(MemoryStore::new());
    let state = AppState {
        registry: registry.clone(),
        store: store.clone(),
    };
    Shop {
        router: app_router(state, 64 * 1024),
        store,
        registry,
    }
}

impl Shop {
    pub async fn call(&self, method: Method, uri: &str, who: &Requestor, body: &str) -> Reply {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .extension(who.clone())
            .body(Body::from(body.to_string()))
            .unwrap();
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        Reply { status, headers, body }
    }

    pub async fn get(&self, uri: &str) -> Reply {
        self.call(Method::GET, uri, &Requestor::anonymous(), "").await
    }

    fn resource(&self, slug: &str) -> &Arc<ResourceDescriptor> {
        self.registry.resource("shop", slug).unwrap()
    }

    pub async fn create(&self, slug: &str, values: Vec<(&str, FieldValue)>) -> i64 {
        let values = values.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        self.store
            .insert(self.resource(slug).model(), values)
            .await
            .unwrap()
            .id
    }

    pub async fn brand(&self, name: &str) -> i64 {
        self.create("brand", vec![("name", name.into())]).await
    }

    pub async fn category(&self, name: &str) -> i64 {
        self.create("category", vec![("name", name.into())]).await
    }

    /// Product priced 12.32 with a fresh brand.
    pub async fn product(&self, name: &str, extra: Vec<(&str, FieldValue)>) -> i64 {
        let brand = self.brand("Test Brand").await;
        let mut values = vec![
            ("name", FieldValue::from(name)),
            ("price", decimal("12.32")),
            ("brand", FieldValue::Int(brand)),
        ];
        values.extend(extra);
        self.create("product", values).await
    }

    pub async fn count(&self, slug: &str) -> u64 {
        let qs = Queryset::all(self.resource(slug).model_arc().clone());
        self.store.count(&qs).await.unwrap()
    }

    pub async fn record(&self, slug: &str, id: i64) -> Option<Record> {
        let qs = Queryset::all(self.resource(slug).model_arc().clone());
        self.store.get(&qs, id).await.unwrap()
    }
}

pub fn decimal(s: &str) -> FieldValue {
    FieldValue::Decimal(Decimal::from_str(s).unwrap())
}
