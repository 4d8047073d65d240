mod common;

use axum::http::{Method, StatusCode};
use common::*;
use resource_api::{FieldValue, Requestor};
use serde_json::json;

const PRODUCTS: &str = "/backbone/shop/product";

#[tokio::test]
async fn returns_all_products_in_order() {
    let shop = shop();
    let p3 = shop.product("Third", vec![("order", FieldValue::Int(3))]).await;
    let p1 = shop.product("First", vec![("order", FieldValue::Int(1))]).await;
    let p2 = shop.product("Second", vec![("order", FieldValue::Int(2))]).await;

    let reply = shop.get(PRODUCTS).await;
    assert_eq!(reply.status, StatusCode::OK);
    let data = reply.json();
    let ids: Vec<i64> = data
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![p1, p2, p3]);
    assert_eq!(data[0]["name"], "First");
}

#[tokio::test]
async fn only_display_fields_and_id_are_returned() {
    let shop = shop();
    shop.product("Test Product", vec![]).await;

    let data = shop.get(PRODUCTS).await.json();
    let mut keys: Vec<&str> = data[0].as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["brand", "categories", "creation_date", "foo", "id", "name", "order", "price"]
    );
    assert_eq!(data[0]["foo"], "foo");
    assert_eq!(data[0]["price"], "12.32");
}

#[tokio::test]
async fn relations_serialize_as_ids() {
    let shop = shop();
    let c1 = shop.category("A").await;
    let c2 = shop.category("B").await;
    let id = shop
        .product("Test Product", vec![("categories", FieldValue::Ids(vec![c2, c1]))])
        .await;
    let brand = shop.record("product", id).await.unwrap().get("brand").cloned().unwrap();

    let data = shop.get(PRODUCTS).await.json();
    assert_eq!(data[0]["brand"], json!(brand.as_id().unwrap()));
    assert_eq!(data[0]["categories"], json!([c2, c1]));
}

#[tokio::test]
async fn custom_queryset_hides_products() {
    let shop = shop();
    let visible = shop.product("Visible", vec![]).await;
    shop.product("Hidden", vec![("is_hidden", FieldValue::Bool(true))]).await;

    let data = shop.get(PRODUCTS).await.json();
    assert_eq!(data.as_array().unwrap().len(), 1);
    assert_eq!(data[0]["id"], json!(visible));
}

#[tokio::test]
async fn unsupported_methods_are_forbidden() {
    let shop = shop();
    let admin = Requestor::superuser("admin");
    for method in [Method::PUT, Method::DELETE, Method::PATCH] {
        let reply = shop.call(method.clone(), PRODUCTS, &admin, "{}").await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN, "{}", method);
        assert_eq!(reply.text(), "You do not have permission to perform this action.");
    }
}

#[tokio::test]
async fn output_is_sorted_and_indented() {
    let shop = shop();
    shop.brand("Acme").await;
    let reply = shop.get("/backbone/shop/brand").await;
    assert_eq!(reply.text(), "[\n  {\n    \"id\": 1,\n    \"name\": \"Acme\"\n  }\n]");
}

#[tokio::test]
async fn unknown_resources_are_not_found() {
    let shop = shop();
    assert_eq!(shop.get("/backbone/shop/widget").await.status, StatusCode::NOT_FOUND);
    assert_eq!(shop.get("/backbone/other/product").await.status, StatusCode::NOT_FOUND);
    assert_eq!(shop.get("/shop/product").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn collection_override_replaces_display_fields() {
    let shop = shop_with(|d| {
        d.collection_display_fields(["name", "price"])
            .detail_display_fields(["name", "brand", "categories"])
    });
    shop.product("Test Product", vec![]).await;

    let data = shop.get(PRODUCTS).await.json();
    let keys: Vec<&str> = data[0].as_object().unwrap().keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["id", "name", "price"]);
    assert_eq!(data[0]["price"], "12.32");
}
