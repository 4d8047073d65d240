mod common;

use axum::http::{Method, StatusCode};
use common::*;
use resource_api::{FieldValue, Requestor};
use serde_json::json;

const DENIED: &str = "You do not have permission to perform this action.";

#[tokio::test]
async fn delete_removes_the_item() {
    let shop = shop();
    let id = shop.product("Test Product", vec![]).await;
    let reply = shop
        .call(
            Method::DELETE,
            &format!("/backbone/shop/product/{}", id),
            &user(&["shop.delete_product"]),
            "",
        )
        .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert!(reply.body.is_empty());
    assert!(shop.record("product", id).await.is_none());
}

#[tokio::test]
async fn anonymous_and_unprivileged_users_are_forbidden() {
    let shop = shop();
    let id = shop.product("Test Product", vec![]).await;
    let uri = format!("/backbone/shop/product/{}", id);

    let reply = shop.call(Method::DELETE, &uri, &Requestor::anonymous(), "").await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.text(), DENIED);

    let reply = shop.call(Method::DELETE, &uri, &user(&["shop.change_product"]), "").await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(shop.count("product").await, 1);
}

#[tokio::test]
async fn brands_can_never_be_deleted() {
    let shop = shop();
    let id = shop.brand("Acme").await;
    let reply = shop
        .call(
            Method::DELETE,
            &format!("/backbone/shop/brand/{}", id),
            &Requestor::superuser("admin"),
            "",
        )
        .await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.text(), DENIED);
    assert_eq!(shop.count("brand").await, 1);
}

#[tokio::test]
async fn deleted_category_leaves_no_dangling_links() {
    let shop = shop();
    let kept = shop.category("Kept").await;
    let gone = shop.category("Gone").await;
    let id = shop
        .product("Test Product", vec![("categories", FieldValue::Ids(vec![gone, kept]))])
        .await;
    let editor = user(&["shop.delete_category", "shop.change_product"]);

    let reply = shop
        .call(Method::DELETE, &format!("/backbone/shop/category/{}", gone), &editor, "")
        .await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);

    let uri = format!("/backbone/shop/product/{}", id);
    let data = shop.get(&uri).await.json();
    assert_eq!(data["categories"], json!([kept]));

    let mut body = data.as_object().unwrap().clone();
    for key in ["id", "creation_date", "foo"] {
        body.remove(key);
    }
    let reply = shop
        .call(Method::PUT, &uri, &editor, &serde_json::Value::Object(body).to_string())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.json()["categories"], json!([kept]));
}
