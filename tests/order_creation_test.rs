//! Storefront order creation through the public API.

mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, PRODUCT_PRICE, REFERRAL_CODE, STORE_SLUG, VARIANT_PRICE};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use storefront_api::entities::{commission, order, order_item};
use uuid::Uuid;

fn orders_uri() -> String {
    format!("/api/storefront/{}/orders", STORE_SLUG)
}

#[tokio::test]
async fn create_order_prices_from_catalog() {
    let app = TestApp::new().await;

    let mut body = app.order_body("razorpay", 2, 100);
    // Client-side prices are ignored
    body["items"][0]["price"] = json!(1);

    let (status, order) = app.request(Method::POST, &orders_uri(), Some(body), None).await;

    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["success"], true);
    assert_eq!(order["subtotal"], 2 * PRODUCT_PRICE);
    assert_eq!(order["shipping"], 100);
    assert_eq!(order["total"], 1100);
    assert_eq!(order["currency"], "INR");
    assert_eq!(order["paymentStatus"], "pending");
    assert_eq!(order["fulfillmentStatus"], "pending");
    assert_eq!(order["paymentMethod"], "razorpay");
    assert_eq!(order["items"][0]["price"], PRODUCT_PRICE);
    assert_eq!(order["items"][0]["lineTotal"], 2 * PRODUCT_PRICE);

    let number = order["orderId"].as_str().unwrap();
    assert!(number.starts_with("ORD-"), "unexpected order number {number}");
    assert_eq!(number.len(), "ORD-20240101-ABC123".len());
    assert!(order["_id"].as_str().and_then(|id| Uuid::parse_str(id).ok()).is_some());

    // Creation alone never talks to the gateway
    assert_eq!(app.gateway.order_calls(), 0);
}

#[tokio::test]
async fn variant_price_overrides_product_price() {
    let app = TestApp::new().await;
    let mut body = app.order_body("razorpay", 1, 0);
    body["items"][0]["variant"] = json!("XL");

    let (status, order) = app.request(Method::POST, &orders_uri(), Some(body), None).await;

    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["items"][0]["variant"], "XL");
    assert_eq!(order["subtotal"], VARIANT_PRICE);
    assert_eq!(order["total"], VARIANT_PRICE);
}

#[tokio::test]
async fn empty_cart_is_rejected_and_nothing_is_written() {
    let app = TestApp::new().await;
    let mut body = app.order_body("razorpay", 1, 0);
    body["items"] = json!([]);

    let (status, error) = app.request(Method::POST, &orders_uri(), Some(body), None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["success"], false);
    assert!(error["error"].as_str().unwrap().contains("at least one item"));

    let db = app.state.db.as_ref();
    assert_eq!(order::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(order_item::Entity::find().count(db).await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_product_fails_without_partial_order() {
    let app = TestApp::new().await;
    let mut body = app.order_body("razorpay", 1, 0);
    body["items"] = json!([
        {"productId": app.product.id, "quantity": 1},
        {"productId": Uuid::new_v4(), "quantity": 1}
    ]);

    let (status, _) = app.request(Method::POST, &orders_uri(), Some(body), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let db = app.state.db.as_ref();
    assert_eq!(order::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(order_item::Entity::find().count(db).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_cart_input_is_a_bad_request() {
    let app = TestApp::new().await;

    let zero_quantity = app.order_body("razorpay", 0, 0);
    let (status, _) = app
        .request(Method::POST, &orders_uri(), Some(zero_quantity), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut bad_email = app.order_body("razorpay", 1, 0);
    bad_email["customer"]["email"] = json!("not-an-email");
    let (status, _) = app
        .request(Method::POST, &orders_uri(), Some(bad_email), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut blank_city = app.order_body("razorpay", 1, 0);
    blank_city["shippingAddress"]["city"] = json!("   ");
    let (status, _) = app
        .request(Method::POST, &orders_uri(), Some(blank_city), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut negative_shipping = app.order_body("razorpay", 1, 0);
    negative_shipping["shipping"] = json!(-5);
    let (status, _) = app
        .request(Method::POST, &orders_uri(), Some(negative_shipping), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut unknown_method = app.order_body("razorpay", 1, 0);
    unknown_method["paymentMethod"] = json!("barter");
    let (status, error) = app
        .request(Method::POST, &orders_uri(), Some(unknown_method), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["success"], false);

    assert_eq!(
        order::Entity::find().count(app.state.db.as_ref()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn unknown_or_inactive_store_is_not_found() {
    let app = TestApp::new().await;
    let (status, error) = app
        .request(
            Method::POST,
            "/api/storefront/no-such-store/orders",
            Some(app.order_body("razorpay", 1, 0)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error["success"], false);
}

#[tokio::test]
async fn products_of_another_store_cannot_be_ordered() {
    let app = TestApp::new().await;
    let (status, _) = app
        .request(
            Method::POST,
            "/api/storefront/other-shop/orders",
            Some(app.order_body("razorpay", 1, 0)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cod_order_never_reaches_the_gateway() {
    let app = TestApp::new().await;
    let order_id = app.create_order("cod").await;

    let (status, error) = app.initiate_payment(order_id, None).await;
    assert_eq!(status, StatusCode::CONFLICT, "{error}");

    let order = app.fetch_order(order_id).await;
    assert_eq!(order["paymentMethod"], "cod");
    assert_eq!(order["paymentStatus"], "pending");
    assert_eq!(app.gateway.order_calls(), 0);
    assert_eq!(app.gateway.subscription_calls(), 0);
}

#[tokio::test]
async fn referral_code_records_commission_with_order() {
    let app = TestApp::new().await;
    let mut body = app.order_body("razorpay", 2, 100);
    body["referralCode"] = json!(REFERRAL_CODE);

    let (status, order) = app.request(Method::POST, &orders_uri(), Some(body), None).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(order["referralCode"], REFERRAL_CODE);

    let order_id = Uuid::parse_str(order["_id"].as_str().unwrap()).unwrap();
    let rows = commission::Entity::find()
        .filter(commission::Column::OrderId.eq(order_id))
        .all(app.state.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    // 10% of the 1000 subtotal; shipping earns nothing
    assert_eq!(rows[0].amount, 100);
    assert_eq!(rows[0].affiliate_id, app.affiliate.id);
    assert_eq!(rows[0].status, commission::CommissionStatus::Pending);
}

#[tokio::test]
async fn unknown_referral_code_does_not_block_checkout() {
    let app = TestApp::new().await;
    let mut body = app.order_body("razorpay", 1, 0);
    body["referralCode"] = json!("NOBODY");

    let (status, order) = app.request(Method::POST, &orders_uri(), Some(body), None).await;

    assert_eq!(status, StatusCode::CREATED, "{order}");
    assert_eq!(
        commission::Entity::find()
            .count(app.state.db.as_ref())
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn order_numbers_are_unique_per_order() {
    let app = TestApp::new().await;
    let mut numbers = std::collections::HashSet::new();
    for _ in 0..5 {
        let id = app.create_order("razorpay").await;
        let order = app.fetch_order(id).await;
        assert!(numbers.insert(order["orderId"].as_str().unwrap().to_string()));
    }
}
