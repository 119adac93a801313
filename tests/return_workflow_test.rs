//! Return/replacement workflow: the delivery window, admin approval and
//! rejection, replacement policy, and refund-status tracking.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{expect_error, response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use uuid::Uuid;
use vastra_api::entities::customer::Role;
use vastra_api::entities::order;

async fn place_and_deliver(app: &TestApp, owner_token: &str, admin_token: &str, product_id: Uuid, qty: i32, total: &str) -> Uuid {
    let payload = json!({
        "items": [{"product_id": product_id, "quantity": qty}],
        "shipping_address": {
            "label": "Home",
            "full_address": "4 Loom Lane",
            "city": "Kanchipuram",
            "pincode": "631501"
        },
        "payment_method": "COD",
        "total_amount": total,
    });
    let response = app
        .request(Method::POST, "/api/orders", Some(owner_token), Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let order_id: Uuid = body["data"]["id"].as_str().unwrap().parse().unwrap();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/status", order_id),
            Some(admin_token),
            Some(json!({"status": "Delivered"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    order_id
}

/// Rewrites the delivery stamp so window arithmetic can be exercised.
async fn backdate_delivery(app: &TestApp, order_id: Uuid, days_ago: i64) {
    let existing = order::Entity::find_by_id(order_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: order::ActiveModel = existing.into();
    active.delivered_at = Set(Some(Utc::now() - Duration::days(days_ago)));
    active.update(&*app.db).await.unwrap();
}

fn return_body(reason: &str) -> Value {
    json!({ "reason": reason })
}

#[tokio::test]
async fn returns_are_rejected_outside_the_window() {
    let app = TestApp::new().await;
    let product = app.seed_product("Kalamkari Print", dec!(900), 5).await;
    let owner = app.token("ret-1", Role::Customer);
    let admin = app.token("admin-r1", Role::Admin);

    let order_id = place_and_deliver(&app, &owner, &admin, product.id, 1, "900").await;
    backdate_delivery(&app, order_id, 8).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return", order_id),
            Some(&owner),
            Some(return_body("color faded")),
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "RETURN_WINDOW_EXPIRED").await;
}

#[tokio::test]
async fn returns_inside_the_window_are_recorded() {
    let app = TestApp::new().await;
    let product = app.seed_product("Gadwal Border", dec!(1300), 5).await;
    let owner = app.token("ret-2", Role::Customer);
    let admin = app.token("admin-r2", Role::Admin);

    let order_id = place_and_deliver(&app, &owner, &admin, product.id, 1, "1300").await;
    backdate_delivery(&app, order_id, 3).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return", order_id),
            Some(&owner),
            Some(return_body("wrong shade delivered")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Return Requested");
    assert_eq!(body["data"]["request_type"], "return");
    assert!(body["data"]["return_requested_at"].is_string());
}

#[tokio::test]
async fn undelivered_orders_cannot_request_returns() {
    let app = TestApp::new().await;
    let product = app.seed_product("Bandhani Tie-dye", dec!(750), 5).await;
    let owner = app.token("ret-3", Role::Customer);

    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "shipping_address": {"label": "Home", "full_address": "9 Bazaar Rd", "city": "Jaipur", "pincode": "302001"},
        "payment_method": "COD",
        "total_amount": "750",
    });
    let response = app
        .request(Method::POST, "/api/orders", Some(&owner), Some(payload))
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return", order_id),
            Some(&owner),
            Some(return_body("changed my mind")),
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_TRANSITION").await;
}

#[tokio::test]
async fn strangers_cannot_request_returns() {
    let app = TestApp::new().await;
    let product = app.seed_product("Sambalpuri Weave", dec!(850), 5).await;
    let owner = app.token("ret-4", Role::Customer);
    let admin = app.token("admin-r4", Role::Admin);
    let stranger = app.token("ret-5", Role::Customer);

    let order_id = place_and_deliver(&app, &owner, &admin, product.id, 1, "850").await;
    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return", order_id),
            Some(&stranger),
            Some(return_body("not mine")),
        )
        .await;
    expect_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn approving_a_return_restores_stock_and_sets_refund_amount() {
    let app = TestApp::new().await;
    let product = app.seed_product("Uppada Jamdani", dec!(1600), 5).await;
    let owner = app.token("ret-6", Role::Customer);
    let admin = app.token("admin-r6", Role::Admin);

    let order_id = place_and_deliver(&app, &owner, &admin, product.id, 2, "3200").await;
    assert_eq!(app.product(product.id).await.stock, 3);
    let sales_after_delivery = app.product(product.id).await.sales_count;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return", order_id),
            Some(&owner),
            Some(return_body("blouse piece missing")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return/process", order_id),
            Some(&admin),
            Some(json!({"approve": true})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Returned");
    let refund: f64 = body["data"]["refund_amount"].as_str().unwrap().parse().unwrap();
    assert_eq!(refund, 3200.0);
    assert_eq!(body["data"]["refund_status"], "pending");

    let product = app.product(product.id).await;
    assert_eq!(product.stock, 5);
    // Returns restore stock only; the sales counter stays.
    assert_eq!(product.sales_count, sales_after_delivery);
}

#[tokio::test]
async fn rejecting_a_return_restores_delivered_with_a_reason() {
    let app = TestApp::new().await;
    let product = app.seed_product("Maheshwari Silk-cotton", dec!(980), 4).await;
    let owner = app.token("ret-7", Role::Customer);
    let admin = app.token("admin-r7", Role::Admin);

    let order_id = place_and_deliver(&app, &owner, &admin, product.id, 1, "980").await;
    app.request(
        Method::PUT,
        &format!("/api/orders/{}/return", order_id),
        Some(&owner),
        Some(return_body("slight color difference")),
    )
    .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return/process", order_id),
            Some(&admin),
            Some(json!({"approve": false, "rejection_reason": "usage marks present"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Delivered");
    assert_eq!(body["data"]["return_rejection_reason"], "usage marks present");
    // No stock came back on rejection.
    assert_eq!(app.product(product.id).await.stock, 3);
}

#[tokio::test]
async fn replacement_approval_reprocesses_without_stock_change() {
    let app = TestApp::new().await;
    let product = app.seed_product("Ilkal Traditional", dec!(720), 6).await;
    let owner = app.token("ret-8", Role::Customer);
    let admin = app.token("admin-r8", Role::Admin);

    let order_id = place_and_deliver(&app, &owner, &admin, product.id, 1, "720").await;
    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return", order_id),
            Some(&owner),
            Some(json!({"reason": "weaving defect", "request_type": "replacement"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Replacement Requested");

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return/process", order_id),
            Some(&admin),
            Some(json!({"approve": true})),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Processing");
    // Assumed swap: the default policy moves no stock.
    assert_eq!(app.product(product.id).await.stock, 5);
}

#[tokio::test]
async fn processing_requires_a_pending_request_and_admin_role() {
    let app = TestApp::new().await;
    let product = app.seed_product("Narayanpet Check", dec!(640), 4).await;
    let owner = app.token("ret-9", Role::Customer);
    let admin = app.token("admin-r9", Role::Admin);

    let order_id = place_and_deliver(&app, &owner, &admin, product.id, 1, "640").await;

    // No request pending yet.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return/process", order_id),
            Some(&admin),
            Some(json!({"approve": true})),
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_TRANSITION").await;

    // Customers may not process requests at all.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/return/process", order_id),
            Some(&owner),
            Some(json!({"approve": true})),
        )
        .await;
    expect_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn refund_status_tracks_on_terminal_orders_only() {
    let app = TestApp::new().await;
    let product = app.seed_product("Venkatagiri Fine", dec!(1150), 4).await;
    let owner = app.token("ret-10", Role::Customer);
    let admin = app.token("admin-r10", Role::Admin);

    let order_id = place_and_deliver(&app, &owner, &admin, product.id, 1, "1150").await;

    // Delivered but no return yet: refund status is meaningless here.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/refund", order_id),
            Some(&admin),
            Some(json!({"refund_status": "processing"})),
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;

    // Walk through an approved return, then track the refund to completion.
    app.request(
        Method::PUT,
        &format!("/api/orders/{}/return", order_id),
        Some(&owner),
        Some(return_body("damaged zari")),
    )
    .await;
    app.request(
        Method::PUT,
        &format!("/api/orders/{}/return/process", order_id),
        Some(&admin),
        Some(json!({"approve": true})),
    )
    .await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/refund", order_id),
            Some(&admin),
            Some(json!({"refund_status": "completed"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Returned");
    assert_eq!(body["data"]["refund_status"], "completed");
    assert!(body["data"]["refunded_at"].is_string());
}
