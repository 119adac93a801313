//! Gateway payment flows: order intents, signature verification feeding
//! order creation, COD placement, and admin refunds.

mod common;

use std::sync::atomic::Ordering;

use axum::http::{Method, StatusCode};
use common::{expect_error, response_json, TestApp, GATEWAY_SECRET};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use vastra_api::entities::customer::Role;
use vastra_api::services::payments::sign_payload;

fn checkout_order(product_id: uuid::Uuid, qty: i32, total: &str) -> Value {
    json!({
        "items": [{"product_id": product_id, "quantity": qty}],
        "shipping_address": {
            "label": "Office",
            "full_address": "88 Weaver Colony",
            "city": "Varanasi",
            "pincode": "221001"
        },
        "payment_method": "Razorpay",
        "total_amount": total,
    })
}

#[tokio::test]
async fn gateway_order_intent_uses_minor_units() {
    let app = TestApp::new().await;
    let token = app.token("pay-1", Role::Customer);

    let response = app
        .request(
            Method::POST,
            "/api/payment/create-order",
            Some(&token),
            Some(json!({"amount": "1499.50"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["amount"], 149950);
    assert_eq!(body["data"]["currency"], "INR");
    assert_eq!(body["data"]["key_id"], "rzp_test_key");
}

#[tokio::test]
async fn verified_payment_places_a_paid_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("Banarasi Brocade", dec!(2100), 4).await;
    let token = app.token("pay-2", Role::Customer);

    let signature = sign_payload(GATEWAY_SECRET, "order_G1", "pay_G1");
    let response = app
        .request(
            Method::POST,
            "/api/payment/verify-payment",
            Some(&token),
            Some(json!({
                "razorpay_order_id": "order_G1",
                "razorpay_payment_id": "pay_G1",
                "razorpay_signature": signature,
                "order": checkout_order(product.id, 1, "2100"),
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["payment_method"], "Razorpay");
    assert_eq!(body["data"]["payment_status"], "paid");
    assert_eq!(body["data"]["payment_info"]["gateway_order_id"], "order_G1");
    assert_eq!(app.product(product.id).await.stock, 3);
}

#[tokio::test]
async fn bad_signature_creates_nothing() {
    let app = TestApp::new().await;
    let product = app.seed_product("Jamawar Classic", dec!(1900), 4).await;
    let token = app.token("pay-3", Role::Customer);

    let response = app
        .request(
            Method::POST,
            "/api/payment/verify-payment",
            Some(&token),
            Some(json!({
                "razorpay_order_id": "order_G2",
                "razorpay_payment_id": "pay_G2",
                "razorpay_signature": "deadbeef",
                "order": checkout_order(product.id, 1, "1900"),
            })),
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "PAYMENT_VERIFICATION_FAILED").await;

    assert_eq!(app.product(product.id).await.stock, 4);
    let response = app
        .request(Method::GET, "/api/orders/my-orders", Some(&token), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn cod_order_skips_verification_and_stays_pending() {
    let app = TestApp::new().await;
    let product = app.seed_product("Dharmavaram Bridal", dec!(3300), 2).await;
    let token = app.token("pay-4", Role::Customer);

    let mut payload = checkout_order(product.id, 1, "3300");
    payload["payment_method"] = json!("COD");
    let response = app
        .request(Method::POST, "/api/payment/cod-order", Some(&token), Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["payment_status"], "pending");
    assert!(body["data"]["payment_info"].is_null());
}

#[tokio::test]
async fn refunds_are_admin_only_and_single_shot() {
    let app = TestApp::new().await;
    let product = app.seed_product("Kanjeevaram Temple", dec!(5000), 3).await;
    let customer = app.token("pay-5", Role::Customer);
    let admin = app.token("admin-p1", Role::Admin);

    let signature = sign_payload(GATEWAY_SECRET, "order_G3", "pay_G3");
    let response = app
        .request(
            Method::POST,
            "/api/payment/verify-payment",
            Some(&customer),
            Some(json!({
                "razorpay_order_id": "order_G3",
                "razorpay_payment_id": "pay_G3",
                "razorpay_signature": signature,
                "order": checkout_order(product.id, 1, "5000"),
            })),
        )
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    let refund_path = format!("/api/payment/refund/{}", order_id);

    let response = app
        .request(Method::POST, &refund_path, Some(&customer), None)
        .await;
    expect_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;

    let response = app
        .request(Method::POST, &refund_path, Some(&admin), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.gateway.refunds.load(Ordering::SeqCst), 1);

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/{}", order_id),
            Some(&admin),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["payment_status"], "refunded");

    // A second attempt is rejected and never reaches the gateway.
    let response = app
        .request(Method::POST, &refund_path, Some(&admin), None)
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
    assert_eq!(app.gateway.refunds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cod_orders_cannot_be_gateway_refunded() {
    let app = TestApp::new().await;
    let product = app.seed_product("Kosa Plain", dec!(880), 2).await;
    let customer = app.token("pay-6", Role::Customer);
    let admin = app.token("admin-p2", Role::Admin);

    let mut payload = checkout_order(product.id, 1, "880");
    payload["payment_method"] = json!("COD");
    let response = app
        .request(Method::POST, "/api/payment/cod-order", Some(&customer), Some(payload))
        .await;
    let body = response_json(response).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/payment/refund/{}", order_id),
            Some(&admin),
            None,
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
    assert_eq!(app.gateway.refunds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn direct_order_endpoint_rejects_prepaid_method() {
    let app = TestApp::new().await;
    let product = app.seed_product("Ajrakh Modal", dec!(1250), 2).await;
    let token = app.token("pay-7", Role::Customer);

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(&token),
            Some(checkout_order(product.id, 1, "1250")),
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
}
