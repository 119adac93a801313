//! End-to-end order lifecycle: creation with stock reservation, listings,
//! status transitions, and cancellation with stock restore.

mod common;

use axum::http::{Method, StatusCode};
use common::{expect_error, response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use vastra_api::entities::customer::Role;
use vastra_api::entities::outbox_event;

fn order_payload(items: Vec<Value>, total: &str) -> Value {
    json!({
        "items": items,
        "shipping_address": {
            "label": "Home",
            "full_address": "12 Temple Street",
            "city": "Madurai",
            "pincode": "625001",
            "phone": "9876543210"
        },
        "payment_method": "COD",
        "total_amount": total,
    })
}

#[tokio::test]
async fn order_creation_decrements_stock_and_tracks_sales() {
    let app = TestApp::new().await;
    let kanchipuram = app.seed_product("Kanchipuram Silk", dec!(1200), 5).await;
    let banarasi = app.seed_product("Banarasi Georgette", dec!(800), 10).await;
    let token = app.token("cust-1", Role::Customer);

    let payload = order_payload(
        vec![
            json!({"product_id": kanchipuram.id, "quantity": 1}),
            json!({"product_id": banarasi.id, "quantity": 2}),
        ],
        "2800",
    );
    let response = app
        .request(Method::POST, "/api/orders", Some(&token), Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Pending");
    assert_eq!(body["data"]["payment_status"], "pending");
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);

    let kanchipuram = app.product(kanchipuram.id).await;
    let banarasi = app.product(banarasi.id).await;
    assert_eq!(kanchipuram.stock, 4);
    assert_eq!(kanchipuram.sales_count, 1);
    assert_eq!(banarasi.stock, 8);
    assert_eq!(banarasi.sales_count, 2);
}

#[tokio::test]
async fn insufficient_stock_rejects_and_rolls_back() {
    let app = TestApp::new().await;
    let in_stock = app.seed_product("Chiffon Printed", dec!(500), 10).await;
    let scarce = app.seed_product("Patola Heritage", dec!(9000), 1).await;
    let token = app.token("cust-2", Role::Customer);

    let payload = order_payload(
        vec![
            json!({"product_id": in_stock.id, "quantity": 2}),
            json!({"product_id": scarce.id, "quantity": 3}),
        ],
        "28000",
    );
    let response = app
        .request(Method::POST, "/api/orders", Some(&token), Some(payload))
        .await;
    expect_error(response, StatusCode::UNPROCESSABLE_ENTITY, "OUT_OF_STOCK").await;

    // The earlier line's reservation must roll back with the transaction.
    assert_eq!(app.product(in_stock.id).await.stock, 10);
    assert_eq!(app.product(in_stock.id).await.sales_count, 0);
    assert_eq!(app.product(scarce.id).await.stock, 1);
}

#[tokio::test]
async fn client_supplied_totals_are_recomputed_not_trusted() {
    let app = TestApp::new().await;
    let product = app.seed_product("Tussar Handloom", dec!(1500), 8).await;
    let token = app.token("cust-3", Role::Customer);

    let payload = order_payload(
        vec![json!({"product_id": product.id, "quantity": 1})],
        "1",
    );
    let response = app
        .request(Method::POST, "/api/orders", Some(&token), Some(payload))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "AMOUNT_MISMATCH").await;
    assert_eq!(app.product(product.id).await.stock, 8);
}

#[tokio::test]
async fn empty_items_are_rejected() {
    let app = TestApp::new().await;
    let token = app.token("cust-4", Role::Customer);
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(&token),
            Some(order_payload(vec![], "0")),
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
}

#[tokio::test]
async fn unauthenticated_checkout_is_rejected() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            None,
            Some(order_payload(vec![], "0")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

async fn place_order(app: &TestApp, token: &str, product_id: uuid::Uuid, qty: i32, total: &str) -> String {
    let payload = order_payload(vec![json!({"product_id": product_id, "quantity": qty})], total);
    let response = app
        .request(Method::POST, "/api/orders", Some(token), Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    body["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn status_walks_forward_and_delivery_settles_cod() {
    let app = TestApp::new().await;
    let product = app.seed_product("Organza Festive", dec!(700), 6).await;
    let customer = app.token("cust-5", Role::Customer);
    let staff = app.token("staff-1", Role::Delivery);

    let order_id = place_order(&app, &customer, product.id, 1, "700").await;

    for status in ["Processing", "Shipped", "Out for Delivery", "Delivered"] {
        let response = app
            .request(
                Method::PUT,
                &format!("/api/orders/{}/status", order_id),
                Some(&staff),
                Some(json!({"status": status})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "transition to {status}");
        let body = response_json(response).await;
        assert_eq!(body["data"]["status"], status);
    }

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/{}", order_id),
            Some(&customer),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["payment_status"], "paid");
    assert!(body["data"]["delivered_at"].is_string());
}

#[tokio::test]
async fn backwards_and_sideways_transitions_are_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Cotton Daily", dec!(300), 6).await;
    let customer = app.token("cust-6", Role::Customer);
    let staff = app.token("admin-1", Role::Admin);

    let order_id = place_order(&app, &customer, product.id, 1, "300").await;
    let status_path = format!("/api/orders/{}/status", order_id);

    let response = app
        .request(Method::PUT, &status_path, Some(&staff), Some(json!({"status": "Shipped"})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Shipped orders cannot be walked back or cancelled via status.
    let response = app
        .request(Method::PUT, &status_path, Some(&staff), Some(json!({"status": "Processing"})))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_TRANSITION").await;
    let response = app
        .request(Method::PUT, &status_path, Some(&staff), Some(json!({"status": "Cancelled"})))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_TRANSITION").await;

    // Same-status update is a safe no-op.
    let response = app
        .request(Method::PUT, &status_path, Some(&staff), Some(json!({"status": "Shipped"})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Shipped");
}

#[tokio::test]
async fn customers_cannot_transition_status() {
    let app = TestApp::new().await;
    let product = app.seed_product("Linen Casual", dec!(450), 3).await;
    let customer = app.token("cust-7", Role::Customer);
    let order_id = place_order(&app, &customer, product.id, 1, "450").await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/status", order_id),
            Some(&customer),
            Some(json!({"status": "Delivered"})),
        )
        .await;
    expect_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn cancellation_restores_stock_and_floors_sales_count() {
    let app = TestApp::new().await;
    let product = app.seed_product("Mysore Crepe", dec!(950), 5).await;
    let customer = app.token("cust-8", Role::Customer);
    let admin = app.token("admin-2", Role::Admin);

    // Ordering 3 takes stock to 2 and sales to 3.
    let order_id = place_order(&app, &customer, product.id, 3, "2850").await;
    assert_eq!(app.product(product.id).await.stock, 2);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/status", order_id),
            Some(&admin),
            Some(json!({"status": "Processing"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/cancel", order_id),
            Some(&customer),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "Cancelled");

    let product = app.product(product.id).await;
    assert_eq!(product.stock, 5);
    assert_eq!(product.sales_count, 0);
}

#[tokio::test]
async fn shipped_orders_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let product = app.seed_product("Pochampally Ikat", dec!(1100), 4).await;
    let customer = app.token("cust-9", Role::Customer);
    let admin = app.token("admin-3", Role::Admin);

    let order_id = place_order(&app, &customer, product.id, 1, "1100").await;
    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/status", order_id),
            Some(&admin),
            Some(json!({"status": "Shipped"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/cancel", order_id),
            Some(&customer),
            None,
        )
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "INVALID_TRANSITION").await;
    assert_eq!(app.product(product.id).await.stock, 3);
}

#[tokio::test]
async fn only_the_owner_or_admin_may_cancel() {
    let app = TestApp::new().await;
    let product = app.seed_product("Chanderi Pastel", dec!(650), 4).await;
    let owner = app.token("cust-10", Role::Customer);
    let stranger = app.token("cust-11", Role::Customer);

    let order_id = place_order(&app, &owner, product.id, 1, "650").await;
    let response = app
        .request(
            Method::PUT,
            &format!("/api/orders/{}/cancel", order_id),
            Some(&stranger),
            None,
        )
        .await;
    expect_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[tokio::test]
async fn listings_scope_by_role() {
    let app = TestApp::new().await;
    let product = app.seed_product("Kota Doria", dec!(550), 10).await;
    let first = app.token("cust-12", Role::Customer);
    let second = app.token("cust-13", Role::Customer);
    let admin = app.token("admin-4", Role::Admin);

    place_order(&app, &first, product.id, 1, "550").await;
    place_order(&app, &second, product.id, 2, "1100").await;

    let response = app
        .request(Method::GET, "/api/orders/my-orders", Some(&first), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"]["items"][0]["customer_uid"], "cust-12");

    // Customers cannot read the admin listing.
    let response = app
        .request(Method::GET, "/api/orders", Some(&first), None)
        .await;
    expect_error(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;

    let response = app
        .request(Method::GET, "/api/orders", Some(&admin), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);

    let response = app
        .request(Method::GET, "/api/orders/delivery", Some(&admin), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn ordering_clears_the_wishlist_and_enqueues_the_event() {
    let app = TestApp::new().await;
    let product = app.seed_product("Paithani Bridal", dec!(4200), 2).await;
    let token = app.token("cust-14", Role::Customer);

    app.state
        .services
        .customers
        .add_to_wishlist("cust-14", product.id)
        .await
        .unwrap();

    place_order(&app, &token, product.id, 1, "4200").await;

    let wishlist = app
        .state
        .services
        .customers
        .list_wishlist("cust-14")
        .await
        .unwrap();
    assert!(wishlist.is_empty());

    let pending = outbox_event::Entity::find()
        .filter(outbox_event::Column::EventType.eq("order.created"))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn coupon_checkout_applies_server_computed_discount() {
    let app = TestApp::new().await;
    let product = app.seed_product("Banarasi Katan", dec!(500), 10).await;
    let token = app.token("cust-15", Role::Customer);

    app.state
        .services
        .coupons
        .create(vastra_api::services::coupons::NewCoupon {
            code: "welcome50".into(),
            discount_type: vastra_api::entities::coupon::DiscountType::Percentage,
            discount_amount: dec!(10),
            min_order_value: dec!(500),
            expiry_date: chrono::Utc::now() + chrono::Duration::days(30),
            is_active: true,
        })
        .await
        .unwrap();

    // subtotal 1000, 10% off, total 900
    let mut payload = order_payload(
        vec![json!({"product_id": product.id, "quantity": 2})],
        "900",
    );
    payload["coupon_code"] = json!("WELCOME50");
    payload["discount"] = json!("100");

    let response = app
        .request(Method::POST, "/api/orders", Some(&token), Some(payload.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let discount: f64 = body["data"]["discount"].as_str().unwrap().parse().unwrap();
    assert_eq!(discount, 100.0);

    // A claimed discount that disagrees with the coupon math is rejected.
    payload["discount"] = json!("400");
    payload["total_amount"] = json!("600");
    let response = app
        .request(Method::POST, "/api/orders", Some(&token), Some(payload))
        .await;
    expect_error(response, StatusCode::BAD_REQUEST, "AMOUNT_MISMATCH").await;
}

#[tokio::test]
async fn the_last_unit_sells_exactly_once() {
    let app = TestApp::new().await;
    let product = app.seed_product("Patan Patola", dec!(15000), 1).await;
    let first = app.token("cust-16", Role::Customer);
    let second = app.token("cust-17", Role::Customer);

    let payload = order_payload(
        vec![json!({"product_id": product.id, "quantity": 1})],
        "15000",
    );
    let response = app
        .request(Method::POST, "/api/orders", Some(&first), Some(payload.clone()))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // The conditional decrement leaves nothing for the second buyer.
    let response = app
        .request(Method::POST, "/api/orders", Some(&second), Some(payload))
        .await;
    expect_error(response, StatusCode::UNPROCESSABLE_ENTITY, "OUT_OF_STOCK").await;
    assert_eq!(app.product(product.id).await.stock, 0);
    assert_eq!(app.product(product.id).await.sales_count, 1);
}
