//! Vastra storefront API library.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod common;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod openapi;
pub mod realtime;
pub mod services;

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::{delete, get, post, put}, Router};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};

use crate::handlers::AppServices;
use crate::realtime::SocketGateway;
use crate::services::{
    catalog::CatalogService,
    coupons::CouponService,
    customers::CustomerService,
    notifications::{
        EmailSender, FcmPushSender, LogMailer, NotificationFanout, NotificationFeed, PushSender,
    },
    orders::OrderService,
    payments::{PaymentGateway, PaymentService, RazorpayClient},
    returns::ReturnService,
};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: AppServices,
    pub gateway: Arc<SocketGateway>,
    pub redis: Arc<redis::Client>,
}

/// Wires the service graph over an established database connection. The
/// gateway adapter is injectable so tests can substitute a fake processor.
pub fn build_state(
    db: Arc<DatabaseConnection>,
    config: config::AppConfig,
    payment_gateway: Option<Arc<dyn PaymentGateway>>,
) -> Result<AppState, errors::ServiceError> {
    let redis = Arc::new(
        redis::Client::open(config.redis_url.as_str())
            .map_err(|e| errors::ServiceError::Internal(format!("invalid redis url: {}", e)))?,
    );
    let feed = NotificationFeed::new(redis.clone());

    let catalog = Arc::new(CatalogService::new(db.clone()));
    let coupons = Arc::new(CouponService::new(db.clone()));
    let customers = Arc::new(CustomerService::new(db.clone()));
    let orders = Arc::new(OrderService::new(db.clone(), coupons.clone()));
    let returns = Arc::new(ReturnService::new(
        db.clone(),
        config.return_window_days,
        config.replacement_restocks_stock,
    ));
    let gateway_client: Arc<dyn PaymentGateway> = payment_gateway.unwrap_or_else(|| {
        Arc::new(RazorpayClient::new(
            config.razorpay_key_id.clone(),
            config.razorpay_key_secret.clone(),
        ))
    });
    let payments = Arc::new(PaymentService::new(
        db.clone(),
        gateway_client,
        orders.clone(),
        config.razorpay_key_id.clone(),
        config.razorpay_key_secret.clone(),
    ));

    Ok(AppState {
        db,
        config,
        services: AppServices {
            catalog,
            coupons,
            customers,
            orders,
            returns,
            payments,
            feed,
        },
        gateway: Arc::new(SocketGateway::new()),
        redis,
    })
}

/// Builds the notification fan-out fed by the outbox worker.
pub fn build_fanout(state: &AppState) -> Arc<NotificationFanout> {
    let push: Option<Arc<dyn PushSender>> = state
        .config
        .fcm_server_key
        .clone()
        .map(|key| Arc::new(FcmPushSender::new(key)) as Arc<dyn PushSender>);
    let mailer: Arc<dyn EmailSender> = Arc::new(LogMailer);
    Arc::new(NotificationFanout::new(
        state.services.customers.clone(),
        state.services.feed.clone(),
        state.gateway.clone(),
        push,
        mailer,
        state.config.admin_email.clone(),
    ))
}

/// Common pagination query for list endpoints.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

/// Envelope every endpoint responds with.
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, query: &ListQuery) -> Self {
        let limit = query.limit.max(1);
        Self {
            items,
            total,
            page: query.page,
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

/// Full route table.
pub fn api_routes() -> Router<AppState> {
    let orders = Router::new()
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route("/orders/my-orders", get(handlers::orders::my_orders))
        .route("/orders/delivery", get(handlers::orders::delivery_orders))
        .route("/orders/{id}", get(handlers::orders::get_order))
        .route("/orders/{id}/status", put(handlers::orders::update_status))
        .route("/orders/{id}/cancel", put(handlers::orders::cancel_order))
        .route("/orders/{id}/return", put(handlers::returns::request_return))
        .route(
            "/orders/{id}/return/process",
            put(handlers::returns::process_return),
        )
        .route(
            "/orders/{id}/refund",
            put(handlers::returns::update_refund_status),
        );

    let payments = Router::new()
        .route(
            "/payment/create-order",
            post(handlers::payments::create_gateway_order),
        )
        .route(
            "/payment/verify-payment",
            post(handlers::payments::verify_payment),
        )
        .route("/payment/cod-order", post(handlers::payments::cod_order))
        .route(
            "/payment/refund/{order_id}",
            post(handlers::payments::refund_order),
        );

    let coupons = Router::new()
        .route("/coupons/validate", post(handlers::coupons::validate_coupon))
        .route(
            "/coupons",
            post(handlers::coupons::create_coupon).get(handlers::coupons::list_coupons),
        )
        .route(
            "/coupons/{id}",
            put(handlers::coupons::set_coupon_active).delete(handlers::coupons::delete_coupon),
        );

    let catalog = Router::new()
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/products/{id}",
            get(handlers::products::get_product)
                .put(handlers::products::update_product)
                .delete(handlers::products::delete_product),
        )
        .route(
            "/categories",
            get(handlers::products::list_categories).post(handlers::products::create_category),
        );

    let users = Router::new()
        .route("/users/sync", post(handlers::customers::sync_profile))
        .route(
            "/users/addresses",
            get(handlers::customers::list_addresses).post(handlers::customers::add_address),
        )
        .route(
            "/users/addresses/{id}",
            put(handlers::customers::update_address).delete(handlers::customers::delete_address),
        )
        .route(
            "/users/wishlist",
            get(handlers::customers::list_wishlist).post(handlers::customers::add_to_wishlist),
        )
        .route(
            "/users/wishlist/{product_id}",
            delete(handlers::customers::remove_from_wishlist),
        )
        .route(
            "/users/device-tokens",
            post(handlers::customers::register_device_token),
        );

    let notifications = Router::new()
        .route(
            "/notifications",
            get(handlers::notifications::list_notifications),
        )
        .route(
            "/notifications/{id}/read",
            put(handlers::notifications::mark_notification_read),
        );

    Router::new()
        .route("/status", get(api_status))
        .route("/auth/token", post(handlers::auth::mint_token))
        .merge(orders)
        .merge(payments)
        .merge(coupons)
        .merge(catalog)
        .merge(users)
        .merge(notifications)
}

/// Top-level application router: `/api/*`, the socket endpoint, health, and
/// the OpenAPI document.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws", get(realtime::ws_handler))
        .route("/health", get(health_check))
        .route("/api/openapi.json", get(openapi_json))
        .with_state(state)
}

async fn api_status() -> Json<ApiResponse<Value>> {
    let status = json!({
        "status": "ok",
        "service": "vastra-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    Json(ApiResponse::success(status))
}

async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };
    let redis_status = match state.redis.get_async_connection().await {
        Ok(mut conn) => match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => "healthy",
            Err(_) => "unhealthy",
        },
        Err(_) => "unhealthy",
    };

    Json(ApiResponse::success(json!({
        "status": if db_status == "healthy" { "healthy" } else { "unhealthy" },
        "checks": { "database": db_status, "feed": redis_status },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn openapi_json() -> Json<Value> {
    Json(serde_json::to_value(openapi::api_doc()).unwrap_or_else(|_| json!({})))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn success_envelope_carries_data() {
        let response = ApiResponse::success(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert!(response.message.is_none());
    }

    #[test]
    fn pagination_math() {
        let query = ListQuery { page: 2, limit: 20 };
        let page = PaginatedResponse::new(vec![1, 2, 3], 41, &query);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.page, 2);

        let query = ListQuery { page: 1, limit: 0 };
        let page = PaginatedResponse::new(Vec::<i32>::new(), 0, &query);
        assert_eq!(page.limit, 1);
        assert_eq!(page.total_pages, 0);
    }
}
