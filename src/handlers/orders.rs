use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::{
    customer,
    order::{self, OrderStatus, PaymentMethod, PaymentStatus, RefundStatus, RequestType, ShippingAddress},
    order_item,
};
use crate::errors::ServiceError;
use crate::services::orders::{CreateOrderInput, GatewayPaymentInfo, OrderItemInput};
use crate::{ApiResponse, AppState, ListQuery, PaginatedResponse};

// ---- DTOs ----

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub delivery_fee: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: i32,
    pub selected_color: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReturnRequestBody {
    #[validate(length(min = 1, message = "a reason is required"))]
    pub reason: String,
    #[serde(default = "default_request_type")]
    pub request_type: RequestType,
    pub items: Option<Vec<ReturnItemRequest>>,
}

fn default_request_type() -> RequestType {
    RequestType::Return
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReturnItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProcessReturnRequest {
    pub approve: bool,
    pub refund_amount: Option<Decimal>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateRefundStatusRequest {
    pub refund_status: RefundStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub selected_color: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentInfoResponse {
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerSummary {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_uid: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_amount: Decimal,
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub coupon_code: Option<String>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_info: Option<PaymentInfoResponse>,
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_requested_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<RequestType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_status: Option<RefundStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer: Option<CustomerSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub(crate) fn map_order(
    model: order::Model,
    items: Vec<order_item::Model>,
    customer: Option<customer::Model>,
) -> Result<OrderResponse, ServiceError> {
    let shipping_address: ShippingAddress = serde_json::from_value(model.shipping_address)?;
    let payment_info = model.gateway_order_id.map(|gateway_order_id| PaymentInfoResponse {
        gateway_order_id,
        gateway_payment_id: model.gateway_payment_id,
    });
    Ok(OrderResponse {
        id: model.id,
        order_number: model.order_number,
        customer_uid: model.customer_uid,
        status: model.status,
        items: items
            .into_iter()
            .map(|i| OrderItemResponse {
                product_id: i.product_id,
                name: i.name,
                image: i.image,
                quantity: i.quantity,
                price: i.unit_price,
                selected_color: i.selected_color,
            })
            .collect(),
        total_amount: model.total_amount,
        discount: model.discount,
        delivery_fee: model.delivery_fee,
        coupon_code: model.coupon_code,
        shipping_address,
        payment_method: model.payment_method,
        payment_status: model.payment_status,
        payment_info,
        delivered_at: model.delivered_at,
        return_reason: model.return_reason,
        return_requested_at: model.return_requested_at,
        request_type: model.request_type,
        return_processed_at: model.return_processed_at,
        return_rejection_reason: model.return_rejection_reason,
        refund_amount: model.refund_amount,
        refund_status: model.refund_status,
        refunded_at: model.refunded_at,
        customer: customer.map(|c| CustomerSummary {
            uid: c.uid,
            display_name: c.display_name,
            email: c.email,
        }),
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

pub(crate) fn to_create_input(
    request: CreateOrderRequest,
    gateway_payment: Option<GatewayPaymentInfo>,
) -> CreateOrderInput {
    CreateOrderInput {
        items: request
            .items
            .into_iter()
            .map(|i| OrderItemInput {
                product_id: i.product_id,
                quantity: i.quantity,
                selected_color: i.selected_color,
            })
            .collect(),
        shipping_address: request.shipping_address,
        payment_method: request.payment_method,
        coupon_code: request.coupon_code,
        claimed_total: request.total_amount,
        claimed_discount: request.discount,
        delivery_fee: request.delivery_fee,
        gateway_payment,
    }
}

async fn joined_page(
    state: &AppState,
    rows: Vec<(order::Model, Option<customer::Model>)>,
) -> Result<Vec<OrderResponse>, ServiceError> {
    let ids: Vec<Uuid> = rows.iter().map(|(o, _)| o.id).collect();
    let mut items = state.services.orders.items_for_orders(ids).await?;
    rows.into_iter()
        .map(|(o, c)| {
            let lines = items.remove(&o.id).unwrap_or_default();
            map_order(o, lines, c)
        })
        .collect()
}

// ---- handlers ----

/// Create an order directly (COD checkout or a pre-verified payment).
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Validation or amount mismatch", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    request.validate()?;
    if request.payment_method == PaymentMethod::Razorpay {
        return Err(ServiceError::ValidationError(
            "prepaid orders must go through payment verification".into(),
        ));
    }
    let input = to_create_input(request, None);
    let (order, items) = state
        .services
        .orders
        .create_order(&auth_user.uid, input)
        .await?;
    let response = map_order(order, items, None)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// The caller's own orders, newest first.
#[utoipa::path(
    get,
    path = "/api/orders/my-orders",
    params(ListQuery),
    responses((status = 200, body = ApiResponse<PaginatedResponse<OrderResponse>>)),
    security(("Bearer" = []))
)]
pub async fn my_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_for_customer(&auth_user.uid, query.page, query.limit)
        .await?;
    let rows = orders.into_iter().map(|o| (o, None)).collect();
    let items = joined_page(&state, rows).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, &query,
    ))))
}

/// Admin listing of every order with the customer joined.
#[utoipa::path(
    get,
    path = "/api/orders",
    params(ListQuery),
    responses((status = 200, body = ApiResponse<PaginatedResponse<OrderResponse>>)),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    auth_user.require_admin()?;
    let (rows, total) = state
        .services
        .orders
        .list_all(query.page, query.limit)
        .await?;
    let items = joined_page(&state, rows).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, &query,
    ))))
}

/// Undelivered orders for the delivery dashboard.
#[utoipa::path(
    get,
    path = "/api/orders/delivery",
    params(ListQuery),
    responses((status = 200, body = ApiResponse<PaginatedResponse<OrderResponse>>)),
    security(("Bearer" = []))
)]
pub async fn delivery_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    auth_user.require_staff()?;
    let (rows, total) = state
        .services
        .orders
        .list_active(query.page, query.limit)
        .await?;
    let items = joined_page(&state, rows).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, &query,
    ))))
}

/// Order detail for the owner, admins, or delivery staff.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let (order, items) = state.services.orders.get_order(id).await?;
    if !auth_user.is_delivery() {
        auth_user.require_owner_or_admin(&order.customer_uid)?;
    }
    Ok(Json(ApiResponse::success(map_order(order, items, None)?)))
}

/// Move an order along the lifecycle (admin/delivery).
#[utoipa::path(
    put,
    path = "/api/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    auth_user.require_staff()?;
    let order = state
        .services
        .orders
        .update_status(id, request.status)
        .await?;
    let (order, items) = state.services.orders.get_order(order.id).await?;
    Ok(Json(ApiResponse::success(map_order(order, items, None)?)))
}

/// Cancel an order still in Pending/Processing (owner or admin).
#[utoipa::path(
    put,
    path = "/api/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, body = ApiResponse<OrderResponse>),
        (status = 400, description = "Not cancellable in its current status", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order_model(id).await?;
    auth_user.require_owner_or_admin(&order.customer_uid)?;
    let order = state.services.orders.cancel_order(id).await?;
    let (order, items) = state.services.orders.get_order(order.id).await?;
    Ok(Json(ApiResponse::success(map_order(order, items, None)?)))
}
