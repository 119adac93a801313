use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::order::PaymentMethod;
use crate::errors::ServiceError;
use crate::handlers::orders::{map_order, to_create_input, CreateOrderRequest, OrderResponse};
use crate::services::orders::GatewayPaymentInfo;
use crate::services::payments::GatewayOrderIntent;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateGatewayOrderRequest {
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    pub order: CreateOrderRequest,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefundResponse {
    pub order_id: Uuid,
    pub refunded: bool,
}

/// Create a gateway order intent for the hosted checkout.
#[utoipa::path(
    post,
    path = "/api/payment/create-order",
    request_body = CreateGatewayOrderRequest,
    responses(
        (status = 200, body = ApiResponse<GatewayOrderIntent>),
        (status = 502, description = "Gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_gateway_order(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Json(request): Json<CreateGatewayOrderRequest>,
) -> Result<Json<ApiResponse<GatewayOrderIntent>>, ServiceError> {
    let intent = state
        .services
        .payments
        .create_gateway_order(request.amount, &request.currency)
        .await?;
    Ok(Json(ApiResponse::success(intent)))
}

/// Verify the hosted-checkout callback signature and place the order. A
/// signature mismatch creates nothing.
#[utoipa::path(
    post,
    path = "/api/payment/verify-payment",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 201, description = "Payment verified, order placed", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Signature mismatch", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    request.order.validate()?;
    let mut order_request = request.order;
    order_request.payment_method = PaymentMethod::Razorpay;
    let input = to_create_input(
        order_request,
        Some(GatewayPaymentInfo {
            gateway_order_id: request.razorpay_order_id.clone(),
            gateway_payment_id: request.razorpay_payment_id.clone(),
        }),
    );
    let (order, items) = state
        .services
        .payments
        .verify_and_place_order(
            &auth_user.uid,
            &request.razorpay_order_id,
            &request.razorpay_payment_id,
            &request.razorpay_signature,
            input,
        )
        .await?;
    let response = map_order(order, items, None)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Place a cash-on-delivery order: same creation path, no verification step.
#[utoipa::path(
    post,
    path = "/api/payment/cod-order",
    request_body = CreateOrderRequest,
    responses((status = 201, body = ApiResponse<OrderResponse>)),
    security(("Bearer" = []))
)]
pub async fn cod_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    request.validate()?;
    let mut order_request = request;
    order_request.payment_method = PaymentMethod::Cod;
    let input = to_create_input(order_request, None);
    let (order, items) = state
        .services
        .orders
        .create_order(&auth_user.uid, input)
        .await?;
    let response = map_order(order, items, None)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(response))))
}

/// Initiate a full gateway refund (admin).
#[utoipa::path(
    post,
    path = "/api/payment/refund/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, body = ApiResponse<RefundResponse>),
        (status = 400, description = "Not a refundable order", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn refund_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<RefundResponse>>, ServiceError> {
    auth_user.require_admin()?;
    let order = state.services.payments.refund_order(order_id).await?;
    Ok(Json(ApiResponse::success(RefundResponse {
        order_id: order.id,
        refunded: true,
    })))
}
