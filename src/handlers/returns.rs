use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::handlers::orders::{
    map_order, OrderResponse, ProcessReturnRequest, ReturnRequestBody, UpdateRefundStatusRequest,
};
use crate::services::returns::{ProcessReturnInput, ReturnItemInput};
use crate::{ApiResponse, AppState};

/// Request a return or replacement on a delivered order (owner or admin),
/// inside the delivery window.
#[utoipa::path(
    put,
    path = "/api/orders/{id}/return",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = ReturnRequestBody,
    responses(
        (status = 200, body = ApiResponse<OrderResponse>),
        (status = 400, description = "Window expired or order not delivered", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn request_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<ReturnRequestBody>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request.validate()?;
    let order = state.services.orders.get_order_model(id).await?;
    auth_user.require_owner_or_admin(&order.customer_uid)?;

    let items = request.items.map(|items| {
        items
            .into_iter()
            .map(|i| ReturnItemInput {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect()
    });
    let order = state
        .services
        .returns
        .request_return(id, request.reason, items, request.request_type)
        .await?;
    let (order, lines) = state.services.orders.get_order(order.id).await?;
    Ok(Json(ApiResponse::success(map_order(order, lines, None)?)))
}

/// Approve or reject a pending return/replacement request (admin).
#[utoipa::path(
    put,
    path = "/api/orders/{id}/return/process",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = ProcessReturnRequest,
    responses(
        (status = 200, body = ApiResponse<OrderResponse>),
        (status = 400, description = "No pending request on this order", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn process_return(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<ProcessReturnRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    auth_user.require_admin()?;
    let order = state
        .services
        .returns
        .process_return(
            id,
            ProcessReturnInput {
                approve: request.approve,
                refund_amount: request.refund_amount,
                rejection_reason: request.rejection_reason,
            },
        )
        .await?;
    let (order, lines) = state.services.orders.get_order(order.id).await?;
    Ok(Json(ApiResponse::success(map_order(order, lines, None)?)))
}

/// Track refund progress on a cancelled or returned order (admin).
#[utoipa::path(
    put,
    path = "/api/orders/{id}/refund",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateRefundStatusRequest,
    responses((status = 200, body = ApiResponse<OrderResponse>)),
    security(("Bearer" = []))
)]
pub async fn update_refund_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateRefundStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    auth_user.require_admin()?;
    let order = state
        .services
        .returns
        .update_refund_status(id, request.refund_status)
        .await?;
    debug_assert!(matches!(
        order.status,
        OrderStatus::Cancelled | OrderStatus::Returned
    ));
    let (order, lines) = state.services.orders.get_order(order.id).await?;
    Ok(Json(ApiResponse::success(map_order(order, lines, None)?)))
}
