use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::coupon::{self, DiscountType};
use crate::errors::ServiceError;
use crate::services::coupons::{self as coupon_rules, NewCoupon};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub order_total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateCouponResponse {
    pub valid: bool,
    pub coupon: CouponResponse,
    pub discount: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_amount: Decimal,
    pub min_order_value: Decimal,
    pub expiry_date: DateTime<Utc>,
    pub is_active: bool,
}

impl From<coupon::Model> for CouponResponse {
    fn from(model: coupon::Model) -> Self {
        Self {
            id: model.id,
            code: model.code,
            discount_type: model.discount_type,
            discount_amount: model.discount_amount,
            min_order_value: model.min_order_value,
            expiry_date: model.expiry_date,
            is_active: model.is_active,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_amount: Decimal,
    #[serde(default)]
    pub min_order_value: Decimal,
    /// Accepts RFC 3339, bare dates, epoch numbers, and legacy
    /// `{seconds, nanos}` objects.
    #[serde(with = "crate::common::flexible_ts")]
    #[schema(value_type = String, example = "2026-12-31T23:59:59Z")]
    pub expiry_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetCouponActiveRequest {
    pub is_active: bool,
}

/// Validate a coupon against an order total. Public: the storefront calls
/// this while the cart is still client-side.
#[utoipa::path(
    post,
    path = "/api/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon is usable", body = ApiResponse<ValidateCouponResponse>),
        (status = 400, description = "Unusable coupon with a reason code", body = crate::errors::ErrorResponse),
    )
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ApiResponse<ValidateCouponResponse>>, ServiceError> {
    let coupon = state
        .services
        .coupons
        .validate(&request.code, request.order_total)
        .await?;
    let discount = coupon_rules::compute_discount(&coupon, request.order_total);
    Ok(Json(ApiResponse::success(ValidateCouponResponse {
        valid: true,
        coupon: coupon.into(),
        discount,
    })))
}

/// Create a coupon (admin).
#[utoipa::path(
    post,
    path = "/api/coupons",
    request_body = CreateCouponRequest,
    responses((status = 201, body = ApiResponse<CouponResponse>)),
    security(("Bearer" = []))
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CouponResponse>>), ServiceError> {
    auth_user.require_admin()?;
    let coupon = state
        .services
        .coupons
        .create(NewCoupon {
            code: request.code,
            discount_type: request.discount_type,
            discount_amount: request.discount_amount,
            min_order_value: request.min_order_value,
            expiry_date: request.expiry_date,
            is_active: request.is_active,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(coupon.into())),
    ))
}

/// All coupons, newest first (admin).
#[utoipa::path(
    get,
    path = "/api/coupons",
    responses((status = 200, body = ApiResponse<Vec<CouponResponse>>)),
    security(("Bearer" = []))
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<CouponResponse>>>, ServiceError> {
    auth_user.require_admin()?;
    let coupons = state.services.coupons.list().await?;
    Ok(Json(ApiResponse::success(
        coupons.into_iter().map(CouponResponse::from).collect(),
    )))
}

/// Enable or disable a coupon (admin).
#[utoipa::path(
    put,
    path = "/api/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon id")),
    request_body = SetCouponActiveRequest,
    responses((status = 200, body = ApiResponse<CouponResponse>)),
    security(("Bearer" = []))
)]
pub async fn set_coupon_active(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<SetCouponActiveRequest>,
) -> Result<Json<ApiResponse<CouponResponse>>, ServiceError> {
    auth_user.require_admin()?;
    let coupon = state
        .services
        .coupons
        .set_active(id, request.is_active)
        .await?;
    Ok(Json(ApiResponse::success(coupon.into())))
}

/// Delete a coupon (admin).
#[utoipa::path(
    delete,
    path = "/api/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses((status = 204, description = "Coupon deleted")),
    security(("Bearer" = []))
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    auth_user.require_admin()?;
    state.services.coupons.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
