use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::customer::{self, Role};
use crate::entities::customer_address;
use crate::errors::ServiceError;
use crate::handlers::products::ProductResponse;
use crate::services::customers::{AddressInput, ProfileInput};
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncProfileRequest {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerResponse {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub role: Role,
}

impl From<customer::Model> for CustomerResponse {
    fn from(model: customer::Model) -> Self {
        Self {
            uid: model.uid,
            email: model.email,
            display_name: model.display_name,
            photo_url: model.photo_url,
            role: model.role,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddressRequest {
    #[validate(length(min = 1, message = "label is required"))]
    pub label: String,
    #[validate(length(min = 1, message = "full_address is required"))]
    pub full_address: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 4, max = 10, message = "pincode looks invalid"))]
    pub pincode: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AddressResponse {
    pub id: Uuid,
    pub label: String,
    pub full_address: String,
    pub city: String,
    pub pincode: String,
    pub phone: Option<String>,
}

impl From<customer_address::Model> for AddressResponse {
    fn from(model: customer_address::Model) -> Self {
        Self {
            id: model.id,
            label: model.label,
            full_address: model.full_address,
            city: model.city,
            pincode: model.pincode,
            phone: model.phone,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WishlistRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeviceTokenRequest {
    pub token: String,
}

/// First-sign-in upsert: creates the account or merges profile fields,
/// never touching addresses, wishlist, or device tokens.
#[utoipa::path(
    post,
    path = "/api/users/sync",
    request_body = SyncProfileRequest,
    responses((status = 200, body = ApiResponse<CustomerResponse>)),
    security(("Bearer" = []))
)]
pub async fn sync_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<SyncProfileRequest>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ServiceError> {
    let profile = ProfileInput {
        email: request.email.or(auth_user.email.clone()),
        display_name: request.display_name.or(auth_user.name.clone()),
        photo_url: request.photo_url,
    };
    let customer = state
        .services
        .customers
        .sync_profile(&auth_user.uid, profile)
        .await?;
    Ok(Json(ApiResponse::success(customer.into())))
}

#[utoipa::path(
    get,
    path = "/api/users/addresses",
    responses((status = 200, body = ApiResponse<Vec<AddressResponse>>)),
    security(("Bearer" = []))
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<AddressResponse>>>, ServiceError> {
    let addresses = state.services.customers.list_addresses(&auth_user.uid).await?;
    Ok(Json(ApiResponse::success(
        addresses.into_iter().map(AddressResponse::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/users/addresses",
    request_body = AddressRequest,
    responses((status = 201, body = ApiResponse<AddressResponse>)),
    security(("Bearer" = []))
)]
pub async fn add_address(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<AddressRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AddressResponse>>), ServiceError> {
    request.validate()?;
    let address = state
        .services
        .customers
        .add_address(
            &auth_user.uid,
            AddressInput {
                label: request.label,
                full_address: request.full_address,
                city: request.city,
                pincode: request.pincode,
                phone: request.phone,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(address.into())),
    ))
}

#[utoipa::path(
    put,
    path = "/api/users/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    request_body = AddressRequest,
    responses((status = 200, body = ApiResponse<AddressResponse>)),
    security(("Bearer" = []))
)]
pub async fn update_address(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<AddressRequest>,
) -> Result<Json<ApiResponse<AddressResponse>>, ServiceError> {
    request.validate()?;
    let address = state
        .services
        .customers
        .update_address(
            &auth_user.uid,
            id,
            AddressInput {
                label: request.label,
                full_address: request.full_address,
                city: request.city,
                pincode: request.pincode,
                phone: request.phone,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(address.into())))
}

#[utoipa::path(
    delete,
    path = "/api/users/addresses/{id}",
    params(("id" = Uuid, Path, description = "Address id")),
    responses((status = 204, description = "Address deleted")),
    security(("Bearer" = []))
)]
pub async fn delete_address(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .customers
        .delete_address(&auth_user.uid, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/users/wishlist",
    responses((status = 200, body = ApiResponse<Vec<ProductResponse>>)),
    security(("Bearer" = []))
)]
pub async fn list_wishlist(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<ProductResponse>>>, ServiceError> {
    let products = state.services.customers.list_wishlist(&auth_user.uid).await?;
    Ok(Json(ApiResponse::success(
        products.into_iter().map(ProductResponse::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/users/wishlist",
    request_body = WishlistRequest,
    responses((status = 204, description = "Product added to wishlist")),
    security(("Bearer" = []))
)]
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<WishlistRequest>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .customers
        .add_to_wishlist(&auth_user.uid, request.product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/users/wishlist/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses((status = 204, description = "Product removed from wishlist")),
    security(("Bearer" = []))
)]
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .customers
        .remove_from_wishlist(&auth_user.uid, product_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Register a push-notification device token (deduplicated).
#[utoipa::path(
    post,
    path = "/api/users/device-tokens",
    request_body = DeviceTokenRequest,
    responses((status = 204, description = "Token registered")),
    security(("Bearer" = []))
)]
pub async fn register_device_token(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<DeviceTokenRequest>,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .customers
        .register_device_token(&auth_user.uid, &request.token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
