use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::entities::product;
use crate::errors::ServiceError;
use crate::services::catalog::{NewProduct, ProductFilter, ProductPatch};
use crate::{ApiResponse, AppState, PaginatedResponse};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub category: Option<String>,
    #[serde(default)]
    pub available_only: bool,
    pub search: Option<String>,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Decimal,
    pub discount: Decimal,
    pub stock: i32,
    pub sales_count: i32,
    pub is_available: bool,
    pub average_rating: Decimal,
    pub review_count: i32,
    pub images: Vec<String>,
    pub colors: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        let string_list = |value: &serde_json::Value| -> Vec<String> {
            value
                .as_array()
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default()
        };
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            category: model.category,
            price: model.price,
            discount: model.discount,
            stock: model.stock,
            sales_count: model.sales_count,
            is_available: model.is_available,
            average_rating: model.average_rating,
            review_count: model.review_count,
            images: string_list(&model.images),
            colors: model.colors.as_ref().map(|c| string_list(c)).unwrap_or_default(),
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
    pub price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub stock: i32,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub stock: Option<i32>,
    pub is_available: Option<bool>,
    pub images: Option<Vec<String>>,
    pub colors: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub image: Option<String>,
    pub product_count: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    pub image: Option<String>,
}

/// Browse the catalog.
#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductListQuery),
    responses((status = 200, body = ApiResponse<PaginatedResponse<ProductResponse>>))
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductResponse>>>, ServiceError> {
    let filter = ProductFilter {
        category: query.category,
        available_only: query.available_only,
        search: query.search,
    };
    let (products, total) = state
        .services
        .catalog
        .list_products(filter, query.page, query.limit)
        .await?;
    let total_pages = total.div_ceil(query.limit.max(1));
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: products.into_iter().map(ProductResponse::from).collect(),
        total,
        page: query.page,
        limit: query.limit,
        total_pages,
    })))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let product = state.services.catalog.get_product(id).await?;
    Ok(Json(ApiResponse::success(product.into())))
}

/// Add a product to the catalog (admin).
#[utoipa::path(
    post,
    path = "/api/products",
    request_body = CreateProductRequest,
    responses((status = 201, body = ApiResponse<ProductResponse>)),
    security(("Bearer" = []))
)]
pub async fn create_product(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    auth_user.require_admin()?;
    request.validate()?;
    let product = state
        .services
        .catalog
        .create_product(NewProduct {
            name: request.name,
            description: request.description,
            category: request.category,
            price: request.price,
            discount: request.discount,
            stock: request.stock,
            is_available: request.is_available,
            images: request.images,
            colors: request.colors,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(product.into())),
    ))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    request_body = UpdateProductRequest,
    responses((status = 200, body = ApiResponse<ProductResponse>)),
    security(("Bearer" = []))
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    auth_user.require_admin()?;
    let product = state
        .services
        .catalog
        .update_product(
            id,
            ProductPatch {
                name: request.name,
                description: request.description,
                category: request.category,
                price: request.price,
                discount: request.discount,
                stock: request.stock,
                is_available: request.is_available,
                images: request.images,
                colors: request.colors,
            },
        )
        .await?;
    Ok(Json(ApiResponse::success(product.into())))
}

#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    params(("id" = Uuid, Path, description = "Product id")),
    responses((status = 204, description = "Product deleted")),
    security(("Bearer" = []))
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    auth_user.require_admin()?;
    state.services.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Categories with product counts recomputed per request.
#[utoipa::path(
    get,
    path = "/api/categories",
    responses((status = 200, body = ApiResponse<Vec<CategoryResponse>>))
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<CategoryResponse>>>, ServiceError> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(Json(ApiResponse::success(
        categories
            .into_iter()
            .map(|(c, product_count)| CategoryResponse {
                id: c.id,
                name: c.name,
                image: c.image,
                product_count,
            })
            .collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/categories",
    request_body = CreateCategoryRequest,
    responses((status = 201, body = ApiResponse<CategoryResponse>)),
    security(("Bearer" = []))
)]
pub async fn create_category(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CategoryResponse>>), ServiceError> {
    auth_user.require_admin()?;
    request.validate()?;
    let category = state
        .services
        .catalog
        .create_category(request.name, request.image)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CategoryResponse {
            id: category.id,
            name: category.name,
            image: category.image,
            product_count: 0,
        })),
    ))
}
