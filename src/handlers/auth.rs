use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::issue_token;
use crate::entities::customer::Role;
use crate::errors::ServiceError;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct MintTokenRequest {
    pub uid: String,
    #[serde(default)]
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MintTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Development-only token mint for tooling and local storefronts. Disabled
/// in production, where the external identity provider issues tokens.
#[utoipa::path(
    post,
    path = "/api/auth/token",
    request_body = MintTokenRequest,
    responses(
        (status = 200, body = ApiResponse<MintTokenResponse>),
        (status = 403, description = "Disabled in production", body = crate::errors::ErrorResponse),
    )
)]
pub async fn mint_token(
    State(state): State<AppState>,
    Json(request): Json<MintTokenRequest>,
) -> Result<Json<ApiResponse<MintTokenResponse>>, ServiceError> {
    if state.config.is_production() {
        return Err(ServiceError::Forbidden(
            "token mint is disabled in production".into(),
        ));
    }
    let access_token = issue_token(
        &state.config.jwt_secret,
        &request.uid,
        request.role,
        request.name,
        request.email,
        state.config.jwt_expiration,
    )?;
    Ok(Json(ApiResponse::success(MintTokenResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiration,
    })))
}
