use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::notifications::Notification;
use crate::{ApiResponse, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// The caller's persisted notification feed, newest first.
#[utoipa::path(
    get,
    path = "/api/notifications",
    params(FeedQuery),
    responses((status = 200, description = "Feed entries")),
    security(("Bearer" = []))
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<Notification>>>, ServiceError> {
    let notifications = state
        .services
        .feed
        .list(&auth_user.uid, query.limit.min(200))
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(ApiResponse::success(notifications)))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{id}/read",
    params(("id" = Uuid, Path, description = "Notification id")),
    responses((status = 204, description = "Marked read")),
    security(("Bearer" = []))
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    _auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    state
        .services
        .feed
        .mark_read(id)
        .await
        .map_err(ServiceError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
