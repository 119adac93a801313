use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Machine-readable error code for client handling
    #[schema(example = "OUT_OF_STOCK")]
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    #[error("Coupon expired: {0}")]
    CouponExpired(String),

    #[error("Order total below coupon minimum: {0}")]
    MinOrderNotMet(String),

    #[error("Return window expired: {0}")]
    ReturnWindowExpired(String),

    #[error("Payment verification failed")]
    PaymentVerificationFailed,

    #[error("Order amount mismatch: {0}")]
    AmountMismatch(String),

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("serialization error: {}", err))
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidCoupon(_)
            | Self::CouponExpired(_)
            | Self::MinOrderNotMet(_)
            | Self::ReturnWindowExpired(_)
            | Self::PaymentVerificationFailed
            | Self::AmountMismatch(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable machine-readable code carried in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InsufficientStock(_) => "OUT_OF_STOCK",
            Self::InvalidCoupon(_) => "INVALID_COUPON",
            Self::CouponExpired(_) => "COUPON_EXPIRED",
            Self::MinOrderNotMet(_) => "MIN_ORDER_NOT_MET",
            Self::ReturnWindowExpired(_) => "RETURN_WINDOW_EXPIRED",
            Self::PaymentVerificationFailed => "PAYMENT_VERIFICATION_FAILED",
            Self::AmountMismatch(_) => "AMOUNT_MISMATCH",
            Self::GatewayError(_) => "GATEWAY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message suitable for HTTP responses. Internal errors render a generic
    /// message; the detail goes to the log only.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            Self::GatewayError(_) => "Payment gateway unavailable".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Forbidden("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::PaymentVerificationFailed.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::GatewayError("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn machine_codes_are_stable() {
        assert_eq!(ServiceError::InsufficientStock("x".into()).code(), "OUT_OF_STOCK");
        assert_eq!(
            ServiceError::InvalidTransition {
                from: "Shipped".into(),
                to: "Cancelled".into()
            }
            .code(),
            "INVALID_TRANSITION"
        );
        assert_eq!(
            ServiceError::PaymentVerificationFailed.code(),
            "PAYMENT_VERIFICATION_FAILED"
        );
        assert_eq!(
            ServiceError::ReturnWindowExpired("x".into()).code(),
            "RETURN_WINDOW_EXPIRED"
        );
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = ServiceError::Internal("secret detail".into());
        assert_eq!(err.response_message(), "Internal server error");

        let err = ServiceError::NotFound("Order abc not found".into());
        assert_eq!(err.response_message(), "Not found: Order abc not found");
    }
}
