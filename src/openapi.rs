//! OpenAPI document assembly. Served as JSON from `/api/openapi.json`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vastra API",
        description = "Storefront backend: catalog, coupons, checkout, order lifecycle with returns and refunds, notifications"
    ),
    modifiers(&SecurityAddon),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::my_orders,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::delivery_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_status,
        crate::handlers::orders::cancel_order,
        crate::handlers::returns::request_return,
        crate::handlers::returns::process_return,
        crate::handlers::returns::update_refund_status,
        crate::handlers::payments::create_gateway_order,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::cod_order,
        crate::handlers::payments::refund_order,
        crate::handlers::coupons::validate_coupon,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::set_coupon_active,
        crate::handlers::coupons::delete_coupon,
        crate::handlers::products::list_products,
        crate::handlers::products::get_product,
        crate::handlers::products::create_product,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,
        crate::handlers::products::list_categories,
        crate::handlers::products::create_category,
        crate::handlers::customers::sync_profile,
        crate::handlers::customers::list_addresses,
        crate::handlers::customers::add_address,
        crate::handlers::customers::update_address,
        crate::handlers::customers::delete_address,
        crate::handlers::customers::list_wishlist,
        crate::handlers::customers::add_to_wishlist,
        crate::handlers::customers::remove_from_wishlist,
        crate::handlers::customers::register_device_token,
        crate::handlers::notifications::list_notifications,
        crate::handlers::notifications::mark_notification_read,
        crate::handlers::auth::mint_token,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::entities::order::PaymentMethod,
        crate::entities::order::PaymentStatus,
        crate::entities::order::RefundStatus,
        crate::entities::order::RequestType,
        crate::entities::order::ShippingAddress,
        crate::entities::coupon::DiscountType,
        crate::entities::customer::Role,
        crate::handlers::orders::CreateOrderRequest,
        crate::handlers::orders::OrderItemRequest,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::OrderItemResponse,
        crate::handlers::orders::UpdateStatusRequest,
        crate::handlers::orders::ReturnRequestBody,
        crate::handlers::orders::ReturnItemRequest,
        crate::handlers::orders::ProcessReturnRequest,
        crate::handlers::orders::UpdateRefundStatusRequest,
        crate::handlers::payments::CreateGatewayOrderRequest,
        crate::handlers::payments::VerifyPaymentRequest,
        crate::handlers::payments::RefundResponse,
        crate::handlers::coupons::ValidateCouponRequest,
        crate::handlers::coupons::ValidateCouponResponse,
        crate::handlers::coupons::CouponResponse,
        crate::handlers::coupons::CreateCouponRequest,
        crate::handlers::coupons::SetCouponActiveRequest,
        crate::handlers::products::ProductResponse,
        crate::handlers::products::CreateProductRequest,
        crate::handlers::products::UpdateProductRequest,
        crate::handlers::products::CategoryResponse,
        crate::handlers::products::CreateCategoryRequest,
        crate::handlers::customers::SyncProfileRequest,
        crate::handlers::customers::CustomerResponse,
        crate::handlers::customers::AddressRequest,
        crate::handlers::customers::AddressResponse,
        crate::handlers::customers::WishlistRequest,
        crate::handlers::customers::DeviceTokenRequest,
        crate::handlers::auth::MintTokenRequest,
        crate::handlers::auth::MintTokenResponse,
    ))
)]
pub struct ApiDoc;

pub fn api_doc() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
