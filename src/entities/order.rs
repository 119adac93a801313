use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Order header. Item snapshots live in `order_items`; `status` and
/// `payment_status` are orthogonal axes (delivery progress vs. settlement).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_uid: String,
    pub status: OrderStatus,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub discount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub delivery_fee: Decimal,
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub shipping_address: Json,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[sea_orm(nullable)]
    pub gateway_order_id: Option<String>,
    #[sea_orm(nullable)]
    pub gateway_payment_id: Option<String>,
    #[sea_orm(nullable)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub return_reason: Option<String>,
    #[sea_orm(nullable)]
    pub return_requested_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Json", nullable)]
    pub return_items: Option<Json>,
    #[sea_orm(nullable)]
    pub request_type: Option<RequestType>,
    #[sea_orm(nullable)]
    pub return_processed_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub return_rejected_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub return_rejection_reason: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub refund_amount: Option<Decimal>,
    #[sea_orm(nullable)]
    pub refund_status: Option<RefundStatus>,
    #[sea_orm(nullable)]
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[sea_orm(nullable)]
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle state of an order. Transition rules live in the order service.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum OrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Processing")]
    Processing,
    #[sea_orm(string_value = "Shipped")]
    Shipped,
    #[sea_orm(string_value = "Out for Delivery")]
    #[serde(rename = "Out for Delivery")]
    #[strum(serialize = "Out for Delivery")]
    OutForDelivery,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
    #[sea_orm(string_value = "Return Requested")]
    #[serde(rename = "Return Requested")]
    #[strum(serialize = "Return Requested")]
    ReturnRequested,
    #[sea_orm(string_value = "Replacement Requested")]
    #[serde(rename = "Replacement Requested")]
    #[strum(serialize = "Replacement Requested")]
    ReplacementRequested,
    #[sea_orm(string_value = "Returned")]
    Returned,
}

impl OrderStatus {
    /// States a cancellation is still allowed from.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// States that end the lifecycle unless a return is later requested.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Returned | OrderStatus::Delivered
        )
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "COD")]
    #[serde(rename = "COD")]
    #[strum(serialize = "COD")]
    Cod,
    #[sea_orm(string_value = "Razorpay")]
    Razorpay,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefundStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestType {
    #[sea_orm(string_value = "return")]
    Return,
    #[sea_orm(string_value = "replacement")]
    Replacement,
}

/// Shipping destination embedded in the order as a JSON value object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub label: String,
    pub full_address: String,
    pub city: String,
    pub pincode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}
