use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::{self, Entity as Order, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{outbox, Event};
use crate::services::orders::{CreateOrderInput, OrderService};

type HmacSha256 = Hmac<Sha256>;

/// Order intent returned by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub status: String,
}

/// External payment processor seam. The hosted checkout flow and refund API
/// live behind this trait; tests substitute a recording fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError>;

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount_minor: i64,
    ) -> Result<GatewayRefund, ServiceError>;
}

/// Razorpay REST client using basic auth over the key pair.
pub struct RazorpayClient {
    http: reqwest::Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

impl RazorpayClient {
    pub fn new(key_id: String, key_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            key_id,
            key_secret,
            base_url: "https://api.razorpay.com/v1".to_string(),
        }
    }

    fn auth_header(&self) -> String {
        let raw = format!("{}:{}", self.key_id, self.key_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, ServiceError> {
        let body = serde_json::json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": receipt,
            "payment_capture": 1,
        });
        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("order creation failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ServiceError::GatewayError(format!(
                "order creation returned {}",
                response.status()
            )));
        }
        response
            .json::<GatewayOrder>()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("unreadable gateway response: {}", e)))
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        amount_minor: i64,
    ) -> Result<GatewayRefund, ServiceError> {
        let body = serde_json::json!({ "amount": amount_minor });
        let response = self
            .http
            .post(format!("{}/payments/{}/refund", self.base_url, payment_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("refund failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ServiceError::GatewayError(format!(
                "refund returned {}",
                response.status()
            )));
        }
        response
            .json::<GatewayRefund>()
            .await
            .map_err(|e| ServiceError::GatewayError(format!("unreadable gateway response: {}", e)))
    }
}

/// Signs `"{order_id}|{payment_id}"` the way the gateway does.
pub fn sign_payload(key_secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(key_secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of a hosted-checkout callback signature.
pub fn verify_signature(
    key_secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(provided) = hex::decode(signature) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(key_secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct GatewayOrderIntent {
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// Payment flows: gateway order intents, callback verification feeding order
/// creation, COD placement, and admin refunds.
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    orders: Arc<OrderService>,
    key_id: String,
    key_secret: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        orders: Arc<OrderService>,
        key_id: String,
        key_secret: String,
    ) -> Self {
        Self {
            db,
            gateway,
            orders,
            key_id,
            key_secret,
        }
    }

    /// Creates a gateway order intent for the hosted checkout.
    #[instrument(skip(self))]
    pub async fn create_gateway_order(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<GatewayOrderIntent, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "amount must be positive".into(),
            ));
        }
        let amount_minor = (amount * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| ServiceError::ValidationError("amount out of range".into()))?;
        let receipt = format!("rcpt_{}", Uuid::new_v4().simple());
        let gateway_order = self
            .gateway
            .create_order(amount_minor, currency, &receipt)
            .await?;
        Ok(GatewayOrderIntent {
            gateway_order_id: gateway_order.id,
            amount: gateway_order.amount,
            currency: gateway_order.currency,
            key_id: self.key_id.clone(),
        })
    }

    /// Verifies the checkout callback signature, then places the order
    /// exactly as the direct path does. A bad signature creates nothing.
    #[instrument(skip(self, input, signature), fields(customer_uid = %customer_uid))]
    pub async fn verify_and_place_order(
        &self,
        customer_uid: &str,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
        input: CreateOrderInput,
    ) -> Result<(order::Model, Vec<crate::entities::order_item::Model>), ServiceError> {
        if !verify_signature(
            &self.key_secret,
            gateway_order_id,
            gateway_payment_id,
            signature,
        ) {
            warn!(gateway_order_id, "payment signature mismatch");
            return Err(ServiceError::PaymentVerificationFailed);
        }
        self.orders.create_order(customer_uid, input).await
    }

    /// Full refund of a gateway-paid order. COD and already-refunded orders
    /// are rejected; success flips `payment_status` only.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn refund_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_method != PaymentMethod::Razorpay {
            return Err(ServiceError::ValidationError(
                "only gateway-paid orders can be refunded here".into(),
            ));
        }
        if order.payment_status == PaymentStatus::Refunded {
            return Err(ServiceError::ValidationError(
                "order is already refunded".into(),
            ));
        }
        let payment_id = order.gateway_payment_id.clone().ok_or_else(|| {
            ServiceError::ValidationError("order has no gateway payment to refund".into())
        })?;

        let amount_minor = (order.total_amount * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| ServiceError::Internal("refund amount out of range".into()))?;
        let refund = self.gateway.refund_payment(&payment_id, amount_minor).await?;
        info!(order_id = %order_id, refund_id = %refund.id, "gateway refund initiated");

        let txn = self.db.begin().await?;
        let order_number = order.order_number.clone();
        let customer_uid = order.customer_uid.clone();
        let total_amount = order.total_amount;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.payment_status = Set(PaymentStatus::Refunded);
        active.refund_amount = Set(Some(total_amount));
        active.updated_at = Set(Some(chrono::Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            &Event::PaymentRefunded {
                order_id,
                order_number,
                customer_uid,
                amount: total_amount,
            },
        )
        .await?;
        txn.commit().await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test_gateway_secret";

    #[test]
    fn signature_round_trip() {
        let sig = sign_payload(SECRET, "order_abc", "pay_xyz");
        assert!(verify_signature(SECRET, "order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let sig = sign_payload(SECRET, "order_abc", "pay_xyz");
        assert!(!verify_signature(SECRET, "order_abc", "pay_other", &sig));
        assert!(!verify_signature(SECRET, "order_other", "pay_xyz", &sig));
        assert!(!verify_signature("wrong_secret", "order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn malformed_signature_fails_closed() {
        assert!(!verify_signature(SECRET, "order_abc", "pay_xyz", "not-hex"));
        assert!(!verify_signature(SECRET, "order_abc", "pay_xyz", ""));
    }
}
