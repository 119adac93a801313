use std::sync::Arc;

use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{
    customer::{self, Entity as Customer},
    order::{self, Entity as Order, OrderStatus, PaymentMethod, PaymentStatus, ShippingAddress},
    order_item::{self, Entity as OrderItem},
    product::Entity as Product,
    wishlist_item::{self, Entity as WishlistItem},
};
use crate::errors::ServiceError;
use crate::events::{outbox, Event};
use crate::services::catalog;
use crate::services::coupons::{self, CouponService};

lazy_static! {
    static ref ORDER_CREATIONS: IntCounter =
        IntCounter::new("order_creations_total", "Total number of orders created")
            .expect("metric can be created");
    static ref ORDER_CREATION_FAILURES: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "order_creation_failures_total",
            "Total number of failed order creations"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref ORDER_CANCELLATIONS: IntCounter = IntCounter::new(
        "order_cancellations_total",
        "Total number of order cancellations"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub selected_color: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayPaymentInfo {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
}

/// Checkout payload after handler-level validation. Client-claimed amounts
/// are verified against the catalog and coupon rules, never trusted.
#[derive(Debug)]
pub struct CreateOrderInput {
    pub items: Vec<OrderItemInput>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    pub claimed_total: Decimal,
    pub claimed_discount: Decimal,
    pub delivery_fee: Decimal,
    pub gateway_payment: Option<GatewayPaymentInfo>,
}

/// Order workflow: creation with stock reservation, status transitions, and
/// cancellation. Every stock-affecting step shares one transaction with the
/// order write and its outbox events.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    coupons: Arc<CouponService>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, coupons: Arc<CouponService>) -> Self {
        Self { db, coupons }
    }

    #[instrument(skip(self, input), fields(customer_uid = %customer_uid, items = input.items.len()))]
    pub async fn create_order(
        &self,
        customer_uid: &str,
        input: CreateOrderInput,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        self.validate_input(&input).inspect_err(|_| {
            ORDER_CREATION_FAILURES
                .with_label_values(&["validation"])
                .inc();
        })?;

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = format!("ORD-{}", &order_id.to_string()[..8].to_uppercase());

        // Reserve stock and snapshot catalog data per line. A conditional
        // decrement losing the race aborts the whole transaction.
        let mut subtotal = Decimal::ZERO;
        let mut snapshots = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let product = Product::find_by_id(item.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;
            if !product.is_available {
                return Err(ServiceError::ValidationError(format!(
                    "product {} is not available",
                    product.name
                )));
            }

            catalog::reserve_stock(&txn, product.id, item.quantity)
                .await
                .inspect_err(|_| {
                    ORDER_CREATION_FAILURES
                        .with_label_values(&["out_of_stock"])
                        .inc();
                })?;
            catalog::increment_sales(&txn, product.id, item.quantity).await?;

            subtotal += product.price * Decimal::from(item.quantity);
            let image = product
                .images
                .as_array()
                .and_then(|a| a.first())
                .and_then(|v| v.as_str())
                .map(str::to_string);
            snapshots.push((product, image));
        }

        // Recompute the money line server-side; a client-supplied total is a
        // claim, not an instruction.
        let discount = match &input.coupon_code {
            Some(code) => {
                let coupon = self.coupons.validate_on(&txn, code, subtotal).await?;
                coupons::compute_discount(&coupon, subtotal)
            }
            None => Decimal::ZERO,
        };
        if input.claimed_discount.round_dp(2) != discount.round_dp(2) {
            ORDER_CREATION_FAILURES
                .with_label_values(&["amount_mismatch"])
                .inc();
            return Err(ServiceError::AmountMismatch(format!(
                "claimed discount {} does not match computed discount {}",
                input.claimed_discount, discount
            )));
        }
        let expected_total = (subtotal - discount + input.delivery_fee).round_dp(2);
        if input.claimed_total.round_dp(2) != expected_total {
            ORDER_CREATION_FAILURES
                .with_label_values(&["amount_mismatch"])
                .inc();
            return Err(ServiceError::AmountMismatch(format!(
                "claimed total {} does not match computed total {}",
                input.claimed_total, expected_total
            )));
        }

        let payment_status = match input.payment_method {
            PaymentMethod::Razorpay => PaymentStatus::Paid,
            PaymentMethod::Cod => PaymentStatus::Pending,
        };

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_uid: Set(customer_uid.to_string()),
            status: Set(OrderStatus::Pending),
            total_amount: Set(expected_total),
            discount: Set(discount),
            delivery_fee: Set(input.delivery_fee),
            coupon_code: Set(input.coupon_code.clone().map(|c| c.to_uppercase())),
            shipping_address: Set(serde_json::to_value(&input.shipping_address)?),
            payment_method: Set(input.payment_method),
            payment_status: Set(payment_status),
            gateway_order_id: Set(input
                .gateway_payment
                .as_ref()
                .map(|p| p.gateway_order_id.clone())),
            gateway_payment_id: Set(input
                .gateway_payment
                .as_ref()
                .map(|p| p.gateway_payment_id.clone())),
            delivered_at: Set(None),
            return_reason: Set(None),
            return_requested_at: Set(None),
            return_items: Set(None),
            request_type: Set(None),
            return_processed_at: Set(None),
            return_rejected_at: Set(None),
            return_rejection_reason: Set(None),
            refund_amount: Set(None),
            refund_status: Set(None),
            refunded_at: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(input.items.len());
        for (item, (product, image)) in input.items.iter().zip(snapshots) {
            let line = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                name: Set(product.name.clone()),
                image: Set(image),
                quantity: Set(item.quantity),
                unit_price: Set(product.price),
                selected_color: Set(item.selected_color.clone()),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(line);
        }

        // Ordered products leave the buyer's wishlist in the same transaction.
        let ordered_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        WishlistItem::delete_many()
            .filter(wishlist_item::Column::CustomerUid.eq(customer_uid))
            .filter(wishlist_item::Column::ProductId.is_in(ordered_ids))
            .exec(&txn)
            .await?;

        outbox::enqueue(
            &txn,
            &Event::OrderCreated {
                order_id,
                order_number: order_number.clone(),
                customer_uid: customer_uid.to_string(),
                total_amount: expected_total,
            },
        )
        .await?;

        txn.commit().await?;
        ORDER_CREATIONS.inc();
        info!(order_id = %order_id, order_number = %order_number, total = %expected_total, "order created");
        Ok((order_model, items))
    }

    fn validate_input(&self, input: &CreateOrderInput) -> Result<(), ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one item".into(),
            ));
        }
        if input.items.iter().any(|i| i.quantity < 1) {
            return Err(ServiceError::ValidationError(
                "item quantity must be at least 1".into(),
            ));
        }
        let addr = &input.shipping_address;
        if addr.full_address.trim().is_empty()
            || addr.city.trim().is_empty()
            || addr.pincode.trim().is_empty()
        {
            return Err(ServiceError::ValidationError(
                "shipping address is incomplete".into(),
            ));
        }
        if input.delivery_fee < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "delivery fee cannot be negative".into(),
            ));
        }
        if input.payment_method == PaymentMethod::Razorpay && input.gateway_payment.is_none() {
            return Err(ServiceError::ValidationError(
                "gateway payment details are required for prepaid orders".into(),
            ));
        }
        Ok(())
    }

    pub async fn get_order_model(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub async fn get_order(
        &self,
        order_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let order = self.get_order_model(order_id).await?;
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;
        Ok((order, items))
    }

    /// Items for a page of orders in one batched query, grouped by order.
    pub async fn items_for_orders(
        &self,
        order_ids: Vec<Uuid>,
    ) -> Result<std::collections::HashMap<Uuid, Vec<order_item::Model>>, ServiceError> {
        let mut grouped: std::collections::HashMap<Uuid, Vec<order_item::Model>> =
            std::collections::HashMap::new();
        if order_ids.is_empty() {
            return Ok(grouped);
        }
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.is_in(order_ids))
            .all(&*self.db)
            .await?;
        for item in items {
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    /// A customer's own orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_customer(
        &self,
        customer_uid: &str,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<order::Model>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::CustomerUid.eq(customer_uid))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Admin listing with the customer record joined in one batched lookup.
    #[instrument(skip(self))]
    pub async fn list_all(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<(order::Model, Option<customer::Model>)>, u64), ServiceError> {
        let paginator = Order::find()
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((self.join_customers(orders).await?, total))
    }

    /// Orders still moving toward delivery, for the delivery dashboard.
    #[instrument(skip(self))]
    pub async fn list_active(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<(order::Model, Option<customer::Model>)>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::Status.is_in([
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::OutForDelivery,
            ]))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((self.join_customers(orders).await?, total))
    }

    async fn join_customers(
        &self,
        orders: Vec<order::Model>,
    ) -> Result<Vec<(order::Model, Option<customer::Model>)>, ServiceError> {
        let uids: Vec<String> = orders.iter().map(|o| o.customer_uid.clone()).collect();
        let customers = if uids.is_empty() {
            Vec::new()
        } else {
            Customer::find()
                .filter(customer::Column::Uid.is_in(uids))
                .all(&*self.db)
                .await?
        };
        Ok(orders
            .into_iter()
            .map(|o| {
                let customer = customers.iter().find(|c| c.uid == o.customer_uid).cloned();
                (o, customer)
            })
            .collect())
    }

    /// Moves an order along the lifecycle. A same-status request is a no-op;
    /// reaching `Delivered` stamps `delivered_at` and settles COD payment.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        if old_status == new_status {
            return Ok(order);
        }
        if !is_valid_transition(old_status, new_status) {
            return Err(ServiceError::InvalidTransition {
                from: old_status.to_string(),
                to: new_status.to_string(),
            });
        }

        let order_number = order.order_number.clone();
        let customer_uid = order.customer_uid.clone();
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        if new_status == OrderStatus::Delivered {
            active.delivered_at = Set(Some(Utc::now()));
            active.payment_status = Set(PaymentStatus::Paid);
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            &Event::OrderStatusChanged {
                order_id,
                order_number,
                customer_uid,
                old_status,
                new_status,
            },
        )
        .await?;
        txn.commit().await?;

        info!(order_id = %order_id, from = %old_status, to = %new_status, "order status updated");
        Ok(updated)
    }

    /// Cancels an order still in `Pending`/`Processing`: restores stock and
    /// walks the sales counters back (floored at zero).
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.is_cancellable() {
            warn!(order_id = %order_id, status = %order.status, "cancellation rejected");
            return Err(ServiceError::InvalidTransition {
                from: order.status.to_string(),
                to: OrderStatus::Cancelled.to_string(),
            });
        }

        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;
        for item in &items {
            catalog::restore_stock(&txn, item.product_id, item.quantity).await?;
            catalog::decrement_sales_floor(&txn, item.product_id, item.quantity).await?;
        }

        let order_number = order.order_number.clone();
        let customer_uid = order.customer_uid.clone();
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            &Event::OrderCancelled {
                order_id,
                order_number,
                customer_uid,
            },
        )
        .await?;
        txn.commit().await?;

        ORDER_CANCELLATIONS.inc();
        info!(order_id = %order_id, "order cancelled");
        Ok(updated)
    }
}

/// Forward-progress transition table. Cancellation is reachable only from
/// the pre-shipment states; the return workflow owns the post-delivery
/// branches.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Shipped)
            | (Pending, OutForDelivery)
            | (Pending, Delivered)
            | (Pending, Cancelled)
            | (Processing, Shipped)
            | (Processing, OutForDelivery)
            | (Processing, Delivered)
            | (Processing, Cancelled)
            | (Shipped, OutForDelivery)
            | (Shipped, Delivered)
            | (OutForDelivery, Delivered)
    )
}
