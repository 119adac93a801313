use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::order::{OrderStatus, RefundStatus, RequestType};

pub mod outbox;

/// Domain events emitted by the order workflow. Every event is written to the
/// outbox inside the transaction that produced it and fanned out to the
/// notification channels by the dispatch worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        customer_uid: String,
        total_amount: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        order_number: String,
        customer_uid: String,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled {
        order_id: Uuid,
        order_number: String,
        customer_uid: String,
    },
    ReturnRequested {
        order_id: Uuid,
        order_number: String,
        customer_uid: String,
        request_type: RequestType,
    },
    ReturnProcessed {
        order_id: Uuid,
        order_number: String,
        customer_uid: String,
        request_type: RequestType,
        approved: bool,
    },
    RefundStatusChanged {
        order_id: Uuid,
        order_number: String,
        customer_uid: String,
        refund_status: RefundStatus,
    },
    PaymentRefunded {
        order_id: Uuid,
        order_number: String,
        customer_uid: String,
        amount: Decimal,
    },
}

impl Event {
    /// Stable event-type tag stored in the outbox row.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order.created",
            Event::OrderStatusChanged { .. } => "order.status_changed",
            Event::OrderCancelled { .. } => "order.cancelled",
            Event::ReturnRequested { .. } => "order.return_requested",
            Event::ReturnProcessed { .. } => "order.return_processed",
            Event::RefundStatusChanged { .. } => "order.refund_status_changed",
            Event::PaymentRefunded { .. } => "order.payment_refunded",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::OrderCancelled { order_id, .. }
            | Event::ReturnRequested { order_id, .. }
            | Event::ReturnProcessed { order_id, .. }
            | Event::RefundStatusChanged { order_id, .. }
            | Event::PaymentRefunded { order_id, .. } => *order_id,
        }
    }

    pub fn customer_uid(&self) -> &str {
        match self {
            Event::OrderCreated { customer_uid, .. }
            | Event::OrderStatusChanged { customer_uid, .. }
            | Event::OrderCancelled { customer_uid, .. }
            | Event::ReturnRequested { customer_uid, .. }
            | Event::ReturnProcessed { customer_uid, .. }
            | Event::RefundStatusChanged { customer_uid, .. }
            | Event::PaymentRefunded { customer_uid, .. } => customer_uid,
        }
    }

    pub fn order_number(&self) -> &str {
        match self {
            Event::OrderCreated { order_number, .. }
            | Event::OrderStatusChanged { order_number, .. }
            | Event::OrderCancelled { order_number, .. }
            | Event::ReturnRequested { order_number, .. }
            | Event::ReturnProcessed { order_number, .. }
            | Event::RefundStatusChanged { order_number, .. }
            | Event::PaymentRefunded { order_number, .. } => order_number,
        }
    }
}
