use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::{
    order::{self, Entity as Order, OrderStatus, RefundStatus, RequestType},
    order_item::{self, Entity as OrderItem},
};
use crate::errors::ServiceError;
use crate::events::{outbox, Event};
use crate::services::catalog;

/// Return/replacement workflow: request within the delivery window, admin
/// approval or rejection, refund-status tracking.
#[derive(Clone)]
pub struct ReturnService {
    db: Arc<DatabaseConnection>,
    return_window_days: i64,
    replacement_restocks_stock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug)]
pub struct ProcessReturnInput {
    pub approve: bool,
    pub refund_amount: Option<Decimal>,
    pub rejection_reason: Option<String>,
}

impl ReturnService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        return_window_days: i64,
        replacement_restocks_stock: bool,
    ) -> Self {
        Self {
            db,
            return_window_days,
            replacement_restocks_stock,
        }
    }

    /// Records a return or replacement request on a delivered order. The
    /// window is measured from the explicit delivery stamp.
    #[instrument(skip(self, reason, items), fields(order_id = %order_id, request_type = %request_type))]
    pub async fn request_return(
        &self,
        order_id: Uuid,
        reason: String,
        items: Option<Vec<ReturnItemInput>>,
        request_type: RequestType,
    ) -> Result<order::Model, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "a reason is required for return requests".into(),
            ));
        }

        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;

        if order.status != OrderStatus::Delivered {
            return Err(ServiceError::InvalidTransition {
                from: order.status.to_string(),
                to: target_status(request_type).to_string(),
            });
        }

        let delivered_at = order
            .delivered_at
            .or(order.updated_at)
            .unwrap_or(order.created_at);
        let window = Duration::days(self.return_window_days);
        if Utc::now() - delivered_at > window {
            return Err(ServiceError::ReturnWindowExpired(format!(
                "the {}-day return window for order {} has passed",
                self.return_window_days, order.order_number
            )));
        }

        let order_number = order.order_number.clone();
        let customer_uid = order.customer_uid.clone();
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.status = Set(target_status(request_type));
        active.return_reason = Set(Some(reason));
        active.return_requested_at = Set(Some(Utc::now()));
        active.return_items = Set(items
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?);
        active.request_type = Set(Some(request_type));
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            &Event::ReturnRequested {
                order_id,
                order_number,
                customer_uid,
                request_type,
            },
        )
        .await?;
        txn.commit().await?;

        info!(order_id = %order_id, "return requested");
        Ok(updated)
    }

    /// Admin decision on a pending request. Approving a return restores
    /// stock and sets the refund amount (full total unless specified);
    /// approving a replacement re-enters `Processing`, with stock handling
    /// governed by policy; rejecting restores `Delivered`.
    #[instrument(skip(self, input), fields(order_id = %order_id, approve = input.approve))]
    pub async fn process_return(
        &self,
        order_id: Uuid,
        input: ProcessReturnInput,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;

        let request_type = match (order.status, order.request_type) {
            (OrderStatus::ReturnRequested, _) => RequestType::Return,
            (OrderStatus::ReplacementRequested, _) => RequestType::Replacement,
            (status, _) => {
                return Err(ServiceError::InvalidTransition {
                    from: status.to_string(),
                    to: "processed request".to_string(),
                })
            }
        };

        let order_number = order.order_number.clone();
        let customer_uid = order.customer_uid.clone();
        let total_amount = order.total_amount;
        let return_items = order.return_items.clone();
        let version = order.version;
        let mut active: order::ActiveModel = order.into();

        if input.approve {
            match request_type {
                RequestType::Return => {
                    self.restore_requested_stock(&txn, order_id, &return_items)
                        .await?;
                    active.status = Set(OrderStatus::Returned);
                    active.refund_amount = Set(Some(input.refund_amount.unwrap_or(total_amount)));
                    active.refund_status = Set(Some(RefundStatus::Pending));
                }
                RequestType::Replacement => {
                    // Default policy treats replacement as a swap with no
                    // net stock change; the restock variant is config-gated.
                    if self.replacement_restocks_stock {
                        self.restore_requested_stock(&txn, order_id, &return_items)
                            .await?;
                    }
                    active.status = Set(OrderStatus::Processing);
                }
            }
            active.return_processed_at = Set(Some(Utc::now()));
        } else {
            active.status = Set(OrderStatus::Delivered);
            active.return_rejected_at = Set(Some(Utc::now()));
            active.return_rejection_reason = Set(input.rejection_reason);
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            &Event::ReturnProcessed {
                order_id,
                order_number,
                customer_uid,
                request_type,
                approved: input.approve,
            },
        )
        .await?;
        txn.commit().await?;

        info!(order_id = %order_id, approved = input.approve, "return request processed");
        Ok(updated)
    }

    /// Restores stock for the requested items, falling back to every line of
    /// the order when the request did not itemize. Sales counters are left
    /// untouched on returns.
    async fn restore_requested_stock(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
        return_items: &Option<serde_json::Value>,
    ) -> Result<(), ServiceError> {
        let requested: Vec<ReturnItemInput> = match return_items {
            Some(value) => serde_json::from_value(value.clone())?,
            None => Vec::new(),
        };
        if requested.is_empty() {
            let lines = OrderItem::find()
                .filter(order_item::Column::OrderId.eq(order_id))
                .all(txn)
                .await?;
            for line in lines {
                catalog::restore_stock(txn, line.product_id, line.quantity).await?;
            }
        } else {
            for item in requested {
                catalog::restore_stock(txn, item.product_id, item.quantity).await?;
            }
        }
        Ok(())
    }

    /// Refund tracking for cancelled/returned orders. `completed` stamps the
    /// refund time; the lifecycle status itself never changes here.
    #[instrument(skip(self), fields(order_id = %order_id, refund_status = %refund_status))]
    pub async fn update_refund_status(
        &self,
        order_id: Uuid,
        refund_status: RefundStatus,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order = find_order(&txn, order_id).await?;

        if !matches!(
            order.status,
            OrderStatus::Cancelled | OrderStatus::Returned
        ) {
            return Err(ServiceError::ValidationError(format!(
                "refund status applies only to cancelled or returned orders, not {}",
                order.status
            )));
        }

        let order_number = order.order_number.clone();
        let customer_uid = order.customer_uid.clone();
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.refund_status = Set(Some(refund_status));
        if refund_status == RefundStatus::Completed {
            active.refunded_at = Set(Some(Utc::now()));
        }
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            &Event::RefundStatusChanged {
                order_id,
                order_number,
                customer_uid,
                refund_status,
            },
        )
        .await?;
        txn.commit().await?;
        Ok(updated)
    }
}

fn target_status(request_type: RequestType) -> OrderStatus {
    match request_type {
        RequestType::Return => OrderStatus::ReturnRequested,
        RequestType::Replacement => OrderStatus::ReplacementRequested,
    }
}

async fn find_order(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    Order::find_by_id(order_id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}
