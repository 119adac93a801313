//! Transactional outbox: the workflow enqueues events in the same transaction
//! as the state change; a background worker claims pending rows and hands
//! them to the notification fan-out with bounded retry and exponential
//! backoff. Business-state correctness never depends on delivery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::entities::outbox_event::{self, Entity as OutboxEvent, OutboxStatus};
use crate::errors::ServiceError;
use crate::events::Event;

const BASE_BACKOFF_SECS: i64 = 2;

/// Receives drained events. Implemented by the notification fan-out; tests
/// substitute recording dispatchers.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, event: &Event) -> Result<(), ServiceError>;
}

/// Enqueues a domain event. Call with the transaction of the write that
/// produced the event.
pub async fn enqueue<C: ConnectionTrait>(conn: &C, event: &Event) -> Result<(), ServiceError> {
    let row = outbox_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        aggregate_type: Set("order".to_string()),
        aggregate_id: Set(Some(event.order_id())),
        event_type: Set(event.kind().to_string()),
        payload: Set(serde_json::to_value(event)?),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(Utc::now()),
        last_error: Set(None),
        created_at: Set(Utc::now()),
        processed_at: Set(None),
    };
    row.insert(conn).await?;
    debug!(event_type = event.kind(), order_id = %event.order_id(), "outbox event enqueued");
    Ok(())
}

/// Polling worker configuration.
#[derive(Debug, Clone)]
pub struct OutboxWorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: u64,
    pub max_attempts: i32,
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 50,
            max_attempts: 8,
        }
    }
}

/// Spawns the background worker that drains the outbox forever.
pub fn start_worker(
    db: Arc<DatabaseConnection>,
    dispatcher: Arc<dyn EventDispatcher>,
    config: OutboxWorkerConfig,
) {
    tokio::spawn(async move {
        info!(
            batch = config.batch_size,
            poll_ms = config.poll_interval.as_millis() as u64,
            "outbox worker started"
        );
        loop {
            match drain_once(&db, dispatcher.as_ref(), &config).await {
                Ok(0) => sleep(config.poll_interval).await,
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "outbox worker pass failed");
                    sleep(config.poll_interval).await;
                }
            }
        }
    });
}

/// Drains one batch. Returns the number of rows claimed. Public so the test
/// harness can drive the worker deterministically.
pub async fn drain_once(
    db: &DatabaseConnection,
    dispatcher: &dyn EventDispatcher,
    config: &OutboxWorkerConfig,
) -> Result<usize, ServiceError> {
    let now = Utc::now();
    let batch = OutboxEvent::find()
        .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
        .filter(outbox_event::Column::AvailableAt.lte(now))
        .order_by_asc(outbox_event::Column::CreatedAt)
        .limit(config.batch_size)
        .all(db)
        .await?;

    let claimed = batch.len();
    for row in batch {
        // Claim optimistically; a row already taken by another worker is
        // skipped silently.
        let attempts = row.attempts + 1;
        let claim = OutboxEvent::update_many()
            .set(outbox_event::ActiveModel {
                status: Set(OutboxStatus::Processing),
                attempts: Set(attempts),
                ..Default::default()
            })
            .filter(outbox_event::Column::Id.eq(row.id))
            .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
            .exec(db)
            .await?;
        if claim.rows_affected == 0 {
            continue;
        }

        match serde_json::from_value::<Event>(row.payload.clone()) {
            Ok(event) => match dispatcher.dispatch(&event).await {
                Ok(()) => mark_delivered(db, row.id).await?,
                Err(e) => {
                    warn!(outbox_id = %row.id, attempts, error = %e, "outbox dispatch failed");
                    schedule_retry(db, row.id, attempts, config.max_attempts, &e.to_string())
                        .await?;
                }
            },
            Err(e) => {
                // An undecodable payload will never succeed; fail it outright.
                error!(outbox_id = %row.id, error = %e, "outbox payload undecodable");
                mark_failed(db, row.id, &e.to_string()).await?;
            }
        }
    }
    Ok(claimed)
}

async fn mark_delivered(db: &DatabaseConnection, id: Uuid) -> Result<(), ServiceError> {
    OutboxEvent::update_many()
        .set(outbox_event::ActiveModel {
            status: Set(OutboxStatus::Delivered),
            processed_at: Set(Some(Utc::now())),
            last_error: Set(None),
            ..Default::default()
        })
        .filter(outbox_event::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

async fn schedule_retry(
    db: &DatabaseConnection,
    id: Uuid,
    attempts: i32,
    max_attempts: i32,
    error_message: &str,
) -> Result<(), ServiceError> {
    if attempts >= max_attempts {
        return mark_failed(db, id, error_message).await;
    }
    let backoff_secs = BASE_BACKOFF_SECS.saturating_pow(attempts.min(10) as u32);
    OutboxEvent::update_many()
        .set(outbox_event::ActiveModel {
            status: Set(OutboxStatus::Pending),
            available_at: Set(Utc::now() + chrono::Duration::seconds(backoff_secs)),
            last_error: Set(Some(error_message.to_string())),
            ..Default::default()
        })
        .filter(outbox_event::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}

async fn mark_failed(
    db: &DatabaseConnection,
    id: Uuid,
    error_message: &str,
) -> Result<(), ServiceError> {
    OutboxEvent::update_many()
        .set(outbox_event::ActiveModel {
            status: Set(OutboxStatus::Failed),
            last_error: Set(Some(error_message.to_string())),
            processed_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(outbox_event::Column::Id.eq(id))
        .exec(db)
        .await?;
    Ok(())
}
