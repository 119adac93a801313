use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::RequestType;
use crate::errors::ServiceError;
use crate::events::outbox::EventDispatcher;
use crate::events::Event;
use crate::realtime::{order_room, RealtimeBroadcaster, ADMIN_ROOM};
use crate::services::customers::CustomerService;

/// Feed retention per user.
const FEED_LIMIT: isize = 1000;

/// A persisted notification, independent of push delivery.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub customer_uid: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub order_id: Option<Uuid>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderStatus,
    ReturnUpdate,
    RefundUpdate,
    SystemMessage,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Notification not found: {0}")]
    NotFound(Uuid),
}

impl From<NotificationError> for ServiceError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound(id) => {
                ServiceError::NotFound(format!("Notification {} not found", id))
            }
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

/// Redis-backed per-user notification feed: a sorted set ordered by creation
/// time, trimmed to the most recent entries, plus one key per notification
/// for point reads.
#[derive(Clone)]
pub struct NotificationFeed {
    redis: Arc<redis::Client>,
}

impl NotificationFeed {
    pub fn new(redis: Arc<redis::Client>) -> Self {
        Self { redis }
    }

    fn user_key(uid: &str) -> String {
        format!("notifications:user:{}", uid)
    }

    fn notification_key(id: Uuid) -> String {
        format!("notification:{}", id)
    }

    #[instrument(skip(self, notification), fields(uid = %notification.customer_uid))]
    pub async fn push(&self, notification: &Notification) -> Result<(), NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let json = serde_json::to_string(notification)?;
        let user_key = Self::user_key(&notification.customer_uid);

        redis::pipe()
            .atomic()
            .set(Self::notification_key(notification.id), &json)
            .zadd(&user_key, &json, notification.created_at.timestamp())
            .zremrangebyrank(&user_key, 0, -(FEED_LIMIT + 1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        customer_uid: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let raw: Vec<String> = conn
            .zrevrange(Self::user_key(customer_uid), 0, limit as isize - 1)
            .await?;
        let notifications = raw
            .into_iter()
            .map(|json| serde_json::from_str(&json))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    #[instrument(skip(self))]
    pub async fn mark_read(&self, id: Uuid) -> Result<(), NotificationError> {
        let mut conn = self.redis.get_async_connection().await?;
        let key = Self::notification_key(id);
        let json: Option<String> = conn.get(&key).await?;
        let mut notification: Notification = json
            .map(|j| serde_json::from_str(&j))
            .transpose()?
            .ok_or(NotificationError::NotFound(id))?;

        if !notification.read {
            let stale = serde_json::to_string(&notification)?;
            notification.read = true;
            let fresh = serde_json::to_string(&notification)?;
            let user_key = Self::user_key(&notification.customer_uid);
            let score = notification.created_at.timestamp();

            redis::pipe()
                .atomic()
                .set(&key, &fresh)
                .zrem(&user_key, &stale)
                .zadd(&user_key, &fresh, score)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        Ok(())
    }
}

/// Push transport seam. The delivery network is an external collaborator.
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> Result<(), ServiceError>;
}

/// FCM legacy HTTP transport.
pub struct FcmPushSender {
    http: reqwest::Client,
    server_key: String,
}

impl FcmPushSender {
    pub fn new(server_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_key,
        }
    }
}

#[async_trait]
impl PushSender for FcmPushSender {
    async fn send(
        &self,
        token: &str,
        title: &str,
        body: &str,
        data: &serde_json::Value,
    ) -> Result<(), ServiceError> {
        let payload = serde_json::json!({
            "to": token,
            "notification": { "title": title, "body": body },
            "data": data,
        });
        let response = self
            .http
            .post("https://fcm.googleapis.com/fcm/send")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("key={}", self.server_key),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Internal(format!("push send failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ServiceError::Internal(format!(
                "push send returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Mail transport seam; delivery itself is an external collaborator, so the
/// default wiring records the send in the log.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ServiceError>;
}

pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), ServiceError> {
        info!(to = %to, subject = %subject, "email handed to transport");
        Ok(())
    }
}

/// Fans one domain event out to every channel: socket rooms, persisted feed,
/// push tokens, email. Channels fail independently; a failed feed or push
/// marks the dispatch retryable while the rest stand.
pub struct NotificationFanout {
    customers: Arc<CustomerService>,
    feed: NotificationFeed,
    broadcaster: Arc<dyn RealtimeBroadcaster>,
    push: Option<Arc<dyn PushSender>>,
    mailer: Arc<dyn EmailSender>,
    admin_email: String,
}

impl NotificationFanout {
    pub fn new(
        customers: Arc<CustomerService>,
        feed: NotificationFeed,
        broadcaster: Arc<dyn RealtimeBroadcaster>,
        push: Option<Arc<dyn PushSender>>,
        mailer: Arc<dyn EmailSender>,
        admin_email: String,
    ) -> Self {
        Self {
            customers,
            feed,
            broadcaster,
            push,
            mailer,
            admin_email,
        }
    }

    fn socket_fanout(&self, event: &Event) {
        let payload = serde_json::json!({
            "orderId": event.order_id(),
            "orderNumber": event.order_number(),
            "event": event,
        });
        match event {
            Event::OrderCreated { .. } => {
                self.broadcaster.emit(ADMIN_ROOM, "newOrder", payload);
            }
            Event::OrderStatusChanged { order_id, .. } => {
                self.broadcaster
                    .emit(&order_room(*order_id), "orderStatusUpdated", payload.clone());
                self.broadcaster.emit(ADMIN_ROOM, "orderStatusUpdated", payload);
            }
            Event::OrderCancelled { order_id, .. } => {
                self.broadcaster
                    .emit(&order_room(*order_id), "orderCancelled", payload.clone());
                self.broadcaster.emit(ADMIN_ROOM, "orderCancelled", payload);
            }
            Event::ReturnRequested { .. } => {
                self.broadcaster.emit(ADMIN_ROOM, "returnRequested", payload);
            }
            Event::ReturnProcessed { order_id, .. } => {
                self.broadcaster
                    .emit(&order_room(*order_id), "orderStatusUpdated", payload.clone());
                self.broadcaster.emit(ADMIN_ROOM, "orderStatusUpdated", payload);
            }
            Event::RefundStatusChanged { .. } | Event::PaymentRefunded { .. } => {}
        }
    }

    fn customer_message(event: &Event) -> (String, String, NotificationKind) {
        match event {
            Event::OrderCreated { order_number, .. } => (
                "Order placed".to_string(),
                format!("Your order {} has been placed.", order_number),
                NotificationKind::OrderStatus,
            ),
            Event::OrderStatusChanged {
                order_number,
                new_status,
                ..
            } => (
                "Order update".to_string(),
                format!("Order {} is now {}.", order_number, new_status),
                NotificationKind::OrderStatus,
            ),
            Event::OrderCancelled { order_number, .. } => (
                "Order cancelled".to_string(),
                format!("Order {} has been cancelled.", order_number),
                NotificationKind::OrderStatus,
            ),
            Event::ReturnRequested {
                order_number,
                request_type,
                ..
            } => (
                match request_type {
                    RequestType::Return => "Return requested".to_string(),
                    RequestType::Replacement => "Replacement requested".to_string(),
                },
                format!(
                    "We received your {} request for order {}.",
                    request_type, order_number
                ),
                NotificationKind::ReturnUpdate,
            ),
            Event::ReturnProcessed {
                order_number,
                request_type,
                approved,
                ..
            } => (
                "Request update".to_string(),
                if *approved {
                    format!(
                        "Your {} request for order {} was approved.",
                        request_type, order_number
                    )
                } else {
                    format!(
                        "Your {} request for order {} was declined.",
                        request_type, order_number
                    )
                },
                NotificationKind::ReturnUpdate,
            ),
            Event::RefundStatusChanged {
                order_number,
                refund_status,
                ..
            } => (
                "Refund update".to_string(),
                format!("Refund for order {} is {}.", order_number, refund_status),
                NotificationKind::RefundUpdate,
            ),
            Event::PaymentRefunded {
                order_number,
                amount,
                ..
            } => (
                "Refund initiated".to_string(),
                format!(
                    "A refund of {} has been initiated for order {}.",
                    amount, order_number
                ),
                NotificationKind::RefundUpdate,
            ),
        }
    }

    fn admin_email_for(event: &Event) -> Option<(String, String)> {
        match event {
            Event::OrderCreated {
                order_number,
                total_amount,
                ..
            } => Some((
                format!("New order {}", order_number),
                format!("Order {} placed for {}.", order_number, total_amount),
            )),
            Event::OrderCancelled { order_number, .. } => Some((
                format!("Order {} cancelled", order_number),
                format!("Order {} was cancelled by the customer.", order_number),
            )),
            Event::ReturnRequested {
                order_number,
                request_type,
                ..
            } => Some((
                format!("{} requested on {}", request_type, order_number),
                format!(
                    "A {} was requested for order {}; review it in the dashboard.",
                    request_type, order_number
                ),
            )),
            _ => None,
        }
    }
}

#[async_trait]
impl EventDispatcher for NotificationFanout {
    async fn dispatch(&self, event: &Event) -> Result<(), ServiceError> {
        // Socket first: in-process, effectively infallible.
        self.socket_fanout(event);

        let uid = event.customer_uid().to_string();
        let (title, message, kind) = Self::customer_message(event);
        let mut retryable_failure = false;

        let notification = Notification {
            id: Uuid::new_v4(),
            customer_uid: uid.clone(),
            title: title.clone(),
            message: message.clone(),
            kind,
            order_id: Some(event.order_id()),
            read: false,
            created_at: Utc::now(),
        };
        if let Err(e) = self.feed.push(&notification).await {
            warn!(error = %e, uid = %uid, "persisted notification failed");
            retryable_failure = true;
        }

        if let Some(push) = &self.push {
            let data = serde_json::json!({
                "orderId": event.order_id().to_string(),
                "kind": event.kind(),
            });
            match self.customers.device_tokens(&uid).await {
                Ok(tokens) => {
                    for token in tokens {
                        if let Err(e) = push.send(&token, &title, &message, &data).await {
                            warn!(error = %e, uid = %uid, "push delivery failed");
                            retryable_failure = true;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, uid = %uid, "device token lookup failed");
                    retryable_failure = true;
                }
            }
        }

        if let Some((subject, body)) = Self::admin_email_for(event) {
            if let Err(e) = self.mailer.send(&self.admin_email, &subject, &body).await {
                warn!(error = %e, "admin email failed");
            }
        }
        if let Ok(Some(customer)) = self.customers.find_by_uid(&uid).await {
            if let Some(email) = customer.email {
                if let Err(e) = self.mailer.send(&email, &title, &message).await {
                    warn!(error = %e, uid = %uid, "customer email failed");
                }
            }
        }

        if retryable_failure {
            return Err(ServiceError::Internal(
                "one or more notification channels failed".into(),
            ));
        }
        Ok(())
    }
}
