//! Room-based realtime gateway. The workflow talks to an injected
//! [`RealtimeBroadcaster`]; the WebSocket endpoint subscribes authenticated
//! clients to the rooms they are entitled to.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{decode_token, AuthUser};
use crate::errors::ServiceError;
use crate::AppState;

/// Dashboard subscribers.
pub const ADMIN_ROOM: &str = "admin";

const ROOM_BUFFER: usize = 256;

pub fn order_room(order_id: Uuid) -> String {
    format!("order-{}", order_id)
}

/// Server→client frame.
#[derive(Debug, Clone, Serialize)]
pub struct SocketFrame<'a> {
    pub event: &'a str,
    pub room: &'a str,
    pub payload: serde_json::Value,
}

/// Injected broadcast seam; route code never reaches for a global socket
/// handle.
pub trait RealtimeBroadcaster: Send + Sync {
    fn emit(&self, room: &str, event: &str, payload: serde_json::Value);
}

/// In-process gateway: one broadcast channel per room, created lazily and
/// shared by every subscriber.
#[derive(Default)]
pub struct SocketGateway {
    rooms: DashMap<String, broadcast::Sender<String>>,
}

impl SocketGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, room: &str) -> broadcast::Sender<String> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_BUFFER).0)
            .clone()
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<String> {
        self.channel(room).subscribe()
    }
}

impl RealtimeBroadcaster for SocketGateway {
    fn emit(&self, room: &str, event: &str, payload: serde_json::Value) {
        let frame = SocketFrame {
            event,
            room,
            payload,
        };
        match serde_json::to_string(&frame) {
            Ok(text) => {
                // A send error only means nobody is listening right now.
                let _ = self.channel(room).send(text);
                debug!(room = %room, event = %event, "socket frame emitted");
            }
            Err(e) => warn!(error = %e, "socket frame serialization failed"),
        }
    }
}

/// Discards every emission; used where no socket fan-out is wired.
pub struct NoopBroadcaster;

impl RealtimeBroadcaster for NoopBroadcaster {
    fn emit(&self, _room: &str, _event: &str, _payload: serde_json::Value) {}
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: String,
    /// Comma-separated room list, e.g. `admin,order-<id>`.
    #[serde(default)]
    pub rooms: String,
}

/// `GET /ws?token=...&rooms=admin,order-<id>` — upgrades after validating the
/// token and the caller's entitlement to every requested room.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Result<Response, ServiceError> {
    let claims = decode_token(&state.config.jwt_secret, &query.token)?;
    let user = AuthUser::from(claims);

    let mut rooms = Vec::new();
    for room in query.rooms.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        authorize_room(&state, &user, room).await?;
        rooms.push(room.to_string());
    }
    if rooms.is_empty() {
        return Err(ServiceError::ValidationError(
            "at least one room must be requested".into(),
        ));
    }

    let gateway = state.gateway.clone();
    Ok(ws.on_upgrade(move |socket| run_socket(socket, gateway, rooms)))
}

async fn authorize_room(
    state: &AppState,
    user: &AuthUser,
    room: &str,
) -> Result<(), ServiceError> {
    if room == ADMIN_ROOM {
        return user.require_staff();
    }
    if let Some(raw_id) = room.strip_prefix("order-") {
        let order_id = Uuid::parse_str(raw_id)
            .map_err(|_| ServiceError::ValidationError(format!("invalid room {}", room)))?;
        let order = state.services.orders.get_order_model(order_id).await?;
        if user.is_delivery() {
            return Ok(());
        }
        return user.require_owner_or_admin(&order.customer_uid);
    }
    Err(ServiceError::ValidationError(format!(
        "unknown room {}",
        room
    )))
}

async fn run_socket(socket: WebSocket, gateway: Arc<SocketGateway>, rooms: Vec<String>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    for room in &rooms {
        let mut subscription = gateway.subscribe(room);
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match subscription.recv().await {
                    Ok(frame) => {
                        if tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "socket subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
    drop(tx);

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Client pings and stray text frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(?rooms, "socket closed");
}
