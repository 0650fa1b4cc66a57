//! Real-time channels.
//!
//! Two WebSocket endpoints push server state to a single user:
//!
//! - `GET /api/v1/ws/queue/:event_id` joins the waiting queue, pushes a
//!   status message every `status_interval` and attempts promotion on each
//!   tick.
//! - `GET /api/v1/ws/work/:event_id?eventScheduleId=…` is the purchase-screen
//!   channel; it carries work notices (`ORDER_RIGHT_LOST`,
//!   `SEAT_RESERVATION_RELEASED`).
//!
//! # Message Protocol
//!
//! **Server → Client (queue status):**
//! ```json
//! {"userId":"u1","eventId":"e1","myWaitingNumber":42,"totalWaitingNumber":900,"queueStatus":"WAITING"}
//! ```
//!
//! **Server → Client (work notice):**
//! ```json
//! {"userId":"u1","workStatus":"ORDER_RIGHT_LOST","eventId":"e1"}
//! ```
//!
//! **Client → Server:**
//! ```json
//! {"type":"keep_alive"}
//! {"type":"ping"}
//! {"type":"leave"}
//! ```
//!
//! `ping` is answered with `{"type":"pong"}`. `leave` releases immediately.
//! Any other way of going away starts the disconnect grace window; a
//! reconnect inside the window keeps the user's place, slot and seats.
//!
//! # Connection Limits
//!
//! Beyond `max_connections` open channels the upgrade is refused with 503.
//! Both channels send a protocol ping every `status_interval`; a socket that
//! sends nothing, pongs included, for `idle_timeout` is closed.

#![allow(clippy::cognitive_complexity)] // WebSocket event loops are naturally complex

use crate::WebResult;
use crate::error::AppError;
use crate::extractors::UserIdentity;
use crate::state::{AppState, ConnectionPermit};
use axum::{
    extract::{
        Path, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use ficket_core::{EventId, EventScheduleId, QueueError, UserId};
use ficket_runtime::{ChannelKey, Registration, ReleasePlan, StoreBackend};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

// ============================================================================
// Message Types
// ============================================================================

/// Message from client to server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Still here; resets the idle timer
    KeepAlive,
    /// Expects a pong
    Ping,
    /// Leave now instead of waiting for TTL or the grace window
    Leave,
}

/// Control message from server to client.
///
/// Queue status and work notices are sent in their own wire format; this
/// only covers protocol replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Reply to a ping
    Pong,
    /// The server could not serve the channel
    Error {
        /// Machine-readable code
        code: String,
        /// Human-readable description
        message: String,
    },
}

impl From<QueueError> for ControlMessage {
    fn from(err: QueueError) -> Self {
        let err = AppError::from(err);
        Self::Error { code: err.code().to_string(), message: err.message().to_string() }
    }
}

/// Query string of the work channel.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkParams {
    /// Schedule whose seat leases are released with the slot
    pub event_schedule_id: Option<String>,
}

#[derive(Debug, Clone)]
enum Channel {
    Queue { event: EventId },
    Work { event: EventId, schedule: Option<EventScheduleId> },
}

impl Channel {
    fn release_plan(&self) -> ReleasePlan {
        match self {
            Self::Queue { event } => ReleasePlan::LeaveQueue { event: event.clone() },
            Self::Work { event, schedule } => {
                ReleasePlan::ReleaseWork { event: event.clone(), schedule: schedule.clone() }
            }
        }
    }

    fn key(&self) -> ChannelKey {
        match self {
            Self::Queue { event } => ChannelKey::Queue(event.clone()),
            Self::Work { event, .. } => ChannelKey::Work(event.clone()),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Waiting-room channel.
///
/// # Errors
///
/// 401 without `X-User-Id`, 400 for a malformed event id, 503 at the
/// connection limit.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn queue_socket<B: StoreBackend>(
    UserIdentity(user): UserIdentity,
    Path(event_id): Path<String>,
    State(state): State<AppState<B>>,
    ws: WebSocketUpgrade,
) -> WebResult<Response> {
    let event = EventId::parse(event_id)?;
    let permit = acquire(&state)?;

    info!(user_id = %user, event_id = %event, "Queue channel requested");
    let channel = Channel::Queue { event };
    Ok(ws.on_upgrade(move |socket| run_channel(socket, state, user, channel, permit)))
}

/// Purchase-screen channel.
///
/// # Errors
///
/// 401 without `X-User-Id`, 400 for malformed ids, 503 at the connection
/// limit.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn work_socket<B: StoreBackend>(
    UserIdentity(user): UserIdentity,
    Path(event_id): Path<String>,
    Query(params): Query<WorkParams>,
    State(state): State<AppState<B>>,
    ws: WebSocketUpgrade,
) -> WebResult<Response> {
    let event = EventId::parse(event_id)?;
    let schedule = params.event_schedule_id.map(EventScheduleId::parse).transpose()?;
    let permit = acquire(&state)?;

    info!(user_id = %user, event_id = %event, "Work channel requested");
    let channel = Channel::Work { event, schedule };
    Ok(ws.on_upgrade(move |socket| run_channel(socket, state, user, channel, permit)))
}

fn acquire<B>(state: &AppState<B>) -> WebResult<ConnectionPermit> {
    state.try_acquire_connection().ok_or_else(|| {
        warn!(current_connections = state.active_connections(), "WebSocket connection limit exceeded");
        AppError::unavailable(
            "TOO_MANY_CONNECTIONS",
            "Too many concurrent connections. Please try again later.",
        )
    })
}

// ============================================================================
// Socket Loop
// ============================================================================

type Sender = SplitSink<WebSocket, Message>;

async fn run_channel<B: StoreBackend>(
    socket: WebSocket,
    state: AppState<B>,
    user: UserId,
    channel: Channel,
    _permit: ConnectionPermit,
) {
    let (mut sender, mut inbound) = socket.split();
    let key = channel.key();

    if state.grace().cancel(&user, &key) {
        info!(user_id = %user, channel = %key, "Reconnected within grace window");
    }

    if let Channel::Queue { event } = &channel {
        if let Err(e) = join_queue(&state, event, &user).await {
            warn!(user_id = %user, event_id = %event, error = %e, "Failed to join queue");
            let _ = send_json(&mut sender, &ControlMessage::from(e)).await;
            let _ = sender.close().await;
            return;
        }
    }

    let Registration { id, mut receiver } = state.registry().register(&user, &key).await;
    info!(user_id = %user, channel = %key, connection = %id, "Channel established");

    let realtime = state.realtime().clone();
    let mut ticker = tokio::time::interval(realtime.status_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let idle = tokio::time::sleep(realtime.idle_timeout);
    tokio::pin!(idle);
    let mut left = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Channel::Queue { event } = &channel {
                    if push_status(&state, &mut sender, event, &user).await.is_err() {
                        break;
                    }
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            notice = receiver.recv() => {
                let Some(notice) = notice else {
                    debug!(user_id = %user, connection = %id, "Connection replaced");
                    break;
                };
                if send_json(&mut sender, &notice).await.is_err() {
                    break;
                }
            }
            frame = inbound.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                idle.as_mut().reset(Instant::now() + realtime.idle_timeout);

                match frame {
                    Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::KeepAlive) => {
                            debug!(user_id = %user, "Keep-alive");
                        }
                        Ok(ClientMessage::Ping) => {
                            if send_json(&mut sender, &ControlMessage::Pong).await.is_err() {
                                break;
                            }
                        }
                        Ok(ClientMessage::Leave) => {
                            left = true;
                            break;
                        }
                        Err(e) => {
                            debug!(user_id = %user, error = %e, "Ignoring unrecognised client message");
                        }
                    },
                    Message::Close(_) => {
                        debug!(user_id = %user, "Client requested close");
                        break;
                    }
                    // Pongs only reset the idle timer. Pings are answered by the socket itself.
                    _ => {}
                }
            }
            () = &mut idle => {
                info!(user_id = %user, channel = %key, "WebSocket idle timeout");
                break;
            }
        }
    }

    let still_current = state.registry().deregister(&user, &key, id).await;
    let plan = channel.release_plan();

    if left {
        info!(user_id = %user, ?plan, "Client left explicitly");
        state.releaser().release(user.clone(), plan).await;
    } else if still_current {
        state.grace().schedule(&user, plan);
    }

    let _ = sender.close().await;
    info!(user_id = %user, channel = %key, connection = %id, "Channel closed");
}

async fn join_queue<B: StoreBackend>(state: &AppState<B>, event: &EventId, user: &UserId) -> ficket_core::Result<()> {
    let status = state.admission().queue_status(event, user).await?;
    // An admitted user reloading the waiting room must not re-enter the queue.
    if !status.is_admitted {
        state.admission().enter_queue(event, user).await?;
    }
    Ok(())
}

async fn push_status<B: StoreBackend>(
    state: &AppState<B>,
    sender: &mut Sender,
    event: &EventId,
    user: &UserId,
) -> Result<(), axum::Error> {
    match state.admission().advance(event, user).await {
        // Already delivered through the registry.
        Ok(tick) if tick.notified => Ok(()),
        Ok(tick) => send_json(sender, &tick.message).await,
        Err(e) => {
            warn!(user_id = %user, event_id = %event, error = %e, "Status tick failed");
            send_json(sender, &ControlMessage::from(e)).await
        }
    }
}

async fn send_json<T: Serialize>(sender: &mut Sender, value: &T) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize outbound message");
            Ok(())
        }
    }
}
