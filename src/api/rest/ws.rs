use std::borrow::Cow;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures::stream::SplitSink;
use futures::SinkExt;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::hub::{CloseReason, ObserverEvent};
use crate::models::delivery::{DeliveryId, GeoPoint};
use crate::models::position::PositionSample;
use crate::models::principal::Principal;
use crate::state::AppState;

/// Frames pushed to a live-tracking observer.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    Position { sample: PositionSample },
    Closed { reason: CloseReason },
}

pub async fn live_handler(
    ws: WebSocketUpgrade,
    Path(delivery_id): Path<DeliveryId>,
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_live_socket(socket, state, delivery_id, principal))
}

async fn handle_live_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    delivery_id: DeliveryId,
    principal: Principal,
) {
    let (mut sender, mut receiver) = socket.split();

    let subscription = match state.hub.attach(delivery_id, principal).await {
        Ok(subscription) => subscription,
        Err(refusal) => {
            let frame = CloseFrame {
                code: refusal.reason_code(),
                reason: Cow::Borrowed(refusal.kind()),
            };
            let _ = sender.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let mut events = subscription;
    let connection_id = events.connection_id;

    info!(delivery_id, principal_id = %principal.id, %connection_id, "live socket connected");

    // Probes waiting for the peer's next pong.
    let mut pending_acks: Vec<oneshot::Sender<()>> = Vec::new();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ObserverEvent::Position(sample) => {
                        if send_json(&mut sender, &LiveMessage::Position { sample }).await.is_err() {
                            break;
                        }
                    }
                    ObserverEvent::Closed(reason) => {
                        let _ = send_json(&mut sender, &LiveMessage::Closed { reason }).await;
                        let frame = CloseFrame {
                            code: reason.close_code(),
                            reason: Cow::Borrowed(reason.as_str()),
                        };
                        let _ = sender.send(Message::Close(Some(frame))).await;
                        break;
                    }
                    ObserverEvent::Probe(ack) => {
                        if sender.send(Message::Ping(Vec::new())).await.is_err() {
                            break;
                        }
                        pending_acks.push(ack);
                    }
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Pong(_))) => {
                        for ack in pending_acks.drain(..) {
                            let _ = ack.send(());
                        }
                    }
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound_position(&state, delivery_id, &principal, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.hub.release(delivery_id, connection_id).await;
    info!(delivery_id, principal_id = %principal.id, %connection_id, "live socket disconnected");
}

/// Couriers may stream their position over the same socket they observe on.
async fn handle_inbound_position(
    state: &AppState,
    delivery_id: DeliveryId,
    principal: &Principal,
    text: &str,
) {
    let point: GeoPoint = match serde_json::from_str(text) {
        Ok(point) => point,
        Err(err) => {
            debug!(delivery_id, error = %err, "ignoring malformed live socket message");
            return;
        }
    };

    if let Err(err) = state.hub.publish_position(delivery_id, principal, point).await {
        warn!(
            delivery_id,
            principal_id = %principal.id,
            error = %err,
            "position from live socket rejected"
        );
    }
}

async fn send_json<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &T,
) -> Result<(), ()> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize live message");
            return Ok(());
        }
    };

    sender.send(Message::Text(json)).await.map_err(|_| ())
}

/// Operator feed of dispatch events.
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Response {
    if !principal.is_operator() {
        return AppError::Permission("only operators may watch dispatch events".to_string())
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_events_socket(socket, state))
        .into_response()
}

async fn handle_events_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.dispatch_events_tx.subscribe();

    info!("dispatch events client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "dispatch events client lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if send_json(&mut sender, &event).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("dispatch events client disconnected");
}
