//! WebSocket transport for one adventure session. Owns the raw socket;
//! everything about adventure semantics lives in
//! `learning_odyssey_engine::session::SessionCoordinator`.
//!
//! Splits the socket into sink/stream halves and runs two pump tasks
//! (`tokio::select!` cancels whichever finishes first), the common shape for
//! an axum WebSocket connection loop.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use learning_odyssey_engine::session::{InboundMessage, OutboundMessage, SessionContext, SessionCoordinator};
use std::sync::Arc;
use tokio::sync::mpsc;

pub async fn ws_handler(State(ctx): State<Arc<SessionContext>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ctx))
}

async fn handle_socket(socket: WebSocket, ctx: Arc<SessionContext>) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(256);

    let mut coordinator: Option<SessionCoordinator> = None;

    // Pump task: drains outbound engine messages onto the socket. Runs
    // independently of the inbound read loop so a slow client never stalls
    // word-paced delivery upstream.
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(payload) = serde_json::to_string(&message) else { continue };
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        loop {
            let Some(next) = stream.next().await else { break };
            let Ok(message) = next else { break };
            let Message::Text(text) = message else { continue };

            let decoded: Result<InboundMessage, _> = serde_json::from_str(&text);
            match decoded {
                Ok(InboundMessage::Start { story_category, lesson_topic, client_uuid, resume }) => {
                    match SessionCoordinator::start(ctx.clone(), &story_category, &lesson_topic, &client_uuid, resume).await {
                        Ok(mut new_coordinator) => {
                            if new_coordinator.run_first_chapter(&out_tx).await.is_err() {
                                break;
                            }
                            coordinator = Some(new_coordinator);
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to start adventure session");
                            let _ = out_tx
                                .send(OutboundMessage::Error { kind: e.kind().to_string(), message: e.to_string() })
                                .await;
                            break;
                        }
                    }
                }
                Ok(inbound) => {
                    let Some(session) = coordinator.as_mut() else {
                        let _ = out_tx
                            .send(OutboundMessage::Error {
                                kind: "protocol".to_string(),
                                message: "received a message before 'start'".to_string(),
                            })
                            .await;
                        continue;
                    };
                    if let Err(e) = session.handle_message(inbound, &out_tx).await {
                        tracing::warn!(error = %e, "error handling inbound message");
                        let _ = out_tx.send(OutboundMessage::Error { kind: e.kind().to_string(), message: e.to_string() }).await;
                    }
                }
                Err(e) => {
                    let _ = out_tx
                        .send(OutboundMessage::Error { kind: "protocol".to_string(), message: format!("malformed message: {e}") })
                        .await;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}
