use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use harbor_types::events::{ClientCommand, ServerEvent};
use harbor_types::token;

use crate::registry::{Registry, RegistryError, Session};
use crate::relay::Relay;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection for its whole lifetime.
///
/// The session token arrives in a connection-level header during the
/// upgrade. A missing or unverifiable token leaves the connection
/// anonymous: it still receives broadcasts but owns no presence entry and
/// cannot be attributed.
pub async fn handle_socket(
    socket: WebSocket,
    registry: Registry,
    relay: Arc<Relay>,
    jwt_secret: String,
    token: Option<String>,
) {
    let conn_id = Uuid::new_v4();

    let identity = match token.as_deref() {
        None => None,
        Some(t) => match token::verify(&jwt_secret, t) {
            Ok(claims) => Some(claims),
            Err(e) => {
                warn!("connection {conn_id} presented an unusable token ({e}), continuing anonymous");
                None
            }
        },
    };

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    registry.attach(conn_id, tx).await;

    match &identity {
        Some(claims) => {
            info!("{} ({}) connected as {conn_id}", claims.username, claims.sub);

            let session = Session::new(conn_id, claims.sub, claims.username.clone());
            match registry.register(session).await {
                Ok(()) => {
                    // Everyone sees the arrival, the new connection included.
                    registry
                        .broadcast(ServerEvent::Open {
                            user_id: claims.sub,
                            name: claims.username.clone(),
                        })
                        .await;
                }
                Err(e) => warn!("could not register {conn_id}: {e}"),
            }
        }
        None => info!("anonymous connection {conn_id} established"),
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts to the client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("dropping unserializable event: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {missed_heartbeats} pongs), dropping connection");
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read chat events from the client. Each event is handled to
    // completion before the next one on this connection; other
    // connections proceed concurrently.
    let relay_recv = relay.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(ClientCommand::SendMessage(payload)) => {
                        relay_recv.handle_inbound(payload).await;
                    }
                    Err(e) => {
                        let raw: String = text.chars().take(200).collect();
                        warn!("{conn_id} bad frame: {e} -- raw: {raw}");
                    }
                },
                Message::Binary(_) => warn!("{conn_id} sent an unexpected binary frame"),
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Teardown is idempotent: a session that is already gone is a no-op.
    let removed = registry.deregister(conn_id).await;
    registry.detach(conn_id).await;
    match removed {
        Ok(session) => {
            registry
                .broadcast(ServerEvent::Closed {
                    id: conn_id,
                    username: session.username.clone(),
                    user_id: session.user_id,
                })
                .await;
            info!("{} ({}) disconnected ({conn_id})", session.username, session.user_id);
        }
        Err(RegistryError::NotFound(_)) => info!("connection {conn_id} closed"),
        Err(e) => warn!("unexpected deregister failure for {conn_id}: {e}"),
    }
}
