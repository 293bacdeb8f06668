// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! WebSocket endpoint and engine bridge.
//!
//! The protocol engine is single-threaded (`Rc` state inside a `LocalSet`),
//! while axum's connection handlers are ordinary `Send` tasks. The bridge
//! between the two is a pair of channels: every client pushes decoded
//! envelopes into the engine's inbound queue, and the engine answers
//! through a per-client outbound channel. The engine drains requests one at
//! a time, which is what serialises protocol handling.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use super::transport::{ClientContext, Envelope, Transport};
use crate::core::error::Result;

enum EngineMessage {
    Connect {
        client: u64,
        tx: UnboundedSender<Envelope>,
    },
    Disconnect {
        client: u64,
    },
    Incoming {
        client: u64,
        envelope: Envelope,
    },
}

#[derive(Clone)]
struct ServerState {
    engine_tx: UnboundedSender<EngineMessage>,
    next_client: Arc<AtomicU64>,
}

/// Run the runtime WebSocket server until the listener fails.
///
/// Must be called inside a `LocalSet` on a current-thread runtime; the
/// engine task is spawned locally.
pub async fn serve(host: &str, port: u16) -> Result<()> {
    let (engine_tx, engine_rx) = mpsc::unbounded_channel();
    tokio::task::spawn_local(engine_loop(engine_rx));

    let state = ServerState {
        engine_tx,
        next_client: Arc::new(AtomicU64::new(1)),
    };
    let app = Router::new().route("/", get(ws_handler)).with_state(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("protoflo runtime listening on ws://{host}:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.protocols(["noflo"])
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let client = state.next_client.fetch_add(1, Ordering::Relaxed);
    let (mut sink, mut stream) = socket.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
    if state
        .engine_tx
        .send(EngineMessage::Connect { client, tx })
        .is_err()
    {
        return;
    }
    info!("client {client} connected");

    let send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!("failed to serialize response: {err}"),
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => {
                    debug!("client {client}: {} {}", envelope.protocol, envelope.command);
                    let _ = state
                        .engine_tx
                        .send(EngineMessage::Incoming { client, envelope });
                }
                Err(err) => warn!("client {client} sent a malformed envelope: {err}"),
            },
            Ok(Message::Binary(_)) => {
                // The protocol is JSON text; binary frames are rejected.
                warn!("client {client} sent a binary frame, closing");
                break;
            }
            Ok(Message::Close(_)) => break,
            Err(err) => {
                warn!("client {client} websocket error: {err}");
                break;
            }
            _ => {}
        }
    }

    let _ = state.engine_tx.send(EngineMessage::Disconnect { client });
    send_task.abort();
    info!("client {client} disconnected");
}

/// The protocol engine: owns the transport and every client context, and
/// processes one request at a time.
async fn engine_loop(mut rx: UnboundedReceiver<EngineMessage>) {
    let transport = Transport::new();
    let mut clients: HashMap<u64, Rc<ClientContext>> = HashMap::new();

    while let Some(message) = rx.recv().await {
        match message {
            EngineMessage::Connect { client, tx } => {
                clients.insert(client, ClientContext::new(client, tx));
            }
            EngineMessage::Disconnect { client } => {
                clients.remove(&client);
            }
            EngineMessage::Incoming { client, envelope } => {
                if let Some(ctx) = clients.get(&client) {
                    let ctx = Rc::clone(ctx);
                    transport.receive(envelope, &ctx).await;
                }
            }
        }
    }
}
