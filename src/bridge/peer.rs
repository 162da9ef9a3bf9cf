// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WebSocket peer channel.
//!
//! Frames are JSON objects tagged by `type`. Byte payloads travel as `0x` hex.
//!
//! ```text
//! in:  {"type":"read","endpoint":"getPin"}
//!      {"type":"write","endpoint":"verifyPresence","data":"0x7b22..."}
//!      {"type":"ready","endpoint":"callTx"}
//!      {"type":"closed"}
//! out: {"type":"readResult","endpoint":"getPin","data":"0x..."}
//!      {"type":"respond","endpoint":"verifyPresence","code":0}
//!      {"type":"notify","endpoint":"verifyPresence","data":"0x..."}
//!      {"type":"disconnect"}
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::codes::ResponseCode;
use crate::error::ApiError;
use crate::handlers::Gateway;
use crate::state::AppState;
use crate::transport::{Endpoint, PeerLink};

/// Transport event forwarded by the radio process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerEvent {
    Read { endpoint: String },
    Write { endpoint: String, data: String },
    Ready { endpoint: String },
    Closed,
}

/// Instruction for the radio process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PeerCommand {
    ReadResult { endpoint: String, data: String },
    Respond { endpoint: String, code: u8 },
    Notify { endpoint: String, data: String },
    Disconnect,
}

/// [`PeerLink`] that queues commands for the socket writer.
pub struct ChannelLink {
    tx: mpsc::UnboundedSender<PeerCommand>,
    disconnected: AtomicBool,
}

impl ChannelLink {
    pub fn new(tx: mpsc::UnboundedSender<PeerCommand>) -> Self {
        Self {
            tx,
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    pub fn read_result(&self, endpoint: Endpoint, value: &[u8]) {
        self.push(PeerCommand::ReadResult {
            endpoint: endpoint.name().to_string(),
            data: alloy::hex::encode_prefixed(value),
        });
    }

    fn push(&self, command: PeerCommand) {
        if self.is_disconnected() {
            return;
        }
        if self.tx.send(command).is_err() {
            debug!("Peer writer already closed");
        }
    }
}

impl PeerLink for ChannelLink {
    fn respond(&self, endpoint: Endpoint, code: ResponseCode) {
        self.push(PeerCommand::Respond {
            endpoint: endpoint.name().to_string(),
            code: code.as_byte(),
        });
    }

    fn send(&self, endpoint: Endpoint, bytes: &[u8]) {
        self.push(PeerCommand::Notify {
            endpoint: endpoint.name().to_string(),
            data: alloy::hex::encode_prefixed(bytes),
        });
    }

    fn disconnect(&self) {
        if self.is_disconnected() {
            return;
        }
        // Queue the command before flipping the flag so it still goes out.
        let _ = self.tx.send(PeerCommand::Disconnect);
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

/// Route one transport event to the gateway.
pub async fn dispatch(gateway: &Gateway, event: PeerEvent, link: &ChannelLink) {
    match event {
        PeerEvent::Read { endpoint } => {
            let Some(endpoint) = lookup(&endpoint, link) else {
                return;
            };
            if let Some(value) = gateway.on_read(endpoint, link).await {
                link.read_result(endpoint, &value);
            }
        }
        PeerEvent::Write { endpoint, data } => {
            let Some(endpoint) = lookup(&endpoint, link) else {
                return;
            };
            match alloy::hex::decode(&data) {
                Ok(bytes) => gateway.on_write(endpoint, &bytes, link).await,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Write data is not hex");
                    link.disconnect();
                }
            }
        }
        PeerEvent::Ready { endpoint } => {
            let Some(endpoint) = lookup(&endpoint, link) else {
                return;
            };
            gateway.on_ready(endpoint, link);
        }
        PeerEvent::Closed => link.disconnect(),
    }
}

fn lookup(name: &str, link: &ChannelLink) -> Option<Endpoint> {
    let endpoint = Endpoint::lookup(name);
    if endpoint.is_none() {
        warn!(endpoint = name, "Unknown endpoint");
        link.disconnect();
    }
    endpoint
}

/// `GET /v1/peer`: upgrade to the peer WebSocket.
pub async fn peer_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let permit = state
        .try_claim_peer()
        .ok_or_else(|| ApiError::unavailable("another peer is connected"))?;
    Ok(ws.on_upgrade(move |socket| serve_peer(socket, state, permit)))
}

async fn serve_peer(socket: WebSocket, state: AppState, _permit: OwnedSemaphorePermit) {
    let span = tracing::info_span!("peer", connection = %Uuid::new_v4());
    async move {
        info!("Peer connected");
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = ChannelLink::new(tx);

        let writer = tokio::spawn(
            async move {
                while let Some(command) = rx.recv().await {
                    let closing = matches!(command, PeerCommand::Disconnect);
                    match serde_json::to_string(&command) {
                        Ok(json) => {
                            if sink.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "Peer command serialize error"),
                    }
                    if closing {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            .in_current_span(),
        );

        while !link.is_disconnected() {
            let text = match stream.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            };
            match serde_json::from_str::<PeerEvent>(text.as_str()) {
                Ok(PeerEvent::Closed) => break,
                Ok(event) => dispatch(&state.gateway, event, &link).await,
                Err(e) => {
                    warn!(error = %e, "Malformed peer event");
                    link.disconnect();
                }
            }
        }

        state.gateway.on_disconnect();
        drop(link);
        let _ = writer.await;
        info!("Peer disconnected");
    }
    .instrument(span)
    .await
}
