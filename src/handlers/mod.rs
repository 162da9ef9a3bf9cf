// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Request Handlers
//!
//! The [`Gateway`] owns the per-process session and transfer queue and serves
//! one handler per [`Endpoint`].
//!
//! ## Response shapes
//!
//! - **Single-frame**: `respond(Success)`, wait the send delay, push the
//!   payload, disconnect.
//! - **Multi-frame**: fill the packet queue and `respond(Success)`; every
//!   later ready signal pulls one frame (chunk, then `EOF`).
//! - **Rejection**: `respond(code)` and disconnect, nothing mutated.
//!
//! Failures of the chain or the store after a request validated are reported
//! as a `null` payload over the success path.

mod encrypted;
mod plain;
mod reads;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::blockchain::ChainClient;
use crate::codes::{ResponseCode, DEFAULT_MAX_FRAME_SIZE};
use crate::crypto::EnvelopeCipher;
use crate::queue::PacketQueue;
use crate::session::SessionManager;
use crate::storage::RecordDatabase;
use crate::transport::{Endpoint, PeerLink};
use crate::workflow::VerificationWorkflow;

/// Payload sent when a validated request could not be served.
pub const NULL_PAYLOAD: &[u8] = b"null";

/// Default delay between the acknowledgement and the payload.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct GatewayOptions {
    pub max_frame_size: usize,
    pub send_delay: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            send_delay: DEFAULT_SEND_DELAY,
        }
    }
}

/// What a write handler produced once validation passed.
#[derive(Debug)]
enum Reply {
    /// Deliver in one frame after the acknowledgement.
    Single(Vec<u8>),
    /// Payload is in the packet queue.
    Queued,
}

type HandlerResult = Result<Reply, ResponseCode>;

/// Serialize a reply payload, `null` if it cannot be.
fn json_payload<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_else(|_| NULL_PAYLOAD.to_vec())
}

/// Request handling core shared by every peer connection.
pub struct Gateway {
    session: SessionManager,
    queue: Mutex<PacketQueue>,
    chain: Arc<dyn ChainClient>,
    store: Arc<RecordDatabase>,
    cipher: Arc<dyn EnvelopeCipher>,
    workflow: VerificationWorkflow,
    send_delay: Duration,
}

impl Gateway {
    pub fn new(
        session: SessionManager,
        chain: Arc<dyn ChainClient>,
        store: Arc<RecordDatabase>,
        cipher: Arc<dyn EnvelopeCipher>,
        workflow: VerificationWorkflow,
        options: GatewayOptions,
    ) -> Self {
        Self {
            session,
            queue: Mutex::new(PacketQueue::new(options.max_frame_size)),
            chain,
            store,
            cipher,
            workflow,
            send_delay: options.send_delay,
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn workflow(&self) -> &VerificationWorkflow {
        &self.workflow
    }

    pub fn store(&self) -> &Arc<RecordDatabase> {
        &self.store
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    fn queue(&self) -> MutexGuard<'_, PacketQueue> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    /// Serve a read. Non-readable endpoints disconnect the peer.
    pub async fn on_read(&self, endpoint: Endpoint, link: &dyn PeerLink) -> Option<Vec<u8>> {
        let payload = match endpoint {
            Endpoint::GetPin => self.get_pin(),
            Endpoint::GetDeviceAccount => self.get_device_account(),
            Endpoint::GetBlockNumber => self.get_block_number().await,
            Endpoint::GetPublicKey => self.get_public_key(),
            Endpoint::GetAccountBalance
            | Endpoint::GetTxStatus
            | Endpoint::CallTx
            | Endpoint::VerifyPresence
            | Endpoint::VerifyPresenceAndSendTx
            | Endpoint::SendTx
            | Endpoint::GetClientTxStatus
            | Endpoint::GetContractAddress => {
                debug!(endpoint = %endpoint, "Read on write-only endpoint");
                link.disconnect();
                return None;
            }
        };
        Some(payload)
    }

    /// Serve a write request and drive its response shape.
    pub async fn on_write(&self, endpoint: Endpoint, data: &[u8], link: &dyn PeerLink) {
        let result = match endpoint {
            Endpoint::GetAccountBalance => self.get_account_balance(data).await,
            Endpoint::GetTxStatus => self.get_tx_status(data).await,
            Endpoint::CallTx => self.call_tx(data).await,
            Endpoint::VerifyPresence => self.verify_presence(data).await,
            Endpoint::VerifyPresenceAndSendTx => self.verify_presence_and_send_tx(data).await,
            Endpoint::SendTx => self.send_tx(data).await,
            Endpoint::GetClientTxStatus => self.get_client_tx_status(data).await,
            Endpoint::GetContractAddress => self.get_contract_address(data),
            Endpoint::GetPin
            | Endpoint::GetDeviceAccount
            | Endpoint::GetBlockNumber
            | Endpoint::GetPublicKey => {
                debug!(endpoint = %endpoint, "Write on read-only endpoint");
                link.disconnect();
                return;
            }
        };

        match result {
            Ok(Reply::Single(payload)) => {
                link.respond(endpoint, ResponseCode::Success);
                tokio::time::sleep(self.send_delay).await;
                link.send(endpoint, &payload);
                link.disconnect();
            }
            Ok(Reply::Queued) => {
                link.respond(endpoint, ResponseCode::Success);
            }
            Err(code) => {
                info!(endpoint = %endpoint, code = %code, "Request rejected");
                link.respond(endpoint, code);
                link.disconnect();
            }
        }
    }

    /// Peer consumed the previous frame and is ready for the next one.
    pub fn on_ready(&self, endpoint: Endpoint, link: &dyn PeerLink) {
        let pull = self.queue().pull();
        match pull.frame() {
            Some(frame) => link.send(endpoint, frame),
            None => {
                debug!(endpoint = %endpoint, "Ready signal with no transfer in progress");
                link.disconnect();
            }
        }
    }

    /// Peer went away: drop the transfer and close the session.
    pub fn on_disconnect(&self) {
        self.queue().reset();
        self.session.clear();
    }

    /// Replace the transfer in flight with `value`.
    fn enqueue<T: Serialize + ?Sized>(&self, value: &T) -> Reply {
        let mut queue = self.queue();
        if queue.enqueue(value).is_err() {
            queue.enqueue_bytes(NULL_PAYLOAD);
        }
        Reply::Queued
    }
}
