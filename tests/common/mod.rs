// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::{
    consensus::{SignableTransaction, TxEip1559, TxEnvelope},
    eips::eip2718::Encodable2718,
    network::TxSignerSync,
    primitives::{Address, Bytes, TxKind, B256, U256},
    signers::{local::PrivateKeySigner, SignerSync},
};
use async_trait::async_trait;
use k256::{PublicKey, SecretKey};
use serde_json::Value;

use relational_ble_gateway::{
    blockchain::{ChainClient, ChainError, PresenceRequest, TxReceipt, TxSummary},
    codes::ResponseCode,
    crypto::{seal, EciesCipher},
    handlers::{Gateway, GatewayOptions},
    session::SessionManager,
    storage::RecordDatabase,
    transport::{Endpoint, PeerLink},
    workflow::{VerificationWorkflow, WorkflowConfig},
};

pub const VERIFY_TX_HASH: B256 = B256::repeat_byte(0xA1);
pub const CLIENT_TX_HASH: B256 = B256::repeat_byte(0xC1);
pub const DEFAULT_CONTRACT: Address = Address::repeat_byte(0xCC);
pub const NODE_ACCOUNT: Address = Address::repeat_byte(0xEE);
pub const CHECK_INTERVAL: Duration = Duration::from_secs(20);

// ==================== Fake chain ====================

/// In-memory chain. Receipts appear after `mined_after` lookups.
#[derive(Default)]
pub struct FakeChain {
    pub mined_after: Mutex<Option<usize>>,
    pub success: Mutex<bool>,
    pub balance: Mutex<U256>,
    pub head: Mutex<u64>,
    pub registrations: Mutex<Vec<PresenceRequest>>,
    pub receipt_lookups: AtomicUsize,
    pub contract_calls: Mutex<Vec<(Address, Bytes)>>,
    pub relayed: Mutex<Vec<Bytes>>,
    pub queried_ranges: Mutex<Vec<(u64, u64)>>,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        let chain = Self::default();
        *chain.success.lock().unwrap() = true;
        Arc::new(chain)
    }

    pub fn mine_after(&self, lookups: usize, success: bool) {
        *self.mined_after.lock().unwrap() = Some(lookups);
        *self.success.lock().unwrap() = success;
    }

    pub fn set_balance(&self, wei: U256) {
        *self.balance.lock().unwrap() = wei;
    }

    pub fn set_head(&self, block: u64) {
        *self.head.lock().unwrap() = block;
    }

    pub fn register(&self, request: PresenceRequest) {
        self.registrations.lock().unwrap().push(request);
    }

    pub fn relayed(&self) -> Vec<Bytes> {
        self.relayed.lock().unwrap().clone()
    }

    pub fn contract_calls(&self) -> usize {
        self.contract_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    fn account(&self) -> Address {
        NODE_ACCOUNT
    }

    async fn submit_transaction(&self, raw: &Bytes) -> Result<B256, ChainError> {
        self.relayed.lock().unwrap().push(raw.clone());
        Ok(CLIENT_TX_HASH)
    }

    async fn submit_contract_call(
        &self,
        contract: Address,
        calldata: Bytes,
    ) -> Result<B256, ChainError> {
        self.contract_calls.lock().unwrap().push((contract, calldata));
        Ok(VERIFY_TX_HASH)
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let n = self.receipt_lookups.fetch_add(1, Ordering::SeqCst) + 1;
        let mined_after = *self.mined_after.lock().unwrap();
        match mined_after {
            Some(after) if n >= after => Ok(Some(TxReceipt {
                tx_hash: hash,
                block_number: Some(*self.head.lock().unwrap()),
                gas_used: 60_000,
                success: *self.success.lock().unwrap(),
            })),
            _ => Ok(None),
        }
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<TxSummary>, ChainError> {
        if hash == CLIENT_TX_HASH {
            return Ok(Some(TxSummary {
                block_number: Some(7),
                nonce: 3,
                gas: 21_000,
            }));
        }
        Ok(None)
    }

    async fn get_balance(&self, _address: Address) -> Result<U256, ChainError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn get_block_number(&self) -> Result<u64, ChainError> {
        Ok(*self.head.lock().unwrap())
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        // Echo the calldata back, long enough to span several frames.
        Ok(data.repeat(8).into())
    }

    async fn presence_requests(
        &self,
        _registry: Address,
        node: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<PresenceRequest>, ChainError> {
        self.queried_ranges.lock().unwrap().push((from_block, to_block));
        let requests = self.registrations.lock().unwrap();
        Ok(requests
            .iter()
            .filter(|_| node == NODE_ACCOUNT)
            .filter(|r| {
                r.block_number
                    .is_some_and(|b| b >= from_block && b <= to_block)
            })
            .cloned()
            .collect())
    }
}

// ==================== Recording link ====================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Respond(Endpoint, ResponseCode),
    Send(Endpoint, Vec<u8>),
    Disconnect,
}

#[derive(Default)]
pub struct RecordingLink {
    events: Mutex<Vec<LinkEvent>>,
}

impl RecordingLink {
    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Payloads pushed with `send`, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LinkEvent::Send(_, bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn codes(&self) -> Vec<ResponseCode> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LinkEvent::Respond(_, code) => Some(code),
                _ => None,
            })
            .collect()
    }

    pub fn disconnected(&self) -> bool {
        self.events().contains(&LinkEvent::Disconnect)
    }
}

impl PeerLink for RecordingLink {
    fn respond(&self, endpoint: Endpoint, code: ResponseCode) {
        self.events
            .lock()
            .unwrap()
            .push(LinkEvent::Respond(endpoint, code));
    }

    fn send(&self, endpoint: Endpoint, bytes: &[u8]) {
        self.events
            .lock()
            .unwrap()
            .push(LinkEvent::Send(endpoint, bytes.to_vec()));
    }

    fn disconnect(&self) {
        self.events.lock().unwrap().push(LinkEvent::Disconnect);
    }
}

// ==================== Harness ====================

pub struct TestGateway {
    pub gateway: Arc<Gateway>,
    pub chain: Arc<FakeChain>,
    pub store: Arc<RecordDatabase>,
    node_public: PublicKey,
    _tmp: tempfile::TempDir,
}

impl TestGateway {
    pub fn new() -> Self {
        Self::with_frame_size(128)
    }

    pub fn with_frame_size(max_frame_size: usize) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordDatabase::open(&tmp.path().join("records.redb")).unwrap());
        let chain = FakeChain::new();

        let secret = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let node_public = secret.public_key();
        let cipher = Arc::new(EciesCipher::new(secret));

        let chain_client: Arc<dyn ChainClient> = chain.clone();
        let workflow = VerificationWorkflow::new(
            Arc::clone(&chain_client),
            Arc::clone(&store),
            WorkflowConfig {
                check_interval: CHECK_INTERVAL,
                max_cycles: 3,
                default_contract: Some(DEFAULT_CONTRACT),
            },
        );
        let gateway = Arc::new(Gateway::new(
            SessionManager::new(Duration::from_millis(250)),
            chain_client,
            Arc::clone(&store),
            cipher,
            workflow,
            GatewayOptions {
                max_frame_size,
                send_delay: Duration::from_millis(50),
            },
        ));

        Self {
            gateway,
            chain,
            store,
            node_public,
            _tmp: tmp,
        }
    }

    /// Read `getPin` over a fresh link.
    pub async fn get_pin(&self) -> String {
        let link = RecordingLink::default();
        let pin = self
            .gateway
            .on_read(Endpoint::GetPin, &link)
            .await
            .unwrap();
        String::from_utf8(pin).unwrap()
    }

    /// Encrypt a JSON request to the node key.
    pub fn seal(&self, value: &Value) -> Vec<u8> {
        seal(&serde_json::to_vec(value).unwrap(), &self.node_public).unwrap()
    }

    /// Write `data` to `endpoint` over a fresh link and return the link.
    pub async fn write(&self, endpoint: Endpoint, data: &[u8]) -> RecordingLink {
        let link = RecordingLink::default();
        self.gateway.on_write(endpoint, data, &link).await;
        link
    }
}

/// Packed `0x` signature of `pin` as a personal message.
pub fn sign_pin(signer: &PrivateKeySigner, pin: &str) -> Value {
    let sig = signer.sign_message_sync(pin.as_bytes()).unwrap();
    Value::String(alloy::hex::encode_prefixed(sig.as_bytes()))
}

/// EIP-1559 transfer signed by `signer`, as `0x` hex.
pub fn signed_tx(signer: &PrivateKeySigner, gas_limit: u64, value: U256) -> String {
    let mut tx = TxEip1559 {
        chain_id: 43113,
        nonce: 0,
        gas_limit,
        max_fee_per_gas: 30_000_000_000,
        max_priority_fee_per_gas: 1_500_000_000,
        to: TxKind::Call(Address::repeat_byte(0x22)),
        value,
        ..Default::default()
    };
    let sig = signer.sign_transaction_sync(&mut tx).unwrap();
    let envelope = TxEnvelope::from(tx.into_signed(sig));
    alloy::hex::encode_prefixed(envelope.encoded_2718())
}

/// Decode a single-frame JSON payload.
pub fn payload_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}
