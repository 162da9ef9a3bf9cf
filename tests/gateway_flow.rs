// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end request flows through the gateway with an in-memory chain.

mod common;

use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use serde_json::json;

use common::*;
use relational_ble_gateway::{
    blockchain::contract::IPresenceVerifier,
    codes::{ResponseCode, EOF_MARKER},
    storage::PresenceStatus,
    transport::{Endpoint, EndpointKind},
};

/// Client named in the `n`th presence call the node sent.
fn verified_client(ctx: &TestGateway, n: usize) -> Address {
    let calls = ctx.chain.contract_calls.lock().unwrap().clone();
    IPresenceVerifier::verifyPresenceCall::abi_decode(&calls[n].1)
        .unwrap()
        .client
}

// ==================== Presence verification ====================

#[tokio::test(start_paused = true)]
async fn verify_presence_returns_hash_and_marks_pending() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    assert_eq!(pin.len(), 32);

    let body = ctx.seal(&sign_pin(&client, &pin));
    let link = ctx.write(Endpoint::VerifyPresence, &body).await;

    assert_eq!(
        link.events(),
        vec![
            LinkEvent::Respond(Endpoint::VerifyPresence, ResponseCode::Success),
            LinkEvent::Send(
                Endpoint::VerifyPresence,
                serde_json::to_vec(&VERIFY_TX_HASH).unwrap()
            ),
            LinkEvent::Disconnect,
        ]
    );
    let hash: String = serde_json::from_slice(&link.sent()[0]).unwrap();
    assert_eq!(hash.len(), 66);

    let record = ctx.store.get(&client.address()).unwrap().unwrap();
    assert_eq!(record.verify_presence_status, PresenceStatus::Pending);
    assert_eq!(record.verify_presence_tx_hash, Some(VERIFY_TX_HASH));

    let calls = ctx.chain.contract_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, DEFAULT_CONTRACT);
}

#[tokio::test(start_paused = true)]
async fn verified_presence_relays_the_client_transaction() {
    let ctx = TestGateway::new();
    ctx.chain.mine_after(1, true);
    let client = PrivateKeySigner::random();
    let tx = signed_tx(&client, 21_000, U256::from(1u64));

    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({ "pin": sign_pin(&client, &pin), "tx": tx }));
    let link = ctx.write(Endpoint::VerifyPresenceAndSendTx, &body).await;
    assert_eq!(link.codes(), vec![ResponseCode::Success]);
    assert!(ctx.chain.relayed().is_empty());

    tokio::time::sleep(CHECK_INTERVAL + Duration::from_secs(1)).await;

    let record = ctx.store.get(&client.address()).unwrap().unwrap();
    assert_eq!(record.verify_presence_status, PresenceStatus::Success);
    assert_eq!(record.client_tx_hash, Some(CLIENT_TX_HASH));
    assert_eq!(record.relay_tx, None);
    assert_eq!(
        ctx.chain.relayed(),
        vec![Bytes::from(alloy::hex::decode(&tx).unwrap())]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_verification_drops_the_relay() {
    let ctx = TestGateway::new();
    ctx.chain.mine_after(1, false);
    let client = PrivateKeySigner::random();
    let tx = signed_tx(&client, 21_000, U256::ZERO);

    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({ "pin": sign_pin(&client, &pin), "tx": tx }));
    ctx.write(Endpoint::VerifyPresenceAndSendTx, &body).await;

    tokio::time::sleep(CHECK_INTERVAL + Duration::from_secs(1)).await;

    let record = ctx.store.get(&client.address()).unwrap().unwrap();
    assert_eq!(record.verify_presence_status, PresenceStatus::Failed);
    assert_eq!(record.client_tx_hash, None);
    assert!(ctx.chain.relayed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_request_while_pending_is_rejected() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    let first = ctx
        .write(Endpoint::VerifyPresence, &ctx.seal(&sign_pin(&client, &pin)))
        .await;
    assert_eq!(first.codes(), vec![ResponseCode::Success]);

    let pin = ctx.get_pin().await;
    let second = ctx
        .write(Endpoint::VerifyPresence, &ctx.seal(&sign_pin(&client, &pin)))
        .await;
    assert_eq!(second.codes(), vec![ResponseCode::TxPending]);
    assert!(second.sent().is_empty());
    assert!(second.disconnected());

    assert_eq!(ctx.gateway.workflow().loops_started(), 1);
    assert_eq!(ctx.chain.contract_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_envelope_is_rejected_without_side_effects() {
    let ctx = TestGateway::new();
    ctx.get_pin().await;

    let link = ctx
        .write(Endpoint::VerifyPresence, br#"{"ephemPublicKey":"0x00"}"#)
        .await;

    assert_eq!(
        link.events(),
        vec![
            LinkEvent::Respond(Endpoint::VerifyPresence, ResponseCode::DecryptionFailed),
            LinkEvent::Disconnect,
        ]
    );
    assert_eq!(ctx.chain.contract_calls(), 0);
    assert!(ctx
        .store
        .list_by_status(PresenceStatus::Pending)
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn signed_request_without_session_is_rejected() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();

    let body = ctx.seal(&sign_pin(&client, "no-session-pin-0000000000000000"));
    let link = ctx.write(Endpoint::VerifyPresence, &body).await;

    assert_eq!(link.codes(), vec![ResponseCode::InvalidPin]);
    assert!(ctx.store.get(&client.address()).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn previous_pin_still_verifies_after_rotation() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    ctx.gateway.session().rotate().unwrap();

    let body = ctx.seal(&json!({
        "pin": sign_pin(&client, &pin),
        "address": client.address().to_checksum(None),
    }));
    let link = ctx.write(Endpoint::VerifyPresence, &body).await;
    assert_eq!(link.codes(), vec![ResponseCode::Success]);

    let record = ctx.store.get(&client.address()).unwrap().unwrap();
    assert_eq!(record.verify_presence_status, PresenceStatus::Pending);
    assert_eq!(
        ctx.store.list_by_status(PresenceStatus::Pending).unwrap().len(),
        1
    );
    assert_eq!(verified_client(&ctx, 0), client.address());
}

#[tokio::test(start_paused = true)]
async fn previous_pin_resolves_to_a_registered_client() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();
    let registered = Address::repeat_byte(0xDD);
    ctx.store
        .upsert(&client.address(), |r| r.contract_address = Some(registered))
        .unwrap();

    let pin = ctx.get_pin().await;
    ctx.gateway.session().rotate().unwrap();

    let link = ctx
        .write(Endpoint::VerifyPresence, &ctx.seal(&sign_pin(&client, &pin)))
        .await;
    assert_eq!(link.codes(), vec![ResponseCode::Success]);

    let record = ctx.store.get(&client.address()).unwrap().unwrap();
    assert_eq!(record.verify_presence_status, PresenceStatus::Pending);
    let calls = ctx.chain.contract_calls.lock().unwrap().clone();
    assert_eq!(calls[0].0, registered);
    assert_eq!(verified_client(&ctx, 0), client.address());
}

#[tokio::test(start_paused = true)]
async fn claimed_address_must_be_a_signer() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();
    let other = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({
        "pin": sign_pin(&client, &pin),
        "address": other.address().to_checksum(None),
    }));
    let link = ctx.write(Endpoint::VerifyPresence, &body).await;

    assert_eq!(link.codes(), vec![ResponseCode::NoSignedMessage]);
    assert_eq!(ctx.chain.contract_calls(), 0);
    assert!(ctx.store.get(&other.address()).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn verify_and_send_while_pending_is_rejected() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    let first = ctx
        .write(Endpoint::VerifyPresence, &ctx.seal(&sign_pin(&client, &pin)))
        .await;
    assert_eq!(first.codes(), vec![ResponseCode::Success]);

    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({
        "pin": sign_pin(&client, &pin),
        "tx": signed_tx(&client, 21_000, U256::ZERO),
    }));
    let second = ctx.write(Endpoint::VerifyPresenceAndSendTx, &body).await;
    assert_eq!(second.codes(), vec![ResponseCode::TxPending]);
    assert!(second.sent().is_empty());

    let record = ctx.store.get(&client.address()).unwrap().unwrap();
    assert_eq!(record.relay_tx, None);
    assert!(ctx.chain.relayed().is_empty());
    assert_eq!(ctx.chain.contract_calls(), 1);
    assert_eq!(ctx.gateway.workflow().loops_started(), 1);
}

// ==================== Client status ====================

#[tokio::test(start_paused = true)]
async fn client_status_reports_the_signers_record() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    let link = ctx
        .write(Endpoint::GetClientTxStatus, &ctx.seal(&sign_pin(&client, &pin)))
        .await;
    assert_eq!(link.codes(), vec![ResponseCode::NoTxDb]);

    let pin = ctx.get_pin().await;
    ctx.write(Endpoint::VerifyPresence, &ctx.seal(&sign_pin(&client, &pin)))
        .await;

    let pin = ctx.get_pin().await;
    let link = ctx
        .write(Endpoint::GetClientTxStatus, &ctx.seal(&sign_pin(&client, &pin)))
        .await;
    let status = payload_json(&link.sent()[0]);
    assert_eq!(status["verifyPresenceStatus"], "pending");
    assert_eq!(status["verifyPresenceTxHash"], json!(VERIFY_TX_HASH));
    assert!(status["clientTxHash"].is_null());
}

// ==================== sendTx ====================

#[tokio::test(start_paused = true)]
async fn send_tx_requires_balance_for_the_worst_case_cost() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();
    let tx = signed_tx(&client, 21_000, U256::from(1u64));

    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({ "pin": sign_pin(&client, &pin), "tx": tx }));
    let link = ctx.write(Endpoint::SendTx, &body).await;
    assert_eq!(link.codes(), vec![ResponseCode::InsufficientBalance]);
    assert!(ctx.chain.relayed().is_empty());

    ctx.chain.set_balance(U256::from(10u64).pow(U256::from(18u64)));
    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({ "pin": sign_pin(&client, &pin), "tx": tx }));
    let link = ctx.write(Endpoint::SendTx, &body).await;
    assert_eq!(link.codes(), vec![ResponseCode::Success]);
    assert_eq!(link.sent(), vec![serde_json::to_vec(&CLIENT_TX_HASH).unwrap()]);
    assert_eq!(ctx.chain.relayed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_tx_with_overflowing_cost_is_insufficient_balance() {
    let ctx = TestGateway::new();
    ctx.chain.set_balance(U256::MAX);
    let client = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({
        "pin": sign_pin(&client, &pin),
        "tx": signed_tx(&client, 21_000, U256::MAX),
    }));
    let link = ctx.write(Endpoint::SendTx, &body).await;

    assert_eq!(link.codes(), vec![ResponseCode::InsufficientBalance]);
    assert!(ctx.chain.relayed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_tx_rejects_a_transaction_from_another_account() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();
    let other = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({
        "pin": sign_pin(&client, &pin),
        "tx": signed_tx(&other, 21_000, U256::ZERO),
    }));
    let link = ctx.write(Endpoint::SendTx, &body).await;
    assert_eq!(link.codes(), vec![ResponseCode::InvalidTxSender]);
}

#[tokio::test(start_paused = true)]
async fn send_tx_rejects_gas_below_intrinsic_cost() {
    let ctx = TestGateway::new();
    let client = PrivateKeySigner::random();

    let pin = ctx.get_pin().await;
    let body = ctx.seal(&json!({
        "pin": sign_pin(&client, &pin),
        "tx": signed_tx(&client, 20_000, U256::ZERO),
    }));
    let link = ctx.write(Endpoint::SendTx, &body).await;
    assert_eq!(link.codes(), vec![ResponseCode::InsufficientGas]);
}

// ==================== Plain endpoints ====================

#[tokio::test(start_paused = true)]
async fn call_tx_streams_frames_then_eof() {
    let ctx = TestGateway::with_frame_size(16);
    let body = serde_json::to_vec(&json!([
        Address::repeat_byte(0x22).to_checksum(None),
        "0xdeadbeef"
    ]))
    .unwrap();

    let link = ctx.write(Endpoint::CallTx, &body).await;
    assert_eq!(link.codes(), vec![ResponseCode::Success]);
    assert!(!link.disconnected());

    let mut frames = Vec::new();
    loop {
        ctx.gateway.on_ready(Endpoint::CallTx, &link);
        let last = link.sent().pop().unwrap();
        if last == EOF_MARKER {
            break;
        }
        assert!(last.len() <= 16);
        frames.extend(last);
    }

    let expected = format!("0x{}", "deadbeef".repeat(8));
    assert_eq!(frames, serde_json::to_vec(&expected).unwrap());
    assert!(!link.disconnected());

    // Nothing left to pull.
    ctx.gateway.on_ready(Endpoint::CallTx, &link);
    assert!(link.disconnected());
}

#[tokio::test(start_paused = true)]
async fn disconnect_abandons_a_transfer_in_flight() {
    let ctx = TestGateway::with_frame_size(8);
    let body = serde_json::to_vec(&json!([
        Address::repeat_byte(0x22).to_checksum(None),
        "0x01"
    ]))
    .unwrap();
    ctx.write(Endpoint::CallTx, &body).await;
    ctx.gateway.on_disconnect();

    let link = RecordingLink::default();
    ctx.gateway.on_ready(Endpoint::CallTx, &link);
    assert_eq!(link.events(), vec![LinkEvent::Disconnect]);
    assert!(ctx.gateway.session().current().is_none());
}

#[tokio::test(start_paused = true)]
async fn tx_status_and_balance_answer_in_one_frame() {
    let ctx = TestGateway::new();
    ctx.chain.set_balance(U256::from(1234u64));

    let link = ctx
        .write(
            Endpoint::GetAccountBalance,
            Address::repeat_byte(0x11).to_checksum(None).as_bytes(),
        )
        .await;
    assert_eq!(link.sent(), vec![br#""1234""#.to_vec()]);
    assert!(link.disconnected());

    let link = ctx
        .write(
            Endpoint::GetTxStatus,
            alloy::hex::encode_prefixed(CLIENT_TX_HASH).as_bytes(),
        )
        .await;
    assert_eq!(
        payload_json(&link.sent()[0]),
        json!({ "blockNumber": 7, "nonce": 3, "gas": 21000 })
    );

    let link = ctx.write(Endpoint::GetTxStatus, b"0x1234").await;
    assert_eq!(link.codes(), vec![ResponseCode::InvalidTxHash]);
}

#[tokio::test(start_paused = true)]
async fn reads_serve_text_and_writes_to_reads_disconnect() {
    let ctx = TestGateway::new();
    ctx.chain.set_head(4321);
    let link = RecordingLink::default();

    let account = ctx
        .gateway
        .on_read(Endpoint::GetDeviceAccount, &link)
        .await
        .unwrap();
    assert_eq!(account, NODE_ACCOUNT.to_checksum(None).into_bytes());

    let block = ctx
        .gateway
        .on_read(Endpoint::GetBlockNumber, &link)
        .await
        .unwrap();
    assert_eq!(block, b"4321".to_vec());

    let key = ctx
        .gateway
        .on_read(Endpoint::GetPublicKey, &link)
        .await
        .unwrap();
    assert_eq!(key.len(), 2 + 66);
    assert!(!link.disconnected());

    let link = ctx.write(Endpoint::GetPin, b"{}").await;
    assert_eq!(link.events(), vec![LinkEvent::Disconnect]);

    let link = RecordingLink::default();
    assert!(ctx.gateway.on_read(Endpoint::SendTx, &link).await.is_none());
    assert!(link.disconnected());
}

#[tokio::test(start_paused = true)]
async fn only_read_endpoints_answer_reads() {
    let ctx = TestGateway::new();

    for endpoint in Endpoint::ALL {
        let link = RecordingLink::default();
        let served = ctx.gateway.on_read(endpoint, &link).await;
        let readable = endpoint.kind() == EndpointKind::Read;
        assert_eq!(served.is_some(), readable, "{endpoint}");
        assert_eq!(link.disconnected(), !readable, "{endpoint}");
    }
}
