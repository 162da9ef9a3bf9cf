// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encrypted write endpoints.
//!
//! Every request here is an envelope sealed to the node key. The plaintext is
//! a bare signed pin, `{"pin": <signed pin>, "address": "0x.."}` or
//! `{"pin": <signed pin>, "tx": "0x.."}`. The optional `address` names the
//! account the client signs as. Ordering is fixed: decrypt, recover the pin
//! signer, validate the transaction, authorize, touch the session, act,
//! respond.

use alloy::primitives::{Address, B256};
use serde_json::Value;
use tracing::warn;

use super::{json_payload, Gateway, HandlerResult, Reply, NULL_PAYLOAD};
use crate::codes::ResponseCode;
use crate::storage::VerificationRecord;
use crate::validator::{
    self, claimed_address, parse_json, parse_signed_request, parse_signed_transaction,
    recover_signers, signed_token_from_value, SignedToken, Signers,
};
use crate::workflow::WorkflowError;

impl Gateway {
    fn open(&self, data: &[u8]) -> Result<Vec<u8>, ResponseCode> {
        validator::decrypt(self.cipher.as_ref(), data)
    }

    fn signers(&self, token: &SignedToken) -> Result<Signers, ResponseCode> {
        recover_signers(&self.session.snapshot(), token)
    }

    /// Decrypt a `{pin, tx}` request and recover its pin signers.
    fn open_with_transaction(
        &self,
        data: &[u8],
    ) -> Result<(Value, Signers, Option<Address>), ResponseCode> {
        let value = parse_json(&self.open(data)?)?;
        let token = signed_token_from_value(value.get("pin").unwrap_or(&Value::Null))?;
        let claimed = claimed_address(&value)?;
        let signers = self.signers(&token)?;
        Ok((value, signers, claimed))
    }

    /// Decrypt a pin-only request and decide who signed it.
    fn open_signed(&self, data: &[u8]) -> Result<Address, ResponseCode> {
        let request = parse_signed_request(&self.open(data)?)?;
        self.signers(&request.token)?
            .identify(request.claimed, |client| self.workflow.is_known(client))
    }

    fn record_of(&self, client: Address) -> Result<VerificationRecord, ResponseCode> {
        match self.store.get(&client) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(ResponseCode::NoTxDb),
            Err(e) => {
                warn!(client = %client, error = %e, "Record lookup failed");
                Err(ResponseCode::NoTxDb)
            }
        }
    }

    /// Signed pin → verification tx hash.
    pub(super) async fn verify_presence(&self, data: &[u8]) -> HandlerResult {
        let request = parse_signed_request(&self.open(data)?)?;
        let authorized = self.workflow.authorize_signed(
            &self.session.snapshot(),
            &request.token,
            request.claimed,
        )?;
        self.session.touch();

        let result = self.workflow.submit_presence(&authorized).await;
        hash_reply(authorized.client, result)
    }

    /// `{pin, tx}` → verification tx hash; `tx` is relayed once verified.
    pub(super) async fn verify_presence_and_send_tx(&self, data: &[u8]) -> HandlerResult {
        let (value, signers, claimed) = self.open_with_transaction(data)?;
        let (client, (tx, authorized)) = resolve_client(&signers, claimed, |client| {
            let tx = parse_signed_transaction(&value, client)?;
            let authorized = self.workflow.authorize(client)?;
            Ok((tx, authorized))
        })?;
        self.session.touch();

        let result = match self.workflow.submit_presence(&authorized).await {
            Ok(hash) => self
                .workflow
                .send_tx_when_presence_verified(hash, tx.raw, client)
                .map(|_| hash),
            Err(e) => Err(e),
        };
        hash_reply(client, result)
    }

    /// `{pin, tx}` → client tx hash, submitted right away.
    pub(super) async fn send_tx(&self, data: &[u8]) -> HandlerResult {
        let (value, signers, claimed) = self.open_with_transaction(data)?;
        let (client, tx) =
            resolve_client(&signers, claimed, |client| parse_signed_transaction(&value, client))?;
        self.session.touch();

        let balance = match self.chain.get_balance(client).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(client = %client, error = %e, "Balance lookup failed");
                return Ok(Reply::Single(NULL_PAYLOAD.to_vec()));
            }
        };
        // A cost that overflows 256 bits is more than any balance.
        match tx.max_cost() {
            Some(cost) if balance >= cost => {}
            _ => return Err(ResponseCode::InsufficientBalance),
        }

        let raw = tx.raw_bytes()?;
        match self.chain.submit_transaction(&raw).await {
            Ok(hash) => Ok(Reply::Single(json_payload(&hash))),
            Err(e) => {
                warn!(client = %client, error = %e, "Transaction submission failed");
                Ok(Reply::Single(NULL_PAYLOAD.to_vec()))
            }
        }
    }

    /// Signed pin → the signer's record status.
    pub(super) async fn get_client_tx_status(&self, data: &[u8]) -> HandlerResult {
        let record = self.record_of(self.open_signed(data)?)?;
        self.session.touch();

        Ok(Reply::Single(json_payload(&record.status_view())))
    }

    /// Signed pin → the signer's contract address, as a chunked transfer.
    pub(super) fn get_contract_address(&self, data: &[u8]) -> HandlerResult {
        let contract = self
            .record_of(self.open_signed(data)?)?
            .contract_address
            .ok_or(ResponseCode::NoTxAddress)?;
        self.session.touch();

        Ok(self.enqueue(&contract.to_checksum(None)))
    }
}

/// The request's client: the claimed signer when the request names one,
/// else the first candidate `accept` agrees with.
fn resolve_client<T>(
    signers: &Signers,
    claimed: Option<Address>,
    mut accept: impl FnMut(Address) -> Result<T, ResponseCode>,
) -> Result<(Address, T), ResponseCode> {
    if claimed.is_none() {
        return signers.resolve(accept);
    }
    let client = signers.identify(claimed, |_| false)?;
    Ok((client, accept(client)?))
}

fn hash_reply(
    client: Address,
    result: Result<B256, WorkflowError>,
) -> HandlerResult {
    match result {
        Ok(hash) => Ok(Reply::Single(json_payload(&hash))),
        Err(e) => match e.response_code() {
            Some(code) => Err(code),
            None => {
                warn!(client = %client, error = %e, "Presence verification failed");
                Ok(Reply::Single(NULL_PAYLOAD.to_vec()))
            }
        },
    }
}
