// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Plaintext write endpoints: account balance, transaction status, read-only calls.

use tracing::warn;

use super::{json_payload, Gateway, HandlerResult, Reply, NULL_PAYLOAD};
use crate::validator::{parse_address, parse_call_descriptor, parse_transaction_hash};

impl Gateway {
    /// Address → balance in wei as a decimal string.
    pub(super) async fn get_account_balance(&self, data: &[u8]) -> HandlerResult {
        let address = parse_address(data)?;

        let payload = match self.chain.get_balance(address).await {
            Ok(balance) => json_payload(&balance.to_string()),
            Err(e) => {
                warn!(address = %address, error = %e, "Balance lookup failed");
                NULL_PAYLOAD.to_vec()
            }
        };
        Ok(Reply::Single(payload))
    }

    /// Hash → `{blockNumber, nonce, gas}`, `null` if unknown.
    pub(super) async fn get_tx_status(&self, data: &[u8]) -> HandlerResult {
        let hash = parse_transaction_hash(data)?;

        let payload = match self.chain.get_transaction(hash).await {
            Ok(Some(summary)) => json_payload(&summary),
            Ok(None) => NULL_PAYLOAD.to_vec(),
            Err(e) => {
                warn!(tx_hash = %hash, error = %e, "Transaction lookup failed");
                NULL_PAYLOAD.to_vec()
            }
        };
        Ok(Reply::Single(payload))
    }

    /// `[to, data]` → call result hex, delivered as a chunked transfer.
    pub(super) async fn call_tx(&self, data: &[u8]) -> HandlerResult {
        let call = parse_call_descriptor(data)?;

        match self.chain.call(call.to, call.data).await {
            Ok(result) => Ok(self.enqueue(&alloy::hex::encode_prefixed(&result))),
            Err(e) => {
                warn!(to = %call.to, error = %e, "Call failed");
                Ok(self.enqueue(&Option::<String>::None))
            }
        }
    }
}
