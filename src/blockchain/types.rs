// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// EVM network the gateway talks to.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name for display
    pub name: String,
    /// RPC endpoint URL
    pub rpc_url: String,
}

impl NetworkConfig {
    pub fn new(name: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpc_url: rpc_url.into(),
        }
    }
}

/// Receipt of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash
    pub tx_hash: B256,
    /// Block number where transaction was included
    pub block_number: Option<u64>,
    /// Gas actually used
    pub gas_used: u64,
    /// Whether execution succeeded
    pub success: bool,
}

/// What `getTxStatus` reports about a known transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxSummary {
    /// Block number, `None` while pending
    pub block_number: Option<u64>,
    pub nonce: u64,
    /// Gas limit
    pub gas: u64,
}

/// A client's registration of a verifier contract with this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRequest {
    pub client: Address,
    pub authority: Address,
    pub contract: Address,
    pub block_number: Option<u64>,
}
