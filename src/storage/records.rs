// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification record types.

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a client's presence verification.
///
/// `Absent -> Pending -> {Success, Failed}`; a new verification re-enters
/// `Pending` from any state other than `Pending`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Absent,
    Pending,
    Success,
    Failed,
}

impl PresenceStatus {
    pub fn is_pending(self) -> bool {
        self == PresenceStatus::Pending
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PresenceStatus::Absent => "absent",
            PresenceStatus::Pending => "pending",
            PresenceStatus::Success => "success",
            PresenceStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Persisted per-client verification state, keyed by client address.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    /// Contract the client asked this node to verify presence against.
    pub contract_address: Option<Address>,
    /// Account allowed to trigger verification. Recorded, not enforced.
    pub authority: Option<Address>,
    #[serde(default)]
    pub verify_presence_status: PresenceStatus,
    pub verify_presence_tx_hash: Option<B256>,
    pub client_tx_hash: Option<B256>,
    /// Raw client transaction waiting on the pending verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_tx: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl VerificationRecord {
    /// Enter `Pending` for a freshly submitted verification transaction.
    pub fn begin_verification(&mut self, tx_hash: B256, relay_tx: Option<String>) {
        self.verify_presence_status = PresenceStatus::Pending;
        self.verify_presence_tx_hash = Some(tx_hash);
        self.client_tx_hash = None;
        self.relay_tx = relay_tx;
    }

    /// Leave `Pending` with a terminal status; the waiting relay is dropped.
    pub fn finish_verification(&mut self, status: PresenceStatus) {
        self.verify_presence_status = status;
        self.relay_tx = None;
    }

    pub fn status_view(&self) -> ClientTxStatus {
        ClientTxStatus {
            verify_presence_status: self.verify_presence_status,
            verify_presence_tx_hash: self.verify_presence_tx_hash,
            client_tx_hash: self.client_tx_hash,
        }
    }
}

/// What a client sees of its own record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientTxStatus {
    pub verify_presence_status: PresenceStatus,
    pub verify_presence_tx_hash: Option<B256>,
    pub client_tx_hash: Option<B256>,
}
