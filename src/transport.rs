// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Transport-facing endpoint catalogue and peer primitives.
//!
//! Each logical operation is exposed as one characteristic of the gateway
//! service. Reads return a value directly; writes answer with a
//! [`ResponseCode`] and then deliver a payload either in a single frame or as
//! a pull-driven chunked transfer.

use std::fmt;

use crate::codes::ResponseCode;

/// Gateway service UUID.
pub const SERVICE_UUID: &str = "7a4b1000-9c2e-4d6f-8e1a-5b3c2d1e0f00";

/// How the peer interacts with an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Value returned on read.
    Read,
    /// Plaintext write request.
    Write,
    /// Write request sealed to the node key.
    EncryptedWrite,
}

/// How a write endpoint delivers its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    SingleFrame,
    MultiFrame,
}

/// Every characteristic the gateway serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetPin,
    GetDeviceAccount,
    GetBlockNumber,
    GetPublicKey,
    GetAccountBalance,
    GetTxStatus,
    CallTx,
    VerifyPresence,
    VerifyPresenceAndSendTx,
    SendTx,
    GetClientTxStatus,
    GetContractAddress,
}

impl Endpoint {
    pub const ALL: [Endpoint; 12] = [
        Endpoint::GetPin,
        Endpoint::GetDeviceAccount,
        Endpoint::GetBlockNumber,
        Endpoint::GetPublicKey,
        Endpoint::GetAccountBalance,
        Endpoint::GetTxStatus,
        Endpoint::CallTx,
        Endpoint::VerifyPresence,
        Endpoint::VerifyPresenceAndSendTx,
        Endpoint::SendTx,
        Endpoint::GetClientTxStatus,
        Endpoint::GetContractAddress,
    ];

    /// Name used on the bridge wire.
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::GetPin => "getPin",
            Endpoint::GetDeviceAccount => "getDeviceAccount",
            Endpoint::GetBlockNumber => "getBlockNumber",
            Endpoint::GetPublicKey => "getPublicKey",
            Endpoint::GetAccountBalance => "getAccountBalance",
            Endpoint::GetTxStatus => "getTxStatus",
            Endpoint::CallTx => "callTx",
            Endpoint::VerifyPresence => "verifyPresence",
            Endpoint::VerifyPresenceAndSendTx => "verifyPresenceAndSendTx",
            Endpoint::SendTx => "sendTx",
            Endpoint::GetClientTxStatus => "getClientTxStatus",
            Endpoint::GetContractAddress => "getContractAddress",
        }
    }

    /// Characteristic UUID.
    pub fn uuid(self) -> &'static str {
        match self {
            Endpoint::GetPin => "7a4b1001-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::GetDeviceAccount => "7a4b1002-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::GetBlockNumber => "7a4b1003-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::GetPublicKey => "7a4b1004-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::GetAccountBalance => "7a4b1010-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::GetTxStatus => "7a4b1011-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::CallTx => "7a4b1012-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::VerifyPresence => "7a4b1020-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::VerifyPresenceAndSendTx => "7a4b1021-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::SendTx => "7a4b1022-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::GetClientTxStatus => "7a4b1023-9c2e-4d6f-8e1a-5b3c2d1e0f00",
            Endpoint::GetContractAddress => "7a4b1024-9c2e-4d6f-8e1a-5b3c2d1e0f00",
        }
    }

    pub fn kind(self) -> EndpointKind {
        match self {
            Endpoint::GetPin
            | Endpoint::GetDeviceAccount
            | Endpoint::GetBlockNumber
            | Endpoint::GetPublicKey => EndpointKind::Read,
            Endpoint::GetAccountBalance | Endpoint::GetTxStatus | Endpoint::CallTx => {
                EndpointKind::Write
            }
            Endpoint::VerifyPresence
            | Endpoint::VerifyPresenceAndSendTx
            | Endpoint::SendTx
            | Endpoint::GetClientTxStatus
            | Endpoint::GetContractAddress => EndpointKind::EncryptedWrite,
        }
    }

    /// Payload delivery of a write endpoint, `None` for reads.
    pub fn delivery(self) -> Option<Delivery> {
        match self {
            Endpoint::CallTx | Endpoint::GetContractAddress => Some(Delivery::MultiFrame),
            e if e.kind() == EndpointKind::Read => None,
            _ => Some(Delivery::SingleFrame),
        }
    }

    /// Look up an endpoint by wire name or characteristic UUID.
    pub fn lookup(key: &str) -> Option<Endpoint> {
        Self::ALL
            .into_iter()
            .find(|e| e.name() == key || e.uuid().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Primitives the gateway needs from the connected peer.
pub trait PeerLink: Send + Sync {
    /// Acknowledge a write on `endpoint` with `code`.
    fn respond(&self, endpoint: Endpoint, code: ResponseCode);

    /// Push `bytes` to the peer on `endpoint`.
    fn send(&self, endpoint: Endpoint, bytes: &[u8]);

    /// Drop the current peer.
    fn disconnect(&self);
}
