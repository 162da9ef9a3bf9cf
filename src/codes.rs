// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Response Codes
//!
//! Single-byte codes written back to the peer as the acknowledgement of a
//! write request, plus the framing constants shared by every chunked transfer.
//!
//! | Code | Byte | Meaning |
//! |------|------|---------|
//! | `Success` | `0x00` | request accepted, payload follows |
//! | `InvalidJson` | `0x02` | payload is not the expected JSON shape |
//! | `NoSignedMessage` | `0x03` | signed pin missing or unrecoverable |
//! | `NoTxDb` | `0x04` | no verification record for the client |
//! | `NoTxAddress` | `0x05` | address malformed, or no contract address on record |
//! | `InvalidTxHash` | `0x07` | transaction hash malformed (gateway extension) |
//! | `NoEthereum` | `0x08` | node has no usable chain connection |
//! | `InvalidPin` | `0x09` | no session pin is open |
//! | `InvalidTxSender` | `0x0A` | tx sender differs from the pin signer |
//! | `InvalidTxSignature` | `0x0B` | tx signature cannot be recovered |
//! | `InsufficientGas` | `0x0C` | tx gas limit below intrinsic gas |
//! | `InsufficientBalance` | `0x0D` | sender cannot cover gas and value |
//! | `InvalidSessionId` | `0x0E` | session id rejected |
//! | `TxPending` | `0x0F` | a verification is already in flight |
//! | `SessionNotFound` | `0x10` | session id unknown |
//! | `InvalidCallData` | `0x11` | call descriptor malformed |
//! | `DecryptionFailed` | `0x12` | envelope could not be decrypted |
//!
//! `0x07` is a gateway extension: the base code table assigns no byte to
//! `InvalidTxHash`, so it takes the unassigned `0x07`.

use std::fmt;

/// End-of-stream marker delivered after the last chunk of a transfer.
pub const EOF_MARKER: &[u8] = b"EOF";

/// Default maximum number of bytes in one transport frame.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 128;

/// Length of a `0x`-prefixed 32-byte hash.
pub const TX_HASH_LEN: usize = 66;

/// Length of a `0x`-prefixed 20-byte address.
pub const ADDRESS_LEN: usize = 42;

/// Acknowledgement codes returned via the transport's `respond` primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseCode {
    Success = 0x00,
    InvalidJson = 0x02,
    NoSignedMessage = 0x03,
    NoTxDb = 0x04,
    NoTxAddress = 0x05,
    /// Gateway extension, not part of the base code set.
    InvalidTxHash = 0x07,
    NoEthereum = 0x08,
    InvalidPin = 0x09,
    InvalidTxSender = 0x0A,
    InvalidTxSignature = 0x0B,
    InsufficientGas = 0x0C,
    InsufficientBalance = 0x0D,
    InvalidSessionId = 0x0E,
    TxPending = 0x0F,
    SessionNotFound = 0x10,
    InvalidCallData = 0x11,
    DecryptionFailed = 0x12,
}

impl ResponseCode {
    /// Wire byte for this code.
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a wire byte back into a code.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let code = match byte {
            0x00 => Self::Success,
            0x02 => Self::InvalidJson,
            0x03 => Self::NoSignedMessage,
            0x04 => Self::NoTxDb,
            0x05 => Self::NoTxAddress,
            0x07 => Self::InvalidTxHash,
            0x08 => Self::NoEthereum,
            0x09 => Self::InvalidPin,
            0x0A => Self::InvalidTxSender,
            0x0B => Self::InvalidTxSignature,
            0x0C => Self::InsufficientGas,
            0x0D => Self::InsufficientBalance,
            0x0E => Self::InvalidSessionId,
            0x0F => Self::TxPending,
            0x10 => Self::SessionNotFound,
            0x11 => Self::InvalidCallData,
            0x12 => Self::DecryptionFailed,
            _ => return None,
        };
        Some(code)
    }

    /// Stable snake_case name, used in log fields.
    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InvalidJson => "invalid_json_in_request",
            Self::NoSignedMessage => "no_signed_msg_in_request",
            Self::NoTxDb => "no_tx_db_err",
            Self::NoTxAddress => "no_tx_addr_err",
            Self::InvalidTxHash => "invalid_tx_hash",
            Self::NoEthereum => "no_ethereum",
            Self::InvalidPin => "invalid_pin",
            Self::InvalidTxSender => "invalid_tx_sender_address",
            Self::InvalidTxSignature => "invalid_tx_signature",
            Self::InsufficientGas => "insufficient_gas",
            Self::InsufficientBalance => "insufficient_balance",
            Self::InvalidSessionId => "invalid_session_id",
            Self::TxPending => "tx_pending",
            Self::SessionNotFound => "session_not_found",
            Self::InvalidCallData => "invalid_call_data",
            Self::DecryptionFailed => "decryption_failed",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.name(), self.as_byte())
    }
}
